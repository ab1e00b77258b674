//! Ordered exclusion rules for low-value posts.
//!
//! Two passes run in order: title patterns first, then keywords. Within a
//! pass rules are tried in configured order and the first match wins, so a
//! [`FilterDecision`] always names exactly one rule. Evaluation has no side
//! effects and depends only on its inputs.
use regex::{Regex, RegexBuilder};
use std::fmt;
use thiserror::Error;

use crate::config::FilterConfig;

#[derive(Debug, Error)]
pub enum FilterError {
    #[error("invalid title pattern {pattern:?}: {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

/// Which pass a rule belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterPass {
    TitlePattern,
    Keyword,
}

impl fmt::Display for FilterPass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilterPass::TitlePattern => write!(f, "title pattern"),
            FilterPass::Keyword => write!(f, "keyword"),
        }
    }
}

/// The rule that excluded a post.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilterRule {
    pub pass: FilterPass,
    pub pattern: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterDecision {
    Include,
    Exclude(FilterRule),
}

impl FilterDecision {
    pub fn is_included(&self) -> bool {
        matches!(self, FilterDecision::Include)
    }
}

#[derive(Debug, Clone)]
pub struct ContentFilter {
    title_patterns: Vec<(String, Regex)>,
    /// Lower-cased at construction
    keywords: Vec<String>,
}

impl ContentFilter {
    pub fn from_config(config: &FilterConfig) -> Result<Self, FilterError> {
        let title_patterns = config
            .exclude_titles
            .iter()
            .map(|pattern| {
                RegexBuilder::new(pattern)
                    .case_insensitive(true)
                    .build()
                    .map(|re| (pattern.clone(), re))
                    .map_err(|source| FilterError::InvalidPattern {
                        pattern: pattern.clone(),
                        source,
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;

        let keywords = config
            .exclude_keywords
            .iter()
            .map(|k| k.to_lowercase())
            .filter(|k| !k.is_empty())
            .collect();

        Ok(Self {
            title_patterns,
            keywords,
        })
    }

    /// Decide whether a post is kept.
    ///
    /// Title patterns see only the title; keywords see
    /// `lower(title) + " " + lower(body)`.
    pub fn evaluate(&self, title: &str, body: &str) -> FilterDecision {
        if let Some((pattern, _)) = self.title_patterns.iter().find(|(_, re)| re.is_match(title)) {
            return FilterDecision::Exclude(FilterRule {
                pass: FilterPass::TitlePattern,
                pattern: pattern.clone(),
            });
        }

        let combined = format!("{} {}", title.to_lowercase(), body.to_lowercase());
        if let Some(keyword) = self.keywords.iter().find(|k| combined.contains(k.as_str())) {
            return FilterDecision::Exclude(FilterRule {
                pass: FilterPass::Keyword,
                pattern: keyword.clone(),
            });
        }

        FilterDecision::Include
    }
}
