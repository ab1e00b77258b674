use chrono::{DateTime, FixedOffset};
use serde::Serialize;

/// A configured feed origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedSource {
    /// Subreddit name, also recorded on every post from this source.
    pub name: String,
    /// Search path with the source name already substituted.
    pub search_path: String,
}

impl FeedSource {
    /// Build a source from its name and a path template containing `{source}`.
    pub fn new(name: &str, search_path_template: &str) -> Self {
        Self {
            name: name.to_string(),
            search_path: search_path_template.replace("{source}", name),
        }
    }
}

/// One `<entry>` as it appears in the feed, before normalization.
///
/// Text fields are XML-unescaped but otherwise untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawFeedEntry {
    pub title: Option<String>,
    pub summary: Option<String>,
    pub link: Option<String>,
    pub author: Option<String>,
    pub native_id: Option<String>,
    pub published: Option<String>,
    pub updated: Option<String>,
}

/// A post ready for filtering and enrichment.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedPost {
    /// Namespaced id, stable across parses of the same entry.
    pub id: String,
    /// `id` without the namespace tag.
    #[serde(skip)]
    pub native_id: String,
    pub source: String,
    pub title: String,
    /// Title and summary joined by a blank line.
    pub text: String,
    pub author: String,
    pub url: String,
    /// Timestamp with the offset the feed reported (UTC when it had none).
    pub created_at: DateTime<FixedOffset>,
    /// `"UTC"` or `"UTC±HH:MM"`.
    pub timezone: String,
}
