use chrono::{DateTime, FixedOffset, Utc};
use serde::Serialize;
use std::fmt;
use thiserror::Error;

use crate::enrich::Sentiment;
use crate::feed::NormalizedPost;

/// Enrichment or persistence step a post was in when it failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Sentiment,
    TickerExtraction,
    Classification,
    StorePost,
    TickerLookup,
    StoreTicker,
    LinkTickers,
    LinkClassification,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Sentiment => "sentiment analysis",
            Stage::TickerExtraction => "ticker extraction",
            Stage::Classification => "industry classification",
            Stage::StorePost => "post storage",
            Stage::TickerLookup => "ticker lookup",
            Stage::StoreTicker => "ticker storage",
            Stage::LinkTickers => "ticker linking",
            Stage::LinkClassification => "industry/sector linking",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum IngestError {
    /// Caller input rejected before any work was done
    #[error("Invalid request: {0}")]
    Validation(String),

    /// A collaborator failed; posts handled before this one stay persisted
    #[error("{stage} failed for post {post_id}: {source}")]
    Collaborator {
        stage: Stage,
        post_id: String,
        #[source]
        source: anyhow::Error,
    },
}

impl IngestError {
    pub(crate) fn collaborator(
        stage: Stage,
        post_id: &str,
        source: impl Into<anyhow::Error>,
    ) -> Self {
        IngestError::Collaborator {
            stage,
            post_id: post_id.to_string(),
            source: source.into(),
        }
    }
}

/// Inclusive time window, compared as UTC instants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

impl DateRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, IngestError> {
        if start > end {
            return Err(IngestError::Validation(format!(
                "start {} is after end {}",
                start.to_rfc3339(),
                end.to_rfc3339()
            )));
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> DateTime<Utc> {
        self.start
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.end
    }

    pub fn contains(&self, at: &DateTime<FixedOffset>) -> bool {
        let at = at.with_timezone(&Utc);
        self.start <= at && at <= self.end
    }
}

/// A stored post with everything derived from it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnrichedPost {
    #[serde(flatten)]
    pub post: NormalizedPost,
    pub sentiment: Sentiment,
    pub tickers: Vec<String>,
    pub industries: Vec<String>,
    pub sectors: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IngestReport {
    pub posts: Vec<EnrichedPost>,
    pub count: usize,
}

/// Parse a caller-supplied result cap.
///
/// Any integer is accepted (non-positive values mean "fetch nothing");
/// anything else is a validation error.
pub fn parse_result_cap(raw: &str) -> Result<i64, IngestError> {
    raw.trim().parse::<i64>().map_err(|_| {
        IngestError::Validation(format!("max_results must be an integer, got {:?}", raw))
    })
}
