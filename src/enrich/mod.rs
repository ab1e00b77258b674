//! Enrichment services applied to every post that survives filtering.
//!
//! The orchestrator only sees the three traits below. The built-in
//! implementations ([`LexiconSentiment`], [`CashtagExtractor`],
//! [`StaticClassifier`]) are small heuristics so the binary works without
//! external models; production deployments plug in their own.
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use thiserror::Error;

mod cashtag;
mod classifier;
mod lexicon;

pub use cashtag::CashtagExtractor;
pub use classifier::StaticClassifier;
pub use lexicon::LexiconSentiment;

/// Failure reported by an enrichment service.
#[derive(Debug, Error)]
#[error("{service}: {message}")]
pub struct ServiceError {
    pub service: &'static str,
    pub message: String,
}

impl ServiceError {
    pub fn new(service: &'static str, message: impl Into<String>) -> Self {
        Self {
            service,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SentimentLabel {
    Positive,
    Negative,
    Neutral,
}

impl SentimentLabel {
    pub fn as_str(&self) -> &'static str {
        match self {
            SentimentLabel::Positive => "positive",
            SentimentLabel::Negative => "negative",
            SentimentLabel::Neutral => "neutral",
        }
    }
}

impl fmt::Display for SentimentLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-class probabilities. They sum to 1 within rounding.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassScores {
    pub positive: f64,
    pub negative: f64,
    pub neutral: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sentiment {
    pub label: SentimentLabel,
    /// Probability of `label`, in `[0, 1]`.
    pub score: f64,
    pub scores: ClassScores,
}

impl Sentiment {
    /// Result reported for empty or whitespace-only text.
    pub fn neutral_default() -> Self {
        Self {
            label: SentimentLabel::Neutral,
            score: 0.0,
            scores: ClassScores {
                positive: 0.33,
                negative: 0.33,
                neutral: 0.34,
            },
        }
    }
}

/// Industries and sectors derived from a post's tickers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Classification {
    pub industries: BTreeSet<String>,
    pub sectors: BTreeSet<String>,
}

/// Reference data for one ticker symbol.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TickerMetadata {
    pub company: Option<String>,
    pub sector: Option<String>,
    pub industry: Option<String>,
}

pub trait SentimentService: Send + Sync {
    fn analyze(&self, text: &str) -> Result<Sentiment, ServiceError>;
}

pub trait TickerExtractionService: Send + Sync {
    /// Upper-case symbols mentioned in `text`.
    fn extract(&self, text: &str) -> Result<BTreeSet<String>, ServiceError>;
}

pub trait IndustryClassificationService: Send + Sync {
    fn classify_tickers(&self, symbols: &BTreeSet<String>) -> Result<Classification, ServiceError>;

    /// Metadata for one symbol, `None` when the symbol is unknown.
    fn lookup(&self, symbol: &str) -> Result<Option<TickerMetadata>, ServiceError>;
}
