use std::collections::HashMap;
use std::sync::OnceLock;

use super::{ClassScores, Sentiment, SentimentLabel, SentimentService, ServiceError};

/// Market vocabulary with polarity +1 / -1.
const WORDS: &[(&str, i8)] = &[
    ("beat", 1),
    ("beats", 1),
    ("bull", 1),
    ("bullish", 1),
    ("buy", 1),
    ("gain", 1),
    ("gains", 1),
    ("growth", 1),
    ("higher", 1),
    ("moon", 1),
    ("outperform", 1),
    ("profit", 1),
    ("rally", 1),
    ("record", 1),
    ("strong", 1),
    ("surge", 1),
    ("up", 1),
    ("upgrade", 1),
    ("bear", -1),
    ("bearish", -1),
    ("crash", -1),
    ("cut", -1),
    ("decline", -1),
    ("down", -1),
    ("downgrade", -1),
    ("drop", -1),
    ("fall", -1),
    ("loss", -1),
    ("losses", -1),
    ("lower", -1),
    ("miss", -1),
    ("misses", -1),
    ("plunge", -1),
    ("sell", -1),
    ("weak", -1),
];

/// How many preceding tokens a negator reaches.
const NEGATION_WINDOW: usize = 3;

fn lexicon() -> &'static HashMap<&'static str, i8> {
    static LEXICON: OnceLock<HashMap<&'static str, i8>> = OnceLock::new();
    LEXICON.get_or_init(|| WORDS.iter().copied().collect())
}

fn is_negator(token: &str) -> bool {
    matches!(
        token,
        "not" | "no" | "never" | "isn't" | "wasn't" | "aren't" | "won't" | "can't" | "cannot"
            | "without"
    )
}

fn tokenize(text: &str) -> Vec<String> {
    text.split(|c: char| !(c.is_alphanumeric() || c == '\''))
        .map(|t| t.trim_matches('\''))
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
        .collect()
}

/// Word-list sentiment scorer with short-range negation.
///
/// Each lexicon hit counts once toward its polarity, inverted when a
/// negator appears within the previous three tokens. With `p` positive and
/// `n` negative hits the class scores are `p/(p+n+1)`, `n/(p+n+1)` and
/// `1/(p+n+1)`; ties go to neutral. `score` is the probability of the
/// chosen label.
#[derive(Debug, Clone, Default)]
pub struct LexiconSentiment;

impl LexiconSentiment {
    pub fn new() -> Self {
        Self
    }

    fn counts(&self, text: &str) -> (u32, u32) {
        let tokens = tokenize(text);
        let mut positive = 0;
        let mut negative = 0;
        for (i, token) in tokens.iter().enumerate() {
            let Some(&polarity) = lexicon().get(token.as_str()) else {
                continue;
            };
            let negated =
                (1..=NEGATION_WINDOW).any(|k| i >= k && is_negator(tokens[i - k].as_str()));
            if (polarity > 0) != negated {
                positive += 1;
            } else {
                negative += 1;
            }
        }
        (positive, negative)
    }
}

impl SentimentService for LexiconSentiment {
    fn analyze(&self, text: &str) -> Result<Sentiment, ServiceError> {
        if text.trim().is_empty() {
            return Ok(Sentiment::neutral_default());
        }

        let (p, n) = self.counts(text);
        let total = f64::from(p + n + 1);
        let scores = ClassScores {
            positive: f64::from(p) / total,
            negative: f64::from(n) / total,
            neutral: 1.0 / total,
        };

        let label = if scores.positive > scores.negative && scores.positive > scores.neutral {
            SentimentLabel::Positive
        } else if scores.negative > scores.positive && scores.negative > scores.neutral {
            SentimentLabel::Negative
        } else {
            SentimentLabel::Neutral
        };

        let score = match label {
            SentimentLabel::Positive => scores.positive,
            SentimentLabel::Negative => scores.negative,
            SentimentLabel::Neutral => scores.neutral,
        };

        Ok(Sentiment {
            label,
            score,
            scores,
        })
    }
}
