use regex::Regex;
use std::collections::BTreeSet;
use std::sync::OnceLock;

use super::{ServiceError, TickerExtractionService};

fn cashtag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$([A-Za-z]{1,5})\b").unwrap())
}

fn bare_symbol_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b[A-Z]{1,5}\b").unwrap())
}

/// Finds `$SYM` cashtags, plus bare upper-case words that are known symbols.
///
/// Bare matching is restricted to the known set because plain capitals
/// ("CEO", "IPO", "I") are far more common than real tickers.
#[derive(Debug, Clone, Default)]
pub struct CashtagExtractor {
    known: BTreeSet<String>,
}

impl CashtagExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_known_symbols<I, S>(symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            known: symbols
                .into_iter()
                .map(|s| s.as_ref().to_uppercase())
                .collect(),
        }
    }
}

impl TickerExtractionService for CashtagExtractor {
    fn extract(&self, text: &str) -> Result<BTreeSet<String>, ServiceError> {
        let mut symbols: BTreeSet<String> = cashtag_re()
            .captures_iter(text)
            .map(|c| c[1].to_uppercase())
            .collect();

        symbols.extend(
            bare_symbol_re()
                .find_iter(text)
                .map(|m| m.as_str())
                .filter(|s| self.known.contains(*s))
                .map(str::to_string),
        );

        Ok(symbols)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_cashtags_uppercased_and_deduplicated() {
        let extractor = CashtagExtractor::new();
        let symbols = extractor
            .extract("Loading up on $tsla and $TSLA, maybe $nvda too")
            .unwrap();
        assert_eq!(symbols, set(&["NVDA", "TSLA"]));
    }

    #[test]
    fn test_bare_symbols_need_to_be_known() {
        let extractor = CashtagExtractor::with_known_symbols(["aapl"]);
        let symbols = extractor
            .extract("AAPL earnings beat; CEO says IPO pipeline is strong")
            .unwrap();
        assert_eq!(symbols, set(&["AAPL"]));
    }

    #[test]
    fn test_lowercase_bare_words_ignored() {
        let extractor = CashtagExtractor::with_known_symbols(["AAPL"]);
        assert!(extractor.extract("an aapl a day").unwrap().is_empty());
    }

    #[test]
    fn test_long_cashtag_rejected() {
        let extractor = CashtagExtractor::new();
        assert!(extractor.extract("$TOOLONG").unwrap().is_empty());
        assert!(extractor.extract("costs $100").unwrap().is_empty());
    }
}
