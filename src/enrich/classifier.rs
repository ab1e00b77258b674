use std::collections::{BTreeMap, BTreeSet};

use super::{Classification, IndustryClassificationService, ServiceError, TickerMetadata};

/// (symbol, company, sector, industry)
const BUILTIN_TABLE: &[(&str, &str, &str, &str)] = &[
    ("AAPL", "Apple Inc.", "Technology", "Consumer Electronics"),
    ("MSFT", "Microsoft Corporation", "Technology", "Software"),
    ("NVDA", "NVIDIA Corporation", "Technology", "Semiconductors"),
    ("AMZN", "Amazon.com, Inc.", "Consumer Cyclical", "Internet Retail"),
    ("GOOGL", "Alphabet Inc.", "Communication Services", "Internet Content"),
    ("META", "Meta Platforms, Inc.", "Communication Services", "Internet Content"),
    ("TSLA", "Tesla, Inc.", "Consumer Cyclical", "Auto Manufacturers"),
    ("JPM", "JPMorgan Chase & Co.", "Financial Services", "Banks"),
    ("XOM", "Exxon Mobil Corporation", "Energy", "Oil & Gas"),
    ("JNJ", "Johnson & Johnson", "Healthcare", "Drug Manufacturers"),
];

/// Classifier backed by a fixed symbol table.
#[derive(Debug, Clone)]
pub struct StaticClassifier {
    table: BTreeMap<String, TickerMetadata>,
}

impl StaticClassifier {
    /// Use `table` when it has entries, otherwise the built-in table.
    /// Keys are upper-cased.
    pub fn from_table(table: &BTreeMap<String, TickerMetadata>) -> Self {
        if table.is_empty() {
            return Self::default();
        }
        Self {
            table: table
                .iter()
                .map(|(symbol, meta)| (symbol.to_uppercase(), meta.clone()))
                .collect(),
        }
    }

    pub fn symbols(&self) -> impl Iterator<Item = &str> {
        self.table.keys().map(String::as_str)
    }
}

impl Default for StaticClassifier {
    fn default() -> Self {
        let table = BUILTIN_TABLE
            .iter()
            .map(|(symbol, company, sector, industry)| {
                (
                    symbol.to_string(),
                    TickerMetadata {
                        company: Some(company.to_string()),
                        sector: Some(sector.to_string()),
                        industry: Some(industry.to_string()),
                    },
                )
            })
            .collect();
        Self { table }
    }
}

impl IndustryClassificationService for StaticClassifier {
    fn classify_tickers(&self, symbols: &BTreeSet<String>) -> Result<Classification, ServiceError> {
        let mut classification = Classification::default();
        for meta in symbols.iter().filter_map(|s| self.table.get(s)) {
            if let Some(industry) = &meta.industry {
                classification.industries.insert(industry.clone());
            }
            if let Some(sector) = &meta.sector {
                classification.sectors.insert(sector.clone());
            }
        }
        Ok(classification)
    }

    fn lookup(&self, symbol: &str) -> Result<Option<TickerMetadata>, ServiceError> {
        Ok(self.table.get(symbol).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_builtin_table_used_when_config_empty() {
        let classifier = StaticClassifier::from_table(&BTreeMap::new());
        assert_eq!(classifier.symbols().count(), BUILTIN_TABLE.len());
        let apple = classifier.lookup("AAPL").unwrap().unwrap();
        assert_eq!(apple.sector.as_deref(), Some("Technology"));
    }

    #[test]
    fn test_configured_table_replaces_builtin() {
        let mut table = BTreeMap::new();
        table.insert(
            "shop".to_string(),
            TickerMetadata {
                company: Some("Shopify".to_string()),
                sector: None,
                industry: Some("Software".to_string()),
            },
        );
        let classifier = StaticClassifier::from_table(&table);
        assert!(classifier.lookup("AAPL").unwrap().is_none());
        assert!(classifier.lookup("SHOP").unwrap().is_some());
    }

    #[test]
    fn test_classify_merges_and_skips_unknown() {
        let classifier = StaticClassifier::default();
        let result = classifier
            .classify_tickers(&set(&["AAPL", "MSFT", "GME"]))
            .unwrap();
        assert_eq!(
            result,
            Classification {
                industries: set(&["Consumer Electronics", "Software"]),
                sectors: set(&["Technology"]),
            }
        );
    }

    #[test]
    fn test_classify_empty_set() {
        let classifier = StaticClassifier::default();
        assert_eq!(
            classifier.classify_tickers(&BTreeSet::new()).unwrap(),
            Classification::default()
        );
    }
}
