//! Fetch, parse, filter, enrich and persist one batch of posts.
//!
//! Sources are fetched one after another and fetching stops as soon as the
//! result cap is reached, so a small cap never costs a request per source.
//! A failing source is logged and skipped. Enrichment and persistence
//! failures are not: the first one aborts the rest of the batch, and posts
//! processed before it remain stored.
//!
//! With `ingest_timeout_secs` set, no source is started after the deadline
//! and a fetch still running at the deadline is cancelled. Whatever was
//! collected by then is enriched as usual.
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use std::time::Duration;

use crate::config::Config;
use crate::enrich::{
    IndustryClassificationService, SentimentService, ServiceError, TickerExtractionService,
};
use crate::feed::{
    clamp_result_cap, parse_feed, per_source_quota, ContentFilter, FeedFetcher, FeedSource,
    FilterDecision, FilterError, NormalizedPost,
};
use crate::storage::PostStore;

mod types;

pub use types::{parse_result_cap, DateRange, EnrichedPost, IngestError, IngestReport, Stage};

/// Services a batch is enriched and stored with.
#[derive(Clone)]
pub struct Collaborators {
    pub sentiment: Arc<dyn SentimentService>,
    pub tickers: Arc<dyn TickerExtractionService>,
    pub classifier: Arc<dyn IndustryClassificationService>,
    pub store: Arc<dyn PostStore>,
}

pub struct Ingestor {
    fetcher: FeedFetcher,
    filter: ContentFilter,
    sources: Vec<FeedSource>,
    default_query: String,
    max_results: usize,
    deadline: Option<Duration>,
    services: Collaborators,
}

impl Ingestor {
    pub fn new(
        config: &Config,
        fetcher: FeedFetcher,
        services: Collaborators,
    ) -> Result<Self, FilterError> {
        Ok(Self {
            fetcher,
            filter: ContentFilter::from_config(&config.filter)?,
            sources: config.feeds.sources(),
            default_query: config.feeds.default_query.clone(),
            max_results: config.feeds.max_results,
            deadline: config.feeds.ingest_timeout_secs.map(Duration::from_secs),
            services,
        })
    }

    pub fn sources(&self) -> &[FeedSource] {
        &self.sources
    }

    /// Run one ingestion batch.
    ///
    /// `query` falls back to the configured default when absent or blank.
    /// `result_cap` is clamped to `[0, max_results]`; 0 returns an empty
    /// report without any network traffic. When `range` is given, posts
    /// created outside it are dropped before enrichment.
    pub async fn ingest(
        &self,
        query: Option<&str>,
        result_cap: i64,
        range: Option<DateRange>,
    ) -> Result<IngestReport, IngestError> {
        let cap = clamp_result_cap(result_cap, self.max_results);
        if cap == 0 {
            tracing::debug!(requested = result_cap, "Result cap is zero, nothing to fetch");
            return Ok(IngestReport::default());
        }

        let query = query
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .unwrap_or(self.default_query.as_str());
        let quota = per_source_quota(cap, self.sources.len());

        let mut candidates = self.collect(query, cap, quota).await;
        if let Some(range) = range {
            let before = candidates.len();
            candidates.retain(|post| range.contains(&post.created_at));
            tracing::debug!(
                dropped = before - candidates.len(),
                start = %range.start(),
                end = %range.end(),
                "Applied date range"
            );
        }

        let mut seen_tickers = HashSet::new();
        let mut posts = Vec::with_capacity(candidates.len());
        for post in candidates {
            posts.push(self.enrich_and_store(post, &mut seen_tickers).await?);
        }

        tracing::info!(query = %query, cap = cap, count = posts.len(), "Ingestion finished");
        Ok(IngestReport {
            count: posts.len(),
            posts,
        })
    }

    /// Fetch, parse and filter sources in order until `cap` posts are kept.
    async fn collect(&self, query: &str, cap: usize, quota: usize) -> Vec<NormalizedPost> {
        let started = tokio::time::Instant::now();
        let mut kept: Vec<NormalizedPost> = Vec::new();
        let mut ids = HashSet::new();

        for source in &self.sources {
            if kept.len() >= cap {
                break;
            }

            let fetch = self.fetcher.fetch(source, query, quota);
            let result = match self.deadline {
                Some(limit) => {
                    let remaining = limit.saturating_sub(started.elapsed());
                    if remaining.is_zero() {
                        tracing::warn!(
                            source = %source.name,
                            "Ingestion deadline reached, skipping remaining sources"
                        );
                        break;
                    }
                    match tokio::time::timeout(remaining, fetch).await {
                        Ok(result) => result,
                        Err(_) => {
                            tracing::warn!(
                                source = %source.name,
                                "Ingestion deadline reached during fetch, cancelling it"
                            );
                            break;
                        }
                    }
                }
                None => fetch.await,
            };

            let bytes = match result {
                Ok(bytes) => bytes,
                Err(e) => {
                    tracing::warn!(source = %source.name, error = %e, "Skipping source");
                    continue;
                }
            };

            let parsed = parse_feed(&bytes, &source.name);
            let total = parsed.len();
            let mut excluded = 0;
            for post in parsed {
                if kept.len() >= cap {
                    break;
                }
                match self.filter.evaluate(&post.title, &post.text) {
                    FilterDecision::Include => {
                        if ids.insert(post.id.clone()) {
                            kept.push(post);
                        } else {
                            tracing::debug!(post_id = %post.id, "Duplicate post in batch");
                        }
                    }
                    FilterDecision::Exclude(rule) => {
                        excluded += 1;
                        tracing::debug!(
                            post_id = %post.id,
                            pass = %rule.pass,
                            pattern = %rule.pattern,
                            "Excluded post"
                        );
                    }
                }
            }
            tracing::debug!(
                source = %source.name,
                entries = total,
                excluded = excluded,
                kept = kept.len(),
                "Processed source"
            );
        }

        kept
    }

    async fn enrich_and_store(
        &self,
        post: NormalizedPost,
        seen_tickers: &mut HashSet<String>,
    ) -> Result<EnrichedPost, IngestError> {
        let services = &self.services;
        let fail = |stage: Stage| {
            let post_id = post.id.clone();
            move |e: ServiceError| IngestError::collaborator(stage, &post_id, e)
        };

        let sentiment = services
            .sentiment
            .analyze(&post.text)
            .map_err(fail(Stage::Sentiment))?;
        let symbols: BTreeSet<String> = services
            .tickers
            .extract(&post.text)
            .map_err(fail(Stage::TickerExtraction))?;
        let classification = services
            .classifier
            .classify_tickers(&symbols)
            .map_err(fail(Stage::Classification))?;

        let stored = services
            .store
            .upsert_post(&post, &sentiment)
            .await
            .map_err(|e| IngestError::collaborator(Stage::StorePost, &post.id, e))?;
        if !stored.inserted {
            tracing::debug!(post_id = %stored.id, "Post already stored");
        }

        for symbol in &symbols {
            if !seen_tickers.insert(symbol.clone()) {
                continue;
            }
            match services
                .classifier
                .lookup(symbol)
                .map_err(fail(Stage::TickerLookup))?
            {
                Some(metadata) => services
                    .store
                    .upsert_ticker_metadata(symbol, &metadata)
                    .await
                    .map_err(|e| IngestError::collaborator(Stage::StoreTicker, &post.id, e))?,
                None => tracing::debug!(symbol = %symbol, "No metadata for ticker"),
            }
        }

        services
            .store
            .link_post_to_tickers(&stored.id, &symbols)
            .await
            .map_err(|e| IngestError::collaborator(Stage::LinkTickers, &post.id, e))?;
        services
            .store
            .link_post_to_industries_and_sectors(&stored.id, &classification)
            .await
            .map_err(|e| IngestError::collaborator(Stage::LinkClassification, &post.id, e))?;

        Ok(EnrichedPost {
            post,
            sentiment,
            tickers: symbols.into_iter().collect(),
            industries: classification.industries.into_iter().collect(),
            sectors: classification.sectors.into_iter().collect(),
        })
    }
}
