use async_trait::async_trait;
use std::collections::BTreeSet;

use super::schema::Database;
use super::types::PostUpsert;
use crate::enrich::{Classification, Sentiment, TickerMetadata};
use crate::feed::NormalizedPost;

/// Persistence used by the ingestion pipeline.
///
/// Every write is idempotent: repeating it with the same arguments leaves
/// the store unchanged.
#[async_trait]
pub trait PostStore: Send + Sync {
    async fn upsert_post(
        &self,
        post: &NormalizedPost,
        sentiment: &Sentiment,
    ) -> anyhow::Result<PostUpsert>;

    async fn upsert_ticker_metadata(
        &self,
        symbol: &str,
        metadata: &TickerMetadata,
    ) -> anyhow::Result<()>;

    async fn link_post_to_tickers(
        &self,
        post_id: &str,
        symbols: &BTreeSet<String>,
    ) -> anyhow::Result<()>;

    async fn link_post_to_industries_and_sectors(
        &self,
        post_id: &str,
        classification: &Classification,
    ) -> anyhow::Result<()>;
}

#[async_trait]
impl PostStore for Database {
    async fn upsert_post(
        &self,
        post: &NormalizedPost,
        sentiment: &Sentiment,
    ) -> anyhow::Result<PostUpsert> {
        Database::upsert_post(self, post, sentiment).await
    }

    async fn upsert_ticker_metadata(
        &self,
        symbol: &str,
        metadata: &TickerMetadata,
    ) -> anyhow::Result<()> {
        Database::upsert_ticker_metadata(self, symbol, metadata).await
    }

    async fn link_post_to_tickers(
        &self,
        post_id: &str,
        symbols: &BTreeSet<String>,
    ) -> anyhow::Result<()> {
        Database::link_post_to_tickers(self, post_id, symbols).await?;
        Ok(())
    }

    async fn link_post_to_industries_and_sectors(
        &self,
        post_id: &str,
        classification: &Classification,
    ) -> anyhow::Result<()> {
        Database::link_post_to_industries_and_sectors(self, post_id, classification).await
    }
}
