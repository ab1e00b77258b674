//! Finance post ingestion: subreddit search feeds in, enriched posts out.
//!
//! The pipeline is split into pure stages under [`feed`] (quota, parsing,
//! filtering), pluggable enrichment services under [`enrich`], the SQLite
//! store and its schema migrator under [`storage`], and the side-effecting
//! orchestration step in [`ingest`].

pub mod config;
pub mod enrich;
pub mod feed;
pub mod ingest;
pub mod storage;
