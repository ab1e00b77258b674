//! Feed stages of the ingestion pipeline.
//!
//! Everything here except the fetcher is pure and independently testable:
//!
//! - **Quota**: split a global result cap into a per-source fetch limit
//! - **Fetching**: one bounded HTTP request per source with retry on transient failures
//! - **Parsing**: turn an Atom document into normalized posts with stable ids
//! - **Filtering**: ordered, short-circuiting exclusion rules
//!
//! # Architecture
//!
//! - [`quota`] - Per-source quota allocation
//! - [`fetcher`] - HTTP retrieval via `reqwest`
//! - [`parser`] - Streaming Atom parsing via `quick-xml`
//! - [`filter`] - Title-pattern and keyword exclusion passes
//!
//! # Example
//!
//! ```ignore
//! use tickerpulse::feed::{parse_feed, per_source_quota, ContentFilter};
//!
//! let quota = per_source_quota(10, sources.len());
//! let bytes = fetcher.fetch(&sources[0], "earnings", quota).await?;
//! let kept: Vec<_> = parse_feed(&bytes, &sources[0].name)
//!     .into_iter()
//!     .filter(|p| filter.evaluate(&p.title, &p.text).is_included())
//!     .collect();
//! ```

pub mod fetcher;
pub mod filter;
pub mod parser;
pub mod quota;
mod types;

pub use fetcher::{FeedFetcher, FetchError};
pub use filter::{ContentFilter, FilterDecision, FilterError, FilterPass, FilterRule};
pub use parser::{parse_feed, parse_feed_at, ParseError, NO_CONTENT, POST_ID_NAMESPACE};
pub use quota::{clamp_result_cap, per_source_quota, MAX_PER_SOURCE_QUOTA};
pub use types::{FeedSource, NormalizedPost, RawFeedEntry};
