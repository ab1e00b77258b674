mod migrations;
mod posts;
mod schema;
mod store;
mod tickers;
mod types;

pub use migrations::CURRENT_SCHEMA_VERSION;
pub use schema::Database;
pub use store::PostStore;
pub use types::{
    DatabaseError, MigrationError, MigrationReport, PostUpsert, StoredPost, TickerRecord,
};
