use thiserror::Error;

// ============================================================================
// Error Types
// ============================================================================

/// Database-specific errors with user-friendly messages
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Another process holds the database lock
    #[error("The database is locked by another process. Close it and try again.")]
    InstanceLocked,

    /// Migration failed
    #[error("Database migration failed: {0}")]
    Migration(#[from] MigrationError),

    /// Generic database error
    #[error("Database error: {0}")]
    Other(#[from] sqlx::Error),
}

impl DatabaseError {
    /// Check if a sqlx error indicates database locking
    pub(crate) fn from_sqlx(err: sqlx::Error) -> Self {
        if is_lock_message(&err.to_string()) {
            return DatabaseError::InstanceLocked;
        }
        DatabaseError::Other(err)
    }

    pub(crate) fn from_migration(err: MigrationError) -> Self {
        if is_lock_message(&err.to_string()) {
            return DatabaseError::InstanceLocked;
        }
        DatabaseError::Migration(err)
    }
}

// SQLITE_BUSY (5): database is locked
// SQLITE_LOCKED (6): database table is locked
// SQLITE_CANTOPEN (14): unable to open database file
fn is_lock_message(message: &str) -> bool {
    let message = message.to_lowercase();
    message.contains("database is locked")
        || message.contains("database table is locked")
        || message.contains("sqlite_busy")
        || message.contains("sqlite_locked")
        || message.contains("unable to open database file")
}

/// Schema migration failures. All of them are fatal at startup.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// The stored version has no step leading out of it
    #[error("Unknown schema version {0}")]
    UnknownVersion(i64),

    /// A step failed and its transaction was rolled back
    #[error("Migration {from} -> {to} failed: {source}")]
    Step {
        from: i64,
        to: i64,
        #[source]
        source: sqlx::Error,
    },

    /// Reading the stored version failed
    #[error("Could not read schema version: {0}")]
    Database(#[from] sqlx::Error),
}

// ============================================================================
// Reports & Rows
// ============================================================================

/// Outcome of [`Database::migrate`](super::Database::migrate).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MigrationReport {
    pub from: i64,
    pub to: i64,
    pub steps_applied: usize,
}

/// Result of an insert-or-ignore post write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PostUpsert {
    pub id: String,
    /// False when a post with this id already existed.
    pub inserted: bool,
}

/// A post as stored, including its sentiment columns.
#[derive(Debug, Clone, PartialEq, sqlx::FromRow)]
pub struct StoredPost {
    pub id: String,
    pub native_id: Option<String>,
    pub source: Option<String>,
    pub title: Option<String>,
    pub text: String,
    pub author: Option<String>,
    pub url: Option<String>,
    /// RFC 3339 with the original offset
    pub created_at: String,
    pub timezone: Option<String>,
    pub sentiment_label: String,
    pub sentiment_score: f64,
    /// JSON object of per-class scores
    pub sentiment_scores: String,
    pub analyzed_at: String,
}

/// A ticker row joined with its sector and industry names.
#[derive(Debug, Clone, PartialEq, Eq, sqlx::FromRow)]
pub struct TickerRecord {
    pub symbol: String,
    pub company_name: Option<String>,
    pub sector: Option<String>,
    pub industry: Option<String>,
}
