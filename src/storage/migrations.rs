//! Versioned schema migrations.
//!
//! The schema version lives in a one-row `schema_version` table; a missing
//! table or row reads as version 0. [`STEPS`] maps each known starting
//! version to the step that leaves it. A step runs all of its operations and
//! the version write in one transaction, so a failure leaves both the schema
//! and the stored version as they were.
//!
//! Every operation is idempotent: DDL uses `IF NOT EXISTS` and column
//! additions consult `pragma_table_info` first. Because of that, the fresh
//! install step can reuse the same operation groups as the incremental
//! steps, which keeps `0 -> 3` and `1 -> 2 -> 3` structurally identical.
use super::schema::Database;
use super::types::{MigrationError, MigrationReport};

pub const CURRENT_SCHEMA_VERSION: i64 = 3;

/// One structural change.
#[derive(Debug, Clone, Copy)]
pub(crate) enum SchemaOp {
    Execute(&'static str),
    AddColumn {
        table: &'static str,
        column: &'static str,
        definition: &'static str,
    },
}

#[derive(Debug)]
pub(crate) struct MigrationStep {
    pub from: i64,
    pub to: i64,
    pub ops: &'static [&'static [SchemaOp]],
}

// ============================================================================
// Operation groups
// ============================================================================

/// The posts table as it existed at version 1, created only on fresh installs.
const POSTS_TABLE: &[SchemaOp] = &[SchemaOp::Execute(
    r#"
    CREATE TABLE IF NOT EXISTS posts (
        id TEXT PRIMARY KEY,
        text TEXT NOT NULL,
        created_at TEXT NOT NULL,
        sentiment_label TEXT NOT NULL,
        sentiment_score REAL NOT NULL,
        sentiment_scores TEXT NOT NULL,
        analyzed_at TEXT NOT NULL
    )
    "#,
)];

/// Version 2 post metadata. Column order matters for structural equality
/// between upgraded and freshly created databases.
const POSTS_METADATA: &[SchemaOp] = &[
    SchemaOp::AddColumn {
        table: "posts",
        column: "url",
        definition: "TEXT",
    },
    SchemaOp::AddColumn {
        table: "posts",
        column: "source",
        definition: "TEXT",
    },
    SchemaOp::AddColumn {
        table: "posts",
        column: "title",
        definition: "TEXT",
    },
    SchemaOp::AddColumn {
        table: "posts",
        column: "author",
        definition: "TEXT",
    },
    SchemaOp::AddColumn {
        table: "posts",
        column: "timezone",
        definition: "TEXT",
    },
    SchemaOp::AddColumn {
        table: "posts",
        column: "native_id",
        definition: "TEXT",
    },
    SchemaOp::Execute("CREATE INDEX IF NOT EXISTS idx_posts_created_at ON posts(created_at)"),
    SchemaOp::Execute(
        "CREATE INDEX IF NOT EXISTS idx_posts_sentiment_label ON posts(sentiment_label)",
    ),
    SchemaOp::Execute("CREATE INDEX IF NOT EXISTS idx_posts_source ON posts(source)"),
    SchemaOp::Execute("CREATE INDEX IF NOT EXISTS idx_posts_url ON posts(url)"),
    SchemaOp::Execute(
        "CREATE UNIQUE INDEX IF NOT EXISTS idx_posts_native_id ON posts(native_id)",
    ),
];

/// Version 2 reference data and junction tables.
const CLASSIFICATION_TABLES: &[SchemaOp] = &[
    SchemaOp::Execute(
        r#"
        CREATE TABLE IF NOT EXISTS sectors (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT UNIQUE NOT NULL
        )
        "#,
    ),
    SchemaOp::Execute(
        r#"
        CREATE TABLE IF NOT EXISTS industries (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT UNIQUE NOT NULL
        )
        "#,
    ),
    SchemaOp::Execute(
        r#"
        CREATE TABLE IF NOT EXISTS tickers (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            symbol TEXT UNIQUE NOT NULL,
            company_name TEXT,
            sector_id INTEGER REFERENCES sectors(id),
            industry_id INTEGER REFERENCES industries(id)
        )
        "#,
    ),
    SchemaOp::Execute("CREATE INDEX IF NOT EXISTS idx_tickers_symbol ON tickers(symbol)"),
    SchemaOp::Execute(
        r#"
        CREATE TABLE IF NOT EXISTS post_tickers (
            post_id TEXT NOT NULL REFERENCES posts(id) ON DELETE CASCADE,
            ticker_id INTEGER NOT NULL REFERENCES tickers(id) ON DELETE CASCADE,
            PRIMARY KEY (post_id, ticker_id)
        )
        "#,
    ),
    SchemaOp::Execute("CREATE INDEX IF NOT EXISTS idx_post_tickers_post ON post_tickers(post_id)"),
    SchemaOp::Execute(
        "CREATE INDEX IF NOT EXISTS idx_post_tickers_ticker ON post_tickers(ticker_id)",
    ),
    SchemaOp::Execute(
        r#"
        CREATE TABLE IF NOT EXISTS post_industries (
            post_id TEXT NOT NULL REFERENCES posts(id) ON DELETE CASCADE,
            industry_id INTEGER NOT NULL REFERENCES industries(id) ON DELETE CASCADE,
            PRIMARY KEY (post_id, industry_id)
        )
        "#,
    ),
    SchemaOp::Execute(
        "CREATE INDEX IF NOT EXISTS idx_post_industries_post ON post_industries(post_id)",
    ),
    SchemaOp::Execute(
        "CREATE INDEX IF NOT EXISTS idx_post_industries_industry ON post_industries(industry_id)",
    ),
    SchemaOp::Execute(
        r#"
        CREATE TABLE IF NOT EXISTS post_sectors (
            post_id TEXT NOT NULL REFERENCES posts(id) ON DELETE CASCADE,
            sector_id INTEGER NOT NULL REFERENCES sectors(id) ON DELETE CASCADE,
            PRIMARY KEY (post_id, sector_id)
        )
        "#,
    ),
    SchemaOp::Execute("CREATE INDEX IF NOT EXISTS idx_post_sectors_post ON post_sectors(post_id)"),
    SchemaOp::Execute(
        "CREATE INDEX IF NOT EXISTS idx_post_sectors_sector ON post_sectors(sector_id)",
    ),
];

/// Version 3 watchlists.
const WATCHLIST_TABLES: &[SchemaOp] = &[
    SchemaOp::Execute(
        r#"
        CREATE TABLE IF NOT EXISTS watchlists (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            name TEXT NOT NULL,
            created_at TEXT NOT NULL
        )
        "#,
    ),
    SchemaOp::Execute(
        r#"
        CREATE TABLE IF NOT EXISTS watchlist_tickers (
            watchlist_id INTEGER NOT NULL REFERENCES watchlists(id) ON DELETE CASCADE,
            ticker TEXT NOT NULL,
            added_at TEXT NOT NULL,
            PRIMARY KEY (watchlist_id, ticker)
        )
        "#,
    ),
    SchemaOp::Execute(
        "CREATE INDEX IF NOT EXISTS idx_watchlist_tickers_ticker ON watchlist_tickers(ticker)",
    ),
];

/// Known transitions, keyed by starting version.
///
/// The fresh install step also carries the column additions so that a
/// database holding version 1 tables without a version row still converges.
pub(crate) const STEPS: &[MigrationStep] = &[
    MigrationStep {
        from: 0,
        to: 3,
        ops: &[
            POSTS_TABLE,
            POSTS_METADATA,
            CLASSIFICATION_TABLES,
            WATCHLIST_TABLES,
        ],
    },
    MigrationStep {
        from: 1,
        to: 2,
        ops: &[POSTS_METADATA, CLASSIFICATION_TABLES],
    },
    MigrationStep {
        from: 2,
        to: 3,
        ops: &[WATCHLIST_TABLES],
    },
];

fn step_from(version: i64) -> Option<&'static MigrationStep> {
    STEPS.iter().find(|step| step.from == version)
}

async fn apply_op(conn: &mut sqlx::SqliteConnection, op: SchemaOp) -> Result<(), sqlx::Error> {
    match op {
        SchemaOp::Execute(sql) => {
            sqlx::query(sql).execute(&mut *conn).await?;
        }
        SchemaOp::AddColumn {
            table,
            column,
            definition,
        } => {
            let (present,): (i64,) =
                sqlx::query_as("SELECT COUNT(*) FROM pragma_table_info(?) WHERE name = ?")
                    .bind(table)
                    .bind(column)
                    .fetch_one(&mut *conn)
                    .await?;
            if present == 0 {
                let sql = format!("ALTER TABLE {} ADD COLUMN {} {}", table, column, definition);
                sqlx::query(&sql).execute(&mut *conn).await?;
            }
        }
    }
    Ok(())
}

async fn apply_step(
    conn: &mut sqlx::SqliteConnection,
    step: &MigrationStep,
) -> Result<(), sqlx::Error> {
    for op in step.ops.iter().flat_map(|group| group.iter()) {
        apply_op(&mut *conn, *op).await?;
    }

    sqlx::query("CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL)")
        .execute(&mut *conn)
        .await?;
    sqlx::query("DELETE FROM schema_version")
        .execute(&mut *conn)
        .await?;
    sqlx::query("INSERT INTO schema_version (version) VALUES (?)")
        .bind(step.to)
        .execute(&mut *conn)
        .await?;
    Ok(())
}

impl Database {
    /// Stored schema version, 0 when nothing has been recorded.
    pub async fn schema_version(&self) -> Result<i64, MigrationError> {
        let table: Option<(String,)> = sqlx::query_as(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name = 'schema_version'",
        )
        .fetch_optional(&self.pool)
        .await?;
        if table.is_none() {
            return Ok(0);
        }

        let version: Option<i64> = sqlx::query_scalar("SELECT MAX(version) FROM schema_version")
            .fetch_one(&self.pool)
            .await?;
        Ok(version.unwrap_or(0))
    }

    /// Bring the schema to [`CURRENT_SCHEMA_VERSION`].
    ///
    /// Safe to call repeatedly; at the current version it only reads the
    /// version row. Running it from several processes at once is not
    /// supported.
    pub async fn migrate(&self) -> Result<MigrationReport, MigrationError> {
        let start = self.schema_version().await?;
        let mut version = start;
        let mut steps_applied = 0;

        while version != CURRENT_SCHEMA_VERSION {
            let step = step_from(version).ok_or(MigrationError::UnknownVersion(version))?;
            tracing::info!(from = step.from, to = step.to, "Applying schema migration");

            let fail = |source: sqlx::Error| MigrationError::Step {
                from: step.from,
                to: step.to,
                source,
            };

            let mut tx = self.pool.begin().await.map_err(fail)?;
            match apply_step(&mut *tx, step).await {
                Ok(()) => tx.commit().await.map_err(fail)?,
                Err(e) => {
                    if let Err(rollback) = tx.rollback().await {
                        tracing::warn!(error = %rollback, "Rollback after failed migration failed");
                    }
                    return Err(fail(e));
                }
            }

            version = self.schema_version().await?;
            steps_applied += 1;
        }

        if steps_applied > 0 {
            tracing::info!(from = start, to = version, steps = steps_applied, "Schema up to date");
        }
        Ok(MigrationReport {
            from: start,
            to: version,
            steps_applied,
        })
    }
}
