use anyhow::Result;
use sqlx::SqliteConnection;
use std::collections::BTreeSet;

use super::schema::Database;
use super::types::TickerRecord;
use crate::enrich::{Classification, TickerMetadata};

/// Name-keyed lookup tables.
#[derive(Debug, Clone, Copy)]
enum NamedTable {
    Sectors,
    Industries,
}

impl NamedTable {
    fn as_str(self) -> &'static str {
        match self {
            NamedTable::Sectors => "sectors",
            NamedTable::Industries => "industries",
        }
    }
}

/// Id of the row named `name`, inserting it first if needed.
async fn named_id(conn: &mut SqliteConnection, table: NamedTable, name: &str) -> Result<i64> {
    sqlx::query(&format!(
        "INSERT OR IGNORE INTO {} (name) VALUES (?)",
        table.as_str()
    ))
    .bind(name)
    .execute(&mut *conn)
    .await?;
    let id: i64 = sqlx::query_scalar(&format!("SELECT id FROM {} WHERE name = ?", table.as_str()))
        .bind(name)
        .fetch_one(&mut *conn)
        .await?;
    Ok(id)
}

async fn ticker_id(conn: &mut SqliteConnection, symbol: &str) -> Result<i64> {
    sqlx::query("INSERT OR IGNORE INTO tickers (symbol) VALUES (?)")
        .bind(symbol)
        .execute(&mut *conn)
        .await?;
    let id: i64 = sqlx::query_scalar("SELECT id FROM tickers WHERE symbol = ?")
        .bind(symbol)
        .fetch_one(&mut *conn)
        .await?;
    Ok(id)
}

impl Database {
    // ========================================================================
    // Ticker Operations
    // ========================================================================

    /// Record company, sector and industry for a symbol.
    ///
    /// Fields missing from `metadata` keep whatever was stored before.
    pub async fn upsert_ticker_metadata(
        &self,
        symbol: &str,
        metadata: &TickerMetadata,
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let sector_id = match metadata.sector.as_deref() {
            Some(name) => Some(named_id(&mut *tx, NamedTable::Sectors, name).await?),
            None => None,
        };
        let industry_id = match metadata.industry.as_deref() {
            Some(name) => Some(named_id(&mut *tx, NamedTable::Industries, name).await?),
            None => None,
        };

        sqlx::query(
            r#"
            INSERT INTO tickers (symbol, company_name, sector_id, industry_id)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(symbol) DO UPDATE SET
                company_name = COALESCE(excluded.company_name, tickers.company_name),
                sector_id = COALESCE(excluded.sector_id, tickers.sector_id),
                industry_id = COALESCE(excluded.industry_id, tickers.industry_id)
            "#,
        )
        .bind(symbol)
        .bind(metadata.company.as_deref())
        .bind(sector_id)
        .bind(industry_id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    /// Link a post to each symbol, creating bare ticker rows for symbols
    /// without metadata. Returns the number of new links.
    pub async fn link_post_to_tickers(
        &self,
        post_id: &str,
        symbols: &BTreeSet<String>,
    ) -> Result<usize> {
        if symbols.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        let mut linked = 0;
        for symbol in symbols {
            let id = ticker_id(&mut *tx, symbol).await?;
            let result =
                sqlx::query("INSERT OR IGNORE INTO post_tickers (post_id, ticker_id) VALUES (?, ?)")
                    .bind(post_id)
                    .bind(id)
                    .execute(&mut *tx)
                    .await?;
            linked += result.rows_affected() as usize;
        }
        tx.commit().await?;
        Ok(linked)
    }

    /// Link a post to the industries and sectors derived from its tickers.
    pub async fn link_post_to_industries_and_sectors(
        &self,
        post_id: &str,
        classification: &Classification,
    ) -> Result<()> {
        if classification.industries.is_empty() && classification.sectors.is_empty() {
            return Ok(());
        }

        let mut tx = self.pool.begin().await?;
        for name in &classification.industries {
            let id = named_id(&mut *tx, NamedTable::Industries, name).await?;
            sqlx::query(
                "INSERT OR IGNORE INTO post_industries (post_id, industry_id) VALUES (?, ?)",
            )
            .bind(post_id)
            .bind(id)
            .execute(&mut *tx)
            .await?;
        }
        for name in &classification.sectors {
            let id = named_id(&mut *tx, NamedTable::Sectors, name).await?;
            sqlx::query("INSERT OR IGNORE INTO post_sectors (post_id, sector_id) VALUES (?, ?)")
                .bind(post_id)
                .bind(id)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn get_ticker(&self, symbol: &str) -> Result<Option<TickerRecord>> {
        let record = sqlx::query_as::<_, TickerRecord>(
            r#"
            SELECT t.symbol, t.company_name, s.name AS sector, i.name AS industry
            FROM tickers t
            LEFT JOIN sectors s ON s.id = t.sector_id
            LEFT JOIN industries i ON i.id = t.industry_id
            WHERE t.symbol = ?
            "#,
        )
        .bind(symbol)
        .fetch_optional(&self.pool)
        .await?;
        Ok(record)
    }
}
