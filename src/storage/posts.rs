use anyhow::Result;

use super::schema::Database;
use super::types::{PostUpsert, StoredPost};
use crate::enrich::Sentiment;
use crate::feed::NormalizedPost;

impl Database {
    // ========================================================================
    // Post Operations
    // ========================================================================

    /// Insert a post with its sentiment unless a post with the same id exists.
    ///
    /// Existing rows are never touched, so re-ingesting a post keeps the
    /// sentiment recorded the first time it was seen.
    pub async fn upsert_post(
        &self,
        post: &NormalizedPost,
        sentiment: &Sentiment,
    ) -> Result<PostUpsert> {
        let scores = serde_json::to_string(&sentiment.scores)?;
        let analyzed_at = chrono::Utc::now().to_rfc3339();

        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO posts (
                id, native_id, url, source, title, text, author, created_at, timezone,
                sentiment_label, sentiment_score, sentiment_scores, analyzed_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&post.id)
        .bind(&post.native_id)
        .bind(&post.url)
        .bind(&post.source)
        .bind(&post.title)
        .bind(&post.text)
        .bind(&post.author)
        .bind(post.created_at.to_rfc3339())
        .bind(&post.timezone)
        .bind(sentiment.label.as_str())
        .bind(sentiment.score)
        .bind(scores)
        .bind(analyzed_at)
        .execute(&self.pool)
        .await?;

        Ok(PostUpsert {
            id: post.id.clone(),
            inserted: result.rows_affected() > 0,
        })
    }

    pub async fn get_post(&self, id: &str) -> Result<Option<StoredPost>> {
        let post = sqlx::query_as::<_, StoredPost>(
            r#"
            SELECT id, native_id, source, title, text, author, url, created_at, timezone,
                   sentiment_label, sentiment_score, sentiment_scores, analyzed_at
            FROM posts
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(post)
    }

    pub async fn count_posts(&self) -> Result<i64> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM posts")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.0)
    }

    /// Ticker symbols linked to a post, sorted.
    pub async fn tickers_for_post(&self, post_id: &str) -> Result<Vec<String>> {
        let symbols: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT t.symbol
            FROM post_tickers pt
            JOIN tickers t ON t.id = pt.ticker_id
            WHERE pt.post_id = ?
            ORDER BY t.symbol
            "#,
        )
        .bind(post_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(symbols)
    }

    pub async fn industries_for_post(&self, post_id: &str) -> Result<Vec<String>> {
        let names: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT i.name
            FROM post_industries pi
            JOIN industries i ON i.id = pi.industry_id
            WHERE pi.post_id = ?
            ORDER BY i.name
            "#,
        )
        .bind(post_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(names)
    }

    pub async fn sectors_for_post(&self, post_id: &str) -> Result<Vec<String>> {
        let names: Vec<String> = sqlx::query_scalar(
            r#"
            SELECT s.name
            FROM post_sectors ps
            JOIN sectors s ON s.id = ps.sector_id
            WHERE ps.post_id = ?
            ORDER BY s.name
            "#,
        )
        .bind(post_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(names)
    }
}
