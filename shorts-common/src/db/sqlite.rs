//! SQLite record store

use super::{evaluation_from_columns, RecordStore};
use crate::config::Backend;
use crate::models::{Evaluation, Item};
use crate::Result;
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Open (or create) the database file
    pub async fn connect(db_path: &Path) -> Result<Self> {
        let newly_created = !db_path.exists();

        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", db_path.display()))?
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(Duration::from_millis(5000));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        if newly_created {
            info!("Initialized new database: {}", db_path.display());
        } else {
            info!("Opened existing database: {}", db_path.display());
        }

        Ok(Self { pool })
    }

    /// Private in-memory database
    ///
    /// Pinned to a single connection that never expires, since every new
    /// connection to `:memory:` would see an empty database.
    pub async fn in_memory() -> Result<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?.foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl RecordStore for SqliteStore {
    fn backend(&self) -> Backend {
        Backend::Sqlite
    }

    async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS stories (
                reddit_id VARCHAR(255) PRIMARY KEY,
                subreddit VARCHAR(255) NOT NULL,
                content TEXT NOT NULL,
                created_utc INTEGER NOT NULL,
                flair VARCHAR(255)
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS stories_evaluations (
                reddit_id VARCHAR(255) PRIMARY KEY REFERENCES stories(reddit_id),
                score INTEGER NOT NULL,
                category VARCHAR(255) NOT NULL,
                target_audience VARCHAR(255) NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        // Recreated on every start so column changes propagate to the view
        sqlx::query("DROP VIEW IF EXISTS summary")
            .execute(&self.pool)
            .await?;
        sqlx::query(
            r#"
            CREATE VIEW summary AS
            SELECT
                s.reddit_id,
                s.subreddit,
                s.content,
                s.created_utc,
                s.flair,
                se.score,
                se.category,
                se.target_audience
            FROM stories s
            INNER JOIN stories_evaluations se ON s.reddit_id = se.reddit_id
            "#,
        )
        .execute(&self.pool)
        .await?;

        info!("Database tables and summary view created/verified");
        Ok(())
    }

    async fn insert_item_if_absent(&self, item: &Item) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO stories (reddit_id, subreddit, content, created_utc, flair)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(reddit_id) DO NOTHING
            "#,
        )
        .bind(&item.id)
        .bind(&item.community)
        .bind(&item.content)
        .bind(item.created_at)
        .bind(&item.tag)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn get_unevaluated_items(&self, limit: Option<u32>) -> Result<Vec<Item>> {
        // LIMIT -1 means unbounded in SQLite
        let limit = limit.filter(|n| *n > 0).map(i64::from).unwrap_or(-1);

        let rows = sqlx::query(
            r#"
            SELECT s.reddit_id, s.subreddit, s.content, s.created_utc, s.flair
            FROM stories s
            LEFT JOIN stories_evaluations se ON s.reddit_id = se.reddit_id
            WHERE se.reddit_id IS NULL
            ORDER BY s.created_utc DESC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        let items: Vec<Item> = rows
            .iter()
            .map(|row| Item {
                id: row.get("reddit_id"),
                community: row.get("subreddit"),
                content: row.get("content"),
                created_at: row.get("created_utc"),
                tag: row.get("flair"),
            })
            .collect();

        info!("Found {} unevaluated stories", items.len());
        Ok(items)
    }

    async fn merge_evaluations(&self, evaluations: &[Evaluation]) -> Result<u64> {
        if evaluations.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        let mut inserted = 0u64;

        for evaluation in evaluations {
            let result = sqlx::query(
                r#"
                INSERT INTO stories_evaluations (reddit_id, score, category, target_audience)
                VALUES (?, ?, ?, ?)
                ON CONFLICT(reddit_id) DO NOTHING
                "#,
            )
            .bind(&evaluation.item_id)
            .bind(evaluation.score)
            .bind(evaluation.category.as_str())
            .bind(evaluation.audience.as_str())
            .execute(&mut *tx)
            .await?;

            if result.rows_affected() == 0 {
                debug!(item_id = %evaluation.item_id, "Evaluation already stored, ignored");
            }
            inserted += result.rows_affected();
        }

        tx.commit().await?;
        Ok(inserted)
    }

    async fn get_evaluation(&self, item_id: &str) -> Result<Option<Evaluation>> {
        let row = sqlx::query(
            "SELECT reddit_id, score, category, target_audience FROM stories_evaluations WHERE reddit_id = ?",
        )
        .bind(item_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => {
                let category: String = row.get("category");
                let audience: String = row.get("target_audience");
                Ok(Some(evaluation_from_columns(
                    row.get("reddit_id"),
                    row.get("score"),
                    &category,
                    &audience,
                )?))
            }
            None => Ok(None),
        }
    }

    async fn count_items(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM stories")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }

    async fn count_evaluations(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM stories_evaluations")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}
