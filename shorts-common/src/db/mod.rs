//! Record store capability
//!
//! Two keyed tables, `stories` and `stories_evaluations`, plus a read-only
//! `summary` view joining them. Backends differ only in connection setup,
//! column types and placeholder syntax; callers hold a `Box<dyn RecordStore>`
//! chosen by [`open_store`].

pub mod postgres;
pub mod sqlite;

pub use postgres::PostgresStore;
pub use sqlite::SqliteStore;

use crate::config::{Backend, DatabaseConfig};
use crate::models::{Evaluation, Item};
use crate::{Error, Result};
use async_trait::async_trait;
use tracing::info;

/// Durable keyed storage for stories and their evaluations
#[async_trait]
pub trait RecordStore: Send + Sync {
    fn backend(&self) -> Backend;

    /// Create tables and the summary view if they do not exist (idempotent)
    async fn init_schema(&self) -> Result<()>;

    /// Insert a story unless its id is already stored
    ///
    /// Returns `true` when the row was newly inserted.
    async fn insert_item_if_absent(&self, item: &Item) -> Result<bool>;

    /// Stories without an evaluation, most recent first
    ///
    /// `None` and `Some(0)` both mean no limit.
    async fn get_unevaluated_items(&self, limit: Option<u32>) -> Result<Vec<Item>>;

    /// Insert evaluations, ignoring ids that already have one
    ///
    /// Returns the number of rows newly inserted. Runs in one transaction:
    /// either every non-duplicate row lands or none does.
    async fn merge_evaluations(&self, evaluations: &[Evaluation]) -> Result<u64>;

    async fn get_evaluation(&self, item_id: &str) -> Result<Option<Evaluation>>;

    async fn count_items(&self) -> Result<u64>;

    async fn count_evaluations(&self) -> Result<u64>;

    async fn close(&self);
}

/// Connect to the configured backend and make sure the schema exists
pub async fn open_store(config: &DatabaseConfig) -> Result<Box<dyn RecordStore>> {
    let store: Box<dyn RecordStore> = match config.backend {
        Backend::Sqlite => Box::new(SqliteStore::connect(&config.path).await?),
        Backend::Postgres => {
            let url = config.url.as_deref().ok_or_else(|| {
                Error::Config("PostgreSQL requires a connection string (database.url or DB_STRING)".to_string())
            })?;
            Box::new(PostgresStore::connect(url).await?)
        }
    };

    store.init_schema().await?;
    info!("Record store ready ({:?})", store.backend());
    Ok(store)
}

/// Build an [`Evaluation`] from stored column values
pub(crate) fn evaluation_from_columns(
    item_id: String,
    score: i64,
    category: &str,
    audience: &str,
) -> Result<Evaluation> {
    Ok(Evaluation {
        item_id,
        score,
        category: category.parse()?,
        audience: audience.parse()?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[tokio::test]
    async fn test_open_store_postgres_without_url_fails() {
        let config = DatabaseConfig {
            backend: Backend::Postgres,
            path: PathBuf::from("unused.db"),
            url: None,
        };
        let result = open_store(&config).await;
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_open_store_sqlite_creates_schema() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = DatabaseConfig {
            backend: Backend::Sqlite,
            path: dir.path().join("nested").join("stories.db"),
            url: None,
        };

        let store = open_store(&config).await.unwrap();
        assert_eq!(store.backend(), Backend::Sqlite);
        assert_eq!(store.count_items().await.unwrap(), 0);
        store.close().await;
        assert!(config.path.exists());
    }
}
