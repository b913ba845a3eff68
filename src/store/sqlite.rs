//! SQLite persistence backend.
//!
//! One row per stored configuration. Executor references and quality gates
//! are kept as JSON text columns; the schema is created on connect.

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use super::{ConfigurationPersistence, StoredConfiguration};
use crate::analyzer::TaskSignature;
use crate::error::StoreError;
use crate::patterns::CompositionPattern;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS stored_configurations (
        id TEXT PRIMARY KEY,
        task_signature TEXT NOT NULL,
        executors TEXT NOT NULL,
        pattern TEXT NOT NULL,
        quality_gates TEXT NOT NULL,
        usage_count INTEGER NOT NULL DEFAULT 0,
        success_count INTEGER NOT NULL DEFAULT 0,
        average_quality REAL NOT NULL DEFAULT 0,
        created_at TEXT NOT NULL,
        last_used TEXT NOT NULL,
        CHECK (success_count <= usage_count)
    )
    "#,
    r#"
    CREATE INDEX IF NOT EXISTS idx_stored_configurations_signature
        ON stored_configurations (task_signature)
    "#,
];

const SELECT_COLUMNS: &str = "id, task_signature, executors, pattern, quality_gates, \
     usage_count, success_count, average_quality, created_at, last_used";

const SUCCESS_RATE: &str =
    "CASE WHEN usage_count = 0 THEN 0.0 ELSE CAST(success_count AS REAL) / usage_count END";

/// An in-memory database lives and dies with its single connection, so that
/// connection is never recycled.
fn pool_options(database_url: &str) -> SqlitePoolOptions {
    let options = SqlitePoolOptions::new().acquire_timeout(Duration::from_secs(30));
    if database_url.contains(":memory:") {
        options
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
    } else {
        options.max_connections(5)
    }
}

/// Configuration persistence backed by a SQLite database.
#[derive(Debug, Clone)]
pub struct SqlitePersistence {
    pool: SqlitePool,
}

impl SqlitePersistence {
    /// Opens (creating if missing) the database at `database_url`,
    /// e.g. `sqlite://compose-forge.db`.
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let options = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = pool_options(database_url).connect_with(options).await?;

        let persistence = Self { pool };
        persistence.create_schema().await?;
        tracing::info!(url = %database_url, "Connected configuration store");
        Ok(persistence)
    }

    /// A private in-memory database, mostly useful for tests.
    pub async fn in_memory() -> Result<Self, StoreError> {
        Self::connect("sqlite::memory:").await
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn create_schema(&self) -> Result<(), StoreError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }
}

fn corrupt(field: &str, err: impl std::fmt::Display) -> StoreError {
    StoreError::Corrupt(format!("{}: {}", field, err))
}

fn row_to_configuration(row: &SqliteRow) -> Result<StoredConfiguration, StoreError> {
    let id: String = row.try_get("id")?;
    let id = Uuid::parse_str(&id).map_err(|e| corrupt("id", e))?;
    let signature: String = row.try_get("task_signature")?;
    let executors: String = row.try_get("executors")?;
    let pattern: String = row.try_get("pattern")?;
    let quality_gates: String = row.try_get("quality_gates")?;
    let usage_count: i64 = row.try_get("usage_count")?;
    let success_count: i64 = row.try_get("success_count")?;
    let average_quality: f64 = row.try_get("average_quality")?;
    let created_at: DateTime<Utc> = row.try_get("created_at")?;
    let last_used: DateTime<Utc> = row.try_get("last_used")?;

    let pattern = CompositionPattern::from_str(&pattern).map_err(|e| corrupt("pattern", e))?;
    let usage = u64::try_from(usage_count).map_err(|e| corrupt("usage_count", e))?;
    let success = u64::try_from(success_count).map_err(|e| corrupt("success_count", e))?;

    StoredConfiguration::new(
        TaskSignature::from_hex(signature),
        serde_json::from_str(&executors)?,
        pattern,
        serde_json::from_str(&quality_gates)?,
    )
    .with_id(id)
    .with_history(usage, success, average_quality)
    .map(|c| c.with_timestamps(created_at, last_used))
}

#[async_trait]
impl ConfigurationPersistence for SqlitePersistence {
    async fn save(&self, configuration: &StoredConfiguration) -> Result<(), StoreError> {
        let executors = serde_json::to_string(&configuration.executors)?;
        let quality_gates = serde_json::to_string(&configuration.quality_gates)?;

        sqlx::query(
            r#"
            INSERT INTO stored_configurations (
                id, task_signature, executors, pattern, quality_gates,
                usage_count, success_count, average_quality, created_at, last_used
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            ON CONFLICT (id) DO UPDATE SET
                executors = excluded.executors,
                pattern = excluded.pattern,
                quality_gates = excluded.quality_gates,
                usage_count = excluded.usage_count,
                success_count = excluded.success_count,
                average_quality = excluded.average_quality,
                last_used = excluded.last_used
            "#,
        )
        .bind(configuration.id.to_string())
        .bind(configuration.task_signature.as_str())
        .bind(&executors)
        .bind(configuration.pattern.as_str())
        .bind(&quality_gates)
        .bind(configuration.usage_count() as i64)
        .bind(configuration.success_count() as i64)
        .bind(configuration.average_quality())
        .bind(configuration.created_at)
        .bind(configuration.last_used())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn load(&self, id: Uuid) -> Result<StoredConfiguration, StoreError> {
        let query = format!(
            "SELECT {} FROM stored_configurations WHERE id = ?1",
            SELECT_COLUMNS
        );
        let row = sqlx::query(&query)
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => row_to_configuration(&row),
            None => Err(StoreError::NotFound(id.to_string())),
        }
    }

    async fn search(
        &self,
        signature: &TaskSignature,
        min_success_rate: f64,
    ) -> Result<Vec<StoredConfiguration>, StoreError> {
        let query = format!(
            "SELECT {columns} FROM stored_configurations \
             WHERE task_signature = ?1 AND {rate} >= ?2 \
             ORDER BY {rate} DESC, usage_count DESC, last_used DESC, id ASC",
            columns = SELECT_COLUMNS,
            rate = SUCCESS_RATE,
        );
        let rows = sqlx::query(&query)
            .bind(signature.as_str())
            .bind(min_success_rate)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(row_to_configuration).collect()
    }

    async fn list(&self) -> Result<Vec<StoredConfiguration>, StoreError> {
        let query = format!(
            "SELECT {columns} FROM stored_configurations \
             ORDER BY {rate} DESC, usage_count DESC, last_used DESC, id ASC",
            columns = SELECT_COLUMNS,
            rate = SUCCESS_RATE,
        );
        let rows = sqlx::query(&query).fetch_all(&self.pool).await?;
        rows.iter().map(row_to_configuration).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::CostTier;
    use crate::plan::ExecutorRef;
    use crate::quality::QualityGate;
    use std::collections::BTreeMap;

    fn config(signature: &str) -> StoredConfiguration {
        let mut gates = BTreeMap::new();
        gates.insert("confidence".to_string(), QualityGate::at_least(0.7));
        StoredConfiguration::new(
            TaskSignature::from_hex(signature),
            vec![
                ExecutorRef {
                    role: "security_auditor".to_string(),
                    tier: CostTier::Mid,
                },
                ExecutorRef {
                    role: "doc_writer".to_string(),
                    tier: CostTier::Low,
                },
            ],
            CompositionPattern::Parallel,
            gates,
        )
    }

    #[test]
    fn test_memory_pool_keeps_its_connection() {
        let memory = pool_options("sqlite::memory:");
        assert_eq!(memory.get_max_connections(), 1);
        assert_eq!(memory.get_min_connections(), 1);
        assert_eq!(memory.get_idle_timeout(), None);
        assert_eq!(memory.get_max_lifetime(), None);

        let file = pool_options("sqlite://compose.db");
        assert_eq!(file.get_max_connections(), 5);
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let store = SqlitePersistence::in_memory().await.expect("connect");
        let saved = config("sig-a").with_history(4, 3, 0.75).expect("history");
        store.save(&saved).await.expect("save");

        let loaded = store.load(saved.id).await.expect("load");
        assert_eq!(loaded.executors, saved.executors);
        assert_eq!(loaded.pattern, CompositionPattern::Parallel);
        assert_eq!(loaded.quality_gates, saved.quality_gates);
        assert_eq!(loaded.usage_count(), 4);
        assert_eq!(loaded.success_count(), 3);
        assert!((loaded.average_quality() - 0.75).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_load_missing_is_not_found() {
        let store = SqlitePersistence::in_memory().await.expect("connect");
        assert!(matches!(
            store.load(Uuid::new_v4()).await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_save_updates_existing_row() {
        let store = SqlitePersistence::in_memory().await.expect("connect");
        let mut saved = config("sig-a");
        store.save(&saved).await.expect("save");
        saved.record_outcome(true, 0.9);
        store.save(&saved).await.expect("update");

        let loaded = store.load(saved.id).await.expect("load");
        assert_eq!(loaded.usage_count(), 1);
        assert_eq!(loaded.success_count(), 1);
    }

    #[tokio::test]
    async fn test_search_filters_and_orders() {
        let store = SqlitePersistence::in_memory().await.expect("connect");
        let weak = config("sig-a").with_history(10, 5, 0.5).expect("history");
        let strong = config("sig-a").with_history(5, 4, 0.8).expect("history");
        let strongest = config("sig-a").with_history(3, 3, 0.9).expect("history");
        let other = config("sig-b").with_history(3, 3, 0.9).expect("history");
        for c in [&weak, &strong, &strongest, &other] {
            store.save(c).await.expect("save");
        }

        let found = store
            .search(&TaskSignature::from_hex("sig-a"), 0.75)
            .await
            .expect("search");
        let ids: Vec<Uuid> = found.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![strongest.id, strong.id]);
    }

    #[tokio::test]
    async fn test_file_backed_store_persists() {
        let dir = tempfile::tempdir().expect("tempdir");
        let url = format!("sqlite://{}", dir.path().join("store.db").display());
        let saved = config("sig-a");
        {
            let store = SqlitePersistence::connect(&url).await.expect("connect");
            store.save(&saved).await.expect("save");
        }
        let reopened = SqlitePersistence::connect(&url).await.expect("reconnect");
        assert_eq!(reopened.list().await.expect("list").len(), 1);
    }
}
