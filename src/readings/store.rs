//! Append-only SQLite reading store.
//!
//! One store is built at startup and cloned into every component that needs
//! it. Writes are serialized through a gate so that `id` order, insert order
//! and `recorded_at` order agree; readers go straight to the pool and are
//! never queued behind more than a single insert (WAL journal).

use crate::error::{HazardError, Result};
use crate::readings::data::{NewReading, Reading};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteRow, SqliteSynchronous,
};
use sqlx::{Row, SqlitePool};
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Location and table of the reading store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// SQLite database file
    pub path: PathBuf,
    /// Table holding the readings
    pub table: String,
    /// Maximum pooled connections
    pub max_connections: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(crate::DEFAULT_DATABASE_FILE),
            table: crate::DEFAULT_TABLE.to_string(),
            max_connections: 5,
        }
    }
}

impl StoreConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn with_table(mut self, table: impl Into<String>) -> Self {
        self.table = table.into();
        self
    }

}

/// Handle to the reading store. Cheap to clone.
#[derive(Clone)]
pub struct ReadingStore {
    pool: SqlitePool,
    table: Arc<str>,
    write_gate: Arc<Mutex<()>>,
}

impl ReadingStore {
    /// Open (creating if needed) the on-disk store described by `config`.
    pub async fn open(config: &StoreConfig) -> Result<Self> {
        validate_table_name(&config.table)?;

        if let Some(parent) = config.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let options = SqliteConnectOptions::new()
            .filename(&config.path)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_secs(5))
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections.max(1))
            .connect_with(options)
            .await?;

        info!(
            "Reading store opened: {} (table {})",
            config.path.display(),
            config.table
        );

        Self::with_pool(pool, &config.table).await
    }

    /// A private in-memory store, mostly useful for tests.
    pub async fn in_memory(table: &str) -> Result<Self> {
        validate_table_name(table)?;

        // An in-memory database lives as long as its single connection.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(SqliteConnectOptions::from_str("sqlite::memory:")?)
            .await?;

        Self::with_pool(pool, table).await
    }

    async fn with_pool(pool: SqlitePool, table: &str) -> Result<Self> {
        sqlx::query(&format!(
            r#"
            CREATE TABLE IF NOT EXISTS {table} (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                LPG REAL NOT NULL,
                CH4 REAL NOT NULL,
                CO REAL NOT NULL,
                Temperature REAL NOT NULL,
                recorded_at TEXT NOT NULL
            )
            "#
        ))
        .execute(&pool)
        .await?;

        ensure_columns(&pool, table).await?;

        Ok(Self {
            pool,
            table: Arc::from(table),
            write_gate: Arc::new(Mutex::new(())),
        })
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Append a reading and return it with its assigned id and timestamp.
    pub async fn append(&self, reading: &NewReading) -> Result<Reading> {
        reading.validate()?;

        let _gate = self.write_gate.lock().await;
        let recorded_at = Utc::now();

        let result = sqlx::query(&format!(
            "INSERT INTO {} (LPG, CH4, CO, Temperature, recorded_at) VALUES (?, ?, ?, ?, ?)",
            self.table
        ))
        .bind(reading.lpg)
        .bind(reading.ch4)
        .bind(reading.co)
        .bind(reading.temperature)
        .bind(recorded_at)
        .execute(&self.pool)
        .await?;

        let id = result.last_insert_rowid() as u64;
        debug!(id, "Reading appended");

        Ok(Reading {
            id,
            lpg: reading.lpg,
            ch4: reading.ch4,
            co: reading.co,
            temperature: reading.temperature,
            recorded_at: Some(recorded_at),
        })
    }

    /// The reading with the greatest id, if any.
    pub async fn latest(&self) -> Result<Option<Reading>> {
        let row = sqlx::query(&format!(
            "SELECT id, LPG, CH4, CO, Temperature, recorded_at FROM {} ORDER BY id DESC LIMIT 1",
            self.table
        ))
        .fetch_optional(&self.pool)
        .await?;

        row.map(hydrate_reading).transpose()
    }

    /// Up to `limit` readings, most recent first.
    pub async fn recent(&self, limit: usize) -> Result<Vec<Reading>> {
        let rows = sqlx::query(&format!(
            "SELECT id, LPG, CH4, CO, Temperature, recorded_at FROM {} ORDER BY id DESC LIMIT ?",
            self.table
        ))
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(hydrate_reading).collect()
    }

    /// Number of stored readings.
    pub async fn count(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", self.table))
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }

    /// Check that the database answers.
    pub async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

fn hydrate_reading(row: SqliteRow) -> Result<Reading> {
    let id: i64 = row.try_get("id")?;
    let recorded_at: Option<DateTime<Utc>> = row.try_get("recorded_at")?;

    Ok(Reading {
        id: id as u64,
        lpg: row.try_get("LPG")?,
        ch4: row.try_get("CH4")?,
        co: row.try_get("CO")?,
        temperature: row.try_get("Temperature")?,
        recorded_at,
    })
}

/// Columns every reading row needs.
const METRIC_COLUMNS: [&str; 5] = ["id", "LPG", "CH4", "CO", "Temperature"];

/// Check an existing table against the reading layout.
///
/// Tables created before timestamps were kept get a nullable `recorded_at`
/// column; a table lacking any metric column cannot hold readings.
async fn ensure_columns(pool: &SqlitePool, table: &str) -> Result<()> {
    let columns: Vec<String> = sqlx::query(&format!("PRAGMA table_info({table})"))
        .fetch_all(pool)
        .await?
        .iter()
        .map(|row| row.try_get::<String, _>("name"))
        .collect::<std::result::Result<_, _>>()?;

    let missing: Vec<&str> = METRIC_COLUMNS
        .iter()
        .copied()
        .filter(|wanted| !columns.iter().any(|c| c.eq_ignore_ascii_case(wanted)))
        .collect();
    if !missing.is_empty() {
        return Err(HazardError::config_error(format!(
            "table {table} cannot hold readings, missing column(s): {}",
            missing.join(", ")
        )));
    }

    if !columns
        .iter()
        .any(|c| c.eq_ignore_ascii_case("recorded_at"))
    {
        warn!(table, "Adding recorded_at column to existing table");
        sqlx::query(&format!("ALTER TABLE {table} ADD COLUMN recorded_at TEXT"))
            .execute(pool)
            .await?;
    }

    Ok(())
}

/// Table names are spliced into SQL, so only plain identifiers are allowed.
fn validate_table_name(table: &str) -> Result<()> {
    let mut chars = table.chars();
    let valid = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');

    if valid {
        Ok(())
    } else {
        Err(HazardError::config_error(format!(
            "invalid table name {table:?}: use letters, digits and '_'"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(seed: f64) -> NewReading {
        NewReading::new(seed, seed + 1.0, seed + 2.0, 20.0 + seed).unwrap()
    }

    #[tokio::test]
    async fn empty_store_has_no_latest() {
        let store = ReadingStore::in_memory("readings").await.unwrap();
        assert!(store.latest().await.unwrap().is_none());
        assert!(store.recent(10).await.unwrap().is_empty());
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn append_assigns_increasing_ids() {
        let store = ReadingStore::in_memory("readings").await.unwrap();
        let first = store.append(&sample(1.0)).await.unwrap();
        let second = store.append(&sample(2.0)).await.unwrap();

        assert!(second.id > first.id);
        assert!(second.recorded_at >= first.recorded_at);

        let latest = store.latest().await.unwrap().unwrap();
        assert_eq!(latest.id, second.id);
        assert_eq!(latest.lpg, 2.0);
        assert_eq!(latest.temperature, 22.0);
    }

    #[tokio::test]
    async fn recent_is_bounded_and_newest_first() {
        let store = ReadingStore::in_memory("readings").await.unwrap();
        for i in 0..5 {
            store.append(&sample(i as f64)).await.unwrap();
        }

        let three = store.recent(3).await.unwrap();
        assert_eq!(three.len(), 3);
        assert!(three.windows(2).all(|pair| pair[0].id > pair[1].id));
        assert_eq!(three[0].lpg, 4.0);

        let all = store.recent(50).await.unwrap();
        assert_eq!(all.len(), 5);
    }

    #[tokio::test]
    async fn append_rejects_non_finite_reading() {
        let store = ReadingStore::in_memory("readings").await.unwrap();
        let bad = NewReading {
            lpg: f64::NAN,
            ch4: 1.0,
            co: 1.0,
            temperature: 1.0,
        };
        assert!(matches!(
            store.append(&bad).await,
            Err(HazardError::Validation(_))
        ));
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn legacy_table_gains_timestamp_column() {
        let dir = tempfile::tempdir().unwrap();
        let config = StoreConfig::new(dir.path().join("sqlite.db"));

        let legacy = SqlitePoolOptions::new()
            .connect_with(
                SqliteConnectOptions::new()
                    .filename(&config.path)
                    .create_if_missing(true),
            )
            .await
            .unwrap();
        sqlx::query(
            "CREATE TABLE readings (id INTEGER PRIMARY KEY AUTOINCREMENT, \
             LPG REAL, CH4 REAL, CO REAL, Temperature REAL)",
        )
        .execute(&legacy)
        .await
        .unwrap();
        sqlx::query("INSERT INTO readings (LPG, CH4, CO, Temperature) VALUES (1, 2, 3, 4)")
            .execute(&legacy)
            .await
            .unwrap();
        legacy.close().await;

        let store = ReadingStore::open(&config).await.unwrap();
        let old = store.latest().await.unwrap().unwrap();
        assert_eq!(old.co, 3.0);
        assert!(old.recorded_at.is_none());

        let new = store.append(&sample(5.0)).await.unwrap();
        assert!(new.id > old.id);
        assert!(store.latest().await.unwrap().unwrap().recorded_at.is_some());
    }

    #[tokio::test]
    async fn foreign_table_is_a_configuration_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = StoreConfig::new(dir.path().join("sqlite.db")).with_table("weather");

        let other = SqlitePoolOptions::new()
            .connect_with(
                SqliteConnectOptions::new()
                    .filename(&config.path)
                    .create_if_missing(true),
            )
            .await
            .unwrap();
        sqlx::query("CREATE TABLE weather (id INTEGER PRIMARY KEY, humidity REAL)")
            .execute(&other)
            .await
            .unwrap();
        other.close().await;

        let err = ReadingStore::open(&config).await.err().unwrap();
        assert!(matches!(err, HazardError::Config(_)));
        assert!(err.is_fatal());
    }

    #[test]
    fn table_names_are_checked() {
        assert!(validate_table_name("readings").is_ok());
        assert!(validate_table_name("_weather_2").is_ok());
        assert!(validate_table_name("").is_err());
        assert!(validate_table_name("2fast").is_err());
        assert!(validate_table_name("readings; DROP TABLE x").is_err());
    }
}
