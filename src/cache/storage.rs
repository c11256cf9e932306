//! Snapshot storage trait and SQLite implementation.

use chrono::{DateTime, Duration, Utc};
use color_eyre::{eyre::eyre, Result};
use rusqlite::{params, Connection, OptionalExtension};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::config::Config;
use crate::store::Store;

/// A store snapshot read back from storage.
#[derive(Debug, Clone)]
pub struct Snapshot {
  /// The restored store, with no in-flight work
  pub store: Store,
  /// When the snapshot was written
  pub cached_at: DateTime<Utc>,
}

impl Snapshot {
  /// Whether the snapshot is older than `max_age`.
  pub fn is_stale(&self, max_age: Duration) -> bool {
    Utc::now() - self.cached_at > max_age
  }

  /// Whether the snapshot may still be used given a `max_age_secs` setting.
  /// No limit, or one too large to represent, never expires.
  pub fn is_fresh(&self, max_age_secs: Option<u64>) -> bool {
    match max_age_secs
      .and_then(|secs| i64::try_from(secs).ok())
      .and_then(Duration::try_seconds)
    {
      Some(max_age) => !self.is_stale(max_age),
      None => true,
    }
  }
}

/// Storage key for the snapshot of one backend.
pub fn snapshot_key(base_url: Option<&str>) -> String {
  let mut hasher = Sha256::new();
  hasher.update(base_url.unwrap_or_default().trim_end_matches('/').as_bytes());
  hex::encode(hasher.finalize())
}

/// Trait for snapshot storage backends.
pub trait SnapshotStorage: Send + Sync {
  /// Get the snapshot stored under `key`.
  fn load(&self, key: &str) -> Result<Option<Snapshot>>;

  /// Replace the snapshot stored under `key`.
  fn save(&self, key: &str, store: &Store) -> Result<()>;

  /// Forget the snapshot stored under `key`.
  fn clear(&self, key: &str) -> Result<()>;
}

/// Storage implementation that doesn't persist anything.
/// Used when caching is disabled - all operations are no-ops.
pub struct NoopStorage;

impl SnapshotStorage for NoopStorage {
  fn load(&self, _key: &str) -> Result<Option<Snapshot>> {
    Ok(None) // Always miss
  }

  fn save(&self, _key: &str, _store: &Store) -> Result<()> {
    Ok(()) // Discard
  }

  fn clear(&self, _key: &str) -> Result<()> {
    Ok(())
  }
}

/// SQLite-based snapshot storage implementation.
pub struct SqliteStorage {
  conn: Mutex<Connection>,
}

impl SqliteStorage {
  /// Open (or create) the snapshot database at `path`, or at the default
  /// location when `path` is `None`.
  pub fn open(path: Option<&Path>) -> Result<Self> {
    let path = match path {
      Some(p) => p.to_path_buf(),
      None => Self::default_path()?,
    };

    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
      std::fs::create_dir_all(parent)
        .map_err(|e| eyre!("Failed to create cache directory: {}", e))?;
    }

    let conn = Connection::open(&path)
      .map_err(|e| eyre!("Failed to open cache database at {}: {}", path.display(), e))?;

    let storage = Self {
      conn: Mutex::new(conn),
    };
    storage.run_migrations()?;

    Ok(storage)
  }

  /// Get the default database path.
  fn default_path() -> Result<PathBuf> {
    Ok(Config::data_dir()?.join("cache.db"))
  }

  /// Run database migrations for snapshot tables.
  fn run_migrations(&self) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute_batch(SNAPSHOT_SCHEMA)
      .map_err(|e| eyre!("Failed to run cache migrations: {}", e))?;

    Ok(())
  }
}

/// Schema for snapshot tables.
const SNAPSHOT_SCHEMA: &str = r#"
-- One serialized store per backend
CREATE TABLE IF NOT EXISTS store_snapshots (
    snapshot_key TEXT PRIMARY KEY,
    base_url TEXT,
    data BLOB NOT NULL,
    resource_count INTEGER NOT NULL,
    cached_at TEXT NOT NULL DEFAULT (datetime('now'))
);
"#;

impl SnapshotStorage for SqliteStorage {
  fn load(&self, key: &str) -> Result<Option<Snapshot>> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    let row: Option<(Vec<u8>, String)> = conn
      .query_row(
        "SELECT data, cached_at FROM store_snapshots WHERE snapshot_key = ?",
        params![key],
        |row| Ok((row.get(0)?, row.get(1)?)),
      )
      .optional()
      .map_err(|e| eyre!("Failed to read snapshot: {}", e))?;

    match row {
      Some((data, cached_at_str)) => {
        let store: Store = serde_json::from_slice(&data)
          .map_err(|e| eyre!("Failed to deserialize snapshot: {}", e))?;
        let cached_at = parse_datetime(&cached_at_str)?;
        Ok(Some(Snapshot {
          store: store.restored(),
          cached_at,
        }))
      }
      None => Ok(None),
    }
  }

  fn save(&self, key: &str, store: &Store) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;
    let data =
      serde_json::to_vec(store).map_err(|e| eyre!("Failed to serialize snapshot: {}", e))?;

    conn
      .execute(
        "INSERT OR REPLACE INTO store_snapshots (snapshot_key, base_url, data, resource_count, cached_at)
         VALUES (?, ?, ?, ?, datetime('now'))",
        params![key, store.config().base_url, data, store.resources.len()],
      )
      .map_err(|e| eyre!("Failed to store snapshot: {}", e))?;

    Ok(())
  }

  fn clear(&self, key: &str) -> Result<()> {
    let conn = self
      .conn
      .lock()
      .map_err(|e| eyre!("Lock poisoned: {}", e))?;

    conn
      .execute(
        "DELETE FROM store_snapshots WHERE snapshot_key = ?",
        params![key],
      )
      .map_err(|e| eyre!("Failed to clear snapshot: {}", e))?;

    Ok(())
  }
}

/// Parse a datetime string from SQLite format.
fn parse_datetime(s: &str) -> Result<DateTime<Utc>> {
  // SQLite stores as "YYYY-MM-DD HH:MM:SS"
  chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
    .map(|dt| dt.and_utc())
    .map_err(|e| eyre!("Failed to parse datetime '{}': {}", s, e))
}
