//! Cache storage trait and SQLite implementation.

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::debug;

use super::clock::{Clock, SystemClock};
use crate::constants::STORE_NAME;
use crate::error::StoreError;

/// A single cached response.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
  /// Request URL the payload was fetched from
  pub key: String,
  /// The decoded response body
  pub payload: Value,
  /// When the entry was last written
  pub stored_at: DateTime<Utc>,
}

/// Trait for cache storage backends.
///
/// Holds at most one entry per key. Every failure is returned to the caller; a
/// backend must never turn an error into a miss.
pub trait CacheStorage: Send + Sync {
  /// Insert or replace the entry for `key`, stamped with the current time.
  fn put(&self, key: &str, payload: &Value) -> Result<(), StoreError>;

  /// Get the entry for `key`, if any.
  fn get(&self, key: &str) -> Result<Option<CacheEntry>, StoreError>;

  /// Remove the entry for `key`. Removing an absent key succeeds.
  fn delete(&self, key: &str) -> Result<(), StoreError>;

  /// Remove every entry.
  fn clear(&self) -> Result<(), StoreError>;

  /// Remove entries written before `cutoff`, returning how many were removed.
  fn purge_before(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError>;
}

/// Storage implementation that doesn't cache anything.
/// Used when caching is disabled - all operations are no-ops.
pub struct NoopStorage;

impl CacheStorage for NoopStorage {
  fn put(&self, _key: &str, _payload: &Value) -> Result<(), StoreError> {
    Ok(()) // Discard
  }

  fn get(&self, _key: &str) -> Result<Option<CacheEntry>, StoreError> {
    Ok(None) // Always miss
  }

  fn delete(&self, _key: &str) -> Result<(), StoreError> {
    Ok(())
  }

  fn clear(&self) -> Result<(), StoreError> {
    Ok(())
  }

  fn purge_before(&self, _cutoff: DateTime<Utc>) -> Result<usize, StoreError> {
    Ok(0)
  }
}

/// Schema migrations, applied in order. Index `i` upgrades `user_version` from `i` to
/// `i + 1`. Only ever append here; every statement must be safe to run twice.
const MIGRATIONS: &[&str] = &[
  // v1: the entry table
  r#"
CREATE TABLE IF NOT EXISTS cache_store (
    url TEXT PRIMARY KEY,
    data TEXT NOT NULL,
    timestamp INTEGER NOT NULL
);
"#,
  // v2: lets time-based purges avoid a full scan
  r#"
CREATE INDEX IF NOT EXISTS idx_cache_store_timestamp ON cache_store(timestamp);
"#,
];

/// SQLite-based cache storage implementation.
///
/// The database file is opened, and its schema created, on the first operation
/// rather than at construction time. A failed open is retried by the next call.
pub struct SqliteStorage {
  path: PathBuf,
  conn: Mutex<Option<Connection>>,
  clock: Arc<dyn Clock>,
}

impl SqliteStorage {
  /// Create storage backed by the database file at `path`.
  pub fn open(path: impl AsRef<Path>) -> Self {
    Self::with_clock(path, Arc::new(SystemClock))
  }

  /// Create storage whose write timestamps come from `clock`.
  pub fn with_clock(path: impl AsRef<Path>, clock: Arc<dyn Clock>) -> Self {
    Self {
      path: path.as_ref().to_path_buf(),
      conn: Mutex::new(None),
      clock,
    }
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  /// Run `f` against the connection, opening and migrating it first if needed.
  fn with_conn<T>(
    &self,
    f: impl FnOnce(&Connection) -> Result<T, StoreError>,
  ) -> Result<T, StoreError> {
    let mut guard: MutexGuard<'_, Option<Connection>> = self
      .conn
      .lock()
      .map_err(|e| StoreError::Lock(e.to_string()))?;

    if guard.is_none() {
      *guard = Some(self.connect()?);
    }

    match guard.as_ref() {
      Some(conn) => f(conn),
      None => Err(StoreError::Open("connection unavailable".to_string())),
    }
  }

  fn connect(&self) -> Result<Connection, StoreError> {
    // Ensure parent directory exists
    if let Some(parent) = self.path.parent() {
      if !parent.as_os_str().is_empty() {
        std::fs::create_dir_all(parent).map_err(|e| {
          StoreError::Open(format!(
            "failed to create cache directory {}: {}",
            parent.display(),
            e
          ))
        })?;
      }
    }

    let conn = Connection::open(&self.path)
      .map_err(|e| StoreError::Open(format!("{}: {}", self.path.display(), e)))?;

    run_migrations(&conn)?;
    debug!(path = %self.path.display(), "opened cache store");

    Ok(conn)
  }
}

/// Bring the schema up to the latest version this build knows.
///
/// A database stamped with a newer version is left untouched.
fn run_migrations(conn: &Connection) -> Result<(), StoreError> {
  let version: i64 = conn
    .query_row("PRAGMA user_version", [], |row| row.get(0))
    .map_err(|e| StoreError::Migrate(e.to_string()))?;

  let known = MIGRATIONS.len() as i64;
  if version >= known {
    // Tables may still be missing if the file was stamped by something else
    for sql in MIGRATIONS {
      conn
        .execute_batch(sql)
        .map_err(|e| StoreError::Migrate(e.to_string()))?;
    }
    return Ok(());
  }

  for (index, sql) in MIGRATIONS.iter().enumerate().skip(version.max(0) as usize) {
    let target = index as i64 + 1;
    conn
      .execute_batch(&format!(
        "BEGIN;\n{}\nPRAGMA user_version = {};\nCOMMIT;",
        sql, target
      ))
      .map_err(|e| StoreError::Migrate(format!("to version {}: {}", target, e)))?;
    debug!(version = target, "migrated cache store");
  }

  Ok(())
}

impl CacheStorage for SqliteStorage {
  fn put(&self, key: &str, payload: &Value) -> Result<(), StoreError> {
    let data = serde_json::to_string(payload).map_err(|e| StoreError::Write(e.to_string()))?;
    let timestamp = self.clock.now().timestamp_millis();

    self.with_conn(|conn| {
      conn
        .execute(
          &format!(
            "INSERT OR REPLACE INTO {} (url, data, timestamp) VALUES (?1, ?2, ?3)",
            STORE_NAME
          ),
          params![key, data, timestamp],
        )
        .map_err(|e| StoreError::Write(e.to_string()))?;
      Ok(())
    })
  }

  fn get(&self, key: &str) -> Result<Option<CacheEntry>, StoreError> {
    let row: Option<(String, i64)> = self.with_conn(|conn| {
      conn
        .query_row(
          &format!("SELECT data, timestamp FROM {} WHERE url = ?1", STORE_NAME),
          params![key],
          |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()
        .map_err(|e| StoreError::Read(e.to_string()))
    })?;

    let Some((data, timestamp)) = row else {
      return Ok(None);
    };

    let payload: Value = serde_json::from_str(&data)
      .map_err(|e| StoreError::Corrupt(format!("{}: {}", key, e)))?;
    let stored_at = DateTime::from_timestamp_millis(timestamp)
      .ok_or_else(|| StoreError::Corrupt(format!("{}: bad timestamp {}", key, timestamp)))?;

    Ok(Some(CacheEntry {
      key: key.to_string(),
      payload,
      stored_at,
    }))
  }

  fn delete(&self, key: &str) -> Result<(), StoreError> {
    self.with_conn(|conn| {
      conn
        .execute(
          &format!("DELETE FROM {} WHERE url = ?1", STORE_NAME),
          params![key],
        )
        .map_err(|e| StoreError::Delete(e.to_string()))?;
      Ok(())
    })
  }

  fn clear(&self) -> Result<(), StoreError> {
    self.with_conn(|conn| {
      conn
        .execute(&format!("DELETE FROM {}", STORE_NAME), [])
        .map_err(|e| StoreError::Delete(e.to_string()))?;
      Ok(())
    })
  }

  fn purge_before(&self, cutoff: DateTime<Utc>) -> Result<usize, StoreError> {
    self.with_conn(|conn| {
      conn
        .execute(
          &format!("DELETE FROM {} WHERE timestamp < ?1", STORE_NAME),
          params![cutoff.timestamp_millis()],
        )
        .map_err(|e| StoreError::Delete(e.to_string()))
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::test_support::ManualClock;
  use serde_json::json;
  use tempfile::TempDir;

  fn create_test_storage() -> (SqliteStorage, Arc<ManualClock>, TempDir) {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let clock = Arc::new(ManualClock::new());
    let storage = SqliteStorage::with_clock(temp_dir.path().join("cache.db"), clock.clone());
    (storage, clock, temp_dir)
  }

  #[test]
  fn test_open_is_lazy() {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    let path = temp_dir.path().join("nested").join("cache.db");
    let storage = SqliteStorage::open(&path);

    assert!(!path.exists(), "nothing should be created before first use");

    assert_eq!(storage.get("/missing").expect("get should succeed"), None);
    assert!(path.exists(), "first use should create the database");
  }

  #[test]
  fn test_put_then_get_then_delete() {
    let (storage, clock, _temp_dir) = create_test_storage();
    clock.set_millis(1_700_000_000_000);

    storage.put("/b", &json!({"x": 1})).expect("put should succeed");
    let entry = storage
      .get("/b")
      .expect("get should succeed")
      .expect("entry should exist");

    assert_eq!(entry.key, "/b");
    assert_eq!(entry.payload, json!({"x": 1}));
    assert!(entry.stored_at <= clock.now());

    storage.delete("/b").expect("delete should succeed");
    assert_eq!(storage.get("/b").expect("get should succeed"), None);
  }

  #[test]
  fn test_second_put_wins() {
    let (storage, clock, _temp_dir) = create_test_storage();

    clock.set_millis(1_000);
    storage.put("/a", &json!("first")).expect("put should succeed");
    clock.set_millis(2_000);
    storage.put("/a", &json!("second")).expect("put should succeed");

    let entry = storage.get("/a").unwrap().unwrap();
    assert_eq!(entry.payload, json!("second"));
    assert_eq!(entry.stored_at.timestamp_millis(), 2_000);

    let rows: i64 = storage
      .with_conn(|conn| {
        conn
          .query_row("SELECT COUNT(*) FROM cache_store WHERE url = '/a'", [], |r| r.get(0))
          .map_err(|e| StoreError::Read(e.to_string()))
      })
      .unwrap();
    assert_eq!(rows, 1);
  }

  #[test]
  fn test_delete_absent_key_is_ok() {
    let (storage, _clock, _temp_dir) = create_test_storage();
    storage.delete("/never-stored").expect("absent delete should succeed");
  }

  #[test]
  fn test_entries_survive_reopen() {
    let (storage, clock, temp_dir) = create_test_storage();
    clock.set_millis(5_000);
    storage.put("/persist", &json!([1, 2, 3])).unwrap();
    drop(storage);

    let reopened = SqliteStorage::open(temp_dir.path().join("cache.db"));
    let entry = reopened.get("/persist").unwrap().expect("entry should persist");
    assert_eq!(entry.payload, json!([1, 2, 3]));
    assert_eq!(entry.stored_at.timestamp_millis(), 5_000);
  }

  #[test]
  fn test_migrations_are_idempotent_and_versioned() {
    let (storage, _clock, _temp_dir) = create_test_storage();
    storage.put("/v", &json!(null)).unwrap();

    let version: i64 = storage
      .with_conn(|conn| {
        run_migrations(conn)?;
        run_migrations(conn)?;
        conn
          .query_row("PRAGMA user_version", [], |r| r.get(0))
          .map_err(|e| StoreError::Read(e.to_string()))
      })
      .unwrap();

    assert_eq!(version, MIGRATIONS.len() as i64);
    assert!(storage.get("/v").unwrap().is_some());
  }

  #[test]
  fn test_newer_schema_version_keeps_data() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("cache.db");

    let storage = SqliteStorage::open(&path);
    storage.put("/keep", &json!({"kept": true})).unwrap();
    storage
      .with_conn(|conn| {
        conn
          .execute_batch("PRAGMA user_version = 42;")
          .map_err(|e| StoreError::Write(e.to_string()))
      })
      .unwrap();
    drop(storage);

    let reopened = SqliteStorage::open(&path);
    let entry = reopened.get("/keep").unwrap().expect("data should survive");
    assert_eq!(entry.payload, json!({"kept": true}));
  }

  #[test]
  fn test_purge_before_and_clear() {
    let (storage, clock, _temp_dir) = create_test_storage();

    clock.set_millis(1_000);
    storage.put("/old", &json!(1)).unwrap();
    clock.set_millis(10_000);
    storage.put("/new", &json!(2)).unwrap();

    let cutoff = DateTime::from_timestamp_millis(5_000).unwrap();
    assert_eq!(storage.purge_before(cutoff).unwrap(), 1);
    assert!(storage.get("/old").unwrap().is_none());
    assert!(storage.get("/new").unwrap().is_some());

    storage.clear().unwrap();
    assert!(storage.get("/new").unwrap().is_none());
  }

  #[test]
  fn test_open_failure_is_reported() {
    let temp_dir = TempDir::new().unwrap();
    // A directory cannot be opened as a database file
    let storage = SqliteStorage::open(temp_dir.path());

    let err = storage.get("/x").unwrap_err();
    assert!(matches!(err, StoreError::Open(_) | StoreError::Migrate(_)));
  }

  #[test]
  fn test_failed_open_is_retried_on_next_call() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("cache.db");
    // A directory squatting on the database path blocks the first open
    std::fs::create_dir(&db_path).unwrap();
    let storage = SqliteStorage::open(&db_path);

    assert!(storage.get("/x").is_err());

    std::fs::remove_dir(&db_path).unwrap();
    assert_eq!(storage.get("/x").unwrap(), None);
    storage.put("/x", &json!("ok")).unwrap();
    assert_eq!(storage.get("/x").unwrap().unwrap().payload, json!("ok"));
  }

  #[test]
  fn test_noop_storage_never_holds_entries() {
    let storage = NoopStorage;
    storage.put("/a", &json!(1)).unwrap();
    assert_eq!(storage.get("/a").unwrap(), None);
  }
}
