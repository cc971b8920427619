// tutormesh-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite State Store
// Description: Durable StateStore backed by SQLite WAL.
// Purpose: Persist composite-key records with TTL and version guards.
// Dependencies: tutormesh-core, rusqlite, serde, serde_json, thiserror
// ============================================================================

//! ## Overview
//! This module implements a durable [`StateStore`] using `SQLite`. Each key
//! holds one JSON value with a per-key version counter and an optional expiry
//! in epoch milliseconds; expired rows behave as absent and are pruned
//! lazily. Compare-and-swap runs inside a transaction so the version check
//! and the write are atomic. Loads fail closed on corrupt payloads.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::Component;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;
use std::time::Duration;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use rusqlite::Connection;
use rusqlite::OptionalExtension;
use rusqlite::params;
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tutormesh_core::CasOutcome;
use tutormesh_core::StateStore;
use tutormesh_core::StoreError;
use tutormesh_core::VersionedValue;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// `SQLite` schema version for the store.
const SCHEMA_VERSION: i64 = 1;
/// Default busy timeout (ms).
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
/// Maximum length of a single path component.
const MAX_PATH_COMPONENT_LENGTH: usize = 255;
/// Maximum total path length.
const MAX_TOTAL_PATH_LENGTH: usize = 4096;

// ============================================================================
// SECTION: Config
// ============================================================================

/// `SQLite` journal mode configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteStoreMode {
    /// WAL journal mode (recommended).
    #[default]
    Wal,
    /// Delete journal mode (legacy).
    Delete,
}

impl SqliteStoreMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Wal => "wal",
            Self::Delete => "delete",
        }
    }
}

/// `SQLite` sync mode configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SqliteSyncMode {
    /// Full synchronous mode (safest).
    #[default]
    Full,
    /// Normal synchronous mode (balanced).
    Normal,
}

impl SqliteSyncMode {
    /// Returns the `SQLite` pragma value.
    #[must_use]
    pub const fn pragma_value(self) -> &'static str {
        match self {
            Self::Full => "full",
            Self::Normal => "normal",
        }
    }
}

/// Configuration for the `SQLite` state store.
#[derive(Debug, Clone, Deserialize)]
pub struct SqliteStoreConfig {
    /// Path to the `SQLite` database file.
    pub path: PathBuf,
    /// Busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
    /// `SQLite` journal mode.
    #[serde(default)]
    pub journal_mode: SqliteStoreMode,
    /// `SQLite` sync mode.
    #[serde(default)]
    pub sync_mode: SqliteSyncMode,
}

impl SqliteStoreConfig {
    /// Creates a config for the given path with defaults.
    #[must_use]
    pub fn for_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            journal_mode: SqliteStoreMode::default(),
            sync_mode: SqliteSyncMode::default(),
        }
    }
}

/// Returns the default busy timeout for `SQLite` connections.
const fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// `SQLite` store errors.
#[derive(Debug, Error)]
pub enum SqliteStoreError {
    /// Store I/O error.
    #[error("sqlite store io error: {0}")]
    Io(String),
    /// `SQLite` engine error.
    #[error("sqlite store db error: {0}")]
    Db(String),
    /// Store schema version mismatch.
    #[error("sqlite store version mismatch: {0}")]
    VersionMismatch(String),
    /// Invalid store data or configuration.
    #[error("sqlite store invalid data: {0}")]
    Invalid(String),
}

impl From<SqliteStoreError> for StoreError {
    fn from(error: SqliteStoreError) -> Self {
        match error {
            SqliteStoreError::Io(message) => Self::Io(message),
            SqliteStoreError::Db(message) | SqliteStoreError::VersionMismatch(message) => {
                Self::Store(message)
            }
            SqliteStoreError::Invalid(message) => Self::Serialization(message),
        }
    }
}

impl From<rusqlite::Error> for SqliteStoreError {
    fn from(error: rusqlite::Error) -> Self {
        Self::Db(error.to_string())
    }
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// `SQLite`-backed state store with WAL support.
#[derive(Clone)]
pub struct SqliteStateStore {
    /// Shared `SQLite` connection guarded by a mutex.
    connection: Arc<Mutex<Connection>>,
}

impl SqliteStateStore {
    /// Opens an `SQLite`-backed state store.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteStoreError`] when the database cannot be opened or
    /// initialized.
    pub fn new(config: SqliteStoreConfig) -> Result<Self, SqliteStoreError> {
        validate_store_path(&config.path)?;
        ensure_parent_dir(&config.path)?;
        let mut connection = open_connection(&config)?;
        initialize_schema(&mut connection)?;
        Ok(Self {
            connection: Arc::new(Mutex::new(connection)),
        })
    }

    /// Locks the connection.
    fn lock(&self) -> Result<MutexGuard<'_, Connection>, SqliteStoreError> {
        self.connection
            .lock()
            .map_err(|_| SqliteStoreError::Db("sqlite connection mutex poisoned".to_string()))
    }

    /// Reads a live row inside the current connection, pruning it when
    /// expired.
    fn live_row(
        connection: &Connection,
        key: &str,
        now_ms: i64,
    ) -> Result<Option<(String, u64)>, SqliteStoreError> {
        let row: Option<(String, i64, Option<i64>)> = connection
            .query_row(
                "SELECT value_json, version, expires_at_ms FROM kv_state WHERE key = ?1",
                params![key],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;
        match row {
            Some((_, _, Some(expires_at))) if expires_at <= now_ms => {
                connection.execute("DELETE FROM kv_state WHERE key = ?1", params![key])?;
                Ok(None)
            }
            Some((value_json, version, _)) => {
                Ok(Some((value_json, u64::try_from(version).unwrap_or(0))))
            }
            None => Ok(None),
        }
    }

    /// Writes a row at the given version.
    fn write_row(
        connection: &Connection,
        key: &str,
        value: &Value,
        version: u64,
        ttl: Option<Duration>,
        now_ms: i64,
    ) -> Result<(), SqliteStoreError> {
        let value_json = serde_json::to_string(value)
            .map_err(|error| SqliteStoreError::Invalid(error.to_string()))?;
        let expires_at_ms = ttl.map(|ttl| {
            now_ms.saturating_add(i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX))
        });
        connection.execute(
            "INSERT INTO kv_state (key, value_json, version, expires_at_ms, updated_at_ms)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(key) DO UPDATE SET
               value_json = excluded.value_json,
               version = excluded.version,
               expires_at_ms = excluded.expires_at_ms,
               updated_at_ms = excluded.updated_at_ms",
            params![key, value_json, i64::try_from(version).unwrap_or(i64::MAX), expires_at_ms, now_ms],
        )?;
        Ok(())
    }
}

impl StateStore for SqliteStateStore {
    fn get(&self, key: &str) -> Result<Option<VersionedValue>, StoreError> {
        let connection = self.lock().map_err(StoreError::from)?;
        let row = Self::live_row(&connection, key, now_ms()).map_err(StoreError::from)?;
        row.map(|(value_json, version)| {
            let value = serde_json::from_str(&value_json)
                .map_err(|error| StoreError::Serialization(error.to_string()))?;
            Ok(VersionedValue {
                value,
                version,
            })
        })
        .transpose()
    }

    fn put(&self, key: &str, value: &Value, ttl: Option<Duration>) -> Result<u64, StoreError> {
        let mut connection = self.lock().map_err(StoreError::from)?;
        let now = now_ms();
        let tx = connection.transaction().map_err(|error| StoreError::Store(error.to_string()))?;
        let version = Self::live_row(&tx, key, now)
            .map_err(StoreError::from)?
            .map_or(1, |(_, current)| current + 1);
        Self::write_row(&tx, key, value, version, ttl, now).map_err(StoreError::from)?;
        tx.commit().map_err(|error| StoreError::Store(error.to_string()))?;
        Ok(version)
    }

    fn compare_and_swap(
        &self,
        key: &str,
        expected: Option<u64>,
        value: &Value,
        ttl: Option<Duration>,
    ) -> Result<CasOutcome, StoreError> {
        let mut connection = self.lock().map_err(StoreError::from)?;
        let now = now_ms();
        let tx = connection.transaction().map_err(|error| StoreError::Store(error.to_string()))?;
        let found = Self::live_row(&tx, key, now)
            .map_err(StoreError::from)?
            .map(|(_, version)| version);
        if found != expected {
            return Ok(CasOutcome::Conflict {
                found,
            });
        }
        let version = found.map_or(1, |current| current + 1);
        Self::write_row(&tx, key, value, version, ttl, now).map_err(StoreError::from)?;
        tx.commit().map_err(|error| StoreError::Store(error.to_string()))?;
        Ok(CasOutcome::Stored {
            version,
        })
    }

    fn delete(&self, key: &str) -> Result<bool, StoreError> {
        let connection = self.lock().map_err(StoreError::from)?;
        let live = Self::live_row(&connection, key, now_ms()).map_err(StoreError::from)?;
        connection
            .execute("DELETE FROM kv_state WHERE key = ?1", params![key])
            .map_err(|error| StoreError::Store(error.to_string()))?;
        Ok(live.is_some())
    }

    fn multi_get(&self, keys: &[String]) -> Result<Vec<Option<VersionedValue>>, StoreError> {
        keys.iter().map(|key| self.get(key)).collect()
    }

    fn scan_by_prefix(&self, prefix: &str) -> Result<Vec<(String, VersionedValue)>, StoreError> {
        let connection = self.lock().map_err(StoreError::from)?;
        let now = now_ms();
        let mut statement = connection
            .prepare(
                "SELECT key, value_json, version, expires_at_ms FROM kv_state
                 WHERE substr(key, 1, length(?1)) = ?1 ORDER BY key",
            )
            .map_err(|error| StoreError::Store(error.to_string()))?;
        let rows = statement
            .query_map(params![prefix], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, Option<i64>>(3)?,
                ))
            })
            .map_err(|error| StoreError::Store(error.to_string()))?;

        let mut live = Vec::new();
        for row in rows {
            let (key, value_json, version, expires_at_ms) =
                row.map_err(|error| StoreError::Store(error.to_string()))?;
            if expires_at_ms.is_some_and(|expires_at| expires_at <= now) {
                continue;
            }
            let value = serde_json::from_str(&value_json)
                .map_err(|error| StoreError::Serialization(error.to_string()))?;
            live.push((
                key,
                VersionedValue {
                    value,
                    version: u64::try_from(version).unwrap_or(0),
                },
            ));
        }
        Ok(live)
    }

    fn probe(&self) -> Result<(), StoreError> {
        let connection = self.lock().map_err(StoreError::from)?;
        connection
            .query_row("SELECT 1", [], |_| Ok(()))
            .map_err(|error| StoreError::Store(error.to_string()))
    }
}

// ============================================================================
// SECTION: Connection Setup
// ============================================================================

/// Returns the current wall-clock time in epoch milliseconds.
fn now_ms() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
}

/// Opens the connection and applies the configured pragmas.
fn open_connection(config: &SqliteStoreConfig) -> Result<Connection, SqliteStoreError> {
    let connection = Connection::open(&config.path)?;
    connection
        .execute_batch(&format!("PRAGMA journal_mode = {};", config.journal_mode.pragma_value()))?;
    connection
        .execute_batch(&format!("PRAGMA synchronous = {};", config.sync_mode.pragma_value()))?;
    connection.busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;
    Ok(connection)
}

/// Creates the schema and verifies the stored schema version.
fn initialize_schema(connection: &mut Connection) -> Result<(), SqliteStoreError> {
    let tx = connection.transaction()?;
    tx.execute_batch(
        "CREATE TABLE IF NOT EXISTS kv_state (
            key TEXT PRIMARY KEY,
            value_json TEXT NOT NULL,
            version INTEGER NOT NULL,
            expires_at_ms INTEGER,
            updated_at_ms INTEGER NOT NULL
        );
        CREATE TABLE IF NOT EXISTS store_meta (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            schema_version INTEGER NOT NULL
        );",
    )?;
    let stored: Option<i64> = tx
        .query_row("SELECT schema_version FROM store_meta WHERE id = 1", [], |row| row.get(0))
        .optional()?;
    match stored {
        None => {
            tx.execute(
                "INSERT INTO store_meta (id, schema_version) VALUES (1, ?1)",
                params![SCHEMA_VERSION],
            )?;
        }
        Some(version) if version == SCHEMA_VERSION => {}
        Some(version) => {
            return Err(SqliteStoreError::VersionMismatch(format!(
                "found schema version {version}, expected {SCHEMA_VERSION}"
            )));
        }
    }
    tx.commit()?;
    Ok(())
}

/// Validates the store path against length and component limits.
fn validate_store_path(path: &Path) -> Result<(), SqliteStoreError> {
    let rendered = path.to_string_lossy();
    if rendered.is_empty() {
        return Err(SqliteStoreError::Invalid("store path is empty".to_string()));
    }
    if rendered.len() > MAX_TOTAL_PATH_LENGTH {
        return Err(SqliteStoreError::Invalid(format!(
            "store path exceeds {MAX_TOTAL_PATH_LENGTH} bytes"
        )));
    }
    for component in path.components() {
        if let Component::Normal(part) = component
            && part.to_string_lossy().len() > MAX_PATH_COMPONENT_LENGTH
        {
            return Err(SqliteStoreError::Invalid(format!(
                "store path component exceeds {MAX_PATH_COMPONENT_LENGTH} bytes"
            )));
        }
    }
    Ok(())
}

/// Creates the parent directory of the database file when missing.
fn ensure_parent_dir(path: &Path) -> Result<(), SqliteStoreError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent).map_err(|error| SqliteStoreError::Io(error.to_string()))?;
    }
    Ok(())
}
