//! SQLite persistence for history, services, tests and results.
//!
//! Everything lives in one `app_state` table keyed by document name; each
//! value is the JSON encoding of the corresponding type.

use std::path::Path;

use rusqlite::{Connection, OptionalExtension, params};
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::history::{History, HistoryEntry};
use crate::services::Service;
use crate::testing::{TestCase, TestResult};

pub const HISTORY_KEY: &str = "history";
pub const SERVICES_KEY: &str = "services";
pub const TESTS_KEY: &str = "tests";
pub const RESULTS_KEY: &str = "results";

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Failed to encode or decode `{key}`: {source}")]
    Json {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

pub struct Store {
    conn: Connection,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        Self::init(conn)
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self, StorageError> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS app_state (
             state_key TEXT PRIMARY KEY,
             state_json TEXT NOT NULL,
             updated_at INTEGER NOT NULL DEFAULT (strftime('%s','now'))
           );",
        )?;
        Ok(Self { conn })
    }

    pub fn put_json<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), StorageError> {
        let raw = serde_json::to_string(value).map_err(|source| StorageError::Json {
            key: key.to_string(),
            source,
        })?;
        self.conn.execute(
            "INSERT INTO app_state (state_key, state_json, updated_at)
           VALUES (?1, ?2, strftime('%s','now'))
           ON CONFLICT(state_key)
           DO UPDATE SET
             state_json = excluded.state_json,
             updated_at = excluded.updated_at;",
            params![key, raw],
        )?;
        tracing::debug!(%key, bytes = raw.len(), "state saved");
        Ok(())
    }

    pub fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StorageError> {
        let raw: Option<String> = self
            .conn
            .query_row(
                "SELECT state_json FROM app_state WHERE state_key = ?1 LIMIT 1;",
                params![key],
                |row| row.get(0),
            )
            .optional()?;

        raw.map(|raw| {
            serde_json::from_str(&raw).map_err(|source| StorageError::Json {
                key: key.to_string(),
                source,
            })
        })
        .transpose()
    }

    /// Unix timestamp of the last write to `key`.
    pub fn updated_at(&self, key: &str) -> Result<Option<i64>, StorageError> {
        Ok(self
            .conn
            .query_row(
                "SELECT updated_at FROM app_state WHERE state_key = ?1 LIMIT 1;",
                params![key],
                |row| row.get(0),
            )
            .optional()?)
    }

    pub fn save_history(&self, history: &History) -> Result<(), StorageError> {
        self.put_json(HISTORY_KEY, history)
    }

    pub fn load_history(&self) -> Result<History, StorageError> {
        Ok(self
            .get_json::<Vec<HistoryEntry>>(HISTORY_KEY)?
            .map(History::from_entries)
            .unwrap_or_default())
    }

    pub fn save_services(&self, services: &[Service]) -> Result<(), StorageError> {
        self.put_json(SERVICES_KEY, services)
    }

    pub fn load_services(&self) -> Result<Vec<Service>, StorageError> {
        Ok(self.get_json(SERVICES_KEY)?.unwrap_or_default())
    }

    pub fn save_tests(&self, tests: &[TestCase]) -> Result<(), StorageError> {
        self.put_json(TESTS_KEY, tests)
    }

    pub fn load_tests(&self) -> Result<Vec<TestCase>, StorageError> {
        Ok(self.get_json(TESTS_KEY)?.unwrap_or_default())
    }

    pub fn save_results(&self, results: &[TestResult]) -> Result<(), StorageError> {
        self.put_json(RESULTS_KEY, results)
    }

    pub fn load_results(&self) -> Result<Vec<TestResult>, StorageError> {
        Ok(self.get_json(RESULTS_KEY)?.unwrap_or_default())
    }
}
