//! SQLite-backed sink for analysis results.
//!
//! One row per (object uid, analysis name). The result is stored verbatim as
//! JSON, so whatever the engine produced is exactly what is read back.

use std::path::Path;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use thiserror::Error;

use crate::model::{FirmwareObject, PluginResult};

/// Minimum schema version we know how to handle.
///
/// `0` means "no schema yet" (fresh DB).
const MIN_SUPPORTED_SCHEMA_VERSION: i32 = 0;

/// Latest schema version this crate knows about.
pub const CURRENT_SCHEMA_VERSION: i32 = 2;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLite error: {0}")]
    Sql(#[from] rusqlite::Error),

    #[error("Failed to (de)serialize stored result: {0}")]
    Json(#[from] serde_json::Error),

    /// The database was created with a newer schema version than we support.
    #[error(
        "Unsupported schema version {found}; supported range is {min_supported}..={max_supported}"
    )]
    UnsupportedSchemaVersion { found: i32, min_supported: i32, max_supported: i32 },
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Listing entry for a stored result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredResult {
    pub object_uid: String,
    pub plugin: String,
    pub executable: bool,
    /// RFC 3339 timestamp of the last write.
    pub stored_at: String,
}

#[derive(Debug)]
pub struct ResultStore {
    conn: Connection,
}

impl ResultStore {
    /// Open (or create) a result store at the given path and ensure the schema exists.
    pub fn open(path: &Path) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        apply_migrations(&conn)?;
        Ok(Self { conn })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Insert or replace the result of `plugin` for `object_uid`.
    pub fn save(&self, object_uid: &str, plugin: &str, result: &PluginResult) -> StoreResult<()> {
        let json = serde_json::to_string(result)?;
        let stored_at = Utc::now().to_rfc3339();
        self.conn.execute(
            r#"
            INSERT INTO analysis_results (object_uid, plugin, result_json, executable, stored_at)
            VALUES (?1, ?2, ?3, ?4, ?5)
            ON CONFLICT (object_uid, plugin) DO UPDATE SET
                result_json = excluded.result_json,
                executable  = excluded.executable,
                stored_at   = excluded.stored_at
            "#,
            params![object_uid, plugin, json, result.is_executable(), stored_at],
        )?;
        Ok(())
    }

    /// Persist every analysis result recorded on `object`. Returns how many were written.
    pub fn save_object(&self, object: &FirmwareObject) -> StoreResult<usize> {
        for (plugin, result) in &object.processed_analysis {
            self.save(&object.uid, plugin, result)?;
        }
        Ok(object.processed_analysis.len())
    }

    pub fn load(&self, object_uid: &str, plugin: &str) -> StoreResult<Option<PluginResult>> {
        let json: Option<String> = self
            .conn
            .query_row(
                r#"
                SELECT result_json
                FROM analysis_results
                WHERE object_uid = ?1 AND plugin = ?2
                "#,
                params![object_uid, plugin],
                |row| row.get(0),
            )
            .optional()?;
        match json {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    /// List stored results ordered by object uid, then analysis name.
    pub fn list(&self) -> StoreResult<Vec<StoredResult>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT object_uid, plugin, executable, stored_at
            FROM analysis_results
            ORDER BY object_uid, plugin
            "#,
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(StoredResult {
                object_uid: row.get(0)?,
                plugin: row.get(1)?,
                executable: row.get(2)?,
                stored_at: row.get(3)?,
            })
        })?;

        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }
}

fn apply_migrations(conn: &Connection) -> StoreResult<()> {
    let mut current_version = current_schema_version(conn)?;

    if current_version > CURRENT_SCHEMA_VERSION {
        return Err(StoreError::UnsupportedSchemaVersion {
            found: current_version,
            min_supported: MIN_SUPPORTED_SCHEMA_VERSION,
            max_supported: CURRENT_SCHEMA_VERSION,
        });
    }

    if current_version == 0 {
        conn.execute_batch(
            r#"
            BEGIN;
            CREATE TABLE IF NOT EXISTS analysis_results (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                object_uid  TEXT NOT NULL,
                plugin      TEXT NOT NULL,
                result_json TEXT NOT NULL,
                stored_at   TEXT NOT NULL,
                UNIQUE (object_uid, plugin)
            );

            PRAGMA user_version = 1;
            COMMIT;
            "#,
        )?;
        current_version = 1;
    }

    if current_version < 2 {
        // Denormalized verdict so listings do not have to parse every result.
        conn.execute_batch(
            r#"
            BEGIN;
            ALTER TABLE analysis_results ADD COLUMN executable INTEGER NOT NULL DEFAULT 0;
            UPDATE analysis_results
               SET executable = 1
             WHERE result_json LIKE '%"summary":["executable"]%';
            PRAGMA user_version = 2;
            COMMIT;
            "#,
        )?;
    }

    Ok(())
}

fn current_schema_version(conn: &Connection) -> StoreResult<i32> {
    let version: i32 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
    Ok(version)
}
