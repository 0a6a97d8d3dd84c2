use std::path::Path;

use rusqlite::{Connection, OptionalExtension, params};

use hvac_core::time::now_iso8601;
use hvac_core::{Component, DocumentSnapshot, LogEntry, Severity};

use crate::error::{Result, StoreError};
use crate::schema;

pub struct Store {
    conn: Connection,
}

/// A document row without its snapshot body.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StoredDocument {
    pub path: String,
    pub updated_at: String,
    pub elements: usize,
}

/// A session-log row.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LoggedEntry {
    pub session: String,
    pub entry: LogEntry,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        schema::initialize(&conn)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        schema::initialize(&conn)?;
        Ok(Self { conn })
    }

    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    // --- Metadata ---

    pub fn get_metadata(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row("SELECT value FROM metadata WHERE key = ?1", [key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }

    pub fn set_metadata(&self, key: &str, value: &str) -> Result<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO metadata (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    // --- Documents ---

    /// Insert or replace the snapshot stored under its path.
    pub fn save_document(&self, snapshot: &DocumentSnapshot) -> Result<()> {
        let json = serde_json::to_string(snapshot)?;
        self.conn.execute(
            "INSERT INTO documents (path, snapshot, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(path) DO UPDATE SET snapshot = excluded.snapshot,
                                             updated_at = excluded.updated_at",
            params![snapshot.path, json, now_iso8601()],
        )?;
        tracing::debug!(
            document = %snapshot.path,
            elements = snapshot.elements.len(),
            "document saved"
        );
        Ok(())
    }

    pub fn load_document(&self, path: &str) -> Result<Option<DocumentSnapshot>> {
        let json: Option<String> = self
            .conn
            .query_row(
                "SELECT snapshot FROM documents WHERE path = ?1",
                [path],
                |row| row.get(0),
            )
            .optional()?;
        json.map(|j| serde_json::from_str(&j).map_err(StoreError::from))
            .transpose()
    }

    pub fn list_documents(&self) -> Result<Vec<StoredDocument>> {
        let mut stmt = self
            .conn
            .prepare("SELECT path, snapshot, updated_at FROM documents ORDER BY path")?;
        let rows: Vec<(String, String, String)> = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
            .collect::<std::result::Result<_, _>>()?;

        rows.into_iter()
            .map(|(path, json, updated_at)| {
                let snapshot: DocumentSnapshot = serde_json::from_str(&json)?;
                Ok(StoredDocument {
                    path,
                    updated_at,
                    elements: snapshot.elements.len(),
                })
            })
            .collect()
    }

    /// Returns false if no such document was stored.
    pub fn remove_document(&self, path: &str) -> Result<bool> {
        let n = self
            .conn
            .execute("DELETE FROM documents WHERE path = ?1", [path])?;
        Ok(n > 0)
    }

    // --- Session log ---

    pub fn append_log(&self, session: &str, entries: &[LogEntry]) -> Result<usize> {
        if entries.is_empty() {
            return Ok(0);
        }
        let tx = self.conn.unchecked_transaction()?;
        {
            let mut insert = tx.prepare(
                "INSERT INTO session_log (session, created_at, severity, component, document, message)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            )?;
            for entry in entries {
                insert.execute(params![
                    session,
                    entry.timestamp,
                    entry.severity.to_string(),
                    entry.component.to_string(),
                    entry.document,
                    entry.message,
                ])?;
            }
        }
        tx.commit()?;
        Ok(entries.len())
    }

    /// The newest `limit` entries, oldest first.
    pub fn recent_log(&self, limit: usize) -> Result<Vec<LoggedEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT session, created_at, severity, component, document, message
             FROM session_log ORDER BY id DESC LIMIT ?1",
        )?;
        let rows: Vec<[String; 6]> = stmt
            .query_map([limit as i64], |row| {
                Ok([
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                ])
            })?
            .collect::<std::result::Result<_, _>>()?;

        let mut entries = rows
            .into_iter()
            .map(|[session, timestamp, severity, component, document, message]| {
                let severity = Severity::parse(&severity)
                    .ok_or_else(|| StoreError::InvalidData(format!("unknown severity '{severity}'")))?;
                let component = Component::parse(&component).ok_or_else(|| {
                    StoreError::InvalidData(format!("unknown component '{component}'"))
                })?;
                Ok(LoggedEntry {
                    session,
                    entry: LogEntry {
                        timestamp,
                        severity,
                        component,
                        document,
                        message,
                    },
                })
            })
            .collect::<Result<Vec<_>>>()?;
        entries.reverse();
        Ok(entries)
    }

    pub fn log_len(&self) -> Result<usize> {
        let n: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM session_log", [], |row| row.get(0))?;
        Ok(n as usize)
    }
}
