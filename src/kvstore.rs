//! SQLite-backed key-value store.
//!
//! Used as a lookup source for serial → name / id mappings and as an output
//! sink for converted documents.

use std::io::BufRead;
use std::path::Path;
use std::time::Instant;

use rusqlite::{Connection, OptionalExtension, params};

use crate::error::StandoffError;
use crate::fs_util::read_error;
use crate::lookup::{IdLookup, NameLookup};

const CREATE_TABLE: &str =
    "CREATE TABLE IF NOT EXISTS kv (key TEXT PRIMARY KEY, value TEXT NOT NULL)";

#[derive(Debug)]
pub struct KvStore {
    conn: Connection,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BuildReport {
    pub read: usize,
    pub stored: usize,
}

impl KvStore {
    /// Opens or creates a store at `path`.
    pub fn open(path: &Path) -> Result<Self, StandoffError> {
        let conn = Connection::open(path)?;
        conn.execute(CREATE_TABLE, [])?;
        tracing::debug!("opened key-value store {}", path.display());
        Ok(Self { conn })
    }

    /// Opens a store that must already exist.
    pub fn open_existing(path: &Path) -> Result<Self, StandoffError> {
        if !path.exists() {
            return Err(StandoffError::Store(format!(
                "no such file: '{}'",
                path.display()
            )));
        }
        Self::open(path)
    }

    pub fn open_in_memory() -> Result<Self, StandoffError> {
        let conn = Connection::open_in_memory()?;
        conn.execute(CREATE_TABLE, [])?;
        Ok(Self { conn })
    }

    pub fn get(&self, key: &str) -> Result<Option<String>, StandoffError> {
        let value = self
            .conn
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }

    pub fn put(&self, key: &str, value: &str) -> Result<(), StandoffError> {
        self.conn.execute(
            "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
            params![key, value],
        )?;
        Ok(())
    }

    pub fn len(&self) -> Result<usize, StandoffError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM kv", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub fn is_empty(&self) -> Result<bool, StandoffError> {
        Ok(self.len()? == 0)
    }

    /// Loads `key<TAB>value` lines with integer keys, keeping the first value
    /// per key. Everything is committed in one transaction.
    pub fn build_from_tsv<R: BufRead>(
        &mut self,
        reader: R,
        source: &str,
    ) -> Result<BuildReport, StandoffError> {
        let started_at = Instant::now();
        let tx = self.conn.transaction()?;
        let mut report = BuildReport::default();
        {
            let mut insert =
                tx.prepare("INSERT OR IGNORE INTO kv (key, value) VALUES (?1, ?2)")?;
            for (idx, line) in reader.lines().enumerate() {
                let line_number = idx + 1;
                let line = line.map_err(|err| read_error(source, err))?;
                let fields: Vec<&str> = line.split('\t').collect();
                if fields.len() != 2 {
                    return Err(StandoffError::format(
                        source,
                        line_number,
                        2,
                        fields.len(),
                        &line,
                    ));
                }
                let key = fields[0]
                    .parse::<i64>()
                    .map_err(|_| StandoffError::InvalidField {
                        source_name: source.to_string(),
                        line: line_number,
                        field: "key",
                        value: fields[0].to_string(),
                    })?;
                report.stored += insert.execute(params![key.to_string(), fields[1]])?;
                report.read += 1;
                if report.read % 1024 == 0 {
                    tracing::debug!("read {} lines from {source}", report.read);
                }
            }
        }
        tx.commit()?;
        tracing::info!(
            "read {}, stored {} unique from {source} in {} ms",
            report.read,
            report.stored,
            started_at.elapsed().as_millis()
        );
        Ok(report)
    }
}

impl NameLookup for KvStore {
    fn lookup_name(&self, serial: i64) -> Result<Option<String>, StandoffError> {
        self.get(&serial.to_string())
    }
}

impl IdLookup for KvStore {
    fn lookup_id(&self, serial: i64) -> Result<Option<String>, StandoffError> {
        self.get(&serial.to_string())
    }
}
