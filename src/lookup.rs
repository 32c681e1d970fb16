use std::collections::HashMap;
use std::io::BufRead;
use std::path::Path;

use crate::error::StandoffError;
use crate::fs_util::{self, read_error};
use crate::kvstore::KvStore;

/// Serial number → display name.
pub trait NameLookup {
    fn lookup_name(&self, serial: i64) -> Result<Option<String>, StandoffError>;
}

/// Serial number → raw external identifier.
pub trait IdLookup {
    fn lookup_id(&self, serial: i64) -> Result<Option<String>, StandoffError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoLookup;

impl NameLookup for NoLookup {
    fn lookup_name(&self, _serial: i64) -> Result<Option<String>, StandoffError> {
        Ok(None)
    }
}

impl IdLookup for NoLookup {
    fn lookup_id(&self, _serial: i64) -> Result<Option<String>, StandoffError> {
        Ok(None)
    }
}

/// Per-run memo of lookup results, misses included.
#[derive(Debug)]
pub struct Memo<L> {
    inner: L,
    cache: HashMap<i64, Option<String>>,
}

impl<L> Memo<L> {
    pub fn new(inner: L) -> Self {
        Self {
            inner,
            cache: HashMap::new(),
        }
    }

    pub fn inner(&self) -> &L {
        &self.inner
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    fn get_or_fetch<F>(&mut self, serial: i64, fetch: F) -> Result<Option<String>, StandoffError>
    where
        F: FnOnce(&L, i64) -> Result<Option<String>, StandoffError>,
    {
        if let Some(hit) = self.cache.get(&serial) {
            return Ok(hit.clone());
        }
        let value = fetch(&self.inner, serial)?;
        self.cache.insert(serial, value.clone());
        Ok(value)
    }
}

impl<L: NameLookup> Memo<L> {
    pub fn name(&mut self, serial: i64) -> Result<Option<String>, StandoffError> {
        self.get_or_fetch(serial, |inner, serial| inner.lookup_name(serial))
    }
}

impl<L: IdLookup> Memo<L> {
    pub fn id(&mut self, serial: i64) -> Result<Option<String>, StandoffError> {
        self.get_or_fetch(serial, |inner, serial| inner.lookup_id(serial))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoadReport {
    pub read: usize,
    pub stored: usize,
    pub errors: usize,
}

fn parse_serial(source: &str, line: usize, value: &str) -> Result<i64, StandoffError> {
    value
        .trim()
        .parse::<i64>()
        .map_err(|_| StandoffError::InvalidField {
            source_name: source.to_string(),
            line,
            field: "serial",
            value: value.to_string(),
        })
}

/// `serial<TAB>name` table; the first name seen for a serial wins.
#[derive(Debug, Clone, Default)]
pub struct NameTable {
    names: HashMap<i64, String>,
}

impl NameTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn load(path: &Path) -> Result<Self, StandoffError> {
        let mut table = Self::new();
        table.load_more(path)?;
        Ok(table)
    }

    /// Adds names from another file. Lines that are not valid UTF-8 are
    /// counted and skipped.
    pub fn load_more(&mut self, path: &Path) -> Result<LoadReport, StandoffError> {
        let source = path.display().to_string();
        let reader = fs_util::open_reader(path)?;
        let report = self.read_from(reader, &source)?;
        tracing::info!(
            "read {} names, stored {} from {source} ({} errors)",
            report.read,
            report.stored,
            report.errors
        );
        Ok(report)
    }

    pub fn read_from<R: BufRead>(
        &mut self,
        reader: R,
        source: &str,
    ) -> Result<LoadReport, StandoffError> {
        let mut report = LoadReport::default();
        for (idx, raw) in reader.split(b'\n').enumerate() {
            let line_number = idx + 1;
            let raw = raw.map_err(|err| read_error(source, err))?;
            let Ok(line) = String::from_utf8(raw) else {
                tracing::error!("line {line_number} in {source}: invalid UTF-8");
                report.errors += 1;
                continue;
            };
            let line = line.trim_end();
            let fields: Vec<&str> = line.split('\t').collect();
            if fields.len() != 2 {
                return Err(StandoffError::format(source, line_number, 2, fields.len(), line));
            }
            let serial = parse_serial(source, line_number, fields[0])?;
            if !self.names.contains_key(&serial) {
                self.names.insert(serial, fields[1].to_string());
                report.stored += 1;
            }
            report.read += 1;
        }
        Ok(report)
    }

    pub fn get(&self, serial: i64) -> Option<&str> {
        self.names.get(&serial).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

impl NameLookup for NameTable {
    fn lookup_name(&self, serial: i64) -> Result<Option<String>, StandoffError> {
        Ok(self.get(serial).map(str::to_string))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityRow {
    pub serial: i64,
    pub type_code: i64,
    pub raw_id: String,
}

/// `serial<TAB>type<TAB>id` table in file order; the first row per serial wins.
#[derive(Debug, Clone, Default)]
pub struct EntityTable {
    rows: Vec<EntityRow>,
    index: HashMap<i64, usize>,
}

impl EntityTable {
    pub fn load(path: &Path) -> Result<Self, StandoffError> {
        let source = path.display().to_string();
        let reader = fs_util::open_reader(path)?;
        let (table, report) = Self::read_from(reader, &source)?;
        tracing::info!(
            "read {} entities, stored {} from {source} ({} errors)",
            report.read,
            report.stored,
            report.errors
        );
        Ok(table)
    }

    pub fn read_from<R: BufRead>(
        reader: R,
        source: &str,
    ) -> Result<(Self, LoadReport), StandoffError> {
        let mut table = Self::default();
        let mut report = LoadReport::default();
        for (idx, raw) in reader.split(b'\n').enumerate() {
            let line_number = idx + 1;
            let raw = raw.map_err(|err| read_error(source, err))?;
            let Ok(line) = String::from_utf8(raw) else {
                tracing::error!("line {line_number} in {source}: invalid UTF-8");
                report.errors += 1;
                continue;
            };
            let line = line.trim_end();
            let fields: Vec<&str> = line.split('\t').collect();
            if fields.len() != 3 {
                return Err(StandoffError::format(source, line_number, 3, fields.len(), line));
            }
            let serial = parse_serial(source, line_number, fields[0])?;
            let type_code =
                fields[1]
                    .trim()
                    .parse::<i64>()
                    .map_err(|_| StandoffError::InvalidField {
                        source_name: source.to_string(),
                        line: line_number,
                        field: "type",
                        value: fields[1].to_string(),
                    })?;
            if !table.index.contains_key(&serial) {
                table.index.insert(serial, table.rows.len());
                table.rows.push(EntityRow {
                    serial,
                    type_code,
                    raw_id: fields[2].to_string(),
                });
                report.stored += 1;
            }
            report.read += 1;
        }
        Ok((table, report))
    }

    pub fn get(&self, serial: i64) -> Option<&EntityRow> {
        self.index.get(&serial).map(|&idx| &self.rows[idx])
    }

    pub fn rows(&self) -> &[EntityRow] {
        &self.rows
    }
}

impl IdLookup for EntityTable {
    fn lookup_id(&self, serial: i64) -> Result<Option<String>, StandoffError> {
        Ok(self.get(serial).map(|row| row.raw_id.clone()))
    }
}

/// `serial<TAB>name<TAB>id` dictionary as written by `combine`. Ids are
/// already normalized.
#[derive(Debug, Clone, Default)]
pub struct CombinedTable {
    entries: HashMap<i64, (String, String)>,
}

impl CombinedTable {
    pub fn load(path: &Path) -> Result<Self, StandoffError> {
        let source = path.display().to_string();
        let reader = fs_util::open_reader(path)?;
        let (table, report) = Self::read_from(reader, &source)?;
        tracing::info!(
            "read {} dictionary rows, stored {} from {source} ({} errors)",
            report.read,
            report.stored,
            report.errors
        );
        Ok(table)
    }

    pub fn read_from<R: BufRead>(
        reader: R,
        source: &str,
    ) -> Result<(Self, LoadReport), StandoffError> {
        let mut table = Self::default();
        let mut report = LoadReport::default();
        for (idx, raw) in reader.split(b'\n').enumerate() {
            let line_number = idx + 1;
            let raw = raw.map_err(|err| read_error(source, err))?;
            let Ok(line) = String::from_utf8(raw) else {
                tracing::error!("line {line_number} in {source}: invalid UTF-8");
                report.errors += 1;
                continue;
            };
            let line = line.trim_end();
            let fields: Vec<&str> = line.split('\t').collect();
            if fields.len() != 3 {
                return Err(StandoffError::format(source, line_number, 3, fields.len(), line));
            }
            let serial = parse_serial(source, line_number, fields[0])?;
            if !table.entries.contains_key(&serial) {
                table
                    .entries
                    .insert(serial, (fields[1].to_string(), fields[2].to_string()));
                report.stored += 1;
            }
            report.read += 1;
        }
        Ok((table, report))
    }

    pub fn get(&self, serial: i64) -> Option<(&str, &str)> {
        self.entries
            .get(&serial)
            .map(|(name, id)| (name.as_str(), id.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl NameLookup for CombinedTable {
    fn lookup_name(&self, serial: i64) -> Result<Option<String>, StandoffError> {
        Ok(self.get(serial).map(|(name, _)| name.to_string()))
    }
}

impl IdLookup for CombinedTable {
    fn lookup_id(&self, serial: i64) -> Result<Option<String>, StandoffError> {
        Ok(self.get(serial).map(|(_, id)| id.to_string()))
    }
}

fn is_store_path(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|ext| ext.to_str()),
        Some("db" | "sqlite" | "sqlite3")
    )
}

/// Name source chosen from a path: SQLite stores by extension, TSV otherwise.
#[derive(Debug)]
pub enum NameSource {
    None,
    Table(NameTable),
    Store(KvStore),
}

impl NameSource {
    pub fn open(path: Option<&Path>) -> Result<Self, StandoffError> {
        match path {
            None => Ok(NameSource::None),
            Some(path) if is_store_path(path) => Ok(NameSource::Store(KvStore::open_existing(path)?)),
            Some(path) => Ok(NameSource::Table(NameTable::load(path)?)),
        }
    }
}

impl NameLookup for NameSource {
    fn lookup_name(&self, serial: i64) -> Result<Option<String>, StandoffError> {
        match self {
            NameSource::None => Ok(None),
            NameSource::Table(table) => table.lookup_name(serial),
            NameSource::Store(store) => store.lookup_name(serial),
        }
    }
}

#[derive(Debug)]
pub enum IdSource {
    None,
    Table(EntityTable),
    Store(KvStore),
}

impl IdSource {
    pub fn open(path: Option<&Path>) -> Result<Self, StandoffError> {
        match path {
            None => Ok(IdSource::None),
            Some(path) if is_store_path(path) => Ok(IdSource::Store(KvStore::open_existing(path)?)),
            Some(path) => Ok(IdSource::Table(EntityTable::load(path)?)),
        }
    }
}

impl IdLookup for IdSource {
    fn lookup_id(&self, serial: i64) -> Result<Option<String>, StandoffError> {
        match self {
            IdSource::None => Ok(None),
            IdSource::Table(table) => table.lookup_id(serial),
            IdSource::Store(store) => store.lookup_id(serial),
        }
    }
}
