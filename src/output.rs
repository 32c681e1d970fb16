use std::collections::HashSet;
use std::fs;
use std::io::{self, Write};

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;

use crate::app::{ProgressEvent, ProgressSink};
use crate::compare::CompareReport;
use crate::error::StandoffError;
use crate::kvstore::KvStore;
use crate::standoff::{AnnotationGroup, render};

/// Destination for converted documents.
pub trait StandoffSink {
    fn write(
        &mut self,
        stem: &str,
        text: &str,
        groups: &[AnnotationGroup],
    ) -> Result<(), StandoffError>;
}

/// Document text followed by its annotation lines on one stream.
pub struct ConsoleSink<W> {
    out: W,
}

impl<W: Write> ConsoleSink<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

impl ConsoleSink<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> StandoffSink for ConsoleSink<W> {
    fn write(
        &mut self,
        _stem: &str,
        text: &str,
        groups: &[AnnotationGroup],
    ) -> Result<(), StandoffError> {
        let to_fs = |err: io::Error| StandoffError::Filesystem(err.to_string());
        writeln!(self.out, "{text}").map_err(to_fs)?;
        self.out.write_all(render(groups).as_bytes()).map_err(to_fs)?;
        Ok(())
    }
}

/// `<stem>.txt` / `<stem>.ann` pairs, optionally sharded into
/// sub-directories named by the first characters of the stem.
pub struct DirectorySink {
    root: Utf8PathBuf,
    shard_prefix_len: Option<usize>,
    created: HashSet<Utf8PathBuf>,
}

impl DirectorySink {
    pub fn new(root: impl Into<Utf8PathBuf>, shard_prefix_len: Option<usize>) -> Self {
        Self {
            root: root.into(),
            shard_prefix_len,
            created: HashSet::new(),
        }
    }

    pub fn document_dir(&self, stem: &str) -> Utf8PathBuf {
        match self.shard_prefix_len {
            Some(len) if len > 0 => {
                let prefix: String = stem.chars().take(len).collect();
                self.root.join(prefix)
            }
            _ => self.root.clone(),
        }
    }

    fn ensure_dir(&mut self, dir: &Utf8Path) -> Result<(), StandoffError> {
        if self.created.contains(dir) {
            return Ok(());
        }
        fs::create_dir_all(dir.as_std_path())
            .map_err(|err| StandoffError::Filesystem(format!("create {dir}: {err}")))?;
        self.created.insert(dir.to_path_buf());
        Ok(())
    }
}

impl StandoffSink for DirectorySink {
    fn write(
        &mut self,
        stem: &str,
        text: &str,
        groups: &[AnnotationGroup],
    ) -> Result<(), StandoffError> {
        let dir = self.document_dir(stem);
        self.ensure_dir(&dir)?;
        let txt_path = dir.join(format!("{stem}.txt"));
        let ann_path = dir.join(format!("{stem}.ann"));
        fs::write(txt_path.as_std_path(), format!("{text}\n"))
            .map_err(|err| StandoffError::Filesystem(format!("write {txt_path}: {err}")))?;
        fs::write(ann_path.as_std_path(), render(groups))
            .map_err(|err| StandoffError::Filesystem(format!("write {ann_path}: {err}")))?;
        Ok(())
    }
}

/// Stores both files of a document in a key-value store, keyed by file name.
pub struct KvSink {
    store: KvStore,
}

impl KvSink {
    pub fn new(store: KvStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &KvStore {
        &self.store
    }
}

impl StandoffSink for KvSink {
    fn write(
        &mut self,
        stem: &str,
        text: &str,
        groups: &[AnnotationGroup],
    ) -> Result<(), StandoffError> {
        self.store.put(&format!("{stem}.txt"), &format!("{text}\n"))?;
        self.store.put(&format!("{stem}.ann"), &render(groups))?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Text,
    Json,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_report(report: &CompareReport) -> io::Result<()> {
        Self::print_json(report)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value)
            .map_err(|err| io::Error::new(io::ErrorKind::Other, err))?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

/// Reports progress events through the log.
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn event(&self, event: ProgressEvent) {
        match event.elapsed {
            Some(elapsed) => tracing::info!("{} ({} ms)", event.message, elapsed.as_millis()),
            None => tracing::info!("{}", event.message),
        }
    }
}
