use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::io::{self, BufRead, BufReader, Lines};
use std::path::Path;

use flate2::read::MultiGzDecoder;

use crate::error::StandoffError;

pub type LineSource = Lines<Box<dyn BufRead>>;

/// Opens a file for buffered reading, decompressing `.gz` files on the fly.
pub fn open_reader(path: &Path) -> Result<Box<dyn BufRead>, StandoffError> {
    let file = fs::File::open(path)
        .map_err(|err| StandoffError::Filesystem(format!("open {}: {err}", path.display())))?;
    if path.extension().and_then(|ext| ext.to_str()) == Some("gz") {
        Ok(Box::new(BufReader::new(MultiGzDecoder::new(file))))
    } else {
        Ok(Box::new(BufReader::new(file)))
    }
}

pub fn open_lines(path: &Path) -> Result<LineSource, StandoffError> {
    Ok(open_reader(path)?.lines())
}

pub fn read_error(source: &str, err: io::Error) -> StandoffError {
    StandoffError::Filesystem(format!("read {source}: {err}"))
}

/// Entry names of a directory.
pub fn list_entries(path: &Path) -> Result<BTreeSet<String>, StandoffError> {
    let entries = fs::read_dir(path)
        .map_err(|err| StandoffError::Filesystem(format!("list {}: {err}", path.display())))?;
    let mut names = BTreeSet::new();
    for entry in entries {
        let entry = entry.map_err(|err| StandoffError::Filesystem(err.to_string()))?;
        names.insert(entry.file_name().to_string_lossy().into_owned());
    }
    Ok(names)
}

/// Reads one identifier per line.
pub fn read_id_set(path: &Path) -> Result<HashSet<String>, StandoffError> {
    let source = path.display().to_string();
    let mut ids = HashSet::new();
    for line in open_lines(path)? {
        let line = line.map_err(|err| read_error(&source, err))?;
        ids.insert(line);
    }
    Ok(ids)
}

/// True when `name` has the extension given by `suffix` (e.g. `.ann`).
pub fn has_suffix(name: &str, suffix: &str) -> bool {
    Path::new(name)
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()) == suffix)
        .unwrap_or(false)
}
