//! Append-only JSONL record store with resume-safe deduplication.
//!
//! Each append is one `write_all` of a complete, newline-terminated line. A
//! crash mid-write leaves at most a truncated final line, which the next
//! load skips like any other malformed line.

use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::Deserialize;
use tracing::{debug, info};

use crate::errors::{AnecdotError, AnecdotResult};
use crate::record::schema::DataRecord;

#[derive(Deserialize)]
struct IdOnly {
    id: String,
}

struct StoreState {
    existing_ids: HashSet<String>,
    file: Option<File>,
    /// The file ends in a partial line that must be terminated before the
    /// next append.
    needs_newline: bool,
}

/// Deduplicating JSONL writer owning one output file.
pub struct RecordStore {
    path: PathBuf,
    state: Mutex<StoreState>,
}

impl RecordStore {
    /// Open (or prepare to create) the store at `path`, loading the ids of
    /// every parseable line already in the file.
    pub fn open(path: impl AsRef<Path>) -> AnecdotResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let (existing_ids, needs_newline) = match File::open(&path) {
            Ok(file) => load_existing_ids(file)?,
            Err(e) if e.kind() == io::ErrorKind::NotFound => (HashSet::new(), false),
            Err(e) => return Err(e.into()),
        };
        info!(
            path = %path.display(),
            existing = existing_ids.len(),
            "record store ready"
        );

        Ok(Self {
            path,
            state: Mutex::new(StoreState {
                existing_ids,
                file: None,
                needs_newline,
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_duplicate(&self, id: &str) -> bool {
        self.state.lock().existing_ids.contains(id)
    }

    pub fn count_existing(&self) -> usize {
        self.state.lock().existing_ids.len()
    }

    /// Append `record` unless its id is already present.
    ///
    /// Returns `Ok(false)` for duplicates without touching the file. Schema
    /// violations and I/O failures are errors.
    pub fn append(&self, record: &DataRecord) -> AnecdotResult<bool> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        if state.existing_ids.contains(&record.id) {
            return Ok(false);
        }
        record.validate()?;
        let json = record.to_json()?;

        if state.file.is_none() {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)?;
            state.file = Some(file);
        }
        if let Some(file) = state.file.as_mut() {
            write_line(file, &mut state.needs_newline, &json).map_err(|e| self.write_error(e))?;
        }

        state.existing_ids.insert(record.id.clone());
        Ok(true)
    }

    fn write_error(&self, err: io::Error) -> AnecdotError {
        AnecdotError::Io(io::Error::new(
            err.kind(),
            format!("cannot write to {}: {err}", self.path.display()),
        ))
    }
}

/// Write `json` as one complete line. Until the write succeeds the output is
/// treated as ending mid-line, so a short write is terminated by the next call.
fn write_line<W: Write>(out: &mut W, needs_newline: &mut bool, json: &str) -> io::Result<()> {
    let mut line = String::with_capacity(json.len() + 2);
    if *needs_newline {
        line.push('\n');
    }
    line.push_str(json);
    line.push('\n');

    *needs_newline = true;
    out.write_all(line.as_bytes())?;
    out.flush()?;
    *needs_newline = false;
    Ok(())
}

/// Collect ids from every line that parses as a JSON object with a string
/// `id`, and report whether the file ends without a newline.
fn load_existing_ids(mut file: File) -> AnecdotResult<(HashSet<String>, bool)> {
    let needs_newline = ends_without_newline(&mut file)?;
    let mut reader = BufReader::new(file);
    let mut ids = HashSet::new();
    let mut buf = Vec::new();
    let mut line_no = 0usize;

    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            break;
        }
        line_no += 1;
        let trimmed = buf.trim_ascii();
        if trimmed.is_empty() {
            continue;
        }
        match serde_json::from_slice::<IdOnly>(trimmed) {
            Ok(entry) => {
                ids.insert(entry.id);
            }
            Err(e) => debug!(line = line_no, error = %e, "skipping malformed JSONL line"),
        }
    }
    Ok((ids, needs_newline))
}

fn ends_without_newline(file: &mut File) -> io::Result<bool> {
    let len = file.metadata()?.len();
    if len == 0 {
        return Ok(false);
    }
    file.seek(SeekFrom::Start(len - 1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    file.seek(SeekFrom::Start(0))?;
    Ok(last[0] != b'\n')
}

/// Stream every parseable record from a JSONL file, skipping lines that are
/// not valid records.
pub fn read_records(path: impl AsRef<Path>) -> AnecdotResult<Vec<DataRecord>> {
    let reader = BufReader::new(File::open(path.as_ref())?);
    let mut records = Vec::new();
    for (idx, line) in reader.split(b'\n').enumerate() {
        let line = line?;
        let trimmed = line.trim_ascii();
        if trimmed.is_empty() {
            continue;
        }
        match serde_json::from_slice::<DataRecord>(trimmed) {
            Ok(record) => records.push(record),
            Err(e) => debug!(line = idx + 1, error = %e, "skipping unreadable record"),
        }
    }
    Ok(records)
}
