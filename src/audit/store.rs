//! Append-only history file (JSONL).
//!
//! One line per audit event. An explicitly configured file is created on
//! first write; the default file is only appended to when someone has
//! already created it, so a fresh install does not litter the working
//! directory.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{info, warn};

use super::types::AuditEvent;

/// History file used when none is configured.
pub const DEFAULT_HISTORY_FILE: &str = "history.jsonl";

#[derive(Error, Debug)]
pub enum HistoryStoreError {
    #[error("History file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize audit event: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// Outcome of a single append.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    Written,
    /// The file does not exist and may not be created.
    Skipped,
}

pub struct HistoryStore {
    path: PathBuf,
    create_if_missing: bool,
    writer: Option<BufWriter<File>>,
    reported_missing: bool,
}

impl HistoryStore {
    pub fn new(path: impl Into<PathBuf>, create_if_missing: bool) -> Self {
        Self {
            path: path.into(),
            create_if_missing,
            writer: None,
            reported_missing: false,
        }
    }

    /// Explicit path: created when missing. No path: the default file,
    /// used only if it exists.
    pub fn from_config(history_file: Option<&Path>) -> Self {
        match history_file {
            Some(path) => {
                info!(path = %path.display(), "Using history file");
                Self::new(path, true)
            }
            None => Self::new(DEFAULT_HISTORY_FILE, false),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one event as a JSON line.
    pub fn append(&mut self, event: &AuditEvent) -> Result<AppendOutcome, HistoryStoreError> {
        let line = serde_json::to_string(event)?;
        let Some(writer) = self.writer()? else {
            return Ok(AppendOutcome::Skipped);
        };
        writeln!(writer, "{}", line)?;
        Ok(AppendOutcome::Written)
    }

    pub fn flush(&mut self) -> Result<(), HistoryStoreError> {
        if let Some(writer) = self.writer.as_mut() {
            writer.flush()?;
        }
        Ok(())
    }

    fn writer(&mut self) -> Result<Option<&mut BufWriter<File>>, HistoryStoreError> {
        if self.writer.is_none() {
            if !self.create_if_missing && !self.path.is_file() {
                if !self.reported_missing {
                    info!(
                        path = %self.path.display(),
                        "Not writing to history file, because it does not exist"
                    );
                    self.reported_missing = true;
                }
                return Ok(None);
            }
            let file = OpenOptions::new()
                .create(self.create_if_missing)
                .append(true)
                .open(&self.path)?;
            self.writer = Some(BufWriter::new(file));
        }
        Ok(self.writer.as_mut())
    }
}

impl Drop for HistoryStore {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            warn!(error = %e, path = %self.path.display(), "History flush on close failed");
        }
    }
}
