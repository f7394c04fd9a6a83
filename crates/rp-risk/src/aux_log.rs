//! Append-only auxiliary alert log.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use tracing::debug;

use rp_types::{AuxLog, AuxLogEntry, SinkError};

/// Writes one tab-separated line per entry:
/// `timestamp\ttitle\tmessage\tmetadata-json`.
pub struct FileAuxLog {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileAuxLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Tabs and newlines inside fields are replaced so every entry stays on
    /// one line with four columns.
    pub fn format_line(entry: &AuxLogEntry) -> String {
        format!(
            "{}Z\t{}\t{}\t{}\n",
            entry.timestamp.format("%Y-%m-%dT%H:%M:%S%.6f"),
            sanitize(&entry.title),
            sanitize(&entry.message),
            entry.metadata
        )
    }
}

fn sanitize(field: &str) -> String {
    field.replace(['\t', '\n', '\r'], " ")
}

impl AuxLog for FileAuxLog {
    fn append(&self, entry: &AuxLogEntry) -> Result<(), SinkError> {
        let line = Self::format_line(entry);
        let _guard = self.write_lock.lock();
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| SinkError::AuxLog {
                message: format!("{}: {e}", self.path.display()),
            })?;
        file.write_all(line.as_bytes()).map_err(|e| SinkError::AuxLog {
            message: format!("{}: {e}", self.path.display()),
        })?;
        debug!(path = %self.path.display(), title = %entry.title, "Aux log entry appended");
        Ok(())
    }
}
