//! Daily event files under `<town>/warden/logs/`.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::NaiveDate;
use tracing::warn;

use super::{AuditEntry, AuditLogger};
use crate::{AppError, Result};

/// The file currently appended to.
struct OpenDay {
    date: NaiveDate,
    out: BufWriter<File>,
}

/// Appends supervisor actions as JSON lines to `<log_dir>/events-YYYY-MM-DD.jsonl`.
///
/// An entry lands in the file of the day it was recorded, not the day it was
/// written.
pub struct JsonlAuditWriter {
    log_dir: PathBuf,
    open: Mutex<Option<OpenDay>>,
}

impl JsonlAuditWriter {
    /// Writer storing files in `log_dir`, creating it if needed.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Io`] if the directory cannot be created.
    pub fn new(log_dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&log_dir).map_err(|err| {
            AppError::Io(format!(
                "failed to create event log directory {}: {err}",
                log_dir.display()
            ))
        })?;
        Ok(Self {
            log_dir,
            open: Mutex::new(None),
        })
    }

    /// Path of the file holding events recorded on `date`.
    #[must_use]
    pub fn file_for_date(log_dir: &Path, date: NaiveDate) -> PathBuf {
        log_dir.join(format!("events-{date}.jsonl"))
    }

    /// Entries recorded on `date`, oldest first.
    ///
    /// A day without a file has no entries. Lines that do not parse, such as
    /// one cut short by a crash, are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::Io`] if an existing file cannot be read.
    pub fn read_day(log_dir: &Path, date: NaiveDate) -> Result<Vec<AuditEntry>> {
        let path = Self::file_for_date(log_dir, date);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(AppError::Io(format!(
                    "failed to read {}: {err}",
                    path.display()
                )))
            }
        };
        Ok(raw
            .lines()
            .filter(|line| !line.trim().is_empty())
            .filter_map(|line| match serde_json::from_str(line) {
                Ok(entry) => Some(entry),
                Err(err) => {
                    warn!(path = %path.display(), %err, "skipping unreadable event line");
                    None
                }
            })
            .collect())
    }

    fn open_day(&self, date: NaiveDate) -> Result<OpenDay> {
        let path = Self::file_for_date(&self.log_dir, date);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|err| AppError::Io(format!("failed to open {}: {err}", path.display())))?;
        Ok(OpenDay {
            date,
            out: BufWriter::new(file),
        })
    }
}

impl AuditLogger for JsonlAuditWriter {
    fn log_entry(&self, entry: AuditEntry) -> Result<()> {
        let date = entry.timestamp.date_naive();
        let line = serde_json::to_string(&entry)
            .map_err(|err| AppError::Io(format!("failed to serialize event: {err}")))?;

        let mut open = self
            .open
            .lock()
            .map_err(|_| AppError::Io("event writer mutex poisoned".to_owned()))?;
        let day = match open.take() {
            Some(day) if day.date == date => day,
            _ => self.open_day(date)?,
        };
        let day = open.insert(day);

        writeln!(day.out, "{line}")
            .and_then(|()| day.out.flush())
            .map_err(|err| {
                warn!(
                    event_type = entry.event_type.as_str(),
                    session = entry.session.as_deref().unwrap_or_default(),
                    %err,
                    "failed to write event log entry"
                );
                AppError::Io(format!("event write failed: {err}"))
            })
    }
}
