//! Append-only CSV audit log with one row per file.

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use anyhow::{Context, Result};
use csv::Writer;

use crate::archive::types::AuditRecord;

/// Column names of the audit CSV.
pub const AUDIT_HEADER: [&str; 8] = [
    "Timestamp",
    "OriginalPath",
    "Status",
    "DetectedFilmID",
    "DetectedFilmName",
    "DetectedCategory",
    "NewPath",
    "Reason",
];

/// Writes audit records as soon as each file outcome is known.
///
/// Every row is flushed so the log can be followed during a run.
pub struct AuditLogger {
    path: PathBuf,
    writer: Mutex<Writer<File>>,
}

impl AuditLogger {
    /// Create the log file and write the header row.
    ///
    /// # Errors
    /// Returns an error if the file or its parent directory cannot be created.
    pub fn create(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create log directory: {}", parent.display()))?;
        }
        let file = File::create(path).with_context(|| format!("Failed to create audit log: {}", path.display()))?;
        let mut writer = Writer::from_writer(file);
        writer.write_record(AUDIT_HEADER)?;
        writer.flush()?;

        Ok(Self {
            path: path.to_path_buf(),
            writer: Mutex::new(writer),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one record and flush it to disk.
    ///
    /// # Errors
    /// Returns an error if the row cannot be written.
    pub fn log(&self, record: &AuditRecord) -> Result<()> {
        let row = record_to_row(record);
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| anyhow::anyhow!("Audit log writer lock poisoned"))?;
        writer.write_record(&row).context("Failed to write audit record")?;
        writer.flush().context("Failed to flush audit log")?;
        Ok(())
    }

    /// Write a record, printing a warning instead of failing.
    pub fn log_or_warn(&self, record: &AuditRecord) {
        if let Err(error) = self.log(record) {
            crate::print_error!("{error:#}");
        }
    }
}

fn record_to_row(record: &AuditRecord) -> [String; 8] {
    [
        record.timestamp.clone(),
        crate::path_to_string(&record.original_path),
        record.status.to_string(),
        record.film_id.clone().unwrap_or_default(),
        record.film_name.clone().unwrap_or_default(),
        record.category.map(|category| category.to_string()).unwrap_or_default(),
        record.new_path.as_deref().map(crate::path_to_string).unwrap_or_default(),
        record.reason.clone().unwrap_or_default(),
    ]
}
