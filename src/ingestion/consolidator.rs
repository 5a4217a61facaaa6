//! Table Consolidator
//!
//! Loads every discovered snapshot, normalizes headers, and concatenates the rows into
//! one `UnifiedTable`. A file that fails to parse is reported and skipped; the load only
//! fails when no file at all could be read.

use crate::error::{AgentError, Result};
use crate::ingestion::discovery::{discover_snapshots, Discovery, SnapshotFile};
use crate::ingestion::normalize::normalize_headers;
use crate::ingestion::sheet_reader::read_sheet;
use crate::table::{SnapshotRows, UnifiedTable};
use serde::Serialize;
use std::path::Path;
use tracing::{info, warn};

/// A snapshot file that could not be loaded.
#[derive(Debug, Clone, Serialize)]
pub struct FileLoadFailure {
    pub file_name: String,
    pub error: String,
}

#[derive(Debug)]
pub struct LoadReport {
    pub table: UnifiedTable,
    pub loaded_files: Vec<String>,
    pub failures: Vec<FileLoadFailure>,
}

impl LoadReport {
    /// Human-readable status: file count and the report-date span.
    pub fn status_line(&self) -> String {
        let dates = self.table.report_dates();
        let span = match (dates.first(), dates.last()) {
            (Some(first), Some(last)) => format!(
                "{} to {}",
                first.format("%Y-%m-%d"),
                last.format("%Y-%m-%d")
            ),
            _ => "no dates".to_string(),
        };
        let noun = if self.loaded_files.len() == 1 { "file" } else { "files" };
        let mut status = format!(
            "Loaded {} {} ({} rows) spanning {}",
            self.loaded_files.len(),
            noun,
            self.table.height(),
            span
        );
        if !self.failures.is_empty() {
            let skipped: Vec<String> = self
                .failures
                .iter()
                .map(|f| format!("{} ({})", f.file_name, f.error))
                .collect();
            status.push_str(&format!(
                "; skipped {} file(s): {}",
                self.failures.len(),
                skipped.join("; ")
            ));
        }
        status
    }
}

pub struct TableConsolidator {
    sheet_name: String,
}

impl TableConsolidator {
    pub fn new(sheet_name: impl Into<String>) -> Self {
        Self {
            sheet_name: sheet_name.into(),
        }
    }

    pub fn sheet_name(&self) -> &str {
        &self.sheet_name
    }

    /// Discover and consolidate every snapshot in `directory`.
    pub fn load_directory(&self, directory: &Path) -> Result<LoadReport> {
        let discovery = discover_snapshots(directory)?;
        self.consolidate(&discovery)
    }

    pub fn consolidate(&self, discovery: &Discovery) -> Result<LoadReport> {
        if discovery.is_empty() {
            return Err(AgentError::Load(
                "No spreadsheet snapshots found".to_string(),
            ));
        }

        let mut snapshots = Vec::new();
        let mut loaded_files = Vec::new();
        let mut failures = Vec::new();

        for file in &discovery.files {
            match self.load_snapshot(file) {
                Ok(snapshot) => {
                    info!(
                        "📄 Loaded {} ({} rows, report date {})",
                        file.file_name,
                        snapshot.rows.len(),
                        file.report_date
                    );
                    loaded_files.push(file.file_name.clone());
                    snapshots.push(snapshot);
                }
                Err(e) => {
                    warn!("Skipping {}: {}", file.file_name, e);
                    failures.push(FileLoadFailure {
                        file_name: file.file_name.clone(),
                        error: e.to_string(),
                    });
                }
            }
        }

        if snapshots.is_empty() {
            let reasons: Vec<String> = failures
                .iter()
                .map(|f| format!("{}: {}", f.file_name, f.error))
                .collect();
            return Err(AgentError::Load(format!(
                "None of the {} snapshot file(s) could be loaded ({})",
                failures.len(),
                reasons.join("; ")
            )));
        }

        let table = UnifiedTable::from_snapshots(&snapshots)?;
        Ok(LoadReport {
            table,
            loaded_files,
            failures,
        })
    }

    fn load_snapshot(&self, file: &SnapshotFile) -> Result<SnapshotRows> {
        let sheet = read_sheet(&file.path, &self.sheet_name)?;
        Ok(SnapshotRows {
            source_file: file.file_name.clone(),
            report_date: file.report_date,
            columns: normalize_headers(&sheet.headers),
            rows: sheet.rows,
        })
    }
}
