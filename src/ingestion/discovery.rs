//! Snapshot Discovery
//!
//! Enumerates dated spreadsheet snapshots in a directory. The report date comes from a
//! `_DDMMYYYY` token before the extension, falling back to the file's modification date.

use crate::error::Result;
use chrono::{DateTime, Local, NaiveDate};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

lazy_static::lazy_static! {
    static ref DATE_TOKEN: regex::Regex = regex::Regex::new(r"_(\d{8})\.").unwrap();
}

/// Extensions accepted as tabular snapshot files.
pub const SNAPSHOT_EXTENSIONS: [&str; 6] = ["xlsx", "xlsm", "xlsb", "xls", "ods", "csv"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DateSource {
    FileName,
    ModifiedTime,
}

#[derive(Debug, Clone, Serialize)]
pub struct SnapshotFile {
    pub file_name: String,
    pub report_date: NaiveDate,
    pub path: PathBuf,
    pub date_source: DateSource,
}

/// A candidate file that could not be given a report date.
#[derive(Debug, Clone, Serialize)]
pub struct SkippedFile {
    pub file_name: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Discovery {
    /// Valid snapshots, newest first.
    pub files: Vec<SnapshotFile>,
    pub skipped: Vec<SkippedFile>,
}

impl Discovery {
    pub fn latest(&self) -> Option<&SnapshotFile> {
        self.files.first()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}

/// Extract the `DDMMYYYY` token from names like `Report_16102025.xlsx`.
/// Returns `None` when no token is present or it is not a real calendar date.
pub fn parse_date_from_filename(file_name: &str) -> Option<NaiveDate> {
    let caps = DATE_TOKEN.captures(file_name)?;
    NaiveDate::parse_from_str(caps.get(1)?.as_str(), "%d%m%Y").ok()
}

/// Local calendar date of the file's last modification.
pub fn modified_date(path: &Path) -> Result<NaiveDate> {
    let modified = fs::metadata(path)?.modified()?;
    Ok(DateTime::<Local>::from(modified).date_naive())
}

pub fn is_snapshot_file(file_name: &str) -> bool {
    // Office lock files share the extension of the workbook they guard.
    if file_name.starts_with("~$") || file_name.starts_with('.') {
        return false;
    }
    Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|ext| {
            let ext = ext.to_ascii_lowercase();
            SNAPSHOT_EXTENSIONS.contains(&ext.as_str())
        })
        .unwrap_or(false)
}

/// Scan `directory` for snapshot files. A missing directory yields an empty discovery.
pub fn discover_snapshots(directory: &Path) -> Result<Discovery> {
    let mut discovery = Discovery::default();
    if !directory.is_dir() {
        warn!("Snapshot directory {} does not exist", directory.display());
        return Ok(discovery);
    }

    for entry in fs::read_dir(directory)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let file_name = entry.file_name().to_string_lossy().to_string();
        if !is_snapshot_file(&file_name) {
            continue;
        }

        if let Some(report_date) = parse_date_from_filename(&file_name) {
            discovery.files.push(SnapshotFile {
                file_name,
                report_date,
                path,
                date_source: DateSource::FileName,
            });
            continue;
        }

        match modified_date(&path) {
            Ok(report_date) => {
                debug!(
                    "No date token in {}, using modification date {}",
                    file_name, report_date
                );
                discovery.files.push(SnapshotFile {
                    file_name,
                    report_date,
                    path,
                    date_source: DateSource::ModifiedTime,
                });
            }
            Err(e) => {
                warn!("Skipping {}: no report date ({})", file_name, e);
                discovery.skipped.push(SkippedFile {
                    file_name,
                    reason: e.to_string(),
                });
            }
        }
    }

    discovery.files.sort_by(|a, b| {
        b.report_date
            .cmp(&a.report_date)
            .then_with(|| a.file_name.cmp(&b.file_name))
    });
    Ok(discovery)
}

/// The single newest snapshot in `directory`, if any.
pub fn latest_snapshot(directory: &Path) -> Result<Option<SnapshotFile>> {
    Ok(discover_snapshots(directory)?.files.into_iter().next())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::time::SystemTime;

    #[test]
    fn test_parse_date_from_filename() {
        assert_eq!(
            parse_date_from_filename("AvailabilityTracker_16102025.xlsx"),
            NaiveDate::from_ymd_opt(2025, 10, 16)
        );
        assert_eq!(
            parse_date_from_filename("Report_09102025.csv"),
            NaiveDate::from_ymd_opt(2025, 10, 9)
        );
        assert_eq!(parse_date_from_filename("Report.xlsx"), None);
        // Eight digits that are not a calendar date.
        assert_eq!(parse_date_from_filename("Report_32132025.xlsx"), None);
    }

    #[test]
    fn test_is_snapshot_file() {
        assert!(is_snapshot_file("Report_16102025.xlsx"));
        assert!(is_snapshot_file("Report_16102025.XLS"));
        assert!(is_snapshot_file("export.csv"));
        assert!(!is_snapshot_file("~$Report_16102025.xlsx"));
        assert!(!is_snapshot_file("notes.txt"));
    }

    #[test]
    fn test_discovery_sorted_with_mtime_fallback() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("Report_09102025.csv"), "a\n1\n").unwrap();
        fs::write(dir.path().join("Report_16102025.csv"), "a\n1\n").unwrap();
        fs::write(dir.path().join("undated.csv"), "a\n1\n").unwrap();
        fs::write(dir.path().join("readme.md"), "ignored").unwrap();

        let pinned = Local
            .with_ymd_and_hms(2025, 10, 1, 12, 0, 0)
            .single()
            .unwrap();
        let file = fs::File::options()
            .write(true)
            .open(dir.path().join("undated.csv"))
            .unwrap();
        file.set_modified(SystemTime::from(pinned)).unwrap();

        let discovery = discover_snapshots(dir.path()).unwrap();
        let names: Vec<&str> = discovery.files.iter().map(|f| f.file_name.as_str()).collect();
        assert_eq!(
            names,
            vec!["Report_16102025.csv", "Report_09102025.csv", "undated.csv"]
        );

        let undated = &discovery.files[2];
        assert_eq!(undated.date_source, DateSource::ModifiedTime);
        assert_eq!(undated.report_date, NaiveDate::from_ymd_opt(2025, 10, 1).unwrap());
        assert_eq!(
            discovery.latest().map(|f| f.report_date),
            NaiveDate::from_ymd_opt(2025, 10, 16)
        );
    }

    #[test]
    fn test_missing_directory_is_empty() {
        let discovery = discover_snapshots(Path::new("/definitely/not/here")).unwrap();
        assert!(discovery.is_empty());
    }
}
