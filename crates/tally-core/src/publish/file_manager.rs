//! Public report file manager: filesystem access for published results.

use chrono::NaiveDate;
use log::warn;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use super::coalesce::{merge_run, ReportDocument};

/// Filename of the cumulative coalesced document inside a report directory.
pub const COALESCED_REPORT_FILE: &str = "full_report.json";

/// Characters never allowed into a path component.
const RESERVED_FILENAME_CHARACTERS: [char; 10] =
    [' ', ':', '<', '>', '"', '/', '\\', '|', '?', '*'];

const DAY_FILE_FORMAT: &str = "%Y-%m-%d";

/// Filesystem failures are their own error type so callers can tell "the
/// publish step broke" apart from everything else and roll back state that
/// was changed on the assumption the write would succeed.
#[derive(Debug, Error)]
pub enum PublishError {
    #[error("could not access public report at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no public report file at {0}")]
    MissingFile(PathBuf),

    #[error("{0} is not a recurring report directory")]
    NotADirectory(PathBuf),

    #[error("could not encode report document: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Encapsulates every filesystem operation around public reports.
///
/// Stateless apart from the root directory; safe to share.
pub struct PublicReportFileManager {
    root_dir: PathBuf,
}

impl PublicReportFileManager {
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self {
            root_dir: root_dir.into(),
        }
    }

    /// Path for a report's public output: a directory holding one file per
    /// day (plus the cumulative file) when `recurrent`, a single JSON file
    /// otherwise. With `create`, the directory is created on the spot.
    pub fn public_report_path(
        &self,
        report_id: &str,
        recurrent: bool,
        create: bool,
    ) -> Result<PathBuf, PublishError> {
        let mut path = self.root_dir.join("public");
        if recurrent {
            path.push(sanitize(report_id));
            if create {
                fs::create_dir_all(&path).map_err(|source| PublishError::Io {
                    path: path.clone(),
                    source,
                })?;
            }
        } else {
            path.push(format!("{}.json", sanitize(report_id)));
            if create && let Some(parent) = path.parent() {
                fs::create_dir_all(parent).map_err(|source| PublishError::Io {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }
        Ok(path)
    }

    /// Write `data` so that a concurrent reader never observes a partial
    /// file: the content lands in a sibling temp file first and is renamed
    /// into place.
    pub fn write_data(&self, path: &Path, data: &str) -> Result<(), PublishError> {
        let io = |source| PublishError::Io {
            path: path.to_path_buf(),
            source,
        };
        let tmp = temp_path(path);
        fs::write(&tmp, data).map_err(io)?;
        fs::rename(&tmp, path).map_err(io)
    }

    /// Remove one file, failing distinctly if it does not exist.
    pub fn remove_file(&self, path: &Path) -> Result<(), PublishError> {
        if !path.is_file() {
            return Err(PublishError::MissingFile(path.to_path_buf()));
        }
        fs::remove_file(path).map_err(|source| PublishError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Remove a recurring report's whole directory of published files.
    pub fn remove_recurrent_report(&self, report_id: &str) -> Result<(), PublishError> {
        let path = self.public_report_path(report_id, true, false)?;
        if !path.is_dir() {
            return Err(PublishError::NotADirectory(path));
        }
        fs::remove_dir_all(&path).map_err(|source| PublishError::Io { path, source })
    }

    /// Delete per-day files older than the retention window. The cumulative
    /// file is the durable record and is never touched; day files are only
    /// working inputs to it.
    pub fn remove_old_report_files(
        &self,
        report_id: &str,
        retention_days: u32,
        today: NaiveDate,
    ) -> Result<(), PublishError> {
        let path = self.public_report_path(report_id, true, false)?;
        if !path.is_dir() {
            return Err(PublishError::NotADirectory(path));
        }
        let limit = today - chrono::Duration::days(i64::from(retention_days));

        for name in list_dir(&path)? {
            if name == COALESCED_REPORT_FILE {
                continue;
            }
            match parse_day_file_name(&name) {
                Some(day) if day <= limit => self.remove_file(&path.join(&name))?,
                Some(_) => {}
                None => warn!("unexpected file in report directory {path:?}: {name}"),
            }
        }
        Ok(())
    }

    /// Merge every published file of a recurring report into one cumulative
    /// document. The existing cumulative file is merged first so newer
    /// per-day files override it; a file that fails to parse is logged and
    /// skipped rather than failing the whole coalesce.
    pub fn coalesce_recurrent_reports(
        &self,
        report_id: &str,
    ) -> Result<Option<ReportDocument>, PublishError> {
        let path = self.public_report_path(report_id, true, false)?;
        if !path.is_dir() {
            return Err(PublishError::NotADirectory(path));
        }

        let mut names = list_dir(&path)?;
        names.sort();
        if let Some(pos) = names.iter().position(|n| n == COALESCED_REPORT_FILE) {
            let full = names.remove(pos);
            names.insert(0, full);
        }

        let mut coalesced: Option<ReportDocument> = None;
        for name in names {
            let file = path.join(&name);
            if !file.is_file() {
                continue;
            }
            let raw = fs::read_to_string(&file).map_err(|source| PublishError::Io {
                path: file.clone(),
                source,
            })?;
            match serde_json::from_str::<ReportDocument>(&raw) {
                Ok(document) => merge_run(&mut coalesced, document),
                Err(err) => warn!("skipping unparseable report file {file:?}: {err}"),
            }
        }
        Ok(coalesced)
    }
}

/// Replace filesystem-hazard characters and control characters with '_'.
pub fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| {
            if RESERVED_FILENAME_CHARACTERS.contains(&c) || (c as u32) < 32 {
                '_'
            } else {
                c
            }
        })
        .collect()
}

/// Name of the per-day file for one run of a recurring report.
pub fn day_file_name(day: NaiveDate) -> String {
    day.format(DAY_FILE_FORMAT).to_string()
}

pub fn parse_day_file_name(name: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(name, DAY_FILE_FORMAT).ok()
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    name.push_str(".tmp");
    path.with_file_name(name)
}

fn list_dir(path: &Path) -> Result<Vec<String>, PublishError> {
    let io = |source| PublishError::Io {
        path: path.to_path_buf(),
        source,
    };
    let mut names = Vec::new();
    for entry in fs::read_dir(path).map_err(io)? {
        let entry = entry.map_err(io)?;
        names.push(entry.file_name().to_string_lossy().into_owned());
    }
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_replaces_hazard_characters() {
        assert_eq!(sanitize("a b:c/d\\e|f?g*h"), "a_b_c_d_e_f_g_h");
        assert_eq!(sanitize("report-01ABC"), "report-01ABC");
        assert_eq!(sanitize("x\u{0007}y"), "x_y");
    }

    #[test]
    fn day_file_names_round_trip() {
        let day = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        let name = day_file_name(day);
        assert_eq!(name, "2024-03-09");
        assert_eq!(parse_day_file_name(&name), Some(day));
        assert_eq!(parse_day_file_name(COALESCED_REPORT_FILE), None);
    }

    #[test]
    fn paths_are_deterministic() {
        let files = PublicReportFileManager::new("/srv/tally");
        let dir = files.public_report_path("report-1", true, false).unwrap();
        assert_eq!(dir, PathBuf::from("/srv/tally/public/report-1"));

        let file = files.public_report_path("report 1", false, false).unwrap();
        assert_eq!(file, PathBuf::from("/srv/tally/public/report_1.json"));
    }

    #[test]
    fn write_is_atomic_rename_and_remove_is_distinct() {
        let tmp = tempfile::tempdir().unwrap();
        let files = PublicReportFileManager::new(tmp.path());
        let path = files.public_report_path("r1", false, true).unwrap();

        files.write_data(&path, "{}").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "{}");
        // the temp sibling is gone after the rename
        assert!(!temp_path(&path).exists());

        files.remove_file(&path).unwrap();
        let err = files.remove_file(&path).unwrap_err();
        assert!(matches!(err, PublishError::MissingFile(_)));
    }

    #[test]
    fn write_into_missing_directory_is_an_io_error() {
        let tmp = tempfile::tempdir().unwrap();
        let files = PublicReportFileManager::new(tmp.path());
        let path = files.public_report_path("r1", true, false).unwrap();

        let err = files.write_data(&path.join("2024-03-01"), "{}").unwrap_err();
        assert!(matches!(err, PublishError::Io { .. }));
    }

    #[test]
    fn removing_a_missing_recurrent_report_fails_distinctly() {
        let tmp = tempfile::tempdir().unwrap();
        let files = PublicReportFileManager::new(tmp.path());

        let err = files.remove_recurrent_report("0001").unwrap_err();
        assert!(matches!(err, PublishError::NotADirectory(_)));

        files.public_report_path("0001", true, true).unwrap();
        files.remove_recurrent_report("0001").unwrap();
        let err = files.coalesce_recurrent_reports("0001").unwrap_err();
        assert!(matches!(err, PublishError::NotADirectory(_)));
    }

    #[test]
    fn pruning_keeps_the_window_and_the_cumulative_file() {
        let tmp = tempfile::tempdir().unwrap();
        let files = PublicReportFileManager::new(tmp.path());
        let dir = files.public_report_path("r1", true, true).unwrap();

        for name in ["2024-03-01", "2024-03-05", "2024-03-09", COALESCED_REPORT_FILE] {
            files.write_data(&dir.join(name), "{}").unwrap();
        }

        let today = NaiveDate::from_ymd_opt(2024, 3, 12).unwrap();
        files.remove_old_report_files("r1", 10, today).unwrap();

        // limit day is 2024-03-02: the 03-01 file goes, the rest stay
        assert!(!dir.join("2024-03-01").exists());
        assert!(dir.join("2024-03-05").exists());
        assert!(dir.join("2024-03-09").exists());
        assert!(dir.join(COALESCED_REPORT_FILE).exists());
    }
}
