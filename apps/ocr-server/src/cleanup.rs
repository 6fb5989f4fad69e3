//! Maintenance Sweep
//!
//! Age-based removal of staged uploads and per-request output directories.
//! Not transactional: a sweep interrupted halfway can simply be run again.

use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

/// What a sweep removed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepReport {
    pub files_removed: usize,
    pub directories_removed: usize,
    /// Entries removed from the upload area
    pub uploads: usize,
    /// Directories removed from the output area
    pub outputs: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum SweepError {
    #[error("Failed to read {path}: {source}")]
    ReadDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Remove upload entries and output directories last modified more than
/// `max_age_days` ago. Entries newer than that are never touched.
pub async fn sweep(
    upload_dir: &Path,
    output_dir: &Path,
    max_age_days: u32,
) -> Result<SweepReport, SweepError> {
    let max_age = Duration::from_secs(u64::from(max_age_days) * SECONDS_PER_DAY);
    let cutoff = SystemTime::now()
        .checked_sub(max_age)
        .unwrap_or(SystemTime::UNIX_EPOCH);

    let mut report = SweepReport::default();
    let uploads = sweep_area(upload_dir, cutoff, true, &mut report).await?;
    let outputs = sweep_area(output_dir, cutoff, false, &mut report).await?;
    report.uploads = uploads;
    report.outputs = outputs;

    tracing::info!(
        days = max_age_days,
        files = report.files_removed,
        directories = report.directories_removed,
        "Cleaned up old files"
    );
    Ok(report)
}

/// Sweep the direct entries of `dir`. Plain files are only considered when
/// `include_files` is set. Returns the number of entries removed.
async fn sweep_area(
    dir: &Path,
    cutoff: SystemTime,
    include_files: bool,
    report: &mut SweepReport,
) -> Result<usize, SweepError> {
    let read_err = |source| SweepError::ReadDir {
        path: dir.to_path_buf(),
        source,
    };

    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(read_err(e)),
    };

    let mut removed = 0;
    while let Some(entry) = entries.next_entry().await.map_err(read_err)? {
        let path = entry.path();
        let metadata = match entry.metadata().await {
            Ok(metadata) => metadata,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable entry");
                continue;
            }
        };

        let is_dir = metadata.is_dir();
        if !is_dir && !include_files {
            continue;
        }
        match metadata.modified() {
            Ok(modified) if modified < cutoff => {}
            _ => continue,
        }

        let result = if is_dir {
            tokio::fs::remove_dir_all(&path).await
        } else {
            tokio::fs::remove_file(&path).await
        };

        match result {
            Ok(()) => {
                removed += 1;
                if is_dir {
                    report.directories_removed += 1;
                } else {
                    report.files_removed += 1;
                }
                tracing::debug!(path = %path.display(), "Removed expired entry");
            }
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "Failed to remove expired entry"),
        }
    }

    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use tempfile::TempDir;

    fn age(path: &Path, days: u64) {
        let when = SystemTime::now() - Duration::from_secs(days * SECONDS_PER_DAY);
        File::open(path).unwrap().set_modified(when).unwrap();
    }

    fn setup() -> (TempDir, PathBuf, PathBuf) {
        let dir = TempDir::new().unwrap();
        let uploads = dir.path().join("uploads");
        let outputs = dir.path().join("outputs");
        std::fs::create_dir_all(&uploads).unwrap();
        std::fs::create_dir_all(&outputs).unwrap();
        (dir, uploads, outputs)
    }

    #[tokio::test]
    async fn test_only_old_entries_removed() {
        let (_dir, uploads, outputs) = setup();

        let old_upload = uploads.join("20240101_000000_aaaaaaaa_old.png");
        let new_upload = uploads.join("20240108_000000_bbbbbbbb_new.png");
        std::fs::write(&old_upload, b"old").unwrap();
        std::fs::write(&new_upload, b"new").unwrap();
        age(&old_upload, 10);
        age(&new_upload, 2);

        let old_output = outputs.join("20240101_000000_aaaaaaaa");
        let new_output = outputs.join("20240108_000000_bbbbbbbb");
        std::fs::create_dir_all(old_output.join("images")).unwrap();
        std::fs::write(old_output.join("result.mmd"), b"# old").unwrap();
        std::fs::create_dir_all(&new_output).unwrap();
        age(&old_output, 8);

        let report = sweep(&uploads, &outputs, 7).await.unwrap();

        assert_eq!(report.files_removed, 1);
        assert_eq!(report.directories_removed, 1);
        assert_eq!(report.uploads, 1);
        assert_eq!(report.outputs, 1);
        assert!(!old_upload.exists());
        assert!(new_upload.exists());
        assert!(!old_output.exists());
        assert!(new_output.exists());
    }

    #[tokio::test]
    async fn test_loose_files_in_output_area_are_ignored() {
        let (_dir, uploads, outputs) = setup();
        let stray = outputs.join("stray.log");
        std::fs::write(&stray, b"x").unwrap();
        age(&stray, 30);

        let report = sweep(&uploads, &outputs, 7).await.unwrap();

        assert_eq!(report, SweepReport::default());
        assert!(stray.exists());
    }

    #[tokio::test]
    async fn test_sweep_is_rerunnable() {
        let (_dir, uploads, outputs) = setup();
        let old = uploads.join("old.jpg");
        std::fs::write(&old, b"x").unwrap();
        age(&old, 9);

        let first = sweep(&uploads, &outputs, 7).await.unwrap();
        let second = sweep(&uploads, &outputs, 7).await.unwrap();

        assert_eq!(first.files_removed, 1);
        assert_eq!(second, SweepReport::default());
    }

    #[tokio::test]
    async fn test_missing_areas_count_as_empty() {
        let dir = TempDir::new().unwrap();
        let report = sweep(&dir.path().join("nope"), &dir.path().join("nada"), 7)
            .await
            .unwrap();
        assert_eq!(report, SweepReport::default());
    }
}
