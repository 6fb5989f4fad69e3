//! Staged Inputs
//!
//! On-disk copies of uploaded files. A `StagedInput` removes its file when
//! dropped unless `keep` was called, so every early return and every
//! cancelled request cleans up after itself.

use std::path::{Path, PathBuf};

use chrono::Local;
use uuid::Uuid;

/// Name of the result file the engine writes into the output directory
pub const RESULT_FILE: &str = "result.mmd";

/// Timestamp-derived request identifier, e.g. `20261019_143012_3fa2b1c0`
pub fn new_request_id() -> String {
    let suffix = Uuid::new_v4().simple().to_string();
    format!("{}_{}", Local::now().format("%Y%m%d_%H%M%S"), &suffix[..8])
}

/// Strip any directory components from a client-supplied filename
pub fn sanitize_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or("").trim();
    if base.is_empty() || base == "." || base == ".." {
        "upload".to_string()
    } else {
        base.to_string()
    }
}

/// Lowercased extension with its leading dot, or an empty string
pub fn file_extension(name: &str) -> String {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| format!(".{}", ext.to_ascii_lowercase()))
        .unwrap_or_default()
}

/// An uploaded file written to the upload area
#[derive(Debug)]
pub struct StagedInput {
    path: PathBuf,
    unique_name: String,
    keep: bool,
}

impl StagedInput {
    /// Write `data` to `<dir>/<unique_name>`
    pub async fn write(dir: &Path, unique_name: String, data: &[u8]) -> std::io::Result<Self> {
        tokio::fs::create_dir_all(dir).await?;

        // Guard exists before the write so a partial file is removed too
        let staged = Self {
            path: dir.join(&unique_name),
            unique_name,
            keep: false,
        };
        tokio::fs::write(&staged.path, data).await?;

        tracing::debug!(path = %staged.path.display(), bytes = data.len(), "Staged upload");
        Ok(staged)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn unique_name(&self) -> &str {
        &self.unique_name
    }

    /// Size of the file on disk
    pub async fn size(&self) -> std::io::Result<u64> {
        Ok(tokio::fs::metadata(&self.path).await?.len())
    }

    /// Leave the file in place; the maintenance sweep reclaims it later
    pub fn keep(mut self) -> PathBuf {
        self.keep = true;
        std::mem::take(&mut self.path)
    }
}

impl Drop for StagedInput {
    fn drop(&mut self) {
        if self.keep {
            return;
        }
        match std::fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!(path = %self.path.display(), "Removed staged upload"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(
                path = %self.path.display(),
                error = %e,
                "Failed to remove staged upload"
            ),
        }
    }
}
