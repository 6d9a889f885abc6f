// Dataset name sanitation and path resolution. Every file-system access in
// the crate goes through resolve(); nothing else builds dataset paths.

use crate::error::{FlatstoreError, Result};
use std::path::{Path, PathBuf};

pub const MAX_NAME_LEN: usize = 128;
pub const DATASET_EXT: &str = "csv";
pub const METADATA_DIR: &str = "_metadata";

/// A sanitized dataset name together with its backing paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedDataset {
    pub name: String,
    pub file: PathBuf,
    pub metadata: PathBuf,
}

/// Validate a user-supplied dataset name. A single trailing `.csv` is
/// accepted and stripped; the remainder must be non-empty, at most
/// [`MAX_NAME_LEN`] bytes, and contain only letters, digits, underscore,
/// and hyphen. Anything else (path separators, `..`, other extensions)
/// is rejected before any file-system access happens.
pub fn sanitize(raw: &str) -> Result<String> {
    let name = if raw.to_ascii_lowercase().ends_with(".csv") {
        &raw[..raw.len() - 4]
    } else {
        raw
    };

    if name.is_empty() {
        return Err(FlatstoreError::InvalidName(
            "dataset name must not be empty".into(),
        ));
    }
    if name.len() > MAX_NAME_LEN {
        return Err(FlatstoreError::InvalidName(format!(
            "dataset name exceeds {MAX_NAME_LEN} characters"
        )));
    }
    if !name
        .bytes()
        .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
    {
        return Err(FlatstoreError::InvalidName(format!(
            "'{raw}' may only contain letters, digits, underscore (_), and hyphen (-)"
        )));
    }

    Ok(name.to_string())
}

/// Map a user-supplied dataset name to its file-system locations under
/// `root`. Fails with `InvalidName` without touching the disk.
pub fn resolve(root: &Path, raw: &str) -> Result<ResolvedDataset> {
    let name = sanitize(raw)?;
    let file = root.join(format!("{name}.{DATASET_EXT}"));
    let metadata = root.join(METADATA_DIR).join(format!("{name}.json"));
    Ok(ResolvedDataset {
        name,
        file,
        metadata,
    })
}
