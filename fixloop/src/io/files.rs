//! Artifact file access.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::debug;

use crate::error::FixError;

/// Read an artifact, reporting failures as [`FixError::ArtifactUnreadable`].
pub fn read_artifact(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|source| {
        FixError::ArtifactUnreadable {
            path: path.to_path_buf(),
            source,
        }
        .into()
    })
}

/// Replace `path` with `contents` via a sibling temp file and rename.
pub fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("path missing parent {}", path.display()))?;
    if !parent.as_os_str().is_empty() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create directory {}", parent.display()))?;
    }
    let file_name = path
        .file_name()
        .with_context(|| format!("path missing file name {}", path.display()))?;
    let mut tmp_name = file_name.to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp file {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace {}", path.display()))?;
    debug!(path = %path.display(), bytes = contents.len(), "wrote file");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_artifact_is_typed() {
        let temp = tempfile::tempdir().expect("tempdir");
        let err = read_artifact(&temp.path().join("nope.py")).expect_err("missing");
        assert!(matches!(
            err.downcast_ref::<FixError>(),
            Some(FixError::ArtifactUnreadable { .. })
        ));
    }

    #[test]
    fn atomic_write_replaces_without_leftovers() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("module.py");
        fs::write(&path, "old\n").expect("seed");
        write_atomic(&path, "new\n").expect("write");
        assert_eq!(fs::read_to_string(&path).expect("read"), "new\n");
        assert!(!temp.path().join("module.py.tmp").exists());
    }
}
