//! Filesystem helpers shared by the storage and archive layers.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Expand `~` and environment variables in a configured path.
pub fn expand_path(raw: &str) -> PathBuf {
    match shellexpand::full(raw) {
        Ok(expanded) => PathBuf::from(expanded.as_ref()),
        Err(_) => PathBuf::from(shellexpand::tilde(raw).as_ref()),
    }
}

/// Write `contents` to `path` by writing a sibling temp file and renaming it
/// over the target, so readers never observe a half-written file.
pub fn write_atomic(path: &Path, contents: &[u8]) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "out".to_string());
    let tmp = path.with_file_name(format!(".{file_name}.tmp"));

    {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(contents)?;
        file.sync_all()?;
    }
    fs::rename(&tmp, path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_write_atomic_creates_parents_and_replaces() {
        let dir = tempdir().unwrap();
        let target = dir.path().join("daily").join("latest.json");

        write_atomic(&target, b"{\"v\":1}").unwrap();
        write_atomic(&target, b"{\"v\":2}").unwrap();

        assert_eq!(fs::read_to_string(&target).unwrap(), "{\"v\":2}");
        let leftovers: Vec<_> = fs::read_dir(target.parent().unwrap())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_expand_path_plain() {
        assert_eq!(expand_path("/var/data"), PathBuf::from("/var/data"));
    }
}
