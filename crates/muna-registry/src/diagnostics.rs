use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Read;
use std::path::Path;

use sha2::Digest;

use crate::error::ResourceError;

/// A file found in the cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedFile {
    pub size: u64,
    /// Hex-encoded sha256.
    pub sha256: String,
}

/// Helper to inspect what the cache holds (useful for debugging).
#[derive(Debug, Clone, Default)]
pub struct CacheDiagnostics {
    /// Cached files keyed by their path relative to the cache root.
    pub files: BTreeMap<String, CachedFile>,
}

impl CacheDiagnostics {
    /// Walk `dir` and checksum every cached file. Hidden files (probes, partial downloads) are
    /// skipped.
    pub fn scan(dir: &Path) -> Result<Self, ResourceError> {
        let mut files = BTreeMap::new();
        if dir.exists() {
            scan_dir(dir, dir, &mut files)?;
        }
        Ok(Self { files })
    }

    pub fn total_size(&self) -> u64 {
        self.files.values().map(|file| file.size).sum()
    }
}

fn scan_dir(
    root: &Path,
    dir: &Path,
    files: &mut BTreeMap<String, CachedFile>,
) -> Result<(), ResourceError> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_name().to_string_lossy().starts_with('.') {
            continue;
        }
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            scan_dir(root, &path, files)?;
            continue;
        }
        let rel = path
            .strip_prefix(root)
            .map_err(|e| ResourceError::InvalidPath(e.to_string()))?
            .components()
            .map(|component| component.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");
        let (sha256, size) = sha256_file(&path)?;
        files.insert(rel, CachedFile { size, sha256 });
    }
    Ok(())
}

pub(crate) fn sha256_file(path: &Path) -> Result<(String, u64), ResourceError> {
    let mut file = File::open(path)?;
    let mut hasher = sha2::Sha256::new();
    let mut buf = [0u8; 1024 * 64];
    let mut total = 0u64;
    loop {
        let read = file.read(&mut buf)?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
        total += read as u64;
    }
    let digest = format!("{:x}", hasher.finalize());
    Ok((digest, total))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scan_lists_nested_files() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("libPredictor.so"), b"abc").unwrap();
        fs::create_dir(dir.path().join("weights")).unwrap();
        fs::write(dir.path().join("weights").join("model.bin"), b"").unwrap();
        fs::write(dir.path().join(".tmpXYZ"), b"partial").unwrap();

        let diagnostics = CacheDiagnostics::scan(dir.path()).unwrap();

        assert_eq!(
            diagnostics.files.keys().collect::<Vec<_>>(),
            ["libPredictor.so", "weights/model.bin"]
        );
        assert_eq!(
            diagnostics.files["libPredictor.so"].sha256,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        assert_eq!(
            diagnostics.files["weights/model.bin"].sha256,
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(diagnostics.total_size(), 3);
    }

    #[test]
    fn test_missing_dir_is_empty() {
        let dir = tempfile::tempdir().unwrap();

        let diagnostics = CacheDiagnostics::scan(&dir.path().join("absent")).unwrap();

        assert!(diagnostics.files.is_empty());
    }
}
