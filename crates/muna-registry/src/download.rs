use std::fs;
use std::io::{Read, Write};
use std::path::Path;

use reqwest::blocking::Client as HttpClient;
use tempfile::NamedTempFile;

use crate::error::ResourceError;

/// Open response body of a resource download.
pub struct Download {
    pub reader: Box<dyn Read + Send>,
    /// Advertised length, when the server sent one.
    pub total: Option<u64>,
}

/// Source of resource bytes.
pub trait Downloader: Send + Sync {
    fn open(&self, url: &str) -> Result<Download, ResourceError>;
}

/// Downloads resources over HTTP.
#[derive(Debug, Clone, Default)]
pub struct HttpDownloader {
    http: HttpClient,
}

impl HttpDownloader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_client(http: HttpClient) -> Self {
        Self { http }
    }
}

impl Downloader for HttpDownloader {
    fn open(&self, url: &str) -> Result<Download, ResourceError> {
        let response = self.http.get(url).send()?;
        if !response.status().is_success() {
            return Err(ResourceError::DownloadFailed {
                url: url.to_owned(),
                details: format!("HTTP {}", response.status()),
            });
        }
        Ok(Download {
            total: response.content_length(),
            reader: Box::new(response),
        })
    }
}

/// Stream `download` into a temp file next to `dest`, then atomically move it into place.
///
/// Returns the number of bytes written. `progress` receives the running total after each chunk.
pub(crate) fn download_to(
    url: &str,
    mut download: Download,
    dest: &Path,
    mut progress: impl FnMut(u64, Option<u64>),
) -> Result<u64, ResourceError> {
    let parent = dest
        .parent()
        .ok_or_else(|| ResourceError::InvalidPath(format!("{} has no parent", dest.display())))?;
    fs::create_dir_all(parent)?;

    let mut tmp = NamedTempFile::new_in(parent)?;
    let mut buf = [0u8; 1024 * 64];
    let mut completed = 0u64;
    loop {
        let read = download
            .reader
            .read(&mut buf)
            .map_err(|e| ResourceError::DownloadFailed {
                url: url.to_owned(),
                details: e.to_string(),
            })?;
        if read == 0 {
            break;
        }
        tmp.write_all(&buf[..read])?;
        completed += read as u64;
        progress(completed, download.total);
    }

    match download.total {
        Some(total) if total != completed => {
            return Err(ResourceError::DownloadFailed {
                url: url.to_owned(),
                details: format!("expected {total} bytes, received {completed}"),
            });
        }
        _ => {}
    }

    tmp.as_file().sync_all()?;
    tmp.persist(dest).map_err(|e| ResourceError::Io(e.error))?;
    Ok(completed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn download(data: &'static [u8], total: Option<u64>) -> Download {
        Download {
            reader: Box::new(Cursor::new(data)),
            total,
        }
    }

    #[test]
    fn test_writes_file_and_reports_progress() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("nested").join("weights.bin");
        let mut seen = Vec::new();

        let written = download_to("https://cdn/weights.bin", download(b"abcdef", Some(6)), &dest, |done, total| {
            seen.push((done, total));
        })
        .unwrap();

        assert_eq!(written, 6);
        assert_eq!(fs::read(&dest).unwrap(), b"abcdef");
        assert_eq!(seen.last(), Some(&(6, Some(6))));
    }

    #[test]
    fn test_short_transfer_leaves_nothing_at_destination() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("weights.bin");

        let err = download_to("https://cdn/weights.bin", download(b"abc", Some(10)), &dest, |_, _| {})
            .unwrap_err();

        assert!(matches!(err, ResourceError::DownloadFailed { .. }));
        assert!(!dest.exists());
        assert_eq!(fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_replaces_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("weights.bin");
        fs::write(&dest, b"stale").unwrap();

        download_to("https://cdn/weights.bin", download(b"fresh", None), &dest, |_, _| {}).unwrap();

        assert_eq!(fs::read(&dest).unwrap(), b"fresh");
    }
}
