use std::collections::HashMap;
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use muna_registry::{
    CacheDiagnostics, Download, Downloader, PredictionResource, RegistryConfig, ResourceCache,
    ResourceError,
};

struct MemoryDownloader {
    files: HashMap<String, Vec<u8>>,
    opened: AtomicUsize,
}

impl MemoryDownloader {
    fn with(files: &[(&str, &[u8])]) -> Arc<Self> {
        Arc::new(Self {
            files: files
                .iter()
                .map(|(url, data)| (url.to_string(), data.to_vec()))
                .collect(),
            opened: AtomicUsize::new(0),
        })
    }

    fn opened(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }
}

impl Downloader for MemoryDownloader {
    fn open(&self, url: &str) -> Result<Download, ResourceError> {
        self.opened.fetch_add(1, Ordering::SeqCst);
        let data = self
            .files
            .get(url)
            .cloned()
            .ok_or_else(|| ResourceError::DownloadFailed {
                url: url.to_owned(),
                details: "HTTP 404 Not Found".to_owned(),
            })?;
        Ok(Download {
            total: Some(data.len() as u64),
            reader: Box::new(Cursor::new(data)),
        })
    }
}

fn resource(kind: &str, url: &str) -> PredictionResource {
    PredictionResource {
        kind: kind.to_owned(),
        url: url.to_owned(),
        name: None,
    }
}

#[test]
fn downloads_once_then_hits_cache() {
    let dir = tempfile::tempdir().unwrap();
    let downloader = MemoryDownloader::with(&[("https://cdn/a.bin", &b"aaaa"[..])]);
    let cache = ResourceCache::with_downloader(
        RegistryConfig::in_dir(dir.path()),
        downloader.clone(),
    )
    .unwrap();
    let a = resource("bin", "https://cdn/a.bin");

    let first = cache.resolve(&a).unwrap();
    let second = cache.resolve(&a).unwrap();

    assert!(first.downloaded);
    assert_eq!(first.downloaded_bytes, 4);
    assert!(!second.downloaded);
    assert_eq!(first.path, second.path);
    assert_eq!(downloader.opened(), 1);
}

#[test]
fn parallel_resolution_keeps_descriptor_order() {
    let dir = tempfile::tempdir().unwrap();
    let files: Vec<(String, Vec<u8>)> = (0..6)
        .map(|i| (format!("https://cdn/file-{i}.bin"), vec![i as u8; 100 * (i + 1)]))
        .collect();
    let downloader = Arc::new(MemoryDownloader {
        files: files.iter().cloned().collect(),
        opened: AtomicUsize::new(0),
    });
    let cache = ResourceCache::with_downloader(
        RegistryConfig::in_dir(dir.path())
            .with_max_parallel(3),
        downloader.clone(),
    )
    .unwrap();
    let resources: Vec<_> = files.iter().map(|(url, _)| resource("bin", url)).collect();

    let resolved = cache.resolve_all(&resources).unwrap();

    assert_eq!(resolved.len(), 6);
    for (i, resolved) in resolved.iter().enumerate() {
        assert_eq!(resolved.resource, resources[i]);
        assert_eq!(resolved.path, dir.path().join(format!("file-{i}.bin")));
        assert_eq!(resolved.downloaded_bytes, 100 * (i as u64 + 1));
    }
    assert_eq!(downloader.opened(), 6);
    assert_eq!(CacheDiagnostics::scan(dir.path()).unwrap().files.len(), 6);
}

#[test]
fn failed_download_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let downloader = MemoryDownloader::with(&[("https://cdn/ok.bin", &b"ok"[..])]);
    let cache = ResourceCache::with_downloader(
        RegistryConfig::in_dir(dir.path())
            .with_max_parallel(2),
        downloader,
    )
    .unwrap();

    let err = cache
        .resolve_all(&[
            resource("bin", "https://cdn/ok.bin"),
            resource("bin", "https://cdn/missing.bin"),
        ])
        .unwrap_err();

    assert!(matches!(err, ResourceError::DownloadFailed { ref url, .. } if url.ends_with("missing.bin")));
    assert!(!dir.path().join("missing.bin").exists());
}

#[test]
fn progress_reaches_total() {
    let dir = tempfile::tempdir().unwrap();
    let data = vec![7u8; 200_000];
    let downloader = MemoryDownloader::with(&[("https://cdn/big.bin", data.as_slice())]);
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = seen.clone();
    let cache = ResourceCache::with_downloader(
        RegistryConfig::in_dir(dir.path()),
        downloader,
    )
    .unwrap()
    .with_progress(Arc::new(move |resource: &PredictionResource, done: u64, total: Option<u64>| {
        sink.lock().unwrap().push((resource.url.clone(), done, total));
    }));

    cache.resolve(&resource("bin", "https://cdn/big.bin")).unwrap();

    let seen = seen.lock().unwrap();
    assert!(seen.len() > 1);
    assert!(seen.windows(2).all(|pair| pair[0].1 < pair[1].1));
    assert_eq!(
        seen.last().unwrap(),
        &("https://cdn/big.bin".to_owned(), 200_000, Some(200_000))
    );
}
