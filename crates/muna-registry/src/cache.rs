use std::fs;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use crossbeam::channel;
use muna_core::schemas::PredictionResource;
use url::Url;

use crate::builder::RegistryConfig;
use crate::download::{Downloader, HttpDownloader, download_to};
use crate::error::ResourceError;

/// Progress callback: resource, bytes completed, total bytes if known.
pub type ProgressFn = dyn Fn(&PredictionResource, u64, Option<u64>) + Send + Sync;

/// A resource available on the local filesystem.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedResource {
    pub resource: PredictionResource,
    pub path: PathBuf,
    /// Whether this call fetched the file, as opposed to finding it in the cache.
    pub downloaded: bool,
    /// Bytes transferred by this call. Zero on a cache hit.
    pub downloaded_bytes: u64,
}

/// Cache of predictor resources on the local filesystem.
#[derive(Clone)]
pub struct ResourceCache {
    config: RegistryConfig,
    downloader: Arc<dyn Downloader>,
    progress: Option<Arc<ProgressFn>>,
}

impl ResourceCache {
    /// Create a cache that downloads over HTTP.
    pub fn new(config: RegistryConfig) -> Result<Self, ResourceError> {
        Self::with_downloader(config, Arc::new(HttpDownloader::new()))
    }

    /// Create a cache that fetches resources through `downloader`.
    pub fn with_downloader(
        config: RegistryConfig,
        downloader: Arc<dyn Downloader>,
    ) -> Result<Self, ResourceError> {
        fs::create_dir_all(&config.cache_dir).map_err(|source| {
            ResourceError::CacheDirUnavailable {
                path: config.cache_dir.clone(),
                source,
            }
        })?;
        Ok(Self {
            config,
            downloader,
            progress: None,
        })
    }

    /// Report download progress to `progress`.
    pub fn with_progress(mut self, progress: Arc<ProgressFn>) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn cache_dir(&self) -> &Path {
        &self.config.cache_dir
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Where `resource` lives in the cache: `<cache>/<url file name>[/<name>]`.
    pub fn resource_path(&self, resource: &PredictionResource) -> Result<PathBuf, ResourceError> {
        let url = Url::parse(&resource.url)
            .map_err(|e| ResourceError::InvalidPath(format!("{}: {e}", resource.url)))?;
        let stem = url
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .filter(|stem| !stem.is_empty())
            .ok_or_else(|| {
                ResourceError::InvalidPath(format!("{} does not name a file", resource.url))
            })?;
        let path = self.config.cache_dir.join(sanitize_rel_path(stem)?);
        match &resource.name {
            Some(name) => Ok(path.join(sanitize_rel_path(name)?)),
            None => Ok(path),
        }
    }

    /// Return the cached path of `resource`, downloading it first if needed.
    pub fn resolve(&self, resource: &PredictionResource) -> Result<ResolvedResource, ResourceError> {
        let path = self.resource_path(resource)?;
        if path.exists() {
            tracing::debug!(url = %resource.url, path = %path.display(), "resource cache hit");
            return Ok(ResolvedResource {
                resource: resource.clone(),
                path,
                downloaded: false,
                downloaded_bytes: 0,
            });
        }

        let download = self.downloader.open(&resource.url)?;
        let bytes = download_to(&resource.url, download, &path, |completed, total| {
            if let Some(progress) = &self.progress {
                progress(resource, completed, total);
            }
        })?;
        tracing::info!(url = %resource.url, path = %path.display(), bytes, "downloaded resource");
        Ok(ResolvedResource {
            resource: resource.clone(),
            path,
            downloaded: true,
            downloaded_bytes: bytes,
        })
    }

    /// Resolve every resource, downloading in parallel. Results keep the input order.
    pub fn resolve_all(
        &self,
        resources: &[PredictionResource],
    ) -> Result<Vec<ResolvedResource>, ResourceError> {
        if self.config.max_parallel <= 1 || resources.len() <= 1 {
            return resources.iter().map(|resource| self.resolve(resource)).collect();
        }

        let (tx, rx) = channel::unbounded::<(usize, &PredictionResource)>();
        for task in resources.iter().enumerate() {
            if tx.send(task).is_err() {
                break;
            }
        }
        drop(tx);

        let mut resolved = crossbeam::scope(|scope| {
            let worker_count = self.config.max_parallel.min(rx.len().max(1));
            let handles: Vec<_> = (0..worker_count)
                .map(|_| {
                    let rx = rx.clone();
                    scope.spawn(move |_| {
                        let mut done = Vec::new();
                        for (index, resource) in rx.iter() {
                            done.push((index, self.resolve(resource)?));
                        }
                        Ok::<_, ResourceError>(done)
                    })
                })
                .collect();

            let mut resolved = Vec::with_capacity(resources.len());
            for handle in handles {
                let done = handle.join().map_err(|_| ResourceError::WorkerPanicked)??;
                resolved.extend(done);
            }
            Ok::<_, ResourceError>(resolved)
        })
        .map_err(|_| ResourceError::WorkerPanicked)??;

        resolved.sort_by_key(|(index, _)| *index);
        Ok(resolved.into_iter().map(|(_, resource)| resource).collect())
    }
}

impl std::fmt::Debug for ResourceCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceCache")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

/// Reject paths that would escape the directory they are joined onto.
fn sanitize_rel_path(path: &str) -> Result<PathBuf, ResourceError> {
    let rel = Path::new(path);
    if path.is_empty() {
        return Err(ResourceError::InvalidPath("empty path".to_owned()));
    }
    for component in rel.components() {
        match component {
            Component::Normal(_) => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) | Component::CurDir => {
                return Err(ResourceError::InvalidPath(format!(
                    "invalid path component: {path}"
                )));
            }
        }
    }
    Ok(rel.to_path_buf())
}
