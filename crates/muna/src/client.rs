use std::path::PathBuf;
use std::sync::Arc;

use muna_core::{ControlPlane, MunaClient};
use muna_registry::{Downloader, HttpDownloader, ProgressFn, RegistryConfig, ResourceCache};
use muna_runtime::Fxnc;

use crate::error::MunaError;
use crate::services::{LazyRuntime, PredictionService, PredictorService, UserService};

/// Environment variables consulted, in order, for the access key.
pub const ACCESS_KEY_VARS: [&str; 2] = ["MUNA_ACCESS_KEY", "FXN_ACCESS_KEY"];
/// Environment variables consulted, in order, for the API URL.
pub const API_URL_VARS: [&str; 2] = ["MUNA_API_URL", "FXN_API_URL"];

/// Builder for a [`Muna`] client.
#[derive(Default)]
pub struct MunaBuilder {
    access_key: Option<String>,
    api_url: Option<String>,
    cache_dir: Option<PathBuf>,
    library_path: Option<PathBuf>,
    runtime: Option<Fxnc>,
    control_plane: Option<Arc<dyn ControlPlane>>,
    downloader: Option<Arc<dyn Downloader>>,
    progress: Option<Arc<ProgressFn>>,
    max_parallel_downloads: Option<usize>,
}

impl MunaBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Access key. Defaults to `MUNA_ACCESS_KEY`, then `FXN_ACCESS_KEY`.
    pub fn with_access_key(mut self, access_key: impl Into<String>) -> Self {
        self.access_key = Some(access_key.into());
        self
    }

    /// API URL. Defaults to `MUNA_API_URL`, then `FXN_API_URL`, then the public API.
    pub fn with_api_url(mut self, api_url: impl Into<String>) -> Self {
        self.api_url = Some(api_url.into());
        self
    }

    /// Directory where predictor resources are cached.
    pub fn with_cache_dir(mut self, cache_dir: impl Into<PathBuf>) -> Self {
        self.cache_dir = Some(cache_dir.into());
        self
    }

    /// Path of the native runtime library.
    pub fn with_library_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.library_path = Some(path.into());
        self
    }

    /// Use an already loaded native runtime.
    pub fn with_runtime(mut self, runtime: Fxnc) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// Talk to the control plane through `control_plane` instead of the REST API.
    pub fn with_control_plane(mut self, control_plane: Arc<dyn ControlPlane>) -> Self {
        self.control_plane = Some(control_plane);
        self
    }

    /// Fetch resources through `downloader` instead of HTTP.
    pub fn with_downloader(mut self, downloader: Arc<dyn Downloader>) -> Self {
        self.downloader = Some(downloader);
        self
    }

    /// Report resource download progress.
    pub fn with_download_progress(mut self, progress: Arc<ProgressFn>) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn with_max_parallel_downloads(mut self, max_parallel: usize) -> Self {
        self.max_parallel_downloads = Some(max_parallel);
        self
    }

    pub fn build(self) -> Result<Muna, MunaError> {
        let control: Arc<dyn ControlPlane> = match self.control_plane {
            Some(control) => control,
            None => {
                let mut client = MunaClient::builder();
                if let Some(key) = self.access_key.or_else(|| env_var(&ACCESS_KEY_VARS)) {
                    client = client.with_access_key(key);
                }
                if let Some(url) = self.api_url.or_else(|| env_var(&API_URL_VARS)) {
                    client = client.with_api_url(url);
                }
                Arc::new(client.build()?)
            }
        };

        let mut config = match self.cache_dir {
            Some(dir) => RegistryConfig::in_dir(dir),
            None => RegistryConfig::new(),
        };
        if let Some(max_parallel) = self.max_parallel_downloads {
            config = config.with_max_parallel(max_parallel);
        }
        let downloader = self
            .downloader
            .unwrap_or_else(|| Arc::new(HttpDownloader::new()));
        let mut resources = ResourceCache::with_downloader(config, downloader)?;
        if let Some(progress) = self.progress {
            resources = resources.with_progress(progress);
        }

        let runtime = Arc::new(match self.runtime {
            Some(fxnc) => LazyRuntime::loaded(fxnc),
            None => LazyRuntime::new(self.library_path),
        });

        Ok(Muna {
            predictions: PredictionService::new(control.clone(), resources, runtime),
            predictors: PredictorService::new(control.clone()),
            users: UserService::new(control),
        })
    }
}

fn env_var(names: &[&str]) -> Option<String> {
    names
        .iter()
        .find_map(|name| std::env::var(name).ok().filter(|value| !value.is_empty()))
}

/// Muna client.
#[derive(Debug)]
pub struct Muna {
    predictions: PredictionService,
    predictors: PredictorService,
    users: UserService,
}

impl Muna {
    /// Create a client configured from the environment.
    pub fn new() -> Result<Self, MunaError> {
        Self::builder().build()
    }

    pub fn builder() -> MunaBuilder {
        MunaBuilder::new()
    }

    pub fn predictions(&self) -> &PredictionService {
        &self.predictions
    }

    pub fn predictors(&self) -> &PredictorService {
        &self.predictors
    }

    pub fn users(&self) -> &UserService {
        &self.users
    }
}
