//! Loading the native runtime library.

use std::ffi::CStr;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use libloading::Library;

use crate::error::RuntimeError;
use crate::sys::FxncApi;

/// Environment variables consulted, in order, for an explicit runtime library path.
pub const LIBRARY_PATH_VARS: [&str; 2] = ["MUNA_FXNC_PATH", "FXNC_PATH"];

/// Shared handle to a loaded native runtime.
///
/// Every native object keeps a clone, so the library stays mapped until the last handle created
/// from it has been released.
#[derive(Clone)]
pub struct Fxnc {
    inner: Arc<FxncInner>,
}

struct FxncInner {
    api: FxncApi,
    // Declared after `api` so the table is dropped before the library is unmapped.
    _library: Option<Library>,
}

impl Fxnc {
    /// Load the runtime from a shared library at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, RuntimeError> {
        let path = path.as_ref();
        // SAFETY: loading a library runs its initializers; the runtime library is trusted.
        let library = unsafe { Library::new(path) }
            .map_err(|e| RuntimeError::Library(format!("{}: {e}", path.display())))?;
        // SAFETY: the table is stored next to the library and never outlives it.
        let api = unsafe { FxncApi::from_library(&library) }
            .map_err(|e| RuntimeError::Library(format!("{}: {e}", path.display())))?;
        tracing::debug!(path = %path.display(), "Loaded native runtime");
        Ok(Self {
            inner: Arc::new(FxncInner {
                api,
                _library: Some(library),
            }),
        })
    }

    /// Load the runtime from the path named by the environment, or the platform library name.
    pub fn load_default() -> Result<Self, RuntimeError> {
        Self::load(default_library_path())
    }

    /// Adopt a function table for a runtime that is already part of the process.
    pub fn from_api(api: FxncApi) -> Self {
        Self {
            inner: Arc::new(FxncInner {
                api,
                _library: None,
            }),
        }
    }

    pub fn api(&self) -> &FxncApi {
        &self.inner.api
    }

    /// Runtime version string.
    pub fn version(&self) -> String {
        // SAFETY: FXNGetVersion returns a static NUL-terminated string or null.
        let ptr = unsafe { (self.api().FXNGetVersion)() };
        if ptr.is_null() {
            return String::new();
        }
        // SAFETY: checked non-null above; the runtime owns the string for its lifetime.
        unsafe { CStr::from_ptr(ptr) }
            .to_string_lossy()
            .into_owned()
    }

    /// Whether two handles refer to the same loaded runtime.
    pub fn same_runtime(&self, other: &Fxnc) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl fmt::Debug for Fxnc {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fxnc")
            .field("dynamic", &self.inner._library.is_some())
            .finish()
    }
}

/// Resolve the library path: environment override first, then the platform library name.
pub fn default_library_path() -> PathBuf {
    LIBRARY_PATH_VARS
        .iter()
        .find_map(|var| std::env::var_os(var).filter(|v| !v.is_empty()))
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(platform_library_name()))
}

/// File name of the runtime library on the current platform.
pub fn platform_library_name() -> &'static str {
    if cfg!(target_os = "windows") {
        "Function.dll"
    } else if cfg!(target_os = "macos") {
        "Function.dylib"
    } else {
        "libFunction.so"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_missing_library_fails() {
        let err = Fxnc::load("/nonexistent/libFunction.so").unwrap_err();

        assert!(matches!(err, RuntimeError::Library(_)));
    }

    #[test]
    fn test_platform_library_name() {
        let name = platform_library_name();

        assert!(name.contains("Function"));
    }
}
