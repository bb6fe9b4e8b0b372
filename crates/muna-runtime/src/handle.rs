//! Ownership of opaque native handles.

use std::ffi::c_void;
use std::fmt;
use std::marker::PhantomData;
use std::ops::Deref;

use crate::error::RuntimeError;
use crate::fxnc::Fxnc;
use crate::status::{Status, check};
use crate::sys::{FXNStatus, FxncApi};

/// A kind of native object, naming its release entry point.
pub trait NativeKind {
    /// Human readable name, used in logs.
    const NAME: &'static str;

    fn release_fn(api: &FxncApi) -> unsafe extern "C" fn(*mut c_void) -> FXNStatus;
}

/// Explicit, idempotent release shared by every native wrapper.
pub trait Release {
    /// Release the native object if this wrapper owns it. Calling it again is a no-op.
    fn release(&mut self);
}

/// Owning (or borrowing) wrapper around an opaque native pointer.
///
/// An owning handle releases its object exactly once: on the first call to [`Handle::release`]
/// or on drop, whichever comes first. A borrowed handle never releases.
pub struct Handle<K: NativeKind> {
    raw: *mut c_void,
    owner: bool,
    fxnc: Fxnc,
    _kind: PhantomData<K>,
}

// SAFETY: native handles are plain pointers into runtime-owned memory and may be moved across
// threads. `Handle` is deliberately not `Sync`; shared use must be serialized by the caller.
unsafe impl<K: NativeKind> Send for Handle<K> {}

impl<K: NativeKind> Handle<K> {
    /// Create a new owned object through `create`, which receives the out-pointer.
    pub(crate) fn create<F>(fxnc: &Fxnc, operation: &'static str, create: F) -> Result<Self, RuntimeError>
    where
        F: FnOnce(&FxncApi, *mut *mut c_void) -> FXNStatus,
    {
        let mut raw: *mut c_void = std::ptr::null_mut();
        let status = create(fxnc.api(), &mut raw);
        check(operation, status)?;
        if raw.is_null() {
            return Err(RuntimeError::NativeCall {
                operation,
                status: Status::InvalidOperation,
            });
        }
        tracing::debug!(kind = K::NAME, ?raw, "Created native handle");
        Ok(Self {
            raw,
            owner: true,
            fxnc: fxnc.clone(),
            _kind: PhantomData,
        })
    }

    /// Adopt a handle produced elsewhere.
    ///
    /// # Safety
    /// `raw` must be a live handle of kind `K` created by `fxnc`. If `owner` is true, nothing
    /// else may release it.
    pub unsafe fn adopt(fxnc: &Fxnc, raw: *mut c_void, owner: bool) -> Self {
        Self {
            raw,
            owner,
            fxnc: fxnc.clone(),
            _kind: PhantomData,
        }
    }

    /// Whether this wrapper releases the object.
    pub fn owner(&self) -> bool {
        self.owner
    }

    /// Raw pointer, null once released.
    pub fn as_raw(&self) -> *mut c_void {
        self.raw
    }

    pub fn is_released(&self) -> bool {
        self.raw.is_null()
    }

    pub fn fxnc(&self) -> &Fxnc {
        &self.fxnc
    }

    pub(crate) fn api(&self) -> &FxncApi {
        self.fxnc.api()
    }

    /// Give up ownership, returning the raw pointer. The wrapper will no longer release it.
    pub(crate) fn disown(&mut self) -> *mut c_void {
        self.owner = false;
        self.raw
    }

    /// Pointer for a native call, failing if the handle has already been released.
    pub(crate) fn live(&self, operation: &'static str) -> Result<*mut c_void, RuntimeError> {
        if self.raw.is_null() {
            return Err(RuntimeError::NativeCall {
                operation,
                status: Status::InvalidOperation,
            });
        }
        Ok(self.raw)
    }
}

impl<K: NativeKind> Release for Handle<K> {
    fn release(&mut self) {
        let raw = std::mem::replace(&mut self.raw, std::ptr::null_mut());
        if raw.is_null() || !self.owner {
            return;
        }
        // SAFETY: `raw` is live and owned by this wrapper; it was swapped out above so it can
        // never be released twice.
        let status = unsafe { (K::release_fn(self.fxnc.api()))(raw) };
        match Status::from_raw(status) {
            Status::Ok => tracing::debug!(kind = K::NAME, ?raw, "Released native handle"),
            status => tracing::warn!(kind = K::NAME, %status, "Failed to release native handle"),
        }
    }
}

impl<K: NativeKind> Drop for Handle<K> {
    fn drop(&mut self) {
        self.release();
    }
}

impl<K: NativeKind> fmt::Debug for Handle<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct(K::NAME)
            .field("raw", &self.raw)
            .field("owner", &self.owner)
            .finish()
    }
}

/// A non-owning wrapper whose validity is tied to the lifetime of its parent object.
pub struct Borrowed<'a, T> {
    inner: T,
    _parent: PhantomData<&'a ()>,
}

impl<'a, T> Borrowed<'a, T> {
    pub(crate) fn new(inner: T) -> Self {
        Self {
            inner,
            _parent: PhantomData,
        }
    }
}

impl<T: Release> Borrowed<'_, T> {
    /// Drop this view. The parent keeps ownership, so nothing is released natively.
    pub fn release(&mut self) {
        self.inner.release();
    }
}

impl<T> Deref for Borrowed<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.inner
    }
}

impl<T: fmt::Debug> fmt::Debug for Borrowed<'_, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.inner, f)
    }
}

macro_rules! native_kind {
    ($kind:ident, $name:literal, $release:ident) => {
        #[doc = concat!("Marker for native ", $name, " handles.")]
        #[derive(Debug)]
        pub enum $kind {}

        impl $crate::handle::NativeKind for $kind {
            const NAME: &'static str = $name;

            fn release_fn(
                api: &$crate::sys::FxncApi,
            ) -> unsafe extern "C" fn(*mut std::ffi::c_void) -> $crate::sys::FXNStatus {
                api.$release
            }
        }
    };
}

pub(crate) use native_kind;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::map::ValueMapKind;
    use crate::testing::{fake_runtime, release_count};

    fn create(fxnc: &Fxnc) -> Handle<ValueMapKind> {
        Handle::create(fxnc, "create value map", |api, out| unsafe {
            (api.FXNValueMapCreate)(out)
        })
        .unwrap()
    }

    #[test]
    fn test_release_is_idempotent() {
        let fxnc = fake_runtime();
        let mut handle = create(&fxnc);
        let raw = handle.as_raw();

        handle.release();
        handle.release();
        drop(handle);

        assert_eq!(release_count(raw), 1);
    }

    #[test]
    fn test_drop_releases_owned_handle() {
        let fxnc = fake_runtime();
        let handle = create(&fxnc);
        let raw = handle.as_raw();

        drop(handle);

        assert_eq!(release_count(raw), 1);
    }

    #[test]
    fn test_borrowed_handle_never_releases() {
        let fxnc = fake_runtime();
        let mut owner = create(&fxnc);
        let raw = owner.as_raw();

        let mut borrowed = unsafe { Handle::<ValueMapKind>::adopt(&fxnc, raw, false) };
        assert!(!borrowed.owner());
        borrowed.release();
        drop(borrowed);
        assert_eq!(release_count(raw), 0);

        owner.release();
        assert_eq!(release_count(raw), 1);
    }

    #[test]
    fn test_released_handle_is_not_live() {
        let fxnc = fake_runtime();
        let mut handle = create(&fxnc);

        handle.release();

        assert!(handle.is_released());
        assert!(matches!(
            handle.live("read value map"),
            Err(RuntimeError::NativeCall {
                status: Status::InvalidOperation,
                ..
            })
        ));
    }
}
