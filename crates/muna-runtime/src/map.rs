use std::ffi::c_void;
use std::fmt;

use bytes::Bytes;

use crate::error::RuntimeError;
use crate::fxnc::Fxnc;
use crate::handle::{Borrowed, Handle, Release, native_kind};
use crate::object::Object;
use crate::status::check;
use crate::value::{Value, c_string, read_c_string};

native_kind!(ValueMapKind, "value map", FXNValueMapRelease);

/// Capacity of the buffer receiving a map key.
const KEY_CAPACITY: usize = 256;

/// Ordered, keyed collection of native values.
///
/// Values inserted into the map are owned by it. Values read back out are borrowed views that
/// cannot outlive the map.
pub struct ValueMap {
    handle: Handle<ValueMapKind>,
    /// Host memory referenced by zero-copy values the map owns.
    keepalive: Vec<Bytes>,
}

impl ValueMap {
    pub fn new(fxnc: &Fxnc) -> Result<Self, RuntimeError> {
        Ok(Self {
            // SAFETY: out-pointer provided by `Handle::create`.
            handle: Handle::create(fxnc, "create value map", |api, out| unsafe {
                (api.FXNValueMapCreate)(out)
            })?,
            keepalive: Vec::new(),
        })
    }

    /// Wrap a native value map handle.
    ///
    /// # Safety
    /// `raw` must be a live value map created by `fxnc`. A borrowed map (`owner == false`) must
    /// not outlive the object it was read from.
    pub unsafe fn from_raw(fxnc: &Fxnc, raw: *mut c_void, owner: bool) -> Self {
        Self {
            // SAFETY: forwarded from the caller.
            handle: unsafe { Handle::adopt(fxnc, raw, owner) },
            keepalive: Vec::new(),
        }
    }

    pub fn owner(&self) -> bool {
        self.handle.owner()
    }

    pub fn as_raw(&self) -> *mut c_void {
        self.handle.as_raw()
    }

    pub fn len(&self) -> Result<usize, RuntimeError> {
        let raw = self.handle.live("get value map size")?;
        let mut size = 0;
        // SAFETY: `raw` is live.
        check("get value map size", unsafe {
            (self.handle.api().FXNValueMapGetSize)(raw, &mut size)
        })?;
        Ok(usize::try_from(size).unwrap_or(0))
    }

    pub fn is_empty(&self) -> Result<bool, RuntimeError> {
        Ok(self.len()? == 0)
    }

    /// Key at `index`, in insertion order.
    pub fn key(&self, index: usize) -> Result<String, RuntimeError> {
        let raw = self.handle.live("get value map key")?;
        let index = i32::try_from(index).map_err(|_| {
            RuntimeError::UnsupportedValue(format!("value map index {index} exceeds native limits"))
        })?;
        let api = self.handle.api();
        // SAFETY: `raw` is live and the buffer is sized as advertised.
        read_c_string("get value map key", KEY_CAPACITY, |buffer, len| unsafe {
            (api.FXNValueMapGetKey)(raw, index, buffer, len)
        })
    }

    pub fn keys(&self) -> Result<Vec<String>, RuntimeError> {
        (0..self.len()?).map(|index| self.key(index)).collect()
    }

    /// Borrow the value stored under `key`.
    pub fn get(&self, key: &str) -> Result<Borrowed<'_, Value>, RuntimeError> {
        let raw = self.handle.live("get value map value")?;
        let key = c_string(key, "value map key")?;
        let mut value = std::ptr::null_mut();
        // SAFETY: `raw` is live and `key` is NUL-terminated.
        check("get value map value", unsafe {
            (self.handle.api().FXNValueMapGetValue)(raw, key.as_ptr(), &mut value)
        })?;
        // SAFETY: the map owns the value; the borrow ties it to `self`.
        Ok(Borrowed::new(unsafe {
            Value::from_raw(self.handle.fxnc(), value, false)
        }))
    }

    /// Store `value` under `key`, transferring ownership to the map.
    ///
    /// If the runtime rejects the value it is released before the error is returned.
    pub fn insert(&mut self, key: &str, mut value: Value) -> Result<(), RuntimeError> {
        let raw = self.handle.live("set value map value")?;
        let key = c_string(key, "value map key")?;
        let value_raw = value.live("set value map value")?;
        // SAFETY: both handles are live and `key` is NUL-terminated.
        check("set value map value", unsafe {
            (self.handle.api().FXNValueMapSetValue)(raw, key.as_ptr(), value_raw)
        })?;
        if let Some(bytes) = value.transfer() {
            self.keepalive.push(bytes);
        }
        Ok(())
    }

    /// Decode every entry, in key order.
    pub fn to_objects(&self) -> Result<Vec<(String, Object)>, RuntimeError> {
        self.keys()?
            .into_iter()
            .map(|key| {
                let object = self.get(&key)?.to_object()?;
                Ok((key, object))
            })
            .collect()
    }
}

impl Release for ValueMap {
    fn release(&mut self) {
        self.handle.release();
        self.keepalive.clear();
    }
}

impl fmt::Debug for ValueMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ValueMap")
            .field("handle", &self.handle)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{fake_runtime, release_count};

    #[test]
    fn test_keys_keep_insertion_order() {
        let fxnc = fake_runtime();
        let mut map = ValueMap::new(&fxnc).unwrap();

        for key in ["zeta", "alpha", "mid"] {
            map.insert(key, Value::string(&fxnc, key).unwrap()).unwrap();
        }

        assert_eq!(map.len().unwrap(), 3);
        assert_eq!(map.keys().unwrap(), ["zeta", "alpha", "mid"]);
        assert_eq!(map.get("alpha").unwrap().to_object().unwrap(), Object::from("alpha"));
    }

    #[test]
    fn test_missing_key_is_an_error() {
        let fxnc = fake_runtime();
        let map = ValueMap::new(&fxnc).unwrap();

        let err = map.get("absent").unwrap_err();

        assert!(matches!(err, RuntimeError::NativeCall { .. }));
        assert!(map.is_empty().unwrap());
    }

    #[test]
    fn test_map_releases_inserted_values_once() {
        let fxnc = fake_runtime();
        let mut map = ValueMap::new(&fxnc).unwrap();
        let value = Value::from_object(&fxnc, &Object::Int(3)).unwrap();
        let value_raw = value.as_raw();
        map.insert("x", value).unwrap();
        let map_raw = map.as_raw();

        map.release();
        map.release();

        assert_eq!(release_count(map_raw), 1);
        assert_eq!(release_count(value_raw), 1);
    }

    #[test]
    fn test_borrowed_value_release_is_not_native() {
        let fxnc = fake_runtime();
        let mut map = ValueMap::new(&fxnc).unwrap();
        map.insert("x", Value::null(&fxnc).unwrap()).unwrap();

        let mut value = map.get("x").unwrap();
        let value_raw = value.as_raw();
        assert!(!value.owner());
        value.release();
        drop(value);

        assert_eq!(release_count(value_raw), 0);
        drop(map);
        assert_eq!(release_count(value_raw), 1);
    }

    #[test]
    fn test_zero_copy_binary_survives_in_map() {
        let fxnc = fake_runtime();
        let mut map = ValueMap::new(&fxnc).unwrap();
        let data = Bytes::from(vec![9u8; 64]);

        map.insert("blob", Value::binary(&fxnc, data.clone()).unwrap()).unwrap();

        assert_eq!(map.get("blob").unwrap().to_object().unwrap(), Object::Bytes(data));
    }
}
