//! Native values and the codec between them and host [`Object`]s.

use std::ffi::{CStr, CString, c_char, c_void};
use std::fmt;
use std::path::Path;

use bytes::Bytes;

use crate::dtype::Dtype;
use crate::error::RuntimeError;
use crate::fxnc::Fxnc;
use crate::handle::{Handle, Release, native_kind};
use crate::object::{Input, Object, PixelBuffer, Tensor, TensorData, element_count};
use crate::status::check;
use crate::sys::{
    FXN_VALUE_FLAG_COPY_DATA, FXN_VALUE_FLAG_NONE, FXNStatus, FXNValueFlags, FxncApi,
};

native_kind!(ValueKind, "value", FXNValueRelease);

/// A tagged native value.
///
/// Values built here own their native object. Values read out of a [`crate::ValueMap`] are
/// borrowed and stay valid only while the map lives.
pub struct Value {
    handle: Handle<ValueKind>,
    /// Host memory referenced by a zero-copy value.
    keepalive: Option<Bytes>,
}

impl Value {
    fn create<F>(fxnc: &Fxnc, operation: &'static str, create: F) -> Result<Self, RuntimeError>
    where
        F: FnOnce(&FxncApi, *mut *mut c_void) -> FXNStatus,
    {
        Ok(Self {
            handle: Handle::create(fxnc, operation, create)?,
            keepalive: None,
        })
    }

    /// Wrap a native value handle.
    ///
    /// # Safety
    /// `raw` must be a live value created by `fxnc`. When `owner` is true, the caller gives up
    /// the right to release it.
    pub unsafe fn from_raw(fxnc: &Fxnc, raw: *mut c_void, owner: bool) -> Self {
        Self {
            // SAFETY: forwarded from the caller.
            handle: unsafe { Handle::adopt(fxnc, raw, owner) },
            keepalive: None,
        }
    }

    pub fn null(fxnc: &Fxnc) -> Result<Self, RuntimeError> {
        // SAFETY: out-pointer provided by `Handle::create`.
        Self::create(fxnc, "create null value", |api, out| unsafe {
            (api.FXNValueCreateNull)(out)
        })
    }

    /// Copy a tensor into a native array value.
    pub fn array(fxnc: &Fxnc, tensor: &Tensor) -> Result<Self, RuntimeError> {
        let mut data = tensor.data().to_ne_bytes();
        let shape = tensor
            .shape()
            .iter()
            .map(|&dim| native_int(dim, "tensor dimension"))
            .collect::<Result<Vec<_>, _>>()?;
        let dims = native_int(shape.len(), "tensor rank")?;
        let dtype = tensor.dtype().to_native();
        // SAFETY: data and shape outlive the call; the runtime copies both.
        Self::create(fxnc, "create array value", |api, out| unsafe {
            (api.FXNValueCreateArray)(
                data.as_mut_ptr().cast(),
                shape.as_ptr(),
                dims,
                dtype,
                FXN_VALUE_FLAG_COPY_DATA,
                out,
            )
        })
    }

    pub fn string(fxnc: &Fxnc, text: &str) -> Result<Self, RuntimeError> {
        let text = c_string(text, "string value")?;
        // SAFETY: `text` is NUL-terminated and outlives the call.
        Self::create(fxnc, "create string value", |api, out| unsafe {
            (api.FXNValueCreateString)(text.as_ptr(), out)
        })
    }

    /// Serialize `items` to JSON and create a native list value.
    pub fn list(fxnc: &Fxnc, items: &[serde_json::Value]) -> Result<Self, RuntimeError> {
        let json = c_string(&serde_json::to_string(items)?, "list value")?;
        // SAFETY: `json` is NUL-terminated and outlives the call.
        Self::create(fxnc, "create list value", |api, out| unsafe {
            (api.FXNValueCreateList)(json.as_ptr(), out)
        })
    }

    /// Serialize `map` to JSON and create a native dict value.
    pub fn dict(
        fxnc: &Fxnc,
        map: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<Self, RuntimeError> {
        let json = c_string(&serde_json::to_string(map)?, "dict value")?;
        // SAFETY: `json` is NUL-terminated and outlives the call.
        Self::create(fxnc, "create dict value", |api, out| unsafe {
            (api.FXNValueCreateDict)(json.as_ptr(), out)
        })
    }

    /// Copy a pixel buffer into a native image value.
    pub fn image(fxnc: &Fxnc, image: &PixelBuffer) -> Result<Self, RuntimeError> {
        let width = native_int(image.width(), "image width")?;
        let height = native_int(image.height(), "image height")?;
        let channels = native_int(image.channels(), "image channels")?;
        // SAFETY: pixel data outlives the call and the runtime copies it.
        Self::create(fxnc, "create image value", |api, out| unsafe {
            (api.FXNValueCreateImage)(
                image.data().as_ptr(),
                width,
                height,
                channels,
                FXN_VALUE_FLAG_COPY_DATA,
                out,
            )
        })
    }

    /// Create a binary value that references `data` without copying.
    ///
    /// The value keeps `data` alive for as long as the native object may read it.
    pub fn binary(fxnc: &Fxnc, data: Bytes) -> Result<Self, RuntimeError> {
        let mut value = Self::create_binary(fxnc, &data, FXN_VALUE_FLAG_NONE)?;
        value.keepalive = Some(data);
        Ok(value)
    }

    /// Create a binary value holding a copy of `data`.
    pub fn binary_copy(fxnc: &Fxnc, data: &[u8]) -> Result<Self, RuntimeError> {
        Self::create_binary(fxnc, data, FXN_VALUE_FLAG_COPY_DATA)
    }

    fn create_binary(fxnc: &Fxnc, data: &[u8], flags: FXNValueFlags) -> Result<Self, RuntimeError> {
        let len = native_int(data.len(), "binary length")?;
        // SAFETY: the runtime never writes through binary data pointers. Without COPY_DATA the
        // caller keeps `data` alive for the lifetime of the value.
        Self::create(fxnc, "create binary value", |api, out| unsafe {
            (api.FXNValueCreateBinary)(data.as_ptr().cast_mut().cast(), len, flags, out)
        })
    }

    /// Encode a host object.
    ///
    /// Integers become rank-0 `int32` tensors and floats rank-0 `float32` tensors. Booleans
    /// become rank-0 `bool` tensors.
    pub fn from_object(fxnc: &Fxnc, object: &Object) -> Result<Self, RuntimeError> {
        match object {
            Object::Null => Self::null(fxnc),
            Object::Bool(value) => Self::array(fxnc, &Tensor::scalar(vec![*value])?),
            Object::Int(value) => {
                let value = i32::try_from(*value).map_err(|_| {
                    RuntimeError::UnsupportedValue(format!("integer {value} does not fit in int32"))
                })?;
                Self::array(fxnc, &Tensor::scalar(vec![value])?)
            }
            Object::Float(value) => Self::array(fxnc, &Tensor::scalar(vec![*value as f32])?),
            Object::Tensor(tensor) => Self::array(fxnc, tensor),
            Object::Text(text) => Self::string(fxnc, text),
            Object::Sequence(items) => Self::list(fxnc, items),
            Object::Mapping(map) => Self::dict(fxnc, map),
            Object::Image(image) => Self::image(fxnc, image),
            Object::Bytes(data) => Self::binary(fxnc, data.clone()),
        }
    }

    /// Encode an input, passing through values that are already native.
    pub fn from_input(fxnc: &Fxnc, input: Input) -> Result<Self, RuntimeError> {
        match input {
            Input::Object(object) => Self::from_object(fxnc, &object),
            Input::Value(value) if value.handle.fxnc().same_runtime(fxnc) => Ok(value),
            Input::Value(_) => Err(RuntimeError::UnsupportedValue(
                "value was created by a different runtime".to_owned(),
            )),
        }
    }

    pub fn owner(&self) -> bool {
        self.handle.owner()
    }

    pub fn as_raw(&self) -> *mut c_void {
        self.handle.as_raw()
    }

    pub fn is_released(&self) -> bool {
        self.handle.is_released()
    }

    pub fn dtype(&self) -> Result<Dtype, RuntimeError> {
        let raw = self.handle.live("get value data type")?;
        let mut dtype = 0;
        // SAFETY: `raw` is live.
        check("get value data type", unsafe {
            (self.handle.api().FXNValueGetType)(raw, &mut dtype)
        })?;
        Dtype::from_native(dtype)
    }

    /// Shape of tensor and image values, `None` for every other dtype.
    pub fn shape(&self) -> Result<Option<Vec<usize>>, RuntimeError> {
        if !self.dtype()?.has_shape() {
            return Ok(None);
        }
        self.native_shape().map(Some)
    }

    fn native_shape(&self) -> Result<Vec<usize>, RuntimeError> {
        let raw = self.handle.live("get value dimensions")?;
        let api = self.handle.api();
        let mut dims = 0;
        // SAFETY: `raw` is live.
        check("get value dimensions", unsafe {
            (api.FXNValueGetDimensions)(raw, &mut dims)
        })?;
        let mut shape = vec![0i32; usize::try_from(dims).unwrap_or(0)];
        // SAFETY: `shape` holds exactly `dims` elements.
        check("get value shape", unsafe {
            (api.FXNValueGetShape)(raw, shape.as_mut_ptr(), dims)
        })?;
        shape
            .into_iter()
            .map(|dim| {
                usize::try_from(dim).map_err(|_| {
                    RuntimeError::UnsupportedValue(format!("negative dimension {dim} in value shape"))
                })
            })
            .collect()
    }

    fn data(&self) -> Result<*mut c_void, RuntimeError> {
        let raw = self.handle.live("get value data")?;
        let mut data = std::ptr::null_mut();
        // SAFETY: `raw` is live.
        check("get value data", unsafe {
            (self.handle.api().FXNValueGetData)(raw, &mut data)
        })?;
        Ok(data)
    }

    /// Borrow `len` bytes of value data.
    fn bytes(&self, len: usize) -> Result<&[u8], RuntimeError> {
        if len == 0 {
            return Ok(&[]);
        }
        let data = self.data()?;
        if data.is_null() {
            return Err(RuntimeError::UnsupportedValue(
                "native value has no data".to_owned(),
            ));
        }
        // SAFETY: the runtime guarantees `len` readable bytes for this dtype and shape, valid
        // until the value is released, which requires `&mut self`.
        Ok(unsafe { std::slice::from_raw_parts(data.cast::<u8>(), len) })
    }

    fn text(&self, context: &'static str) -> Result<&str, RuntimeError> {
        let data = self.data()?;
        if data.is_null() {
            return Err(RuntimeError::UnsupportedValue(
                "native value has no data".to_owned(),
            ));
        }
        // SAFETY: string, list and dict data is NUL-terminated and lives as long as the value.
        unsafe { CStr::from_ptr(data.cast()) }
            .to_str()
            .map_err(|e| RuntimeError::InvalidString {
                context,
                details: e.to_string(),
            })
    }

    /// Decode into an owned host object.
    pub fn to_object(&self) -> Result<Object, RuntimeError> {
        let dtype = self.dtype()?;
        let object = match dtype {
            Dtype::Null => Object::Null,
            Dtype::String => Object::Text(self.text("string value")?.to_owned()),
            Dtype::List => match serde_json::from_str(self.text("list value")?)? {
                serde_json::Value::Array(items) => Object::Sequence(items),
                other => {
                    return Err(RuntimeError::UnsupportedValue(format!(
                        "list value holds non-array JSON: {other}"
                    )));
                }
            },
            Dtype::Dict => match serde_json::from_str(self.text("dict value")?)? {
                serde_json::Value::Object(map) => Object::Mapping(map),
                other => {
                    return Err(RuntimeError::UnsupportedValue(format!(
                        "dict value holds non-object JSON: {other}"
                    )));
                }
            },
            Dtype::Image => {
                let shape = self.native_shape()?;
                let [height, width, channels] = shape[..] else {
                    return Err(RuntimeError::UnsupportedValue(format!(
                        "image value has shape {shape:?}"
                    )));
                };
                let data = self.bytes(element_count(&[height, width, channels])?)?.to_vec();
                Object::Image(PixelBuffer::new(width, height, channels, data)?)
            }
            Dtype::Binary => Object::Bytes(Bytes::copy_from_slice(self.binary_bytes()?)),
            tensor => {
                let shape = self.native_shape()?;
                let size = tensor.element_size().unwrap_or(1);
                let len = element_count(&[element_count(&shape)?, size])?;
                let data = TensorData::from_ne_bytes(tensor, self.bytes(len)?)?;
                Tensor::new(shape, data)?.into_object()
            }
        };
        Ok(object)
    }

    fn binary_bytes(&self) -> Result<&[u8], RuntimeError> {
        let len = self.native_shape()?.first().copied().unwrap_or(0);
        self.bytes(len)
    }

    /// Write the contents of a binary value to `path`.
    pub fn write_binary(&self, path: impl AsRef<Path>) -> Result<(), RuntimeError> {
        let dtype = self.dtype()?;
        if dtype != Dtype::Binary {
            return Err(RuntimeError::UnsupportedValue(format!(
                "cannot write {dtype} value as binary"
            )));
        }
        std::fs::write(path, self.binary_bytes()?)?;
        Ok(())
    }

    /// Hand the native value to a new owner, returning memory it may still reference.
    pub(crate) fn transfer(&mut self) -> Option<Bytes> {
        self.handle.disown();
        self.keepalive.take()
    }

    pub(crate) fn live(&self, operation: &'static str) -> Result<*mut c_void, RuntimeError> {
        self.handle.live(operation)
    }
}

impl Release for Value {
    fn release(&mut self) {
        self.handle.release();
        self.keepalive = None;
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Value")
            .field("handle", &self.handle)
            .field("zero_copy", &self.keepalive.is_some())
            .finish()
    }
}

pub(crate) fn c_string(text: &str, context: &'static str) -> Result<CString, RuntimeError> {
    CString::new(text).map_err(|e| RuntimeError::InvalidString {
        context,
        details: e.to_string(),
    })
}

/// Read a string that the runtime writes into a caller-provided buffer of `capacity` bytes.
pub(crate) fn read_c_string<F>(
    operation: &'static str,
    capacity: usize,
    read: F,
) -> Result<String, RuntimeError>
where
    F: FnOnce(*mut c_char, i32) -> FXNStatus,
{
    let mut buffer = vec![0u8; capacity.max(1)];
    let len = native_int(buffer.len(), "string buffer")?;
    check(operation, read(buffer.as_mut_ptr().cast(), len))?;
    // Guarantee termination even if the runtime filled the whole buffer.
    if let Some(last) = buffer.last_mut() {
        *last = 0;
    }
    let text = CStr::from_bytes_until_nul(&buffer).map_err(|e| RuntimeError::InvalidString {
        context: operation,
        details: e.to_string(),
    })?;
    text.to_str()
        .map(str::to_owned)
        .map_err(|e| RuntimeError::InvalidString {
            context: operation,
            details: e.to_string(),
        })
}

fn native_int(value: usize, what: &str) -> Result<i32, RuntimeError> {
    i32::try_from(value)
        .map_err(|_| RuntimeError::UnsupportedValue(format!("{what} {value} exceeds native limits")))
}
