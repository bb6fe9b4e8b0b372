//! Host-side representation of prediction inputs and outputs.

use bytes::Bytes;
use half::f16;
use serde::Serialize;

use crate::dtype::Dtype;
use crate::error::RuntimeError;
use crate::value::Value;

/// A host value that can cross the native boundary.
///
/// The variants form a closed set; encoding picks the native representation from the variant,
/// and decoding picks the variant from the native dtype.
#[derive(Debug, Clone, PartialEq)]
pub enum Object {
    /// Absent value.
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Tensor(Tensor),
    Text(String),
    Sequence(Vec<serde_json::Value>),
    Mapping(serde_json::Map<String, serde_json::Value>),
    Image(PixelBuffer),
    Bytes(Bytes),
}

impl Object {
    /// Flatten a serializable record into plain data.
    ///
    /// Structs and maps become [`Object::Mapping`], sequences become [`Object::Sequence`], and
    /// scalars map to their matching variant.
    pub fn from_serialize<T: Serialize + ?Sized>(record: &T) -> Result<Self, RuntimeError> {
        Ok(serde_json::to_value(record)?.into())
    }

    /// Name of the variant, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Object::Null => "null",
            Object::Bool(_) => "bool",
            Object::Int(_) => "int",
            Object::Float(_) => "float",
            Object::Tensor(_) => "tensor",
            Object::Text(_) => "text",
            Object::Sequence(_) => "sequence",
            Object::Mapping(_) => "mapping",
            Object::Image(_) => "image",
            Object::Bytes(_) => "bytes",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Object::Null)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Object::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Object::Int(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Object::Float(value) => Some(*value),
            Object::Int(value) => Some(*value as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Object::Text(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_tensor(&self) -> Option<&Tensor> {
        match self {
            Object::Tensor(tensor) => Some(tensor),
            _ => None,
        }
    }

    pub fn as_image(&self) -> Option<&PixelBuffer> {
        match self {
            Object::Image(image) => Some(image),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Object::Bytes(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// JSON view of the object, for values that have one.
    ///
    /// Tensors, images and bytes have no JSON form and return `None`.
    pub fn to_json(&self) -> Option<serde_json::Value> {
        use serde_json::Value as Json;
        match self {
            Object::Null => Some(Json::Null),
            Object::Bool(value) => Some(Json::Bool(*value)),
            Object::Int(value) => Some(Json::from(*value)),
            Object::Float(value) => serde_json::Number::from_f64(*value).map(Json::Number),
            Object::Text(value) => Some(Json::String(value.clone())),
            Object::Sequence(items) => Some(Json::Array(items.clone())),
            Object::Mapping(map) => Some(Json::Object(map.clone())),
            Object::Tensor(_) | Object::Image(_) | Object::Bytes(_) => None,
        }
    }
}

impl From<serde_json::Value> for Object {
    fn from(value: serde_json::Value) -> Self {
        use serde_json::Value as Json;
        match value {
            Json::Null => Object::Null,
            Json::Bool(value) => Object::Bool(value),
            Json::Number(number) => match number.as_i64() {
                Some(value) => Object::Int(value),
                None => Object::Float(number.as_f64().unwrap_or(f64::NAN)),
            },
            Json::String(value) => Object::Text(value),
            Json::Array(items) => Object::Sequence(items),
            Json::Object(map) => Object::Mapping(map),
        }
    }
}

impl From<bool> for Object {
    fn from(value: bool) -> Self {
        Object::Bool(value)
    }
}

macro_rules! object_from_int {
    ($($ty:ty),*) => {
        $(impl From<$ty> for Object {
            fn from(value: $ty) -> Self {
                Object::Int(i64::from(value))
            }
        })*
    };
}

object_from_int!(i8, i16, i32, i64, u8, u16, u32);

impl From<f32> for Object {
    fn from(value: f32) -> Self {
        Object::Float(f64::from(value))
    }
}

impl From<f64> for Object {
    fn from(value: f64) -> Self {
        Object::Float(value)
    }
}

impl From<String> for Object {
    fn from(value: String) -> Self {
        Object::Text(value)
    }
}

impl From<&str> for Object {
    fn from(value: &str) -> Self {
        Object::Text(value.to_owned())
    }
}

impl From<Tensor> for Object {
    fn from(value: Tensor) -> Self {
        Object::Tensor(value)
    }
}

impl From<PixelBuffer> for Object {
    fn from(value: PixelBuffer) -> Self {
        Object::Image(value)
    }
}

impl From<Bytes> for Object {
    fn from(value: Bytes) -> Self {
        Object::Bytes(value)
    }
}

impl From<Vec<u8>> for Object {
    fn from(value: Vec<u8>) -> Self {
        Object::Bytes(Bytes::from(value))
    }
}

impl From<Vec<serde_json::Value>> for Object {
    fn from(value: Vec<serde_json::Value>) -> Self {
        Object::Sequence(value)
    }
}

impl From<serde_json::Map<String, serde_json::Value>> for Object {
    fn from(value: serde_json::Map<String, serde_json::Value>) -> Self {
        Object::Mapping(value)
    }
}

impl<T: Into<Object>> From<Option<T>> for Object {
    fn from(value: Option<T>) -> Self {
        value.map_or(Object::Null, Into::into)
    }
}

macro_rules! tensor_data {
    ($($variant:ident($ty:ty)),* $(,)?) => {
        /// Dense, row-major element storage of a [`Tensor`].
        #[derive(Debug, Clone, PartialEq)]
        pub enum TensorData {
            $($variant(Vec<$ty>),)*
            Bool(Vec<bool>),
        }

        impl TensorData {
            pub fn dtype(&self) -> Dtype {
                match self {
                    $(TensorData::$variant(_) => Dtype::$variant,)*
                    TensorData::Bool(_) => Dtype::Bool,
                }
            }

            pub fn len(&self) -> usize {
                match self {
                    $(TensorData::$variant(data) => data.len(),)*
                    TensorData::Bool(data) => data.len(),
                }
            }

            pub fn is_empty(&self) -> bool {
                self.len() == 0
            }

            /// Elements in native byte order. Booleans are one byte each.
            pub(crate) fn to_ne_bytes(&self) -> Vec<u8> {
                match self {
                    $(TensorData::$variant(data) => {
                        data.iter().flat_map(|element| element.to_ne_bytes()).collect()
                    })*
                    TensorData::Bool(data) => data.iter().map(|&element| u8::from(element)).collect(),
                }
            }

            /// Read elements of `dtype` from native-order bytes.
            ///
            /// `bytes` need not be aligned.
            pub(crate) fn from_ne_bytes(dtype: Dtype, bytes: &[u8]) -> Result<Self, RuntimeError> {
                let size = dtype.element_size().ok_or_else(|| {
                    RuntimeError::UnsupportedValue(format!("{dtype} is not a tensor element type"))
                })?;
                if bytes.len() % size != 0 {
                    return Err(RuntimeError::UnsupportedValue(format!(
                        "{} bytes is not a whole number of {dtype} elements",
                        bytes.len()
                    )));
                }
                let data = match dtype {
                    $(Dtype::$variant => TensorData::$variant(
                        bytes
                            .chunks_exact(size)
                            .map(|chunk| {
                                let mut raw = [0u8; std::mem::size_of::<$ty>()];
                                raw.copy_from_slice(chunk);
                                <$ty>::from_ne_bytes(raw)
                            })
                            .collect(),
                    ),)*
                    Dtype::Bool => TensorData::Bool(bytes.iter().map(|&byte| byte != 0).collect()),
                    other => {
                        return Err(RuntimeError::UnsupportedValue(format!(
                            "{other} is not a tensor element type"
                        )));
                    }
                };
                Ok(data)
            }

            /// The single element of a rank-0 tensor as a scalar object.
            fn scalar(&self) -> Option<Object> {
                if self.len() != 1 {
                    return None;
                }
                match self {
                    TensorData::Float16(data) => Some(Object::Float(f64::from(data[0]))),
                    TensorData::Float32(data) => Some(Object::Float(f64::from(data[0]))),
                    TensorData::Float64(data) => Some(Object::Float(data[0])),
                    TensorData::Int8(data) => Some(Object::Int(i64::from(data[0]))),
                    TensorData::Int16(data) => Some(Object::Int(i64::from(data[0]))),
                    TensorData::Int32(data) => Some(Object::Int(i64::from(data[0]))),
                    TensorData::Int64(data) => Some(Object::Int(data[0])),
                    TensorData::Uint8(data) => Some(Object::Int(i64::from(data[0]))),
                    TensorData::Uint16(data) => Some(Object::Int(i64::from(data[0]))),
                    TensorData::Uint32(data) => Some(Object::Int(i64::from(data[0]))),
                    TensorData::Uint64(data) => i64::try_from(data[0]).ok().map(Object::Int),
                    TensorData::Bool(data) => Some(Object::Bool(data[0])),
                }
            }
        }

        $(impl From<Vec<$ty>> for TensorData {
            fn from(data: Vec<$ty>) -> Self {
                TensorData::$variant(data)
            }
        })*

        impl From<Vec<bool>> for TensorData {
            fn from(data: Vec<bool>) -> Self {
                TensorData::Bool(data)
            }
        }
    };
}

tensor_data! {
    Float16(f16),
    Float32(f32),
    Float64(f64),
    Int8(i8),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Uint8(u8),
    Uint16(u16),
    Uint32(u32),
    Uint64(u64),
}

/// A shaped, typed buffer.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    shape: Vec<usize>,
    data: TensorData,
}

impl Tensor {
    /// Create a tensor, checking that `shape` covers exactly the elements of `data`.
    pub fn new(shape: Vec<usize>, data: impl Into<TensorData>) -> Result<Self, RuntimeError> {
        let data = data.into();
        let elements = element_count(&shape)?;
        if elements != data.len() {
            return Err(RuntimeError::UnsupportedValue(format!(
                "tensor of shape {shape:?} needs {elements} elements but {} were given",
                data.len()
            )));
        }
        if i32::try_from(shape.len()).is_err() || shape.iter().any(|&d| i32::try_from(d).is_err()) {
            return Err(RuntimeError::UnsupportedValue(format!(
                "tensor shape {shape:?} exceeds native limits"
            )));
        }
        Ok(Self { shape, data })
    }

    /// A rank-0 tensor holding one element.
    pub fn scalar(data: impl Into<TensorData>) -> Result<Self, RuntimeError> {
        Self::new(Vec::new(), data)
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn data(&self) -> &TensorData {
        &self.data
    }

    pub fn dtype(&self) -> Dtype {
        self.data.dtype()
    }

    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    pub fn into_parts(self) -> (Vec<usize>, TensorData) {
        (self.shape, self.data)
    }

    /// Unwrap rank-0 tensors into scalar objects; keep everything else as a tensor.
    ///
    /// A rank-0 `uint64` above `i64::MAX` has no scalar form and stays a tensor.
    pub(crate) fn into_object(self) -> Object {
        if self.shape.is_empty() {
            if let Some(scalar) = self.data.scalar() {
                return scalar;
            }
        }
        Object::Tensor(self)
    }
}

/// Number of elements in a buffer with dimensions `dims`.
pub(crate) fn element_count(dims: &[usize]) -> Result<usize, RuntimeError> {
    dims.iter()
        .try_fold(1usize, |count, &dim| count.checked_mul(dim))
        .ok_or_else(|| RuntimeError::UnsupportedValue(format!("dimensions {dims:?} overflow")))
}

/// Interleaved 8-bit pixels, row-major, `height x width x channels`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PixelBuffer {
    width: usize,
    height: usize,
    channels: usize,
    data: Vec<u8>,
}

impl PixelBuffer {
    pub fn new(width: usize, height: usize, channels: usize, data: Vec<u8>) -> Result<Self, RuntimeError> {
        if !(1..=4).contains(&channels) {
            return Err(RuntimeError::UnsupportedValue(format!(
                "image with {channels} channels"
            )));
        }
        let len = element_count(&[height, width, channels])?;
        if len != data.len() {
            return Err(RuntimeError::UnsupportedValue(format!(
                "{width}x{height}x{channels} image needs {len} bytes but {} were given",
                data.len()
            )));
        }
        if [width, height].iter().any(|&d| i32::try_from(d).is_err()) {
            return Err(RuntimeError::UnsupportedValue(format!(
                "{width}x{height} image exceeds native limits"
            )));
        }
        Ok(Self {
            width,
            height,
            channels,
            data,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn channels(&self) -> usize {
        self.channels
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }
}

/// A prediction input: either a host object to encode, or an already encoded native value.
#[derive(Debug)]
pub enum Input {
    Object(Object),
    Value(Value),
}

impl From<Object> for Input {
    fn from(object: Object) -> Self {
        Input::Object(object)
    }
}

impl From<Value> for Input {
    fn from(value: Value) -> Self {
        Input::Value(value)
    }
}

macro_rules! input_from {
    ($($ty:ty),* $(,)?) => {
        $(impl From<$ty> for Input {
            fn from(value: $ty) -> Self {
                Input::Object(Object::from(value))
            }
        })*
    };
}

input_from!(
    bool,
    i8,
    i16,
    i32,
    i64,
    u8,
    u16,
    u32,
    f32,
    f64,
    String,
    &str,
    Tensor,
    PixelBuffer,
    Bytes,
    Vec<u8>,
    serde_json::Value,
);
