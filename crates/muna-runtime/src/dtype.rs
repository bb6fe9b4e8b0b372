use serde::{Deserialize, Serialize};

use crate::error::RuntimeError;
use crate::sys::FXNDtype;

/// Logical value type.
///
/// Names follow numpy dtype names (`float32`, `uint8`, ...).
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Dtype {
    Null,
    Float16,
    Float32,
    Float64,
    Int8,
    Int16,
    Int32,
    Int64,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Bool,
    String,
    List,
    Dict,
    Image,
    Binary,
}

impl Dtype {
    /// Native type code.
    pub fn to_native(self) -> FXNDtype {
        match self {
            Dtype::Null => 0,
            Dtype::Float16 => 1,
            Dtype::Float32 => 2,
            Dtype::Float64 => 3,
            Dtype::Int8 => 4,
            Dtype::Int16 => 5,
            Dtype::Int32 => 6,
            Dtype::Int64 => 7,
            Dtype::Uint8 => 8,
            Dtype::Uint16 => 9,
            Dtype::Uint32 => 10,
            Dtype::Uint64 => 11,
            Dtype::Bool => 12,
            Dtype::String => 13,
            Dtype::List => 14,
            Dtype::Dict => 15,
            Dtype::Image => 16,
            Dtype::Binary => 17,
        }
    }

    /// Map a native type code back to a dtype. Unknown codes are a protocol error.
    pub fn from_native(code: FXNDtype) -> Result<Self, RuntimeError> {
        let dtype = match code {
            0 => Dtype::Null,
            1 => Dtype::Float16,
            2 => Dtype::Float32,
            3 => Dtype::Float64,
            4 => Dtype::Int8,
            5 => Dtype::Int16,
            6 => Dtype::Int32,
            7 => Dtype::Int64,
            8 => Dtype::Uint8,
            9 => Dtype::Uint16,
            10 => Dtype::Uint32,
            11 => Dtype::Uint64,
            12 => Dtype::Bool,
            13 => Dtype::String,
            14 => Dtype::List,
            15 => Dtype::Dict,
            16 => Dtype::Image,
            17 => Dtype::Binary,
            other => return Err(RuntimeError::UnknownDtype(other)),
        };
        Ok(dtype)
    }

    /// Numeric and boolean element types, stored as dense arrays.
    pub fn is_tensor(self) -> bool {
        self.element_size().is_some()
    }

    /// Dtypes that carry a shape: tensors and images.
    pub fn has_shape(self) -> bool {
        self.is_tensor() || self == Dtype::Image
    }

    /// Size in bytes of one tensor element, `None` for non-tensor dtypes.
    pub fn element_size(self) -> Option<usize> {
        match self {
            Dtype::Int8 | Dtype::Uint8 | Dtype::Bool => Some(1),
            Dtype::Float16 | Dtype::Int16 | Dtype::Uint16 => Some(2),
            Dtype::Float32 | Dtype::Int32 | Dtype::Uint32 => Some(4),
            Dtype::Float64 | Dtype::Int64 | Dtype::Uint64 => Some(8),
            _ => None,
        }
    }
}
