use std::fmt;

use crate::error::RuntimeError;
use crate::sys::{
    FXN_ERROR_INVALID_ARGUMENT, FXN_ERROR_INVALID_OPERATION, FXN_ERROR_NOT_IMPLEMENTED, FXN_OK,
    FXNStatus,
};

/// Status reported by a native runtime call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    Ok,
    InvalidArgument,
    InvalidOperation,
    NotImplemented,
    /// A code outside the documented set.
    Unknown(i32),
}

impl Status {
    pub fn from_raw(status: FXNStatus) -> Self {
        match status {
            FXN_OK => Status::Ok,
            FXN_ERROR_INVALID_ARGUMENT => Status::InvalidArgument,
            FXN_ERROR_INVALID_OPERATION => Status::InvalidOperation,
            FXN_ERROR_NOT_IMPLEMENTED => Status::NotImplemented,
            other => Status::Unknown(other),
        }
    }

    pub fn as_raw(self) -> FXNStatus {
        match self {
            Status::Ok => FXN_OK,
            Status::InvalidArgument => FXN_ERROR_INVALID_ARGUMENT,
            Status::InvalidOperation => FXN_ERROR_INVALID_OPERATION,
            Status::NotImplemented => FXN_ERROR_NOT_IMPLEMENTED,
            Status::Unknown(code) => code,
        }
    }

    pub fn is_ok(self) -> bool {
        self == Status::Ok
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Ok => f.write_str("FXN_OK"),
            Status::InvalidArgument => f.write_str("FXN_ERROR_INVALID_ARGUMENT"),
            Status::InvalidOperation => f.write_str("FXN_ERROR_INVALID_OPERATION"),
            Status::NotImplemented => f.write_str("FXN_ERROR_NOT_IMPLEMENTED"),
            Status::Unknown(code) => write!(f, "FXN_STATUS_{code}"),
        }
    }
}

/// Turn a raw status into a result, naming the operation on failure.
pub(crate) fn check(operation: &'static str, status: FXNStatus) -> Result<(), RuntimeError> {
    match Status::from_raw(status) {
        Status::Ok => Ok(()),
        status => Err(RuntimeError::NativeCall { operation, status }),
    }
}
