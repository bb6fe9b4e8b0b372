//! Raw C ABI of the native prediction runtime (`fxnc`).
//!
//! Every entry point is resolved once into an [`FxncApi`] function table. The safe wrappers in
//! the sibling modules are the only callers of these pointers.
//!
//! # Safety
//!
//! All functions in the table are `unsafe extern "C"`. Handles passed to them must be live
//! (created by the runtime and not yet released), and out-pointers must be valid for writes.

#![allow(non_snake_case, non_camel_case_types)]

use std::ffi::{c_char, c_int, c_void};

/// Status code returned by every runtime call.
pub type FXNStatus = c_int;
pub const FXN_OK: FXNStatus = 0;
pub const FXN_ERROR_INVALID_ARGUMENT: FXNStatus = 1;
pub const FXN_ERROR_INVALID_OPERATION: FXNStatus = 2;
pub const FXN_ERROR_NOT_IMPLEMENTED: FXNStatus = 3;

/// Native value type code.
pub type FXNDtype = c_int;

/// Value creation flags.
pub type FXNValueFlags = c_int;
pub const FXN_VALUE_FLAG_NONE: FXNValueFlags = 0;
pub const FXN_VALUE_FLAG_COPY_DATA: FXNValueFlags = 1;

/// Compute backend hint.
pub type FXNAcceleration = c_int;

pub type FXNConfigurationRef = *mut c_void;
pub type FXNValueRef = *mut c_void;
pub type FXNValueMapRef = *mut c_void;
pub type FXNPredictorRef = *mut c_void;
pub type FXNPredictionRef = *mut c_void;
pub type FXNPredictionStreamRef = *mut c_void;

macro_rules! fxnc_api {
    ($( fn $name:ident($($ty:ty),* $(,)?) -> $ret:ty; )*) => {
        /// Function table for the native runtime.
        ///
        /// Built either from a dynamically loaded library ([`FxncApi::from_library`]) or by hand
        /// for runtimes that are linked into the process.
        #[derive(Clone, Copy)]
        pub struct FxncApi {
            $( pub $name: unsafe extern "C" fn($($ty),*) -> $ret, )*
        }

        impl FxncApi {
            /// Resolve every runtime symbol from `library`.
            ///
            /// # Safety
            /// The library must export the runtime ABI with exactly these signatures, and the
            /// returned table must not outlive `library`.
            pub unsafe fn from_library(
                library: &libloading::Library,
            ) -> Result<Self, libloading::Error> {
                Ok(Self {
                    $(
                        // SAFETY: symbol signature is fixed by the runtime ABI.
                        $name: unsafe {
                            *library.get::<unsafe extern "C" fn($($ty),*) -> $ret>(
                                concat!(stringify!($name), "\0").as_bytes(),
                            )?
                        },
                    )*
                })
            }
        }
    };
}

fxnc_api! {
    // Version
    fn FXNGetVersion() -> *const c_char;

    // Configuration
    fn FXNConfigurationGetUniqueID(*mut c_char, i32) -> FXNStatus;
    fn FXNConfigurationGetClientID(*mut c_char, i32) -> FXNStatus;
    fn FXNConfigurationCreate(*mut FXNConfigurationRef) -> FXNStatus;
    fn FXNConfigurationRelease(FXNConfigurationRef) -> FXNStatus;
    fn FXNConfigurationGetTag(FXNConfigurationRef, *mut c_char, i32) -> FXNStatus;
    fn FXNConfigurationSetTag(FXNConfigurationRef, *const c_char) -> FXNStatus;
    fn FXNConfigurationGetToken(FXNConfigurationRef, *mut c_char, i32) -> FXNStatus;
    fn FXNConfigurationSetToken(FXNConfigurationRef, *const c_char) -> FXNStatus;
    fn FXNConfigurationGetAcceleration(FXNConfigurationRef, *mut FXNAcceleration) -> FXNStatus;
    fn FXNConfigurationSetAcceleration(FXNConfigurationRef, FXNAcceleration) -> FXNStatus;
    fn FXNConfigurationGetDevice(FXNConfigurationRef, *mut *mut c_void) -> FXNStatus;
    fn FXNConfigurationSetDevice(FXNConfigurationRef, *mut c_void) -> FXNStatus;
    fn FXNConfigurationAddResource(FXNConfigurationRef, *const c_char, *const c_char) -> FXNStatus;

    // Value
    fn FXNValueRelease(FXNValueRef) -> FXNStatus;
    fn FXNValueGetData(FXNValueRef, *mut *mut c_void) -> FXNStatus;
    fn FXNValueGetType(FXNValueRef, *mut FXNDtype) -> FXNStatus;
    fn FXNValueGetDimensions(FXNValueRef, *mut i32) -> FXNStatus;
    fn FXNValueGetShape(FXNValueRef, *mut i32, i32) -> FXNStatus;
    fn FXNValueCreateArray(*mut c_void, *const i32, i32, FXNDtype, FXNValueFlags, *mut FXNValueRef) -> FXNStatus;
    fn FXNValueCreateString(*const c_char, *mut FXNValueRef) -> FXNStatus;
    fn FXNValueCreateList(*const c_char, *mut FXNValueRef) -> FXNStatus;
    fn FXNValueCreateDict(*const c_char, *mut FXNValueRef) -> FXNStatus;
    fn FXNValueCreateImage(*const u8, i32, i32, i32, FXNValueFlags, *mut FXNValueRef) -> FXNStatus;
    fn FXNValueCreateBinary(*mut c_void, i32, FXNValueFlags, *mut FXNValueRef) -> FXNStatus;
    fn FXNValueCreateNull(*mut FXNValueRef) -> FXNStatus;

    // Value map
    fn FXNValueMapCreate(*mut FXNValueMapRef) -> FXNStatus;
    fn FXNValueMapRelease(FXNValueMapRef) -> FXNStatus;
    fn FXNValueMapGetSize(FXNValueMapRef, *mut i32) -> FXNStatus;
    fn FXNValueMapGetKey(FXNValueMapRef, i32, *mut c_char, i32) -> FXNStatus;
    fn FXNValueMapGetValue(FXNValueMapRef, *const c_char, *mut FXNValueRef) -> FXNStatus;
    fn FXNValueMapSetValue(FXNValueMapRef, *const c_char, FXNValueRef) -> FXNStatus;

    // Predictor
    fn FXNPredictorCreate(FXNConfigurationRef, *mut FXNPredictorRef) -> FXNStatus;
    fn FXNPredictorRelease(FXNPredictorRef) -> FXNStatus;
    fn FXNPredictorCreatePrediction(FXNPredictorRef, FXNValueMapRef, *mut FXNPredictionRef) -> FXNStatus;
    fn FXNPredictorStreamPrediction(FXNPredictorRef, FXNValueMapRef, *mut FXNPredictionStreamRef) -> FXNStatus;

    // Prediction
    fn FXNPredictionRelease(FXNPredictionRef) -> FXNStatus;
    fn FXNPredictionGetID(FXNPredictionRef, *mut c_char, i32) -> FXNStatus;
    fn FXNPredictionGetLatency(FXNPredictionRef, *mut f64) -> FXNStatus;
    fn FXNPredictionGetResults(FXNPredictionRef, *mut FXNValueMapRef) -> FXNStatus;
    fn FXNPredictionGetError(FXNPredictionRef, *mut c_char, i32) -> FXNStatus;
    fn FXNPredictionGetLogLength(FXNPredictionRef, *mut i32) -> FXNStatus;
    fn FXNPredictionGetLogs(FXNPredictionRef, *mut c_char, i32) -> FXNStatus;

    // Prediction stream
    fn FXNPredictionStreamRelease(FXNPredictionStreamRef) -> FXNStatus;
    fn FXNPredictionStreamReadNext(FXNPredictionStreamRef, *mut FXNPredictionRef) -> FXNStatus;
}
