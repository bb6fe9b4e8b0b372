//! In-process fake of the native runtime.
//!
//! The fake implements the whole C ABI with `extern "C"` functions, so the bindings are exercised
//! through real raw pointers and status codes. Native objects are leaked boxes; their addresses
//! are never reused, which lets tests inspect release counts after the fact.
//!
//! Predictor behavior is driven by the tag:
//! * a tag containing `invalid` fails to build a predictor;
//! * a tag containing `error` yields predictions with the error `invalid input shape` and no
//!   results;
//! * any other tag echoes its inputs back as results;
//! * streams yield as many predictions as the number after the last `-` in the tag (one if
//!   there is none), then end, or fail with `FXN_ERROR_NOT_IMPLEMENTED` if the tag contains
//!   `fault`.

use std::collections::BTreeMap;
use std::ffi::{CStr, c_char, c_void};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::fxnc::Fxnc;
use crate::sys::{
    FXN_ERROR_INVALID_ARGUMENT, FXN_ERROR_INVALID_OPERATION, FXN_ERROR_NOT_IMPLEMENTED, FXN_OK,
    FXN_VALUE_FLAG_COPY_DATA, FXNAcceleration, FXNDtype, FXNStatus, FXNValueFlags, FxncApi,
};

/// A runtime backed by the in-process fake.
pub fn fake_runtime() -> Fxnc {
    Fxnc::from_api(FAKE_API)
}

/// How many times the native object at `raw` has been released.
pub fn release_count(raw: *mut c_void) -> usize {
    lock(&RELEASES).get(&(raw as usize)).copied().unwrap_or(0)
}

/// Releases of an already released object, across the whole process.
pub fn double_releases() -> usize {
    DOUBLE_RELEASES.load(Ordering::SeqCst)
}

/// How many native predictors have been built for `tag`.
pub fn predictor_creations(tag: &str) -> usize {
    lock(&PREDICTORS).get(tag).map_or(0, |record| record.creations)
}

/// Resources attached to the configuration of the latest predictor built for `tag`.
pub fn predictor_resources(tag: &str) -> Vec<(String, String)> {
    lock(&PREDICTORS)
        .get(tag)
        .map(|record| record.resources.clone())
        .unwrap_or_default()
}

struct PredictorRecord {
    creations: usize,
    resources: Vec<(String, String)>,
}

static RELEASES: Mutex<BTreeMap<usize, usize>> = Mutex::new(BTreeMap::new());
static PREDICTORS: Mutex<BTreeMap<String, PredictorRecord>> = Mutex::new(BTreeMap::new());
static DOUBLE_RELEASES: AtomicUsize = AtomicUsize::new(0);
static NEXT_ID: AtomicUsize = AtomicUsize::new(1);

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn next_id() -> usize {
    NEXT_ID.fetch_add(1, Ordering::SeqCst)
}

enum Fake {
    Configuration(Mutex<FakeConfiguration>),
    Value(FakeValue),
    Map(Mutex<Vec<(String, *mut c_void)>>),
    Predictor(String),
    Prediction(FakePrediction),
    Stream(Mutex<FakeStream>),
}

#[derive(Default)]
struct FakeConfiguration {
    tag: Option<String>,
    token: Option<String>,
    acceleration: FXNAcceleration,
    device: usize,
    resources: Vec<(String, String)>,
}

struct FakeValue {
    dtype: FXNDtype,
    shape: Vec<i32>,
    data: FakeData,
}

enum FakeData {
    None,
    Owned(Vec<u8>),
    /// Caller memory referenced without copying.
    Borrowed(*const u8, usize),
}

impl FakeValue {
    fn bytes(&self) -> &[u8] {
        match &self.data {
            FakeData::None => &[],
            FakeData::Owned(bytes) => bytes,
            FakeData::Borrowed(_, 0) => &[],
            // SAFETY: the caller keeps zero-copy memory alive for the lifetime of the value.
            FakeData::Borrowed(ptr, len) => unsafe { std::slice::from_raw_parts(*ptr, *len) },
        }
    }

    fn data_ptr(&self) -> *mut c_void {
        match &self.data {
            FakeData::None => std::ptr::null_mut(),
            FakeData::Owned(bytes) => bytes.as_ptr().cast_mut().cast(),
            FakeData::Borrowed(ptr, _) => ptr.cast_mut().cast(),
        }
    }

    fn deep_copy(&self) -> Self {
        Self {
            dtype: self.dtype,
            shape: self.shape.clone(),
            data: match self.data {
                FakeData::None => FakeData::None,
                _ => FakeData::Owned(self.bytes().to_vec()),
            },
        }
    }
}

struct FakePrediction {
    id: String,
    latency: f64,
    results: *mut c_void,
    error: Option<String>,
    logs: String,
}

struct FakeStream {
    tag: String,
    inputs: *mut c_void,
    remaining: usize,
    fault: bool,
}

type FakeResult<T> = Result<T, FXNStatus>;

fn run(body: impl FnOnce() -> FakeResult<()>) -> FXNStatus {
    match body() {
        Ok(()) => FXN_OK,
        Err(status) => status,
    }
}

fn into_raw(fake: Fake) -> *mut c_void {
    Box::into_raw(Box::new(fake)).cast()
}

/// # Safety
/// `raw` must be null or a pointer produced by [`into_raw`].
unsafe fn live(raw: *mut c_void) -> FakeResult<&'static Fake> {
    if raw.is_null() {
        return Err(FXN_ERROR_INVALID_ARGUMENT);
    }
    if release_count(raw) > 0 {
        return Err(FXN_ERROR_INVALID_OPERATION);
    }
    // SAFETY: fakes are leaked, so the reference is valid forever.
    Ok(unsafe { &*raw.cast::<Fake>() })
}

unsafe fn configuration(raw: *mut c_void) -> FakeResult<MutexGuard<'static, FakeConfiguration>> {
    match unsafe { live(raw) }? {
        Fake::Configuration(configuration) => Ok(lock(configuration)),
        _ => Err(FXN_ERROR_INVALID_ARGUMENT),
    }
}

unsafe fn value(raw: *mut c_void) -> FakeResult<&'static FakeValue> {
    match unsafe { live(raw) }? {
        Fake::Value(value) => Ok(value),
        _ => Err(FXN_ERROR_INVALID_ARGUMENT),
    }
}

unsafe fn map(raw: *mut c_void) -> FakeResult<MutexGuard<'static, Vec<(String, *mut c_void)>>> {
    match unsafe { live(raw) }? {
        Fake::Map(entries) => Ok(lock(entries)),
        _ => Err(FXN_ERROR_INVALID_ARGUMENT),
    }
}

unsafe fn prediction(raw: *mut c_void) -> FakeResult<&'static FakePrediction> {
    match unsafe { live(raw) }? {
        Fake::Prediction(prediction) => Ok(prediction),
        _ => Err(FXN_ERROR_INVALID_ARGUMENT),
    }
}

unsafe fn write_out<T>(out: *mut T, value: T) -> FakeResult<()> {
    if out.is_null() {
        return Err(FXN_ERROR_INVALID_ARGUMENT);
    }
    unsafe { out.write(value) };
    Ok(())
}

unsafe fn read_str(ptr: *const c_char) -> FakeResult<String> {
    if ptr.is_null() {
        return Err(FXN_ERROR_INVALID_ARGUMENT);
    }
    unsafe { CStr::from_ptr(ptr) }
        .to_str()
        .map(str::to_owned)
        .map_err(|_| FXN_ERROR_INVALID_ARGUMENT)
}

unsafe fn read_optional_str(ptr: *const c_char) -> FakeResult<Option<String>> {
    if ptr.is_null() {
        return Ok(None);
    }
    unsafe { read_str(ptr) }.map(Some)
}

/// Copy `text` into a caller buffer of `size` bytes, truncating and always NUL-terminating.
unsafe fn write_str(text: &str, buffer: *mut c_char, size: i32) -> FakeResult<()> {
    let size = usize::try_from(size).map_err(|_| FXN_ERROR_INVALID_ARGUMENT)?;
    if buffer.is_null() || size == 0 {
        return Err(FXN_ERROR_INVALID_ARGUMENT);
    }
    let len = text.len().min(size - 1);
    unsafe {
        std::ptr::copy_nonoverlapping(text.as_ptr(), buffer.cast::<u8>(), len);
        buffer.add(len).write(0);
    }
    Ok(())
}

fn element_size(dtype: FXNDtype) -> Option<usize> {
    match dtype {
        4 | 8 | 12 => Some(1),
        1 | 5 | 9 => Some(2),
        2 | 6 | 10 => Some(4),
        3 | 7 | 11 => Some(8),
        _ => None,
    }
}

unsafe fn create_value(
    dtype: FXNDtype,
    shape: Vec<i32>,
    data: *const u8,
    len: usize,
    flags: FXNValueFlags,
) -> FakeResult<*mut c_void> {
    if data.is_null() && len > 0 {
        return Err(FXN_ERROR_INVALID_ARGUMENT);
    }
    let data = if flags & FXN_VALUE_FLAG_COPY_DATA != 0 || len == 0 {
        let bytes = if len == 0 {
            Vec::new()
        } else {
            // SAFETY: the caller provides `len` readable bytes.
            unsafe { std::slice::from_raw_parts(data, len) }.to_vec()
        };
        FakeData::Owned(bytes)
    } else {
        FakeData::Borrowed(data, len)
    };
    Ok(into_raw(Fake::Value(FakeValue { dtype, shape, data })))
}

fn text_value(dtype: FXNDtype, text: String) -> *mut c_void {
    let mut bytes = text.into_bytes();
    bytes.push(0);
    into_raw(Fake::Value(FakeValue {
        dtype,
        shape: Vec::new(),
        data: FakeData::Owned(bytes),
    }))
}

unsafe fn release(raw: *mut c_void) -> FXNStatus {
    if raw.is_null() {
        return FXN_ERROR_INVALID_ARGUMENT;
    }
    {
        let mut releases = lock(&RELEASES);
        let count = releases.entry(raw as usize).or_insert(0);
        *count += 1;
        if *count > 1 {
            DOUBLE_RELEASES.fetch_add(1, Ordering::SeqCst);
            return FXN_ERROR_INVALID_ARGUMENT;
        }
    }
    // SAFETY: checked non-null; fakes are leaked.
    match unsafe { &*raw.cast::<Fake>() } {
        Fake::Map(entries) => {
            let values: Vec<_> = lock(entries).drain(..).collect();
            for (_, value) in values {
                unsafe { release(value) };
            }
        }
        Fake::Prediction(prediction) => {
            unsafe { release(prediction.results) };
        }
        _ => {}
    }
    FXN_OK
}

/// Build a prediction for `tag` from the values in `inputs`.
unsafe fn predict(tag: &str, inputs: *mut c_void) -> FakeResult<*mut c_void> {
    let entries: Vec<(String, *mut c_void)> = unsafe { map(inputs) }?.clone();
    let mut results = Vec::new();
    let error = if tag.contains("error") {
        Some("invalid input shape".to_owned())
    } else {
        for (key, raw) in entries {
            let copy = unsafe { value(raw) }?.deep_copy();
            results.push((key, into_raw(Fake::Value(copy))));
        }
        None
    };
    let id = next_id();
    Ok(into_raw(Fake::Prediction(FakePrediction {
        id: format!("pred_{id:08}"),
        latency: 1.5,
        results: into_raw(Fake::Map(Mutex::new(results))),
        error,
        logs: format!("Running {tag}"),
    })))
}

unsafe extern "C" fn get_version() -> *const c_char {
    c"fake-fxnc 0.0.0".as_ptr()
}

unsafe extern "C" fn configuration_get_unique_id(buffer: *mut c_char, size: i32) -> FXNStatus {
    run(|| unsafe { write_str(&format!("cfg_{:08}", next_id()), buffer, size) })
}

unsafe extern "C" fn configuration_get_client_id(buffer: *mut c_char, size: i32) -> FXNStatus {
    run(|| unsafe { write_str("fake-linux-x86_64", buffer, size) })
}

unsafe extern "C" fn configuration_create(out: *mut *mut c_void) -> FXNStatus {
    let raw = into_raw(Fake::Configuration(Mutex::new(FakeConfiguration::default())));
    run(|| unsafe { write_out(out, raw) })
}

unsafe extern "C" fn configuration_get_tag(raw: *mut c_void, buffer: *mut c_char, size: i32) -> FXNStatus {
    run(|| unsafe {
        let configuration = configuration(raw)?;
        write_str(configuration.tag.as_deref().unwrap_or(""), buffer, size)
    })
}

unsafe extern "C" fn configuration_set_tag(raw: *mut c_void, tag: *const c_char) -> FXNStatus {
    run(|| unsafe {
        configuration(raw)?.tag = read_optional_str(tag)?;
        Ok(())
    })
}

unsafe extern "C" fn configuration_get_token(raw: *mut c_void, buffer: *mut c_char, size: i32) -> FXNStatus {
    run(|| unsafe {
        let configuration = configuration(raw)?;
        write_str(configuration.token.as_deref().unwrap_or(""), buffer, size)
    })
}

unsafe extern "C" fn configuration_set_token(raw: *mut c_void, token: *const c_char) -> FXNStatus {
    run(|| unsafe {
        configuration(raw)?.token = read_optional_str(token)?;
        Ok(())
    })
}

unsafe extern "C" fn configuration_get_acceleration(raw: *mut c_void, out: *mut FXNAcceleration) -> FXNStatus {
    run(|| unsafe {
        let acceleration = configuration(raw)?.acceleration;
        write_out(out, acceleration)
    })
}

unsafe extern "C" fn configuration_set_acceleration(raw: *mut c_void, acceleration: FXNAcceleration) -> FXNStatus {
    run(|| unsafe {
        if !matches!(acceleration, 0 | 1 | 2 | 4) {
            return Err(FXN_ERROR_INVALID_ARGUMENT);
        }
        configuration(raw)?.acceleration = acceleration;
        Ok(())
    })
}

unsafe extern "C" fn configuration_get_device(raw: *mut c_void, out: *mut *mut c_void) -> FXNStatus {
    run(|| unsafe {
        let device = configuration(raw)?.device;
        write_out(out, device as *mut c_void)
    })
}

unsafe extern "C" fn configuration_set_device(raw: *mut c_void, device: *mut c_void) -> FXNStatus {
    run(|| unsafe {
        configuration(raw)?.device = device as usize;
        Ok(())
    })
}

unsafe extern "C" fn configuration_add_resource(
    raw: *mut c_void,
    kind: *const c_char,
    path: *const c_char,
) -> FXNStatus {
    run(|| unsafe {
        let resource = (read_str(kind)?, read_str(path)?);
        configuration(raw)?.resources.push(resource);
        Ok(())
    })
}

unsafe extern "C" fn value_get_data(raw: *mut c_void, out: *mut *mut c_void) -> FXNStatus {
    run(|| unsafe { write_out(out, value(raw)?.data_ptr()) })
}

unsafe extern "C" fn value_get_type(raw: *mut c_void, out: *mut FXNDtype) -> FXNStatus {
    run(|| unsafe { write_out(out, value(raw)?.dtype) })
}

unsafe extern "C" fn value_get_dimensions(raw: *mut c_void, out: *mut i32) -> FXNStatus {
    run(|| unsafe {
        let dims = i32::try_from(value(raw)?.shape.len()).map_err(|_| FXN_ERROR_INVALID_OPERATION)?;
        write_out(out, dims)
    })
}

unsafe extern "C" fn value_get_shape(raw: *mut c_void, out: *mut i32, size: i32) -> FXNStatus {
    run(|| unsafe {
        let shape = &value(raw)?.shape;
        let size = usize::try_from(size).map_err(|_| FXN_ERROR_INVALID_ARGUMENT)?;
        if size < shape.len() || (out.is_null() && !shape.is_empty()) {
            return Err(FXN_ERROR_INVALID_ARGUMENT);
        }
        if !shape.is_empty() {
            std::ptr::copy_nonoverlapping(shape.as_ptr(), out, shape.len());
        }
        Ok(())
    })
}

unsafe extern "C" fn value_create_array(
    data: *mut c_void,
    shape: *const i32,
    dims: i32,
    dtype: FXNDtype,
    flags: FXNValueFlags,
    out: *mut *mut c_void,
) -> FXNStatus {
    run(|| unsafe {
        let size = element_size(dtype).ok_or(FXN_ERROR_INVALID_ARGUMENT)?;
        let dims = usize::try_from(dims).map_err(|_| FXN_ERROR_INVALID_ARGUMENT)?;
        if shape.is_null() && dims > 0 {
            return Err(FXN_ERROR_INVALID_ARGUMENT);
        }
        let shape = if dims == 0 {
            Vec::new()
        } else {
            std::slice::from_raw_parts(shape, dims).to_vec()
        };
        let mut elements = 1usize;
        for &dim in &shape {
            elements *= usize::try_from(dim).map_err(|_| FXN_ERROR_INVALID_ARGUMENT)?;
        }
        let raw = create_value(dtype, shape, data.cast(), elements * size, flags)?;
        write_out(out, raw)
    })
}

unsafe extern "C" fn value_create_string(text: *const c_char, out: *mut *mut c_void) -> FXNStatus {
    run(|| unsafe {
        let text = read_str(text)?;
        write_out(out, text_value(13, text))
    })
}

unsafe fn create_json(dtype: FXNDtype, json: *const c_char, out: *mut *mut c_void) -> FakeResult<()> {
    let json = unsafe { read_str(json) }?;
    let parsed: serde_json::Value = serde_json::from_str(&json).map_err(|_| FXN_ERROR_INVALID_ARGUMENT)?;
    let valid = match dtype {
        14 => parsed.is_array(),
        _ => parsed.is_object(),
    };
    if !valid {
        return Err(FXN_ERROR_INVALID_ARGUMENT);
    }
    unsafe { write_out(out, text_value(dtype, json)) }
}

unsafe extern "C" fn value_create_list(json: *const c_char, out: *mut *mut c_void) -> FXNStatus {
    run(|| unsafe { create_json(14, json, out) })
}

unsafe extern "C" fn value_create_dict(json: *const c_char, out: *mut *mut c_void) -> FXNStatus {
    run(|| unsafe { create_json(15, json, out) })
}

unsafe extern "C" fn value_create_image(
    data: *const u8,
    width: i32,
    height: i32,
    channels: i32,
    flags: FXNValueFlags,
    out: *mut *mut c_void,
) -> FXNStatus {
    run(|| unsafe {
        let dims = [height, width, channels]
            .map(|dim| usize::try_from(dim).map_err(|_| FXN_ERROR_INVALID_ARGUMENT));
        let len = dims.into_iter().try_fold(1usize, |len, dim| dim.map(|dim| len * dim))?;
        let raw = create_value(16, vec![height, width, channels], data, len, flags)?;
        write_out(out, raw)
    })
}

unsafe extern "C" fn value_create_binary(
    data: *mut c_void,
    len: i32,
    flags: FXNValueFlags,
    out: *mut *mut c_void,
) -> FXNStatus {
    run(|| unsafe {
        let size = usize::try_from(len).map_err(|_| FXN_ERROR_INVALID_ARGUMENT)?;
        let raw = create_value(17, vec![len], data.cast(), size, flags)?;
        write_out(out, raw)
    })
}

unsafe extern "C" fn value_create_null(out: *mut *mut c_void) -> FXNStatus {
    let raw = into_raw(Fake::Value(FakeValue {
        dtype: 0,
        shape: Vec::new(),
        data: FakeData::None,
    }));
    run(|| unsafe { write_out(out, raw) })
}

unsafe extern "C" fn release_handle(raw: *mut c_void) -> FXNStatus {
    unsafe { release(raw) }
}

unsafe extern "C" fn map_create(out: *mut *mut c_void) -> FXNStatus {
    let raw = into_raw(Fake::Map(Mutex::new(Vec::new())));
    run(|| unsafe { write_out(out, raw) })
}

unsafe extern "C" fn map_get_size(raw: *mut c_void, out: *mut i32) -> FXNStatus {
    run(|| unsafe {
        let size = i32::try_from(map(raw)?.len()).map_err(|_| FXN_ERROR_INVALID_OPERATION)?;
        write_out(out, size)
    })
}

unsafe extern "C" fn map_get_key(raw: *mut c_void, index: i32, buffer: *mut c_char, size: i32) -> FXNStatus {
    run(|| unsafe {
        let entries = map(raw)?;
        let index = usize::try_from(index).map_err(|_| FXN_ERROR_INVALID_ARGUMENT)?;
        let (key, _) = entries.get(index).ok_or(FXN_ERROR_INVALID_ARGUMENT)?;
        write_str(key, buffer, size)
    })
}

unsafe extern "C" fn map_get_value(raw: *mut c_void, key: *const c_char, out: *mut *mut c_void) -> FXNStatus {
    run(|| unsafe {
        let key = read_str(key)?;
        let entries = map(raw)?;
        let (_, value) = entries
            .iter()
            .find(|(candidate, _)| *candidate == key)
            .ok_or(FXN_ERROR_INVALID_ARGUMENT)?;
        write_out(out, *value)
    })
}

unsafe extern "C" fn map_set_value(raw: *mut c_void, key: *const c_char, value_raw: *mut c_void) -> FXNStatus {
    run(|| unsafe {
        let key = read_str(key)?;
        value(value_raw)?;
        let replaced = {
            let mut entries = map(raw)?;
            match entries.iter_mut().find(|(candidate, _)| *candidate == key) {
                Some((_, slot)) => Some(std::mem::replace(slot, value_raw)),
                None => {
                    entries.push((key, value_raw));
                    None
                }
            }
        };
        if let Some(old) = replaced {
            release(old);
        }
        Ok(())
    })
}

unsafe extern "C" fn predictor_create(raw: *mut c_void, out: *mut *mut c_void) -> FXNStatus {
    run(|| unsafe {
        let (tag, resources) = {
            let configuration = configuration(raw)?;
            let tag = configuration.tag.clone().ok_or(FXN_ERROR_INVALID_ARGUMENT)?;
            (tag, configuration.resources.clone())
        };
        if tag.contains("invalid") {
            return Err(FXN_ERROR_INVALID_OPERATION);
        }
        {
            let mut predictors = lock(&PREDICTORS);
            let record = predictors.entry(tag.clone()).or_insert(PredictorRecord {
                creations: 0,
                resources: Vec::new(),
            });
            record.creations += 1;
            record.resources = resources;
        }
        write_out(out, into_raw(Fake::Predictor(tag)))
    })
}

unsafe fn predictor_tag(raw: *mut c_void) -> FakeResult<&'static str> {
    match unsafe { live(raw) }? {
        Fake::Predictor(tag) => Ok(tag),
        _ => Err(FXN_ERROR_INVALID_ARGUMENT),
    }
}

unsafe extern "C" fn predictor_create_prediction(
    raw: *mut c_void,
    inputs: *mut c_void,
    out: *mut *mut c_void,
) -> FXNStatus {
    run(|| unsafe {
        let tag = predictor_tag(raw)?;
        let prediction = predict(tag, inputs)?;
        write_out(out, prediction)
    })
}

unsafe extern "C" fn predictor_stream_prediction(
    raw: *mut c_void,
    inputs: *mut c_void,
    out: *mut *mut c_void,
) -> FXNStatus {
    run(|| unsafe {
        let tag = predictor_tag(raw)?;
        map(inputs)?;
        let remaining = tag
            .rsplit('-')
            .next()
            .and_then(|count| count.parse().ok())
            .unwrap_or(1);
        let stream = FakeStream {
            tag: tag.to_owned(),
            inputs,
            remaining,
            fault: tag.contains("fault"),
        };
        write_out(out, into_raw(Fake::Stream(Mutex::new(stream))))
    })
}

unsafe extern "C" fn prediction_get_id(raw: *mut c_void, buffer: *mut c_char, size: i32) -> FXNStatus {
    run(|| unsafe { write_str(&prediction(raw)?.id, buffer, size) })
}

unsafe extern "C" fn prediction_get_latency(raw: *mut c_void, out: *mut f64) -> FXNStatus {
    run(|| unsafe { write_out(out, prediction(raw)?.latency) })
}

unsafe extern "C" fn prediction_get_results(raw: *mut c_void, out: *mut *mut c_void) -> FXNStatus {
    run(|| unsafe { write_out(out, prediction(raw)?.results) })
}

unsafe extern "C" fn prediction_get_error(raw: *mut c_void, buffer: *mut c_char, size: i32) -> FXNStatus {
    run(|| unsafe {
        let prediction = prediction(raw)?;
        write_str(prediction.error.as_deref().unwrap_or(""), buffer, size)?;
        // Mirrors runtimes that report a failure status when there is no error to return.
        match prediction.error {
            Some(_) => Ok(()),
            None => Err(FXN_ERROR_INVALID_OPERATION),
        }
    })
}

unsafe extern "C" fn prediction_get_log_length(raw: *mut c_void, out: *mut i32) -> FXNStatus {
    run(|| unsafe {
        let len = i32::try_from(prediction(raw)?.logs.len()).map_err(|_| FXN_ERROR_INVALID_OPERATION)?;
        write_out(out, len)
    })
}

unsafe extern "C" fn prediction_get_logs(raw: *mut c_void, buffer: *mut c_char, size: i32) -> FXNStatus {
    run(|| unsafe { write_str(&prediction(raw)?.logs, buffer, size) })
}

unsafe extern "C" fn stream_read_next(raw: *mut c_void, out: *mut *mut c_void) -> FXNStatus {
    run(|| unsafe {
        let Fake::Stream(stream) = live(raw)? else {
            return Err(FXN_ERROR_INVALID_ARGUMENT);
        };
        let mut stream = lock(stream);
        if stream.remaining == 0 {
            return Err(if stream.fault {
                FXN_ERROR_NOT_IMPLEMENTED
            } else {
                FXN_ERROR_INVALID_OPERATION
            });
        }
        stream.remaining -= 1;
        let prediction = predict(&stream.tag, stream.inputs)?;
        write_out(out, prediction)
    })
}

const FAKE_API: FxncApi = FxncApi {
    FXNGetVersion: get_version,
    FXNConfigurationGetUniqueID: configuration_get_unique_id,
    FXNConfigurationGetClientID: configuration_get_client_id,
    FXNConfigurationCreate: configuration_create,
    FXNConfigurationRelease: release_handle,
    FXNConfigurationGetTag: configuration_get_tag,
    FXNConfigurationSetTag: configuration_set_tag,
    FXNConfigurationGetToken: configuration_get_token,
    FXNConfigurationSetToken: configuration_set_token,
    FXNConfigurationGetAcceleration: configuration_get_acceleration,
    FXNConfigurationSetAcceleration: configuration_set_acceleration,
    FXNConfigurationGetDevice: configuration_get_device,
    FXNConfigurationSetDevice: configuration_set_device,
    FXNConfigurationAddResource: configuration_add_resource,
    FXNValueRelease: release_handle,
    FXNValueGetData: value_get_data,
    FXNValueGetType: value_get_type,
    FXNValueGetDimensions: value_get_dimensions,
    FXNValueGetShape: value_get_shape,
    FXNValueCreateArray: value_create_array,
    FXNValueCreateString: value_create_string,
    FXNValueCreateList: value_create_list,
    FXNValueCreateDict: value_create_dict,
    FXNValueCreateImage: value_create_image,
    FXNValueCreateBinary: value_create_binary,
    FXNValueCreateNull: value_create_null,
    FXNValueMapCreate: map_create,
    FXNValueMapRelease: release_handle,
    FXNValueMapGetSize: map_get_size,
    FXNValueMapGetKey: map_get_key,
    FXNValueMapGetValue: map_get_value,
    FXNValueMapSetValue: map_set_value,
    FXNPredictorCreate: predictor_create,
    FXNPredictorRelease: release_handle,
    FXNPredictorCreatePrediction: predictor_create_prediction,
    FXNPredictorStreamPrediction: predictor_stream_prediction,
    FXNPredictionRelease: release_handle,
    FXNPredictionGetID: prediction_get_id,
    FXNPredictionGetLatency: prediction_get_latency,
    FXNPredictionGetResults: prediction_get_results,
    FXNPredictionGetError: prediction_get_error,
    FXNPredictionGetLogLength: prediction_get_log_length,
    FXNPredictionGetLogs: prediction_get_logs,
    FXNPredictionStreamRelease: release_handle,
    FXNPredictionStreamReadNext: stream_read_next,
};
