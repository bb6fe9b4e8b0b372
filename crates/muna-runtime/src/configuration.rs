use std::ffi::{CString, c_void};
use std::path::Path;
use std::ptr::NonNull;

use serde::{Deserialize, Serialize};

use crate::error::RuntimeError;
use crate::fxnc::Fxnc;
use crate::handle::{Handle, Release, native_kind};
use crate::status::check;
use crate::sys::FXNAcceleration;
use crate::value::{c_string, read_c_string};

native_kind!(ConfigurationKind, "configuration", FXNConfigurationRelease);

const TAG_CAPACITY: usize = 2048;
const TOKEN_CAPACITY: usize = 2048;
const UNIQUE_ID_CAPACITY: usize = 2048;
const CLIENT_ID_CAPACITY: usize = 64;

/// Compute backend the runtime should prefer.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Acceleration {
    #[default]
    Auto,
    Cpu,
    Gpu,
    Npu,
}

impl Acceleration {
    pub fn to_native(self) -> FXNAcceleration {
        match self {
            Acceleration::Auto => 0,
            Acceleration::Cpu => 1,
            Acceleration::Gpu => 2,
            Acceleration::Npu => 4,
        }
    }

    pub fn from_native(code: FXNAcceleration) -> Result<Self, RuntimeError> {
        match code {
            0 => Ok(Acceleration::Auto),
            1 => Ok(Acceleration::Cpu),
            2 => Ok(Acceleration::Gpu),
            4 => Ok(Acceleration::Npu),
            other => Err(RuntimeError::UnsupportedValue(format!(
                "unrecognized acceleration code {other}"
            ))),
        }
    }
}

/// Opaque handle to a compute device owned by the application (a GPU queue, an NPU context).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Device(NonNull<c_void>);

// SAFETY: the device is an opaque token the runtime only passes back to the platform.
unsafe impl Send for Device {}
unsafe impl Sync for Device {}

impl Device {
    /// Wrap a platform device pointer.
    ///
    /// # Safety
    /// `raw` must stay valid for as long as any predictor built with it is alive.
    pub unsafe fn from_raw(raw: *mut c_void) -> Option<Self> {
        NonNull::new(raw).map(Device)
    }

    pub fn as_raw(self) -> *mut c_void {
        self.0.as_ptr()
    }
}

/// Native execution descriptor for building a predictor.
pub struct Configuration {
    handle: Handle<ConfigurationKind>,
}

impl Configuration {
    pub fn new(fxnc: &Fxnc) -> Result<Self, RuntimeError> {
        Ok(Self {
            // SAFETY: out-pointer provided by `Handle::create`.
            handle: Handle::create(fxnc, "create configuration", |api, out| unsafe {
                (api.FXNConfigurationCreate)(out)
            })?,
        })
    }

    /// Fresh configuration identifier generated by the runtime.
    pub fn unique_id(fxnc: &Fxnc) -> Result<String, RuntimeError> {
        let api = fxnc.api();
        // SAFETY: buffer is sized as advertised.
        read_c_string("retrieve configuration identifier", UNIQUE_ID_CAPACITY, |buffer, len| unsafe {
            (api.FXNConfigurationGetUniqueID)(buffer, len)
        })
    }

    /// Identifier of the platform the runtime was built for.
    pub fn client_id(fxnc: &Fxnc) -> Result<String, RuntimeError> {
        let api = fxnc.api();
        // SAFETY: buffer is sized as advertised.
        read_c_string("retrieve client identifier", CLIENT_ID_CAPACITY, |buffer, len| unsafe {
            (api.FXNConfigurationGetClientID)(buffer, len)
        })
    }

    pub fn owner(&self) -> bool {
        self.handle.owner()
    }

    pub fn as_raw(&self) -> *mut c_void {
        self.handle.as_raw()
    }

    pub fn fxnc(&self) -> &Fxnc {
        self.handle.fxnc()
    }

    pub fn tag(&self) -> Result<Option<String>, RuntimeError> {
        let raw = self.handle.live("get configuration tag")?;
        let api = self.handle.api();
        // SAFETY: `raw` is live and the buffer is sized as advertised.
        let tag = read_c_string("get configuration tag", TAG_CAPACITY, |buffer, len| unsafe {
            (api.FXNConfigurationGetTag)(raw, buffer, len)
        })?;
        Ok(Some(tag).filter(|tag| !tag.is_empty()))
    }

    pub fn set_tag(&mut self, tag: Option<&str>) -> Result<(), RuntimeError> {
        let raw = self.handle.live("set configuration tag")?;
        let tag = optional_c_string(tag, "configuration tag")?;
        // SAFETY: `raw` is live; `tag` is null or NUL-terminated.
        check("set configuration tag", unsafe {
            (self.handle.api().FXNConfigurationSetTag)(raw, as_ptr(&tag))
        })
    }

    pub fn token(&self) -> Result<Option<String>, RuntimeError> {
        let raw = self.handle.live("get configuration token")?;
        let api = self.handle.api();
        // SAFETY: `raw` is live and the buffer is sized as advertised.
        let token = read_c_string("get configuration token", TOKEN_CAPACITY, |buffer, len| unsafe {
            (api.FXNConfigurationGetToken)(raw, buffer, len)
        })?;
        Ok(Some(token).filter(|token| !token.is_empty()))
    }

    pub fn set_token(&mut self, token: Option<&str>) -> Result<(), RuntimeError> {
        let raw = self.handle.live("set configuration token")?;
        let token = optional_c_string(token, "configuration token")?;
        // SAFETY: `raw` is live; `token` is null or NUL-terminated.
        check("set configuration token", unsafe {
            (self.handle.api().FXNConfigurationSetToken)(raw, as_ptr(&token))
        })
    }

    pub fn acceleration(&self) -> Result<Acceleration, RuntimeError> {
        let raw = self.handle.live("get configuration acceleration")?;
        let mut acceleration = 0;
        // SAFETY: `raw` is live.
        check("get configuration acceleration", unsafe {
            (self.handle.api().FXNConfigurationGetAcceleration)(raw, &mut acceleration)
        })?;
        Acceleration::from_native(acceleration)
    }

    pub fn set_acceleration(&mut self, acceleration: Acceleration) -> Result<(), RuntimeError> {
        let raw = self.handle.live("set configuration acceleration")?;
        // SAFETY: `raw` is live.
        check("set configuration acceleration", unsafe {
            (self.handle.api().FXNConfigurationSetAcceleration)(raw, acceleration.to_native())
        })
    }

    pub fn device(&self) -> Result<Option<Device>, RuntimeError> {
        let raw = self.handle.live("get configuration device")?;
        let mut device = std::ptr::null_mut();
        // SAFETY: `raw` is live.
        check("get configuration device", unsafe {
            (self.handle.api().FXNConfigurationGetDevice)(raw, &mut device)
        })?;
        Ok(NonNull::new(device).map(Device))
    }

    pub fn set_device(&mut self, device: Option<Device>) -> Result<(), RuntimeError> {
        let raw = self.handle.live("set configuration device")?;
        let device = device.map_or(std::ptr::null_mut(), Device::as_raw);
        // SAFETY: `raw` is live; the device validity is guaranteed by `Device::from_raw`.
        check("set configuration device", unsafe {
            (self.handle.api().FXNConfigurationSetDevice)(raw, device)
        })
    }

    /// Attach a resource file. Resources are considered by the runtime in the order added.
    pub fn add_resource(&mut self, kind: &str, path: &Path) -> Result<(), RuntimeError> {
        let raw = self.handle.live("add configuration resource")?;
        let kind = c_string(kind, "resource type")?;
        let path = path.to_str().ok_or_else(|| RuntimeError::InvalidString {
            context: "resource path",
            details: format!("{} is not valid UTF-8", path.display()),
        })?;
        let path = c_string(path, "resource path")?;
        // SAFETY: `raw` is live; both strings are NUL-terminated.
        check("add configuration resource", unsafe {
            (self.handle.api().FXNConfigurationAddResource)(raw, kind.as_ptr(), path.as_ptr())
        })
    }
}

impl Release for Configuration {
    fn release(&mut self) {
        self.handle.release();
    }
}

impl std::fmt::Debug for Configuration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        std::fmt::Debug::fmt(&self.handle, f)
    }
}

fn optional_c_string(
    text: Option<&str>,
    context: &'static str,
) -> Result<Option<CString>, RuntimeError> {
    text.map(|text| c_string(text, context)).transpose()
}

fn as_ptr(text: &Option<CString>) -> *const std::ffi::c_char {
    text.as_ref().map_or(std::ptr::null(), |text| text.as_ptr())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{fake_runtime, release_count};
    use std::path::PathBuf;
    use std::str::FromStr;

    #[test]
    fn test_fields_roundtrip() {
        let fxnc = fake_runtime();
        let mut configuration = Configuration::new(&fxnc).unwrap();

        assert_eq!(configuration.tag().unwrap(), None);
        assert_eq!(configuration.acceleration().unwrap(), Acceleration::Auto);

        configuration.set_tag(Some("@muna/greeting")).unwrap();
        configuration.set_token(Some("token-123")).unwrap();
        configuration.set_acceleration(Acceleration::Npu).unwrap();

        assert_eq!(configuration.tag().unwrap().as_deref(), Some("@muna/greeting"));
        assert_eq!(configuration.token().unwrap().as_deref(), Some("token-123"));
        assert_eq!(configuration.acceleration().unwrap(), Acceleration::Npu);

        configuration.set_tag(None).unwrap();
        assert_eq!(configuration.tag().unwrap(), None);
    }

    #[test]
    fn test_device_roundtrip() {
        let fxnc = fake_runtime();
        let mut configuration = Configuration::new(&fxnc).unwrap();
        let mut slot = 0u64;
        let device = unsafe { Device::from_raw((&mut slot as *mut u64).cast()) }.unwrap();

        configuration.set_device(Some(device)).unwrap();
        assert_eq!(configuration.device().unwrap(), Some(device));

        configuration.set_device(None).unwrap();
        assert_eq!(configuration.device().unwrap(), None);
    }

    #[test]
    fn test_identifiers_are_available() {
        let fxnc = fake_runtime();

        let unique = Configuration::unique_id(&fxnc).unwrap();
        let client = Configuration::client_id(&fxnc).unwrap();

        assert!(!unique.is_empty());
        assert!(!client.is_empty());
        assert!(client.len() < CLIENT_ID_CAPACITY);
    }

    #[test]
    fn test_add_resource_rejects_nul() {
        let fxnc = fake_runtime();
        let mut configuration = Configuration::new(&fxnc).unwrap();

        configuration
            .add_resource("bin", &PathBuf::from("/tmp/model.bin"))
            .unwrap();
        let err = configuration.add_resource("bad\0type", Path::new("/tmp/x")).unwrap_err();

        assert!(matches!(err, RuntimeError::InvalidString { .. }));
    }

    #[test]
    fn test_acceleration_codes() {
        assert_eq!(Acceleration::Npu.to_native(), 4);
        assert_eq!(Acceleration::from_native(2).unwrap(), Acceleration::Gpu);
        assert!(Acceleration::from_native(3).is_err());
        assert_eq!(Acceleration::from_str("cpu").unwrap(), Acceleration::Cpu);
    }

    #[test]
    fn test_release_once() {
        let fxnc = fake_runtime();
        let mut configuration = Configuration::new(&fxnc).unwrap();
        let raw = configuration.as_raw();

        configuration.release();
        drop(configuration);

        assert_eq!(release_count(raw), 1);
    }
}
