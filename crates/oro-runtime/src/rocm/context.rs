//! HIP device context management.
//!
//! HIP has no separate context object worth owning: the device's primary
//! context is bound with `hipSetDevice`. A `HipContext` records which device
//! that is so later calls can re-bind it.

use std::ffi::{c_int, c_void, CString};
use std::sync::OnceLock;

use parking_lot::Mutex;

use super::ffi::{self, check_hip, HipDevice, HIP_SUCCESS};

/// Bytes reserved for `hipDeviceProp_t`. The struct is ~1.5 KiB on ROCm 6 and
/// smaller on older releases.
const DEVICE_PROP_BUFFER: usize = 8192;

/// Length of the leading `name[256]` field of `hipDeviceProp_t`.
const DEVICE_NAME_LEN: usize = 256;

/// Tracks which HIP device ordinals have been initialized.
static INIT_DEVICES: OnceLock<Mutex<Vec<bool>>> = OnceLock::new();

fn init_devices() -> &'static Mutex<Vec<bool>> {
    INIT_DEVICES.get_or_init(|| Mutex::new(Vec::new()))
}

/// An open HIP device with its primary context bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HipContext {
    ordinal: usize,
    device: HipDevice,
}

impl HipContext {
    /// Initialize HIP, look up the device and bind its primary context.
    /// Initialization runs once per ordinal.
    pub fn create(ordinal: usize) -> Result<Self, RocmError> {
        let api = ffi::hip_api()?;

        let mut devs = init_devices().lock();
        if devs.len() <= ordinal {
            devs.resize(ordinal + 1, false);
        }
        if !devs[ordinal] {
            check_hip(api, unsafe { (api.hip_init)(0) }, "hipInit")?;
        }

        let mut device: HipDevice = 0;
        check_hip(
            api,
            unsafe { (api.hip_device_get)(&mut device, ordinal as c_int) },
            "hipDeviceGet",
        )?;
        check_hip(api, unsafe { (api.hip_set_device)(device) }, "hipSetDevice")?;
        devs[ordinal] = true;

        Ok(Self { ordinal, device })
    }

    pub fn ordinal(&self) -> usize {
        self.ordinal
    }

    /// Make this device current on the calling thread.
    pub fn bind(&self) -> Result<(), RocmError> {
        let api = ffi::hip_api()?;
        check_hip(api, unsafe { (api.hip_set_device)(self.device) }, "hipSetDevice")
    }

    /// Device name and GCN architecture name (e.g. `gfx90a:sramecc+:xnack-`).
    pub fn properties(&self) -> Result<(String, String), RocmError> {
        let api = ffi::hip_api()?;
        // u64 backing keeps the buffer aligned for the struct's size_t fields.
        let mut raw = vec![0u64; DEVICE_PROP_BUFFER / 8];
        check_hip(
            api,
            unsafe { (api.hip_get_device_properties)(raw.as_mut_ptr() as *mut c_void, self.device) },
            "hipGetDeviceProperties",
        )?;
        let bytes: Vec<u8> = raw.iter().flat_map(|w| w.to_ne_bytes()).collect();
        Ok(parse_device_prop_names(&bytes))
    }

    /// Version of the installed HIP driver, as an integer.
    pub fn driver_version(&self) -> Result<i32, RocmError> {
        let api = ffi::hip_api()?;
        let mut version: c_int = 0;
        check_hip(
            api,
            unsafe { (api.hip_driver_get_version)(&mut version) },
            "hipDriverGetVersion",
        )?;
        Ok(version)
    }
}

/// Pull the device name and arch name out of a raw `hipDeviceProp_t`.
///
/// `name` is always the first field. `gcnArchName` moved between ROCm
/// releases, so it is located as the first NUL-terminated `gfx` token after
/// the name field.
pub(crate) fn parse_device_prop_names(bytes: &[u8]) -> (String, String) {
    let name_field = &bytes[..DEVICE_NAME_LEN.min(bytes.len())];
    let name = c_str_lossy(name_field);

    let tail = &bytes[name_field.len()..];
    let arch = tail
        .windows(3)
        .enumerate()
        .filter(|(_, w)| *w == b"gfx")
        .map(|(i, _)| i)
        .find(|&i| i == 0 || tail[i - 1] == 0)
        .map(|i| c_str_lossy(&tail[i..]))
        .unwrap_or_default();

    (name, arch)
}

fn c_str_lossy(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

/// Check if HIP is usable (library loadable + at least 1 GPU).
pub fn is_rocm_available() -> bool {
    device_count() > 0
}

/// Number of visible HIP devices; 0 when the runtime is missing.
pub fn device_count() -> usize {
    let api = match ffi::hip_api() {
        Ok(a) => a,
        Err(_) => return 0,
    };
    if unsafe { (api.hip_init)(0) } != HIP_SUCCESS {
        return 0;
    }
    let mut count: c_int = 0;
    if unsafe { (api.hip_get_device_count)(&mut count) } != HIP_SUCCESS {
        return 0;
    }
    count.max(0) as usize
}

/// Synchronize the current HIP device.
pub fn device_synchronize() -> Result<(), RocmError> {
    let api = ffi::hip_api()?;
    check_hip(api, unsafe { (api.hip_device_synchronize)() }, "hipDeviceSynchronize")
}

/// Convert a Rust string into a C string for a HIP call.
pub(crate) fn c_string(value: &str, what: &'static str) -> Result<CString, RocmError> {
    CString::new(value).map_err(|_| RocmError::InvalidString(what))
}

/// ROCm-specific errors.
#[derive(Debug, thiserror::Error)]
pub enum RocmError {
    #[error("ROCm/HIP not available ({library} not found; tried {reason})")]
    NotAvailable { library: String, reason: String },

    #[error("HIP error {code} in {context}: {message}")]
    Hip { code: i32, message: String, context: String },

    #[error("hiprtc error {code} in {context}: {message}")]
    Hiprtc { code: i32, message: String, context: String },

    #[error("hiprtc compilation failed for '{program}'")]
    Compile { program: String, log: String },

    #[error("function '{func}' not found in module: {message}")]
    FuncNotFound { func: String, message: String },

    #[error("{0} contains an interior NUL byte")]
    InvalidString(&'static str),
}
