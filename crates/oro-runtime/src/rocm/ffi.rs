//! Runtime-loaded HIP and hiprtc function pointers via dlopen.
//!
//! Nothing links against ROCm at build time. The shared libraries are looked
//! up on first use, trying `ORO_HIP_LIBRARY` / `ORO_HIPRTC_LIBRARY` first and
//! then the usual per-platform names.

use std::ffi::{c_char, c_int, c_uint, c_void, CStr};
use std::sync::OnceLock;

use libloading::Library;

use super::context::RocmError;

// ---------------------------------------------------------------------------
// Status codes and handles
// ---------------------------------------------------------------------------

pub type HipErrorT = c_int;
pub const HIP_SUCCESS: HipErrorT = 0;

pub const HIP_MEMCPY_DEVICE_TO_HOST: c_int = 2;

pub type HiprtcResult = c_int;
pub const HIPRTC_SUCCESS: HiprtcResult = 0;

pub type HipDevice = c_int;
pub type HipModuleHandle = *mut c_void;
pub type HipFunctionHandle = *mut c_void;
pub type HipDeviceptr = *mut c_void;
pub type HiprtcProgram = *mut c_void;
pub type HipStream = *mut c_void;

/// Env var holding an explicit path to the HIP runtime library.
pub const HIP_LIBRARY_ENV: &str = "ORO_HIP_LIBRARY";
/// Env var holding an explicit path to the hiprtc library.
pub const HIPRTC_LIBRARY_ENV: &str = "ORO_HIPRTC_LIBRARY";

#[cfg(windows)]
const HIP_CANDIDATES: &[&str] = &["amdhip64_6.dll", "amdhip64.dll"];
#[cfg(not(windows))]
const HIP_CANDIDATES: &[&str] = &[
    "libamdhip64.so",
    "libamdhip64.so.6",
    "libamdhip64.so.5",
    "/opt/rocm/lib/libamdhip64.so",
];

#[cfg(windows)]
const HIPRTC_CANDIDATES: &[&str] = &["hiprtc0602.dll", "hiprtc0601.dll", "hiprtc0600.dll", "hiprtc.dll"];
#[cfg(not(windows))]
const HIPRTC_CANDIDATES: &[&str] = &[
    "libhiprtc.so",
    "libhiprtc.so.6",
    "libhiprtc.so.5",
    "/opt/rocm/lib/libhiprtc.so",
];

// ---------------------------------------------------------------------------
// HIP runtime API function signatures
// ---------------------------------------------------------------------------

type FnHipInit = unsafe extern "C" fn(c_uint) -> HipErrorT;
type FnHipDriverGetVersion = unsafe extern "C" fn(*mut c_int) -> HipErrorT;
type FnHipGetDeviceCount = unsafe extern "C" fn(*mut c_int) -> HipErrorT;
type FnHipDeviceGet = unsafe extern "C" fn(*mut HipDevice, c_int) -> HipErrorT;
type FnHipSetDevice = unsafe extern "C" fn(c_int) -> HipErrorT;
type FnHipGetDeviceProperties = unsafe extern "C" fn(*mut c_void, c_int) -> HipErrorT;
type FnHipGetErrorString = unsafe extern "C" fn(HipErrorT) -> *const c_char;
type FnHipMalloc = unsafe extern "C" fn(*mut HipDeviceptr, usize) -> HipErrorT;
type FnHipFree = unsafe extern "C" fn(HipDeviceptr) -> HipErrorT;
type FnHipMemset = unsafe extern "C" fn(HipDeviceptr, c_int, usize) -> HipErrorT;
type FnHipMemcpy = unsafe extern "C" fn(*mut c_void, *const c_void, usize, c_int) -> HipErrorT;
type FnHipDeviceSynchronize = unsafe extern "C" fn() -> HipErrorT;
type FnHipModuleLoadData = unsafe extern "C" fn(*mut HipModuleHandle, *const c_void) -> HipErrorT;
type FnHipModuleGetFunction = unsafe extern "C" fn(
    *mut HipFunctionHandle, HipModuleHandle, *const c_char,
) -> HipErrorT;
type FnHipModuleLaunchKernel = unsafe extern "C" fn(
    HipFunctionHandle,
    c_uint, c_uint, c_uint,   // grid x, y, z
    c_uint, c_uint, c_uint,   // block x, y, z
    c_uint,                    // shared mem bytes
    HipStream,                 // stream (null = default)
    *mut *mut c_void,          // kernel params
    *mut *mut c_void,          // extra (null)
) -> HipErrorT;
type FnHipModuleUnload = unsafe extern "C" fn(HipModuleHandle) -> HipErrorT;

// ---------------------------------------------------------------------------
// hiprtc API function signatures
// ---------------------------------------------------------------------------

type FnHiprtcCreateProgram = unsafe extern "C" fn(
    *mut HiprtcProgram,
    *const c_char,         // source
    *const c_char,         // name
    c_int,                 // numHeaders
    *const *const c_char,  // headers
    *const *const c_char,  // includeNames
) -> HiprtcResult;
type FnHiprtcCompileProgram = unsafe extern "C" fn(
    HiprtcProgram, c_int, *const *const c_char,
) -> HiprtcResult;
type FnHiprtcGetProgramLogSize = unsafe extern "C" fn(HiprtcProgram, *mut usize) -> HiprtcResult;
type FnHiprtcGetProgramLog = unsafe extern "C" fn(HiprtcProgram, *mut c_char) -> HiprtcResult;
type FnHiprtcGetCodeSize = unsafe extern "C" fn(HiprtcProgram, *mut usize) -> HiprtcResult;
type FnHiprtcGetCode = unsafe extern "C" fn(HiprtcProgram, *mut c_char) -> HiprtcResult;
type FnHiprtcDestroyProgram = unsafe extern "C" fn(*mut HiprtcProgram) -> HiprtcResult;
type FnHiprtcGetErrorString = unsafe extern "C" fn(HiprtcResult) -> *const c_char;

// ---------------------------------------------------------------------------
// Loaded API structs
// ---------------------------------------------------------------------------

pub struct HipApi {
    _lib: Library,
    pub hip_init: FnHipInit,
    pub hip_driver_get_version: FnHipDriverGetVersion,
    pub hip_get_device_count: FnHipGetDeviceCount,
    pub hip_device_get: FnHipDeviceGet,
    pub hip_set_device: FnHipSetDevice,
    pub hip_get_device_properties: FnHipGetDeviceProperties,
    pub hip_get_error_string: FnHipGetErrorString,
    pub hip_malloc: FnHipMalloc,
    pub hip_free: FnHipFree,
    pub hip_memset: FnHipMemset,
    pub hip_memcpy: FnHipMemcpy,
    pub hip_device_synchronize: FnHipDeviceSynchronize,
    pub hip_module_load_data: FnHipModuleLoadData,
    pub hip_module_get_function: FnHipModuleGetFunction,
    pub hip_module_launch_kernel: FnHipModuleLaunchKernel,
    pub hip_module_unload: FnHipModuleUnload,
}

pub struct HiprtcApi {
    _lib: Library,
    pub hiprtc_create_program: FnHiprtcCreateProgram,
    pub hiprtc_compile_program: FnHiprtcCompileProgram,
    pub hiprtc_get_program_log_size: FnHiprtcGetProgramLogSize,
    pub hiprtc_get_program_log: FnHiprtcGetProgramLog,
    pub hiprtc_get_code_size: FnHiprtcGetCodeSize,
    pub hiprtc_get_code: FnHiprtcGetCode,
    pub hiprtc_destroy_program: FnHiprtcDestroyProgram,
    pub hiprtc_get_error_string: FnHiprtcGetErrorString,
}

// Safety: the function pointers are process-global and the HIP runtime is
// internally synchronized.
unsafe impl Send for HipApi {}
unsafe impl Sync for HipApi {}
unsafe impl Send for HiprtcApi {}
unsafe impl Sync for HiprtcApi {}

// ---------------------------------------------------------------------------
// Library loading
// ---------------------------------------------------------------------------

static HIP_API: OnceLock<Result<HipApi, String>> = OnceLock::new();
static HIPRTC_API: OnceLock<Result<HiprtcApi, String>> = OnceLock::new();

/// Library names to try, explicit env override first.
pub fn library_candidates(env_var: &str, defaults: &[&str]) -> Vec<String> {
    let mut names = Vec::with_capacity(defaults.len() + 1);
    if let Ok(path) = std::env::var(env_var) {
        if !path.trim().is_empty() {
            names.push(path);
        }
    }
    names.extend(defaults.iter().map(|s| s.to_string()));
    names
}

fn open_first(candidates: &[String]) -> Result<(Library, String), String> {
    let mut tried = Vec::with_capacity(candidates.len());
    for name in candidates {
        match unsafe { Library::new(name) } {
            Ok(lib) => return Ok((lib, name.clone())),
            Err(e) => {
                tracing::debug!("dlopen {} failed: {}", name, e);
                tried.push(name.as_str());
            }
        }
    }
    Err(tried.join(", "))
}

/// Resolve one symbol, copying the function pointer out of the library.
unsafe fn sym<T: Copy>(lib: &Library, name: &[u8]) -> Result<T, String> {
    lib.get::<T>(name).map(|s| *s).map_err(|e| {
        format!("missing symbol {}: {}", String::from_utf8_lossy(&name[..name.len() - 1]), e)
    })
}

impl HipApi {
    fn try_load() -> Result<Self, String> {
        let (lib, name) = open_first(&library_candidates(HIP_LIBRARY_ENV, HIP_CANDIDATES))?;
        tracing::info!("loaded HIP runtime from {}", name);
        unsafe {
            // ROCm 6 headers redirect hipGetDeviceProperties to the R0600 entry point.
            let get_props = sym::<FnHipGetDeviceProperties>(&lib, b"hipGetDevicePropertiesR0600\0")
                .or_else(|_| sym::<FnHipGetDeviceProperties>(&lib, b"hipGetDeviceProperties\0"))?;
            Ok(HipApi {
                hip_init: sym(&lib, b"hipInit\0")?,
                hip_driver_get_version: sym(&lib, b"hipDriverGetVersion\0")?,
                hip_get_device_count: sym(&lib, b"hipGetDeviceCount\0")?,
                hip_device_get: sym(&lib, b"hipDeviceGet\0")?,
                hip_set_device: sym(&lib, b"hipSetDevice\0")?,
                hip_get_device_properties: get_props,
                hip_get_error_string: sym(&lib, b"hipGetErrorString\0")?,
                hip_malloc: sym(&lib, b"hipMalloc\0")?,
                hip_free: sym(&lib, b"hipFree\0")?,
                hip_memset: sym(&lib, b"hipMemset\0")?,
                hip_memcpy: sym(&lib, b"hipMemcpy\0")?,
                hip_device_synchronize: sym(&lib, b"hipDeviceSynchronize\0")?,
                hip_module_load_data: sym(&lib, b"hipModuleLoadData\0")?,
                hip_module_get_function: sym(&lib, b"hipModuleGetFunction\0")?,
                hip_module_launch_kernel: sym(&lib, b"hipModuleLaunchKernel\0")?,
                hip_module_unload: sym(&lib, b"hipModuleUnload\0")?,
                _lib: lib,
            })
        }
    }

    /// Human-readable message for a HIP status code.
    pub fn error_string(&self, code: HipErrorT) -> String {
        let ptr = unsafe { (self.hip_get_error_string)(code) };
        c_message(ptr)
    }
}

impl HiprtcApi {
    fn try_load() -> Result<Self, String> {
        let (lib, name) = open_first(&library_candidates(HIPRTC_LIBRARY_ENV, HIPRTC_CANDIDATES))?;
        tracing::info!("loaded hiprtc from {}", name);
        unsafe {
            Ok(HiprtcApi {
                hiprtc_create_program: sym(&lib, b"hiprtcCreateProgram\0")?,
                hiprtc_compile_program: sym(&lib, b"hiprtcCompileProgram\0")?,
                hiprtc_get_program_log_size: sym(&lib, b"hiprtcGetProgramLogSize\0")?,
                hiprtc_get_program_log: sym(&lib, b"hiprtcGetProgramLog\0")?,
                hiprtc_get_code_size: sym(&lib, b"hiprtcGetCodeSize\0")?,
                hiprtc_get_code: sym(&lib, b"hiprtcGetCode\0")?,
                hiprtc_destroy_program: sym(&lib, b"hiprtcDestroyProgram\0")?,
                hiprtc_get_error_string: sym(&lib, b"hiprtcGetErrorString\0")?,
                _lib: lib,
            })
        }
    }

    /// Human-readable message for a hiprtc status code.
    pub fn error_string(&self, code: HiprtcResult) -> String {
        let ptr = unsafe { (self.hiprtc_get_error_string)(code) };
        c_message(ptr)
    }
}

fn c_message(ptr: *const c_char) -> String {
    if ptr.is_null() {
        return "unknown error".to_string();
    }
    unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned()
}

/// Get the runtime-loaded HIP API.
pub fn hip_api() -> Result<&'static HipApi, RocmError> {
    HIP_API
        .get_or_init(HipApi::try_load)
        .as_ref()
        .map_err(|reason| RocmError::NotAvailable {
            library: "amdhip64".into(),
            reason: reason.clone(),
        })
}

/// Get the runtime-loaded hiprtc API.
pub fn hiprtc_api() -> Result<&'static HiprtcApi, RocmError> {
    HIPRTC_API
        .get_or_init(HiprtcApi::try_load)
        .as_ref()
        .map_err(|reason| RocmError::NotAvailable {
            library: "hiprtc".into(),
            reason: reason.clone(),
        })
}

// ---------------------------------------------------------------------------
// Error checking helpers
// ---------------------------------------------------------------------------

/// Check a HIP API return code.
pub fn check_hip(api: &HipApi, code: HipErrorT, context: &str) -> Result<(), RocmError> {
    tracing::debug!("{} -> {}", context, code);
    if code == HIP_SUCCESS {
        Ok(())
    } else {
        Err(RocmError::Hip {
            code,
            message: api.error_string(code),
            context: context.to_string(),
        })
    }
}

/// Check a hiprtc return code.
pub fn check_hiprtc(api: &HiprtcApi, code: HiprtcResult, context: &str) -> Result<(), RocmError> {
    tracing::debug!("{} -> {}", context, code);
    if code == HIPRTC_SUCCESS {
        Ok(())
    } else {
        Err(RocmError::Hiprtc {
            code,
            message: api.error_string(code),
            context: context.to_string(),
        })
    }
}
