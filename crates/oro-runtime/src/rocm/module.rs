//! Loaded HIP code objects and the kernels resolved from them.

use std::ffi::c_void;

use super::context::{c_string, RocmError};
use super::ffi::{self, check_hip, HipFunctionHandle, HipModuleHandle, HIP_SUCCESS};
use super::rtc::CompiledCode;

/// A code object loaded with `hipModuleLoadData`. Unloaded on drop.
#[derive(Debug)]
pub struct HipModule {
    handle: HipModuleHandle,
}

// HIP modules are process-global once loaded.
unsafe impl Send for HipModule {}
unsafe impl Sync for HipModule {}

/// A kernel entry point inside a `HipModule`.
///
/// Only valid while the module it came from is alive.
#[derive(Debug, Clone, Copy)]
pub struct HipFunction {
    handle: HipFunctionHandle,
}

unsafe impl Send for HipFunction {}
unsafe impl Sync for HipFunction {}

impl HipModule {
    /// Load compiled code onto the current device.
    pub fn load(code: &CompiledCode) -> Result<Self, RocmError> {
        let hip = ffi::hip_api()?;
        let mut handle: HipModuleHandle = std::ptr::null_mut();
        check_hip(
            hip,
            unsafe { (hip.hip_module_load_data)(&mut handle, code.code.as_ptr() as *const c_void) },
            "hipModuleLoadData",
        )?;
        Ok(Self { handle })
    }

    /// Resolve an exported kernel by name.
    pub fn function(&self, name: &str) -> Result<HipFunction, RocmError> {
        let hip = ffi::hip_api()?;
        let c_name = c_string(name, "function name")?;
        let mut handle: HipFunctionHandle = std::ptr::null_mut();
        let rc = unsafe { (hip.hip_module_get_function)(&mut handle, self.handle, c_name.as_ptr()) };
        tracing::debug!("hipModuleGetFunction({}) -> {}", name, rc);
        if rc != HIP_SUCCESS {
            return Err(RocmError::FuncNotFound {
                func: name.to_string(),
                message: hip.error_string(rc),
            });
        }
        Ok(HipFunction { handle })
    }
}

impl Drop for HipModule {
    fn drop(&mut self) {
        if self.handle.is_null() {
            return;
        }
        if let Ok(hip) = ffi::hip_api() {
            let rc = unsafe { (hip.hip_module_unload)(self.handle) };
            tracing::debug!("hipModuleUnload -> {}", rc);
        }
    }
}

impl HipFunction {
    pub(crate) fn raw(&self) -> HipFunctionHandle {
        self.handle
    }
}
