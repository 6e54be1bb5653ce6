//! HIP device allocations for the smoke launch.

use std::ffi::c_void;

use super::context::{device_synchronize, HipContext, RocmError};
use super::ffi::{self, check_hip, HipDeviceptr, HIP_MEMCPY_DEVICE_TO_HOST};

/// Zero-initialized device memory, freed via `hipFree` on drop.
pub struct HipBuffer {
    ptr: HipDeviceptr,
    ctx: HipContext,
    nbytes: usize,
}

unsafe impl Send for HipBuffer {}
unsafe impl Sync for HipBuffer {}

impl HipBuffer {
    /// Allocate `nbytes` of zeroed memory on the context's device.
    pub fn zeros(ctx: &HipContext, nbytes: usize) -> Result<Self, RocmError> {
        let api = ffi::hip_api()?;
        ctx.bind()?;

        let mut ptr: HipDeviceptr = std::ptr::null_mut();
        check_hip(
            api,
            unsafe { (api.hip_malloc)(&mut ptr, nbytes) },
            &format!("hipMalloc({} bytes)", nbytes),
        )?;
        // Own the allocation before the memset so a failure still frees it.
        let buf = Self { ptr, ctx: *ctx, nbytes };
        check_hip(
            api,
            unsafe { (api.hip_memset)(ptr, 0, nbytes) },
            &format!("hipMemset({} bytes)", nbytes),
        )?;
        Ok(buf)
    }

    /// Copy the whole buffer back to the host (D2H), after a device sync.
    pub fn to_host(&self) -> Result<Vec<u8>, RocmError> {
        let api = ffi::hip_api()?;
        self.ctx.bind()?;
        device_synchronize()?;

        let mut host = vec![0u8; self.nbytes];
        check_hip(
            api,
            unsafe {
                (api.hip_memcpy)(
                    host.as_mut_ptr() as *mut c_void,
                    self.ptr as *const c_void,
                    self.nbytes,
                    HIP_MEMCPY_DEVICE_TO_HOST,
                )
            },
            "hipMemcpy D2H",
        )?;
        Ok(host)
    }

    pub fn len(&self) -> usize {
        self.nbytes
    }

    pub fn is_empty(&self) -> bool {
        self.nbytes == 0
    }

    /// Raw device pointer for kernel parameters.
    pub fn as_device_ptr(&self) -> HipDeviceptr {
        self.ptr
    }
}

impl Drop for HipBuffer {
    fn drop(&mut self) {
        if self.ptr.is_null() {
            return;
        }
        if let Ok(api) = ffi::hip_api() {
            let _ = self.ctx.bind();
            unsafe { (api.hip_free)(self.ptr) };
        }
    }
}
