//! HIP kernel launch via `hipModuleLaunchKernel`.

use std::ffi::{c_uint, c_void};

use super::context::{device_synchronize, HipContext, RocmError};
use super::ffi::{self, check_hip};
use super::module::HipFunction;

/// Launch configuration for HIP kernels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HipLaunchConfig {
    pub grid_dim: (u32, u32, u32),
    pub block_dim: (u32, u32, u32),
    pub shared_mem_bytes: u32,
}

impl HipLaunchConfig {
    /// A single block of `threads` threads.
    pub fn single_block(threads: u32) -> Self {
        Self {
            grid_dim: (1, 1, 1),
            block_dim: (threads, 1, 1),
            shared_mem_bytes: 0,
        }
    }
}

/// Launch a kernel on the default stream and wait for it.
///
/// # Safety
/// `params` must hold one pointer per kernel argument, each pointing at a
/// value of the type the kernel signature expects, and every device pointer
/// must belong to `ctx`'s device.
pub unsafe fn launch_kernel(
    ctx: &HipContext,
    func: &HipFunction,
    config: &HipLaunchConfig,
    params: &mut [*mut c_void],
) -> Result<(), RocmError> {
    let hip = ffi::hip_api()?;
    ctx.bind()?;

    check_hip(
        hip,
        (hip.hip_module_launch_kernel)(
            func.raw(),
            config.grid_dim.0 as c_uint,
            config.grid_dim.1 as c_uint,
            config.grid_dim.2 as c_uint,
            config.block_dim.0 as c_uint,
            config.block_dim.1 as c_uint,
            config.block_dim.2 as c_uint,
            config.shared_mem_bytes as c_uint,
            std::ptr::null_mut(), // default stream
            params.as_mut_ptr(),
            std::ptr::null_mut(), // extra
        ),
        "hipModuleLaunchKernel",
    )?;

    device_synchronize()
}
