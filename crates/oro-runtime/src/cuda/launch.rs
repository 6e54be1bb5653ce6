//! Single-block CUDA launch used by the smoke test.

use cudarc::driver::{CudaFunction, LaunchAsync, LaunchConfig};

use super::context::{CudaContext, CudaError};

/// Launch `func(int* a)` over one block of `threads` threads with `*a` zeroed,
/// and return the final value of `*a`.
pub fn launch_int_accumulator(
    ctx: &CudaContext,
    func: CudaFunction,
    threads: u32,
) -> Result<i32, CudaError> {
    let dev = ctx.device();
    let mut a_device = dev
        .alloc_zeros::<i32>(1)
        .map_err(|e| CudaError::Memory(format!("alloc_zeros(1 x i32): {}", e)))?;

    let cfg = LaunchConfig {
        grid_dim: (1, 1, 1),
        block_dim: (threads, 1, 1),
        shared_mem_bytes: 0,
    };
    // Safety: the kernel takes a single `int*`, matched by the one-slice tuple.
    unsafe { func.launch(cfg, (&mut a_device,)) }
        .map_err(|e| CudaError::Launch(e.to_string()))?;
    dev.synchronize()
        .map_err(|e| CudaError::Launch(format!("synchronize: {}", e)))?;

    let host = dev
        .dtoh_sync_copy(&a_device)
        .map_err(|e| CudaError::Memory(format!("dtoh_sync_copy: {}", e)))?;
    host.first()
        .copied()
        .ok_or_else(|| CudaError::Memory("empty device readback".into()))
}
