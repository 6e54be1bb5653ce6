//! CUDA device context management.
//!
//! `cudarc::driver::CudaDevice::new` initializes the driver and retains the
//! device's primary context, which is what a `CudaContext` holds on to.

use std::sync::Arc;

use cudarc::driver::sys::CUdevice_attribute;
use cudarc::driver::CudaDevice;

use super::ffi;

/// An open CUDA device with its primary context retained.
#[derive(Debug, Clone)]
pub struct CudaContext {
    device: Arc<CudaDevice>,
    ordinal: usize,
}

impl CudaContext {
    /// Initialize the driver and open the device.
    pub fn create(ordinal: usize) -> Result<Self, CudaError> {
        ffi::ensure_libraries()?;
        let device = CudaDevice::new(ordinal)
            .map_err(|e| CudaError::DeviceInit(format!("device {}: {}", ordinal, e)))?;
        tracing::debug!("CudaDevice::new({}) ok", ordinal);
        Ok(Self { device, ordinal })
    }

    pub fn ordinal(&self) -> usize {
        self.ordinal
    }

    pub fn device(&self) -> &Arc<CudaDevice> {
        &self.device
    }

    /// Device name and `sm_XY` architecture name.
    pub fn properties(&self) -> Result<(String, String), CudaError> {
        let name = self
            .device
            .name()
            .map_err(|e| CudaError::Query(format!("cuDeviceGetName: {}", e)))?;
        let major = self.attribute(CUdevice_attribute::CU_DEVICE_ATTRIBUTE_COMPUTE_CAPABILITY_MAJOR)?;
        let minor = self.attribute(CUdevice_attribute::CU_DEVICE_ATTRIBUTE_COMPUTE_CAPABILITY_MINOR)?;
        Ok((name, sm_arch_name(major, minor)))
    }

    fn attribute(&self, attr: CUdevice_attribute) -> Result<i32, CudaError> {
        self.device
            .attribute(attr)
            .map_err(|e| CudaError::Query(format!("cuDeviceGetAttribute({:?}): {}", attr, e)))
    }

    /// Version of the installed CUDA driver, e.g. 12040.
    pub fn driver_version(&self) -> Result<i32, CudaError> {
        ffi::driver_version()
    }
}

/// `sm_86` style architecture name for a compute capability.
pub fn sm_arch_name(major: i32, minor: i32) -> String {
    format!("sm_{}{}", major, minor)
}

/// Check if any CUDA device can be opened.
pub fn is_cuda_available() -> bool {
    ffi::ensure_libraries().is_ok() && CudaDevice::new(0).is_ok()
}

/// CUDA-specific errors.
#[derive(Debug, thiserror::Error)]
pub enum CudaError {
    #[error("CUDA device init failed: {0}")]
    DeviceInit(String),

    #[error("CUDA device query failed: {0}")]
    Query(String),

    #[error("CUDA library unavailable: {0}")]
    DriverLibrary(String),

    #[error("NVRTC compilation failed for '{program}'")]
    Compile { program: String, log: String },

    #[error("failed to load module '{module}': {msg}")]
    ModuleLoad { module: String, msg: String },

    #[error("function '{func}' not found in module '{module}'")]
    FuncNotFound { module: String, func: String },

    #[error("CUDA kernel launch failed: {0}")]
    Launch(String),

    #[error("CUDA memory error: {0}")]
    Memory(String),
}
