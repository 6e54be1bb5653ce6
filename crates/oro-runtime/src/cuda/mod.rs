//! CUDA backend.
//!
//! Provides:
//! - Device context management through `cudarc`
//! - NVRTC compilation to PTX and module loading
//! - Driver version lookup
//! - Single-block launch for the smoke test

pub mod context;
pub mod ffi;
pub mod rtc;
pub mod launch;

pub use context::{CudaContext, CudaError};
pub use rtc::CudaModule;
