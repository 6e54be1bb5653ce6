//! # oro-runtime
//!
//! One API over two GPU runtimes: HIP (ROCm) and CUDA.
//!
//! Provides:
//! - Backend selection from a command-line token
//! - Device + context setup and device property queries
//! - Runtime compilation of kernel source (hiprtc / NVRTC)
//! - Module loading and kernel function lookup
//! - An opt-in single-kernel launch used by the smoke test
//!
//! HIP is always compiled in and loaded with `libloading` at run time.
//! CUDA goes through `cudarc` behind the `cuda` feature flag.

pub mod api;
pub mod config;
pub mod error;
pub mod kernel;
pub mod rocm;
pub mod runtime;

#[cfg(feature = "cuda")]
pub mod cuda;

pub use api::Api;
pub use config::SmokeConfig;
pub use error::OroError;
pub use kernel::KernelSource;
pub use runtime::{Context, DeviceProps, Function, LaunchReport, Module, Program, Runtime};

pub type Result<T> = std::result::Result<T, OroError>;
