//! ROCm/HIP backend.
//!
//! Uses `libloading` for runtime-loaded HIP/hiprtc function pointers (no
//! build-time ROCm dependency).
//!
//! Provides:
//! - Runtime HIP detection and device/context setup
//! - hiprtc kernel compilation
//! - Module loading and function lookup
//! - Device memory and kernel launch for the smoke launch

pub mod ffi;
pub mod context;
pub mod rtc;
pub mod module;
pub mod memory;
pub mod launch;

pub use context::{HipContext, RocmError};
pub use module::{HipFunction, HipModule};
pub use rtc::CompiledCode;
