//! Library checks and driver entry points `cudarc`'s safe API does not wrap.
//!
//! `cudarc` opens libcuda and libnvrtc on first use and panics when either
//! is missing. [`ensure_libraries`] opens both up front and reports a
//! missing one as [`CudaError::DriverLibrary`].

use std::ffi::c_int;
use std::panic::{self, UnwindSafe};
use std::sync::OnceLock;

use cudarc::driver::sys::CUresult;
use cudarc::driver::DriverError;

use super::context::CudaError;

static LIBRARIES: OnceLock<Result<(), String>> = OnceLock::new();

/// Load the driver and NVRTC libraries the way `cudarc` will.
///
/// Checked once per process; every later call returns the cached outcome.
pub fn ensure_libraries() -> Result<(), CudaError> {
    LIBRARIES
        .get_or_init(|| {
            catch_library_panic("cuda", || {
                unsafe { cudarc::driver::sys::lib() };
            })?;
            catch_library_panic("nvrtc", || {
                unsafe { cudarc::nvrtc::sys::lib() };
            })
        })
        .clone()
        .map_err(CudaError::DriverLibrary)
}

/// Run `load`, turning a loader panic into an error naming `library`.
pub(crate) fn catch_library_panic<F>(library: &str, load: F) -> Result<(), String>
where
    F: FnOnce() + UnwindSafe,
{
    let hook = panic::take_hook();
    panic::set_hook(Box::new(|_| {}));
    let outcome = panic::catch_unwind(load);
    panic::set_hook(hook);

    outcome.map_err(|payload| {
        let reason = payload
            .downcast_ref::<String>()
            .map(String::as_str)
            .or_else(|| payload.downcast_ref::<&str>().copied())
            .unwrap_or("loader panicked");
        tracing::debug!("loading {} failed: {}", library, reason);
        format!("{}: {}", library, reason)
    })
}

/// `cuDriverGetVersion`.
pub fn driver_version() -> Result<i32, CudaError> {
    ensure_libraries()?;
    let mut version: c_int = 0;
    let rc = unsafe { cudarc::driver::sys::lib().cuDriverGetVersion(&mut version) };
    tracing::debug!("cuDriverGetVersion -> {:?}", rc);
    if rc != CUresult::CUDA_SUCCESS {
        return Err(CudaError::Query(format!("cuDriverGetVersion: {}", DriverError(rc))));
    }
    Ok(version)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_loader_panic_becomes_error() {
        let err = catch_library_panic("nvrtc", || {
            panic!("Unable to dynamically load the \"nvrtc\" shared library")
        })
        .unwrap_err();
        assert!(err.starts_with("nvrtc: Unable to dynamically load"), "{}", err);
    }

    #[test]
    fn test_loader_success_passes_through() {
        assert!(catch_library_panic("cuda", || {}).is_ok());
    }

    #[test]
    fn test_ensure_libraries_does_not_panic() {
        let outcome = panic::catch_unwind(ensure_libraries);
        assert!(outcome.is_ok());
        if let Ok(Err(e)) = outcome {
            assert!(matches!(e, CudaError::DriverLibrary(_)));
        }
    }

    #[test]
    fn test_driver_version_error_or_value() {
        match driver_version() {
            Ok(v) => assert!(v > 0),
            Err(e) => assert!(matches!(e, CudaError::DriverLibrary(_) | CudaError::Query(_))),
        }
    }
}
