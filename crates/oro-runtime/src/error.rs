use crate::api::Api;
use crate::rocm::context::RocmError;

#[cfg(feature = "cuda")]
use crate::cuda::context::CudaError;

/// Errors surfaced by the runtime abstraction, whatever the backend.
#[derive(Debug, thiserror::Error)]
pub enum OroError {
    #[error("backend '{0}' is not compiled into this build")]
    BackendUnavailable(Api),

    #[error(transparent)]
    Rocm(#[from] RocmError),

    #[cfg(feature = "cuda")]
    #[error(transparent)]
    Cuda(#[from] CudaError),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("config parse error: {0}")]
    Json(#[from] serde_json::Error),
}

impl OroError {
    /// Compiler log attached to the error, if it came from a failed RTC compile.
    pub fn compile_log(&self) -> Option<&str> {
        match self {
            OroError::Rocm(RocmError::Compile { log, .. }) => Some(log),
            #[cfg(feature = "cuda")]
            OroError::Cuda(CudaError::Compile { log, .. }) => Some(log),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_unavailable_message() {
        let e = OroError::BackendUnavailable(Api::Cuda);
        assert_eq!(e.to_string(), "backend 'cuda' is not compiled into this build");
    }

    #[test]
    fn test_rocm_error_is_transparent() {
        let e: OroError = RocmError::Hip {
            code: 100,
            message: "no ROCm-capable device is detected".into(),
            context: "hipDeviceGet".into(),
        }
        .into();
        assert_eq!(
            e.to_string(),
            "HIP error 100 in hipDeviceGet: no ROCm-capable device is detected"
        );
    }

    #[test]
    fn test_compile_log() {
        let e: OroError = RocmError::Compile {
            program: "testKernel".into(),
            log: "error: use of undeclared identifier 'tid'".into(),
        }
        .into();
        assert_eq!(e.compile_log(), Some("error: use of undeclared identifier 'tid'"));
        assert_eq!(OroError::Config("x".into()).compile_log(), None);
    }
}
