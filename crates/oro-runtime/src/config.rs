//! Smoke test configuration.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::api::Api;
use crate::error::OroError;
use crate::kernel::KernelSource;

/// Largest block the smoke launch will request (CUDA and HIP both cap at 1024).
pub const MAX_LAUNCH_THREADS: u32 = 1024;

/// Everything the smoke test needs to know, loadable from JSON.
///
/// Missing fields take their defaults, so `{}` is a valid config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SmokeConfig {
    /// Backend to run on.
    pub api: Api,

    /// Device ordinal. Only device 0 is supported.
    pub device: usize,

    /// Program handed to the runtime compiler.
    pub kernel: KernelSource,

    /// Also launch the kernel and check the result.
    pub launch: bool,

    /// Threads in the single launched block.
    pub launch_threads: u32,
}

impl Default for SmokeConfig {
    fn default() -> Self {
        Self {
            api: Api::default(),
            device: 0,
            kernel: KernelSource::default(),
            launch: false,
            launch_threads: 64,
        }
    }
}

impl SmokeConfig {
    /// Parse a JSON config.
    pub fn from_json(text: &str) -> Result<Self, OroError> {
        let config: Self = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a JSON config file.
    pub fn from_json_file(path: &Path) -> Result<Self, OroError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn to_json_pretty(&self) -> Result<String, OroError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Reject settings the smoke test cannot honor.
    pub fn validate(&self) -> Result<(), OroError> {
        if self.device != 0 {
            return Err(OroError::Config(format!(
                "device {} requested; only device 0 is supported",
                self.device
            )));
        }
        if self.kernel.name.trim().is_empty() {
            return Err(OroError::Config("kernel name must not be empty".into()));
        }
        if self.launch_threads == 0 || self.launch_threads > MAX_LAUNCH_THREADS {
            return Err(OroError::Config(format!(
                "launch_threads must be in 1..={}, got {}",
                MAX_LAUNCH_THREADS, self.launch_threads
            )));
        }
        Ok(())
    }
}
