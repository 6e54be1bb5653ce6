use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// GPU runtime family the abstraction forwards to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Api {
    /// AMD HIP runtime + hiprtc
    #[default]
    Hip,
    /// NVIDIA CUDA driver + NVRTC
    Cuda,
}

impl Api {
    /// Resolve the backend from the first command-line token.
    ///
    /// Only the exact tokens `hip` and `cuda` select a backend; a missing or
    /// unrecognized token keeps the default (HIP).
    pub fn from_token(token: Option<&str>) -> Self {
        match token {
            Some("cuda") => Api::Cuda,
            Some("hip") => Api::Hip,
            _ => Api::default(),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Api::Hip => "hip",
            Api::Cuda => "cuda",
        }
    }

    /// Whether this build can drive the backend at all.
    pub fn is_compiled_in(&self) -> bool {
        match self {
            Api::Hip => true,
            Api::Cuda => cfg!(feature = "cuda"),
        }
    }
}

impl fmt::Display for Api {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Api {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "hip" => Ok(Api::Hip),
            "cuda" => Ok(Api::Cuda),
            other => Err(format!("unknown backend '{}': expected 'hip' or 'cuda'", other)),
        }
    }
}
