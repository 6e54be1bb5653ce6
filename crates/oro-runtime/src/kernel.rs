use serde::{Deserialize, Serialize};

/// Kernel compiled by the smoke test: every thread adds its index to `*a`.
///
/// Valid for both hiprtc and NVRTC without extra headers.
pub const TEST_KERNEL_SOURCE: &str = r#"extern "C" __global__ void testKernel( int* __restrict__ a )
{
	int tid = threadIdx.x;
	atomicAdd( a, tid );
}
"#;

/// Entry point exported by [`TEST_KERNEL_SOURCE`].
pub const TEST_KERNEL_NAME: &str = "testKernel";

/// Default RTC options: look for headers one directory up.
pub const DEFAULT_COMPILE_OPTIONS: &[&str] = &["-I ../"];

/// Source text, exported function name and compile options for one RTC program.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelSource {
    pub source: String,
    pub name: String,
    pub options: Vec<String>,
}

impl Default for KernelSource {
    fn default() -> Self {
        Self {
            source: TEST_KERNEL_SOURCE.to_string(),
            name: TEST_KERNEL_NAME.to_string(),
            options: DEFAULT_COMPILE_OPTIONS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

/// Value `testKernel` leaves in `*a` after one block of `threads` threads:
/// the sum `0 + 1 + ... + (threads - 1)`.
pub fn expected_accumulator(threads: u32) -> i64 {
    let n = threads as i64;
    n * (n - 1) / 2
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_kernel() {
        let k = KernelSource::default();
        assert_eq!(k.name, "testKernel");
        assert_eq!(k.options, vec!["-I ../".to_string()]);
        assert!(k.source.contains("extern \"C\" __global__ void testKernel"));
        assert!(k.source.contains("atomicAdd( a, tid )"));
    }

    #[test]
    fn test_expected_accumulator() {
        assert_eq!(expected_accumulator(64), 2016);
        assert_eq!(expected_accumulator(1), 0);
        assert_eq!(expected_accumulator(0), 0);
        assert_eq!(expected_accumulator(1024), 523_776);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let k: KernelSource = serde_json::from_str(r#"{"options": []}"#).unwrap();
        assert_eq!(k.name, TEST_KERNEL_NAME);
        assert!(k.options.is_empty());
    }
}
