//! GPU integration tests for the HIP backend.
//! Each test returns early when no ROCm device is visible.
//! Run with: cargo test -p oro-runtime --test hip_smoke -- --nocapture

use oro_runtime::rocm::context::is_rocm_available;
use oro_runtime::{Api, KernelSource, OroError, Runtime};

fn hip_context() -> Option<oro_runtime::Context> {
    if !is_rocm_available() {
        eprintln!("skipping: no HIP device");
        return None;
    }
    let runtime = Runtime::initialize(Api::Hip).ok()?;
    Some(runtime.open_context(0).expect("open device 0"))
}

#[test]
fn test_device_props() {
    let Some(ctx) = hip_context() else { return };
    let props = ctx.properties().unwrap();
    assert!(!props.name.is_empty());
    assert!(props.arch_name.starts_with("gfx"), "arch: {}", props.arch_name);
    assert!(ctx.driver_version().unwrap() > 0);
}

#[test]
fn test_compile_load_resolve() {
    let Some(ctx) = hip_context() else { return };
    let kernel = KernelSource::default();
    let program = ctx.compile(&kernel).unwrap();
    assert!(program.code_size() > 0);
    let module = ctx.load_module(&program).unwrap();
    let func = module.function("testKernel").unwrap();
    assert_eq!(func.name(), "testKernel");
    assert!(module.function("missingKernel").is_err());
}

#[test]
fn test_every_exported_kernel_resolves() {
    let Some(ctx) = hip_context() else { return };
    let kernel = KernelSource {
        source: "extern \"C\" __global__ void testKernel( int* a ) { atomicAdd( a, 1 ); }\n\
                 extern \"C\" __global__ void resetKernel( int* a ) { *a = 0; }"
            .into(),
        ..Default::default()
    };
    let program = ctx.compile(&kernel).unwrap();
    let module = ctx.load_module(&program).unwrap();
    assert_eq!(module.function("testKernel").unwrap().name(), "testKernel");
    assert_eq!(module.function("resetKernel").unwrap().name(), "resetKernel");
}

#[test]
fn test_compile_error_carries_log() {
    let Some(ctx) = hip_context() else { return };
    let kernel = KernelSource {
        source: "extern \"C\" __global__ void testKernel( int* a ) { undeclared = 1; }".into(),
        ..Default::default()
    };
    let err = ctx.compile(&kernel).unwrap_err();
    assert!(matches!(err, OroError::Rocm(_)));
    assert!(err.compile_log().map_or(false, |log| log.contains("undeclared")));
}

#[test]
fn test_smoke_launch() {
    let Some(ctx) = hip_context() else { return };
    let program = ctx.compile(&KernelSource::default()).unwrap();
    let module = ctx.load_module(&program).unwrap();
    let func = module.function("testKernel").unwrap();
    let report = ctx.run_smoke_launch(&func, 64).unwrap();
    assert_eq!(report.expected, 2016);
    assert!(report.passed(), "got {}", report.value);
}
