//! GPU integration tests for the CUDA backend.
//! Run with: cargo test -p oro-runtime --features cuda --test cuda_smoke -- --nocapture

#![cfg(feature = "cuda")]

use oro_runtime::{Api, Context, KernelSource, OroError, Runtime};

fn cuda_context() -> Context {
    let runtime = Runtime::initialize(Api::Cuda).expect("CUDA driver library");
    runtime.open_context(0).expect("open device 0")
}

#[test]
fn test_device_props() {
    let ctx = cuda_context();
    let props = ctx.properties().unwrap();
    assert!(!props.name.is_empty());
    assert!(props.arch_name.starts_with("sm_"), "arch: {}", props.arch_name);
    assert!(ctx.driver_version().unwrap() >= 11000);
}

#[test]
fn test_compile_load_resolve() {
    let ctx = cuda_context();
    let program = ctx.compile(&KernelSource::default()).unwrap();
    assert!(program.code_size() > 0);
    let module = ctx.load_module(&program).unwrap();
    assert_eq!(module.function("testKernel").unwrap().name(), "testKernel");
    assert!(module.function("missingKernel").is_err());
}

#[test]
fn test_every_exported_kernel_resolves() {
    let ctx = cuda_context();
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
    let ctx = cuda_context();
    let kernel = KernelSource {
        source: "extern \"C\" __global__ void testKernel( int* a ) { undeclared = 1; }".into(),
        ..Default::default()
    };
    let err = ctx.compile(&kernel).unwrap_err();
    assert!(matches!(err, OroError::Cuda(_)));
    assert!(err.compile_log().map_or(false, |log| log.contains("undeclared")));
}

#[test]
fn test_smoke_launch() {
    let ctx = cuda_context();
    let program = ctx.compile(&KernelSource::default()).unwrap();
    let module = ctx.load_module(&program).unwrap();
    let func = module.function("testKernel").unwrap();
    let report = ctx.run_smoke_launch(&func, 64).unwrap();
    assert_eq!(report.value, 2016);
}
