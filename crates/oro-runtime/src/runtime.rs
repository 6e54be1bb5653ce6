//! Backend-independent runtime: one set of types whatever `Api` was chosen.
//!
//! The call order mirrors the vendor APIs:
//! `Runtime::initialize` → `open_context` → `compile` → `load_module` →
//! `Module::function`.

use std::ffi::c_void;
use std::marker::PhantomData;
use std::time::Instant;

use crate::api::Api;
use crate::error::OroError;
use crate::kernel::{expected_accumulator, KernelSource};
use crate::rocm::{self, HipContext, HipFunction, HipModule};
use crate::Result;

#[cfg(feature = "cuda")]
use crate::cuda::{self, CudaContext, CudaModule};

/// Loaded vendor libraries for one backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Runtime {
    api: Api,
}

impl Runtime {
    /// Load the backend's runtime and compiler libraries.
    pub fn initialize(api: Api) -> Result<Self> {
        match api {
            Api::Hip => {
                rocm::ffi::hip_api()?;
                rocm::ffi::hiprtc_api()?;
            }
            #[cfg(feature = "cuda")]
            Api::Cuda => {
                cuda::ffi::ensure_libraries()?;
            }
            #[cfg(not(feature = "cuda"))]
            Api::Cuda => return Err(OroError::BackendUnavailable(api)),
        }
        tracing::info!("runtime initialized for {}", api);
        Ok(Self { api })
    }

    pub fn api(&self) -> Api {
        self.api
    }

    /// Initialize the device and bind its primary context.
    pub fn open_context(&self, ordinal: usize) -> Result<Context> {
        let inner = match self.api {
            Api::Hip => ContextInner::Hip(HipContext::create(ordinal)?),
            #[cfg(feature = "cuda")]
            Api::Cuda => ContextInner::Cuda(CudaContext::create(ordinal)?),
            #[cfg(not(feature = "cuda"))]
            Api::Cuda => return Err(OroError::BackendUnavailable(self.api)),
        };
        Ok(Context { inner })
    }
}

/// Identifying properties of the open device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceProps {
    pub name: String,
    /// `gfx…` on HIP, `sm_XY` on CUDA.
    pub arch_name: String,
}

/// An open device context.
#[derive(Debug, Clone)]
pub struct Context {
    inner: ContextInner,
}

#[derive(Debug, Clone)]
enum ContextInner {
    Hip(HipContext),
    #[cfg(feature = "cuda")]
    Cuda(CudaContext),
}

/// Compiled code, not yet loaded.
#[derive(Debug, Clone)]
pub struct Program {
    name: String,
    log: String,
    code: ProgramCode,
}

#[derive(Debug, Clone)]
enum ProgramCode {
    Hip(rocm::CompiledCode),
    #[cfg(feature = "cuda")]
    Cuda(cudarc::nvrtc::Ptx),
}

impl Program {
    /// Kernel the program exports.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Compiler output; may be empty.
    pub fn log(&self) -> &str {
        &self.log
    }

    /// Size in bytes of the code blob (code object or PTX text).
    pub fn code_size(&self) -> usize {
        match &self.code {
            ProgramCode::Hip(c) => c.code.len(),
            #[cfg(feature = "cuda")]
            ProgramCode::Cuda(ptx) => ptx.to_src().len(),
        }
    }
}

/// Executable code loaded on the device.
#[derive(Debug)]
pub struct Module {
    inner: ModuleInner,
}

#[derive(Debug)]
enum ModuleInner {
    Hip(HipModule),
    #[cfg(feature = "cuda")]
    Cuda(CudaModule),
}

/// Kernel entry point; borrows the module it was resolved from.
#[derive(Debug, Clone)]
pub struct Function<'m> {
    name: String,
    inner: FunctionInner,
    _module: PhantomData<&'m Module>,
}

#[derive(Debug, Clone)]
enum FunctionInner {
    Hip(HipFunction),
    #[cfg(feature = "cuda")]
    Cuda(cudarc::driver::CudaFunction),
}

impl Function<'_> {
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Outcome of the opt-in smoke launch.
#[derive(Debug, Clone, PartialEq)]
pub struct LaunchReport {
    pub threads: u32,
    pub value: i32,
    pub expected: i64,
    /// Host wall-clock time for launch + synchronize, not a device event timing.
    pub wall_ms: f64,
}

impl LaunchReport {
    pub fn passed(&self) -> bool {
        self.value as i64 == self.expected
    }
}

impl Context {
    pub fn api(&self) -> Api {
        match &self.inner {
            ContextInner::Hip(_) => Api::Hip,
            #[cfg(feature = "cuda")]
            ContextInner::Cuda(_) => Api::Cuda,
        }
    }

    pub fn properties(&self) -> Result<DeviceProps> {
        let (name, arch_name) = match &self.inner {
            ContextInner::Hip(ctx) => ctx.properties()?,
            #[cfg(feature = "cuda")]
            ContextInner::Cuda(ctx) => ctx.properties()?,
        };
        Ok(DeviceProps { name, arch_name })
    }

    pub fn driver_version(&self) -> Result<i32> {
        Ok(match &self.inner {
            ContextInner::Hip(ctx) => ctx.driver_version()?,
            #[cfg(feature = "cuda")]
            ContextInner::Cuda(ctx) => ctx.driver_version()?,
        })
    }

    /// Run the backend's runtime compiler over `kernel`.
    ///
    /// A failed compile comes back as an error carrying the compiler log
    /// (see [`OroError::compile_log`]).
    pub fn compile(&self, kernel: &KernelSource) -> Result<Program> {
        let (code, log) = match &self.inner {
            ContextInner::Hip(_) => {
                let compiled = rocm::rtc::compile(&kernel.source, &kernel.name, &kernel.options)?;
                let log = compiled.log.clone();
                (ProgramCode::Hip(compiled), log)
            }
            #[cfg(feature = "cuda")]
            ContextInner::Cuda(_) => {
                let ptx = cuda::rtc::compile(&kernel.source, &kernel.name, &kernel.options)?;
                (ProgramCode::Cuda(ptx), String::new())
            }
        };
        let program = Program { name: kernel.name.clone(), log, code };
        tracing::debug!("compiled '{}' ({} bytes)", program.name, program.code_size());
        Ok(program)
    }

    /// Load a compiled program as an executable module.
    pub fn load_module(&self, program: &Program) -> Result<Module> {
        let inner = match (&self.inner, &program.code) {
            (ContextInner::Hip(ctx), ProgramCode::Hip(code)) => {
                ctx.bind()?;
                ModuleInner::Hip(HipModule::load(code)?)
            }
            #[cfg(feature = "cuda")]
            (ContextInner::Cuda(ctx), ProgramCode::Cuda(ptx)) => {
                ModuleInner::Cuda(CudaModule::load(ctx, ptx.clone())?)
            }
            #[cfg(feature = "cuda")]
            _ => {
                return Err(OroError::Config(format!(
                    "program '{}' was compiled for a different backend",
                    program.name
                )))
            }
        };
        Ok(Module { inner })
    }

    /// Launch `func` as `testKernel(int* a)` over one block and read `*a` back.
    pub fn run_smoke_launch(&self, func: &Function<'_>, threads: u32) -> Result<LaunchReport> {
        let start = Instant::now();
        let value = match (&self.inner, &func.inner) {
            (ContextInner::Hip(ctx), FunctionInner::Hip(f)) => hip_accumulate(ctx, f, threads)?,
            #[cfg(feature = "cuda")]
            (ContextInner::Cuda(ctx), FunctionInner::Cuda(f)) => {
                cuda::launch::launch_int_accumulator(ctx, f.clone(), threads)?
            }
            #[cfg(feature = "cuda")]
            _ => {
                return Err(OroError::Config(format!(
                    "function '{}' belongs to a different backend",
                    func.name
                )))
            }
        };
        let wall_ms = start.elapsed().as_secs_f64() * 1000.0;
        Ok(LaunchReport { threads, value, expected: expected_accumulator(threads), wall_ms })
    }
}

fn hip_accumulate(ctx: &HipContext, func: &HipFunction, threads: u32) -> Result<i32> {
    let buf = rocm::memory::HipBuffer::zeros(ctx, std::mem::size_of::<i32>())?;
    let mut a_device = buf.as_device_ptr();
    let mut params = [&mut a_device as *mut _ as *mut c_void];
    let config = rocm::launch::HipLaunchConfig::single_block(threads);
    // Safety: testKernel takes one `int*`; `params` holds a pointer to it.
    unsafe { rocm::launch::launch_kernel(ctx, func, &config, &mut params)? };
    let host = buf.to_host()?;
    let mut word = [0u8; 4];
    word.copy_from_slice(&host[..4]);
    Ok(i32::from_ne_bytes(word))
}

impl Module {
    /// Resolve an exported kernel by name.
    pub fn function(&self, name: &str) -> Result<Function<'_>> {
        let inner = match &self.inner {
            ModuleInner::Hip(m) => FunctionInner::Hip(m.function(name)?),
            #[cfg(feature = "cuda")]
            ModuleInner::Cuda(m) => FunctionInner::Cuda(m.function(name)?),
        };
        Ok(Function { name: name.to_string(), inner, _module: PhantomData })
    }
}
