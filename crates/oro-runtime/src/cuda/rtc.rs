//! NVRTC compilation and PTX module loading.

use std::sync::atomic::{AtomicUsize, Ordering};

use cudarc::driver::CudaFunction;
use cudarc::nvrtc::{compile_ptx_with_opts, CompileError, CompileOptions, Ptx};

use super::context::{CudaContext, CudaError};
use super::ffi;

/// Counter giving every loaded module a distinct name on the device.
static MODULE_COUNTER: AtomicUsize = AtomicUsize::new(0);

/// Split driver-style option strings into NVRTC include paths and the rest.
///
/// `-I dir`, `-Idir` and `--include-path=dir` become include paths; every
/// other option is passed through untouched.
pub fn split_options(options: &[String]) -> (Vec<String>, Vec<String>) {
    let mut includes = Vec::new();
    let mut rest = Vec::new();
    let mut iter = options.iter().map(|o| o.trim()).peekable();
    while let Some(opt) = iter.next() {
        if let Some(path) = opt.strip_prefix("--include-path=") {
            includes.push(path.to_string());
        } else if let Some(path) = opt.strip_prefix("-I") {
            let path = path.trim();
            if path.is_empty() {
                if let Some(next) = iter.next() {
                    includes.push(next.to_string());
                }
            } else {
                includes.push(path.to_string());
            }
        } else if !opt.is_empty() {
            rest.push(opt.to_string());
        }
    }
    (includes, rest)
}

/// Compile CUDA C++ source to PTX.
pub fn compile(source: &str, name: &str, options: &[String]) -> Result<Ptx, CudaError> {
    ffi::ensure_libraries()?;
    let (include_paths, options) = split_options(options);
    tracing::debug!("nvrtc '{}': include={:?} options={:?}", name, include_paths, options);
    let opts = CompileOptions {
        include_paths,
        options,
        ..Default::default()
    };
    compile_ptx_with_opts(source, opts).map_err(|e| {
        let log = match &e {
            CompileError::CompileError { log, .. } => log.to_string_lossy().into_owned(),
            other => format!("{:?}", other),
        };
        CudaError::Compile { program: name.to_string(), log }
    })
}

/// Names of the kernels a PTX text exports (its `.entry` directives).
pub fn ptx_entry_names(ptx: &str) -> Vec<String> {
    ptx.lines()
        .filter_map(|line| {
            let mut tokens = line.split_whitespace();
            tokens.by_ref().find(|t| *t == ".entry")?;
            let name = tokens.next()?.split('(').next()?;
            (!name.is_empty()).then(|| name.to_string())
        })
        .collect()
}

/// A PTX module loaded on a device, addressed by its registered name.
#[derive(Debug, Clone)]
pub struct CudaModule {
    ctx: CudaContext,
    name: String,
}

impl CudaModule {
    /// Load PTX with every kernel it exports registered for lookup.
    pub fn load(ctx: &CudaContext, ptx: Ptx) -> Result<Self, CudaError> {
        let name = format!("oro_module_{}", MODULE_COUNTER.fetch_add(1, Ordering::Relaxed));
        let entries = ptx_entry_names(&ptx.to_src());
        tracing::debug!("loading '{}' with entries {:?}", name, entries);
        // cudarc keys its function table by 'static names.
        let names: Vec<&'static str> = entries
            .into_iter()
            .map(|f| &*Box::leak(f.into_boxed_str()))
            .collect();
        ctx.device()
            .load_ptx(ptx, &name, &names)
            .map_err(|e| CudaError::ModuleLoad { module: name.clone(), msg: e.to_string() })?;
        Ok(Self { ctx: ctx.clone(), name })
    }

    pub fn function(&self, func: &str) -> Result<CudaFunction, CudaError> {
        self.ctx
            .device()
            .get_func(&self.name, func)
            .ok_or_else(|| CudaError::FuncNotFound {
                module: self.name.clone(),
                func: func.to_string(),
            })
    }
}
