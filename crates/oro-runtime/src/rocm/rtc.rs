//! hiprtc program compilation.

use std::ffi::c_char;

use super::context::{c_string, RocmError};
use super::ffi::{self, check_hiprtc, HiprtcApi, HiprtcProgram, HIPRTC_SUCCESS};

/// Code object produced by hiprtc, ready for `hipModuleLoadData`.
#[derive(Debug, Clone)]
pub struct CompiledCode {
    pub code: Vec<u8>,
    /// Compiler log; may hold warnings even on success.
    pub log: String,
}

/// Owns a hiprtc program handle; destroyed on drop, whatever path returns.
struct ProgramGuard<'a> {
    api: &'a HiprtcApi,
    prog: HiprtcProgram,
}

impl Drop for ProgramGuard<'_> {
    fn drop(&mut self) {
        if !self.prog.is_null() {
            let rc = unsafe { (self.api.hiprtc_destroy_program)(&mut self.prog) };
            tracing::debug!("hiprtcDestroyProgram -> {}", rc);
        }
    }
}

impl ProgramGuard<'_> {
    fn log(&self) -> String {
        let mut log_size: usize = 0;
        let rc = unsafe { (self.api.hiprtc_get_program_log_size)(self.prog, &mut log_size) };
        if rc != HIPRTC_SUCCESS || log_size == 0 {
            return String::new();
        }
        let mut buf = vec![0u8; log_size];
        let rc = unsafe { (self.api.hiprtc_get_program_log)(self.prog, buf.as_mut_ptr() as *mut c_char) };
        if rc != HIPRTC_SUCCESS {
            return String::new();
        }
        trim_c_buffer(buf)
    }
}

/// Compile kernel source with hiprtc.
///
/// `name` is the program name reported in diagnostics. On a failed compile the
/// program log is returned inside `RocmError::Compile`.
pub fn compile(source: &str, name: &str, options: &[String]) -> Result<CompiledCode, RocmError> {
    let api = ffi::hiprtc_api()?;

    let c_source = c_string(source, "kernel source")?;
    let c_name = c_string(name, "program name")?;
    let c_opts = options
        .iter()
        .map(|o| c_string(o, "compile option"))
        .collect::<Result<Vec<_>, _>>()?;
    let opt_ptrs: Vec<*const c_char> = c_opts.iter().map(|o| o.as_ptr()).collect();

    let mut guard = ProgramGuard { api, prog: std::ptr::null_mut() };
    check_hiprtc(
        api,
        unsafe {
            (api.hiprtc_create_program)(
                &mut guard.prog,
                c_source.as_ptr(),
                c_name.as_ptr(),
                0,
                std::ptr::null(),
                std::ptr::null(),
            )
        },
        "hiprtcCreateProgram",
    )?;

    tracing::debug!("compiling '{}' with options {:?}", name, options);
    let rc = unsafe {
        (api.hiprtc_compile_program)(guard.prog, opt_ptrs.len() as i32, opt_ptrs.as_ptr())
    };
    let log = guard.log();
    if rc != HIPRTC_SUCCESS {
        tracing::warn!("hiprtcCompileProgram failed for '{}': {}", name, api.error_string(rc));
        return Err(RocmError::Compile { program: name.to_string(), log });
    }

    let mut code_size: usize = 0;
    check_hiprtc(
        api,
        unsafe { (api.hiprtc_get_code_size)(guard.prog, &mut code_size) },
        "hiprtcGetCodeSize",
    )?;
    let mut code = vec![0u8; code_size];
    check_hiprtc(
        api,
        unsafe { (api.hiprtc_get_code)(guard.prog, code.as_mut_ptr() as *mut c_char) },
        "hiprtcGetCode",
    )?;

    Ok(CompiledCode { code, log })
}

/// Drop the trailing NUL (and anything after it) from a C-filled buffer.
fn trim_c_buffer(mut buf: Vec<u8>) -> String {
    if let Some(end) = buf.iter().position(|&b| b == 0) {
        buf.truncate(end);
    }
    String::from_utf8_lossy(&buf).into_owned()
}
