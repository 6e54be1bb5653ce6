use std::ffi::OsString;
use std::io::{self, Write};
use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use oro_runtime::{
    Api, Context, DeviceProps, KernelSource, LaunchReport, OroError, Runtime, SmokeConfig,
};

#[derive(Parser, Debug)]
#[command(
    name = "oro-smoke",
    about = "Smoke test for the HIP/CUDA runtime abstraction",
    long_about = "Initializes the selected GPU runtime, opens device 0, prints its properties,\n\
                  compiles a trivial kernel at run time, loads it and resolves the kernel function.",
    version,
)]
struct Cli {
    /// Backend: `hip` or `cuda`. Anything else runs on hip.
    api: Option<OsString>,

    /// JSON config file (see --print-config for the format)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Runtime compiler option; repeat for several. Replaces the configured options.
    #[arg(long = "option", value_name = "OPT", allow_hyphen_values = true)]
    options: Vec<String>,

    /// Launch the kernel once and check the accumulated value
    #[arg(long)]
    launch: bool,

    /// Threads in the launched block
    #[arg(long)]
    threads: Option<u32>,

    /// Print the effective config as JSON and exit
    #[arg(long)]
    print_config: bool,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    let config = match build_config(&cli) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("error: {}", e);
            std::process::exit(2);
        }
    };

    let stdout = io::stdout();
    let mut out = stdout.lock();
    let result = if cli.print_config {
        config
            .to_json_pretty()
            .map_err(|e| io::Error::other(e.to_string()))
            .and_then(|json| writeln!(out, "{}", json))
    } else {
        run(Runtime::initialize(config.api), &config, &mut out)
    };
    if let Err(e) = result {
        eprintln!("error: {}", e);
    }
}

/// Config file first, then command-line overrides.
fn build_config(cli: &Cli) -> Result<SmokeConfig, OroError> {
    let mut config = match &cli.config {
        Some(path) => SmokeConfig::from_json_file(path)?,
        None => SmokeConfig::default(),
    };
    if cli.api.is_some() || cli.config.is_none() {
        config.api = Api::from_token(cli.api.as_deref().and_then(|t| t.to_str()));
    }
    if !cli.options.is_empty() {
        config.kernel.options = cli.options.clone();
    }
    if cli.launch {
        config.launch = true;
    }
    if let Some(threads) = cli.threads {
        config.launch_threads = threads;
    }
    config.validate()?;
    Ok(config)
}

/// Runtime entry points the stages go through.
trait SmokeRuntime {
    type Device: SmokeDevice;

    fn api(&self) -> Api;
    fn open_context(&self, ordinal: usize) -> Result<Self::Device, OroError>;
}

/// Per-device calls made by the props and kernel stages.
trait SmokeDevice {
    fn properties(&self) -> Result<DeviceProps, OroError>;
    fn driver_version(&self) -> Result<i32, OroError>;

    /// Compile, load and resolve `kernel`; launch it over `launch` threads when set.
    fn build_kernel(
        &self,
        kernel: &KernelSource,
        launch: Option<u32>,
    ) -> Result<Option<LaunchReport>, OroError>;
}

impl SmokeRuntime for Runtime {
    type Device = Context;

    fn api(&self) -> Api {
        Runtime::api(self)
    }

    fn open_context(&self, ordinal: usize) -> Result<Context, OroError> {
        Runtime::open_context(self, ordinal)
    }
}

impl SmokeDevice for Context {
    fn properties(&self) -> Result<DeviceProps, OroError> {
        Context::properties(self)
    }

    fn driver_version(&self) -> Result<i32, OroError> {
        Context::driver_version(self)
    }

    fn build_kernel(
        &self,
        kernel: &KernelSource,
        launch: Option<u32>,
    ) -> Result<Option<LaunchReport>, OroError> {
        let program = self.compile(kernel)?;
        if !program.log().is_empty() {
            tracing::debug!("compile log for '{}':\n{}", program.name(), program.log());
        }
        let module = self.load_module(&program)?;
        let function = module.function(&kernel.name)?;
        tracing::info!("resolved '{}' ({} bytes of code)", function.name(), program.code_size());

        launch
            .map(|threads| self.run_smoke_launch(&function, threads))
            .transpose()
    }
}

/// Run every stage, printing markers and results to `out`.
fn run<R: SmokeRuntime, W: Write>(
    runtime: Result<R, OroError>,
    config: &SmokeConfig,
    out: &mut W,
) -> io::Result<()> {
    let runtime = match runtime {
        Ok(rt) => rt,
        Err(e) => {
            tracing::warn!("{}", e);
            writeln!(out, "initialization failed")?;
            return Ok(());
        }
    };
    writeln!(out, ">> executing on {}", runtime.api())?;

    writeln!(out, ">> testing initialization")?;
    let ctx = match runtime.open_context(config.device) {
        Ok(ctx) => Some(ctx),
        Err(e) => {
            report(out, &e)?;
            None
        }
    };

    writeln!(out, ">> testing device props")?;
    if let Some(ctx) = &ctx {
        match ctx.properties() {
            Ok(props) => writeln!(out, "executing on {} ({})", props.name, props.arch_name)?,
            Err(e) => report(out, &e)?,
        }
        match ctx.driver_version() {
            Ok(v) => writeln!(out, "running on driver: {}", v)?,
            Err(e) => report(out, &e)?,
        }
    }

    writeln!(out, ">> testing kernel execution")?;
    if let Some(ctx) = &ctx {
        kernel_stage(ctx, config, out)?;
    }

    writeln!(out, ">> done")
}

/// Build the kernel and print the launch result, or the compile log and error.
fn kernel_stage<D: SmokeDevice, W: Write>(
    ctx: &D,
    config: &SmokeConfig,
    out: &mut W,
) -> io::Result<()> {
    let launch = config.launch.then_some(config.launch_threads);
    match ctx.build_kernel(&config.kernel, launch) {
        Ok(Some(report)) => {
            writeln!(out, "a_host (expected {}): {}", report.expected, report.value)?;
            writeln!(out, ">> kernel - {:.5} ms (wall clock)", report.wall_ms)?;
            if !report.passed() {
                tracing::warn!("kernel produced {} instead of {}", report.value, report.expected);
            }
            Ok(())
        }
        Ok(None) => Ok(()),
        Err(e) => {
            if let Some(log) = e.compile_log().filter(|l| !l.is_empty()) {
                writeln!(out, "{}", log)?;
            }
            report(out, &e)
        }
    }
}

fn report<W: Write>(out: &mut W, e: &OroError) -> io::Result<()> {
    writeln!(out, "ERROR==================\n{}", e)
}

#[cfg(test)]
mod tests {
    use super::*;
    use oro_runtime::rocm::RocmError;

    /// Runtime whose device answers every call with canned results.
    struct StubRuntime {
        open: Result<(), String>,
        device: StubDevice,
    }

    /// `kernel` is the launch outcome, or the compiler log of a failed compile.
    #[derive(Clone)]
    struct StubDevice {
        kernel: Result<Option<LaunchReport>, String>,
    }

    fn hip_error(context: &str) -> OroError {
        RocmError::Hip { code: 100, message: "no ROCm-capable device is detected".into(), context: context.into() }
            .into()
    }

    impl SmokeRuntime for StubRuntime {
        type Device = StubDevice;

        fn api(&self) -> Api {
            Api::Hip
        }

        fn open_context(&self, _ordinal: usize) -> Result<StubDevice, OroError> {
            match &self.open {
                Ok(()) => Ok(self.device.clone()),
                Err(context) => Err(hip_error(context)),
            }
        }
    }

    impl SmokeDevice for StubDevice {
        fn properties(&self) -> Result<DeviceProps, OroError> {
            Ok(DeviceProps { name: "Radeon Test".into(), arch_name: "gfx1100".into() })
        }

        fn driver_version(&self) -> Result<i32, OroError> {
            Err(hip_error("hipDriverGetVersion"))
        }

        fn build_kernel(
            &self,
            _kernel: &KernelSource,
            _launch: Option<u32>,
        ) -> Result<Option<LaunchReport>, OroError> {
            match &self.kernel {
                Ok(report) => Ok(report.clone()),
                Err(log) => Err(RocmError::Compile { program: "testKernel".into(), log: log.clone() }.into()),
            }
        }
    }

    fn run_stub(runtime: StubRuntime, config: &SmokeConfig) -> String {
        let mut out = Vec::new();
        run(Ok(runtime), config, &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("oro-smoke").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_default_backend_is_hip() {
        let config = build_config(&parse(&[])).unwrap();
        assert_eq!(config.api, Api::Hip);
        assert_eq!(config.kernel.options, vec!["-I ../".to_string()]);
    }

    #[test]
    fn test_backend_token() {
        assert_eq!(build_config(&parse(&["cuda"])).unwrap().api, Api::Cuda);
        assert_eq!(build_config(&parse(&["hip"])).unwrap().api, Api::Hip);
        assert_eq!(build_config(&parse(&["metal"])).unwrap().api, Api::Hip);
    }

    #[test]
    fn test_hyphenated_options() {
        let cli = parse(&["--option", "-I include", "--option", "-DFOO=1"]);
        let config = build_config(&cli).unwrap();
        assert_eq!(config.kernel.options, vec!["-I include".to_string(), "-DFOO=1".to_string()]);
    }

    #[test]
    fn test_launch_flags() {
        let config = build_config(&parse(&["--launch", "--threads", "128"])).unwrap();
        assert!(config.launch);
        assert_eq!(config.launch_threads, 128);
        assert!(build_config(&parse(&["--threads", "0"])).is_err());
    }

    #[test]
    fn test_config_file_backend_kept_without_token() {
        let path = std::env::temp_dir().join(format!("oro-smoke-test-{}.json", std::process::id()));
        std::fs::write(&path, r#"{"api": "cuda", "launch_threads": 32}"#).unwrap();
        let config = build_config(&parse(&["--config", path.to_str().unwrap()])).unwrap();
        assert_eq!(config.api, Api::Cuda);
        assert_eq!(config.launch_threads, 32);

        let config = build_config(&parse(&["hip", "--config", path.to_str().unwrap()])).unwrap();
        assert_eq!(config.api, Api::Hip);
        std::fs::remove_file(&path).unwrap();
    }

    #[cfg(not(feature = "cuda"))]
    #[test]
    fn test_cuda_without_feature_fails_initialization() {
        let config = SmokeConfig { api: Api::Cuda, ..Default::default() };
        let mut out = Vec::new();
        run(Runtime::initialize(config.api), &config, &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "initialization failed\n");
    }

    #[test]
    fn test_hip_run_markers() {
        let mut out = Vec::new();
        run(Runtime::initialize(Api::Hip), &SmokeConfig::default(), &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        if Runtime::initialize(Api::Hip).is_err() {
            assert_eq!(text, "initialization failed\n");
            return;
        }
        let markers: Vec<&str> = text.lines().filter(|l| l.starts_with(">>")).collect();
        assert_eq!(
            markers,
            vec![
                ">> executing on hip",
                ">> testing initialization",
                ">> testing device props",
                ">> testing kernel execution",
                ">> done",
            ]
        );
    }

    #[test]
    fn test_failed_context_still_reaches_done() {
        let runtime = StubRuntime {
            open: Err("hipDeviceGet".into()),
            device: StubDevice { kernel: Ok(None) },
        };
        let text = run_stub(runtime, &SmokeConfig::default());
        assert_eq!(
            text,
            ">> executing on hip\n\
             >> testing initialization\n\
             ERROR==================\n\
             HIP error 100 in hipDeviceGet: no ROCm-capable device is detected\n\
             >> testing device props\n\
             >> testing kernel execution\n\
             >> done\n"
        );
    }

    #[test]
    fn test_failed_query_ends_only_that_call() {
        let runtime = StubRuntime { open: Ok(()), device: StubDevice { kernel: Ok(None) } };
        let text = run_stub(runtime, &SmokeConfig::default());
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(
            lines,
            vec![
                ">> executing on hip",
                ">> testing initialization",
                ">> testing device props",
                "executing on Radeon Test (gfx1100)",
                "ERROR==================",
                "HIP error 100 in hipDriverGetVersion: no ROCm-capable device is detected",
                ">> testing kernel execution",
                ">> done",
            ]
        );
    }

    #[test]
    fn test_compile_log_printed_before_error() {
        let log = "testKernel.hip:1:52: error: use of undeclared identifier 'undeclared'";
        let runtime = StubRuntime {
            open: Ok(()),
            device: StubDevice {
                kernel: Err(log.into()),
            },
        };
        let text = run_stub(runtime, &SmokeConfig::default());
        let lines: Vec<&str> = text.lines().collect();
        let log_at = lines.iter().position(|l| *l == log).unwrap();
        let error_at = lines.iter().position(|l| *l == "ERROR==================").unwrap();
        let kernel_at = lines.iter().position(|l| *l == ">> testing kernel execution").unwrap();
        assert!(kernel_at < log_at && log_at < error_at, "{}", text);
        assert_eq!(lines[error_at + 1], "hiprtc compilation failed for 'testKernel'");
        assert_eq!(lines.last(), Some(&">> done"));
    }

    #[test]
    fn test_launch_report_lines() {
        let report = LaunchReport { threads: 64, value: 2016, expected: 2016, wall_ms: 0.25 };
        let runtime = StubRuntime { open: Ok(()), device: StubDevice { kernel: Ok(Some(report)) } };
        let config = SmokeConfig { launch: true, ..Default::default() };
        let text = run_stub(runtime, &config);
        assert!(text.contains("a_host (expected 2016): 2016\n>> kernel - 0.25000 ms (wall clock)\n"), "{}", text);
    }

    #[cfg(unix)]
    #[test]
    fn test_non_utf8_token_falls_back_to_hip() {
        use std::os::unix::ffi::OsStringExt;

        let args = vec![OsString::from("oro-smoke"), OsString::from_vec(vec![0x63, 0xff, 0x64])];
        let cli = Cli::try_parse_from(args).unwrap();
        assert_eq!(build_config(&cli).unwrap().api, Api::Hip);
    }

    #[test]
    fn test_report_format() {
        let mut out = Vec::new();
        report(&mut out, &OroError::Config("bad".into())).unwrap();
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "ERROR==================\ninvalid configuration: bad\n"
        );
    }
}
