//! autolog-demo entry point.
//!
//! Runs a small service through the interceptor so the emitted messages and
//! metrics can be inspected.
//!
//! ## CLI Subcommands
//!
//! - `autolog-demo` or `autolog-demo run` - Run the demo scenarios (default)
//! - `autolog-demo config` - Print the effective configuration as TOML
//!
//! Configuration comes from `AUTOLOG_*` variables; logging from
//! `AUTOLOG_LOG_FORMAT`, `AUTOLOG_LOG_FILTER` and `AUTOLOG_LOG_FILE`.

use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use autolog::context::{self, Snapshot};
use autolog::{
    init_logging, Args, AutoLogAttrs, AutoLogConfig, CallSite, InstrumentationSpec, Interceptor, LogConfig,
    MetricsStore, StepSpec,
};
use thiserror::Error;

const MODULE: &str = "autolog_demo::service";

#[derive(Debug, Error)]
enum DemoError {
    #[error("Data cannot be blank")]
    BlankInput,
    #[error("Operation failed as requested")]
    Requested,
}

/// Demo service; every public operation goes through the interceptor.
struct DemoService {
    interceptor: Arc<Interceptor>,
    process: InstrumentationSpec,
    calculate: InstrumentationSpec,
    risky: InstrumentationSpec,
    validate: StepSpec,
    transform: StepSpec,
    generate_id: StepSpec,
}

impl DemoService {
    fn new(interceptor: Arc<Interceptor>) -> Self {
        let service = |method: &str| {
            CallSite::new(MODULE, "DemoService", method)
                .type_attrs(AutoLogAttrs::new())
                .type_owner("Akobir")
        };
        let process = interceptor.resolve(&service("process_data"));
        let calculate = interceptor
            .resolve(&service("calculate_result").method_attrs(AutoLogAttrs::new().condition("#debug == true")));
        let risky = interceptor.resolve(&service("risky_operation").method_owner("System"));

        Self {
            interceptor,
            process,
            calculate,
            risky,
            validate: StepSpec::new("DemoService.validate_data", "Validating input data").log_args(true),
            transform: StepSpec::new("DemoService.transform_data", "Processing data")
                .log_args(true)
                .log_return_value(true),
            generate_id: StepSpec::new("DemoService.generate_id", "Generating unique ID").log_return_value(true),
        }
    }

    async fn process_data(&self, data: &str) -> Result<String, DemoError> {
        let args = Args::new().arg("data", data);
        self.interceptor
            .guard_async(&self.process, &args, async {
                let _user = context::ScopeGuard::push([("userId", "user-123")]);

                self.interceptor
                    .step_async(&self.validate, &args, async {
                        tokio::time::sleep(Duration::from_millis(50)).await;
                        if data.trim().is_empty() {
                            return Err(DemoError::BlankInput);
                        }
                        Ok(())
                    })
                    .await?;

                let processed = self
                    .interceptor
                    .step_async(&self.transform, &args, async {
                        tokio::time::sleep(Duration::from_millis(100)).await;
                        Ok::<_, DemoError>(data.to_uppercase())
                    })
                    .await?;

                let id = self.interceptor.step(&self.generate_id, &Args::new(), || {
                    Ok::<_, DemoError>(context::new_correlation_id())
                })?;

                Ok::<_, DemoError>(format!("Processed: {} (ID: {})", processed, id))
            })
            .await
    }

    fn calculate_result(&self, a: i64, b: i64, debug: bool) -> Result<i64, DemoError> {
        let args = Args::new().arg("a", a).arg("b", b).arg("debug", debug);
        self.interceptor.guard(&self.calculate, &args, || {
            context::with_scope([("operation", "calculate".to_string()), ("debug", debug.to_string())], || {
                std::thread::sleep(Duration::from_millis(20));
                Ok(a + b)
            })
        })
    }

    async fn risky_operation(&self, should_fail: bool) -> Result<String, DemoError> {
        let args = Args::new().arg("should_fail", should_fail);
        self.interceptor
            .guard_async(&self.risky, &args, async {
                tokio::time::sleep(Duration::from_millis(150)).await;
                if should_fail {
                    return Err(DemoError::Requested);
                }
                Ok("Operation completed successfully".to_string())
            })
            .await
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();
    let command = args.get(1).map(|s| s.as_str()).unwrap_or("run");

    match command {
        "run" | "" => run_demo().await,
        "config" => {
            print!("{}", AutoLogConfig::from_env().to_toml_string());
            ExitCode::SUCCESS
        }
        "help" | "--help" | "-h" => {
            print_usage();
            ExitCode::SUCCESS
        }
        _ => {
            eprintln!("Unknown command: {}", command);
            print_usage();
            ExitCode::FAILURE
        }
    }
}

async fn run_demo() -> ExitCode {
    if let Err(e) = init_logging(&LogConfig::from_env()) {
        eprintln!("Logging setup failed: {}", e);
        return ExitCode::FAILURE;
    }

    let config = AutoLogConfig {
        metrics_enabled: true,
        ..AutoLogConfig::from_env()
    };
    let store = Arc::new(MetricsStore::new());
    let interceptor = Arc::new(Interceptor::builder(config).metrics_sink(store.clone()).build());
    let service = DemoService::new(interceptor);

    // Same handling an HTTP layer would give an inbound X-Request-Id header.
    let inbound = std::env::var("AUTOLOG_DEMO_REQUEST_ID").ok();
    let request = context::with_correlation_id(inbound.as_deref(), Snapshot::capture);
    let request = request.scope(async {
        match service.process_data("hello world").await {
            Ok(result) => println!("process_data: {}", result),
            Err(e) => println!("process_data failed: {}", e),
        }
        if let Err(e) = service.process_data("   ").await {
            println!("process_data failed: {}", e);
        }
        for debug in [false, true] {
            match service.calculate_result(2, 3, debug) {
                Ok(sum) => println!("calculate_result(debug={}): {}", debug, sum),
                Err(e) => println!("calculate_result failed: {}", e),
            }
        }
        for should_fail in [false, true] {
            match service.risky_operation(should_fail).await {
                Ok(result) => println!("risky_operation: {}", result),
                Err(e) => println!("risky_operation failed: {}", e),
            }
        }
    });
    request.await;

    match serde_json::to_string_pretty(&store.snapshot()) {
        Ok(json) => {
            println!("{}", json);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Failed to render metrics: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn print_usage() {
    eprintln!("Usage: autolog-demo [run|config|help]");
}
