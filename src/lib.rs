//! AutoLog
//!
//! Declarative call instrumentation: wrap a function or future with a
//! resolved spec and get entry, exit and error messages, duration metrics and
//! a correlation id that follows the logical call.
//!
//! # Components
//!
//! - **context**: call-scoped key/value store with RAII push/pop, correlation
//!   ids, and carriers for threads and async tasks
//! - **predicate**: the closed `#var == value` gating language, fail-closed
//! - **template**: `{{placeholder}}` rendering of lifecycle messages
//! - **metrics**: duration samples routed to the `metrics` facade or an
//!   in-process store
//! - **engine**: the [`Interceptor`] state machine, steps and call-site specs
//!
//! # Guarantees
//!
//! - The guarded call's value, error and panic reach the caller unchanged.
//! - Instrumentation problems (bad predicates, sink failures) never surface
//!   to the guarded call.
//! - Context keys touched by a scope are restored on every exit path.
//!
//! ```
//! use autolog::{AutoLogConfig, Args, CallSite, Interceptor};
//!
//! let interceptor = Interceptor::new(AutoLogConfig::default());
//! let spec = interceptor.resolve(&CallSite::new("app::billing", "Invoices", "total"));
//! let total: Result<u32, String> =
//!     interceptor.guard(&spec, &Args::new().arg("customer", "acme"), || Ok(42));
//! assert_eq!(total, Ok(42));
//! ```

pub mod config;
pub mod context;
pub mod engine;
pub mod logging;
pub mod metrics;
pub mod predicate;
pub mod template;
pub mod value;

pub use config::{AutoLogConfig, ConfigError, Level, PhaseLevels, Templates};
pub use engine::{
    AutoLogAttrs, CallSite, InstrumentationSpec, Interceptor, InterceptorBuilder, LogRecord, LogSink,
    MemorySink, SpecRegistry, StepSpec, TracingSink,
};
pub use logging::{init_logging, LogConfig, LogError, LogFormat};
pub use metrics::{MetricsRecorder, MetricsSink, MetricsStore};
pub use predicate::{evaluate, Predicate, PredicateError};
pub use template::{render, Phase, RenderInput};
pub use value::{Args, Shown, ToValue, Value};
