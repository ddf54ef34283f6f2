//! Interception engine for AutoLog.
//!
//! [`Interceptor`] wraps a guarded call (a closure or a future) with entry,
//! exit and error messages plus a duration sample, following one spec per
//! call site:
//!
//! 1. Gate: the spec's condition, then the package filter. A closed gate runs
//!    the call untouched.
//! 2. Entry message, start of the monotonic timer.
//! 3. The call itself.
//! 4. Success: metric sample, exit message, value returned as is.
//!    Failure: metric sample, error message, error returned as is. A panic is
//!    reported the same way and then resumed with its original payload.
//!
//! Steps are sub-operations of the innermost guarded call. They inherit its
//! gate: inside a skipped call a step is silent, outside any call it reports
//! on its own.

mod emit;
mod invocation;
mod registry;
mod spec;

pub use emit::{LogRecord, LogSink, MemorySink, TracingSink, TARGET};
pub use invocation::{CallState, InvocationContext, StepRecord, StepSpec};
pub use registry::SpecRegistry;
pub use spec::{AutoLogAttrs, CallSite, Condition, InstrumentationSpec, PackageFilter};

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::panic::{catch_unwind, resume_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;

use crate::config::{AutoLogConfig, Level};
use crate::context::{self, CallFrame, InCall, Snapshot};
use crate::metrics::{MetricsRecorder, MetricsSink};
use crate::template::{self, FieldMap, Phase, RenderInput};
use crate::value::{Args, ToValue, Value};

type Panic = Box<dyn Any + Send + 'static>;

/// Exception text used when an async guarded call is dropped before it
/// completes.
pub const CANCELLED: &str = "cancelled";

/// Instruments guarded calls and steps.
///
/// Cheap to share behind an `Arc`; holds no per-call state.
pub struct Interceptor {
    config: Arc<AutoLogConfig>,
    sink: Arc<dyn LogSink>,
    metrics: Option<MetricsRecorder>,
    registry: SpecRegistry,
}

impl fmt::Debug for Interceptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Interceptor")
            .field("config", &self.config)
            .field("metrics", &self.metrics.is_some())
            .field("registered", &self.registry.len())
            .finish_non_exhaustive()
    }
}

/// Builder for [`Interceptor`].
pub struct InterceptorBuilder {
    config: AutoLogConfig,
    sink: Option<Arc<dyn LogSink>>,
    metrics: Option<MetricsRecorder>,
}

impl InterceptorBuilder {
    /// Replace the default [`TracingSink`].
    pub fn sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Replace the default facade recorder. Ignored unless
    /// `metrics_enabled` is set.
    pub fn metrics(mut self, recorder: MetricsRecorder) -> Self {
        self.metrics = Some(recorder);
        self
    }

    pub fn metrics_sink(self, sink: Arc<dyn MetricsSink>) -> Self {
        self.metrics(MetricsRecorder::new(sink))
    }

    pub fn build(self) -> Interceptor {
        let metrics = if self.config.metrics_enabled {
            Some(self.metrics.unwrap_or_else(MetricsRecorder::facade))
        } else {
            None
        };
        Interceptor {
            config: Arc::new(self.config),
            sink: self.sink.unwrap_or_else(|| Arc::new(TracingSink)),
            metrics,
            registry: SpecRegistry::new(),
        }
    }
}

impl Interceptor {
    pub fn new(config: AutoLogConfig) -> Self {
        Self::builder(config).build()
    }

    pub fn builder(config: AutoLogConfig) -> InterceptorBuilder {
        InterceptorBuilder {
            config,
            sink: None,
            metrics: None,
        }
    }

    pub fn config(&self) -> &AutoLogConfig {
        &self.config
    }

    pub fn registry(&self) -> &SpecRegistry {
        &self.registry
    }

    /// Resolve and store the spec for `site`. Unannotated sites return `None`.
    pub fn register(&self, site: &CallSite) -> Option<Arc<InstrumentationSpec>> {
        self.registry.register(site, &self.config)
    }

    /// Resolve `site` without registering it.
    pub fn resolve(&self, site: &CallSite) -> InstrumentationSpec {
        InstrumentationSpec::resolve(site, &self.config)
    }

    /// Run `call` under `spec`.
    ///
    /// The result, error and panic payload of `call` reach the caller
    /// unchanged.
    pub fn guard<T, E, F>(&self, spec: &InstrumentationSpec, args: &Args, call: F) -> Result<T, E>
    where
        F: FnOnce() -> Result<T, E>,
        T: ToValue,
        E: fmt::Display + fmt::Debug,
    {
        if !self.config.enabled {
            return call();
        }
        if !spec.should_instrument(args) {
            let _frame = context::enter_call(CallFrame::suppressed(&spec.method));
            return call();
        }

        let mut invocation = self.enter(spec, args);
        let outcome = {
            let _frame = context::enter_call(CallFrame::entered(&spec.method, spec.owner.as_deref()));
            catch_unwind(AssertUnwindSafe(call))
        };
        self.settle_call(&mut invocation, outcome)
    }

    /// [`guard`](Self::guard) for a registered site. An unknown key runs
    /// `call` untouched.
    pub fn guard_registered<T, E, F>(&self, key: &str, args: &Args, call: F) -> Result<T, E>
    where
        F: FnOnce() -> Result<T, E>,
        T: ToValue,
        E: fmt::Display + fmt::Debug,
    {
        match self.registry.get(key) {
            Some(spec) => self.guard(&spec, args, call),
            None => call(),
        }
    }

    /// Async form of [`guard`](Self::guard).
    ///
    /// An instrumented call runs inside its own [`WithContext`](context::WithContext):
    /// the call frame and correlation id travel with the future rather than
    /// the worker thread, and context writes made by the future stay with it.
    /// A call skipped by its gate is awaited in place, so its writes behave
    /// like a plain `.await`.
    ///
    /// Without an inherited correlation id a fresh one is generated for the
    /// call alone; a bare worker thread never keeps it. Dropping the returned
    /// future before completion reports the call as failed with
    /// [`CANCELLED`].
    pub async fn guard_async<T, E, Fut>(&self, spec: &InstrumentationSpec, args: &Args, future: Fut) -> Result<T, E>
    where
        Fut: Future<Output = Result<T, E>>,
        T: ToValue,
        E: fmt::Display + fmt::Debug,
    {
        if !self.config.enabled {
            return future.await;
        }
        if !spec.should_instrument(args) {
            return InCall::new(CallFrame::suppressed(&spec.method), future).await;
        }

        let snapshot = Snapshot::for_task();
        let mut pending = PendingCall {
            interceptor: self,
            invocation: snapshot.attach(|| self.enter(spec, args)),
            armed: true,
        };
        let outcome = snapshot
            .with_call(CallFrame::entered(&spec.method, spec.owner.as_deref()))
            .scope(AssertUnwindSafe(future).catch_unwind())
            .await;
        pending.armed = false;
        self.settle_call(&mut pending.invocation, outcome)
    }

    /// Run a named step of the innermost guarded call.
    pub fn step<T, E, F>(&self, step: &StepSpec, args: &Args, body: F) -> Result<T, E>
    where
        F: FnOnce() -> Result<T, E>,
        T: ToValue,
        E: fmt::Display + fmt::Debug,
    {
        let Some(mut record) = self.enter_step(step, args) else {
            return body();
        };
        let outcome = catch_unwind(AssertUnwindSafe(body));
        self.settle_step(&mut record, outcome)
    }

    /// Async form of [`step`](Self::step).
    pub async fn step_async<T, E, Fut>(&self, step: &StepSpec, args: &Args, future: Fut) -> Result<T, E>
    where
        Fut: Future<Output = Result<T, E>>,
        T: ToValue,
        E: fmt::Display + fmt::Debug,
    {
        let Some(record) = Snapshot::for_task().attach(|| self.enter_step(step, args)) else {
            return future.await;
        };
        let mut pending = PendingStep {
            interceptor: self,
            record,
            armed: true,
        };
        let outcome = AssertUnwindSafe(future).catch_unwind().await;
        pending.armed = false;
        self.settle_step(&mut pending.record, outcome)
    }

    fn enter<'s>(&self, spec: &'s InstrumentationSpec, args: &Args) -> InvocationContext<'s> {
        let args_text = if spec.log_args { args.joined() } else { String::new() };
        let invocation = InvocationContext::begin(spec, args_text);
        let input = RenderInput {
            method: invocation.method(),
            args: invocation.args(),
            owner: invocation.owner(),
            request_id: Some(invocation.correlation_id()),
            ..Default::default()
        };
        self.emit(
            spec.levels.entry,
            Phase::Entry,
            &spec.templates.entry,
            &input,
            invocation.scope(),
            None,
        );
        invocation
    }

    fn settle_call<T, E>(
        &self,
        invocation: &mut InvocationContext<'_>,
        outcome: Result<Result<T, E>, Panic>,
    ) -> Result<T, E>
    where
        T: ToValue,
        E: fmt::Display + fmt::Debug,
    {
        match outcome {
            Ok(Ok(value)) => {
                self.succeed_call(invocation, &value);
                Ok(value)
            }
            Ok(Err(err)) => {
                self.fail_call(invocation, &err.to_string(), Some(format!("{:?}", err)));
                Err(err)
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                self.fail_call(invocation, &message, Some(format!("panicked: {}", message)));
                resume_unwind(payload)
            }
        }
    }

    fn succeed_call<T: ToValue>(&self, invocation: &mut InvocationContext<'_>, value: &T) {
        let duration = invocation.finish(true);
        let spec = invocation.spec();
        self.record_method(spec, duration, true);

        let returned = spec.log_return_value.then(|| capture_value(value));
        let input = RenderInput {
            method: invocation.method(),
            args: invocation.args(),
            return_value: returned.as_ref(),
            duration: Some(duration),
            owner: invocation.owner(),
            request_id: Some(invocation.correlation_id()),
            ..Default::default()
        };
        self.emit(spec.levels.exit, Phase::Exit, &spec.templates.exit, &input, invocation.scope(), None);
    }

    fn fail_call(&self, invocation: &mut InvocationContext<'_>, exception: &str, detail: Option<String>) {
        let duration = invocation.finish(false);
        let spec = invocation.spec();
        self.record_method(spec, duration, false);

        let input = RenderInput {
            method: invocation.method(),
            args: invocation.args(),
            duration: Some(duration),
            owner: invocation.owner(),
            request_id: Some(invocation.correlation_id()),
            exception: Some(exception),
            ..Default::default()
        };
        let detail = detail.filter(|_| spec.log_exception_stacktrace);
        self.emit(spec.levels.error, Phase::Error, &spec.templates.error, &input, invocation.scope(), detail);
    }

    /// `None` when the step must stay silent.
    fn enter_step<'s>(&self, step: &'s StepSpec, args: &Args) -> Option<StepRecord<'s>> {
        if !self.config.enabled {
            return None;
        }
        let parent = context::current_call();
        if parent.as_ref().is_some_and(|frame| frame.suppressed) {
            return None;
        }
        let (parent_method, parent_owner) = match parent {
            Some(frame) => (Some(frame.method.to_string()), frame.owner.map(|o| o.to_string())),
            None => (None, None),
        };
        let record = StepRecord::begin(step, parent_method, parent_owner);

        if step.log_args {
            let args_text = args.joined();
            let input = RenderInput {
                method: &step.method,
                args: &args_text,
                owner: record.owner(),
                request_id: Some(record.correlation_id()),
                description: Some(&step.description),
                ..Default::default()
            };
            self.emit(
                self.config.level.step,
                Phase::StepEntry,
                &self.config.template.step_entry,
                &input,
                record.scope(),
                None,
            );
        }
        Some(record)
    }

    fn settle_step<T, E>(&self, record: &mut StepRecord<'_>, outcome: Result<Result<T, E>, Panic>) -> Result<T, E>
    where
        T: ToValue,
        E: fmt::Display + fmt::Debug,
    {
        match outcome {
            Ok(Ok(value)) => {
                self.succeed_step(record, &value);
                Ok(value)
            }
            Ok(Err(err)) => {
                self.fail_step(record, &err.to_string(), Some(format!("{:?}", err)));
                Err(err)
            }
            Err(payload) => {
                let message = panic_message(payload.as_ref());
                self.fail_step(record, &message, Some(format!("panicked: {}", message)));
                resume_unwind(payload)
            }
        }
    }

    fn succeed_step<T: ToValue>(&self, record: &mut StepRecord<'_>, value: &T) {
        let duration = record.elapsed();
        let step = record.spec();
        self.record_step(record, duration, true);

        let returned = step.log_return_value.then(|| capture_value(value));
        let input = RenderInput {
            method: &step.method,
            return_value: returned.as_ref(),
            duration: Some(duration),
            owner: record.owner(),
            request_id: Some(record.correlation_id()),
            description: Some(&step.description),
            ..Default::default()
        };
        self.emit(
            self.config.level.step,
            Phase::Step,
            &self.config.template.step,
            &input,
            record.scope(),
            None,
        );
    }

    fn fail_step(&self, record: &mut StepRecord<'_>, exception: &str, detail: Option<String>) {
        let duration = record.elapsed();
        let step = record.spec();
        self.record_step(record, duration, false);

        let input = RenderInput {
            method: &step.method,
            duration: Some(duration),
            owner: record.owner(),
            request_id: Some(record.correlation_id()),
            exception: Some(exception),
            description: Some(&step.description),
            ..Default::default()
        };
        let detail = detail.filter(|_| self.config.log_exception_stacktrace);
        self.emit(
            self.config.level.error,
            Phase::StepError,
            &self.config.template.step_error,
            &input,
            record.scope(),
            detail,
        );
    }

    fn record_method(&self, spec: &InstrumentationSpec, duration: Duration, success: bool) {
        if let Some(metrics) = &self.metrics {
            metrics.record_method(&spec.method, duration, success, spec.owner.as_deref());
        }
    }

    fn record_step(&self, record: &StepRecord<'_>, duration: Duration, success: bool) {
        if let Some(metrics) = &self.metrics {
            let step = record.spec();
            metrics.record_step(&step.method, &step.description, duration, success, record.owner());
        }
    }

    /// Render and hand one message to the sink. Never panics into the caller.
    fn emit(
        &self,
        level: Level,
        phase: Phase,
        template_text: &str,
        input: &RenderInput<'_>,
        extras: &BTreeMap<String, String>,
        error_detail: Option<String>,
    ) {
        if level == Level::Off {
            return;
        }
        let delivered = catch_unwind(AssertUnwindSafe(|| {
            let record = LogRecord {
                level,
                phase,
                message: template::render(phase, template_text, input, extras),
                method: input.method.to_string(),
                owner: input.owner.map(str::to_string),
                request_id: input
                    .request_id
                    .map(str::to_string)
                    .unwrap_or_else(context::correlation_id),
                error_detail,
                fields: self
                    .config
                    .structured_logging
                    .then(|| FieldMap::from_input(phase, input)),
            };
            self.sink.emit(&record);
        }));
        if delivered.is_err() {
            tracing::debug!(method = %input.method, phase = phase.as_str(), "log sink panicked, message dropped");
        }
    }
}

/// Reports an async call as cancelled if dropped while still armed.
struct PendingCall<'a, 's> {
    interceptor: &'a Interceptor,
    invocation: InvocationContext<'s>,
    armed: bool,
}

impl Drop for PendingCall<'_, '_> {
    fn drop(&mut self) {
        if self.armed {
            self.interceptor.fail_call(&mut self.invocation, CANCELLED, None);
        }
    }
}

struct PendingStep<'a, 's> {
    interceptor: &'a Interceptor,
    record: StepRecord<'s>,
    armed: bool,
}

impl Drop for PendingStep<'_, '_> {
    fn drop(&mut self) {
        if self.armed {
            self.interceptor.fail_step(&mut self.record, CANCELLED, None);
        }
    }
}

/// `to_value` under a panic guard; a failing conversion renders as null.
fn capture_value<T: ToValue>(value: &T) -> Value {
    catch_unwind(AssertUnwindSafe(|| value.to_value())).unwrap_or(Value::Null)
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic".to_string()
    }
}
