//! Duration metrics for guarded calls and steps.
//!
//! The recorder turns each finished call into a [`MetricSample`] and hands it
//! to a [`MetricsSink`]. Sinks are the only state shared between concurrent
//! calls, so every sink must be internally synchronized.
//!
//! # Metrics
//! - `autolog_method_duration_seconds` (histogram): guarded call latency,
//!   labels `method`, `success`, `developer`
//! - `autolog_method_duration_seconds_step` (histogram): step latency,
//!   labels `method`, `step`, `success`, `developer`
//!
//! Sink failures never reach the guarded call: errors are logged at `debug`
//! and panics inside a sink are contained.

mod facade;
mod store;

pub use facade::FacadeSink;
pub use store::{HistogramSummary, MetricsSnapshot, MetricsStore};

use std::collections::BTreeMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::debug;

use crate::template::UNKNOWN_OWNER;

/// Subject for guarded-call samples.
pub const METHOD_DURATION: &str = "autolog_method_duration_seconds";
/// Subject for step samples.
pub const STEP_DURATION: &str = "autolog_method_duration_seconds_step";

/// Tag names attached to every sample.
pub const TAG_METHOD: &str = "method";
pub const TAG_STEP: &str = "step";
pub const TAG_SUCCESS: &str = "success";
pub const TAG_DEVELOPER: &str = "developer";

pub type Tags = BTreeMap<String, String>;

/// One finished measurement.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricSample {
    pub subject: String,
    pub duration: Duration,
    pub success: bool,
    pub tags: Tags,
}

/// Errors a metrics backend may report.
#[derive(Debug, Error)]
pub enum MetricsError {
    #[error("Metrics backend unavailable: {0}")]
    Unavailable(String),
    #[error("Metrics backend rejected sample {subject}: {reason}")]
    Rejected { subject: String, reason: String },
}

/// Destination for samples. Implementations must tolerate concurrent calls.
pub trait MetricsSink: Send + Sync {
    fn record(&self, sample: &MetricSample) -> Result<(), MetricsError>;
}

impl<S: MetricsSink + ?Sized> MetricsSink for Arc<S> {
    fn record(&self, sample: &MetricSample) -> Result<(), MetricsError> {
        (**self).record(sample)
    }
}

/// Front door for recording durations.
#[derive(Clone)]
pub struct MetricsRecorder {
    sink: Arc<dyn MetricsSink>,
}

impl std::fmt::Debug for MetricsRecorder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MetricsRecorder").finish_non_exhaustive()
    }
}

impl MetricsRecorder {
    pub fn new(sink: Arc<dyn MetricsSink>) -> Self {
        Self { sink }
    }

    /// Recorder backed by the global `metrics` facade.
    pub fn facade() -> Self {
        Self::new(Arc::new(FacadeSink))
    }

    /// Record one sample. A `success` tag is added from the flag.
    pub fn record_duration(&self, subject: &str, duration: Duration, success: bool, tags: Tags) {
        let mut tags = tags;
        tags.insert(TAG_SUCCESS.to_string(), success.to_string());
        let sample = MetricSample {
            subject: subject.to_string(),
            duration,
            success,
            tags,
        };
        let outcome = catch_unwind(AssertUnwindSafe(|| self.sink.record(&sample)));
        match outcome {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!(subject = %sample.subject, error = %e, "metrics sample dropped"),
            Err(_) => debug!(subject = %sample.subject, "metrics sink panicked, sample dropped"),
        }
    }

    /// Guarded-call sample.
    pub fn record_method(&self, method: &str, duration: Duration, success: bool, owner: Option<&str>) {
        let mut tags = Tags::new();
        tags.insert(TAG_METHOD.to_string(), method.to_string());
        tags.insert(TAG_DEVELOPER.to_string(), owner.unwrap_or(UNKNOWN_OWNER).to_string());
        self.record_duration(METHOD_DURATION, duration, success, tags);
    }

    /// Step sample, namespaced apart from call samples.
    pub fn record_step(
        &self,
        method: &str,
        step: &str,
        duration: Duration,
        success: bool,
        owner: Option<&str>,
    ) {
        let mut tags = Tags::new();
        tags.insert(TAG_METHOD.to_string(), method.to_string());
        tags.insert(TAG_STEP.to_string(), step.to_string());
        tags.insert(TAG_DEVELOPER.to_string(), owner.unwrap_or(UNKNOWN_OWNER).to_string());
        self.record_duration(STEP_DURATION, duration, success, tags);
    }
}
