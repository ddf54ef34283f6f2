//! Sink forwarding samples to the global `metrics` facade.
//!
//! Whatever recorder the host installed (Prometheus exporter, statsd, ...)
//! receives the samples. With no recorder installed the calls are no-ops.

use ::metrics::Label;

use super::{MetricSample, MetricsError, MetricsSink};

/// Records each sample as a histogram in seconds plus a `_total` counter.
#[derive(Debug, Clone, Copy, Default)]
pub struct FacadeSink;

impl MetricsSink for FacadeSink {
    fn record(&self, sample: &MetricSample) -> Result<(), MetricsError> {
        let labels: Vec<Label> = sample
            .tags
            .iter()
            .map(|(k, v)| Label::new(k.clone(), v.clone()))
            .collect();

        ::metrics::histogram!(sample.subject.clone(), labels.clone())
            .record(sample.duration.as_secs_f64());
        ::metrics::counter!(format!("{}_total", sample.subject), labels).increment(1);
        Ok(())
    }
}
