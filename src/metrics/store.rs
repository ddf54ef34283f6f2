//! Thread-safe in-process metrics storage.
//!
//! Complements the `metrics` facade for callers that want to read samples back
//! (tests, admin endpoints, the demo binary) without installing a recorder.
//! Series are keyed by subject plus sorted tags, e.g.
//! `autolog_method_duration_seconds{developer=unknown,method=Svc.run,success=true}`.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};

use super::{MetricSample, MetricsError, MetricsSink, Tags};

/// Snapshot of all series at a point in time.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetricsSnapshot {
    pub counters: HashMap<String, u64>,
    pub histograms: HashMap<String, HistogramSummary>,
}

/// Summary statistics for a duration histogram, in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistogramSummary {
    pub count: u64,
    pub sum: f64,
    pub min: f64,
    pub max: f64,
}

/// Histogram cell with atomic fields.
struct HistogramData {
    count: AtomicU64,
    sum: AtomicU64, // f64 bits stored as u64
    min: AtomicU64, // f64 bits stored as u64
    max: AtomicU64, // f64 bits stored as u64
}

impl HistogramData {
    fn new() -> Self {
        Self {
            count: AtomicU64::new(0),
            sum: AtomicU64::new(f64::to_bits(0.0)),
            min: AtomicU64::new(f64::to_bits(f64::MAX)),
            max: AtomicU64::new(f64::to_bits(f64::MIN)),
        }
    }

    fn record(&self, value: f64) {
        self.count.fetch_add(1, Ordering::Relaxed);
        update_f64(&self.sum, |current| Some(current + value));
        update_f64(&self.min, |current| (value < current).then_some(value));
        update_f64(&self.max, |current| (value > current).then_some(value));
    }

    fn to_summary(&self) -> HistogramSummary {
        let count = self.count.load(Ordering::Relaxed);
        let sum = f64::from_bits(self.sum.load(Ordering::Relaxed));
        let min = f64::from_bits(self.min.load(Ordering::Relaxed));
        let max = f64::from_bits(self.max.load(Ordering::Relaxed));

        HistogramSummary {
            count,
            sum,
            min: if count == 0 { 0.0 } else { min },
            max: if count == 0 { 0.0 } else { max },
        }
    }
}

/// CAS loop over an f64 stored as bits. `next` returns `None` to leave it.
fn update_f64(atomic: &AtomicU64, next: impl Fn(f64) -> Option<f64>) {
    let _ = atomic.fetch_update(Ordering::Relaxed, Ordering::Relaxed, |bits| {
        next(f64::from_bits(bits)).map(f64::to_bits)
    });
}

/// Build the series key for a subject and its tags.
pub fn series_key(subject: &str, tags: &Tags) -> String {
    if tags.is_empty() {
        return subject.to_string();
    }
    let labels = tags
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(",");
    format!("{}{{{}}}", subject, labels)
}

/// In-process sink keeping histograms, outcome counters and the raw samples.
pub struct MetricsStore {
    counters: RwLock<HashMap<String, AtomicU64>>,
    histograms: RwLock<HashMap<String, HistogramData>>,
    samples: Mutex<VecDeque<MetricSample>>,
    max_samples: usize,
}

impl MetricsStore {
    /// Default cap on retained raw samples.
    pub const DEFAULT_MAX_SAMPLES: usize = 10_000;

    pub fn new() -> Self {
        Self::with_capacity(Self::DEFAULT_MAX_SAMPLES)
    }

    /// Keep at most `max_samples` raw samples; older ones are dropped first.
    pub fn with_capacity(max_samples: usize) -> Self {
        Self {
            counters: RwLock::new(HashMap::new()),
            histograms: RwLock::new(HashMap::new()),
            samples: Mutex::new(VecDeque::new()),
            max_samples,
        }
    }

    /// Increment a counter by the given value.
    pub fn increment_counter(&self, name: &str, value: u64) {
        {
            let counters = self.counters.read();
            if let Some(counter) = counters.get(name) {
                counter.fetch_add(value, Ordering::Relaxed);
                return;
            }
        }
        self.counters
            .write()
            .entry(name.to_string())
            .or_insert_with(|| AtomicU64::new(0))
            .fetch_add(value, Ordering::Relaxed);
    }

    /// Record a histogram observation.
    pub fn record_histogram(&self, name: &str, value: f64) {
        {
            let histograms = self.histograms.read();
            if let Some(histogram) = histograms.get(name) {
                histogram.record(value);
                return;
            }
        }
        self.histograms
            .write()
            .entry(name.to_string())
            .or_insert_with(HistogramData::new)
            .record(value);
    }

    /// Copy of the retained raw samples, oldest first.
    pub fn samples(&self) -> Vec<MetricSample> {
        self.samples.lock().iter().cloned().collect()
    }

    /// Samples for one subject.
    pub fn samples_for(&self, subject: &str) -> Vec<MetricSample> {
        self.samples
            .lock()
            .iter()
            .filter(|s| s.subject == subject)
            .cloned()
            .collect()
    }

    /// Drop everything recorded so far.
    pub fn clear(&self) {
        self.counters.write().clear();
        self.histograms.write().clear();
        self.samples.lock().clear();
    }

    /// Take a snapshot of all series.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let counters = self.counters.read();
        let histograms = self.histograms.read();

        MetricsSnapshot {
            counters: counters
                .iter()
                .map(|(k, v)| (k.clone(), v.load(Ordering::Relaxed)))
                .collect(),
            histograms: histograms
                .iter()
                .map(|(k, v)| (k.clone(), v.to_summary()))
                .collect(),
        }
    }
}

impl Default for MetricsStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsSink for MetricsStore {
    fn record(&self, sample: &MetricSample) -> Result<(), MetricsError> {
        let key = series_key(&sample.subject, &sample.tags);
        self.record_histogram(&key, sample.duration.as_secs_f64());
        self.increment_counter(&format!("{}_count", key), 1);

        let mut samples = self.samples.lock();
        if self.max_samples == 0 {
            return Ok(());
        }
        if samples.len() >= self.max_samples {
            samples.pop_front();
        }
        samples.push_back(sample.clone());
        Ok(())
    }
}
