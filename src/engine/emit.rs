//! Where rendered messages go.
//!
//! The interceptor produces [`LogRecord`]s and hands them to a [`LogSink`].
//! [`TracingSink`] forwards into `tracing` under the `autolog` target;
//! [`MemorySink`] keeps them for inspection in tests and tools.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::config::Level;
use crate::template::{FieldMap, Phase, UNKNOWN_OWNER};

/// `tracing` target used for every emitted message.
pub const TARGET: &str = "autolog";

/// One message emitted for a call or step.
#[derive(Debug, Clone, PartialEq)]
pub struct LogRecord {
    pub level: Level,
    pub phase: Phase,
    pub message: String,
    pub method: String,
    pub owner: Option<String>,
    pub request_id: String,
    /// Error chain or panic payload, when stack traces are on.
    pub error_detail: Option<String>,
    /// Raw fields, present in structured mode.
    pub fields: Option<FieldMap>,
}

/// Destination for records. Implementations must tolerate concurrent calls.
pub trait LogSink: Send + Sync {
    fn emit(&self, record: &LogRecord);
}

impl<S: LogSink + ?Sized> LogSink for Arc<S> {
    fn emit(&self, record: &LogRecord) {
        (**self).emit(record)
    }
}

/// Forwards records to the installed `tracing` subscriber.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

macro_rules! forward {
    ($macro:ident, $record:expr, $fields:expr) => {
        tracing::$macro!(
            target: TARGET,
            request_id = %$record.request_id,
            method = %$record.method,
            developer = $record.owner.as_deref().unwrap_or(UNKNOWN_OWNER),
            phase = $record.phase.as_str(),
            error.detail = $record.error_detail.as_deref(),
            fields = $fields,
            "{}",
            $record.message
        )
    };
}

impl LogSink for TracingSink {
    fn emit(&self, record: &LogRecord) {
        let json = record.fields.as_ref().map(FieldMap::to_json);
        let fields = json.as_deref();
        match record.level {
            Level::Trace => forward!(trace, record, fields),
            Level::Debug => forward!(debug, record, fields),
            Level::Info => forward!(info, record, fields),
            Level::Warn => forward!(warn, record, fields),
            Level::Error => forward!(error, record, fields),
            Level::Off => {}
        }
    }
}

/// Keeps every record in memory.
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<LogRecord>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<LogRecord> {
        self.records.lock().clone()
    }

    pub fn messages(&self) -> Vec<String> {
        self.records.lock().iter().map(|r| r.message.clone()).collect()
    }

    /// Records of one phase, in emission order.
    pub fn phase(&self, phase: Phase) -> Vec<LogRecord> {
        self.records
            .lock()
            .iter()
            .filter(|r| r.phase == phase)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    pub fn clear(&self) {
        self.records.lock().clear();
    }
}

impl LogSink for MemorySink {
    fn emit(&self, record: &LogRecord) {
        self.records.lock().push(record.clone());
    }
}
