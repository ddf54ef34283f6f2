//! Per-invocation bookkeeping.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use crate::context;

use super::spec::InstrumentationSpec;

/// Lifecycle of one guarded call.
///
/// `NotStarted -> Entered -> Succeeded | Failed`. A gated-off call never
/// leaves `NotStarted`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    NotStarted,
    Entered,
    Succeeded,
    Failed,
}

/// One in-flight guarded call. Exclusively owned by the interceptor for its
/// duration; nothing here is shared between calls.
#[derive(Debug)]
pub struct InvocationContext<'s> {
    spec: &'s InstrumentationSpec,
    args_text: String,
    started: Instant,
    correlation_id: String,
    scope: BTreeMap<String, String>,
    state: CallState,
}

impl<'s> InvocationContext<'s> {
    /// Start timing now; captures the correlation id and the visible scope.
    pub fn begin(spec: &'s InstrumentationSpec, args_text: String) -> Self {
        let correlation_id = context::correlation_id();
        Self {
            spec,
            args_text,
            started: Instant::now(),
            correlation_id,
            scope: context::entries(),
            state: CallState::Entered,
        }
    }

    pub fn spec(&self) -> &'s InstrumentationSpec {
        self.spec
    }

    pub fn method(&self) -> &str {
        &self.spec.method
    }

    pub fn owner(&self) -> Option<&str> {
        self.spec.owner.as_deref()
    }

    pub fn args(&self) -> &str {
        &self.args_text
    }

    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    /// Context keys visible when the call began.
    pub fn scope(&self) -> &BTreeMap<String, String> {
        &self.scope
    }

    pub fn state(&self) -> CallState {
        self.state
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub(crate) fn finish(&mut self, success: bool) -> Duration {
        self.state = if success {
            CallState::Succeeded
        } else {
            CallState::Failed
        };
        self.elapsed()
    }
}

/// Declaration of a named step inside a guarded call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepSpec {
    /// `Type.method` of the step function itself.
    pub method: String,
    pub description: String,
    pub log_args: bool,
    pub log_return_value: bool,
    pub owner: Option<String>,
}

impl StepSpec {
    pub fn new(method: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            description: description.into(),
            log_args: false,
            log_return_value: false,
            owner: None,
        }
    }

    pub fn log_args(mut self, on: bool) -> Self {
        self.log_args = on;
        self
    }

    pub fn log_return_value(mut self, on: bool) -> Self {
        self.log_return_value = on;
        self
    }

    pub fn owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }
}

/// One in-flight step, attached to the innermost guarded call if there is one.
#[derive(Debug)]
pub struct StepRecord<'s> {
    spec: &'s StepSpec,
    parent: Option<String>,
    owner: Option<String>,
    correlation_id: String,
    scope: BTreeMap<String, String>,
    started: Instant,
}

impl<'s> StepRecord<'s> {
    pub(crate) fn begin(spec: &'s StepSpec, parent: Option<String>, parent_owner: Option<String>) -> Self {
        Self {
            spec,
            parent,
            owner: spec.owner.clone().or(parent_owner),
            correlation_id: context::correlation_id(),
            scope: context::entries(),
            started: Instant::now(),
        }
    }

    pub fn spec(&self) -> &'s StepSpec {
        self.spec
    }

    pub fn description(&self) -> &str {
        &self.spec.description
    }

    /// Display name of the enclosing guarded call.
    pub fn parent(&self) -> Option<&str> {
        self.parent.as_deref()
    }

    /// Step owner, falling back to the enclosing call's owner.
    pub fn owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }

    pub fn correlation_id(&self) -> &str {
        &self.correlation_id
    }

    pub fn scope(&self) -> &BTreeMap<String, String> {
        &self.scope
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }
}
