//! Message templates for AutoLog.
//!
//! Templates are plain text with `{{name}}` placeholders. Rendering is literal
//! substitution, nothing more: no conditionals, no escaping, no formatting
//! options. Placeholders the phase does not know are left in place.

use std::borrow::Cow;
use std::collections::BTreeMap;
use std::sync::OnceLock;
use std::time::Duration;

use regex::{Captures, Regex};
use serde::Serialize;

use crate::context;
use crate::value::Value;

/// Rendered in place of a missing owner tag.
pub const UNKNOWN_OWNER: &str = "unknown";

/// Text for absent values.
pub const NULL: &str = "null";

/// Which message of the call lifecycle is being rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Entry,
    Exit,
    Error,
    StepEntry,
    Step,
    StepError,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Entry => "entry",
            Self::Exit => "exit",
            Self::Error => "error",
            Self::StepEntry => "step_entry",
            Self::Step => "step",
            Self::StepError => "step_error",
        }
    }

    fn has_exception(&self) -> bool {
        matches!(self, Self::Error | Self::StepError)
    }

    fn has_description(&self) -> bool {
        matches!(self, Self::StepEntry | Self::Step | Self::StepError)
    }
}

/// Invocation data a template may draw from.
#[derive(Debug, Clone, Default)]
pub struct RenderInput<'a> {
    /// `Type.method` display name.
    pub method: &'a str,
    /// Joined argument text; empty when argument logging is off.
    pub args: &'a str,
    /// Return value, present only when return logging is on.
    pub return_value: Option<&'a Value>,
    pub duration: Option<Duration>,
    pub owner: Option<&'a str>,
    /// Correlation id captured by the caller; read from the context if absent.
    pub request_id: Option<&'a str>,
    pub exception: Option<&'a str>,
    pub description: Option<&'a str>,
}

fn placeholder_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\{\{\s*([A-Za-z_][A-Za-z0-9_.\-]*)\s*\}\}").expect("placeholder pattern is valid")
    })
}

/// Render `template` for `phase`.
///
/// `extras` supplies additional named values; built-in names take precedence.
/// Without an explicit `request_id` the correlation id is read from the
/// ambient context, and only if the template asks for it.
pub fn render(
    phase: Phase,
    template: &str,
    input: &RenderInput<'_>,
    extras: &BTreeMap<String, String>,
) -> String {
    if !template.contains("{{") {
        return template.to_string();
    }
    placeholder_pattern()
        .replace_all(template, |caps: &Captures<'_>| {
            let name = &caps[1];
            match lookup(phase, name, input).or_else(|| extras.get(name).map(|s| Cow::Owned(s.clone()))) {
                Some(text) => text.into_owned(),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}

fn lookup<'a>(phase: Phase, name: &str, input: &RenderInput<'a>) -> Option<Cow<'a, str>> {
    let text = match name {
        "method" => Cow::Borrowed(input.method),
        "args" => Cow::Borrowed(input.args),
        "return" => input
            .return_value
            .map(|v| Cow::Owned(v.to_string()))
            .unwrap_or(Cow::Borrowed(NULL)),
        "duration" => input
            .duration
            .map(|d| Cow::Owned(d.as_millis().to_string()))
            .unwrap_or(Cow::Borrowed(NULL)),
        "requestId" | "correlationId" => match input.request_id {
            Some(id) => Cow::Borrowed(id),
            None => Cow::Owned(context::correlation_id()),
        },
        "developer" | "owner" => Cow::Borrowed(input.owner.unwrap_or(UNKNOWN_OWNER)),
        "exception" if phase.has_exception() => Cow::Borrowed(input.exception.unwrap_or(NULL)),
        "description" if phase.has_description() => Cow::Borrowed(input.description.unwrap_or(NULL)),
        _ => return None,
    };
    Some(text)
}

/// Raw fields handed to structured sinks instead of a rendered string.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldMap {
    pub phase: Phase,
    pub method: String,
    pub args: String,
    #[serde(rename = "return", skip_serializing_if = "Option::is_none")]
    pub return_value: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(rename = "requestId")]
    pub request_id: String,
    pub developer: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exception: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl FieldMap {
    pub fn from_input(phase: Phase, input: &RenderInput<'_>) -> Self {
        Self {
            phase,
            method: input.method.to_string(),
            args: input.args.to_string(),
            return_value: input.return_value.cloned(),
            duration_ms: input.duration.map(|d| d.as_millis() as u64),
            request_id: input
                .request_id
                .map(str::to_string)
                .unwrap_or_else(context::correlation_id),
            developer: input.owner.unwrap_or(UNKNOWN_OWNER).to_string(),
            exception: input.exception.map(str::to_string),
            description: input.description.map(str::to_string),
        }
    }

    /// Compact JSON form; falls back to an empty object rather than failing.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| "{}".to_string())
    }
}
