//! Per-call-site instrumentation specs.
//!
//! A [`CallSite`] describes where a guarded call lives and what attributes its
//! type and method carry. [`InstrumentationSpec::resolve`] folds those together
//! with the global [`AutoLogConfig`] once, so the hot path only reads a
//! finished spec.

use crate::config::{AutoLogConfig, PhaseLevels, Templates};
use crate::predicate::{Predicate, PredicateError};
use crate::value::Args;

/// Attribute values set on a type or a method. Unset fields inherit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AutoLogAttrs {
    pub log_args: Option<bool>,
    pub log_return_value: Option<bool>,
    pub condition: Option<String>,
}

impl AutoLogAttrs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log_args(mut self, on: bool) -> Self {
        self.log_args = Some(on);
        self
    }

    pub fn log_return_value(mut self, on: bool) -> Self {
        self.log_return_value = Some(on);
        self
    }

    pub fn condition(mut self, expression: impl Into<String>) -> Self {
        self.condition = Some(expression.into());
        self
    }

    /// `self` with unset fields taken from `fallback`.
    fn or(&self, fallback: &AutoLogAttrs) -> AutoLogAttrs {
        AutoLogAttrs {
            log_args: self.log_args.or(fallback.log_args),
            log_return_value: self.log_return_value.or(fallback.log_return_value),
            condition: self.condition.clone().or_else(|| fallback.condition.clone()),
        }
    }
}

/// Location and attributes of one instrumented method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallSite {
    /// Module path of the declaring type, e.g. `app::service`.
    pub module: String,
    pub type_name: String,
    pub method: String,
    pub type_attrs: Option<AutoLogAttrs>,
    pub method_attrs: Option<AutoLogAttrs>,
    pub type_owner: Option<String>,
    pub method_owner: Option<String>,
}

impl CallSite {
    pub fn new(module: impl Into<String>, type_name: impl Into<String>, method: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            type_name: type_name.into(),
            method: method.into(),
            type_attrs: None,
            method_attrs: None,
            type_owner: None,
            method_owner: None,
        }
    }

    pub fn type_attrs(mut self, attrs: AutoLogAttrs) -> Self {
        self.type_attrs = Some(attrs);
        self
    }

    pub fn method_attrs(mut self, attrs: AutoLogAttrs) -> Self {
        self.method_attrs = Some(attrs);
        self
    }

    pub fn type_owner(mut self, owner: impl Into<String>) -> Self {
        self.type_owner = Some(owner.into());
        self
    }

    pub fn method_owner(mut self, owner: impl Into<String>) -> Self {
        self.method_owner = Some(owner.into());
        self
    }

    /// Fully qualified type path matched by the package filter.
    pub fn namespace(&self) -> String {
        if self.module.is_empty() {
            self.type_name.clone()
        } else {
            format!("{}::{}", self.module, self.type_name)
        }
    }

    /// `Type.method`, as shown in messages and metric tags.
    pub fn display_name(&self) -> String {
        format!("{}.{}", self.type_name, self.method)
    }

    /// Registry key: `module::Type::method`.
    pub fn key(&self) -> String {
        format!("{}::{}", self.namespace(), self.method)
    }

    /// Is this a site instrumented at all? Either level carrying attributes
    /// opts the method in.
    pub fn is_annotated(&self) -> bool {
        self.type_attrs.is_some() || self.method_attrs.is_some()
    }
}

/// Gate expression, parsed once when the spec is resolved.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Always,
    Expr(Predicate),
    /// Did not parse; every call is skipped.
    Invalid { source: String, error: PredicateError },
}

impl Condition {
    pub fn from_source(source: Option<&str>) -> Self {
        match source.map(str::trim) {
            None | Some("") => Self::Always,
            Some(text) => match Predicate::parse(text) {
                Ok(predicate) => Self::Expr(predicate),
                Err(error) => Self::Invalid {
                    source: text.to_string(),
                    error,
                },
            },
        }
    }

    /// Fail-closed check against one call's arguments.
    pub fn allows(&self, args: &Args) -> bool {
        match self {
            Self::Always => true,
            Self::Expr(predicate) => predicate.eval(args),
            Self::Invalid { source, error } => {
                tracing::warn!(expression = %source, error = %error, "condition evaluation failed, skipping instrumentation");
                false
            }
        }
    }

    pub fn source(&self) -> Option<&str> {
        match self {
            Self::Always => None,
            Self::Expr(predicate) => Some(predicate.source()),
            Self::Invalid { source, .. } => Some(source),
        }
    }
}

/// Namespace prefix filter.
///
/// A non-empty include list must match; otherwise no exclude prefix may match.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackageFilter {
    pub include: Vec<String>,
    pub exclude: Vec<String>,
}

impl PackageFilter {
    pub fn new(include: Vec<String>, exclude: Vec<String>) -> Self {
        Self { include, exclude }
    }

    pub fn allows(&self, namespace: &str) -> bool {
        if !self.include.is_empty() {
            return self.include.iter().any(|p| namespace.starts_with(p.as_str()));
        }
        !self.exclude.iter().any(|p| namespace.starts_with(p.as_str()))
    }
}

/// Everything the interceptor needs to know about one call site.
#[derive(Debug, Clone, PartialEq)]
pub struct InstrumentationSpec {
    pub method: String,
    pub namespace: String,
    pub log_args: bool,
    pub log_return_value: bool,
    pub log_exception_stacktrace: bool,
    pub condition: Condition,
    pub levels: PhaseLevels,
    pub templates: Templates,
    pub packages: PackageFilter,
    pub owner: Option<String>,
}

impl InstrumentationSpec {
    /// Method attributes win over type attributes, which win over `config`.
    pub fn resolve(site: &CallSite, config: &AutoLogConfig) -> Self {
        let empty = AutoLogAttrs::default();
        let type_attrs = site.type_attrs.as_ref().unwrap_or(&empty);
        let attrs = site.method_attrs.as_ref().unwrap_or(&empty).or(type_attrs);

        Self {
            method: site.display_name(),
            namespace: site.namespace(),
            log_args: attrs.log_args.unwrap_or(config.log_args),
            log_return_value: attrs.log_return_value.unwrap_or(config.log_return_value),
            log_exception_stacktrace: config.log_exception_stacktrace,
            condition: Condition::from_source(attrs.condition.as_deref()),
            levels: config.level.clone(),
            templates: config.template.clone(),
            packages: PackageFilter::new(config.include_packages.clone(), config.exclude_packages.clone()),
            owner: site.method_owner.clone().or_else(|| site.type_owner.clone()),
        }
    }

    /// Spec for an ad-hoc call with no attributes, named `method`.
    pub fn named(method: impl Into<String>, config: &AutoLogConfig) -> Self {
        let method = method.into();
        let namespace = match method.rsplit_once('.') {
            Some((ty, _)) => ty.to_string(),
            None => method.clone(),
        };
        Self {
            method,
            namespace,
            log_args: config.log_args,
            log_return_value: config.log_return_value,
            log_exception_stacktrace: config.log_exception_stacktrace,
            condition: Condition::Always,
            levels: config.level.clone(),
            templates: config.template.clone(),
            packages: PackageFilter::new(config.include_packages.clone(), config.exclude_packages.clone()),
            owner: None,
        }
    }

    pub fn with_owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(owner.into());
        self
    }

    pub fn with_condition(mut self, expression: &str) -> Self {
        self.condition = Condition::from_source(Some(expression));
        self
    }

    /// Condition first, then the package filter.
    pub fn should_instrument(&self, args: &Args) -> bool {
        self.condition.allows(args) && self.packages.allows(&self.namespace)
    }
}
