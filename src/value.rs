//! Invocation data model for AutoLog.
//!
//! Guarded calls hand their arguments, target and return value to the core as
//! [`Value`]s. The core never inspects caller types directly: conversion happens
//! once at the call site through `From` / [`ToValue`].

use std::collections::BTreeMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};

use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};

/// Text used for values the caller chose not to expose.
pub const REDACTED: &str = "[redacted]";

/// A dynamically typed value captured from a guarded call.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
    /// Present but withheld from logs.
    Redacted,
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Value::Null => serializer.serialize_none(),
            Value::Bool(b) => serializer.serialize_bool(*b),
            Value::Int(i) => serializer.serialize_i64(*i),
            Value::Float(x) => serializer.serialize_f64(*x),
            Value::Str(s) => serializer.serialize_str(s),
            Value::List(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            Value::Map(entries) => {
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (key, item) in entries {
                    map.serialize_entry(key, item)?;
                }
                map.end()
            }
            Value::Redacted => serializer.serialize_str(REDACTED),
        }
    }
}

impl Value {
    /// Capture any `Display` value as a string.
    ///
    /// A formatter that fails or panics yields [`Value::Null`] instead of
    /// propagating into the guarded call.
    pub fn display<T: fmt::Display + ?Sized>(value: &T) -> Self {
        let rendered = catch_unwind(AssertUnwindSafe(|| {
            let mut out = String::new();
            fmt::write(&mut out, format_args!("{}", value)).map(|_| out)
        }));
        match rendered {
            Ok(Ok(text)) => Value::Str(text),
            _ => Value::Null,
        }
    }

    /// Capture any `Debug` value as a string, with the same failure handling as
    /// [`Value::display`].
    pub fn debug<T: fmt::Debug + ?Sized>(value: &T) -> Self {
        let rendered = catch_unwind(AssertUnwindSafe(|| {
            let mut out = String::new();
            fmt::write(&mut out, format_args!("{:?}", value)).map(|_| out)
        }));
        match rendered {
            Ok(Ok(text)) => Value::Str(text),
            _ => Value::Null,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Name of the variant, used in predicate type errors.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::List(_) => "list",
            Value::Map(_) => "map",
            Value::Redacted => "redacted",
        }
    }

    /// Field lookup on map values.
    pub fn field(&self, name: &str) -> Option<&Value> {
        match self {
            Value::Map(entries) => entries.get(name),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("null"),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::Str(s) => f.write_str(s),
            Value::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", item)?;
                }
                f.write_str("]")
            }
            Value::Map(entries) => {
                f.write_str("{")?;
                for (i, (key, item)) in entries.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}={}", key, item)?;
                }
                f.write_str("}")
            }
            Value::Redacted => f.write_str(REDACTED),
        }
    }
}

macro_rules! int_value {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Value {
                fn from(v: $ty) -> Self {
                    Value::Int(v as i64)
                }
            }
        )*
    };
}

int_value!(i8, i16, i32, i64, u8, u16, u32, isize);

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        i64::try_from(v).map(Value::Int).unwrap_or(Value::Float(v as f64))
    }
}

impl From<usize> for Value {
    fn from(v: usize) -> Self {
        Value::from(v as u64)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(v as f64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<&String> for Value {
    fn from(v: &String) -> Self {
        Value::Str(v.clone())
    }
}

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Value::Null
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(v: Vec<T>) -> Self {
        Value::List(v.into_iter().map(Into::into).collect())
    }
}

impl<V: Into<Value>> From<BTreeMap<String, V>> for Value {
    fn from(v: BTreeMap<String, V>) -> Self {
        Value::Map(v.into_iter().map(|(k, v)| (k, v.into())).collect())
    }
}

/// Borrowing conversion used for return values, which the engine must hand
/// back to the caller untouched.
pub trait ToValue {
    fn to_value(&self) -> Value;
}

impl ToValue for Value {
    fn to_value(&self) -> Value {
        self.clone()
    }
}

macro_rules! to_value_via_from {
    ($($ty:ty),*) => {
        $(
            impl ToValue for $ty {
                fn to_value(&self) -> Value {
                    Value::from(self.clone())
                }
            }
        )*
    };
}

to_value_via_from!(
    i8, i16, i32, i64, u8, u16, u32, u64, isize, usize, f32, f64, bool, String, ()
);

impl ToValue for &str {
    fn to_value(&self) -> Value {
        Value::Str((*self).to_string())
    }
}

impl<T: ToValue> ToValue for Option<T> {
    fn to_value(&self) -> Value {
        self.as_ref().map(ToValue::to_value).unwrap_or(Value::Null)
    }
}

impl<T: ToValue> ToValue for Vec<T> {
    fn to_value(&self) -> Value {
        Value::List(self.iter().map(ToValue::to_value).collect())
    }
}

impl<V: ToValue> ToValue for BTreeMap<String, V> {
    fn to_value(&self) -> Value {
        Value::Map(self.iter().map(|(k, v)| (k.clone(), v.to_value())).collect())
    }
}

impl<V: ToValue> ToValue for std::collections::HashMap<String, V> {
    fn to_value(&self) -> Value {
        Value::Map(self.iter().map(|(k, v)| (k.clone(), v.to_value())).collect())
    }
}

/// Wrapper that logs any `Display` type through [`Value::display`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Shown<T>(pub T);

impl<T: fmt::Display> ToValue for Shown<T> {
    fn to_value(&self) -> Value {
        Value::display(&self.0)
    }
}

/// One named argument of a guarded call.
#[derive(Debug, Clone, PartialEq)]
pub struct Arg {
    pub name: String,
    pub value: Value,
}

/// Ordered arguments of a guarded call plus its optional target (`#this`).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Args {
    items: Vec<Arg>,
    target: Option<Value>,
}

impl Args {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a named argument.
    pub fn arg(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.items.push(Arg {
            name: name.into(),
            value: value.into(),
        });
        self
    }

    /// Append an argument whose value must never reach the logs.
    pub fn redacted(mut self, name: impl Into<String>) -> Self {
        self.items.push(Arg {
            name: name.into(),
            value: Value::Redacted,
        });
        self
    }

    /// Set the target object the call is made on.
    pub fn target(mut self, target: impl Into<Value>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.items.iter().find(|a| a.name == name).map(|a| &a.value)
    }

    pub fn target_value(&self) -> Option<&Value> {
        self.target.as_ref()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arg> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Positional values joined by `", "`, the form used by `{{args}}`.
    pub fn joined(&self) -> String {
        self.items
            .iter()
            .map(|a| a.value.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    }
}
