//! Context propagation for AutoLog.
//!
//! An ambient key/value store scoped to the logical call that is running on the
//! current thread. It carries the correlation id (`requestId`) and any other
//! diagnostic keys callers want attached to their logs.
//!
//! # Scope discipline
//!
//! [`with_scope`] and [`ScopeGuard`] push a frame recording the previous value
//! (or absence) of every key they touch. The frame is popped in `Drop`, so the
//! previous values come back on normal return, on `?` propagation and while
//! unwinding from a panic.
//!
//! # Threads and tasks
//!
//! The store is thread-local. It is never visible to other threads; moving a
//! logical call to another thread or onto an async task requires carrying it
//! explicitly with a [`Snapshot`] or [`instrument`].

mod snapshot;

pub use snapshot::{instrument, Snapshot, WithContext};

pub(crate) use snapshot::InCall;

use std::cell::RefCell;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use uuid::Uuid;

/// Store key holding the correlation id.
pub const CORRELATION_ID_KEY: &str = "requestId";

/// Inbound header conventionally carrying the correlation id.
pub const CORRELATION_ID_HEADER: &str = "X-Request-Id";

/// A guarded call currently executing on this logical call.
#[derive(Debug, Clone)]
pub(crate) struct CallFrame {
    pub method: Arc<str>,
    pub owner: Option<Arc<str>>,
    /// Set when the call was skipped by its gate; nested steps stay silent.
    pub suppressed: bool,
}

impl CallFrame {
    pub fn entered(method: &str, owner: Option<&str>) -> Self {
        Self {
            method: Arc::from(method),
            owner: owner.map(Arc::from),
            suppressed: false,
        }
    }

    pub fn suppressed(method: &str) -> Self {
        Self {
            method: Arc::from(method),
            owner: None,
            suppressed: true,
        }
    }
}

/// Everything that travels with a logical call.
#[derive(Debug, Clone, Default)]
pub(crate) struct Ambient {
    values: HashMap<String, String>,
    calls: Vec<CallFrame>,
    /// Installed by a [`WithContext`] poll rather than owned by the thread.
    carried: bool,
}

impl Ambient {
    pub(crate) fn push_call(&mut self, frame: CallFrame) {
        self.calls.push(frame);
    }

    /// The carried correlation id, generated into this store if absent.
    pub(crate) fn correlation_id(&mut self) -> String {
        self.values
            .entry(CORRELATION_ID_KEY.to_string())
            .or_insert_with(new_correlation_id)
            .clone()
    }
}

thread_local! {
    static AMBIENT: RefCell<Ambient> = RefCell::new(Ambient::default());
}

/// Swap the thread's ambient state for `next`, returning the previous one.
pub(crate) fn replace_ambient(next: Ambient) -> Ambient {
    AMBIENT.with(|a| std::mem::replace(&mut *a.borrow_mut(), next))
}

pub(crate) fn clone_ambient() -> Ambient {
    AMBIENT.with(|a| a.borrow().clone())
}

/// Current correlation id, generated and installed on first use.
pub fn correlation_id() -> String {
    AMBIENT.with(|a| a.borrow_mut().correlation_id())
}

/// Generate a fresh correlation id without installing it.
pub fn new_correlation_id() -> String {
    Uuid::new_v4().to_string()
}

pub fn get(key: &str) -> Option<String> {
    AMBIENT.with(|a| a.borrow().values.get(key).cloned())
}

/// Set `key` without any restoration. Callers own the cleanup.
pub fn put(key: impl Into<String>, value: impl Into<String>) {
    AMBIENT.with(|a| {
        a.borrow_mut().values.insert(key.into(), value.into());
    })
}

/// Remove `key`, returning the value it held.
pub fn remove(key: &str) -> Option<String> {
    AMBIENT.with(|a| a.borrow_mut().values.remove(key))
}

/// Copy of every key currently visible, sorted by key.
pub fn entries() -> BTreeMap<String, String> {
    AMBIENT.with(|a| {
        a.borrow()
            .values
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    })
}

/// Run `body` with `values` installed, restoring every touched key afterwards.
///
/// ```
/// use autolog::context;
///
/// context::put("user", "outer");
/// let seen = context::with_scope([("user", "inner")], || context::get("user"));
/// assert_eq!(seen.as_deref(), Some("inner"));
/// assert_eq!(context::get("user").as_deref(), Some("outer"));
/// # context::remove("user");
/// ```
pub fn with_scope<I, K, V, T>(values: I, body: impl FnOnce() -> T) -> T
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<String>,
{
    let _guard = ScopeGuard::push(values);
    body()
}

/// Run `body` with the inbound correlation id installed, or a fresh one when
/// the transport supplied none.
pub fn with_correlation_id<T>(inbound: Option<&str>, body: impl FnOnce() -> T) -> T {
    let id = match inbound.map(str::trim) {
        Some(id) if !id.is_empty() => id.to_string(),
        _ => new_correlation_id(),
    };
    with_scope([(CORRELATION_ID_KEY, id)], body)
}

/// One pushed scope: the keys it set and what they held before.
#[derive(Debug)]
struct ScopeFrame {
    previous: Vec<(String, Option<String>)>,
}

/// RAII form of [`with_scope`]. Dropping the guard restores the frame.
#[must_use = "the scope is popped as soon as the guard is dropped"]
#[derive(Debug)]
pub struct ScopeGuard {
    frame: Option<ScopeFrame>,
}

impl ScopeGuard {
    /// Install `values`, remembering what each key held before.
    pub fn push<I, K, V>(values: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let previous = AMBIENT.with(|a| {
            let mut ambient = a.borrow_mut();
            values
                .into_iter()
                .map(|(k, v)| {
                    let key = k.into();
                    let old = ambient.values.insert(key.clone(), v.into());
                    (key, old)
                })
                .collect()
        });
        Self {
            frame: Some(ScopeFrame { previous }),
        }
    }
}

impl Drop for ScopeGuard {
    fn drop(&mut self) {
        let Some(frame) = self.frame.take() else {
            return;
        };
        // try_with: the thread-local may already be gone during thread teardown.
        let _ = AMBIENT.try_with(|a| {
            let mut ambient = a.borrow_mut();
            // Reverse order so a key listed twice ends at its original value.
            for (key, old) in frame.previous.into_iter().rev() {
                match old {
                    Some(value) => {
                        ambient.values.insert(key, value);
                    }
                    None => {
                        ambient.values.remove(&key);
                    }
                }
            }
        });
    }
}

/// Pushes a call frame; popping truncates back to the depth at push time.
#[derive(Debug)]
pub(crate) struct CallGuard {
    depth: usize,
}

pub(crate) fn enter_call(frame: CallFrame) -> CallGuard {
    let depth = AMBIENT.with(|a| {
        let mut ambient = a.borrow_mut();
        let depth = ambient.calls.len();
        ambient.calls.push(frame);
        depth
    });
    CallGuard { depth }
}

impl Drop for CallGuard {
    fn drop(&mut self) {
        let _ = AMBIENT.try_with(|a| a.borrow_mut().calls.truncate(self.depth));
    }
}

/// Innermost guarded call on this logical call, if any.
pub(crate) fn current_call() -> Option<CallFrame> {
    AMBIENT.with(|a| a.borrow().calls.last().cloned())
}

#[cfg(test)]
fn call_depth() -> usize {
    AMBIENT.with(|a| a.borrow().calls.len())
}
