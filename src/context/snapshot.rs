//! Carrying the ambient store across threads and async tasks.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use super::{clone_ambient, enter_call, replace_ambient, Ambient, CallFrame, AMBIENT};

/// Frozen copy of a logical call's ambient state.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    ambient: Ambient,
}

impl Snapshot {
    /// Copy the current thread's state.
    pub fn capture() -> Self {
        Self {
            ambient: clone_ambient(),
        }
    }

    /// An empty state, for work that must start without inherited keys.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Snapshot for a guarded future about to be carried.
    ///
    /// The correlation id always ends up in the snapshot. It is also installed
    /// in the current store when that store is itself carried by a task, so
    /// later calls in the same task share it. A bare worker thread is shared
    /// by unrelated tasks and is left untouched.
    pub(crate) fn for_task() -> Self {
        let ambient = AMBIENT.with(|a| {
            let mut current = a.borrow_mut();
            if current.carried {
                current.correlation_id();
            }
            current.clone()
        });
        Self { ambient }.with_correlation_id()
    }

    /// Make sure the snapshot carries a correlation id, generating one into
    /// the snapshot (not the thread) if needed.
    pub(crate) fn with_correlation_id(mut self) -> Self {
        self.ambient.correlation_id();
        self
    }

    /// Same snapshot with `frame` as the innermost active call.
    pub(crate) fn with_call(mut self, frame: CallFrame) -> Self {
        self.ambient.push_call(frame);
        self
    }

    /// Run `body` on the current thread with this snapshot installed.
    ///
    /// The thread's own state is put back afterwards, even if `body` panics.
    /// Changes `body` makes are discarded with it.
    pub fn attach<T>(&self, body: impl FnOnce() -> T) -> T {
        let _swap = Swap::install(self.ambient.clone());
        body()
    }

    /// Wrap a future so each poll sees this snapshot, whatever worker runs it.
    pub fn scope<F: Future>(mut self, future: F) -> WithContext<F> {
        self.ambient.carried = true;
        WithContext {
            inner: Some(Box::pin(future)),
            ambient: Some(self.ambient),
        }
    }
}

/// [`Snapshot::capture`] followed by [`Snapshot::scope`].
pub fn instrument<F: Future>(future: F) -> WithContext<F> {
    Snapshot::capture().scope(future)
}

/// Future carrying its own ambient store.
///
/// Writes made while polling are saved back into the wrapper and restored on
/// the next poll, never left on the worker thread. Dropping the wrapper
/// before completion drops the inner future under the carried state too, so
/// guards held across an await unwind against the right store.
#[must_use = "futures do nothing unless polled"]
pub struct WithContext<F> {
    inner: Option<Pin<Box<F>>>,
    ambient: Option<Ambient>,
}

impl<F: Future> Future for WithContext<F> {
    type Output = F::Output;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = &mut *self;
        let Some(inner) = this.inner.as_mut() else {
            panic!("WithContext polled after completion");
        };
        let carried = this.ambient.take().unwrap_or_default();
        let swap = Swap::install(carried);
        let out = inner.as_mut().poll(cx);
        if out.is_ready() {
            this.inner = None;
        }
        this.ambient = Some(swap.restore());
        out
    }
}

impl<F> Drop for WithContext<F> {
    fn drop(&mut self) {
        let Some(inner) = self.inner.take() else {
            return;
        };
        let _swap = Swap::install(self.ambient.take().unwrap_or_default());
        drop(inner);
    }
}

/// Future polled with one extra call frame on the current store.
///
/// Unlike [`WithContext`] the key/value store is not swapped, so writes made
/// by the inner future land where a plain `.await` would put them.
pub(crate) struct InCall<F> {
    inner: Pin<Box<F>>,
    frame: CallFrame,
}

impl<F: Future> InCall<F> {
    pub(crate) fn new(frame: CallFrame, future: F) -> Self {
        Self {
            inner: Box::pin(future),
            frame,
        }
    }
}

impl<F: Future> Future for InCall<F> {
    type Output = F::Output;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = &mut *self;
        let _frame = enter_call(this.frame.clone());
        this.inner.as_mut().poll(cx)
    }
}

/// Installs a state and puts the thread's previous one back on drop.
struct Swap {
    prior: Option<Ambient>,
}

impl Swap {
    fn install(next: Ambient) -> Self {
        Self {
            prior: Some(replace_ambient(next)),
        }
    }

    /// Put the prior state back and return what was installed.
    fn restore(mut self) -> Ambient {
        let prior = self.prior.take().unwrap_or_default();
        replace_ambient(prior)
    }
}

impl Drop for Swap {
    fn drop(&mut self) {
        if let Some(prior) = self.prior.take() {
            replace_ambient(prior);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context;

    #[test]
    fn attach_on_other_thread() {
        context::with_scope([("tenant", "acme")], || {
            let snap = Snapshot::capture();
            let seen = std::thread::spawn(move || {
                let before = context::get("tenant");
                let inside = snap.attach(|| context::get("tenant"));
                let after = context::get("tenant");
                (before, inside, after)
            })
            .join()
            .unwrap();
            assert_eq!(seen, (None, Some("acme".to_string()), None));
        });
    }

    #[test]
    fn attach_restores_after_panic() {
        context::put("k", "thread");
        let snap = Snapshot::empty();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            snap.attach(|| {
                context::put("k", "leaked");
                panic!("boom");
            })
        }));
        assert!(result.is_err());
        assert_eq!(context::get("k").as_deref(), Some("thread"));
        context::remove("k");
    }
}
