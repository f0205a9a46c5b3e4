//! Single-resolution adapter for callback-driven requests
//!
//! An engine request finishes through one of several callbacks: success (or
//! transaction complete), error, abort, close. [`settle`] creates a resolver shared
//! by all of those callbacks and the future the caller awaits. Whichever callback
//! fires first settles the request; the rest are discarded.
//!
//! ```text
//! PENDING ──▶ SUCCESS | ERROR | ABORT | CLOSE
//! ```

use std::any::Any;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::channel::oneshot;
use futures::future::LocalBoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;

use crate::error::{EngineError, Failure, Signal};

/// Terminal result of a request.
pub type Outcome<T> = Result<T, Failure>;

/// Create a linked resolver and pending value.
pub fn settle<T>() -> (Settle<T>, Pending<T>) {
    let (tx, rx) = oneshot::channel();
    let settle = Settle {
        slot: Arc::new(Mutex::new(Some(tx))),
    };
    (settle, Pending::from_inner(Inner::Waiting(rx)))
}

/// Resolver side of a request. Clone it into every callback.
pub struct Settle<T> {
    slot: Arc<Mutex<Option<oneshot::Sender<Outcome<T>>>>>,
}

impl<T> Clone for Settle<T> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<T> Settle<T> {
    /// Resolve with a value. Returns `false` if the request had already settled.
    pub fn succeed(&self, value: T) -> bool {
        self.settle(Ok(value))
    }

    /// Reject on the given terminal signal.
    pub fn fail(&self, signal: Signal, error: EngineError) -> bool {
        self.settle(Err(Failure::new(signal, error)))
    }

    pub fn settle(&self, outcome: Outcome<T>) -> bool {
        let sender = self.slot.lock().take();
        match sender {
            Some(tx) => {
                // The receiver may be gone; the request still counts as settled.
                let _ = tx.send(outcome);
                true
            }
            None => false,
        }
    }

    pub fn is_settled(&self) -> bool {
        self.slot.lock().is_none()
    }
}

enum Inner<T> {
    Ready(Option<Outcome<T>>),
    Waiting(oneshot::Receiver<Outcome<T>>),
    Deferred(Option<Box<dyn FnOnce() -> Outcome<T>>>),
    Boxed(LocalBoxFuture<'static, Outcome<T>>),
}

/// Awaitable side of a request.
///
/// Resources attached with [`Pending::keep_alive`] (typically native callback
/// closures) are dropped together with the pending value.
#[must_use = "requests settle in the background; await the pending value to observe the outcome"]
pub struct Pending<T> {
    inner: Inner<T>,
    guards: Vec<Box<dyn Any>>,
}

impl<T> Unpin for Pending<T> {}

impl<T> Pending<T> {
    fn from_inner(inner: Inner<T>) -> Self {
        Self {
            inner,
            guards: Vec::new(),
        }
    }

    /// An already settled request.
    pub fn ready(outcome: Outcome<T>) -> Self {
        Self::from_inner(Inner::Ready(Some(outcome)))
    }

    /// An already failed request.
    pub fn failed(signal: Signal, error: EngineError) -> Self {
        Self::ready(Err(Failure::new(signal, error)))
    }

    /// A request whose outcome is computed when it is first polled.
    ///
    /// Engines that commit once the caller stops issuing work use this for
    /// transaction completion.
    pub fn deferred(f: impl FnOnce() -> Outcome<T> + 'static) -> Self {
        Self::from_inner(Inner::Deferred(Some(Box::new(f))))
    }

    /// Keep `guard` alive until this pending value is dropped.
    pub fn keep_alive<G: 'static>(mut self, guard: G) -> Self {
        self.guards.push(Box::new(guard));
        self
    }
}

impl<T: 'static> Pending<T> {
    /// Transform the success value.
    pub fn map<U: 'static>(self, f: impl FnOnce(T) -> U + 'static) -> Pending<U> {
        Pending::from_inner(Inner::Boxed(
            async move { self.await.map(f) }.boxed_local(),
        ))
    }
}

impl<T> Future for Pending<T> {
    type Output = Outcome<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match &mut this.inner {
            Inner::Ready(outcome) => Poll::Ready(outcome.take().unwrap_or_else(|| Err(exhausted()))),
            Inner::Waiting(rx) => match Pin::new(rx).poll(cx) {
                Poll::Ready(Ok(outcome)) => Poll::Ready(outcome),
                Poll::Ready(Err(oneshot::Canceled)) => Poll::Ready(Err(dropped())),
                Poll::Pending => Poll::Pending,
            },
            Inner::Deferred(f) => match f.take() {
                Some(f) => Poll::Ready(f()),
                None => Poll::Ready(Err(exhausted())),
            },
            Inner::Boxed(fut) => fut.as_mut().poll(cx),
        }
    }
}

/// Every resolver went away without settling.
fn dropped() -> Failure {
    Failure::new(
        Signal::Close,
        EngineError::new("AbortError", "request dropped before it settled"),
    )
}

fn exhausted() -> Failure {
    Failure::new(
        Signal::Error,
        EngineError::new("InvalidStateError", "request polled after it settled"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    #[tokio::test]
    async fn test_first_signal_wins() {
        let (settle, pending) = settle::<u32>();
        let on_error = settle.clone();
        let on_close = settle.clone();

        assert!(settle.succeed(7));
        assert!(!on_error.fail(Signal::Error, EngineError::new("Error", "late")));
        assert!(!on_close.fail(Signal::Close, EngineError::new("Error", "later")));
        assert!(settle.is_settled());

        assert_eq!(pending.await, Ok(7));
    }

    #[tokio::test]
    async fn test_failure_carries_signal() {
        let (settle, pending) = settle::<()>();
        settle.fail(Signal::Abort, EngineError::new("AbortError", "aborted"));
        settle.succeed(());

        let failure = pending.await.unwrap_err();
        assert_eq!(failure.signal, Signal::Abort);
        assert_eq!(failure.error.message, "aborted");
    }

    #[tokio::test]
    async fn test_dropped_resolver_closes() {
        let (settle, pending) = settle::<()>();
        drop(settle);

        let failure = pending.await.unwrap_err();
        assert_eq!(failure.signal, Signal::Close);
    }

    #[tokio::test]
    async fn test_settles_from_another_task() {
        let (settle, pending) = settle::<String>();
        let handle = tokio::spawn(async move {
            tokio::task::yield_now().await;
            settle.succeed("done".to_string());
        });

        assert_eq!(pending.await.unwrap(), "done");
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_deferred_runs_on_first_poll() {
        let ran = Rc::new(Cell::new(false));
        let flag = ran.clone();
        let pending = Pending::deferred(move || {
            flag.set(true);
            Ok(1)
        });

        assert!(!ran.get());
        assert_eq!(pending.await, Ok(1));
        assert!(ran.get());
    }

    #[tokio::test]
    async fn test_map_and_keep_alive() {
        struct Guard(Rc<Cell<bool>>);
        impl Drop for Guard {
            fn drop(&mut self) {
                self.0.set(true);
            }
        }

        let dropped = Rc::new(Cell::new(false));
        let (settle, pending) = settle::<u32>();
        let pending = pending.keep_alive(Guard(dropped.clone())).map(|n| n * 2);
        settle.succeed(21);

        assert!(!dropped.get());
        assert_eq!(pending.await, Ok(42));
        assert!(dropped.get());
    }
}
