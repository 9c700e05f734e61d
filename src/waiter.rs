//! Awaiting a [`Future`](crate::Future) from ordinary async code.
//!
//! The waiter only completes once the future's queue runs the settlement
//! continuation, so something has to keep draining that queue.
//!
//! # Examples
//!
//! ```
//! use thenable::{deferred, Error, TaskQueue};
//! use futures::executor::block_on;
//! use std::thread;
//! # #[derive(Debug, Clone, PartialEq)] struct E;
//! # impl From<Error> for E { fn from(_: Error) -> Self { E } }
//! let d = deferred::<String, E>();
//! let waiter = d.future.waiter();
//! let queue = TaskQueue::current();
//!
//! let task1 = thread::spawn(move || block_on(async {
//!     println!("Received {:?}", waiter.await);
//! }));
//! d.resolve.resolve("Hi".into());
//! queue.run_until_stalled();
//! task1.join().expect("The task1 thread has panicked.");
//! ```
use std::future::{Future as StdFuture, IntoFuture};
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll, Waker};

use tracing::trace;

use crate::future::Future;
use crate::{Error, FutureReason, FutureValue};

#[derive(Debug)]
enum WakerState {
    Fresh,
    Delivered,
}

#[derive(Debug)]
struct Inner<T, E> {
    value: Option<Result<T, E>>,
    waker: Result<Waker, WakerState>,
}

type Shared<T, E> = Arc<Mutex<Inner<T, E>>>;

fn lock<T, E>(shared: &Shared<T, E>) -> MutexGuard<'_, Inner<T, E>> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Resolves to the outcome of the future it was created from.
///
/// Yields `Err(Error::Abandoned.into())` if that future can no longer settle
/// because it and every continuation that could settle it were dropped.
#[derive(Debug)]
pub struct Waiter<T, E> {
    shared: Shared<T, E>,
}

/// Delivers the outcome to a [`Waiter`]. Dropping it undelivered abandons the
/// waiter.
struct Notifier<T, E: From<Error>> {
    shared: Shared<T, E>,
}

impl<T, E: From<Error>> Notifier<T, E> {
    fn deliver(&self, outcome: Result<T, E>) {
        let mut inner = lock(&self.shared);
        if let Err(WakerState::Delivered) = inner.waker {
            return;
        }
        inner.value = Some(outcome);
        if let Ok(waker) = std::mem::replace(&mut inner.waker, Err(WakerState::Delivered)) {
            waker.wake()
        }
    }
}

impl<T, E: From<Error>> Drop for Notifier<T, E> {
    /// If this is an undelivered notifier, wake with error.
    fn drop(&mut self) {
        if let Err(WakerState::Delivered) = lock(&self.shared).waker {
            return;
        }
        trace!("future dropped before settling; waiter abandoned");
        self.deliver(Err(Error::Abandoned.into()));
    }
}

impl<T: FutureValue, E: FutureReason> Future<T, E> {
    /// Registers a continuation that hands the outcome to a [`Waiter`].
    pub fn waiter(&self) -> Waiter<T, E> {
        let shared = Arc::new(Mutex::new(Inner {
            value: None,
            waker: Err(WakerState::Fresh),
        }));
        let on_value = Arc::new(Notifier {
            shared: shared.clone(),
        });
        let on_reason = on_value.clone();
        self.when_settled(
            move |value| on_value.deliver(Ok(value)),
            move |reason| on_reason.deliver(Err(reason)),
        );
        Waiter { shared }
    }
}

impl<T: FutureValue, E: FutureReason> IntoFuture for Future<T, E> {
    type Output = Result<T, E>;
    type IntoFuture = Waiter<T, E>;

    fn into_future(self) -> Self::IntoFuture {
        self.waiter()
    }
}

/// The outcome is handed out once; polling again after `Ready` stays
/// `Pending` forever.
impl<T, E> StdFuture for Waiter<T, E> {
    type Output = Result<T, E>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut inner = lock(&self.shared);
        match inner.value.take() {
            Some(outcome) => Poll::Ready(outcome),
            None => {
                if let Err(WakerState::Fresh) | Ok(_) = inner.waker {
                    inner.waker = Ok(cx.waker().clone());
                }
                Poll::Pending
            }
        }
    }
}
