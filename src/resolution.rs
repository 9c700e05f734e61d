use std::fmt;

use tracing::debug;

use crate::future::{guarded, Future, Reject, Resolve};
use crate::{Error, FutureReason, FutureValue};

/// A foreign deferred value that speaks the `then` protocol.
///
/// `then` receives a continuation pair for the future being resolved. It may
/// call either of them now or later, from any thread; only the first call
/// through the pair counts. Returning `Err` rejects with that reason, unless a
/// continuation was already called.
pub trait Thenable<T, E>: Send {
    fn then(self: Box<Self>, resolve: Resolve<T, E>, reject: Reject<T, E>) -> Result<(), E>;
}

/// What a continuation hands back: a plain value, or something to wait on.
pub enum Resolution<T, E> {
    Value(T),
    Future(Future<T, E>),
    Thenable(Box<dyn Thenable<T, E>>),
}

impl<T, E> Resolution<T, E> {
    pub fn thenable(thenable: impl Thenable<T, E> + 'static) -> Self {
        Resolution::Thenable(Box::new(thenable))
    }
}

impl<T, E> From<Future<T, E>> for Resolution<T, E> {
    fn from(future: Future<T, E>) -> Self {
        Resolution::Future(future)
    }
}

impl<T: fmt::Debug, E> fmt::Debug for Resolution<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resolution::Value(value) => f.debug_tuple("Value").field(value).finish(),
            Resolution::Future(future) => f.debug_tuple("Future").field(future).finish(),
            Resolution::Thenable(_) => f.write_str("Thenable(..)"),
        }
    }
}

/// Settles `downstream` with the outcome `x` eventually stands for.
pub(crate) fn resolve_with<T: FutureValue, E: FutureReason>(
    downstream: &Future<T, E>,
    x: Resolution<T, E>,
) {
    match x {
        Resolution::Value(value) => downstream.settle_fulfilled(value),
        Resolution::Future(future) => {
            if future.ptr_eq(downstream) {
                debug!("chaining cycle detected");
                downstream.settle_rejected(Error::ChainingCycle.into());
                return;
            }
            let (fulfilled, rejected) = (downstream.clone(), downstream.clone());
            future.when_settled(
                move |value| fulfilled.settle_fulfilled(value),
                move |reason| rejected.settle_rejected(reason),
            );
        }
        Resolution::Thenable(thenable) => {
            let (resolve, reject) = downstream.handles();
            let latch = resolve.latch().clone();
            let outcome = guarded(|| thenable.then(resolve, reject));
            if let Err(reason) = outcome.unwrap_or_else(|err| Err(err.into())) {
                if latch.claim() {
                    downstream.settle_rejected(reason);
                } else {
                    debug!("thenable failed after calling a continuation; error discarded");
                }
            }
        }
    }
}
