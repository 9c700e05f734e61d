//! Deferred values with Promise/A+ style resolution.
//!
//! A [`Future`] settles exactly once, either fulfilled with a value or rejected
//! with a reason. Continuations registered with [`Future::then`] never run in
//! the turn that registered them: they are handed to a [`Scheduler`] and run
//! when its queue is drained.
//!
//! ```
//! use thenable::{Error, Future, Resolution, TaskQueue};
//!
//! #[derive(Debug, Clone, PartialEq)]
//! struct Oops(String);
//!
//! impl From<Error> for Oops {
//!     fn from(err: Error) -> Self {
//!         Oops(err.to_string())
//!     }
//! }
//!
//! let doubled = Future::<i32, Oops>::resolve(21)
//!     .and_then(|value| Ok(Resolution::Value(value * 2)));
//! assert!(doubled.is_pending());
//!
//! TaskQueue::current().run_until_stalled();
//! assert_eq!(doubled.state(), thenable::State::Fulfilled(42));
//! ```
mod chain;
mod combinator;
pub mod deferred;
mod future;
mod resolution;
pub mod scheduler;
pub mod waiter;

pub use combinator::Settlement;
pub use deferred::{deferred, Deferred};
pub use future::{Future, Reject, Resolve, State, Status};
pub use resolution::{Resolution, Thenable};
pub use scheduler::{Schedule, Scheduler, Task, TaskQueue};
pub use waiter::Waiter;

/// Reasons produced by the future machinery itself.
///
/// Rejection reasons are the caller's type `E`; these variants reach it through
/// `E: From<Error>`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    #[error("chaining cycle detected for future")]
    ChainingCycle,
    #[error("future was dropped before it settled")]
    Abandoned,
    #[error("callback panicked: {0}")]
    Panicked(String),
}

/// Values a [`Future`] can be fulfilled with.
pub trait FutureValue: Clone + Send + 'static {}

impl<T: Clone + Send + 'static> FutureValue for T {}

/// Reasons a [`Future`] can be rejected with.
pub trait FutureReason: Clone + Send + From<Error> + 'static {}

impl<E: Clone + Send + From<Error> + 'static> FutureReason for E {}

#[cfg(test)]
pub(crate) mod testing {
    use crate::Error;

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub(crate) enum TestError {
        Msg(String),
        Future(Error),
    }

    impl From<Error> for TestError {
        fn from(err: Error) -> Self {
            TestError::Future(err)
        }
    }

    impl From<&str> for TestError {
        fn from(msg: &str) -> Self {
            TestError::Msg(msg.to_owned())
        }
    }
}
