//! A future together with its own continuations.
//!
//! This is the adapter external conformance drivers use: they need to settle a
//! future from the outside, after it was handed to the code under test.
//!
//! # Examples
//!
//! ```
//! use thenable::{deferred, Error, State, TaskQueue};
//! # #[derive(Debug, Clone, PartialEq)] struct E;
//! # impl From<Error> for E { fn from(_: Error) -> Self { E } }
//! let d = deferred::<&str, E>();
//! let shouted = d.future.map(|s| s.to_uppercase());
//!
//! d.resolve.resolve("hi");
//! TaskQueue::current().run_until_stalled();
//! assert_eq!(shouted.state(), State::Fulfilled("HI".to_owned()));
//! ```
use crate::future::{Future, Reject, Resolve};
use crate::scheduler::Scheduler;
use crate::{FutureReason, FutureValue};

#[derive(Debug)]
pub struct Deferred<T, E> {
    pub future: Future<T, E>,
    pub resolve: Resolve<T, E>,
    pub reject: Reject<T, E>,
}

impl<T, E> Clone for Deferred<T, E> {
    fn clone(&self) -> Self {
        Deferred {
            future: self.future.clone(),
            resolve: self.resolve.clone(),
            reject: self.reject.clone(),
        }
    }
}

/// A pending future on the current scheduler, with its continuations.
pub fn deferred<T: FutureValue, E: FutureReason>() -> Deferred<T, E> {
    let future = Future::pending_in(Scheduler::current());
    let (resolve, reject) = future.handles();
    Deferred {
        future,
        resolve,
        reject,
    }
}

#[cfg(test)]
mod tests {
    use super::deferred;
    use crate::testing::TestError;
    use crate::{State, Status};

    #[test]
    fn starts_pending() {
        let d = deferred::<i32, TestError>();
        assert_eq!(d.future.status(), Status::Pending);
    }

    #[test]
    fn resolve_and_reject_share_one_latch() {
        let d = deferred::<i32, TestError>();
        let other = d.clone();
        d.reject.reject("first".into());
        other.resolve.resolve(1);
        assert_eq!(d.future.state(), State::Rejected("first".into()));
    }
}
