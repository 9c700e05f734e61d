//! Deriving new futures from old ones.
use crate::future::{guarded, Future};
use crate::resolution::{self, Resolution};
use crate::{Error, FutureReason, FutureValue};

impl<T: FutureValue, E: FutureReason> Future<T, E> {
    /// Registers continuations and returns the future they settle.
    ///
    /// Exactly one of the callbacks runs, never during this call, even when
    /// `self` is already settled. `Ok(resolution)` resolves the returned future
    /// (waiting on it if it is a future or thenable), `Err(reason)` rejects it.
    /// A panicking callback rejects it with [`Error::Panicked`](crate::Error).
    pub fn then<U, F, R>(&self, on_fulfilled: F, on_rejected: R) -> Future<U, E>
    where
        U: FutureValue,
        F: FnOnce(T) -> Result<Resolution<U, E>, E> + Send + 'static,
        R: FnOnce(E) -> Result<Resolution<U, E>, E> + Send + 'static,
    {
        let promise2 = Future::pending_in(self.scheduler().clone());
        let (on_value, on_reason) = (promise2.clone(), promise2.clone());
        self.when_settled(
            move |value| settle(&on_value, guarded(move || on_fulfilled(value))),
            move |reason| settle(&on_reason, guarded(move || on_rejected(reason))),
        );
        promise2
    }

    /// [`then`](Future::then) that passes rejections through.
    pub fn and_then<U, F>(&self, on_fulfilled: F) -> Future<U, E>
    where
        U: FutureValue,
        F: FnOnce(T) -> Result<Resolution<U, E>, E> + Send + 'static,
    {
        self.then(on_fulfilled, Err)
    }

    /// [`then`](Future::then) that passes values through.
    pub fn catch<R>(&self, on_rejected: R) -> Future<T, E>
    where
        R: FnOnce(E) -> Result<Resolution<T, E>, E> + Send + 'static,
    {
        self.then(|value| Ok(Resolution::Value(value)), on_rejected)
    }

    pub fn map<U, F>(&self, f: F) -> Future<U, E>
    where
        U: FutureValue,
        F: FnOnce(T) -> U + Send + 'static,
    {
        self.and_then(move |value| Ok(Resolution::Value(f(value))))
    }

    /// Runs `on_finally` whatever the outcome, then settles like `self`.
    ///
    /// If `on_finally` fails, or hands back something that rejects, that
    /// reason wins over the original outcome. A returned future or thenable is
    /// waited on before the original outcome is passed along.
    pub fn finally<F>(&self, on_finally: F) -> Future<T, E>
    where
        F: FnOnce() -> Result<Resolution<(), E>, E> + Send + 'static,
    {
        self.then(
            |value| Ok(Resolution::Value(Ok(value))),
            |reason| Ok(Resolution::Value(Err(reason))),
        )
        .and_then(move |outcome: Result<T, E>| {
            let gate = Future::from_resolution(on_finally()?);
            Ok(Resolution::Future(
                gate.then(move |()| outcome.map(Resolution::Value), Err),
            ))
        })
    }
}

fn settle<U: FutureValue, E: FutureReason>(
    downstream: &Future<U, E>,
    result: Result<Result<Resolution<U, E>, E>, Error>,
) {
    match result {
        Ok(Ok(x)) => resolution::resolve_with(downstream, x),
        Ok(Err(reason)) => downstream.settle_rejected(reason),
        Err(err) => downstream.settle_rejected(err.into()),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use crate::testing::TestError;
    use crate::{deferred, Error, Future, Resolution, State, TaskQueue};

    fn drain() {
        TaskQueue::current().run_until_stalled();
    }

    #[test]
    fn then_on_settled_future_waits_for_the_queue() {
        let ran = Arc::new(Mutex::new(false));
        let flag = ran.clone();
        let derived = Future::<i32, TestError>::resolve(1).and_then(move |value| {
            *flag.lock().unwrap() = true;
            Ok(Resolution::Value(value + 1))
        });
        assert!(!*ran.lock().unwrap());
        assert!(derived.is_pending());

        drain();
        assert!(*ran.lock().unwrap());
        assert_eq!(derived.state(), State::Fulfilled(2));
    }

    #[test]
    fn then_returns_a_new_future() {
        let source = Future::<i32, TestError>::resolve(1);
        let derived = source.then(|v| Ok(Resolution::Value(v)), Err);
        assert!(!derived.ptr_eq(&source));
    }

    #[test]
    fn continuations_fire_in_registration_order() {
        let d = deferred::<i32, TestError>();
        let log = Arc::new(Mutex::new(Vec::new()));
        for tag in ["a", "b"] {
            let log = log.clone();
            d.future.map(move |_| log.lock().unwrap().push(tag));
        }
        d.resolve.resolve(0);
        drain();
        assert_eq!(*log.lock().unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn callback_error_rejects_downstream() {
        let derived = Future::<i32, TestError>::resolve(1)
            .and_then(|_| -> Result<Resolution<i32, TestError>, TestError> { Err("nope".into()) });
        drain();
        assert_eq!(derived.state(), State::Rejected("nope".into()));
    }

    #[test]
    fn panicking_callback_rejects_downstream() {
        let derived = Future::<i32, TestError>::resolve(1)
            .and_then(|_| -> Result<Resolution<i32, TestError>, TestError> { panic!("boom") });
        let recovered = derived.catch(|reason| match reason {
            TestError::Future(Error::Panicked(msg)) => Ok(Resolution::Value(msg.len() as i32)),
            other => Err(other),
        });
        drain();
        assert_eq!(
            derived.state(),
            State::Rejected(TestError::Future(Error::Panicked("boom".into())))
        );
        assert_eq!(recovered.state(), State::Fulfilled(4));
    }

    #[test]
    fn panicking_finally_rejects() {
        let v = 7;
        let derived = Future::<i32, TestError>::resolve(5).finally(move || panic!("cleanup {v}"));
        drain();
        assert_eq!(
            derived.state(),
            State::Rejected(TestError::Future(Error::Panicked("cleanup 7".into())))
        );
    }

    #[test]
    fn rejections_skip_and_then_until_caught() {
        let recovered = Future::<i32, TestError>::reject("bad".into())
            .map(|v| v * 10)
            .catch(|reason| {
                assert_eq!(reason, TestError::from("bad"));
                Ok(Resolution::Value(-1))
            });
        drain();
        assert_eq!(recovered.state(), State::Fulfilled(-1));
    }

    #[test]
    fn catch_passes_values_through() {
        let derived = Future::<i32, TestError>::resolve(3).catch(|_| Ok(Resolution::Value(0)));
        drain();
        assert_eq!(derived.state(), State::Fulfilled(3));
    }

    #[test]
    fn returned_future_is_flattened() {
        let d = deferred::<String, TestError>();
        let inner = d.future.clone();
        let derived =
            Future::<i32, TestError>::resolve(1).and_then(move |_| Ok(Resolution::Future(inner)));
        drain();
        assert!(derived.is_pending());

        d.resolve.resolve("inner".to_owned());
        drain();
        assert_eq!(derived.state(), State::Fulfilled("inner".to_owned()));
    }

    #[test]
    fn resolving_with_itself_is_a_cycle() {
        let slot: Arc<Mutex<Option<Future<i32, TestError>>>> = Arc::default();
        let me = slot.clone();
        let derived = Future::<i32, TestError>::resolve(1).and_then(move |value| {
            match me.lock().unwrap().clone() {
                Some(future) => Ok(Resolution::Future(future)),
                None => Ok(Resolution::Value(value)),
            }
        });
        *slot.lock().unwrap() = Some(derived.clone());

        drain();
        assert_eq!(
            derived.state(),
            State::Rejected(TestError::Future(Error::ChainingCycle))
        );
        slot.lock().unwrap().take();
    }

    #[test]
    fn returning_the_receiver_is_not_a_cycle() {
        let source = Future::<i32, TestError>::resolve(5);
        let again = source.clone();
        let derived = source.and_then(move |_| Ok(Resolution::Future(again)));
        drain();
        assert_eq!(derived.state(), State::Fulfilled(5));
    }

    #[test]
    fn finally_passes_outcomes_through() {
        let calls = Arc::new(Mutex::new(0));
        let (a, b) = (calls.clone(), calls.clone());
        let kept = Future::<i32, TestError>::resolve(5).finally(move || {
            *a.lock().unwrap() += 1;
            Ok(Resolution::Value(()))
        });
        let still_failed = Future::<i32, TestError>::reject("e".into()).finally(move || {
            *b.lock().unwrap() += 1;
            Ok(Resolution::Value(()))
        });
        drain();
        assert_eq!(kept.state(), State::Fulfilled(5));
        assert_eq!(still_failed.state(), State::Rejected("e".into()));
        assert_eq!(*calls.lock().unwrap(), 2);
    }

    #[test]
    fn failing_finally_overrides_the_outcome() {
        let raised = Future::<i32, TestError>::resolve(5).finally(|| Err("cleanup".into()));
        let rejected_gate = Future::<i32, TestError>::reject("original".into())
            .finally(|| Ok(Resolution::Future(Future::reject("gate".into()))));
        drain();
        assert_eq!(raised.state(), State::Rejected("cleanup".into()));
        assert_eq!(rejected_gate.state(), State::Rejected("gate".into()));
    }

    #[test]
    fn finally_waits_for_its_gate() {
        let gate = deferred::<(), TestError>();
        let pending_gate = gate.future.clone();
        let derived = Future::<i32, TestError>::resolve(5)
            .finally(move || Ok(Resolution::Future(pending_gate)));
        drain();
        assert!(derived.is_pending());

        gate.resolve.resolve(());
        drain();
        assert_eq!(derived.state(), State::Fulfilled(5));
    }
}
