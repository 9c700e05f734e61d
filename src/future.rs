use std::cell::RefCell;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, trace};

use crate::resolution::{self, Resolution, Thenable};
use crate::scheduler::{Scheduler, Task};
use crate::{Error, FutureReason, FutureValue};

type Reaction<V> = Box<dyn FnOnce(V) + Send + 'static>;

type Garbage = Box<dyn Send>;

thread_local! {
    /// Callbacks queued for the outermost [`dispose`] running on this thread.
    static DISPOSAL: RefCell<Option<Vec<Garbage>>> = const { RefCell::new(None) };
}

/// Drops `garbage` at a constant stack depth.
///
/// A callback can own the next future in a chain, whose reactions own the
/// one after it. Drops that start while another disposal is running on this
/// thread are queued, and the outermost call works through the queue.
fn dispose(garbage: Garbage) {
    let outermost = DISPOSAL.try_with(|disposal| {
        let mut disposal = disposal.borrow_mut();
        match disposal.as_mut() {
            Some(pending) => {
                pending.push(garbage);
                None
            }
            None => {
                *disposal = Some(Vec::new());
                Some(garbage)
            }
        }
    });
    let Ok(Some(garbage)) = outermost else {
        return;
    };
    let _reset = DisposalReset;
    drop(garbage);
    while let Some(batch) = next_batch() {
        drop(batch);
    }
}

fn next_batch() -> Option<Vec<Garbage>> {
    DISPOSAL
        .try_with(|disposal| disposal.borrow_mut().as_mut().map(std::mem::take))
        .ok()
        .flatten()
        .filter(|batch| !batch.is_empty())
}

struct DisposalReset;

impl Drop for DisposalReset {
    fn drop(&mut self) {
        let rest = DISPOSAL.try_with(|disposal| disposal.borrow_mut().take());
        drop(rest);
    }
}

/// A callback that is released through [`dispose`] if it never runs.
struct Reclaim<X: Send + 'static>(Option<X>);

impl<X: Send + 'static> Reclaim<X> {
    fn into_inner(mut self) -> Option<X> {
        self.0.take()
    }
}

impl<X: Send + 'static> Drop for Reclaim<X> {
    fn drop(&mut self) {
        if let Some(callback) = self.0.take() {
            dispose(Box::new(callback));
        }
    }
}

/// Runs user code, turning a panic into [`Error::Panicked`].
pub(crate) fn guarded<R>(f: impl FnOnce() -> R) -> Result<R, Error> {
    panic::catch_unwind(AssertUnwindSafe(f)).map_err(|payload| {
        let message = payload
            .downcast_ref::<&str>()
            .map(|msg| msg.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "opaque panic payload".to_owned());
        debug!(%message, "user callback panicked");
        Error::Panicked(message)
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Pending,
    Fulfilled,
    Rejected,
}

/// Snapshot of a future's outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum State<T, E> {
    Pending,
    Fulfilled(T),
    Rejected(E),
}

impl<T, E> State<T, E> {
    pub fn status(&self) -> Status {
        match self {
            State::Pending => Status::Pending,
            State::Fulfilled(_) => Status::Fulfilled,
            State::Rejected(_) => Status::Rejected,
        }
    }
}

struct Inner<T, E> {
    state: State<T, E>,
    fulfill_reactions: Vec<Reaction<T>>,
    reject_reactions: Vec<Reaction<E>>,
}

/// A value that becomes available later.
///
/// Clones are handles to the same deferred value.
pub struct Future<T, E> {
    inner: Arc<Mutex<Inner<T, E>>>,
    scheduler: Scheduler,
}

impl<T, E> Clone for Future<T, E> {
    fn clone(&self) -> Self {
        Future {
            inner: self.inner.clone(),
            scheduler: self.scheduler.clone(),
        }
    }
}

impl<T, E> Future<T, E> {
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    pub fn status(&self) -> Status {
        self.lock().state.status()
    }

    pub fn is_pending(&self) -> bool {
        self.status() == Status::Pending
    }

    pub(crate) fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    fn lock(&self) -> MutexGuard<'_, Inner<T, E>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<T: FutureValue, E: FutureReason> Future<T, E> {
    /// Creates a future on the current scheduler and runs `executor`
    /// synchronously with its continuations.
    ///
    /// An `Err` returned by the executor, or a panic inside it, rejects the
    /// future, unless one of the continuations was already called.
    ///
    /// ```
    /// use thenable::{Error, Future, Status};
    /// # #[derive(Debug, Clone)] struct E;
    /// # impl From<Error> for E { fn from(_: Error) -> Self { E } }
    /// let ready = Future::<u8, E>::new(|resolve, _reject| {
    ///     resolve.resolve(7);
    ///     Ok(())
    /// });
    /// assert_eq!(ready.status(), Status::Fulfilled);
    /// ```
    pub fn new<F>(executor: F) -> Self
    where
        F: FnOnce(Resolve<T, E>, Reject<T, E>) -> Result<(), E>,
    {
        Self::new_in(Scheduler::current(), executor)
    }

    /// Like [`Future::new`], but continuations run on `scheduler`.
    pub fn new_in<F>(scheduler: impl Into<Scheduler>, executor: F) -> Self
    where
        F: FnOnce(Resolve<T, E>, Reject<T, E>) -> Result<(), E>,
    {
        let future = Self::pending_in(scheduler.into());
        let (resolve, reject) = future.handles();
        match guarded(|| executor(resolve, reject.clone())) {
            Ok(Ok(())) => {}
            Ok(Err(reason)) => reject.reject(reason),
            Err(err) => reject.reject(err.into()),
        }
        future
    }

    pub(crate) fn pending_in(scheduler: Scheduler) -> Self {
        Future {
            inner: Arc::new(Mutex::new(Inner {
                state: State::Pending,
                fulfill_reactions: Vec::new(),
                reject_reactions: Vec::new(),
            })),
            scheduler,
        }
    }

    /// A fresh pair of continuations sharing one latch.
    pub(crate) fn handles(&self) -> (Resolve<T, E>, Reject<T, E>) {
        let latch = Latch::default();
        (
            Resolve {
                future: self.clone(),
                latch: latch.clone(),
            },
            Reject {
                future: self.clone(),
                latch,
            },
        )
    }

    pub fn state(&self) -> State<T, E> {
        self.lock().state.clone()
    }

    pub(crate) fn settle_fulfilled(&self, value: T) {
        let (reactions, discarded) = {
            let mut inner = self.lock();
            if !matches!(inner.state, State::Pending) {
                trace!("future already settled; fulfill ignored");
                return;
            }
            inner.state = State::Fulfilled(value.clone());
            (
                std::mem::take(&mut inner.fulfill_reactions),
                std::mem::take(&mut inner.reject_reactions),
            )
        };
        drop(discarded);
        trace!(reactions = reactions.len(), "future fulfilled");
        for reaction in reactions {
            reaction(value.clone());
        }
    }

    pub(crate) fn settle_rejected(&self, reason: E) {
        let (reactions, discarded) = {
            let mut inner = self.lock();
            if !matches!(inner.state, State::Pending) {
                trace!("future already settled; reject ignored");
                return;
            }
            inner.state = State::Rejected(reason.clone());
            (
                std::mem::take(&mut inner.reject_reactions),
                std::mem::take(&mut inner.fulfill_reactions),
            )
        };
        drop(discarded);
        trace!(reactions = reactions.len(), "future rejected");
        for reaction in reactions {
            reaction(reason.clone());
        }
    }

    /// Runs exactly one of the callbacks on a later turn, once settled.
    pub(crate) fn when_settled<F, R>(&self, on_fulfilled: F, on_rejected: R)
    where
        F: FnOnce(T) + Send + 'static,
        R: FnOnce(E) + Send + 'static,
    {
        let mut guard = self.lock();
        let inner = &mut *guard;
        let task: Task = match &inner.state {
            State::Pending => {
                let scheduler = self.scheduler.clone();
                let on_fulfilled = Reclaim(Some(on_fulfilled));
                inner.fulfill_reactions.push(Box::new(move |value| {
                    if let Some(on_fulfilled) = on_fulfilled.into_inner() {
                        scheduler.schedule(Box::new(move || on_fulfilled(value)))
                    }
                }));
                let scheduler = self.scheduler.clone();
                let on_rejected = Reclaim(Some(on_rejected));
                inner.reject_reactions.push(Box::new(move |reason| {
                    if let Some(on_rejected) = on_rejected.into_inner() {
                        scheduler.schedule(Box::new(move || on_rejected(reason)))
                    }
                }));
                return;
            }
            State::Fulfilled(value) => {
                let value = value.clone();
                Box::new(move || on_fulfilled(value))
            }
            State::Rejected(reason) => {
                let reason = reason.clone();
                Box::new(move || on_rejected(reason))
            }
        };
        drop(guard);
        self.scheduler.schedule(task);
    }
}

impl<T, E> fmt::Debug for Future<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Future")
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

/// First call through a continuation pair wins.
#[derive(Clone, Default)]
pub(crate) struct Latch(Arc<AtomicBool>);

impl Latch {
    pub(crate) fn claim(&self) -> bool {
        !self.0.swap(true, Ordering::AcqRel)
    }
}

/// The fulfilling half of a continuation pair.
pub struct Resolve<T, E> {
    future: Future<T, E>,
    latch: Latch,
}

/// The rejecting half of a continuation pair.
pub struct Reject<T, E> {
    future: Future<T, E>,
    latch: Latch,
}

impl<T, E> Clone for Resolve<T, E> {
    fn clone(&self) -> Self {
        Resolve {
            future: self.future.clone(),
            latch: self.latch.clone(),
        }
    }
}

impl<T, E> Clone for Reject<T, E> {
    fn clone(&self) -> Self {
        Reject {
            future: self.future.clone(),
            latch: self.latch.clone(),
        }
    }
}

impl<T: FutureValue, E: FutureReason> Resolve<T, E> {
    pub fn resolve(&self, value: T) {
        self.resolve_with(Resolution::Value(value))
    }

    /// Makes the future mirror `other`'s eventual outcome.
    pub fn adopt(&self, other: Future<T, E>) {
        self.resolve_with(Resolution::Future(other))
    }

    /// Makes the future mirror a foreign thenable's eventual outcome.
    pub fn follow(&self, thenable: impl Thenable<T, E> + 'static) {
        self.resolve_with(Resolution::thenable(thenable))
    }

    /// Plain values settle now. Futures and thenables are unwrapped on a later
    /// turn, one level per task.
    pub fn resolve_with(&self, resolution: Resolution<T, E>) {
        if !self.latch.claim() {
            trace!("continuation already called; resolve ignored");
            return;
        }
        match resolution {
            Resolution::Value(value) => self.future.settle_fulfilled(value),
            other => {
                let target = self.future.clone();
                self.future.scheduler().schedule(Box::new(move || {
                    resolution::resolve_with(&target, other)
                }));
            }
        }
    }

    pub(crate) fn latch(&self) -> &Latch {
        &self.latch
    }
}

impl<T: FutureValue, E: FutureReason> Reject<T, E> {
    pub fn reject(&self, reason: E) {
        if !self.latch.claim() {
            trace!("continuation already called; reject ignored");
            return;
        }
        self.future.settle_rejected(reason)
    }
}

impl<T, E> fmt::Debug for Resolve<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Resolve").field(&self.future).finish()
    }
}

impl<T, E> fmt::Debug for Reject<T, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Reject").field(&self.future).finish()
    }
}
