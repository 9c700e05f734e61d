//! Deferred execution of continuations.
//!
//! Every continuation a [`Future`](crate::Future) runs goes through a
//! [`Scheduler`]. The scheduler only promises to run a task later than the
//! call that submitted it, in submission order. [`TaskQueue`] is the provided
//! cooperative implementation: tasks run when somebody drains it.
use std::cell::RefCell;
use std::collections::VecDeque;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::trace;

/// A unit of deferred work.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Something that runs tasks on a later turn, in FIFO order.
pub trait Schedule: Send + Sync {
    fn schedule(&self, task: Task);
}

/// Shared handle to a [`Schedule`] implementation.
#[derive(Clone)]
pub struct Scheduler(Arc<dyn Schedule>);

thread_local! {
    static DEFAULT_QUEUE: TaskQueue = TaskQueue::new();
    static CURRENT: RefCell<Option<Scheduler>> = const { RefCell::new(None) };
}

impl Scheduler {
    pub fn new(schedule: impl Schedule + 'static) -> Self {
        Scheduler(Arc::new(schedule))
    }

    /// The scheduler installed on this thread by [`Scheduler::enter`], or the
    /// thread's default [`TaskQueue`].
    pub fn current() -> Self {
        CURRENT
            .with(|current| current.borrow().clone())
            .unwrap_or_else(|| TaskQueue::current().into())
    }

    /// Installs this scheduler as the thread's current one until the guard
    /// is dropped.
    pub fn enter(&self) -> EnterGuard {
        let previous = CURRENT.with(|current| current.replace(Some(self.clone())));
        EnterGuard { previous }
    }

    pub fn schedule(&self, task: Task) {
        self.0.schedule(task)
    }
}

impl fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scheduler").finish_non_exhaustive()
    }
}

impl From<TaskQueue> for Scheduler {
    fn from(queue: TaskQueue) -> Self {
        Scheduler::new(queue)
    }
}

/// Restores the previously current scheduler on drop.
#[must_use = "the scheduler is only current while the guard is alive"]
pub struct EnterGuard {
    previous: Option<Scheduler>,
}

impl Drop for EnterGuard {
    fn drop(&mut self) {
        let previous = self.previous.take();
        CURRENT.with(|current| *current.borrow_mut() = previous);
    }
}

/// A FIFO queue of tasks, drained cooperatively.
///
/// Clones share the same queue, so a clone can be moved to another thread and
/// drained there.
#[derive(Clone, Default)]
pub struct TaskQueue {
    tasks: Arc<Mutex<VecDeque<Task>>>,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        TaskQueue {
            tasks: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
        }
    }

    /// This thread's default queue.
    pub fn current() -> Self {
        DEFAULT_QUEUE.with(Clone::clone)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Runs the oldest task, if any. Returns whether a task ran.
    pub fn tick(&self) -> bool {
        let _enter = Scheduler::from(self.clone()).enter();
        match self.pop() {
            Some(task) => {
                task();
                true
            }
            None => false,
        }
    }

    /// Runs tasks, including the ones they schedule, until the queue is empty.
    /// Returns the number of tasks run.
    pub fn run_until_stalled(&self) -> usize {
        let _enter = Scheduler::from(self.clone()).enter();
        let mut ran = 0;
        while let Some(task) = self.pop() {
            task();
            ran += 1;
        }
        trace!(ran, "task queue stalled");
        ran
    }

    fn pop(&self) -> Option<Task> {
        self.lock().pop_front()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Task>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Schedule for TaskQueue {
    fn schedule(&self, task: Task) {
        self.lock().push_back(task);
    }
}

impl fmt::Debug for TaskQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskQueue").field("len", &self.len()).finish()
    }
}
