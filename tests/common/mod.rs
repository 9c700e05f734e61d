#![allow(dead_code)]

use std::sync::Once;

use thenable::{Error, TaskQueue};

static INIT_LOGGING: Once = Once::new();

/// Initialize test logging with trace-level output.
pub fn init_test_logging() {
    INIT_LOGGING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::TRACE)
            .with_test_writer()
            .with_target(true)
            .with_thread_ids(true)
            .with_ansi(false)
            .try_init();
    });
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TestError {
    #[error("{0}")]
    Msg(String),
    #[error(transparent)]
    Future(#[from] Error),
}

impl From<&str> for TestError {
    fn from(msg: &str) -> Self {
        TestError::Msg(msg.to_owned())
    }
}

pub fn drain() -> usize {
    TaskQueue::current().run_until_stalled()
}
