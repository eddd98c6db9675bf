//! Run and executor errors

use std::any::Any;

use thiserror::Error;

/// Failure reported through a run's completion channel.
///
/// A run carries the first failure recorded by any of its tasks. Branches
/// not depending on the failed task still run to completion.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RunError {
    #[error("task `{task}` failed: {message}")]
    TaskFailed { task: String, message: String },

    #[error("task `{task}` panicked: {message}")]
    TaskPanicked { task: String, message: String },

    #[error("task `{task}` is a placeholder without work")]
    MissingWork { task: String },
}

impl RunError {
    /// Label of the task that caused the failure.
    pub fn task(&self) -> &str {
        match self {
            RunError::TaskFailed { task, .. }
            | RunError::TaskPanicked { task, .. }
            | RunError::MissingWork { task } => task,
        }
    }

    pub(crate) fn failed(
        task: String,
        error: &anyhow::Error,
    ) -> Self {
        RunError::TaskFailed {
            task,
            message: format!("{error:#}"),
        }
    }

    pub(crate) fn panicked(
        task: String,
        payload: &(dyn Any + Send),
    ) -> Self {
        RunError::TaskPanicked {
            task,
            message: panic_message(payload),
        }
    }
}

/// Errors raised while constructing an executor.
#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("an executor needs at least one worker thread")]
    NoWorkers,

    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),
}

pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
