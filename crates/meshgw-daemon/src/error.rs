//! Daemon and task errors

use thiserror::Error;

use crate::task::TaskState;

/// Errors raised by a task while initializing or running
#[derive(Debug, Clone, Error)]
pub enum TaskError {
    /// Task could not acquire what it needs to run
    #[error("Initialization failed: {0}")]
    Init(String),

    /// A channel the task depends on was closed
    #[error("Channel closed: {0}")]
    ChannelClosed(String),

    /// Failure while running
    #[error("{0}")]
    Runtime(String),

    /// Task panicked
    #[error("Task panicked: {0}")]
    Panicked(String),
}

/// Errors raised by the daemon's registry and lifecycle operations
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("Task '{0}' is already registered")]
    DuplicateTask(String),

    #[error("Task not found: {0}")]
    UnknownTask(String),

    /// Routing names a task that was never registered
    #[error("Task '{task}' routes its output to unknown task '{target}'")]
    UnknownRoute { task: String, target: String },

    #[error("Task '{0}' cannot route its output to itself")]
    SelfRoute(String),

    #[error("Invalid execution parameters for task '{task}': {reason}")]
    InvalidParams { task: String, reason: String },

    #[error("Task '{task}' cannot move from {from} to {to}")]
    InvalidTransition {
        task: String,
        from: TaskState,
        to: TaskState,
    },

    #[error("Daemon already started")]
    AlreadyStarted,

    #[error("Daemon not started")]
    NotStarted,

    /// A registered task could not reach RUNNING
    #[error("Task '{name}' failed to initialize: {reason}")]
    TaskInitialization { name: String, reason: String },

    /// A running task ended with an error
    #[error("Task '{name}' failed: {reason}")]
    TaskFailed { name: String, reason: String },
}
