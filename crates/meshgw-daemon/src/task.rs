//! Task trait, descriptor state and execution context

use std::fmt;

use async_trait::async_trait;
use meshgw_core::{channel, ChannelReceiver, ChannelSender, ConfigRequest, DataMessage, ReadinessGate};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::error::TaskError;

/// Message passed between tasks along a route
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope {
    /// Received sink data, for the storage sink
    Data(DataMessage),
    /// Configuration request, for the broker-facing mediator
    Request(ConfigRequest),
}

impl Envelope {
    pub fn kind(&self) -> &'static str {
        match self {
            Envelope::Data(_) => "data",
            Envelope::Request(_) => "request",
        }
    }
}

impl From<DataMessage> for Envelope {
    fn from(message: DataMessage) -> Self {
        Envelope::Data(message)
    }
}

impl From<ConfigRequest> for Envelope {
    fn from(request: ConfigRequest) -> Self {
        Envelope::Request(request)
    }
}

/// Per-task execution parameters, set with [`Daemon::configure`](crate::Daemon::configure)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionParams {
    /// Number of concurrent workers for pool-based tasks
    #[serde(default = "default_workers")]
    pub workers: usize,
}

fn default_workers() -> usize {
    1
}

impl Default for ExecutionParams {
    fn default() -> Self {
        Self {
            workers: default_workers(),
        }
    }
}

impl ExecutionParams {
    pub fn with_workers(workers: usize) -> Self {
        Self { workers }
    }
}

/// Lifecycle of a registered task
///
/// ```text
/// Registered ──► Configured ──► Running ──► Stopped
///      │              │            │
///      └──────────────┴────────────┴──────► Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskState {
    Registered,
    Configured,
    Running,
    Stopped,
    Failed,
}

impl TaskState {
    /// Transitions only ever move forward; re-configuring is allowed
    pub fn can_transition_to(self, next: TaskState) -> bool {
        use TaskState::*;
        matches!(
            (self, next),
            (Registered, Configured)
                | (Configured, Configured)
                | (Configured, Running)
                | (Running, Stopped)
                | (Registered | Configured | Running, Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Stopped | TaskState::Failed)
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            TaskState::Registered => "REGISTERED",
            TaskState::Configured => "CONFIGURED",
            TaskState::Running => "RUNNING",
            TaskState::Stopped => "STOPPED",
            TaskState::Failed => "FAILED",
        };
        f.write_str(label)
    }
}

/// Everything a task receives from the daemon
///
/// The inbox is fed by every task that routes to this one. The outbox, if
/// any, is the inbox of the task named in this task's routing.
#[derive(Debug)]
pub struct TaskContext {
    name: String,
    params: ExecutionParams,
    gate: ReadinessGate,
    inbox: ChannelReceiver<Envelope>,
    inbox_tx: ChannelSender<Envelope>,
    outbox: Option<ChannelSender<Envelope>>,
    shutdown: CancellationToken,
}

impl TaskContext {
    /// Context with its own fresh inbox and no outbox
    ///
    /// The daemon builds contexts itself; this is for driving a task
    /// outside of a daemon.
    pub fn new(name: impl Into<String>, params: ExecutionParams, gate: ReadinessGate) -> Self {
        let (inbox_tx, inbox) = channel();
        Self {
            name: name.into(),
            params,
            gate,
            inbox,
            inbox_tx,
            outbox: None,
            shutdown: CancellationToken::new(),
        }
    }

    pub(crate) fn wired(
        name: &str,
        params: ExecutionParams,
        gate: ReadinessGate,
        inbox: (ChannelSender<Envelope>, ChannelReceiver<Envelope>),
        outbox: Option<ChannelSender<Envelope>>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            name: name.to_string(),
            params,
            gate,
            inbox_tx: inbox.0,
            inbox: inbox.1,
            outbox,
            shutdown,
        }
    }

    /// Attach an outbox (the inbox of a downstream task)
    pub fn with_outbox(mut self, outbox: ChannelSender<Envelope>) -> Self {
        self.outbox = Some(outbox);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn params(&self) -> &ExecutionParams {
        &self.params
    }

    pub fn gate(&self) -> &ReadinessGate {
        &self.gate
    }

    pub fn inbox(&self) -> &ChannelReceiver<Envelope> {
        &self.inbox
    }

    /// Sender into this task's own inbox
    pub fn inbox_sender(&self) -> ChannelSender<Envelope> {
        self.inbox_tx.clone()
    }

    pub fn outbox(&self) -> Option<&ChannelSender<Envelope>> {
        self.outbox.as_ref()
    }

    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.is_cancelled()
    }
}

/// A unit of work run by the daemon
///
/// The daemon calls [`initialize`](Task::initialize) first and reports the
/// task as initialized once it returns `Ok`. [`run`](Task::run) then owns
/// the task until it finishes or the shutdown token is cancelled.
#[async_trait]
pub trait Task: Send + 'static {
    async fn initialize(&mut self, _ctx: &TaskContext) -> Result<(), TaskError> {
        Ok(())
    }

    async fn run(self: Box<Self>, ctx: TaskContext) -> Result<(), TaskError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_forward_transitions() {
        assert!(TaskState::Registered.can_transition_to(TaskState::Configured));
        assert!(TaskState::Configured.can_transition_to(TaskState::Running));
        assert!(TaskState::Running.can_transition_to(TaskState::Stopped));
        assert!(TaskState::Running.can_transition_to(TaskState::Failed));
    }

    #[test]
    fn test_no_backward_transitions() {
        assert!(!TaskState::Running.can_transition_to(TaskState::Configured));
        assert!(!TaskState::Stopped.can_transition_to(TaskState::Running));
        assert!(!TaskState::Failed.can_transition_to(TaskState::Running));
        assert!(!TaskState::Registered.can_transition_to(TaskState::Running));
    }

    #[test]
    fn test_default_params() {
        assert_eq!(ExecutionParams::default().workers, 1);
    }

    #[test]
    fn test_context_outbox() {
        let (tx, rx) = channel();
        let ctx = TaskContext::new("read-model", ExecutionParams::default(), ReadinessGate::new())
            .with_outbox(tx);

        ctx.outbox()
            .unwrap()
            .send(ConfigRequest::new("gw-1").into())
            .unwrap();
        assert_eq!(
            rx.try_recv(),
            Some(Envelope::Request(ConfigRequest::new("gw-1")))
        );
    }

    struct Noop;

    #[async_trait]
    impl Task for Noop {
        async fn run(self: Box<Self>, _ctx: TaskContext) -> Result<(), TaskError> {
            Ok(())
        }
    }

    #[test]
    fn test_default_initialize_succeeds() {
        let ctx = TaskContext::new("noop", ExecutionParams::default(), ReadinessGate::new());
        let mut task = Noop;
        tokio_test::assert_ok!(tokio_test::block_on(task.initialize(&ctx)));
        assert!(!ctx.is_shutting_down());
    }
}
