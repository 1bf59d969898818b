//! meshgw-daemon - Task registry for mesh gateway coordination
//!
//! The daemon owns a table of named tasks, wires their inbound channels
//! together and starts them concurrently. Once every task reports that it
//! is initialized the shared [`ReadinessGate`] is set, which releases the
//! mediator's message handlers.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                           Daemon                             │
//! │                                                              │
//! │   register / configure        start(gate_after_all_running)  │
//! │          │                               │                   │
//! │          ▼                               ▼                   │
//! │  ┌───────────────┐   resolve    ┌──────────────────────┐     │
//! │  │TaskDescriptor │ ───────────► │ inbox per task,      │     │
//! │  │ name, factory │   routing    │ outbox = route target│     │
//! │  │ params, route │              └──────────┬───────────┘     │
//! │  └───────────────┘                         │ spawn           │
//! │                      ┌─────────────────────┼──────────┐      │
//! │                      ▼                     ▼          ▼      │
//! │                 ┌─────────┐          ┌─────────┐ ┌─────────┐ │
//! │                 │mediator │ ───────► │  sink   │ │read-    │ │
//! │                 │         │          │ workers │ │model    │ │
//! │                 └─────────┘          └─────────┘ └─────────┘ │
//! │                                                              │
//! │      all initialized ──► ReadinessGate::set()                │
//! └──────────────────────────────────────────────────────────────┘
//! ```

pub mod adapters;
pub mod daemon;
pub mod error;
pub mod task;

pub use adapters::{
    GatewayEntry, GatewayStatusView, LogSink, MemorySink, ReadModelTask, RecordSink, SinkError,
    SinkTask, StatusConsumer,
};
pub use daemon::Daemon;
pub use error::{DaemonError, TaskError};
pub use task::{Envelope, ExecutionParams, Task, TaskContext, TaskState};

// Re-export core types for convenience
pub use meshgw_core::{channel, ChannelReceiver, ChannelSender, ReadinessGate};
