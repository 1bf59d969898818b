//! Downstream adapters fed by the mediator
//!
//! - [`SinkTask`] drains data messages into a [`RecordSink`] with a pool
//!   of workers
//! - [`ReadModelTask`] feeds gateway status records into a
//!   [`StatusConsumer`] such as the in-memory [`GatewayStatusView`]

mod read_model;
mod sink;

pub use read_model::{GatewayEntry, GatewayStatusView, ReadModelTask, StatusConsumer};
pub use sink::{LogSink, MemorySink, RecordSink, SinkError, SinkTask};
