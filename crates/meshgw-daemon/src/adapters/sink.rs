//! Storage sink adapter

use std::sync::Arc;

use async_trait::async_trait;
use meshgw_core::DataMessage;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::error::TaskError;
use crate::task::{Envelope, Task, TaskContext};

#[derive(Debug, Error)]
pub enum SinkError {
    /// The sink refused the message; it is dropped
    #[error("Record rejected: {0}")]
    Rejected(String),

    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}

/// Persistence sink for received data
///
/// Implementations may be called from several workers at once.
#[async_trait]
pub trait RecordSink: Send + Sync + 'static {
    /// Check the sink can accept records; called once before the gate opens
    async fn connect(&self) -> Result<(), SinkError> {
        Ok(())
    }

    async fn accept(&self, message: DataMessage) -> Result<(), SinkError>;
}

/// Sink that only logs what it receives
#[derive(Debug, Default)]
pub struct LogSink;

#[async_trait]
impl RecordSink for LogSink {
    async fn accept(&self, message: DataMessage) -> Result<(), SinkError> {
        debug!(
            gateway_id = %message.key.gateway_id,
            sink_id = %message.key.sink_id,
            network_id = message.key.network_id,
            source_endpoint = ?message.key.source_endpoint,
            destination_endpoint = ?message.key.destination_endpoint,
            bytes = message.payload.len(),
            "Received data"
        );
        Ok(())
    }
}

/// Sink that keeps every message in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    messages: Mutex<Vec<DataMessage>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> Vec<DataMessage> {
        self.messages.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.messages.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.lock().is_empty()
    }
}

#[async_trait]
impl RecordSink for MemorySink {
    async fn accept(&self, message: DataMessage) -> Result<(), SinkError> {
        self.messages.lock().push(message);
        Ok(())
    }
}

/// Drains `Envelope::Data` from the task inbox into a sink
///
/// Runs `params.workers` workers over the shared inbox, so messages may be
/// stored out of order.
pub struct SinkTask<S: RecordSink> {
    sink: Arc<S>,
}

impl<S: RecordSink> SinkTask<S> {
    pub fn new(sink: Arc<S>) -> Self {
        Self { sink }
    }
}

#[async_trait]
impl<S: RecordSink> Task for SinkTask<S> {
    async fn initialize(&mut self, ctx: &TaskContext) -> Result<(), TaskError> {
        self.sink
            .connect()
            .await
            .map_err(|e| TaskError::Init(e.to_string()))?;
        info!(task = %ctx.name(), workers = ctx.params().workers, "Sink connected");
        Ok(())
    }

    async fn run(self: Box<Self>, ctx: TaskContext) -> Result<(), TaskError> {
        let ctx = Arc::new(ctx);
        let stop = ctx.shutdown_token().child_token();
        let mut workers = JoinSet::new();

        for worker in 0..ctx.params().workers {
            let ctx = Arc::clone(&ctx);
            let sink = Arc::clone(&self.sink);
            let stop = stop.clone();
            workers.spawn(sink_worker(worker, sink, ctx, stop));
        }

        // A failed worker stops the others; every worker is awaited
        let mut failure = None;
        while let Some(result) = workers.join_next().await {
            if let Err(e) = result {
                error!(task = %ctx.name(), error = %e, "Sink worker failed, stopping pool");
                stop.cancel();
                failure.get_or_insert_with(|| TaskError::Runtime(format!("sink worker: {}", e)));
            }
        }

        match failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

async fn sink_worker<S: RecordSink>(
    worker: usize,
    sink: Arc<S>,
    ctx: Arc<TaskContext>,
    stop: CancellationToken,
) {
    loop {
        let item = tokio::select! {
            _ = stop.cancelled() => break,
            item = ctx.inbox().recv() => item,
        };

        match item {
            Some(Envelope::Data(message)) => {
                if let Err(e) = sink.accept(message).await {
                    warn!(task = %ctx.name(), worker, error = %e, "Sink dropped message");
                }
            }
            Some(other) => {
                debug!(task = %ctx.name(), kind = other.kind(), "Sink ignoring message");
            }
            None => break,
        }
    }
    debug!(task = %ctx.name(), worker, "Sink worker exiting");
}
