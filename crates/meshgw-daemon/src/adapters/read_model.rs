//! Gateway status read model
//!
//! Keeps the latest status record per gateway. Records can arrive more than
//! once for the same gateway (repeated status events, wildcard network
//! filtering), so accepting a record simply replaces the previous one.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use meshgw_core::{ChannelReceiver, ConfigRequest, GatewayStatus, GatewayStatusRecord};
use parking_lot::RwLock;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::TaskError;
use crate::task::{Task, TaskContext};

/// Consumer of gateway status records
pub trait StatusConsumer: Send + Sync + 'static {
    fn accept(&self, record: GatewayStatusRecord);
}

/// Latest known state of one gateway
#[derive(Debug, Clone, Serialize)]
pub struct GatewayEntry {
    pub record: GatewayStatusRecord,
    pub status: GatewayStatus,
    pub updated_at: DateTime<Utc>,
    /// Number of records received for this gateway
    pub updates: u64,
}

/// In-memory view of every gateway seen so far
#[derive(Debug, Default)]
pub struct GatewayStatusView {
    entries: RwLock<HashMap<String, GatewayEntry>>,
}

impl GatewayStatusView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, gateway_id: &str) -> Option<GatewayEntry> {
        self.entries.read().get(gateway_id).cloned()
    }

    /// Status of a gateway, `Unknown` if nothing was received for it
    pub fn status(&self, gateway_id: &str) -> GatewayStatus {
        self.entries
            .read()
            .get(gateway_id)
            .map(|e| e.status)
            .unwrap_or_default()
    }

    /// All entries, sorted by gateway id
    pub fn list(&self) -> Vec<GatewayEntry> {
        let mut entries: Vec<GatewayEntry> = self.entries.read().values().cloned().collect();
        entries.sort_by(|a, b| a.record.gateway_id.cmp(&b.record.gateway_id));
        entries
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

impl StatusConsumer for GatewayStatusView {
    fn accept(&self, record: GatewayStatusRecord) {
        let status = record.status();
        let mut entries = self.entries.write();
        let updates = entries
            .get(&record.gateway_id)
            .map(|e| e.updates + 1)
            .unwrap_or(1);

        debug!(gateway_id = %record.gateway_id, %status, sinks = record.configs.len(), "Gateway status updated");
        entries.insert(
            record.gateway_id.clone(),
            GatewayEntry {
                record,
                status,
                updated_at: Utc::now(),
                updates,
            },
        );
    }
}

impl<C: StatusConsumer> StatusConsumer for Arc<C> {
    fn accept(&self, record: GatewayStatusRecord) {
        (**self).accept(record)
    }
}

/// Feeds status records into a consumer
///
/// Records come from the channel given at construction. If a refresh
/// channel is attached, each gateway id received on it is turned into a
/// [`ConfigRequest`] and sent along this task's route.
pub struct ReadModelTask<C: StatusConsumer> {
    consumer: C,
    records: ChannelReceiver<GatewayStatusRecord>,
    refresh: Option<ChannelReceiver<String>>,
}

impl<C: StatusConsumer> ReadModelTask<C> {
    pub fn new(consumer: C, records: ChannelReceiver<GatewayStatusRecord>) -> Self {
        Self {
            consumer,
            records,
            refresh: None,
        }
    }

    /// Accept gateway ids whose configuration should be requested again
    pub fn with_refresh(mut self, refresh: ChannelReceiver<String>) -> Self {
        self.refresh = Some(refresh);
        self
    }

    fn request_refresh(&self, ctx: &TaskContext, gateway_id: String) {
        let Some(outbox) = ctx.outbox() else {
            warn!(task = %ctx.name(), %gateway_id, "Refresh requested but task has no route");
            return;
        };
        info!(task = %ctx.name(), %gateway_id, "Requesting gateway configuration refresh");
        if outbox.send(ConfigRequest::new(gateway_id).into()).is_err() {
            warn!(task = %ctx.name(), "Route closed, refresh dropped");
        }
    }
}

async fn next_refresh(refresh: &Option<ChannelReceiver<String>>) -> Option<String> {
    match refresh {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

#[async_trait]
impl<C: StatusConsumer> Task for ReadModelTask<C> {
    async fn run(self: Box<Self>, ctx: TaskContext) -> Result<(), TaskError> {
        loop {
            tokio::select! {
                _ = ctx.shutdown_token().cancelled() => break,
                record = self.records.recv() => match record {
                    Some(record) => self.consumer.accept(record),
                    None if ctx.is_shutting_down() => break,
                    None => {
                        return Err(TaskError::ChannelClosed("status records".to_string()));
                    }
                },
                envelope = ctx.inbox().recv() => match envelope {
                    Some(other) => {
                        debug!(task = %ctx.name(), kind = other.kind(), "Read model ignoring message");
                    }
                    None => break,
                },
                Some(gateway_id) = next_refresh(&self.refresh) => {
                    self.request_refresh(&ctx, gateway_id);
                }
            }
        }
        Ok(())
    }
}
