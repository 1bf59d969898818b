//! Mediator task
//!
//! Runs the [`Mediator`] under the daemon: broker deliveries are fed to
//! [`Mediator::deliver`], and configuration requests arriving in the task
//! inbox (from the mediator itself or routed from other tasks) are published
//! to the broker.

use std::sync::Arc;

use async_trait::async_trait;
use meshgw_core::{ChannelSender, ConfigRequest, GatewayStatusRecord};
use meshgw_daemon::{Envelope, Task, TaskContext, TaskError};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, info, warn};

use crate::broker::{BrokerAdapter, BrokerMessage};
use crate::config::MediatorConfig;
use crate::mediator::{Mediator, MediatorChannels};

/// Constructor arguments of [`MediatorTask`]
pub struct MediatorArgs {
    pub broker: Arc<dyn BrokerAdapter>,
    pub config: MediatorConfig,
    /// Status records for the read model
    pub statuses: ChannelSender<GatewayStatusRecord>,
}

pub struct MediatorTask {
    mediator: Mediator,
    broker: Arc<dyn BrokerAdapter>,
    deliveries: Option<broadcast::Receiver<BrokerMessage>>,
}

impl MediatorTask {
    /// Task factory for [`meshgw_daemon::Daemon::register`]
    ///
    /// Requests go to the task's own inbox; data goes along the task's
    /// route, if it has one.
    pub fn build(args: MediatorArgs, ctx: &TaskContext) -> Result<Self, TaskError> {
        let channels = MediatorChannels {
            requests: ctx.inbox_sender(),
            statuses: args.statuses,
            storage: ctx.outbox().cloned(),
        };
        if channels.storage.is_none() {
            info!(task = %ctx.name(), "No storage route, received data will be dropped");
        }

        Ok(Self {
            mediator: Mediator::new(&args.config, ctx.gate().clone(), channels),
            broker: args.broker,
            deliveries: None,
        })
    }

    pub fn mediator(&self) -> &Mediator {
        &self.mediator
    }
}

async fn publish_request(broker: &dyn BrokerAdapter, request: &ConfigRequest) {
    let payload = match request.to_payload() {
        Ok(payload) => payload,
        Err(e) => {
            warn!(gateway_id = %request.gateway_id, error = %e, "Failed to encode configuration request");
            return;
        }
    };

    let topic = request.topic();
    match broker.publish(&topic, payload).await {
        Ok(()) => debug!(%topic, "Configuration request published"),
        Err(e) => warn!(%topic, error = %e, "Configuration request not published"),
    }
}

#[async_trait]
impl Task for MediatorTask {
    async fn initialize(&mut self, ctx: &TaskContext) -> Result<(), TaskError> {
        if !self.broker.is_connected().await {
            self.broker
                .connect()
                .await
                .map_err(|e| TaskError::Init(e.to_string()))?;
        }

        // Subscribe to deliveries before the filters so nothing is missed
        self.deliveries = Some(self.broker.deliveries());
        for filter in self.mediator.subscriptions().filters() {
            self.broker
                .subscribe(filter)
                .await
                .map_err(|e| TaskError::Init(e.to_string()))?;
        }

        info!(
            task = %ctx.name(),
            network_id = %self.mediator.network_filter(),
            "Mediator subscribed"
        );
        Ok(())
    }

    async fn run(self: Box<Self>, ctx: TaskContext) -> Result<(), TaskError> {
        let MediatorTask {
            mediator,
            broker,
            deliveries,
        } = *self;
        let mut deliveries = deliveries.unwrap_or_else(|| broker.deliveries());

        loop {
            tokio::select! {
                _ = ctx.shutdown_token().cancelled() => break,
                delivery = deliveries.recv() => match delivery {
                    Ok(message) => {
                        mediator.deliver(&message.topic, &message.payload);
                    }
                    Err(RecvError::Lagged(n)) => {
                        warn!(task = %ctx.name(), skipped = n, "Mediator lagging, deliveries lost");
                    }
                    Err(RecvError::Closed) => {
                        return Err(TaskError::Runtime("broker delivery closed".to_string()));
                    }
                },
                envelope = ctx.inbox().recv() => match envelope {
                    Some(Envelope::Request(request)) => publish_request(&*broker, &request).await,
                    Some(other) => {
                        debug!(task = %ctx.name(), kind = other.kind(), "Mediator ignoring message");
                    }
                    None => break,
                },
            }
        }

        info!(task = %ctx.name(), "Mediator stopped");
        Ok(())
    }
}
