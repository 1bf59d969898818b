//! Task wiring
//!
//! ```text
//!   ┌────────────┐  Envelope::Request   ┌──────────────┐  Envelope::Data  ┌───────────┐
//!   │ read-model │ ───────────────────► │   mediator   │ ───────────────► │  storage  │
//!   └────────────┘                      └──────────────┘                  └───────────┘
//!         ▲        GatewayStatusRecord        │
//!         └───────────────────────────────────┘
//! ```

use std::sync::Arc;
use std::time::Duration;

use meshgw_core::{ChannelSender, GatewayStatus};
use meshgw_daemon::{
    Daemon, DaemonError, ExecutionParams, GatewayStatusView, LogSink, ReadModelTask, SinkTask,
};
use meshgw_mediator::{
    create_broker, BrokerAdapter, BrokerConfig, BrokerError, LoopbackBroker, MediatorArgs,
    MediatorTask,
};
use thiserror::Error;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::config::Settings;

pub const STORAGE_TASK: &str = "storage";
pub const MEDIATOR_TASK: &str = "mediator";
pub const READ_MODEL_TASK: &str = "read-model";

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Broker: {0}")]
    Broker(#[from] BrokerError),

    #[error(transparent)]
    Daemon(#[from] DaemonError),
}

/// The wired daemon and the handles the binary keeps
pub struct App {
    pub daemon: Daemon,
    pub view: Arc<GatewayStatusView>,
    /// Set when running on the loopback broker
    pub loopback: Option<Arc<LoopbackBroker>>,
    refresh: ChannelSender<String>,
}

impl App {
    /// Register and configure every task
    pub fn build(settings: &Settings) -> Result<Self, AppError> {
        let (broker, loopback): (Arc<dyn BrokerAdapter>, _) = match &settings.broker {
            BrokerConfig::Loopback(cfg) => {
                let loopback = Arc::new(LoopbackBroker::new(cfg));
                (loopback.clone(), Some(loopback))
            }
            other => (create_broker(other)?, None),
        };

        let mut daemon = Daemon::new();
        let view = Arc::new(GatewayStatusView::new());
        let (statuses_tx, statuses_rx) = daemon.create_channel();
        let (refresh_tx, refresh_rx) = daemon.create_channel();

        let storage_route = if settings.daemon.storage {
            daemon.register(
                STORAGE_TASK,
                |sink, _ctx| Ok(SinkTask::new(sink)),
                Arc::new(LogSink),
                None,
            )?;
            daemon.configure(
                STORAGE_TASK,
                ExecutionParams::with_workers(settings.sink.workers),
            )?;
            Some(STORAGE_TASK)
        } else {
            info!("Storage disabled, received data will be dropped");
            None
        };

        daemon.register(
            MEDIATOR_TASK,
            MediatorTask::build,
            MediatorArgs {
                broker,
                config: settings.filter.clone(),
                statuses: statuses_tx,
            },
            storage_route,
        )?;

        daemon.register(
            READ_MODEL_TASK,
            |(view, records, refresh), _ctx| {
                Ok(ReadModelTask::new(view, records).with_refresh(refresh))
            },
            (view.clone(), statuses_rx, refresh_rx),
            Some(MEDIATOR_TASK),
        )?;

        Ok(Self {
            daemon,
            view,
            loopback,
            refresh: refresh_tx,
        })
    }

    /// Periodically re-request the configuration of online gateways
    pub fn spawn_refresh(&self, every: Duration) -> JoinHandle<()> {
        let view = self.view.clone();
        let refresh = self.refresh.clone();
        let gate = self.daemon.gate();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                if !gate.is_set() {
                    continue;
                }
                for entry in view.list() {
                    if entry.status != GatewayStatus::Online {
                        continue;
                    }
                    debug!(gateway_id = %entry.record.gateway_id, "Scheduling configuration refresh");
                    if refresh.send(entry.record.gateway_id).is_err() {
                        return;
                    }
                }
            }
        })
    }
}
