//! Shared harness for the integration tests

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use meshgw_core::{channel, ChannelSender, NetworkFilter, Sink};
use meshgw_daemon::{
    Daemon, ExecutionParams, GatewayStatusView, MemorySink, ReadModelTask, RecordSink, SinkTask,
};
use meshgw_mediator::{
    LoopbackBroker, LoopbackConfig, MediatorArgs, MediatorConfig, MediatorTask, SimulatedGateway,
};

pub const STORAGE: &str = "storage";
pub const MEDIATOR: &str = "mediator";
pub const READ_MODEL: &str = "read-model";

/// A daemon wired the way meshgwd wires it, with in-memory consumers
pub struct Harness<S: RecordSink = MemorySink> {
    pub daemon: Daemon,
    pub broker: Arc<LoopbackBroker>,
    pub sink: Option<Arc<S>>,
    pub view: Arc<GatewayStatusView>,
    pub refresh: ChannelSender<String>,
}

pub struct HarnessBuilder {
    gateways: Vec<SimulatedGateway>,
    network_id: NetworkFilter,
    deduplicate_status: bool,
    storage: bool,
    workers: usize,
}

impl Default for HarnessBuilder {
    fn default() -> Self {
        Self {
            gateways: Vec::new(),
            network_id: NetworkFilter::Any,
            deduplicate_status: false,
            storage: true,
            workers: 4,
        }
    }
}

impl HarnessBuilder {
    pub fn gateway(mut self, id: &str, networks: &[u64]) -> Self {
        let sinks = networks
            .iter()
            .enumerate()
            .map(|(i, net)| Sink::new(format!("sink{}", i), *net))
            .collect();
        self.gateways.push(SimulatedGateway {
            id: id.to_string(),
            sinks,
        });
        self
    }

    pub fn network(mut self, network_id: u64) -> Self {
        self.network_id = NetworkFilter::Network(network_id);
        self
    }

    pub fn deduplicate(mut self) -> Self {
        self.deduplicate_status = true;
        self
    }

    pub fn without_storage(mut self) -> Self {
        self.storage = false;
        self
    }

    pub fn build(self) -> Harness<MemorySink> {
        self.build_with(Arc::new(MemorySink::new()))
    }

    pub fn build_with<S: RecordSink>(self, sink: Arc<S>) -> Harness<S> {
        let broker = Arc::new(LoopbackBroker::new(&LoopbackConfig {
            gateways: self.gateways,
        }));
        let mut daemon = Daemon::new();
        let (statuses_tx, statuses_rx) = channel();
        let (refresh_tx, refresh_rx) = channel();

        let sink = if self.storage {
            daemon
                .register(STORAGE, |sink, _ctx| Ok(SinkTask::new(sink)), sink.clone(), None)
                .unwrap();
            daemon
                .configure(STORAGE, ExecutionParams::with_workers(self.workers))
                .unwrap();
            Some(sink)
        } else {
            None
        };

        let config = MediatorConfig {
            network_id: self.network_id,
            deduplicate_status: self.deduplicate_status,
            ..Default::default()
        };
        daemon
            .register(
                MEDIATOR,
                MediatorTask::build,
                MediatorArgs {
                    broker: broker.clone(),
                    config,
                    statuses: statuses_tx,
                },
                sink.as_ref().map(|_| STORAGE),
            )
            .unwrap();

        let view = Arc::new(GatewayStatusView::new());
        daemon
            .register(
                READ_MODEL,
                |(view, records, refresh), _ctx| {
                    Ok(ReadModelTask::new(view, records).with_refresh(refresh))
                },
                (view.clone(), statuses_rx, refresh_rx),
                Some(MEDIATOR),
            )
            .unwrap();

        Harness {
            daemon,
            broker,
            sink,
            view,
            refresh: refresh_tx,
        }
    }
}

pub fn harness() -> HarnessBuilder {
    HarnessBuilder::default()
}

/// Poll `condition` until it holds or a second has passed
pub async fn eventually(mut condition: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    condition()
}

/// Give in-flight deliveries time to settle
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}
