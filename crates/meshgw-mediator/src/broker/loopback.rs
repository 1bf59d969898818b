//! In-process broker for local runs and testing

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use meshgw_core::topics::{self, CONFIG_REQUEST_PREFIX};
use meshgw_core::{ConfigResponse, GatewayState, StatusEvent, TopicFilter};
use parking_lot::{Mutex, RwLock};
use tokio::sync::broadcast;
use tracing::{debug, trace, warn};

use super::{BrokerAdapter, BrokerError, BrokerMessage};
use crate::config::{LoopbackConfig, SimulatedGateway};

const DELIVERY_CAPACITY: usize = 1024;

/// Loopback broker
///
/// Everything published is routed back to the subscribers whose filters
/// match. Configured gateways answer configuration requests with their
/// sink list, the way a real gateway would.
pub struct LoopbackBroker {
    gateways: Vec<SimulatedGateway>,
    connected: AtomicBool,
    subscriptions: RwLock<Vec<TopicFilter>>,
    /// Messages published through [`BrokerAdapter::publish`]
    published: Mutex<Vec<BrokerMessage>>,
    deliveries_tx: broadcast::Sender<BrokerMessage>,
}

impl LoopbackBroker {
    pub fn new(config: &LoopbackConfig) -> Self {
        let (deliveries_tx, _) = broadcast::channel(DELIVERY_CAPACITY);
        Self {
            gateways: config.gateways.clone(),
            connected: AtomicBool::new(false),
            subscriptions: RwLock::new(Vec::new()),
            published: Mutex::new(Vec::new()),
            deliveries_tx,
        }
    }

    /// Inject a message as if a gateway had published it
    pub fn inject(&self, topic: impl Into<String>, payload: impl Into<Vec<u8>>) {
        self.route(BrokerMessage::new(topic.into(), payload.into()));
    }

    /// Publish a status event for a gateway
    pub fn announce(&self, gateway_id: &str, state: GatewayState) {
        match serde_json::to_vec(&StatusEvent::new(gateway_id, state)) {
            Ok(payload) => self.inject(topics::status_topic(gateway_id), payload),
            Err(e) => warn!(%gateway_id, error = %e, "Failed to encode status event"),
        }
    }

    /// Announce every simulated gateway as online
    pub fn announce_all(&self) {
        for gateway in &self.gateways {
            self.announce(&gateway.id, GatewayState::Online);
        }
    }

    /// Messages published by clients so far
    pub fn published(&self) -> Vec<BrokerMessage> {
        self.published.lock().clone()
    }

    /// Active subscription filters
    pub fn subscriptions(&self) -> Vec<TopicFilter> {
        self.subscriptions.read().clone()
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    fn route(&self, message: BrokerMessage) {
        let subscribed = self
            .subscriptions
            .read()
            .iter()
            .any(|f| f.matches(&message.topic));
        if !subscribed {
            trace!(topic = %message.topic, "No subscriber for topic");
            return;
        }
        // No receivers is not an error for a broker
        let _ = self.deliveries_tx.send(message);
    }

    /// Answer a configuration request for a simulated gateway
    fn respond(&self, topic: &str) {
        let Some(gateway_id) = topic
            .strip_prefix(CONFIG_REQUEST_PREFIX)
            .and_then(|r| r.strip_prefix('/'))
        else {
            return;
        };
        let Some(gateway) = self.gateways.iter().find(|g| g.id == gateway_id) else {
            debug!(%gateway_id, "Configuration request for unknown gateway");
            return;
        };

        let response = ConfigResponse::new(gateway.id.clone(), gateway.sinks.clone());
        match serde_json::to_vec(&response) {
            Ok(payload) => self.inject(topics::config_response_topic(&gateway.id), payload),
            Err(e) => warn!(gateway_id = %gateway.id, error = %e, "Failed to encode response"),
        }
    }
}

impl Default for LoopbackBroker {
    fn default() -> Self {
        Self::new(&LoopbackConfig::default())
    }
}

#[async_trait]
impl BrokerAdapter for LoopbackBroker {
    async fn connect(&self) -> Result<(), BrokerError> {
        self.set_connected(true);
        Ok(())
    }

    async fn subscribe(&self, filter: &TopicFilter) -> Result<(), BrokerError> {
        if filter.as_str().is_empty() {
            return Err(BrokerError::InvalidFilter("empty filter".to_string()));
        }
        debug!(%filter, "Subscribed");
        self.subscriptions.write().push(filter.clone());
        Ok(())
    }

    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), BrokerError> {
        if !self.connected.load(Ordering::SeqCst) {
            return Err(BrokerError::ConnectionClosed);
        }
        if topic.is_empty() || topic.contains(['+', '#']) {
            return Err(BrokerError::PublishFailed(format!(
                "'{}' is not a valid publish topic",
                topic
            )));
        }

        let message = BrokerMessage::new(topic, payload);
        self.published.lock().push(message.clone());
        self.route(message);
        self.respond(topic);
        Ok(())
    }

    fn deliveries(&self) -> broadcast::Receiver<BrokerMessage> {
        self.deliveries_tx.subscribe()
    }

    async fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}
