//! Broker adapter trait and types

use async_trait::async_trait;
use bytes::Bytes;
use meshgw_core::TopicFilter;
use tokio::sync::broadcast;

use super::BrokerError;

/// A message delivered by the broker
#[derive(Debug, Clone, PartialEq)]
pub struct BrokerMessage {
    pub topic: String,
    pub payload: Bytes,
}

impl BrokerMessage {
    pub fn new(topic: impl Into<String>, payload: impl Into<Bytes>) -> Self {
        Self {
            topic: topic.into(),
            payload: payload.into(),
        }
    }
}

/// Publish/subscribe interface to the gateway broker
///
/// Deliveries for every subscribed filter arrive on the broadcast channel
/// returned by [`BrokerAdapter::deliveries`].
#[async_trait]
pub trait BrokerAdapter: Send + Sync {
    /// Establish the broker session
    async fn connect(&self) -> Result<(), BrokerError>;

    /// Register interest in a topic filter
    async fn subscribe(&self, filter: &TopicFilter) -> Result<(), BrokerError>;

    /// Publish a payload; delivery is at-most-once
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), BrokerError>;

    /// Receiver for messages matching the subscribed filters
    fn deliveries(&self) -> broadcast::Receiver<BrokerMessage>;

    async fn is_connected(&self) -> bool;
}
