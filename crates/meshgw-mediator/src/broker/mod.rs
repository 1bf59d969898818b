//! Broker layer
//!
//! The mediator talks to the publish/subscribe broker through
//! [`BrokerAdapter`]. A loopback adapter is built in for local runs and
//! tests; network MQTT clients are plugged in by implementing the trait.
//!
//! # Example
//!
//! ```ignore
//! use meshgw_mediator::broker::{create_broker, BrokerAdapter};
//! use meshgw_mediator::config::BrokerConfig;
//!
//! let broker = create_broker(&BrokerConfig::default())?;
//! broker.publish("gw-request/get_configs/gw-1", b"{}".to_vec()).await?;
//! ```

mod adapter;
pub mod error;
pub mod loopback;

pub use adapter::{BrokerAdapter, BrokerMessage};
pub use error::BrokerError;
pub use loopback::LoopbackBroker;

use std::sync::Arc;

use crate::config::BrokerConfig;

/// Create a broker adapter based on configuration
pub fn create_broker(config: &BrokerConfig) -> Result<Arc<dyn BrokerAdapter>, BrokerError> {
    match config {
        BrokerConfig::Loopback(cfg) => Ok(Arc::new(LoopbackBroker::new(cfg))),
        BrokerConfig::Mqtt(cfg) => Err(BrokerError::Unsupported(format!(
            "MQTT client for {}:{} is not built in; provide a BrokerAdapter implementation",
            cfg.host, cfg.port
        ))),
    }
}
