//! Broker errors

use thiserror::Error;

#[derive(Debug, Error, Clone)]
pub enum BrokerError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Publish failed: {0}")]
    PublishFailed(String),

    #[error("Invalid topic filter: {0}")]
    InvalidFilter(String),

    #[error("Broker not supported: {0}")]
    Unsupported(String),
}
