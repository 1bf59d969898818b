//! Common error types for gateway message handling

use thiserror::Error;

/// Errors raised while decoding an inbound broker message
#[derive(Debug, Error)]
pub enum DecodeError {
    /// Payload is not a valid encoding of the expected message kind
    #[error("Malformed {kind} payload: {source}")]
    Payload {
        /// Message kind that was being decoded (e.g. "status event")
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },

    /// Topic does not follow the expected level layout
    #[error("Malformed topic: {0}")]
    Topic(String),
}

/// A network filter string was neither `+` nor a network identifier
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Invalid network filter '{0}': expected '+' or a numeric network id")]
pub struct ParseFilterError(pub String);

/// Every receiver of a channel has been dropped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Channel closed")]
pub struct ChannelClosed;
