//! meshgw-core - Core types for mesh gateway coordination
//!
//! This crate provides the building blocks shared by the mediator and the
//! task daemon: the gateway/sink data model, the broker topic scheme, the
//! write-once [`ReadinessGate`] and the unbounded [`channel`] used to wire
//! tasks together.

pub mod channel;
pub mod error;
pub mod gate;
pub mod models;
pub mod topics;

pub use channel::{channel, ChannelReceiver, ChannelSender};
pub use error::{ChannelClosed, DecodeError, ParseFilterError};
pub use gate::ReadinessGate;
pub use models::*;
pub use topics::{TopicClass, TopicFilter};
