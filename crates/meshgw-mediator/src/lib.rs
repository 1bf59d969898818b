//! meshgw-mediator - Gateway status/configuration mediator
//!
//! The mediator sits between the broker and the downstream tasks. It
//! translates three inbound topic classes into outbound configuration
//! requests and downstream records:
//!
//! ```text
//!                     ┌─────────────────────────────┐
//!  gw-event/status ──►│                             │──► ConfigRequest ──► broker
//!  gw-response/    ──►│          Mediator           │──► GatewayStatusRecord ──► read model
//!    get_configs      │  (gated by ReadinessGate)   │
//!  gw-event/       ──►│                             │──► DataMessage ──► storage sink
//!    received_data    └─────────────────────────────┘
//! ```
//!
//! The mediator keeps no per-gateway state by default; every decision is
//! local to the message that triggered it. A [`StatusTracker`] can be
//! plugged in to suppress repeated status events.

pub mod broker;
pub mod config;
pub mod mediator;
pub mod task;
pub mod tracker;

pub use broker::{create_broker, BrokerAdapter, BrokerError, BrokerMessage, LoopbackBroker};
pub use config::{BrokerConfig, LoopbackConfig, MediatorConfig, MqttConfig, SimulatedGateway};
pub use mediator::{Mediator, MediatorChannels, Outcome, Subscriptions};
pub use task::{MediatorArgs, MediatorTask};
pub use tracker::{LastKnownState, Stateless, StatusTracker};
