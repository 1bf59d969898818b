//! Shared data models for gateway coordination

mod gateway;
mod message;

pub use gateway::*;
pub use message::*;
