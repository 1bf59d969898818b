//! Per-gateway status tracking
//!
//! The mediator is stateless by default: every status event triggers a
//! request or a record. [`LastKnownState`] remembers the last state seen per
//! gateway and suppresses repeats.

use std::collections::HashMap;

use meshgw_core::{GatewayState, GatewayStatus, StatusEvent};
use parking_lot::Mutex;

/// Decides whether a status event is acted upon
pub trait StatusTracker: Send + Sync {
    /// Record the event; returns `false` if it should be suppressed
    fn observe(&self, event: &StatusEvent) -> bool;
}

/// Acts on every status event
#[derive(Debug, Default, Clone, Copy)]
pub struct Stateless;

impl StatusTracker for Stateless {
    fn observe(&self, _event: &StatusEvent) -> bool {
        true
    }
}

/// Suppresses a status event if it repeats the gateway's last state
#[derive(Debug, Default)]
pub struct LastKnownState {
    states: Mutex<HashMap<String, GatewayState>>,
}

impl LastKnownState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self, gateway_id: &str) -> GatewayStatus {
        self.states
            .lock()
            .get(gateway_id)
            .map(|s| GatewayStatus::from(*s))
            .unwrap_or_default()
    }

    /// Forget a gateway so its next event is acted upon
    pub fn forget(&self, gateway_id: &str) {
        self.states.lock().remove(gateway_id);
    }
}

impl StatusTracker for LastKnownState {
    fn observe(&self, event: &StatusEvent) -> bool {
        let previous = self
            .states
            .lock()
            .insert(event.gateway_id.clone(), event.state);
        previous != Some(event.state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_stateless_never_suppresses() {
        let event = StatusEvent::new("gw-1", GatewayState::Online);
        assert!(Stateless.observe(&event));
        assert!(Stateless.observe(&event));
    }

    #[test]
    fn test_last_known_state_suppresses_repeats() {
        let tracker = LastKnownState::new();
        let online = StatusEvent::new("gw-1", GatewayState::Online);
        let offline = StatusEvent::new("gw-1", GatewayState::Offline);

        assert!(tracker.observe(&online));
        assert!(!tracker.observe(&online));
        assert!(tracker.observe(&offline));
        assert!(tracker.observe(&online));
        assert_eq!(tracker.status("gw-1"), GatewayStatus::Online);
    }

    #[test]
    fn test_gateways_tracked_independently() {
        let tracker = LastKnownState::new();
        assert!(tracker.observe(&StatusEvent::new("gw-1", GatewayState::Online)));
        assert!(tracker.observe(&StatusEvent::new("gw-2", GatewayState::Online)));
        assert_eq!(tracker.status("gw-3"), GatewayStatus::Unknown);

        tracker.forget("gw-1");
        assert!(tracker.observe(&StatusEvent::new("gw-1", GatewayState::Online)));
    }
}
