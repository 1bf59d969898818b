//! Gateway status/configuration mediator
//!
//! One handler per inbound topic class. Every handler consults the
//! [`ReadinessGate`] first and drops the message while it is unset; there is
//! no replay of dropped messages.
//!
//! | topic class      | handler                          | output                       |
//! |------------------|----------------------------------|------------------------------|
//! | status ONLINE    | [`Mediator::on_status_event`]    | `ConfigRequest` to the broker |
//! | status OFFLINE   | [`Mediator::on_status_event`]    | empty `GatewayStatusRecord`  |
//! | config response  | [`Mediator::on_config_response`] | filtered `GatewayStatusRecord` |
//! | data             | [`Mediator::on_data_message`]    | `DataMessage` to storage     |

use meshgw_core::{
    ChannelSender, ConfigRequest, ConfigResponse, DataMessage, DecodeError, GatewayState,
    GatewayStatusRecord, NetworkFilter, ReadinessGate, StatusEvent, TopicClass, TopicFilter,
};
use meshgw_daemon::Envelope;
use tracing::{debug, info, warn};

use crate::config::MediatorConfig;
use crate::tracker::{LastKnownState, Stateless, StatusTracker};

/// What a handler did with a message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Dropped because the readiness gate is unset
    NotReady,
    /// Dropped by the status tracker
    Suppressed,
    /// A configuration request was queued for the broker
    ConfigRequested,
    /// An offline record was emitted
    StatusEmitted,
    /// Data was handed to storage
    DataForwarded,
    /// Data arrived but no storage route is attached
    NoConsumer,
    /// A configuration response was scanned against the network filter
    ConfigScanned { scanned: usize, emitted: usize },
}

/// Where the mediator's output goes
#[derive(Debug, Clone)]
pub struct MediatorChannels {
    /// Outbound requests, drained to the broker
    pub requests: ChannelSender<Envelope>,
    /// Status records for the read model
    pub statuses: ChannelSender<GatewayStatusRecord>,
    /// Data for the storage sink, if one is attached
    pub storage: Option<ChannelSender<Envelope>>,
}

// =============================================================================
// Subscriptions
// =============================================================================

/// Topic filters the mediator subscribes with
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Subscriptions {
    pub status: TopicFilter,
    pub config_response: TopicFilter,
    pub data: TopicFilter,
}

impl Subscriptions {
    pub fn from_config(config: &MediatorConfig) -> Self {
        Self {
            status: TopicFilter::status(&config.gateway_id),
            config_response: TopicFilter::config_response(&config.gateway_id),
            data: TopicFilter::data(
                &config.gateway_id,
                &config.sink_id,
                &config.network_id.to_string(),
            ),
        }
    }

    pub fn filters(&self) -> [&TopicFilter; 3] {
        [&self.status, &self.config_response, &self.data]
    }

    /// Is a topic of `class` covered by the subscription for that class?
    pub fn covers(&self, class: TopicClass, topic: &str) -> bool {
        match class {
            TopicClass::Status => self.status.matches(topic),
            TopicClass::ConfigResponse => self.config_response.matches(topic),
            TopicClass::Data => self.data.matches(topic),
        }
    }
}

// =============================================================================
// Mediator
// =============================================================================

type Handler = fn(&Mediator, &str, &[u8]) -> Result<Outcome, DecodeError>;

pub struct Mediator {
    gate: ReadinessGate,
    network: NetworkFilter,
    subscriptions: Subscriptions,
    channels: MediatorChannels,
    tracker: Box<dyn StatusTracker>,
}

impl Mediator {
    pub fn new(config: &MediatorConfig, gate: ReadinessGate, channels: MediatorChannels) -> Self {
        let tracker: Box<dyn StatusTracker> = if config.deduplicate_status {
            Box::new(LastKnownState::new())
        } else {
            Box::new(Stateless)
        };

        Self {
            gate,
            network: config.network_id,
            subscriptions: Subscriptions::from_config(config),
            channels,
            tracker,
        }
    }

    /// Replace the status tracker
    pub fn with_tracker(mut self, tracker: impl StatusTracker + 'static) -> Self {
        self.tracker = Box::new(tracker);
        self
    }

    pub fn subscriptions(&self) -> &Subscriptions {
        &self.subscriptions
    }

    pub fn network_filter(&self) -> NetworkFilter {
        self.network
    }

    fn ready(&self, what: &str) -> bool {
        if self.gate.is_set() {
            return true;
        }
        debug!("Readiness gate not set, {} ignored", what);
        false
    }

    /// Forward a data message to storage unchanged
    pub fn on_data_message(&self, message: DataMessage) -> Outcome {
        if !self.ready("data message") {
            return Outcome::NotReady;
        }

        let Some(storage) = &self.channels.storage else {
            debug!(gateway_id = %message.key.gateway_id, "No storage attached, data dropped");
            return Outcome::NoConsumer;
        };
        if storage.send(Envelope::Data(message)).is_err() {
            warn!("Storage channel closed, data dropped");
            return Outcome::NoConsumer;
        }
        Outcome::DataForwarded
    }

    /// Request the configuration of a gateway that came online, or emit an
    /// empty record for one that went offline
    pub fn on_status_event(&self, event: StatusEvent) -> Outcome {
        if !self.ready("gateway status") {
            return Outcome::NotReady;
        }
        if !self.tracker.observe(&event) {
            debug!(gateway_id = %event.gateway_id, state = ?event.state, "Repeated gateway status suppressed");
            return Outcome::Suppressed;
        }

        match event.state {
            GatewayState::Online => {
                info!(gateway_id = %event.gateway_id, "Gateway online, requesting configuration");
                let request = ConfigRequest::new(event.gateway_id);
                if self.channels.requests.send(Envelope::Request(request)).is_err() {
                    warn!("Request channel closed, configuration request dropped");
                }
                Outcome::ConfigRequested
            }
            GatewayState::Offline => {
                info!(gateway_id = %event.gateway_id, "Gateway offline");
                let record = GatewayStatusRecord::offline(event.gateway_id);
                if self.channels.statuses.send(record).is_err() {
                    warn!("Status channel closed, offline record dropped");
                }
                Outcome::StatusEmitted
            }
        }
    }

    /// Scan the sinks of a configuration response against the network filter
    ///
    /// A specific network forwards the whole response once, on the first
    /// matching sink. The wildcard forwards the whole response once per sink.
    pub fn on_config_response(&self, response: ConfigResponse) -> Outcome {
        if !self.ready("configuration response") {
            return Outcome::NotReady;
        }

        let mut scanned = 0;
        let mut emitted = 0;
        for sink in &response.configs {
            scanned += 1;
            if !self.network.matches(sink.network_address) {
                continue;
            }

            if self.channels.statuses.send((&response).into()).is_err() {
                warn!("Status channel closed, configuration record dropped");
            }
            emitted += 1;

            if !self.network.is_wildcard() {
                break;
            }
        }

        if emitted > 0 {
            debug!(gateway_id = %response.gateway_id, emitted, "Gateway configuration processed");
        } else {
            debug!(
                gateway_id = %response.gateway_id,
                network_id = %self.network,
                "Gateway configuration not processed due to network id filter"
            );
        }
        Outcome::ConfigScanned { scanned, emitted }
    }

    // =========================================================================
    // Dispatch
    // =========================================================================

    fn handler(class: TopicClass) -> Handler {
        match class {
            TopicClass::Status => Self::handle_status,
            TopicClass::ConfigResponse => Self::handle_config_response,
            TopicClass::Data => Self::handle_data,
        }
    }

    fn handle_status(&self, _topic: &str, payload: &[u8]) -> Result<Outcome, DecodeError> {
        Ok(self.on_status_event(StatusEvent::from_payload(payload)?))
    }

    fn handle_config_response(&self, _topic: &str, payload: &[u8]) -> Result<Outcome, DecodeError> {
        Ok(self.on_config_response(ConfigResponse::from_payload(payload)?))
    }

    fn handle_data(&self, topic: &str, payload: &[u8]) -> Result<Outcome, DecodeError> {
        Ok(self.on_data_message(DataMessage::from_delivery(topic, payload)?))
    }

    /// Route a broker delivery to the handler for its topic class
    ///
    /// Decode failures are logged and the message dropped. Returns `None`
    /// when the message did not reach a handler.
    pub fn deliver(&self, topic: &str, payload: &[u8]) -> Option<Outcome> {
        let Some(class) = TopicClass::classify(topic) else {
            debug!(%topic, "No handler for topic");
            return None;
        };
        if !self.subscriptions.covers(class, topic) {
            debug!(%topic, %class, "Topic outside subscription");
            return None;
        }
        if !self.ready(&format!("{} message", class)) {
            return Some(Outcome::NotReady);
        }

        match Self::handler(class)(self, topic, payload) {
            Ok(outcome) => Some(outcome),
            Err(e) => {
                warn!(%topic, %class, error = %e, "Dropping malformed message");
                None
            }
        }
    }
}

impl std::fmt::Debug for Mediator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Mediator")
            .field("ready", &self.gate.is_set())
            .field("network", &self.network)
            .field("subscriptions", &self.subscriptions)
            .finish()
    }
}
