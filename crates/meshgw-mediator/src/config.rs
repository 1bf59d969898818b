//! Mediator and broker configuration

use meshgw_core::{NetworkFilter, Sink};
use serde::{Deserialize, Serialize};

/// Subscription filters and behaviour of the mediator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediatorConfig {
    /// Gateway id to follow, `+` for every gateway
    #[serde(default = "default_wildcard")]
    pub gateway_id: String,
    /// Sink id to take data from, `+` for every sink
    #[serde(default = "default_wildcard")]
    pub sink_id: String,
    /// Network whose sink configurations are forwarded
    #[serde(default)]
    pub network_id: NetworkFilter,
    /// Suppress repeated identical status events per gateway
    #[serde(default)]
    pub deduplicate_status: bool,
}

fn default_wildcard() -> String {
    "+".to_string()
}

impl Default for MediatorConfig {
    fn default() -> Self {
        Self {
            gateway_id: default_wildcard(),
            sink_id: default_wildcard(),
            network_id: NetworkFilter::Any,
            deduplicate_status: false,
        }
    }
}

// =============================================================================
// Broker Configuration
// =============================================================================

/// Broker configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BrokerConfig {
    /// In-process broker, optionally with simulated gateways
    Loopback(LoopbackConfig),
    /// Network MQTT broker (placeholder, see [`MqttConfig`])
    Mqtt(MqttConfig),
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self::Loopback(LoopbackConfig::default())
    }
}

/// Loopback broker configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LoopbackConfig {
    /// Gateways that answer configuration requests
    #[serde(default)]
    pub gateways: Vec<SimulatedGateway>,
}

/// A gateway simulated by the loopback broker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulatedGateway {
    pub id: String,
    #[serde(default)]
    pub sinks: Vec<Sink>,
}

/// MQTT broker connection parameters
///
/// Placeholder for an external transport: the settings are parsed and
/// validated, but no MQTT client ships with this crate, so
/// [`create_broker`](crate::create_broker) refuses this variant with
/// `BrokerError::Unsupported`. A deployment plugs in its own
/// [`BrokerAdapter`](crate::BrokerAdapter) built from these parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MqttConfig {
    pub host: String,
    #[serde(default = "default_mqtt_port")]
    pub port: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default = "default_client_id")]
    pub client_id: String,
    #[serde(default)]
    pub use_tls: bool,
    /// Keep-alive interval in seconds
    #[serde(default = "default_keepalive")]
    pub keepalive_secs: u64,
}

fn default_mqtt_port() -> u16 {
    1883
}

fn default_client_id() -> String {
    "meshgwd".to_string()
}

fn default_keepalive() -> u64 {
    60
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_mediator_config_defaults() {
        let config: MediatorConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, MediatorConfig::default());
        assert!(config.network_id.is_wildcard());
    }

    #[test]
    fn test_broker_config_tagged() {
        let config: BrokerConfig = serde_json::from_str(
            r#"{"type": "mqtt", "host": "broker.local", "username": "wm"}"#,
        )
        .unwrap();
        match config {
            BrokerConfig::Mqtt(mqtt) => {
                assert_eq!(mqtt.host, "broker.local");
                assert_eq!(mqtt.port, 1883);
                assert_eq!(mqtt.client_id, "meshgwd");
                assert!(!mqtt.use_tls);
            }
            other => panic!("Expected MQTT config, got {:?}", other),
        }
    }

    #[test]
    fn test_loopback_gateways() {
        let config: BrokerConfig = serde_json::from_str(
            r#"{"type": "loopback", "gateways": [
                {"id": "gw-1", "sinks": [{"sink_id": "sink0", "network_address": 5}]}
            ]}"#,
        )
        .unwrap();
        let BrokerConfig::Loopback(loopback) = config else {
            panic!("Expected loopback config");
        };
        assert_eq!(loopback.gateways[0].sinks[0].network_address, 5);
    }
}
