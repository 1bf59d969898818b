//! Gateway, sink and network filter models

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::ParseFilterError;

/// Connection state reported by a gateway on its status topic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum GatewayState {
    Online,
    Offline,
}

/// Status label derived for a gateway from the latest message about it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum GatewayStatus {
    /// Nothing observed yet
    #[default]
    Unknown,
    Online,
    Offline,
}

impl From<GatewayState> for GatewayStatus {
    fn from(state: GatewayState) -> Self {
        match state {
            GatewayState::Online => GatewayStatus::Online,
            GatewayState::Offline => GatewayStatus::Offline,
        }
    }
}

impl fmt::Display for GatewayStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            GatewayStatus::Unknown => "UNKNOWN",
            GatewayStatus::Online => "ONLINE",
            GatewayStatus::Offline => "OFFLINE",
        };
        f.write_str(label)
    }
}

/// Configuration record of one sink (radio endpoint) on a gateway
///
/// Only `network_address` is inspected by the coordination logic. Every
/// other key of the record is carried through untouched in `config`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sink {
    /// Sink identifier on its gateway
    #[serde(default)]
    pub sink_id: String,
    /// Network identifier the sink operates on
    #[serde(deserialize_with = "network_address_from_any")]
    pub network_address: u64,
    /// Remaining sink configuration, opaque to the coordinator
    #[serde(flatten)]
    pub config: serde_json::Map<String, serde_json::Value>,
}

impl Sink {
    /// Create a sink record with an empty opaque configuration
    pub fn new(sink_id: impl Into<String>, network_address: u64) -> Self {
        Self {
            sink_id: sink_id.into(),
            network_address,
            config: serde_json::Map::new(),
        }
    }
}

/// Gateways report `network_address` either as a number or as a numeric
/// string depending on firmware version.
fn network_address_from_any<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Number(n) => Ok(n),
        Raw::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

/// Which logical mesh network the coordinator is interested in
///
/// Written as `+` (every network) or as a numeric network identifier,
/// mirroring the broker's single-level wildcard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum NetworkFilter {
    /// Match sinks on every network
    #[default]
    Any,
    /// Match only sinks on this network
    Network(u64),
}

impl NetworkFilter {
    /// Does a sink on `network_address` pass this filter?
    pub fn matches(&self, network_address: u64) -> bool {
        match self {
            NetworkFilter::Any => true,
            NetworkFilter::Network(id) => *id == network_address,
        }
    }

    pub fn is_wildcard(&self) -> bool {
        matches!(self, NetworkFilter::Any)
    }
}

impl fmt::Display for NetworkFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkFilter::Any => f.write_str("+"),
            NetworkFilter::Network(id) => write!(f, "{}", id),
        }
    }
}

impl FromStr for NetworkFilter {
    type Err = ParseFilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed == "+" {
            return Ok(NetworkFilter::Any);
        }
        trimmed
            .parse()
            .map(NetworkFilter::Network)
            .map_err(|_| ParseFilterError(s.to_string()))
    }
}

impl Serialize for NetworkFilter {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            NetworkFilter::Any => serializer.serialize_str("+"),
            NetworkFilter::Network(id) => serializer.serialize_u64(*id),
        }
    }
}

impl<'de> Deserialize<'de> for NetworkFilter {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(u64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Number(n) => Ok(NetworkFilter::Network(n)),
            Raw::Text(s) => s.parse().map_err(serde::de::Error::custom),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_sink_network_address_as_number_or_string() {
        let sink: Sink =
            serde_json::from_value(json!({"sink_id": "sink0", "network_address": 42})).unwrap();
        assert_eq!(sink.network_address, 42);

        let sink: Sink =
            serde_json::from_value(json!({"sink_id": "sink1", "network_address": " 7 "})).unwrap();
        assert_eq!(sink.network_address, 7);
    }

    #[test]
    fn test_sink_keeps_opaque_config() {
        let sink: Sink = serde_json::from_value(json!({
            "sink_id": "sink0",
            "network_address": 1,
            "node_address": 12,
            "started": true
        }))
        .unwrap();

        assert_eq!(sink.config.get("node_address"), Some(&json!(12)));
        assert_eq!(sink.config.get("started"), Some(&json!(true)));
        assert!(!sink.config.contains_key("network_address"));
    }

    #[test]
    fn test_sink_rejects_non_numeric_address() {
        let result: Result<Sink, _> =
            serde_json::from_value(json!({"sink_id": "s", "network_address": "abc"}));
        assert!(result.is_err());
    }

    #[test]
    fn test_network_filter_parse() {
        assert_eq!("+".parse::<NetworkFilter>().unwrap(), NetworkFilter::Any);
        assert_eq!(
            "1234".parse::<NetworkFilter>().unwrap(),
            NetworkFilter::Network(1234)
        );
        assert!("#".parse::<NetworkFilter>().is_err());
    }

    #[test]
    fn test_network_filter_matches() {
        assert!(NetworkFilter::Any.matches(9));
        assert!(NetworkFilter::Network(2).matches(2));
        assert!(!NetworkFilter::Network(2).matches(9));
    }

    #[test]
    fn test_network_filter_deserialize() {
        let any: NetworkFilter = serde_json::from_value(json!("+")).unwrap();
        assert_eq!(any, NetworkFilter::Any);

        let net: NetworkFilter = serde_json::from_value(json!(5)).unwrap();
        assert_eq!(net, NetworkFilter::Network(5));

        let net: NetworkFilter = serde_json::from_value(json!("5")).unwrap();
        assert_eq!(net, NetworkFilter::Network(5));
    }
}
