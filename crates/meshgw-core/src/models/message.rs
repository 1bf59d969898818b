//! Broker message models
//!
//! Status events and configuration responses arrive from the broker as JSON
//! payloads; configuration requests go back out the same way. Data messages
//! are never decoded, only their topic is parsed.

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::DecodeError;
use crate::models::{GatewayState, GatewayStatus, Sink};
use crate::topics;

fn decode_json<T: DeserializeOwned>(kind: &'static str, payload: &[u8]) -> Result<T, DecodeError> {
    serde_json::from_slice(payload).map_err(|source| DecodeError::Payload { kind, source })
}

/// Gateway online/offline event
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEvent {
    #[serde(rename = "gw_id")]
    pub gateway_id: String,
    pub state: GatewayState,
}

impl StatusEvent {
    pub fn new(gateway_id: impl Into<String>, state: GatewayState) -> Self {
        Self {
            gateway_id: gateway_id.into(),
            state,
        }
    }

    pub fn from_payload(payload: &[u8]) -> Result<Self, DecodeError> {
        decode_json("status event", payload)
    }
}

/// Request for a gateway to report the configuration of all its sinks
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConfigRequest {
    #[serde(rename = "gw_id")]
    pub gateway_id: String,
}

impl ConfigRequest {
    pub fn new(gateway_id: impl Into<String>) -> Self {
        Self {
            gateway_id: gateway_id.into(),
        }
    }

    /// Topic the request is published on, addressed to the gateway
    pub fn topic(&self) -> String {
        topics::config_request_topic(&self.gateway_id)
    }

    pub fn to_payload(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

/// A gateway's answer to a [`ConfigRequest`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigResponse {
    #[serde(rename = "gw_id")]
    pub gateway_id: String,
    /// Sink configurations, in the order the gateway reported them
    #[serde(default)]
    pub configs: Vec<Sink>,
}

impl ConfigResponse {
    pub fn new(gateway_id: impl Into<String>, configs: Vec<Sink>) -> Self {
        Self {
            gateway_id: gateway_id.into(),
            configs,
        }
    }

    pub fn from_payload(payload: &[u8]) -> Result<Self, DecodeError> {
        decode_json("config response", payload)
    }
}

/// Gateway status handed to the read model
///
/// An empty `configs` list means the gateway and all of its sinks are
/// offline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayStatusRecord {
    #[serde(rename = "gw_id")]
    pub gateway_id: String,
    pub configs: Vec<Sink>,
}

impl GatewayStatusRecord {
    /// Record synthesized for a gateway that went offline
    pub fn offline(gateway_id: impl Into<String>) -> Self {
        Self {
            gateway_id: gateway_id.into(),
            configs: Vec::new(),
        }
    }

    pub fn status(&self) -> GatewayStatus {
        if self.configs.is_empty() {
            GatewayStatus::Offline
        } else {
            GatewayStatus::Online
        }
    }
}

impl From<ConfigResponse> for GatewayStatusRecord {
    fn from(response: ConfigResponse) -> Self {
        Self {
            gateway_id: response.gateway_id,
            configs: response.configs,
        }
    }
}

impl From<&ConfigResponse> for GatewayStatusRecord {
    fn from(response: &ConfigResponse) -> Self {
        response.clone().into()
    }
}

/// Routing key carried in a data topic
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DataKey {
    pub gateway_id: String,
    pub sink_id: String,
    pub network_id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_endpoint: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination_endpoint: Option<u8>,
}

/// Data packet received by a sink, forwarded verbatim to storage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataMessage {
    pub key: DataKey,
    pub payload: Bytes,
}

impl DataMessage {
    /// Build a data message from a `gw-event/received_data/...` delivery
    pub fn from_delivery(topic: &str, payload: &[u8]) -> Result<Self, DecodeError> {
        Ok(Self {
            key: topics::parse_data_topic(topic)?,
            payload: Bytes::copy_from_slice(payload),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_status_event_from_payload() {
        let event = StatusEvent::from_payload(br#"{"gw_id": "gw-1", "state": "ONLINE"}"#).unwrap();
        assert_eq!(event, StatusEvent::new("gw-1", GatewayState::Online));

        let event =
            StatusEvent::from_payload(br#"{"gw_id": "gw-2", "state": "OFFLINE"}"#).unwrap();
        assert_eq!(event.state, GatewayState::Offline);
    }

    #[test]
    fn test_status_event_bad_state() {
        let result = StatusEvent::from_payload(br#"{"gw_id": "gw-1", "state": "SLEEPING"}"#);
        assert!(matches!(
            result,
            Err(DecodeError::Payload {
                kind: "status event",
                ..
            })
        ));
    }

    #[test]
    fn test_config_response_keeps_sink_order() {
        let payload = br#"{
            "gw_id": "gw-1",
            "configs": [
                {"sink_id": "sink0", "network_address": 1},
                {"sink_id": "sink1", "network_address": "2"}
            ]
        }"#;

        let response = ConfigResponse::from_payload(payload).unwrap();
        assert_eq!(response.gateway_id, "gw-1");
        let ids: Vec<&str> = response.configs.iter().map(|s| s.sink_id.as_str()).collect();
        assert_eq!(ids, vec!["sink0", "sink1"]);
        assert_eq!(response.configs[1].network_address, 2);
    }

    #[test]
    fn test_config_response_without_configs() {
        let response = ConfigResponse::from_payload(br#"{"gw_id": "gw-1"}"#).unwrap();
        assert!(response.configs.is_empty());
    }

    #[test]
    fn test_config_request_wire_format() {
        let request = ConfigRequest::new("gw-9");
        assert_eq!(request.topic(), "gw-request/get_configs/gw-9");
        assert_eq!(
            String::from_utf8(request.to_payload().unwrap()).unwrap(),
            r#"{"gw_id":"gw-9"}"#
        );
    }

    #[test]
    fn test_record_status() {
        assert_eq!(
            GatewayStatusRecord::offline("gw-1").status(),
            GatewayStatus::Offline
        );

        let record: GatewayStatusRecord =
            ConfigResponse::new("gw-1", vec![Sink::new("sink0", 1)]).into();
        assert_eq!(record.status(), GatewayStatus::Online);
    }

    #[test]
    fn test_data_message_keeps_payload() {
        let message = DataMessage::from_delivery(
            "gw-event/received_data/gw-1/sink0/12/1/2",
            &[0xde, 0xad, 0xbe, 0xef],
        )
        .unwrap();

        assert_eq!(message.key.gateway_id, "gw-1");
        assert_eq!(message.key.network_id, 12);
        assert_eq!(message.payload.as_ref(), &[0xde, 0xad, 0xbe, 0xef]);
    }
}
