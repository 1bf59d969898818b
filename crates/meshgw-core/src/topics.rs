//! Broker topic scheme
//!
//! Gateways publish on three topic families and listen on one:
//!
//! ```text
//! gw-event/status/{gw_id}                                        (status)
//! gw-response/get_configs/{gw_id}/...                            (config response)
//! gw-event/received_data/{gw_id}/{sink_id}/{network_id}/{src}/{dst}  (data)
//! gw-request/get_configs/{gw_id}                                 (config request, outbound)
//! ```
//!
//! Subscription filters follow the broker's wildcard syntax: `+` matches
//! exactly one level and `#` matches the remaining levels.

use std::fmt;

use crate::error::DecodeError;
use crate::models::DataKey;

pub const STATUS_PREFIX: &str = "gw-event/status";
pub const CONFIG_RESPONSE_PREFIX: &str = "gw-response/get_configs";
pub const CONFIG_REQUEST_PREFIX: &str = "gw-request/get_configs";
pub const DATA_PREFIX: &str = "gw-event/received_data";

/// Logical class of an inbound topic, used to pick a handler
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TopicClass {
    Status,
    ConfigResponse,
    Data,
}

impl TopicClass {
    /// Classify an inbound topic
    ///
    /// Status and config-response topics are recognised by their exact
    /// leading levels, data topics by prefix. Returns `None` for topics the
    /// coordinator has no handler for.
    ///
    /// ```
    /// # use meshgw_core::TopicClass;
    /// assert_eq!(TopicClass::classify("gw-event/status/gw1"), Some(TopicClass::Status));
    /// assert_eq!(TopicClass::classify("gw-request/get_configs/gw1"), None);
    /// ```
    pub fn classify(topic: &str) -> Option<Self> {
        let levels: Vec<&str> = topic.split('/').collect();
        match levels.as_slice() {
            ["gw-event", "status", gw_id] if !gw_id.is_empty() => Some(TopicClass::Status),
            ["gw-response", "get_configs", gw_id, ..] if !gw_id.is_empty() => {
                Some(TopicClass::ConfigResponse)
            }
            ["gw-event", "received_data", gw_id, sink_id, network_id, ..]
                if !gw_id.is_empty() && !sink_id.is_empty() && !network_id.is_empty() =>
            {
                Some(TopicClass::Data)
            }
            _ => None,
        }
    }
}

impl fmt::Display for TopicClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TopicClass::Status => "status",
            TopicClass::ConfigResponse => "config-response",
            TopicClass::Data => "data",
        };
        f.write_str(name)
    }
}

/// Topic a gateway publishes its status on
pub fn status_topic(gateway_id: &str) -> String {
    format!("{}/{}", STATUS_PREFIX, gateway_id)
}

/// Topic a configuration request for `gateway_id` is published on
pub fn config_request_topic(gateway_id: &str) -> String {
    format!("{}/{}", CONFIG_REQUEST_PREFIX, gateway_id)
}

/// Topic a gateway answers a configuration request on
pub fn config_response_topic(gateway_id: &str) -> String {
    format!("{}/{}", CONFIG_RESPONSE_PREFIX, gateway_id)
}

/// Topic a sink publishes received data on
pub fn data_topic(key: &DataKey) -> String {
    let mut topic = format!(
        "{}/{}/{}/{}",
        DATA_PREFIX, key.gateway_id, key.sink_id, key.network_id
    );
    if let Some(src) = key.source_endpoint {
        topic.push_str(&format!("/{}", src));
        if let Some(dst) = key.destination_endpoint {
            topic.push_str(&format!("/{}", dst));
        }
    }
    topic
}

/// Split a data topic into its routing key
///
/// Endpoints are optional, but nothing may follow the destination endpoint.
pub fn parse_data_topic(topic: &str) -> Result<DataKey, DecodeError> {
    let malformed = || DecodeError::Topic(topic.to_string());

    let rest = topic
        .strip_prefix(DATA_PREFIX)
        .and_then(|r| r.strip_prefix('/'))
        .ok_or_else(malformed)?;
    let levels: Vec<&str> = rest.split('/').collect();

    let (gateway_id, sink_id, network_id, endpoints) = match levels.as_slice() {
        [gw, sink, net, endpoints @ ..]
            if !gw.is_empty() && !sink.is_empty() && endpoints.len() <= 2 =>
        {
            (*gw, *sink, *net, endpoints)
        }
        _ => return Err(malformed()),
    };

    let network_id = network_id.parse().map_err(|_| malformed())?;
    let endpoint = |idx: usize| -> Result<Option<u8>, DecodeError> {
        match endpoints.get(idx) {
            Some(ep) => ep.parse().map(Some).map_err(|_| malformed()),
            None => Ok(None),
        }
    };

    Ok(DataKey {
        gateway_id: gateway_id.to_string(),
        sink_id: sink_id.to_string(),
        network_id,
        source_endpoint: endpoint(0)?,
        destination_endpoint: endpoint(1)?,
    })
}

/// Subscription filter in broker wildcard syntax
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TopicFilter(String);

impl TopicFilter {
    pub fn new(filter: impl Into<String>) -> Self {
        Self(filter.into())
    }

    /// Status events of the gateways matching `gateway_id`
    pub fn status(gateway_id: &str) -> Self {
        Self(status_topic(gateway_id))
    }

    /// Configuration responses of the gateways matching `gateway_id`
    pub fn config_response(gateway_id: &str) -> Self {
        Self(format!("{}/#", config_response_topic(gateway_id)))
    }

    /// Received data of the matching gateway/sink/network
    pub fn data(gateway_id: &str, sink_id: &str, network_id: &str) -> Self {
        Self(format!(
            "{}/{}/{}/{}/#",
            DATA_PREFIX, gateway_id, sink_id, network_id
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Does `topic` match this filter?
    ///
    /// ```
    /// # use meshgw_core::TopicFilter;
    /// let filter = TopicFilter::new("gw-event/received_data/+/sink0/#");
    /// assert!(filter.matches("gw-event/received_data/gw1/sink0/5/1/1"));
    /// assert!(!filter.matches("gw-event/received_data/gw1/sink1/5/1/1"));
    /// ```
    pub fn matches(&self, topic: &str) -> bool {
        let mut filter_levels = self.0.split('/');
        let mut topic_levels = topic.split('/');

        loop {
            match (filter_levels.next(), topic_levels.next()) {
                (Some("#"), _) => return true,
                (Some("+"), Some(_)) => continue,
                (Some(f), Some(t)) if f == t => continue,
                (None, None) => return true,
                _ => return false,
            }
        }
    }
}

impl fmt::Display for TopicFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_classify_status() {
        assert_eq!(
            TopicClass::classify("gw-event/status/gw-1"),
            Some(TopicClass::Status)
        );
        // Status topics have exactly one level after the prefix
        assert_eq!(TopicClass::classify("gw-event/status/gw-1/extra"), None);
        assert_eq!(TopicClass::classify("gw-event/status/"), None);
    }

    #[test]
    fn test_classify_config_response() {
        assert_eq!(
            TopicClass::classify("gw-response/get_configs/gw-1"),
            Some(TopicClass::ConfigResponse)
        );
        assert_eq!(
            TopicClass::classify("gw-response/get_configs/gw-1/sink0"),
            Some(TopicClass::ConfigResponse)
        );
    }

    #[test]
    fn test_classify_data() {
        assert_eq!(
            TopicClass::classify("gw-event/received_data/gw-1/sink0/12/1/1"),
            Some(TopicClass::Data)
        );
        assert_eq!(
            TopicClass::classify("gw-event/received_data/gw-1/sink0"),
            None
        );
    }

    #[test]
    fn test_classify_unknown() {
        assert_eq!(TopicClass::classify("gw-request/get_configs/gw-1"), None);
        assert_eq!(TopicClass::classify("something/else"), None);
        assert_eq!(TopicClass::classify(""), None);
    }

    #[test]
    fn test_parse_data_topic() {
        let key = parse_data_topic("gw-event/received_data/gw-1/sink0/12/10/20").unwrap();
        assert_eq!(
            key,
            DataKey {
                gateway_id: "gw-1".to_string(),
                sink_id: "sink0".to_string(),
                network_id: 12,
                source_endpoint: Some(10),
                destination_endpoint: Some(20),
            }
        );
        assert_eq!(data_topic(&key), "gw-event/received_data/gw-1/sink0/12/10/20");
    }

    #[test]
    fn test_parse_data_topic_without_endpoints() {
        let key = parse_data_topic("gw-event/received_data/gw-1/sink0/12").unwrap();
        assert_eq!(key.source_endpoint, None);
        assert_eq!(key.destination_endpoint, None);
    }

    #[test]
    fn test_parse_data_topic_rejects_garbage() {
        assert!(parse_data_topic("gw-event/received_data/gw-1/sink0/net").is_err());
        assert!(parse_data_topic("gw-event/received_data/gw-1/sink0/12/999").is_err());
        assert!(parse_data_topic("gw-event/status/gw-1").is_err());
        assert!(parse_data_topic("gw-event/received_data/gw-1/sink0/12/10/20/30").is_err());
        assert!(parse_data_topic("gw-event/received_data/gw-1/sink0/12/10/20/").is_err());
    }

    #[test]
    fn test_filter_single_level_wildcard() {
        let filter = TopicFilter::status("+");
        assert!(filter.matches("gw-event/status/gw-1"));
        assert!(!filter.matches("gw-event/status/gw-1/x"));
        assert!(!filter.matches("gw-event/status"));
    }

    #[test]
    fn test_filter_multi_level_wildcard() {
        let filter = TopicFilter::config_response("gw-1");
        assert_eq!(filter.as_str(), "gw-response/get_configs/gw-1/#");
        assert!(filter.matches("gw-response/get_configs/gw-1"));
        assert!(filter.matches("gw-response/get_configs/gw-1/sink0"));
        assert!(!filter.matches("gw-response/get_configs/gw-2"));
    }

    #[test]
    fn test_filter_exact() {
        let filter = TopicFilter::data("gw-1", "sink0", "12");
        assert!(filter.matches("gw-event/received_data/gw-1/sink0/12/1/1"));
        assert!(!filter.matches("gw-event/received_data/gw-1/sink0/13/1/1"));
    }
}
