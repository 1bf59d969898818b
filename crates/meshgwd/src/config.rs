//! Daemon settings
//!
//! Loaded from a TOML file. Every section is optional; with no file at all
//! the daemon runs on the loopback broker.
//!
//! ```toml
//! [broker]
//! type = "loopback"
//!
//! [[broker.gateways]]
//! id = "gw-1"
//! sinks = [{ sink_id = "sink0", network_address = 2 }]
//!
//! [filter]
//! gateway_id = "+"
//! sink_id = "+"
//! network_id = 2
//!
//! [sink]
//! workers = 8
//!
//! [read_model]
//! host = "0.0.0.0"
//! port = 8000
//!
//! [daemon]
//! gate_after_all_running = true
//! storage = true
//! ```

use std::collections::HashSet;
use std::fmt;
use std::net::IpAddr;
use std::path::{Path, PathBuf};

use meshgw_mediator::{BrokerConfig, MediatorConfig};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid settings: {}", format_problems(.0))]
    Invalid(Vec<Problem>),
}

/// One invalid setting
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Problem {
    pub section: Section,
    pub reason: String,
}

impl Problem {
    fn new(section: Section, reason: impl Into<String>) -> Self {
        Self {
            section,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.section, self.reason)
    }
}

fn format_problems(problems: &[Problem]) -> String {
    problems
        .iter()
        .map(Problem::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    Broker,
    Filter,
    Sink,
    ReadModel,
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Section::Broker => "broker",
            Section::Filter => "filter",
            Section::Sink => "sink",
            Section::ReadModel => "read_model",
        };
        f.write_str(name)
    }
}

/// Daemon settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub broker: BrokerConfig,
    #[serde(default)]
    pub filter: MediatorConfig,
    #[serde(default)]
    pub sink: SinkSettings,
    #[serde(default)]
    pub read_model: ReadModelSettings,
    #[serde(default)]
    pub daemon: DaemonSettings,
}

/// Storage sink settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SinkSettings {
    /// Concurrent storage workers
    #[serde(default = "default_workers")]
    pub workers: usize,
}

impl Default for SinkSettings {
    fn default() -> Self {
        Self {
            workers: default_workers(),
        }
    }
}

fn default_workers() -> usize {
    8
}

/// Read-model bind parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadModelSettings {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Re-request the configuration of online gateways this often
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_secs: Option<u64>,
}

impl Default for ReadModelSettings {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            refresh_secs: None,
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonSettings {
    /// Set the readiness gate once every task is running
    #[serde(default = "default_true")]
    pub gate_after_all_running: bool,
    /// Run the storage sink; without it received data is dropped
    #[serde(default = "default_true")]
    pub storage: bool,
}

impl Default for DaemonSettings {
    fn default() -> Self {
        Self {
            gate_after_all_running: true,
            storage: true,
        }
    }
}

fn default_true() -> bool {
    true
}

impl Settings {
    /// Load settings from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Check every section, reporting all problems at once
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut problems = Vec::new();

        match &self.broker {
            BrokerConfig::Loopback(loopback) => {
                let mut seen = HashSet::new();
                for gateway in &loopback.gateways {
                    if !is_topic_level(&gateway.id) {
                        problems.push(Problem::new(
                            Section::Broker,
                            format!("invalid simulated gateway id '{}'", gateway.id),
                        ));
                    } else if !seen.insert(gateway.id.as_str()) {
                        problems.push(Problem::new(
                            Section::Broker,
                            format!("duplicate simulated gateway '{}'", gateway.id),
                        ));
                    }
                }
            }
            BrokerConfig::Mqtt(mqtt) => {
                if mqtt.host.trim().is_empty() {
                    problems.push(Problem::new(Section::Broker, "host is empty"));
                }
                if mqtt.port == 0 {
                    problems.push(Problem::new(Section::Broker, "port must be non-zero"));
                }
                if mqtt.client_id.is_empty() {
                    problems.push(Problem::new(Section::Broker, "client_id is empty"));
                }
                if mqtt.password.is_some() && mqtt.username.is_none() {
                    problems.push(Problem::new(Section::Broker, "password given without username"));
                }
            }
        }

        for (field, value) in [
            ("gateway_id", &self.filter.gateway_id),
            ("sink_id", &self.filter.sink_id),
        ] {
            if value != "+" && !is_topic_level(value) {
                problems.push(Problem::new(
                    Section::Filter,
                    format!("{} must be '+' or a single topic level, got '{}'", field, value),
                ));
            }
        }

        if self.daemon.storage && self.sink.workers == 0 {
            problems.push(Problem::new(Section::Sink, "workers must be at least 1"));
        }

        let host = self.read_model.host.as_str();
        if host != "localhost" && host.parse::<IpAddr>().is_err() {
            problems.push(Problem::new(
                Section::ReadModel,
                format!("host '{}' is not an IP address", host),
            ));
        }
        if self.read_model.port == 0 {
            problems.push(Problem::new(Section::ReadModel, "port must be non-zero"));
        }
        if self.read_model.refresh_secs == Some(0) {
            problems.push(Problem::new(Section::ReadModel, "refresh_secs must be non-zero"));
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid(problems))
        }
    }

    /// Pretty-printed contents of a section
    pub fn dump(&self, section: Section) -> String {
        match section {
            Section::Broker => format!("{:#?}", self.broker),
            Section::Filter => format!("{:#?}", self.filter),
            Section::Sink => format!("{:#?}", self.sink),
            Section::ReadModel => format!("{:#?}", self.read_model),
        }
    }
}

fn is_topic_level(value: &str) -> bool {
    !value.is_empty() && !value.contains(['/', '+', '#'])
}

#[cfg(test)]
mod tests {
    use super::*;
    use meshgw_core::NetworkFilter;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    fn write_settings(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    fn problems(settings: &Settings) -> Vec<Problem> {
        match settings.validate() {
            Err(ConfigError::Invalid(problems)) => problems,
            other => panic!("Expected invalid settings, got {:?}", other),
        }
    }

    #[test]
    fn test_defaults_are_valid() {
        let settings = Settings::default();
        settings.validate().unwrap();
        assert_eq!(settings.sink.workers, 8);
        assert!(settings.daemon.gate_after_all_running);
        assert!(matches!(settings.broker, BrokerConfig::Loopback(_)));
    }

    #[test]
    fn test_load_full_file() {
        let file = write_settings(
            r#"
[broker]
type = "loopback"

[[broker.gateways]]
id = "gw-1"
sinks = [{ sink_id = "sink0", network_address = "2" }]

[filter]
gateway_id = "gw-1"
network_id = 2

[sink]
workers = 4

[daemon]
storage = false
"#,
        );

        let settings = Settings::load(file.path()).unwrap();
        settings.validate().unwrap();

        assert_eq!(settings.filter.gateway_id, "gw-1");
        assert_eq!(settings.filter.sink_id, "+");
        assert_eq!(settings.filter.network_id, NetworkFilter::Network(2));
        assert_eq!(settings.sink.workers, 4);
        assert!(!settings.daemon.storage);
        assert!(settings.daemon.gate_after_all_running);
        let BrokerConfig::Loopback(loopback) = &settings.broker else {
            panic!("Expected loopback broker");
        };
        assert_eq!(loopback.gateways[0].sinks[0].network_address, 2);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let result = Settings::load(dir.path().join("missing.toml"));
        assert!(matches!(result, Err(ConfigError::Read { .. })));
    }

    #[test]
    fn test_load_malformed_file() {
        let file = write_settings("[filter]\nnetwork_id = \"two\"\n");
        let result = Settings::load(file.path());
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_validate_reports_every_section() {
        let file = write_settings(
            r#"
[broker]
type = "mqtt"
host = ""
password = "secret"

[filter]
gateway_id = "gw/1"

[sink]
workers = 0

[read_model]
host = "not an address"
"#,
        );
        let settings = Settings::load(file.path()).unwrap();

        let sections: Vec<Section> = problems(&settings).iter().map(|p| p.section).collect();
        assert_eq!(
            sections,
            vec![
                Section::Broker,
                Section::Broker,
                Section::Filter,
                Section::Sink,
                Section::ReadModel,
            ]
        );
    }

    #[test]
    fn test_workers_ignored_without_storage() {
        let mut settings = Settings::default();
        settings.sink.workers = 0;
        settings.daemon.storage = false;
        settings.validate().unwrap();
    }

    #[test]
    fn test_duplicate_simulated_gateway() {
        let file = write_settings(
            r#"
[broker]
type = "loopback"
gateways = [{ id = "gw-1" }, { id = "gw-1" }]
"#,
        );
        let settings = Settings::load(file.path()).unwrap();
        let found = problems(&settings);
        assert_eq!(found.len(), 1);
        assert!(found[0].reason.contains("duplicate"));
    }

    #[test]
    fn test_dump_section() {
        let settings = Settings::default();
        assert!(settings.dump(Section::Sink).contains("workers: 8"));
    }
}
