//! TOML configuration (§6/§6.1): one `[[input]]` table per packet/event
//! source, one or more `[[handler]]` tables attaching to an input by name.
//! Follows the teacher-adjacent `AppConfig::from_file` shape used across the
//! pack's network-monitoring binaries — a flat `Deserialize` struct with
//! `#[serde(default = "...")]` fields rather than a builder.

use std::path::PathBuf;

use serde::Deserialize;
use snafu::ResultExt;

use crate::error::{self, Result};

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PcapSource {
    Libpcap,
    AfPacket,
    Mock,
}

impl Default for PcapSource {
    fn default() -> Self {
        PcapSource::Libpcap
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct InputConfig {
    pub name: String,
    pub pcap_file: Option<PathBuf>,
    pub bpf: Option<String>,
    pub iface: Option<String>,
    #[serde(default)]
    pub pcap_source: PcapSource,
    #[serde(default)]
    pub host_spec: String,
    pub dnstap_file: Option<PathBuf>,
    pub socket: Option<PathBuf>,
    #[serde(default)]
    pub debug: bool,
    pub sflow_collector_port: Option<u16>,
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum HandlerType {
    Dns,
    Net,
}

fn default_num_periods() -> u64 {
    5
}

fn default_period_length_secs() -> u64 {
    60
}

fn default_deep_sample_rate() -> u64 {
    100
}

#[derive(Debug, Clone, Deserialize)]
pub struct HandlerConfig {
    #[serde(rename = "type")]
    pub kind: HandlerType,
    pub input: String,
    #[serde(default = "default_num_periods")]
    pub num_periods: u64,
    #[serde(default = "default_period_length_secs")]
    pub period_length_secs: u64,
    #[serde(default = "default_deep_sample_rate")]
    pub deep_sample_rate: u64,
    #[serde(default)]
    pub exclude_noerror: bool,
    pub only_rcode: Option<u64>,
    #[serde(default)]
    pub only_qname_suffix: Vec<String>,
    #[serde(default)]
    pub only_qtype: Vec<String>,
    pub answer_count: Option<u64>,
    #[serde(default)]
    pub upstream_dns_handler: bool,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    #[serde(rename = "input", default)]
    pub inputs: Vec<InputConfig>,
    #[serde(rename = "handler", default)]
    pub handlers: Vec<HandlerConfig>,
}

impl AppConfig {
    /// Load configuration from a TOML file (§6.1's `--config <path>`).
    pub fn from_file(path: &std::path::Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).context(error::IoSnafu {
            context: format!("reading config file {}", path.display()),
        })?;
        let config: AppConfig = toml::de::from_str(&contents).map_err(|e| {
            error::ConfigSnafu {
                message: format!("invalid config at {}: {e}", path.display()),
            }
            .build()
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Every handler must name an input that actually exists (§6.1's
    /// `handler.input` reference) — caught here instead of surfacing as a
    /// silently-inert handler at wiring time.
    fn validate(&self) -> Result<()> {
        for handler in &self.handlers {
            if !self.inputs.iter().any(|input| input.name == handler.input) {
                return error::ConfigSnafu {
                    message: format!(
                        "handler references unknown input '{}'",
                        handler.input
                    ),
                }
                .fail();
            }
            if handler.kind == HandlerType::Net && handler.upstream_dns_handler {
                let has_dns_sibling = self.handlers.iter().any(|other| {
                    other.input == handler.input && other.kind == HandlerType::Dns
                });
                if !has_dns_sibling {
                    return error::ConfigSnafu {
                        message: format!(
                            "net handler on input '{}' sets upstream_dns_handler but no dns handler is configured on that input",
                            handler.input
                        ),
                    }
                    .fail();
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_the_documented_toml_shape() {
        let toml = r#"
            [[input]]
            name = "eth0"
            pcap_source = "mock"
            host_spec = "192.168.0.0/24,fe80::/10"

            [[handler]]
            type = "dns"
            input = "eth0"
            num_periods = 5
            period_length_secs = 60
            exclude_noerror = false

            [[handler]]
            type = "net"
            input = "eth0"
            upstream_dns_handler = true
        "#;
        let config: AppConfig = toml::de::from_str(toml).unwrap();
        assert_eq!(config.inputs.len(), 1);
        assert_eq!(config.inputs[0].pcap_source, PcapSource::Mock);
        assert_eq!(config.handlers.len(), 2);
        assert_eq!(config.handlers[1].kind, HandlerType::Net);
        config.validate().unwrap();
    }

    #[test]
    fn rejects_a_handler_with_no_matching_input() {
        let toml = r#"
            [[input]]
            name = "eth0"

            [[handler]]
            type = "dns"
            input = "eth1"
        "#;
        let config: AppConfig = toml::de::from_str(toml).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_an_orphaned_upstream_dns_handler_flag() {
        let toml = r#"
            [[input]]
            name = "eth0"

            [[handler]]
            type = "net"
            input = "eth0"
            upstream_dns_handler = true
        "#;
        let config: AppConfig = toml::de::from_str(toml).unwrap();
        assert!(config.validate().is_err());
    }
}
