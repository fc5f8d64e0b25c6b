// src/config.rs

//! Manages server configuration: loading, filling per-member defaults, and validation.

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::IpAddr;
use tracing::warn;

fn default_binary_port() -> u16 {
    9000
}
fn default_json_port() -> u16 {
    9090
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_max_clients() -> usize {
    10000
}
fn default_storage_port() -> u16 {
    5432
}
fn default_replication_port() -> u16 {
    9001
}
fn default_metrics_port() -> u16 {
    9878
}
fn default_members() -> Vec<String> {
    vec!["127.0.0.1".to_string()]
}

/// The static, ordered description of the replica set this node belongs to.
///
/// A node's replica index is its position in `members`; the port tables are indexed
/// the same way.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct ClusterConfig {
    #[serde(default = "default_members")]
    pub members: Vec<String>,
    /// The backend storage port of each member.
    #[serde(default)]
    pub storage_ports: Vec<u16>,
    /// The internal replication port of each member.
    #[serde(default)]
    pub replication_ports: Vec<u16>,
    /// If true, membership is managed by an external coordination service.
    #[serde(default)]
    pub use_coordinator: bool,
    /// Overrides local address detection; the value must appear in `members`.
    #[serde(default)]
    pub announce_ip: Option<String>,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        let members = default_members();
        Self {
            storage_ports: vec![default_storage_port(); members.len()],
            replication_ports: vec![default_replication_port(); members.len()],
            members,
            use_coordinator: false,
            announce_ip: None,
        }
    }
}

impl ClusterConfig {
    /// Returns the replica index of `ip`, if it is a configured member.
    pub fn position_of(&self, ip: IpAddr) -> Option<usize> {
        self.members.iter().position(|member| {
            member
                .parse::<IpAddr>()
                .map(|addr| addr == ip)
                .unwrap_or_else(|_| *member == ip.to_string())
        })
    }

    pub fn storage_port(&self, index: usize) -> u16 {
        self.storage_ports
            .get(index)
            .copied()
            .unwrap_or_else(default_storage_port)
    }

    pub fn replication_port(&self, index: usize) -> u16 {
        self.replication_ports
            .get(index)
            .copied()
            .unwrap_or_else(default_replication_port)
    }

    /// Fills empty port tables with the default port for every member.
    fn fill_port_defaults(&mut self) {
        if self.storage_ports.is_empty() {
            self.storage_ports = vec![default_storage_port(); self.members.len()];
        }
        if self.replication_ports.is_empty() {
            self.replication_ports = vec![default_replication_port(); self.members.len()];
        }
    }

    fn validate(&self) -> Result<()> {
        if self.members.is_empty() {
            return Err(anyhow!("cluster.members cannot be empty"));
        }
        for (i, member) in self.members.iter().enumerate() {
            if member.trim().is_empty() {
                return Err(anyhow!("cluster.members[{}] cannot be empty", i));
            }
            if self.members[..i].contains(member) {
                return Err(anyhow!("cluster.members lists '{}' more than once", member));
            }
        }
        if self.storage_ports.len() != self.members.len() {
            return Err(anyhow!(
                "cluster.storage_ports has {} entries but cluster.members has {}",
                self.storage_ports.len(),
                self.members.len()
            ));
        }
        if self.replication_ports.len() != self.members.len() {
            return Err(anyhow!(
                "cluster.replication_ports has {} entries but cluster.members has {}",
                self.replication_ports.len(),
                self.members.len()
            ));
        }
        if let Some(ip) = &self.announce_ip {
            ip.parse::<IpAddr>()
                .with_context(|| format!("cluster.announce_ip '{ip}' is not an IP address"))?;
        }
        if self.use_coordinator {
            warn!(
                "cluster.use_coordinator is set; membership changes are expected to come from the coordination service."
            );
        }
        Ok(())
    }
}

/// Configuration for the Prometheus metrics exporter.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct MetricsConfig {
    /// If true, an HTTP server will be started to expose Prometheus metrics.
    #[serde(default)]
    pub enabled: bool,
    /// The port for the Prometheus metrics server.
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: default_metrics_port(),
        }
    }
}

/// A raw representation of the config file before defaults are filled and validated.
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    #[serde(default = "default_binary_port")]
    binary_port: u16,
    #[serde(default = "default_json_port")]
    json_port: u16,
    #[serde(default = "default_log_level")]
    log_level: String,
    #[serde(default = "default_max_clients")]
    max_clients: usize,
    #[serde(default)]
    cluster: ClusterConfig,
    #[serde(default)]
    metrics: MetricsConfig,
}

/// Represents the final, validated server configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Port serving the compact binary encoding.
    pub binary_port: u16,
    /// Port serving the newline-delimited JSON encoding.
    pub json_port: u16,
    pub log_level: String,
    pub max_clients: usize,
    pub cluster: ClusterConfig,
    pub metrics: MetricsConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            binary_port: default_binary_port(),
            json_port: default_json_port(),
            log_level: default_log_level(),
            max_clients: default_max_clients(),
            cluster: ClusterConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Config {
    /// Creates a new `Config` instance by reading and parsing a TOML file.
    pub fn from_file(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file at '{path}'"))?;
        Self::from_toml_str(&contents).with_context(|| format!("Invalid config in '{path}'"))
    }

    /// Parses and validates configuration from TOML text.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let raw: RawConfig = toml::from_str(contents).context("Failed to parse TOML")?;

        let mut cluster = raw.cluster;
        cluster.fill_port_defaults();

        let config = Config {
            binary_port: raw.binary_port,
            json_port: raw.json_port,
            log_level: raw.log_level,
            max_clients: raw.max_clients,
            cluster,
            metrics: raw.metrics,
        };
        config.validate()?;
        Ok(config)
    }

    /// Validates the resolved configuration to ensure logical consistency.
    pub fn validate(&self) -> Result<()> {
        if self.binary_port == 0 {
            return Err(anyhow!("binary_port cannot be 0"));
        }
        if self.json_port == 0 {
            return Err(anyhow!("json_port cannot be 0"));
        }
        if self.binary_port == self.json_port {
            return Err(anyhow!("binary_port and json_port must differ"));
        }
        if self.max_clients == 0 {
            return Err(anyhow!("max_clients cannot be 0"));
        }
        self.cluster.validate()?;

        if self.metrics.enabled {
            if self.metrics.port == 0 {
                return Err(anyhow!("metrics.port cannot be 0"));
            }
            if self.metrics.port == self.binary_port || self.metrics.port == self.json_port {
                return Err(anyhow!(
                    "metrics.port cannot be the same as either RPC port"
                ));
            }
        }
        Ok(())
    }
}
