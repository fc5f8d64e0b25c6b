// src/client/config.rs

use super::router::{FailoverPolicy, ReplicaGroup};
use crate::core::CortadoError;
use crate::core::protocol::Encoding;
use anyhow::{Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::fs;

fn default_credential() -> String {
    "postgres".to_string()
}

/// Settings for one session manager.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    #[serde(default = "default_credential")]
    pub user: String,
    #[serde(default = "default_credential")]
    pub password: String,
    #[serde(default = "default_credential")]
    pub database: String,

    #[serde(default)]
    pub encoding: Encoding,

    #[serde(default)]
    pub failover: FailoverPolicy,

    #[serde(with = "humantime_serde", default)]
    pub connect_timeout: Option<Duration>,

    #[serde(with = "humantime_serde", default)]
    pub request_timeout: Option<Duration>,

    /// Named replica groups, each an ordered list of `host:port` addresses.
    #[serde(default)]
    pub groups: IndexMap<String, Vec<String>>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            user: default_credential(),
            password: default_credential(),
            database: default_credential(),
            encoding: Encoding::default(),
            failover: FailoverPolicy::default(),
            connect_timeout: None,
            request_timeout: None,
            groups: IndexMap::new(),
        }
    }
}

impl ClientConfig {
    pub async fn from_file(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read client config at '{path}'"))?;
        Self::from_toml_str(&content).with_context(|| format!("Invalid client config in '{path}'"))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: ClientConfig = toml::from_str(content).context("Failed to parse TOML")?;
        for (name, addrs) in &config.groups {
            if addrs.is_empty() {
                anyhow::bail!("group '{name}' has no addresses");
            }
        }
        Ok(config)
    }

    /// Looks up a named group.
    pub fn group(&self, name: &str) -> Result<ReplicaGroup, CortadoError> {
        self.groups
            .get(name)
            .map(|addrs| ReplicaGroup::new(addrs.iter().cloned()))
            .ok_or_else(|| CortadoError::Configuration(format!("no group named '{name}'")))
    }
}
