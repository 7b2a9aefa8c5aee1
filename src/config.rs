use crate::gtpv2::conn::{ConnConfig, UnhandledPolicy};
use crate::gtpv2::ie::encode_tbcd;
use crate::gtpv2::pool::{LaneConfig, PoolConfig};
use crate::gtpv2::types::InterfaceType;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_timeout_ms() -> u64 {
    3000
}

fn default_max_retries() -> u32 {
    3
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_timeout_ms(),
            max_retries: default_max_retries(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub listen_address: SocketAddr,
    pub peer_address: SocketAddr,
    /// Address advertised in the control-plane F-TEIDs we send.
    pub local_ip: Ipv4Addr,
    #[serde(default = "default_local_interface")]
    pub local_interface: InterfaceType,
    #[serde(default = "default_peer_interface")]
    pub peer_interface: InterfaceType,
    #[serde(default)]
    pub restart_counter: u8,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub unhandled_messages: UnhandledPolicy,
    #[serde(default)]
    pub pool: PoolConfig,
    /// IMSIs to open sessions for at startup.
    #[serde(default)]
    pub subscribers: Vec<String>,
    #[serde(default = "default_apn")]
    pub apn: String,
}

fn default_local_interface() -> InterfaceType {
    InterfaceType::S11MmeGtpc
}

fn default_peer_interface() -> InterfaceType {
    InterfaceType::S11S4SgwGtpc
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_apn() -> String {
    "internet".to_string()
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file {}", path.as_ref().display()))?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        serde_yaml::from_str(content).context("Failed to parse config file")
    }

    pub fn validate(&self) -> Result<()> {
        if self.local_interface == self.peer_interface {
            anyhow::bail!(
                "local_interface and peer_interface are both {:?}",
                self.local_interface
            );
        }
        if self.retry.timeout_ms == 0 {
            anyhow::bail!("retry.timeout_ms must be greater than 0");
        }
        for (name, lane) in [
            ("ies", self.pool.ies),
            ("ie_slices", self.pool.ie_slices),
            ("headers", self.pool.headers),
            ("messages", self.pool.messages),
        ] {
            check_lanes(name, lane)?;
        }
        if !self.subscribers.is_empty() && self.apn.is_empty() {
            anyhow::bail!("apn cannot be empty when subscribers are configured");
        }
        for imsi in &self.subscribers {
            if imsi.is_empty() || imsi.len() > 15 {
                anyhow::bail!("subscriber IMSI {:?} must have 1 to 15 digits", imsi);
            }
            encode_tbcd(imsi).with_context(|| format!("invalid subscriber IMSI {:?}", imsi))?;
        }
        Ok(())
    }

    pub fn conn_config(&self) -> ConnConfig {
        ConnConfig {
            peer_addr: self.peer_address,
            local_ip: self.local_ip,
            local_interface: self.local_interface,
            peer_interface: self.peer_interface,
            restart_counter: self.restart_counter,
            apn: self.apn.clone(),
            retry_timeout: Duration::from_millis(self.retry.timeout_ms),
            max_retries: self.retry.max_retries,
            unhandled: self.unhandled_messages,
        }
    }
}

fn check_lanes(name: &str, lane: LaneConfig) -> Result<()> {
    if lane.lanes == 0 {
        anyhow::bail!("pool.{}.lanes must be greater than 0", name);
    }
    if lane.capacity == 0 {
        anyhow::bail!("pool.{}.capacity must be greater than 0", name);
    }
    Ok(())
}
