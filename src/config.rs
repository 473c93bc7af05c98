//! Service Configuration
//!
//! Configurable parameters for the pseudo-TLD resolver service.
//! Loaded from a TOML file with CLI overrides applied on top; defaults
//! serve the stock `example.p2p.` table on the standard ports.

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::names::{normalize_name, NameRecord};

/// Resolver-binding strategy, selected per deployment environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BindingStrategy {
    /// Prepend a nameserver line to the resolver configuration file
    ResolvConf,

    /// Point the default-route link at us via resolvectl
    Resolvectl,

    /// Leave the system resolver alone
    Disabled,
}

/// What to do when resolver binding fails at startup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum BindFailurePolicy {
    /// Abort startup with a nonzero exit
    FailFast,

    /// Serve anyway; the system resolver keeps its old settings
    DegradedNoRedirect,
}

impl FromStr for BindingStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "resolv-conf" => Ok(BindingStrategy::ResolvConf),
            "resolvectl" => Ok(BindingStrategy::Resolvectl),
            "disabled" => Ok(BindingStrategy::Disabled),
            other => Err(format!(
                "unknown binding strategy '{}' (expected resolv-conf, resolvectl or disabled)",
                other
            )),
        }
    }
}

impl FromStr for BindFailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "fail-fast" => Ok(BindFailurePolicy::FailFast),
            "degraded-no-redirect" => Ok(BindFailurePolicy::DegradedNoRedirect),
            other => Err(format!(
                "unknown bind failure policy '{}' (expected fail-fast or degraded-no-redirect)",
                other
            )),
        }
    }
}

impl std::fmt::Display for BindingStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BindingStrategy::ResolvConf => "resolv-conf",
            BindingStrategy::Resolvectl => "resolvectl",
            BindingStrategy::Disabled => "disabled",
        };
        f.write_str(s)
    }
}

impl std::fmt::Display for BindFailurePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BindFailurePolicy::FailFast => "fail-fast",
            BindFailurePolicy::DegradedNoRedirect => "degraded-no-redirect",
        };
        f.write_str(s)
    }
}

/// Main configuration for the service
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    // === Zone ===

    /// Pseudo-TLD served by the responder, as a bare label
    pub zone: String,

    /// Answer for in-zone names missing from the table.
    /// Unset means such queries get an empty authoritative reply.
    pub wildcard_address: Option<Ipv4Addr>,

    // === Network ===

    /// Address the DNS responder listens on
    pub dns_listen: IpAddr,

    /// DNS responder port (53 needs privileges; 5350 and 5353 are the
    /// usual unprivileged alternates)
    pub dns_port: u16,

    /// Address the HTTP responder listens on
    pub http_listen: IpAddr,

    /// HTTP responder port
    pub http_port: u16,

    /// Address written into the host resolver configuration so that
    /// queries reach the DNS responder
    pub resolver_target: Ipv4Addr,

    // === Resolver binding ===

    /// How the host resolver gets pointed at us
    pub binding_strategy: BindingStrategy,

    /// Resolver configuration file used by the resolv-conf strategy
    pub resolv_conf_path: PathBuf,

    /// Whether a binding failure aborts startup or degrades
    pub on_bind_failure: BindFailurePolicy,

    // === Supervision ===

    /// Whether an HTTP serve-loop exit drains the whole service.
    /// When false the exit is logged and DNS keeps serving.
    pub http_failure_fatal: bool,

    // === Records ===

    /// Static name table entries. Last field so the `[[records]]`
    /// tables land after the scalar keys in serialized TOML.
    pub records: Vec<NameRecord>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            // Zone
            zone: "p2p".to_string(),
            wildcard_address: None,

            // Network
            dns_listen: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            dns_port: 53,
            http_listen: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            http_port: 8080,
            resolver_target: Ipv4Addr::new(127, 0, 0, 1),

            // Resolver binding
            binding_strategy: BindingStrategy::ResolvConf,
            resolv_conf_path: PathBuf::from("/etc/resolv.conf"),
            on_bind_failure: BindFailurePolicy::DegradedNoRedirect,

            // Supervision
            http_failure_fatal: true,

            // Records - the stock single-entry table
            records: vec![NameRecord {
                name: "example.p2p.".to_string(),
                address: Ipv4Addr::new(127, 0, 0, 1),
            }],
        }
    }
}

impl Config {
    /// Load configuration from TOML file
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    // Builder-style methods for CLI overrides

    pub fn with_dns_port(mut self, port: Option<u16>) -> Self {
        if let Some(port) = port {
            self.dns_port = port;
        }
        self
    }

    pub fn with_http_port(mut self, port: Option<u16>) -> Self {
        if let Some(port) = port {
            self.http_port = port;
        }
        self
    }

    pub fn with_binding_strategy(mut self, strategy: Option<BindingStrategy>) -> Self {
        if let Some(strategy) = strategy {
            self.binding_strategy = strategy;
        }
        self
    }

    pub fn with_bind_failure_policy(mut self, policy: Option<BindFailurePolicy>) -> Self {
        if let Some(policy) = policy {
            self.on_bind_failure = policy;
        }
        self
    }

    /// Validate configuration values
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.zone.is_empty() {
            anyhow::bail!("zone must not be empty");
        }

        if self.zone.contains('.') {
            anyhow::bail!("zone '{}' must be a bare label without dots", self.zone);
        }

        let suffix = format!(".{}.", self.zone);
        for record in &self.records {
            let name = normalize_name(&record.name);
            if !name.ends_with(&suffix) {
                anyhow::bail!(
                    "record '{}' lies outside the served zone '.{}'",
                    record.name,
                    self.zone
                );
            }
        }

        Ok(())
    }
}
