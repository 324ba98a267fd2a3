//! Configuration loading from gatekeeper.toml.

use policy::{Address, FirewallConfig};
use runtime::{
    ApprovalRequest, ApprovalResponse, DecisionEndpoint, FixedEndpoint, HttpEndpoint,
    JsonRpcNetwork, LocalEndpoint, RetryConfig,
};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "GATEKEEPER_CONFIG";

/// Config file looked up in the working directory.
pub const CONFIG_FILE: &str = "gatekeeper.toml";

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub endpoint: EndpointConfig,

    #[serde(default)]
    pub retry: RetrySection,

    #[serde(default)]
    pub network: NetworkConfig,

    /// Local firewall, used by `check`, `policies` and the `local` endpoint.
    #[serde(default)]
    pub firewall: Option<FirewallConfig>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointKind {
    Approve,
    Deny,
    Local,
}

/// Decision endpoint configuration.
///
/// Exactly one of `url` or `kind` selects the endpoint. With neither, a
/// configured `[firewall]` is evaluated locally.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EndpointConfig {
    pub url: Option<String>,
    pub kind: Option<EndpointKind>,
    pub policy_address: Option<Address>,
    /// Reason given by the `deny` endpoint.
    pub deny_reason: Option<String>,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            url: None,
            kind: None,
            policy_address: None,
            deny_reason: None,
            timeout_ms: default_timeout_ms(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RetrySection {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

impl From<&RetrySection> for RetryConfig {
    fn from(section: &RetrySection) -> Self {
        RetryConfig {
            max_attempts: section.max_attempts,
            initial_backoff: Duration::from_millis(section.initial_backoff_ms),
            max_backoff: Duration::from_millis(section.max_backoff_ms),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NetworkConfig {
    #[serde(default = "default_rpc_url")]
    pub rpc_url: String,
    #[serde(default = "default_receipt_poll_ms")]
    pub receipt_poll_ms: u64,
    #[serde(default = "default_receipt_timeout_ms")]
    pub receipt_timeout_ms: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            rpc_url: default_rpc_url(),
            receipt_poll_ms: default_receipt_poll_ms(),
            receipt_timeout_ms: default_receipt_timeout_ms(),
        }
    }
}

fn default_timeout_ms() -> u64 {
    10_000
}

fn default_max_attempts() -> u32 {
    3
}

fn default_initial_backoff_ms() -> u64 {
    200
}

fn default_max_backoff_ms() -> u64 {
    2_000
}

fn default_rpc_url() -> String {
    "http://127.0.0.1:8545".to_string()
}

fn default_receipt_poll_ms() -> u64 {
    1_000
}

fn default_receipt_timeout_ms() -> u64 {
    120_000
}

/// The decision endpoint selected by configuration.
#[derive(Debug)]
pub enum Endpoint {
    Http(HttpEndpoint),
    Fixed(FixedEndpoint),
    Local(LocalEndpoint),
}

impl DecisionEndpoint for Endpoint {
    fn name(&self) -> &str {
        match self {
            Self::Http(e) => e.name(),
            Self::Fixed(e) => e.name(),
            Self::Local(e) => e.name(),
        }
    }

    async fn approve(&self, request: &ApprovalRequest) -> runtime::Result<ApprovalResponse> {
        match self {
            Self::Http(e) => e.approve(request).await,
            Self::Fixed(e) => e.approve(request).await,
            Self::Local(e) => e.approve(request).await,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&content)
    }

    /// Parse configuration from TOML string.
    pub fn parse(toml: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Path of the config file in effect, if any.
    ///
    /// `GATEKEEPER_CONFIG` wins; otherwise `gatekeeper.toml` in the working
    /// directory is used when it exists.
    pub fn locate() -> Option<PathBuf> {
        if let Some(path) = std::env::var_os(CONFIG_ENV) {
            return Some(PathBuf::from(path));
        }
        let local = PathBuf::from(CONFIG_FILE);
        local.exists().then_some(local)
    }

    /// Load the config file in effect, or the defaults.
    pub fn discover() -> Result<Self, ConfigError> {
        match Self::locate() {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    pub fn firewall(&self) -> Result<&FirewallConfig, ConfigError> {
        self.firewall.as_ref().ok_or(ConfigError::MissingFirewall)
    }

    /// Build the configured decision endpoint.
    pub fn endpoint(&self) -> Result<Endpoint, ConfigError> {
        let section = &self.endpoint;
        let kind = match (&section.url, section.kind) {
            (Some(url), None) => {
                let endpoint = HttpEndpoint::new(url.clone())
                    .with_timeout(Duration::from_millis(section.timeout_ms));
                return Ok(Endpoint::Http(endpoint));
            }
            (Some(_), Some(_)) => return Err(ConfigError::AmbiguousEndpoint),
            (None, Some(kind)) => kind,
            (None, None) if self.firewall.is_some() => EndpointKind::Local,
            (None, None) => return Err(ConfigError::MissingEndpoint),
        };

        Ok(match kind {
            EndpointKind::Approve => Endpoint::Fixed(FixedEndpoint::approve_all()),
            EndpointKind::Deny => Endpoint::Fixed(match &section.deny_reason {
                Some(reason) => FixedEndpoint::deny_with(reason.clone()),
                None => FixedEndpoint::deny_all(),
            }),
            EndpointKind::Local => {
                let firewall = self.firewall()?.build()?;
                Endpoint::Local(LocalEndpoint::new(Arc::clone(&firewall.registry)))
            }
        })
    }

    pub fn retry(&self) -> RetryConfig {
        RetryConfig::from(&self.retry)
    }

    pub fn network(&self) -> JsonRpcNetwork {
        JsonRpcNetwork::new(self.network.rpc_url.clone())
            .with_poll_interval(Duration::from_millis(self.network.receipt_poll_ms))
            .with_receipt_timeout(Duration::from_millis(self.network.receipt_timeout_ms))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(String),

    #[error("decision endpoint not configured: set endpoint.url, endpoint.kind or [firewall]")]
    MissingEndpoint,

    #[error("ambiguous decision endpoint: set either endpoint.url OR endpoint.kind, not both")]
    AmbiguousEndpoint,

    #[error("no [firewall] section in config")]
    MissingFirewall,

    #[error(transparent)]
    Firewall(#[from] policy::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_file() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.retry().max_attempts, 3);
        assert_eq!(config.network.rpc_url, "http://127.0.0.1:8545");
        assert!(matches!(config.endpoint(), Err(ConfigError::MissingEndpoint)));
    }

    #[test]
    fn url_selects_http_endpoint() {
        let config = Config::parse(
            r#"
[endpoint]
url = "https://signer.example/rpc"
policy_address = "0x00000000000000000000000000000000000000a1"
timeout_ms = 500
"#,
        )
        .unwrap();
        match config.endpoint().unwrap() {
            Endpoint::Http(endpoint) => assert_eq!(endpoint.url(), "https://signer.example/rpc"),
            other => panic!("expected http endpoint, got {other:?}"),
        }
        assert!(config.endpoint.policy_address.is_some());
    }

    #[test]
    fn url_and_kind_conflict() {
        let config = Config::parse(
            r#"
[endpoint]
url = "https://signer.example/rpc"
kind = "approve"
"#,
        )
        .unwrap();
        assert!(matches!(config.endpoint(), Err(ConfigError::AmbiguousEndpoint)));
    }

    #[test]
    fn deny_endpoint_uses_reason() {
        let config = Config::parse(
            r#"
[endpoint]
kind = "deny"
deny_reason = "firewall rejected: maintenance"
"#,
        )
        .unwrap();
        assert_eq!(config.endpoint().unwrap().name(), "deny");
    }

    #[test]
    fn firewall_section_implies_local_endpoint() {
        let config = Config::parse(
            r#"
[firewall]
admin = "0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266"

[[firewall.policies]]
name = "allowlist"
kind = "allowlist"
address = "0x00000000000000000000000000000000000000a1"
"#,
        )
        .unwrap();
        assert!(matches!(config.endpoint().unwrap(), Endpoint::Local(_)));
    }

    #[test]
    fn rejects_unknown_sections() {
        assert!(matches!(
            Config::parse("[backend]\nmodel = \"x\"\n"),
            Err(ConfigError::Parse(_))
        ));
    }
}
