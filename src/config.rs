//! Verifier configuration
//!
//! Loaded from a TOML file or from `CCM_E2E_*` environment variables. Every field has a
//! default, so a config file only needs to name what differs.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::fixtures::load_balancer_name;
use crate::provider::{HttpProvider, LoadBalancerRef};
use crate::retry::RetryPolicy;

/// Prefix of the environment variables read by [`VerifierConfig::from_env`]
pub const ENV_PREFIX: &str = "CCM_E2E_";

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VerifierConfig {
    /// First delay between provider polls
    pub poll_interval_secs: u64,
    pub max_poll_interval_secs: u64,
    pub backoff_multiplier: f64,
    pub jitter: f64,
    /// Deadline for one verification, signal and topology together
    pub timeout_secs: u64,
    /// Per-request timeout against the provider API
    pub request_timeout_secs: u64,
    /// Cluster name the controller embeds in load balancer names
    pub cluster_name: String,
    pub namespace: String,
    pub provider_url: Option<String>,
    pub provider_token: Option<String>,
    pub json_logs: bool,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 5,
            max_poll_interval_secs: 30,
            backoff_multiplier: 1.5,
            jitter: 0.0,
            timeout_secs: 600,
            request_timeout_secs: 30,
            cluster_name: "kubernetes".to_string(),
            namespace: "default".to_string(),
            provider_url: None,
            provider_token: None,
            json_logs: false,
        }
    }
}

impl VerifierConfig {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)
            .map_err(|e| Error::ConfigError(format!("Failed to parse config TOML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            Error::ConfigError(format!("Failed to read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&raw)
    }

    /// Defaults overridden by `CCM_E2E_*` variables from the process environment
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden through `lookup`, which receives the full variable name
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));
        let mut config = Self::default();

        if let Some(v) = parse_var(&get, "POLL_INTERVAL_SECS")? {
            config.poll_interval_secs = v;
        }
        if let Some(v) = parse_var(&get, "MAX_POLL_INTERVAL_SECS")? {
            config.max_poll_interval_secs = v;
        }
        if let Some(v) = parse_var(&get, "BACKOFF_MULTIPLIER")? {
            config.backoff_multiplier = v;
        }
        if let Some(v) = parse_var(&get, "JITTER")? {
            config.jitter = v;
        }
        if let Some(v) = parse_var(&get, "TIMEOUT_SECS")? {
            config.timeout_secs = v;
        }
        if let Some(v) = parse_var(&get, "REQUEST_TIMEOUT_SECS")? {
            config.request_timeout_secs = v;
        }
        if let Some(v) = parse_var(&get, "JSON_LOGS")? {
            config.json_logs = v;
        }
        if let Some(v) = get("CLUSTER_NAME") {
            config.cluster_name = v;
        }
        if let Some(v) = get("NAMESPACE") {
            config.namespace = v;
        }
        config.provider_url = get("PROVIDER_URL").or(config.provider_url);
        config.provider_token = get("PROVIDER_TOKEN").or(config.provider_token);

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.poll_interval_secs == 0 {
            return Err(Error::ConfigError(
                "poll_interval_secs must be greater than zero".to_string(),
            ));
        }
        if self.max_poll_interval_secs < self.poll_interval_secs {
            return Err(Error::ConfigError(format!(
                "max_poll_interval_secs ({}) is below poll_interval_secs ({})",
                self.max_poll_interval_secs, self.poll_interval_secs
            )));
        }
        if self.backoff_multiplier.is_nan() || self.backoff_multiplier < 1.0 {
            return Err(Error::ConfigError(format!(
                "backoff_multiplier must be at least 1.0, got {}",
                self.backoff_multiplier
            )));
        }
        if !(0.0..1.0).contains(&self.jitter) {
            return Err(Error::ConfigError(format!(
                "jitter must be in [0, 1), got {}",
                self.jitter
            )));
        }
        if self.timeout_secs == 0 || self.request_timeout_secs == 0 {
            return Err(Error::ConfigError(
                "timeouts must be greater than zero".to_string(),
            ));
        }
        if self.cluster_name.is_empty() {
            return Err(Error::ConfigError("cluster_name must not be empty".to_string()));
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            interval: Duration::from_secs(self.poll_interval_secs),
            max_interval: Duration::from_secs(self.max_poll_interval_secs),
            multiplier: self.backoff_multiplier,
            jitter: self.jitter,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn http_provider(&self) -> Result<HttpProvider> {
        let url = self
            .provider_url
            .as_deref()
            .filter(|u| !u.is_empty())
            .ok_or_else(|| Error::ConfigError("provider_url is not set".to_string()))?;
        HttpProvider::new(url, self.provider_token.clone(), self.request_timeout())
            .map_err(|e| Error::ConfigError(format!("Failed to build provider client: {e}")))
    }

    /// Reference to the load balancer the controller creates for a Service
    pub fn load_balancer_ref(&self, namespace: &str, service: &str) -> LoadBalancerRef {
        LoadBalancerRef::Name(load_balancer_name(&self.cluster_name, namespace, service))
    }
}

fn parse_var<T, G>(get: &G, name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    G: Fn(&str) -> Option<String>,
{
    match get(name) {
        None => Ok(None),
        Some(raw) => raw.trim().parse().map(Some).map_err(|e| {
            Error::ConfigError(format!("{ENV_PREFIX}{name}={raw:?} is invalid: {e}"))
        }),
    }
}
