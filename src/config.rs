//! Configuration management for Gatekeeper.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::Path;
use tracing::info;

use crate::error::{GatekeeperError, Result};
use crate::ratelimit::RateLimitOptions;

/// Prefix for environment variable overrides, e.g. `GATEKEEPER__RATE_LIMIT__MAX`.
const ENV_PREFIX: &str = "GATEKEEPER";

/// Main configuration for the Gatekeeper service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatekeeperConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Limiter applied to every path without a more specific route limit.
    /// `null` disables it.
    #[serde(default = "default_rate_limit")]
    pub rate_limit: Option<RateLimitOptions>,

    /// Limiters scoped to path prefixes
    #[serde(default)]
    pub routes: Vec<RouteLimitConfig>,
}

impl Default for GatekeeperConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            rate_limit: default_rate_limit(),
            routes: Vec::new(),
        }
    }
}

fn default_rate_limit() -> Option<RateLimitOptions> {
    Some(RateLimitOptions::default())
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP listen address
    #[serde(default = "default_listen_addr")]
    pub listen_addr: SocketAddr,

    /// Take the client key from `X-Forwarded-For` when present.
    /// Only enable behind a proxy that sets the header.
    #[serde(default)]
    pub trust_forwarded_for: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen_addr(),
            trust_forwarded_for: false,
        }
    }
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8080))
}

/// A limiter for one path prefix.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteLimitConfig {
    /// Path prefix, matched on segment boundaries
    pub path_prefix: String,

    #[serde(default)]
    pub limit: RateLimitOptions,
}

impl GatekeeperConfig {
    /// Load configuration from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: GatekeeperConfig = serde_yaml::from_str(yaml)
            .map_err(|e| GatekeeperError::Config(format!("Failed to parse configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from defaults, an optional YAML file and
    /// `GATEKEEPER__*` environment variables, in increasing precedence.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with_env_prefix(path, ENV_PREFIX)
    }

    fn load_with_env_prefix(path: Option<&Path>, env_prefix: &str) -> Result<Self> {
        let mut builder = ::config::Config::builder();

        if let Some(path) = path {
            info!(path = %path.display(), "Loading configuration");
            builder = builder.add_source(
                ::config::File::from(path).format(::config::FileFormat::Yaml),
            );
        }

        let config: GatekeeperConfig = builder
            .add_source(
                ::config::Environment::with_prefix(env_prefix)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Check every limiter's options and the route table.
    pub fn validate(&self) -> Result<()> {
        if let Some(ref options) = self.rate_limit {
            options.validate()?;
        }

        let mut seen = HashSet::new();
        for route in &self.routes {
            if !route.path_prefix.starts_with('/') {
                return Err(GatekeeperError::Config(format!(
                    "route prefix {:?} must start with '/'",
                    route.path_prefix
                )));
            }
            if !seen.insert(route.path_prefix.as_str()) {
                return Err(GatekeeperError::Config(format!(
                    "duplicate route prefix {:?}",
                    route.path_prefix
                )));
            }
            route.limit.validate().map_err(|e| {
                GatekeeperError::Config(format!("route {}: {}", route.path_prefix, e))
            })?;
        }

        Ok(())
    }
}
