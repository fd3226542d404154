//! Configuration for the mock server.
//!
//! Defines the listen address, the routes and how each route derives,
//! delays and stores its fixtures.

use crate::delay::DelaySpec;
use crate::key::KeyStrategy;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

/// Main configuration for the mock server.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MockServerConfig {
    /// Address the HTTP listener binds to
    #[serde(default = "default_listen")]
    pub listen: SocketAddr,

    /// Route definitions
    #[serde(default)]
    pub routes: Vec<RouteConfig>,

    /// Global settings
    #[serde(default)]
    pub settings: GlobalSettings,
}

impl Default for MockServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            routes: Vec::new(),
            settings: GlobalSettings::default(),
        }
    }
}

fn default_listen() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 9000))
}

impl MockServerConfig {
    /// Load configuration from a YAML file.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse and validate a YAML document.
    pub fn from_yaml(yaml: &str) -> anyhow::Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> anyhow::Result<()> {
        let mut names = HashSet::new();
        for (i, route) in self.routes.iter().enumerate() {
            route
                .validate()
                .map_err(|e| anyhow::anyhow!("Route {}: {}", i, e))?;
            if !names.insert(route.name.as_str()) {
                anyhow::bail!("Route {}: duplicate route name {:?}", i, route.name);
            }
        }
        Ok(())
    }
}

/// A single route: which requests it owns and how their fixtures are handled.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RouteConfig {
    /// Route identity, also the fixture sub-directory
    pub name: String,

    /// Requests this route is responsible for
    #[serde(default = "default_context")]
    pub context: PathMatcher,

    /// Priority (higher = matched first)
    #[serde(default)]
    pub priority: i32,

    /// Whether this route is enabled
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Latency simulation applied before replaying a fixture
    #[serde(default)]
    pub delay: Option<DelaySpec>,

    /// Include the request body in the fixture key
    #[serde(default)]
    pub hash_full_request: bool,

    /// Root directory for fixtures
    #[serde(default = "default_mocks_path")]
    pub mocks_path: PathBuf,

    /// Fixture file naming
    #[serde(default)]
    pub key_strategy: KeyStrategy,
}

impl Default for RouteConfig {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            context: default_context(),
            priority: 0,
            enabled: true,
            delay: None,
            hash_full_request: false,
            mocks_path: default_mocks_path(),
            key_strategy: KeyStrategy::default(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_context() -> PathMatcher {
    PathMatcher::Prefix {
        value: "/".to_string(),
    }
}

fn default_mocks_path() -> PathBuf {
    PathBuf::from("mocks")
}

impl RouteConfig {
    /// Validate the route definition.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.name.is_empty() {
            anyhow::bail!("Route name cannot be empty");
        }
        if !self
            .name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
            || self.name.starts_with('.')
        {
            anyhow::bail!(
                "Route name {:?} must be a plain file name ([A-Za-z0-9._-], not starting with '.')",
                self.name
            );
        }
        self.context.validate()?;
        Ok(())
    }
}

/// Path matching configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PathMatcher {
    /// Exact path match
    Exact { value: String },
    /// Path prefix match
    Prefix { value: String },
    /// Regex pattern match
    Regex { pattern: String },
    /// Glob pattern match
    Glob { pattern: String },
}

impl PathMatcher {
    /// Validate the path matcher.
    pub fn validate(&self) -> anyhow::Result<()> {
        match self {
            PathMatcher::Regex { pattern } => {
                regex::Regex::new(pattern).map_err(|e| anyhow::anyhow!("Invalid regex: {}", e))?;
            }
            PathMatcher::Glob { pattern } => {
                globset::Glob::new(pattern).map_err(|e| anyhow::anyhow!("Invalid glob: {}", e))?;
            }
            _ => {}
        }
        Ok(())
    }
}

/// Global settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GlobalSettings {
    /// Log the "Mocked" success event for every replayed fixture. The
    /// "Dispatching request" line is always logged.
    #[serde(default = "default_true")]
    pub log_mocked: bool,

    /// Log requests without a fixture
    #[serde(default = "default_true")]
    pub log_missed: bool,
}

impl Default for GlobalSettings {
    fn default() -> Self {
        Self {
            log_mocked: true,
            log_missed: true,
        }
    }
}
