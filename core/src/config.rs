//! Configuration for the SDK
//!
//! This module provides the configuration of an SDK instance: the node
//! endpoints, challenge defaults, request timeouts and session persistence.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::{OrbisError, Result};

/// Ninety days, the default challenge validity
pub const DEFAULT_VALIDITY_SECS: u64 = 90 * 24 * 60 * 60;

/// Key under which serialized sessions are persisted
pub const DEFAULT_SESSION_STORAGE_KEY: &str = "orbis:session";

/// Remote node endpoint
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Base url of the node
    pub gateway: String,

    /// API key sent as `x-orbis-api-key`
    #[serde(default)]
    pub key: Option<String>,

    /// Environment id forwarded with queries
    #[serde(default)]
    pub env: Option<String>,
}

impl NodeConfig {
    /// Create a node without key nor environment
    pub fn new(gateway: impl Into<String>) -> Self {
        Self {
            gateway: gateway.into(),
            key: None,
            env: None,
        }
    }

    /// Gateway without trailing slashes
    pub fn normalized_gateway(&self) -> &str {
        self.gateway.trim_end_matches('/')
    }
}

/// Defaults for sign-in challenges
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiwxConfig {
    /// Domain of the application
    #[serde(default)]
    pub domain: Option<String>,

    /// Uri of the application
    #[serde(default)]
    pub uri: Option<String>,

    /// Challenge validity in seconds
    #[serde(default = "default_validity_secs")]
    pub validity_secs: u64,
}

fn default_validity_secs() -> u64 {
    DEFAULT_VALIDITY_SECS
}

impl Default for SiwxConfig {
    fn default() -> Self {
        SiwxConfig {
            domain: None,
            uri: None,
            validity_secs: DEFAULT_VALIDITY_SECS,
        }
    }
}

/// SDK configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrbisConfig {
    /// Node endpoints, the first one is active initially
    pub nodes: Vec<NodeConfig>,

    /// Challenge defaults
    #[serde(default)]
    pub siwx: SiwxConfig,

    /// Timeout of every node request in seconds
    pub request_timeout_secs: u64,

    /// Key of the persisted session
    pub session_storage_key: String,

    /// Log level
    pub log_level: String,
}

impl Default for OrbisConfig {
    fn default() -> Self {
        OrbisConfig {
            nodes: vec![NodeConfig::new("http://localhost:7008")],
            siwx: SiwxConfig::default(),
            request_timeout_secs: 30,
            session_storage_key: DEFAULT_SESSION_STORAGE_KEY.to_string(),
            log_level: "info".to_string(),
        }
    }
}

impl OrbisConfig {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a configuration for the given nodes
    pub fn with_nodes(nodes: Vec<NodeConfig>) -> Self {
        OrbisConfig {
            nodes,
            ..Self::default()
        }
    }

    /// Request timeout as a duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Check the configuration can be used
    pub fn validate(&self) -> Result<()> {
        if self.nodes.is_empty() {
            return Err(OrbisError::Configuration(
                "At least one node is required".to_string(),
            ));
        }

        if let Some(node) = self
            .nodes
            .iter()
            .find(|node| node.normalized_gateway().is_empty())
        {
            return Err(OrbisError::Configuration(format!(
                "Invalid node gateway \"{}\"",
                node.gateway
            )));
        }

        if self.request_timeout_secs == 0 {
            return Err(OrbisError::Configuration(
                "Request timeout must be positive".to_string(),
            ));
        }

        if self.siwx.validity_secs == 0 {
            return Err(OrbisError::Configuration(
                "Challenge validity must be positive".to_string(),
            ));
        }

        if self.session_storage_key.is_empty() {
            return Err(OrbisError::Configuration(
                "Session storage key cannot be empty".to_string(),
            ));
        }

        Ok(())
    }

    /// Load configuration from a JSON file
    pub fn from_file(path: &str) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        let config: Self = serde_json::from_reader(file)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to a JSON file
    pub fn to_file(&self, path: &str) -> Result<()> {
        let file = std::fs::File::create(path)?;
        serde_json::to_writer_pretty(file, self)?;
        Ok(())
    }

    /// Create a development configuration
    pub fn development() -> Self {
        let mut config = Self::default();
        config.log_level = "debug".to_string();
        config
    }

    /// Create a production configuration
    pub fn production() -> Self {
        let mut config = Self::default();
        config.log_level = "info".to_string();
        config
    }

    /// Create a testing configuration
    pub fn testing() -> Self {
        let mut config = Self::default();
        config.log_level = "debug".to_string();
        config.request_timeout_secs = 5;
        config.siwx.domain = Some("localhost".to_string());
        config.siwx.uri = Some("http://localhost".to_string());
        config
    }
}
