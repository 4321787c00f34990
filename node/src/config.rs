//! Node configuration with TOML file support.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crest_types::{FederationMember, NetworkParams};

use crate::NodeError;

/// Configuration for a CREST node.
///
/// Loaded from a TOML file via [`NodeConfig::from_toml_file`] or built
/// programmatically (e.g. for tests). Consensus timing fields feed into
/// [`NetworkParams`]; genesis membership comes from the embedding chain, not
/// from this file.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Data directory for the poll store.
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// LMDB map size for the poll store, in bytes.
    #[serde(default = "default_db_map_size")]
    pub db_map_size: usize,

    /// Reorg-safety delay between poll approval and execution.
    #[serde(default = "default_max_reorg_length")]
    pub max_reorg_length: u64,

    /// Blocks a pending poll stays open before expiring.
    #[serde(default = "default_poll_expiry_blocks")]
    pub poll_expiry_blocks: u64,

    /// No poll expires below this height.
    #[serde(default)]
    pub expiry_activation_height: u64,

    /// Height of the one-time multisig-miner activation, if scheduled.
    #[serde(default)]
    pub multisig_activation_height: Option<u64>,

    /// This node's federation signing key, if it produces blocks.
    #[serde(default)]
    pub federation_key: Option<String>,

    /// Log format: "human" or "json".
    #[serde(default = "default_log_format")]
    pub log_format: String,

    /// Log level filter: "trace", "debug", "info", "warn", "error".
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_data_dir() -> PathBuf {
    PathBuf::from("./crest_data")
}

fn default_db_map_size() -> usize {
    256 * 1024 * 1024
}

fn default_max_reorg_length() -> u64 {
    500
}

fn default_poll_expiry_blocks() -> u64 {
    50_000
}

fn default_log_format() -> String {
    "human".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

impl NodeConfig {
    /// Load configuration from a TOML file.
    pub fn from_toml_file(path: &str) -> Result<Self, NodeError> {
        let content =
            std::fs::read_to_string(path).map_err(|e| NodeError::Config(e.to_string()))?;
        Self::from_toml_str(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self, NodeError> {
        toml::from_str(s).map_err(|e| NodeError::Config(e.to_string()))
    }

    /// Serialize the configuration to a TOML string.
    pub fn to_toml_string(&self) -> String {
        toml::to_string_pretty(self).expect("NodeConfig is always serializable to TOML")
    }

    /// Consensus parameters with this config's timing and the given genesis
    /// federation.
    pub fn network_params(&self, genesis_members: Vec<FederationMember>) -> NetworkParams {
        NetworkParams {
            max_reorg_length: self.max_reorg_length,
            poll_expiry_blocks: self.poll_expiry_blocks,
            expiry_activation_height: self.expiry_activation_height,
            multisig_activation_height: self.multisig_activation_height,
            genesis_members,
        }
    }

    /// Directory holding the poll store database.
    pub fn poll_store_path(&self) -> PathBuf {
        self.data_dir.join("polls")
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            db_map_size: default_db_map_size(),
            max_reorg_length: default_max_reorg_length(),
            poll_expiry_blocks: default_poll_expiry_blocks(),
            expiry_activation_height: 0,
            multisig_activation_height: None,
            federation_key: None,
            log_format: default_log_format(),
            log_level: default_log_level(),
        }
    }
}
