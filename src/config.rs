//! Settings for the demo binary. The library itself never reads them.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const DEFAULT_SIGNET_ENDPOINT: &str = "https://mempool.space/signet/api";

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum NetworkKind {
    Bitcoin,
    Testnet,
    #[default]
    Signet,
    Regtest,
}

impl From<NetworkKind> for bitcoin::Network {
    fn from(kind: NetworkKind) -> Self {
        match kind {
            NetworkKind::Bitcoin => bitcoin::Network::Bitcoin,
            NetworkKind::Testnet => bitcoin::Network::Testnet,
            NetworkKind::Signet => bitcoin::Network::Signet,
            NetworkKind::Regtest => bitcoin::Network::Regtest,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct BroadcastConfig {
    pub enabled: bool,
    /// Esplora-style API root; transactions are POSTed to `{endpoint}/tx`.
    pub endpoint: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
    /// Delay before the first retry, doubled on each further attempt.
    pub backoff_ms: u64,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        BroadcastConfig {
            enabled: false,
            endpoint: DEFAULT_SIGNET_ENDPOINT.to_string(),
            timeout_secs: 30,
            max_retries: 3,
            backoff_ms: 500,
        }
    }
}

impl BroadcastConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    pub network: NetworkKind,
    pub broadcast: BroadcastConfig,
}

impl Config {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str::<Config>(content)?)
    }

    pub fn network(&self) -> bitcoin::Network {
        self.network.into()
    }
}
