use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::{contracts::SHARDEUM_TESTNET, session::ChainId, store::DEFAULT_NAMESPACE};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LedgerConfig {
    /// Prefix of every storage key.
    pub namespace: String,
    pub debounce_ms: u64,
    /// Directory holding one bucket file per address.
    pub data_dir: PathBuf,
    pub chain_id: ChainId,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            debounce_ms: 500,
            data_dir: PathBuf::from(".landmark-ledger"),
            chain_id: SHARDEUM_TESTNET,
        }
    }
}

impl LedgerConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn from_toml(raw: &str) -> anyhow::Result<Self> {
        toml::from_str(raw).context("invalid ledger config")
    }
}

pub fn load_config(path: &Path) -> anyhow::Result<LedgerConfig> {
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    LedgerConfig::from_toml(&raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_takes_defaults() {
        let cfg = LedgerConfig::from_toml("").unwrap();
        assert_eq!(cfg, LedgerConfig::default());
        assert_eq!(cfg.debounce(), Duration::from_millis(500));
        assert_eq!(cfg.namespace, "nft-tourism-claimed");
    }

    #[test]
    fn partial_config_overrides_fields() {
        let cfg = LedgerConfig::from_toml(
            r#"
            namespace = "tour"
            chain_id = 80002
            "#,
        )
        .unwrap();
        assert_eq!(cfg.namespace, "tour");
        assert_eq!(cfg.chain_id, 80002);
        assert_eq!(cfg.debounce_ms, 500);
    }

    #[test]
    fn config_file_is_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ledger.toml");
        fs::write(&path, "debounce_ms = 50\ndata_dir = \"/tmp/buckets\"\n").unwrap();
        let cfg = load_config(&path).unwrap();
        assert_eq!(cfg.debounce(), Duration::from_millis(50));
        assert_eq!(cfg.data_dir, PathBuf::from("/tmp/buckets"));
        assert!(load_config(&dir.path().join("missing.toml")).is_err());
    }

    #[test]
    fn wrong_types_are_rejected() {
        assert!(LedgerConfig::from_toml("debounce_ms = \"soon\"").is_err());
    }
}
