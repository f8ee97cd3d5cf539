use std::fmt;

use serde::{Deserialize, Serialize};

pub type ChainId = u64;

/// Wallet address as reported by the connected wallet. Kept verbatim; the
/// storage key is derived from this exact string.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Address {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

impl From<String> for Address {
    fn from(raw: String) -> Self {
        Self(raw)
    }
}

/// Source of the active wallet address and chain.
pub trait WalletSession {
    fn active_address(&self) -> Option<Address>;
    fn chain_id(&self) -> Option<ChainId>;
}

/// Session with a fixed address and chain, used by the CLI and tests.
#[derive(Clone, Debug, Default)]
pub struct StaticSession {
    pub address: Option<Address>,
    pub chain_id: Option<ChainId>,
}

impl StaticSession {
    pub fn connected(address: impl Into<Address>, chain_id: ChainId) -> Self {
        Self {
            address: Some(address.into()),
            chain_id: Some(chain_id),
        }
    }

    pub fn disconnected() -> Self {
        Self::default()
    }
}

impl WalletSession for StaticSession {
    fn active_address(&self) -> Option<Address> {
        self.address.clone()
    }

    fn chain_id(&self) -> Option<ChainId> {
        self.chain_id
    }
}
