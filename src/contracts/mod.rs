//! Landmark NFT contract surface: which chains carry the contract, the
//! client trait the ledger submits through, and the token metadata encoding.

use async_trait::async_trait;
use tokio::sync::oneshot;

use crate::session::ChainId;

mod metadata;
mod simulated;

pub use metadata::{LandmarkMetadata, MetadataAttribute, TokenMetadata, TOKEN_URI_PREFIX};
pub use simulated::SimulatedContract;

pub type TxHash = String;

pub const SHARDEUM_TESTNET: ChainId = 8119;
pub const POLYGON_AMOY: ChainId = 80002;

/// 0.01 SHM / POL, in wei.
pub const MINT_PRICE_WEI: u128 = 10_000_000_000_000_000;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ChainInfo {
    pub chain_id: ChainId,
    pub name: &'static str,
    pub currency_symbol: &'static str,
    pub contract_address: Option<&'static str>,
}

impl ChainInfo {
    pub fn is_supported(&self) -> bool {
        self.contract_address.is_some()
    }
}

pub const KNOWN_CHAINS: [ChainInfo; 2] = [
    ChainInfo {
        chain_id: SHARDEUM_TESTNET,
        name: "Shardeum",
        currency_symbol: "SHM",
        contract_address: Some("0xD04ed19aD1AC7e2fa5e8a95d074cdd0f416D143e"),
    },
    ChainInfo {
        chain_id: POLYGON_AMOY,
        name: "Polygon",
        currency_symbol: "POL",
        contract_address: Some("0xD04ed19aD1AC7e2fa5e8a95d074cdd0f416D143e"),
    },
];

pub fn chain_info(chain_id: ChainId) -> ChainInfo {
    KNOWN_CHAINS
        .iter()
        .find(|c| c.chain_id == chain_id)
        .copied()
        .unwrap_or(ChainInfo {
            chain_id,
            name: "Unknown",
            currency_symbol: "ETH",
            contract_address: None,
        })
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ContractError {
    #[error("wallet not connected")]
    WalletNotConnected,
    #[error("contract not deployed on chain {chain_id}; switch to Shardeum or Polygon")]
    NotDeployed { chain_id: ChainId },
    #[error("transaction rejected: {0}")]
    Rejected(String),
    #[error("rpc failure: {0}")]
    Transport(String),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Confirmation {
    Confirmed { tx_hash: TxHash },
}

/// One-shot subscription to the confirmation of a single transaction.
pub type ConfirmationWatch = oneshot::Receiver<Confirmation>;

#[async_trait]
pub trait ContractClient: Send + Sync {
    fn chain_id(&self) -> ChainId;

    fn current_chain_supported(&self) -> bool {
        chain_info(self.chain_id()).is_supported()
    }

    /// Sends `mintLandmark(landmarkId, tokenURI)` with the mint price attached.
    async fn submit_mint(&self, landmark_id: &str, token_uri: &str) -> Result<TxHash, ContractError>;

    fn watch_confirmation(&self, tx_hash: &str) -> ConfirmationWatch;

    /// Records an on-chain visit for an already minted token.
    async fn visit_landmark(&self, token_id: u64) -> Result<TxHash, ContractError>;

    /// Contract-wide mint counter, `None` when the contract is unreachable.
    fn total_minted(&self) -> Option<u64>;

    fn mint_price(&self) -> Option<u128> {
        self.current_chain_supported().then_some(MINT_PRICE_WEI)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_chains_carry_contract() {
        let shardeum = chain_info(SHARDEUM_TESTNET);
        assert_eq!(shardeum.name, "Shardeum");
        assert_eq!(shardeum.currency_symbol, "SHM");
        assert!(shardeum.is_supported());
        let polygon = chain_info(POLYGON_AMOY);
        assert_eq!(polygon.currency_symbol, "POL");
        assert!(polygon.is_supported());
    }

    #[test]
    fn unknown_chain_is_unsupported() {
        let mainnet = chain_info(1);
        assert_eq!(mainnet.name, "Unknown");
        assert_eq!(mainnet.currency_symbol, "ETH");
        assert!(!mainnet.is_supported());
    }
}
