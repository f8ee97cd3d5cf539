use std::{
    collections::{BTreeMap, BTreeSet},
    sync::{
        atomic::{AtomicU64, Ordering},
        Mutex,
    },
};

use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tokio::sync::oneshot;
use tracing::debug;

use super::{
    chain_info, Confirmation, ConfirmationWatch, ContractClient, ContractError, TxHash,
};
use crate::session::ChainId;

#[derive(Default)]
struct SimState {
    submitted: BTreeMap<TxHash, String>,
    confirmed: BTreeSet<TxHash>,
    watchers: BTreeMap<TxHash, Vec<oneshot::Sender<Confirmation>>>,
    fail_next: Option<String>,
    total_minted: u64,
}

/// In-process stand-in for the deployed landmark contract. Transactions are
/// accepted immediately and confirmed only when [`SimulatedContract::confirm`]
/// is called, so callers control block inclusion.
pub struct SimulatedContract {
    chain_id: ChainId,
    nonce: AtomicU64,
    state: Mutex<SimState>,
}

impl SimulatedContract {
    pub fn new(chain_id: ChainId) -> Self {
        Self::with_nonce_seed(chain_id, rand::random())
    }

    pub fn with_nonce_seed(chain_id: ChainId, seed: u64) -> Self {
        Self {
            chain_id,
            nonce: AtomicU64::new(seed),
            state: Mutex::new(SimState::default()),
        }
    }

    pub fn with_total_minted(self, total: u64) -> Self {
        self.lock().total_minted = total;
        self
    }

    /// Makes the next submission fail with `message`.
    pub fn fail_next_submission(&self, message: impl Into<String>) {
        self.lock().fail_next = Some(message.into());
    }

    /// Includes `tx_hash` in a block and notifies its watchers. Returns false
    /// for hashes this contract never issued.
    pub fn confirm(&self, tx_hash: &str) -> bool {
        let mut state = self.lock();
        let Some(kind) = state.submitted.get(tx_hash).cloned() else {
            return false;
        };
        if state.confirmed.insert(tx_hash.to_string()) && kind == "mint" {
            state.total_minted += 1;
        }
        for watcher in state.watchers.remove(tx_hash).unwrap_or_default() {
            let _ = watcher.send(Confirmation::Confirmed {
                tx_hash: tx_hash.to_string(),
            });
        }
        debug!(tx_hash, "simulated confirmation");
        true
    }

    pub fn pending_transactions(&self) -> Vec<TxHash> {
        let state = self.lock();
        state
            .submitted
            .keys()
            .filter(|h| !state.confirmed.contains(*h))
            .cloned()
            .collect()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn ensure_deployed(&self) -> Result<(), ContractError> {
        if chain_info(self.chain_id).is_supported() {
            Ok(())
        } else {
            Err(ContractError::NotDeployed {
                chain_id: self.chain_id,
            })
        }
    }

    fn issue(&self, kind: &str, parts: &[&[u8]]) -> Result<TxHash, ContractError> {
        let mut state = self.lock();
        if let Some(message) = state.fail_next.take() {
            return Err(ContractError::Rejected(message));
        }
        let nonce = self.nonce.fetch_add(1, Ordering::Relaxed);
        let mut hasher = Sha256::new();
        hasher.update(self.chain_id.to_le_bytes());
        for part in parts {
            hasher.update(part);
        }
        hasher.update(nonce.to_le_bytes());
        let tx_hash = format!("0x{}", hex::encode(hasher.finalize()));
        state.submitted.insert(tx_hash.clone(), kind.to_string());
        Ok(tx_hash)
    }
}

#[async_trait]
impl ContractClient for SimulatedContract {
    fn chain_id(&self) -> ChainId {
        self.chain_id
    }

    async fn submit_mint(&self, landmark_id: &str, token_uri: &str) -> Result<TxHash, ContractError> {
        self.ensure_deployed()?;
        let tx_hash = self.issue("mint", &[landmark_id.as_bytes(), token_uri.as_bytes()])?;
        debug!(landmark_id, %tx_hash, "simulated mint submitted");
        Ok(tx_hash)
    }

    fn watch_confirmation(&self, tx_hash: &str) -> ConfirmationWatch {
        let (tx, rx) = oneshot::channel();
        let mut state = self.lock();
        if state.confirmed.contains(tx_hash) {
            let _ = tx.send(Confirmation::Confirmed {
                tx_hash: tx_hash.to_string(),
            });
        } else {
            state.watchers.entry(tx_hash.to_string()).or_default().push(tx);
        }
        rx
    }

    async fn visit_landmark(&self, token_id: u64) -> Result<TxHash, ContractError> {
        self.ensure_deployed()?;
        let minted = self.lock().total_minted;
        if token_id == 0 || token_id > minted {
            return Err(ContractError::Rejected(format!("token {token_id} does not exist")));
        }
        self.issue("visit", &[b"visit", &token_id.to_le_bytes()])
    }

    fn total_minted(&self) -> Option<u64> {
        self.current_chain_supported().then(|| self.lock().total_minted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::{POLYGON_AMOY, SHARDEUM_TESTNET};

    #[tokio::test]
    async fn hashes_are_unique_per_submission() {
        let contract = SimulatedContract::with_nonce_seed(SHARDEUM_TESTNET, 7);
        let a = contract.submit_mint("eiffel", "data:x").await.unwrap();
        let b = contract.submit_mint("eiffel", "data:x").await.unwrap();
        assert_ne!(a, b);
        assert!(a.starts_with("0x"));
        assert_eq!(a.len(), 66);
    }

    #[tokio::test]
    async fn unsupported_chain_refuses_mint() {
        let contract = SimulatedContract::new(1);
        assert!(!contract.current_chain_supported());
        assert_eq!(contract.mint_price(), None);
        assert_eq!(contract.total_minted(), None);
        let err = contract.submit_mint("eiffel", "data:x").await.unwrap_err();
        assert_eq!(err, ContractError::NotDeployed { chain_id: 1 });
    }

    #[tokio::test]
    async fn watchers_fire_on_confirm_and_after_it() {
        let contract = SimulatedContract::new(POLYGON_AMOY);
        let tx = contract.submit_mint("colosseum", "data:y").await.unwrap();
        let mut early = contract.watch_confirmation(&tx);
        assert!(early.try_recv().is_err());
        assert!(contract.confirm(&tx));
        assert_eq!(
            early.try_recv().unwrap(),
            Confirmation::Confirmed { tx_hash: tx.clone() }
        );
        let mut late = contract.watch_confirmation(&tx);
        assert!(late.try_recv().is_ok());
        assert!(contract.confirm(&tx));
        assert_eq!(contract.total_minted(), Some(1));
        assert!(!contract.confirm("0xnope"));
    }

    #[tokio::test]
    async fn injected_failure_is_one_shot() {
        let contract = SimulatedContract::new(SHARDEUM_TESTNET);
        contract.fail_next_submission("user rejected the request");
        let err = contract.submit_mint("eiffel", "data:x").await.unwrap_err();
        assert_eq!(err, ContractError::Rejected("user rejected the request".into()));
        assert!(contract.submit_mint("eiffel", "data:x").await.is_ok());
    }

    #[tokio::test]
    async fn seeded_total_allows_visits() {
        let contract = SimulatedContract::new(SHARDEUM_TESTNET).with_total_minted(3);
        assert_eq!(contract.total_minted(), Some(3));
        assert!(contract.visit_landmark(3).await.is_ok());
        assert!(contract.visit_landmark(4).await.is_err());
    }

    #[tokio::test]
    async fn visit_requires_minted_token() {
        let contract = SimulatedContract::new(SHARDEUM_TESTNET);
        assert!(contract.visit_landmark(1).await.is_err());
        let tx = contract.submit_mint("eiffel", "data:x").await.unwrap();
        contract.confirm(&tx);
        assert!(contract.visit_landmark(1).await.is_ok());
        assert_eq!(contract.total_minted(), Some(1));
        assert!(contract.pending_transactions().len() == 1);
    }
}
