use std::{
    collections::BTreeSet,
    time::{Duration, Instant},
};

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot::error::TryRecvError;
use tracing::{debug, info, warn};

use crate::{
    config::LedgerConfig,
    contracts::{
        Confirmation, ConfirmationWatch, ContractClient, ContractError, LandmarkMetadata,
        TokenMetadata, TxHash,
    },
    session::{Address, ChainId, WalletSession},
    store::{storage_key, PersistenceStore, StoreError, DEFAULT_NAMESPACE},
};

mod reconcile;

pub use reconcile::{decode_bucket, reconcile};

pub type LandmarkId = String;

pub const DEFAULT_DEBOUNCE: Duration = Duration::from_millis(500);

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    #[error("wallet not connected")]
    NotConnected,
    #[error("contract not deployed on chain {chain_id}")]
    UnsupportedChain { chain_id: ChainId },
    #[error("landmark {landmark_id} {}", already_minted_reason(.in_progress))]
    AlreadyMinted {
        landmark_id: LandmarkId,
        in_progress: bool,
    },
    #[error("mint submission failed: {message}")]
    MintSubmissionFailed { message: String },
}

fn already_minted_reason(in_progress: &bool) -> &'static str {
    if *in_progress {
        "already has a mint in flight"
    } else {
        "is already minted on chain"
    }
}

impl LedgerError {
    /// A duplicate request for a mint that is still in flight; safe to ignore.
    pub fn is_benign(&self) -> bool {
        matches!(
            self,
            LedgerError::AlreadyMinted {
                in_progress: true,
                ..
            }
        )
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ClaimRecord {
    pub landmark_id: LandmarkId,
    pub claimed_at: DateTime<Utc>,
    /// Local placeholder until the chain assigns a real token id.
    pub token_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<TxHash>,
    #[serde(default)]
    pub on_chain: bool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Totals {
    pub claimed: usize,
    pub on_chain: usize,
}

impl Totals {
    /// Minted count to show: the contract counter when it reports one,
    /// otherwise the locally confirmed count.
    pub fn reported_minted(&self, contract_total: Option<u64>) -> u64 {
        match contract_total {
            Some(total) if total > 0 => total,
            _ => self.on_chain as u64,
        }
    }
}

/// A mint that passed the ledger checks and is ready to hand to the contract.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MintTicket {
    pub address: Address,
    pub landmark_id: LandmarkId,
    pub token_uri: String,
}

struct PendingWrite {
    address: Address,
    due: Instant,
}

struct PendingConfirmation {
    address: Address,
    tx_hash: TxHash,
    watch: ConfirmationWatch,
}

/// Claimed and minted landmarks of the active wallet address.
pub struct ClaimLedger<S: PersistenceStore> {
    store: S,
    namespace: String,
    debounce: Duration,
    address: Option<Address>,
    records: Vec<ClaimRecord>,
    pending_write: Option<PendingWrite>,
    in_flight: BTreeSet<(Address, LandmarkId)>,
    confirmations: Vec<PendingConfirmation>,
    last_mint_error: Option<String>,
}

impl<S: PersistenceStore> ClaimLedger<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            namespace: DEFAULT_NAMESPACE.to_string(),
            debounce: DEFAULT_DEBOUNCE,
            address: None,
            records: Vec::new(),
            pending_write: None,
            in_flight: BTreeSet::new(),
            confirmations: Vec::new(),
            last_mint_error: None,
        }
    }

    pub fn with_config(store: S, config: &LedgerConfig) -> Self {
        Self::new(store)
            .with_namespace(config.namespace.clone())
            .with_debounce(config.debounce())
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn address(&self) -> Option<&Address> {
        self.address.as_ref()
    }

    pub fn records(&self) -> &[ClaimRecord] {
        &self.records
    }

    pub fn record(&self, landmark_id: &str) -> Option<&ClaimRecord> {
        self.records.iter().find(|r| r.landmark_id == landmark_id)
    }

    //==================== address buckets ====================//

    /// Makes `address` active and replaces the visible set with its stored
    /// bucket. Unreadable or malformed storage yields an empty set.
    pub fn load(&mut self, address: impl Into<Address>) {
        let address = address.into();
        self.flush_logged();
        let stored = self.read_bucket(&address);
        let total = stored.len();
        self.records = reconcile(stored);
        self.address = Some(address.clone());
        if self.records.len() < total {
            debug!(%address, dropped = total - self.records.len(), "collapsed duplicate records");
            self.schedule_persist(Instant::now());
        }
        info!(%address, records = self.records.len(), "loaded claim bucket");
    }

    /// Clears the visible set after writing out anything pending.
    pub fn disconnect(&mut self) {
        self.flush_logged();
        if let Some(address) = self.address.take() {
            info!(%address, "wallet disconnected");
        }
        self.records.clear();
    }

    /// Follows the session's active address, reloading only when it changed.
    pub fn sync_session(&mut self, session: &dyn WalletSession) {
        match session.active_address() {
            Some(address) if self.address.as_ref() != Some(&address) => self.load(address),
            Some(_) => {}
            None if self.address.is_some() => self.disconnect(),
            None => {}
        }
    }

    fn read_bucket(&self, address: &Address) -> Vec<ClaimRecord> {
        let key = storage_key(&self.namespace, address);
        match self.store.get(&key) {
            Ok(Some(raw)) => decode_bucket(&raw).unwrap_or_else(|err| {
                warn!(%key, error = %err, "discarding malformed claim bucket");
                Vec::new()
            }),
            Ok(None) => Vec::new(),
            Err(err) => {
                warn!(%key, error = %err, "claim bucket unreadable");
                Vec::new()
            }
        }
    }

    /// Applies `update` to the stored bucket of an address that is not the
    /// active one and writes it back at once when anything changed.
    fn update_stored_bucket(
        &mut self,
        address: &Address,
        update: impl FnOnce(&mut Vec<ClaimRecord>) -> bool,
    ) -> Result<(), StoreError> {
        let mut records = reconcile(self.read_bucket(address));
        if update(&mut records) {
            let key = storage_key(&self.namespace, address);
            self.store.set(&key, &serde_json::to_string(&records)?)?;
            debug!(%key, "updated inactive claim bucket");
        }
        Ok(())
    }

    //==================== local claims ====================//

    /// Records a free local claim. Returns false when no wallet is connected
    /// or the landmark already has a record.
    pub fn claim_locally(&mut self, landmark_id: &str) -> bool {
        let Some(address) = self.address.clone() else {
            debug!(landmark_id, "claim ignored: no active address");
            return false;
        };
        if self.is_claimed(landmark_id) {
            return false;
        }
        let now = Utc::now();
        self.records.push(ClaimRecord {
            landmark_id: landmark_id.to_string(),
            claimed_at: now,
            token_id: local_token_id(now),
            tx_hash: None,
            on_chain: false,
        });
        info!(%address, landmark_id, "landmark claimed locally");
        self.schedule_persist(Instant::now());
        true
    }

    //==================== minting ====================//

    /// Checks a mint request and reserves the landmark until
    /// [`ClaimLedger::complete_mint`] is called with the submission outcome.
    pub fn prepare_mint<C: ContractClient + ?Sized>(
        &mut self,
        client: &C,
        landmark_id: &str,
        metadata: &LandmarkMetadata,
    ) -> Result<MintTicket, LedgerError> {
        let result = self.check_mint(client, landmark_id);
        let address = match result {
            Ok(address) => address,
            Err(err) => {
                if !err.is_benign() {
                    self.last_mint_error = Some(err.to_string());
                }
                return Err(err);
            }
        };
        self.in_flight.insert((address.clone(), landmark_id.to_string()));
        self.last_mint_error = None;
        let token_uri = TokenMetadata::for_landmark(metadata, Utc::now()).to_token_uri();
        Ok(MintTicket {
            address,
            landmark_id: landmark_id.to_string(),
            token_uri,
        })
    }

    fn check_mint<C: ContractClient + ?Sized>(
        &self,
        client: &C,
        landmark_id: &str,
    ) -> Result<Address, LedgerError> {
        let address = self.address.clone().ok_or(LedgerError::NotConnected)?;
        if self.is_minted(landmark_id) {
            return Err(LedgerError::AlreadyMinted {
                landmark_id: landmark_id.to_string(),
                in_progress: false,
            });
        }
        if self
            .in_flight
            .contains(&(address.clone(), landmark_id.to_string()))
        {
            return Err(LedgerError::AlreadyMinted {
                landmark_id: landmark_id.to_string(),
                in_progress: true,
            });
        }
        if !client.current_chain_supported() {
            return Err(LedgerError::UnsupportedChain {
                chain_id: client.chain_id(),
            });
        }
        Ok(address)
    }

    /// Releases the reservation taken by `prepare_mint` and records the
    /// submitted transaction, subscribing to its confirmation.
    pub fn complete_mint<C: ContractClient + ?Sized>(
        &mut self,
        client: &C,
        ticket: MintTicket,
        outcome: Result<TxHash, ContractError>,
    ) -> Result<TxHash, LedgerError> {
        self.in_flight
            .remove(&(ticket.address.clone(), ticket.landmark_id.clone()));
        let tx_hash = match outcome {
            Ok(tx_hash) => tx_hash,
            Err(err) => {
                let message = err.to_string();
                warn!(landmark_id = %ticket.landmark_id, error = %message, "mint submission failed");
                self.last_mint_error = Some(message.clone());
                return Err(LedgerError::MintSubmissionFailed { message });
            }
        };

        let now = Utc::now();
        let landmark_id = ticket.landmark_id.clone();
        let hash = tx_hash.clone();
        let apply = move |records: &mut Vec<ClaimRecord>| {
            let token_id = format!("blockchain-{}", now.timestamp_millis());
            match records.iter().position(|r| r.landmark_id == landmark_id) {
                Some(slot) => {
                    let record = &mut records[slot];
                    record.tx_hash = Some(hash);
                    record.on_chain = false;
                    record.token_id = token_id;
                }
                None => records.push(ClaimRecord {
                    landmark_id,
                    claimed_at: now,
                    token_id,
                    tx_hash: Some(hash),
                    on_chain: false,
                }),
            }
            true
        };

        if self.address.as_ref() == Some(&ticket.address) {
            apply(&mut self.records);
            self.schedule_persist(Instant::now());
        } else if let Err(err) = self.update_stored_bucket(&ticket.address, apply) {
            warn!(address = %ticket.address, error = %err, "could not record mint for inactive address");
        }

        info!(
            address = %ticket.address,
            landmark_id = %ticket.landmark_id,
            %tx_hash,
            "mint submitted"
        );
        self.confirmations.push(PendingConfirmation {
            address: ticket.address,
            tx_hash: tx_hash.clone(),
            watch: client.watch_confirmation(&tx_hash),
        });
        Ok(tx_hash)
    }

    /// Validates, submits through `client` and records a mint. The landmark
    /// stays reserved while the submission is outstanding.
    pub async fn start_mint<C: ContractClient + ?Sized>(
        &mut self,
        client: &C,
        landmark_id: &str,
        metadata: &LandmarkMetadata,
    ) -> Result<TxHash, LedgerError> {
        let ticket = self.prepare_mint(client, landmark_id, metadata)?;
        let mut reservation = MintReservation {
            key: (ticket.address.clone(), ticket.landmark_id.clone()),
            ledger: self,
            settled: false,
        };
        let outcome = client
            .submit_mint(&ticket.landmark_id, &ticket.token_uri)
            .await;
        reservation.settled = true;
        reservation.ledger.complete_mint(client, ticket, outcome)
    }

    //==================== confirmations ====================//

    /// Marks the active record carrying `tx_hash` as on chain. Unknown or
    /// already confirmed hashes leave the ledger untouched.
    pub fn on_transaction_confirmed(&mut self, tx_hash: &str) -> bool {
        let Some(record) = self
            .records
            .iter_mut()
            .find(|r| r.tx_hash.as_deref() == Some(tx_hash))
        else {
            debug!(tx_hash, "confirmation for unknown transaction");
            return false;
        };
        if record.on_chain {
            self.confirmations.retain(|c| c.tx_hash != tx_hash);
            return false;
        }
        record.on_chain = true;
        info!(tx_hash, landmark_id = %record.landmark_id, "mint confirmed");
        self.confirmations.retain(|c| c.tx_hash != tx_hash);
        self.schedule_persist(Instant::now());
        true
    }

    /// Drains confirmations that have arrived without waiting for the rest.
    /// Returns how many records changed.
    pub fn poll_confirmations(&mut self) -> usize {
        let mut applied = 0;
        for pending in std::mem::take(&mut self.confirmations) {
            let PendingConfirmation {
                address,
                tx_hash,
                mut watch,
            } = pending;
            match watch.try_recv() {
                Ok(Confirmation::Confirmed { tx_hash: confirmed }) => {
                    if self.address.as_ref() == Some(&address) {
                        if self.on_transaction_confirmed(&confirmed) {
                            applied += 1;
                        }
                    } else {
                        let mut changed = false;
                        let result = self.update_stored_bucket(&address, |records| {
                            for record in records.iter_mut() {
                                if record.tx_hash.as_deref() == Some(confirmed.as_str())
                                    && !record.on_chain
                                {
                                    record.on_chain = true;
                                    changed = true;
                                }
                            }
                            changed
                        });
                        match result {
                            Ok(()) if changed => applied += 1,
                            Ok(()) => {}
                            Err(err) => {
                                warn!(%address, tx_hash = %confirmed, error = %err, "could not record confirmation");
                            }
                        }
                    }
                }
                Err(TryRecvError::Empty) => self.confirmations.push(PendingConfirmation {
                    address,
                    tx_hash,
                    watch,
                }),
                Err(TryRecvError::Closed) => {
                    debug!(%tx_hash, "confirmation watch closed");
                }
            }
        }
        applied
    }

    pub fn pending_confirmations(&self) -> usize {
        self.confirmations.len()
    }

    //==================== queries ====================//

    pub fn is_claimed(&self, landmark_id: &str) -> bool {
        self.record(landmark_id).is_some()
    }

    pub fn is_minted(&self, landmark_id: &str) -> bool {
        self.record(landmark_id).map_or(false, |r| r.on_chain)
    }

    /// True while a mint for the active address awaits submission or
    /// confirmation.
    pub fn is_minting(&self) -> bool {
        let Some(address) = &self.address else {
            return false;
        };
        self.in_flight.iter().any(|(a, _)| a == address)
            || self.confirmations.iter().any(|c| &c.address == address)
    }

    pub fn last_mint_error(&self) -> Option<&str> {
        self.last_mint_error.as_deref()
    }

    pub fn totals(&self) -> Totals {
        Totals {
            claimed: self.records.len(),
            on_chain: self.records.iter().filter(|r| r.on_chain).count(),
        }
    }

    //==================== persistence ====================//

    /// Pushes the pending write back to `debounce` after `now`.
    fn schedule_persist(&mut self, now: Instant) {
        if let Some(address) = self.address.clone() {
            self.pending_write = Some(PendingWrite {
                address,
                due: now + self.debounce,
            });
        }
    }

    pub fn next_persist_due(&self) -> Option<Instant> {
        self.pending_write.as_ref().map(|p| p.due)
    }

    pub fn poll_persist(&mut self) -> Result<bool, StoreError> {
        self.poll_persist_at(Instant::now())
    }

    /// Writes the pending bucket if its debounce window has closed by `now`.
    pub fn poll_persist_at(&mut self, now: Instant) -> Result<bool, StoreError> {
        match &self.pending_write {
            Some(pending) if pending.due <= now => self.flush(),
            _ => Ok(false),
        }
    }

    /// Writes the pending bucket immediately. Returns whether a write happened.
    pub fn flush(&mut self) -> Result<bool, StoreError> {
        let Some(pending) = self.pending_write.take() else {
            return Ok(false);
        };
        let key = storage_key(&self.namespace, &pending.address);
        let encoded = serde_json::to_string(&self.records)?;
        if let Err(err) = self.store.set(&key, &encoded) {
            self.pending_write = Some(pending);
            return Err(err);
        }
        debug!(%key, records = self.records.len(), "claim bucket persisted");
        Ok(true)
    }

    fn flush_logged(&mut self) {
        if let Err(err) = self.flush() {
            warn!(error = %err, "dropping unpersisted claim changes");
            self.pending_write = None;
        }
    }
}

/// Frees the landmark taken by `start_mint` when its future is dropped
/// before the submission resolves. The transaction itself may still land.
struct MintReservation<'a, S: PersistenceStore> {
    ledger: &'a mut ClaimLedger<S>,
    key: (Address, LandmarkId),
    settled: bool,
}

impl<S: PersistenceStore> Drop for MintReservation<'_, S> {
    fn drop(&mut self) {
        if !self.settled && self.ledger.in_flight.remove(&self.key) {
            debug!(
                address = %self.key.0,
                landmark_id = %self.key.1,
                "mint abandoned before submission resolved"
            );
        }
    }
}

impl<S: PersistenceStore> Drop for ClaimLedger<S> {
    fn drop(&mut self) {
        self.flush_logged();
    }
}

const TOKEN_ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

fn local_token_id(now: DateTime<Utc>) -> String {
    let mut rng = rand::thread_rng();
    let suffix: String = (0..9)
        .map(|_| TOKEN_ALPHABET[rng.gen_range(0..TOKEN_ALPHABET.len())] as char)
        .collect();
    format!("{}-{}", now.timestamp_millis(), suffix)
}
