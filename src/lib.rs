//! Per-wallet ledger of landmark NFT claims and mints.
//!
//! * [`ledger`]: the [`ClaimLedger`] with local claims, mint submission,
//!   confirmation tracking, reconciliation of stored buckets and debounced
//!   persistence.
//! * [`contracts`]: the contract client seam, chain registry, token
//!   metadata encoding and an in-process simulated contract.
//! * [`store`]: key-value persistence backends.
//! * [`session`]: wallet addresses and the active-session seam.
//! * [`config`]: TOML configuration.

pub mod config;
pub mod contracts;
pub mod ledger;
pub mod session;
pub mod store;

pub use config::LedgerConfig;
pub use ledger::{ClaimLedger, ClaimRecord, LedgerError, Totals};
pub use session::{Address, WalletSession};
