//! Wallet synchronization engine for a simple account ledger service.
//!
//! A [`SyncEngine`] discovers a wallet's addresses, reconciles their transactions into
//! per-currency ledgers, keeps balances, persists its state and builds outgoing spends.

pub mod config;
pub mod ledger;
pub mod transaction;
pub mod utils;
pub mod wallet;

pub use config::{ConfigError, CurrencyInfo, EngineConfig, FeeSchedule, TokenInfo};
pub use ledger::{HttpLedgerClient, LedgerClient, LedgerError};
pub use transaction::{FeeOption, SpendError, SpendRequest, SpendTarget};
pub use utils::NativeAmount;
pub use wallet::sync::{FileLocalStore, LocalStore, MemoryLocalStore, WalletCallbacks};
pub use wallet::{
	StartOptions, SyncEngine, SyncEngineBuilder, Transaction, TransactionQuery, WalletSyncError,
	create_master_keys,
};
