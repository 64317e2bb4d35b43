//! Wallet Synchronization Module
//!
//! This module provides the core logic and services for keeping a wallet in sync with the ledger
//! service. It is composed of several submodules, each responsible for one aspect of the process:
//!
//! - `orchestrator`: The `SyncEngine`. It owns the wallet state, runs the polling loops and
//!   exposes the host-facing operations.
//! - `address_discovery`: Deterministic address derivation and the gap-limit frontier.
//! - `transaction_processor`: Merges address and transaction responses into the wallet state and
//!   recomputes balances.
//! - `events`: Event types and the callback interface for the host application.
//! - `progress_tracker`: Tracks address scan progress for the host.
//! - `repositories`: The `LocalStore` abstraction with file and in-memory implementations.
//! - `state_persistence`: Loads and saves wallet snapshots through a `LocalStore`.

/// Address derivation and frontier tracking
pub mod address_discovery;
/// Event system and host callbacks
pub mod events;
/// Main coordinator for the wallet sync process
pub mod orchestrator;
/// Tracks address scan progress
pub mod progress_tracker;
/// Durable text storage
pub mod repositories;
/// Snapshot loading and saving
pub mod state_persistence;
/// Reconciliation of ledger responses
pub mod transaction_processor;

pub use address_discovery::AddressDiscovery;
pub use events::{EventDispatcher, SyncEvent, WalletCallbacks};
pub use orchestrator::*;
pub use repositories::{FileLocalStore, LocalStore, MemoryLocalStore, StoreError};
pub use state_persistence::StatePersistenceService;
pub use transaction_processor::{AddressReconciliation, TransactionReconciler};
