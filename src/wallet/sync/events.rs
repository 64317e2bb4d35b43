//! Event system for wallet synchronization.
//!
//! Sync cycles report state transitions as [`SyncEvent`]s. The [`EventDispatcher`] fans each
//! event out to the host's registered [`WalletCallbacks`]. Delivery is synchronous and
//! best-effort: callbacks get no way to push back on the engine, and a cycle never waits for
//! anything but the callback call itself. Events are always dispatched after the state lock has
//! been released, so a callback may safely query the engine.

use crate::utils::NativeAmount;
use crate::wallet::types::Transaction;

use std::sync::Arc;
use tracing::debug;

/// Events that occur during wallet synchronization
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    /// The ledger reported a different chain height
    BlockHeightChanged { height: u64 },
    /// Ledger entries were added or replaced
    TransactionsChanged { transactions: Vec<Transaction> },
    /// The aggregate balance of one currency changed
    BalanceChanged {
        currency_code: String,
        balance: NativeAmount,
    },
    /// Address scan progress, a fraction in `0.0..=1.0`
    AddressesChecked { progress: f64 },
}

/// Notifications delivered to the host application.
///
/// Every method defaults to doing nothing, so a host only implements what it cares about.
/// Implementations must return quickly; they run on the engine's sync tasks.
pub trait WalletCallbacks: Send + Sync {
    fn on_block_height_changed(&self, _height: u64) {}

    fn on_transactions_changed(&self, _transactions: &[Transaction]) {}

    fn on_balance_changed(&self, _currency_code: &str, _balance: &NativeAmount) {}

    fn on_addresses_checked(&self, _progress: f64) {}

    /// Get the name of this handler for logging and diagnostics.
    fn name(&self) -> &'static str {
        "callbacks"
    }
}

/// Event dispatcher that manages multiple callback handlers.
///
/// Handlers are called in the order they are registered.
#[derive(Clone, Default)]
pub struct EventDispatcher {
    handlers: Vec<Arc<dyn WalletCallbacks>>,
}

impl EventDispatcher {
    /// Create a new, empty event dispatcher.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new callback handler.
    pub fn register_handler(&mut self, handler: Arc<dyn WalletCallbacks>) {
        self.handlers.push(handler);
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Dispatch an event to all registered handlers.
    pub fn dispatch(&self, event: &SyncEvent) {
        for handler in &self.handlers {
            debug!("Dispatching {} to {}", event_name(event), handler.name());
            match event {
                SyncEvent::BlockHeightChanged { height } => handler.on_block_height_changed(*height),
                SyncEvent::TransactionsChanged { transactions } => {
                    handler.on_transactions_changed(transactions)
                }
                SyncEvent::BalanceChanged {
                    currency_code,
                    balance,
                } => handler.on_balance_changed(currency_code, balance),
                SyncEvent::AddressesChecked { progress } => handler.on_addresses_checked(*progress),
            }
        }
    }

    /// Dispatch a batch of events in order.
    pub fn dispatch_all(&self, events: impl IntoIterator<Item = SyncEvent>) {
        for event in events {
            self.dispatch(&event);
        }
    }
}

fn event_name(event: &SyncEvent) -> &'static str {
    match event {
        SyncEvent::BlockHeightChanged { .. } => "BlockHeightChanged",
        SyncEvent::TransactionsChanged { .. } => "TransactionsChanged",
        SyncEvent::BalanceChanged { .. } => "BalanceChanged",
        SyncEvent::AddressesChecked { .. } => "AddressesChecked",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<String>>,
    }

    impl WalletCallbacks for Recorder {
        fn on_block_height_changed(&self, height: u64) {
            self.seen.lock().unwrap().push(format!("height {}", height));
        }

        fn on_balance_changed(&self, currency_code: &str, balance: &NativeAmount) {
            self.seen
                .lock()
                .unwrap()
                .push(format!("balance {} {}", currency_code, balance));
        }
    }

    #[test]
    fn dispatches_to_every_handler_in_order() {
        let first = Arc::new(Recorder::default());
        let second = Arc::new(Recorder::default());
        let mut dispatcher = EventDispatcher::new();
        dispatcher.register_handler(first.clone());
        dispatcher.register_handler(second.clone());

        dispatcher.dispatch_all(vec![
            SyncEvent::BlockHeightChanged { height: 5 },
            SyncEvent::AddressesChecked { progress: 0.5 },
            SyncEvent::BalanceChanged {
                currency_code: "TRD".to_string(),
                balance: NativeAmount::from(12u64),
            },
        ]);

        let expected = vec!["height 5".to_string(), "balance TRD 12".to_string()];
        assert_eq!(*first.seen.lock().unwrap(), expected);
        assert_eq!(*second.seen.lock().unwrap(), expected);
    }
}
