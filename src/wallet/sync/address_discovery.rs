//! Deterministic address derivation and gap-limit frontier tracking.
//!
//! Addresses are derived as `"{index}_{masterPublicKey}"`. The address table in
//! [`WalletState`] is kept dense from index 0 up to `unused_address_index + gap_limit`, so
//! every scan probes `gap_limit` consecutive unused addresses past the last used one.

use crate::wallet::WalletSyncError;
use crate::wallet::state::WalletState;
use crate::wallet::types::AddressRecord;

use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct AddressDiscovery {
    master_public_key: String,
    gap_limit: usize,
    /// Suffix carried by the index 0 address, only used against the mock ledger
    zero_marker: Option<String>,
}

impl AddressDiscovery {
    pub fn new(master_public_key: String, gap_limit: usize, zero_marker: Option<String>) -> Self {
        Self {
            master_public_key,
            gap_limit,
            zero_marker,
        }
    }

    pub fn address_from_index(&self, index: usize) -> String {
        let mut address = format!("{}_{}", index, self.master_public_key);
        if index == 0 {
            if let Some(marker) = &self.zero_marker {
                address.push_str(marker);
            }
        }
        address
    }

    /// Number of address slots that must exist for the current frontier.
    pub fn scan_len(&self, state: &WalletState) -> usize {
        state.unused_address_index.saturating_add(self.gap_limit)
    }

    /// Make sure a derivation-consistent record exists for every index below the scan length.
    ///
    /// Returns `true` when records were added. A stored record whose address differs from the
    /// derivation of its index means the table was corrupted or the key changed; that is
    /// reported as an [`WalletSyncError::IntegrityError`] and nothing is repaired.
    pub fn ensure_frontier(&self, state: &mut WalletState) -> Result<bool, WalletSyncError> {
        let scan_len = self.scan_len(state);

        for (index, record) in state.addresses.iter().enumerate().take(scan_len) {
            let expected = self.address_from_index(index);
            if record.address != expected {
                return Err(WalletSyncError::IntegrityError(format!(
                    "Derived address mismatch on index {}: stored {}, derived {}",
                    index, record.address, expected
                )));
            }
        }

        let existing = state.addresses.len();
        for index in existing..scan_len {
            state
                .addresses
                .push(AddressRecord::new(self.address_from_index(index)));
        }

        let added = scan_len.saturating_sub(existing);
        if added > 0 {
            debug!("Added {} address records, table now {}", added, scan_len);
        }
        Ok(added > 0)
    }

    /// Advance the frontier past `index` if the address there is used.
    ///
    /// An address counts as used when it has on-chain activity or the host marked it through
    /// the gap-limit list. Returns `true` when the frontier moved.
    pub fn mark_used_if_needed(
        &self,
        state: &mut WalletState,
        index: usize,
        has_activity: bool,
    ) -> bool {
        let Some(record) = state.addresses.get(index) else {
            return false;
        };
        let used = has_activity || state.is_gap_limit_address(&record.address);
        if used && index >= state.unused_address_index {
            state.unused_address_index = index + 1;
            info!("Address frontier advanced to {}", state.unused_address_index);
            return true;
        }
        false
    }

    /// The first address not known to be used.
    pub fn fresh_address(&self, state: &WalletState) -> String {
        self.address_from_index(state.unused_address_index)
    }
}
