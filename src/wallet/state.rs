//! Persisted wallet data model.
//!
//! [`WalletState`] is the single document an engine owns and snapshots to the local store.
//! Loading is lenient: any missing field falls back to its default and the field names of
//! older snapshots are still understood. The invariants that matter to callers are kept
//! by the mutating methods here:
//!
//! - each currency ledger holds a txid at most once and is sorted newest first
//! - the primary currency is always enabled
//! - the fetch queue and the gap-limit list never hold duplicates

use crate::ledger::height_from_str_or_number;
use crate::utils::NativeAmount;
use crate::wallet::types::{AddressRecord, Transaction, TransactionQuery, TxId};

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletState {
	/// Last chain height reported by the ledger
	#[serde(default, deserialize_with = "height_from_str_or_number")]
	pub block_height: u64,
	#[serde(default)]
	pub master_public_key: String,
	/// Derived from `addresses`, recomputed after every address scan
	#[serde(default)]
	pub total_balances: BTreeMap<String, NativeAmount>,
	/// Enabled currency codes in the order they were enabled, primary first
	#[serde(default)]
	pub enabled_tokens: Vec<String>,
	/// Addresses the host marked as used without on-chain activity
	#[serde(default)]
	pub gap_limit_addresses: Vec<String>,
	/// One ledger per currency code, newest first
	#[serde(default, alias = "transactionsObj")]
	pub transactions: BTreeMap<String, Vec<Transaction>>,
	/// Known txids whose details have not been fetched yet
	#[serde(default)]
	pub transactions_to_fetch: Vec<TxId>,
	/// Fetched txids that moved no value for any enabled currency
	#[serde(default)]
	pub zero_net_txids: BTreeSet<TxId>,
	/// Dense table indexed by derivation index
	#[serde(default, alias = "addressArray")]
	pub addresses: Vec<AddressRecord>,
	/// Smallest index not known to be used
	#[serde(default)]
	pub unused_address_index: usize,
}

impl WalletState {
	/// Fresh state for a wallet whose primary currency is `primary_currency`.
	pub fn new(master_public_key: &str, primary_currency: &str) -> Self {
		let mut state = Self {
			block_height: 0,
			master_public_key: master_public_key.to_string(),
			total_balances: BTreeMap::new(),
			enabled_tokens: Vec::new(),
			gap_limit_addresses: Vec::new(),
			transactions: BTreeMap::new(),
			transactions_to_fetch: Vec::new(),
			zero_net_txids: BTreeSet::new(),
			addresses: Vec::new(),
			unused_address_index: 0,
		};
		state.fill_defaults(primary_currency);
		state
	}

	/// Parse a persisted snapshot, filling in defaults for anything missing.
	pub fn from_json(text: &str, primary_currency: &str) -> Result<Self, serde_json::Error> {
		let mut state: WalletState = serde_json::from_str(text)?;
		state.fill_defaults(primary_currency);
		Ok(state)
	}

	pub fn to_json(&self) -> Result<String, serde_json::Error> {
		serde_json::to_string(self)
	}

	fn fill_defaults(&mut self, primary_currency: &str) {
		let mut seen = HashSet::new();
		self.enabled_tokens.retain(|code| seen.insert(code.clone()));
		if !self.is_token_enabled(primary_currency) {
			self.enabled_tokens.insert(0, primary_currency.to_string());
		}

		for code in &self.enabled_tokens {
			self.transactions.entry(code.clone()).or_default();
			self.total_balances
				.entry(code.clone())
				.or_insert_with(NativeAmount::zero);
		}

		let mut seen = HashSet::new();
		self.transactions_to_fetch
			.retain(|txid| seen.insert(txid.clone()));
		let mut seen = HashSet::new();
		self.gap_limit_addresses
			.retain(|address| seen.insert(address.clone()));
	}

	pub fn is_token_enabled(&self, currency_code: &str) -> bool {
		self.enabled_tokens.iter().any(|code| code == currency_code)
	}

	/// Enable every token not already enabled. Returns the newly enabled codes.
	///
	/// Transactions fetched earlier were only filed under the currencies enabled at the time,
	/// so enabling anything re-queues every txid the address table knows about.
	pub fn enable_tokens(&mut self, tokens: &[String]) -> Vec<String> {
		let mut added = Vec::new();
		for token in tokens {
			if token.is_empty() || self.is_token_enabled(token) {
				continue;
			}
			self.enabled_tokens.push(token.clone());
			self.transactions.entry(token.clone()).or_default();
			self.total_balances
				.entry(token.clone())
				.or_insert_with(NativeAmount::zero);
			added.push(token.clone());
		}

		if !added.is_empty() {
			self.zero_net_txids.clear();
			let known = self
				.addresses
				.iter()
				.filter_map(|r| r.txids.as_ref())
				.flatten()
				.cloned()
				.collect::<Vec<_>>();
			for txid in known {
				self.enqueue_fetch(&txid);
			}
		}
		added
	}

	pub fn find_address(&self, address: &str) -> Option<usize> {
		self.addresses.iter().position(|r| r.address == address)
	}

	pub fn owned_addresses(&self) -> HashSet<&str> {
		self.addresses.iter().map(|r| r.address.as_str()).collect()
	}

	pub fn find_transaction(&self, currency_code: &str, txid: &str) -> Option<usize> {
		self.transactions
			.get(currency_code)?
			.iter()
			.position(|tx| tx.txid == txid)
	}

	/// Whether a txid has already been fetched, under any currency.
	pub fn knows_transaction(&self, txid: &str) -> bool {
		self.zero_net_txids.contains(txid)
			|| self
				.transactions
				.values()
				.any(|ledger| ledger.iter().any(|tx| tx.txid == txid))
	}

	/// Insert or replace a ledger entry, keeping the ledger sorted newest first.
	///
	/// Returns `true` when the txid was new to that currency's ledger. Entries with the same
	/// date keep their relative insertion order.
	pub fn upsert_transaction(&mut self, tx: Transaction) -> bool {
		let ledger = self.transactions.entry(tx.currency_code.clone()).or_default();
		let inserted = match ledger.iter().position(|t| t.txid == tx.txid) {
			Some(idx) => {
				ledger[idx] = tx;
				false
			}
			None => {
				ledger.push(tx);
				true
			}
		};
		ledger.sort_by(|a, b| b.date.cmp(&a.date));
		inserted
	}

	pub fn is_queued(&self, txid: &str) -> bool {
		self.transactions_to_fetch.iter().any(|t| t == txid)
	}

	pub fn enqueue_fetch(&mut self, txid: &str) -> bool {
		if self.is_queued(txid) {
			return false;
		}
		self.transactions_to_fetch.push(txid.to_string());
		true
	}

	pub fn dequeue_fetch(&mut self, txid: &str) -> bool {
		let before = self.transactions_to_fetch.len();
		self.transactions_to_fetch.retain(|t| t != txid);
		before != self.transactions_to_fetch.len()
	}

	/// Returns how many addresses were not already marked.
	pub fn add_gap_limit_addresses(&mut self, addresses: &[String]) -> usize {
		let mut added = 0;
		for address in addresses {
			if !self.gap_limit_addresses.contains(address) {
				self.gap_limit_addresses.push(address.clone());
				added += 1;
			}
		}
		added
	}

	pub fn is_gap_limit_address(&self, address: &str) -> bool {
		self.gap_limit_addresses.iter().any(|a| a == address)
	}

	/// An address is used if it has on-chain activity or was marked by the host.
	pub fn is_address_used(&self, address: &str) -> bool {
		let has_activity = self
			.find_address(address)
			.is_some_and(|idx| self.addresses[idx].has_activity());
		has_activity || self.is_gap_limit_address(address)
	}

	pub fn balance(&self, currency_code: &str) -> NativeAmount {
		self.total_balances
			.get(currency_code)
			.cloned()
			.unwrap_or_default()
	}

	pub fn num_transactions(&self, currency_code: &str) -> usize {
		self.transactions.get(currency_code).map_or(0, Vec::len)
	}

	/// A page of one currency's ledger.
	///
	/// A `start_index` past the end is clamped to the last entry and `num_entries` to the
	/// entries remaining.
	pub fn transactions_page(&self, primary_currency: &str, query: &TransactionQuery) -> Vec<Transaction> {
		let currency_code = query.currency_code.as_deref().unwrap_or(primary_currency);
		let Some(ledger) = self.transactions.get(currency_code) else {
			return Vec::new();
		};
		if ledger.is_empty() {
			return Vec::new();
		}

		let start = query.start_index.min(ledger.len() - 1);
		let end = if query.num_entries == 0 {
			ledger.len()
		} else {
			start.saturating_add(query.num_entries).min(ledger.len())
		};
		ledger[start..end].to_vec()
	}
}
