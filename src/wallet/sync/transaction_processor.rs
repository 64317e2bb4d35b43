use crate::ledger::{AddressResponse, ProtocolParams, TransactionResponse, TxIo};
use crate::utils::NativeAmount;
use crate::wallet::WalletSyncError;
use crate::wallet::state::WalletState;
use crate::wallet::sync::address_discovery::AddressDiscovery;
use crate::wallet::types::Transaction;

use std::collections::{BTreeMap, HashSet};
use tracing::{debug, info, warn};

/// What reconciling one address response changed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddressReconciliation {
	pub index: usize,
	/// Txids newly added to the fetch queue
	pub queued: Vec<String>,
	pub frontier_advanced: bool,
}

/// Merges ledger responses into [`WalletState`].
///
/// All methods are synchronous and operate on a state the caller has exclusive access to;
/// network access happens outside, in the engine's fetch cycles.
#[derive(Debug, Clone, Default)]
pub struct TransactionReconciler;

impl TransactionReconciler {
	pub fn new() -> Self {
		Self
	}

	/// Store an address response and queue the transactions it references.
	///
	/// The response address must already have a slot in the address table, anything else is
	/// an integrity error.
	pub fn reconcile_address(
		&self,
		discovery: &AddressDiscovery,
		state: &mut WalletState,
		response: AddressResponse,
	) -> Result<AddressReconciliation, WalletSyncError> {
		let index = state.find_address(&response.address).ok_or_else(|| {
			WalletSyncError::IntegrityError(format!(
				"Queried address not found in address table: {}",
				response.address
			))
		})?;

		let mut queued = Vec::new();
		for txid in &response.txids {
			if state.knows_transaction(txid) {
				continue;
			}
			if state.enqueue_fetch(txid) {
				debug!("Queued {} from {}", txid, response.address);
				queued.push(txid.clone());
			}
		}

		let has_activity = !response.txids.is_empty();
		let record = &mut state.addresses[index];
		record.txids = Some(response.txids);
		record.amounts = Some(response.amounts);

		let frontier_advanced = discovery.mark_used_if_needed(state, index, has_activity);

		Ok(AddressReconciliation {
			index,
			queued,
			frontier_advanced,
		})
	}

	/// Apply a fetched transaction to every enabled currency's ledger.
	///
	/// Returns the ledger entries that were inserted or replaced. The txid leaves the fetch
	/// queue only when the response is for the txid that was queried.
	pub fn process_transaction(
		&self,
		state: &mut WalletState,
		queried_txid: &str,
		response: &TransactionResponse,
	) -> Vec<Transaction> {
		if response.txid != queried_txid {
			warn!(
				"Ledger answered {} for transaction {}, keeping it queued",
				response.txid, queried_txid
			);
			return Vec::new();
		}

		let nets = {
			let owned = state.owned_addresses();
			state
				.enabled_tokens
				.iter()
				.map(|code| (code.clone(), net_amount(code, &owned, response)))
				.collect::<Vec<_>>()
		};

		let mut changed = Vec::new();
		let mut filed = false;
		for (currency_code, net) in nets {
			if net.is_zero() {
				continue;
			}
			filed = true;
			let tx = Transaction {
				txid: response.txid.clone(),
				date: response.tx_date,
				currency_code,
				block_height: response.block_height,
				native_amount: net,
				network_fee: response.network_fee.clone(),
				signed_payload: String::new(),
				protocol_params: ProtocolParams {
					inputs: response.inputs.clone(),
					outputs: response.outputs.clone(),
				},
			};
			let unchanged = state
				.find_transaction(&tx.currency_code, &tx.txid)
				.is_some_and(|idx| state.transactions[&tx.currency_code][idx] == tx);
			if unchanged {
				continue;
			}
			if state.upsert_transaction(tx.clone()) {
				info!("Added transaction {} ({} {})", tx.txid, tx.native_amount, tx.currency_code);
			} else {
				debug!("Updated transaction {} ({})", tx.txid, tx.currency_code);
			}
			changed.push(tx);
		}

		if !filed {
			debug!("Transaction {} moves no value for this wallet", response.txid);
			state.zero_net_txids.insert(response.txid.clone());
		}
		state.dequeue_fetch(queried_txid);

		changed
	}

	/// Replace the aggregate balances with the sum over all address records.
	///
	/// Returns the currencies whose balance differs from before, with the new value.
	pub fn recompute_balances(&self, state: &mut WalletState) -> Vec<(String, NativeAmount)> {
		let mut totals: BTreeMap<String, NativeAmount> = state
			.enabled_tokens
			.iter()
			.map(|code| (code.clone(), NativeAmount::zero()))
			.collect();

		for record in &state.addresses {
			let Some(amounts) = &record.amounts else {
				continue;
			};
			for (code, amount) in amounts {
				if let Some(total) = totals.get_mut(code) {
					*total += amount;
				}
			}
		}

		let changed = totals
			.iter()
			.filter(|(code, total)| state.total_balances.get(*code) != Some(*total))
			.map(|(code, total)| (code.clone(), total.clone()))
			.collect::<Vec<_>>();

		state.total_balances = totals;
		changed
	}
}

fn sum_owned(items: &[TxIo], currency_code: &str, owned: &HashSet<&str>) -> NativeAmount {
	items
		.iter()
		.filter(|io| io.currency_code == currency_code && owned.contains(io.address.as_str()))
		.map(|io| &io.amount)
		.sum()
}

/// receive - spend, restricted to addresses this wallet owns
fn net_amount(
	currency_code: &str,
	owned: &HashSet<&str>,
	response: &TransactionResponse,
) -> NativeAmount {
	let spend = sum_owned(&response.inputs, currency_code, owned);
	let receive = sum_owned(&response.outputs, currency_code, owned);
	receive - spend
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::collections::BTreeMap;

	fn setup() -> (AddressDiscovery, TransactionReconciler, WalletState) {
		let discovery = AddressDiscovery::new("pubabc".to_string(), 10, None);
		let reconciler = TransactionReconciler::new();
		let mut state = WalletState::new("pubabc", "TRD");
		discovery.ensure_frontier(&mut state).unwrap();
		(discovery, reconciler, state)
	}

	fn io(address: &str, currency_code: &str, amount: u64) -> TxIo {
		TxIo {
			address: address.to_string(),
			currency_code: currency_code.to_string(),
			amount: NativeAmount::from(amount),
		}
	}

	fn address_response(address: &str, txids: &[&str], trd: u64) -> AddressResponse {
		AddressResponse {
			address: address.to_string(),
			txids: txids.iter().map(|t| t.to_string()).collect(),
			amounts: BTreeMap::from([("TRD".to_string(), NativeAmount::from(trd))]),
		}
	}

	fn tx_response(txid: &str, date: i64, inputs: Vec<TxIo>, outputs: Vec<TxIo>) -> TransactionResponse {
		TransactionResponse {
			txid: txid.to_string(),
			tx_date: date,
			block_height: 10,
			network_fee: NativeAmount::from(50_000u64),
			inputs,
			outputs,
		}
	}

	#[test]
	fn activity_at_index_three_queues_and_advances() {
		let (discovery, reconciler, mut state) = setup();

		let outcome = reconciler
			.reconcile_address(&discovery, &mut state, address_response("3_pubabc", &["tx1"], 0))
			.unwrap();

		assert_eq!(outcome.index, 3);
		assert!(outcome.frontier_advanced);
		assert_eq!(outcome.queued, vec!["tx1"]);
		assert_eq!(state.unused_address_index, 4);
		assert_eq!(state.transactions_to_fetch, vec!["tx1"]);

		// Seen again on the next cycle: not queued twice
		let outcome = reconciler
			.reconcile_address(&discovery, &mut state, address_response("3_pubabc", &["tx1"], 0))
			.unwrap();
		assert!(outcome.queued.is_empty());
		assert_eq!(state.transactions_to_fetch.len(), 1);
	}

	#[test]
	fn unknown_address_is_an_integrity_error() {
		let (discovery, reconciler, mut state) = setup();
		let result =
			reconciler.reconcile_address(&discovery, &mut state, address_response("99_pubabc", &[], 0));
		assert!(matches!(result, Err(WalletSyncError::IntegrityError(_))));
	}

	#[test]
	fn net_amount_is_receive_minus_spend() {
		let (_, reconciler, mut state) = setup();
		state.enqueue_fetch("tx1");

		let response = tx_response(
			"tx1",
			1000,
			vec![io("0_pubabc", "TRD", 500)],
			vec![io("1_pubabc", "TRD", 300), io("elsewhere", "TRD", 150)],
		);
		let changed = reconciler.process_transaction(&mut state, "tx1", &response);

		assert_eq!(changed.len(), 1);
		assert_eq!(changed[0].native_amount, NativeAmount::from(-200i64));
		assert_eq!(state.transactions["TRD"][0].native_amount, NativeAmount::from(-200i64));
		assert!(state.transactions_to_fetch.is_empty());
	}

	#[test]
	fn refetch_replaces_instead_of_duplicating() {
		let (_, reconciler, mut state) = setup();
		let response = tx_response("tx1", 1000, vec![], vec![io("1_pubabc", "TRD", 300)]);
		reconciler.process_transaction(&mut state, "tx1", &response);

		let mut confirmed = response.clone();
		confirmed.block_height = 42;
		reconciler.process_transaction(&mut state, "tx1", &confirmed);

		assert_eq!(state.num_transactions("TRD"), 1);
		assert_eq!(state.transactions["TRD"][0].block_height, 42);
	}

	#[test]
	fn tokens_get_their_own_ledger() {
		let (_, reconciler, mut state) = setup();
		state.enable_tokens(&["ANA".to_string()]);

		let response = tx_response(
			"tx1",
			1000,
			vec![],
			vec![io("1_pubabc", "TRD", 300), io("1_pubabc", "ANA", 7), io("1_pubabc", "XYZ", 9)],
		);
		let changed = reconciler.process_transaction(&mut state, "tx1", &response);

		assert_eq!(changed.len(), 2);
		assert_eq!(state.num_transactions("TRD"), 1);
		assert_eq!(state.num_transactions("ANA"), 1);
		assert!(!state.transactions.contains_key("XYZ"));
	}

	#[test]
	fn token_enabled_later_gets_its_history() {
		let (discovery, reconciler, mut state) = setup();
		let mut ana = address_response("3_pubabc", &["tx1", "tx2"], 300);
		ana.amounts.insert("ANA".to_string(), NativeAmount::from(7u64));
		reconciler.reconcile_address(&discovery, &mut state, ana).unwrap();

		let mixed = tx_response(
			"tx1",
			1000,
			vec![],
			vec![io("3_pubabc", "TRD", 300), io("3_pubabc", "ANA", 5)],
		);
		let ana_only = tx_response("tx2", 2000, vec![], vec![io("3_pubabc", "ANA", 2)]);
		reconciler.process_transaction(&mut state, "tx1", &mixed);
		reconciler.process_transaction(&mut state, "tx2", &ana_only);
		assert!(state.zero_net_txids.contains("tx2"));
		assert!(state.transactions_to_fetch.is_empty());
		reconciler.recompute_balances(&mut state);

		state.enable_tokens(&["ANA".to_string()]);
		assert_eq!(state.transactions_to_fetch, vec!["tx1", "tx2"]);

		// The TRD entry is already filed and is not reported again
		let changed = reconciler.process_transaction(&mut state, "tx1", &mixed);
		assert_eq!(changed.len(), 1);
		assert_eq!(changed[0].currency_code, "ANA");
		reconciler.process_transaction(&mut state, "tx2", &ana_only);

		assert_eq!(state.num_transactions("TRD"), 1);
		assert_eq!(state.num_transactions("ANA"), 2);
		assert!(state.zero_net_txids.is_empty());
		assert!(state.transactions_to_fetch.is_empty());
		assert_eq!(
			reconciler.recompute_balances(&mut state),
			vec![("ANA".to_string(), NativeAmount::from(7u64))]
		);
	}

	#[test]
	fn zero_net_transactions_are_remembered() {
		let (discovery, reconciler, mut state) = setup();
		state.enqueue_fetch("tx1");

		let response = tx_response("tx1", 1000, vec![io("elsewhere", "TRD", 5)], vec![io("other", "TRD", 5)]);
		let changed = reconciler.process_transaction(&mut state, "tx1", &response);

		assert!(changed.is_empty());
		assert!(state.zero_net_txids.contains("tx1"));
		assert!(state.transactions_to_fetch.is_empty());

		let outcome = reconciler
			.reconcile_address(&discovery, &mut state, address_response("0_pubabc", &["tx1"], 0))
			.unwrap();
		assert!(outcome.queued.is_empty());
	}

	#[test]
	fn mismatched_response_stays_queued() {
		let (_, reconciler, mut state) = setup();
		state.enqueue_fetch("tx1");

		let response = tx_response("tx2", 1000, vec![], vec![io("1_pubabc", "TRD", 300)]);
		assert!(reconciler.process_transaction(&mut state, "tx1", &response).is_empty());
		assert_eq!(state.transactions_to_fetch, vec!["tx1"]);
		assert_eq!(state.num_transactions("TRD"), 0);
	}

	#[test]
	fn balances_are_summed_over_address_records() {
		let (discovery, reconciler, mut state) = setup();
		reconciler
			.reconcile_address(&discovery, &mut state, address_response("0_pubabc", &["a"], 700))
			.unwrap();
		reconciler
			.reconcile_address(&discovery, &mut state, address_response("1_pubabc", &["b"], 500))
			.unwrap();

		let changed = reconciler.recompute_balances(&mut state);
		assert_eq!(changed, vec![("TRD".to_string(), NativeAmount::from(1200u64))]);
		assert_eq!(state.balance("TRD"), NativeAmount::from(1200u64));

		assert!(reconciler.recompute_balances(&mut state).is_empty());
	}

	#[test]
	fn balances_ignore_disabled_currencies() {
		let (discovery, reconciler, mut state) = setup();
		let mut response = address_response("0_pubabc", &["a"], 700);
		response.amounts.insert("ANA".to_string(), NativeAmount::from(9u64));
		reconciler.reconcile_address(&discovery, &mut state, response).unwrap();

		reconciler.recompute_balances(&mut state);
		assert_eq!(state.balance("TRD"), NativeAmount::from(700u64));
		assert!(!state.total_balances.contains_key("ANA"));
	}
}
