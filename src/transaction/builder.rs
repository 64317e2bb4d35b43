//! Spend builder
//!
//! Turns a host spend request into an unsigned [`Transaction`] against the current wallet
//! state: the fee is resolved from the [`FeeSchedule`], inputs are picked greedily in address
//! table order and any excess is returned through a change output. The network fee is never an
//! explicit output; it is the difference between inputs and outputs of the primary currency.

use crate::config::FeeSchedule;
use crate::ledger::{ProtocolParams, TxIo};
use crate::utils::NativeAmount;
use crate::wallet::state::WalletState;
use crate::wallet::types::Transaction;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Error, Debug, Serialize)]
pub enum SpendError {
	#[error("Invalid spend request: {0}")]
	InvalidRequest(String),

	#[error("Insufficient funds for {currency_code}")]
	InsufficientFunds { currency_code: String },

	#[error("Signing failed: {0}")]
	SigningFailed(String),

	#[error("Broadcast failed: {0}")]
	BroadcastFailed(String),

	#[error("Unexpected error: {0}")]
	UnexpectedError(String),
}

/// Network fee selection of a spend request
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FeeOption {
	#[default]
	Standard,
	Low,
	High,
	/// Use `custom_network_fee` from the request
	Custom,
}

/// One destination of a spend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpendTarget {
	pub public_address: String,
	/// Decimal string in smallest units
	pub native_amount: String,
	/// Defaults to the primary currency
	#[serde(default)]
	pub currency_code: Option<String>,
}

/// A payment request from the host application
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpendRequest {
	/// Currency the resulting ledger entry is filed under, defaults to the primary currency
	#[serde(default)]
	pub currency_code: Option<String>,
	#[serde(default)]
	pub network_fee_option: FeeOption,
	#[serde(default)]
	pub custom_network_fee: Option<String>,
	#[serde(default)]
	pub spend_targets: Vec<SpendTarget>,
}

/// Builder for unsigned spend transactions
pub struct SpendBuilder<'a> {
	/// Wallet state the inputs are selected from
	state: &'a WalletState,
	primary_currency: String,
	fees: FeeSchedule,
	/// Destination of any change output
	change_address: Option<String>,
}

impl<'a> SpendBuilder<'a> {
	/// Creates a new spend builder over a wallet state
	pub fn new(state: &'a WalletState, primary_currency: &str) -> Self {
		Self {
			state,
			primary_currency: primary_currency.to_string(),
			fees: FeeSchedule::default(),
			change_address: None,
		}
	}

	/// Sets the fee schedule
	pub fn with_fee_schedule(mut self, fees: FeeSchedule) -> Self {
		self.fees = fees;
		self
	}

	/// Sets the change address
	pub fn with_change_address(mut self, address: String) -> Self {
		self.change_address = Some(address);
		self
	}

	/// Resolve the network fee for a request.
	pub fn resolve_fee(&self, request: &SpendRequest) -> Result<NativeAmount, SpendError> {
		let fee = match request.network_fee_option {
			FeeOption::Standard => self.fees.base_fee.clone(),
			FeeOption::High => &self.fees.base_fee + &self.fees.priority_delta,
			FeeOption::Low => {
				let low = &self.fees.base_fee - &self.fees.priority_delta;
				if low.is_negative() { NativeAmount::zero() } else { low }
			}
			FeeOption::Custom => {
				let raw = request.custom_network_fee.as_deref().ok_or_else(|| {
					SpendError::InvalidRequest("custom fee option without a fee".to_string())
				})?;
				let fee: NativeAmount = raw.parse().map_err(|_| {
					SpendError::InvalidRequest(format!("invalid custom fee: {:?}", raw))
				})?;
				if fee.is_negative() {
					return Err(SpendError::InvalidRequest(format!("negative custom fee: {}", fee)));
				}
				fee
			}
		};
		Ok(fee)
	}

	/// Builds the unsigned transaction
	pub fn build(self, request: &SpendRequest) -> Result<Transaction, SpendError> {
		log::info!(
			"Building spend with {} targets, fee option {:?}",
			request.spend_targets.len(),
			request.network_fee_option
		);

		let currency_code = match &request.currency_code {
			Some(code) => {
				self.require_enabled(code)?;
				code.clone()
			}
			None => self.primary_currency.clone(),
		};

		if request.spend_targets.is_empty() {
			return Err(SpendError::InvalidRequest("no spend targets".to_string()));
		}

		let network_fee = self.resolve_fee(request)?;

		// Totals per currency, and the target outputs
		let mut total_spends: BTreeMap<String, NativeAmount> = BTreeMap::new();
		let mut outputs = Vec::new();
		for (i, target) in request.spend_targets.iter().enumerate() {
			if target.public_address.is_empty() {
				return Err(SpendError::InvalidRequest(format!("target {} has no address", i)));
			}
			let amount: NativeAmount = target.native_amount.parse().map_err(|_| {
				SpendError::InvalidRequest(format!(
					"target {} has an invalid amount: {:?}",
					i, target.native_amount
				))
			})?;
			if !amount.is_positive() {
				return Err(SpendError::InvalidRequest(format!(
					"target {} amount must be positive",
					i
				)));
			}
			let target_currency = target
				.currency_code
				.clone()
				.unwrap_or_else(|| self.primary_currency.clone());
			self.require_enabled(&target_currency)?;

			*total_spends.entry(target_currency.clone()).or_default() += &amount;
			outputs.push(TxIo {
				address: target.public_address.clone(),
				currency_code: target_currency,
				amount,
			});
		}
		*total_spends.entry(self.primary_currency.clone()).or_default() += &network_fee;

		// Every currency with a nonzero spend, in enabled order
		let spends: Vec<(&String, &NativeAmount)> = self
			.state
			.enabled_tokens
			.iter()
			.filter_map(|code| total_spends.get(code).map(|total| (code, total)))
			.filter(|(_, total)| !total.is_zero())
			.collect();

		for (code, total) in &spends {
			let balance = self.state.balance(code);
			if **total > balance {
				log::warn!("Insufficient balance for {}: need {}, have {}", code, total, balance);
				return Err(SpendError::InsufficientFunds {
					currency_code: code.to_string(),
				});
			}
		}

		// Greedy input selection, whole addresses in table order
		let mut inputs = Vec::new();
		for (code, total) in &spends {
			let mut selected = NativeAmount::zero();
			for record in &self.state.addresses {
				if selected >= **total {
					break;
				}
				let Some(amount) = record.amount_of(code).filter(|a| a.is_positive()) else {
					continue;
				};
				selected += amount;
				inputs.push(TxIo {
					address: record.address.clone(),
					currency_code: code.to_string(),
					amount: amount.clone(),
				});
			}

			if selected < **total {
				log::warn!("Inputs for {} fall short: need {}, found {}", code, total, selected);
				return Err(SpendError::InsufficientFunds {
					currency_code: code.to_string(),
				});
			}
			if selected > **total {
				let change_address = self.change_address.clone().ok_or_else(|| {
					SpendError::UnexpectedError("change required but no change address set".to_string())
				})?;
				let change = &selected - *total;
				log::debug!("Change of {} {} to {}", change, code, change_address);
				outputs.push(TxIo {
					address: change_address,
					currency_code: code.to_string(),
					amount: change,
				});
			}
		}

		let native_amount = total_spends
			.get(&self.primary_currency)
			.cloned()
			.unwrap_or_default();

		log::info!(
			"Built spend of {} {} using {} inputs and {} outputs",
			native_amount,
			self.primary_currency,
			inputs.len(),
			outputs.len()
		);

		Ok(Transaction {
			txid: String::new(),
			date: 0,
			currency_code,
			block_height: 0,
			native_amount,
			network_fee,
			signed_payload: String::new(),
			protocol_params: ProtocolParams { inputs, outputs },
		})
	}

	fn require_enabled(&self, currency_code: &str) -> Result<(), SpendError> {
		if self.state.is_token_enabled(currency_code) {
			Ok(())
		} else {
			Err(SpendError::InvalidRequest(format!(
				"currency {} is not supported or not enabled",
				currency_code
			)))
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::wallet::types::AddressRecord;

	fn funded_state(amounts: &[u64]) -> WalletState {
		let mut state = WalletState::new("pubabc", "TRD");
		let mut total = NativeAmount::zero();
		for (i, amount) in amounts.iter().enumerate() {
			let mut record = AddressRecord::new(format!("{}_pubabc", i));
			record.txids = Some(vec![format!("tx{}", i)]);
			record.amounts = Some(BTreeMap::from([("TRD".to_string(), NativeAmount::from(*amount))]));
			total += &NativeAmount::from(*amount);
			state.addresses.push(record);
		}
		state.total_balances.insert("TRD".to_string(), total);
		state.unused_address_index = amounts.len();
		state
	}

	fn request(amount: &str) -> SpendRequest {
		SpendRequest {
			spend_targets: vec![SpendTarget {
				public_address: "9_someone".to_string(),
				native_amount: amount.to_string(),
				currency_code: None,
			}],
			..SpendRequest::default()
		}
	}

	fn zero_fees() -> FeeSchedule {
		FeeSchedule {
			base_fee: NativeAmount::zero(),
			priority_delta: NativeAmount::zero(),
		}
	}

	#[test]
	fn fee_options() {
		let state = funded_state(&[]);
		let builder = SpendBuilder::new(&state, "TRD");
		let mut req = request("1");

		assert_eq!(builder.resolve_fee(&req).unwrap(), NativeAmount::from(50_000u64));
		req.network_fee_option = FeeOption::High;
		assert_eq!(builder.resolve_fee(&req).unwrap(), NativeAmount::from(60_000u64));
		req.network_fee_option = FeeOption::Low;
		assert_eq!(builder.resolve_fee(&req).unwrap(), NativeAmount::from(40_000u64));

		req.network_fee_option = FeeOption::Custom;
		assert!(matches!(builder.resolve_fee(&req), Err(SpendError::InvalidRequest(_))));
		req.custom_network_fee = Some("-1".to_string());
		assert!(matches!(builder.resolve_fee(&req), Err(SpendError::InvalidRequest(_))));
		req.custom_network_fee = Some("123".to_string());
		assert_eq!(builder.resolve_fee(&req).unwrap(), NativeAmount::from(123u64));
	}

	#[test]
	fn fee_pushes_spend_over_balance() {
		let state = funded_state(&[1000]);
		let result = SpendBuilder::new(&state, "TRD").build(&request("900"));
		assert!(matches!(
			result,
			Err(SpendError::InsufficientFunds { currency_code }) if currency_code == "TRD"
		));
	}

	#[test]
	fn greedy_selection_with_change() {
		let state = funded_state(&[700, 500, 400]);
		let tx = SpendBuilder::new(&state, "TRD")
			.with_fee_schedule(zero_fees())
			.with_change_address("3_pubabc".to_string())
			.build(&request("900"))
			.unwrap();

		let inputs: Vec<(&str, String)> = tx
			.protocol_params
			.inputs
			.iter()
			.map(|i| (i.address.as_str(), i.amount.to_string()))
			.collect();
		assert_eq!(
			inputs,
			vec![("0_pubabc", "700".to_string()), ("1_pubabc", "500".to_string())]
		);

		let outputs = &tx.protocol_params.outputs;
		assert_eq!(outputs.len(), 2);
		assert_eq!(outputs[0].address, "9_someone");
		assert_eq!(outputs[1].address, "3_pubabc");
		assert_eq!(outputs[1].amount, NativeAmount::from(300u64));

		assert_eq!(tx.native_amount, NativeAmount::from(900u64));
		assert!(tx.txid.is_empty());
		assert!(!tx.is_signed());
	}

	#[test]
	fn fee_is_covered_by_inputs_not_outputs() {
		let state = funded_state(&[30_000, 50_000, 70_000]);
		let tx = SpendBuilder::new(&state, "TRD")
			.with_change_address("2_pubabc".to_string())
			.build(&request("1000"))
			.unwrap();

		let inputs: NativeAmount = tx.protocol_params.inputs.iter().map(|i| &i.amount).sum();
		let outputs: NativeAmount = tx.protocol_params.outputs.iter().map(|o| &o.amount).sum();
		assert_eq!(tx.protocol_params.inputs.len(), 2);
		assert_eq!(inputs, NativeAmount::from(80_000u64));
		assert_eq!(&inputs - &outputs, NativeAmount::from(50_000u64));
		assert_eq!(tx.network_fee, NativeAmount::from(50_000u64));
		assert_eq!(tx.native_amount, NativeAmount::from(51_000u64));
	}

	#[test]
	fn exact_match_has_no_change() {
		let state = funded_state(&[700, 200]);
		let tx = SpendBuilder::new(&state, "TRD")
			.with_fee_schedule(zero_fees())
			.build(&request("900"))
			.unwrap();
		assert_eq!(tx.protocol_params.inputs.len(), 2);
		assert_eq!(tx.protocol_params.outputs.len(), 1);
	}

	#[test]
	fn rejects_malformed_requests() {
		let state = funded_state(&[1000]);
		let build = |req: &SpendRequest| SpendBuilder::new(&state, "TRD").build(req);

		assert!(matches!(build(&SpendRequest::default()), Err(SpendError::InvalidRequest(_))));
		assert!(matches!(build(&request("12.5")), Err(SpendError::InvalidRequest(_))));
		assert!(matches!(build(&request("0")), Err(SpendError::InvalidRequest(_))));

		let mut req = request("1");
		req.spend_targets[0].public_address.clear();
		assert!(matches!(build(&req), Err(SpendError::InvalidRequest(_))));

		let mut req = request("1");
		req.spend_targets[0].currency_code = Some("ANA".to_string());
		assert!(matches!(build(&req), Err(SpendError::InvalidRequest(_))));

		let mut req = request("1");
		req.currency_code = Some("XYZ".to_string());
		assert!(matches!(build(&req), Err(SpendError::InvalidRequest(_))));
	}

	#[test]
	fn token_spend_selects_token_inputs() {
		let mut state = funded_state(&[100_000]);
		state.enable_tokens(&["ANA".to_string()]);
		state.addresses[0]
			.amounts
			.as_mut()
			.unwrap()
			.insert("ANA".to_string(), NativeAmount::from(40u64));
		state.total_balances.insert("ANA".to_string(), NativeAmount::from(40u64));

		let mut req = request("15");
		req.currency_code = Some("ANA".to_string());
		req.spend_targets[0].currency_code = Some("ANA".to_string());

		let tx = SpendBuilder::new(&state, "TRD")
			.with_change_address("1_pubabc".to_string())
			.build(&req)
			.unwrap();

		assert_eq!(tx.currency_code, "ANA");
		assert_eq!(tx.native_amount, NativeAmount::from(50_000u64));
		let ana_change = tx
			.protocol_params
			.outputs
			.iter()
			.find(|o| o.currency_code == "ANA" && o.address == "1_pubabc")
			.unwrap();
		assert_eq!(ana_change.amount, NativeAmount::from(25u64));
	}

	#[test]
	fn request_parses_from_host_json() {
		let req: SpendRequest = serde_json::from_str(
			r#"{
				"networkFeeOption": "custom",
				"customNetworkFee": "10",
				"spendTargets": [{ "publicAddress": "x", "nativeAmount": "5" }]
			}"#,
		)
		.unwrap();
		assert_eq!(req.network_fee_option, FeeOption::Custom);
		assert_eq!(req.spend_targets[0].currency_code, None);
	}
}
