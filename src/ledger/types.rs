//! Wire types for the ledger service API and their boundary validation.
//!
//! Every payload received from the ledger is first deserialized into one of the typed
//! responses below and then checked with [`Validate`]. [`validate_payload`] folds both
//! steps into a single tagged result: the parsed payload, or the list of problems found.

use crate::utils::NativeAmount;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// One input or output of a ledger transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxIo {
	pub address: String,
	pub currency_code: String,
	pub amount: NativeAmount,
}

/// Inputs and outputs of a transaction, as submitted to `POST /spend`.
///
/// This is opaque to the host application; the engine keeps it with every ledger entry
/// so a transaction can be re-broadcast.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolParams {
	#[serde(default)]
	pub inputs: Vec<TxIo>,
	#[serde(default)]
	pub outputs: Vec<TxIo>,
}

/// Response of `GET /height`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeightResponse {
	pub height: u64,
}

/// Response of `GET /address/<addr>`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddressResponse {
	pub address: String,
	/// Transaction ids touching the address. Missing means none.
	#[serde(default)]
	pub txids: Vec<String>,
	/// Current balance held by the address, per currency code.
	#[serde(default)]
	pub amounts: BTreeMap<String, NativeAmount>,
}

/// Response of `GET /transaction/<txid>`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionResponse {
	pub txid: String,
	#[serde(default)]
	pub tx_date: i64,
	#[serde(default, deserialize_with = "height_from_str_or_number")]
	pub block_height: u64,
	pub network_fee: NativeAmount,
	pub inputs: Vec<TxIo>,
	pub outputs: Vec<TxIo>,
}

/// Response of `POST /spend`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpendResponse {
	pub txid: String,
	#[serde(default)]
	pub tx_date: i64,
	#[serde(default, deserialize_with = "height_from_str_or_number")]
	pub block_height: u64,
}

/// Accept a block height encoded either as a JSON number or as a decimal string.
pub(crate) fn height_from_str_or_number<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
	D: Deserializer<'de>,
{
	#[derive(Deserialize)]
	#[serde(untagged)]
	enum RawHeight {
		Number(u64),
		Text(String),
	}

	match RawHeight::deserialize(deserializer)? {
		RawHeight::Number(height) => Ok(height),
		RawHeight::Text(text) => text.parse().map_err(serde::de::Error::custom),
	}
}

/// Semantic checks applied after a payload has been deserialized
pub trait Validate {
	/// Every problem found in the payload; empty when it is usable.
	fn validation_errors(&self) -> Vec<String>;
}

/// Deserialize and validate a raw JSON payload.
pub fn validate_payload<T>(payload: serde_json::Value) -> Result<T, Vec<String>>
where
	T: DeserializeOwned + Validate,
{
	let parsed: T = serde_json::from_value(payload).map_err(|e| vec![e.to_string()])?;
	let errors = parsed.validation_errors();
	if errors.is_empty() {
		Ok(parsed)
	} else {
		Err(errors)
	}
}

fn check_io(kind: &str, items: &[TxIo], errors: &mut Vec<String>) {
	for (i, item) in items.iter().enumerate() {
		if item.address.is_empty() {
			errors.push(format!("{}[{}].address is empty", kind, i));
		}
		if item.currency_code.is_empty() {
			errors.push(format!("{}[{}].currencyCode is empty", kind, i));
		}
		if item.amount.is_negative() {
			errors.push(format!("{}[{}].amount is negative: {}", kind, i, item.amount));
		}
	}
}

impl Validate for HeightResponse {
	fn validation_errors(&self) -> Vec<String> {
		Vec::new()
	}
}

impl Validate for AddressResponse {
	fn validation_errors(&self) -> Vec<String> {
		let mut errors = Vec::new();
		if self.address.is_empty() {
			errors.push("address is empty".to_string());
		}
		if self.txids.iter().any(|txid| txid.is_empty()) {
			errors.push("txids contains an empty id".to_string());
		}
		for (code, amount) in &self.amounts {
			if code.is_empty() {
				errors.push("amounts contains an empty currency code".to_string());
			}
			if amount.is_negative() {
				errors.push(format!("amounts.{} is negative: {}", code, amount));
			}
		}
		errors
	}
}

impl Validate for TransactionResponse {
	fn validation_errors(&self) -> Vec<String> {
		let mut errors = Vec::new();
		if self.txid.is_empty() {
			errors.push("txid is empty".to_string());
		}
		if self.tx_date < 0 {
			errors.push(format!("txDate is negative: {}", self.tx_date));
		}
		if self.network_fee.is_negative() {
			errors.push(format!("networkFee is negative: {}", self.network_fee));
		}
		check_io("inputs", &self.inputs, &mut errors);
		check_io("outputs", &self.outputs, &mut errors);
		errors
	}
}

impl Validate for SpendResponse {
	fn validation_errors(&self) -> Vec<String> {
		let mut errors = Vec::new();
		if self.txid.is_empty() {
			errors.push("txid is empty".to_string());
		}
		if self.tx_date < 0 {
			errors.push(format!("txDate is negative: {}", self.tx_date));
		}
		errors
	}
}

/// Error types for ledger service requests
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
	#[error("HTTP error: {0}")]
	HttpError(#[from] reqwest::Error),

	#[error("JSON parse error: {0}")]
	JsonError(#[from] serde_json::Error),

	#[error("Unexpected status {status} from {url}")]
	StatusError { status: u16, url: String },

	#[error("Invalid response: {}", .0.join("; "))]
	ValidationError(Vec<String>),

	#[error("Invalid URL: {0}")]
	UrlError(String),
}

#[cfg(test)]
mod tests {
	use super::*;
	use serde_json::json;

	#[test]
	fn address_response_defaults_missing_lists() {
		let parsed: AddressResponse =
			validate_payload(json!({ "address": "3_pubabc" })).unwrap();
		assert!(parsed.txids.is_empty());
		assert!(parsed.amounts.is_empty());
	}

	#[test]
	fn address_response_rejects_bad_amounts() {
		let errors = validate_payload::<AddressResponse>(json!({
			"address": "",
			"txids": ["tx1"],
			"amounts": { "TRD": "-5" }
		}))
		.unwrap_err();
		assert_eq!(errors.len(), 2);

		let errors = validate_payload::<AddressResponse>(json!({
			"address": "0_pub",
			"amounts": { "TRD": 12.5 }
		}))
		.unwrap_err();
		assert_eq!(errors.len(), 1);
	}

	#[test]
	fn transaction_response_accepts_string_block_height() {
		let parsed: TransactionResponse = validate_payload(json!({
			"txid": "tx1",
			"txDate": 1500000000,
			"blockHeight": "1234",
			"networkFee": "50000",
			"inputs": [{ "address": "0_pub", "currencyCode": "TRD", "amount": "500" }],
			"outputs": [{ "address": "1_pub", "currencyCode": "TRD", "amount": "300" }]
		}))
		.unwrap();
		assert_eq!(parsed.block_height, 1234);
		assert_eq!(parsed.inputs[0].amount, NativeAmount::from(500u64));
	}

	#[test]
	fn transaction_response_requires_io_lists() {
		let errors = validate_payload::<TransactionResponse>(json!({
			"txid": "tx1",
			"networkFee": "0"
		}))
		.unwrap_err();
		assert_eq!(errors.len(), 1);
		assert!(errors[0].contains("inputs"));
	}

	#[test]
	fn transaction_response_collects_every_io_problem() {
		let errors = validate_payload::<TransactionResponse>(json!({
			"txid": "tx1",
			"networkFee": "-1",
			"inputs": [{ "address": "", "currencyCode": "", "amount": "1" }],
			"outputs": []
		}))
		.unwrap_err();
		assert_eq!(errors.len(), 3);
	}

	#[test]
	fn height_must_be_numeric() {
		assert!(validate_payload::<HeightResponse>(json!({ "height": 42 })).is_ok());
		assert!(validate_payload::<HeightResponse>(json!({ "height": "abc" })).is_err());
		assert!(validate_payload::<HeightResponse>(json!({})).is_err());
	}
}
