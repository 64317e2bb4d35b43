use crate::config::ConfigError;
use crate::ledger::{LedgerError, ProtocolParams, height_from_str_or_number};
use crate::utils::NativeAmount;
use crate::wallet::sync::repositories::StoreError;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Ledger transaction id
pub type TxId = String;

/// A wallet ledger entry: one transaction seen from one currency's point of view.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
	/// Empty until the transaction has been broadcast
	#[serde(default)]
	pub txid: TxId,
	/// Unix seconds
	#[serde(default)]
	pub date: i64,
	pub currency_code: String,
	#[serde(default, deserialize_with = "height_from_str_or_number")]
	pub block_height: u64,
	/// Net effect on this wallet, negative for outgoing value
	pub native_amount: NativeAmount,
	#[serde(default)]
	pub network_fee: NativeAmount,
	#[serde(default, alias = "signedTx")]
	pub signed_payload: String,
	#[serde(default, alias = "otherParams")]
	pub protocol_params: ProtocolParams,
}

impl Transaction {
	/// The transaction date as a UTC timestamp, if it is representable.
	pub fn date_time(&self) -> Option<DateTime<Utc>> {
		DateTime::from_timestamp(self.date, 0)
	}

	pub fn is_signed(&self) -> bool {
		!self.signed_payload.is_empty()
	}
}

/// Server-reported activity of one derived address
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressRecord {
	pub address: String,
	/// `None` until the address has been reconciled at least once
	#[serde(default)]
	pub txids: Option<Vec<TxId>>,
	#[serde(default)]
	pub amounts: Option<BTreeMap<String, NativeAmount>>,
}

impl AddressRecord {
	pub fn new(address: String) -> Self {
		Self {
			address,
			txids: None,
			amounts: None,
		}
	}

	pub fn has_activity(&self) -> bool {
		self.txids.as_ref().is_some_and(|txids| !txids.is_empty())
	}

	pub fn amount_of(&self, currency_code: &str) -> Option<&NativeAmount> {
		self.amounts.as_ref().and_then(|a| a.get(currency_code))
	}
}

/// Paging options for transaction listings
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionQuery {
	/// Defaults to the primary currency
	pub currency_code: Option<String>,
	pub start_index: usize,
	/// 0 returns every entry from `start_index` on
	pub num_entries: usize,
}

/// Options for starting an engine
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StartOptions {
	/// Ignore any persisted snapshot and start from fresh state
	pub reset_data: bool,
}

/// Error types for wallet synchronization
#[allow(clippy::enum_variant_names)]
#[derive(Debug, thiserror::Error)]
pub enum WalletSyncError {
	#[error("Ledger error: {0}")]
	LedgerError(#[from] LedgerError),

	#[error("Store error: {0}")]
	StoreError(#[from] StoreError),

	#[error("Configuration error: {0}")]
	ConfigError(#[from] ConfigError),

	#[error("Integrity error: {0}")]
	IntegrityError(String),

	#[error("State parse error: {0}")]
	ParseError(String),

	#[error("Engine is already running")]
	AlreadyRunning,
}
