//! Engine configuration.
//!
//! All tunables of a sync engine live in [`EngineConfig`]. Defaults match the reference
//! ledger service; [`EngineConfig::from_env`] overlays `WALLET_*` environment variables.
//! A config is validated once when the engine is built and never re-read afterwards.

use crate::utils::NativeAmount;

use reqwest::Url;
use std::env;
use std::time::Duration;
use tracing::{info, warn};

/// Error raised when a configuration value is unusable
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
	#[error("Invalid configuration value for {field}: {reason}")]
	InvalidValue { field: &'static str, reason: String },
}

/// Display metadata for a currency or token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenInfo {
	pub currency_code: String,
	/// Number of decimal places of the display denomination
	pub decimals: u32,
}

impl TokenInfo {
	pub fn new(currency_code: impl Into<String>, decimals: u32) -> Self {
		Self {
			currency_code: currency_code.into(),
			decimals,
		}
	}
}

/// The primary currency of a wallet plus the tokens it can track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrencyInfo {
	pub primary: TokenInfo,
	pub tokens: Vec<TokenInfo>,
}

impl CurrencyInfo {
	pub fn primary_code(&self) -> &str {
		&self.primary.currency_code
	}

	/// Primary currency first, then every supported token
	pub fn all_codes(&self) -> Vec<String> {
		std::iter::once(&self.primary)
			.chain(self.tokens.iter())
			.map(|t| t.currency_code.clone())
			.collect()
	}

	/// Display decimals for a currency code, 0 when unknown
	pub fn decimals_for(&self, currency_code: &str) -> u32 {
		std::iter::once(&self.primary)
			.chain(self.tokens.iter())
			.find(|t| t.currency_code == currency_code)
			.map(|t| t.decimals)
			.unwrap_or(0)
	}
}

impl Default for CurrencyInfo {
	fn default() -> Self {
		Self {
			primary: TokenInfo::new("TRD", 4),
			tokens: vec![TokenInfo::new("ANA", 2)],
		}
	}
}

/// Network fee schedule used by the spend builder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeeSchedule {
	/// Fee charged for the standard fee option
	pub base_fee: NativeAmount,
	/// Amount added for `high` and subtracted for `low`
	pub priority_delta: NativeAmount,
}

impl Default for FeeSchedule {
	fn default() -> Self {
		Self {
			base_fee: NativeAmount::from(50_000u64),
			priority_delta: NativeAmount::from(10_000u64),
		}
	}
}

/// Configuration for a single wallet sync engine
#[derive(Debug, Clone)]
pub struct EngineConfig {
	/// Base URL of the ledger service API
	pub ledger_url: String,
	/// Number of consecutive unused addresses probed beyond the frontier
	pub gap_limit: usize,
	pub block_height_interval: Duration,
	pub address_interval: Duration,
	pub transaction_interval: Duration,
	pub save_interval: Duration,
	/// Upper bound on concurrent ledger requests within one cycle
	pub max_concurrent_fetches: usize,
	/// Per-request HTTP timeout
	pub request_timeout: Duration,
	/// Total time budget for retrying an idempotent ledger request
	pub retry_max_elapsed: Duration,
	pub currency: CurrencyInfo,
	pub fees: FeeSchedule,
	/// Suffix appended to the index 0 address. Only meaningful against the mock ledger,
	/// which credits addresses carrying this marker with preloaded funds.
	pub address_zero_marker: Option<String>,
	/// Folder and file of the wallet snapshot inside the local store
	pub data_folder: String,
	pub data_file: String,
}

impl Default for EngineConfig {
	fn default() -> Self {
		Self {
			ledger_url: "http://localhost:8080/api/".to_string(),
			gap_limit: 10,
			block_height_interval: Duration::from_secs(60),
			address_interval: Duration::from_secs(20),
			transaction_interval: Duration::from_secs(3),
			save_interval: Duration::from_secs(10),
			max_concurrent_fetches: 16,
			request_timeout: Duration::from_secs(30),
			retry_max_elapsed: Duration::from_secs(5),
			currency: CurrencyInfo::default(),
			fees: FeeSchedule::default(),
			address_zero_marker: None,
			data_folder: "txEngineFolder".to_string(),
			data_file: "walletLocalData.json".to_string(),
		}
	}
}

impl EngineConfig {
	/// Load configuration from environment variables on top of the defaults.
	///
	/// Environment variables:
	/// - `WALLET_LEDGER_URL`: ledger service base URL
	/// - `WALLET_GAP_LIMIT`: gap limit
	/// - `WALLET_BLOCK_HEIGHT_POLL_MS`, `WALLET_ADDRESS_POLL_MS`,
	///   `WALLET_TRANSACTION_POLL_MS`, `WALLET_SAVE_MS`: poll intervals
	/// - `WALLET_MAX_CONCURRENT_FETCHES`: fan-out bound per cycle
	/// - `WALLET_BASE_FEE`, `WALLET_FEE_DELTA`: fee schedule in native units
	/// - `WALLET_ADDRESS_ZERO_MARKER`: mock-ledger fixture suffix for address 0
	///
	/// Unparsable values are logged and ignored.
	pub fn from_env() -> Self {
		let mut config = Self::default();

		if let Ok(url) = env::var("WALLET_LEDGER_URL") {
			info!("Ledger URL: {}", url);
			config.ledger_url = url;
		}
		if let Some(gap_limit) = parse_env::<usize>("WALLET_GAP_LIMIT") {
			config.gap_limit = gap_limit;
		}
		if let Some(ms) = parse_env::<u64>("WALLET_BLOCK_HEIGHT_POLL_MS") {
			config.block_height_interval = Duration::from_millis(ms);
		}
		if let Some(ms) = parse_env::<u64>("WALLET_ADDRESS_POLL_MS") {
			config.address_interval = Duration::from_millis(ms);
		}
		if let Some(ms) = parse_env::<u64>("WALLET_TRANSACTION_POLL_MS") {
			config.transaction_interval = Duration::from_millis(ms);
		}
		if let Some(ms) = parse_env::<u64>("WALLET_SAVE_MS") {
			config.save_interval = Duration::from_millis(ms);
		}
		if let Some(limit) = parse_env::<usize>("WALLET_MAX_CONCURRENT_FETCHES") {
			config.max_concurrent_fetches = limit;
		}
		if let Some(fee) = parse_env::<NativeAmount>("WALLET_BASE_FEE") {
			config.fees.base_fee = fee;
		}
		if let Some(delta) = parse_env::<NativeAmount>("WALLET_FEE_DELTA") {
			config.fees.priority_delta = delta;
		}
		if let Ok(marker) = env::var("WALLET_ADDRESS_ZERO_MARKER") {
			if !marker.is_empty() {
				config.address_zero_marker = Some(marker);
			}
		}

		config
	}

	/// Reject values the engine cannot run with.
	pub fn validate(&self) -> Result<(), ConfigError> {
		Url::parse(&self.ledger_url).map_err(|e| ConfigError::InvalidValue {
			field: "ledger_url",
			reason: e.to_string(),
		})?;

		if self.gap_limit == 0 {
			return Err(invalid("gap_limit", "must be at least 1"));
		}
		if self.max_concurrent_fetches == 0 {
			return Err(invalid("max_concurrent_fetches", "must be at least 1"));
		}

		let intervals = [
			("block_height_interval", self.block_height_interval),
			("address_interval", self.address_interval),
			("transaction_interval", self.transaction_interval),
			("save_interval", self.save_interval),
		];
		for (field, interval) in intervals {
			if interval.is_zero() {
				return Err(invalid(field, "must be non-zero"));
			}
		}

		if self.currency.all_codes().iter().any(|code| code.is_empty()) {
			return Err(invalid("currency", "currency codes must be non-empty"));
		}
		if self.fees.base_fee.is_negative() || self.fees.priority_delta.is_negative() {
			return Err(invalid("fees", "fees must be non-negative"));
		}
		if self.data_folder.is_empty() || self.data_file.is_empty() {
			return Err(invalid("data_file", "store path must be non-empty"));
		}

		Ok(())
	}

	/// Key path of the wallet snapshot inside the local store
	pub fn data_path(&self) -> String {
		format!("{}/{}", self.data_folder, self.data_file)
	}
}

fn invalid(field: &'static str, reason: &str) -> ConfigError {
	ConfigError::InvalidValue {
		field,
		reason: reason.to_string(),
	}
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Option<T> {
	let raw = env::var(key).ok()?;
	match raw.parse() {
		Ok(value) => Some(value),
		Err(_) => {
			warn!("Ignoring unparsable {}={:?}", key, raw);
			None
		}
	}
}
