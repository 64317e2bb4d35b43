use ledger_wallet_sync::config::{CurrencyInfo, EngineConfig};
use ledger_wallet_sync::utils::format_token_amount;
use ledger_wallet_sync::wallet::sync::FileLocalStore;
use ledger_wallet_sync::{
	NativeAmount, StartOptions, SyncEngine, Transaction, WalletCallbacks, create_master_keys,
};

use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

/// Logs every engine notification
struct LoggingCallbacks {
	currency: CurrencyInfo,
}

impl WalletCallbacks for LoggingCallbacks {
	fn on_block_height_changed(&self, height: u64) {
		info!("Block height: {}", height);
	}

	fn on_transactions_changed(&self, transactions: &[Transaction]) {
		for tx in transactions {
			info!(
				"Transaction {} {}: {} {}",
				tx.txid,
				tx.date_time()
					.map(|d| d.to_rfc3339())
					.unwrap_or_else(|| tx.date.to_string()),
				format_token_amount(&tx.native_amount, self.currency.decimals_for(&tx.currency_code)),
				tx.currency_code
			);
		}
	}

	fn on_balance_changed(&self, currency_code: &str, balance: &NativeAmount) {
		info!(
			"Balance: {} {}",
			format_token_amount(balance, self.currency.decimals_for(currency_code)),
			currency_code
		);
	}

	fn on_addresses_checked(&self, progress: f64) {
		info!("Addresses checked: {:.0}%", progress * 100.0);
	}

	fn name(&self) -> &'static str {
		"LoggingCallbacks"
	}
}

#[tokio::main]
async fn main() {
	tracing_subscriber::fmt()
		.with_env_filter(
			tracing_subscriber::EnvFilter::from_default_env()
				.add_directive(tracing::Level::INFO.into()),
		)
		.with_target(false)
		.with_thread_ids(false)
		.with_thread_names(false)
		.with_file(false)
		.with_line_number(false)
		.with_timer(tracing_subscriber::fmt::time::time())
		.init();

	info!("Starting wallet sync service");
	let config = EngineConfig::from_env();

	let master_public_key = match std::env::var("WALLET_MASTER_PUBLIC_KEY") {
		Ok(key) if !key.is_empty() => key,
		_ => {
			let keys = create_master_keys();
			info!("Generated new wallet {}", keys.master_public_key);
			keys.master_public_key
		}
	};

	let data_dir = std::env::var("WALLET_DATA_DIR").unwrap_or_else(|_| "./data".to_string());
	let store = Arc::new(FileLocalStore::new(PathBuf::from(data_dir)));
	let callbacks = Arc::new(LoggingCallbacks {
		currency: config.currency.clone(),
	});

	let engine = match SyncEngine::builder()
		.with_config(config)
		.with_master_public_key(master_public_key)
		.with_store(store)
		.register_handler(callbacks)
		.build()
	{
		Ok(engine) => engine,
		Err(e) => {
			error!("Failed to create sync engine: {}", e);
			return;
		}
	};

	let reset_data = std::env::var("WALLET_RESET_DATA").is_ok_and(|v| v == "true");
	if let Err(e) = engine.start(StartOptions { reset_data }).await {
		error!("Failed to start sync engine: {}", e);
		return;
	}

	info!("Receive address: {}", engine.get_fresh_address());

	if let Err(e) = tokio::signal::ctrl_c().await {
		error!("Failed to listen for shutdown signal: {}", e);
	}

	if let Err(e) = engine.stop().await {
		error!("Failed to stop sync engine cleanly: {}", e);
	}
}
