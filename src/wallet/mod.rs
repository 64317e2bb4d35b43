pub mod state;
pub mod sync;
pub mod types;

pub use state::WalletState;
pub use sync::{SyncEngine, SyncEngineBuilder};
pub use types::*;

use rand::Rng;

/// Key material of a wallet in the reference ledger's scheme
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletKeys {
	pub master_private_key: String,
	pub master_public_key: String,
}

/// Generate a random private key and derive its public key as `"pub" + private`.
pub fn create_master_keys() -> WalletKeys {
	let mut seed = [0u8; 8];
	rand::rng().fill(&mut seed);
	let master_private_key = hex::encode(seed);
	WalletKeys {
		master_public_key: format!("pub{}", master_private_key),
		master_private_key,
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn public_key_is_derived_from_private_key() {
		let keys = create_master_keys();
		assert_eq!(keys.master_private_key.len(), 16);
		assert_eq!(keys.master_public_key, format!("pub{}", keys.master_private_key));
		assert_ne!(create_master_keys(), keys);
	}
}
