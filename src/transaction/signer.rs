//! Transaction signing.
//!
//! Key handling lives outside this crate. The engine only needs something that turns an
//! unsigned transaction into an opaque signed payload.

use crate::transaction::builder::SpendError;
use crate::wallet::types::Transaction;

use async_trait::async_trait;

#[async_trait]
pub trait TransactionSigner: Send + Sync {
	/// Produce the signed payload for `tx`.
	async fn sign(&self, tx: &Transaction) -> Result<String, SpendError>;
}

/// Signer for ledgers that accept unsigned spends: the payload is the hex encoded JSON of the
/// protocol parameters.
#[derive(Debug, Clone, Default)]
pub struct HexPayloadSigner;

#[async_trait]
impl TransactionSigner for HexPayloadSigner {
	async fn sign(&self, tx: &Transaction) -> Result<String, SpendError> {
		if tx.protocol_params.inputs.is_empty() || tx.protocol_params.outputs.is_empty() {
			return Err(SpendError::SigningFailed(
				"transaction has no inputs or outputs".to_string(),
			));
		}
		let bytes = serde_json::to_vec(&tx.protocol_params)
			.map_err(|e| SpendError::SigningFailed(e.to_string()))?;
		Ok(hex::encode(bytes))
	}
}
