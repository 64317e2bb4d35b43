//!
//! Transaction sender for the ledger service.
//!
//! Submits signed transactions through `POST /spend` and copies the ledger's assigned id,
//! date and height back onto the transaction. Nothing is retried here: a failed broadcast is
//! returned to the caller with the transaction untouched, so resubmitting it is safe.

use crate::ledger::LedgerClient;
use crate::transaction::builder::SpendError;
use crate::wallet::types::Transaction;

use std::sync::Arc;
use tracing::{debug, error, info};

/// Transaction sender for submitting spends to the ledger service
#[derive(Clone)]
pub struct TransactionSender {
    ledger: Arc<dyn LedgerClient>,
}

impl TransactionSender {
    /// Creates a new transaction sender
    pub fn new(ledger: Arc<dyn LedgerClient>) -> Self {
        Self { ledger }
    }

    /// Broadcasts a signed transaction, returning it with the ledger-assigned fields set
    pub async fn send_tx(&self, tx: &Transaction) -> Result<Transaction, SpendError> {
        if !tx.is_signed() {
            return Err(SpendError::InvalidRequest(
                "transaction must be signed before broadcast".to_string(),
            ));
        }

        debug!(
            "SENDING spend with {} inputs, {} outputs",
            tx.protocol_params.inputs.len(),
            tx.protocol_params.outputs.len()
        );
        let response = self
            .ledger
            .post_spend(&tx.protocol_params)
            .await
            .map_err(|e| {
                error!("Broadcast failed: {}", e);
                SpendError::BroadcastFailed(e.to_string())
            })?;

        let mut sent = tx.clone();
        sent.txid = response.txid;
        sent.date = response.tx_date;
        sent.block_height = response.block_height;

        info!("Broadcast transaction {} at height {}", sent.txid, sent.block_height);
        Ok(sent)
    }
}
