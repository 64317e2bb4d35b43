//!
//! HTTP client for the remote ledger service.
//!
//! The engine only depends on the [`LedgerClient`] trait; [`HttpLedgerClient`] is the
//! reqwest implementation of the simple request/response JSON API. Idempotent `GET`
//! requests are retried with exponential backoff inside a short time budget, `POST /spend`
//! is sent exactly once. All responses pass through [`validate_payload`] before use.

use super::types::*;

use backoff::ExponentialBackoffBuilder;
use backoff::future::retry;
use reqwest::{Client, Url};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, error};

/// Contract the sync engine needs from the ledger service.
#[async_trait::async_trait]
pub trait LedgerClient: Send + Sync {
	/// Current chain height.
	async fn get_height(&self) -> Result<HeightResponse, LedgerError>;

	/// Transaction ids and balance contribution of a single address.
	async fn get_address(&self, address: &str) -> Result<AddressResponse, LedgerError>;

	/// Full detail of a transaction, including every input and output.
	async fn get_transaction(&self, txid: &str) -> Result<TransactionResponse, LedgerError>;

	/// Submit a signed spend. The server echoes the assigned id, date and height.
	async fn post_spend(&self, params: &ProtocolParams) -> Result<SpendResponse, LedgerError>;
}

/// Ledger service client over HTTP
#[derive(Clone)]
pub struct HttpLedgerClient {
	/// The underlying HTTP client.
	http_client: Client,
	/// Base URL of the API, e.g. `http://host:8080/api/`.
	base_url: Url,
	/// Time budget for retrying a failed `GET`.
	retry_max_elapsed: Duration,
}

impl HttpLedgerClient {
	/// Create a new ledger client.
	///
	/// # Arguments
	/// * `base_url` - Base URL of the ledger API.
	/// * `request_timeout` - Timeout applied to every request.
	/// * `retry_max_elapsed` - Retry budget for idempotent requests.
	pub fn new(
		base_url: &str,
		request_timeout: Duration,
		retry_max_elapsed: Duration,
	) -> Result<Self, LedgerError> {
		let base_url = Url::parse(base_url).map_err(|e| LedgerError::UrlError(e.to_string()))?;
		if base_url.cannot_be_a_base() {
			return Err(LedgerError::UrlError(format!(
				"{} cannot be used as a base URL",
				base_url
			)));
		}

		let http_client = Client::builder().timeout(request_timeout).build()?;

		Ok(Self {
			http_client,
			base_url,
			retry_max_elapsed,
		})
	}

	/// Build `<base>/<segments...>`, percent-encoding each segment.
	pub fn endpoint(&self, segments: &[&str]) -> Result<Url, LedgerError> {
		let mut url = self.base_url.clone();
		url.path_segments_mut()
			.map_err(|_| LedgerError::UrlError(format!("{} cannot be a base", self.base_url)))?
			.pop_if_empty()
			.extend(segments);
		Ok(url)
	}

	/// Fetch a JSON document, retrying connection failures and server errors.
	async fn get_json(&self, url: Url) -> Result<serde_json::Value, LedgerError> {
		let policy = ExponentialBackoffBuilder::new()
			.with_max_elapsed_time(Some(self.retry_max_elapsed))
			.build();

		retry(policy, || {
			let client = self.http_client.clone();
			let url = url.clone();
			async move {
				let response = client.get(url.clone()).send().await.map_err(|e| {
					debug!("GET {} failed: {}", url, e);
					backoff::Error::transient(LedgerError::HttpError(e))
				})?;

				let status = response.status();
				if !status.is_success() {
					let err = LedgerError::StatusError {
						status: status.as_u16(),
						url: url.to_string(),
					};
					return if status.is_server_error() {
						Err(backoff::Error::transient(err))
					} else {
						Err(backoff::Error::permanent(err))
					};
				}

				response
					.json::<serde_json::Value>()
					.await
					.map_err(|e| backoff::Error::permanent(LedgerError::HttpError(e)))
			}
		})
		.await
	}

	/// Validate a payload, logging every problem before discarding it.
	fn decode<T>(&self, what: &str, payload: serde_json::Value) -> Result<T, LedgerError>
	where
		T: DeserializeOwned + Validate,
	{
		validate_payload(payload).map_err(|errors| {
			for e in &errors {
				error!("Invalid {} response: {}", what, e);
			}
			LedgerError::ValidationError(errors)
		})
	}
}

#[async_trait::async_trait]
impl LedgerClient for HttpLedgerClient {
	async fn get_height(&self) -> Result<HeightResponse, LedgerError> {
		let url = self.endpoint(&["height"])?;
		let payload = self.get_json(url).await?;
		self.decode("height", payload)
	}

	async fn get_address(&self, address: &str) -> Result<AddressResponse, LedgerError> {
		let url = self.endpoint(&["address", address])?;
		let payload = self.get_json(url).await?;
		debug!("Address response for {}: {}", address, payload);
		self.decode("address", payload)
	}

	async fn get_transaction(&self, txid: &str) -> Result<TransactionResponse, LedgerError> {
		let url = self.endpoint(&["transaction", txid])?;
		let payload = self.get_json(url).await?;
		debug!("Transaction response for {}: {}", txid, payload);
		self.decode("transaction", payload)
	}

	async fn post_spend(&self, params: &ProtocolParams) -> Result<SpendResponse, LedgerError> {
		let url = self.endpoint(&["spend"])?;

		let response = self
			.http_client
			.post(url.clone())
			.header("Accept", "application/json")
			.json(params)
			.send()
			.await?;

		if !response.status().is_success() {
			return Err(LedgerError::StatusError {
				status: response.status().as_u16(),
				url: url.to_string(),
			});
		}

		let payload: serde_json::Value = response.json().await?;
		self.decode("spend", payload)
	}
}
