//! Minimal JSON-RPC 2.0 client shared by the ledger implementations.

use crate::DeliveryError;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};

pub struct JsonRpcClient {
	url: String,
	client: reqwest::Client,
	next_id: AtomicU64,
}

impl JsonRpcClient {
	pub fn new(url: impl Into<String>) -> Self {
		Self {
			url: url.into(),
			client: reqwest::Client::new(),
			next_id: AtomicU64::new(1),
		}
	}

	pub fn url(&self) -> &str {
		&self.url
	}

	/// Calls `method` and returns the raw `result` member, which may be null.
	pub async fn call_raw(&self, method: &str, params: Value) -> Result<Value, DeliveryError> {
		let id = self.next_id.fetch_add(1, Ordering::Relaxed);
		let payload = json!({
			"jsonrpc": "2.0",
			"id": id,
			"method": method,
			"params": params,
		});

		tracing::trace!(method, id, "JSON-RPC request");

		let response = self
			.client
			.post(&self.url)
			.json(&payload)
			.send()
			.await
			.map_err(|e| DeliveryError::Network(format!("{} request failed: {}", method, e)))?;

		if !response.status().is_success() {
			return Err(DeliveryError::Network(format!(
				"{} returned HTTP {}",
				method,
				response.status()
			)));
		}

		let mut body: Value = response
			.json()
			.await
			.map_err(|e| DeliveryError::InvalidResponse(format!("{}: {}", method, e)))?;

		if let Some(error) = body.get("error").filter(|e| !e.is_null()) {
			let message = error
				.get("message")
				.and_then(|m| m.as_str())
				.map(str::to_string)
				.unwrap_or_else(|| error.to_string());
			return Err(DeliveryError::Rpc(format!("{}: {}", method, message)));
		}

		Ok(body.get_mut("result").map(Value::take).unwrap_or(Value::Null))
	}

	/// Calls `method` and deserializes its `result`.
	pub async fn call<T: DeserializeOwned>(
		&self,
		method: &str,
		params: Value,
	) -> Result<T, DeliveryError> {
		let result = self.call_raw(method, params).await?;
		serde_json::from_value(result)
			.map_err(|e| DeliveryError::InvalidResponse(format!("{}: {}", method, e)))
	}
}

/// Parses a `0x`-prefixed hex quantity.
pub fn parse_quantity(value: &str) -> Result<u128, DeliveryError> {
	let digits = value.strip_prefix("0x").unwrap_or(value);
	if digits.is_empty() {
		return Ok(0);
	}
	u128::from_str_radix(digits, 16)
		.map_err(|e| DeliveryError::InvalidResponse(format!("bad quantity '{}': {}", value, e)))
}

pub fn to_quantity(value: u128) -> String {
	format!("0x{:x}", value)
}

#[cfg(test)]
mod tests {
	use super::*;
	use wiremock::matchers::{body_partial_json, method};
	use wiremock::{Mock, MockServer, ResponseTemplate};

	#[test]
	fn test_quantities() {
		assert_eq!(parse_quantity("0x1a").unwrap(), 26);
		assert_eq!(parse_quantity("0x").unwrap(), 0);
		assert!(parse_quantity("0xzz").is_err());
		assert_eq!(to_quantity(26), "0x1a");
	}

	#[tokio::test]
	async fn test_result_and_error_members() {
		let server = MockServer::start().await;
		Mock::given(method("POST"))
			.and(body_partial_json(json!({ "method": "eth_chainId" })))
			.respond_with(
				ResponseTemplate::new(200)
					.set_body_json(json!({ "jsonrpc": "2.0", "id": 1, "result": "0xe9ac0ce" })),
			)
			.mount(&server)
			.await;
		Mock::given(method("POST"))
			.and(body_partial_json(json!({ "method": "eth_fail" })))
			.respond_with(ResponseTemplate::new(200).set_body_json(json!({
				"jsonrpc": "2.0",
				"id": 2,
				"error": { "code": -32000, "message": "boom" }
			})))
			.mount(&server)
			.await;

		let client = JsonRpcClient::new(server.uri());
		let chain: String = client.call("eth_chainId", json!([])).await.unwrap();
		assert_eq!(parse_quantity(&chain).unwrap(), 245022926);

		let err = client.call::<String>("eth_fail", json!([])).await.unwrap_err();
		assert!(matches!(err, DeliveryError::Rpc(message) if message.contains("boom")));
	}
}
