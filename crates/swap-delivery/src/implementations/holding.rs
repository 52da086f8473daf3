//! Holding-ledger access over JSON-RPC.

use crate::implementations::rpc::JsonRpcClient;
use crate::{AnchorRequest, DeliveryError, HoldingLedgerInterface, TokenMetadata};
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use rust_decimal::Decimal;
use serde::Serialize;
use serde_json::{json, Value};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use swap_account::AccountService;
use swap_types::{ConfigSchema, Field, FieldType, Schema, ValidationError};
use tracing::{debug, info};

const DEFAULT_COMMITMENT: &str = "confirmed";
const DEFAULT_CONFIRM_INTERVAL_MS: u64 = 500;

/// Anchor transaction body as signed by the operator account.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct AnchorMessage<'a> {
	#[serde(flatten)]
	anchor: &'a AnchorRequest,
	fee_payer: String,
	recency_token: String,
}

pub struct RpcHoldingLedger {
	rpc: JsonRpcClient,
	account: Arc<AccountService>,
	commitment: String,
	confirm_interval: Duration,
}

impl RpcHoldingLedger {
	pub fn new(rpc_url: &str, account: Arc<AccountService>) -> Self {
		Self {
			rpc: JsonRpcClient::new(rpc_url),
			account,
			commitment: DEFAULT_COMMITMENT.to_string(),
			confirm_interval: Duration::from_millis(DEFAULT_CONFIRM_INTERVAL_MS),
		}
	}

	pub fn with_commitment(mut self, commitment: impl Into<String>) -> Self {
		self.commitment = commitment.into();
		self
	}

	pub fn with_confirm_interval(mut self, interval: Duration) -> Self {
		self.confirm_interval = interval;
		self
	}

	/// Waits until the ledger reports `signature` at the configured commitment.
	/// The caller bounds the wait.
	async fn await_confirmation(&self, signature: &str) -> Result<(), DeliveryError> {
		loop {
			let result = self
				.rpc
				.call_raw("getSignatureStatuses", json!([[signature]]))
				.await?;
			let status = &result["value"][0];

			if !status.is_null() {
				if !status["err"].is_null() {
					return Err(DeliveryError::Rejected(format!(
						"anchor {} failed: {}",
						signature, status["err"]
					)));
				}
				let level = status["confirmationStatus"].as_str().unwrap_or_default();
				if level == self.commitment || level == "finalized" {
					return Ok(());
				}
			}

			debug!(signature, "Anchor not yet confirmed");
			tokio::time::sleep(self.confirm_interval).await;
		}
	}
}

pub struct RpcHoldingLedgerSchema;

impl ConfigSchema for RpcHoldingLedgerSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![Field::new("rpc_url", FieldType::Url)],
			vec![
				Field::new("commitment", FieldType::String),
				Field::new(
					"confirm_interval_ms",
					FieldType::Integer {
						min: Some(50),
						max: Some(60_000),
					},
				),
			],
		);

		schema.validate(config)
	}
}

#[async_trait]
impl HoldingLedgerInterface for RpcHoldingLedger {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(RpcHoldingLedgerSchema)
	}

	async fn token_metadata(&self, mint: &str) -> Result<Option<TokenMetadata>, DeliveryError> {
		let result = self
			.rpc
			.call_raw(
				"getAccountInfo",
				json!([mint, { "encoding": "jsonParsed", "commitment": self.commitment }]),
			)
			.await?;

		let account = &result["value"];
		if account.is_null() || account["data"]["parsed"]["type"] != "mint" {
			return Ok(None);
		}

		let decimals = account["data"]["parsed"]["info"]["decimals"]
			.as_u64()
			.and_then(|d| u8::try_from(d).ok())
			.ok_or_else(|| DeliveryError::InvalidResponse(format!("mint {} has no decimals", mint)))?;
		let token_program = account["owner"].as_str().unwrap_or_default().to_string();

		Ok(Some(TokenMetadata {
			mint: mint.to_string(),
			decimals,
			token_program,
		}))
	}

	async fn token_balance(
		&self,
		owner: &str,
		mint: &str,
	) -> Result<Option<Decimal>, DeliveryError> {
		let result = self
			.rpc
			.call_raw(
				"getTokenAccountsByOwner",
				json!([
					owner,
					{ "mint": mint },
					{ "encoding": "jsonParsed", "commitment": self.commitment }
				]),
			)
			.await?;

		let first = match result["value"].as_array().and_then(|a| a.first()) {
			Some(account) => account,
			None => return Ok(None),
		};

		let amount = first["account"]["data"]["parsed"]["info"]["tokenAmount"]["uiAmountString"]
			.as_str()
			.ok_or_else(|| {
				DeliveryError::InvalidResponse(format!("token account of {} has no amount", owner))
			})?;

		Decimal::from_str(amount)
			.map(Some)
			.map_err(|e| DeliveryError::InvalidResponse(format!("bad amount '{}': {}", amount, e)))
	}

	async fn latest_recency_token(&self) -> Result<String, DeliveryError> {
		let result: Value = self
			.rpc
			.call("getLatestBlockhash", json!([{ "commitment": self.commitment }]))
			.await?;

		result["value"]["blockhash"]
			.as_str()
			.map(str::to_string)
			.ok_or_else(|| DeliveryError::InvalidResponse("missing blockhash".into()))
	}

	async fn submit_anchor(&self, anchor: &AnchorRequest) -> Result<String, DeliveryError> {
		let recency_token = self.latest_recency_token().await?;
		let message = AnchorMessage {
			anchor,
			fee_payer: self.account.identity(),
			recency_token,
		};
		let message_bytes = serde_json::to_vec(&message)
			.map_err(|e| DeliveryError::InvalidResponse(format!("encode anchor: {}", e)))?;

		let signature = self
			.account
			.sign(&message_bytes)
			.await
			.map_err(|e| DeliveryError::Rejected(e.to_string()))?;

		let transaction = json!({
			"message": STANDARD.encode(&message_bytes),
			"signatures": [signature.to_hex()],
		});
		let wire = STANDARD.encode(transaction.to_string());

		let tx_signature: String = self
			.rpc
			.call(
				"sendTransaction",
				json!([wire, { "encoding": "base64", "preflightCommitment": self.commitment }]),
			)
			.await?;

		info!(
			payer = %anchor.payer,
			nonce = anchor.nonce,
			signature = %tx_signature,
			"Anchor transaction sent"
		);

		self.await_confirmation(&tx_signature).await?;
		Ok(tx_signature)
	}
}

/// Creates the holding-ledger client from its `[holding_ledger]` table.
pub fn create_holding_ledger(
	config: &toml::Value,
	account: Arc<AccountService>,
) -> Result<Box<dyn HoldingLedgerInterface>, DeliveryError> {
	RpcHoldingLedgerSchema
		.validate(config)
		.map_err(|e| DeliveryError::Configuration(e.to_string()))?;

	let rpc_url = config
		.get("rpc_url")
		.and_then(|v| v.as_str())
		.ok_or_else(|| DeliveryError::Configuration("rpc_url is required".into()))?;

	let mut ledger = RpcHoldingLedger::new(rpc_url, account);
	if let Some(commitment) = config.get("commitment").and_then(|v| v.as_str()) {
		ledger = ledger.with_commitment(commitment);
	}
	if let Some(ms) = config.get("confirm_interval_ms").and_then(|v| v.as_integer()) {
		ledger = ledger.with_confirm_interval(Duration::from_millis(ms as u64));
	}

	Ok(Box::new(ledger))
}

#[cfg(test)]
mod tests {
	use super::*;
	use swap_account::implementations::local::LocalWallet;
	use swap_types::Address;
	use wiremock::matchers::{body_partial_json, method};
	use wiremock::{Mock, MockServer, ResponseTemplate};

	const TEST_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";

	fn account() -> Arc<AccountService> {
		Arc::new(AccountService::new(Box::new(
			LocalWallet::new(TEST_KEY).unwrap(),
		)))
	}

	async fn respond(server: &MockServer, rpc_method: &str, result: Value) {
		Mock::given(method("POST"))
			.and(body_partial_json(json!({ "method": rpc_method })))
			.respond_with(
				ResponseTemplate::new(200)
					.set_body_json(json!({ "jsonrpc": "2.0", "id": 1, "result": result })),
			)
			.mount(server)
			.await;
	}

	#[tokio::test]
	async fn test_token_metadata() {
		let server = MockServer::start().await;
		respond(
			&server,
			"getAccountInfo",
			json!({
				"context": { "slot": 1 },
				"value": {
					"owner": "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA",
					"data": { "parsed": { "type": "mint", "info": { "decimals": 6 } } }
				}
			}),
		)
		.await;

		let ledger = RpcHoldingLedger::new(&server.uri(), account());
		let metadata = ledger.token_metadata("mint-usdc").await.unwrap().unwrap();
		assert_eq!(metadata.decimals, 6);
		assert_eq!(
			metadata.token_program,
			"TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA"
		);
	}

	#[tokio::test]
	async fn test_missing_mint_is_none() {
		let server = MockServer::start().await;
		respond(
			&server,
			"getAccountInfo",
			json!({ "context": { "slot": 1 }, "value": null }),
		)
		.await;

		let ledger = RpcHoldingLedger::new(&server.uri(), account());
		assert!(ledger.token_metadata("nope").await.unwrap().is_none());
	}

	#[tokio::test]
	async fn test_token_balance_present_and_absent() {
		let server = MockServer::start().await;
		respond(
			&server,
			"getTokenAccountsByOwner",
			json!({ "value": [{
				"pubkey": "ata",
				"account": { "data": { "parsed": { "info": {
					"tokenAmount": { "uiAmountString": "12.5" }
				} } } }
			}] }),
		)
		.await;
		let ledger = RpcHoldingLedger::new(&server.uri(), account());
		assert_eq!(
			ledger.token_balance("holder", "mint").await.unwrap(),
			Some(Decimal::from_str("12.5").unwrap())
		);

		let empty = MockServer::start().await;
		respond(&empty, "getTokenAccountsByOwner", json!({ "value": [] })).await;
		let ledger = RpcHoldingLedger::new(&empty.uri(), account());
		assert_eq!(ledger.token_balance("newcomer", "mint").await.unwrap(), None);
	}

	#[tokio::test]
	async fn test_submit_anchor_waits_for_confirmation() {
		let server = MockServer::start().await;
		respond(
			&server,
			"getLatestBlockhash",
			json!({ "value": { "blockhash": "EkSnNWid2cvwEVnVx9aBqawnmiCNiDgp3gUdkDPTKN1N" } }),
		)
		.await;
		respond(&server, "sendTransaction", json!("anchor-sig")).await;
		respond(
			&server,
			"getSignatureStatuses",
			json!({ "value": [{ "confirmationStatus": "confirmed", "err": null }] }),
		)
		.await;

		let ledger = RpcHoldingLedger::new(&server.uri(), account());
		let anchor = AnchorRequest {
			payer: Address(vec![9; 20]),
			nonce: 4,
			chain_id: 245022926,
			steps: vec![],
		};
		assert_eq!(ledger.submit_anchor(&anchor).await.unwrap(), "anchor-sig");
	}

	#[tokio::test]
	async fn test_failed_anchor_is_rejected() {
		let server = MockServer::start().await;
		respond(
			&server,
			"getLatestBlockhash",
			json!({ "value": { "blockhash": "hash" } }),
		)
		.await;
		respond(&server, "sendTransaction", json!("anchor-sig")).await;
		respond(
			&server,
			"getSignatureStatuses",
			json!({ "value": [{ "confirmationStatus": "processed", "err": { "InstructionError": [0, "Custom"] } }] }),
		)
		.await;

		let ledger = RpcHoldingLedger::new(&server.uri(), account());
		let anchor = AnchorRequest {
			payer: Address(vec![9; 20]),
			nonce: 4,
			chain_id: 245022926,
			steps: vec![],
		};
		assert!(matches!(
			ledger.submit_anchor(&anchor).await,
			Err(DeliveryError::Rejected(_))
		));
	}

	#[test]
	fn test_factory_validates_table() {
		let bad: toml::Value = toml::from_str(r#"rpc_url = "ws://node""#).unwrap();
		assert!(matches!(
			create_holding_ledger(&bad, account()),
			Err(DeliveryError::Configuration(_))
		));

		let good: toml::Value = toml::from_str(
			r#"
			rpc_url = "https://api.devnet.solana.com"
			commitment = "finalized"
			"#,
		)
		.unwrap();
		assert!(create_holding_ledger(&good, account()).is_ok());
	}
}
