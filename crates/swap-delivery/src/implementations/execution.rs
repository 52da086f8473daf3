//! Execution-ledger access through an alloy provider.
//!
//! Standard `eth_` methods cover nonces. Fee estimation, scheduled step
//! submission and tree status go through ledger-specific methods whose names
//! are configurable per deployment, sent as raw requests on the same provider.

use crate::implementations::rpc::{parse_quantity, to_quantity};
use crate::{DeliveryError, ExecutionLedgerInterface};
use alloy_provider::{Provider, RootProvider};
use alloy_transport::{RpcError, TransportErrorKind};
use alloy_transport_http::Http;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use std::borrow::Cow;
use std::fmt::Debug;
use swap_types::{
	Address, ConfigSchema, FeeEstimate, Field, FieldType, ScheduledStep, Schema, StepDraft,
	StepStatus, TransactionHash, TreeStatus, TreeStepStatus, ValidationError,
};
use tracing::{debug, warn};

pub const DEFAULT_ESTIMATE_METHOD: &str = "neon_estimateScheduledGas";
pub const DEFAULT_SUBMIT_METHOD: &str = "neon_sendRawScheduledTransaction";
pub const DEFAULT_TREE_METHOD: &str = "neon_getScheduledTreeAccount";

/// Ledger-specific method names.
#[derive(Debug, Clone)]
pub struct ScheduleMethods {
	pub estimate: String,
	pub submit: String,
	pub tree: String,
}

impl Default for ScheduleMethods {
	fn default() -> Self {
		Self {
			estimate: DEFAULT_ESTIMATE_METHOD.to_string(),
			submit: DEFAULT_SUBMIT_METHOD.to_string(),
			tree: DEFAULT_TREE_METHOD.to_string(),
		}
	}
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireEstimate {
	max_fee_per_gas: String,
	max_priority_fee_per_gas: String,
	gas_list: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireTree {
	status: String,
	#[serde(default)]
	transactions: Vec<WireTreeTransaction>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireTreeTransaction {
	status: String,
	#[serde(default)]
	transaction_hash: Option<String>,
	#[serde(default)]
	error: Option<String>,
}

fn parse_status(raw: &str) -> StepStatus {
	match raw {
		"NotStarted" => StepStatus::NotStarted,
		"InProgress" => StepStatus::InProgress,
		"Success" => StepStatus::Success,
		"Empty" => StepStatus::Empty,
		"Failed" => StepStatus::Failed,
		"Skipped" => StepStatus::Skipped,
		other => {
			warn!(status = other, "Unrecognised step status, treating as in progress");
			StepStatus::InProgress
		}
	}
}

impl WireTree {
	fn into_status(self) -> Result<TreeStatus, DeliveryError> {
		let steps = self
			.transactions
			.into_iter()
			.enumerate()
			.map(|(index, tx)| {
				let tx_hash = match tx.transaction_hash.filter(|h| !h.is_empty()) {
					Some(hash) => Some(hash.parse::<TransactionHash>().map_err(|e| {
						DeliveryError::InvalidResponse(format!("bad hash '{}': {}", hash, e))
					})?),
					None => None,
				};
				Ok(TreeStepStatus {
					index,
					status: parse_status(&tx.status),
					tx_hash,
					error: tx.error,
				})
			})
			.collect::<Result<Vec<_>, DeliveryError>>()?;

		Ok(TreeStatus {
			active_status: self.status,
			steps,
		})
	}
}

fn rpc_error(method: &str, err: RpcError<TransportErrorKind>) -> DeliveryError {
	match err {
		RpcError::ErrorResp(payload) => {
			DeliveryError::Rpc(format!("{}: {}", method, payload.message))
		}
		RpcError::DeserError { err, .. } => {
			DeliveryError::InvalidResponse(format!("{}: {}", method, err))
		}
		other => DeliveryError::Network(format!("{} request failed: {}", method, other)),
	}
}

pub struct RpcExecutionLedger {
	provider: RootProvider<Http<reqwest::Client>>,
	chain_id: u64,
	methods: ScheduleMethods,
}

impl RpcExecutionLedger {
	pub fn new(rpc_url: &str, chain_id: u64) -> Result<Self, DeliveryError> {
		let url = rpc_url
			.parse()
			.map_err(|e| DeliveryError::Configuration(format!("Invalid RPC URL: {}", e)))?;

		Ok(Self {
			provider: RootProvider::new_http(url),
			chain_id,
			methods: ScheduleMethods::default(),
		})
	}

	pub fn with_methods(mut self, methods: ScheduleMethods) -> Self {
		self.methods = methods;
		self
	}

	/// Sends a ledger-specific method the provider has no typed call for.
	async fn request<R>(&self, method: &str, params: Value) -> Result<R, DeliveryError>
	where
		R: DeserializeOwned + Debug + Send + Sync + Unpin + 'static,
	{
		self.provider
			.raw_request(Cow::Owned(method.to_string()), params)
			.await
			.map_err(|e| rpc_error(method, e))
	}
}

pub struct RpcExecutionLedgerSchema;

impl ConfigSchema for RpcExecutionLedgerSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		let schema = Schema::new(
			vec![
				Field::new("rpc_url", FieldType::Url),
				Field::new(
					"chain_id",
					FieldType::Integer {
						min: Some(1),
						max: None,
					},
				),
			],
			vec![
				Field::new("estimate_method", FieldType::String),
				Field::new("submit_method", FieldType::String),
				Field::new("tree_method", FieldType::String),
			],
		);

		schema.validate(config)
	}
}

#[async_trait]
impl ExecutionLedgerInterface for RpcExecutionLedger {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(RpcExecutionLedgerSchema)
	}

	fn chain_id(&self) -> u64 {
		self.chain_id
	}

	async fn transaction_count(&self, payer: &Address) -> Result<u64, DeliveryError> {
		self.provider
			.get_transaction_count(payer.to_alloy())
			.await
			.map_err(|e| rpc_error("eth_getTransactionCount", e))
	}

	async fn estimate_fees(
		&self,
		payer: &Address,
		nonce: u64,
		drafts: &[StepDraft],
	) -> Result<FeeEstimate, DeliveryError> {
		let transactions: Vec<_> = drafts
			.iter()
			.map(|draft| {
				json!({
					"to": draft.to.to_string(),
					"data": format!("0x{}", hex::encode(&draft.payload)),
				})
			})
			.collect();

		let wire: WireEstimate = self
			.request(
				&self.methods.estimate,
				json!([{
					"from": payer.to_string(),
					"nonce": to_quantity(nonce as u128),
					"chainId": to_quantity(self.chain_id as u128),
					"transactions": transactions,
				}]),
			)
			.await?;

		let gas_limits = wire
			.gas_list
			.iter()
			.map(|gas| {
				let gas = parse_quantity(gas)?;
				u64::try_from(gas)
					.map_err(|_| DeliveryError::InvalidResponse(format!("gas {} out of range", gas)))
			})
			.collect::<Result<Vec<_>, _>>()?;

		debug!(steps = drafts.len(), "Fee estimate received");

		Ok(FeeEstimate {
			max_fee_per_gas: parse_quantity(&wire.max_fee_per_gas)?,
			max_priority_fee_per_gas: parse_quantity(&wire.max_priority_fee_per_gas)?,
			gas_limits,
		})
	}

	async fn submit_step(
		&self,
		step: &ScheduledStep,
		nonce: u64,
	) -> Result<TransactionHash, DeliveryError> {
		let hash: String = self
			.request(
				&self.methods.submit,
				json!([{
					"index": step.index,
					"from": step.from.to_string(),
					"to": step.to.to_string(),
					"data": format!("0x{}", hex::encode(&step.payload)),
					"gasLimit": to_quantity(step.gas_limit as u128),
					"maxFeePerGas": to_quantity(step.max_fee_per_gas),
					"maxPriorityFeePerGas": to_quantity(step.max_priority_fee_per_gas),
					"chainId": to_quantity(step.chain_id as u128),
					"nonce": to_quantity(nonce as u128),
				}]),
			)
			.await?;

		hash.parse::<TransactionHash>()
			.map_err(|e| DeliveryError::InvalidResponse(format!("bad hash '{}': {}", hash, e)))
	}

	async fn tree_status(
		&self,
		payer: &Address,
		nonce: u64,
	) -> Result<Option<TreeStatus>, DeliveryError> {
		let wire: Option<WireTree> = self
			.request(
				&self.methods.tree,
				json!([payer.to_string(), to_quantity(nonce as u128)]),
			)
			.await?;

		wire.map(WireTree::into_status).transpose()
	}
}

/// Creates the execution-ledger client from its `[execution_ledger]` table.
pub fn create_execution_ledger(
	config: &toml::Value,
) -> Result<Box<dyn ExecutionLedgerInterface>, DeliveryError> {
	RpcExecutionLedgerSchema
		.validate(config)
		.map_err(|e| DeliveryError::Configuration(e.to_string()))?;

	let rpc_url = config
		.get("rpc_url")
		.and_then(|v| v.as_str())
		.ok_or_else(|| DeliveryError::Configuration("rpc_url is required".into()))?;
	let chain_id = config
		.get("chain_id")
		.and_then(|v| v.as_integer())
		.ok_or_else(|| DeliveryError::Configuration("chain_id is required".into()))? as u64;

	let defaults = ScheduleMethods::default();
	let method = |key: &str, fallback: String| {
		config
			.get(key)
			.and_then(|v| v.as_str())
			.map(str::to_string)
			.unwrap_or(fallback)
	};
	let methods = ScheduleMethods {
		estimate: method("estimate_method", defaults.estimate),
		submit: method("submit_method", defaults.submit),
		tree: method("tree_method", defaults.tree),
	};

	Ok(Box::new(
		RpcExecutionLedger::new(rpc_url, chain_id)?.with_methods(methods),
	))
}
