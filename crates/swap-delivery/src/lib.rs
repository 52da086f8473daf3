//! Ledger access for the swap service.
//!
//! Two ledgers are involved. The holding ledger keeps token balances, answers
//! the faucet's metadata and balance queries, and records the anchor
//! transaction that registers a step tree. The execution ledger runs the
//! scheduled steps and reports their progress. Both are reached through
//! interface traits so tests can substitute in-memory ledgers, and every call
//! made through [`DeliveryService`] is bounded by a timeout.

use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use swap_types::{
	Address, ConfigSchema, FeeEstimate, ScheduledStep, StepDraft, TransactionHash, TreeStatus,
};
use thiserror::Error;

pub mod implementations {
	pub mod execution;
	pub mod holding;
	pub mod rpc;
}

#[cfg(any(test, feature = "test-helpers"))]
pub mod mocks;

#[derive(Debug, Error)]
pub enum DeliveryError {
	#[error("Network error: {0}")]
	Network(String),
	#[error("RPC error: {0}")]
	Rpc(String),
	#[error("Invalid response: {0}")]
	InvalidResponse(String),
	#[error("Transaction rejected: {0}")]
	Rejected(String),
	#[error("{operation} timed out after {after:?}")]
	Timeout {
		operation: &'static str,
		after: Duration,
	},
	#[error("Configuration error: {0}")]
	Configuration(String),
}

/// Mint facts needed to build a transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenMetadata {
	pub mint: String,
	pub decimals: u8,
	/// Program that owns the mint and its token accounts.
	pub token_program: String,
}

/// Registration of a step tree on the holding ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnchorRequest {
	pub payer: Address,
	pub nonce: u64,
	pub chain_id: u64,
	pub steps: Vec<ScheduledStep>,
}

#[async_trait]
pub trait HoldingLedgerInterface: Send + Sync {
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Mint metadata, or `None` when the mint does not exist.
	async fn token_metadata(&self, mint: &str) -> Result<Option<TokenMetadata>, DeliveryError>;

	/// Whole-token balance of `owner` for `mint`, or `None` when the owner has
	/// no token account for it yet.
	async fn token_balance(&self, owner: &str, mint: &str)
		-> Result<Option<Decimal>, DeliveryError>;

	/// Recent block reference a new transaction must carry.
	async fn latest_recency_token(&self) -> Result<String, DeliveryError>;

	/// Signs and sends the anchor transaction, returning its signature once
	/// the ledger has confirmed it.
	async fn submit_anchor(&self, anchor: &AnchorRequest) -> Result<String, DeliveryError>;
}

#[async_trait]
pub trait ExecutionLedgerInterface: Send + Sync {
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	fn chain_id(&self) -> u64;

	async fn transaction_count(&self, payer: &Address) -> Result<u64, DeliveryError>;

	/// Estimates fees for a whole step sequence in one call.
	async fn estimate_fees(
		&self,
		payer: &Address,
		nonce: u64,
		drafts: &[StepDraft],
	) -> Result<FeeEstimate, DeliveryError>;

	async fn submit_step(
		&self,
		step: &ScheduledStep,
		nonce: u64,
	) -> Result<TransactionHash, DeliveryError>;

	/// Current tree status, or `None` when the ledger no longer has the tree.
	async fn tree_status(
		&self,
		payer: &Address,
		nonce: u64,
	) -> Result<Option<TreeStatus>, DeliveryError>;
}

/// Timeout applied to a ledger call.
async fn bounded<T, F>(operation: &'static str, after: Duration, call: F) -> Result<T, DeliveryError>
where
	F: Future<Output = Result<T, DeliveryError>>,
{
	tokio::time::timeout(after, call)
		.await
		.map_err(|_| DeliveryError::Timeout { operation, after })?
}

/// Both ledgers behind one handle.
pub struct DeliveryService {
	holding: Box<dyn HoldingLedgerInterface>,
	execution: Box<dyn ExecutionLedgerInterface>,
	call_timeout: Duration,
	confirmation_timeout: Duration,
}

impl DeliveryService {
	pub fn new(
		holding: Box<dyn HoldingLedgerInterface>,
		execution: Box<dyn ExecutionLedgerInterface>,
		call_timeout: Duration,
		confirmation_timeout: Duration,
	) -> Self {
		Self {
			holding,
			execution,
			call_timeout,
			confirmation_timeout,
		}
	}

	pub fn chain_id(&self) -> u64 {
		self.execution.chain_id()
	}

	pub async fn token_metadata(&self, mint: &str) -> Result<Option<TokenMetadata>, DeliveryError> {
		bounded(
			"token_metadata",
			self.call_timeout,
			self.holding.token_metadata(mint),
		)
		.await
	}

	pub async fn token_balance(
		&self,
		owner: &str,
		mint: &str,
	) -> Result<Option<Decimal>, DeliveryError> {
		bounded(
			"token_balance",
			self.call_timeout,
			self.holding.token_balance(owner, mint),
		)
		.await
	}

	pub async fn latest_recency_token(&self) -> Result<String, DeliveryError> {
		bounded(
			"latest_recency_token",
			self.call_timeout,
			self.holding.latest_recency_token(),
		)
		.await
	}

	pub async fn submit_anchor(&self, anchor: &AnchorRequest) -> Result<String, DeliveryError> {
		bounded(
			"submit_anchor",
			self.confirmation_timeout,
			self.holding.submit_anchor(anchor),
		)
		.await
	}

	pub async fn transaction_count(&self, payer: &Address) -> Result<u64, DeliveryError> {
		bounded(
			"transaction_count",
			self.call_timeout,
			self.execution.transaction_count(payer),
		)
		.await
	}

	pub async fn estimate_fees(
		&self,
		payer: &Address,
		nonce: u64,
		drafts: &[StepDraft],
	) -> Result<FeeEstimate, DeliveryError> {
		bounded(
			"estimate_fees",
			self.call_timeout,
			self.execution.estimate_fees(payer, nonce, drafts),
		)
		.await
	}

	pub async fn submit_step(
		&self,
		step: &ScheduledStep,
		nonce: u64,
	) -> Result<TransactionHash, DeliveryError> {
		bounded(
			"submit_step",
			self.call_timeout,
			self.execution.submit_step(step, nonce),
		)
		.await
	}

	pub async fn tree_status(
		&self,
		payer: &Address,
		nonce: u64,
	) -> Result<Option<TreeStatus>, DeliveryError> {
		bounded(
			"tree_status",
			self.call_timeout,
			self.execution.tree_status(payer, nonce),
		)
		.await
	}
}
