//! In-memory ledgers for tests.
//!
//! Both ledgers are cheap to clone; clones share state so a test can keep a
//! handle for scripting and inspection after boxing one into a
//! [`DeliveryService`](crate::DeliveryService).

use crate::{
	AnchorRequest, DeliveryError, ExecutionLedgerInterface, HoldingLedgerInterface, TokenMetadata,
};
use async_trait::async_trait;
use rust_decimal::Decimal;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use swap_types::{
	Address, ConfigSchema, FeeEstimate, ScheduledStep, Schema, StepDraft, StepStatus,
	TransactionHash, TreeStatus, TreeStepStatus, ValidationError,
};

pub const TOKEN_PROGRAM: &str = "TokenkegQfeZyiNwAJbNbGKPFXCWuBvf9Ss623VQ5DA";

pub struct MemorySchema;

impl ConfigSchema for MemorySchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		Schema::new(vec![], vec![]).validate(config)
	}
}

/// Hash the in-memory execution ledger assigns to a submitted step.
pub fn step_hash(index: usize) -> TransactionHash {
	TransactionHash(vec![0xa0 + index as u8; 32])
}

/// Builds a tree report from per-step statuses.
pub fn tree(statuses: &[StepStatus]) -> TreeStatus {
	TreeStatus {
		active_status: "Active".to_string(),
		steps: statuses
			.iter()
			.enumerate()
			.map(|(index, status)| TreeStepStatus {
				index,
				status: *status,
				tx_hash: status.is_terminal().then(|| step_hash(index)),
				error: (*status == StepStatus::Failed).then(|| "execution reverted".to_string()),
			})
			.collect(),
	}
}

#[derive(Default)]
struct HoldingState {
	mints: HashMap<String, u8>,
	balances: HashMap<(String, String), Decimal>,
	anchors: Vec<AnchorRequest>,
	anchor_error: Option<String>,
	anchor_delay: Duration,
	balance_error: Option<String>,
	recency_calls: u64,
}

#[derive(Clone, Default)]
pub struct MemoryHoldingLedger {
	state: Arc<Mutex<HoldingState>>,
}

impl MemoryHoldingLedger {
	pub fn new() -> Self {
		Self::default()
	}

	fn state(&self) -> MutexGuard<'_, HoldingState> {
		self.state.lock().unwrap()
	}

	pub fn with_mint(self, mint: &str, decimals: u8) -> Self {
		self.state().mints.insert(mint.to_string(), decimals);
		self
	}

	pub fn set_balance(&self, owner: &str, mint: &str, amount: Decimal) {
		self.state()
			.balances
			.insert((owner.to_string(), mint.to_string()), amount);
	}

	pub fn fail_balances(&self, error: Option<&str>) {
		self.state().balance_error = error.map(str::to_string);
	}

	pub fn fail_anchor(&self, error: Option<&str>) {
		self.state().anchor_error = error.map(str::to_string);
	}

	/// Holds every anchor submission for `delay` before answering.
	pub fn delay_anchor(&self, delay: Duration) {
		self.state().anchor_delay = delay;
	}

	pub fn anchors(&self) -> Vec<AnchorRequest> {
		self.state().anchors.clone()
	}
}

#[async_trait]
impl HoldingLedgerInterface for MemoryHoldingLedger {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(MemorySchema)
	}

	async fn token_metadata(&self, mint: &str) -> Result<Option<TokenMetadata>, DeliveryError> {
		Ok(self.state().mints.get(mint).map(|decimals| TokenMetadata {
			mint: mint.to_string(),
			decimals: *decimals,
			token_program: TOKEN_PROGRAM.to_string(),
		}))
	}

	async fn token_balance(
		&self,
		owner: &str,
		mint: &str,
	) -> Result<Option<Decimal>, DeliveryError> {
		let state = self.state();
		if let Some(error) = &state.balance_error {
			return Err(DeliveryError::Network(error.clone()));
		}
		Ok(state
			.balances
			.get(&(owner.to_string(), mint.to_string()))
			.copied())
	}

	async fn latest_recency_token(&self) -> Result<String, DeliveryError> {
		let mut state = self.state();
		state.recency_calls += 1;
		Ok(format!("recency-{}", state.recency_calls))
	}

	async fn submit_anchor(&self, anchor: &AnchorRequest) -> Result<String, DeliveryError> {
		let delay = self.state().anchor_delay;
		if !delay.is_zero() {
			tokio::time::sleep(delay).await;
		}
		let mut state = self.state();
		if let Some(error) = &state.anchor_error {
			return Err(DeliveryError::Rejected(error.clone()));
		}
		state.anchors.push(anchor.clone());
		Ok(format!("anchor-{}-{}", anchor.payer, anchor.nonce))
	}
}

struct ExecutionState {
	next_nonce: u64,
	gas_limit: u64,
	estimate_calls: usize,
	estimate_error: Option<String>,
	short_estimate: bool,
	submissions: Vec<(usize, u64)>,
	failing_steps: Vec<usize>,
	submit_delay: Duration,
	trees: VecDeque<Option<TreeStatus>>,
	tree_errors: usize,
	tree_calls: usize,
}

#[derive(Clone)]
pub struct MemoryExecutionLedger {
	chain_id: u64,
	state: Arc<Mutex<ExecutionState>>,
}

impl MemoryExecutionLedger {
	pub fn new(chain_id: u64) -> Self {
		Self {
			chain_id,
			state: Arc::new(Mutex::new(ExecutionState {
				next_nonce: 0,
				gas_limit: 50_000,
				estimate_calls: 0,
				estimate_error: None,
				short_estimate: false,
				submissions: Vec::new(),
				failing_steps: Vec::new(),
				submit_delay: Duration::ZERO,
				trees: VecDeque::new(),
				tree_errors: 0,
				tree_calls: 0,
			})),
		}
	}

	fn state(&self) -> MutexGuard<'_, ExecutionState> {
		self.state.lock().unwrap()
	}

	pub fn set_next_nonce(&self, nonce: u64) {
		self.state().next_nonce = nonce;
	}

	pub fn fail_estimates(&self, error: Option<&str>) {
		self.state().estimate_error = error.map(str::to_string);
	}

	/// Makes estimates return one gas limit fewer than requested.
	pub fn short_estimates(&self, short: bool) {
		self.state().short_estimate = short;
	}

	pub fn fail_step(&self, index: usize) {
		self.state().failing_steps.push(index);
	}

	pub fn heal_step(&self, index: usize) {
		self.state().failing_steps.retain(|i| *i != index);
	}

	/// Holds every step submission for `delay` before answering.
	pub fn delay_submissions(&self, delay: Duration) {
		self.state().submit_delay = delay;
	}

	/// Queues tree reports. The last queued report repeats once the queue
	/// drains; with nothing queued the tree is reported missing.
	pub fn push_tree(&self, report: Option<TreeStatus>) {
		self.state().trees.push_back(report);
	}

	/// Drops queued reports and reports `report` from now on.
	pub fn set_tree(&self, report: Option<TreeStatus>) {
		let mut state = self.state();
		state.trees.clear();
		state.trees.push_back(report);
	}

	/// Fails the next `count` tree queries.
	pub fn fail_tree_queries(&self, count: usize) {
		self.state().tree_errors = count;
	}

	pub fn estimate_calls(&self) -> usize {
		self.state().estimate_calls
	}

	/// `(step index, nonce)` of every accepted submission, in order.
	pub fn submissions(&self) -> Vec<(usize, u64)> {
		self.state().submissions.clone()
	}

	pub fn tree_calls(&self) -> usize {
		self.state().tree_calls
	}
}

#[async_trait]
impl ExecutionLedgerInterface for MemoryExecutionLedger {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(MemorySchema)
	}

	fn chain_id(&self) -> u64 {
		self.chain_id
	}

	async fn transaction_count(&self, _payer: &Address) -> Result<u64, DeliveryError> {
		Ok(self.state().next_nonce)
	}

	async fn estimate_fees(
		&self,
		_payer: &Address,
		_nonce: u64,
		drafts: &[StepDraft],
	) -> Result<FeeEstimate, DeliveryError> {
		let mut state = self.state();
		state.estimate_calls += 1;
		if let Some(error) = &state.estimate_error {
			return Err(DeliveryError::Rpc(error.clone()));
		}
		let count = if state.short_estimate {
			drafts.len().saturating_sub(1)
		} else {
			drafts.len()
		};
		Ok(FeeEstimate {
			max_fee_per_gas: 2_000_000_000,
			max_priority_fee_per_gas: 1_000_000,
			gas_limits: vec![state.gas_limit; count],
		})
	}

	async fn submit_step(
		&self,
		step: &ScheduledStep,
		nonce: u64,
	) -> Result<TransactionHash, DeliveryError> {
		let delay = self.state().submit_delay;
		if !delay.is_zero() {
			tokio::time::sleep(delay).await;
		}
		let mut state = self.state();
		if state.failing_steps.contains(&step.index) {
			return Err(DeliveryError::Network(format!(
				"connection reset submitting step {}",
				step.index
			)));
		}
		state.submissions.push((step.index, nonce));
		Ok(step_hash(step.index))
	}

	async fn tree_status(
		&self,
		_payer: &Address,
		_nonce: u64,
	) -> Result<Option<TreeStatus>, DeliveryError> {
		let mut state = self.state();
		state.tree_calls += 1;
		if state.tree_errors > 0 {
			state.tree_errors -= 1;
			return Err(DeliveryError::Network("temporarily unavailable".into()));
		}
		if state.trees.len() > 1 {
			return Ok(state.trees.pop_front().flatten());
		}
		Ok(state.trees.front().cloned().flatten())
	}
}
