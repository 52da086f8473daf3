//! Scheduled step types.
//!
//! A swap is an ordered sequence of steps executed on the execution ledger.
//! Drafts carry only target and calldata; once fees are known they become
//! immutable [`ScheduledStep`]s. The ledger reports progress per step through
//! a [`TreeStatus`].

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::{Address, TransactionHash};

/// `0x`-prefixed hex (de)serialization for calldata.
pub mod hex_bytes {
	use super::*;

	pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
		serializer.serialize_str(&format!("0x{}", hex::encode(bytes)))
	}

	pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
		let s = String::deserialize(deserializer)?;
		hex::decode(s.strip_prefix("0x").unwrap_or(&s)).map_err(serde::de::Error::custom)
	}
}

/// Step target and calldata, before fees are attached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepDraft {
	pub index: usize,
	pub to: Address,
	#[serde(with = "hex_bytes")]
	pub payload: Vec<u8>,
}

/// Fee parameters for a whole step sequence, from one estimation call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeeEstimate {
	pub max_fee_per_gas: u128,
	pub max_priority_fee_per_gas: u128,
	/// One entry per step, in index order.
	pub gas_limits: Vec<u64>,
}

/// One cross-ledger operation. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduledStep {
	/// Position in the sequence, 0-based and contiguous.
	pub index: usize,
	pub from: Address,
	pub to: Address,
	#[serde(with = "hex_bytes")]
	pub payload: Vec<u8>,
	pub gas_limit: u64,
	pub max_fee_per_gas: u128,
	pub max_priority_fee_per_gas: u128,
	pub chain_id: u64,
}

/// Lifecycle of a single step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StepStatus {
	NotStarted,
	InProgress,
	Success,
	/// Executed without effect. Terminal, kept distinct from `Success`.
	Empty,
	Failed,
	Skipped,
}

impl StepStatus {
	pub fn is_terminal(&self) -> bool {
		matches!(
			self,
			StepStatus::Success | StepStatus::Empty | StepStatus::Failed | StepStatus::Skipped
		)
	}

	/// Terminal states a caller may restart from.
	pub fn is_restartable(&self) -> bool {
		matches!(
			self,
			StepStatus::Empty | StepStatus::Failed | StepStatus::Skipped
		)
	}
}

/// Last known outcome details of a step.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepResult {
	pub tx_hash: Option<TransactionHash>,
	pub error: Option<String>,
}

/// Caller-visible state of a step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepState {
	pub status: StepStatus,
	pub result: Option<StepResult>,
}

impl Default for StepState {
	fn default() -> Self {
		Self {
			status: StepStatus::NotStarted,
			result: None,
		}
	}
}

/// Per-step entry of a tree status report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeStepStatus {
	pub index: usize,
	pub status: StepStatus,
	#[serde(default)]
	pub tx_hash: Option<TransactionHash>,
	#[serde(default)]
	pub error: Option<String>,
}

/// Aggregate status of a scheduled tree as reported by the execution ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeStatus {
	pub active_status: String,
	pub steps: Vec<TreeStepStatus>,
}
