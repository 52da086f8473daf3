//! Swap session types.
//!
//! A session is one swap attempt identified by the execution-ledger payer and
//! the nonce the step tree was scheduled under.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::step::hex_bytes;
use crate::{Address, FeeEstimate, ScheduledStep, StepState};

/// Identity of a swap attempt.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionKey {
	pub payer: Address,
	pub nonce: u64,
}

impl SessionKey {
	pub fn new(payer: Address, nonce: u64) -> Self {
		Self { payer, nonce }
	}
}

impl fmt::Display for SessionKey {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "{}:{}", self.payer, self.nonce)
	}
}

/// Supported swap topologies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "variant", rename_all = "camelCase")]
pub enum SwapPlan {
	/// Claim the bridged input straight into a pair, then swap on the pair.
	#[serde(rename_all = "camelCase")]
	Simple {
		pair: Address,
		token_in: Address,
		/// Holding-ledger token account the input is claimed from (32 bytes).
		#[serde(with = "hex_bytes")]
		claim_source: Vec<u8>,
		amount_in: u64,
		amount_out: u64,
		/// Whether `token_in` is `token0` of the pair.
		token_in_is_token0: bool,
	},
	/// Claim, approve the router, swap, and bridge the output back.
	#[serde(rename_all = "camelCase")]
	Full {
		router: Address,
		token_in: Address,
		token_out: Address,
		#[serde(with = "hex_bytes")]
		claim_source: Vec<u8>,
		amount_in: u64,
		min_amount_out: u64,
		deadline: u64,
		/// Holding-ledger account receiving the output (32 bytes).
		#[serde(with = "hex_bytes")]
		bridge_recipient: Vec<u8>,
	},
}

impl SwapPlan {
	pub fn step_count(&self) -> usize {
		match self {
			SwapPlan::Simple { .. } => 2,
			SwapPlan::Full { .. } => 4,
		}
	}

	pub fn name(&self) -> &'static str {
		match self {
			SwapPlan::Simple { .. } => "simple",
			SwapPlan::Full { .. } => "full",
		}
	}
}

/// Caller request to start a swap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapRequest {
	/// Execution-ledger wallet that pays for and owns the step tree.
	pub payer: Address,
	/// Nonce to schedule under; fetched from the execution ledger when absent.
	#[serde(default)]
	pub nonce: Option<u64>,
	pub plan: SwapPlan,
}

/// Why a polling loop stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PollOutcome {
	/// Every step reached a terminal state.
	Completed,
	/// The ledger no longer reports the tree. Final states are unknown.
	TreeMissing,
	/// The wall-clock limit elapsed. Non-terminal steps stay as observed.
	TimedOut,
	Cancelled,
}

/// Read-only view of a session handed to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
	pub key: SessionKey,
	pub plan: String,
	pub steps: Vec<ScheduledStep>,
	pub anchor_signature: Option<String>,
	pub fees: Option<FeeEstimate>,
	pub states: Vec<StepState>,
	pub polling: bool,
	pub last_outcome: Option<PollOutcome>,
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_plan_from_json() {
		let json = format!(
			r#"{{
				"variant": "full",
				"router": "0x{router}",
				"tokenIn": "0x{token_in}",
				"tokenOut": "0x{token_out}",
				"claimSource": "0x{source}",
				"amountIn": 1000000,
				"minAmountOut": 990000,
				"deadline": 1700000000,
				"bridgeRecipient": "0x{source}"
			}}"#,
			router = "01".repeat(20),
			token_in = "02".repeat(20),
			token_out = "03".repeat(20),
			source = "aa".repeat(32),
		);
		let plan: SwapPlan = serde_json::from_str(&json).unwrap();
		assert_eq!(plan.step_count(), 4);
		assert_eq!(plan.name(), "full");
		match plan {
			SwapPlan::Full {
				claim_source,
				amount_in,
				..
			} => {
				assert_eq!(claim_source.len(), 32);
				assert_eq!(amount_in, 1_000_000);
			}
			other => panic!("unexpected plan {:?}", other),
		}
	}

	#[test]
	fn test_simple_plan_from_json() {
		let json = serde_json::json!({
			"variant": "simple",
			"pair": format!("0x{}", "04".repeat(20)),
			"tokenIn": format!("0x{}", "02".repeat(20)),
			"claimSource": format!("0x{}", "aa".repeat(32)),
			"amountIn": 1_000_000u64,
			"amountOut": 990_000u64,
			"tokenInIsToken0": true,
		});
		let plan: SwapPlan = serde_json::from_value(json).unwrap();
		assert_eq!(plan.step_count(), 2);
		match &plan {
			SwapPlan::Simple { amount_out, .. } => assert_eq!(*amount_out, 990_000),
			other => panic!("unexpected plan {:?}", other),
		}

		// Nested inside a request, the tagged plan is buffered before decoding.
		let request: SwapRequest = serde_json::from_value(serde_json::json!({
			"payer": format!("0x{}", "05".repeat(20)),
			"plan": serde_json::to_value(&plan).unwrap(),
		}))
		.unwrap();
		assert_eq!(request.plan, plan);
		assert_eq!(request.nonce, None);
	}

	#[test]
	fn test_session_key_display() {
		let key = SessionKey::new(Address(vec![0; 20]), 7);
		assert_eq!(key.to_string(), format!("0x{}:7", "00".repeat(20)));
	}
}
