//! Turning a [`SwapPlan`] into ordered steps.
//!
//! Drafting is pure: it only needs the plan, the payer and a [`CallEncoder`].
//! Scheduling attaches one fee estimate to the drafts and fixes them as
//! immutable [`ScheduledStep`]s.

use alloy_primitives::{Bytes, FixedBytes, U256};
use alloy_sol_types::{sol, SolCall};
use swap_types::{Address, FeeEstimate, ScheduledStep, StepDraft, SwapPlan};
use thiserror::Error;

sol! {
	/// Bridged token on the execution ledger, backed by a holding-ledger mint.
	interface IERC20ForSpl {
		function claimTo(bytes32 from, address to, uint64 amount) external returns (bool);
		function approve(address spender, uint256 amount) external returns (bool);
		function transferSolana(bytes32 to, uint64 amount) external returns (bool);
	}

	interface IUniswapV2Pair {
		function swap(uint256 amount0Out, uint256 amount1Out, address to, bytes data) external;
	}

	interface IUniswapV2Router02 {
		function swapExactTokensForTokens(
			uint256 amountIn,
			uint256 amountOutMin,
			address[] path,
			address to,
			uint256 deadline
		) external returns (uint256[] amounts);
	}
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlanError {
	#[error("Invalid plan: {0}")]
	InvalidPlan(String),
	#[error("Fee estimate covers {actual} steps, plan has {expected}")]
	FeeMismatch { expected: usize, actual: usize },
}

/// Produces calldata for the contract calls a swap is made of.
pub trait CallEncoder: Send + Sync {
	/// Claims `amount` from a holding-ledger token account into `to`.
	fn claim_to(&self, from: &[u8; 32], to: &Address, amount: u64) -> Vec<u8>;

	fn approve(&self, spender: &Address, amount: u64) -> Vec<u8>;

	fn pair_swap(&self, amount0_out: u64, amount1_out: u64, to: &Address) -> Vec<u8>;

	fn swap_exact_tokens(
		&self,
		amount_in: u64,
		min_amount_out: u64,
		path: &[Address],
		to: &Address,
		deadline: u64,
	) -> Vec<u8>;

	/// Bridges `amount` back to a holding-ledger account.
	fn transfer_out(&self, to: &[u8; 32], amount: u64) -> Vec<u8>;
}

/// Solidity ABI encoding.
#[derive(Debug, Clone, Copy, Default)]
pub struct AbiCallEncoder;

impl CallEncoder for AbiCallEncoder {
	fn claim_to(&self, from: &[u8; 32], to: &Address, amount: u64) -> Vec<u8> {
		IERC20ForSpl::claimToCall {
			from: FixedBytes::<32>::from(*from),
			to: to.to_alloy(),
			amount,
		}
		.abi_encode()
	}

	fn approve(&self, spender: &Address, amount: u64) -> Vec<u8> {
		IERC20ForSpl::approveCall {
			spender: spender.to_alloy(),
			amount: U256::from(amount),
		}
		.abi_encode()
	}

	fn pair_swap(&self, amount0_out: u64, amount1_out: u64, to: &Address) -> Vec<u8> {
		IUniswapV2Pair::swapCall {
			amount0Out: U256::from(amount0_out),
			amount1Out: U256::from(amount1_out),
			to: to.to_alloy(),
			data: Bytes::new(),
		}
		.abi_encode()
	}

	fn swap_exact_tokens(
		&self,
		amount_in: u64,
		min_amount_out: u64,
		path: &[Address],
		to: &Address,
		deadline: u64,
	) -> Vec<u8> {
		IUniswapV2Router02::swapExactTokensForTokensCall {
			amountIn: U256::from(amount_in),
			amountOutMin: U256::from(min_amount_out),
			path: path.iter().map(Address::to_alloy).collect(),
			to: to.to_alloy(),
			deadline: U256::from(deadline),
		}
		.abi_encode()
	}

	fn transfer_out(&self, to: &[u8; 32], amount: u64) -> Vec<u8> {
		IERC20ForSpl::transferSolanaCall {
			to: FixedBytes::<32>::from(*to),
			amount,
		}
		.abi_encode()
	}
}

fn account_bytes(field: &str, bytes: &[u8]) -> Result<[u8; 32], PlanError> {
	<[u8; 32]>::try_from(bytes).map_err(|_| {
		PlanError::InvalidPlan(format!("{} must be 32 bytes, got {}", field, bytes.len()))
	})
}

/// Drafts the steps of `plan` for `payer`, in execution order.
pub fn draft_steps(
	plan: &SwapPlan,
	payer: &Address,
	encoder: &dyn CallEncoder,
) -> Result<Vec<StepDraft>, PlanError> {
	let calls = match plan {
		SwapPlan::Simple {
			pair,
			token_in,
			claim_source,
			amount_in,
			amount_out,
			token_in_is_token0,
		} => {
			let source = account_bytes("claimSource", claim_source)?;
			if *amount_in == 0 || *amount_out == 0 {
				return Err(PlanError::InvalidPlan("amounts must be positive".into()));
			}
			let (amount0_out, amount1_out) = if *token_in_is_token0 {
				(0, *amount_out)
			} else {
				(*amount_out, 0)
			};
			// The claim lands directly in the pair, so no approval is needed.
			vec![
				(token_in.clone(), encoder.claim_to(&source, pair, *amount_in)),
				(
					pair.clone(),
					encoder.pair_swap(amount0_out, amount1_out, payer),
				),
			]
		}
		SwapPlan::Full {
			router,
			token_in,
			token_out,
			claim_source,
			amount_in,
			min_amount_out,
			deadline,
			bridge_recipient,
		} => {
			let source = account_bytes("claimSource", claim_source)?;
			let recipient = account_bytes("bridgeRecipient", bridge_recipient)?;
			if *amount_in == 0 {
				return Err(PlanError::InvalidPlan("amountIn must be positive".into()));
			}
			if token_in == token_out {
				return Err(PlanError::InvalidPlan(
					"tokenIn and tokenOut must differ".into(),
				));
			}
			vec![
				(token_in.clone(), encoder.claim_to(&source, payer, *amount_in)),
				(token_in.clone(), encoder.approve(router, *amount_in)),
				(
					router.clone(),
					encoder.swap_exact_tokens(
						*amount_in,
						*min_amount_out,
						&[token_in.clone(), token_out.clone()],
						payer,
						*deadline,
					),
				),
				(
					token_out.clone(),
					encoder.transfer_out(&recipient, *min_amount_out),
				),
			]
		}
	};

	Ok(calls
		.into_iter()
		.enumerate()
		.map(|(index, (to, payload))| StepDraft { index, to, payload })
		.collect())
}

/// Fixes drafts into scheduled steps using one fee estimate.
pub fn schedule(
	drafts: &[StepDraft],
	fees: &FeeEstimate,
	payer: &Address,
	chain_id: u64,
) -> Result<Vec<ScheduledStep>, PlanError> {
	if fees.gas_limits.len() != drafts.len() {
		return Err(PlanError::FeeMismatch {
			expected: drafts.len(),
			actual: fees.gas_limits.len(),
		});
	}

	Ok(drafts
		.iter()
		.zip(&fees.gas_limits)
		.map(|(draft, gas_limit)| ScheduledStep {
			index: draft.index,
			from: payer.clone(),
			to: draft.to.clone(),
			payload: draft.payload.clone(),
			gas_limit: *gas_limit,
			max_fee_per_gas: fees.max_fee_per_gas,
			max_priority_fee_per_gas: fees.max_priority_fee_per_gas,
			chain_id,
		})
		.collect())
}

#[cfg(test)]
mod tests {
	use super::*;

	fn addr(byte: u8) -> Address {
		Address(vec![byte; 20])
	}

	fn full_plan() -> SwapPlan {
		SwapPlan::Full {
			router: addr(0x10),
			token_in: addr(0x20),
			token_out: addr(0x30),
			claim_source: vec![0xaa; 32],
			amount_in: 1_000_000,
			min_amount_out: 990_000,
			deadline: 1_700_000_600,
			bridge_recipient: vec![0xbb; 32],
		}
	}

	#[test]
	fn test_full_plan_has_four_ordered_steps() {
		let payer = addr(0x01);
		let drafts = draft_steps(&full_plan(), &payer, &AbiCallEncoder).unwrap();

		assert_eq!(drafts.len(), 4);
		assert_eq!(
			drafts.iter().map(|d| d.index).collect::<Vec<_>>(),
			vec![0, 1, 2, 3]
		);
		assert_eq!(drafts[0].to, addr(0x20));
		assert_eq!(drafts[1].to, addr(0x20));
		assert_eq!(drafts[2].to, addr(0x10));
		assert_eq!(drafts[3].to, addr(0x30));

		assert_eq!(&drafts[0].payload[..4], IERC20ForSpl::claimToCall::SELECTOR);
		assert_eq!(&drafts[1].payload[..4], IERC20ForSpl::approveCall::SELECTOR);
		assert_eq!(
			&drafts[2].payload[..4],
			IUniswapV2Router02::swapExactTokensForTokensCall::SELECTOR
		);
		assert_eq!(
			&drafts[3].payload[..4],
			IERC20ForSpl::transferSolanaCall::SELECTOR
		);
	}

	#[test]
	fn test_simple_plan_claims_into_pair() {
		let payer = addr(0x01);
		let plan = SwapPlan::Simple {
			pair: addr(0x40),
			token_in: addr(0x20),
			claim_source: vec![0xaa; 32],
			amount_in: 500,
			amount_out: 480,
			token_in_is_token0: true,
		};
		let drafts = draft_steps(&plan, &payer, &AbiCallEncoder).unwrap();
		assert_eq!(drafts.len(), plan.step_count());

		let claim = IERC20ForSpl::claimToCall::abi_decode(&drafts[0].payload, true).unwrap();
		assert_eq!(Address::from(claim.to), addr(0x40));
		assert_eq!(claim.amount, 500);

		let swap = IUniswapV2Pair::swapCall::abi_decode(&drafts[1].payload, true).unwrap();
		assert_eq!(swap.amount0Out, U256::ZERO);
		assert_eq!(swap.amount1Out, U256::from(480u64));
		assert_eq!(Address::from(swap.to), payer);
	}

	#[test]
	fn test_rejects_malformed_accounts() {
		let mut plan = full_plan();
		if let SwapPlan::Full {
			bridge_recipient, ..
		} = &mut plan
		{
			bridge_recipient.truncate(20);
		}
		assert!(matches!(
			draft_steps(&plan, &addr(1), &AbiCallEncoder),
			Err(PlanError::InvalidPlan(message)) if message.contains("bridgeRecipient")
		));
	}

	#[test]
	fn test_schedule_attaches_fees() {
		let payer = addr(0x01);
		let drafts = draft_steps(&full_plan(), &payer, &AbiCallEncoder).unwrap();
		let fees = FeeEstimate {
			max_fee_per_gas: 100,
			max_priority_fee_per_gas: 2,
			gas_limits: vec![10, 20, 30, 40],
		};

		let steps = schedule(&drafts, &fees, &payer, 245022926).unwrap();
		assert_eq!(steps.len(), 4);
		assert_eq!(steps[2].gas_limit, 30);
		assert!(steps.iter().all(|s| s.from == payer
			&& s.max_fee_per_gas == 100
			&& s.chain_id == 245022926));

		let short = FeeEstimate {
			gas_limits: vec![10, 20],
			..fees
		};
		assert_eq!(
			schedule(&drafts, &short, &payer, 1),
			Err(PlanError::FeeMismatch {
				expected: 4,
				actual: 2
			})
		);
	}
}
