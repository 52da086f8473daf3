//! Faucet transaction composition.
//!
//! The builder answers one grant request with a partially signed transfer:
//! the bank signs as token authority, the recipient signs client-side as fee
//! payer. The requester's cooldown is peeked at entry and only consumed as
//! the very last step, so a request refused for any other reason leaves the
//! requester free to try again immediately.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use swap_account::AccountService;
use swap_delivery::{DeliveryError, DeliveryService};
use swap_types::{FaucetGrantRequest, TokenCategory, TokenRegistry, TransactionEnvelope};
use tracing::{debug, info, warn};

use crate::error::{FaucetError, FaucetResult};
use crate::limiter::RateLimiter;
use crate::policy::{to_raw, validate_amount, LimitPolicy};

#[derive(Debug, Clone)]
pub struct FaucetSettings {
	/// Minimum time between two grants to the same wallet.
	pub cooldown: Duration,
	/// Bank wallet on the holding ledger that funds grants.
	pub bank_wallet: String,
	/// Receiver of the service fee.
	pub fee_collector: String,
	/// Service fee in native base units, paid by the recipient.
	pub service_fee: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum FaucetInstruction {
	#[serde(rename_all = "camelCase")]
	CreateAssociatedAccount {
		payer: String,
		owner: String,
		mint: String,
		token_program: String,
	},
	#[serde(rename_all = "camelCase")]
	ServiceFee { from: String, to: String, amount: u64 },
	#[serde(rename_all = "camelCase")]
	TokenTransfer {
		mint: String,
		source_owner: String,
		destination_owner: String,
		/// Raw units.
		amount: u64,
		decimals: u8,
		token_program: String,
	},
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FaucetMessage {
	pub fee_payer: String,
	pub recency_token: String,
	pub instructions: Vec<FaucetInstruction>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvelopeSignature {
	pub signer: String,
	/// `None` until the signer has signed.
	pub signature: Option<String>,
}

/// Wire layout of a [`TransactionEnvelope`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedEnvelope {
	/// Base64 of the exact message bytes that were signed.
	pub message: String,
	pub signatures: Vec<EnvelopeSignature>,
}

impl SignedEnvelope {
	pub fn from_envelope(envelope: &TransactionEnvelope) -> serde_json::Result<Self> {
		serde_json::from_slice(envelope.as_bytes())
	}

	pub fn decode_message(&self) -> Result<FaucetMessage, String> {
		let bytes = STANDARD.decode(&self.message).map_err(|e| e.to_string())?;
		serde_json::from_slice(&bytes).map_err(|e| e.to_string())
	}
}

fn build_failure(e: DeliveryError) -> FaucetError {
	FaucetError::TransactionBuildFailure(e.to_string())
}

pub struct FaucetTransactionBuilder {
	delivery: Arc<DeliveryService>,
	bank: Arc<AccountService>,
	limiter: Arc<RateLimiter>,
	policy: LimitPolicy,
	tokens: TokenRegistry,
	settings: FaucetSettings,
}

impl FaucetTransactionBuilder {
	pub fn new(
		delivery: Arc<DeliveryService>,
		bank: Arc<AccountService>,
		limiter: Arc<RateLimiter>,
		policy: LimitPolicy,
		tokens: TokenRegistry,
		settings: FaucetSettings,
	) -> Self {
		Self {
			delivery,
			bank,
			limiter,
			policy,
			tokens,
			settings,
		}
	}

	pub fn settings(&self) -> &FaucetSettings {
		&self.settings
	}

	fn category_of(&self, mint: &str) -> TokenCategory {
		self.tokens
			.find_by_ledger_a(mint)
			.map(|token| token.category)
			.unwrap_or(TokenCategory::Standard)
	}

	pub async fn build(&self, request: &FaucetGrantRequest) -> FaucetResult<TransactionEnvelope> {
		let wallet = request.wallet.trim();
		let mint = request.token_address.trim();
		if wallet.is_empty() || mint.is_empty() {
			return Err(FaucetError::InvalidRequest(
				"wallet and tokenAddress are required".into(),
			));
		}

		let decision = self.limiter.check(wallet, self.settings.cooldown);
		if !decision.allowed {
			warn!(wallet, retry_after = decision.retry_after_seconds, "Faucet request rate limited");
			return Err(FaucetError::RateLimited {
				retry_after_seconds: decision.retry_after_seconds,
			});
		}

		if !self.tokens.airdrop_eligible.is_empty() && !self.tokens.is_airdrop_eligible(mint) {
			return Err(FaucetError::UnknownToken(mint.to_string()));
		}
		let metadata = self
			.delivery
			.token_metadata(mint)
			.await
			.map_err(build_failure)?
			.ok_or_else(|| FaucetError::UnknownToken(mint.to_string()))?;

		validate_amount(request.amount, metadata.decimals).map_err(FaucetError::InvalidAmount)?;

		let bank_balance = self
			.delivery
			.token_balance(&self.settings.bank_wallet, mint)
			.await
			.map_err(build_failure)?
			.unwrap_or(Decimal::ZERO);
		if bank_balance < request.amount {
			warn!(mint, %bank_balance, requested = %request.amount, "Faucet bank running low");
			return Err(FaucetError::InsufficientBankBalance {
				available: bank_balance,
				requested: request.amount,
			});
		}

		let recipient_balance = self
			.delivery
			.token_balance(wallet, mint)
			.await
			.map_err(build_failure)?;
		let held = recipient_balance.unwrap_or(Decimal::ZERO);

		self.policy
			.check(
				mint,
				self.category_of(mint),
				held,
				request.amount,
				metadata.decimals,
			)
			.map_err(FaucetError::LimitExceeded)?;

		let raw_amount = to_raw(request.amount, metadata.decimals)
			.and_then(|raw| raw.to_u64())
			.ok_or_else(|| {
				FaucetError::InvalidAmount(format!("{} does not fit in raw units", request.amount))
			})?;

		let recency_token = self
			.delivery
			.latest_recency_token()
			.await
			.map_err(build_failure)?;

		let mut instructions = Vec::with_capacity(3);
		if recipient_balance.is_none() {
			debug!(wallet, mint, "Recipient has no token account, adding creation");
			instructions.push(FaucetInstruction::CreateAssociatedAccount {
				payer: wallet.to_string(),
				owner: wallet.to_string(),
				mint: mint.to_string(),
				token_program: metadata.token_program.clone(),
			});
		}
		instructions.push(FaucetInstruction::ServiceFee {
			from: wallet.to_string(),
			to: self.settings.fee_collector.clone(),
			amount: self.settings.service_fee,
		});
		instructions.push(FaucetInstruction::TokenTransfer {
			mint: mint.to_string(),
			source_owner: self.settings.bank_wallet.clone(),
			destination_owner: wallet.to_string(),
			amount: raw_amount,
			decimals: metadata.decimals,
			token_program: metadata.token_program,
		});

		let message = FaucetMessage {
			fee_payer: wallet.to_string(),
			recency_token,
			instructions,
		};
		let message_bytes = serde_json::to_vec(&message)
			.map_err(|e| FaucetError::TransactionBuildFailure(e.to_string()))?;

		let bank_signature = self
			.bank
			.sign(&message_bytes)
			.await
			.map_err(|e| FaucetError::TransactionBuildFailure(e.to_string()))?;

		let envelope = SignedEnvelope {
			message: STANDARD.encode(&message_bytes),
			signatures: vec![
				EnvelopeSignature {
					signer: wallet.to_string(),
					signature: None,
				},
				EnvelopeSignature {
					signer: self.settings.bank_wallet.clone(),
					signature: Some(bank_signature.to_hex()),
				},
			],
		};
		let bytes = serde_json::to_vec(&envelope)
			.map_err(|e| FaucetError::TransactionBuildFailure(e.to_string()))?;

		// Consume the cooldown only now that the grant is certain.
		let decision = self.limiter.try_acquire(wallet, self.settings.cooldown);
		if !decision.allowed {
			warn!(wallet, "Concurrent faucet request won the cooldown slot");
			return Err(FaucetError::RateLimited {
				retry_after_seconds: decision.retry_after_seconds,
			});
		}

		info!(wallet, mint, amount = %request.amount, "Faucet grant built");
		Ok(TransactionEnvelope(bytes))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::limiter::{Clock, ManualClock};
	use crate::policy::LimitSettings;
	use std::str::FromStr;
	use swap_account::implementations::local::LocalWallet;
	use swap_delivery::mocks::{MemoryExecutionLedger, MemoryHoldingLedger, TOKEN_PROGRAM};
	use swap_types::{Address, TokenDescriptor};

	const TEST_KEY: &str = "0xac0974bec39a17e36ba4a6b4d238ff944bacb478cbed5efcae784d7bf4f2ff80";
	const BANK: &str = "BankWa11et1111111111111111111111111111111111";
	const RECIPIENT: &str = "Recipient111111111111111111111111111111111111";
	const USDC: &str = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v";

	fn dec(s: &str) -> Decimal {
		Decimal::from_str(s).unwrap()
	}

	struct Harness {
		builder: FaucetTransactionBuilder,
		holding: MemoryHoldingLedger,
		limiter: Arc<RateLimiter>,
		clock: ManualClock,
	}

	fn harness() -> Harness {
		let holding = MemoryHoldingLedger::new().with_mint(USDC, 6);
		holding.set_balance(BANK, USDC, dec("1000"));

		let delivery = Arc::new(DeliveryService::new(
			Box::new(holding.clone()),
			Box::new(MemoryExecutionLedger::new(245022926)),
			Duration::from_secs(5),
			Duration::from_secs(30),
		));
		let bank = Arc::new(AccountService::new(Box::new(
			LocalWallet::new(TEST_KEY).unwrap(),
		)));
		let clock = ManualClock::new(1_700_000_000);
		let limiter = Arc::new(RateLimiter::new(Arc::new(clock.clone())));
		let tokens = TokenRegistry {
			tokens_set1: vec![TokenDescriptor {
				symbol: "USDC".into(),
				ledger_a_address: USDC.into(),
				ledger_b_address: Address(vec![0x51; 20]),
				decimals: 6,
				category: TokenCategory::Standard,
			}],
			airdrop_eligible: vec![USDC.into()],
			..Default::default()
		};

		let builder = FaucetTransactionBuilder::new(
			delivery,
			bank,
			limiter.clone(),
			LimitPolicy::new(LimitSettings::default()),
			tokens,
			FaucetSettings {
				cooldown: Duration::from_secs(60),
				bank_wallet: BANK.into(),
				fee_collector: BANK.into(),
				service_fee: 5_000,
			},
		);

		Harness {
			builder,
			holding,
			limiter,
			clock,
		}
	}

	fn request(amount: &str) -> FaucetGrantRequest {
		FaucetGrantRequest {
			wallet: RECIPIENT.into(),
			token_address: USDC.into(),
			amount: dec(amount),
		}
	}

	#[tokio::test]
	async fn test_first_grant_succeeds_and_records_cooldown() {
		let h = harness();
		let envelope = h.builder.build(&request("1")).await.unwrap();

		assert_eq!(h.limiter.last_granted_at(RECIPIENT), Some(h.clock.now()));

		let signed = SignedEnvelope::from_envelope(&envelope).unwrap();
		assert_eq!(signed.signatures.len(), 2);
		assert_eq!(signed.signatures[0].signer, RECIPIENT);
		assert!(signed.signatures[0].signature.is_none());
		assert_eq!(signed.signatures[1].signer, BANK);
		assert!(signed.signatures[1].signature.is_some());

		let message = signed.decode_message().unwrap();
		assert_eq!(message.fee_payer, RECIPIENT);
		assert_eq!(message.recency_token, "recency-1");
		// No token account yet: create, fee, transfer.
		assert_eq!(message.instructions.len(), 3);
		assert!(matches!(
			message.instructions[0],
			FaucetInstruction::CreateAssociatedAccount { .. }
		));
		assert_eq!(
			message.instructions[1],
			FaucetInstruction::ServiceFee {
				from: RECIPIENT.into(),
				to: BANK.into(),
				amount: 5_000,
			}
		);
		assert_eq!(
			message.instructions[2],
			FaucetInstruction::TokenTransfer {
				mint: USDC.into(),
				source_owner: BANK.into(),
				destination_owner: RECIPIENT.into(),
				amount: 1_000_000,
				decimals: 6,
				token_program: TOKEN_PROGRAM.into(),
			}
		);
	}

	#[tokio::test]
	async fn test_existing_account_skips_creation() {
		let h = harness();
		h.holding.set_balance(RECIPIENT, USDC, dec("3"));
		let envelope = h.builder.build(&request("2.5")).await.unwrap();

		let message = SignedEnvelope::from_envelope(&envelope)
			.unwrap()
			.decode_message()
			.unwrap();
		assert_eq!(message.instructions.len(), 2);
		assert!(matches!(
			message.instructions[1],
			FaucetInstruction::TokenTransfer {
				amount: 2_500_000,
				..
			}
		));
	}

	#[tokio::test]
	async fn test_repeat_within_cooldown_is_rate_limited() {
		let h = harness();
		h.builder.build(&request("1")).await.unwrap();

		h.clock.advance(Duration::from_secs(10));
		let err = h.builder.build(&request("1")).await.unwrap_err();
		let wait = err.retry_after_seconds().unwrap();
		assert!((1..=60).contains(&wait));
		assert_eq!(wait, 50);

		h.clock.advance(Duration::from_secs(50));
		assert!(h.builder.build(&request("1")).await.is_ok());
	}

	#[tokio::test]
	async fn test_limit_exceeded_leaves_cooldown_untouched() {
		let h = harness();
		h.holding.set_balance(RECIPIENT, USDC, dec("19.5"));

		let err = h.builder.build(&request("1")).await.unwrap_err();
		assert!(matches!(err, FaucetError::LimitExceeded(_)));
		assert_eq!(h.limiter.last_granted_at(RECIPIENT), None);

		// Still free to ask for an amount that fits.
		assert!(h.builder.build(&request("0.5")).await.is_ok());
	}

	#[tokio::test]
	async fn test_edge_of_cap_uses_exact_decimals() {
		let h = harness();
		h.holding.set_balance(RECIPIENT, USDC, dec("19.999999"));
		assert!(matches!(
			h.builder.build(&request("0.000002")).await,
			Err(FaucetError::LimitExceeded(_))
		));
		assert!(h.builder.build(&request("0.000001")).await.is_ok());
	}

	#[tokio::test]
	async fn test_unknown_and_ineligible_tokens() {
		let h = harness();
		let mut req = request("1");
		req.token_address = "NotListed1111111111111111111111111111111111".into();
		assert!(matches!(
			h.builder.build(&req).await,
			Err(FaucetError::UnknownToken(_))
		));
		assert!(h.limiter.is_empty());
	}

	#[tokio::test]
	async fn test_bank_shortfall_does_not_burn_cooldown() {
		let h = harness();
		h.holding.set_balance(BANK, USDC, dec("0.5"));
		assert!(matches!(
			h.builder.build(&request("1")).await,
			Err(FaucetError::InsufficientBankBalance { .. })
		));
		assert_eq!(h.limiter.last_granted_at(RECIPIENT), None);
	}

	#[tokio::test]
	async fn test_oracle_failure_is_build_failure() {
		let h = harness();
		h.holding.fail_balances(Some("node unreachable"));
		let err = h.builder.build(&request("1")).await.unwrap_err();
		assert!(matches!(err, FaucetError::TransactionBuildFailure(_)));
		assert!(!err.is_client_error());
		assert!(h.limiter.is_empty());
	}

	#[tokio::test]
	async fn test_amount_validation() {
		let h = harness();
		assert!(matches!(
			h.builder.build(&request("0.0000001")).await,
			Err(FaucetError::InvalidAmount(_))
		));
		assert!(matches!(
			h.builder.build(&request("0")).await,
			Err(FaucetError::InvalidAmount(_))
		));
		assert!(matches!(
			h.builder.build(&request("11")).await,
			Err(FaucetError::LimitExceeded(_))
		));
	}
}
