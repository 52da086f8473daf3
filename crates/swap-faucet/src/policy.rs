//! Amount caps for faucet grants.
//!
//! All comparisons are made on integer raw units (`amount × 10^decimals`)
//! computed with [`Decimal`], so low-decimal tokens never see binary
//! floating-point drift.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use swap_types::TokenCategory;

/// Wrapped native mint on the holding ledger.
pub const WRAPPED_NATIVE_MINT: &str = "So11111111111111111111111111111111111111112";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LimitSettings {
	#[serde(default = "default_standard_cap")]
	pub standard_cap: Decimal,
	#[serde(default = "default_native_wrapped_cap")]
	pub native_wrapped_cap: Decimal,
	/// Largest amount a single request may ask for.
	#[serde(default = "default_requested_amount_cap")]
	pub requested_amount_cap: Decimal,
	/// Dedicated caps that replace the category cap for specific mints.
	#[serde(default = "default_overrides")]
	pub overrides: HashMap<String, Decimal>,
}

fn default_standard_cap() -> Decimal {
	Decimal::from(20)
}

fn default_native_wrapped_cap() -> Decimal {
	Decimal::from(2)
}

fn default_requested_amount_cap() -> Decimal {
	Decimal::from(10)
}

fn default_overrides() -> HashMap<String, Decimal> {
	HashMap::from([(WRAPPED_NATIVE_MINT.to_string(), Decimal::ONE)])
}

impl Default for LimitSettings {
	fn default() -> Self {
		Self {
			standard_cap: default_standard_cap(),
			native_wrapped_cap: default_native_wrapped_cap(),
			requested_amount_cap: default_requested_amount_cap(),
			overrides: default_overrides(),
		}
	}
}

/// Why a request was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LimitViolation {
	RequestTooLarge {
		requested: Decimal,
		cap: Decimal,
	},
	HoldingCapReached {
		held: Decimal,
		requested: Decimal,
		cap: Decimal,
	},
}

impl fmt::Display for LimitViolation {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			LimitViolation::RequestTooLarge { requested, cap } => {
				write!(f, "a single request may ask for at most {}, got {}", cap, requested)
			}
			LimitViolation::HoldingCapReached {
				held,
				requested,
				cap,
			} => write!(
				f,
				"holding {} plus {} would exceed the cap of {}",
				held, requested, cap
			),
		}
	}
}

/// `10^decimals` as a decimal, or `None` past the representable range.
fn scale_factor(decimals: u8) -> Option<Decimal> {
	(0..decimals).try_fold(Decimal::ONE, |factor, _| factor.checked_mul(Decimal::TEN))
}

/// Converts a whole-token amount into integer raw units, truncating anything
/// finer than the token supports.
pub fn to_raw(amount: Decimal, decimals: u8) -> Option<Decimal> {
	scale_factor(decimals)
		.and_then(|factor| amount.checked_mul(factor))
		.map(|raw| raw.trunc())
}

/// Rejects amounts that are not positive or finer than the token's decimals.
pub fn validate_amount(amount: Decimal, decimals: u8) -> Result<(), String> {
	if amount <= Decimal::ZERO {
		return Err(format!("amount must be positive, got {}", amount));
	}
	if amount.normalize().scale() > decimals as u32 {
		return Err(format!(
			"amount {} has more than {} decimal places",
			amount, decimals
		));
	}
	Ok(())
}

#[derive(Debug, Clone, Default)]
pub struct LimitPolicy {
	settings: LimitSettings,
}

impl LimitPolicy {
	pub fn new(settings: LimitSettings) -> Self {
		Self { settings }
	}

	pub fn settings(&self) -> &LimitSettings {
		&self.settings
	}

	pub fn category_cap(&self, category: TokenCategory) -> Decimal {
		match category {
			TokenCategory::Standard => self.settings.standard_cap,
			TokenCategory::NativeWrapped => self.settings.native_wrapped_cap,
		}
	}

	/// Holding cap for a mint: its dedicated cap if listed, else its category cap.
	pub fn cap_for(&self, mint: &str, category: TokenCategory) -> Decimal {
		self.settings
			.overrides
			.get(mint)
			.copied()
			.unwrap_or_else(|| self.category_cap(category))
	}

	/// Whether `held + requested` stays within the category cap and
	/// `requested` within the per-request cap.
	pub fn within_limit(
		&self,
		held: Decimal,
		category: TokenCategory,
		requested: Decimal,
		decimals: u8,
	) -> bool {
		self.evaluate(held, self.category_cap(category), requested, decimals)
			.is_ok()
	}

	/// Applies the caps for `mint`, including dedicated overrides.
	pub fn check(
		&self,
		mint: &str,
		category: TokenCategory,
		held: Decimal,
		requested: Decimal,
		decimals: u8,
	) -> Result<(), LimitViolation> {
		self.evaluate(held, self.cap_for(mint, category), requested, decimals)
	}

	fn evaluate(
		&self,
		held: Decimal,
		cap: Decimal,
		requested: Decimal,
		decimals: u8,
	) -> Result<(), LimitViolation> {
		let request_cap = self.settings.requested_amount_cap;
		let too_large = LimitViolation::RequestTooLarge {
			requested,
			cap: request_cap,
		};
		let raw_requested = to_raw(requested, decimals).ok_or_else(|| too_large.clone())?;
		if raw_requested > to_raw(request_cap, decimals).ok_or_else(|| too_large.clone())? {
			return Err(too_large);
		}

		let over_cap = LimitViolation::HoldingCapReached {
			held,
			requested,
			cap,
		};
		let raw_total = to_raw(held, decimals)
			.and_then(|raw_held| raw_held.checked_add(raw_requested))
			.ok_or_else(|| over_cap.clone())?;
		let raw_cap = to_raw(cap, decimals).ok_or_else(|| over_cap.clone())?;
		if raw_total > raw_cap {
			return Err(over_cap);
		}

		Ok(())
	}
}
