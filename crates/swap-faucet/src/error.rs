use rust_decimal::Decimal;
use thiserror::Error;

use crate::policy::LimitViolation;

#[derive(Debug, Error)]
pub enum FaucetError {
	#[error("Too many requests, try again in {retry_after_seconds} seconds")]
	RateLimited { retry_after_seconds: u64 },

	#[error("Unknown token: {0}")]
	UnknownToken(String),

	#[error("Invalid request: {0}")]
	InvalidRequest(String),

	#[error("Invalid amount: {0}")]
	InvalidAmount(String),

	#[error("Faucet balance too low: {available} available, {requested} requested")]
	InsufficientBankBalance {
		available: Decimal,
		requested: Decimal,
	},

	#[error("Limit exceeded: {0}")]
	LimitExceeded(LimitViolation),

	#[error("Failed to build transaction: {0}")]
	TransactionBuildFailure(String),
}

impl FaucetError {
	pub fn retry_after_seconds(&self) -> Option<u64> {
		match self {
			FaucetError::RateLimited {
				retry_after_seconds,
			} => Some(*retry_after_seconds),
			_ => None,
		}
	}

	/// Policy and validation failures the requester can act on, as opposed
	/// to infrastructure failures on our side.
	pub fn is_client_error(&self) -> bool {
		!matches!(self, FaucetError::TransactionBuildFailure(_))
	}
}

pub type FaucetResult<T> = Result<T, FaucetError>;

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_rate_limited_carries_wait() {
		let err = FaucetError::RateLimited {
			retry_after_seconds: 42,
		};
		assert_eq!(err.retry_after_seconds(), Some(42));
		assert!(err.is_client_error());
		assert!(err.to_string().contains("42 seconds"));
	}

	#[test]
	fn test_build_failure_is_not_client_error() {
		let err = FaucetError::TransactionBuildFailure("timeout".into());
		assert!(!err.is_client_error());
		assert_eq!(err.retry_after_seconds(), None);
	}

	#[test]
	fn test_limit_message_is_readable() {
		let err = FaucetError::LimitExceeded(LimitViolation::HoldingCapReached {
			held: Decimal::new(195, 1),
			requested: Decimal::ONE,
			cap: Decimal::from(20),
		});
		assert_eq!(
			err.to_string(),
			"Limit exceeded: holding 19.5 plus 1 would exceed the cap of 20"
		);
	}
}
