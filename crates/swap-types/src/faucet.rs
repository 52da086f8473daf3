//! Faucet request and envelope types.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A single faucet call. Validated, served and then dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FaucetGrantRequest {
	/// Recipient wallet on the holding ledger. Also the rate-limit key.
	pub wallet: String,
	/// Mint address on the holding ledger.
	pub token_address: String,
	/// Requested amount in whole-token units.
	pub amount: Decimal,
}

/// Serialized, partially signed transaction handed back to the caller.
///
/// The bank has signed; the recipient still has to. Ownership moves to the
/// caller, the builder keeps nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionEnvelope(pub Vec<u8>);

impl TransactionEnvelope {
	pub fn as_bytes(&self) -> &[u8] {
		&self.0
	}

	pub fn into_bytes(self) -> Vec<u8> {
		self.0
	}
}
