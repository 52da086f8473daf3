//! Account-related types for the swap service.
//!
//! Execution-ledger addresses and transaction hashes are stored as raw bytes
//! and travel as `0x`-prefixed hex strings. Holding-ledger accounts are opaque
//! strings produced by external derivation helpers and are not modelled here.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Errors raised while parsing hex-encoded identifiers.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
	#[error("Invalid hex: {0}")]
	InvalidHex(String),
	#[error("Expected {expected} bytes, got {actual}")]
	InvalidLength { expected: usize, actual: usize },
}

fn decode_hex(value: &str) -> Result<Vec<u8>, ParseError> {
	let trimmed = value.strip_prefix("0x").unwrap_or(value);
	hex::decode(trimmed).map_err(|e| ParseError::InvalidHex(e.to_string()))
}

/// Execution-ledger address (20 bytes).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address(pub Vec<u8>);

impl Address {
	pub const LENGTH: usize = 20;

	pub fn zero() -> Self {
		Address(vec![0u8; Self::LENGTH])
	}

	/// Converts into the alloy representation used by the call encoders.
	pub fn to_alloy(&self) -> alloy_primitives::Address {
		alloy_primitives::Address::from_slice(&self.0)
	}
}

impl FromStr for Address {
	type Err = ParseError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let bytes = decode_hex(s)?;
		if bytes.len() != Self::LENGTH {
			return Err(ParseError::InvalidLength {
				expected: Self::LENGTH,
				actual: bytes.len(),
			});
		}
		Ok(Address(bytes))
	}
}

impl TryFrom<String> for Address {
	type Error = ParseError;

	fn try_from(value: String) -> Result<Self, Self::Error> {
		value.parse()
	}
}

impl From<Address> for String {
	fn from(address: Address) -> Self {
		address.to_string()
	}
}

impl From<alloy_primitives::Address> for Address {
	fn from(address: alloy_primitives::Address) -> Self {
		Address(address.as_slice().to_vec())
	}
}

impl fmt::Display for Address {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "0x{}", hex::encode(&self.0))
	}
}

/// Cryptographic signature in the standard (r, s, v) layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature(pub Vec<u8>);

impl Signature {
	pub fn to_hex(&self) -> String {
		format!("0x{}", hex::encode(&self.0))
	}
}

/// Transaction hash on either ledger, stored as raw bytes.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TransactionHash(pub Vec<u8>);

impl TransactionHash {
	/// Short form used in log lines.
	pub fn truncated(&self) -> String {
		let hash_str = hex::encode(&self.0);
		if hash_str.len() <= 8 {
			hash_str
		} else {
			format!("{}..", &hash_str[..8])
		}
	}
}

impl FromStr for TransactionHash {
	type Err = ParseError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		decode_hex(s).map(TransactionHash)
	}
}

impl TryFrom<String> for TransactionHash {
	type Error = ParseError;

	fn try_from(value: String) -> Result<Self, Self::Error> {
		value.parse()
	}
}

impl From<TransactionHash> for String {
	fn from(hash: TransactionHash) -> Self {
		hash.to_string()
	}
}

impl fmt::Display for TransactionHash {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "0x{}", hex::encode(&self.0))
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_address_parsing() {
		let address: Address = "0x00000000000000000000000000000000000000aa".parse().unwrap();
		assert_eq!(address.0[19], 0xaa);
		assert_eq!(
			address.to_string(),
			"0x00000000000000000000000000000000000000aa"
		);

		assert_eq!(
			"0x1234".parse::<Address>(),
			Err(ParseError::InvalidLength {
				expected: 20,
				actual: 2
			})
		);
		assert!("0xzz".parse::<Address>().is_err());
	}

	#[test]
	fn test_address_serde_as_hex() {
		let address = Address(vec![0x11; 20]);
		let json = serde_json::to_string(&address).unwrap();
		assert_eq!(json, format!("\"0x{}\"", "11".repeat(20)));
		let back: Address = serde_json::from_str(&json).unwrap();
		assert_eq!(back, address);
	}

	#[test]
	fn test_truncated_hash() {
		let hash = TransactionHash(vec![0xab; 32]);
		assert_eq!(hash.truncated(), "abababab..");
		assert_eq!(TransactionHash(vec![0x01]).truncated(), "01");
	}
}
