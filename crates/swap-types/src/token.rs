//! Token registry types.
//!
//! Descriptors are immutable and come from the static registry in the
//! service configuration, one registry per deployment environment.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::Address;

/// Category used to pick the faucet cap for a token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TokenCategory {
	Standard,
	/// Wrapped native currency. Capped lower than standard tokens.
	NativeWrapped,
}

/// A token known on both ledgers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenDescriptor {
	pub symbol: String,
	/// Mint address on the holding ledger.
	pub ledger_a_address: String,
	/// Token contract on the execution ledger.
	pub ledger_b_address: Address,
	pub decimals: u8,
	pub category: TokenCategory,
}

/// Registry served for one environment by `GET /tokens/{environment}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenRegistry {
	#[serde(default)]
	pub tokens_set1: Vec<TokenDescriptor>,
	#[serde(default)]
	pub tokens_set2: Vec<TokenDescriptor>,
	#[serde(default)]
	pub swap_metadata: HashMap<String, String>,
	/// Holding-ledger mints the faucet will hand out.
	#[serde(default, rename = "airdropEligibleList")]
	pub airdrop_eligible: Vec<String>,
}

impl TokenRegistry {
	/// Looks a token up by its holding-ledger mint across both sets.
	pub fn find_by_ledger_a(&self, mint: &str) -> Option<&TokenDescriptor> {
		self.tokens_set1
			.iter()
			.chain(self.tokens_set2.iter())
			.find(|t| t.ledger_a_address == mint)
	}

	pub fn is_airdrop_eligible(&self, mint: &str) -> bool {
		self.airdrop_eligible.iter().any(|m| m == mint)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn descriptor(symbol: &str, mint: &str) -> TokenDescriptor {
		TokenDescriptor {
			symbol: symbol.to_string(),
			ledger_a_address: mint.to_string(),
			ledger_b_address: Address(vec![1; 20]),
			decimals: 6,
			category: TokenCategory::Standard,
		}
	}

	#[test]
	fn test_find_across_sets() {
		let registry = TokenRegistry {
			tokens_set1: vec![descriptor("USDC", "mint-usdc")],
			tokens_set2: vec![descriptor("USDT", "mint-usdt")],
			swap_metadata: HashMap::new(),
			airdrop_eligible: vec!["mint-usdc".to_string()],
		};

		assert_eq!(registry.find_by_ledger_a("mint-usdt").unwrap().symbol, "USDT");
		assert!(registry.find_by_ledger_a("mint-unknown").is_none());
		assert!(registry.is_airdrop_eligible("mint-usdc"));
		assert!(!registry.is_airdrop_eligible("mint-usdt"));
	}

	#[test]
	fn test_registry_json_shape() {
		let registry = TokenRegistry {
			tokens_set1: vec![descriptor("USDC", "mint-usdc")],
			..Default::default()
		};
		let json = serde_json::to_value(&registry).unwrap();
		assert!(json.get("tokensSet1").is_some());
		assert!(json.get("airdropEligibleList").is_some());
		assert!(json.get("airdropEligible").is_none());
		assert_eq!(json["tokensSet1"][0]["category"], "standard");
		assert_eq!(json["tokensSet1"][0]["ledgerAAddress"], "mint-usdc");
	}
}
