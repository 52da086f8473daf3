//! Signing accounts for the swap service.
//!
//! The faucet bank partially signs every envelope it builds, and the anchor
//! transaction that registers a step tree is signed by the operator account.
//! Both go through [`AccountInterface`] so key custody stays pluggable.

use async_trait::async_trait;
use swap_types::{ConfigSchema, Signature};
use thiserror::Error;

pub mod implementations {
	pub mod local;
}

#[derive(Debug, Error)]
pub enum AccountError {
	#[error("Signing failed: {0}")]
	SigningFailed(String),
	#[error("Invalid key: {0}")]
	InvalidKey(String),
}

#[async_trait]
pub trait AccountInterface: Send + Sync {
	/// Returns the configuration schema for this account implementation.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Public identity of the signer, as listed among a transaction's
	/// required signers.
	fn identity(&self) -> String;

	/// Signs arbitrary message bytes.
	async fn sign_message(&self, message: &[u8]) -> Result<Signature, AccountError>;
}

/// Thin service wrapper so callers hold one concrete type.
pub struct AccountService {
	provider: Box<dyn AccountInterface>,
}

impl AccountService {
	pub fn new(provider: Box<dyn AccountInterface>) -> Self {
		Self { provider }
	}

	pub fn identity(&self) -> String {
		self.provider.identity()
	}

	pub async fn sign(&self, message: &[u8]) -> Result<Signature, AccountError> {
		self.provider.sign_message(message).await
	}
}
