//! Fee estimation for step sequences.
//!
//! One estimate covers a whole sequence. Estimates are remembered per session
//! so a restart reuses the fees the tree was scheduled with.

use dashmap::DashMap;
use std::sync::Arc;
use swap_delivery::DeliveryService;
use swap_types::{FeeEstimate, SessionKey, StepDraft};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EstimationError {
	#[error("Fee estimation failed: {0}")]
	Failed(String),
	#[error("Ledger returned {actual} gas limits for {expected} steps")]
	GasListMismatch { expected: usize, actual: usize },
}

pub struct GasEstimator {
	delivery: Arc<DeliveryService>,
	cache: DashMap<SessionKey, (Vec<StepDraft>, FeeEstimate)>,
}

impl GasEstimator {
	pub fn new(delivery: Arc<DeliveryService>) -> Self {
		Self {
			delivery,
			cache: DashMap::new(),
		}
	}

	/// Estimates fees for `drafts` under `key`.
	///
	/// A cached estimate is reused only when it was made for the same drafts.
	pub async fn estimate(
		&self,
		key: &SessionKey,
		drafts: &[StepDraft],
	) -> Result<FeeEstimate, EstimationError> {
		if let Some(entry) = self.cache.get(key) {
			let (cached_drafts, fees) = entry.value();
			if cached_drafts.as_slice() == drafts {
				tracing::debug!(session = %key, "Reusing cached fee estimate");
				return Ok(fees.clone());
			}
		}

		let fees = self
			.delivery
			.estimate_fees(&key.payer, key.nonce, drafts)
			.await
			.map_err(|e| EstimationError::Failed(e.to_string()))?;

		if fees.gas_limits.len() != drafts.len() {
			return Err(EstimationError::GasListMismatch {
				expected: drafts.len(),
				actual: fees.gas_limits.len(),
			});
		}

		self.cache
			.insert(key.clone(), (drafts.to_vec(), fees.clone()));
		Ok(fees)
	}

	pub fn cached(&self, key: &SessionKey) -> Option<FeeEstimate> {
		self.cache.get(key).map(|entry| entry.value().1.clone())
	}

	pub fn forget(&self, key: &SessionKey) {
		self.cache.remove(key);
	}
}
