//! Test-token faucet.
//!
//! [`FaucetTransactionBuilder`] answers grant requests with a partially
//! signed transfer, guarded by a per-wallet [`RateLimiter`] and the amount
//! caps of [`LimitPolicy`].

pub mod builder;
pub mod error;
pub mod limiter;
pub mod policy;

pub use builder::{
	EnvelopeSignature, FaucetInstruction, FaucetMessage, FaucetSettings, FaucetTransactionBuilder,
	SignedEnvelope,
};
pub use error::{FaucetError, FaucetResult};
pub use limiter::{Clock, RateDecision, RateLimiter, SystemClock};
pub use policy::{LimitPolicy, LimitSettings, LimitViolation};
