//! Shared types for the ledger swap service.
//!
//! Every crate in the workspace speaks in terms of these types: addresses and
//! signatures, token descriptors from the static registry, faucet requests and
//! envelopes, scheduled steps with their states, swap sessions and the events
//! emitted while they are observed.

pub mod account;
pub mod events;
pub mod faucet;
pub mod session;
pub mod step;
pub mod token;
pub mod validation;

pub use account::*;
pub use events::*;
pub use faucet::*;
pub use session::*;
pub use step::*;
pub use token::*;
pub use validation::*;
