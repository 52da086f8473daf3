//! Swap orchestration.
//!
//! [`plan`] turns a swap plan into ordered steps, [`estimator`] prices them,
//! [`state`] tracks each step's lifecycle and [`orchestrator`] drives a
//! session from submission to its final observed state.

pub mod estimator;
pub mod orchestrator;
pub mod plan;
pub mod state;

pub use estimator::{EstimationError, GasEstimator};
pub use orchestrator::{OrchestratorError, OrchestratorSettings, SwapOrchestrator};
pub use plan::{AbiCallEncoder, CallEncoder, PlanError};
pub use state::{StepStateMachine, TransitionError};
