//! Per-step lifecycle tracking.
//!
//! ```text
//! NotStarted ──begin──▶ InProgress ──observe──▶ Success | Empty | Failed | Skipped
//!      ▲                    │                         │ (restartable except Success)
//!      └──revert_submission─┘◀────────begin───────────┘
//! ```

use swap_types::{StepResult, StepState, StepStatus, TransactionHash, TreeStepStatus};
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransitionError {
	#[error("Step {0} is already in progress")]
	AlreadyInProgress(usize),
	#[error("Step {0} already succeeded")]
	AlreadySucceeded(usize),
	#[error("Step {index} is blocked by step {by}")]
	Blocked { index: usize, by: usize },
	#[error("Step {index} is out of range for {count} steps")]
	OutOfRange { index: usize, count: usize },
}

#[derive(Debug, Clone)]
pub struct StepStateMachine {
	states: Vec<StepState>,
	/// Only one step of the session may be in progress at a time.
	strict_order: bool,
}

impl StepStateMachine {
	pub fn new(count: usize, strict_order: bool) -> Self {
		Self {
			states: vec![StepState::default(); count],
			strict_order,
		}
	}

	pub fn states(&self) -> &[StepState] {
		&self.states
	}

	pub fn len(&self) -> usize {
		self.states.len()
	}

	pub fn is_empty(&self) -> bool {
		self.states.is_empty()
	}

	pub fn state(&self, index: usize) -> Option<&StepState> {
		self.states.get(index)
	}

	fn check(&self, index: usize) -> Result<&StepState, TransitionError> {
		let state = self.states.get(index).ok_or(TransitionError::OutOfRange {
			index,
			count: self.states.len(),
		})?;
		match state.status {
			StepStatus::InProgress => return Err(TransitionError::AlreadyInProgress(index)),
			StepStatus::Success => return Err(TransitionError::AlreadySucceeded(index)),
			_ => {}
		}
		if self.strict_order {
			let busy = self
				.states
				.iter()
				.position(|s| s.status == StepStatus::InProgress);
			if let Some(by) = busy {
				return Err(TransitionError::Blocked { index, by });
			}
		}
		Ok(state)
	}

	pub fn can_start(&self, index: usize) -> bool {
		self.check(index)
			.map(|state| state.status == StepStatus::NotStarted)
			.unwrap_or(false)
	}

	pub fn can_restart(&self, index: usize) -> bool {
		self.check(index)
			.map(|state| state.status.is_restartable())
			.unwrap_or(false)
	}

	/// Moves a not-started or restartable step to `InProgress`.
	pub fn begin(&mut self, index: usize) -> Result<&StepState, TransitionError> {
		self.check(index)?;
		let state = &mut self.states[index];
		state.status = StepStatus::InProgress;
		state.result = None;
		Ok(state)
	}

	/// Records the hash the ledger returned for an in-progress step.
	pub fn attach_submission(&mut self, index: usize, hash: TransactionHash) {
		if let Some(state) = self.states.get_mut(index) {
			if state.status == StepStatus::InProgress {
				state.result = Some(StepResult {
					tx_hash: Some(hash),
					error: None,
				});
			}
		}
	}

	/// Undoes `begin` after the submission itself failed.
	pub fn revert_submission(&mut self, index: usize, error: String) -> Option<&StepState> {
		let state = self.states.get_mut(index)?;
		if state.status != StepStatus::InProgress {
			return None;
		}
		state.status = StepStatus::NotStarted;
		state.result = Some(StepResult {
			tx_hash: None,
			error: Some(error),
		});
		Some(state)
	}

	/// Applies a ledger report for one step. Returns the new state when it
	/// changed.
	///
	/// Only in-progress steps whose submission was accepted move. A report
	/// carrying a different hash than our submission describes an earlier
	/// attempt and is ignored.
	pub fn observe(&mut self, report: &TreeStepStatus) -> Option<StepState> {
		let state = self.states.get_mut(report.index)?;
		if state.status != StepStatus::InProgress || !report.status.is_terminal() {
			return None;
		}

		let ours = state.result.as_ref().and_then(|r| r.tx_hash.as_ref())?;
		if let Some(theirs) = report.tx_hash.as_ref() {
			if ours != theirs {
				tracing::debug!(
					step = report.index,
					ours = %ours.truncated(),
					theirs = %theirs.truncated(),
					"Ignoring report for a previous attempt"
				);
				return None;
			}
		}

		let tx_hash = Some(ours.clone());
		state.status = report.status;
		state.result = Some(StepResult {
			tx_hash,
			error: report.error.clone(),
		});
		Some(state.clone())
	}

	pub fn all_terminal(&self) -> bool {
		self.states.iter().all(|s| s.status.is_terminal())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn hash(byte: u8) -> TransactionHash {
		TransactionHash(vec![byte; 32])
	}

	fn report(index: usize, status: StepStatus, tx: Option<u8>) -> TreeStepStatus {
		TreeStepStatus {
			index,
			status,
			tx_hash: tx.map(hash),
			error: None,
		}
	}

	#[test]
	fn test_happy_path() {
		let mut machine = StepStateMachine::new(2, false);
		assert!(machine.can_start(0));

		machine.begin(0).unwrap();
		machine.attach_submission(0, hash(1));
		let changed = machine
			.observe(&report(0, StepStatus::Success, Some(1)))
			.unwrap();
		assert_eq!(changed.status, StepStatus::Success);
		assert_eq!(changed.result.unwrap().tx_hash, Some(hash(1)));
		assert!(!machine.all_terminal());
	}

	#[test]
	fn test_success_is_final() {
		let mut machine = StepStateMachine::new(1, false);
		machine.begin(0).unwrap();
		machine.attach_submission(0, hash(1));
		machine.observe(&report(0, StepStatus::Success, None));

		assert_eq!(machine.begin(0), Err(TransitionError::AlreadySucceeded(0)));
		assert!(machine
			.observe(&report(0, StepStatus::Failed, None))
			.is_none());
		assert_eq!(machine.state(0).unwrap().status, StepStatus::Success);
	}

	#[test]
	fn test_in_progress_cannot_begin_again() {
		let mut machine = StepStateMachine::new(1, false);
		machine.begin(0).unwrap();
		assert_eq!(machine.begin(0), Err(TransitionError::AlreadyInProgress(0)));
	}

	#[test]
	fn test_restartable_states() {
		for status in [StepStatus::Failed, StepStatus::Empty, StepStatus::Skipped] {
			let mut machine = StepStateMachine::new(1, false);
			machine.begin(0).unwrap();
			machine.attach_submission(0, hash(1));
			machine.observe(&report(0, status, None));
			assert!(machine.can_restart(0), "{:?}", status);
			assert_eq!(machine.begin(0).unwrap().status, StepStatus::InProgress);
		}
	}

	#[test]
	fn test_empty_stays_distinct_from_success() {
		let mut machine = StepStateMachine::new(1, false);
		machine.begin(0).unwrap();
		machine.attach_submission(0, hash(1));
		let changed = machine.observe(&report(0, StepStatus::Empty, None)).unwrap();
		assert_eq!(changed.status, StepStatus::Empty);
		assert!(machine.all_terminal());
	}

	#[test]
	fn test_reports_wait_for_accepted_submission() {
		let mut machine = StepStateMachine::new(1, false);
		machine.begin(0).unwrap();
		assert!(machine
			.observe(&report(0, StepStatus::Failed, Some(1)))
			.is_none());
		assert_eq!(machine.state(0).unwrap().status, StepStatus::InProgress);
	}

	#[test]
	fn test_not_started_ignores_reports() {
		let mut machine = StepStateMachine::new(2, false);
		assert!(machine
			.observe(&report(1, StepStatus::Success, None))
			.is_none());
		assert_eq!(machine.state(1).unwrap().status, StepStatus::NotStarted);
	}

	#[test]
	fn test_stale_report_is_ignored_after_restart() {
		let mut machine = StepStateMachine::new(1, false);
		machine.begin(0).unwrap();
		machine.attach_submission(0, hash(1));
		machine.observe(&report(0, StepStatus::Failed, Some(1)));

		machine.begin(0).unwrap();
		machine.attach_submission(0, hash(2));
		assert!(machine
			.observe(&report(0, StepStatus::Failed, Some(1)))
			.is_none());
		assert_eq!(machine.state(0).unwrap().status, StepStatus::InProgress);

		let changed = machine
			.observe(&report(0, StepStatus::Success, Some(2)))
			.unwrap();
		assert_eq!(changed.status, StepStatus::Success);
	}

	#[test]
	fn test_revert_submission() {
		let mut machine = StepStateMachine::new(1, false);
		machine.begin(0).unwrap();
		let reverted = machine
			.revert_submission(0, "connection reset".into())
			.unwrap();
		assert_eq!(reverted.status, StepStatus::NotStarted);
		assert_eq!(
			reverted.result.as_ref().unwrap().error.as_deref(),
			Some("connection reset")
		);
		assert!(machine.can_start(0));
	}

	#[test]
	fn test_strict_order_allows_one_step_at_a_time() {
		let mut machine = StepStateMachine::new(2, true);
		machine.begin(0).unwrap();
		assert!(!machine.can_start(1));
		assert_eq!(
			machine.begin(1),
			Err(TransitionError::Blocked { index: 1, by: 0 })
		);
		machine.attach_submission(0, hash(1));
		machine.observe(&report(0, StepStatus::Success, None));
		assert!(machine.begin(1).is_ok());
	}

	#[test]
	fn test_out_of_range() {
		let mut machine = StepStateMachine::new(2, false);
		assert_eq!(
			machine.begin(5),
			Err(TransitionError::OutOfRange { index: 5, count: 2 })
		);
	}
}
