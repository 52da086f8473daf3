//! Swap sessions.
//!
//! Starting a swap drafts its steps, estimates fees once, registers the tree
//! on the holding ledger through the anchor transaction and submits every
//! step to the execution ledger. A background task per session then polls
//! the tree status and feeds the step state machine until every step is
//! terminal, the tree disappears, the time limit passes, or the caller
//! cancels. Cancelling only stops observing; submitted steps keep running on
//! the ledger.
//!
//! Sessions that have been idle for longer than the configured TTL are
//! dropped together with their cached fee estimate.

use crate::estimator::{EstimationError, GasEstimator};
use crate::plan::{self, AbiCallEncoder, CallEncoder, PlanError};
use crate::state::{StepStateMachine, TransitionError};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use swap_delivery::{AnchorRequest, DeliveryService};
use swap_types::{
	Address, EventBus, FeeEstimate, PollOutcome, ScheduledStep, SessionKey, SessionSnapshot,
	StepDraft, StepStatus, SwapEvent, SwapRequest,
};
use thiserror::Error;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Error)]
pub enum OrchestratorError {
	#[error("Invalid plan: {0}")]
	InvalidPlan(String),
	#[error("Could not resolve nonce for {payer}: {reason}")]
	NonceUnavailable { payer: Address, reason: String },
	#[error("Fee estimation failed: {0}")]
	EstimationFailure(String),
	#[error("Submission failed for session {key} at {}: {reason}", step_label(.step))]
	SubmissionFailure {
		key: SessionKey,
		/// `None` when the anchor transaction failed.
		step: Option<usize>,
		reason: String,
	},
	#[error("Session {0} is busy")]
	SessionBusy(SessionKey),
	#[error("Session {0} not found")]
	SessionNotFound(SessionKey),
	#[error("Step {index} out of range, session has {count} steps")]
	StepOutOfRange { index: usize, count: usize },
	#[error(transparent)]
	InvalidTransition(#[from] TransitionError),
}

fn step_label(step: &Option<usize>) -> String {
	match step {
		Some(index) => format!("step {}", index),
		None => "anchor".to_string(),
	}
}

impl From<PlanError> for OrchestratorError {
	fn from(err: PlanError) -> Self {
		match err {
			PlanError::InvalidPlan(reason) => OrchestratorError::InvalidPlan(reason),
			other => OrchestratorError::EstimationFailure(other.to_string()),
		}
	}
}

impl From<EstimationError> for OrchestratorError {
	fn from(err: EstimationError) -> Self {
		OrchestratorError::EstimationFailure(err.to_string())
	}
}

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
	pub poll_interval: Duration,
	/// Wall-clock limit for one polling run.
	pub max_poll_duration: Duration,
	/// Keep at most one step of a session in progress.
	pub strict_order: bool,
	/// How long an idle session stays queryable.
	pub session_ttl: Duration,
}

impl Default for OrchestratorSettings {
	fn default() -> Self {
		Self {
			poll_interval: Duration::from_secs(1),
			max_poll_duration: Duration::from_secs(300),
			strict_order: false,
			session_ttl: Duration::from_secs(600),
		}
	}
}

struct Session {
	key: SessionKey,
	plan: &'static str,
	steps: Vec<ScheduledStep>,
	anchor_signature: Option<String>,
	fees: Option<FeeEstimate>,
	machine: StepStateMachine,
	starting: bool,
	/// Steps moved to `InProgress` whose submission has not returned yet.
	in_flight: usize,
	/// Set by a cancel that arrived while submissions were outstanding.
	cancel_requested: bool,
	polling: bool,
	/// Identifies the current polling task so a superseded one cannot report.
	poll_generation: u64,
	poll_task: Option<JoinHandle<()>>,
	poll_deadline: Instant,
	last_outcome: Option<PollOutcome>,
	last_activity: Instant,
	/// Removed from the session map; callers holding the handle must retry.
	evicted: bool,
}

impl Session {
	fn new(key: SessionKey) -> Self {
		Self {
			key,
			plan: "",
			steps: Vec::new(),
			anchor_signature: None,
			fees: None,
			machine: StepStateMachine::new(0, false),
			starting: false,
			in_flight: 0,
			cancel_requested: false,
			polling: false,
			poll_generation: 0,
			poll_task: None,
			poll_deadline: Instant::now(),
			last_outcome: None,
			last_activity: Instant::now(),
			evicted: false,
		}
	}

	fn is_busy(&self) -> bool {
		self.starting || self.polling || self.in_flight > 0
	}

	fn snapshot(&self) -> SessionSnapshot {
		SessionSnapshot {
			key: self.key.clone(),
			plan: self.plan.to_string(),
			steps: self.steps.clone(),
			anchor_signature: self.anchor_signature.clone(),
			fees: self.fees.clone(),
			states: self.machine.states().to_vec(),
			polling: self.polling,
			last_outcome: self.last_outcome,
		}
	}

	fn has_pending_steps(&self) -> bool {
		self.machine
			.states()
			.iter()
			.any(|s| s.status == StepStatus::InProgress)
	}
}

type SessionHandle = Arc<Mutex<Session>>;

#[derive(Clone)]
pub struct SwapOrchestrator {
	delivery: Arc<DeliveryService>,
	estimator: Arc<GasEstimator>,
	encoder: Arc<dyn CallEncoder>,
	sessions: Arc<DashMap<SessionKey, SessionHandle>>,
	events: EventBus,
	settings: OrchestratorSettings,
}

impl SwapOrchestrator {
	pub fn new(delivery: Arc<DeliveryService>, settings: OrchestratorSettings) -> Self {
		Self {
			estimator: Arc::new(GasEstimator::new(delivery.clone())),
			delivery,
			encoder: Arc::new(AbiCallEncoder),
			sessions: Arc::new(DashMap::new()),
			events: EventBus::new(1024),
			settings,
		}
	}

	pub fn with_encoder(mut self, encoder: Arc<dyn CallEncoder>) -> Self {
		self.encoder = encoder;
		self
	}

	pub fn settings(&self) -> &OrchestratorSettings {
		&self.settings
	}

	pub fn subscribe(&self) -> broadcast::Receiver<SwapEvent> {
		self.events.subscribe()
	}

	fn handle(&self, key: &SessionKey) -> Result<SessionHandle, OrchestratorError> {
		self.sessions
			.get(key)
			.map(|entry| entry.value().clone())
			.ok_or_else(|| OrchestratorError::SessionNotFound(key.clone()))
	}

	pub async fn session(&self, key: &SessionKey) -> Option<SessionSnapshot> {
		let session = self.handle(key).ok()?;
		let guard = session.lock().await;
		Some(guard.snapshot())
	}

	pub fn session_keys(&self) -> Vec<SessionKey> {
		self.sessions.iter().map(|entry| entry.key().clone()).collect()
	}

	/// Starts a swap attempt and returns once every step has been handed to
	/// the ledger. Progress continues in the background.
	///
	/// A finished session under the same key is superseded and its cached
	/// fees are dropped. One that is still starting, polling or waiting on a
	/// step submission is left alone and the call is rejected.
	#[instrument(skip(self, request), fields(payer = %request.payer, plan = request.plan.name()))]
	pub async fn start(&self, request: SwapRequest) -> Result<SessionSnapshot, OrchestratorError> {
		let SwapRequest { payer, nonce, plan } = request;
		let drafts = plan::draft_steps(&plan, &payer, self.encoder.as_ref())?;

		let nonce = match nonce {
			Some(nonce) => nonce,
			None => self
				.delivery
				.transaction_count(&payer)
				.await
				.map_err(|e| OrchestratorError::NonceUnavailable {
					payer: payer.clone(),
					reason: e.to_string(),
				})?,
		};
		let key = SessionKey::new(payer, nonce);
		self.evict_idle();

		let session = loop {
			let session = self
				.sessions
				.entry(key.clone())
				.or_insert_with(|| Arc::new(Mutex::new(Session::new(key.clone()))))
				.clone();
			let mut guard = session.lock().await;
			if guard.evicted {
				continue;
			}
			if guard.is_busy() {
				return Err(OrchestratorError::SessionBusy(key));
			}
			if !guard.plan.is_empty() {
				debug!(session = %key, "Superseding finished session");
				self.estimator.forget(&key);
			}
			guard.starting = true;
			guard.cancel_requested = false;
			guard.plan = plan.name();
			guard.steps.clear();
			guard.anchor_signature = None;
			guard.fees = None;
			guard.machine = StepStateMachine::new(0, self.settings.strict_order);
			guard.last_outcome = None;
			drop(guard);
			break session;
		};
		info!(session = %key, steps = drafts.len(), "Starting swap");

		let result = self.submit_all(&session, &key, &drafts).await;

		let mut guard = session.lock().await;
		guard.starting = false;
		guard.last_activity = Instant::now();
		if !self.honor_cancel(&mut guard) && guard.has_pending_steps() {
			self.spawn_polling(&session, &mut guard);
		}
		let snapshot = guard.snapshot();
		result.map(|_| snapshot)
	}

	/// Applies a cancel that arrived while submissions were outstanding.
	/// Returns whether one did.
	fn honor_cancel(&self, session: &mut Session) -> bool {
		if !std::mem::take(&mut session.cancel_requested) {
			return false;
		}
		if let Some(task) = session.poll_task.take() {
			task.abort();
		}
		if session.polling || session.last_outcome != Some(PollOutcome::Cancelled) {
			self.finish(session, PollOutcome::Cancelled);
		}
		true
	}

	async fn submit_all(
		&self,
		session: &SessionHandle,
		key: &SessionKey,
		drafts: &[StepDraft],
	) -> Result<(), OrchestratorError> {
		let fees = self.estimator.estimate(key, drafts).await?;
		let chain_id = self.delivery.chain_id();
		let steps = plan::schedule(drafts, &fees, &key.payer, chain_id)?;
		{
			let mut guard = session.lock().await;
			guard.steps = steps.clone();
			guard.fees = Some(fees);
			guard.machine = StepStateMachine::new(steps.len(), self.settings.strict_order);
		}

		let anchor = AnchorRequest {
			payer: key.payer.clone(),
			nonce: key.nonce,
			chain_id,
			steps: steps.clone(),
		};
		let signature = self.delivery.submit_anchor(&anchor).await.map_err(|e| {
			warn!(session = %key, error = %e, "Anchor transaction failed");
			OrchestratorError::SubmissionFailure {
				key: key.clone(),
				step: None,
				reason: e.to_string(),
			}
		})?;
		info!(session = %key, signature = %signature, "Anchor confirmed");
		session.lock().await.anchor_signature = Some(signature.clone());
		self.events.publish(SwapEvent::AnchorConfirmed {
			key: key.clone(),
			signature,
		});

		for step in &steps {
			{
				let mut guard = session.lock().await;
				if !guard.machine.can_start(step.index) {
					debug!(session = %key, step = step.index, "Step waits for an explicit start");
					break;
				}
				let state = guard.machine.begin(step.index)?.clone();
				guard.in_flight += 1;
				self.events.publish(SwapEvent::StepChanged {
					key: key.clone(),
					index: step.index,
					state,
				});
			}
			self.dispatch(session, key, step).await?;
		}
		Ok(())
	}

	/// Sends a step that has already been moved to `InProgress` and counted
	/// as in flight.
	async fn dispatch(
		&self,
		session: &SessionHandle,
		key: &SessionKey,
		step: &ScheduledStep,
	) -> Result<(), OrchestratorError> {
		let result = self.delivery.submit_step(step, key.nonce).await;

		let mut guard = session.lock().await;
		guard.in_flight = guard.in_flight.saturating_sub(1);
		guard.last_activity = Instant::now();
		match result {
			Ok(hash) => {
				debug!(session = %key, step = step.index, tx_hash = %hash.truncated(), "Step submitted");
				guard.machine.attach_submission(step.index, hash);
				if let Some(state) = guard.machine.state(step.index) {
					self.events.publish(SwapEvent::StepChanged {
						key: key.clone(),
						index: step.index,
						state: state.clone(),
					});
				}
				Ok(())
			}
			Err(e) => {
				let reason = e.to_string();
				warn!(session = %key, step = step.index, error = %reason, "Step submission failed");
				if let Some(state) = guard.machine.revert_submission(step.index, reason.clone()) {
					self.events.publish(SwapEvent::StepChanged {
						key: key.clone(),
						index: step.index,
						state: state.clone(),
					});
				}
				Err(OrchestratorError::SubmissionFailure {
					key: key.clone(),
					step: Some(step.index),
					reason,
				})
			}
		}
	}

	/// Re-submits one step with the fees the session was scheduled with.
	///
	/// Restarting a step that is already in progress changes nothing apart
	/// from making sure the session is being polled. A re-submitted step
	/// gives a running polling loop a fresh time budget.
	#[instrument(skip(self), fields(session = %key))]
	pub async fn restart_step(
		&self,
		key: &SessionKey,
		index: usize,
	) -> Result<SessionSnapshot, OrchestratorError> {
		let session = self.handle(key)?;
		let step = {
			let mut guard = session.lock().await;
			if guard.evicted {
				return Err(OrchestratorError::SessionNotFound(key.clone()));
			}
			if guard.starting {
				return Err(OrchestratorError::SessionBusy(key.clone()));
			}
			let count = guard.steps.len();
			let status = guard
				.machine
				.state(index)
				.map(|state| state.status)
				.ok_or(OrchestratorError::StepOutOfRange { index, count })?;
			if status == StepStatus::InProgress {
				debug!(step = index, "Step already in progress");
				self.ensure_polling(&session, &mut guard);
				return Ok(guard.snapshot());
			}

			let state = guard.machine.begin(index)?.clone();
			guard.in_flight += 1;
			self.events.publish(SwapEvent::StepChanged {
				key: key.clone(),
				index,
				state,
			});
			guard.steps[index].clone()
		};
		info!(step = index, "Restarting step");

		let result = self.dispatch(&session, key, &step).await;

		let mut guard = session.lock().await;
		if self.honor_cancel(&mut guard) {
			return result.map(|_| guard.snapshot());
		}
		result?;
		if guard.polling {
			guard.poll_deadline = Instant::now() + self.settings.max_poll_duration;
		} else {
			self.spawn_polling(&session, &mut guard);
		}
		Ok(guard.snapshot())
	}

	/// Polls again after a run stopped without every step settling.
	pub async fn resume_polling(
		&self,
		key: &SessionKey,
	) -> Result<SessionSnapshot, OrchestratorError> {
		let session = self.handle(key)?;
		let mut guard = session.lock().await;
		if guard.starting {
			return Err(OrchestratorError::SessionBusy(key.clone()));
		}
		self.ensure_polling(&session, &mut guard);
		Ok(guard.snapshot())
	}

	/// Stops polling a session. Submitted steps are unaffected.
	///
	/// A session that is still handing steps to the ledger finishes doing so
	/// and then stays unpolled.
	pub async fn cancel(&self, key: &SessionKey) -> Result<SessionSnapshot, OrchestratorError> {
		let session = self.handle(key)?;
		let mut guard = session.lock().await;
		self.stop_polling(&mut guard);
		Ok(guard.snapshot())
	}

	pub async fn cancel_all(&self) {
		let sessions: Vec<SessionHandle> = self
			.sessions
			.iter()
			.map(|entry| entry.value().clone())
			.collect();
		for session in sessions {
			let mut guard = session.lock().await;
			self.stop_polling(&mut guard);
		}
	}

	fn stop_polling(&self, session: &mut Session) {
		if session.starting || session.in_flight > 0 {
			session.cancel_requested = true;
		}
		if let Some(task) = session.poll_task.take() {
			task.abort();
		}
		if session.polling {
			self.finish(session, PollOutcome::Cancelled);
		}
	}

	fn ensure_polling(&self, handle: &SessionHandle, session: &mut Session) {
		if !session.polling {
			self.spawn_polling(handle, session);
		}
	}

	fn spawn_polling(&self, handle: &SessionHandle, session: &mut Session) {
		session.polling = true;
		session.last_outcome = None;
		session.poll_generation += 1;
		session.poll_deadline = Instant::now() + self.settings.max_poll_duration;

		let orchestrator = self.clone();
		let handle = Arc::clone(handle);
		let key = session.key.clone();
		let generation = session.poll_generation;
		session.poll_task = Some(tokio::spawn(async move {
			orchestrator.poll(handle, key, generation).await;
		}));
	}

	async fn poll(self, session: SessionHandle, key: SessionKey, generation: u64) {
		debug!(session = %key, "Polling started");

		let outcome = loop {
			tokio::time::sleep(self.settings.poll_interval).await;

			{
				let guard = session.lock().await;
				if !guard.polling || guard.poll_generation != generation {
					return;
				}
				if Instant::now() >= guard.poll_deadline {
					warn!(session = %key, "Polling timed out, unfinished steps keep their observed state");
					break PollOutcome::TimedOut;
				}
			}

			match self.delivery.tree_status(&key.payer, key.nonce).await {
				Ok(None) => {
					warn!(session = %key, "Ledger no longer reports the step tree");
					break PollOutcome::TreeMissing;
				}
				Ok(Some(tree)) => {
					let mut guard = session.lock().await;
					if !guard.polling || guard.poll_generation != generation {
						return;
					}
					for report in &tree.steps {
						if let Some(state) = guard.machine.observe(report) {
							info!(session = %key, step = report.index, status = ?state.status, "Step finished");
							self.events.publish(SwapEvent::StepChanged {
								key: key.clone(),
								index: report.index,
								state,
							});
						}
					}
					if guard.machine.all_terminal() {
						self.finish(&mut guard, PollOutcome::Completed);
						return;
					}
				}
				Err(e) => {
					warn!(session = %key, error = %e, "Tree status query failed");
				}
			}
		};

		let mut guard = session.lock().await;
		if guard.polling && guard.poll_generation == generation {
			self.finish(&mut guard, outcome);
		}
	}

	/// Drops sessions that have been idle for at least the session TTL along
	/// with their cached fees. Sessions locked by another caller are skipped.
	pub fn evict_idle(&self) -> usize {
		let candidates: Vec<(SessionKey, SessionHandle)> = self
			.sessions
			.iter()
			.map(|entry| (entry.key().clone(), entry.value().clone()))
			.collect();

		let mut evicted = 0;
		for (key, handle) in candidates {
			let Ok(mut guard) = handle.try_lock() else {
				continue;
			};
			if guard.is_busy() || guard.last_activity.elapsed() < self.settings.session_ttl {
				continue;
			}
			guard.evicted = true;
			self.sessions.remove(&key);
			self.estimator.forget(&key);
			evicted += 1;
			debug!(session = %key, "Evicted idle session");
		}
		evicted
	}

	fn finish(&self, session: &mut Session, outcome: PollOutcome) {
		session.polling = false;
		session.poll_task = None;
		session.last_outcome = Some(outcome);
		session.last_activity = Instant::now();
		info!(session = %session.key, outcome = ?outcome, "Polling stopped");
		self.events.publish(SwapEvent::PollingStopped {
			key: session.key.clone(),
			outcome,
		});
	}
}
