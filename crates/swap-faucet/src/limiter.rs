//! Per-requester cooldown guard.
//!
//! One record per requester holds the epoch second of its last grant.
//! Records are created on the first grant and live for the lifetime of the
//! process. Reads and the read-modify-write of [`RateLimiter::try_acquire`]
//! happen under the owning shard's lock, so two concurrent requests from the
//! same requester cannot both pass.

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

/// Source of wall-clock time in epoch seconds.
pub trait Clock: Send + Sync {
	fn now(&self) -> i64;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
	fn now(&self) -> i64 {
		chrono::Utc::now().timestamp()
	}
}

/// Clock that only moves when told to.
#[cfg(any(test, feature = "test-helpers"))]
#[derive(Debug, Clone)]
pub struct ManualClock {
	now: Arc<std::sync::atomic::AtomicI64>,
}

#[cfg(any(test, feature = "test-helpers"))]
impl ManualClock {
	pub fn new(start: i64) -> Self {
		Self {
			now: Arc::new(std::sync::atomic::AtomicI64::new(start)),
		}
	}

	pub fn advance(&self, by: Duration) {
		self.now
			.fetch_add(by.as_secs() as i64, std::sync::atomic::Ordering::SeqCst);
	}
}

#[cfg(any(test, feature = "test-helpers"))]
impl Clock for ManualClock {
	fn now(&self) -> i64 {
		self.now.load(std::sync::atomic::Ordering::SeqCst)
	}
}

/// Outcome of a cooldown check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RateDecision {
	pub allowed: bool,
	/// Seconds until the requester may be granted again. Zero when allowed.
	pub retry_after_seconds: u64,
}

impl RateDecision {
	fn allow() -> Self {
		Self {
			allowed: true,
			retry_after_seconds: 0,
		}
	}

	fn decide(last_granted_at: Option<i64>, now: i64, cooldown: Duration) -> Self {
		let cooldown = cooldown.as_secs() as i64;
		match last_granted_at {
			None => Self::allow(),
			Some(last) => {
				// A clock that stepped backwards counts as no time elapsed.
				let elapsed = (now - last).max(0);
				if elapsed >= cooldown {
					Self::allow()
				} else {
					Self {
						allowed: false,
						retry_after_seconds: (cooldown - elapsed) as u64,
					}
				}
			}
		}
	}
}

pub struct RateLimiter {
	records: DashMap<String, i64>,
	clock: Arc<dyn Clock>,
}

impl RateLimiter {
	pub fn new(clock: Arc<dyn Clock>) -> Self {
		Self {
			records: DashMap::new(),
			clock,
		}
	}

	pub fn with_system_clock() -> Self {
		Self::new(Arc::new(SystemClock))
	}

	/// Reports what [`try_acquire`](Self::try_acquire) would decide without
	/// recording anything.
	pub fn check(&self, key: &str, cooldown: Duration) -> RateDecision {
		let last = self.records.get(key).map(|record| *record);
		RateDecision::decide(last, self.clock.now(), cooldown)
	}

	/// Grants `key` if its cooldown has elapsed and records the grant.
	///
	/// Nothing is recorded when the decision is a denial. Call this only once
	/// the grant is certain to go ahead.
	pub fn try_acquire(&self, key: &str, cooldown: Duration) -> RateDecision {
		let now = self.clock.now();
		match self.records.entry(key.to_string()) {
			Entry::Occupied(mut record) => {
				let decision = RateDecision::decide(Some(*record.get()), now, cooldown);
				if decision.allowed {
					*record.get_mut() = now;
				}
				decision
			}
			Entry::Vacant(slot) => {
				slot.insert(now);
				RateDecision::allow()
			}
		}
	}

	/// Epoch second of the last grant to `key`, if any.
	pub fn last_granted_at(&self, key: &str) -> Option<i64> {
		self.records.get(key).map(|record| *record)
	}

	pub fn len(&self) -> usize {
		self.records.len()
	}

	pub fn is_empty(&self) -> bool {
		self.records.is_empty()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	const COOLDOWN: Duration = Duration::from_secs(60);

	fn limiter() -> (RateLimiter, ManualClock) {
		let clock = ManualClock::new(1_700_000_000);
		(RateLimiter::new(Arc::new(clock.clone())), clock)
	}

	#[test]
	fn test_first_request_is_granted_and_recorded() {
		let (limiter, clock) = limiter();
		assert!(limiter.try_acquire("wallet", COOLDOWN).allowed);
		assert_eq!(limiter.last_granted_at("wallet"), Some(clock.now()));
	}

	#[test]
	fn test_repeat_within_window_is_denied_with_wait() {
		let (limiter, clock) = limiter();
		assert!(limiter.try_acquire("wallet", COOLDOWN).allowed);

		clock.advance(Duration::from_secs(15));
		let decision = limiter.try_acquire("wallet", COOLDOWN);
		assert!(!decision.allowed);
		assert_eq!(decision.retry_after_seconds, 45);

		// The denial did not move the window.
		assert_eq!(limiter.last_granted_at("wallet"), Some(1_700_000_000));
	}

	#[test]
	fn test_granted_again_once_window_elapsed() {
		let (limiter, clock) = limiter();
		limiter.try_acquire("wallet", COOLDOWN);
		clock.advance(COOLDOWN);
		assert!(limiter.try_acquire("wallet", COOLDOWN).allowed);
		assert_eq!(limiter.last_granted_at("wallet"), Some(1_700_000_060));
	}

	#[test]
	fn test_check_never_records() {
		let (limiter, _) = limiter();
		assert!(limiter.check("wallet", COOLDOWN).allowed);
		assert!(limiter.is_empty());
		assert!(limiter.check("wallet", COOLDOWN).allowed);
	}

	#[test]
	fn test_requesters_are_independent() {
		let (limiter, _) = limiter();
		assert!(limiter.try_acquire("alice", COOLDOWN).allowed);
		assert!(limiter.try_acquire("bob", COOLDOWN).allowed);
		assert!(!limiter.try_acquire("alice", COOLDOWN).allowed);
		assert_eq!(limiter.len(), 2);
	}

	#[test]
	fn test_two_calls_inside_window_yield_one_grant() {
		for gap in [0u64, 1, 30, 59] {
			let (limiter, clock) = limiter();
			let first = limiter.try_acquire("wallet", COOLDOWN);
			clock.advance(Duration::from_secs(gap));
			let second = limiter.try_acquire("wallet", COOLDOWN);
			assert_eq!(
				[first.allowed, second.allowed].iter().filter(|a| **a).count(),
				1,
				"gap {}",
				gap
			);
			assert!((1..=60).contains(&second.retry_after_seconds));
		}
	}

	#[test]
	fn test_concurrent_acquires_grant_once() {
		let (limiter, _) = limiter();
		let limiter = Arc::new(limiter);

		let handles: Vec<_> = (0..16)
			.map(|_| {
				let limiter = limiter.clone();
				std::thread::spawn(move || limiter.try_acquire("wallet", COOLDOWN).allowed)
			})
			.collect();

		let granted = handles
			.into_iter()
			.map(|h| h.join().unwrap())
			.filter(|allowed| *allowed)
			.count();
		assert_eq!(granted, 1);
	}
}
