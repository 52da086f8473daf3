use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::{PollOutcome, SessionKey, StepState};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum SwapEvent {
	#[serde(rename_all = "camelCase")]
	AnchorConfirmed { key: SessionKey, signature: String },
	#[serde(rename_all = "camelCase")]
	StepChanged {
		key: SessionKey,
		index: usize,
		state: StepState,
	},
	#[serde(rename_all = "camelCase")]
	PollingStopped { key: SessionKey, outcome: PollOutcome },
}

impl SwapEvent {
	pub fn key(&self) -> &SessionKey {
		match self {
			SwapEvent::AnchorConfirmed { key, .. }
			| SwapEvent::StepChanged { key, .. }
			| SwapEvent::PollingStopped { key, .. } => key,
		}
	}
}

/// Broadcast channel for swap progress.
///
/// Subscribers see every event published after they subscribed. Publishing
/// with no subscribers is not an error worth reporting.
pub struct EventBus {
	sender: broadcast::Sender<SwapEvent>,
}

impl EventBus {
	pub fn new(capacity: usize) -> Self {
		let (sender, _) = broadcast::channel(capacity);
		Self { sender }
	}

	pub fn subscribe(&self) -> broadcast::Receiver<SwapEvent> {
		self.sender.subscribe()
	}

	pub fn publish(&self, event: SwapEvent) {
		let _ = self.sender.send(event);
	}
}

impl Clone for EventBus {
	fn clone(&self) -> Self {
		Self {
			sender: self.sender.clone(),
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{Address, StepStatus};

	#[tokio::test]
	async fn test_subscribers_receive_events() {
		let bus = EventBus::new(8);
		let mut rx = bus.subscribe();
		let key = SessionKey::new(Address::zero(), 3);

		bus.publish(SwapEvent::StepChanged {
			key: key.clone(),
			index: 1,
			state: StepState {
				status: StepStatus::InProgress,
				result: None,
			},
		});

		let event = rx.recv().await.unwrap();
		assert_eq!(event.key(), &key);
		assert!(matches!(event, SwapEvent::StepChanged { index: 1, .. }));
	}

	#[test]
	fn test_publish_without_subscribers() {
		let bus = EventBus::new(1);
		bus.publish(SwapEvent::PollingStopped {
			key: SessionKey::new(Address::zero(), 0),
			outcome: PollOutcome::Cancelled,
		});
	}
}
