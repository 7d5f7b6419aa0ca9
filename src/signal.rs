//! Framework-agnostic "session is no longer valid" notifications.
//!
//! Hosts subscribe once (typically the UI shell) and react by forcing a logout or redirect.
//! Emission is fire-and-forget: listeners run synchronously on the emitting task and nothing is
//! returned to the emitter.

// std
use std::{
	panic::{self, AssertUnwindSafe},
	sync::atomic::{AtomicU64, Ordering},
};
// self
use crate::_prelude::*;

type Listener = Arc<dyn Fn(&UnauthorizedEvent) + Send + Sync>;

/// Why the session was invalidated.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnauthorizedReason {
	/// Refresh preconditions failed or the refresh call itself failed.
	TokenRefreshFailed,
	/// A request was still rejected after its one replay.
	RetryExhausted,
}
impl UnauthorizedReason {
	/// Returns a stable label suitable for logs and serialized events.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::TokenRefreshFailed => "token_refresh_failed",
			Self::RetryExhausted => "retry_exhausted",
		}
	}
}
impl Display for UnauthorizedReason {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Payload delivered to every listener.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnauthorizedEvent {
	/// Trigger of the invalidation.
	pub reason: UnauthorizedReason,
	/// Emission instant.
	pub timestamp: OffsetDateTime,
}
impl UnauthorizedEvent {
	/// Creates an event stamped with the current time.
	pub fn now(reason: UnauthorizedReason) -> Self {
		Self { reason, timestamp: OffsetDateTime::now_utc() }
	}
}

/// Handle returned by [`UnauthorizedSignal::subscribe`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

/// Subscriber registry shared by the session manager and every client.
///
/// Clones share the same registry.
#[derive(Clone, Default)]
pub struct UnauthorizedSignal(Arc<SignalInner>);
impl UnauthorizedSignal {
	/// Registers a listener and returns the handle needed to remove it.
	pub fn subscribe<F>(&self, listener: F) -> SubscriptionId
	where
		F: 'static + Fn(&UnauthorizedEvent) + Send + Sync,
	{
		let id = SubscriptionId(self.0.next_id.fetch_add(1, Ordering::Relaxed));

		self.0.listeners.write().push((id, Arc::new(listener)));

		id
	}

	/// Removes a listener; returns `false` when the handle was unknown.
	pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
		let mut listeners = self.0.listeners.write();
		let before = listeners.len();

		listeners.retain(|(existing, _)| *existing != id);

		listeners.len() != before
	}

	/// Delivers `event` to every listener registered at the time of the call.
	///
	/// Listeners may subscribe or unsubscribe from inside the callback. A panicking listener is
	/// logged and skipped; the rest still run.
	pub fn emit(&self, event: &UnauthorizedEvent) {
		let listeners = self
			.0
			.listeners
			.read()
			.iter()
			.map(|(_, listener)| listener.clone())
			.collect::<Vec<_>>();

		tracing::info!(
			reason = event.reason.as_str(),
			listeners = listeners.len(),
			"Session invalidated."
		);

		for listener in listeners {
			if panic::catch_unwind(AssertUnwindSafe(|| listener(event))).is_err() {
				tracing::error!(reason = event.reason.as_str(), "Unauthorized listener panicked.");
			}
		}
	}

	/// Emits an event for `reason` stamped with the current time.
	pub fn notify(&self, reason: UnauthorizedReason) {
		self.emit(&UnauthorizedEvent::now(reason));
	}

	/// Number of registered listeners.
	pub fn listener_count(&self) -> usize {
		self.0.listeners.read().len()
	}
}
impl Debug for UnauthorizedSignal {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("UnauthorizedSignal").field("listeners", &self.listener_count()).finish()
	}
}

#[derive(Default)]
struct SignalInner {
	next_id: AtomicU64,
	listeners: RwLock<Vec<(SubscriptionId, Listener)>>,
}
