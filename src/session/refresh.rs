//! Single-flight session refresh.
//!
//! The first caller that needs a refresh installs a shared future in the manager; every caller
//! arriving while it is pending awaits that same future and observes the same outcome. The handle
//! is cleared only after the refresh settles, and a failed refresh tears the session down before
//! any waiter resumes.
//!
//! A refresh that settles after the session was cleared or replaced (logout, a new login) is
//! discarded with [`RefreshError::Superseded`]: success does not resurrect the old session and
//! failure does not tear down the new one. A panic inside the flight settles it as
//! [`RefreshError::Aborted`] so the handle never stays stuck.

mod metrics;

pub use metrics::RefreshMetrics;

// std
use std::panic::AssertUnwindSafe;
// crates.io
use futures::FutureExt;
// self
use crate::{
	_prelude::*,
	auth::{SessionTokens, TokenSecret},
	error::RefreshError,
	http::Method,
	normalize::{self, StatusMessages},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	session::{
		AUTH_SERVICE, ExpiryHints, REFRESH_PATH, SessionManager,
		wire::{RefreshRequest, RefreshResponse},
	},
	signal::UnauthorizedReason,
};

impl SessionManager {
	/// Exchanges the stored refresh token for a new access token.
	///
	/// Concurrent callers share one network call. Missing or expired refresh tokens fail before
	/// any I/O. Every failure other than [`RefreshError::Superseded`] clears the session and fires
	/// the unauthorized signal with `token_refresh_failed` before the error is returned.
	pub async fn refresh(&self) -> Result<(), RefreshError> {
		let pending = {
			let mut slot = self.flight.pending.lock();

			match slot.as_ref() {
				Some(pending) => {
					self.flight.metrics.record_join();

					pending.clone()
				},
				None => {
					let manager = self.clone();
					let pending = async move { manager.run_refresh().await }.boxed().shared();

					*slot = Some(pending.clone());

					pending
				},
			}
		};

		pending.await
	}

	async fn run_refresh(&self) -> Result<(), RefreshError> {
		const KIND: FlowKind = FlowKind::Refresh;

		let span = FlowSpan::new(KIND, "refresh");
		let epoch = self.epoch();

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);
		self.flight.metrics.record_attempt();

		let result =
			match AssertUnwindSafe(span.instrument(self.refresh_once(epoch))).catch_unwind().await {
				Ok(result) => result,
				Err(_) => {
					tracing::error!("Session refresh panicked.");

					Err(RefreshError::Aborted)
				},
			};
		let result = match result {
			Ok(()) => {
				self.flight.metrics.record_success();

				Ok(())
			},
			Err(RefreshError::Superseded) => {
				self.flight.metrics.record_failure();

				tracing::debug!("Discarded a refresh that outlived its session.");

				Err(RefreshError::Superseded)
			},
			Err(e) => {
				self.flight.metrics.record_failure();

				if self.expire_if_current(epoch, UnauthorizedReason::TokenRefreshFailed) {
					tracing::warn!(error = %e, "Session refresh failed.");

					Err(e)
				} else {
					tracing::debug!(error = %e, "Refresh failed after its session was replaced.");

					Err(RefreshError::Superseded)
				}
			},
		};

		obs::record_flow_result(KIND, &result);
		self.flight.pending.lock().take();

		result
	}

	async fn refresh_once(&self, epoch: u64) -> Result<(), RefreshError> {
		let refresh_token = self.store.refresh_token().ok_or(RefreshError::MissingRefreshToken)?;

		match self.store.refresh_expiry() {
			Some(expiry) if expiry > OffsetDateTime::now_utc() => {},
			expired_at => return Err(RefreshError::RefreshTokenExpired { expired_at }),
		}

		let request = self
			.request(Method::Post, REFRESH_PATH)
			.and_then(|request| {
				request.with_json(&RefreshRequest { refresh_token: refresh_token.expose() })
			})
			.map_err(|e| RefreshError::Request { message: e.to_string() })?;
		let snapshot = request.snapshot();
		let response = self.transport.execute(request).await.map_err(|e| {
			RefreshError::Unreachable { message: normalize::diagnose_transport(&e, AUTH_SERVICE) }
		})?;

		if !response.is_success() {
			let message =
				normalize::response_error(&response, snapshot, &StatusMessages::default()).message;

			return Err(RefreshError::Rejected { status: response.status, message });
		}

		let body = response.json::<RefreshResponse>().map_err(|e| {
			let message = match e {
				Error::Decode { source, .. } => source.to_string(),
				other => other.to_string(),
			};

			RefreshError::InvalidResponse { message }
		})?;
		let tokens = self.rotate(refresh_token, body)?;
		let current = self.flight.epoch.lock();

		if *current != epoch {
			return Err(RefreshError::Superseded);
		}

		self.store.persist(&tokens);

		Ok(())
	}

	/// Builds the next pair: the whole pair when the server rotated it, otherwise only a new
	/// access token capped at the stored refresh expiry.
	fn rotate(
		&self,
		refresh_token: TokenSecret,
		body: RefreshResponse,
	) -> Result<SessionTokens, RefreshError> {
		if body.access_token.is_blank() {
			return Err(RefreshError::InvalidResponse {
				message: "the response did not include an access token".into(),
			});
		}

		let rotated = body.rotated();
		let hints = ExpiryHints::from_response(
			&body.access_token,
			body.refresh_token.as_ref(),
			body.expires_in,
			body.refresh_expires_in,
		);
		let expiries = self.policy.expiries(OffsetDateTime::now_utc(), &hints);
		let RefreshResponse { access_token, refresh_token: issued_refresh, user, .. } = body;
		let user = user.or_else(|| self.store.user()).ok_or_else(|| {
			RefreshError::InvalidResponse { message: "no user profile is available".into() }
		})?;
		let tokens = match issued_refresh.filter(|token| rotated && !token.is_blank()) {
			Some(issued_refresh) => SessionTokens {
				access_token,
				refresh_token: issued_refresh,
				access_expiry: expiries.access,
				refresh_expiry: expiries.refresh,
				user,
			},
			None => {
				let refresh_expiry = self.store.refresh_expiry().unwrap_or(expiries.refresh);

				SessionTokens {
					access_token,
					refresh_token,
					access_expiry: expiries.access.min(refresh_expiry),
					refresh_expiry,
					user,
				}
			},
		};

		Ok(tokens)
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::sync::atomic::{AtomicUsize, Ordering};
	// self
	use super::*;
	use crate::{
		auth::UserProfile,
		error::TransportError,
		http::{ApiRequest, HttpTransport, TransportFuture},
		signal::UnauthorizedEvent,
	};

	#[derive(Default)]
	struct CountingOffline(Arc<AtomicUsize>);
	impl HttpTransport for CountingOffline {
		fn execute(&self, _: ApiRequest) -> TransportFuture<'_> {
			self.0.fetch_add(1, Ordering::SeqCst);

			Box::pin(async { Err(TransportError::unreachable(std::io::Error::other("dns"))) })
		}
	}

	fn manager() -> (SessionManager, Arc<AtomicUsize>, Arc<Mutex<Vec<UnauthorizedEvent>>>) {
		let calls = Arc::new(AtomicUsize::new(0));
		let base = Url::parse("https://auth.example.com").expect("Test URL should parse.");
		let manager = SessionManager::with_transport(base, CountingOffline(calls.clone()));
		let events = Arc::new(Mutex::new(Vec::new()));
		let sink = events.clone();

		manager.signal().subscribe(move |event| sink.lock().push(event.clone()));

		(manager, calls, events)
	}

	fn seed(manager: &SessionManager, refresh_in: Duration) {
		let now = OffsetDateTime::now_utc();

		manager.store().persist(&SessionTokens {
			access_token: TokenSecret::new("access"),
			refresh_token: TokenSecret::new("refresh"),
			access_expiry: now - Duration::minutes(5),
			refresh_expiry: now + refresh_in,
			user: UserProfile::new("u-1", "org-1", "Acme", "member"),
		});
	}

	#[tokio::test]
	async fn expired_refresh_token_fails_without_network() {
		let (manager, calls, events) = manager();

		seed(&manager, -Duration::minutes(1));

		let err = manager.refresh().await.expect_err("Expired refresh token should fail.");

		assert!(matches!(err, RefreshError::RefreshTokenExpired { expired_at: Some(_) }));
		assert_eq!(calls.load(Ordering::SeqCst), 0);
		assert!(manager.session().is_none());
		assert_eq!(events.lock().len(), 1);
		assert_eq!(events.lock()[0].reason, UnauthorizedReason::TokenRefreshFailed);
		assert_eq!(manager.refresh_metrics().failures(), 1);
	}

	#[tokio::test]
	async fn missing_refresh_token_fails_without_network() {
		let (manager, calls, events) = manager();
		let err = manager.refresh().await.expect_err("Missing refresh token should fail.");

		assert_eq!(err, RefreshError::MissingRefreshToken);
		assert_eq!(calls.load(Ordering::SeqCst), 0);
		assert_eq!(events.lock().len(), 1);
	}

	#[tokio::test]
	async fn network_failure_tears_session_down() {
		let (manager, calls, events) = manager();

		seed(&manager, Duration::hours(1));

		let err = manager.refresh().await.expect_err("Unreachable refresh endpoint should fail.");

		assert!(matches!(err, RefreshError::Unreachable { .. }));
		assert_eq!(calls.load(Ordering::SeqCst), 1);
		assert!(!manager.is_authenticated());
		assert_eq!(events.lock().len(), 1);
		assert_eq!(manager.state(), crate::auth::SessionState::Anonymous);
	}

	#[test]
	fn access_only_rotation_keeps_refresh_token_and_caps_expiry() {
		let (manager, _, _) = manager();

		seed(&manager, Duration::hours(2));

		let body: RefreshResponse = serde_json::from_str(
			r#"{"access_token":"next","refresh_token":"echo","token_rotated":false}"#,
		)
		.expect("Refresh response should decode.");
		let stored_refresh_expiry =
			manager.store().refresh_expiry().expect("Seeded refresh expiry should be readable.");
		let tokens = manager
			.rotate(TokenSecret::new("refresh"), body)
			.expect("Access-only rotation should succeed.");

		assert_eq!(tokens.access_token.expose(), "next");
		assert_eq!(tokens.refresh_token.expose(), "refresh");
		assert_eq!(tokens.refresh_expiry, stored_refresh_expiry);
		assert_eq!(tokens.access_expiry, stored_refresh_expiry);
		assert_eq!(tokens.user.user_id, "u-1");
	}

	#[test]
	fn full_rotation_recomputes_both_expiries() {
		let (manager, _, _) = manager();

		seed(&manager, Duration::hours(2));

		let before = OffsetDateTime::now_utc();
		let body: RefreshResponse = serde_json::from_str(
			r#"{"access_token":"next","refresh_token":"rotated","expires_in":60}"#,
		)
		.expect("Refresh response should decode.");
		let tokens = manager
			.rotate(TokenSecret::new("refresh"), body)
			.expect("Full rotation should succeed.");

		assert_eq!(tokens.refresh_token.expose(), "rotated");
		assert!(tokens.access_expiry >= before + Duration::hours(12));
		assert!(tokens.refresh_expiry >= before + Duration::hours(24));
	}
}
