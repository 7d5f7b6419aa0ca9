//! Session lifecycle: login, registration, logout, validity predicates, and single-flight refresh.
//!
//! [`SessionManager`] is the only writer of the [`TokenStore`]. Build one instance at startup and
//! hand clones to every [`ClientFactory`](crate::client::ClientFactory); clones share the store,
//! the unauthorized signal, and the in-flight refresh handle.

pub mod policy;
pub mod refresh;
pub mod wire;

pub use policy::*;
pub use refresh::RefreshMetrics;
pub use wire::{Credentials, Registration};

// std
use std::time::Duration as StdDuration;
// crates.io
use futures::future::{BoxFuture, Shared};
// self
use crate::{
	_prelude::*,
	auth::{SessionState, SessionTokens, TokenSecret, UserProfile},
	error::{ConfigError, ErrorKind, RefreshError},
	http::{ApiRequest, ApiResponse, HttpTransport, Method, join_url},
	normalize::{self, StatusMessages},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	session::wire::{AuthResponse, LogoutRequest, MeResponse},
	signal::{UnauthorizedReason, UnauthorizedSignal},
	store::TokenStore,
};
#[cfg(feature = "reqwest")] use crate::http::ReqwestTransport;

/// Service name used when normalizing auth-endpoint failures.
pub const AUTH_SERVICE: &str = "authentication";

const LOGIN_PATH: &str = "auth/login";
const REGISTER_PATH: &str = "auth/register";
const REFRESH_PATH: &str = "auth/refresh";
const LOGOUT_PATH: &str = "auth/logout";
const ME_PATH: &str = "auth/me";
const VALIDATE_PATH: &str = "auth/validate";

type PendingRefresh = Shared<BoxFuture<'static, Result<(), RefreshError>>>;

/// Returns `true` for login, registration, and refresh URLs.
///
/// A 401 from these endpoints never triggers a refresh.
pub fn is_auth_endpoint(url: &Url) -> bool {
	let path = url.path().trim_end_matches('/');

	[LOGIN_PATH, REGISTER_PATH, REFRESH_PATH]
		.iter()
		.any(|endpoint| path.strip_suffix(endpoint).is_some_and(|rest| rest.ends_with('/')))
}

/// Owns the session token lifecycle against one auth backend.
#[derive(Clone)]
pub struct SessionManager {
	auth_base: Url,
	transport: Arc<dyn HttpTransport>,
	store: TokenStore,
	signal: UnauthorizedSignal,
	policy: SessionPolicy,
	timeout: Option<StdDuration>,
	flight: Arc<RefreshFlight>,
}
impl SessionManager {
	/// Creates a manager that talks to `auth_base` through the provided transport.
	///
	/// The manager starts with an in-memory [`TokenStore`], a fresh [`UnauthorizedSignal`], and
	/// the default [`SessionPolicy`]. Configure it with the `with_*` methods before cloning it.
	pub fn with_transport<T>(auth_base: Url, transport: T) -> Self
	where
		T: HttpTransport,
	{
		Self::with_shared_transport(auth_base, Arc::new(transport))
	}

	/// Same as [`SessionManager::with_transport`] for an already shared transport.
	pub fn with_shared_transport(auth_base: Url, transport: Arc<dyn HttpTransport>) -> Self {
		Self {
			auth_base,
			transport,
			store: TokenStore::default(),
			signal: UnauthorizedSignal::default(),
			policy: SessionPolicy::default(),
			timeout: None,
			flight: Default::default(),
		}
	}

	/// Replaces the token store.
	pub fn with_store(mut self, store: TokenStore) -> Self {
		self.store = store;

		self
	}

	/// Replaces the unauthorized signal, e.g. to share one registry across managers.
	pub fn with_signal(mut self, signal: UnauthorizedSignal) -> Self {
		self.signal = signal;

		self
	}

	/// Replaces the expiry policy.
	pub fn with_policy(mut self, policy: SessionPolicy) -> Self {
		self.policy = policy;

		self
	}

	/// Sets the timeout applied to every auth-endpoint call.
	pub fn with_timeout(mut self, timeout: StdDuration) -> Self {
		self.timeout = Some(timeout);

		self
	}

	/// Base URL of the auth backend.
	pub fn auth_base(&self) -> &Url {
		&self.auth_base
	}

	/// Token store owned by this manager.
	pub fn store(&self) -> &TokenStore {
		&self.store
	}

	/// Signal fired whenever the session becomes invalid.
	pub fn signal(&self) -> &UnauthorizedSignal {
		&self.signal
	}

	/// Expiry policy in use.
	pub fn policy(&self) -> &SessionPolicy {
		&self.policy
	}

	/// Transport shared with clients built from this manager.
	pub fn transport(&self) -> &Arc<dyn HttpTransport> {
		&self.transport
	}

	/// Counters describing refresh activity.
	pub fn refresh_metrics(&self) -> &RefreshMetrics {
		&self.flight.metrics
	}

	/// Signs in and persists the issued pair with locally computed expiries.
	pub async fn login(&self, credentials: &Credentials) -> Result<SessionTokens> {
		self.issue(FlowKind::Login, LOGIN_PATH, credentials).await
	}

	/// Creates an account and persists the issued pair like [`SessionManager::login`].
	pub async fn register(&self, registration: &Registration) -> Result<SessionTokens> {
		self.issue(FlowKind::Register, REGISTER_PATH, registration).await
	}

	/// Invalidates the session server-side (best effort) and always clears it locally.
	pub async fn logout(&self) {
		const KIND: FlowKind = FlowKind::Logout;

		let span = FlowSpan::new(KIND, "logout");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		span.instrument(async {
			if let Err(e) = self.revoke_remote().await {
				tracing::warn!(error = %e, "Server-side logout failed, clearing the local session.");
			}

			self.clear_session();
		})
		.await;

		obs::record_flow_outcome(KIND, FlowOutcome::Success);
	}

	/// Drops every stored credential without contacting the server or firing the signal.
	pub fn clear_session(&self) {
		let mut epoch = self.flight.epoch.lock();

		*epoch += 1;

		self.store.clear_all();
	}

	/// Access token and profile are stored and either token is still alive.
	pub fn is_authenticated(&self) -> bool {
		if self.store.access_token().is_none() || self.store.user().is_none() {
			return false;
		}

		let now = OffsetDateTime::now_utc();
		let alive = |expiry: Option<OffsetDateTime>| expiry.is_some_and(|expiry| expiry > now);

		alive(self.store.access_expiry()) || alive(self.store.refresh_expiry())
	}

	/// Refresh token is stored and not expired.
	pub fn can_refresh(&self) -> bool {
		let now = OffsetDateTime::now_utc();

		self.store.refresh_token().is_some()
			&& self.store.refresh_expiry().is_some_and(|expiry| expiry > now)
	}

	/// Current lifecycle state.
	pub fn state(&self) -> SessionState {
		if self.flight.pending.lock().is_some() {
			return SessionState::Refreshing;
		}
		if self.store.access_token().is_none() {
			return SessionState::Anonymous;
		}

		if self.is_authenticated() { SessionState::Authenticated } else { SessionState::Expired }
	}

	/// Stored access token is present and outside the expiry buffer.
	pub fn has_usable_access_token(&self) -> bool {
		let now = OffsetDateTime::now_utc();

		self.store
			.snapshot()
			.is_some_and(|tokens| tokens.is_usable_at(now, self.policy.expiry_buffer()))
	}

	/// Stored user profile.
	pub fn current_user(&self) -> Option<UserProfile> {
		self.store.user()
	}

	/// Complete stored session, if any.
	pub fn session(&self) -> Option<SessionTokens> {
		self.store.snapshot()
	}

	/// Fetches the profile from `GET /auth/me` and updates the stored copy.
	pub async fn me(&self) -> Result<UserProfile> {
		const KIND: FlowKind = FlowKind::Profile;

		let span = FlowSpan::new(KIND, "me");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span
			.instrument(async {
				let response = self.call(self.request(Method::Get, ME_PATH)?).await?;
				let user = response.json::<MeResponse>()?.into_profile();

				if self.store.access_token().is_some() {
					self.store.set_user(&user);
				}

				Ok(user)
			})
			.await;

		obs::record_flow_result(KIND, &result);

		result
	}

	/// Asks `GET /auth/validate` whether the stored access token is accepted.
	///
	/// Auth failures answer `false`; other failures are returned.
	pub async fn validate(&self) -> Result<bool> {
		if self.store.access_token().is_none() {
			return Ok(false);
		}

		match self.call(self.request(Method::Get, VALIDATE_PATH)?).await {
			Ok(_) => Ok(true),
			Err(e) if e.kind() == ErrorKind::Auth => Ok(false),
			Err(e) => Err(e),
		}
	}

	pub(crate) fn expire(&self, reason: UnauthorizedReason) {
		self.clear_session();
		self.signal.notify(reason);
	}

	pub(crate) fn epoch(&self) -> u64 {
		*self.flight.epoch.lock()
	}

	/// Tears the session down only while it is still the one observed at `epoch`.
	pub(crate) fn expire_if_current(&self, epoch: u64, reason: UnauthorizedReason) -> bool {
		{
			let mut current = self.flight.epoch.lock();

			if *current != epoch {
				return false;
			}

			*current += 1;

			self.store.clear_all();
		}

		self.signal.notify(reason);

		true
	}

	async fn issue<B>(&self, kind: FlowKind, path: &'static str, body: &B) -> Result<SessionTokens>
	where
		B: ?Sized + Serialize + Sync,
	{
		let span = FlowSpan::new(kind, path);

		obs::record_flow_outcome(kind, FlowOutcome::Attempt);

		let result = span
			.instrument(async {
				let request = self.request(Method::Post, path)?.with_json(body)?;
				let issued = self.call(request).await?.json::<AuthResponse>()?;

				Ok(self.install(issued))
			})
			.await;

		obs::record_flow_result(kind, &result);

		result
	}

	fn install(&self, issued: AuthResponse) -> SessionTokens {
		let hints = ExpiryHints::from_response(
			&issued.access_token,
			Some(&issued.refresh_token),
			issued.expires_in,
			issued.refresh_expires_in,
		);
		let expiries = self.policy.expiries(OffsetDateTime::now_utc(), &hints);
		let tokens = SessionTokens {
			access_token: issued.access_token,
			refresh_token: issued.refresh_token,
			access_expiry: expiries.access,
			refresh_expiry: expiries.refresh,
			user: issued.user,
		};
		let mut epoch = self.flight.epoch.lock();

		*epoch += 1;

		self.store.persist(&tokens);

		tokens
	}

	async fn revoke_remote(&self) -> Result<()> {
		let refresh_token = self.store.refresh_token();

		if refresh_token.is_none() && self.store.access_token().is_none() {
			return Ok(());
		}

		let body = LogoutRequest { refresh_token: refresh_token.as_ref().map(TokenSecret::expose) };
		let request = self.request(Method::Post, LOGOUT_PATH)?.with_json(&body)?;

		self.call(request).await.map(|_| ())
	}

	fn request(&self, method: Method, path: &str) -> Result<ApiRequest, ConfigError> {
		let mut request = ApiRequest::new(method, join_url(&self.auth_base, path)?);

		if let Some(timeout) = self.timeout {
			request = request.with_timeout(timeout);
		}
		if let Some(token) = self.store.access_token() {
			request = request.with_bearer(&token);
		}

		Ok(request)
	}

	async fn call(&self, request: ApiRequest) -> Result<ApiResponse> {
		let snapshot = request.snapshot();
		let response = self
			.transport
			.execute(request)
			.await
			.map_err(|e| normalize::transport_error(&e, snapshot.clone(), AUTH_SERVICE))?;

		if response.is_success() {
			Ok(response)
		} else {
			Err(normalize::response_error(&response, snapshot, &StatusMessages::default()).into())
		}
	}
}
#[cfg(feature = "reqwest")]
impl SessionManager {
	/// Creates a manager backed by the crate's default reqwest transport.
	pub fn new(auth_base: Url) -> Self {
		Self::with_transport(auth_base, ReqwestTransport::default())
	}
}
impl Debug for SessionManager {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("SessionManager")
			.field("auth_base", &self.auth_base.as_str())
			.field("store", &self.store)
			.field("policy", &self.policy)
			.field("timeout", &self.timeout)
			.field("refreshing", &self.flight.pending.lock().is_some())
			.finish()
	}
}

/// Single-flight bookkeeping shared by every clone of a manager.
#[derive(Default)]
struct RefreshFlight {
	pending: Mutex<Option<PendingRefresh>>,
	// Bumped whenever the stored session is replaced or cleared.
	epoch: Mutex<u64>,
	metrics: RefreshMetrics,
}
