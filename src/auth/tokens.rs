//! Session token pair and lifecycle status helpers.

// self
use crate::{
	_prelude::*,
	auth::{profile::UserProfile, secret::TokenSecret},
};

/// Lifecycle states a session moves through.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
	/// No credentials are stored.
	Anonymous,
	/// Credentials are stored and the refresh token is still alive.
	Authenticated,
	/// A refresh is in flight.
	Refreshing,
	/// Credentials are stored but the refresh token is past its expiry.
	Expired,
}
impl SessionState {
	/// Returns a stable label suitable for logs.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Anonymous => "anonymous",
			Self::Authenticated => "authenticated",
			Self::Refreshing => "refreshing",
			Self::Expired => "expired",
		}
	}
}
impl Display for SessionState {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Credential pair plus expiries and the profile it was issued for.
///
/// `access_expiry <= refresh_expiry` holds for every pair built by the session manager.
#[derive(Clone)]
pub struct SessionTokens {
	/// Short-lived bearer credential.
	pub access_token: TokenSecret,
	/// Longer-lived credential exchanged for new access tokens.
	pub refresh_token: TokenSecret,
	/// Instant after which the access token is treated as expired.
	pub access_expiry: OffsetDateTime,
	/// Instant after which the session cannot be recovered.
	pub refresh_expiry: OffsetDateTime,
	/// Profile the pair was issued for.
	pub user: UserProfile,
}
impl SessionTokens {
	/// Session can still be recovered at `instant`.
	pub fn is_valid_at(&self, instant: OffsetDateTime) -> bool {
		self.refresh_expiry > instant
	}

	/// Access token can be used at `instant` without a refresh, keeping `buffer` in reserve.
	pub fn is_usable_at(&self, instant: OffsetDateTime, buffer: Duration) -> bool {
		self.is_valid_at(instant) && self.access_expiry - buffer > instant
	}

	/// Status at `instant`, ignoring any in-flight refresh.
	pub fn state_at(&self, instant: OffsetDateTime) -> SessionState {
		if self.is_valid_at(instant) { SessionState::Authenticated } else { SessionState::Expired }
	}
}
impl Debug for SessionTokens {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("SessionTokens")
			.field("access_token", &"<redacted>")
			.field("refresh_token", &"<redacted>")
			.field("access_expiry", &self.access_expiry)
			.field("refresh_expiry", &self.refresh_expiry)
			.field("user", &self.user)
			.finish()
	}
}
