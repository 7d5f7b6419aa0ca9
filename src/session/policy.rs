//! Expiry computation for issued and refreshed sessions.

// crates.io
use time::Date;
// self
use crate::{
	_prelude::*,
	auth::{TokenSecret, claims},
};

/// Decides who is authoritative for session length.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpiryPolicy {
	/// Expiries come from [`SessionPolicy`] alone; server hints are ignored.
	#[default]
	ClientOverride,
	/// The earlier of the local policy and the server hint wins.
	ShortestWins,
}

/// Expiry hints a server attached to an issued token pair.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ExpiryHints {
	/// Access token lifetime in seconds.
	pub expires_in: Option<i64>,
	/// Refresh token lifetime in seconds.
	pub refresh_expires_in: Option<i64>,
	/// `exp` claim of the access token, when it is a JWT.
	pub access_claim: Option<OffsetDateTime>,
	/// `exp` claim of the refresh token, when it is a JWT.
	pub refresh_claim: Option<OffsetDateTime>,
}
impl ExpiryHints {
	/// Collects hints from a token response.
	pub fn from_response(
		access_token: &TokenSecret,
		refresh_token: Option<&TokenSecret>,
		expires_in: Option<i64>,
		refresh_expires_in: Option<i64>,
	) -> Self {
		Self {
			expires_in,
			refresh_expires_in,
			access_claim: claims::peek_expiry(access_token.expose()),
			refresh_claim: refresh_token.and_then(|token| claims::peek_expiry(token.expose())),
		}
	}

	// A lifetime that does not fit the calendar counts as absent.
	fn access_at(&self, now: OffsetDateTime) -> Option<OffsetDateTime> {
		self.expires_in
			.and_then(|secs| now.checked_add(Duration::seconds(secs)))
			.or(self.access_claim)
	}

	fn refresh_at(&self, now: OffsetDateTime) -> Option<OffsetDateTime> {
		self.refresh_expires_in
			.and_then(|secs| now.checked_add(Duration::seconds(secs)))
			.or(self.refresh_claim)
	}
}

/// Computed expiry pair; `access <= refresh` always holds.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Expiries {
	/// Access-token expiry.
	pub access: OffsetDateTime,
	/// Refresh-token expiry.
	pub refresh: OffsetDateTime,
}

/// Session length configuration.
///
/// With the defaults an issued pair expires after 12 hours (access) and 24 hours (refresh).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionPolicy {
	/// Access-token lifetime in hours.
	pub session_hours: u32,
	/// Extra hours the refresh token outlives the access token.
	pub refresh_grace_hours: u32,
	/// Seconds before access expiry at which the token is no longer considered usable.
	pub expiry_buffer_secs: u32,
	/// Authority for session length.
	pub expiry: ExpiryPolicy,
}
impl SessionPolicy {
	/// Sets the access-token lifetime.
	pub fn with_session_hours(mut self, hours: u32) -> Self {
		self.session_hours = hours;

		self
	}

	/// Sets how long the refresh token outlives the access token.
	pub fn with_refresh_grace_hours(mut self, hours: u32) -> Self {
		self.refresh_grace_hours = hours;

		self
	}

	/// Sets the usability buffer.
	pub fn with_expiry_buffer_secs(mut self, secs: u32) -> Self {
		self.expiry_buffer_secs = secs;

		self
	}

	/// Sets the expiry authority.
	pub fn with_expiry(mut self, expiry: ExpiryPolicy) -> Self {
		self.expiry = expiry;

		self
	}

	/// Usability buffer as a [`Duration`].
	pub fn expiry_buffer(&self) -> Duration {
		Duration::seconds(i64::from(self.expiry_buffer_secs))
	}

	/// Computes the expiries for a pair issued at `now`.
	pub fn expiries(&self, now: OffsetDateTime, hints: &ExpiryHints) -> Expiries {
		let session = i64::from(self.session_hours);
		let access = saturating_add(now, Duration::hours(session));
		let refresh =
			saturating_add(now, Duration::hours(session + i64::from(self.refresh_grace_hours)));
		let (access, refresh) = match self.expiry {
			ExpiryPolicy::ClientOverride => (access, refresh),
			ExpiryPolicy::ShortestWins => (
				hints.access_at(now).map_or(access, |hint| hint.min(access)),
				hints.refresh_at(now).map_or(refresh, |hint| hint.min(refresh)),
			),
		};

		Expiries { access: access.min(refresh), refresh }
	}
}
impl Default for SessionPolicy {
	fn default() -> Self {
		Self {
			session_hours: 12,
			refresh_grace_hours: 12,
			expiry_buffer_secs: 60,
			expiry: ExpiryPolicy::ClientOverride,
		}
	}
}

fn saturating_add(now: OffsetDateTime, lifetime: Duration) -> OffsetDateTime {
	now.checked_add(lifetime).unwrap_or_else(|| Date::MAX.midnight().assume_utc())
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros::datetime;
	// self
	use super::*;

	#[test]
	fn client_override_ignores_server_hints() {
		let now = datetime!(2025-03-01 08:00 UTC);
		let hints = ExpiryHints {
			expires_in: Some(300),
			refresh_expires_in: Some(600),
			..Default::default()
		};
		let expiries = SessionPolicy::default().with_session_hours(8).expiries(now, &hints);

		assert_eq!(expiries.access, now + Duration::hours(8));
		assert_eq!(expiries.refresh, now + Duration::hours(20));
	}

	#[test]
	fn shortest_wins_takes_earlier_hint_and_keeps_ordering() {
		let now = datetime!(2025-03-01 08:00 UTC);
		let policy = SessionPolicy::default().with_expiry(ExpiryPolicy::ShortestWins);
		let hints = ExpiryHints {
			expires_in: Some(7_200),
			refresh_expires_in: Some(3_600),
			..Default::default()
		};
		let expiries = policy.expiries(now, &hints);

		assert_eq!(expiries.refresh, now + Duration::hours(1));
		assert_eq!(expiries.access, expiries.refresh);

		let claim_only = ExpiryHints {
			access_claim: Some(now + Duration::minutes(15)),
			..Default::default()
		};
		let expiries = policy.expiries(now, &claim_only);

		assert_eq!(expiries.access, now + Duration::minutes(15));
		assert_eq!(expiries.refresh, now + Duration::hours(24));
	}

	#[test]
	fn out_of_range_hints_fall_back_to_local_policy() {
		let now = datetime!(2025-03-01 08:00 UTC);
		let policy = SessionPolicy::default().with_expiry(ExpiryPolicy::ShortestWins);
		let hints = ExpiryHints {
			expires_in: Some(i64::MAX),
			refresh_expires_in: Some(i64::MIN),
			..Default::default()
		};
		let expiries = policy.expiries(now, &hints);

		assert_eq!(expiries.access, now + Duration::hours(12));
		assert_eq!(expiries.refresh, now + Duration::hours(24));

		let unbounded = SessionPolicy::default().with_session_hours(u32::MAX).expiries(now, &hints);

		assert_eq!(unbounded.access, unbounded.refresh);
		assert!(unbounded.refresh > now);
	}

	#[test]
	fn policy_deserializes_with_defaults() {
		let policy: SessionPolicy =
			serde_json::from_str(r#"{"session_hours":2,"expiry":"shortest_wins"}"#)
				.expect("Policy should deserialize.");

		assert_eq!(policy.session_hours, 2);
		assert_eq!(policy.refresh_grace_hours, 12);
		assert_eq!(policy.expiry_buffer(), Duration::seconds(60));
		assert_eq!(policy.expiry, ExpiryPolicy::ShortestWins);
	}
}
