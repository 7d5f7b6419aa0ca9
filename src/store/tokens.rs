//! Session-aware facade over a [`KeyValueStore`].
//!
//! Every accessor is infallible: backend read failures and corrupt values surface as `None`,
//! write failures are logged and dropped. Keys are written one at a time with no cross-key
//! transaction, so a crash between two writes can leave a pair with a stale expiry. The worst
//! outcome is one extra refresh cycle.

// crates.io
use time::format_description::well_known::Rfc3339;
// self
use crate::{
	_prelude::*,
	auth::{SessionTokens, TokenSecret, UserProfile},
	store::{KeyValueStore, MemoryStore, StoreError},
};

const ACCESS_TOKEN: &str = "access_token";
const REFRESH_TOKEN: &str = "refresh_token";
const USER: &str = "user";
const ACCESS_EXPIRY: &str = "access_token_expiry";
const REFRESH_EXPIRY: &str = "refresh_token_expiry";

/// Prefix used when none is configured.
pub const DEFAULT_KEY_PREFIX: &str = "session_broker.v1.";

/// Namespace prepended to every persisted key.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct KeyPrefix(String);
impl KeyPrefix {
	/// Wraps a custom prefix.
	pub fn new(prefix: impl Into<String>) -> Self {
		Self(prefix.into())
	}

	/// Returns the raw prefix.
	pub fn as_str(&self) -> &str {
		&self.0
	}

	/// Fully qualified key for `name`.
	pub fn key(&self, name: &str) -> String {
		format!("{}{name}", self.0)
	}
}
impl Default for KeyPrefix {
	fn default() -> Self {
		Self::new(DEFAULT_KEY_PREFIX)
	}
}

/// Durable storage for the credential pair, its expiries, and the current profile.
#[derive(Clone)]
pub struct TokenStore {
	backend: Arc<dyn KeyValueStore>,
	prefix: KeyPrefix,
}
impl TokenStore {
	/// Wraps a backend using the default [`KeyPrefix`].
	pub fn new<S>(backend: S) -> Self
	where
		S: 'static + KeyValueStore,
	{
		Self::with_backend(Arc::new(backend))
	}

	/// Wraps an already shared backend.
	pub fn with_backend(backend: Arc<dyn KeyValueStore>) -> Self {
		Self { backend, prefix: KeyPrefix::default() }
	}

	/// Store backed by a fresh [`MemoryStore`].
	pub fn in_memory() -> Self {
		Self::new(MemoryStore::default())
	}

	/// Overrides the key namespace.
	pub fn with_prefix(mut self, prefix: KeyPrefix) -> Self {
		self.prefix = prefix;

		self
	}

	/// Key namespace in use.
	pub fn prefix(&self) -> &KeyPrefix {
		&self.prefix
	}

	/// Stored access token.
	pub fn access_token(&self) -> Option<TokenSecret> {
		self.read(ACCESS_TOKEN).filter(|value| !value.is_empty()).map(TokenSecret::new)
	}

	/// Replaces the access token.
	pub fn set_access_token(&self, token: &TokenSecret) {
		self.write(ACCESS_TOKEN, token.expose());
	}

	/// Stored refresh token.
	pub fn refresh_token(&self) -> Option<TokenSecret> {
		self.read(REFRESH_TOKEN).filter(|value| !value.is_empty()).map(TokenSecret::new)
	}

	/// Replaces the refresh token.
	pub fn set_refresh_token(&self, token: &TokenSecret) {
		self.write(REFRESH_TOKEN, token.expose());
	}

	/// Stored user profile; unreadable JSON reads as `None`.
	pub fn user(&self) -> Option<UserProfile> {
		let raw = self.read(USER)?;

		match serde_json::from_str(&raw) {
			Ok(user) => Some(user),
			Err(e) => {
				tracing::warn!(
					key = %self.prefix.key(USER),
					error = %e,
					"Stored user profile is unreadable."
				);

				None
			},
		}
	}

	/// Replaces the user profile.
	pub fn set_user(&self, user: &UserProfile) {
		match serde_json::to_string(user) {
			Ok(raw) => self.write(USER, &raw),
			Err(e) => self.report(USER, &StoreError::Serialization { message: e.to_string() }),
		}
	}

	/// Stored access-token expiry.
	pub fn access_expiry(&self) -> Option<OffsetDateTime> {
		self.read_instant(ACCESS_EXPIRY)
	}

	/// Replaces the access-token expiry.
	pub fn set_access_expiry(&self, instant: OffsetDateTime) {
		self.write_instant(ACCESS_EXPIRY, instant);
	}

	/// Stored refresh-token expiry.
	pub fn refresh_expiry(&self) -> Option<OffsetDateTime> {
		self.read_instant(REFRESH_EXPIRY)
	}

	/// Replaces the refresh-token expiry.
	pub fn set_refresh_expiry(&self, instant: OffsetDateTime) {
		self.write_instant(REFRESH_EXPIRY, instant);
	}

	/// Writes the whole pair, tokens first.
	pub fn persist(&self, tokens: &SessionTokens) {
		self.set_access_token(&tokens.access_token);
		self.set_refresh_token(&tokens.refresh_token);
		self.set_access_expiry(tokens.access_expiry);
		self.set_refresh_expiry(tokens.refresh_expiry);
		self.set_user(&tokens.user);
	}

	/// Complete pair when every key is present and readable.
	pub fn snapshot(&self) -> Option<SessionTokens> {
		Some(SessionTokens {
			access_token: self.access_token()?,
			refresh_token: self.refresh_token()?,
			access_expiry: self.access_expiry()?,
			refresh_expiry: self.refresh_expiry()?,
			user: self.user()?,
		})
	}

	/// Removes every session key.
	pub fn clear_all(&self) {
		for name in [ACCESS_TOKEN, REFRESH_TOKEN, USER, ACCESS_EXPIRY, REFRESH_EXPIRY] {
			let key = self.prefix.key(name);

			if let Err(e) = self.backend.remove(&key) {
				self.report(name, &e);
			}
		}
	}

	fn read(&self, name: &str) -> Option<String> {
		let key = self.prefix.key(name);

		match self.backend.get(&key) {
			Ok(value) => value,
			Err(e) => {
				tracing::warn!(%key, error = %e, "Token store read failed.");

				None
			},
		}
	}

	fn write(&self, name: &str, value: &str) {
		if let Err(e) = self.backend.set(&self.prefix.key(name), value) {
			self.report(name, &e);
		}
	}

	fn read_instant(&self, name: &str) -> Option<OffsetDateTime> {
		let raw = self.read(name)?;

		OffsetDateTime::parse(&raw, &Rfc3339)
			.inspect_err(|e| {
				tracing::warn!(
					key = %self.prefix.key(name),
					error = %e,
					"Stored expiry is unreadable."
				);
			})
			.ok()
	}

	fn write_instant(&self, name: &str, instant: OffsetDateTime) {
		match instant.format(&Rfc3339) {
			Ok(raw) => self.write(name, &raw),
			Err(e) => self.report(name, &StoreError::Serialization { message: e.to_string() }),
		}
	}

	fn report(&self, name: &str, err: &StoreError) {
		tracing::warn!(key = %self.prefix.key(name), error = %err, "Token store write failed.");
	}
}
impl Default for TokenStore {
	fn default() -> Self {
		Self::in_memory()
	}
}
impl Debug for TokenStore {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenStore").field("prefix", &self.prefix).finish_non_exhaustive()
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros::datetime;
	// self
	use super::*;

	struct Unavailable;
	impl KeyValueStore for Unavailable {
		fn get(&self, _: &str) -> Result<Option<String>, StoreError> {
			Err(StoreError::Unavailable { message: "private mode".into() })
		}

		fn set(&self, _: &str, _: &str) -> Result<(), StoreError> {
			Err(StoreError::Unavailable { message: "quota exceeded".into() })
		}

		fn remove(&self, _: &str) -> Result<(), StoreError> {
			Err(StoreError::Unavailable { message: "private mode".into() })
		}
	}

	fn pair() -> SessionTokens {
		SessionTokens {
			access_token: TokenSecret::new("access-1"),
			refresh_token: TokenSecret::new("refresh-1"),
			access_expiry: datetime!(2025-01-01 12:00 UTC),
			refresh_expiry: datetime!(2025-01-02 00:00 UTC),
			user: UserProfile::new("u-1", "org-1", "Acme", "admin"),
		}
	}

	#[test]
	fn persist_then_snapshot_uses_prefixed_layout() {
		let backend = MemoryStore::default();
		let store = TokenStore::new(backend.clone());

		store.persist(&pair());

		assert_eq!(
			backend.keys(),
			vec![
				"session_broker.v1.access_token".to_owned(),
				"session_broker.v1.access_token_expiry".to_owned(),
				"session_broker.v1.refresh_token".to_owned(),
				"session_broker.v1.refresh_token_expiry".to_owned(),
				"session_broker.v1.user".to_owned(),
			],
		);
		assert_eq!(
			backend
				.get("session_broker.v1.access_token_expiry")
				.expect("Memory get should not fail."),
			Some("2025-01-01T12:00:00Z".into()),
		);

		let snapshot = store.snapshot().expect("Persisted pair should be readable.");

		assert_eq!(snapshot.access_token.expose(), "access-1");
		assert_eq!(snapshot.refresh_expiry, datetime!(2025-01-02 00:00 UTC));
		assert_eq!(snapshot.user.organization_name, "Acme");
	}

	#[test]
	fn clear_all_removes_every_key() {
		let backend = MemoryStore::default();
		let store = TokenStore::new(backend.clone()).with_prefix(KeyPrefix::new("app.v2."));

		store.persist(&pair());
		backend.set("unrelated", "kept").expect("Memory set should not fail.");
		store.clear_all();

		assert_eq!(backend.keys(), vec!["unrelated".to_owned()]);
		assert!(store.snapshot().is_none());
		assert!(store.access_token().is_none());
	}

	#[test]
	fn unavailable_backend_degrades_to_noops() {
		let store = TokenStore::new(Unavailable);

		store.persist(&pair());
		store.clear_all();

		assert!(store.access_token().is_none());
		assert!(store.user().is_none());
		assert!(store.refresh_expiry().is_none());
	}

	#[test]
	fn corrupt_values_read_as_missing() {
		let backend = MemoryStore::default();
		let store = TokenStore::new(backend.clone());

		backend.set("session_broker.v1.user", "{not json").expect("Memory set should not fail.");
		backend
			.set("session_broker.v1.refresh_token_expiry", "tomorrow")
			.expect("Memory set should not fail.");
		backend.set("session_broker.v1.access_token", "").expect("Memory set should not fail.");

		assert!(store.user().is_none());
		assert!(store.refresh_expiry().is_none());
		assert!(store.access_token().is_none());
	}
}
