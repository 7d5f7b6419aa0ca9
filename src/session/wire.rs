//! JSON payloads exchanged with the auth endpoints.

// self
use crate::{
	_prelude::*,
	auth::{TokenSecret, UserProfile},
};

/// Login payload for `POST /auth/login`.
#[derive(Clone, Serialize, Deserialize)]
pub struct Credentials {
	/// Account email or username.
	pub email: String,
	/// Account password.
	pub password: String,
}
impl Credentials {
	/// Creates a login payload.
	pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
		Self { email: email.into(), password: password.into() }
	}
}
impl Debug for Credentials {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Credentials")
			.field("email", &self.email)
			.field("password", &"<redacted>")
			.finish()
	}
}

/// Sign-up payload for `POST /auth/register`.
#[derive(Clone, Serialize, Deserialize)]
pub struct Registration {
	/// Account email.
	pub email: String,
	/// Account password.
	pub password: String,
	/// Display name.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub name: Option<String>,
	/// Organization to create or join.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub organization_name: Option<String>,
}
impl Registration {
	/// Creates a sign-up payload with only the required fields.
	pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
		Self { email: email.into(), password: password.into(), name: None, organization_name: None }
	}

	/// Sets the display name.
	pub fn with_name(mut self, name: impl Into<String>) -> Self {
		self.name = Some(name.into());

		self
	}

	/// Sets the organization name.
	pub fn with_organization_name(mut self, organization_name: impl Into<String>) -> Self {
		self.organization_name = Some(organization_name.into());

		self
	}
}
impl Debug for Registration {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Registration")
			.field("email", &self.email)
			.field("password", &"<redacted>")
			.field("name", &self.name)
			.field("organization_name", &self.organization_name)
			.finish()
	}
}

#[derive(Debug, Deserialize)]
pub(crate) struct AuthResponse {
	pub(crate) access_token: TokenSecret,
	pub(crate) refresh_token: TokenSecret,
	#[serde(default)]
	pub(crate) expires_in: Option<i64>,
	#[serde(default)]
	pub(crate) refresh_expires_in: Option<i64>,
	pub(crate) user: UserProfile,
}

#[derive(Serialize)]
pub(crate) struct RefreshRequest<'a> {
	pub(crate) refresh_token: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RefreshResponse {
	pub(crate) access_token: TokenSecret,
	#[serde(default)]
	pub(crate) refresh_token: Option<TokenSecret>,
	#[serde(default)]
	pub(crate) token_rotated: Option<bool>,
	#[serde(default)]
	pub(crate) expires_in: Option<i64>,
	#[serde(default)]
	pub(crate) refresh_expires_in: Option<i64>,
	#[serde(default)]
	pub(crate) user: Option<UserProfile>,
}
impl RefreshResponse {
	/// Server rotated the whole pair; otherwise only the access token changed.
	pub(crate) fn rotated(&self) -> bool {
		self.token_rotated.unwrap_or(self.refresh_token.is_some())
	}
}

#[derive(Serialize)]
pub(crate) struct LogoutRequest<'a> {
	#[serde(skip_serializing_if = "Option::is_none")]
	pub(crate) refresh_token: Option<&'a str>,
}

/// `GET /auth/me` answers either `{ "user": { .. } }` or the bare profile.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum MeResponse {
	Wrapped { user: UserProfile },
	Bare(UserProfile),
}
impl MeResponse {
	pub(crate) fn into_profile(self) -> UserProfile {
		match self {
			Self::Wrapped { user } | Self::Bare(user) => user,
		}
	}
}
