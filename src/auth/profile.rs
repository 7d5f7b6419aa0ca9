//! Minimal user identity returned by the auth endpoints.

// crates.io
use serde::{Deserializer, de::Error as DeError};
// self
use crate::_prelude::*;

/// Identity of the signed-in user and the organization (tenant) they act for.
///
/// Backends disagree on field names and on whether identifiers are strings or numbers, so
/// deserialization accepts the common aliases and stringifies numeric ids.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
	/// User identifier.
	#[serde(alias = "id", deserialize_with = "string_or_number")]
	pub user_id: String,
	/// Organization identifier used by tenant-scoped backends.
	#[serde(alias = "org_id", deserialize_with = "string_or_number")]
	pub organization_id: String,
	/// Human-readable organization name used by backends that scope by name.
	#[serde(default, alias = "org_name")]
	pub organization_name: String,
	/// Role within the organization.
	#[serde(default)]
	pub role: String,
	/// Email address, when the backend returns it.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub email: Option<String>,
	/// Display name, when the backend returns it.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub name: Option<String>,
}
impl UserProfile {
	/// Creates a profile with the four required identity fields.
	pub fn new(
		user_id: impl Into<String>,
		organization_id: impl Into<String>,
		organization_name: impl Into<String>,
		role: impl Into<String>,
	) -> Self {
		Self {
			user_id: user_id.into(),
			organization_id: organization_id.into(),
			organization_name: organization_name.into(),
			role: role.into(),
			email: None,
			name: None,
		}
	}

	/// Sets the email address.
	pub fn with_email(mut self, email: impl Into<String>) -> Self {
		self.email = Some(email.into());

		self
	}
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
	D: Deserializer<'de>,
{
	match Value::deserialize(deserializer)? {
		Value::String(value) => Ok(value),
		Value::Number(value) => Ok(value.to_string()),
		other =>
			Err(DeError::custom(format!("expected a string or number identifier, got {other}"))),
	}
}
