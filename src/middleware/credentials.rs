//! Request layers that stamp the bearer credential and the tenant header.
//!
//! Stamping is optimistic: the stored token is attached as-is, without checking its expiry or
//! waiting for a refresh. Expired tokens are handled reactively by [`RecoveryLayer`].
//!
//! [`RecoveryLayer`]: crate::middleware::RecoveryLayer

// self
use crate::{_prelude::*, http::ApiRequest, middleware::RequestLayer, store::TokenStore};

/// Attaches `Authorization: Bearer <token>` whenever an access token is stored.
#[derive(Clone, Debug)]
pub struct CredentialLayer {
	store: TokenStore,
}
impl CredentialLayer {
	/// Creates a layer reading from `store`.
	pub fn new(store: TokenStore) -> Self {
		Self { store }
	}
}
impl RequestLayer for CredentialLayer {
	fn on_request(&self, request: ApiRequest) -> Result<ApiRequest> {
		Ok(match self.store.access_token() {
			Some(token) => request.with_bearer(&token),
			None => request,
		})
	}
}

/// Which organization attribute a backend scopes queries by.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrgHeader {
	/// No tenant header.
	#[default]
	None,
	/// Opaque organization identifier.
	Id,
	/// Human-readable organization name.
	Name,
}
impl OrgHeader {
	/// Header name used when the client does not configure one.
	pub const fn default_header_name(self) -> Option<&'static str> {
		match self {
			Self::None => None,
			Self::Id => Some("X-Organization-Id"),
			Self::Name => Some("X-Organization-Name"),
		}
	}
}

/// Attaches the signed-in user's organization to every request.
#[derive(Clone, Debug)]
pub struct TenantLayer {
	store: TokenStore,
	mode: OrgHeader,
	header_name: Option<String>,
}
impl TenantLayer {
	/// Creates a layer for `mode` using its default header name.
	pub fn new(store: TokenStore, mode: OrgHeader) -> Self {
		Self { store, mode, header_name: None }
	}

	/// Overrides the header name.
	pub fn with_header_name(mut self, name: impl Into<String>) -> Self {
		self.header_name = Some(name.into());

		self
	}
}
impl RequestLayer for TenantLayer {
	fn on_request(&self, request: ApiRequest) -> Result<ApiRequest> {
		let Some(default_name) = self.mode.default_header_name() else {
			return Ok(request);
		};
		let Some(user) = self.store.user() else {
			return Ok(request);
		};
		let value = match self.mode {
			OrgHeader::Name => user.organization_name,
			_ => user.organization_id,
		};

		if value.is_empty() {
			return Ok(request);
		}

		Ok(request.with_header(self.header_name.as_deref().unwrap_or(default_name), value))
	}
}
