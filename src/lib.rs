//! Session-token lifecycle and a resilient request pipeline for applications that talk to several
//! backend services with one user session.
//!
//! - [`session::SessionManager`] logs in, persists the token pair, and refreshes it single-flight.
//! - [`client::ClientFactory`] turns a [`client::ClientConfig`] row into an [`client::ApiClient`]
//!   that stamps credentials, recovers from 401s once, and normalizes every failure into
//!   [`error::ApiError`].
//! - [`signal::UnauthorizedSignal`] tells the application when the session is gone for good.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod client;
pub mod error;
pub mod http;
pub mod middleware;
pub mod normalize;
pub mod obs;
pub mod session;
pub mod signal;
pub mod store;
#[cfg(feature = "reqwest")]
#[doc(hidden)]
pub mod _preludet {
	//! Convenience re-exports and helpers for integration tests.

	pub use crate::_prelude::*;

	// self
	use crate::{
		auth::{SessionTokens, TokenSecret, UserProfile},
		client::ClientFactory,
		session::SessionManager,
	};

	/// Parses a URL, panicking on malformed test input.
	pub fn test_url(raw: &str) -> Url {
		Url::parse(raw).expect("Test URL should parse.")
	}

	/// Profile used by seeded sessions.
	pub fn test_user() -> UserProfile {
		UserProfile::new("user-1", "org-1", "Acme", "admin").with_email("ada@acme.test")
	}

	/// Builds a reqwest-backed session manager for the auth backend at `auth_base`.
	pub fn build_test_session(auth_base: &str) -> SessionManager {
		SessionManager::new(test_url(auth_base))
	}

	/// Builds a session manager plus a factory sharing it.
	pub fn build_test_factory(auth_base: &str) -> (SessionManager, ClientFactory) {
		let session = build_test_session(auth_base);
		let factory = ClientFactory::new(session.clone());

		(session, factory)
	}

	/// Stores a session whose access token expires in `access_in` and refresh token in
	/// `refresh_in`.
	pub fn seed_session(
		session: &SessionManager,
		access: &str,
		refresh: &str,
		access_in: Duration,
		refresh_in: Duration,
	) {
		let now = OffsetDateTime::now_utc();

		session.store().persist(&SessionTokens {
			access_token: TokenSecret::new(access),
			refresh_token: TokenSecret::new(refresh),
			access_expiry: now + access_in,
			refresh_expiry: now + refresh_in,
			user: test_user(),
		});
	}
}

mod _prelude {
	pub use std::{
		collections::{BTreeMap, HashMap},
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		sync::Arc,
	};

	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize, de::DeserializeOwned};
	pub use serde_json::Value;
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(test)] use color_eyre as _;
#[cfg(test)] use httpmock as _;
