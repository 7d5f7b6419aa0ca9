//! Unverified peeking at JWT claims.
//!
//! Only the `exp` claim is read, and only as an expiry hint for
//! [`ExpiryPolicy::ShortestWins`](crate::session::ExpiryPolicy::ShortestWins). Signatures are
//! never checked here; the server stays authoritative for token validity.

// crates.io
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
// self
use crate::_prelude::*;

#[derive(Deserialize)]
struct ExpiryClaim {
	exp: i64,
}

/// Returns the `exp` claim of a JWT-shaped token, if it carries one.
pub fn peek_expiry(token: &str) -> Option<OffsetDateTime> {
	let mut segments = token.split('.');
	let (_header, payload, _signature) = (segments.next()?, segments.next()?, segments.next()?);

	if segments.next().is_some() {
		return None;
	}

	let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
	let claim: ExpiryClaim = serde_json::from_slice(&bytes).ok()?;

	OffsetDateTime::from_unix_timestamp(claim.exp).ok()
}
