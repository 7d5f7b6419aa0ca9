//! Demonstrates plugging a custom [`HttpTransport`] into the session manager and the clients.
//!
//! 1. Implement [`HttpTransport::execute`] for any HTTP stack; here an in-memory backend answers
//!    the auth endpoints and one document route.
//! 2. Pass it to [`SessionManager::with_transport`]; [`ClientFactory::new`] reuses it for every
//!    client unless [`ClientFactory::with_transport`] overrides it.
//! 3. The backend rejects the first document request with 401, so the client refreshes once and
//!    replays it.
//! 4. A transport that cannot connect surfaces as a `network` error.

// std
use std::io;
// crates.io
use color_eyre::Result;
use serde_json::json;
use url::Url;
// self
use session_broker::{
	client::{ClientConfig, ClientFactory},
	error::TransportError,
	http::{ApiRequest, ApiResponse, HttpTransport, TransportFuture},
	middleware::OrgHeader,
	session::{Credentials, SessionManager},
};

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let auth_base = Url::parse("https://auth.example.com")?;
	let session = SessionManager::with_transport(auth_base, InMemoryBackend::default());

	session.signal().subscribe(|event| println!("Session invalidated: {}.", event.reason));

	let tokens = session.login(&Credentials::new("ada@acme.test", "pw")).await?;

	println!("Logged in as {} ({}).", tokens.user.user_id, tokens.user.organization_name);

	let factory = ClientFactory::new(session.clone());
	let documents = factory.build(
		ClientConfig::new("documents", Url::parse("https://docs.example.com")?)
			.with_org_header(OrgHeader::Id),
	)?;
	let listing = documents.get("/documents").await?;

	println!(
		"Listing returned {} after {} refresh(es): {}.",
		listing.status,
		session.refresh_metrics().successes(),
		listing.text(),
	);

	let offline = ClientFactory::new(session.clone()).with_transport(Offline).build(
		ClientConfig::new("documents", Url::parse("https://docs.example.com")?),
	)?;

	match offline.get("/documents").await {
		Ok(response) => println!("Offline transport unexpectedly answered {}.", response.status),
		Err(e) => println!("Offline transport failed as {:?}: {e}", e.kind()),
	}

	session.logout().await;

	println!("Authenticated after logout: {}.", session.is_authenticated());

	Ok(())
}

#[derive(Default)]
struct InMemoryBackend;
impl InMemoryBackend {
	fn answer(request: &ApiRequest) -> (u16, String) {
		let issued = |access: &str, refresh: &str| {
			json!({
				"access_token": access,
				"refresh_token": refresh,
				"user": { "id": "user-1", "org_id": "org-1", "org_name": "Acme", "role": "admin" },
			})
			.to_string()
		};

		match request.url.path() {
			"/auth/login" => (200, issued("access-1", "refresh-1")),
			"/auth/refresh" => (200, issued("access-2", "refresh-2")),
			"/auth/logout" => (204, String::new()),
			"/documents" if request.header("authorization") == Some("Bearer access-2") =>
				(200, json!({ "items": ["q3-report.pdf"] }).to_string()),
			"/documents" => (401, json!({ "detail": "Token expired" }).to_string()),
			_ => (404, String::new()),
		}
	}
}
impl HttpTransport for InMemoryBackend {
	fn execute(&self, request: ApiRequest) -> TransportFuture<'_> {
		Box::pin(async move {
			let (status, body) = Self::answer(&request);

			Ok(ApiResponse {
				status,
				headers: [("content-type".to_owned(), "application/json".to_owned())].into(),
				body: body.into_bytes(),
				url: request.url,
			})
		})
	}
}

struct Offline;
impl HttpTransport for Offline {
	fn execute(&self, _: ApiRequest) -> TransportFuture<'_> {
		Box::pin(async {
			Err(TransportError::refused(io::Error::new(
				io::ErrorKind::ConnectionRefused,
				"connection refused",
			)))
		})
	}
}
