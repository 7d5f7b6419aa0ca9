#![cfg(feature = "reqwest")]

// crates.io
use httpmock::prelude::*;
use serde_json::json;
// self
use session_broker::{
	_preludet::*,
	client::{ClientConfig, ServiceTable},
	error::{ConfigError, Error, ErrorKind},
	middleware::OrgHeader,
};

#[derive(Debug, PartialEq, Deserialize)]
struct Document {
	id: String,
	title: String,
}

#[tokio::test]
async fn requests_carry_bearer_and_tenant_headers() {
	let server = MockServer::start_async().await;
	let (session, factory) = build_test_factory(&server.base_url());
	let by_id = factory
		.build(
			ClientConfig::new("rag", test_url(&server.url("/rag")))
				.with_org_header(OrgHeader::Id),
		)
		.expect("Id-scoped client should build.");
	let by_name = factory
		.build(
			ClientConfig::new("documents", test_url(&server.url("/docs")))
				.with_org_header(OrgHeader::Name)
				.with_org_header_name("X-Tenant"),
		)
		.expect("Name-scoped client should build.");

	seed_session(&session, "access-1", "refresh-1", Duration::hours(1), Duration::hours(2));

	let query = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/rag/query")
				.header("authorization", "Bearer access-1")
				.header("x-organization-id", "org-1")
				.json_body(json!({ "q": "quarterly report" }));
			then.status(200)
				.header("content-type", "application/json")
				.body(r#"{"id":"doc-1","title":"Q3"}"#);
		})
		.await;
	let list = server
		.mock_async(|when, then| {
			when.method(GET)
				.path("/docs/documents/doc-1")
				.header("authorization", "Bearer access-1")
				.header("x-tenant", "Acme");
			then.status(200)
				.header("content-type", "application/json")
				.body(r#"{"id":"doc-1","title":"Q3"}"#);
		})
		.await;
	let found: Document = by_id
		.post_json("query", &json!({ "q": "quarterly report" }))
		.await
		.expect("Query should succeed.");
	let fetched: Document =
		by_name.get_json("/documents/doc-1").await.expect("Document fetch should succeed.");

	query.assert_calls_async(1).await;
	list.assert_calls_async(1).await;

	assert_eq!(found, Document { id: "doc-1".into(), title: "Q3".into() });
	assert_eq!(fetched, found);
}

#[tokio::test]
async fn anonymous_requests_go_out_without_credentials() {
	let server = MockServer::start_async().await;
	let (_, factory) = build_test_factory(&server.base_url());
	let client = factory
		.build(ClientConfig::new("public", test_url(&server.base_url())))
		.expect("Client should build.");
	let stamped = server
		.mock_async(|when, then| {
			when.method(GET).path("/health").header_exists("authorization");
			then.status(500);
		})
		.await;
	let bare = server
		.mock_async(|when, then| {
			when.method(GET).path("/health");
			then.status(200).body("ok");
		})
		.await;
	let response = client.get("/health").await.expect("Health check should succeed.");

	stamped.assert_calls_async(0).await;
	bare.assert_calls_async(1).await;

	assert_eq!(response.text(), "ok");
}

#[tokio::test]
async fn conflict_passes_through_untouched_when_configured() {
	let server = MockServer::start_async().await;
	let (session, factory) = build_test_factory(&server.base_url());
	let passthrough = factory
		.build(
			ClientConfig::new("uploads", test_url(&server.base_url())).with_pass_through_409(true),
		)
		.expect("Pass-through client should build.");
	let normalizing = factory
		.build(ClientConfig::new("uploads", test_url(&server.base_url())))
		.expect("Normalizing client should build.");

	seed_session(&session, "access-1", "refresh-1", Duration::hours(1), Duration::hours(2));
	server
		.mock_async(|when, then| {
			when.method(PUT).path("/files/report.pdf");
			then.status(409)
				.header("content-type", "application/json")
				.body(r#"{"detail":"File already exists","existing_id":"f-9"}"#);
		})
		.await;

	let raw = passthrough
		.put("/files/report.pdf", &json!({ "size": 10 }))
		.await
		.expect_err("Conflict should be rejected.");

	match &raw {
		Error::Conflict(response) => {
			let body = response.json_value().expect("Conflict body should stay JSON.");

			assert_eq!(response.status, 409);
			assert_eq!(body["existing_id"], "f-9");
		},
		other => panic!("Unexpected error variant: {other:?}."),
	}

	assert_eq!(raw.kind(), ErrorKind::Conflict);

	let normalized = normalizing
		.put("/files/report.pdf", &json!({ "size": 10 }))
		.await
		.expect_err("Conflict should be rejected.");
	let api = normalized.as_api().expect("Conflict should be normalized.");

	assert_eq!(api.kind, ErrorKind::Conflict);
	assert_eq!(api.message, "File already exists");
	assert_eq!(api.status, Some(409));
}

#[tokio::test]
async fn status_overrides_apply_when_body_has_no_message() {
	let server = MockServer::start_async().await;
	let (_, factory) = build_test_factory(&server.base_url());
	let client = factory
		.build(
			ClientConfig::new("uploads", test_url(&server.base_url()))
				.with_error_message(413, "Files larger than 50 MB are not accepted."),
		)
		.expect("Client should build.");

	server
		.mock_async(|when, then| {
			when.method(POST).path("/files");
			then.status(413).body("<html><body>Request Entity Too Large</body></html>");
		})
		.await;
	server
		.mock_async(|when, then| {
			when.method(DELETE).path("/files/missing");
			then.status(404);
		})
		.await;

	let too_large = client
		.post("/files", &json!({ "name": "huge.bin" }))
		.await
		.expect_err("Oversized upload should fail.");

	assert_eq!(too_large.kind(), ErrorKind::Unknown);
	assert_eq!(
		too_large.as_api().map(|api| api.message.as_str()),
		Some("Files larger than 50 MB are not accepted."),
	);

	let missing = client.delete("/files/missing").await.expect_err("Missing file should fail.");
	let api = missing.as_api().expect("Not-found should be normalized.");

	assert_eq!(api.kind, ErrorKind::NotFound);
	assert_eq!(api.message, "The requested resource was not found.");
	assert_eq!(api.envelope().kind, ErrorKind::NotFound);
}

#[tokio::test]
async fn refused_connection_is_a_network_error() {
	let (_, factory) = build_test_factory("http://127.0.0.1:1");
	let client = factory
		.build(ClientConfig::new("rag", test_url("http://127.0.0.1:1")))
		.expect("Client should build.");
	let err = client.get("/query").await.expect_err("Refused connection should fail.");
	let api = err.as_api().expect("Transport failures should be normalized.");

	assert_eq!(api.kind, ErrorKind::Network);
	assert!(api.status.is_none());
	assert!(api.message.contains("rag"));
	assert!(api.request.is_some());
}

#[tokio::test]
async fn unauthorized_handling_can_be_disabled() {
	let server = MockServer::start_async().await;
	let (session, factory) = build_test_factory(&server.base_url());
	let client = factory
		.build(
			ClientConfig::new("audit", test_url(&server.base_url()))
				.with_handle_unauthorized(false),
		)
		.expect("Client should build.");

	seed_session(&session, "access-1", "refresh-1", Duration::hours(1), Duration::hours(2));

	let rejected = server
		.mock_async(|when, then| {
			when.method(GET).path("/audit");
			then.status(401);
		})
		.await;
	let refresh = server
		.mock_async(|when, then| {
			when.method(POST).path("/auth/refresh");
			then.status(200);
		})
		.await;
	let err = client.get("/audit").await.expect_err("Unauthorized request should fail.");

	rejected.assert_calls_async(1).await;
	refresh.assert_calls_async(0).await;

	assert_eq!(err.kind(), ErrorKind::Auth);
	assert!(session.is_authenticated());
}

#[tokio::test]
async fn auth_endpoint_rejections_are_not_recovered() {
	let server = MockServer::start_async().await;
	let (session, factory) = build_test_factory(&server.base_url());
	let client = factory
		.build(ClientConfig::new("authentication", test_url(&server.base_url())))
		.expect("Client should build.");

	seed_session(&session, "access-1", "refresh-1", Duration::hours(1), Duration::hours(2));

	let login = server
		.mock_async(|when, then| {
			when.method(POST).path("/auth/login");
			then.status(401);
		})
		.await;
	let refresh = server
		.mock_async(|when, then| {
			when.method(POST).path("/auth/refresh");
			then.status(200);
		})
		.await;
	let err = client
		.post("/auth/login", &json!({ "email": "ada@acme.test", "password": "nope" }))
		.await
		.expect_err("Rejected login should fail.");

	login.assert_calls_async(1).await;
	refresh.assert_calls_async(0).await;

	assert_eq!(err.kind(), ErrorKind::Auth);
	assert!(session.is_authenticated());
}

#[tokio::test]
async fn service_table_builds_named_clients() {
	let server = MockServer::start_async().await;
	let (_, factory) = build_test_factory(&server.base_url());
	let raw = json!({
		"rag": { "base_url": server.url("/rag"), "timeout_ms": 5000, "org_header": "id" },
		"documents": {
			"base_url": server.url("/docs"),
			"pass_through_409": true,
			"error_messages": { "413": "Too big." },
		},
	})
	.to_string();
	let table = ServiceTable::from_json(&raw).expect("Service table should parse.");
	let clients = factory.build_table(table).expect("Every service should build.");

	assert_eq!(clients.len(), 2);

	let rag = clients.client("rag").expect("Rag client should exist.");

	assert_eq!(rag.config().service_name, "rag");
	assert_eq!(rag.config().org_header, OrgHeader::Id);
	assert_eq!(rag.config().timeout_ms, 5_000);
	assert_eq!(rag.pipeline().layer_counts(), (2, 2));

	let documents = clients.client("documents").expect("Documents client should exist.");

	assert!(documents.config().pass_through_409);
	assert_eq!(documents.config().error_messages.get(413), Some("Too big."));
	assert!(matches!(
		clients.client("billing"),
		Err(ConfigError::UnknownService { service }) if service == "billing"
	));
}
