//! Error-message synthesis for heterogeneous backend error bodies and transport failures.
//!
//! Message resolution order:
//!
//! 1. Search the response body for a message under [`CANDIDATE_KEYS`], descending into nested
//!    objects and arrays. The first non-generic hit wins.
//! 2. Fall back to the per-status table (see [`StatusMessages`]).
//! 3. Without any response, describe the transport failure.

// self
use crate::{
	_prelude::*,
	error::{ApiError, ErrorKind, TransportError},
	http::{ApiResponse, RequestSnapshot},
};

/// Message used when nothing better can be derived.
pub const DEFAULT_MESSAGE: &str = "An unexpected error occurred";
/// Keys that commonly hold a human-readable message, in priority order.
pub const CANDIDATE_KEYS: [&str; 9] = [
	"message",
	"detail",
	"error_description",
	"error",
	"msg",
	"description",
	"title",
	"reason",
	"errors",
];

const CODE_KEYS: [&str; 3] = ["code", "error_code", "errorCode"];
const GENERIC_MESSAGES: [&str; 7] = [
	"error",
	"unknown error",
	"network error",
	"an error occurred",
	"bad request",
	"undefined",
	"null",
];
const PLAIN_TEXT_LIMIT: usize = 200;

/// Returns one readable message for an arbitrary error body.
pub fn normalize_message(body: Option<&Value>) -> String {
	body.and_then(extract_message).unwrap_or_else(|| DEFAULT_MESSAGE.to_owned())
}

/// Searches `body` for a non-generic message.
///
/// Top-level strings are used as-is and arrays of strings are joined with `", "`.
pub fn extract_message(body: &Value) -> Option<String> {
	search(body, Scope::Root)
}

/// Finds a backend error code at the top level or inside an `error` object.
pub fn extract_code(body: &Value) -> Option<String> {
	let object = body.as_object()?;
	let scalar = |value: &Value| match value {
		Value::String(code) if !code.is_empty() => Some(code.clone()),
		Value::Number(code) => Some(code.to_string()),
		_ => None,
	};

	CODE_KEYS.iter().find_map(|key| object.get(*key).and_then(scalar)).or_else(|| {
		let nested = object.get("error")?.as_object()?;

		CODE_KEYS.iter().find_map(|key| nested.get(*key).and_then(scalar))
	})
}

// Where a value sits relative to the candidate keys.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Scope {
	Root,
	Candidate,
	Nested,
}

fn search(value: &Value, scope: Scope) -> Option<String> {
	match value {
		Value::String(text) if scope != Scope::Nested => {
			let text = text.trim();

			(!is_generic(text)).then(|| text.to_owned())
		},
		Value::Array(items) => join(items.iter().filter_map(|item| search(item, scope))),
		Value::Object(object) => CANDIDATE_KEYS
			.iter()
			.find_map(|key| object.get(*key).and_then(|child| search(child, Scope::Candidate)))
			.or_else(|| match scope {
				// Field-error map such as `{"errors":{"name":["is required"]}}`.
				Scope::Candidate => join(object.iter().filter_map(|(field, child)| {
					search(child, Scope::Candidate).map(|message| format!("{field}: {message}"))
				})),
				Scope::Root | Scope::Nested => object
					.iter()
					.filter(|(key, child)| {
						!CANDIDATE_KEYS.contains(&key.as_str())
							&& (child.is_object() || child.is_array())
					})
					.find_map(|(_, child)| search(child, Scope::Nested)),
			}),
		_ => None,
	}
}

fn join(found: impl Iterator<Item = String>) -> Option<String> {
	let found = found.collect::<Vec<_>>();

	(!found.is_empty()).then(|| found.join(", "))
}

fn is_generic(text: &str) -> bool {
	let lowered = text.to_ascii_lowercase();

	lowered.is_empty()
		|| lowered.starts_with("request failed with status code")
		|| GENERIC_MESSAGES.contains(&lowered.as_str())
}

/// Per-status message table; entries override the built-in sentences.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatusMessages(BTreeMap<u16, String>);
impl StatusMessages {
	/// Adds or replaces the message for `status`.
	pub fn with(mut self, status: u16, message: impl Into<String>) -> Self {
		self.0.insert(status, message.into());

		self
	}

	/// Override registered for `status`, if any.
	pub fn get(&self, status: u16) -> Option<&str> {
		self.0.get(&status).map(String::as_str)
	}

	/// Override, then built-in sentence, then [`DEFAULT_MESSAGE`].
	pub fn resolve(&self, status: u16) -> String {
		self.get(status)
			.or_else(|| default_status_message(status))
			.unwrap_or(DEFAULT_MESSAGE)
			.to_owned()
	}

	/// Returns `true` when no override is registered.
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}
}
impl<S> FromIterator<(u16, S)> for StatusMessages
where
	S: Into<String>,
{
	fn from_iter<I>(iter: I) -> Self
	where
		I: IntoIterator<Item = (u16, S)>,
	{
		Self(iter.into_iter().map(|(status, message)| (status, message.into())).collect())
	}
}

/// Built-in sentence for well-known statuses.
pub fn default_status_message(status: u16) -> Option<&'static str> {
	let message = match status {
		400 => "The request was invalid. Please check your input and try again.",
		401 => "Your session has expired. Please sign in again.",
		403 => "You do not have permission to perform this action.",
		404 => "The requested resource was not found.",
		408 => "The request timed out. Please try again.",
		409 => "This resource conflicts with an existing one.",
		413 => "The uploaded content is too large.",
		422 => "Some of the submitted data is invalid.",
		429 => "Too many requests. Please wait a moment and try again.",
		502 => "The server is temporarily unavailable. Please try again later.",
		503 => "The service is temporarily unavailable. Please try again later.",
		504 => "The server took too long to respond. Please try again later.",
		500..=599 => "The server encountered an error. Please try again later.",
		_ => return None,
	};

	Some(message)
}

/// Describes a failure that produced no response.
pub fn diagnose_transport(err: &TransportError, service: &str) -> String {
	match err {
		TransportError::Refused { .. } =>
			format!("Unable to connect to the {service} service. The connection was refused."),
		TransportError::Unreachable { .. } =>
			format!("The {service} service is unreachable. Please check your network connection."),
		TransportError::Timeout { .. } =>
			format!("The request to the {service} service timed out. Please try again."),
		TransportError::NoResponse { .. } | TransportError::Io(_) => format!(
			"No response was received from the {service} service. Please check your network connection."
		),
	}
}

/// Normalizes a non-success response, keeping the raw response and request attached.
pub fn response_error(
	response: &ApiResponse,
	request: RequestSnapshot,
	messages: &StatusMessages,
) -> ApiError {
	let details = response.json_value();
	let message = match &details {
		Some(body) => extract_message(body),
		None => plain_text_message(response),
	}
	.unwrap_or_else(|| messages.resolve(response.status));
	let code = details.as_ref().and_then(extract_code);

	ApiError {
		kind: ErrorKind::from_status(response.status),
		message,
		status: Some(response.status),
		code,
		details,
		response: Some(Box::new(response.clone())),
		request: Some(request),
	}
}

/// Normalizes a transport failure.
pub fn transport_error(err: &TransportError, request: RequestSnapshot, service: &str) -> ApiError {
	ApiError {
		kind: err.kind(),
		message: diagnose_transport(err, service),
		status: None,
		code: Some(err.code().to_owned()),
		details: None,
		response: None,
		request: Some(request),
	}
}

fn plain_text_message(response: &ApiResponse) -> Option<String> {
	let text = response.text();
	let text = text.trim();

	if text.len() > PLAIN_TEXT_LIMIT || text.starts_with('<') || is_generic(text) {
		return None;
	}

	Some(text.to_owned())
}

#[cfg(test)]
mod tests {
	// crates.io
	use serde_json::json;
	// self
	use super::*;
	use crate::http::Method;

	fn snapshot() -> RequestSnapshot {
		RequestSnapshot {
			method: Method::Post,
			url: Url::parse("https://rag.example.com/query").expect("Test URL should parse."),
			retried: false,
		}
	}

	fn response(status: u16, body: &[u8]) -> ApiResponse {
		ApiResponse {
			status,
			headers: BTreeMap::new(),
			body: body.to_vec(),
			url: Url::parse("https://rag.example.com/query").expect("Test URL should parse."),
		}
	}

	#[test]
	fn normalize_matches_reference_shapes() {
		assert_eq!(
			normalize_message(Some(&json!({ "error": { "message": "Quota exceeded" } }))),
			"Quota exceeded",
		);
		assert_eq!(normalize_message(None), "An unexpected error occurred");
		assert_eq!(normalize_message(Some(&Value::Null)), "An unexpected error occurred");
		assert_eq!(normalize_message(Some(&json!(["a", "b"]))), "a, b");
	}

	#[test]
	fn nested_and_list_bodies_are_searched() {
		assert_eq!(
			normalize_message(Some(&json!({
				"detail": [
					{ "loc": ["body", "name"], "msg": "field required" },
					{ "loc": ["body", "size"], "msg": "must be positive" },
				],
			}))),
			"field required, must be positive",
		);
		assert_eq!(
			normalize_message(Some(&json!({ "data": { "reason": "Folder is locked" } }))),
			"Folder is locked",
		);
		assert_eq!(
			normalize_message(Some(&json!({ "data": ["not a message"], "status": "failed" }))),
			DEFAULT_MESSAGE,
		);
	}

	#[test]
	fn field_error_maps_name_each_field() {
		assert_eq!(
			normalize_message(Some(&json!({ "errors": { "name": ["is required"] } }))),
			"name: is required",
		);
		assert_eq!(
			normalize_message(Some(&json!({
				"errors": { "email": "is invalid", "password": ["is too short", "is too common"] },
			}))),
			"email: is invalid, password: is too short, is too common",
		);
	}

	#[test]
	fn generic_messages_are_skipped() {
		assert_eq!(
			normalize_message(Some(&json!({
				"message": "Request failed with status code 500",
				"detail": "Index is rebuilding",
			}))),
			"Index is rebuilding",
		);
		assert_eq!(normalize_message(Some(&json!({ "error": "Error" }))), DEFAULT_MESSAGE);
	}

	#[test]
	fn response_error_falls_back_to_status_table() {
		let messages = StatusMessages::default().with(404, "That document no longer exists.");
		let missing = response_error(&response(404, b""), snapshot(), &messages);

		assert_eq!(missing.kind, ErrorKind::NotFound);
		assert_eq!(missing.message, "That document no longer exists.");
		assert_eq!(missing.status, Some(404));

		let server = response_error(&response(503, b"<html>down</html>"), snapshot(), &messages);

		assert_eq!(server.kind, ErrorKind::Server);
		assert_eq!(server.message, "The service is temporarily unavailable. Please try again later.");
		assert_eq!(server.response.as_ref().map(|raw| raw.body.len()), Some(17));

		let teapot = response_error(&response(418, b""), snapshot(), &messages);

		assert_eq!(teapot.message, DEFAULT_MESSAGE);
	}

	#[test]
	fn response_error_keeps_body_code_and_request() {
		let raw = br#"{"error":{"code":"QUOTA","message":"Quota exceeded"}}"#;
		let err = response_error(&response(429, raw), snapshot(), &StatusMessages::default());

		assert_eq!(err.message, "Quota exceeded");
		assert_eq!(err.code.as_deref(), Some("QUOTA"));
		assert_eq!(
			err.details,
			Some(json!({ "error": { "code": "QUOTA", "message": "Quota exceeded" } })),
		);
		assert_eq!(err.request, Some(snapshot()));

		let text = response_error(
			&response(400, b"name is required"),
			snapshot(),
			&StatusMessages::default(),
		);

		assert_eq!(text.message, "name is required");
		assert_eq!(text.kind, ErrorKind::Validation);
	}

	#[test]
	fn transport_failures_are_diagnosed() {
		let refused = transport_error(
			&TransportError::refused(std::io::Error::other("refused")),
			snapshot(),
			"rag",
		);

		assert_eq!(refused.kind, ErrorKind::Network);
		assert_eq!(refused.code.as_deref(), Some("connection_refused"));
		assert_eq!(
			refused.message,
			"Unable to connect to the rag service. The connection was refused."
		);

		let timeout = transport_error(
			&TransportError::timeout(std::io::Error::other("deadline")),
			snapshot(),
			"rag",
		);

		assert_eq!(timeout.kind, ErrorKind::Timeout);
		assert!(timeout.status.is_none());
	}

	#[test]
	fn status_messages_deserialize_from_string_keys() {
		let messages: StatusMessages =
			serde_json::from_value(json!({ "409": "Already uploaded." }))
				.expect("Status table should deserialize.");

		assert_eq!(messages.resolve(409), "Already uploaded.");
		assert_eq!(messages.resolve(401), "Your session has expired. Please sign in again.");
	}
}
