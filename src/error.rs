//! Crate-level error types and the normalized failure taxonomy shared by every client.

// self
use crate::{
	_prelude::*,
	http::{ApiResponse, RequestSnapshot},
};

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

pub(crate) type BoxError = Box<dyn StdError + Send + Sync>;

/// Canonical error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Normalized failure carrying one readable message plus the raw context.
	#[error(transparent)]
	Api(#[from] ApiError),
	/// Raw 409 response handed back untouched for clients configured to pass conflicts through.
	#[error("The server reported a conflict with an existing resource.")]
	Conflict(Box<ApiResponse>),
	/// Session refresh failed; the session has already been torn down.
	#[error(transparent)]
	Refresh(#[from] RefreshError),
	/// Transport failure that has not been normalized yet.
	#[error(transparent)]
	Transport(#[from] TransportError),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),

	/// Response body did not match the expected shape.
	#[error("Response body could not be decoded.")]
	Decode {
		/// Structured parsing failure including the JSON path.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
		/// HTTP status code of the decoded response.
		status: Option<u16>,
	},
}
impl Error {
	/// Classifies the error into the normalized taxonomy.
	pub fn kind(&self) -> ErrorKind {
		match self {
			Self::Api(err) => err.kind,
			Self::Conflict(_) => ErrorKind::Conflict,
			Self::Refresh(_) => ErrorKind::Auth,
			Self::Transport(err) => err.kind(),
			Self::Config(_) | Self::Decode { .. } => ErrorKind::Unknown,
		}
	}

	/// HTTP status associated with the failure, when a response was received.
	pub fn status(&self) -> Option<u16> {
		match self {
			Self::Api(err) => err.status,
			Self::Conflict(response) => Some(response.status),
			Self::Decode { status, .. } => *status,
			Self::Refresh(RefreshError::Rejected { status, .. }) => Some(*status),
			_ => None,
		}
	}

	/// Returns the normalized envelope when the error went through normalization.
	pub fn as_api(&self) -> Option<&ApiError> {
		match self {
			Self::Api(err) => Some(err),
			_ => None,
		}
	}

	/// Returns the untouched conflict response for pass-through clients.
	pub fn conflict_response(&self) -> Option<&ApiResponse> {
		match self {
			Self::Conflict(response) => Some(response),
			_ => None,
		}
	}
}

/// Failure categories every error is folded into.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
	/// Request was sent but no response arrived.
	Network,
	/// Request exceeded its timeout (or the server answered 408).
	Timeout,
	/// 401 or 403.
	Auth,
	/// 400 or 422.
	Validation,
	/// 404.
	NotFound,
	/// 409.
	Conflict,
	/// Any 5xx.
	Server,
	/// Anything else.
	Unknown,
}
impl ErrorKind {
	/// Maps an HTTP status code onto the taxonomy.
	pub const fn from_status(status: u16) -> Self {
		match status {
			401 | 403 => Self::Auth,
			400 | 422 => Self::Validation,
			404 => Self::NotFound,
			408 => Self::Timeout,
			409 => Self::Conflict,
			500..=599 => Self::Server,
			_ => Self::Unknown,
		}
	}

	/// Returns a stable label suitable for logs and serialized envelopes.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Network => "network",
			Self::Timeout => "timeout",
			Self::Auth => "auth",
			Self::Validation => "validation",
			Self::NotFound => "not_found",
			Self::Conflict => "conflict",
			Self::Server => "server",
			Self::Unknown => "unknown",
		}
	}
}
impl Display for ErrorKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Normalized failure synthesized from a backend error body or a transport failure.
///
/// `message` is the one sentence meant for people; everything else stays attached so callers
/// can still branch on the status, the backend code, or the raw payload.
#[derive(Clone, Debug, ThisError)]
#[error("{message}")]
pub struct ApiError {
	/// Taxonomy bucket.
	pub kind: ErrorKind,
	/// Human-readable message.
	pub message: String,
	/// HTTP status, when a response arrived.
	pub status: Option<u16>,
	/// Backend or transport error code, when one could be found.
	pub code: Option<String>,
	/// Parsed response body, when it was JSON.
	pub details: Option<Value>,
	/// Raw response as received.
	pub response: Option<Box<ApiResponse>>,
	/// Method and URL of the failed request.
	pub request: Option<RequestSnapshot>,
}
impl ApiError {
	/// Creates an error with only a kind and a message.
	pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
		Self {
			kind,
			message: message.into(),
			status: None,
			code: None,
			details: None,
			response: None,
			request: None,
		}
	}

	/// Returns the serializable `{ type, message, status, details }` envelope.
	pub fn envelope(&self) -> ErrorEnvelope {
		ErrorEnvelope {
			kind: self.kind,
			message: self.message.clone(),
			status: self.status,
			details: self.details.clone(),
		}
	}
}

/// Wire-friendly view of an [`ApiError`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
	/// Taxonomy bucket.
	#[serde(rename = "type")]
	pub kind: ErrorKind,
	/// Human-readable message.
	pub message: String,
	/// HTTP status, when a response arrived.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub status: Option<u16>,
	/// Parsed response body, when it was JSON.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub details: Option<Value>,
}

/// Configuration and request-construction failures.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// Endpoint path cannot be resolved against the base URL.
	#[error("Endpoint `{path}` cannot be resolved against the base URL.")]
	InvalidEndpoint {
		/// Path that failed to resolve.
		path: String,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// Request body could not be serialized.
	#[error("Request body could not be serialized.")]
	RequestBody(#[source] serde_json::Error),
	/// Service table could not be parsed.
	#[error("Service table is invalid.")]
	InvalidServiceTable(#[source] serde_path_to_error::Error<serde_json::Error>),
	/// No client is configured for the requested service.
	#[error("No client is configured for the `{service}` service.")]
	UnknownService {
		/// Requested service name.
		service: String,
	},
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + StdError) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Transport-level failures (no usable HTTP response).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Remote host actively refused the connection.
	#[error("Connection was refused.")]
	Refused {
		/// Transport-specific failure.
		#[source]
		source: BoxError,
	},
	/// Remote host could not be reached (DNS, routing, TLS).
	#[error("Host is unreachable.")]
	Unreachable {
		/// Transport-specific failure.
		#[source]
		source: BoxError,
	},
	/// Request exceeded its timeout.
	#[error("Request timed out.")]
	Timeout {
		/// Transport-specific failure.
		#[source]
		source: BoxError,
	},
	/// Request was sent but the response never completed.
	#[error("No response was received.")]
	NoResponse {
		/// Transport-specific failure.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred during transport.")]
	Io(#[from] std::io::Error),
}
impl TransportError {
	/// Wraps a refused connection.
	pub fn refused(src: impl 'static + Send + Sync + StdError) -> Self {
		Self::Refused { source: Box::new(src) }
	}

	/// Wraps an unreachable host.
	pub fn unreachable(src: impl 'static + Send + Sync + StdError) -> Self {
		Self::Unreachable { source: Box::new(src) }
	}

	/// Wraps a timeout.
	pub fn timeout(src: impl 'static + Send + Sync + StdError) -> Self {
		Self::Timeout { source: Box::new(src) }
	}

	/// Wraps a request that never produced a response.
	pub fn no_response(src: impl 'static + Send + Sync + StdError) -> Self {
		Self::NoResponse { source: Box::new(src) }
	}

	/// Taxonomy bucket for the failure.
	pub fn kind(&self) -> ErrorKind {
		match self {
			Self::Timeout { .. } => ErrorKind::Timeout,
			_ => ErrorKind::Network,
		}
	}

	/// Stable code attached to normalized transport errors.
	pub const fn code(&self) -> &'static str {
		match self {
			Self::Refused { .. } => "connection_refused",
			Self::Unreachable { .. } => "host_unreachable",
			Self::Timeout { .. } => "timeout",
			Self::NoResponse { .. } => "no_response",
			Self::Io(_) => "io",
		}
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		if e.is_timeout() {
			return Self::timeout(e);
		}
		if e.is_connect() {
			return if connection_refused(&e) { Self::refused(e) } else { Self::unreachable(e) };
		}

		Self::no_response(e)
	}
}

#[cfg(feature = "reqwest")]
fn connection_refused(err: &ReqwestError) -> bool {
	let mut cause: Option<&(dyn StdError + 'static)> = err.source();

	while let Some(current) = cause {
		if let Some(io) = current.downcast_ref::<std::io::Error>() {
			return io.kind() == std::io::ErrorKind::ConnectionRefused;
		}

		cause = current.source();
	}

	err.to_string().to_ascii_lowercase().contains("refused")
}

/// Outcome of a failed session refresh.
///
/// The type is `Clone` because one refresh outcome is shared by every caller that joined the
/// in-flight refresh.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum RefreshError {
	/// No refresh token is stored.
	#[error("No refresh token is stored.")]
	MissingRefreshToken,
	/// Stored refresh token is past its expiry (or has none recorded).
	#[error("The refresh token has expired.")]
	RefreshTokenExpired {
		/// Recorded expiry instant, when one was stored.
		expired_at: Option<OffsetDateTime>,
	},
	/// Refresh endpoint answered with a non-success status.
	#[error("Refresh endpoint rejected the session: {message}")]
	Rejected {
		/// HTTP status returned by the refresh endpoint.
		status: u16,
		/// Normalized message.
		message: String,
	},
	/// Refresh endpoint could not be reached.
	#[error("Refresh endpoint could not be reached: {message}")]
	Unreachable {
		/// Transport diagnosis.
		message: String,
	},
	/// Refresh request could not be built.
	#[error("Refresh request could not be built: {message}")]
	Request {
		/// Construction failure.
		message: String,
	},
	/// Refresh endpoint answered with an unexpected body.
	#[error("Refresh endpoint returned an invalid response: {message}")]
	InvalidResponse {
		/// Decoding failure.
		message: String,
	},
	/// Refresh panicked before it could settle.
	#[error("The refresh was aborted unexpectedly.")]
	Aborted,
	/// Session was cleared or replaced while the refresh was in flight; the result was discarded.
	#[error("The session ended while the refresh was in flight.")]
	Superseded,
}
