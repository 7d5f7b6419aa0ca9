//! Data-driven client construction.
//!
//! Every backend is described by one [`ClientConfig`]; [`ClientFactory`] turns it into an
//! [`ApiClient`] wired to the shared [`SessionManager`]. Services that differ only in base URL,
//! timeout, or header policy are rows in a [`ServiceTable`], not separate client types.

// std
use std::time::Duration as StdDuration;
// self
use crate::{
	_prelude::*,
	error::ConfigError,
	http::{ApiRequest, ApiResponse, HttpTransport, Method, join_url},
	middleware::{
		CredentialLayer, ErrorLayer, OrgHeader, Pipeline, RecoveryLayer, TenantLayer,
	},
	normalize::StatusMessages,
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	session::SessionManager,
};

const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Configuration of one backend client.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
	/// Base URL every request path is resolved against.
	pub base_url: Url,
	/// Per-request timeout in milliseconds.
	#[serde(default = "default_timeout_ms")]
	pub timeout_ms: u64,
	/// Name used in logs and transport diagnoses.
	#[serde(default)]
	pub service_name: String,
	/// Tenant header policy.
	#[serde(default)]
	pub org_header: OrgHeader,
	/// Tenant header name override.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub org_header_name: Option<String>,
	/// Per-status message overrides.
	#[serde(default, skip_serializing_if = "StatusMessages::is_empty")]
	pub error_messages: StatusMessages,
	/// Install 401 recovery (refresh and replay).
	#[serde(default = "default_true")]
	pub handle_unauthorized: bool,
	/// Reject 409 responses with the raw response.
	#[serde(default)]
	pub pass_through_409: bool,
}
impl ClientConfig {
	/// Creates a configuration with default timeout and header policy.
	pub fn new(service_name: impl Into<String>, base_url: Url) -> Self {
		Self {
			base_url,
			timeout_ms: DEFAULT_TIMEOUT_MS,
			service_name: service_name.into(),
			org_header: OrgHeader::None,
			org_header_name: None,
			error_messages: StatusMessages::default(),
			handle_unauthorized: true,
			pass_through_409: false,
		}
	}

	/// Sets the per-request timeout.
	pub fn with_timeout(mut self, timeout: StdDuration) -> Self {
		self.timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);

		self
	}

	/// Sets the tenant header policy.
	pub fn with_org_header(mut self, org_header: OrgHeader) -> Self {
		self.org_header = org_header;

		self
	}

	/// Overrides the tenant header name.
	pub fn with_org_header_name(mut self, name: impl Into<String>) -> Self {
		self.org_header_name = Some(name.into());

		self
	}

	/// Overrides the message used for `status`.
	pub fn with_error_message(mut self, status: u16, message: impl Into<String>) -> Self {
		self.error_messages = self.error_messages.with(status, message);

		self
	}

	/// Enables or disables 401 recovery.
	pub fn with_handle_unauthorized(mut self, enabled: bool) -> Self {
		self.handle_unauthorized = enabled;

		self
	}

	/// Enables or disables raw 409 pass-through.
	pub fn with_pass_through_409(mut self, enabled: bool) -> Self {
		self.pass_through_409 = enabled;

		self
	}

	/// Per-request timeout.
	pub fn timeout(&self) -> StdDuration {
		StdDuration::from_millis(self.timeout_ms)
	}
}

fn default_timeout_ms() -> u64 {
	DEFAULT_TIMEOUT_MS
}

fn default_true() -> bool {
	true
}

/// Named client configurations, keyed by service.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServiceTable(BTreeMap<String, ClientConfig>);
impl ServiceTable {
	/// Parses a JSON object of `{ "<service>": <ClientConfig>, .. }`.
	pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
		let mut de = serde_json::Deserializer::from_str(raw);

		serde_path_to_error::deserialize(&mut de).map_err(ConfigError::InvalidServiceTable)
	}

	/// Adds or replaces a service.
	pub fn with(mut self, service: impl Into<String>, config: ClientConfig) -> Self {
		self.0.insert(service.into(), config);

		self
	}

	/// Configured service names.
	pub fn services(&self) -> impl Iterator<Item = &str> {
		self.0.keys().map(String::as_str)
	}
}

/// Clients built from a [`ServiceTable`].
#[derive(Clone, Debug, Default)]
pub struct ClientSet(BTreeMap<String, ApiClient>);
impl ClientSet {
	/// Client for `service`, if configured.
	pub fn get(&self, service: &str) -> Option<&ApiClient> {
		self.0.get(service)
	}

	/// Client for `service`, or [`ConfigError::UnknownService`].
	pub fn client(&self, service: &str) -> Result<&ApiClient, ConfigError> {
		self.get(service).ok_or_else(|| ConfigError::UnknownService { service: service.to_owned() })
	}

	/// Number of clients.
	pub fn len(&self) -> usize {
		self.0.len()
	}

	/// Returns `true` when no client was built.
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}
}

/// Builds [`ApiClient`]s that share one [`SessionManager`].
#[derive(Clone)]
pub struct ClientFactory {
	session: SessionManager,
	transport: Arc<dyn HttpTransport>,
}
impl ClientFactory {
	/// Creates a factory that reuses the session manager's transport.
	pub fn new(session: SessionManager) -> Self {
		let transport = session.transport().clone();

		Self { session, transport }
	}

	/// Uses a different transport for built clients.
	pub fn with_transport<T>(mut self, transport: T) -> Self
	where
		T: HttpTransport,
	{
		self.transport = Arc::new(transport);

		self
	}

	/// Session manager the built clients recover through.
	pub fn session(&self) -> &SessionManager {
		&self.session
	}

	/// Builds a client with credential, tenant, recovery, and error layers installed.
	pub fn build(&self, mut config: ClientConfig) -> Result<ApiClient, ConfigError> {
		if config.base_url.cannot_be_a_base() {
			return Err(ConfigError::InvalidEndpoint {
				path: config.base_url.to_string(),
				source: url::ParseError::RelativeUrlWithCannotBeABaseBase,
			});
		}
		if config.service_name.is_empty() {
			config.service_name =
				config.base_url.host_str().map_or_else(|| "api".to_owned(), ToOwned::to_owned);
		}

		let store = self.session.store().clone();
		let mut tenant = TenantLayer::new(store.clone(), config.org_header);

		if let Some(name) = &config.org_header_name {
			tenant = tenant.with_header_name(name.clone());
		}

		let mut pipeline = Pipeline::new(self.transport.clone())
			.with_request_layer(CredentialLayer::new(store))
			.with_request_layer(tenant);

		if config.handle_unauthorized {
			pipeline = pipeline.with_response_layer(RecoveryLayer::new(self.session.clone()));
		}

		let pipeline = pipeline.with_response_layer(
			ErrorLayer::new(config.service_name.clone())
				.with_messages(config.error_messages.clone())
				.with_pass_through_409(config.pass_through_409),
		);

		Ok(ApiClient { config: Arc::new(config), pipeline: Arc::new(pipeline) })
	}

	/// Builds every service of `table`; names missing from a row default to the table key.
	pub fn build_table(&self, table: ServiceTable) -> Result<ClientSet, ConfigError> {
		let mut clients = BTreeMap::new();

		for (service, mut config) in table.0 {
			if config.service_name.is_empty() {
				config.service_name = service.clone();
			}

			clients.insert(service, self.build(config)?);
		}

		Ok(ClientSet(clients))
	}
}
impl Debug for ClientFactory {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ClientFactory").field("session", &self.session).finish_non_exhaustive()
	}
}

/// Configured client for one backend service.
#[derive(Clone, Debug)]
pub struct ApiClient {
	config: Arc<ClientConfig>,
	pipeline: Arc<Pipeline>,
}
impl ApiClient {
	/// Configuration the client was built from.
	pub fn config(&self) -> &ClientConfig {
		&self.config
	}

	/// Middleware chain used for every request.
	pub fn pipeline(&self) -> &Pipeline {
		&self.pipeline
	}

	/// Creates a request for `path` resolved against the base URL, with the client timeout.
	pub fn request(&self, method: Method, path: &str) -> Result<ApiRequest, ConfigError> {
		Ok(ApiRequest::new(method, join_url(&self.config.base_url, path)?)
			.with_timeout(self.config.timeout()))
	}

	/// Sends a prepared request through the pipeline.
	pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
		const KIND: FlowKind = FlowKind::Request;

		let span = FlowSpan::new(KIND, "send");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span.instrument(self.pipeline.dispatch(request)).await;

		obs::record_flow_result(KIND, &result);

		result
	}

	/// `GET path`.
	pub async fn get(&self, path: &str) -> Result<ApiResponse> {
		self.send(self.request(Method::Get, path)?).await
	}

	/// `DELETE path`.
	pub async fn delete(&self, path: &str) -> Result<ApiResponse> {
		self.send(self.request(Method::Delete, path)?).await
	}

	/// `POST path` with a JSON body.
	pub async fn post<B>(&self, path: &str, body: &B) -> Result<ApiResponse>
	where
		B: ?Sized + Serialize,
	{
		self.send(self.request(Method::Post, path)?.with_json(body)?).await
	}

	/// `PUT path` with a JSON body.
	pub async fn put<B>(&self, path: &str, body: &B) -> Result<ApiResponse>
	where
		B: ?Sized + Serialize,
	{
		self.send(self.request(Method::Put, path)?.with_json(body)?).await
	}

	/// `PATCH path` with a JSON body.
	pub async fn patch<B>(&self, path: &str, body: &B) -> Result<ApiResponse>
	where
		B: ?Sized + Serialize,
	{
		self.send(self.request(Method::Patch, path)?.with_json(body)?).await
	}

	/// `GET path`, decoding the JSON body.
	pub async fn get_json<T>(&self, path: &str) -> Result<T>
	where
		T: DeserializeOwned,
	{
		self.get(path).await?.json()
	}

	/// `POST path` with a JSON body, decoding the JSON response.
	pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T>
	where
		B: ?Sized + Serialize,
		T: DeserializeOwned,
	{
		self.post(path, body).await?.json()
	}
}
