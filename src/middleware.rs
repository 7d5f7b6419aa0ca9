//! Ordered request/response middleware executed around an [`HttpTransport`].
//!
//! Request layers transform the outgoing [`ApiRequest`] in order. Response layers then see the
//! transport outcome in order; each one may pass it on, rewrite it, or [`Replay`] the request
//! through the whole pipeline again.

pub mod credentials;
pub mod errors;
pub mod recovery;

pub use credentials::*;
pub use errors::*;
pub use recovery::*;

// self
use crate::{
	_prelude::*,
	http::{ApiRequest, ApiResponse, HttpTransport},
};

/// Boxed future returned by response layers and replays.
pub type LayerFuture<'a> = Pin<Box<dyn Future<Output = Result<ApiResponse>> + 'a + Send>>;

/// `(request) -> request` transform applied before the transport call.
pub trait RequestLayer
where
	Self: Send + Sync,
{
	/// Transforms the outgoing request; an error aborts the call.
	fn on_request(&self, request: ApiRequest) -> Result<ApiRequest>;
}

/// `(response | error) -> response | error` transform applied after the transport call.
///
/// `Ok` outcomes include 4xx/5xx responses until a layer turns them into errors.
pub trait ResponseLayer
where
	Self: Send + Sync,
{
	/// Inspects or rewrites the outcome of `request`.
	fn on_response<'a>(
		&'a self,
		request: &'a ApiRequest,
		outcome: Result<ApiResponse>,
		replay: &'a dyn Replay,
	) -> LayerFuture<'a>;
}

/// Re-executes a request through every layer of the pipeline.
pub trait Replay
where
	Self: Send + Sync,
{
	/// Dispatches `request` again.
	fn replay(&self, request: ApiRequest) -> LayerFuture<'_>;
}

/// Middleware chain bound to one transport.
#[derive(Clone)]
pub struct Pipeline {
	transport: Arc<dyn HttpTransport>,
	request_layers: Vec<Arc<dyn RequestLayer>>,
	response_layers: Vec<Arc<dyn ResponseLayer>>,
}
impl Pipeline {
	/// Creates an empty pipeline.
	pub fn new(transport: Arc<dyn HttpTransport>) -> Self {
		Self { transport, request_layers: Vec::new(), response_layers: Vec::new() }
	}

	/// Appends a request layer.
	pub fn with_request_layer<L>(mut self, layer: L) -> Self
	where
		L: 'static + RequestLayer,
	{
		self.request_layers.push(Arc::new(layer));

		self
	}

	/// Appends a response layer.
	pub fn with_response_layer<L>(mut self, layer: L) -> Self
	where
		L: 'static + ResponseLayer,
	{
		self.response_layers.push(Arc::new(layer));

		self
	}

	/// Number of request and response layers.
	pub fn layer_counts(&self) -> (usize, usize) {
		(self.request_layers.len(), self.response_layers.len())
	}

	/// Runs `request` through every layer and the transport.
	pub fn dispatch(&self, request: ApiRequest) -> LayerFuture<'_> {
		Box::pin(async move {
			let mut request = request;

			for layer in &self.request_layers {
				request = layer.on_request(request)?;
			}

			let mut outcome = self.transport.execute(request.clone()).await.map_err(Error::from);

			for layer in &self.response_layers {
				outcome = layer.on_response(&request, outcome, self).await;
			}

			outcome
		})
	}
}
impl Replay for Pipeline {
	fn replay(&self, request: ApiRequest) -> LayerFuture<'_> {
		self.dispatch(request)
	}
}
impl Debug for Pipeline {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Pipeline")
			.field("request_layers", &self.request_layers.len())
			.field("response_layers", &self.response_layers.len())
			.finish()
	}
}
