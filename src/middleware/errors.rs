//! Terminal response layer: success pass-through, conflict pass-through, and normalization.

// self
use crate::{
	_prelude::*,
	http::{ApiRequest, ApiResponse},
	middleware::{LayerFuture, Replay, ResponseLayer},
	normalize::{self, StatusMessages},
};

/// Turns non-success responses and transport failures into normalized errors.
#[derive(Clone, Debug)]
pub struct ErrorLayer {
	service: String,
	messages: StatusMessages,
	pass_through_409: bool,
}
impl ErrorLayer {
	/// Creates a layer for the named service.
	pub fn new(service: impl Into<String>) -> Self {
		Self {
			service: service.into(),
			messages: StatusMessages::default(),
			pass_through_409: false,
		}
	}

	/// Overrides per-status messages.
	pub fn with_messages(mut self, messages: StatusMessages) -> Self {
		self.messages = messages;

		self
	}

	/// Rejects 409 responses with the untouched [`ApiResponse`] instead of a message.
	pub fn with_pass_through_409(mut self, enabled: bool) -> Self {
		self.pass_through_409 = enabled;

		self
	}

	fn settle(&self, request: &ApiRequest, outcome: Result<ApiResponse>) -> Result<ApiResponse> {
		match outcome {
			Ok(response) if response.is_success() => {
				tracing::debug!(
					service = %self.service,
					method = %request.method,
					url = %request.url,
					status = response.status,
					"Request succeeded."
				);

				Ok(response)
			},
			Ok(response) if response.status == 409 && self.pass_through_409 =>
				Err(Error::Conflict(Box::new(response))),
			Ok(response) => {
				let err = normalize::response_error(&response, request.snapshot(), &self.messages);

				tracing::debug!(
					service = %self.service,
					url = %request.url,
					status = response.status,
					kind = %err.kind,
					"Request failed."
				);

				Err(err.into())
			},
			Err(Error::Transport(e)) => {
				tracing::debug!(
					service = %self.service,
					url = %request.url,
					error = %e,
					"Transport failed."
				);

				Err(normalize::transport_error(&e, request.snapshot(), &self.service).into())
			},
			Err(other) => Err(other),
		}
	}
}
impl ResponseLayer for ErrorLayer {
	fn on_response<'a>(
		&'a self,
		request: &'a ApiRequest,
		outcome: Result<ApiResponse>,
		_: &'a dyn Replay,
	) -> LayerFuture<'a> {
		let settled = self.settle(request, outcome);

		Box::pin(async move { settled })
	}
}
