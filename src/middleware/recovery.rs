//! Reactive 401 recovery: one single-flight refresh followed by exactly one replay.

// self
use crate::{
	_prelude::*,
	error::RefreshError,
	http::{ApiRequest, ApiResponse},
	middleware::{LayerFuture, Replay, ResponseLayer},
	session::{SessionManager, is_auth_endpoint},
	signal::UnauthorizedReason,
};

/// Recovers from 401 responses through the session manager.
///
/// - A replayed request that is rejected again tears the session down and fires
///   `retry_exhausted`.
/// - Auth endpoints never trigger a refresh.
/// - A request stamped with a token that has since been replaced is replayed without another
///   refresh, so late 401s from an already recovered window do not start a second refresh.
/// - A request stamped with a token that has since been cleared hands its 401 on untouched; the
///   teardown that cleared it already fired the signal.
/// - Otherwise the shared refresh runs; success replays the request once, failure hands the
///   original 401 on (the manager has already cleared the session and fired the signal).
#[derive(Clone, Debug)]
pub struct RecoveryLayer {
	session: SessionManager,
}
impl RecoveryLayer {
	/// Creates a layer bound to `session`.
	pub fn new(session: SessionManager) -> Self {
		Self { session }
	}

	async fn recover(
		&self,
		request: &ApiRequest,
		response: ApiResponse,
		replay: &dyn Replay,
	) -> Result<ApiResponse> {
		if request.retried {
			tracing::warn!(url = %request.url, "Request was rejected again after a refresh.");

			self.session.expire(UnauthorizedReason::RetryExhausted);

			return Ok(response);
		}
		if is_auth_endpoint(&request.url) {
			return Ok(response);
		}

		let current = self.session.store().access_token();

		if current.is_none() && request.credential.is_some() {
			tracing::debug!(url = %request.url, "Session ended while the request was in flight.");

			return Ok(response);
		}
		if current.is_some() && current != request.credential {
			tracing::debug!(url = %request.url, "Replaying with the token installed meanwhile.");

			return replay.replay(request.clone().into_retry()).await;
		}

		match self.session.refresh().await {
			Ok(()) => replay.replay(request.clone().into_retry()).await,
			Err(RefreshError::Superseded) if self.session.store().access_token().is_some() =>
				replay.replay(request.clone().into_retry()).await,
			Err(e) => {
				tracing::debug!(url = %request.url, error = %e, "Recovery failed.");

				Ok(response)
			},
		}
	}
}
impl ResponseLayer for RecoveryLayer {
	fn on_response<'a>(
		&'a self,
		request: &'a ApiRequest,
		outcome: Result<ApiResponse>,
		replay: &'a dyn Replay,
	) -> LayerFuture<'a> {
		Box::pin(async move {
			match outcome {
				Ok(response) if response.status == 401 =>
					self.recover(request, response, replay).await,
				other => other,
			}
		})
	}
}
