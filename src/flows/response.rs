//! `401` recovery: refresh once, retry once, downgrade reads.

// self
use crate::{
	_prelude::*,
	auth::TokenSecret,
	descriptor::{ApiDescriptor, EndpointKind},
	flows::{self, SessionClient},
	http::{ApiRequest, ApiResponse, ApiTransport, AuthMode},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	store::ClearReason,
};

const UNAUTHORIZED: u16 = 401;

/// What the session client does with a failed response.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Recovery {
	/// Return the failure to the caller unchanged.
	PassThrough,
	/// End the session with `Expired`, then return the failure.
	Expire,
	/// Refresh the access token and retry the request once.
	Refresh,
}

/// Classifies failed responses.
#[derive(Clone, Copy, Debug)]
pub struct ResponseInterceptor<'a> {
	descriptor: &'a ApiDescriptor,
}
impl<'a> ResponseInterceptor<'a> {
	/// Creates an interceptor that recognizes the endpoints of `descriptor`.
	pub fn new(descriptor: &'a ApiDescriptor) -> Self {
		Self { descriptor }
	}

	/// Decides how to handle a non-2xx `status` returned for `request`.
	pub fn classify(&self, request: &ApiRequest, status: u16) -> Recovery {
		if status != UNAUTHORIZED {
			return Recovery::PassThrough;
		}
		// Rejected credentials are the caller's error, not a session problem.
		if self.descriptor.is_endpoint(EndpointKind::Login, request.path()) {
			return Recovery::PassThrough;
		}
		if self.descriptor.is_endpoint(EndpointKind::Refresh, request.path()) {
			return Recovery::Expire;
		}
		if request.retries() > 0 {
			return Recovery::Expire;
		}
		if request.auth() == AuthMode::Anonymous {
			return Recovery::PassThrough;
		}

		Recovery::Refresh
	}
}

impl<T> SessionClient<T>
where
	T: ?Sized + ApiTransport,
{
	/// Sends `request` through the interceptors.
	///
	/// Non-2xx responses that are not recovered become [`Error::Status`]. A `401` triggers at most
	/// one refresh and one retry; when the session cannot be refreshed, read requests are retried
	/// anonymously while writes receive the original `401`. Transport failures are returned
	/// untouched.
	pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
		const KIND: FlowKind = FlowKind::Request;

		let span = FlowSpan::new(KIND, "send");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span.instrument(self.send_with_recovery(request)).await;

		match &result {
			Ok(_) => obs::record_flow_outcome(KIND, FlowOutcome::Success),
			Err(_) => obs::record_flow_outcome(KIND, FlowOutcome::Failure),
		}

		result
	}

	async fn send_with_recovery(&self, request: ApiRequest) -> Result<ApiResponse> {
		let mut bearer = self.request_interceptor().authorize(&request);
		let mut request = request;

		loop {
			let response = self.dispatch(&request, bearer.as_ref()).await?;

			if response.is_success() {
				return Ok(response);
			}

			match self.response_interceptor().classify(&request, response.status) {
				Recovery::PassThrough => return Err(Error::from_response(&response)),
				Recovery::Expire => {
					obs::log_unauthorized(request.path(), "expire");
					self.store.clear(ClearReason::Expired);

					return Err(Error::from_response(&response));
				},
				Recovery::Refresh => {
					let retry = request.retried();

					match self.request_refresh().await {
						Some(token) => {
							obs::log_unauthorized(request.path(), "retry");

							request = retry;
							bearer = Some(token);
						},
						None => {
							self.store.clear(ClearReason::Expired);

							if !retry.method().is_read() {
								obs::log_unauthorized(request.path(), "reject");

								return Err(Error::from_response(&response));
							}

							obs::log_unauthorized(request.path(), "anonymous");

							request = retry.anonymous();
							bearer = None;
						},
					}
				},
			}
		}
	}

	async fn dispatch(
		&self,
		request: &ApiRequest,
		bearer: Option<&TokenSecret>,
	) -> Result<ApiResponse> {
		let outbound = request.to_outbound(&self.descriptor, bearer)?;

		flows::execute(self.transport.as_ref(), outbound).await
	}
}
