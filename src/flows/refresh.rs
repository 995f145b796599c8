//! Refresh-token orchestration with a single in-flight exchange per client.
//!
//! [`RefreshCoordinator::request_refresh`] is the only way the session layer obtains a new
//! access token. Concurrent callers join the exchange already in flight instead of starting
//! their own, the coordinator returns to idle before any of them observes the result, and a
//! failed exchange ends the session with [`ChangeReason::Expired`](crate::store::ChangeReason).
//! Failures are never retried and never surface as errors; callers receive `None`.

mod metrics;

pub use metrics::RefreshMetrics;

// self
use crate::{
	_prelude::*,
	auth::{IssuedTokens, TokenSecret},
	descriptor::{ApiDescriptor, EndpointKind},
	flows::{self, SingleFlight},
	http::{ApiRequest, ApiTransport},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	store::{ClearReason, TokenStore},
};

#[derive(Serialize)]
struct RefreshBody<'a> {
	refresh: &'a str,
}

/// Guarantees at most one refresh exchange in flight for a session client.
pub struct RefreshCoordinator<T>
where
	T: ?Sized + ApiTransport,
{
	transport: Arc<T>,
	store: Arc<TokenStore>,
	descriptor: Arc<ApiDescriptor>,
	metrics: Arc<RefreshMetrics>,
	flight: SingleFlight<Option<TokenSecret>>,
}
impl<T> RefreshCoordinator<T>
where
	T: ?Sized + ApiTransport,
{
	/// Creates an idle coordinator.
	pub fn new(transport: Arc<T>, store: Arc<TokenStore>, descriptor: Arc<ApiDescriptor>) -> Self {
		Self {
			transport,
			store,
			descriptor,
			metrics: Default::default(),
			flight: SingleFlight::new(),
		}
	}

	/// Returns a fresh access token, or `None` when the session cannot be refreshed.
	///
	/// Without a stored refresh token this resolves to `None` without touching the network.
	/// Dropping the returned future does not cancel an exchange other callers are awaiting.
	pub async fn request_refresh(&self) -> Option<TokenSecret> {
		let transport = self.transport.clone();
		let store = self.store.clone();
		let descriptor = self.descriptor.clone();
		let metrics = self.metrics.clone();

		self.flight.run(move || refresh_once(transport, store, descriptor, metrics)).await
	}

	/// Returns `true` while an exchange is in flight.
	pub fn is_refreshing(&self) -> bool {
		self.flight.in_flight()
	}

	/// Counters for refresh exchanges.
	pub fn metrics(&self) -> &RefreshMetrics {
		&self.metrics
	}
}
impl<T> Debug for RefreshCoordinator<T>
where
	T: ?Sized + ApiTransport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RefreshCoordinator")
			.field("flight", &self.flight)
			.field("metrics", &self.metrics)
			.finish()
	}
}

async fn refresh_once<T>(
	transport: Arc<T>,
	store: Arc<TokenStore>,
	descriptor: Arc<ApiDescriptor>,
	metrics: Arc<RefreshMetrics>,
) -> Option<TokenSecret>
where
	T: ?Sized + ApiTransport,
{
	const KIND: FlowKind = FlowKind::Refresh;

	let refresh = store.get().refresh?;
	let span = FlowSpan::new(KIND, "request_refresh");

	obs::record_flow_outcome(KIND, FlowOutcome::Attempt);
	metrics.record_attempt();

	match span.instrument(exchange(transport.as_ref(), &descriptor, &refresh)).await {
		Ok(issued) => {
			let access = issued.access;

			store.set(Some(access.clone()), Some(issued.refresh.unwrap_or(refresh)));
			metrics.record_success();
			obs::record_flow_outcome(KIND, FlowOutcome::Success);

			Some(access)
		},
		Err(err) => {
			obs::log_swallowed(KIND, &err);
			store.clear(ClearReason::Expired);
			metrics.record_failure();
			obs::record_flow_outcome(KIND, FlowOutcome::Failure);

			None
		},
	}
}

async fn exchange<T>(
	transport: &T,
	descriptor: &ApiDescriptor,
	refresh: &TokenSecret,
) -> Result<IssuedTokens>
where
	T: ?Sized + ApiTransport,
{
	let request = ApiRequest::post(descriptor.endpoint(EndpointKind::Refresh))
		.anonymous()
		.timeout(descriptor.timings.refresh_timeout)
		.json(&RefreshBody { refresh: refresh.expose() })?;
	let response = flows::execute(transport, request.to_outbound(descriptor, None)?).await?;

	if !response.is_success() {
		return Err(Error::from_response(&response));
	}

	Ok(response.json()?)
}
