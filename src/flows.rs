//! Session-aware API client and the interceptors it drives.

pub mod refresh;
pub mod request;
pub mod response;
pub mod singleflight;

pub use refresh::*;
pub use request::*;
pub use response::*;
pub use singleflight::*;

// crates.io
use serde::de::DeserializeOwned;
// self
use crate::{
	_prelude::*,
	descriptor::ApiDescriptor,
	error::TransportError,
	http::{ApiRequest, ApiResponse, ApiTransport, OutboundRequest, to_std},
	store::TokenStore,
};
#[cfg(feature = "reqwest")] use crate::http::ReqwestTransport;

#[cfg(feature = "reqwest")]
/// Session client specialized for the crate's default reqwest transport.
pub type ReqwestSessionClient = SessionClient<ReqwestTransport>;

/// Authenticated API client shared by every feature of an application.
///
/// Construct it once and hand out clones (or an `Arc`); clones share the transport, the token
/// store, and the refresh coordinator. Every call passes through the [`RequestInterceptor`] on
/// the way out and the [`ResponseInterceptor`] on the way back.
pub struct SessionClient<T>
where
	T: ?Sized + ApiTransport,
{
	/// HTTP transport used for every outbound request.
	pub transport: Arc<T>,
	/// Token store holding the session's access/refresh pair.
	pub store: Arc<TokenStore>,
	/// Base URL, endpoint paths, and timings.
	pub descriptor: Arc<ApiDescriptor>,
	refresh: Arc<RefreshCoordinator<T>>,
}
impl<T> SessionClient<T>
where
	T: ?Sized + ApiTransport,
{
	/// Creates a client bound to `transport`, `store`, and `descriptor`.
	pub fn new(transport: impl Into<Arc<T>>, store: Arc<TokenStore>, descriptor: ApiDescriptor) -> Self {
		let transport = transport.into();
		let descriptor = Arc::new(descriptor);
		let refresh =
			Arc::new(RefreshCoordinator::new(transport.clone(), store.clone(), descriptor.clone()));

		Self { transport, store, descriptor, refresh }
	}

	/// Sends `request` and decodes a successful JSON body.
	pub async fn send_json<R>(&self, request: ApiRequest) -> Result<R>
	where
		R: DeserializeOwned,
	{
		Ok(self.send(request).await?.json()?)
	}

	/// `GET`s `path` and decodes the JSON body.
	pub async fn get_json<R>(&self, path: &str) -> Result<R>
	where
		R: DeserializeOwned,
	{
		self.send_json(ApiRequest::get(path)).await
	}

	/// `POST`s `body` as JSON to `path` and decodes the JSON reply.
	pub async fn post_json<B, R>(&self, path: &str, body: &B) -> Result<R>
	where
		B: ?Sized + Serialize,
		R: DeserializeOwned,
	{
		self.send_json(ApiRequest::post(path).json(body)?).await
	}

	/// Returns a fresh access token through the shared refresh coordinator.
	pub async fn request_refresh(&self) -> Option<crate::auth::TokenSecret> {
		self.refresh.request_refresh().await
	}

	/// Returns `true` while a refresh exchange is in flight.
	pub fn is_refreshing(&self) -> bool {
		self.refresh.is_refreshing()
	}

	/// Counters for refresh exchanges.
	pub fn refresh_metrics(&self) -> &RefreshMetrics {
		self.refresh.metrics()
	}

	/// Interceptor deciding the `Authorization` header for outgoing requests.
	pub fn request_interceptor(&self) -> RequestInterceptor<'_> {
		RequestInterceptor::new(&self.store, self.descriptor.timings.expiry_margin)
	}

	/// Interceptor classifying `401` responses.
	pub fn response_interceptor(&self) -> ResponseInterceptor<'_> {
		ResponseInterceptor::new(&self.descriptor)
	}
}
#[cfg(feature = "reqwest")]
impl SessionClient<ReqwestTransport> {
	/// Creates a client backed by `client`.
	pub fn with_reqwest(client: ReqwestClient, store: Arc<TokenStore>, descriptor: ApiDescriptor) -> Self {
		Self::new(ReqwestTransport::with_client(client), store, descriptor)
	}
}
impl<T> Clone for SessionClient<T>
where
	T: ?Sized + ApiTransport,
{
	fn clone(&self) -> Self {
		Self {
			transport: self.transport.clone(),
			store: self.store.clone(),
			descriptor: self.descriptor.clone(),
			refresh: self.refresh.clone(),
		}
	}
}
impl<T> Debug for SessionClient<T>
where
	T: ?Sized + ApiTransport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("SessionClient")
			.field("descriptor", &self.descriptor)
			.field("store", &self.store)
			.field("refresh", &self.refresh)
			.finish()
	}
}

/// Executes `request` on `transport`, bounded by the request's own timeout.
pub(crate) async fn execute<T>(transport: &T, request: OutboundRequest) -> Result<ApiResponse>
where
	T: ?Sized + ApiTransport,
{
	let deadline = to_std(request.timeout);

	match tokio::time::timeout(deadline, transport.execute(request)).await {
		Ok(result) => Ok(result?),
		Err(_) => Err(TransportError::Timeout.into()),
	}
}
