//! Transport primitives for session-aware API calls.
//!
//! The module exposes [`ApiRequest`] (the immutable, retriable call descriptor),
//! [`OutboundRequest`] (its wire form once the session layer has decided on authorization), and
//! [`ApiResponse`]. [`ApiTransport`] is the crate's only dependency on an HTTP stack: callers
//! provide an implementation, typically [`ReqwestTransport`], and the session client drives it.

// std
#[cfg(feature = "reqwest")] use std::ops::Deref;
// crates.io
#[cfg(feature = "reqwest")] use reqwest::header::{ACCEPT, HeaderValue};
use serde::de::DeserializeOwned;
// self
use crate::{
	_prelude::*,
	auth::TokenSecret,
	descriptor::ApiDescriptor,
	error::{ConfigError, DecodeError, TransportError},
};

/// Boxed future returned by [`ApiTransport::execute`].
pub type TransportFuture<'a> =
	Pin<Box<dyn Future<Output = Result<ApiResponse, TransportError>> + 'a + Send>>;

/// Header carrying the bearer token.
pub const AUTHORIZATION: &str = "authorization";
/// Header naming the request body's media type.
pub const CONTENT_TYPE: &str = "content-type";

const JSON: &str = "application/json";

/// Abstraction over HTTP transports capable of executing API calls.
///
/// Implementations must be `Send + Sync + 'static` so one transport can be shared by the session
/// client, the refresh coordinator, and the session façade. The returned future must own
/// whatever it needs from `request`, and must be `Send` so refreshes can run on a spawned task.
pub trait ApiTransport
where
	Self: 'static + Send + Sync,
{
	/// Executes `request` and returns the raw response, whatever its status.
	///
	/// Only failures that produced no response (DNS, TCP, TLS, timeouts) are errors.
	fn execute(&self, request: OutboundRequest) -> TransportFuture<'_>;
}

/// HTTP methods understood by the session layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
	/// `GET`
	Get,
	/// `HEAD`
	Head,
	/// `OPTIONS`
	Options,
	/// `POST`
	Post,
	/// `PUT`
	Put,
	/// `PATCH`
	Patch,
	/// `DELETE`
	Delete,
}
impl Method {
	/// Returns the method token as sent on the wire.
	pub const fn as_str(self) -> &'static str {
		match self {
			Method::Get => "GET",
			Method::Head => "HEAD",
			Method::Options => "OPTIONS",
			Method::Post => "POST",
			Method::Put => "PUT",
			Method::Patch => "PATCH",
			Method::Delete => "DELETE",
		}
	}

	/// Returns `true` for methods that only read (`GET`, `HEAD`, `OPTIONS`).
	///
	/// Read requests may be downgraded to an anonymous retry when the session cannot be
	/// refreshed; writes never are.
	pub const fn is_read(self) -> bool {
		matches!(self, Method::Get | Method::Head | Method::Options)
	}
}
impl Display for Method {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Whether a request participates in the session.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum AuthMode {
	/// Attach the session's bearer token when one is usable.
	#[default]
	Session,
	/// Never attach a token and never trigger a refresh.
	Anonymous,
}

/// Immutable description of an API call.
///
/// Builder methods consume and return the request. The session client never mutates a request;
/// an authentication retry is a new descriptor with its retry counter incremented.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApiRequest {
	method: Method,
	path: String,
	query: Vec<(String, String)>,
	headers: Vec<(String, String)>,
	body: Option<Vec<u8>>,
	timeout: Option<Duration>,
	auth: AuthMode,
	retries: u8,
}
impl ApiRequest {
	/// Creates a request for `path`, relative to the API base URL.
	pub fn new(method: Method, path: impl Into<String>) -> Self {
		Self {
			method,
			path: path.into(),
			query: Vec::new(),
			headers: Vec::new(),
			body: None,
			timeout: None,
			auth: AuthMode::Session,
			retries: 0,
		}
	}

	/// Shorthand for a `GET` request.
	pub fn get(path: impl Into<String>) -> Self {
		Self::new(Method::Get, path)
	}

	/// Shorthand for a `POST` request.
	pub fn post(path: impl Into<String>) -> Self {
		Self::new(Method::Post, path)
	}

	/// Shorthand for a `PUT` request.
	pub fn put(path: impl Into<String>) -> Self {
		Self::new(Method::Put, path)
	}

	/// Shorthand for a `PATCH` request.
	pub fn patch(path: impl Into<String>) -> Self {
		Self::new(Method::Patch, path)
	}

	/// Shorthand for a `DELETE` request.
	pub fn delete(path: impl Into<String>) -> Self {
		Self::new(Method::Delete, path)
	}

	/// Serializes `body` as the JSON payload.
	pub fn json<B>(mut self, body: &B) -> Result<Self, ConfigError>
	where
		B: ?Sized + Serialize,
	{
		let bytes = serde_json::to_vec(body).map_err(|source| ConfigError::RequestBody { source })?;

		self.headers.retain(|(name, _)| !name.eq_ignore_ascii_case(CONTENT_TYPE));
		self.headers.push((CONTENT_TYPE.into(), JSON.into()));
		self.body = Some(bytes);

		Ok(self)
	}

	/// Appends a query parameter.
	pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		self.query.push((name.into(), value.into()));

		self
	}

	/// Appends a header. `Authorization` is reserved for the session layer and ignored.
	pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
		let name = name.into();

		if !name.eq_ignore_ascii_case(AUTHORIZATION) {
			self.headers.push((name, value.into()));
		}

		self
	}

	/// Overrides the descriptor's default request timeout.
	pub fn timeout(mut self, timeout: Duration) -> Self {
		self.timeout = Some(timeout);

		self
	}

	/// Marks the request as anonymous (login, refresh, register, public catalogue reads).
	pub fn anonymous(mut self) -> Self {
		self.auth = AuthMode::Anonymous;

		self
	}

	/// HTTP method.
	pub fn method(&self) -> Method {
		self.method
	}

	/// Path relative to the API base URL.
	pub fn path(&self) -> &str {
		&self.path
	}

	/// Authorization mode.
	pub fn auth(&self) -> AuthMode {
		self.auth
	}

	/// Number of authentication retries already performed for this call.
	pub fn retries(&self) -> u8 {
		self.retries
	}

	/// Serialized body, if any.
	pub fn body(&self) -> Option<&[u8]> {
		self.body.as_deref()
	}

	/// Returns a copy marked as one authentication retry further along.
	pub(crate) fn retried(&self) -> Self {
		let mut next = self.clone();

		next.retries = next.retries.saturating_add(1);

		next
	}

	/// Resolves the request against `descriptor`, attaching `bearer` when given.
	pub fn to_outbound(
		&self,
		descriptor: &ApiDescriptor,
		bearer: Option<&TokenSecret>,
	) -> Result<OutboundRequest, ConfigError> {
		let mut url = descriptor.url_for(&self.path)?;

		if !self.query.is_empty() {
			url.query_pairs_mut().extend_pairs(self.query.iter());
		}

		let mut headers = self.headers.clone();

		if let Some(token) = bearer {
			headers.push((AUTHORIZATION.into(), token.bearer()));
		}

		Ok(OutboundRequest {
			method: self.method,
			url,
			headers,
			body: self.body.clone(),
			timeout: self.timeout.unwrap_or(descriptor.timings.request_timeout),
		})
	}
}

/// Wire-level request handed to an [`ApiTransport`].
#[derive(Clone, PartialEq, Eq)]
pub struct OutboundRequest {
	/// HTTP method.
	pub method: Method,
	/// Absolute request URL.
	pub url: Url,
	/// Headers, including `Authorization` when the session attached one.
	pub headers: Vec<(String, String)>,
	/// Serialized body.
	pub body: Option<Vec<u8>>,
	/// Deadline for the whole exchange.
	pub timeout: Duration,
}
impl OutboundRequest {
	/// Returns the first header value named `name` (case-insensitive).
	pub fn header(&self, name: &str) -> Option<&str> {
		self.headers.iter().find(|(key, _)| key.eq_ignore_ascii_case(name)).map(|(_, v)| v.as_str())
	}

	/// Returns the `Authorization` header value, if attached.
	pub fn authorization(&self) -> Option<&str> {
		self.header(AUTHORIZATION)
	}
}
impl Debug for OutboundRequest {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("OutboundRequest")
			.field("method", &self.method)
			.field("url", &self.url.as_str())
			.field("authorized", &self.authorization().is_some())
			.field("body_len", &self.body.as_ref().map(Vec::len))
			.field("timeout", &self.timeout)
			.finish()
	}
}

/// Raw response returned by an [`ApiTransport`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApiResponse {
	/// HTTP status code.
	pub status: u16,
	/// Response headers with lowercase names.
	pub headers: Vec<(String, String)>,
	/// Response body.
	pub body: Vec<u8>,
}
impl ApiResponse {
	/// Creates a response with no headers.
	pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
		Self { status, headers: Vec::new(), body: body.into() }
	}

	/// Creates a response whose body is `value` serialized as JSON.
	pub fn json_body<B>(status: u16, value: &B) -> Self
	where
		B: ?Sized + Serialize,
	{
		let body = serde_json::to_vec(value).unwrap_or_default();

		Self { status, headers: vec![(CONTENT_TYPE.into(), JSON.into())], body }
	}

	/// Returns `true` for 2xx statuses.
	pub fn is_success(&self) -> bool {
		(200..300).contains(&self.status)
	}

	/// Returns the first header value named `name` (case-insensitive).
	pub fn header(&self, name: &str) -> Option<&str> {
		self.headers.iter().find(|(key, _)| key.eq_ignore_ascii_case(name)).map(|(_, v)| v.as_str())
	}

	/// Decodes the body as JSON, reporting the offending field on mismatch.
	pub fn json<R>(&self) -> Result<R, DecodeError>
	where
		R: DeserializeOwned,
	{
		let mut deserializer = serde_json::Deserializer::from_slice(&self.body);

		serde_path_to_error::deserialize(&mut deserializer)
			.map_err(|source| DecodeError::Response { status: self.status, source })
	}

	/// Lossy UTF-8 view of the body.
	pub fn text(&self) -> String {
		String::from_utf8_lossy(&self.body).into_owned()
	}
}

/// Thin wrapper around [`ReqwestClient`] so shared HTTP behavior lives in one place.
///
/// Configure any custom client without a global timeout; the session layer applies per-request
/// deadlines.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug, Default)]
pub struct ReqwestTransport(pub ReqwestClient);
#[cfg(feature = "reqwest")]
impl ReqwestTransport {
	/// Wraps an existing reqwest [`ReqwestClient`].
	pub fn with_client(client: ReqwestClient) -> Self {
		Self(client)
	}
}
#[cfg(feature = "reqwest")]
impl AsRef<ReqwestClient> for ReqwestTransport {
	fn as_ref(&self) -> &ReqwestClient {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl Deref for ReqwestTransport {
	type Target = ReqwestClient;

	fn deref(&self) -> &Self::Target {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl ApiTransport for ReqwestTransport {
	fn execute(&self, request: OutboundRequest) -> TransportFuture<'_> {
		let client = self.0.clone();

		Box::pin(async move {
			let mut builder = client
				.request(reqwest_method(request.method), request.url)
				.timeout(to_std(request.timeout))
				.header(ACCEPT, HeaderValue::from_static(JSON));

			for (name, value) in &request.headers {
				builder = builder.header(name.as_str(), value.as_str());
			}
			if let Some(body) = request.body {
				builder = builder.body(body);
			}

			let response = builder.send().await?;
			let status = response.status().as_u16();
			let headers = response
				.headers()
				.iter()
				.filter_map(|(name, value)| {
					value.to_str().ok().map(|value| (name.as_str().to_owned(), value.to_owned()))
				})
				.collect();
			let body = response.bytes().await?.to_vec();

			Ok(ApiResponse { status, headers, body })
		})
	}
}

#[cfg(feature = "reqwest")]
fn reqwest_method(method: Method) -> reqwest::Method {
	match method {
		Method::Get => reqwest::Method::GET,
		Method::Head => reqwest::Method::HEAD,
		Method::Options => reqwest::Method::OPTIONS,
		Method::Post => reqwest::Method::POST,
		Method::Put => reqwest::Method::PUT,
		Method::Patch => reqwest::Method::PATCH,
		Method::Delete => reqwest::Method::DELETE,
	}
}

/// Converts a `time` duration into a std duration, clamping negatives to zero.
pub(crate) fn to_std(duration: Duration) -> std::time::Duration {
	duration.try_into().unwrap_or_default()
}
