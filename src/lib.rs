//! Bearer-token session manager for REST storefront clients - single-flight refresh, retry-once
//! recovery, and observable session expiry in one crate.
//!
//! The crate is organised leaves first:
//!
//! - [`auth`] holds the token pair, the JWT expiry clock, and the account payloads.
//! - [`store`] persists the pair and notifies subscribers of every change.
//! - [`http`] describes requests and responses and abstracts the HTTP stack.
//! - [`flows`] wires both interceptors and the refresh coordinator into [`flows::SessionClient`].
//! - [`session`] derives the application-facing [`session::AuthenticationState`].

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod descriptor;
pub mod error;
pub mod flows;
pub mod http;
pub mod obs;
pub mod session;
pub mod store;
#[cfg(any(test, feature = "test"))]
#[doc(hidden)]
pub mod _preludet {
	//! Convenience re-exports and fixtures shared by unit and integration tests.
	//!
	//! Compiled for `cfg(test)` and behind the `test` crate feature only.

	pub use crate::_prelude::*;

	// self
	use crate::{
		auth::unsigned_token_with_exp,
		descriptor::ApiDescriptor,
		error::TransportError,
		http::{ApiResponse, ApiTransport, OutboundRequest, TransportFuture},
	};
	#[cfg(feature = "reqwest")] use crate::http::ReqwestTransport;

	type Handler = Arc<dyn Fn(OutboundRequest) -> TransportFuture<'static> + Send + Sync>;

	/// Builds a reqwest transport that accepts the self-signed certificates produced by
	/// `httpmock` during tests.
	#[cfg(feature = "reqwest")]
	pub fn test_reqwest_transport() -> ReqwestTransport {
		let client = ReqwestClient::builder()
			.danger_accept_invalid_certs(true)
			.danger_accept_invalid_hostnames(true)
			.build()
			.expect("Failed to build insecure Reqwest client for tests.");

		ReqwestTransport::with_client(client)
	}

	/// Builds a descriptor with default endpoints rooted at `base` (loopback HTTP allowed).
	pub fn test_descriptor(base: &str) -> ApiDescriptor {
		ApiDescriptor::new(Url::parse(base).expect("Test base URL should parse."))
			.expect("Test descriptor should build.")
	}

	/// Returns an unsigned JWT whose `exp` lies `offset` from now.
	pub fn jwt_expiring_in(offset: Duration) -> String {
		unsigned_token_with_exp((OffsetDateTime::now_utc() + offset).unix_timestamp())
	}

	/// In-process transport driven by a closure; records every request it receives.
	pub struct FakeTransport {
		handler: Handler,
		requests: Mutex<Vec<OutboundRequest>>,
	}
	impl FakeTransport {
		/// Creates a transport answering each request with `handler`.
		pub fn new<F, Fut>(handler: F) -> Self
		where
			F: 'static + Fn(OutboundRequest) -> Fut + Send + Sync,
			Fut: 'static + Future<Output = Result<ApiResponse, TransportError>> + Send,
		{
			Self {
				handler: Arc::new(move |request| -> TransportFuture<'static> {
					Box::pin(handler(request))
				}),
				requests: Mutex::new(Vec::new()),
			}
		}

		/// Returns every request received so far.
		pub fn requests(&self) -> Vec<OutboundRequest> {
			self.requests.lock().clone()
		}

		/// Counts requests whose URL path ends with `suffix`.
		pub fn count(&self, suffix: &str) -> usize {
			self.requests.lock().iter().filter(|request| request.url.path().ends_with(suffix)).count()
		}
	}
	impl ApiTransport for FakeTransport {
		fn execute(&self, request: OutboundRequest) -> TransportFuture<'_> {
			self.requests.lock().push(request.clone());

			(self.handler)(request)
		}
	}
	impl Debug for FakeTransport {
		fn fmt(&self, f: &mut Formatter) -> FmtResult {
			f.debug_struct("FakeTransport").field("requests", &self.requests.lock().len()).finish()
		}
	}
}

mod _prelude {
	pub use std::{
		collections::{BTreeMap, HashMap},
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		sync::Arc,
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(test)] use {color_eyre as _, httpmock as _};
