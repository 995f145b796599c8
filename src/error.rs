//! Session-level error types shared across the client, stores, and session façade.

// self
use crate::_prelude::*;

/// Session-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

const BODY_PREVIEW_LIMIT: usize = 512;

/// Canonical session error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Storage-layer failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Transport failure (DNS, TCP, TLS, timeouts).
	#[error(transparent)]
	Transport(#[from] TransportError),
	/// Response body did not match the expected JSON shape.
	#[error(transparent)]
	Decode(#[from] DecodeError),

	/// Server answered with a non-success status that was not recovered locally.
	#[error("Request failed with HTTP status {status}.")]
	Status {
		/// HTTP status code.
		status: u16,
		/// Lossy UTF-8 preview of the response body.
		body: String,
	},
	/// Login endpoint rejected the supplied credentials.
	#[error("Login was rejected: {reason}.")]
	InvalidCredentials {
		/// Server- or client-supplied reason string.
		reason: String,
		/// Machine-readable rejection code (e.g. `email_not_verified`), when provided.
		code: Option<String>,
	},
}
impl Error {
	/// Builds a [`Error::Status`] from a failed response.
	pub fn from_response(response: &crate::http::ApiResponse) -> Self {
		let mut body = String::from_utf8_lossy(&response.body).into_owned();

		if body.len() > BODY_PREVIEW_LIMIT {
			let mut cut = BODY_PREVIEW_LIMIT;

			while !body.is_char_boundary(cut) {
				cut -= 1;
			}

			body.truncate(cut);
		}

		Self::Status { status: response.status, body }
	}

	/// Returns the HTTP status carried by the error, if any.
	pub fn status(&self) -> Option<u16> {
		match self {
			Self::Status { status, .. } => Some(*status),
			Self::Decode(DecodeError::Response { status, .. }) => Some(*status),
			_ => None,
		}
	}

	/// Returns `true` when the server rejected the call with `401 Unauthorized`.
	pub fn is_unauthorized(&self) -> bool {
		self.status() == Some(401)
	}
}

/// Configuration and validation failures raised by the session layer.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// API descriptor failed validation.
	#[error(transparent)]
	Descriptor(#[from] crate::descriptor::DescriptorError),
	/// Request path cannot be resolved against the API base URL.
	#[error("Request path `{path}` cannot be joined to the API base URL.")]
	InvalidPath {
		/// Offending request path.
		path: String,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// Request body could not be serialized to JSON.
	#[error("Request body could not be serialized to JSON.")]
	RequestBody {
		/// Underlying serialization failure.
		#[source]
		source: serde_json::Error,
	},
	/// Session façade was constructed outside a Tokio runtime.
	#[error("Session context requires a running Tokio runtime.")]
	MissingRuntime,
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Response decoding failures.
#[derive(Debug, ThisError)]
pub enum DecodeError {
	/// Response body was not the JSON shape the caller expected.
	#[error("Response body with status {status} could not be decoded.")]
	Response {
		/// HTTP status code of the response.
		status: u16,
		/// Structured parsing failure with the offending JSON path.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
}

/// Transport-level failures (network, IO, timeouts).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the API.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// The call did not settle within its timeout.
	#[error("API call timed out.")]
	Timeout,
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while calling the API.")]
	Io(#[from] std::io::Error),
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		if e.is_timeout() { Self::Timeout } else { Self::network(e) }
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::http::ApiResponse;

	#[test]
	fn status_errors_expose_status_and_body_preview() {
		let response = ApiResponse::new(401, "{\"detail\":\"Token is invalid\"}");
		let err = Error::from_response(&response);

		assert!(err.is_unauthorized());
		assert_eq!(err.status(), Some(401));
		assert!(matches!(&err, Error::Status { body, .. } if body.contains("Token is invalid")));
	}

	#[test]
	fn status_error_body_is_truncated_on_char_boundary() {
		let response = ApiResponse::new(500, "é".repeat(BODY_PREVIEW_LIMIT));
		let Error::Status { body, .. } = Error::from_response(&response) else {
			panic!("Failed responses should map to status errors.");
		};

		assert!(body.len() <= BODY_PREVIEW_LIMIT);
		assert!(body.chars().all(|c| c == 'é'));
	}

	#[test]
	fn transport_errors_are_not_unauthorized() {
		let err = Error::from(TransportError::Timeout);

		assert!(!err.is_unauthorized());
		assert_eq!(err.status(), None);
	}
}
