// std
use std::net::IpAddr;
// crates.io
use url::Host;
// self
use crate::{
	_prelude::*,
	descriptor::{ApiDescriptor, ApiEndpoints, EndpointKind, SessionTimings, normalize_base},
};

/// Longest accepted value for any [`SessionTimings`] field.
pub const MAX_TIMING: Duration = Duration::days(1);

/// Errors raised while constructing or validating descriptors.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum DescriptorError {
	/// Base URL is mandatory.
	#[error("Missing API base URL.")]
	MissingBaseUrl,
	/// Base URL must use HTTPS unless it points at a loopback host.
	#[error("The API base URL must use HTTPS: {url}.")]
	InsecureBaseUrl {
		/// Base URL that failed validation.
		url: String,
	},
	/// Base URL cannot have paths joined onto it (e.g. `mailto:`).
	#[error("The API base URL cannot be used as a base: {url}.")]
	CannotBeABase {
		/// Base URL that failed validation.
		url: String,
	},
	/// Endpoint paths must be non-empty and relative to the base URL.
	#[error("The {endpoint} endpoint path must be relative to the base URL: `{path}`.")]
	InvalidEndpointPath {
		/// Which endpoint failed validation.
		endpoint: EndpointKind,
		/// Offending path.
		path: String,
	},
	/// Timeouts must be positive and margins non-negative, both capped at [`MAX_TIMING`].
	#[error("The `{field}` timing is out of range.")]
	InvalidTiming {
		/// Which timing failed validation.
		field: &'static str,
	},
	/// JSON descriptor did not match the expected shape.
	#[error("Descriptor field `{path}` is malformed: {message}.")]
	Malformed {
		/// JSON path of the offending field.
		path: String,
		/// Parser message.
		message: String,
	},
}

/// Builder for [`ApiDescriptor`] values.
#[derive(Debug, Default)]
pub struct ApiDescriptorBuilder {
	/// Base URL every endpoint path is joined to.
	pub base_url: Option<Url>,
	/// Authentication endpoint paths.
	pub endpoints: ApiEndpoints,
	/// Expiry and timeout settings.
	pub timings: SessionTimings,
}
impl ApiDescriptorBuilder {
	/// Creates a new builder seeded with default endpoints and timings.
	pub fn new() -> Self {
		Self::default()
	}

	/// Sets the base URL.
	pub fn base_url(mut self, url: Url) -> Self {
		self.base_url = Some(url);

		self
	}

	/// Overrides every endpoint path at once.
	pub fn endpoints(mut self, endpoints: ApiEndpoints) -> Self {
		self.endpoints = endpoints;

		self
	}

	/// Overrides a single endpoint path.
	pub fn endpoint(mut self, kind: EndpointKind, path: impl Into<String>) -> Self {
		*self.endpoints.path_mut(kind) = path.into();

		self
	}

	/// Overrides every timing at once.
	pub fn timings(mut self, timings: SessionTimings) -> Self {
		self.timings = timings;

		self
	}

	/// Sets the margin used when deciding whether to attach an access token.
	pub fn expiry_margin(mut self, margin: Duration) -> Self {
		self.timings.expiry_margin = margin;

		self
	}

	/// Sets how long before `exp` the proactive expiry timer fires.
	pub fn timer_buffer(mut self, buffer: Duration) -> Self {
		self.timings.timer_buffer = buffer;

		self
	}

	/// Sets the refresh call deadline.
	pub fn refresh_timeout(mut self, timeout: Duration) -> Self {
		self.timings.refresh_timeout = timeout;

		self
	}

	/// Sets the default API call deadline.
	pub fn request_timeout(mut self, timeout: Duration) -> Self {
		self.timings.request_timeout = timeout;

		self
	}

	/// Consumes the builder and validates the resulting descriptor.
	pub fn build(self) -> Result<ApiDescriptor, DescriptorError> {
		let base_url = self.base_url.ok_or(DescriptorError::MissingBaseUrl)?;
		let descriptor = ApiDescriptor {
			base_url: normalize_base(base_url),
			endpoints: self.endpoints,
			timings: self.timings,
		};

		descriptor.validate()?;

		Ok(descriptor)
	}
}

impl ApiDescriptor {
	/// Validates invariants for the descriptor.
	pub(crate) fn validate(&self) -> Result<(), DescriptorError> {
		validate_base_url(&self.base_url)?;

		for kind in EndpointKind::ALL {
			validate_endpoint_path(kind, self.endpoints.path(kind))?;
		}

		validate_timings(&self.timings)
	}
}

fn validate_base_url(url: &Url) -> Result<(), DescriptorError> {
	if url.cannot_be_a_base() {
		return Err(DescriptorError::CannotBeABase { url: url.to_string() });
	}

	match url.scheme() {
		"https" => Ok(()),
		"http" if is_loopback(url) => Ok(()),
		_ => Err(DescriptorError::InsecureBaseUrl { url: url.to_string() }),
	}
}

fn is_loopback(url: &Url) -> bool {
	match url.host() {
		Some(Host::Domain(domain)) => domain.eq_ignore_ascii_case("localhost"),
		Some(Host::Ipv4(ip)) => IpAddr::V4(ip).is_loopback(),
		Some(Host::Ipv6(ip)) => IpAddr::V6(ip).is_loopback(),
		None => false,
	}
}

fn validate_endpoint_path(kind: EndpointKind, path: &str) -> Result<(), DescriptorError> {
	let trimmed = path.trim();

	if trimmed.is_empty()
		|| trimmed.trim_matches('/').is_empty()
		|| trimmed.starts_with("//")
		|| trimmed.contains("://")
	{
		Err(DescriptorError::InvalidEndpointPath { endpoint: kind, path: path.to_owned() })
	} else {
		Ok(())
	}
}

fn validate_timings(timings: &SessionTimings) -> Result<(), DescriptorError> {
	let checks = [
		("expiry_margin", timings.expiry_margin, false),
		("timer_buffer", timings.timer_buffer, false),
		("refresh_timeout", timings.refresh_timeout, true),
		("request_timeout", timings.request_timeout, true),
	];

	for (field, value, must_be_positive) in checks {
		let too_small = if must_be_positive { !value.is_positive() } else { value.is_negative() };

		if too_small || value > MAX_TIMING {
			return Err(DescriptorError::InvalidTiming { field });
		}
	}

	Ok(())
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn url(value: &str) -> Url {
		Url::parse(value).expect("Failed to parse descriptor fixture URL.")
	}

	#[test]
	fn builder_requires_base_url() {
		let err = ApiDescriptor::builder().build().expect_err("Missing base URL should fail.");

		assert_eq!(err, DescriptorError::MissingBaseUrl);
	}

	#[test]
	fn plain_http_is_limited_to_loopback_hosts() {
		for base in ["http://localhost:8000/api/", "http://127.0.0.1/", "http://[::1]:9000/"] {
			ApiDescriptor::new(url(base))
				.unwrap_or_else(|e| panic!("Loopback base {base} should be accepted: {e}"));
		}

		let err = ApiDescriptor::new(url("http://shop.example.com/api/"))
			.expect_err("Remote plain HTTP should be rejected.");

		assert!(matches!(err, DescriptorError::InsecureBaseUrl { .. }));

		let err = ApiDescriptor::new(url("mailto:ops@example.com"))
			.expect_err("Non-hierarchical URLs should be rejected.");

		assert!(matches!(err, DescriptorError::CannotBeABase { .. }));
	}

	#[test]
	fn absolute_endpoint_paths_are_rejected() {
		let err = ApiDescriptor::builder()
			.base_url(url("https://shop.example.com/"))
			.endpoint(EndpointKind::Refresh, "https://evil.example.com/refresh/")
			.build()
			.expect_err("Absolute endpoint paths should be rejected.");

		assert!(matches!(
			err,
			DescriptorError::InvalidEndpointPath { endpoint: EndpointKind::Refresh, .. }
		));

		let err = ApiDescriptor::builder()
			.base_url(url("https://shop.example.com/"))
			.endpoint(EndpointKind::Me, "/")
			.build()
			.expect_err("Empty endpoint paths should be rejected.");

		assert!(matches!(err, DescriptorError::InvalidEndpointPath { endpoint: EndpointKind::Me, .. }));
	}

	#[test]
	fn timings_are_range_checked() {
		let err = ApiDescriptor::builder()
			.base_url(url("https://shop.example.com/"))
			.refresh_timeout(Duration::ZERO)
			.build()
			.expect_err("Zero refresh timeout should be rejected.");

		assert_eq!(err, DescriptorError::InvalidTiming { field: "refresh_timeout" });

		let descriptor = ApiDescriptor::builder()
			.base_url(url("https://shop.example.com/"))
			.expiry_margin(Duration::ZERO)
			.timer_buffer(Duration::ZERO)
			.build()
			.expect("Zero margins should be accepted.");

		assert_eq!(descriptor.timings.expiry_margin, Duration::ZERO);

		let err = ApiDescriptor::builder()
			.base_url(url("https://shop.example.com/"))
			.timer_buffer(MAX_TIMING + Duration::SECOND)
			.build()
			.expect_err("Timings beyond a day should be rejected.");

		assert_eq!(err, DescriptorError::InvalidTiming { field: "timer_buffer" });
	}
}
