//! API descriptor shared by the session client and the session façade.
//!
//! A descriptor names the backend's base URL, the relative paths of the authentication endpoints,
//! and the timings that drive expiry detection and request timeouts. Descriptors are validated
//! once, either through [`ApiDescriptorBuilder`] or [`ApiDescriptor::from_json_slice`].

/// Builder API for assembling API descriptors.
pub mod builder;

pub use builder::*;

// self
use crate::{_prelude::*, error::ConfigError};

/// Authentication endpoints the session layer treats specially.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndpointKind {
	/// Credential exchange.
	Login,
	/// Refresh-token exchange.
	Refresh,
	/// Server-side logout.
	Logout,
	/// Current-user profile.
	Me,
	/// Account registration.
	Register,
	/// Password change for the signed-in user.
	PasswordChange,
	/// Email confirmation with the emailed code.
	VerifyEmail,
	/// Re-issue of the email confirmation code.
	ResendVerification,
	/// Password reset request; emails a reset code.
	PasswordReset,
	/// Password reset completion with the emailed code.
	PasswordResetConfirm,
}
impl EndpointKind {
	/// Every endpoint kind, in declaration order.
	pub const ALL: [EndpointKind; 10] = [
		EndpointKind::Login,
		EndpointKind::Refresh,
		EndpointKind::Logout,
		EndpointKind::Me,
		EndpointKind::Register,
		EndpointKind::PasswordChange,
		EndpointKind::VerifyEmail,
		EndpointKind::ResendVerification,
		EndpointKind::PasswordReset,
		EndpointKind::PasswordResetConfirm,
	];

	/// Returns a stable label suitable for span fields and error messages.
	pub const fn as_str(self) -> &'static str {
		match self {
			EndpointKind::Login => "login",
			EndpointKind::Refresh => "refresh",
			EndpointKind::Logout => "logout",
			EndpointKind::Me => "me",
			EndpointKind::Register => "register",
			EndpointKind::PasswordChange => "password_change",
			EndpointKind::VerifyEmail => "verify_email",
			EndpointKind::ResendVerification => "resend_verification",
			EndpointKind::PasswordReset => "password_reset",
			EndpointKind::PasswordResetConfirm => "password_reset_confirm",
		}
	}
}
impl Display for EndpointKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Relative endpoint paths, resolved against [`ApiDescriptor::base_url`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiEndpoints {
	/// `POST {email, password} -> {access, refresh}`.
	pub login: String,
	/// `POST {refresh} -> {access[, refresh]}`.
	pub refresh: String,
	/// `POST {} -> 2xx`.
	pub logout: String,
	/// `GET -> UserProfile`.
	pub me: String,
	/// `POST {email, password, first_name, last_name} -> {detail, email}`.
	pub register: String,
	/// `POST {current_password, new_password} -> {detail}`.
	pub password_change: String,
	/// `POST {email, code} -> {detail}`.
	pub verify_email: String,
	/// `POST {email} -> {detail}`.
	pub resend_verification: String,
	/// `POST {email} -> {detail}`.
	pub password_reset: String,
	/// `POST {email, code, password} -> {detail}`.
	pub password_reset_confirm: String,
}
impl ApiEndpoints {
	/// Returns the configured path for `kind`.
	pub fn path(&self, kind: EndpointKind) -> &str {
		match kind {
			EndpointKind::Login => &self.login,
			EndpointKind::Refresh => &self.refresh,
			EndpointKind::Logout => &self.logout,
			EndpointKind::Me => &self.me,
			EndpointKind::Register => &self.register,
			EndpointKind::PasswordChange => &self.password_change,
			EndpointKind::VerifyEmail => &self.verify_email,
			EndpointKind::ResendVerification => &self.resend_verification,
			EndpointKind::PasswordReset => &self.password_reset,
			EndpointKind::PasswordResetConfirm => &self.password_reset_confirm,
		}
	}

	/// Checks whether `request_path` targets the endpoint `kind`.
	///
	/// Leading and trailing slashes and the query string are ignored.
	pub fn matches(&self, kind: EndpointKind, request_path: &str) -> bool {
		normalize_path(self.path(kind)) == normalize_path(request_path)
	}

	fn path_mut(&mut self, kind: EndpointKind) -> &mut String {
		match kind {
			EndpointKind::Login => &mut self.login,
			EndpointKind::Refresh => &mut self.refresh,
			EndpointKind::Logout => &mut self.logout,
			EndpointKind::Me => &mut self.me,
			EndpointKind::Register => &mut self.register,
			EndpointKind::PasswordChange => &mut self.password_change,
			EndpointKind::VerifyEmail => &mut self.verify_email,
			EndpointKind::ResendVerification => &mut self.resend_verification,
			EndpointKind::PasswordReset => &mut self.password_reset,
			EndpointKind::PasswordResetConfirm => &mut self.password_reset_confirm,
		}
	}
}
impl Default for ApiEndpoints {
	fn default() -> Self {
		Self {
			login: "auth/login/".into(),
			refresh: "auth/refresh/".into(),
			logout: "auth/logout/".into(),
			me: "auth/me/".into(),
			register: "auth/register/".into(),
			password_change: "auth/password/change/".into(),
			verify_email: "auth/verify/".into(),
			resend_verification: "auth/resend-verification/".into(),
			password_reset: "auth/password/reset/".into(),
			password_reset_confirm: "auth/password/confirm/".into(),
		}
	}
}

/// Timings that drive expiry detection and request deadlines.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionTimings {
	/// Tokens expiring within this window are treated as expired before being attached.
	#[serde(with = "seconds")]
	pub expiry_margin: Duration,
	/// The proactive expiry timer fires this long before the access token's `exp`.
	#[serde(with = "seconds")]
	pub timer_buffer: Duration,
	/// Deadline for the refresh call.
	#[serde(with = "seconds")]
	pub refresh_timeout: Duration,
	/// Default deadline for ordinary API calls.
	#[serde(with = "seconds")]
	pub request_timeout: Duration,
}
impl Default for SessionTimings {
	fn default() -> Self {
		Self {
			expiry_margin: Duration::seconds(30),
			timer_buffer: Duration::seconds(5),
			refresh_timeout: Duration::seconds(10),
			request_timeout: Duration::seconds(30),
		}
	}
}

/// Immutable API descriptor consumed by the session client.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiDescriptor {
	/// Base URL every endpoint path is joined to; always ends with `/`.
	pub base_url: Url,
	/// Authentication endpoint paths.
	#[serde(default)]
	pub endpoints: ApiEndpoints,
	/// Expiry and timeout settings.
	#[serde(default)]
	pub timings: SessionTimings,
}
impl ApiDescriptor {
	/// Creates a new builder.
	pub fn builder() -> ApiDescriptorBuilder {
		ApiDescriptorBuilder::new()
	}

	/// Builds a descriptor with default endpoints and timings.
	pub fn new(base_url: Url) -> Result<Self, DescriptorError> {
		Self::builder().base_url(base_url).build()
	}

	/// Parses and validates a JSON descriptor.
	pub fn from_json_slice(bytes: &[u8]) -> Result<Self, DescriptorError> {
		let mut deserializer = serde_json::Deserializer::from_slice(bytes);
		let mut descriptor: ApiDescriptor = serde_path_to_error::deserialize(&mut deserializer)
			.map_err(|e| DescriptorError::Malformed {
				path: e.path().to_string(),
				message: e.into_inner().to_string(),
			})?;

		descriptor.base_url = normalize_base(descriptor.base_url);
		descriptor.validate()?;

		Ok(descriptor)
	}

	/// Path configured for `kind`.
	pub fn endpoint(&self, kind: EndpointKind) -> &str {
		self.endpoints.path(kind)
	}

	/// Checks whether `request_path` targets the endpoint `kind`.
	pub fn is_endpoint(&self, kind: EndpointKind, request_path: &str) -> bool {
		self.endpoints.matches(kind, request_path)
	}

	/// Resolves a request path against the base URL.
	pub fn url_for(&self, path: &str) -> Result<Url, ConfigError> {
		self.base_url
			.join(path.trim_start_matches('/'))
			.map_err(|source| ConfigError::InvalidPath { path: path.to_owned(), source })
	}
}

fn normalize_path(path: &str) -> &str {
	let path = path.split_once('?').map_or(path, |(path, _)| path);

	path.trim_matches('/')
}

fn normalize_base(mut url: Url) -> Url {
	if !url.path().ends_with('/') {
		let path = format!("{}/", url.path());

		url.set_path(&path);
	}

	url
}

mod seconds {
	// crates.io
	use serde::{Deserialize, Deserializer, Serializer};
	use time::Duration;

	pub fn serialize<S>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		serializer.serialize_f64(value.as_seconds_f64())
	}

	pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
	where
		D: Deserializer<'de>,
	{
		let secs = f64::deserialize(deserializer)?;

		Duration::checked_seconds_f64(secs).ok_or_else(|| {
			serde::de::Error::custom("duration must be a representable number of seconds")
		})
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn descriptor() -> ApiDescriptor {
		ApiDescriptor::new(
			Url::parse("https://shop.example.com/api").expect("Base URL fixture should parse."),
		)
		.expect("Descriptor with defaults should build.")
	}

	#[test]
	fn base_url_is_normalized_and_paths_join_under_it() {
		let descriptor = descriptor();

		assert_eq!(descriptor.base_url.as_str(), "https://shop.example.com/api/");
		assert_eq!(
			descriptor.url_for("/auth/login/").expect("Login path should resolve.").as_str(),
			"https://shop.example.com/api/auth/login/"
		);
		assert_eq!(
			descriptor.url_for("products/?page=2").expect("Product path should resolve.").as_str(),
			"https://shop.example.com/api/products/?page=2"
		);
	}

	#[test]
	fn endpoint_matching_ignores_slashes_and_query() {
		let descriptor = descriptor();

		assert!(descriptor.is_endpoint(EndpointKind::Login, "/auth/login/"));
		assert!(descriptor.is_endpoint(EndpointKind::Refresh, "auth/refresh?x=1"));
		assert!(!descriptor.is_endpoint(EndpointKind::Login, "auth/login/extra/"));
		assert!(!descriptor.is_endpoint(EndpointKind::Refresh, "products/"));
	}

	#[test]
	fn json_descriptor_fills_defaults_and_reads_seconds() {
		let descriptor = ApiDescriptor::from_json_slice(
			br#"{"base_url":"http://127.0.0.1:8000/api","timings":{"timer_buffer":2.5}}"#,
		)
		.expect("Loopback JSON descriptor should load.");

		assert_eq!(descriptor.base_url.as_str(), "http://127.0.0.1:8000/api/");
		assert_eq!(descriptor.endpoints, ApiEndpoints::default());
		assert_eq!(descriptor.timings.timer_buffer, Duration::milliseconds(2_500));
		assert_eq!(descriptor.timings.expiry_margin, Duration::seconds(30));
	}

	#[test]
	fn json_descriptor_rejects_unrepresentable_and_oversized_timings() {
		let err = ApiDescriptor::from_json_slice(
			br#"{"base_url":"https://shop.example.com/","timings":{"request_timeout":1e300}}"#,
		)
		.expect_err("Overflowing timings should be rejected.");

		assert!(
			matches!(&err, DescriptorError::Malformed { path, .. } if path == "timings.request_timeout")
		);

		let err = ApiDescriptor::from_json_slice(
			br#"{"base_url":"https://shop.example.com/","timings":{"expiry_margin":1e12}}"#,
		)
		.expect_err("Timings beyond the supported range should be rejected.");

		assert_eq!(err, DescriptorError::InvalidTiming { field: "expiry_margin" });
	}

	#[test]
	fn json_descriptor_reports_offending_field() {
		let err = ApiDescriptor::from_json_slice(
			br#"{"base_url":"https://shop.example.com/","timings":{"refresh_timeout":"soon"}}"#,
		)
		.expect_err("Non-numeric timings should be rejected.");

		assert!(
			matches!(&err, DescriptorError::Malformed { path, .. } if path == "timings.refresh_timeout")
		);
	}
}
