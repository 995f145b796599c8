//! Access/refresh token pair and the redacting secret wrapper.

// self
use crate::_prelude::*;

/// Redacted token secret wrapper keeping sensitive material out of logs.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenSecret(String);
impl TokenSecret {
	/// Wraps a new secret string.
	pub fn new(value: impl Into<String>) -> Self {
		Self(value.into())
	}

	/// Returns the inner token value. Callers must avoid logging this string.
	pub fn expose(&self) -> &str {
		&self.0
	}

	/// Formats the secret as an `Authorization` header value.
	pub fn bearer(&self) -> String {
		format!("Bearer {}", self.0)
	}
}
impl AsRef<str> for TokenSecret {
	fn as_ref(&self) -> &str {
		self.expose()
	}
}
impl From<String> for TokenSecret {
	fn from(value: String) -> Self {
		Self(value)
	}
}
impl From<&str> for TokenSecret {
	fn from(value: &str) -> Self {
		Self(value.to_owned())
	}
}
impl Debug for TokenSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("TokenSecret").field(&"<redacted>").finish()
	}
}
impl Display for TokenSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("<redacted>")
	}
}

/// Access/refresh pair persisted by the [`TokenStore`](crate::store::TokenStore).
///
/// Both halves are written and cleared together. A pair whose access token is missing or
/// expired behaves as logged-out, even while a refresh token is still present, until a
/// refresh succeeds.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TokenPair {
	/// Short-lived bearer token attached to API calls.
	pub access: Option<TokenSecret>,
	/// Long-lived token exchanged for a new access token.
	pub refresh: Option<TokenSecret>,
}
impl TokenPair {
	/// Creates a pair from optional raw values.
	pub fn new(access: Option<TokenSecret>, refresh: Option<TokenSecret>) -> Self {
		Self { access, refresh }
	}

	/// Returns the empty (logged-out) pair.
	pub fn empty() -> Self {
		Self::default()
	}

	/// Returns `true` when neither token is present.
	pub fn is_empty(&self) -> bool {
		self.access.is_none() && self.refresh.is_none()
	}

	/// Returns the access token as a string slice, if present.
	pub fn access_token(&self) -> Option<&str> {
		self.access.as_ref().map(TokenSecret::expose)
	}

	/// Returns the refresh token as a string slice, if present.
	pub fn refresh_token(&self) -> Option<&str> {
		self.refresh.as_ref().map(TokenSecret::expose)
	}
}

/// Token payload returned by the login and refresh endpoints.
///
/// Refresh responses usually omit `refresh`; servers that rotate refresh tokens include it.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct IssuedTokens {
	/// New access token.
	pub access: TokenSecret,
	/// New refresh token, when issued.
	#[serde(default)]
	pub refresh: Option<TokenSecret>,
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn secret_formatters_redact() {
		let secret = TokenSecret::new("super-secret");

		assert_eq!(format!("{secret:?}"), "TokenSecret(\"<redacted>\")");
		assert_eq!(format!("{secret}"), "<redacted>");
		assert_eq!(secret.bearer(), "Bearer super-secret");
	}

	#[test]
	fn pair_debug_never_leaks_secrets() {
		let pair = TokenPair::new(Some("access-raw".into()), Some("refresh-raw".into()));
		let rendered = format!("{pair:?}");

		assert!(!rendered.contains("access-raw"));
		assert!(!rendered.contains("refresh-raw"));
		assert_eq!(pair.access_token(), Some("access-raw"));
		assert!(!pair.is_empty());
		assert!(TokenPair::empty().is_empty());
	}

	#[test]
	fn issued_tokens_accept_missing_refresh() {
		let issued: IssuedTokens = serde_json::from_str("{\"access\":\"a2\"}")
			.expect("Refresh responses without rotation should decode.");

		assert_eq!(issued.access.expose(), "a2");
		assert!(issued.refresh.is_none());
	}
}
