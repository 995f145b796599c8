//! Account shapes exchanged with the `auth/*` endpoints.

// self
use crate::_prelude::*;

/// Current-user payload returned by the profile endpoint.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
	/// Backend user identifier.
	pub id: u64,
	/// Login email, lower-cased by the backend.
	pub email: String,
	/// Given name.
	#[serde(default)]
	pub first_name: String,
	/// Family name.
	#[serde(default)]
	pub last_name: String,
	/// Role label (e.g. `ADMIN`, `CLIENTE`).
	#[serde(default)]
	pub role: Option<String>,
	/// Whether the account can reach the admin console.
	#[serde(default)]
	pub is_staff: bool,
	/// Whether the account confirmed its email address.
	#[serde(default)]
	pub is_email_verified: bool,
}
impl UserProfile {
	/// Returns the display name, falling back to the email when no name is set.
	pub fn display_name(&self) -> String {
		let full = format!("{} {}", self.first_name.trim(), self.last_name.trim());
		let full = full.trim();

		if full.is_empty() { self.email.clone() } else { full.to_owned() }
	}
}

/// Email + password pair posted to the login endpoint.
#[derive(Clone, Serialize)]
pub struct Credentials<'a> {
	/// Account email.
	pub email: &'a str,
	/// Account password; never logged.
	pub password: &'a str,
}
impl Debug for Credentials<'_> {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Credentials")
			.field("email", &self.email)
			.field("password", &"<redacted>")
			.finish()
	}
}

/// Public sign-up payload.
#[derive(Clone, Serialize)]
pub struct Registration {
	/// Account email.
	pub email: String,
	/// Initial password; never logged.
	pub password: String,
	/// Given name.
	pub first_name: String,
	/// Family name.
	pub last_name: String,
}
impl Debug for Registration {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Registration")
			.field("email", &self.email)
			.field("password", &"<redacted>")
			.field("first_name", &self.first_name)
			.field("last_name", &self.last_name)
			.finish()
	}
}

/// Acknowledgement returned by sign-up and password endpoints.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
pub struct Receipt {
	/// Human-readable status message.
	#[serde(default)]
	pub detail: String,
	/// Echoed email, when the endpoint returns one.
	#[serde(default)]
	pub email: Option<String>,
}

/// Password rotation payload for an authenticated user.
#[derive(Clone, Serialize)]
pub struct PasswordChange {
	/// Password currently on file.
	pub current_password: String,
	/// Replacement password.
	pub new_password: String,
}
impl Debug for PasswordChange {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("PasswordChange(<redacted>)")
	}
}

/// Email confirmation payload carrying the emailed code.
#[derive(Clone, Serialize)]
pub struct EmailVerification {
	/// Account email.
	pub email: String,
	/// Six-character code from the verification email.
	pub code: String,
}
impl Debug for EmailVerification {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("EmailVerification")
			.field("email", &self.email)
			.field("code", &"<redacted>")
			.finish()
	}
}

/// Payload completing a password reset.
#[derive(Clone, Serialize)]
pub struct PasswordResetConfirm {
	/// Account email.
	pub email: String,
	/// Six-character code from the reset email.
	pub code: String,
	/// Replacement password.
	#[serde(rename = "password")]
	pub new_password: String,
}
impl Debug for PasswordResetConfirm {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("PasswordResetConfirm")
			.field("email", &self.email)
			.field("code", &"<redacted>")
			.field("new_password", &"<redacted>")
			.finish()
	}
}

// Body of the endpoints that only take an address.
#[derive(Debug, Serialize)]
pub(crate) struct AccountEmail<'a> {
	pub(crate) email: &'a str,
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn profile_tolerates_unknown_and_missing_fields() {
		let profile: UserProfile = serde_json::from_str(
			r#"{"id":7,"email":"ana@example.com","role":"ADMIN","is_staff":true,"created_at":"2025-01-01T00:00:00Z"}"#,
		)
		.expect("Profile payload should deserialize.");

		assert_eq!(profile.id, 7);
		assert!(profile.is_staff);
		assert!(!profile.is_email_verified);
		assert_eq!(profile.display_name(), "ana@example.com");
	}

	#[test]
	fn display_name_joins_names() {
		let profile = UserProfile {
			id: 1,
			email: "luis@example.com".into(),
			first_name: "Luis".into(),
			last_name: "Rojas".into(),
			role: None,
			is_staff: false,
			is_email_verified: true,
		};

		assert_eq!(profile.display_name(), "Luis Rojas");
	}

	#[test]
	fn credential_payloads_redact_passwords() {
		let credentials = Credentials { email: "ana@example.com", password: "hunter2" };
		let change =
			PasswordChange { current_password: "hunter2".into(), new_password: "hunter3".into() };
		let reset = PasswordResetConfirm {
			email: "ana@example.com".into(),
			code: "482913".into(),
			new_password: "hunter3".into(),
		};

		assert!(!format!("{credentials:?}").contains("hunter2"));
		assert!(!format!("{change:?}").contains("hunter"));
		assert!(!format!("{reset:?}").contains("hunter"));
		assert!(!format!("{reset:?}").contains("482913"));
		assert_eq!(
			serde_json::to_value(&reset).expect("Reset confirmation should serialize."),
			serde_json::json!({ "email": "ana@example.com", "code": "482913", "password": "hunter3" }),
		);
		assert_eq!(
			serde_json::to_value(&credentials).expect("Credentials should serialize."),
			serde_json::json!({ "email": "ana@example.com", "password": "hunter2" }),
		);
	}
}
