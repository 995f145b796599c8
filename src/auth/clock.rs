//! Access-token expiry evaluation.
//!
//! Access tokens are compact JWTs: three dot-separated segments whose middle segment is
//! URL-safe base64 JSON carrying an `exp` claim in seconds since the epoch. Decoding never
//! fails loudly; an undecodable token simply has no known expiry and is treated as live, so
//! the server stays the authority and rejects it through the normal 401 path.

// crates.io
use base64::{
	Engine,
	alphabet,
	engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig},
};
// self
use crate::_prelude::*;

const PAYLOAD_ENGINE: GeneralPurpose = GeneralPurpose::new(
	&alphabet::URL_SAFE,
	GeneralPurposeConfig::new()
		.with_encode_padding(false)
		.with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Stateless expiry oracle for access tokens.
#[derive(Clone, Copy, Debug, Default)]
pub struct TokenClock;
impl TokenClock {
	/// Margin absorbing clock skew and in-flight latency.
	pub const DEFAULT_MARGIN: Duration = Duration::seconds(30);

	/// Extracts the `exp` instant from the token payload.
	pub fn expiry_of(token: &str) -> Option<OffsetDateTime> {
		let mut segments = token.split('.');
		let (_header, payload, _signature) =
			(segments.next()?, segments.next()?, segments.next()?);

		if segments.next().is_some() {
			return None;
		}

		let bytes = PAYLOAD_ENGINE.decode(payload.trim_end_matches('=')).ok()?;
		let claims: serde_json::Value = serde_json::from_slice(&bytes).ok()?;
		let exp = claims.as_object()?.get("exp")?;

		if let Some(secs) = exp.as_i64() {
			return OffsetDateTime::from_unix_timestamp(secs).ok();
		}

		let secs = exp.as_f64().filter(|secs| secs.is_finite())?;
		let whole = secs.trunc();

		if whole.abs() > i64::MAX as f64 {
			return None;
		}

		let nanos = ((secs - whole) * 1_000_000_000.0).round() as i64;

		OffsetDateTime::from_unix_timestamp(whole as i64)
			.ok()?
			.checked_add(Duration::nanoseconds(nanos))
	}

	/// Returns `true` when the token expires within `margin` of the current clock.
	pub fn is_expired(token: &str, margin: Duration) -> bool {
		Self::is_expired_at(token, margin, OffsetDateTime::now_utc())
	}

	/// Evaluates expiry against an explicit instant.
	///
	/// Tokens without a decodable expiry are never considered expired. A margin reaching past
	/// the representable calendar treats every decodable token as expired.
	pub fn is_expired_at(token: &str, margin: Duration, now: OffsetDateTime) -> bool {
		let Some(expiry) = Self::expiry_of(token) else {
			return false;
		};

		match now.checked_add(margin) {
			Some(deadline) => expiry <= deadline,
			None => margin.is_positive(),
		}
	}

	/// Time left until the token's `exp`, negative once it has passed.
	pub fn remaining_at(token: &str, now: OffsetDateTime) -> Option<Duration> {
		Self::expiry_of(token).map(|expiry| expiry - now)
	}
}

/// Encodes a JWT-shaped token whose payload carries the provided `exp` claim.
///
/// The signature segment is a fixed placeholder; only the payload matters to [`TokenClock`].
pub fn unsigned_token_with_exp(exp: i64) -> String {
	let header = PAYLOAD_ENGINE.encode(br#"{"alg":"none","typ":"JWT"}"#);
	let payload = PAYLOAD_ENGINE.encode(format!("{{\"exp\":{exp}}}"));

	format!("{header}.{payload}.unsigned")
}
