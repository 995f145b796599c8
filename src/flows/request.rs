//! Outgoing-request authorization.

// self
use crate::{
	_prelude::*,
	auth::{TokenClock, TokenSecret},
	http::{ApiRequest, AuthMode},
	store::TokenStore,
};

/// Decides which bearer token, if any, accompanies a request.
///
/// An access token that is expired (within `margin`) is never sent; it is cleared from the store
/// with [`ChangeReason::Expired`](crate::store::ChangeReason::Expired) so the session reports
/// the expiry.
#[derive(Clone, Copy, Debug)]
pub struct RequestInterceptor<'a> {
	store: &'a TokenStore,
	margin: Duration,
}
impl<'a> RequestInterceptor<'a> {
	/// Creates an interceptor reading from `store`.
	pub fn new(store: &'a TokenStore, margin: Duration) -> Self {
		Self { store, margin }
	}

	/// Returns the token to attach to `request`.
	pub fn authorize(&self, request: &ApiRequest) -> Option<TokenSecret> {
		self.authorize_at(request, OffsetDateTime::now_utc())
	}

	/// Same as [`authorize`](Self::authorize), evaluated at `now`.
	pub fn authorize_at(&self, request: &ApiRequest, now: OffsetDateTime) -> Option<TokenSecret> {
		if request.auth() == AuthMode::Anonymous {
			return None;
		}

		let access = self.store.get().access?;

		if TokenClock::is_expired_at(access.expose(), self.margin, now) {
			self.store.expire_if_current(access.expose());

			return None;
		}

		Some(access)
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::{auth::unsigned_token_with_exp, store::ChangeReason};

	const NOW: i64 = 1_700_000_000;

	fn now() -> OffsetDateTime {
		OffsetDateTime::from_unix_timestamp(NOW).expect("Fixture timestamp should be valid.")
	}

	#[test]
	fn fresh_token_is_attached() {
		let store = TokenStore::in_memory();
		let token = unsigned_token_with_exp(NOW + 3_600);

		store.set(Some(token.as_str().into()), Some("r".into()));

		let attached = RequestInterceptor::new(&store, Duration::seconds(30))
			.authorize_at(&ApiRequest::get("orders/"), now())
			.expect("Fresh token should be attached.");

		assert_eq!(attached.expose(), token);
	}

	#[test]
	fn anonymous_and_logged_out_requests_carry_no_token() {
		let store = TokenStore::in_memory();
		let interceptor = RequestInterceptor::new(&store, Duration::seconds(30));

		assert!(interceptor.authorize_at(&ApiRequest::get("products/"), now()).is_none());

		store.set(Some(unsigned_token_with_exp(NOW + 3_600).into()), Some("r".into()));

		assert!(
			interceptor
				.authorize_at(&ApiRequest::post("auth/login/").anonymous(), now())
				.is_none()
		);
		assert!(store.get().access.is_some());
	}

	#[test]
	fn token_inside_margin_is_withheld_and_expired() {
		let store = TokenStore::in_memory();
		let reasons = Arc::new(Mutex::new(Vec::new()));
		let sink = reasons.clone();

		store.set(Some(unsigned_token_with_exp(NOW + 10).into()), Some("r".into()));
		store.subscribe(move |change| sink.lock().push(change.reason));

		let attached = RequestInterceptor::new(&store, Duration::seconds(30))
			.authorize_at(&ApiRequest::get("orders/"), now());

		assert!(attached.is_none());
		assert!(store.get().is_empty());
		assert_eq!(*reasons.lock(), [ChangeReason::Expired]);
	}

	#[test]
	fn opaque_tokens_fail_open() {
		let store = TokenStore::in_memory();

		store.set(Some("not-a-jwt".into()), None);

		let attached = RequestInterceptor::new(&store, Duration::seconds(30))
			.authorize_at(&ApiRequest::get("orders/"), now());

		assert_eq!(attached.map(|token| token.bearer()), Some("Bearer not-a-jwt".into()));
	}
}
