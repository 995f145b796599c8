//! Application-facing session façade.
//!
//! [`SessionContext`] derives an [`AuthenticationState`] from the [`TokenStore`], keeps it current
//! through a store subscription, schedules a proactive expiry timer for the active access token,
//! and exposes the account operations: login, logout, profile, registration, email
//! verification, and the password change and reset calls.
//! UI layers read the state with [`SessionContext::state`] or watch it through
//! [`SessionContext::subscribe_state`].

// crates.io
use serde_json::Value;
use tokio::{runtime::Handle, sync::watch, task::JoinHandle};
// self
use crate::{
	_prelude::*,
	auth::{
		AccountEmail, Credentials, EmailVerification, IssuedTokens, PasswordChange,
		PasswordResetConfirm, Receipt, Registration, TokenClock, TokenSecret, UserProfile,
	},
	descriptor::EndpointKind,
	error::ConfigError,
	flows::SessionClient,
	http::{ApiRequest, ApiTransport, to_std},
	obs::{self, FlowKind, FlowOutcome, FlowSpan},
	store::{ChangeNotification, ChangeReason, ClearReason, Subscription, TokenStore},
};

const DEFAULT_REJECTION: &str = "Invalid email or password";

/// Snapshot of the session as the application sees it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AuthenticationState {
	/// `true` while an access token is present.
	pub is_authenticated: bool,
	/// Current access token.
	pub access_token: Option<TokenSecret>,
	/// Profile of the signed-in user, once fetched.
	pub user: Option<UserProfile>,
	/// `true` after an involuntary expiry, until the next login, logout, or acknowledgement.
	pub session_expired: bool,
}

/// Session façade bound to a [`SessionClient`].
///
/// Must be created inside a Tokio runtime; the expiry timer runs on it. Dropping the context
/// detaches it from the store and cancels the timer.
pub struct SessionContext<T>
where
	T: ?Sized + ApiTransport,
{
	client: SessionClient<T>,
	state: Arc<watch::Sender<AuthenticationState>>,
	timer: Arc<ExpiryTimer>,
	subscription: Option<Subscription>,
	auth_guard: AsyncMutex<()>,
}
impl<T> SessionContext<T>
where
	T: ?Sized + ApiTransport,
{
	/// Attaches a session façade to `client`.
	///
	/// The stored pair is read once; an access token that is already expired is cleared with
	/// [`ChangeReason::Expired`], so the state starts with `session_expired` set.
	pub fn new(client: SessionClient<T>) -> Result<Self> {
		let runtime = Handle::try_current().map_err(|_| ConfigError::MissingRuntime)?;
		let timings = client.descriptor.timings;
		let (state, _) = watch::channel(AuthenticationState::default());
		let state = Arc::new(state);
		let timer =
			Arc::new(ExpiryTimer::new(runtime, Arc::downgrade(&client.store), timings.timer_buffer));
		let subscription = {
			let state = state.clone();
			let timer = timer.clone();

			client.store.subscribe(move |change| {
				apply_change(&state, change);
				timer.schedule(change.tokens.access.as_ref());
			})
		};
		let access = client.store.get().access;

		match access {
			Some(access) if TokenClock::is_expired(access.expose(), timings.expiry_margin) => {
				client.store.expire_if_current(access.expose());
			},
			access => {
				timer.schedule(access.as_ref());
				state.send_modify(|state| {
					state.is_authenticated = access.is_some();
					state.access_token = access;
				});
			},
		}

		Ok(Self { client, state, timer, subscription: Some(subscription), auth_guard: AsyncMutex::new(()) })
	}

	/// Session client for feature code (catalogue, orders, ...).
	pub fn client(&self) -> &SessionClient<T> {
		&self.client
	}

	/// Token store backing the session.
	pub fn store(&self) -> &Arc<TokenStore> {
		&self.client.store
	}

	/// Current state snapshot.
	pub fn state(&self) -> AuthenticationState {
		self.state.borrow().clone()
	}

	/// Receiver notified on every state change.
	pub fn subscribe_state(&self) -> watch::Receiver<AuthenticationState> {
		self.state.subscribe()
	}

	/// `true` while an access token is present.
	pub fn is_authenticated(&self) -> bool {
		self.state.borrow().is_authenticated
	}

	/// Current access token.
	pub fn access_token(&self) -> Option<TokenSecret> {
		self.state.borrow().access_token.clone()
	}

	/// Profile of the signed-in user.
	pub fn user(&self) -> Option<UserProfile> {
		self.state.borrow().user.clone()
	}

	/// `true` after an involuntary expiry.
	pub fn session_expired(&self) -> bool {
		self.state.borrow().session_expired
	}

	/// Acknowledges the "session expired" notice.
	pub fn clear_session_expired(&self) {
		self.state.send_if_modified(|state| std::mem::take(&mut state.session_expired));
	}

	/// Exchanges credentials for a token pair, then loads the user's profile.
	///
	/// A `400`/`401` from the login endpoint becomes [`Error::InvalidCredentials`] carrying the
	/// backend's `detail` and `code` (e.g. `email_not_verified`) and leaves the session
	/// untouched. If the profile cannot be loaded after the tokens were stored, the session is
	/// cleared again and the error returned.
	pub async fn login(&self, email: &str, password: &str) -> Result<UserProfile> {
		const KIND: FlowKind = FlowKind::Login;

		let _guard = self.auth_guard.lock().await;
		let span = FlowSpan::new(KIND, "login");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result: Result<UserProfile> = span
			.instrument(async {
				let request = ApiRequest::post(self.client.descriptor.endpoint(EndpointKind::Login))
					.anonymous()
					.json(&Credentials { email, password })?;
				let response = match self.client.send(request).await {
					Ok(response) => response,
					Err(Error::Status { status: 400 | 401, body }) => return Err(rejection(&body)),
					Err(err) => return Err(err),
				};
				let issued: IssuedTokens = response.json()?;

				self.client.store.set(Some(issued.access), issued.refresh);

				match self.fetch_profile().await {
					Ok(profile) => {
						self.remember_user(&profile);

						Ok(profile)
					},
					Err(err) => {
						self.end_session_if_active();

						Err(err)
					},
				}
			})
			.await;

		match &result {
			Ok(_) => obs::record_flow_outcome(KIND, FlowOutcome::Success),
			Err(_) => obs::record_flow_outcome(KIND, FlowOutcome::Failure),
		}

		result
	}

	/// Ends the session.
	///
	/// The server is told when an access token is present; that call is best effort and its
	/// failure is only logged. The local session is always cleared with
	/// [`ChangeReason::Logout`]. Never fails.
	pub async fn logout(&self) {
		const KIND: FlowKind = FlowKind::Logout;

		let _guard = self.auth_guard.lock().await;
		let span = FlowSpan::new(KIND, "logout");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let outcome: Result<()> = span
			.instrument(async {
				if self.client.store.get().access.is_none() {
					return Ok(());
				}

				let request = ApiRequest::post(self.client.descriptor.endpoint(EndpointKind::Logout))
					.json(&serde_json::Map::new())?;

				self.client.send(request).await.map(drop)
			})
			.await;

		match &outcome {
			Ok(()) => obs::record_flow_outcome(KIND, FlowOutcome::Success),
			Err(err) => {
				obs::log_swallowed(KIND, err);
				obs::record_flow_outcome(KIND, FlowOutcome::Failure);
			},
		}

		self.client.store.clear(ClearReason::Logout);
	}

	/// Reloads the signed-in user's profile.
	///
	/// Returns `None` without a network call when logged out. A failed fetch ends a session that
	/// is still active with [`ChangeReason::Logout`]; a session that already expired while
	/// fetching keeps its expiry.
	pub async fn refresh_profile(&self) -> Option<UserProfile> {
		let _guard = self.auth_guard.lock().await;

		if self.client.store.get().access.is_none() {
			return None;
		}

		match self.fetch_profile().await {
			Ok(profile) => {
				self.remember_user(&profile);

				Some(profile)
			},
			Err(err) => {
				obs::log_swallowed(FlowKind::Profile, &err);
				self.end_session_if_active();

				None
			},
		}
	}

	/// Creates an account. Does not sign in.
	pub async fn register(&self, registration: &Registration) -> Result<Receipt> {
		let request = ApiRequest::post(self.client.descriptor.endpoint(EndpointKind::Register))
			.anonymous()
			.json(registration)?;

		self.account_call("register", request).await
	}

	/// Changes the signed-in user's password.
	pub async fn change_password(&self, change: &PasswordChange) -> Result<Receipt> {
		let request =
			ApiRequest::post(self.client.descriptor.endpoint(EndpointKind::PasswordChange))
				.json(change)?;

		self.account_call("change_password", request).await
	}

	/// Confirms the account's email with the emailed code. Does not sign in.
	pub async fn verify_email(&self, verification: &EmailVerification) -> Result<Receipt> {
		let request = ApiRequest::post(self.client.descriptor.endpoint(EndpointKind::VerifyEmail))
			.anonymous()
			.json(verification)?;

		self.account_call("verify_email", request).await
	}

	/// Asks the backend to email a new verification code.
	pub async fn resend_verification(&self, email: &str) -> Result<Receipt> {
		let request =
			ApiRequest::post(self.client.descriptor.endpoint(EndpointKind::ResendVerification))
				.anonymous()
				.json(&AccountEmail { email })?;

		self.account_call("resend_verification", request).await
	}

	/// Starts a password reset; the backend emails a reset code.
	pub async fn request_password_reset(&self, email: &str) -> Result<Receipt> {
		let request = ApiRequest::post(self.client.descriptor.endpoint(EndpointKind::PasswordReset))
			.anonymous()
			.json(&AccountEmail { email })?;

		self.account_call("request_password_reset", request).await
	}

	/// Sets a new password with the emailed reset code. Does not sign in.
	pub async fn confirm_password_reset(&self, confirm: &PasswordResetConfirm) -> Result<Receipt> {
		let request =
			ApiRequest::post(self.client.descriptor.endpoint(EndpointKind::PasswordResetConfirm))
				.anonymous()
				.json(confirm)?;

		self.account_call("confirm_password_reset", request).await
	}

	async fn account_call(&self, stage: &'static str, request: ApiRequest) -> Result<Receipt> {
		const KIND: FlowKind = FlowKind::Account;

		let span = FlowSpan::new(KIND, stage);

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span.instrument(self.client.send_json(request)).await;

		match &result {
			Ok(_) => obs::record_flow_outcome(KIND, FlowOutcome::Success),
			Err(_) => obs::record_flow_outcome(KIND, FlowOutcome::Failure),
		}

		result
	}

	async fn fetch_profile(&self) -> Result<UserProfile> {
		const KIND: FlowKind = FlowKind::Profile;

		let span = FlowSpan::new(KIND, "fetch_profile");

		obs::record_flow_outcome(KIND, FlowOutcome::Attempt);

		let result = span
			.instrument(self.client.get_json(self.client.descriptor.endpoint(EndpointKind::Me)))
			.await;

		match &result {
			Ok(_) => obs::record_flow_outcome(KIND, FlowOutcome::Success),
			Err(_) => obs::record_flow_outcome(KIND, FlowOutcome::Failure),
		}

		result
	}

	// A profile only sticks while a token is present.
	fn remember_user(&self, profile: &UserProfile) {
		self.state.send_if_modified(|state| {
			if state.access_token.is_none() {
				return false;
			}

			state.user = Some(profile.clone());

			true
		});
	}

	fn end_session_if_active(&self) {
		if self.client.store.get().access.is_some() {
			self.client.store.clear(ClearReason::Logout);
		}
	}
}
impl<T> Drop for SessionContext<T>
where
	T: ?Sized + ApiTransport,
{
	fn drop(&mut self) {
		if let Some(subscription) = self.subscription.take() {
			subscription.unsubscribe();
		}

		self.timer.cancel();
	}
}
impl<T> Debug for SessionContext<T>
where
	T: ?Sized + ApiTransport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("SessionContext")
			.field("state", &*self.state.borrow())
			.field("client", &self.client)
			.finish()
	}
}

fn apply_change(state: &watch::Sender<AuthenticationState>, change: &ChangeNotification) {
	state.send_modify(|state| {
		state.access_token = change.tokens.access.clone();
		state.is_authenticated = state.access_token.is_some();

		if state.access_token.is_none() {
			state.user = None;
		}

		state.session_expired = change.reason == ChangeReason::Expired;
	});
}

fn rejection(body: &str) -> Error {
	let payload = serde_json::from_str::<Value>(body).ok();
	let field = |name: &str| payload.as_ref().and_then(|payload| first_text(payload.get(name)));
	let reason = field("detail")
		.or_else(|| field("non_field_errors"))
		.unwrap_or_else(|| DEFAULT_REJECTION.into());
	let code = field("code");

	Error::InvalidCredentials { reason, code }
}

fn first_text(value: Option<&Value>) -> Option<String> {
	match value? {
		Value::String(text) => Some(text.clone()),
		Value::Array(items) => items.iter().find_map(|item| first_text(Some(item))),
		Value::Object(map) => first_text(map.get("detail")),
		_ => None,
	}
}

// Clears the session shortly before the access token's `exp`.
struct ExpiryTimer {
	runtime: Handle,
	store: std::sync::Weak<TokenStore>,
	buffer: Duration,
	task: Mutex<Option<JoinHandle<()>>>,
}
impl ExpiryTimer {
	fn new(runtime: Handle, store: std::sync::Weak<TokenStore>, buffer: Duration) -> Self {
		Self { runtime, store, buffer, task: Mutex::new(None) }
	}

	fn schedule(&self, access: Option<&TokenSecret>) {
		let mut task = self.task.lock();

		if let Some(previous) = task.take() {
			previous.abort();
		}

		let Some(access) = access else {
			return;
		};
		// Opaque tokens carry no expiry; the response interceptor handles them.
		let Some(remaining) = TokenClock::remaining_at(access.expose(), OffsetDateTime::now_utc())
		else {
			return;
		};
		let delay = to_std(remaining.saturating_sub(self.buffer));
		let store = self.store.clone();
		let token = access.expose().to_owned();

		*task = Some(self.runtime.spawn(async move {
			tokio::time::sleep(delay).await;

			if let Some(store) = store.upgrade() {
				store.expire_if_current(&token);
			}
		}));
	}

	fn cancel(&self) {
		if let Some(task) = self.task.lock().take() {
			task.abort();
		}
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn rejection_reads_detail_and_code() {
		let err = rejection(
			r#"{"detail":"Email no verificado. Revisa tu bandeja de entrada.","code":"email_not_verified"}"#,
		);

		assert!(matches!(
			err,
			Error::InvalidCredentials { ref reason, code: Some(ref code) }
				if reason.starts_with("Email no verificado") && code == "email_not_verified"
		));
	}

	#[test]
	fn rejection_handles_lists_nesting_and_garbage() {
		let err = rejection(r#"{"non_field_errors":["No active account found."]}"#);

		assert!(matches!(
			err,
			Error::InvalidCredentials { ref reason, code: None } if reason == "No active account found."
		));

		let err = rejection(r#"{"detail":{"detail":["Nested."],"code":"x"}}"#);

		assert!(matches!(err, Error::InvalidCredentials { ref reason, .. } if reason == "Nested."));

		let err = rejection("<html>bad gateway</html>");

		assert!(matches!(
			err,
			Error::InvalidCredentials { ref reason, code: None } if reason == DEFAULT_REJECTION
		));
	}

	#[test]
	fn state_follows_store_notifications() {
		let (state, _) = watch::channel(AuthenticationState {
			user: Some(UserProfile {
				id: 1,
				email: "ana@example.com".into(),
				first_name: String::new(),
				last_name: String::new(),
				role: None,
				is_staff: false,
				is_email_verified: true,
			}),
			..Default::default()
		});
		let set = ChangeNotification {
			tokens: crate::auth::TokenPair::new(Some("a".into()), Some("r".into())),
			reason: ChangeReason::Set,
		};

		apply_change(&state, &set);

		assert!(state.borrow().is_authenticated);
		assert!(state.borrow().user.is_some());

		apply_change(
			&state,
			&ChangeNotification { tokens: Default::default(), reason: ChangeReason::Expired },
		);

		let snapshot = state.borrow().clone();

		assert!(!snapshot.is_authenticated);
		assert!(snapshot.user.is_none());
		assert!(snapshot.session_expired);

		apply_change(&state, &set);

		assert!(!state.borrow().session_expired);
	}
}
