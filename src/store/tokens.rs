//! Observable access/refresh token store.
//!
//! [`TokenStore`] keeps an in-memory mirror of the persisted pair so reads never touch a
//! failing backend, writes through to [`TokenStorage`] on every change, and fans a
//! [`ChangeNotification`] out to subscribers. Notifications are queued under the same lock
//! that mutates the mirror, so subscribers observe changes in the order they happened.
//! Storage I/O runs after that lock is released; writers serialize on a separate lock and always
//! persist the newest pair, so the backend converges on the mirror.

// self
use crate::{
	_prelude::*,
	auth::{TokenPair, TokenSecret},
	obs,
	store::{
		ACCESS_TOKEN_KEY, MemoryStorage, ObserverRegistry, REFRESH_TOKEN_KEY, StoreError,
		Subscription, TokenStorage,
	},
};

/// Why the token pair changed.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeReason {
	/// Tokens were written by login or refresh.
	Set,
	/// The user ended the session.
	Logout,
	/// The session ended involuntarily (local expiry, rejected refresh, repeated 401).
	Expired,
}
impl ChangeReason {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			ChangeReason::Set => "set",
			ChangeReason::Logout => "logout",
			ChangeReason::Expired => "expired",
		}
	}
}
impl Display for ChangeReason {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Reasons accepted by [`TokenStore::clear`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ClearReason {
	/// User-initiated logout; no "session expired" message is shown.
	#[default]
	Logout,
	/// Involuntary expiry; drives the "session expired" banner.
	Expired,
}
impl From<ClearReason> for ChangeReason {
	fn from(reason: ClearReason) -> Self {
		match reason {
			ClearReason::Logout => ChangeReason::Logout,
			ClearReason::Expired => ChangeReason::Expired,
		}
	}
}

/// Event delivered to [`TokenStore`] subscribers on every change.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChangeNotification {
	/// Pair after the change.
	pub tokens: TokenPair,
	/// Why the pair changed.
	pub reason: ChangeReason,
}

/// Shared holder of the session's token pair.
pub struct TokenStore {
	storage: Arc<dyn TokenStorage>,
	current: RwLock<TokenPair>,
	io: Mutex<()>,
	observers: ObserverRegistry<ChangeNotification>,
}
impl TokenStore {
	/// Creates a store over `storage`, loading whatever pair it already holds.
	///
	/// Unreadable keys are treated as absent.
	pub fn new(storage: Arc<dyn TokenStorage>) -> Self {
		let access = Self::load_key(storage.as_ref(), ACCESS_TOKEN_KEY);
		let refresh = Self::load_key(storage.as_ref(), REFRESH_TOKEN_KEY);

		Self {
			storage,
			current: RwLock::new(TokenPair::new(access, refresh)),
			io: Mutex::new(()),
			observers: ObserverRegistry::new(),
		}
	}

	/// Creates a store backed by a fresh [`MemoryStorage`].
	pub fn in_memory() -> Self {
		Self::new(Arc::new(MemoryStorage::default()))
	}

	/// Returns the current pair; never fails.
	pub fn get(&self) -> TokenPair {
		self.current.read().clone()
	}

	/// Writes both tokens (a `None` removes its key) and notifies with [`ChangeReason::Set`].
	pub fn set(&self, access: Option<TokenSecret>, refresh: Option<TokenSecret>) {
		self.replace(TokenPair::new(access, refresh), ChangeReason::Set);
	}

	/// Removes both tokens and notifies with the given reason.
	///
	/// Clearing an already empty store still notifies.
	pub fn clear(&self, reason: ClearReason) {
		let reason = ChangeReason::from(reason);

		obs::log_clear(reason);

		self.replace(TokenPair::empty(), reason);
	}

	/// Clears with [`ChangeReason::Expired`] only if `access` is still the stored access token.
	///
	/// Returns `true` when the store was cleared. Used by expiry detectors that observed a token
	/// earlier, so they never wipe a pair a concurrent refresh has since replaced.
	pub fn expire_if_current(&self, access: &str) -> bool {
		{
			let mut current = self.current.write();

			if current.access_token() != Some(access) {
				return false;
			}

			obs::log_clear(ChangeReason::Expired);

			*current = TokenPair::empty();

			self.observers.enqueue(ChangeNotification {
				tokens: TokenPair::empty(),
				reason: ChangeReason::Expired,
			});
		}

		self.write_through();
		self.observers.dispatch();

		true
	}

	/// Registers a listener invoked synchronously on every change.
	pub fn subscribe<F>(&self, listener: F) -> Subscription
	where
		F: 'static + Fn(&ChangeNotification) + Send + Sync,
	{
		self.observers.subscribe(listener)
	}

	fn replace(&self, pair: TokenPair, reason: ChangeReason) {
		{
			let mut current = self.current.write();

			*current = pair.clone();

			self.observers.enqueue(ChangeNotification { tokens: pair, reason });
		}

		self.write_through();
		self.observers.dispatch();
	}

	fn write_through(&self) {
		let _io = self.io.lock();
		let pair = self.current.read().clone();
		let writes = [(ACCESS_TOKEN_KEY, pair.access_token()), (REFRESH_TOKEN_KEY, pair.refresh_token())];

		for (key, value) in writes {
			let outcome = match value {
				Some(value) => self.storage.save(key, value),
				None => self.storage.remove(key),
			};

			if let Err(err) = outcome {
				obs::log_storage_failure(key, &err);
			}
		}
	}

	fn load_key(storage: &dyn TokenStorage, key: &str) -> Option<TokenSecret> {
		match storage.load(key) {
			Ok(value) => value.filter(|value| !value.is_empty()).map(TokenSecret::new),
			Err(err) => {
				obs::log_storage_failure(key, &err);

				None
			},
		}
	}
}
impl Default for TokenStore {
	fn default() -> Self {
		Self::in_memory()
	}
}
impl Debug for TokenStore {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenStore")
			.field("tokens", &*self.current.read())
			.field("observers", &self.observers)
			.finish()
	}
}

/// Storage backend whose every operation fails; exercises the never-fail read path.
#[derive(Clone, Copy, Debug, Default)]
pub struct UnavailableStorage;
impl TokenStorage for UnavailableStorage {
	fn load(&self, _key: &str) -> Result<Option<String>, StoreError> {
		Err(StoreError::Backend { message: "storage is unavailable".into() })
	}

	fn save(&self, _key: &str, _value: &str) -> Result<(), StoreError> {
		Err(StoreError::Backend { message: "storage is unavailable".into() })
	}

	fn remove(&self, _key: &str) -> Result<(), StoreError> {
		Err(StoreError::Backend { message: "storage is unavailable".into() })
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn recorder(store: &TokenStore) -> Arc<Mutex<Vec<ChangeNotification>>> {
		let seen = Arc::new(Mutex::new(Vec::new()));
		let sink = seen.clone();

		store.subscribe(move |change| sink.lock().push(change.clone()));

		seen
	}

	#[test]
	fn set_then_get_round_trips() {
		let store = TokenStore::in_memory();

		store.set(Some("a".into()), Some("r".into()));

		assert_eq!(store.get(), TokenPair::new(Some("a".into()), Some("r".into())));
	}

	#[test]
	fn set_with_none_removes_key_from_storage() {
		let storage = Arc::new(MemoryStorage::seeded("a", "r"));
		let store = TokenStore::new(storage.clone());

		store.set(Some("a2".into()), None);

		assert_eq!(storage.load(ACCESS_TOKEN_KEY).ok().flatten(), Some("a2".into()));
		assert_eq!(storage.load(REFRESH_TOKEN_KEY).ok().flatten(), None);
	}

	#[test]
	fn existing_storage_is_loaded_on_construction() {
		let store = TokenStore::new(Arc::new(MemoryStorage::seeded("seed-a", "seed-r")));

		assert_eq!(store.get().access_token(), Some("seed-a"));
		assert_eq!(store.get().refresh_token(), Some("seed-r"));
	}

	#[test]
	fn unavailable_storage_reads_as_empty_and_still_notifies() {
		let store = TokenStore::new(Arc::new(UnavailableStorage));
		let seen = recorder(&store);

		assert!(store.get().is_empty());

		store.set(Some("a".into()), Some("r".into()));

		assert_eq!(store.get().access_token(), Some("a"));
		assert_eq!(seen.lock().len(), 1);
	}

	#[test]
	fn double_clear_emits_twice_with_empty_state() {
		let store = TokenStore::in_memory();

		store.set(Some("a".into()), Some("r".into()));

		let seen = recorder(&store);

		store.clear(ClearReason::Logout);
		store.clear(ClearReason::Logout);

		let seen = seen.lock();

		assert_eq!(seen.len(), 2);
		assert!(seen.iter().all(|change| change.tokens.is_empty()));
		assert!(seen.iter().all(|change| change.reason == ChangeReason::Logout));
		assert!(store.get().is_empty());
	}

	#[test]
	fn every_subscriber_sees_every_change_once() {
		let store = TokenStore::in_memory();
		let first = recorder(&store);
		let second = recorder(&store);

		store.set(Some("a".into()), Some("r".into()));
		store.clear(ClearReason::Expired);

		for seen in [first, second] {
			let reasons = seen.lock().iter().map(|change| change.reason).collect::<Vec<_>>();

			assert_eq!(reasons, [ChangeReason::Set, ChangeReason::Expired]);
		}
	}

	#[test]
	fn change_from_listener_is_delivered_after_current_notification() {
		let store = Arc::new(TokenStore::in_memory());
		let log = Arc::new(Mutex::new(Vec::new()));
		let weak = Arc::downgrade(&store);
		let first = log.clone();

		store.subscribe(move |change| {
			first.lock().push(format!("first:{}", change.reason));

			if change.reason == ChangeReason::Set
				&& let Some(store) = weak.upgrade()
			{
				store.clear(ClearReason::Expired);
			}
		});

		let second = log.clone();

		store.subscribe(move |change| second.lock().push(format!("second:{}", change.reason)));
		store.set(Some("a".into()), Some("r".into()));

		assert_eq!(
			*log.lock(),
			["first:set", "second:set", "first:expired", "second:expired"]
		);
		assert!(store.get().is_empty());
	}

	#[test]
	fn expire_if_current_ignores_replaced_tokens() {
		let store = TokenStore::in_memory();
		let seen = recorder(&store);

		store.set(Some("old".into()), Some("r".into()));
		store.set(Some("new".into()), Some("r".into()));

		assert!(!store.expire_if_current("old"));
		assert_eq!(store.get().access_token(), Some("new"));
		assert!(store.expire_if_current("new"));
		assert!(store.get().is_empty());
		assert_eq!(seen.lock().last().map(|change| change.reason), Some(ChangeReason::Expired));
	}

	// Blocks the first `save` until released, reporting when it started.
	struct GatedStorage {
		inner: MemoryStorage,
		entered: Mutex<Option<std::sync::mpsc::Sender<()>>>,
		release: Mutex<std::sync::mpsc::Receiver<()>>,
	}
	impl TokenStorage for GatedStorage {
		fn load(&self, key: &str) -> Result<Option<String>, StoreError> {
			self.inner.load(key)
		}

		fn save(&self, key: &str, value: &str) -> Result<(), StoreError> {
			if let Some(entered) = self.entered.lock().take() {
				let _ = entered.send(());
				let _ = self.release.lock().recv();
			}

			self.inner.save(key, value)
		}

		fn remove(&self, key: &str) -> Result<(), StoreError> {
			self.inner.remove(key)
		}
	}

	#[test]
	fn reads_are_not_blocked_by_slow_storage() {
		let (entered_tx, entered_rx) = std::sync::mpsc::channel();
		let (release_tx, release_rx) = std::sync::mpsc::channel();
		let storage = Arc::new(GatedStorage {
			inner: MemoryStorage::default(),
			entered: Mutex::new(Some(entered_tx)),
			release: Mutex::new(release_rx),
		});
		let store = Arc::new(TokenStore::new(storage.clone()));
		let writer = {
			let store = store.clone();

			std::thread::spawn(move || store.set(Some("a".into()), Some("r".into())))
		};

		entered_rx.recv().expect("Writer should reach the storage backend.");

		assert_eq!(store.get().access_token(), Some("a"));

		release_tx.send(()).expect("Writer should still be waiting on storage.");
		writer.join().expect("Writer thread should finish.");

		assert_eq!(storage.inner.load(REFRESH_TOKEN_KEY).ok().flatten(), Some("r".into()));
	}

	#[test]
	fn concurrent_writers_leave_storage_matching_the_mirror() {
		let storage = Arc::new(MemoryStorage::default());
		let store = Arc::new(TokenStore::new(storage.clone()));

		for round in 0..200 {
			let barrier = Arc::new(std::sync::Barrier::new(2));
			let writers = ["left", "right"]
				.into_iter()
				.map(|tag| {
					let store = store.clone();
					let barrier = barrier.clone();

					std::thread::spawn(move || {
						barrier.wait();

						if tag == "left" {
							store.set(Some(format!("{tag}-{round}").into()), Some("r".into()));
						} else {
							store.clear(ClearReason::Expired);
						}
					})
				})
				.collect::<Vec<_>>();

			for writer in writers {
				writer.join().expect("Writer thread should finish.");
			}

			let mirror = store.get();

			assert_eq!(
				storage.load(ACCESS_TOKEN_KEY).ok().flatten().as_deref(),
				mirror.access_token()
			);
			assert_eq!(
				storage.load(REFRESH_TOKEN_KEY).ok().flatten().as_deref(),
				mirror.refresh_token()
			);
		}
	}

	#[test]
	fn unsubscribed_listener_stops_receiving() {
		let store = TokenStore::in_memory();
		let seen = Arc::new(Mutex::new(0_u32));
		let sink = seen.clone();
		let subscription = store.subscribe(move |_| *sink.lock() += 1);

		store.clear(ClearReason::Logout);

		assert!(subscription.unsubscribe());

		store.clear(ClearReason::Logout);

		assert_eq!(*seen.lock(), 1);
	}
}
