//! Thread-safe in-memory [`TokenStorage`] for tests, demos, and ephemeral sessions.

// self
use crate::{
	_prelude::*,
	store::{StoreError, TokenStorage},
};

type StorageMap = Arc<RwLock<HashMap<String, String>>>;

/// Storage backend that keeps token keys in-process.
#[derive(Clone, Debug, Default)]
pub struct MemoryStorage(StorageMap);
impl MemoryStorage {
	/// Seeds a storage with an existing access/refresh pair.
	pub fn seeded(access: &str, refresh: &str) -> Self {
		let storage = Self::default();

		{
			let mut map = storage.0.write();

			map.insert(crate::store::ACCESS_TOKEN_KEY.into(), access.into());
			map.insert(crate::store::REFRESH_TOKEN_KEY.into(), refresh.into());
		}

		storage
	}

	/// Returns the number of keys currently held.
	pub fn len(&self) -> usize {
		self.0.read().len()
	}

	/// Returns `true` when no key is held.
	pub fn is_empty(&self) -> bool {
		self.0.read().is_empty()
	}
}
impl TokenStorage for MemoryStorage {
	fn load(&self, key: &str) -> Result<Option<String>, StoreError> {
		Ok(self.0.read().get(key).cloned())
	}

	fn save(&self, key: &str, value: &str) -> Result<(), StoreError> {
		self.0.write().insert(key.to_owned(), value.to_owned());

		Ok(())
	}

	fn remove(&self, key: &str) -> Result<(), StoreError> {
		self.0.write().remove(key);

		Ok(())
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::store::{ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY};

	#[test]
	fn save_load_remove_round_trip() {
		let storage = MemoryStorage::default();

		storage.save(ACCESS_TOKEN_KEY, "access").expect("Saving into memory should succeed.");

		assert_eq!(
			storage.load(ACCESS_TOKEN_KEY).expect("Loading from memory should succeed."),
			Some("access".into())
		);

		storage.remove(ACCESS_TOKEN_KEY).expect("Removing from memory should succeed.");
		storage.remove(REFRESH_TOKEN_KEY).expect("Removing a missing key should succeed.");

		assert!(storage.is_empty());
	}

	#[test]
	fn seeded_storage_holds_both_keys() {
		let storage = MemoryStorage::seeded("a", "r");

		assert_eq!(storage.len(), 2);
		assert_eq!(
			storage.load(REFRESH_TOKEN_KEY).expect("Loading seeded key should succeed."),
			Some("r".into())
		);
	}
}
