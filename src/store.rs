//! Durable storage contracts, built-in backends, and the observable [`TokenStore`].

pub mod file;
pub mod memory;
pub mod observer;
pub mod tokens;

pub use file::FileStorage;
pub use memory::MemoryStorage;
pub use observer::{ObserverRegistry, Subscription};
pub use tokens::{ChangeNotification, ChangeReason, ClearReason, TokenStore, UnavailableStorage};

// self
use crate::_prelude::*;

/// Storage key holding the access token.
pub const ACCESS_TOKEN_KEY: &str = "access_token";
/// Storage key holding the refresh token.
pub const REFRESH_TOKEN_KEY: &str = "refresh_token";

/// Synchronous key/value contract for client-side durable storage.
///
/// Only the two token keys are ever written; everything else about a session is transient.
pub trait TokenStorage
where
	Self: Send + Sync,
{
	/// Reads the value under `key`, if present.
	fn load(&self, key: &str) -> Result<Option<String>, StoreError>;

	/// Writes `value` under `key`, replacing any previous value.
	fn save(&self, key: &str, value: &str) -> Result<(), StoreError>;

	/// Deletes `key`; deleting a missing key is not an error.
	fn remove(&self, key: &str) -> Result<(), StoreError>;
}

/// Error type produced by [`TokenStorage`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// Serialization failures surfaced by the backend.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}
