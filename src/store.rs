//! Persisted key/value storage contracts and built-in backends for session snapshots.
//!
//! A [`SessionStorage`] is the per-origin durable surface every browsing context of an
//! application shares. Writes that change a key's value are reported to the *other* contexts
//! as [`StorageEvent`]s, which they collect with [`SessionStorage::take_events`] and hand to
//! [`CrossTabSync`](crate::sync::CrossTabSync).

pub mod file;
pub mod memory;

pub use file::FileStorage;
pub use memory::MemoryStorage;

// self
use crate::_prelude::*;

/// Synchronous key/value backend shared by every context of one origin.
pub trait SessionStorage
where
	Self: Send + Sync,
{
	/// Reads the value stored under `key`.
	fn get_item(&self, key: &str) -> Result<Option<String>, StoreError>;

	/// Stores `value` under `key`, replacing any previous value.
	fn set_item(&self, key: &str, value: &str) -> Result<(), StoreError>;

	/// Deletes `key`; deleting a missing key is not an error.
	fn remove_item(&self, key: &str) -> Result<(), StoreError>;

	/// Drains change notifications produced by other contexts since the last call.
	///
	/// Backends without cross-context visibility keep the default, which never reports events.
	fn take_events(&self) -> Vec<StorageEvent> {
		Vec::new()
	}
}

/// Notification that another context changed a key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageEvent {
	/// Key whose value changed.
	pub key: String,
	/// Value before the change, if the key existed.
	pub old_value: Option<String>,
	/// Value after the change; `None` when the key was removed.
	pub new_value: Option<String>,
}

/// Error type produced by [`SessionStorage`] implementations.
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
