//! File-backed [`SessionStorage`] for native hosts with a single browsing context.

// std
use std::{
	fs::{self, File},
	io::Write,
	path::{Path, PathBuf},
};
// self
use crate::{
	_prelude::*,
	store::{SessionStorage, StoreError},
};

/// Persists every item to a JSON object on disk after each mutation.
///
/// The file is rewritten atomically (temp file + rename). Other processes writing the same
/// file are not observed, so this backend never reports storage events.
#[derive(Clone, Debug)]
pub struct FileStorage {
	path: PathBuf,
	inner: Arc<RwLock<BTreeMap<String, String>>>,
}
impl FileStorage {
	/// Opens (or creates) storage at the provided path, eagerly loading existing items.
	pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
		let path = path.into();

		Self::ensure_parent_exists(&path)?;

		let items = Self::load_items(&path)?;

		Ok(Self { path, inner: Arc::new(RwLock::new(items)) })
	}

	/// Location of the backing file.
	pub fn path(&self) -> &Path {
		&self.path
	}

	fn load_items(path: &Path) -> Result<BTreeMap<String, String>, StoreError> {
		if !path.exists() {
			return Ok(BTreeMap::new());
		}

		let bytes = fs::read(path).map_err(|e| StoreError::Backend {
			message: format!("Failed to read {}: {e}", path.display()),
		})?;

		if bytes.is_empty() {
			return Ok(BTreeMap::new());
		}

		serde_json::from_slice(&bytes).map_err(|e| StoreError::Serialization {
			message: format!("Failed to parse {}: {e}", path.display()),
		})
	}

	fn ensure_parent_exists(path: &Path) -> Result<(), StoreError> {
		if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
			fs::create_dir_all(parent).map_err(|e| StoreError::Backend {
				message: format!("Failed to create storage directory {}: {e}", parent.display()),
			})?;
		}

		Ok(())
	}

	fn persist_locked(&self, items: &BTreeMap<String, String>) -> Result<(), StoreError> {
		let serialized =
			serde_json::to_vec_pretty(items).map_err(|e| StoreError::Serialization {
				message: format!("Failed to serialize storage items: {e}"),
			})?;
		let mut tmp_path = self.path.clone();

		tmp_path.set_extension("tmp");

		{
			let mut file = File::create(&tmp_path).map_err(|e| StoreError::Backend {
				message: format!("Failed to create {}: {e}", tmp_path.display()),
			})?;

			file.write_all(&serialized).map_err(|e| StoreError::Backend {
				message: format!("Failed to write {}: {e}", tmp_path.display()),
			})?;
			file.sync_all().map_err(|e| StoreError::Backend {
				message: format!("Failed to sync {}: {e}", tmp_path.display()),
			})?;
		}

		fs::rename(&tmp_path, &self.path).map_err(|e| StoreError::Backend {
			message: format!("Failed to replace {}: {e}", self.path.display()),
		})
	}
}
impl SessionStorage for FileStorage {
	fn get_item(&self, key: &str) -> Result<Option<String>, StoreError> {
		Ok(self.inner.read().get(key).cloned())
	}

	fn set_item(&self, key: &str, value: &str) -> Result<(), StoreError> {
		let mut guard = self.inner.write();

		if guard.get(key).map(String::as_str) == Some(value) {
			return Ok(());
		}

		guard.insert(key.to_owned(), value.to_owned());

		self.persist_locked(&guard)
	}

	fn remove_item(&self, key: &str) -> Result<(), StoreError> {
		let mut guard = self.inner.write();

		if guard.remove(key).is_none() {
			return Ok(());
		}

		self.persist_locked(&guard)
	}
}
