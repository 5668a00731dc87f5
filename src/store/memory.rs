//! In-process [`SessionStorage`] that emulates an origin's shared storage area.
//!
//! Every handle created through [`MemoryStorage::sibling`] sees the same items and receives the
//! [`StorageEvent`]s produced by the other handles, queued until it calls
//! [`SessionStorage::take_events`]. A handle never observes its own writes as events, and a
//! write that leaves the value unchanged produces no event.

// std
use std::sync::atomic::{AtomicU64, Ordering};
// self
use crate::{
	_prelude::*,
	store::{SessionStorage, StorageEvent, StoreError},
};

type Inbox = Arc<Mutex<VecDeque<StorageEvent>>>;

#[derive(Debug, Default)]
struct StorageArea {
	items: RwLock<HashMap<String, String>>,
	members: Mutex<Vec<(u64, Weak<Mutex<VecDeque<StorageEvent>>>)>>,
	next_member: AtomicU64,
}
impl StorageArea {
	fn join(self: &Arc<Self>) -> MemoryStorage {
		let member = self.next_member.fetch_add(1, Ordering::Relaxed);
		let inbox = Inbox::default();

		self.members.lock().push((member, Arc::downgrade(&inbox)));

		MemoryStorage { area: self.clone(), member, inbox }
	}

	fn dispatch(&self, origin: u64, event: StorageEvent) {
		let mut members = self.members.lock();

		members.retain(|(_, inbox)| inbox.strong_count() > 0);

		for (member, inbox) in members.iter() {
			if *member == origin {
				continue;
			}
			if let Some(inbox) = inbox.upgrade() {
				inbox.lock().push_back(event.clone());
			}
		}
	}
}

/// Handle onto a shared in-memory storage area, one per simulated browsing context.
#[derive(Debug)]
pub struct MemoryStorage {
	area: Arc<StorageArea>,
	member: u64,
	inbox: Inbox,
}
impl MemoryStorage {
	/// Opens a handle onto a fresh, empty storage area.
	pub fn new() -> Self {
		Arc::new(StorageArea::default()).join()
	}

	/// Opens another handle onto the same storage area (a sibling tab of the same origin).
	pub fn sibling(&self) -> Self {
		self.area.join()
	}

	/// Number of events waiting in this handle's inbox.
	pub fn pending_events(&self) -> usize {
		self.inbox.lock().len()
	}
}
impl Default for MemoryStorage {
	fn default() -> Self {
		Self::new()
	}
}
impl SessionStorage for MemoryStorage {
	fn get_item(&self, key: &str) -> Result<Option<String>, StoreError> {
		Ok(self.area.items.read().get(key).cloned())
	}

	fn set_item(&self, key: &str, value: &str) -> Result<(), StoreError> {
		let old_value = self.area.items.write().insert(key.to_owned(), value.to_owned());

		if old_value.as_deref() != Some(value) {
			self.area.dispatch(
				self.member,
				StorageEvent { key: key.to_owned(), old_value, new_value: Some(value.to_owned()) },
			);
		}

		Ok(())
	}

	fn remove_item(&self, key: &str) -> Result<(), StoreError> {
		let old_value = self.area.items.write().remove(key);

		if old_value.is_some() {
			self.area.dispatch(
				self.member,
				StorageEvent { key: key.to_owned(), old_value, new_value: None },
			);
		}

		Ok(())
	}

	fn take_events(&self) -> Vec<StorageEvent> {
		self.inbox.lock().drain(..).collect()
	}
}
