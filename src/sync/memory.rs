//! In-process [`BroadcastChannel`] hub connecting simulated browsing contexts.

// std
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
// self
use crate::{
	_prelude::*,
	sync::{BroadcastChannel, ChannelError},
};

type Inbox = Arc<Mutex<VecDeque<String>>>;

#[derive(Debug, Default)]
struct Hub {
	members: Mutex<Vec<(u64, Weak<Mutex<VecDeque<String>>>)>>,
	next_member: AtomicU64,
}
impl Hub {
	fn join(self: &Arc<Self>) -> MemoryBroadcast {
		let member = self.next_member.fetch_add(1, Ordering::Relaxed);
		let inbox = Inbox::default();

		self.members.lock().push((member, Arc::downgrade(&inbox)));

		MemoryBroadcast { hub: self.clone(), member, inbox, closed: AtomicBool::new(false) }
	}
}

/// One context's endpoint on a shared broadcast hub.
///
/// Messages posted by a handle are queued for every other live handle of the hub and never for
/// the sender itself.
#[derive(Debug)]
pub struct MemoryBroadcast {
	hub: Arc<Hub>,
	member: u64,
	inbox: Inbox,
	closed: AtomicBool,
}
impl MemoryBroadcast {
	/// Creates an endpoint on a fresh hub.
	pub fn new() -> Self {
		Arc::new(Hub::default()).join()
	}

	/// Creates another endpoint on the same hub.
	pub fn sibling(&self) -> Self {
		self.hub.join()
	}

	/// Stops sending and receiving; pending messages are discarded.
	pub fn close(&self) {
		self.closed.store(true, Ordering::SeqCst);
		self.inbox.lock().clear();
		self.hub.members.lock().retain(|(member, _)| *member != self.member);
	}

	/// Number of messages waiting in this endpoint's inbox.
	pub fn pending_messages(&self) -> usize {
		self.inbox.lock().len()
	}
}
impl Default for MemoryBroadcast {
	fn default() -> Self {
		Self::new()
	}
}
impl BroadcastChannel for MemoryBroadcast {
	fn post(&self, message: &str) -> Result<(), ChannelError> {
		if self.closed.load(Ordering::SeqCst) {
			return Err(ChannelError::Closed);
		}

		let mut members = self.hub.members.lock();

		members.retain(|(_, inbox)| inbox.strong_count() > 0);

		for (member, inbox) in members.iter() {
			if *member == self.member {
				continue;
			}
			if let Some(inbox) = inbox.upgrade() {
				inbox.lock().push_back(message.to_owned());
			}
		}

		Ok(())
	}

	fn take_messages(&self) -> Vec<String> {
		self.inbox.lock().drain(..).collect()
	}
}
