//! Owned session state for one browsing context, persisted through a [`SessionStorage`] backend.

// std
use std::{
	collections::VecDeque,
	sync::atomic::{AtomicBool, AtomicU64, Ordering},
};
// crates.io
use parking_lot::ReentrantMutex;
// self
use crate::{
	_prelude::*,
	auth::{TokenPair, User},
	config::StorageKeys,
	obs::obs_event,
	session::SessionSnapshot,
	store::SessionStorage,
	sync::{BroadcastChannel, BroadcastEvent},
};

/// Callback invoked with the new snapshot after every mutation.
pub type Listener = Arc<dyn Fn(&SessionSnapshot) + Send + Sync>;

type Listeners = Mutex<Vec<(u64, Listener)>>;

/// Single owner of a context's [`SessionSnapshot`].
///
/// All mutation funnels through [`set_user`](Self::set_user), [`set_tokens`](Self::set_tokens),
/// and [`clear`](Self::clear). Each one swaps the snapshot and persists it while holding the
/// state lock, then releases the lock before emitting cross-tab signals and notifying
/// subscribers, so listeners are free to read or mutate the store again.
///
/// Mutations and their notifications are sequenced: a second thread's mutation waits until the
/// first one has notified every subscriber. A listener that mutates the store from inside its
/// callback re-enters immediately, but the snapshot it produces is queued and delivered to
/// every subscriber only after the one being delivered, so all subscribers observe mutations in
/// call order.
pub struct TokenStore {
	keys: StorageKeys,
	storage: Arc<dyn SessionStorage>,
	channel: Option<Arc<dyn BroadcastChannel>>,
	state: RwLock<SessionSnapshot>,
	sequencer: ReentrantMutex<()>,
	pending: Mutex<VecDeque<SessionSnapshot>>,
	delivering: AtomicBool,
	listeners: Arc<Listeners>,
	next_listener: AtomicU64,
	persist_failures: AtomicU64,
}
impl TokenStore {
	/// Opens the store, rehydrating the snapshot persisted under `keys.snapshot`.
	///
	/// A missing key, an unreadable backend, or a corrupt payload all fall back to the anonymous
	/// snapshot.
	pub fn open(storage: Arc<dyn SessionStorage>, keys: StorageKeys) -> Self {
		let snapshot = match storage.get_item(&keys.snapshot) {
			Ok(Some(raw)) => SessionSnapshot::from_json(&raw).unwrap_or_else(|| {
				obs_event!(warn, key = %keys.snapshot, "discarding corrupt persisted session");

				SessionSnapshot::anonymous()
			}),
			Ok(None) => SessionSnapshot::anonymous(),
			Err(_e) => {
				obs_event!(warn, key = %keys.snapshot, error = %_e, "session storage unreadable");

				SessionSnapshot::anonymous()
			},
		};

		Self {
			keys,
			storage,
			channel: None,
			state: RwLock::new(snapshot),
			sequencer: ReentrantMutex::new(()),
			pending: Mutex::default(),
			delivering: AtomicBool::new(false),
			listeners: Arc::default(),
			next_listener: AtomicU64::new(0),
			persist_failures: AtomicU64::new(0),
		}
	}

	/// Attaches the broadcast channel used for logout and state-change signals.
	pub fn with_broadcast(mut self, channel: Arc<dyn BroadcastChannel>) -> Self {
		self.channel = Some(channel);

		self
	}

	/// Returns a copy of the current snapshot.
	pub fn get(&self) -> SessionSnapshot {
		self.state.read().clone()
	}

	/// Replaces the user profile.
	///
	/// Turning an anonymous context into an authenticated one posts a `stateChanged` hint.
	pub fn set_user(&self, user: Option<User>) {
		let _turn = self.sequencer.lock();
		let (previous, next) = self.commit(|snapshot| snapshot.with_user(user));

		if !previous.is_authenticated() && next.is_authenticated() {
			self.post(BroadcastEvent::state_changed());
		}

		self.notify(next);
	}

	/// Replaces the token pair.
	///
	/// Rotating the access token of an authenticated context posts a `stateChanged` hint.
	pub fn set_tokens(&self, tokens: Option<TokenPair>) {
		let _turn = self.sequencer.lock();
		let (previous, next) = self.commit(|snapshot| snapshot.with_tokens(tokens));

		if next.is_authenticated() && previous.access_token() != next.access_token() {
			self.post(BroadcastEvent::state_changed());
		}

		self.notify(next);
	}

	/// Signs the context out: resets to anonymous, pulses the logout marker key, and posts a
	/// `logout` broadcast.
	pub fn clear(&self) {
		let _turn = self.sequencer.lock();
		let (_, next) = self.commit(|_| SessionSnapshot::anonymous());

		self.pulse_logout_marker();
		self.post(BroadcastEvent::logout());
		self.notify(next);
	}

	/// Resets to anonymous on behalf of a sibling's logout, without echoing any signal.
	pub(crate) fn clear_from_remote(&self) {
		let _turn = self.sequencer.lock();
		let (_, next) = self.commit(|_| SessionSnapshot::anonymous());

		self.notify(next);
	}

	/// Installs state merged from a sibling's persisted snapshot.
	///
	/// The snapshot already reflects the origin's storage, so nothing is written back and no
	/// signal is posted.
	pub(crate) fn adopt_remote(&self, snapshot: SessionSnapshot) {
		let _turn = self.sequencer.lock();

		*self.state.write() = snapshot.clone();

		self.notify(snapshot);
	}

	/// Registers `listener`; it stays registered until the returned [`Subscription`] is dropped.
	pub fn subscribe<F>(&self, listener: F) -> Subscription
	where
		F: 'static + Fn(&SessionSnapshot) + Send + Sync,
	{
		let id = self.next_listener.fetch_add(1, Ordering::Relaxed);

		self.listeners.lock().push((id, Arc::new(listener)));

		Subscription { listeners: Arc::downgrade(&self.listeners), id }
	}

	/// Reads the snapshot currently persisted by any context of the origin.
	pub fn persisted(&self) -> Option<SessionSnapshot> {
		match self.storage.get_item(&self.keys.snapshot) {
			Ok(raw) => raw.as_deref().and_then(SessionSnapshot::from_json),
			Err(_e) => {
				obs_event!(debug, error = %_e, "persisted session unreadable");

				None
			},
		}
	}

	/// Storage keys this store reads and writes.
	pub fn keys(&self) -> &StorageKeys {
		&self.keys
	}

	/// Number of snapshot writes the backend rejected since the store was opened.
	pub fn persist_failures(&self) -> u64 {
		self.persist_failures.load(Ordering::Relaxed)
	}

	/// Number of live subscriptions.
	pub fn listener_count(&self) -> usize {
		self.listeners.lock().len()
	}

	pub(crate) fn storage(&self) -> &Arc<dyn SessionStorage> {
		&self.storage
	}

	pub(crate) fn channel(&self) -> Option<&Arc<dyn BroadcastChannel>> {
		self.channel.as_ref()
	}

	fn commit(
		&self,
		update: impl FnOnce(SessionSnapshot) -> SessionSnapshot,
	) -> (SessionSnapshot, SessionSnapshot) {
		let mut state = self.state.write();
		let previous = state.clone();
		let next = update(previous.clone());

		*state = next.clone();

		self.persist(&next);

		(previous, next)
	}

	fn persist(&self, snapshot: &SessionSnapshot) {
		let outcome = serde_json::to_string(snapshot)
			.map_err(|e| e.to_string())
			.and_then(|raw| {
				self.storage.set_item(&self.keys.snapshot, &raw).map_err(|e| e.to_string())
			});

		if let Err(_reason) = outcome {
			self.persist_failures.fetch_add(1, Ordering::Relaxed);

			obs_event!(warn, key = %self.keys.snapshot, reason = %_reason, "session persist failed");
		}
	}

	fn pulse_logout_marker(&self) {
		let marker = match BroadcastEvent::logout().with_nonce().to_json() {
			Ok(marker) => marker,
			Err(_e) => {
				obs_event!(warn, error = %_e, "logout marker could not be encoded");

				return;
			},
		};
		let outcome = self
			.storage
			.set_item(&self.keys.logout_marker, &marker)
			.and_then(|()| self.storage.remove_item(&self.keys.logout_marker));

		if let Err(_e) = outcome {
			obs_event!(warn, key = %self.keys.logout_marker, error = %_e, "logout marker write failed");
		}
	}

	fn post(&self, event: BroadcastEvent) {
		let Some(channel) = &self.channel else {
			return;
		};
		let outcome = match event.to_json() {
			Ok(message) => channel.post(&message).map_err(|e| e.to_string()),
			Err(e) => Err(e.to_string()),
		};

		if let Err(_reason) = outcome {
			obs_event!(debug, kind = %event.kind, reason = %_reason, "broadcast dropped");
		}
	}

	// Callers hold the sequencer, so a raised `delivering` flag belongs to an outer frame of the
	// same thread, which drains the queue.
	fn notify(&self, snapshot: SessionSnapshot) {
		self.pending.lock().push_back(snapshot);

		if self.delivering.swap(true, Ordering::Acquire) {
			return;
		}

		let _delivery = Delivery(self);

		loop {
			let Some(snapshot) = self.pending.lock().pop_front() else {
				break;
			};
			let listeners = self
				.listeners
				.lock()
				.iter()
				.map(|(_, listener)| listener.clone())
				.collect::<Vec<_>>();

			for listener in listeners {
				listener(&snapshot);
			}
		}
	}
}
impl Debug for TokenStore {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("TokenStore")
			.field("keys", &self.keys)
			.field("state", &*self.state.read())
			.field("listeners", &self.listener_count())
			.field("broadcast", &self.channel.is_some())
			.finish()
	}
}

struct Delivery<'a>(&'a TokenStore);
impl Drop for Delivery<'_> {
	fn drop(&mut self) {
		self.0.pending.lock().clear();
		self.0.delivering.store(false, Ordering::Release);
	}
}

/// Handle that keeps a listener registered; dropping it unsubscribes.
#[must_use = "dropping a subscription immediately unsubscribes its listener"]
pub struct Subscription {
	listeners: Weak<Listeners>,
	id: u64,
}
impl Subscription {
	/// Removes the listener now.
	pub fn unsubscribe(self) {}

	/// Keeps the listener registered for the lifetime of the store.
	pub fn detach(mut self) {
		self.listeners = Weak::new();
	}
}
impl Drop for Subscription {
	fn drop(&mut self) {
		if let Some(listeners) = self.listeners.upgrade() {
			listeners.lock().retain(|(id, _)| *id != self.id);
		}
	}
}
impl Debug for Subscription {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Subscription").field("id", &self.id).finish()
	}
}
