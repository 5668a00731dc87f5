//! Cross-tab convergence: applies sibling contexts' storage changes and broadcast messages to the
//! local [`TokenStore`].
//!
//! Two channels feed a context. Storage changes to the snapshot key are merged conservatively:
//! they can sign an anonymous context in or rotate an authenticated context's tokens, but never
//! sign it out. Sign-out only travels through explicit logout signals (the broadcast message or
//! the pulsed logout-marker key), which are authoritative. A snapshot change that storage has
//! already moved past is skipped, and adopted state is never written back, so a lagging context
//! cannot replay a sign-in its sibling has since revoked. Every handler ignores payloads it
//! cannot parse and is idempotent under duplicates and reordering.

pub mod event;
pub mod memory;

pub use event::*;
pub use memory::MemoryBroadcast;

// self
use crate::{
	_prelude::*,
	auth::UserId,
	guard::{Navigator, SessionGuard},
	obs::{FlowKind, FlowOutcome, FlowSpan, obs_event},
	session::{SessionSnapshot, TokenStore},
	store::StorageEvent,
};

/// Origin-scoped, best-effort publish/subscribe surface.
pub trait BroadcastChannel
where
	Self: Send + Sync,
{
	/// Publishes `message` to every other context; the sender does not receive it.
	fn post(&self, message: &str) -> Result<(), ChannelError>;

	/// Drains messages received since the last call.
	fn take_messages(&self) -> Vec<String> {
		Vec::new()
	}
}

/// Failures reported by [`BroadcastChannel::post`].
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum ChannelError {
	/// The channel was closed by its owner.
	#[error("Broadcast channel is closed.")]
	Closed,
	/// The backend refused the message.
	#[error("Broadcast delivery failed: {message}.")]
	Delivery {
		/// Human-readable reason.
		message: String,
	},
}

/// Local effect of one applied cross-tab signal.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SyncAction {
	/// An anonymous context adopted a sibling's sign-in.
	AdoptedLogin {
		/// Identifier of the adopted user.
		user_id: UserId,
	},
	/// An authenticated context adopted a sibling's rotated tokens.
	AdoptedTokens,
	/// A sibling's logout was applied.
	RemoteLogout {
		/// Whether local state was cleared (it may already have been anonymous).
		cleared: bool,
		/// Whether the navigator was sent to the sign-in path.
		redirected: bool,
	},
}

/// Summary of one [`CrossTabSync::pump`] turn.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SyncReport {
	/// Storage events and broadcast messages drained.
	pub received: usize,
	/// Actions that changed local state or navigation, in application order.
	pub actions: Vec<SyncAction>,
}
impl SyncReport {
	/// Whether nothing changed locally.
	pub fn is_idle(&self) -> bool {
		self.actions.is_empty()
	}

	/// Whether a remote logout was applied.
	pub fn saw_logout(&self) -> bool {
		self.actions.iter().any(|action| matches!(action, SyncAction::RemoteLogout { .. }))
	}
}

/// Applies sibling signals to one context's store.
pub struct CrossTabSync {
	store: Arc<TokenStore>,
	guard: SessionGuard,
	navigator: Option<Arc<dyn Navigator>>,
}
impl CrossTabSync {
	/// Creates a sync driver for `store`; `guard` supplies the sign-in path and route classes.
	pub fn new(store: Arc<TokenStore>, guard: SessionGuard) -> Self {
		Self { store, guard, navigator: None }
	}

	/// Attaches the navigator redirected on remote logout.
	pub fn with_navigator(mut self, navigator: Arc<dyn Navigator>) -> Self {
		self.navigator = Some(navigator);

		self
	}

	/// Drains the store's storage events, then its broadcast messages, applying each in order.
	pub fn pump(&self) -> SyncReport {
		let span = FlowSpan::new(FlowKind::CrossTab, "pump");

		span.record(FlowOutcome::Attempt);

		let report = span.in_scope(|| {
			let mut report = SyncReport::default();

			for event in self.store.storage().take_events() {
				report.received += 1;
				report.actions.extend(self.handle_storage_event(&event));
			}
			if let Some(channel) = self.store.channel() {
				for message in channel.take_messages() {
					report.received += 1;
					report.actions.extend(self.handle_broadcast(&message));
				}
			}

			report
		});

		span.record(FlowOutcome::Success);

		report
	}

	/// Applies a storage change made by another context.
	pub fn handle_storage_event(&self, event: &StorageEvent) -> Option<SyncAction> {
		let keys = self.store.keys();
		let raw = event.new_value.as_deref()?;

		if event.key == keys.snapshot {
			let Some(remote) = SessionSnapshot::from_json(raw) else {
				obs_event!(debug, key = %event.key, "ignoring malformed snapshot change");

				return None;
			};

			if !self.is_current(&event.key, raw) {
				obs_event!(debug, key = %event.key, "skipping superseded snapshot change");

				return None;
			}

			return self.reconcile(&remote);
		}
		if event.key == keys.logout_marker {
			return match BroadcastEvent::parse(raw) {
				Some(signal) if signal.is_logout() => self.remote_logout(),
				_ => {
					obs_event!(debug, key = %event.key, "ignoring malformed logout marker");

					None
				},
			};
		}

		None
	}

	/// Applies a broadcast message from another context.
	pub fn handle_broadcast(&self, raw: &str) -> Option<SyncAction> {
		let Some(event) = BroadcastEvent::parse(raw) else {
			obs_event!(debug, "ignoring malformed broadcast");

			return None;
		};

		match event.kind {
			BroadcastKind::Logout => self.remote_logout(),
			BroadcastKind::StateChanged => self.reconcile(&self.store.persisted()?),
		}
	}

	fn is_current(&self, key: &str, raw: &str) -> bool {
		matches!(self.store.storage().get_item(key), Ok(Some(current)) if current == raw)
	}

	fn reconcile(&self, remote: &SessionSnapshot) -> Option<SyncAction> {
		let local = self.store.get();

		if !local.is_authenticated() && remote.is_authenticated() {
			let user_id = remote.user()?.id.clone();

			self.store.adopt_remote(remote.clone());

			obs_event!(info, user = %user_id, "adopted sign-in from another tab");

			return Some(SyncAction::AdoptedLogin { user_id });
		}
		if local.is_authenticated()
			&& remote.is_authenticated()
			&& remote.tokens().is_some()
			&& local.access_token() != remote.access_token()
		{
			self.store.adopt_remote(local.with_tokens(remote.tokens().cloned()));

			obs_event!(debug, "adopted rotated tokens from another tab");

			return Some(SyncAction::AdoptedTokens);
		}

		None
	}

	fn remote_logout(&self) -> Option<SyncAction> {
		let cleared = !self.store.get().is_anonymous();

		if cleared {
			self.store.clear_from_remote();
		}

		let redirected = self
			.navigator
			.as_ref()
			.is_some_and(|navigator| self.guard.send_to_sign_in(navigator.as_ref()));

		if cleared || redirected {
			obs_event!(info, cleared, redirected, "applied logout from another tab");

			Some(SyncAction::RemoteLogout { cleared, redirected })
		} else {
			None
		}
	}
}
impl Debug for CrossTabSync {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("CrossTabSync")
			.field("store", &self.store)
			.field("guard", &self.guard)
			.field("navigator", &self.navigator.is_some())
			.finish()
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::{
		_preludet::*,
		config::StorageKeys,
		store::{MemoryStorage, SessionStorage},
	};

	struct Tab {
		store: Arc<TokenStore>,
		sync: CrossTabSync,
		navigator: Arc<RecordingNavigator>,
	}

	fn tab(storage: &MemoryStorage, channel: &MemoryBroadcast, path: &str) -> Tab {
		let store = Arc::new(
			TokenStore::open(Arc::new(storage.sibling()), StorageKeys::default())
				.with_broadcast(Arc::new(channel.sibling())),
		);
		let navigator = Arc::new(RecordingNavigator::at(path));
		let sync =
			CrossTabSync::new(store.clone(), SessionGuard::default()).with_navigator(navigator.clone());

		Tab { store, sync, navigator }
	}

	fn sign_in(store: &TokenStore, access: &str) {
		store.set_tokens(Some(pair(access, "r1")));
		store.set_user(Some(user("u1")));
	}

	#[test]
	fn anonymous_tab_adopts_a_sibling_login() {
		let storage = MemoryStorage::new();
		let channel = MemoryBroadcast::new();
		let a = tab(&storage, &channel, "/login");
		let b = tab(&storage, &channel, "/login");

		sign_in(&a.store, "a1");

		let report = b.sync.pump();

		assert_eq!(
			report.actions,
			vec![SyncAction::AdoptedLogin { user_id: "u1".parse().expect("Fixture id is valid.") }]
		);
		assert_eq!(b.store.get(), a.store.get());
		assert!(b.sync.pump().is_idle());
	}

	#[test]
	fn authenticated_tab_adopts_rotated_tokens_without_touching_the_user() {
		let storage = MemoryStorage::new();
		let channel = MemoryBroadcast::new();
		let a = tab(&storage, &channel, "/");
		let b = tab(&storage, &channel, "/");

		sign_in(&a.store, "a1");
		b.sync.pump();
		a.store.set_tokens(Some(pair("a2", "r2")));

		let report = b.sync.pump();

		assert_eq!(report.actions, vec![SyncAction::AdoptedTokens]);
		assert_eq!(b.store.get().access_token(), Some("a2"));
		assert_eq!(b.store.get().user(), a.store.get().user());
	}

	#[test]
	fn snapshot_changes_never_downgrade() {
		let storage = MemoryStorage::new();
		let channel = MemoryBroadcast::new();
		let b = tab(&storage, &channel, "/");

		sign_in(&b.store, "a1");

		let anonymous = serde_json::to_string(&SessionSnapshot::anonymous())
			.expect("Snapshot should serialize.");

		storage.set_item("emerald-auth", &anonymous).expect("Write should succeed.");

		let event = StorageEvent {
			key: "emerald-auth".into(),
			old_value: None,
			new_value: Some(anonymous),
		};

		assert_eq!(b.sync.handle_storage_event(&event), None);
		assert!(b.store.get().is_authenticated());
	}

	#[test]
	fn superseded_snapshot_changes_are_skipped() {
		let storage = MemoryStorage::new();
		let channel = MemoryBroadcast::new();
		let a = tab(&storage, &channel, "/");
		let b = tab(&storage, &channel, "/login");

		sign_in(&a.store, "a1");
		a.store.set_tokens(Some(pair("a2", "r2")));

		let report = b.sync.pump();

		assert_eq!(
			report.actions,
			vec![SyncAction::AdoptedLogin { user_id: "u1".parse().expect("Fixture id is valid.") }]
		);
		assert_eq!(b.store.get().access_token(), Some("a2"));
	}

	#[test]
	fn lagging_sibling_cannot_resurrect_a_logout() {
		let storage = MemoryStorage::new();
		let channel = MemoryBroadcast::new();
		let a = tab(&storage, &channel, "/");
		let b = tab(&storage, &channel, "/login");

		sign_in(&a.store, "a1");
		a.store.clear();

		let b_report = b.sync.pump();
		let a_report = a.sync.pump();

		assert!(
			b_report.actions.iter().all(|action| !matches!(action, SyncAction::AdoptedLogin { .. }))
		);
		assert!(a_report.is_idle());
		assert!(a.store.get().is_anonymous());
		assert!(b.store.get().is_anonymous());
		assert_eq!(a.store.persisted(), Some(SessionSnapshot::anonymous()));
	}

	#[test]
	fn logout_broadcast_clears_and_redirects_once() {
		let storage = MemoryStorage::new();
		let channel = MemoryBroadcast::new();
		let a = tab(&storage, &channel, "/");
		let b = tab(&storage, &channel, "/users");

		sign_in(&a.store, "a1");
		b.sync.pump();
		a.store.clear();

		let report = b.sync.pump();

		assert!(report.saw_logout());
		assert_eq!(
			report.actions,
			vec![SyncAction::RemoteLogout { cleared: true, redirected: true }]
		);
		assert!(b.store.get().is_anonymous());
		assert_eq!(b.navigator.history(), vec!["/login".to_owned()]);
		assert_eq!(
			channel
				.take_messages()
				.iter()
				.filter(|raw| BroadcastEvent::parse(raw).is_some_and(|event| event.is_logout()))
				.count(),
			1
		);
	}

	#[test]
	fn logout_marker_alone_signs_siblings_out() {
		let storage = MemoryStorage::new();
		let b = tab(&storage, &MemoryBroadcast::new(), "/login");

		sign_in(&b.store, "a1");

		let marker = BroadcastEvent::logout()
			.with_nonce()
			.to_json()
			.expect("Marker should serialize.");
		let event = StorageEvent {
			key: "emerald-auth:logout".into(),
			old_value: None,
			new_value: Some(marker),
		};

		assert_eq!(
			b.sync.handle_storage_event(&event),
			Some(SyncAction::RemoteLogout { cleared: true, redirected: false })
		);
		assert!(b.navigator.history().is_empty());
	}

	#[test]
	fn malformed_payloads_are_ignored() {
		let storage = MemoryStorage::new();
		let channel = MemoryBroadcast::new();
		let b = tab(&storage, &channel, "/");

		sign_in(&b.store, "a1");

		assert_eq!(b.sync.handle_broadcast("{\"type\":"), None);
		assert_eq!(b.sync.handle_broadcast("{\"type\":\"shutdown\",\"timestamp\":1}"), None);
		assert_eq!(
			b.sync.handle_storage_event(&StorageEvent {
				key: "emerald-auth".into(),
				old_value: None,
				new_value: Some("[1,2".into()),
			}),
			None
		);
		assert_eq!(
			b.sync.handle_storage_event(&StorageEvent {
				key: "unrelated".into(),
				old_value: None,
				new_value: Some("{}".into()),
			}),
			None
		);
		assert!(b.store.get().is_authenticated());
	}

	#[test]
	fn state_changed_hint_reconciles_from_storage() {
		let storage = MemoryStorage::new();
		let b = tab(&storage, &MemoryBroadcast::new(), "/login");
		let snapshot = SessionSnapshot::new(Some(user("u2")), Some(pair("a9", "r9")));

		storage
			.set_item(
				"emerald-auth",
				&serde_json::to_string(&snapshot).expect("Snapshot should serialize."),
			)
			.expect("Write should succeed.");

		let hint = BroadcastEvent::state_changed().to_json().expect("Hint should serialize.");

		assert!(matches!(b.sync.handle_broadcast(&hint), Some(SyncAction::AdoptedLogin { .. })));
		assert_eq!(b.store.get().access_token(), Some("a9"));
		assert_eq!(b.sync.handle_broadcast(&hint), None);
	}

	#[test]
	fn duplicate_logouts_are_idempotent() {
		let storage = MemoryStorage::new();
		let b = tab(&storage, &MemoryBroadcast::new(), "/users");
		let logout = BroadcastEvent::logout().to_json().expect("Logout should serialize.");

		sign_in(&b.store, "a1");

		assert!(b.sync.handle_broadcast(&logout).is_some());
		assert_eq!(b.sync.handle_broadcast(&logout), None);
		assert_eq!(b.navigator.history(), vec!["/login".to_owned()]);
	}
}
