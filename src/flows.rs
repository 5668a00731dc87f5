//! Session flows and the [`SessionManager`] facade that wires them for one browsing context.

pub mod account;
pub mod gate;
pub mod refresh;

pub use account::*;
pub use gate::*;
pub use refresh::*;

// self
use crate::{
	_prelude::*,
	config::SessionConfig,
	exchange::CredentialExchange,
	guard::{Decision, NavigationWatch, Navigator, SessionGuard},
	http::{ApiRequest, ApiResponse, Transport},
	session::{SessionSnapshot, Subscription, TokenStore},
	store::SessionStorage,
	sync::{BroadcastChannel, CrossTabSync, SyncReport},
};
#[cfg(feature = "reqwest")]
use crate::{exchange::HttpExchange, http::ReqwestTransport};

/// External collaborators a [`SessionManager`] is assembled from.
#[derive(Clone)]
pub struct SessionBackends {
	/// Origin-scoped persisted storage.
	pub storage: Arc<dyn SessionStorage>,
	/// Origin-scoped broadcast channel, when the environment offers one.
	pub broadcast: Option<Arc<dyn BroadcastChannel>>,
	/// Transport API requests are sent through.
	pub transport: Arc<dyn Transport>,
	/// Service issuing and revoking token pairs.
	pub exchange: Arc<dyn CredentialExchange>,
}
impl Debug for SessionBackends {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("SessionBackends")
			.field("broadcast", &self.broadcast.is_some())
			.finish_non_exhaustive()
	}
}

/// Session core of one browsing context.
///
/// The manager owns the context's [`TokenStore`] and builds the refresh coordinator, request
/// gate, guard, and cross-tab driver around it. Account flows (sign-in, sign-out, profile
/// sync) live in [`account`] as methods on this type.
pub struct SessionManager {
	config: SessionConfig,
	store: Arc<TokenStore>,
	exchange: Arc<dyn CredentialExchange>,
	coordinator: Arc<RefreshCoordinator>,
	gate: RequestGate,
	guard: SessionGuard,
	sync: CrossTabSync,
	navigator: Option<Arc<dyn Navigator>>,
	watch: Option<NavigationWatch>,
}
impl SessionManager {
	/// Assembles a context from explicit backends, rehydrating the persisted snapshot.
	pub fn with_backends(config: SessionConfig, backends: SessionBackends) -> Self {
		let SessionBackends { storage, broadcast, transport, exchange } = backends;
		let mut store = TokenStore::open(storage, config.storage.clone());

		if let Some(channel) = broadcast {
			store = store.with_broadcast(channel);
		}

		let store = Arc::new(store);
		let coordinator = Arc::new(RefreshCoordinator::new(store.clone(), exchange.clone()));
		let gate = RequestGate::new(store.clone(), transport, coordinator.clone());
		let guard = SessionGuard::from_config(&config);
		let sync = CrossTabSync::new(store.clone(), guard.clone());

		Self { config, store, exchange, coordinator, gate, guard, sync, navigator: None, watch: None }
	}

	/// Attaches the context's navigator.
	///
	/// From then on every store mutation re-applies the guard to the current location, and
	/// remote logouts redirect to the sign-in path.
	pub fn with_navigator(mut self, navigator: Arc<dyn Navigator>) -> Self {
		self.sync =
			CrossTabSync::new(self.store.clone(), self.guard.clone()).with_navigator(navigator.clone());
		self.watch = Some(self.guard.watch(&self.store, navigator.clone()));
		self.navigator = Some(navigator);

		self
	}

	/// Configuration this context was built from.
	pub fn config(&self) -> &SessionConfig {
		&self.config
	}

	/// Session store of this context.
	pub fn store(&self) -> &Arc<TokenStore> {
		&self.store
	}

	/// Credential-exchange service in use.
	pub fn exchange(&self) -> &Arc<dyn CredentialExchange> {
		&self.exchange
	}

	/// Single-flight renewal coordinator.
	pub fn coordinator(&self) -> &Arc<RefreshCoordinator> {
		&self.coordinator
	}

	/// Gate authenticated API calls go through.
	pub fn gate(&self) -> &RequestGate {
		&self.gate
	}

	/// Navigation guard.
	pub fn guard(&self) -> &SessionGuard {
		&self.guard
	}

	/// Attached navigator, if any.
	pub fn navigator(&self) -> Option<&Arc<dyn Navigator>> {
		self.navigator.as_ref()
	}

	/// Current session snapshot.
	pub fn snapshot(&self) -> SessionSnapshot {
		self.store.get()
	}

	/// Registers a listener for every store mutation.
	pub fn subscribe<F>(&self, listener: F) -> Subscription
	where
		F: 'static + Fn(&SessionSnapshot) + Send + Sync,
	{
		self.store.subscribe(listener)
	}

	/// Applies the cross-tab signals received since the last turn.
	pub fn pump(&self) -> SyncReport {
		self.sync.pump()
	}

	/// Sends an API request through the gate.
	pub async fn request(&self, request: ApiRequest) -> Result<ApiResponse> {
		self.gate.send(request).await
	}

	/// Decides whether `location` may be displayed right now.
	pub fn check(&self, location: &str) -> Decision {
		self.guard.check(&self.store.get(), location)
	}

	/// Applies the guard to the navigator's current location.
	///
	/// Returns `None` when no navigator is attached.
	pub fn enforce(&self) -> Option<Decision> {
		let navigator = self.navigator.as_ref()?;

		Some(self.guard.enforce(navigator.as_ref(), &self.store.get()))
	}
}
#[cfg(feature = "reqwest")]
impl SessionManager {
	/// Creates a context speaking to `config.api_base` over reqwest.
	pub fn new(
		config: SessionConfig,
		storage: Arc<dyn SessionStorage>,
		broadcast: Option<Arc<dyn BroadcastChannel>>,
	) -> Result<Self> {
		let transport: Arc<dyn Transport> = Arc::new(ReqwestTransport::new(config.api_base.clone())?);
		let exchange = Arc::new(HttpExchange::new(transport.clone(), config.endpoints.clone()));

		Ok(Self::with_backends(config, SessionBackends { storage, broadcast, transport, exchange }))
	}
}
impl Debug for SessionManager {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("SessionManager")
			.field("api_base", &self.config.api_base.as_str())
			.field("snapshot", &self.store.get())
			.field("coordinator", &self.coordinator)
			.field("navigator", &self.navigator.is_some())
			.finish()
	}
}
