//! Shared fakes for integration tests: a scripted API, a counting credential exchange, a
//! recording navigator, and an origin that opens tabs over shared in-memory backends.

#![allow(dead_code)]

// std
use std::{
	collections::VecDeque,
	sync::{
		Arc,
		atomic::{AtomicUsize, Ordering},
	},
};
// crates.io
use parking_lot::Mutex;
// self
use tab_session::{
	auth::{TokenPair, User},
	config::SessionConfig,
	exchange::{CredentialExchange, Credentials, ExchangeError, ExchangeFuture},
	flows::{SessionBackends, SessionManager},
	guard::Navigator,
	http::{ApiRequest, ApiResponse, Transport, TransportFuture},
	store::MemoryStorage,
	sync::{BroadcastEvent, MemoryBroadcast},
	url::Url,
};

pub fn user(id: &str) -> User {
	User::new(id, format!("{id}@example.com"), id).expect("User fixture should be valid.")
}

pub fn pair(access: &str, refresh: &str) -> TokenPair {
	TokenPair::new(access, refresh, 3_600)
}

pub fn config() -> SessionConfig {
	let base = Url::parse("http://127.0.0.1:8000").expect("Fixture URL should parse.");

	SessionConfig::builder(base).build().expect("Default configuration should validate.")
}

/// API that answers `200` for the accepted bearer and `401` for anything else.
///
/// Every answer is preceded by one scheduler yield so concurrent callers interleave.
#[derive(Default)]
pub struct ScriptedApi {
	accepted: Mutex<String>,
	profile: Mutex<Option<User>>,
	requests: Mutex<Vec<ApiRequest>>,
}
impl ScriptedApi {
	pub fn accepting(token: &str) -> Arc<Self> {
		let api = Self::default();

		*api.accepted.lock() = token.into();

		Arc::new(api)
	}

	pub fn accept(&self, token: &str) {
		*self.accepted.lock() = token.into();
	}

	pub fn serve_profile(&self, user: User) {
		*self.profile.lock() = Some(user);
	}

	pub fn requests(&self) -> Vec<ApiRequest> {
		self.requests.lock().clone()
	}

	/// Requests that carried `token`.
	pub fn sent_with(&self, token: &str) -> usize {
		self.requests.lock().iter().filter(|request| request.bearer() == Some(token)).count()
	}
}
impl Transport for ScriptedApi {
	fn send(&self, request: ApiRequest) -> TransportFuture<'_> {
		Box::pin(async move {
			tokio::task::yield_now().await;

			let authorized = request.bearer() == Some(self.accepted.lock().as_str());
			let response = if !authorized {
				ApiResponse::json_body(
					401,
					&serde_json::json!({"detail": "Could not validate credentials"}),
				)
			} else if request.path == "/api/v1/users/me" {
				match self.profile.lock().as_ref() {
					Some(user) => ApiResponse::json_body(
						200,
						&serde_json::to_value(user).expect("Profile fixture should serialize."),
					),
					None => ApiResponse::json_body(404, &serde_json::json!({"detail": "User not found"})),
				}
			} else {
				ApiResponse::json_body(200, &serde_json::json!({"path": request.path}))
			};

			self.requests.lock().push(request);

			Ok(response)
		})
	}
}

/// Exchange answering refreshes from a script, yielding a few turns before each answer.
pub struct CountingExchange {
	refreshes: Mutex<VecDeque<Result<TokenPair, ExchangeError>>>,
	login: Mutex<Option<TokenPair>>,
	turns: usize,
	calls: AtomicUsize,
	presented: Mutex<Vec<String>>,
	revoked: Mutex<Vec<String>>,
}
impl CountingExchange {
	pub fn new(refreshes: impl IntoIterator<Item = Result<TokenPair, ExchangeError>>) -> Arc<Self> {
		Arc::new(Self {
			refreshes: Mutex::new(refreshes.into_iter().collect()),
			login: Mutex::default(),
			turns: 4,
			calls: AtomicUsize::new(0),
			presented: Mutex::default(),
			revoked: Mutex::default(),
		})
	}

	pub fn rotating(access: &str, refresh: &str) -> Arc<Self> {
		Self::new([Ok(pair(access, refresh))])
	}

	pub fn rejecting() -> Arc<Self> {
		Self::new([Err(ExchangeError::Rejected {
			status: Some(401),
			reason: "Invalid refresh token".into(),
		})])
	}

	pub fn issue_on_login(&self, tokens: TokenPair) {
		*self.login.lock() = Some(tokens);
	}

	pub fn calls(&self) -> usize {
		self.calls.load(Ordering::SeqCst)
	}

	pub fn presented(&self) -> Vec<String> {
		self.presented.lock().clone()
	}

	pub fn revoked(&self) -> Vec<String> {
		self.revoked.lock().clone()
	}
}
impl CredentialExchange for CountingExchange {
	fn refresh<'a>(&'a self, refresh_token: &'a str) -> ExchangeFuture<'a, TokenPair> {
		Box::pin(async move {
			self.calls.fetch_add(1, Ordering::SeqCst);
			self.presented.lock().push(refresh_token.to_owned());

			for _ in 0..self.turns {
				tokio::task::yield_now().await;
			}

			self.refreshes.lock().pop_front().unwrap_or_else(|| {
				Err(ExchangeError::Rejected { status: Some(401), reason: "Token revoked".into() })
			})
		})
	}

	fn login<'a>(&'a self, _credentials: &'a Credentials) -> ExchangeFuture<'a, TokenPair> {
		Box::pin(async move {
			self.login.lock().clone().ok_or_else(|| ExchangeError::Rejected {
				status: Some(401),
				reason: "Incorrect email or password".into(),
			})
		})
	}

	fn revoke<'a>(&'a self, refresh_token: &'a str) -> ExchangeFuture<'a, ()> {
		Box::pin(async move {
			self.revoked.lock().push(refresh_token.to_owned());

			Ok(())
		})
	}
}

#[derive(Debug, Default)]
pub struct RecordingNavigator {
	current: Mutex<String>,
	history: Mutex<Vec<String>>,
}
impl RecordingNavigator {
	pub fn at(path: &str) -> Arc<Self> {
		Arc::new(Self { current: Mutex::new(path.into()), history: Mutex::default() })
	}

	pub fn history(&self) -> Vec<String> {
		self.history.lock().clone()
	}
}
impl Navigator for RecordingNavigator {
	fn current_path(&self) -> String {
		self.current.lock().clone()
	}

	fn navigate(&self, path: &str) {
		*self.current.lock() = path.into();

		self.history.lock().push(path.into());
	}
}

/// Shared storage area and broadcast hub of one application origin.
///
/// The origin's own handles act as an observer that sees every tab's signals.
#[derive(Default)]
pub struct Origin {
	pub storage: MemoryStorage,
	pub channel: MemoryBroadcast,
}
impl Origin {
	pub fn new() -> Self {
		Self::default()
	}

	/// Opens a tab displaying `location`.
	pub fn open_tab(
		&self,
		api: Arc<ScriptedApi>,
		exchange: Arc<CountingExchange>,
		location: &str,
	) -> (SessionManager, Arc<RecordingNavigator>) {
		let navigator = RecordingNavigator::at(location);
		let manager = SessionManager::with_backends(
			config(),
			SessionBackends {
				storage: Arc::new(self.storage.sibling()),
				broadcast: Some(Arc::new(self.channel.sibling())),
				transport: api,
				exchange,
			},
		)
		.with_navigator(navigator.clone());

		(manager, navigator)
	}

	/// Logout broadcasts observed since the last call.
	pub fn logouts(&self) -> usize {
		use tab_session::sync::BroadcastChannel;

		self.channel
			.take_messages()
			.iter()
			.filter(|raw| BroadcastEvent::parse(raw).is_some_and(|event| event.is_logout()))
			.count()
	}
}

/// Signs `manager` in locally without any network exchange.
pub fn sign_in(manager: &SessionManager, tokens: TokenPair, id: &str) {
	manager.store().set_tokens(Some(tokens));
	manager.store().set_user(Some(user(id)));
}
