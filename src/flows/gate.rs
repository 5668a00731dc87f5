//! Credential attachment and the renew-then-replay-once policy for API calls.

// crates.io
use serde::de::DeserializeOwned;
// self
use crate::{
	_prelude::*,
	error::TransportError,
	flows::RefreshCoordinator,
	http::{ApiRequest, ApiResponse, Transport},
	obs::{FlowKind, FlowOutcome, FlowSpan, obs_event},
	session::TokenStore,
};

/// Sends API requests on behalf of the session.
///
/// Every request carries the stored access token. A `401` answer triggers one renewal through the
/// [`RefreshCoordinator`] and exactly one replay with the renewed credential; a `401` on the
/// replay is final.
#[derive(Clone)]
pub struct RequestGate {
	store: Arc<TokenStore>,
	transport: Arc<dyn Transport>,
	coordinator: Arc<RefreshCoordinator>,
}
impl RequestGate {
	/// Creates a gate over the given collaborators.
	pub fn new(
		store: Arc<TokenStore>,
		transport: Arc<dyn Transport>,
		coordinator: Arc<RefreshCoordinator>,
	) -> Self {
		Self { store, transport, coordinator }
	}

	/// Transport requests are sent through.
	pub fn transport(&self) -> &Arc<dyn Transport> {
		&self.transport
	}

	/// Sends `request`, renewing the credential and replaying once on `401`.
	pub async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
		const KIND: FlowKind = FlowKind::Request;

		let span = FlowSpan::new(KIND, "send");

		span.record(FlowOutcome::Attempt);

		let result = span.instrument(self.dispatch(request)).await;

		span.finish(&result);

		result
	}

	/// Sends a `GET` and decodes the JSON answer.
	pub async fn get_json<T>(&self, path: &str) -> Result<T>
	where
		T: DeserializeOwned,
	{
		self.send(ApiRequest::get(path)).await?.json()
	}

	/// Sends a `POST` with a JSON body and decodes the JSON answer.
	pub async fn post_json<T, B>(&self, path: &str, body: &B) -> Result<T>
	where
		T: DeserializeOwned,
		B: ?Sized + Serialize,
	{
		let body = serde_json::to_value(body)
			.map_err(|e| TransportError::InvalidRequest { message: e.to_string() })?;

		self.send(ApiRequest::post(path).json(body)).await?.json()
	}

	async fn dispatch(&self, mut request: ApiRequest) -> Result<ApiResponse> {
		let presented = self.store.get().access_token().map(str::to_owned);

		if presented.is_some() {
			request.authorize(presented.as_deref());
		}

		let response = self.transport.send(request.clone()).await?;

		if !response.is_unauthorized() {
			return accept(response);
		}
		if request.retried {
			return Err(Error::Unauthorized { status: response.status });
		}

		obs_event!(debug, path = %request.path, "request unauthorized; renewing access token");

		let renewed = self.coordinator.renew(presented.as_deref()).await?;

		request.retried = true;
		request.authorize(Some(renewed.access_token.expose()));

		let replay = self.transport.send(request).await?;

		if replay.is_unauthorized() {
			return Err(Error::Unauthorized { status: replay.status });
		}

		accept(replay)
	}
}
impl Debug for RequestGate {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RequestGate").field("coordinator", &self.coordinator).finish()
	}
}

fn accept(response: ApiResponse) -> Result<ApiResponse> {
	if response.is_success() {
		return Ok(response);
	}

	let detail = response.detail().unwrap_or_else(|| format!("HTTP {}", response.status));

	Err(Error::Api { status: response.status, detail })
}

#[cfg(test)]
mod tests {
	// std
	use std::time::Duration as StdDuration;
	// self
	use super::*;
	use crate::{
		_preludet::*,
		auth::TokenPair,
		config::StorageKeys,
		error::RefreshError,
		exchange::ExchangeError,
		http::TransportFuture,
		store::MemoryStorage,
	};

	// Answers 200 for the accepted bearer, 401 otherwise, and 403 for `/forbidden`.
	struct BearerCheck {
		accepted: String,
		requests: Mutex<Vec<ApiRequest>>,
	}
	impl BearerCheck {
		fn accepting(token: &str) -> Arc<Self> {
			Arc::new(Self { accepted: token.into(), requests: Mutex::default() })
		}

		fn bearers(&self) -> Vec<Option<String>> {
			self.requests.lock().iter().map(|request| request.bearer().map(str::to_owned)).collect()
		}
	}
	impl Transport for BearerCheck {
		fn send(&self, request: ApiRequest) -> TransportFuture<'_> {
			let response = if request.path == "/forbidden" {
				ApiResponse::json_body(403, &serde_json::json!({"detail": "Not enough privileges"}))
			} else if request.bearer() == Some(self.accepted.as_str()) {
				ApiResponse::json_body(200, &serde_json::json!({"id": "u1", "count": 2}))
			} else {
				ApiResponse::json_body(401, &serde_json::json!({"detail": "Could not validate credentials"}))
			};

			self.requests.lock().push(request);

			Box::pin(async move { Ok(response) })
		}
	}

	fn gate(
		tokens: TokenPair,
		transport: Arc<BearerCheck>,
		exchange: Arc<FixedExchange>,
	) -> (RequestGate, Arc<TokenStore>) {
		let store =
			Arc::new(TokenStore::open(Arc::new(MemoryStorage::new()), StorageKeys::default()));

		store.set_tokens(Some(tokens));
		store.set_user(Some(user("u1")));

		let coordinator = Arc::new(RefreshCoordinator::new(store.clone(), exchange));

		(RequestGate::new(store.clone(), transport, coordinator), store)
	}

	#[tokio::test]
	async fn valid_credentials_pass_without_renewal() {
		let transport = BearerCheck::accepting("a1");
		let exchange = Arc::new(FixedExchange::succeeding(pair("a2", "r2")));
		let (gate, _store) = gate(pair("a1", "r1"), transport.clone(), exchange.clone());
		let response = gate.send(ApiRequest::get("/api/v1/items")).await.expect("Request should pass.");

		assert_eq!(response.status, 200);
		assert_eq!(transport.bearers(), vec![Some("a1".to_owned())]);
		assert_eq!(exchange.calls(), 0);
	}

	#[tokio::test]
	async fn unauthorized_requests_renew_and_replay_once() {
		let transport = BearerCheck::accepting("a2");
		let exchange = Arc::new(FixedExchange::succeeding(pair("a2", "r2")));
		let (gate, store) = gate(pair("a1", "r1"), transport.clone(), exchange.clone());
		let response = gate.send(ApiRequest::get("/api/v1/items")).await.expect("Replay should pass.");

		assert_eq!(response.status, 200);
		assert_eq!(transport.bearers(), vec![Some("a1".to_owned()), Some("a2".to_owned())]);
		assert!(transport.requests.lock()[1].retried);
		assert_eq!(store.get().access_token(), Some("a2"));
		assert_eq!(exchange.calls(), 1);
	}

	#[tokio::test]
	async fn a_second_unauthorized_answer_is_final() {
		let transport = BearerCheck::accepting("never");
		let exchange = Arc::new(FixedExchange::succeeding(pair("a2", "r2")));
		let (gate, _store) = gate(pair("a1", "r1"), transport.clone(), exchange.clone());
		let err = gate.send(ApiRequest::get("/api/v1/items")).await.expect_err("Replay should fail.");

		assert!(matches!(err, Error::Unauthorized { status: 401 }));
		assert_eq!(transport.requests.lock().len(), 2);
		assert_eq!(exchange.calls(), 1);
	}

	#[tokio::test]
	async fn concurrent_unauthorized_requests_share_one_renewal() {
		let transport = BearerCheck::accepting("a2");
		let exchange = Arc::new(
			FixedExchange::succeeding(pair("a2", "r2")).with_delay(StdDuration::from_millis(20)),
		);
		let (gate, _store) = gate(pair("a1", "r1"), transport.clone(), exchange.clone());
		let (first, second) =
			tokio::join!(gate.send(ApiRequest::get("/a")), gate.send(ApiRequest::get("/b")));

		assert_eq!(first.expect("First request should pass.").status, 200);
		assert_eq!(second.expect("Second request should pass.").status, 200);
		assert_eq!(exchange.calls(), 1);
		assert_eq!(transport.bearers().iter().filter(|bearer| bearer.as_deref() == Some("a2")).count(), 2);
	}

	#[tokio::test]
	async fn renewal_failures_surface_and_sign_out() {
		let transport = BearerCheck::accepting("a2");
		let exchange = Arc::new(FixedExchange::failing(ExchangeError::Rejected {
			status: Some(401),
			reason: "expired".into(),
		}));
		let (gate, store) = gate(pair("a1", "r1"), transport.clone(), exchange);
		let err = gate.send(ApiRequest::get("/api/v1/items")).await.expect_err("Renewal should fail.");

		assert!(matches!(err, Error::Refresh(RefreshError::Rejected { .. })));
		assert_eq!(transport.requests.lock().len(), 1);
		assert!(store.get().is_anonymous());
	}

	#[tokio::test]
	async fn other_failures_carry_the_server_detail() {
		let transport = BearerCheck::accepting("a1");
		let exchange = Arc::new(FixedExchange::succeeding(pair("a2", "r2")));
		let (gate, _store) = gate(pair("a1", "r1"), transport, exchange.clone());
		let err = gate.send(ApiRequest::delete("/forbidden")).await.expect_err("403 should fail.");

		match err {
			Error::Api { status, detail } => {
				assert_eq!(status, 403);
				assert_eq!(detail, "Not enough privileges");
			},
			other => panic!("Unexpected error: {other:?}"),
		}

		assert_eq!(exchange.calls(), 0);
	}

	#[tokio::test]
	async fn json_helpers_decode_answers() {
		#[derive(Debug, Deserialize)]
		struct Item {
			id: String,
			count: u32,
		}

		let transport = BearerCheck::accepting("a1");
		let exchange = Arc::new(FixedExchange::succeeding(pair("a2", "r2")));
		let (gate, _store) = gate(pair("a1", "r1"), transport.clone(), exchange);
		let item = gate.get_json::<Item>("/api/v1/items/u1").await.expect("Item should decode.");

		assert_eq!((item.id.as_str(), item.count), ("u1", 2));

		let created = gate
			.post_json::<Item, _>("/api/v1/items", &serde_json::json!({"title": "x"}))
			.await
			.expect("Created item should decode.");

		assert_eq!(created.count, 2);
		assert_eq!(
			transport.requests.lock()[1].body,
			Some(serde_json::json!({"title": "x"}))
		);
	}
}
