//! Single-flight access-token renewal.
//!
//! The coordinator is either Idle or Refreshing. While Refreshing, the in-flight episode is an
//! [`OnceCell`] that every caller awaits, so any number of concurrent renewals collapse into one
//! exchange and all of them observe the same outcome. The episode settles exactly once: on
//! success the new pair is written to the store, on any failure the store is cleared. Callers
//! presenting a stale access token after an episode already replaced it get the current pair
//! back without a new exchange.

mod metrics;

pub use metrics::RefreshMetrics;

// crates.io
use async_lock::OnceCell;
// self
use crate::{
	_prelude::*,
	auth::TokenPair,
	error::RefreshError,
	exchange::CredentialExchange,
	obs::{FlowKind, FlowOutcome, FlowSpan, obs_event},
	session::TokenStore,
};

type Episode = Arc<OnceCell<Result<TokenPair, RefreshError>>>;

/// Serializes renewals of one context's access token.
pub struct RefreshCoordinator {
	store: Arc<TokenStore>,
	exchange: Arc<dyn CredentialExchange>,
	episode: Mutex<Option<Episode>>,
	metrics: Arc<RefreshMetrics>,
}
impl RefreshCoordinator {
	/// Creates an idle coordinator renewing `store`'s tokens through `exchange`.
	pub fn new(store: Arc<TokenStore>, exchange: Arc<dyn CredentialExchange>) -> Self {
		Self { store, exchange, episode: Mutex::new(None), metrics: Arc::default() }
	}

	/// Shared counters for this coordinator.
	pub fn metrics(&self) -> &Arc<RefreshMetrics> {
		&self.metrics
	}

	/// Whether an episode is in flight.
	pub fn is_refreshing(&self) -> bool {
		self.episode.lock().is_some()
	}

	/// Obtains an access token newer than `stale_access_token`.
	///
	/// Joins the in-flight episode when there is one. When idle and the store already holds a
	/// different access token, returns the stored pair. Otherwise starts an episode.
	pub async fn renew(&self, stale_access_token: Option<&str>) -> Result<TokenPair, RefreshError> {
		const KIND: FlowKind = FlowKind::Refresh;

		let span = FlowSpan::new(KIND, "renew");

		span.record(FlowOutcome::Attempt);
		self.metrics.record_attempt();

		let result = span
			.instrument(async move {
				let episode = match self.join_or_start(stale_access_token) {
					Ok(episode) => episode,
					Err(current) => return Ok(current),
				};

				episode.get_or_init(|| self.run_episode(&episode)).await.clone()
			})
			.await;

		span.finish(&result);

		result
	}

	// `Err` carries a pair that already supersedes the stale token.
	fn join_or_start(&self, stale_access_token: Option<&str>) -> Result<Episode, TokenPair> {
		let mut slot = self.episode.lock();

		if let Some(episode) = slot.as_ref() {
			self.metrics.record_join();

			return Ok(episode.clone());
		}
		if let Some(current) = self
			.store
			.get()
			.tokens()
			.filter(|pair| Some(pair.access_token.expose()) != stale_access_token)
		{
			self.metrics.record_superseded();

			return Err(current.clone());
		}

		let episode = Arc::new(OnceCell::new());

		*slot = Some(episode.clone());

		Ok(episode)
	}

	async fn run_episode(&self, episode: &Episode) -> Result<TokenPair, RefreshError> {
		let snapshot = self.store.get();
		let outcome = match snapshot.refresh_token() {
			None => {
				obs_event!(info, "no refresh token available; signing out");

				if !snapshot.is_anonymous() {
					self.store.clear();
				}

				Err(RefreshError::MissingRefreshToken)
			},
			Some(refresh_token) => {
				let refresh_token = refresh_token.to_owned();

				self.metrics.record_exchange();

				match self.exchange.refresh(&refresh_token).await {
					Ok(pair) => self.install(&refresh_token, pair),
					Err(e) => {
						obs_event!(warn, error = %e, "refresh exchange failed; signing out");

						self.store.clear();

						Err(RefreshError::from(e))
					},
				}
			},
		};

		self.metrics.record_settled(outcome.is_ok());
		self.settle(episode);

		outcome
	}

	fn install(&self, presented: &str, mut pair: TokenPair) -> Result<TokenPair, RefreshError> {
		let current = self.store.get();

		if current.refresh_token() != Some(presented) {
			// The session was replaced or cleared while the exchange was in flight.
			return current.tokens().cloned().ok_or(RefreshError::MissingRefreshToken);
		}
		if pair.refresh_secret().is_none() {
			pair.refresh_token = current.tokens().and_then(|tokens| tokens.refresh_token.clone());
		}

		self.store.set_tokens(Some(pair.clone()));

		obs_event!(debug, access = %pair.access_token.fingerprint(), "access token renewed");

		Ok(pair)
	}

	fn settle(&self, episode: &Episode) {
		let mut slot = self.episode.lock();

		if slot.as_ref().is_some_and(|current| Arc::ptr_eq(current, episode)) {
			*slot = None;
		}
	}
}
impl Debug for RefreshCoordinator {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RefreshCoordinator")
			.field("refreshing", &self.is_refreshing())
			.field("metrics", &self.metrics)
			.finish()
	}
}
