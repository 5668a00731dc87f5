// std
use std::sync::atomic::{AtomicU64, Ordering::Relaxed};

/// Counters describing how renewals were served.
///
/// `attempts` counts every call to renew. Each one is then either `joined` onto an in-flight
/// episode, `superseded` by a pair already newer than the caller's token, or the starter of an
/// episode that performs one exchange.
#[derive(Debug, Default)]
pub struct RefreshMetrics {
	attempts: AtomicU64,
	joined: AtomicU64,
	superseded: AtomicU64,
	exchanges: AtomicU64,
	settled_ok: AtomicU64,
	settled_err: AtomicU64,
}
impl RefreshMetrics {
	/// Renewal requests received.
	pub fn attempts(&self) -> u64 {
		self.attempts.load(Relaxed)
	}

	/// Requests that awaited an episode another caller started.
	pub fn joined(&self) -> u64 {
		self.joined.load(Relaxed)
	}

	/// Requests answered with the stored pair because it already replaced the stale token.
	pub fn superseded(&self) -> u64 {
		self.superseded.load(Relaxed)
	}

	/// Exchanges sent to the credential service.
	pub fn exchanges(&self) -> u64 {
		self.exchanges.load(Relaxed)
	}

	/// Episodes that installed a fresh pair.
	pub fn successes(&self) -> u64 {
		self.settled_ok.load(Relaxed)
	}

	/// Episodes that ended by signing the context out.
	pub fn failures(&self) -> u64 {
		self.settled_err.load(Relaxed)
	}

	pub(crate) fn record_attempt(&self) {
		self.attempts.fetch_add(1, Relaxed);
	}

	pub(crate) fn record_join(&self) {
		self.joined.fetch_add(1, Relaxed);
	}

	pub(crate) fn record_superseded(&self) {
		self.superseded.fetch_add(1, Relaxed);
	}

	pub(crate) fn record_exchange(&self) {
		self.exchanges.fetch_add(1, Relaxed);
	}

	pub(crate) fn record_settled(&self, ok: bool) {
		let counter = if ok { &self.settled_ok } else { &self.settled_err };

		counter.fetch_add(1, Relaxed);
	}
}
