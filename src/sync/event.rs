//! Cross-tab broadcast messages.

// crates.io
use rand::Rng;
// self
use crate::_prelude::*;

/// Kind of a cross-tab broadcast message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BroadcastKind {
	/// A context signed out; every sibling must drop its session.
	Logout,
	/// A context changed its session; siblings should reconcile from storage.
	StateChanged,
}
impl BroadcastKind {
	/// Wire label of the kind.
	pub const fn as_str(self) -> &'static str {
		match self {
			BroadcastKind::Logout => "logout",
			BroadcastKind::StateChanged => "stateChanged",
		}
	}
}
impl Display for BroadcastKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Small, fire-and-forget message exchanged between contexts of one origin.
///
/// Wire form: `{"type": "logout", "timestamp": 1700000000000, "nonce": "9f1c..."}`. The nonce is
/// only attached to logout markers so identical consecutive logouts still change the stored value.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BroadcastEvent {
	/// Message kind.
	#[serde(rename = "type")]
	pub kind: BroadcastKind,
	/// Emission time in unix milliseconds.
	pub timestamp: i64,
	/// Random discriminator.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub nonce: Option<String>,
}
impl BroadcastEvent {
	/// Builds an event of `kind` stamped with the current time.
	pub fn new(kind: BroadcastKind) -> Self {
		Self { kind, timestamp: now_millis(), nonce: None }
	}

	/// Builds a logout event.
	pub fn logout() -> Self {
		Self::new(BroadcastKind::Logout)
	}

	/// Builds a state-changed hint.
	pub fn state_changed() -> Self {
		Self::new(BroadcastKind::StateChanged)
	}

	/// Attaches a fresh random nonce.
	pub fn with_nonce(mut self) -> Self {
		self.nonce = Some(format!("{:016x}", rand::rng().random::<u64>()));

		self
	}

	/// Parses a received payload, returning `None` when it is not a broadcast event.
	pub fn parse(raw: &str) -> Option<Self> {
		serde_json::from_str(raw).ok()
	}

	/// Serializes the event to its wire form.
	pub fn to_json(&self) -> Result<String, serde_json::Error> {
		serde_json::to_string(self)
	}

	/// Whether this is a logout event.
	pub fn is_logout(&self) -> bool {
		self.kind == BroadcastKind::Logout
	}
}

fn now_millis() -> i64 {
	(OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn wire_form_uses_type_and_camel_case_kinds() {
		let json = serde_json::to_value(BroadcastEvent::state_changed())
			.expect("Event should serialize.");

		assert_eq!(json["type"], serde_json::json!("stateChanged"));
		assert!(json["timestamp"].as_i64().is_some_and(|ts| ts > 1_600_000_000_000));
		assert!(json.get("nonce").is_none());
	}

	#[test]
	fn nonces_distinguish_consecutive_logouts() {
		let first = BroadcastEvent::logout().with_nonce();
		let second = BroadcastEvent::logout().with_nonce();

		assert_ne!(first.nonce, second.nonce);
		assert_eq!(first.nonce.as_deref().map(str::len), Some(16));
	}

	#[test]
	fn parse_accepts_foreign_payloads_and_rejects_garbage() {
		let parsed = BroadcastEvent::parse(r#"{"type":"logout","timestamp":1}"#)
			.expect("Minimal logout payload should parse.");

		assert!(parsed.is_logout());
		assert_eq!(BroadcastEvent::parse(r#"{"type":"login","timestamp":1}"#), None);
		assert_eq!(BroadcastEvent::parse("logout"), None);
	}
}
