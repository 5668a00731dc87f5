//! Immutable session snapshots and their persisted layout.

// self
use crate::{
	_prelude::*,
	auth::{TokenPair, User},
};

/// Complete, consistent view of identity and credentials at a point in time.
///
/// `is_authenticated` always equals `user.is_some()`: the flag is recomputed whenever a snapshot
/// is built or deserialized, so a persisted payload that disagrees is normalized rather than
/// trusted. A token pair may be present while unauthenticated (tokens are stored before the
/// profile is fetched).
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "PersistedSnapshot")]
pub struct SessionSnapshot {
	user: Option<User>,
	tokens: Option<TokenPair>,
	#[serde(rename = "isAuthenticated")]
	is_authenticated: bool,
}
impl SessionSnapshot {
	/// The anonymous snapshot: no user, no tokens.
	pub fn anonymous() -> Self {
		Self::default()
	}

	/// Builds a snapshot from its parts, deriving the authenticated flag.
	pub fn new(user: Option<User>, tokens: Option<TokenPair>) -> Self {
		let is_authenticated = user.is_some();

		Self { user, tokens, is_authenticated }
	}

	/// Parses a persisted snapshot, returning `None` for malformed payloads.
	pub fn from_json(raw: &str) -> Option<Self> {
		serde_json::from_str(raw).ok()
	}

	/// Current user profile, if signed in.
	pub fn user(&self) -> Option<&User> {
		self.user.as_ref()
	}

	/// Current token pair, if any.
	pub fn tokens(&self) -> Option<&TokenPair> {
		self.tokens.as_ref()
	}

	/// Whether a user profile is present.
	pub fn is_authenticated(&self) -> bool {
		self.is_authenticated
	}

	/// Whether the signed-in user is an administrator.
	pub fn is_admin(&self) -> bool {
		self.user.as_ref().is_some_and(|user| user.is_admin)
	}

	/// Whether this is the anonymous snapshot.
	pub fn is_anonymous(&self) -> bool {
		self.user.is_none() && self.tokens.is_none()
	}

	/// Access token currently attached to requests.
	pub fn access_token(&self) -> Option<&str> {
		self.tokens.as_ref().map(|pair| pair.access_token.expose())
	}

	/// Refresh token available for renewal, ignoring empty values.
	pub fn refresh_token(&self) -> Option<&str> {
		self.tokens.as_ref().and_then(TokenPair::refresh_secret)
	}

	pub(crate) fn with_user(self, user: Option<User>) -> Self {
		Self::new(user, self.tokens)
	}

	pub(crate) fn with_tokens(self, tokens: Option<TokenPair>) -> Self {
		Self::new(self.user, tokens)
	}
}
impl From<PersistedSnapshot> for SessionSnapshot {
	fn from(value: PersistedSnapshot) -> Self {
		Self::new(value.user, value.tokens)
	}
}

// The stored `isAuthenticated` flag is ignored on read.
#[derive(Deserialize)]
struct PersistedSnapshot {
	#[serde(default)]
	user: Option<User>,
	#[serde(default)]
	tokens: Option<TokenPair>,
}
