//! Access/refresh token pair issued by the credential-exchange service.

// self
use crate::{_prelude::*, auth::token::secret::TokenSecret};

/// Credentials held by a session: a short-lived access token and the refresh token used to
/// renew it.
///
/// The serialized form matches the persisted snapshot layout:
/// `{"access_token": "...", "refresh_token": "...", "expires_in": 3600}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
	/// Bearer credential attached to outgoing requests.
	pub access_token: TokenSecret,
	/// Renewal credential; absent or empty values disable renewal.
	#[serde(default)]
	pub refresh_token: Option<TokenSecret>,
	/// Lifetime of the access token in seconds, as reported at issue time.
	#[serde(default)]
	pub expires_in: u64,
}
impl TokenPair {
	/// Creates a pair carrying both secrets.
	pub fn new(access: impl Into<String>, refresh: impl Into<String>, expires_in: u64) -> Self {
		Self {
			access_token: TokenSecret::new(access),
			refresh_token: Some(TokenSecret::new(refresh)),
			expires_in,
		}
	}

	/// Creates a pair that cannot be renewed.
	pub fn access_only(access: impl Into<String>, expires_in: u64) -> Self {
		Self { access_token: TokenSecret::new(access), refresh_token: None, expires_in }
	}

	/// Returns the refresh secret when one is present and non-empty.
	pub fn refresh_secret(&self) -> Option<&str> {
		self.refresh_token.as_ref().map(TokenSecret::expose).filter(|value| !value.is_empty())
	}
}
