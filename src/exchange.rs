//! Credential-exchange service seam: trading credentials or refresh tokens for token pairs.
//!
//! [`HttpExchange`] speaks the JSON auth endpoints over any [`Transport`]; failures are sorted
//! into rejections and transient faults by [`classify_failure`], which looks at the response
//! body first and falls back to the status code.

// self
use crate::{
	_prelude::*,
	auth::TokenPair,
	config::AuthEndpoints,
	error::TransportError,
	http::{ApiRequest, ApiResponse, Transport},
};

/// Future returned by [`CredentialExchange`] operations.
pub type ExchangeFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, ExchangeError>> + 'a + Send>>;

/// External service that issues and revokes token pairs.
pub trait CredentialExchange
where
	Self: 'static + Send + Sync,
{
	/// Exchanges `refresh_token` for a fresh pair.
	fn refresh<'a>(&'a self, refresh_token: &'a str) -> ExchangeFuture<'a, TokenPair>;

	/// Exchanges user credentials for a pair.
	fn login<'a>(&'a self, credentials: &'a Credentials) -> ExchangeFuture<'a, TokenPair>;

	/// Revokes `refresh_token` server-side.
	fn revoke<'a>(&'a self, refresh_token: &'a str) -> ExchangeFuture<'a, ()>;
}

/// Failure reported by a [`CredentialExchange`].
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum ExchangeError {
	/// The service refused the presented credential.
	#[error("Credential was rejected: {reason}.")]
	Rejected {
		/// HTTP status, when available.
		status: Option<u16>,
		/// Service-supplied reason.
		reason: String,
	},
	/// The service failed in a way that may succeed later.
	#[error("Credential exchange failed temporarily: {message}.")]
	Transient {
		/// HTTP status, when available.
		status: Option<u16>,
		/// Human-readable summary.
		message: String,
		/// Server-provided retry hint, when present.
		retry_after: Option<Duration>,
	},
	/// The service could not be reached.
	#[error("Credential exchange could not reach the service: {message}.")]
	Transport {
		/// Human-readable summary.
		message: String,
	},
	/// The service answered successfully with an unusable body.
	#[error("Credential exchange returned a malformed response: {message}.")]
	Malformed {
		/// HTTP status, when available.
		status: Option<u16>,
		/// Parse failure.
		message: String,
	},
}
impl ExchangeError {
	/// Whether the service explicitly refused the credential.
	pub fn is_rejection(&self) -> bool {
		matches!(self, ExchangeError::Rejected { .. })
	}

	/// HTTP status attached to the failure, when known.
	pub fn status(&self) -> Option<u16> {
		match self {
			ExchangeError::Rejected { status, .. }
			| ExchangeError::Transient { status, .. }
			| ExchangeError::Malformed { status, .. } => *status,
			ExchangeError::Transport { .. } => None,
		}
	}

	/// How long the service asked the caller to wait before trying again.
	pub fn retry_after(&self) -> Option<Duration> {
		match self {
			ExchangeError::Transient { retry_after, .. } => *retry_after,
			_ => None,
		}
	}
}
impl From<TransportError> for ExchangeError {
	fn from(e: TransportError) -> Self {
		Self::Transport { message: e.to_string() }
	}
}

/// Email and password presented to the sign-in endpoint.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
	/// Account email.
	pub email: String,
	/// Account password.
	pub password: String,
}
impl Credentials {
	/// Creates a credential set.
	pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
		Self { email: email.into(), password: password.into() }
	}
}
impl Debug for Credentials {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Credentials")
			.field("email", &self.email)
			.field("password", &"<redacted>")
			.finish()
	}
}

/// Token endpoint response body.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenResponse {
	/// Issued access token.
	pub access_token: String,
	/// Issued (possibly rotated) refresh token.
	#[serde(default)]
	pub refresh_token: Option<String>,
	/// Token type, normally `bearer`.
	#[serde(default = "default_token_type")]
	pub token_type: String,
	/// Access-token lifetime in seconds.
	#[serde(default)]
	pub expires_in: u64,
}
impl TokenResponse {
	/// Validates the response and converts it into a [`TokenPair`].
	pub fn into_pair(self) -> Result<TokenPair, ExchangeError> {
		if self.access_token.trim().is_empty() {
			return Err(ExchangeError::Malformed {
				status: None,
				message: "access_token is empty".into(),
			});
		}
		if !self.token_type.eq_ignore_ascii_case("bearer") {
			return Err(ExchangeError::Malformed {
				status: None,
				message: format!("unsupported token_type `{}`", self.token_type),
			});
		}

		Ok(match self.refresh_token {
			Some(refresh) => TokenPair::new(self.access_token, refresh, self.expires_in),
			None => TokenPair::access_only(self.access_token, self.expires_in),
		})
	}
}

fn default_token_type() -> String {
	"bearer".into()
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum FailureKind {
	Rejected,
	Transient,
}

const BODY_PREVIEW_LIMIT: usize = 256;

/// Classifies a non-success exchange response.
///
/// Recognizable phrases in the body win (`invalid_grant`, `expired`, `revoked` reject;
/// `temporarily_unavailable`, `retry` are transient). Otherwise 4xx statuses other than
/// 408/429 are rejections and everything else is transient.
pub fn classify_failure(response: &ApiResponse) -> ExchangeError {
	let text = response.text();
	let reason = response.detail().unwrap_or_else(|| preview(&text, response.status));
	let status = Some(response.status);

	match classify_body(&text).unwrap_or_else(|| classify_status(response.status)) {
		FailureKind::Rejected => ExchangeError::Rejected { status, reason },
		FailureKind::Transient =>
			ExchangeError::Transient { status, message: reason, retry_after: response.retry_after },
	}
}

fn classify_body(body: &str) -> Option<FailureKind> {
	let lowered = body.to_ascii_lowercase();

	match lowered.as_str() {
		text if text.contains("invalid_grant")
			|| text.contains("expired")
			|| text.contains("revoked")
			|| text.contains("invalid refresh") =>
			Some(FailureKind::Rejected),
		text if text.contains("temporarily_unavailable") || text.contains("retry") =>
			Some(FailureKind::Transient),
		_ => None,
	}
}

fn classify_status(status: u16) -> FailureKind {
	match status {
		408 | 429 => FailureKind::Transient,
		400..=499 => FailureKind::Rejected,
		_ => FailureKind::Transient,
	}
}

fn preview(body: &str, status: u16) -> String {
	let trimmed = body.trim();

	if trimmed.is_empty() {
		return format!("HTTP {status}");
	}
	if trimmed.chars().count() <= BODY_PREVIEW_LIMIT {
		return trimmed.to_owned();
	}

	let mut buf = trimmed.chars().take(BODY_PREVIEW_LIMIT).collect::<String>();

	buf.push('…');

	buf
}

/// [`CredentialExchange`] over the JSON auth endpoints.
pub struct HttpExchange {
	transport: Arc<dyn Transport>,
	endpoints: AuthEndpoints,
}
impl HttpExchange {
	/// Creates an exchange sending through `transport` to `endpoints`.
	pub fn new(transport: Arc<dyn Transport>, endpoints: AuthEndpoints) -> Self {
		Self { transport, endpoints }
	}

	/// Endpoint paths in use.
	pub fn endpoints(&self) -> &AuthEndpoints {
		&self.endpoints
	}

	async fn token_call(&self, request: ApiRequest) -> Result<TokenPair, ExchangeError> {
		let response = self.transport.send(request).await?;

		if !response.is_success() {
			return Err(classify_failure(&response));
		}

		let body = response.json::<TokenResponse>().map_err(|e| ExchangeError::Malformed {
			status: Some(response.status),
			message: match e {
				Error::Decode { source, .. } => format!("{} at `{}`", source.inner(), source.path()),
				other => other.to_string(),
			},
		})?;

		body.into_pair().map_err(|e| match e {
			ExchangeError::Malformed { message, .. } =>
				ExchangeError::Malformed { status: Some(response.status), message },
			other => other,
		})
	}
}
impl CredentialExchange for HttpExchange {
	fn refresh<'a>(&'a self, refresh_token: &'a str) -> ExchangeFuture<'a, TokenPair> {
		Box::pin(async move {
			let request = ApiRequest::post(&self.endpoints.refresh)
				.json(serde_json::json!({ "refresh_token": refresh_token }));

			self.token_call(request).await
		})
	}

	fn login<'a>(&'a self, credentials: &'a Credentials) -> ExchangeFuture<'a, TokenPair> {
		Box::pin(async move {
			let body = serde_json::to_value(credentials).map_err(|e| ExchangeError::Malformed {
				status: None,
				message: e.to_string(),
			})?;

			self.token_call(ApiRequest::post(&self.endpoints.login).json(body)).await
		})
	}

	fn revoke<'a>(&'a self, refresh_token: &'a str) -> ExchangeFuture<'a, ()> {
		Box::pin(async move {
			let request = ApiRequest::post(&self.endpoints.logout)
				.json(serde_json::json!({ "refresh_token": refresh_token }));
			let response = self.transport.send(request).await?;

			if response.is_success() { Ok(()) } else { Err(classify_failure(&response)) }
		})
	}
}
impl Debug for HttpExchange {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("HttpExchange").field("endpoints", &self.endpoints).finish()
	}
}
