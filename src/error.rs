//! Session-level error types shared across the store, gate, coordinator, and flows.

// self
use crate::_prelude::*;

/// Session-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Canonical error exposed by public APIs.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Storage-layer failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		crate::store::StoreError,
	),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Transport failure (DNS, TCP, TLS, timeout).
	#[error(transparent)]
	Transport(#[from] TransportError),
	/// Credential-exchange service failure outside of a refresh episode (login, revoke).
	#[error(transparent)]
	Exchange(#[from] crate::exchange::ExchangeError),
	/// Access-token renewal failed; the session has been invalidated.
	#[error(transparent)]
	Refresh(#[from] RefreshError),

	/// The request was still unauthorized after its single replay, or was not eligible for one.
	#[error("Request was rejected as unauthorized (status {status}).")]
	Unauthorized {
		/// HTTP status returned by the API.
		status: u16,
	},
	/// API answered with a non-success status other than unauthorized.
	#[error("API request failed with status {status}: {detail}.")]
	Api {
		/// HTTP status returned by the API.
		status: u16,
		/// Server-supplied detail message, or a generic placeholder.
		detail: String,
	},
	/// API response body could not be decoded into the requested type.
	#[error("API response could not be decoded.")]
	Decode {
		/// Structured parsing failure naming the offending path.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
	/// Operation requires an authenticated session.
	#[error("No authenticated session is available.")]
	NotAuthenticated,
}

/// Configuration and validation failures.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// Session configuration failed validation.
	#[error(transparent)]
	Session(#[from] crate::config::SessionConfigError),
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Transport-level failures (network, IO, timeouts).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the API.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// The ambient transport timeout elapsed.
	#[error("Request timed out while calling the API.")]
	Timeout,
	/// Request could not be assembled (bad path, unsupported body).
	#[error("Request could not be built: {message}.")]
	InvalidRequest {
		/// Human-readable reason.
		message: String,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while calling the API.")]
	Io(#[from] std::io::Error),
}
impl TransportError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::Network { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		if e.is_timeout() {
			return Self::Timeout;
		}
		if e.is_builder() {
			return Self::InvalidRequest { message: e.to_string() };
		}

		Self::network(e)
	}
}

/// Outcome of a failed refresh episode, handed to every caller joined to it.
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum RefreshError {
	/// No refresh token was available; the exchange service was not contacted.
	#[error("No refresh token is available; the session was cleared.")]
	MissingRefreshToken,
	/// Exchange service rejected the refresh token as invalid or expired.
	#[error("Refresh token was rejected: {reason}.")]
	Rejected {
		/// Service-supplied reason string.
		reason: String,
	},
	/// Exchange service was unreachable, timed out, or failed temporarily.
	#[error("Refresh exchange failed: {message}.")]
	Transport {
		/// Human-readable failure summary.
		message: String,
	},
	/// Exchange service answered with a body that is not a token pair.
	#[error("Refresh exchange returned a malformed response: {message}.")]
	Malformed {
		/// Human-readable parse failure.
		message: String,
	},
}
impl From<crate::exchange::ExchangeError> for RefreshError {
	fn from(e: crate::exchange::ExchangeError) -> Self {
		use crate::exchange::ExchangeError;

		match e {
			ExchangeError::Rejected { reason, .. } => Self::Rejected { reason },
			ExchangeError::Transient { message, .. } | ExchangeError::Transport { message } =>
				Self::Transport { message },
			ExchangeError::Malformed { message, .. } => Self::Malformed { message },
		}
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::exchange::ExchangeError;

	#[test]
	fn exchange_errors_collapse_into_refresh_errors() {
		let rejected = ExchangeError::Rejected { status: Some(401), reason: "expired".into() };

		assert_eq!(RefreshError::from(rejected), RefreshError::Rejected { reason: "expired".into() });

		let transient = ExchangeError::Transient {
			status: Some(503),
			message: "busy".into(),
			retry_after: Some(Duration::seconds(5)),
		};

		assert_eq!(RefreshError::from(transient), RefreshError::Transport { message: "busy".into() });
	}

	#[test]
	fn refresh_error_converts_into_session_error_with_source() {
		let error: Error = RefreshError::MissingRefreshToken.into();

		assert!(matches!(error, Error::Refresh(RefreshError::MissingRefreshToken)));
		assert!(error.to_string().contains("No refresh token"));
	}
}
