//! Session configuration: API location, auth endpoint paths, storage keys, and route policy.
//!
//! Values are assembled through [`SessionConfig::builder`] (or [`SessionConfig::from_env`]) and
//! validated once at build time so the runtime components can treat them as trusted.

// std
use std::env;
// self
use crate::{
	_prelude::*,
	guard::{GuardPaths, RouteAccess, RouteTable},
};

/// API base used when no environment override is present.
pub const DEFAULT_API_BASE: &str = "http://127.0.0.1:8000";
/// Environment variable consulted by [`SessionConfig::from_env`].
pub const API_BASE_ENV: &str = "TAB_SESSION_API_URL";

/// Errors raised while constructing or validating a [`SessionConfig`].
#[derive(Clone, Debug, PartialEq, Eq, ThisError)]
pub enum SessionConfigError {
	/// API base could not be parsed or cannot carry paths.
	#[error("API base `{url}` is invalid: {reason}.")]
	InvalidApiBase {
		/// Offending value.
		url: String,
		/// Parser or validation message.
		reason: String,
	},
	/// API base must be served over HTTP or HTTPS.
	#[error("API base must use http or https: {url}.")]
	UnsupportedScheme {
		/// Offending value.
		url: String,
	},
	/// Endpoint and navigation paths must be absolute.
	#[error("The {name} path must start with `/`: {path}.")]
	InvalidPath {
		/// Which path failed validation.
		name: &'static str,
		/// Offending value.
		path: String,
	},
	/// Storage keys must be non-empty.
	#[error("The {name} storage key cannot be empty.")]
	EmptyStorageKey {
		/// Which key failed validation.
		name: &'static str,
	},
	/// Snapshot and logout-marker keys must differ.
	#[error("Snapshot and logout-marker storage keys collide: {key}.")]
	StorageKeyCollision {
		/// Shared key.
		key: String,
	},
	/// The sign-in path would itself require authentication, causing redirect loops.
	#[error("Sign-in path {path} must be classified as guest-only or public.")]
	SignInNotReachable {
		/// Configured sign-in path.
		path: String,
	},
}

/// Paths of the credential-exchange and profile endpoints, relative to the API base.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthEndpoints {
	/// Password sign-in.
	pub login: String,
	/// Account registration.
	pub register: String,
	/// Refresh-token exchange.
	pub refresh: String,
	/// Server-side refresh-token revocation.
	pub logout: String,
	/// Current user profile.
	pub current_user: String,
	/// Password change for the signed-in user.
	pub change_password: String,
}
impl Default for AuthEndpoints {
	fn default() -> Self {
		Self {
			login: "/api/auth/login".into(),
			register: "/api/auth/register".into(),
			refresh: "/api/auth/refresh".into(),
			logout: "/api/auth/logout".into(),
			current_user: "/api/v1/users/me".into(),
			change_password: "/api/auth/change-password".into(),
		}
	}
}

/// Keys used in the origin's persisted storage.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageKeys {
	/// Key holding the serialized session snapshot.
	pub snapshot: String,
	/// Transient key written then deleted on every local logout.
	pub logout_marker: String,
}
impl Default for StorageKeys {
	fn default() -> Self {
		Self { snapshot: "emerald-auth".into(), logout_marker: "emerald-auth:logout".into() }
	}
}

/// Validated configuration for one session context.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
	/// API origin every endpoint path is joined onto.
	pub api_base: Url,
	/// Auth endpoint paths.
	pub endpoints: AuthEndpoints,
	/// Persisted storage keys.
	pub storage: StorageKeys,
	/// Sign-in and landing paths used by redirects.
	pub paths: GuardPaths,
	/// Route classification consulted by the guard.
	pub routes: RouteTable,
}
impl SessionConfig {
	/// Creates a new builder targeting `api_base`.
	pub fn builder(api_base: Url) -> SessionConfigBuilder {
		SessionConfigBuilder::new(api_base)
	}

	/// Builds the default configuration, taking the API base from `TAB_SESSION_API_URL` when set.
	pub fn from_env() -> Result<Self, SessionConfigError> {
		let raw = env::var(API_BASE_ENV).unwrap_or_else(|_| DEFAULT_API_BASE.to_owned());

		Self::builder(parse_api_base(&raw)?).build()
	}

	/// Resolves an endpoint path against the API base.
	pub fn endpoint_url(&self, path: &str) -> Result<Url, SessionConfigError> {
		self.api_base.join(path).map_err(|e| SessionConfigError::InvalidApiBase {
			url: format!("{}{path}", self.api_base),
			reason: e.to_string(),
		})
	}

	fn validate(&self) -> Result<(), SessionConfigError> {
		if !matches!(self.api_base.scheme(), "http" | "https") {
			return Err(SessionConfigError::UnsupportedScheme { url: self.api_base.to_string() });
		}
		if self.api_base.cannot_be_a_base() {
			return Err(SessionConfigError::InvalidApiBase {
				url: self.api_base.to_string(),
				reason: "URL cannot carry paths".into(),
			});
		}

		validate_path("login endpoint", &self.endpoints.login)?;
		validate_path("register endpoint", &self.endpoints.register)?;
		validate_path("refresh endpoint", &self.endpoints.refresh)?;
		validate_path("logout endpoint", &self.endpoints.logout)?;
		validate_path("current-user endpoint", &self.endpoints.current_user)?;
		validate_path("change-password endpoint", &self.endpoints.change_password)?;
		validate_path("sign-in", &self.paths.sign_in)?;
		validate_path("landing", &self.paths.landing)?;
		validate_key("snapshot", &self.storage.snapshot)?;
		validate_key("logout-marker", &self.storage.logout_marker)?;

		if self.storage.snapshot == self.storage.logout_marker {
			return Err(SessionConfigError::StorageKeyCollision {
				key: self.storage.snapshot.clone(),
			});
		}
		if !matches!(
			self.routes.classify(&self.paths.sign_in),
			RouteAccess::GuestOnly | RouteAccess::Public
		) {
			return Err(SessionConfigError::SignInNotReachable {
				path: self.paths.sign_in.clone(),
			});
		}

		Ok(())
	}
}
/// Builder for [`SessionConfig`] values.
#[derive(Debug)]
pub struct SessionConfigBuilder {
	/// API origin.
	pub api_base: Url,
	/// Auth endpoint paths.
	pub endpoints: AuthEndpoints,
	/// Persisted storage keys.
	pub storage: StorageKeys,
	/// Redirect targets.
	pub paths: GuardPaths,
	/// Route classification.
	pub routes: RouteTable,
}
impl SessionConfigBuilder {
	/// Creates a builder seeded with defaults for everything but the API base.
	pub fn new(api_base: Url) -> Self {
		Self {
			api_base,
			endpoints: AuthEndpoints::default(),
			storage: StorageKeys::default(),
			paths: GuardPaths::default(),
			routes: RouteTable::default(),
		}
	}

	/// Overrides the auth endpoint paths.
	pub fn endpoints(mut self, endpoints: AuthEndpoints) -> Self {
		self.endpoints = endpoints;

		self
	}

	/// Overrides the persisted storage keys.
	pub fn storage_keys(mut self, storage: StorageKeys) -> Self {
		self.storage = storage;

		self
	}

	/// Overrides the sign-in and landing paths.
	pub fn paths(mut self, paths: GuardPaths) -> Self {
		self.paths = paths;

		self
	}

	/// Overrides the route classification table.
	pub fn routes(mut self, routes: RouteTable) -> Self {
		self.routes = routes;

		self
	}

	/// Consumes the builder and validates the resulting configuration.
	pub fn build(self) -> Result<SessionConfig, SessionConfigError> {
		let config = SessionConfig {
			api_base: self.api_base,
			endpoints: self.endpoints,
			storage: self.storage,
			paths: self.paths,
			routes: self.routes,
		};

		config.validate()?;

		Ok(config)
	}
}

fn parse_api_base(raw: &str) -> Result<Url, SessionConfigError> {
	Url::parse(raw.trim()).map_err(|e| SessionConfigError::InvalidApiBase {
		url: raw.to_owned(),
		reason: e.to_string(),
	})
}

fn validate_path(name: &'static str, path: &str) -> Result<(), SessionConfigError> {
	if path.starts_with('/') {
		Ok(())
	} else {
		Err(SessionConfigError::InvalidPath { name, path: path.to_owned() })
	}
}

fn validate_key(name: &'static str, key: &str) -> Result<(), SessionConfigError> {
	if key.trim().is_empty() { Err(SessionConfigError::EmptyStorageKey { name }) } else { Ok(()) }
}
