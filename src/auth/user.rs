//! User profile record as returned by the current-user endpoint.

// self
use crate::{
	_prelude::*,
	auth::{IdentifierError, UserId},
};

/// Authenticated user's profile.
///
/// The session core only inspects [`User::id`] (identity comparisons) and
/// [`User::is_admin`] (admin-only routes); every other field is carried opaquely so
/// views can render it. Timestamps stay in the API's string form.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
	/// Stable identifier.
	pub id: UserId,
	/// Sign-in email address.
	pub email: String,
	/// Public handle.
	pub username: String,
	/// Optional display name.
	#[serde(default)]
	pub full_name: Option<String>,
	/// Whether the account is enabled.
	#[serde(default = "default_active")]
	pub is_active: bool,
	/// Grants access to admin-only routes.
	#[serde(default)]
	pub is_admin: bool,
	/// Account creation timestamp, as sent by the API.
	#[serde(default)]
	pub created_at: String,
	/// Last profile update timestamp, as sent by the API.
	#[serde(default)]
	pub updated_at: String,
	/// Last sign-in timestamp, if any.
	#[serde(default)]
	pub last_login_at: Option<String>,
}
impl User {
	/// Creates an active, non-admin profile with empty timestamps.
	pub fn new(
		id: impl AsRef<str>,
		email: impl Into<String>,
		username: impl Into<String>,
	) -> Result<Self, IdentifierError> {
		Ok(Self {
			id: UserId::new(id)?,
			email: email.into(),
			username: username.into(),
			full_name: None,
			is_active: true,
			is_admin: false,
			created_at: String::new(),
			updated_at: String::new(),
			last_login_at: None,
		})
	}

	/// Marks the profile as an administrator.
	pub fn with_admin(mut self, is_admin: bool) -> Self {
		self.is_admin = is_admin;

		self
	}

	/// Returns `true` when both records describe the same account.
	pub fn same_identity(&self, other: &User) -> bool {
		self.id == other.id
	}
}

fn default_active() -> bool {
	true
}
