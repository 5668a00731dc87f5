//! Path classification for navigation guards.

// self
use crate::{_prelude::*, guard::RouteAccess};

/// Classifies application paths into [`RouteAccess`] levels.
///
/// Guest-only and public entries match exact paths; admin entries match a prefix on segment
/// boundaries (`/admin` covers `/admin` and `/admin/users`, not `/administrator`). Anything
/// unmatched is protected. Query strings, fragments, and trailing slashes are ignored.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteTable {
	/// Exact paths reserved for signed-out visitors.
	pub guest_only: Vec<String>,
	/// Path prefixes reserved for administrators.
	pub admin_prefixes: Vec<String>,
	/// Exact paths open to everyone.
	pub public: Vec<String>,
}
impl RouteTable {
	/// Creates a table in which every path is protected.
	pub fn empty() -> Self {
		Self { guest_only: Vec::new(), admin_prefixes: Vec::new(), public: Vec::new() }
	}

	/// Adds an exact guest-only path.
	pub fn with_guest_only(mut self, path: impl Into<String>) -> Self {
		self.guest_only.push(path.into());

		self
	}

	/// Adds an admin-only prefix.
	pub fn with_admin_prefix(mut self, prefix: impl Into<String>) -> Self {
		self.admin_prefixes.push(prefix.into());

		self
	}

	/// Adds an exact public path.
	pub fn with_public(mut self, path: impl Into<String>) -> Self {
		self.public.push(path.into());

		self
	}

	/// Returns the access level required by `location`.
	pub fn classify(&self, location: &str) -> RouteAccess {
		let path = normalize(location);

		if self.public.iter().any(|entry| normalize(entry) == path) {
			return RouteAccess::Public;
		}
		if self.guest_only.iter().any(|entry| normalize(entry) == path) {
			return RouteAccess::GuestOnly;
		}
		if self.admin_prefixes.iter().any(|prefix| under_prefix(path, normalize(prefix))) {
			return RouteAccess::AdminOnly;
		}

		RouteAccess::Protected
	}
}
impl Default for RouteTable {
	fn default() -> Self {
		Self::empty().with_guest_only("/login").with_guest_only("/register").with_admin_prefix("/admin")
	}
}

fn normalize(location: &str) -> &str {
	let end = location.find(['?', '#']).unwrap_or(location.len());
	let path = location[..end].trim_end_matches('/');

	if path.is_empty() { "/" } else { path }
}

fn under_prefix(path: &str, prefix: &str) -> bool {
	if prefix == "/" {
		return true;
	}

	path.strip_prefix(prefix).is_some_and(|rest| rest.is_empty() || rest.starts_with('/'))
}
