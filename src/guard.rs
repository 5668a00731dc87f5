//! Navigation guards: a pure allow/redirect decision plus the watcher that re-applies it whenever
//! the session changes.

pub mod route;

pub use route::*;

// crates.io
use url::form_urlencoded;
// self
use crate::{
	_prelude::*,
	config::SessionConfig,
	session::{SessionSnapshot, Subscription, TokenStore},
};

/// Upper bound on chained redirects followed by [`SessionGuard::enforce`].
pub const MAX_REDIRECTS: usize = 4;

/// Navigation collaborator that owns the current location.
pub trait Navigator
where
	Self: Send + Sync,
{
	/// Location currently displayed, including any query string.
	fn current_path(&self) -> String;

	/// Replaces the current location with `path`.
	fn navigate(&self, path: &str);
}

/// Authentication facts the guard decides on.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AuthContext {
	/// Whether a user is signed in.
	pub is_authenticated: bool,
	/// Whether the signed-in user is an administrator.
	pub is_admin: bool,
}

/// Typed input of [`decide`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GuardContext {
	/// Session facts.
	pub auth: AuthContext,
}
impl From<&SessionSnapshot> for GuardContext {
	fn from(snapshot: &SessionSnapshot) -> Self {
		Self {
			auth: AuthContext {
				is_authenticated: snapshot.is_authenticated(),
				is_admin: snapshot.is_admin(),
			},
		}
	}
}

/// Access level a route requires.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouteAccess {
	/// Requires a signed-in user.
	Protected,
	/// Only for signed-out visitors (sign-in, registration).
	GuestOnly,
	/// Requires a signed-in administrator.
	AdminOnly,
	/// Open to everyone.
	Public,
}

/// Redirect targets used by the guard.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GuardPaths {
	/// Sign-in entry point.
	pub sign_in: String,
	/// Default view for signed-in users.
	pub landing: String,
}
impl Default for GuardPaths {
	fn default() -> Self {
		Self { sign_in: "/login".into(), landing: "/".into() }
	}
}

/// Outcome of a guard evaluation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Decision {
	/// Enter the requested view.
	Allow,
	/// Navigate to the contained location instead.
	RedirectTo(String),
}
impl Decision {
	/// Whether the view may be entered.
	pub fn is_allowed(&self) -> bool {
		matches!(self, Decision::Allow)
	}

	/// Redirect location, if any.
	pub fn redirect_target(&self) -> Option<&str> {
		match self {
			Decision::Allow => None,
			Decision::RedirectTo(target) => Some(target),
		}
	}
}

/// Decides whether a view requiring `access` may be entered.
///
/// Signed-out visitors bounced off protected or admin views are sent to the sign-in path with a
/// `redirect` query parameter carrying `target`, when known. Signed-in visitors of guest-only
/// views are sent to that `redirect` destination, or to the landing path.
pub fn decide(
	context: &GuardContext,
	access: RouteAccess,
	target: Option<&str>,
	paths: &GuardPaths,
) -> Decision {
	let auth = context.auth;

	match access {
		RouteAccess::Public => Decision::Allow,
		RouteAccess::Protected | RouteAccess::AdminOnly if !auth.is_authenticated =>
			Decision::RedirectTo(sign_in_location(paths, target)),
		RouteAccess::AdminOnly if !auth.is_admin => Decision::RedirectTo(paths.landing.clone()),
		RouteAccess::GuestOnly if auth.is_authenticated =>
			Decision::RedirectTo(post_login_location(target.unwrap_or_default(), paths)),
		_ => Decision::Allow,
	}
}

/// Resolves where to go after a successful sign-in from `location`'s `redirect` parameter.
///
/// Only same-origin absolute paths are honored; anything else yields the landing path.
pub fn post_login_location(location: &str, paths: &GuardPaths) -> String {
	let query = location.split_once('?').map(|(_, query)| query).unwrap_or_default();
	let query = query.split('#').next().unwrap_or_default();

	form_urlencoded::parse(query.as_bytes())
		.find(|(key, _)| key == "redirect")
		.map(|(_, value)| value.into_owned())
		.filter(|target| is_local_path(target))
		.unwrap_or_else(|| paths.landing.clone())
}

// Browsers read `\` as `/` and strip tabs and newlines, which turns `/\host` or a `/` followed
// by a tab and `/host` into a scheme-relative URL.
fn is_local_path(target: &str) -> bool {
	target.starts_with('/')
		&& !target.starts_with("//")
		&& !target.chars().any(|c| c == '\\' || c.is_control())
}

fn sign_in_location(paths: &GuardPaths, target: Option<&str>) -> String {
	match target.filter(|target| !target.is_empty()) {
		Some(target) => format!(
			"{}?{}",
			paths.sign_in,
			form_urlencoded::Serializer::new(String::new()).append_pair("redirect", target).finish()
		),
		None => paths.sign_in.clone(),
	}
}

/// Route table and redirect paths bundled for evaluating locations against snapshots.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SessionGuard {
	routes: RouteTable,
	paths: GuardPaths,
}
impl SessionGuard {
	/// Creates a guard from its parts.
	pub fn new(routes: RouteTable, paths: GuardPaths) -> Self {
		Self { routes, paths }
	}

	/// Creates a guard from a session configuration.
	pub fn from_config(config: &SessionConfig) -> Self {
		Self::new(config.routes.clone(), config.paths.clone())
	}

	/// Route classification in use.
	pub fn routes(&self) -> &RouteTable {
		&self.routes
	}

	/// Redirect targets in use.
	pub fn paths(&self) -> &GuardPaths {
		&self.paths
	}

	/// Decides whether `location` may be displayed for `snapshot`.
	pub fn check(&self, snapshot: &SessionSnapshot, location: &str) -> Decision {
		decide(
			&GuardContext::from(snapshot),
			self.routes.classify(location),
			Some(location),
			&self.paths,
		)
	}

	/// Checks the navigator's current location and follows any redirect.
	///
	/// Each redirect target is checked in turn, as a router re-runs guards on every navigation,
	/// for at most [`MAX_REDIRECTS`] hops. Returns the decision for the original location.
	pub fn enforce(&self, navigator: &dyn Navigator, snapshot: &SessionSnapshot) -> Decision {
		let first = self.check(snapshot, &navigator.current_path());
		let mut next = first.clone();

		for _ in 0..MAX_REDIRECTS {
			let Decision::RedirectTo(target) = next else { break };

			navigator.navigate(&target);

			next = self.check(snapshot, &target);
		}

		first
	}

	/// Sends the navigator to the plain sign-in path unless it already shows a guest-only view.
	///
	/// Returns whether a navigation happened.
	pub fn send_to_sign_in(&self, navigator: &dyn Navigator) -> bool {
		if self.routes.classify(&navigator.current_path()) == RouteAccess::GuestOnly {
			return false;
		}

		navigator.navigate(&self.paths.sign_in);

		true
	}

	/// Re-enforces the guard after every mutation of `store`.
	pub fn watch(&self, store: &TokenStore, navigator: Arc<dyn Navigator>) -> NavigationWatch {
		let guard = self.clone();
		let subscription = store.subscribe(move |snapshot| {
			guard.enforce(navigator.as_ref(), snapshot);
		});

		NavigationWatch { _subscription: subscription }
	}
}

/// Keeps a [`SessionGuard`] attached to a store; dropping it stops re-evaluation.
#[must_use = "dropping the watch detaches the guard from the store"]
#[derive(Debug)]
pub struct NavigationWatch {
	_subscription: Subscription,
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::{_preludet::*, config::StorageKeys, store::MemoryStorage};

	fn context(is_authenticated: bool, is_admin: bool) -> GuardContext {
		GuardContext { auth: AuthContext { is_authenticated, is_admin } }
	}

	#[test]
	fn protected_routes_bounce_anonymous_visitors_with_destination() {
		let paths = GuardPaths::default();

		assert_eq!(
			decide(&context(false, false), RouteAccess::Protected, Some("/users?page=2"), &paths),
			Decision::RedirectTo("/login?redirect=%2Fusers%3Fpage%3D2".into())
		);
		assert_eq!(
			decide(&context(false, false), RouteAccess::Protected, None, &paths),
			Decision::RedirectTo("/login".into())
		);
		assert!(decide(&context(true, false), RouteAccess::Protected, None, &paths).is_allowed());
	}

	#[test]
	fn guest_admin_and_public_routes() {
		let paths = GuardPaths::default();

		assert_eq!(
			decide(&context(true, false), RouteAccess::GuestOnly, Some("/login"), &paths)
				.redirect_target(),
			Some("/")
		);
		assert_eq!(
			decide(&context(true, false), RouteAccess::GuestOnly, Some("/login?redirect=%2Fusers"), &paths)
				.redirect_target(),
			Some("/users")
		);
		assert!(decide(&context(false, false), RouteAccess::GuestOnly, None, &paths).is_allowed());
		assert_eq!(
			decide(&context(true, false), RouteAccess::AdminOnly, Some("/admin"), &paths)
				.redirect_target(),
			Some("/")
		);
		assert_eq!(
			decide(&context(false, false), RouteAccess::AdminOnly, Some("/admin"), &paths)
				.redirect_target(),
			Some("/login?redirect=%2Fadmin")
		);
		assert!(decide(&context(true, true), RouteAccess::AdminOnly, None, &paths).is_allowed());
		assert!(decide(&context(false, false), RouteAccess::Public, None, &paths).is_allowed());
	}

	#[test]
	fn post_login_location_honors_only_local_paths() {
		let paths = GuardPaths::default();

		assert_eq!(post_login_location("/login?redirect=%2Fusers%3Fpage%3D2", &paths), "/users?page=2");
		assert_eq!(post_login_location("/login?redirect=https%3A%2F%2Fevil.test", &paths), "/");
		assert_eq!(post_login_location("/login?redirect=%2F%2Fevil.test", &paths), "/");
		assert_eq!(post_login_location("/login?redirect=%2F%5Cevil.test", &paths), "/");
		assert_eq!(post_login_location("/login?redirect=%2F%09%2Fevil.test", &paths), "/");
		assert_eq!(post_login_location("/login?redirect=%2Fdocs%5Cguide", &paths), "/");
		assert_eq!(post_login_location("/login", &paths), "/");
	}

	#[test]
	fn watch_redirects_on_every_store_notification() {
		let store = TokenStore::open(Arc::new(MemoryStorage::new()), StorageKeys::default());
		let navigator = Arc::new(RecordingNavigator::at("/login"));
		let guard = SessionGuard::default();
		let watch = guard.watch(&store, navigator.clone());

		store.set_tokens(Some(pair("a1", "r1")));
		store.set_user(Some(user("u1")));

		assert_eq!(navigator.history(), vec!["/".to_owned()]);

		store.clear();

		assert_eq!(navigator.history(), vec!["/".to_owned(), "/login?redirect=%2F".to_owned()]);

		drop(watch);
		store.set_user(Some(user("u1")));

		assert_eq!(navigator.history().len(), 2);
	}

	#[test]
	fn enforce_follows_chained_redirects() {
		let navigator = RecordingNavigator::at("/login?redirect=%2Fadmin%2Fusers");
		let snapshot = SessionSnapshot::new(Some(user("u1")), Some(pair("a1", "r1")));
		let decision = SessionGuard::default().enforce(&navigator, &snapshot);

		assert_eq!(decision.redirect_target(), Some("/admin/users"));
		assert_eq!(navigator.history(), vec!["/admin/users".to_owned(), "/".to_owned()]);
	}
}
