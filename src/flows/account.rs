//! Account flows on [`SessionManager`]: password sign-in, sign-out, registration, profile sync,
//! and password change.
//!
//! Sign-in stores the issued pair first and the fetched profile second, so listeners observe a
//! tokens-only snapshot before the authenticated one. Navigation after sign-in is left to the
//! guard watch: once the context turns authenticated on a guest-only view, the guard sends it to
//! the view's `redirect` destination.

// self
use crate::{
	_prelude::*,
	auth::User,
	exchange::Credentials,
	flows::SessionManager,
	http::ApiRequest,
	obs::{FlowKind, FlowOutcome, FlowSpan, obs_event},
};

/// Details submitted to the registration endpoint.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterCredentials {
	/// Account email.
	pub email: String,
	/// Public handle.
	pub username: String,
	/// Chosen password.
	pub password: String,
}
impl RegisterCredentials {
	/// Creates a registration request.
	pub fn new(
		email: impl Into<String>,
		username: impl Into<String>,
		password: impl Into<String>,
	) -> Self {
		Self { email: email.into(), username: username.into(), password: password.into() }
	}
}
impl Debug for RegisterCredentials {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RegisterCredentials")
			.field("email", &self.email)
			.field("username", &self.username)
			.field("password", &"<redacted>")
			.finish()
	}
}

impl SessionManager {
	/// Signs in with `credentials`.
	///
	/// The issued pair is stored before the profile is fetched. When the profile fetch fails the
	/// pair stays stored (the context remains unauthenticated) and the error is returned.
	pub async fn login(&self, credentials: &Credentials) -> Result<User> {
		const KIND: FlowKind = FlowKind::Login;

		let span = FlowSpan::new(KIND, "login");

		span.record(FlowOutcome::Attempt);

		let result = span
			.instrument(async move {
				let tokens = self.exchange().login(credentials).await?;

				self.store().set_tokens(Some(tokens));

				let user = self.fetch_current_user().await?;

				self.store().set_user(Some(user.clone()));

				obs_event!(info, user = %user.id, "signed in");

				Ok(user)
			})
			.await;

		span.finish(&result);

		result
	}

	/// Signs out everywhere.
	///
	/// The refresh token is revoked server-side on a best-effort basis; the local session is
	/// cleared (and siblings notified) whatever the outcome, and the navigator is sent to the
	/// sign-in path. A failed revocation is reported after the local sign-out completed.
	pub async fn logout(&self) -> Result<()> {
		const KIND: FlowKind = FlowKind::Logout;

		let span = FlowSpan::new(KIND, "logout");

		span.record(FlowOutcome::Attempt);

		let result = span
			.instrument(async move {
				let refresh_token = self.store().get().refresh_token().map(str::to_owned);
				let revoked = match refresh_token.as_deref() {
					Some(token) => self.exchange().revoke(token).await,
					None => Ok(()),
				};

				if let Err(_e) = &revoked {
					obs_event!(warn, error = %_e, "server-side sign-out failed; clearing locally");
				}

				self.store().clear();

				if let Some(navigator) = self.navigator() {
					self.guard().send_to_sign_in(navigator.as_ref());
				}

				revoked.map_err(Error::from)
			})
			.await;

		span.finish(&result);

		result
	}

	/// Re-fetches the signed-in user's profile and stores it.
	///
	/// Requires stored tokens. A rejected fetch drops the stored profile (the context turns
	/// unauthenticated); transport failures leave the session as it was.
	pub async fn sync_current_user(&self) -> Result<User> {
		const KIND: FlowKind = FlowKind::CurrentUser;

		let span = FlowSpan::new(KIND, "sync_current_user");

		span.record(FlowOutcome::Attempt);

		let result = span
			.instrument(async move {
				if self.store().get().tokens().is_none() {
					return Err(Error::NotAuthenticated);
				}

				match self.fetch_current_user().await {
					Ok(user) => {
						self.store().set_user(Some(user.clone()));

						Ok(user)
					},
					Err(e) => {
						if !matches!(e, Error::Transport(_)) && self.store().get().user().is_some() {
							obs_event!(info, error = %e, "profile fetch failed; dropping stored user");

							self.store().set_user(None);
						}

						Err(e)
					},
				}
			})
			.await;

		span.finish(&result);

		result
	}

	/// Creates an account. The new user still has to sign in.
	pub async fn register(&self, credentials: &RegisterCredentials) -> Result<User> {
		const KIND: FlowKind = FlowKind::Register;

		let span = FlowSpan::new(KIND, "register");

		span.record(FlowOutcome::Attempt);

		let result = span
			.instrument(self.gate().post_json::<User, _>(&self.config().endpoints.register, credentials))
			.await;

		span.finish(&result);

		result
	}

	/// Changes the signed-in user's password.
	pub async fn change_password(&self, current_password: &str, new_password: &str) -> Result<()> {
		const KIND: FlowKind = FlowKind::PasswordChange;

		let span = FlowSpan::new(KIND, "change_password");

		span.record(FlowOutcome::Attempt);

		let result = span
			.instrument(async move {
				if !self.store().get().is_authenticated() {
					return Err(Error::NotAuthenticated);
				}

				let request = ApiRequest::post(&self.config().endpoints.change_password).json(
					serde_json::json!({
						"current_password": current_password,
						"new_password": new_password,
					}),
				);

				self.gate().send(request).await?;

				Ok(())
			})
			.await;

		span.finish(&result);

		result
	}

	async fn fetch_current_user(&self) -> Result<User> {
		self.gate().get_json::<User>(&self.config().endpoints.current_user).await
	}
}
