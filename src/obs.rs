//! Optional observability helpers for session flows.
//!
//! # Feature Flags
//!
//! - Enable `tracing` to emit structured spans named `tab_session.flow` with `flow`, `stage`,
//!   and terminal `outcome` fields, plus point events for persistence failures, ignored
//!   cross-tab payloads, and adoptions.
//! - Enable `metrics` to increment the `tab_session_flow_total` counter for every
//!   attempt/success/failure, labeled by `flow`, `stage`, and `outcome`.

mod metrics;
mod tracing;

pub use metrics::*;
pub use tracing::*;

// self
use crate::_prelude::*;

/// Forwards a point event to `tracing` when the feature is enabled; compiles to nothing
/// otherwise.
macro_rules! obs_event {
	($level:ident, $($arg:tt)+) => {{
		#[cfg(feature = "tracing")]
		{
			::tracing::$level!(target: "tab_session", $($arg)+);
		}
	}};
}
pub(crate) use obs_event;

/// Session flows observed by the crate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowKind {
	/// Single-flight access-token renewal.
	Refresh,
	/// Authenticated API request through the gate.
	Request,
	/// Credential sign-in.
	Login,
	/// Local plus server-side sign-out.
	Logout,
	/// Current-user profile synchronization.
	CurrentUser,
	/// Account registration.
	Register,
	/// Password change for the signed-in user.
	PasswordChange,
	/// Cross-tab event application.
	CrossTab,
}
impl FlowKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowKind::Refresh => "refresh",
			FlowKind::Request => "request",
			FlowKind::Login => "login",
			FlowKind::Logout => "logout",
			FlowKind::CurrentUser => "current_user",
			FlowKind::Register => "register",
			FlowKind::PasswordChange => "password_change",
			FlowKind::CrossTab => "cross_tab",
		}
	}
}
impl Display for FlowKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Outcome labels recorded for each attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowOutcome {
	/// Entry to a flow.
	Attempt,
	/// Successful completion.
	Success,
	/// Failure propagated back to the caller.
	Failure,
}
impl FlowOutcome {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowOutcome::Attempt => "attempt",
			FlowOutcome::Success => "success",
			FlowOutcome::Failure => "failure",
		}
	}
}
impl Display for FlowOutcome {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn labels_are_stable() {
		assert_eq!(FlowKind::CurrentUser.to_string(), "current_user");
		assert_eq!(FlowKind::CrossTab.as_str(), "cross_tab");
		assert_eq!(FlowOutcome::Failure.to_string(), "failure");
	}
}
