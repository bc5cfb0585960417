//! Observability helpers shared by credential resolution, consent sources, and listings.
//!
//! - Spans are named `drive_credentials.flow` and carry `flow` and `stage` fields.
//! - With the `metrics` feature, every attempt, success, and failure increments the
//!   `drive_credentials_flow_total` counter, labeled by `flow` and `outcome`.

mod metrics;
mod tracing;

pub use self::metrics::*;
pub use self::tracing::*;

// self
use crate::_prelude::*;

/// Operations observed by the crate.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FlowKind {
	/// Credential resolution through the lifecycle manager.
	Resolve,
	/// Operator-driven authorization code consent.
	InteractiveConsent,
	/// Pre-issued static token.
	StaticToken,
	/// Service-account JWT bearer grant.
	ServiceAccount,
	/// Refresh token grant.
	Refresh,
	/// Paginated resource listing.
	Listing,
}
impl FlowKind {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			FlowKind::Resolve => "resolve",
			FlowKind::InteractiveConsent => "interactive_consent",
			FlowKind::StaticToken => "static_token",
			FlowKind::ServiceAccount => "service_account",
			FlowKind::Refresh => "refresh",
			FlowKind::Listing => "listing",
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
	/// Entry to an operation.
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

/// Records the attempt plus its success or failure for `kind`.
pub fn record_result<T, E>(kind: FlowKind, result: &Result<T, E>) {
	record_flow_outcome(kind, FlowOutcome::Attempt);
	record_flow_outcome(
		kind,
		if result.is_ok() { FlowOutcome::Success } else { FlowOutcome::Failure },
	);
}
