//! Credential sources: interchangeable strategies that mint a fresh [`Credential`].
//!
//! The lifecycle manager tries its configured sources in order and stops at the first success.
//! Every source reports failures as [`ConsentError`] so the manager can record which source
//! failed and why without knowing how the source works.

pub mod interactive;
pub mod prompt;
pub mod service_account;
pub mod static_token;

pub use interactive::InteractiveConsent;
pub use prompt::{ConsentPrompt, LinePrompt, StdioPrompt};
pub use service_account::{ServiceAccount, ServiceAccountKey};
pub use static_token::StaticToken;

// self
use crate::{_prelude::*, auth::Credential};

/// Boxed future returned by [`CredentialSource::obtain`].
pub type ConsentFuture<'a> =
	Pin<Box<dyn Future<Output = Result<Credential, ConsentError>> + 'a + Send>>;

/// Capability to obtain a new credential.
pub trait CredentialSource
where
	Self: Send + Sync,
{
	/// Stable label used in logs and failure summaries.
	fn label(&self) -> &'static str;

	/// Obtains a fresh credential.
	fn obtain(&self) -> ConsentFuture<'_>;
}
impl<T> CredentialSource for Arc<T>
where
	T: ?Sized + CredentialSource,
{
	fn label(&self) -> &'static str {
		(**self).label()
	}

	fn obtain(&self) -> ConsentFuture<'_> {
		(**self).obtain()
	}
}

/// Failures reported by credential sources.
#[derive(Debug, ThisError)]
pub enum ConsentError {
	/// The operator supplied no usable input (no line, blank line, or unreadable console).
	#[error("Operator input was not usable: {reason}.")]
	UserInput {
		/// What went wrong with the input.
		reason: String,
	},
	/// The token endpoint rejected the exchange.
	#[error("Token exchange was rejected: {reason}.")]
	Exchange {
		/// Provider-supplied reason.
		reason: String,
	},
	/// A credential payload (for example a service-account key) is malformed.
	#[error("Credential payload is malformed: {reason}.")]
	Parse {
		/// Parser failure description.
		reason: String,
	},
	/// The source was configured with unusable values.
	#[error("Credential source is misconfigured: {reason}.")]
	Validation {
		/// Validation failure description.
		reason: String,
	},
	/// The exchange failed below the OAuth layer (network, timeout, malformed response).
	#[error(transparent)]
	Upstream(Box<Error>),
}
impl From<Error> for ConsentError {
	fn from(e: Error) -> Self {
		match e {
			Error::InvalidGrant { reason }
			| Error::InvalidClient { reason }
			| Error::InsufficientScope { reason } => Self::Exchange { reason },
			Error::Consent(inner) => inner,
			other => Self::Upstream(Box::new(other)),
		}
	}
}
