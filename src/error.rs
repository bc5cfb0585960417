//! Crate-level error types shared across stores, consent sources, transports, and listings.

// self
use crate::{_prelude::*, consent::ConsentError, provider::GrantType};

/// Crate-wide result type alias returning [`Error`] by default.
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
	/// A credential source failed to produce a credential.
	#[error(transparent)]
	Consent(#[from] ConsentError),
	/// Temporary upstream failure; retry with backoff.
	#[error(transparent)]
	Transient(#[from] TransientError),
	/// Transport failure (DNS, TCP, TLS, refresh).
	#[error(transparent)]
	Transport(#[from] TransportError),

	/// Provider rejected the grant (e.g., bad code or refresh token).
	#[error("Provider rejected the grant: {reason}.")]
	InvalidGrant {
		/// Provider- or crate-supplied reason string.
		reason: String,
	},
	/// Client authentication failed or credentials are malformed.
	#[error("Client authentication failed: {reason}.")]
	InvalidClient {
		/// Provider- or crate-supplied reason string.
		reason: String,
	},
	/// Requested scopes exceed what was granted.
	#[error("Token lacks the required scopes: {reason}.")]
	InsufficientScope {
		/// Provider- or crate-supplied reason string.
		reason: String,
	},
	/// Every configured credential source failed (or none was configured).
	#[error("No credential source produced a usable credential: {}.", summarize(.failures))]
	CredentialUnavailable {
		/// Per-source failure summaries in the order the sources were tried.
		failures: Vec<SourceFailure>,
	},
	/// The remote API refused the bearer credential.
	#[error("Remote API rejected the credential with HTTP {status}.")]
	Unauthenticated {
		/// HTTP status code (401 or 403).
		status: u16,
	},
	/// The remote API rejected a request for a non-authentication reason.
	#[error("Remote API returned HTTP {status}: {message}.")]
	Api {
		/// HTTP status code.
		status: u16,
		/// Body preview or reason phrase.
		message: String,
	},
	/// A listing page could not be decoded.
	#[error("Listing response could not be decoded.")]
	MalformedPage {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
	/// A listing aborted; items from earlier pages were already delivered to the caller.
	#[error(
		"Listing failed after {pages_completed} page(s) and {items_yielded} item(s) were delivered."
	)]
	ListingFailed {
		/// Pages fully delivered before the failure.
		pages_completed: usize,
		/// Items delivered before the failure.
		items_yielded: usize,
		/// Failure that aborted the traversal.
		#[source]
		source: Box<Error>,
	},
}
impl Error {
	/// Returns `true` when a single retry of the same request is worthwhile.
	pub fn is_transient(&self) -> bool {
		matches!(
			self,
			Self::Transient(_)
				| Self::Transport(TransportError::Network { .. } | TransportError::Io(_))
		)
	}
}

/// Failure reported by one credential source during resolution.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SourceFailure {
	/// Label of the source that failed.
	pub source: &'static str,
	/// Human-readable failure message (never contains secrets).
	pub message: String,
}
impl Display for SourceFailure {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "{}: {}", self.source, self.message)
	}
}

fn summarize(failures: &[SourceFailure]) -> String {
	if failures.is_empty() {
		return "no sources configured".into();
	}

	failures.iter().map(ToString::to_string).collect::<Vec<_>>().join("; ")
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
	/// HTTP request construction failed.
	#[error(transparent)]
	HttpRequest(#[from] oauth2::http::Error),
	/// A required configuration field is absent.
	#[error("Required configuration field `{field}` is missing.")]
	MissingField {
		/// Field or environment variable name.
		field: String,
	},
	/// A configured URL cannot be parsed.
	#[error("Configuration field `{field}` is not a valid URL.")]
	InvalidUrl {
		/// Field or environment variable name.
		field: &'static str,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// Endpoints must use HTTPS unless they point at a loopback host.
	#[error("The {endpoint} endpoint must use HTTPS: {url}.")]
	InsecureEndpoint {
		/// Which endpoint failed validation.
		endpoint: &'static str,
		/// Endpoint URL that failed validation.
		url: String,
	},
	/// A configuration value is present but not acceptable.
	#[error("Configuration field `{field}` has an unsupported value: {value}.")]
	InvalidValue {
		/// Field or environment variable name.
		field: &'static str,
		/// Offending value.
		value: String,
	},
	/// A configuration file could not be read.
	#[error("Configuration file {path} could not be read.")]
	Unreadable {
		/// File path.
		path: String,
		/// Underlying IO failure.
		#[source]
		source: std::io::Error,
	},
	/// A configuration payload could not be parsed.
	#[error("Configuration payload is malformed.")]
	Payload {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::Error>,
	},
	/// A `.env` file could not be loaded.
	#[error("Environment file could not be loaded.")]
	DotEnv(#[from] dotenvy::Error),
	/// Requested scopes cannot be normalized.
	#[error("Requested scopes are invalid.")]
	InvalidScope(#[from] crate::auth::ScopeValidationError),
	/// Credential builder validation failed.
	#[error("Unable to build credential.")]
	CredentialBuild(#[from] crate::auth::CredentialBuilderError),
	/// Token endpoint returned an excessively large `expires_in`.
	#[error("The expires_in value exceeds the supported range.")]
	ExpiresInOutOfRange,
	/// Cached credential is missing a refresh secret.
	#[error("Credential is missing a refresh token.")]
	MissingRefreshToken,
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}

	pub(crate) fn missing(field: impl Into<String>) -> Self {
		Self::MissingField { field: field.into() }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Temporary failure variants (safe to retry).
#[derive(Debug, ThisError)]
pub enum TransientError {
	/// Token endpoint returned an unexpected but non-fatal response.
	#[error("Token endpoint returned an unexpected response: {message}.")]
	TokenEndpoint {
		/// Provider- or crate-supplied message summarizing the failure.
		message: String,
		/// HTTP status code, when available.
		status: Option<u16>,
		/// Retry-After hint from upstream, if supplied.
		retry_after: Option<Duration>,
	},
	/// Token endpoint responded with malformed JSON that could not be parsed.
	#[error("Token endpoint returned malformed JSON.")]
	TokenResponseParse {
		/// Structured parsing failure.
		#[source]
		source: serde_path_to_error::Error<serde_json::error::Error>,
		/// HTTP status code, when available.
		status: Option<u16>,
	},
	/// Remote API answered with a retryable status (429 or 5xx) or timed out.
	#[error("Remote API call failed temporarily: {message}.")]
	Api {
		/// Summary of the failure.
		message: String,
		/// HTTP status code, when available.
		status: Option<u16>,
		/// Retry-After hint from upstream, if supplied.
		retry_after: Option<Duration>,
	},
}

/// Transport-level failures (network, IO, refresh).
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Underlying HTTP client reported a network failure.
	#[error("Network error occurred while calling the remote endpoint.")]
	Network {
		/// Transport-specific network error.
		#[source]
		source: BoxError,
	},
	/// Underlying IO failure surfaced during transport.
	#[error("I/O error occurred while calling the remote endpoint.")]
	Io(#[from] std::io::Error),
	/// The transport could not refresh its credential before sending a request.
	#[error("Credential refresh failed during the {grant} grant.")]
	Refresh {
		/// Grant used for the refresh attempt.
		grant: GrantType,
		/// Underlying refresh failure.
		#[source]
		source: Box<Error>,
	},
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
		Self::network(e)
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn credential_unavailable_lists_every_failure() {
		let err = Error::CredentialUnavailable {
			failures: vec![
				SourceFailure { source: "interactive", message: "no code entered".into() },
				SourceFailure { source: "static_token", message: "empty access token".into() },
			],
		};
		let rendered = err.to_string();

		assert!(rendered.contains("interactive: no code entered"));
		assert!(rendered.contains("static_token: empty access token"));

		let empty = Error::CredentialUnavailable { failures: Vec::new() };

		assert!(empty.to_string().contains("no sources configured"));
	}

	#[test]
	fn transient_classification_excludes_refresh_and_auth_failures() {
		let timeout = Error::from(TransientError::Api {
			message: "timed out".into(),
			status: None,
			retry_after: None,
		});
		let io = Error::from(TransportError::Io(std::io::Error::other("reset")));
		let refresh = Error::from(TransportError::Refresh {
			grant: GrantType::RefreshToken,
			source: Box::new(Error::InvalidGrant { reason: "revoked".into() }),
		});

		assert!(timeout.is_transient());
		assert!(io.is_transient());
		assert!(!refresh.is_transient());
		assert!(!Error::Unauthenticated { status: 401 }.is_transient());
	}

	#[test]
	fn listing_failure_exposes_cause_as_source() {
		let err = Error::ListingFailed {
			pages_completed: 2,
			items_yielded: 4,
			source: Box::new(Error::Api { status: 400, message: "bad query".into() }),
		};
		let source = StdError::source(&err).expect("Listing failure should expose its cause.");

		assert!(err.to_string().contains("2 page(s) and 4 item(s)"));
		assert!(source.to_string().contains("bad query"));
	}
}
