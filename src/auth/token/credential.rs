//! Immutable bearer credential, lifecycle helpers, and builder.

// self
use crate::{
	_prelude::*,
	auth::{ScopeSet, token::secret::TokenSecret},
};

/// Token type used when the provider does not report one.
pub const DEFAULT_TOKEN_TYPE: &str = "Bearer";

/// Current lifecycle status for a credential.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum CredentialStatus {
	/// Credential can be attached to requests.
	Valid,
	/// Credential exceeded its expiry instant.
	Expired,
}

/// Errors produced by [`CredentialBuilder`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum CredentialBuilderError {
	/// Issued when no access token value was provided.
	#[error("Access token is required.")]
	MissingAccessToken,
	/// Issued when the access token is empty or whitespace.
	#[error("Access token cannot be empty.")]
	EmptyAccessToken,
	/// Issued when the token type is empty or whitespace.
	#[error("Token type cannot be empty.")]
	EmptyTokenType,
}

/// Bearer credential usable to authenticate requests against the remote API.
///
/// A credential without an expiry is treated as caller-managed and always valid. Refreshing
/// never mutates a credential in place; it produces a new value.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
	/// Access token secret; callers must avoid logging it.
	pub access_token: TokenSecret,
	/// Refresh token secret, if the provider issued one.
	pub refresh_token: Option<TokenSecret>,
	/// Authorization scheme placed in front of the access token (usually `Bearer`).
	pub token_type: String,
	/// Expiry instant, when known.
	pub expiry: Option<OffsetDateTime>,
	/// Scopes granted to this credential (empty when unknown).
	pub scope: ScopeSet,
}
impl Credential {
	/// Returns a builder for constructing credentials.
	pub fn builder() -> CredentialBuilder {
		CredentialBuilder::default()
	}

	/// Computes the lifecycle status at a given instant.
	pub fn status_at(&self, instant: OffsetDateTime) -> CredentialStatus {
		match self.expiry {
			Some(expiry) if instant >= expiry => CredentialStatus::Expired,
			_ => CredentialStatus::Valid,
		}
	}

	/// Convenience helper that checks the status using the current UTC instant.
	pub fn status(&self) -> CredentialStatus {
		self.status_at(OffsetDateTime::now_utc())
	}

	/// Returns `true` if the credential is valid at the provided instant.
	pub fn is_valid_at(&self, instant: OffsetDateTime) -> bool {
		matches!(self.status_at(instant), CredentialStatus::Valid)
	}

	/// Returns `true` if the credential is valid relative to the current clock.
	pub fn is_valid(&self) -> bool {
		self.is_valid_at(OffsetDateTime::now_utc())
	}

	/// Returns `true` if the credential expires at or before `instant + window`.
	///
	/// Credentials without an expiry never report as expiring.
	pub fn expires_within(&self, window: Duration, instant: OffsetDateTime) -> bool {
		self.expiry.is_some_and(|expiry| expiry - instant <= window)
	}

	/// Returns `true` when a refresh secret is available.
	pub fn can_refresh(&self) -> bool {
		self.refresh_token.as_ref().is_some_and(|secret| !secret.expose().is_empty())
	}

	/// Returns `true` if this credential covers every scope in `requested`.
	///
	/// An empty scope set means the grant is unknown and is accepted as-is.
	pub fn covers(&self, requested: &ScopeSet) -> bool {
		self.scope.is_empty() || requested.iter().all(|scope| self.scope.contains(scope))
	}

	/// Formats the `Authorization` header value.
	pub fn authorization_value(&self) -> String {
		format!("{} {}", self.token_type, self.access_token.expose())
	}
}
impl Debug for Credential {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Credential")
			.field("access_token", &"<redacted>")
			.field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
			.field("token_type", &self.token_type)
			.field("expiry", &self.expiry)
			.field("scope", &self.scope)
			.finish()
	}
}

/// Builder for [`Credential`].
#[derive(Clone, Debug, Default)]
pub struct CredentialBuilder {
	access_token: Option<TokenSecret>,
	refresh_token: Option<TokenSecret>,
	token_type: Option<String>,
	expiry: Option<OffsetDateTime>,
	expires_in: Option<Duration>,
	issued_at: Option<OffsetDateTime>,
	scope: ScopeSet,
}
impl CredentialBuilder {
	/// Provides the access token value.
	pub fn access_token(mut self, token: impl Into<String>) -> Self {
		self.access_token = Some(TokenSecret::new(token));

		self
	}

	/// Provides the refresh token value; empty values are ignored.
	pub fn refresh_token(mut self, token: impl Into<String>) -> Self {
		let token = token.into();

		self.refresh_token = if token.is_empty() { None } else { Some(TokenSecret::new(token)) };

		self
	}

	/// Overrides the token type (defaults to `Bearer`).
	pub fn token_type(mut self, token_type: impl Into<String>) -> Self {
		self.token_type = Some(token_type.into());

		self
	}

	/// Sets an absolute expiry instant.
	pub fn expiry(mut self, instant: OffsetDateTime) -> Self {
		self.expiry = Some(instant);

		self
	}

	/// Sets a relative expiry measured from the issued instant.
	pub fn expires_in(mut self, duration: Duration) -> Self {
		self.expires_in = Some(duration);

		self
	}

	/// Sets the instant relative expiries are measured from (defaults to now).
	pub fn issued_at(mut self, instant: OffsetDateTime) -> Self {
		self.issued_at = Some(instant);

		self
	}

	/// Sets the granted scope set.
	pub fn scope(mut self, scope: ScopeSet) -> Self {
		self.scope = scope;

		self
	}

	/// Consumes the builder and produces a [`Credential`].
	pub fn build(self) -> Result<Credential, CredentialBuilderError> {
		let access_token = self.access_token.ok_or(CredentialBuilderError::MissingAccessToken)?;

		if access_token.expose().trim().is_empty() {
			return Err(CredentialBuilderError::EmptyAccessToken);
		}

		let token_type = self.token_type.unwrap_or_else(|| DEFAULT_TOKEN_TYPE.into());

		if token_type.trim().is_empty() {
			return Err(CredentialBuilderError::EmptyTokenType);
		}

		let expiry = match (self.expiry, self.expires_in) {
			(Some(instant), _) => Some(instant),
			(None, Some(delta)) =>
				Some(self.issued_at.unwrap_or_else(OffsetDateTime::now_utc) + delta),
			(None, None) => None,
		};

		Ok(Credential {
			access_token,
			refresh_token: self.refresh_token,
			token_type,
			expiry,
			scope: self.scope,
		})
	}
}
