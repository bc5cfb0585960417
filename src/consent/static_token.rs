//! Pre-issued credentials supplied by the embedder or the environment.

// std
use std::env;
// self
use crate::{
	_prelude::*,
	auth::Credential,
	consent::{ConsentError, ConsentFuture, CredentialSource},
	obs::{self, FlowKind},
};

/// Environment variable holding a pre-issued access token.
pub const ACCESS_TOKEN_ENV: &str = "ACCESS_TOKEN";
/// Environment variable holding the matching refresh token.
pub const REFRESH_TOKEN_ENV: &str = "REFRESH_TOKEN";

/// Wraps an access secret (and optionally a refresh secret) obtained out of band.
///
/// Without an expiry the credential is caller-managed and never considered expired.
#[derive(Clone)]
pub struct StaticToken {
	access_token: String,
	refresh_token: Option<String>,
	expiry: Option<OffsetDateTime>,
}
impl StaticToken {
	/// Wraps an access secret.
	pub fn new(access_token: impl Into<String>) -> Self {
		Self { access_token: access_token.into(), refresh_token: None, expiry: None }
	}

	/// Reads `ACCESS_TOKEN` and `REFRESH_TOKEN` from the process environment.
	///
	/// A missing `ACCESS_TOKEN` is reported when the source is asked for a credential.
	pub fn from_env() -> Self {
		Self::from_lookup(|key| env::var(key).ok())
	}

	/// Same as [`from_env`](Self::from_env) with a custom variable lookup.
	pub fn from_lookup<F>(lookup: F) -> Self
	where
		F: Fn(&str) -> Option<String>,
	{
		let mut token = Self::new(lookup(ACCESS_TOKEN_ENV).unwrap_or_default());

		token.refresh_token = lookup(REFRESH_TOKEN_ENV).filter(|value| !value.is_empty());

		token
	}

	/// Adds a refresh secret.
	pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
		self.refresh_token = Some(refresh_token.into());

		self
	}

	/// Sets the access secret's expiry.
	pub fn with_expiry(mut self, expiry: OffsetDateTime) -> Self {
		self.expiry = Some(expiry);

		self
	}

	fn build(&self) -> Result<Credential, ConsentError> {
		if self.access_token.trim().is_empty() {
			return Err(ConsentError::Validation { reason: "static access token is empty".into() });
		}

		let mut builder = Credential::builder().access_token(self.access_token.clone());

		if let Some(expiry) = self.expiry {
			builder = builder.expiry(expiry);
		}

		if let Some(refresh) = &self.refresh_token {
			builder = builder.refresh_token(refresh.clone());
		}

		builder.build().map_err(|e| ConsentError::Validation { reason: e.to_string() })
	}
}
impl Debug for StaticToken {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("StaticToken")
			.field("access_token", &"<redacted>")
			.field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
			.field("expiry", &self.expiry)
			.finish()
	}
}
impl CredentialSource for StaticToken {
	fn label(&self) -> &'static str {
		"static_token"
	}

	fn obtain(&self) -> ConsentFuture<'_> {
		Box::pin(async move {
			let result = self.build();

			obs::record_result(FlowKind::StaticToken, &result);

			result
		})
	}
}
