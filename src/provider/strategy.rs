//! Classification of token-endpoint failures.

// self
use crate::{_prelude::*, provider::GrantType};

/// Decides how a rejected token request maps onto the crate's error taxonomy.
pub trait ProviderStrategy
where
	Self: Send + Sync,
{
	/// Classifies a failed token request.
	fn classify_token_error(&self, ctx: &ProviderErrorContext) -> ProviderErrorKind;
}

/// Failure categories a token-endpoint rejection can fall into.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ProviderErrorKind {
	/// Code, refresh token, or assertion was rejected.
	InvalidGrant,
	/// Client or service account is not allowed to authenticate.
	InvalidClient,
	/// Requested scopes were refused.
	InsufficientScope,
	/// Worth retrying later.
	Transient,
}

/// What the token endpoint answered, reduced to plain data.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProviderErrorContext {
	/// Grant of the failing request.
	pub grant_type: GrantType,
	/// HTTP status, when a response arrived.
	pub http_status: Option<u16>,
	/// OAuth `error` code.
	pub oauth_error: Option<String>,
	/// OAuth `error_description`.
	pub error_description: Option<String>,
	/// Start of a non-JSON response body.
	pub body_preview: Option<String>,
}
impl ProviderErrorContext {
	const BODY_PREVIEW_LIMIT: usize = 256;

	/// Empty context for `grant_type`.
	pub fn new(grant_type: GrantType) -> Self {
		Self {
			grant_type,
			http_status: None,
			oauth_error: None,
			error_description: None,
			body_preview: None,
		}
	}

	/// Records the HTTP status.
	pub fn with_http_status(mut self, status: u16) -> Self {
		self.http_status = Some(status);

		self
	}

	/// Records the OAuth `error` code.
	pub fn with_oauth_error(mut self, error: impl Into<String>) -> Self {
		self.oauth_error = Some(error.into());

		self
	}

	/// Records the OAuth `error_description`.
	pub fn with_error_description(mut self, description: impl Into<String>) -> Self {
		self.error_description = Some(description.into());

		self
	}

	/// Records a body preview, truncated to 256 characters.
	pub fn with_body_preview(mut self, body: impl AsRef<str>) -> Self {
		let body = body.as_ref().trim();
		let mut preview = body.chars().take(Self::BODY_PREVIEW_LIMIT).collect::<String>();

		if body.chars().nth(Self::BODY_PREVIEW_LIMIT).is_some() {
			preview.push('…');
		}

		self.body_preview = Some(preview);

		self
	}

	/// Human-readable reason: description, then error code, then body, then status.
	pub fn reason(&self) -> String {
		self.error_description
			.as_deref()
			.or(self.oauth_error.as_deref())
			.or(self.body_preview.as_deref())
			.map(str::to_owned)
			.unwrap_or_else(|| match self.http_status {
				Some(status) => format!("HTTP {status}"),
				None => "no response".into(),
			})
	}
}

/// Classifier tuned for Google's token endpoint.
///
/// The OAuth `error` code wins; a body without one is searched for a known code; otherwise the
/// HTTP status decides.
#[derive(Debug, Default)]
pub struct DefaultProviderStrategy;
impl ProviderStrategy for DefaultProviderStrategy {
	fn classify_token_error(&self, ctx: &ProviderErrorContext) -> ProviderErrorKind {
		ctx.oauth_error
			.as_deref()
			.and_then(kind_of_code)
			.or_else(|| ctx.body_preview.as_deref().and_then(kind_in_text))
			.unwrap_or_else(|| kind_of_status(ctx.http_status))
	}
}

const CODES: &[(&str, ProviderErrorKind)] = &[
	("invalid_grant", ProviderErrorKind::InvalidGrant),
	("access_denied", ProviderErrorKind::InvalidGrant),
	("invalid_client", ProviderErrorKind::InvalidClient),
	("unauthorized_client", ProviderErrorKind::InvalidClient),
	("admin_policy_enforced", ProviderErrorKind::InvalidClient),
	("org_internal", ProviderErrorKind::InvalidClient),
	("invalid_scope", ProviderErrorKind::InsufficientScope),
	("temporarily_unavailable", ProviderErrorKind::Transient),
	("server_error", ProviderErrorKind::Transient),
	("rate_limit_exceeded", ProviderErrorKind::Transient),
];

fn kind_of_code(code: &str) -> Option<ProviderErrorKind> {
	CODES.iter().find(|(known, _)| code.eq_ignore_ascii_case(known)).map(|(_, kind)| *kind)
}

fn kind_in_text(text: &str) -> Option<ProviderErrorKind> {
	let lowered = text.to_ascii_lowercase();

	CODES.iter().find(|(known, _)| lowered.contains(known)).map(|(_, kind)| *kind)
}

fn kind_of_status(status: Option<u16>) -> ProviderErrorKind {
	match status {
		Some(400) => ProviderErrorKind::InvalidGrant,
		Some(401) => ProviderErrorKind::InvalidClient,
		Some(403) => ProviderErrorKind::InsufficientScope,
		_ => ProviderErrorKind::Transient,
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn classify(ctx: ProviderErrorContext) -> ProviderErrorKind {
		DefaultProviderStrategy.classify_token_error(&ctx)
	}

	#[test]
	fn oauth_code_wins_over_status() {
		let ctx = ProviderErrorContext::new(GrantType::AuthorizationCode)
			.with_http_status(503)
			.with_oauth_error("invalid_grant")
			.with_error_description("Malformed auth code.");

		assert_eq!(classify(ctx.clone()), ProviderErrorKind::InvalidGrant);
		assert_eq!(ctx.reason(), "Malformed auth code.");
	}

	#[test]
	fn workspace_policy_rejections_are_client_failures() {
		for code in ["admin_policy_enforced", "org_internal", "UNAUTHORIZED_CLIENT"] {
			let ctx = ProviderErrorContext::new(GrantType::JwtBearer)
				.with_http_status(400)
				.with_oauth_error(code);

			assert_eq!(classify(ctx), ProviderErrorKind::InvalidClient, "{code}");
		}
	}

	#[test]
	fn plain_bodies_and_statuses_are_fallbacks() {
		let html = ProviderErrorContext::new(GrantType::RefreshToken)
			.with_http_status(400)
			.with_body_preview("<html>Error: invalid_scope</html>");
		let bare = ProviderErrorContext::new(GrantType::RefreshToken).with_http_status(401);
		let busy = ProviderErrorContext::new(GrantType::RefreshToken).with_http_status(502);

		assert_eq!(classify(html), ProviderErrorKind::InsufficientScope);
		assert_eq!(classify(bare.clone()), ProviderErrorKind::InvalidClient);
		assert_eq!(bare.reason(), "HTTP 401");
		assert_eq!(classify(busy), ProviderErrorKind::Transient);
	}

	#[test]
	fn previews_are_truncated() {
		let ctx = ProviderErrorContext::new(GrantType::JwtBearer).with_body_preview("x".repeat(400));
		let preview = ctx.body_preview.expect("Preview should be recorded.");

		assert_eq!(preview.chars().count(), ProviderErrorContext::BODY_PREVIEW_LIMIT + 1);
		assert!(preview.ends_with('…'));
	}
}
