//! Grant identifiers and token-error classification.
//!
//! [`ProviderStrategy`] lets the OAuth client map token-endpoint rejections into the crate's
//! error taxonomy without depending on a particular HTTP client.

pub mod strategy;

pub use strategy::*;

// self
use crate::_prelude::*;

/// OAuth 2.0 grants used to mint or rotate credentials.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantType {
	/// Authorization Code grant driven by operator consent.
	AuthorizationCode,
	/// Refresh Token grant for long-lived sessions.
	RefreshToken,
	/// JWT bearer assertion grant (RFC 7523) used by service accounts.
	JwtBearer,
}
impl GrantType {
	/// Returns the wire identifier for the grant type.
	pub fn as_str(self) -> &'static str {
		match self {
			GrantType::AuthorizationCode => "authorization_code",
			GrantType::RefreshToken => "refresh_token",
			GrantType::JwtBearer => "urn:ietf:params:oauth:grant-type:jwt-bearer",
		}
	}
}
impl Display for GrantType {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}
