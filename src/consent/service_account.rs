//! Service-account credentials minted through the JWT bearer grant (RFC 7523).

// crates.io
use jsonwebtoken::{Algorithm, EncodingKey, Header};
// self
use crate::{
	_prelude::*,
	auth::{Credential, ScopeSet, TokenSecret},
	consent::{ConsentError, ConsentFuture, CredentialSource},
	http::TokenHttpClient,
	oauth::{self, TransportErrorMapper},
	obs::{self, FlowKind, FlowSpan},
	provider::ProviderStrategy,
};
#[cfg(feature = "reqwest")] use std::path::Path;
#[cfg(feature = "reqwest")]
use crate::{
	error::ConfigError, http::ReqwestHttpClient, oauth::ReqwestTransportErrorMapper,
	provider::DefaultProviderStrategy,
};

/// Lifetime requested for each signed assertion.
pub const ASSERTION_LIFETIME: Duration = Duration::hours(1);

const SERVICE_ACCOUNT_TYPE: &str = "service_account";

/// Parsed service-account key file.
#[derive(Clone, Deserialize)]
pub struct ServiceAccountKey {
	/// Key kind; must be `service_account`.
	#[serde(rename = "type")]
	pub kind: String,
	/// Owning project, when present.
	#[serde(default)]
	pub project_id: Option<String>,
	/// Identifier of the signing key, sent as the JWT `kid`.
	pub private_key_id: String,
	/// PEM-encoded RSA private key.
	pub private_key: TokenSecret,
	/// Service-account identity, used as the assertion issuer.
	pub client_email: String,
	/// Token endpoint the assertion is exchanged at (also the assertion audience).
	pub token_uri: Url,
	/// Authorization endpoint advertised by the key file.
	#[serde(default)]
	pub auth_uri: Option<Url>,
}
impl ServiceAccountKey {
	/// Parses and validates a key file payload.
	pub fn from_json(payload: &[u8]) -> Result<Self, ConsentError> {
		let mut de = serde_json::Deserializer::from_slice(payload);
		let key: Self = serde_path_to_error::deserialize(&mut de)
			.map_err(|e| ConsentError::Parse { reason: e.to_string() })?;

		if key.kind != SERVICE_ACCOUNT_TYPE {
			return Err(ConsentError::Parse {
				reason: format!("expected key type `{SERVICE_ACCOUNT_TYPE}`, found `{}`", key.kind),
			});
		}
		if key.client_email.trim().is_empty() {
			return Err(ConsentError::Parse { reason: "client_email is empty".into() });
		}

		Ok(key)
	}

	/// Signs an RS256 assertion for `scope`, issued at `issued_at`.
	pub fn sign_assertion(
		&self,
		scope: &ScopeSet,
		subject: Option<&str>,
		issued_at: OffsetDateTime,
	) -> Result<String, ConsentError> {
		let encoding_key = EncodingKey::from_rsa_pem(self.private_key.expose().as_bytes())
			.map_err(|e| ConsentError::Parse { reason: format!("private_key is unusable: {e}") })?;
		let mut header = Header::new(Algorithm::RS256);

		header.kid = Some(self.private_key_id.clone());

		let iat = issued_at.unix_timestamp();
		let claims = AssertionClaims {
			iss: &self.client_email,
			scope: scope.normalized(),
			aud: self.token_uri.as_str(),
			iat,
			exp: iat + ASSERTION_LIFETIME.whole_seconds(),
			sub: subject,
		};

		jsonwebtoken::encode(&header, &claims, &encoding_key)
			.map_err(|e| ConsentError::Parse { reason: format!("assertion signing failed: {e}") })
	}
}
impl Debug for ServiceAccountKey {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ServiceAccountKey")
			.field("project_id", &self.project_id)
			.field("private_key_id", &self.private_key_id)
			.field("client_email", &self.client_email)
			.field("token_uri", &self.token_uri)
			.finish_non_exhaustive()
	}
}

#[derive(Serialize)]
struct AssertionClaims<'a> {
	iss: &'a str,
	scope: String,
	aud: &'a str,
	iat: i64,
	exp: i64,
	#[serde(skip_serializing_if = "Option::is_none")]
	sub: Option<&'a str>,
}

/// Credential source backed by a service-account key payload.
///
/// The payload is parsed on every [`obtain`](CredentialSource::obtain) so a malformed key is
/// reported as a source failure rather than at construction.
pub struct ServiceAccount<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	payload: Vec<u8>,
	scopes: ScopeSet,
	subject: Option<String>,
	strategy: Arc<dyn ProviderStrategy>,
	http_client: Arc<C>,
	error_mapper: Arc<M>,
}
#[cfg(feature = "reqwest")]
impl ServiceAccount<ReqwestHttpClient, ReqwestTransportErrorMapper> {
	/// Builds a source for `payload` backed by a fresh reqwest client.
	pub fn from_json(payload: impl Into<Vec<u8>>, scopes: ScopeSet) -> Result<Self, ConfigError> {
		Ok(Self::with_http_client(
			payload,
			scopes,
			Arc::new(DefaultProviderStrategy),
			ReqwestHttpClient::new()?,
			Arc::new(ReqwestTransportErrorMapper),
		))
	}

	/// Reads the key file at `path` and builds a source for it.
	pub fn from_file(path: impl AsRef<Path>, scopes: ScopeSet) -> Result<Self, ConfigError> {
		let path = path.as_ref();
		let payload = std::fs::read(path).map_err(|source| ConfigError::Unreadable {
			path: path.display().to_string(),
			source,
		})?;

		Self::from_json(payload, scopes)
	}
}
impl<C, M> ServiceAccount<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Builds a source around a caller-provided HTTP transport and error mapper.
	pub fn with_http_client(
		payload: impl Into<Vec<u8>>,
		scopes: ScopeSet,
		strategy: Arc<dyn ProviderStrategy>,
		http_client: impl Into<Arc<C>>,
		error_mapper: impl Into<Arc<M>>,
	) -> Self {
		Self {
			payload: payload.into(),
			scopes,
			subject: None,
			strategy,
			http_client: http_client.into(),
			error_mapper: error_mapper.into(),
		}
	}

	/// Impersonates `subject` (domain-wide delegation).
	pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
		self.subject = Some(subject.into());

		self
	}

	async fn run(&self) -> Result<Credential, ConsentError> {
		let key = ServiceAccountKey::from_json(&self.payload)?;
		let assertion =
			key.sign_assertion(&self.scopes, self.subject.as_deref(), OffsetDateTime::now_utc())?;

		tracing::debug!(client_email = %key.client_email, "Exchanging service-account assertion.");

		Ok(oauth::exchange_jwt_bearer(
			self.http_client.as_ref(),
			self.error_mapper.as_ref(),
			self.strategy.as_ref(),
			&key.token_uri,
			&assertion,
			&self.scopes,
		)
		.await?)
	}
}
impl<C, M> CredentialSource for ServiceAccount<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn label(&self) -> &'static str {
		"service_account"
	}

	fn obtain(&self) -> ConsentFuture<'_> {
		Box::pin(async move {
			let span = FlowSpan::new(FlowKind::ServiceAccount, "obtain");
			let result = span.instrument(self.run()).await;

			obs::record_result(FlowKind::ServiceAccount, &result);

			result
		})
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use jsonwebtoken::{DecodingKey, Validation};
	use time::macros;
	// self
	use super::*;

	const PRIVATE_KEY: &str = include_str!("../../tests/fixtures/service_account_key.pem");
	const PUBLIC_KEY: &str = include_str!("../../tests/fixtures/service_account_key.pub.pem");

	fn payload(kind: &str) -> Vec<u8> {
		serde_json::to_vec(&serde_json::json!({
			"type": kind,
			"project_id": "demo-project",
			"private_key_id": "kid-1",
			"private_key": PRIVATE_KEY,
			"client_email": "robot@demo-project.iam.gserviceaccount.com",
			"token_uri": "https://oauth2.googleapis.com/token",
			"auth_uri": "https://accounts.google.com/o/oauth2/auth",
		}))
		.expect("Key payload should serialize.")
	}

	#[derive(Deserialize)]
	struct DecodedClaims {
		iss: String,
		scope: String,
		aud: String,
		iat: i64,
		exp: i64,
		sub: Option<String>,
	}

	#[test]
	fn assertion_carries_issuer_scope_audience_and_lifetime() {
		let key = ServiceAccountKey::from_json(&payload("service_account"))
			.expect("Key payload should parse.");
		let scope = ScopeSet::new(["https://www.googleapis.com/auth/drive.readonly"])
			.expect("Scope fixture should be valid.");
		let issued_at = macros::datetime!(2030-01-01 00:00 UTC);
		let assertion = key
			.sign_assertion(&scope, Some("user@example.com"), issued_at)
			.expect("Assertion should be signed.");
		let header = jsonwebtoken::decode_header(&assertion).expect("Header should decode.");
		let mut validation = Validation::new(Algorithm::RS256);

		validation.set_audience(&["https://oauth2.googleapis.com/token"]);
		validation.validate_exp = false;

		let decoded = jsonwebtoken::decode::<DecodedClaims>(
			&assertion,
			&DecodingKey::from_rsa_pem(PUBLIC_KEY.as_bytes()).expect("Public key should load."),
			&validation,
		)
		.expect("Assertion should verify against the public key.")
		.claims;

		assert_eq!(header.kid.as_deref(), Some("kid-1"));
		assert_eq!(decoded.iss, "robot@demo-project.iam.gserviceaccount.com");
		assert_eq!(decoded.scope, "https://www.googleapis.com/auth/drive.readonly");
		assert_eq!(decoded.aud, "https://oauth2.googleapis.com/token");
		assert_eq!(decoded.iat, issued_at.unix_timestamp());
		assert_eq!(decoded.exp - decoded.iat, 3600);
		assert_eq!(decoded.sub.as_deref(), Some("user@example.com"));
	}

	#[test]
	fn malformed_payloads_are_parse_failures() {
		for bad in [b"{".to_vec(), payload("authorized_user"), br#"{"type":"service_account"}"#.to_vec()]
		{
			let err = ServiceAccountKey::from_json(&bad).expect_err("Malformed key must fail.");

			assert!(matches!(err, ConsentError::Parse { .. }), "Unexpected error: {err:?}");
		}
	}

	#[test]
	fn debug_output_hides_private_key() {
		let key = ServiceAccountKey::from_json(&payload("service_account"))
			.expect("Key payload should parse.");

		assert!(!format!("{key:?}").contains("PRIVATE KEY"));
	}
}
