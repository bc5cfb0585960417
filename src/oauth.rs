//! OAuth 2.0 token-endpoint client: authorization URLs, code exchange, refresh, and the JWT
//! bearer assertion grant used by service accounts.

pub use oauth2;

// crates.io
use oauth2::{
	AsyncHttpClient, AuthType, AuthUrl, AuthorizationCode, ClientId, ClientSecret, EndpointNotSet,
	EndpointSet, HttpClientError, RedirectUrl, RefreshToken, RequestTokenError, TokenResponse,
	TokenUrl,
	basic::{BasicClient, BasicErrorResponse, BasicRequestTokenError, BasicTokenType},
	http::{
		Method, Request,
		header::{ACCEPT, CONTENT_TYPE},
	},
};
// self
use crate::{
	_prelude::*,
	auth::{Credential, DEFAULT_TOKEN_TYPE, ScopeSet},
	config::{ClientAuthMethod, ServiceConfig},
	error::{ConfigError, TransientError, TransportError},
	http::{ResponseMetadata, ResponseMetadataSlot, TokenHttpClient},
	obs::{self, FlowKind, FlowSpan},
	provider::{GrantType, ProviderErrorContext, ProviderErrorKind, ProviderStrategy},
};
#[cfg(feature = "reqwest")]
use crate::{http::ReqwestHttpClient, provider::DefaultProviderStrategy};

type ConfiguredBasicClient =
	BasicClient<EndpointSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>;
type TokenEndpointResponse = oauth2::basic::BasicTokenResponse;

/// Boxed future returned by token-endpoint operations.
pub type OAuthFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + 'a + Send>>;

/// Rotates an expiring credential into a fresh one.
///
/// Implemented by [`OAuthClient`]; the lifecycle manager and signed transports depend only on
/// this trait so tests can substitute scripted refreshers.
pub trait TokenRefresher
where
	Self: Send + Sync,
{
	/// Exchanges `credential`'s refresh secret for a new credential.
	fn refresh<'a>(&'a self, credential: &'a Credential) -> OAuthFuture<'a, Credential>;
}

/// Maps HTTP transport failures into crate [`Error`] values.
pub trait TransportErrorMapper<E>
where
	Self: 'static + Send + Sync,
	E: 'static + Send + Sync + StdError,
{
	/// Converts an [`HttpClientError`] emitted by the transport into a crate error.
	fn map_transport_error(
		&self,
		grant: GrantType,
		metadata: Option<&ResponseMetadata>,
		error: HttpClientError<E>,
	) -> Error;
}

/// Default mapper for reqwest-backed transports.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug, Default)]
pub struct ReqwestTransportErrorMapper;
#[cfg(feature = "reqwest")]
impl TransportErrorMapper<ReqwestError> for ReqwestTransportErrorMapper {
	fn map_transport_error(
		&self,
		_grant: GrantType,
		meta: Option<&ResponseMetadata>,
		err: HttpClientError<ReqwestError>,
	) -> Error {
		match err {
			HttpClientError::Reqwest(inner) => map_reqwest_error(meta, *inner),
			HttpClientError::Http(inner) => ConfigError::from(inner).into(),
			HttpClientError::Io(inner) => TransportError::Io(inner).into(),
			HttpClientError::Other(message) => map_generic_transport_error(meta, message),
			_ => map_generic_transport_error(meta, "unknown failure"),
		}
	}
}

/// Token-endpoint client bound to one [`ServiceConfig`].
pub struct OAuthClient<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	config: Arc<ServiceConfig>,
	strategy: Arc<dyn ProviderStrategy>,
	oauth_client: ConfiguredBasicClient,
	http_client: Arc<C>,
	error_mapper: Arc<M>,
}
#[cfg(feature = "reqwest")]
impl OAuthClient<ReqwestHttpClient, ReqwestTransportErrorMapper> {
	/// Builds a client backed by a fresh [`ReqwestHttpClient`] and the default strategy.
	pub fn new(config: impl Into<Arc<ServiceConfig>>) -> Result<Self> {
		let http_client = ReqwestHttpClient::new()?;

		Ok(Self::with_http_client(
			config,
			Arc::new(DefaultProviderStrategy),
			http_client,
			Arc::new(ReqwestTransportErrorMapper),
		))
	}
}
impl<C, M> OAuthClient<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Builds a client around a caller-provided HTTP transport and error mapper.
	pub fn with_http_client(
		config: impl Into<Arc<ServiceConfig>>,
		strategy: Arc<dyn ProviderStrategy>,
		http_client: impl Into<Arc<C>>,
		error_mapper: impl Into<Arc<M>>,
	) -> Self {
		let config = config.into();
		let mut oauth_client = BasicClient::new(ClientId::new(config.client_id.clone()))
			.set_client_secret(ClientSecret::new(config.client_secret.expose().to_owned()))
			.set_auth_uri(AuthUrl::from_url(config.endpoints.authorization.clone()))
			.set_token_uri(TokenUrl::from_url(config.endpoints.token.clone()))
			.set_redirect_uri(RedirectUrl::from_url(config.redirect_url.clone()));

		if matches!(config.client_auth_method, ClientAuthMethod::ClientSecretPost) {
			oauth_client = oauth_client.set_auth_type(AuthType::RequestBody);
		}

		Self {
			config,
			strategy,
			oauth_client,
			http_client: http_client.into(),
			error_mapper: error_mapper.into(),
		}
	}

	/// Configuration this client was built from.
	pub fn config(&self) -> &ServiceConfig {
		&self.config
	}

	/// Builds the consent URL the operator must visit.
	///
	/// Carries `response_type=code`, the client id, redirect URL, requested scopes, `state`,
	/// and `access_type=offline` so the provider also issues a refresh token.
	pub fn authorize_url(&self, state: &str) -> Url {
		let mut url = self.config.endpoints.authorization.clone();

		{
			let mut pairs = url.query_pairs_mut();

			pairs
				.append_pair("response_type", "code")
				.append_pair("client_id", &self.config.client_id)
				.append_pair("redirect_uri", self.config.redirect_url.as_str());

			if let Some(scope) = self.config.scope_param() {
				pairs.append_pair("scope", &scope);
			}

			pairs.append_pair("state", state).append_pair("access_type", "offline");
		}

		url
	}

	/// Exchanges an authorization code for a credential.
	pub fn exchange_code<'a>(&'a self, code: &'a str) -> OAuthFuture<'a, Credential> {
		let meta = ResponseMetadataSlot::default();

		Box::pin(async move {
			let instrumented = self.http_client.with_metadata(meta.clone());
			let response = self
				.oauth_client
				.exchange_code(AuthorizationCode::new(code.to_owned()))
				.request_async(&instrumented)
				.await
				.map_err(|err| {
					self.map_request_error(GrantType::AuthorizationCode, meta.take(), err)
				})?;

			credential_from_response(&response, &self.config.scopes, None)
		})
	}

	fn map_request_error(
		&self,
		grant: GrantType,
		meta: Option<ResponseMetadata>,
		err: BasicRequestTokenError<HttpClientError<C::TransportError>>,
	) -> Error {
		let meta_ref = meta.as_ref();

		match err {
			RequestTokenError::ServerResponse(response) =>
				map_server_response_error(self.strategy.as_ref(), grant, &response, meta_ref),
			RequestTokenError::Request(error) =>
				self.error_mapper.map_transport_error(grant, meta_ref, error),
			RequestTokenError::Parse(error, _body) =>
				TransientError::TokenResponseParse { source: error, status: meta_status(meta_ref) }
					.into(),
			RequestTokenError::Other(message) => TransientError::TokenEndpoint {
				message,
				status: meta_status(meta_ref),
				retry_after: meta_retry_after(meta_ref),
			}
			.into(),
		}
	}
}
impl<C, M> TokenRefresher for OAuthClient<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn refresh<'a>(&'a self, credential: &'a Credential) -> OAuthFuture<'a, Credential> {
		let meta = ResponseMetadataSlot::default();

		Box::pin(async move {
			let span = FlowSpan::new(FlowKind::Refresh, "refresh");
			let result = span
				.instrument(async {
					let refresh_secret = credential
						.refresh_token
						.as_ref()
						.filter(|secret| !secret.expose().is_empty())
						.ok_or(ConfigError::MissingRefreshToken)?;
					let instrumented = self.http_client.with_metadata(meta.clone());
					let secret = RefreshToken::new(refresh_secret.expose().to_owned());
					let response = self
						.oauth_client
						.exchange_refresh_token(&secret)
						.request_async(&instrumented)
						.await
						.map_err(|err| {
							self.map_request_error(GrantType::RefreshToken, meta.take(), err)
						})?;

					credential_from_response(&response, &credential.scope, Some(credential))
				})
				.await;

			obs::record_result(FlowKind::Refresh, &result);

			result
		})
	}
}
impl<C, M> Debug for OAuthClient<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("OAuthClient").field("config", &self.config).finish_non_exhaustive()
	}
}

/// Performs the JWT bearer grant against `token_url` using a bare token transport.
pub(crate) async fn exchange_jwt_bearer<C, M>(
	http_client: &C,
	error_mapper: &M,
	strategy: &dyn ProviderStrategy,
	token_url: &Url,
	assertion: &str,
	scope: &ScopeSet,
) -> Result<Credential>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	let grant = GrantType::JwtBearer;
	let body = url::form_urlencoded::Serializer::new(String::new())
		.append_pair("grant_type", grant.as_str())
		.append_pair("assertion", assertion)
		.finish();
	let request = Request::builder()
		.method(Method::POST)
		.uri(token_url.as_str())
		.header(CONTENT_TYPE, "application/x-www-form-urlencoded")
		.header(ACCEPT, "application/json")
		.body(body.into_bytes())
		.map_err(ConfigError::from)?;
	let meta = ResponseMetadataSlot::default();
	let handle = http_client.with_metadata(meta.clone());
	let response = handle
		.call(request)
		.await
		.map_err(|err| error_mapper.map_transport_error(grant, meta.take().as_ref(), err))?;
	let meta = meta.take();
	let status = response.status();

	if status.is_success() {
		let mut de = serde_json::Deserializer::from_slice(response.body());
		let parsed: TokenEndpointResponse = serde_path_to_error::deserialize(&mut de)
			.map_err(|source| TransientError::TokenResponseParse {
				source,
				status: Some(status.as_u16()),
			})?;

		return credential_from_response(&parsed, scope, None);
	}

	match serde_json::from_slice::<BasicErrorResponse>(response.body()) {
		Ok(parsed) => Err(map_server_response_error(strategy, grant, &parsed, meta.as_ref())),
		Err(_) => {
			let ctx = ProviderErrorContext::new(grant)
				.with_http_status(status.as_u16())
				.with_body_preview(String::from_utf8_lossy(response.body()));

			Err(classified_error(strategy.classify_token_error(&ctx), ctx.reason(), meta.as_ref()))
		},
	}
}

fn credential_from_response(
	response: &TokenEndpointResponse,
	requested_scope: &ScopeSet,
	previous: Option<&Credential>,
) -> Result<Credential> {
	let token_type = match response.token_type() {
		BasicTokenType::Bearer => DEFAULT_TOKEN_TYPE.to_owned(),
		other => other.as_ref().to_owned(),
	};
	let scope = match response.scopes() {
		Some(scopes) =>
			ScopeSet::new(scopes.iter().map(|scope| scope.as_str())).map_err(ConfigError::from)?,
		None => requested_scope.clone(),
	};
	let mut builder = Credential::builder()
		.access_token(response.access_token().secret().to_owned())
		.token_type(token_type)
		.issued_at(OffsetDateTime::now_utc())
		.scope(scope);

	if let Some(expires_in) = response.expires_in() {
		let secs =
			i64::try_from(expires_in.as_secs()).map_err(|_| ConfigError::ExpiresInOutOfRange)?;

		builder = builder.expires_in(Duration::seconds(secs));
	}

	// Providers may omit the refresh token on refresh; the previous one stays valid.
	let refresh = response
		.refresh_token()
		.map(|token| token.secret().to_owned())
		.or_else(|| previous.and_then(|c| c.refresh_token.as_ref()).map(|t| t.expose().to_owned()));

	if let Some(refresh) = refresh {
		builder = builder.refresh_token(refresh);
	}

	builder.build().map_err(|e| ConfigError::from(e).into())
}

fn map_server_response_error(
	strategy: &dyn ProviderStrategy,
	grant: GrantType,
	response: &BasicErrorResponse,
	meta: Option<&ResponseMetadata>,
) -> Error {
	let mut ctx =
		ProviderErrorContext::new(grant).with_oauth_error(response.error().as_ref().to_string());

	if let Some(description) = response.error_description() {
		ctx = ctx.with_error_description(description.clone());
	}
	if let Some(status) = meta_status(meta) {
		ctx = ctx.with_http_status(status);
	}

	classified_error(strategy.classify_token_error(&ctx), ctx.reason(), meta)
}

fn classified_error(
	kind: ProviderErrorKind,
	reason: String,
	meta: Option<&ResponseMetadata>,
) -> Error {
	match kind {
		ProviderErrorKind::InvalidGrant => Error::InvalidGrant { reason },
		ProviderErrorKind::InvalidClient => Error::InvalidClient { reason },
		ProviderErrorKind::InsufficientScope => Error::InsufficientScope { reason },
		ProviderErrorKind::Transient => TransientError::TokenEndpoint {
			message: reason,
			status: meta_status(meta),
			retry_after: meta_retry_after(meta),
		}
		.into(),
	}
}

#[cfg(feature = "reqwest")]
fn map_reqwest_error(meta: Option<&ResponseMetadata>, err: ReqwestError) -> Error {
	if err.is_builder() {
		return ConfigError::from(err).into();
	}
	if err.is_timeout() {
		return TransientError::TokenEndpoint {
			message: "request timed out while calling the token endpoint".into(),
			status: meta_status(meta).or_else(|| err.status().map(|code| code.as_u16())),
			retry_after: meta_retry_after(meta),
		}
		.into();
	}

	TransportError::from(err).into()
}

#[cfg(feature = "reqwest")]
fn map_generic_transport_error(meta: Option<&ResponseMetadata>, message: impl Display) -> Error {
	TransientError::TokenEndpoint {
		message: format!("HTTP client error while calling the token endpoint: {message}"),
		status: meta_status(meta),
		retry_after: meta_retry_after(meta),
	}
	.into()
}

fn meta_status(meta: Option<&ResponseMetadata>) -> Option<u16> {
	meta.and_then(|value| value.status)
}

fn meta_retry_after(meta: Option<&ResponseMetadata>) -> Option<Duration> {
	meta.and_then(|value| value.retry_after)
}

#[cfg(all(test, feature = "reqwest"))]
mod tests {
	// self
	use super::*;
	use crate::config::{DRIVE_READONLY_SCOPE, OOB_REDIRECT_URL};

	fn client() -> OAuthClient<ReqwestHttpClient, ReqwestTransportErrorMapper> {
		let config = ServiceConfig::builder("client-123", "secret")
			.build()
			.expect("Default service config should validate.");

		OAuthClient::new(config).expect("OAuth client should build.")
	}

	#[test]
	fn authorize_url_requests_offline_access() {
		let url = client().authorize_url("state-token");
		let pairs: BTreeMap<String, String> = url.query_pairs().into_owned().collect();

		assert!(url.as_str().starts_with(crate::config::GOOGLE_AUTH_URL));
		assert_eq!(pairs.get("response_type").map(String::as_str), Some("code"));
		assert_eq!(pairs.get("client_id").map(String::as_str), Some("client-123"));
		assert_eq!(pairs.get("redirect_uri").map(String::as_str), Some(OOB_REDIRECT_URL));
		assert_eq!(pairs.get("scope").map(String::as_str), Some(DRIVE_READONLY_SCOPE));
		assert_eq!(pairs.get("state").map(String::as_str), Some("state-token"));
		assert_eq!(pairs.get("access_type").map(String::as_str), Some("offline"));
	}

	#[test]
	fn responses_without_refresh_token_keep_the_previous_one() {
		let previous = Credential::builder()
			.access_token("old")
			.refresh_token("keep-me")
			.build()
			.expect("Previous credential should build.");
		let response: TokenEndpointResponse = serde_json::from_str(
			r#"{"access_token":"new","token_type":"Bearer","expires_in":3600}"#,
		)
		.expect("Token response fixture should parse.");
		let refreshed = credential_from_response(&response, &ScopeSet::default(), Some(&previous))
			.expect("Credential should be built from the response.");

		assert_eq!(refreshed.access_token.expose(), "new");
		assert_eq!(refreshed.refresh_token.as_ref().map(|t| t.expose()), Some("keep-me"));
		assert_eq!(refreshed.token_type, DEFAULT_TOKEN_TYPE);
		assert!(refreshed.expires_within(Duration::hours(1), OffsetDateTime::now_utc()));
	}

	#[test]
	fn responses_without_expiry_produce_caller_managed_credentials() {
		let response: TokenEndpointResponse =
			serde_json::from_str(r#"{"access_token":"abc","token_type":"bearer","scope":"a b"}"#)
				.expect("Token response fixture should parse.");
		let credential = credential_from_response(&response, &ScopeSet::default(), None)
			.expect("Credential should be built from the response.");

		assert_eq!(credential.expiry, None);
		assert_eq!(credential.scope.normalized(), "a b");
	}
}
