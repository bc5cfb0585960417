//! Immutable service configuration for the authorization server and OAuth client.
//!
//! [`ServiceConfig`] is built once at startup (from the environment, a JSON client-secret file,
//! or the builder) and then shared read-only by every component. Required fields that are absent
//! surface as [`ConfigError::MissingField`]; nothing here mutates process-wide state except the
//! explicit [`load_dotenv`] helper.

// std
use std::{env, path::Path};
// self
use crate::{
	_prelude::*,
	auth::{ScopeSet, TokenSecret},
	error::ConfigError,
};

/// Google's authorization endpoint, used when none is configured.
pub const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/auth";
/// Google's token endpoint, used when none is configured.
pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
/// Out-of-band redirect target that makes the provider display the code to the operator.
pub const OOB_REDIRECT_URL: &str = "urn:ietf:wg:oauth:2.0:oob";
/// Read-only Drive scope requested when none is configured.
pub const DRIVE_READONLY_SCOPE: &str = "https://www.googleapis.com/auth/drive.readonly";

/// Preferred client authentication modes for token endpoint calls.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientAuthMethod {
	#[default]
	/// HTTP Basic with `client_id`/`client_secret`.
	ClientSecretBasic,
	/// Form POST body parameters for `client_id`/`client_secret`.
	ClientSecretPost,
}
impl FromStr for ClientAuthMethod {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		match s.trim().to_ascii_lowercase().as_str() {
			"basic" | "client_secret_basic" => Ok(Self::ClientSecretBasic),
			"post" | "client_secret_post" => Ok(Self::ClientSecretPost),
			_ =>
				Err(ConfigError::InvalidValue { field: "client_auth_method", value: s.to_owned() }),
		}
	}
}

/// Authorization and token endpoints declared by the configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceEndpoints {
	/// Authorization endpoint used by the interactive consent flow.
	pub authorization: Url,
	/// Token endpoint used for code exchanges and refreshes.
	pub token: Url,
}

/// Immutable OAuth client configuration.
#[derive(Clone, PartialEq, Eq)]
pub struct ServiceConfig {
	/// OAuth client identifier.
	pub client_id: String,
	/// OAuth client secret.
	pub client_secret: TokenSecret,
	/// Endpoint URLs.
	pub endpoints: ServiceEndpoints,
	/// Redirect target registered for the client.
	pub redirect_url: Url,
	/// Scopes requested during consent.
	pub scopes: ScopeSet,
	/// How the client authenticates against the token endpoint.
	pub client_auth_method: ClientAuthMethod,
	/// Character used to join scopes in authorization URLs and grants.
	pub scope_delimiter: char,
}
impl ServiceConfig {
	/// Starts a builder seeded with the provided client credentials and Google defaults.
	pub fn builder(
		client_id: impl Into<String>,
		client_secret: impl Into<String>,
	) -> ServiceConfigBuilder {
		ServiceConfigBuilder::new(client_id.into(), client_secret.into())
	}

	/// Loads the configuration from unprefixed environment variables.
	pub fn from_env() -> Result<Self, ConfigError> {
		Self::from_env_with_prefix("")
	}

	/// Loads the configuration from environment variables named `<prefix><NAME>`.
	///
	/// `CLIENT_ID` and `CLIENT_SECRET` are required; `AUTH_URL`, `TOKEN_URL`, `REDIRECT_URL`,
	/// `SCOPES` (space- or comma-delimited), and `CLIENT_AUTH_METHOD` are optional.
	pub fn from_env_with_prefix(prefix: &str) -> Result<Self, ConfigError> {
		Self::from_lookup(prefix, |name| env::var(name).ok())
	}

	/// Loads the configuration through an arbitrary variable lookup.
	pub fn from_lookup<F>(prefix: &str, lookup: F) -> Result<Self, ConfigError>
	where
		F: Fn(&str) -> Option<String>,
	{
		let var = |name: &str| {
			lookup(&format!("{prefix}{name}")).filter(|value| !value.trim().is_empty())
		};
		let require =
			|name: &str| var(name).ok_or_else(|| ConfigError::missing(format!("{prefix}{name}")));
		let mut builder = Self::builder(require("CLIENT_ID")?, require("CLIENT_SECRET")?);

		if let Some(value) = var("AUTH_URL") {
			builder = builder.authorization_endpoint(parse_url("AUTH_URL", &value)?);
		}
		if let Some(value) = var("TOKEN_URL") {
			builder = builder.token_endpoint(parse_url("TOKEN_URL", &value)?);
		}
		if let Some(value) = var("REDIRECT_URL") {
			builder = builder.redirect_url(parse_url("REDIRECT_URL", &value)?);
		}
		if let Some(value) = var("SCOPES") {
			builder = builder.scopes(ScopeSet::parse_delimited(&value, &[' ', ','])?);
		}
		if let Some(value) = var("CLIENT_AUTH_METHOD") {
			builder = builder.client_auth_method(value.parse()?);
		}

		builder.build()
	}

	/// Parses a JSON payload: either a flat object or Google's client-secret file
	/// (`{"installed": {...}}` / `{"web": {...}}`).
	pub fn from_json(payload: &[u8]) -> Result<Self, ConfigError> {
		let mut de = serde_json::Deserializer::from_slice(payload);
		let raw: ConfigPayload = serde_path_to_error::deserialize(&mut de)
			.map_err(|source| ConfigError::Payload { source })?;
		let raw = match raw {
			ConfigPayload::Installed { installed } => installed,
			ConfigPayload::Web { web } => web,
			ConfigPayload::Flat(flat) => flat,
		};

		raw.into_config()
	}

	/// Reads and parses a JSON configuration file.
	pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
		let path = path.as_ref();
		let bytes = std::fs::read(path).map_err(|source| ConfigError::Unreadable {
			path: path.display().to_string(),
			source,
		})?;

		Self::from_json(&bytes)
	}

	/// Scope string joined with the configured delimiter.
	pub fn scope_param(&self) -> Option<String> {
		self.scopes.delimited(self.scope_delimiter)
	}
}
impl Debug for ServiceConfig {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ServiceConfig")
			.field("client_id", &self.client_id)
			.field("client_secret", &self.client_secret)
			.field("endpoints", &self.endpoints)
			.field("redirect_url", &self.redirect_url)
			.field("scopes", &self.scopes)
			.field("client_auth_method", &self.client_auth_method)
			.finish()
	}
}

/// Builder for [`ServiceConfig`] values.
#[derive(Debug)]
pub struct ServiceConfigBuilder {
	client_id: String,
	client_secret: TokenSecret,
	authorization_endpoint: Option<Url>,
	token_endpoint: Option<Url>,
	redirect_url: Option<Url>,
	scopes: Option<ScopeSet>,
	client_auth_method: ClientAuthMethod,
	scope_delimiter: char,
}
impl ServiceConfigBuilder {
	fn new(client_id: String, client_secret: String) -> Self {
		Self {
			client_id,
			client_secret: TokenSecret::new(client_secret),
			authorization_endpoint: None,
			token_endpoint: None,
			redirect_url: None,
			scopes: None,
			client_auth_method: ClientAuthMethod::default(),
			scope_delimiter: ' ',
		}
	}

	/// Sets the authorization endpoint.
	pub fn authorization_endpoint(mut self, url: Url) -> Self {
		self.authorization_endpoint = Some(url);

		self
	}

	/// Sets the token endpoint.
	pub fn token_endpoint(mut self, url: Url) -> Self {
		self.token_endpoint = Some(url);

		self
	}

	/// Sets the redirect target.
	pub fn redirect_url(mut self, url: Url) -> Self {
		self.redirect_url = Some(url);

		self
	}

	/// Sets the requested scopes.
	pub fn scopes(mut self, scopes: ScopeSet) -> Self {
		self.scopes = Some(scopes);

		self
	}

	/// Overrides the client authentication method.
	pub fn client_auth_method(mut self, method: ClientAuthMethod) -> Self {
		self.client_auth_method = method;

		self
	}

	/// Overrides the scope delimiter (defaults to a single space).
	pub fn scope_delimiter(mut self, delimiter: char) -> Self {
		self.scope_delimiter = delimiter;

		self
	}

	/// Consumes the builder and validates the resulting configuration.
	pub fn build(self) -> Result<ServiceConfig, ConfigError> {
		if self.client_id.trim().is_empty() {
			return Err(ConfigError::missing("client_id"));
		}
		if self.client_secret.expose().trim().is_empty() {
			return Err(ConfigError::missing("client_secret"));
		}

		let authorization = match self.authorization_endpoint {
			Some(url) => url,
			None => parse_url("auth_url", GOOGLE_AUTH_URL)?,
		};
		let token = match self.token_endpoint {
			Some(url) => url,
			None => parse_url("token_url", GOOGLE_TOKEN_URL)?,
		};
		let redirect_url = match self.redirect_url {
			Some(url) => url,
			None => parse_url("redirect_url", OOB_REDIRECT_URL)?,
		};
		let scopes = match self.scopes {
			Some(scopes) => scopes,
			None => ScopeSet::new([DRIVE_READONLY_SCOPE])?,
		};

		validate_endpoint("authorization", &authorization)?;
		validate_endpoint("token", &token)?;

		if self.scope_delimiter.is_control() {
			return Err(ConfigError::InvalidValue {
				field: "scope_delimiter",
				value: self.scope_delimiter.escape_default().to_string(),
			});
		}

		Ok(ServiceConfig {
			client_id: self.client_id,
			client_secret: self.client_secret,
			endpoints: ServiceEndpoints { authorization, token },
			redirect_url,
			scopes,
			client_auth_method: self.client_auth_method,
			scope_delimiter: self.scope_delimiter,
		})
	}
}

/// Loads `KEY=value` pairs from a `.env` file into the process environment.
///
/// Call this once from the embedding binary before [`ServiceConfig::from_env`]; variables that
/// are already set keep their values.
pub fn load_dotenv(path: impl AsRef<Path>) -> Result<(), ConfigError> {
	dotenvy::from_path(path.as_ref())?;

	Ok(())
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ConfigPayload {
	Installed { installed: RawConfig },
	Web { web: RawConfig },
	Flat(RawConfig),
}

#[derive(Default, Deserialize)]
struct RawConfig {
	client_id: Option<String>,
	client_secret: Option<String>,
	#[serde(alias = "auth_uri", alias = "authorization_url")]
	auth_url: Option<String>,
	#[serde(alias = "token_uri")]
	token_url: Option<String>,
	#[serde(alias = "redirect_uri")]
	redirect_url: Option<String>,
	#[serde(default)]
	redirect_uris: Vec<String>,
	#[serde(default)]
	scopes: Option<Vec<String>>,
	#[serde(default)]
	client_auth_method: Option<ClientAuthMethod>,
}
impl RawConfig {
	fn into_config(self) -> Result<ServiceConfig, ConfigError> {
		let client_id = self.client_id.ok_or_else(|| ConfigError::missing("client_id"))?;
		let client_secret =
			self.client_secret.ok_or_else(|| ConfigError::missing("client_secret"))?;
		let mut builder = ServiceConfig::builder(client_id, client_secret);

		if let Some(value) = self.auth_url {
			builder = builder.authorization_endpoint(parse_url("auth_url", &value)?);
		}
		if let Some(value) = self.token_url {
			builder = builder.token_endpoint(parse_url("token_url", &value)?);
		}
		if let Some(value) = self.redirect_url.or_else(|| self.redirect_uris.into_iter().next()) {
			builder = builder.redirect_url(parse_url("redirect_url", &value)?);
		}
		if let Some(scopes) = self.scopes {
			builder = builder.scopes(ScopeSet::new(scopes)?);
		}
		if let Some(method) = self.client_auth_method {
			builder = builder.client_auth_method(method);
		}

		builder.build()
	}
}

fn parse_url(field: &'static str, value: &str) -> Result<Url, ConfigError> {
	Url::parse(value.trim()).map_err(|source| ConfigError::InvalidUrl { field, source })
}

fn validate_endpoint(name: &'static str, url: &Url) -> Result<(), ConfigError> {
	let loopback = matches!(url.host_str(), Some("localhost" | "127.0.0.1" | "[::1]"));

	if url.scheme() == "https" || (url.scheme() == "http" && loopback) {
		Ok(())
	} else {
		Err(ConfigError::InsecureEndpoint { endpoint: name, url: url.to_string() })
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::collections::HashMap;
	// self
	use super::*;

	fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
		let map: HashMap<String, String> =
			vars.iter().map(|(k, v)| ((*k).to_owned(), (*v).to_owned())).collect();

		move |key| map.get(key).cloned()
	}

	#[test]
	fn env_lookup_applies_google_defaults() {
		let config = ServiceConfig::from_lookup(
			"",
			lookup(&[("CLIENT_ID", "client-123"), ("CLIENT_SECRET", "shh")]),
		)
		.expect("Minimal environment should produce a config.");

		assert_eq!(config.client_id, "client-123");
		assert_eq!(config.client_secret.expose(), "shh");
		assert_eq!(config.endpoints.authorization.as_str(), GOOGLE_AUTH_URL);
		assert_eq!(config.endpoints.token.as_str(), GOOGLE_TOKEN_URL);
		assert_eq!(config.redirect_url.as_str(), OOB_REDIRECT_URL);
		assert!(config.scopes.contains(DRIVE_READONLY_SCOPE));
	}

	#[test]
	fn env_lookup_reports_missing_and_blank_fields() {
		let err = ServiceConfig::from_lookup("DRIVE_", lookup(&[("DRIVE_CLIENT_ID", "id")]))
			.expect_err("Missing client secret must be fatal.");

		assert!(
			matches!(err, ConfigError::MissingField { ref field } if field == "DRIVE_CLIENT_SECRET")
		);

		let err = ServiceConfig::from_lookup(
			"",
			lookup(&[("CLIENT_ID", "   "), ("CLIENT_SECRET", "secret")]),
		)
		.expect_err("Blank client id must be treated as missing.");

		assert!(matches!(err, ConfigError::MissingField { .. }));
	}

	#[test]
	fn env_lookup_parses_overrides() {
		let config = ServiceConfig::from_lookup(
			"APP_",
			lookup(&[
				("APP_CLIENT_ID", "id"),
				("APP_CLIENT_SECRET", "secret"),
				("APP_TOKEN_URL", "http://127.0.0.1:8080/token"),
				("APP_SCOPES", "read-only, email  profile,,"),
				("APP_CLIENT_AUTH_METHOD", "post"),
			]),
		)
		.expect("Overrides should parse.");

		assert_eq!(config.endpoints.token.as_str(), "http://127.0.0.1:8080/token");
		assert_eq!(config.scopes.normalized(), "email profile read-only");
		assert_eq!(config.client_auth_method, ClientAuthMethod::ClientSecretPost);
	}

	#[test]
	fn insecure_remote_endpoints_are_rejected() {
		let err = ServiceConfig::builder("id", "secret")
			.token_endpoint(Url::parse("http://example.com/token").expect("URL should parse."))
			.build()
			.expect_err("Plain HTTP to a remote host must be rejected.");

		assert!(matches!(err, ConfigError::InsecureEndpoint { endpoint: "token", .. }));
	}

	#[test]
	fn json_accepts_installed_client_secret_shape() {
		let payload = br#"{
			"installed": {
				"client_id": "installed-id.apps.googleusercontent.com",
				"project_id": "demo",
				"auth_uri": "https://accounts.google.com/o/oauth2/auth",
				"token_uri": "https://oauth2.googleapis.com/token",
				"client_secret": "installed-secret",
				"redirect_uris": ["urn:ietf:wg:oauth:2.0:oob", "http://localhost"]
			}
		}"#;
		let config = ServiceConfig::from_json(payload).expect("Installed payload should parse.");

		assert_eq!(config.client_id, "installed-id.apps.googleusercontent.com");
		assert_eq!(config.redirect_url.as_str(), OOB_REDIRECT_URL);
	}

	#[test]
	fn json_flat_payload_requires_client_fields() {
		let err = ServiceConfig::from_json(br#"{"client_id": "only-id"}"#)
			.expect_err("Missing secret must be reported.");

		assert!(matches!(err, ConfigError::MissingField { ref field } if field == "client_secret"));
		assert!(matches!(
			ServiceConfig::from_json(b"not json"),
			Err(ConfigError::Payload { .. })
		));
	}

	#[test]
	fn debug_output_redacts_client_secret() {
		let config =
			ServiceConfig::builder("id", "very-secret").build().expect("Config should build.");

		assert!(!format!("{config:?}").contains("very-secret"));
	}
}
