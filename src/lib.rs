//! Resolve, cache, and reuse OAuth 2.0 bearer credentials for a remote file-storage API, then
//! page through its file listings with a request-signing transport.
//!
//! The crate is layered leaves-first:
//!
//! - [`store`] persists a single [`auth::Credential`] (JSON or binary encoding, atomic writes).
//! - [`consent`] obtains fresh credentials through interchangeable [`consent::CredentialSource`]
//!   strategies (interactive consent, static tokens, service-account assertions).
//! - [`lifecycle`] orchestrates both into a one-shot `resolve()` state machine.
//! - [`transport`] wraps a credential into a signing [`transport::ApiTransport`].
//! - [`listing`] walks cursor-paginated, filtered listings over that transport.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod auth;
pub mod config;
pub mod consent;
pub mod error;
pub mod http;
pub mod lifecycle;
pub mod listing;
pub mod oauth;
pub mod obs;
pub mod provider;
pub mod store;
pub mod transport;
#[cfg(any(test, feature = "test"))]
pub mod _preludet {
	//! Convenience re-exports, scripted collaborators, and helpers for tests; enabled via
	//! `cfg(test)` or the `test` crate feature.

	pub use crate::_prelude::*;

	// std
	use std::{
		collections::VecDeque,
		sync::atomic::{AtomicUsize, Ordering},
	};
	// crates.io
	use oauth2::http::{Method, Request, header::AUTHORIZATION};
	// self
	use crate::{
		auth::Credential,
		consent::{ConsentError, ConsentFuture, CredentialSource},
		oauth::{OAuthFuture, TokenRefresher},
		store::{MemoryStore, StoreFuture, TokenStore},
		transport::{ApiFuture, ApiTransport, HttpRequest, HttpResponse},
	};
	#[cfg(feature = "reqwest")]
	use crate::{
		auth::ScopeSet,
		config::{OOB_REDIRECT_URL, ServiceConfig},
		http::ReqwestHttpClient,
		oauth::{OAuthClient, ReqwestTransportErrorMapper},
		provider::{DefaultProviderStrategy, ProviderStrategy},
	};

	/// OAuth client type alias used by reqwest-backed tests.
	#[cfg(feature = "reqwest")]
	pub type ReqwestTestClient = OAuthClient<ReqwestHttpClient, ReqwestTransportErrorMapper>;

	/// Builds a reqwest HTTP client suited to local mock servers.
	#[cfg(feature = "reqwest")]
	pub fn test_reqwest_http_client() -> ReqwestHttpClient {
		let client = ReqwestClient::builder()
			.redirect(reqwest::redirect::Policy::none())
			.timeout(std::time::Duration::from_secs(5))
			.build()
			.expect("Failed to build Reqwest client for tests.");

		ReqwestHttpClient::with_client(client)
	}

	/// Builds a [`ServiceConfig`] whose endpoints point at the provided mock base URL.
	#[cfg(feature = "reqwest")]
	pub fn test_service_config(base_url: &str, scopes: &[&str]) -> ServiceConfig {
		let url = |path: &str| {
			Url::parse(&format!("{base_url}{path}")).expect("Mock endpoint URL should parse.")
		};

		ServiceConfig::builder("test-client", "test-secret")
			.authorization_endpoint(url("/authorize"))
			.token_endpoint(url("/token"))
			.redirect_url(Url::parse(OOB_REDIRECT_URL).expect("OOB redirect URL should parse."))
			.scopes(ScopeSet::new(scopes.iter().copied()).expect("Test scopes should be valid."))
			.build()
			.expect("Test service config should validate.")
	}

	/// Constructs an [`OAuthClient`] wired to the test transport and default strategy.
	#[cfg(feature = "reqwest")]
	pub fn build_reqwest_test_client(config: ServiceConfig) -> Arc<ReqwestTestClient> {
		let strategy: Arc<dyn ProviderStrategy> = Arc::new(DefaultProviderStrategy);

		Arc::new(OAuthClient::with_http_client(
			Arc::new(config),
			strategy,
			test_reqwest_http_client(),
			Arc::new(ReqwestTransportErrorMapper),
		))
	}

	/// Builds a bare `GET` request.
	pub fn get_request(url: &str) -> HttpRequest {
		Request::builder()
			.method(Method::GET)
			.uri(url)
			.body(Vec::new())
			.expect("Test request should build.")
	}

	/// [`ApiTransport`] that replays queued outcomes and records every request it sees.
	#[derive(Debug, Default)]
	pub struct ScriptedTransport {
		outcomes: Mutex<VecDeque<Result<HttpResponse>>>,
		requests: Mutex<Vec<HttpRequest>>,
	}
	impl ScriptedTransport {
		/// Queues a JSON response.
		pub fn push_json(&self, status: u16, body: &str) {
			let mut response = HttpResponse::new(body.as_bytes().to_vec());

			*response.status_mut() =
				oauth2::http::StatusCode::from_u16(status).expect("Test status should be valid.");

			self.outcomes.lock().push_back(Ok(response));
		}

		/// Queues a failure.
		pub fn push_error(&self, error: Error) {
			self.outcomes.lock().push_back(Err(error));
		}

		/// Number of requests executed so far.
		pub fn requests_seen(&self) -> usize {
			self.requests.lock().len()
		}

		/// URIs of every request executed so far.
		pub fn request_uris(&self) -> Vec<String> {
			self.requests.lock().iter().map(|r| r.uri().to_string()).collect()
		}

		/// `Authorization` header of every request executed so far.
		pub fn authorization_headers(&self) -> Vec<Option<String>> {
			self.requests
				.lock()
				.iter()
				.map(|r| {
					r.headers().get(AUTHORIZATION).and_then(|v| v.to_str().ok()).map(str::to_owned)
				})
				.collect()
		}
	}
	impl ApiTransport for ScriptedTransport {
		fn execute(&self, request: HttpRequest) -> ApiFuture<'_, HttpResponse> {
			self.requests.lock().push(request);

			let outcome = self
				.outcomes
				.lock()
				.pop_front()
				.expect("ScriptedTransport received more requests than scripted outcomes.");

			Box::pin(async move { outcome })
		}
	}

	/// [`TokenRefresher`] that either always succeeds with a fixed access token or always fails.
	#[derive(Debug)]
	pub struct ScriptedRefresher {
		access_token: Option<String>,
		calls: AtomicUsize,
	}
	impl ScriptedRefresher {
		/// Refresher that rotates to `access_token` (valid for one hour).
		pub fn succeeding(access_token: &str) -> Self {
			Self { access_token: Some(access_token.into()), calls: AtomicUsize::new(0) }
		}

		/// Refresher whose grant is always rejected.
		pub fn failing() -> Self {
			Self { access_token: None, calls: AtomicUsize::new(0) }
		}

		/// Number of refresh attempts so far.
		pub fn calls(&self) -> usize {
			self.calls.load(Ordering::SeqCst)
		}
	}
	impl TokenRefresher for ScriptedRefresher {
		fn refresh<'a>(&'a self, credential: &'a Credential) -> OAuthFuture<'a, Credential> {
			self.calls.fetch_add(1, Ordering::SeqCst);

			Box::pin(async move {
				let Some(access_token) = &self.access_token else {
					return Err(Error::InvalidGrant { reason: "Token has been revoked".into() });
				};
				let mut builder = Credential::builder()
					.access_token(access_token.clone())
					.expires_in(Duration::hours(1))
					.scope(credential.scope.clone());

				if let Some(refresh) = &credential.refresh_token {
					builder = builder.refresh_token(refresh.expose());
				}

				Ok(builder.build().expect("Refreshed credential should build."))
			})
		}
	}

	/// [`TokenStore`] over a [`MemoryStore`] that counts every load and save.
	#[derive(Debug, Default)]
	pub struct CountingStore {
		inner: MemoryStore,
		loads: AtomicUsize,
		saves: AtomicUsize,
	}
	impl CountingStore {
		/// Store pre-seeded with `credential`.
		pub fn with_credential(credential: Credential) -> Self {
			Self { inner: MemoryStore::with_credential(credential), ..Default::default() }
		}

		/// Number of loads so far.
		pub fn loads(&self) -> usize {
			self.loads.load(Ordering::SeqCst)
		}

		/// Number of saves so far.
		pub fn saves(&self) -> usize {
			self.saves.load(Ordering::SeqCst)
		}

		/// Currently stored credential.
		pub fn snapshot(&self) -> Option<Credential> {
			self.inner.snapshot()
		}
	}
	impl TokenStore for CountingStore {
		fn load(&self) -> StoreFuture<'_, Option<Credential>> {
			self.loads.fetch_add(1, Ordering::SeqCst);

			self.inner.load()
		}

		fn save(&self, credential: Credential) -> StoreFuture<'_, ()> {
			self.saves.fetch_add(1, Ordering::SeqCst);

			self.inner.save(credential)
		}
	}

	/// [`CredentialSource`] that always succeeds with a static token or always fails.
	#[derive(Debug)]
	pub struct ScriptedSource {
		label: &'static str,
		access_token: Option<String>,
		calls: AtomicUsize,
	}
	impl ScriptedSource {
		/// Source labeled `label` that yields `access_token` without expiry.
		pub fn succeeding(label: &'static str, access_token: &str) -> Self {
			Self { label, access_token: Some(access_token.into()), calls: AtomicUsize::new(0) }
		}

		/// Source labeled `label` whose operator never answers.
		pub fn failing(label: &'static str) -> Self {
			Self { label, access_token: None, calls: AtomicUsize::new(0) }
		}

		/// Number of obtain attempts so far.
		pub fn calls(&self) -> usize {
			self.calls.load(Ordering::SeqCst)
		}
	}
	impl CredentialSource for ScriptedSource {
		fn label(&self) -> &'static str {
			self.label
		}

		fn obtain(&self) -> ConsentFuture<'_> {
			self.calls.fetch_add(1, Ordering::SeqCst);

			Box::pin(async move {
				match &self.access_token {
					Some(token) => Ok(Credential::builder()
						.access_token(token.clone())
						.build()
						.expect("Scripted credential should build.")),
					None => Err(ConsentError::UserInput { reason: "no authorization code entered".into() }),
				}
			})
		}
	}
}

mod _prelude {
	pub use std::{
		collections::BTreeMap,
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		pin::Pin,
		str::FromStr,
		sync::Arc,
	};

	pub use async_lock::Mutex as AsyncMutex;
	pub use parking_lot::Mutex;
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, Result};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(all(test, feature = "reqwest"))] use {color_eyre as _, httpmock as _};
