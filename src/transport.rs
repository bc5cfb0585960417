//! Request-signing transports built from a resolved credential.
//!
//! [`TransportFactory::build`] wraps a [`Credential`] into a [`SignedTransport`], which attaches
//! the `Authorization` header to every request and refreshes the credential shortly before it
//! expires.

pub use oauth2::{HttpRequest, HttpResponse};

// crates.io
use oauth2::http::{HeaderValue, header::AUTHORIZATION};
// self
use crate::{
	_prelude::*,
	auth::Credential,
	error::{ConfigError, TransportError},
	oauth::TokenRefresher,
	provider::GrantType,
};

/// Refresh window used when none is configured.
pub const DEFAULT_REFRESH_WINDOW: Duration = Duration::seconds(60);

/// Boxed future returned by [`ApiTransport::execute`].
pub type ApiFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + 'a + Send>>;

/// Executes one HTTP request against the remote API.
///
/// Non-success statuses are returned as responses; only failures to obtain a response at all are
/// reported as errors.
pub trait ApiTransport
where
	Self: Send + Sync,
{
	/// Sends `request` and returns the full response.
	fn execute(&self, request: HttpRequest) -> ApiFuture<'_, HttpResponse>;
}
impl<T> ApiTransport for Arc<T>
where
	T: ?Sized + ApiTransport,
{
	fn execute(&self, request: HttpRequest) -> ApiFuture<'_, HttpResponse> {
		(**self).execute(request)
	}
}

/// Produces [`SignedTransport`]s that share one raw sender and one refresher.
pub struct TransportFactory<S>
where
	S: ?Sized + ApiTransport,
{
	sender: Arc<S>,
	refresher: Option<Arc<dyn TokenRefresher>>,
	refresh_window: Duration,
}
impl<S> TransportFactory<S>
where
	S: ?Sized + ApiTransport,
{
	/// Creates a factory around the raw (unsigned) sender.
	pub fn new(sender: impl Into<Arc<S>>) -> Self {
		Self { sender: sender.into(), refresher: None, refresh_window: DEFAULT_REFRESH_WINDOW }
	}

	/// Enables refreshing credentials that carry a refresh secret.
	pub fn with_refresher(mut self, refresher: Arc<dyn TokenRefresher>) -> Self {
		self.refresher = Some(refresher);

		self
	}

	/// Overrides how long before expiry a refresh is attempted; negative values mean zero.
	pub fn with_refresh_window(mut self, window: Duration) -> Self {
		self.refresh_window = if window.is_negative() { Duration::ZERO } else { window };

		self
	}

	/// Wraps `credential` into a signing transport.
	pub fn build(&self, credential: &Credential) -> SignedTransport<S> {
		SignedTransport {
			sender: self.sender.clone(),
			refresher: self.refresher.clone(),
			refresh_window: self.refresh_window,
			credential: Mutex::new(credential.clone()),
			refresh_gate: AsyncMutex::new(()),
		}
	}
}

/// Transport that signs every request with the credential it holds.
pub struct SignedTransport<S>
where
	S: ?Sized + ApiTransport,
{
	sender: Arc<S>,
	refresher: Option<Arc<dyn TokenRefresher>>,
	refresh_window: Duration,
	credential: Mutex<Credential>,
	refresh_gate: AsyncMutex<()>,
}
impl<S> SignedTransport<S>
where
	S: ?Sized + ApiTransport,
{
	/// Credential currently attached to requests, including any rotation performed so far.
	pub fn current_credential(&self) -> Credential {
		self.credential.lock().clone()
	}

	fn needs_refresh(&self, credential: &Credential) -> bool {
		self.refresher.is_some()
			&& credential.can_refresh()
			&& credential.expires_within(self.refresh_window, OffsetDateTime::now_utc())
	}

	async fn fresh_credential(&self) -> Result<Credential> {
		let current = self.current_credential();

		if !self.needs_refresh(&current) {
			return Ok(current);
		}

		let _gate = self.refresh_gate.lock().await;
		// Another request may have rotated the credential while this one waited.
		let current = self.current_credential();
		let Some(refresher) = self.refresher.as_ref().filter(|_| self.needs_refresh(&current))
		else {
			return Ok(current);
		};

		tracing::debug!("Refreshing credential before sending the request.");

		let refreshed = refresher.refresh(&current).await.map_err(|e| {
			tracing::warn!(error = %e, "Credential refresh failed.");

			TransportError::Refresh { grant: GrantType::RefreshToken, source: Box::new(e) }
		})?;

		*self.credential.lock() = refreshed.clone();

		Ok(refreshed)
	}
}
impl<S> ApiTransport for SignedTransport<S>
where
	S: ?Sized + ApiTransport,
{
	fn execute(&self, mut request: HttpRequest) -> ApiFuture<'_, HttpResponse> {
		Box::pin(async move {
			let credential = self.fresh_credential().await?;
			let mut value = HeaderValue::from_str(&credential.authorization_value()).map_err(
				|_| ConfigError::InvalidValue {
					field: "access_token",
					value: "<redacted>".into(),
				},
			)?;

			value.set_sensitive(true);
			request.headers_mut().insert(AUTHORIZATION, value);

			self.sender.execute(request).await
		})
	}
}
impl<S> Debug for SignedTransport<S>
where
	S: ?Sized + ApiTransport,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("SignedTransport")
			.field("credential", &*self.credential.lock())
			.field("refresh_window", &self.refresh_window)
			.finish_non_exhaustive()
	}
}
