//! HTTP seams shared by token exchanges and signed API calls.
//!
//! [`TokenHttpClient`] is the only dependency the OAuth client has on an HTTP stack. It hands out
//! short-lived [`AsyncHttpClient`] handles that publish [`ResponseMetadata`] into a
//! [`ResponseMetadataSlot`], which the error mappers read to classify failures.
//! [`ReqwestHttpClient`] is the default implementation and also serves as the raw
//! [`ApiTransport`](crate::transport::ApiTransport) underneath signed transports.

// crates.io
use oauth2::{
	AsyncHttpClient, HttpClientError, HttpRequest, HttpResponse,
	http::{HeaderMap, header::RETRY_AFTER},
};
use time::format_description::well_known::Rfc2822;
// self
use crate::_prelude::*;
#[cfg(feature = "reqwest")]
use crate::{
	error::{ConfigError, TransientError, TransportError},
	transport::{ApiFuture, ApiTransport},
};

/// Default per-request timeout applied by [`ReqwestHttpClient::new`].
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::seconds(30);

/// HTTP transport able to execute token exchanges while publishing response metadata.
///
/// Implementations must be `Send + Sync + 'static`, and the handles they return must own
/// whatever state they need so request futures stay `Send` while in flight.
pub trait TokenHttpClient
where
	Self: 'static + Send + Sync,
{
	/// Concrete error emitted by the underlying transport.
	type TransportError: 'static + Send + Sync + StdError;

	/// [`AsyncHttpClient`] handle tied to a [`ResponseMetadataSlot`].
	type Handle: for<'c> AsyncHttpClient<
			'c,
			Error = HttpClientError<Self::TransportError>,
			Future: 'c + Send,
		>
		+ 'static
		+ Send
		+ Sync;

	/// Builds an [`AsyncHttpClient`] handle that records outcomes in `slot`.
	///
	/// Handles call [`ResponseMetadataSlot::take`] before dispatching and
	/// [`ResponseMetadataSlot::store`] once a status is known.
	fn with_metadata(&self, slot: ResponseMetadataSlot) -> Self::Handle;
}

/// Metadata captured from the most recent HTTP response.
#[derive(Clone, Debug, Default)]
pub struct ResponseMetadata {
	/// HTTP status code, if a response arrived.
	pub status: Option<u16>,
	/// Retry-After hint expressed as a relative duration.
	pub retry_after: Option<Duration>,
}

/// Thread-safe slot sharing [`ResponseMetadata`] between the transport and error layers.
#[derive(Clone, Debug, Default)]
pub struct ResponseMetadataSlot(Arc<Mutex<Option<ResponseMetadata>>>);
impl ResponseMetadataSlot {
	/// Stores new metadata for the current request.
	pub fn store(&self, meta: ResponseMetadata) {
		*self.0.lock() = Some(meta);
	}

	/// Returns the captured metadata, if any, consuming it from the slot.
	pub fn take(&self) -> Option<ResponseMetadata> {
		self.0.lock().take()
	}
}

/// Shared reqwest client used for token exchanges and API calls.
///
/// Redirects must stay disabled: token endpoints answer directly, and a redirected API call
/// would leak the `Authorization` header to another origin.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug)]
pub struct ReqwestHttpClient(pub ReqwestClient);
#[cfg(feature = "reqwest")]
impl ReqwestHttpClient {
	/// Builds a client with [`DEFAULT_REQUEST_TIMEOUT`] and redirects disabled.
	pub fn new() -> Result<Self, ConfigError> {
		Self::with_timeout(DEFAULT_REQUEST_TIMEOUT)
	}

	/// Builds a client with a custom per-request timeout and redirects disabled.
	pub fn with_timeout(timeout: Duration) -> Result<Self, ConfigError> {
		let timeout = timeout.try_into().map_err(ConfigError::http_client_build)?;
		let client = ReqwestClient::builder()
			.redirect(reqwest::redirect::Policy::none())
			.timeout(timeout)
			.build()?;

		Ok(Self(client))
	}

	/// Wraps an existing reqwest [`ReqwestClient`].
	pub fn with_client(client: ReqwestClient) -> Self {
		Self(client)
	}

	async fn send(&self, request: HttpRequest) -> Result<HttpResponse, reqwest::Error> {
		let response = self.0.execute(request.try_into()?).await?;
		let status = response.status();
		let headers = response.headers().to_owned();
		let mut converted = HttpResponse::new(response.bytes().await?.to_vec());

		*converted.status_mut() = status;
		*converted.headers_mut() = headers;

		Ok(converted)
	}
}
#[cfg(feature = "reqwest")]
impl AsRef<ReqwestClient> for ReqwestHttpClient {
	fn as_ref(&self) -> &ReqwestClient {
		&self.0
	}
}
#[cfg(feature = "reqwest")]
impl TokenHttpClient for ReqwestHttpClient {
	type Handle = InstrumentedHandle;
	type TransportError = ReqwestError;

	fn with_metadata(&self, slot: ResponseMetadataSlot) -> Self::Handle {
		InstrumentedHandle(Arc::new(InstrumentedHttpClient { client: self.clone(), slot }))
	}
}
#[cfg(feature = "reqwest")]
impl ApiTransport for ReqwestHttpClient {
	fn execute(&self, request: HttpRequest) -> ApiFuture<'_, HttpResponse> {
		Box::pin(async move { self.send(request).await.map_err(map_api_reqwest_error) })
	}
}

#[cfg(feature = "reqwest")]
struct InstrumentedHttpClient {
	client: ReqwestHttpClient,
	slot: ResponseMetadataSlot,
}

/// Handle returned by [`ReqwestHttpClient`] that records response metadata.
#[cfg(feature = "reqwest")]
#[derive(Clone)]
pub struct InstrumentedHandle(Arc<InstrumentedHttpClient>);
#[cfg(feature = "reqwest")]
impl<'c> AsyncHttpClient<'c> for InstrumentedHandle {
	type Error = HttpClientError<ReqwestError>;
	type Future =
		Pin<Box<dyn Future<Output = Result<HttpResponse, Self::Error>> + 'c + Send + Sync>>;

	fn call(&'c self, request: HttpRequest) -> Self::Future {
		let inner = Arc::clone(&self.0);

		Box::pin(async move {
			inner.slot.take();

			let response = inner.client.send(request).await.map_err(Box::new)?;

			inner.slot.store(ResponseMetadata {
				status: Some(response.status().as_u16()),
				retry_after: parse_retry_after(response.headers()),
			});

			Ok(response)
		})
	}
}

/// Maps reqwest failures of API calls: timeouts are transient, everything else is a network
/// failure (also retried by callers).
#[cfg(feature = "reqwest")]
fn map_api_reqwest_error(e: ReqwestError) -> Error {
	if e.is_timeout() {
		return TransientError::Api { message: e.to_string(), status: None, retry_after: None }
			.into();
	}

	TransportError::from(e).into()
}

/// Parses a `Retry-After` header given either in seconds or as an HTTP date.
pub(crate) fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
	let value = headers.get(RETRY_AFTER)?;
	let raw = value.to_str().ok()?.trim();

	if let Ok(secs) = raw.parse::<u32>() {
		return Some(Duration::seconds(secs.into()));
	}
	if let Ok(moment) = OffsetDateTime::parse(raw, &Rfc2822) {
		let delta = moment - OffsetDateTime::now_utc();

		if delta.is_positive() {
			return Some(delta);
		}
	}

	None
}

#[cfg(test)]
mod tests {
	// crates.io
	use oauth2::http::HeaderValue;
	// self
	use super::*;

	#[test]
	fn retry_after_accepts_seconds_and_ignores_garbage() {
		let mut headers = HeaderMap::new();

		assert_eq!(parse_retry_after(&headers), None);

		headers.insert(RETRY_AFTER, HeaderValue::from_static("7"));

		assert_eq!(parse_retry_after(&headers), Some(Duration::seconds(7)));

		headers.insert(RETRY_AFTER, HeaderValue::from_static("soon"));

		assert_eq!(parse_retry_after(&headers), None);
	}

	#[test]
	fn metadata_slot_hands_out_values_once() {
		let slot = ResponseMetadataSlot::default();

		slot.store(ResponseMetadata { status: Some(503), retry_after: None });

		assert_eq!(slot.take().and_then(|meta| meta.status), Some(503));
		assert!(slot.take().is_none());
	}
}
