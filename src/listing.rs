//! Cursor-paginated, filtered file listings over a signing transport.
//!
//! A [`ResourceLister`] issues one `GET` per page and follows `nextPageToken` until the server
//! stops returning one. Pages are fetched strictly one after another; items from completed pages
//! are handed to the caller before the next request is sent, so a late failure never discards
//! earlier results.

pub mod item;
pub mod query;

pub use item::*;
pub use query::*;

// crates.io
use oauth2::http::{
	Method, Request, StatusCode,
	header::{ACCEPT, HeaderValue},
};
// self
use crate::{
	_prelude::*,
	error::{ConfigError, TransientError},
	http::parse_retry_after,
	listing::item::ResourcePage,
	obs::{self, FlowKind, FlowSpan},
	transport::{ApiTransport, HttpRequest, HttpResponse},
};

/// Drive v3 file listing endpoint.
pub const DRIVE_FILES_ENDPOINT: &str = "https://www.googleapis.com/drive/v3/files";
/// Delay before the single retry of a transient page failure.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::seconds(1);

const MESSAGE_PREVIEW_LIMIT: usize = 256;

/// Totals reported by [`ResourceLister::for_each`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ListingSummary {
	/// Pages fully delivered.
	pub pages: usize,
	/// Items handed to the callback.
	pub items: usize,
	/// HTTP requests issued, retries included.
	pub requests: usize,
}

/// Lists remote files page by page.
#[derive(Debug)]
pub struct ResourceLister<T>
where
	T: ?Sized + ApiTransport,
{
	transport: Arc<T>,
	endpoint: Url,
	retry_delay: Duration,
}
impl<T> ResourceLister<T>
where
	T: ?Sized + ApiTransport,
{
	/// Lister against an arbitrary endpoint speaking the Drive listing format.
	pub fn new(transport: impl Into<Arc<T>>, endpoint: Url) -> Self {
		Self { transport: transport.into(), endpoint, retry_delay: DEFAULT_RETRY_DELAY }
	}

	/// Lister against [`DRIVE_FILES_ENDPOINT`].
	pub fn drive(transport: impl Into<Arc<T>>) -> Result<Self> {
		let endpoint = Url::parse(DRIVE_FILES_ENDPOINT)
			.map_err(|source| ConfigError::InvalidUrl { field: "endpoint", source })?;

		Ok(Self::new(transport, endpoint))
	}

	/// Overrides the retry delay; negative values mean zero.
	pub fn with_retry_delay(mut self, delay: Duration) -> Self {
		self.retry_delay = if delay.is_negative() { Duration::ZERO } else { delay };

		self
	}

	/// Listing endpoint.
	pub fn endpoint(&self) -> &Url {
		&self.endpoint
	}

	/// Starts a fresh traversal.
	pub fn pages(&self, query: &ListQuery) -> Pager<'_, T> {
		Pager {
			lister: self,
			query: query.clone(),
			cursor: None,
			done: false,
			pages: 0,
			items: 0,
			requests: 0,
		}
	}

	/// Hands every item to `callback` as soon as its page arrives.
	///
	/// On failure the callback has already seen every item of the completed pages; the error
	/// reports how many.
	pub async fn for_each<F>(&self, query: &ListQuery, mut callback: F) -> Result<ListingSummary>
	where
		F: FnMut(ResourceItem),
	{
		let span = FlowSpan::new(FlowKind::Listing, "for_each");
		let result = span
			.instrument(async {
				let mut pager = self.pages(query);

				while let Some(items) = pager.next_page().await? {
					items.into_iter().for_each(&mut callback);
				}

				Ok(pager.summary())
			})
			.await;

		obs::record_result(FlowKind::Listing, &result);

		result
	}

	/// Buffers the whole listing.
	pub async fn collect(&self, query: &ListQuery) -> Result<Vec<ResourceItem>> {
		let mut items = Vec::new();

		self.for_each(query, |item| items.push(item)).await?;

		Ok(items)
	}

	fn page_request(&self, query: &ListQuery, cursor: Option<&str>) -> Result<HttpRequest> {
		let mut url = self.endpoint.clone();

		query.apply(&mut url, cursor);

		let request = Request::builder()
			.method(Method::GET)
			.uri(url.as_str())
			.header(ACCEPT, HeaderValue::from_static("application/json"))
			.body(Vec::new())
			.map_err(ConfigError::from)?;

		Ok(request)
	}
}

/// One traversal of a listing; created by [`ResourceLister::pages`].
pub struct Pager<'a, T>
where
	T: ?Sized + ApiTransport,
{
	lister: &'a ResourceLister<T>,
	query: ListQuery,
	cursor: Option<String>,
	done: bool,
	pages: usize,
	items: usize,
	requests: usize,
}
impl<T> Pager<'_, T>
where
	T: ?Sized + ApiTransport,
{
	/// Fetches the next page.
	///
	/// Returns `Ok(None)` once the server stops returning a cursor, and after any failure.
	pub async fn next_page(&mut self) -> Result<Option<Vec<ResourceItem>>> {
		if self.done {
			return Ok(None);
		}

		match self.fetch_with_retry().await {
			Ok(mut page) => {
				self.cursor = page.take_cursor();
				self.done = self.cursor.is_none();
				self.pages += 1;
				self.items += page.files.len();

				tracing::debug!(
					page = self.pages,
					items = page.files.len(),
					has_more = !self.done,
					"Listing page received."
				);

				Ok(Some(page.files))
			},
			Err(e) => {
				self.done = true;

				Err(self.abort(e))
			},
		}
	}

	/// HTTP requests issued so far, retries included.
	pub fn requests_issued(&self) -> usize {
		self.requests
	}

	/// Pages delivered so far.
	pub fn pages_completed(&self) -> usize {
		self.pages
	}

	/// Items delivered so far.
	pub fn items_yielded(&self) -> usize {
		self.items
	}

	/// Totals for the traversal so far.
	pub fn summary(&self) -> ListingSummary {
		ListingSummary { pages: self.pages, items: self.items, requests: self.requests }
	}

	async fn fetch_with_retry(&mut self) -> Result<ResourcePage> {
		match self.fetch().await {
			Err(e) if e.is_transient() => {
				let delay = self.lister.retry_delay;

				tracing::warn!(
					page = self.pages + 1,
					delay = %delay,
					error = %e,
					"Listing page failed; retrying once."
				);
				tokio::time::sleep(delay.unsigned_abs()).await;

				self.fetch().await
			},
			outcome => outcome,
		}
	}

	async fn fetch(&mut self) -> Result<ResourcePage> {
		let request = self.lister.page_request(&self.query, self.cursor.as_deref())?;

		self.requests += 1;

		let span = FlowSpan::new(FlowKind::Listing, "fetch_page");
		let response = span.instrument(self.lister.transport.execute(request)).await?;

		decode_page(response)
	}

	fn abort(&self, error: Error) -> Error {
		if matches!(error, Error::Unauthenticated { .. }) {
			return error;
		}

		tracing::warn!(
			pages = self.pages,
			items = self.items,
			error = %error,
			"Listing aborted."
		);

		Error::ListingFailed {
			pages_completed: self.pages,
			items_yielded: self.items,
			source: Box::new(error),
		}
	}
}

fn decode_page(response: HttpResponse) -> Result<ResourcePage> {
	let status = response.status();

	if status.is_success() {
		let mut deserializer = serde_json::Deserializer::from_slice(response.body());

		return serde_path_to_error::deserialize(&mut deserializer)
			.map_err(|source| Error::MalformedPage { source });
	}

	let message = preview(response.body());

	if is_rate_limited(status, &message) {
		return Err(TransientError::Api {
			message,
			status: Some(status.as_u16()),
			retry_after: parse_retry_after(response.headers()),
		}
		.into());
	}

	match status {
		StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN =>
			Err(Error::Unauthenticated { status: status.as_u16() }),
		_ => Err(Error::Api { status: status.as_u16(), message }),
	}
}

// Drive reports per-user quota exhaustion as 403 with a rate-limit reason.
fn is_rate_limited(status: StatusCode, body: &str) -> bool {
	status == StatusCode::TOO_MANY_REQUESTS
		|| status == StatusCode::REQUEST_TIMEOUT
		|| status.is_server_error()
		|| (status == StatusCode::FORBIDDEN
			&& (body.contains("rateLimitExceeded") || body.contains("userRateLimitExceeded")))
}

fn preview(body: &[u8]) -> String {
	let text = String::from_utf8_lossy(body);
	let trimmed = text.trim();

	if trimmed.is_empty() {
		return "empty response body".into();
	}

	trimmed.chars().take(MESSAGE_PREVIEW_LIMIT).collect()
}
