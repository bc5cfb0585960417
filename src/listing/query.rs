//! Listing parameters.

// self
use crate::_prelude::*;

/// Page size used when none is requested.
pub const DEFAULT_PAGE_SIZE: u32 = 100;
/// Largest page size the remote API accepts.
pub const MAX_PAGE_SIZE: u32 = 1000;
/// Item fields requested when none are configured.
pub const DEFAULT_FIELDS: [&str; 3] = ["id", "name", "size"];

/// Filter, page size, and field selection for one traversal.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ListQuery {
	filter: Option<String>,
	page_size: u32,
	fields: Vec<String>,
}
impl ListQuery {
	/// Query with no filter, [`DEFAULT_PAGE_SIZE`], and [`DEFAULT_FIELDS`].
	pub fn new() -> Self {
		Self {
			filter: None,
			page_size: DEFAULT_PAGE_SIZE,
			fields: DEFAULT_FIELDS.iter().map(|field| (*field).to_owned()).collect(),
		}
	}

	/// Sets the server-side filter expression (e.g. `name contains 'report'`); blank clears it.
	pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
		let filter = filter.into();

		self.filter = if filter.trim().is_empty() { None } else { Some(filter) };

		self
	}

	/// Sets the page size, clamped to `1..=MAX_PAGE_SIZE`.
	pub fn with_page_size(mut self, page_size: u32) -> Self {
		self.page_size = page_size.clamp(1, MAX_PAGE_SIZE);

		self
	}

	/// Replaces the requested item fields; an empty list keeps the current selection.
	pub fn with_fields<I, S>(mut self, fields: I) -> Self
	where
		I: IntoIterator<Item = S>,
		S: Into<String>,
	{
		let fields = fields
			.into_iter()
			.map(Into::into)
			.filter(|field: &String| !field.trim().is_empty())
			.collect::<Vec<_>>();

		if !fields.is_empty() {
			self.fields = fields;
		}

		self
	}

	/// Server-side filter expression.
	pub fn filter(&self) -> Option<&str> {
		self.filter.as_deref()
	}

	/// Effective page size.
	pub fn page_size(&self) -> u32 {
		self.page_size
	}

	/// Requested item fields.
	pub fn fields(&self) -> &[String] {
		&self.fields
	}

	/// Partial-response selector, e.g. `nextPageToken, files(id, name, size)`.
	pub fn fields_param(&self) -> String {
		format!("nextPageToken, files({})", self.fields.join(", "))
	}

	/// Appends this query (and the page cursor, if any) to `url`.
	pub(crate) fn apply(&self, url: &mut Url, cursor: Option<&str>) {
		let mut pairs = url.query_pairs_mut();

		pairs
			.append_pair("pageSize", &self.page_size.to_string())
			.append_pair("fields", &self.fields_param());

		if let Some(filter) = &self.filter {
			pairs.append_pair("q", filter);
		}
		if let Some(cursor) = cursor {
			pairs.append_pair("pageToken", cursor);
		}
	}
}
impl Default for ListQuery {
	fn default() -> Self {
		Self::new()
	}
}
