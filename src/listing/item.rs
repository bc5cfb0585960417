//! Remote file metadata and listing pages.

// crates.io
use serde::{Deserializer, de::Error as DeError};
// self
use crate::_prelude::*;

/// Metadata for one remote file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceItem {
	/// Opaque file identifier.
	#[serde(default)]
	pub id: String,
	/// Display name.
	#[serde(default)]
	pub name: String,
	/// Size in bytes; absent for folders and native documents.
	#[serde(default, deserialize_with = "deserialize_size")]
	pub size: Option<u64>,
	/// MIME type, when requested.
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub mime_type: Option<String>,
}
impl Display for ResourceItem {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		match self.size {
			Some(size) => write!(f, "{} ({size} bytes)", self.name),
			None => f.write_str(&self.name),
		}
	}
}

/// One decoded listing response.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ResourcePage {
	#[serde(default)]
	pub(crate) files: Vec<ResourceItem>,
	#[serde(default)]
	pub(crate) next_page_token: Option<String>,
}
impl ResourcePage {
	/// Cursor for the next page; empty cursors end the traversal.
	pub(crate) fn take_cursor(&mut self) -> Option<String> {
		self.next_page_token.take().filter(|cursor| !cursor.is_empty())
	}
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawSize {
	Number(u64),
	Text(String),
}

// Drive encodes int64 fields as decimal strings.
fn deserialize_size<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
	D: Deserializer<'de>,
{
	match Option::<RawSize>::deserialize(deserializer)? {
		None => Ok(None),
		Some(RawSize::Number(size)) => Ok(Some(size)),
		Some(RawSize::Text(raw)) => raw.parse().map(Some).map_err(DeError::custom),
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn size_accepts_strings_numbers_and_absence() {
		let page: ResourcePage = serde_json::from_str(
			r#"{
				"files": [
					{"id": "1", "name": "report.pdf", "size": "2048"},
					{"id": "2", "name": "data.csv", "size": 17},
					{"id": "3", "name": "Projects", "mimeType": "application/vnd.google-apps.folder"}
				],
				"nextPageToken": ""
			}"#,
		)
		.expect("Page fixture should decode.");
		let sizes = page.files.iter().map(|item| item.size).collect::<Vec<_>>();

		assert_eq!(sizes, vec![Some(2048), Some(17), None]);
		assert_eq!(page.files[0].to_string(), "report.pdf (2048 bytes)");
		assert_eq!(page.files[2].to_string(), "Projects");
	}

	#[test]
	fn empty_cursor_ends_traversal() {
		let mut page: ResourcePage =
			serde_json::from_str(r#"{"files": [], "nextPageToken": ""}"#).expect("Page should decode.");

		assert_eq!(page.take_cursor(), None);
	}

	#[test]
	fn non_numeric_size_is_rejected() {
		assert!(serde_json::from_str::<ResourceItem>(r#"{"name": "x", "size": "big"}"#).is_err());
	}
}
