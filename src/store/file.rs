//! File-backed [`TokenStore`] holding a single credential record.

// std
use std::{
	fs::{self, OpenOptions},
	io::{ErrorKind, Write},
	path::{Path, PathBuf},
};
// self
use crate::{
	_prelude::*,
	auth::Credential,
	store::{StoreError, StoreFuture, TokenCodec, TokenStore},
};

/// Persists one credential to a file, replacing it atomically on every save.
///
/// Writes land in a sibling temporary file (mode `0600` on unix), are synced to disk, and are
/// then renamed over the target, so readers observe either the old or the new record. Concurrent
/// writers from different processes are not coordinated.
#[derive(Clone, Debug)]
pub struct FileStore {
	path: PathBuf,
	codec: TokenCodec,
}
impl FileStore {
	/// Creates a store for `path` using the JSON codec. Nothing is touched on disk yet.
	pub fn open(path: impl Into<PathBuf>) -> Self {
		Self { path: path.into(), codec: TokenCodec::default() }
	}

	/// Overrides the record encoding.
	pub fn with_codec(mut self, codec: TokenCodec) -> Self {
		self.codec = codec;

		self
	}

	/// Path of the backing file.
	pub fn path(&self) -> &Path {
		&self.path
	}

	/// Encoding used for the backing file.
	pub fn codec(&self) -> TokenCodec {
		self.codec
	}

	fn read_now(&self) -> Result<Option<Credential>, StoreError> {
		let bytes = match fs::read(&self.path) {
			Ok(bytes) => bytes,
			Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
			Err(e) =>
				return Err(StoreError::Backend {
					message: format!("Failed to read {}: {e}", self.path.display()),
				}),
		};

		if bytes.is_empty() {
			return Ok(None);
		}

		self.codec.decode(&bytes).map(Some)
	}

	fn write_now(&self, credential: &Credential) -> Result<(), StoreError> {
		let serialized = self.codec.encode(credential)?;

		if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
			fs::create_dir_all(parent).map_err(|e| StoreError::Backend {
				message: format!("Failed to create store directory {}: {e}", parent.display()),
			})?;
		}

		let tmp_path = self.tmp_path();

		// A leftover temp file keeps its old mode when reopened, so always start from a new inode.
		match fs::remove_file(&tmp_path) {
			Ok(()) => tracing::debug!(path = %tmp_path.display(), "Removed stale temporary token file."),
			Err(e) if e.kind() == ErrorKind::NotFound => {},
			Err(e) =>
				return Err(StoreError::Backend {
					message: format!("Failed to remove stale {}: {e}", tmp_path.display()),
				}),
		}

		{
			let mut file = private_file_options().open(&tmp_path).map_err(|e| {
				StoreError::Backend {
					message: format!("Failed to create {}: {e}", tmp_path.display()),
				}
			})?;

			file.write_all(&serialized).map_err(|e| StoreError::Backend {
				message: format!("Failed to write {}: {e}", tmp_path.display()),
			})?;
			file.sync_all().map_err(|e| StoreError::Backend {
				message: format!("Failed to sync {}: {e}", tmp_path.display()),
			})?;
		}

		fs::rename(&tmp_path, &self.path).map_err(|e| {
			let _ = fs::remove_file(&tmp_path);

			StoreError::Backend {
				message: format!("Failed to replace {}: {e}", self.path.display()),
			}
		})
	}

	fn tmp_path(&self) -> PathBuf {
		let mut name = self.path.file_name().map(|n| n.to_os_string()).unwrap_or_default();

		name.push(".tmp");

		self.path.with_file_name(name)
	}
}
impl TokenStore for FileStore {
	fn load(&self) -> StoreFuture<'_, Option<Credential>> {
		Box::pin(async move { self.read_now() })
	}

	fn save(&self, credential: Credential) -> StoreFuture<'_, ()> {
		Box::pin(async move { self.write_now(&credential) })
	}
}

fn private_file_options() -> OpenOptions {
	let mut options = OpenOptions::new();

	options.write(true).create_new(true);

	#[cfg(unix)]
	{
		use std::os::unix::fs::OpenOptionsExt;

		options.mode(0o600);
	}

	options
}
