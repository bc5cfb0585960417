//! Storage contract and built-in stores for the single cached credential.

pub mod codec;
pub mod file;
pub mod memory;

pub use codec::TokenCodec;
pub use file::FileStore;
pub use memory::MemoryStore;

// self
use crate::{_prelude::*, auth::Credential};

/// Boxed future returned by [`TokenStore`] operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// Persistence contract for the cached credential.
///
/// `load` distinguishes three outcomes: `Ok(Some(_))` for a decodable record, `Ok(None)` when
/// nothing was stored yet, and `Err(StoreError::Corrupt { .. })` when a record exists but cannot
/// be decoded. Callers treat the last two the same way but log them differently.
pub trait TokenStore
where
	Self: Send + Sync,
{
	/// Reads the stored credential, if any.
	fn load(&self) -> StoreFuture<'_, Option<Credential>>;

	/// Persists the credential, replacing whatever was stored before.
	fn save(&self, credential: Credential) -> StoreFuture<'_, ()>;
}
impl<T> TokenStore for Arc<T>
where
	T: ?Sized + TokenStore,
{
	fn load(&self) -> StoreFuture<'_, Option<Credential>> {
		(**self).load()
	}

	fn save(&self, credential: Credential) -> StoreFuture<'_, ()> {
		(**self).save(credential)
	}
}

/// Error type produced by [`TokenStore`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// A stored record exists but could not be decoded.
	#[error("Stored credential is corrupt: {message}.")]
	Corrupt {
		/// Decoder failure description.
		message: String,
	},
	/// Serialization failures surfaced while encoding a record.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}
impl StoreError {
	pub(crate) fn corrupt(message: impl Into<String>) -> Self {
		Self::Corrupt { message: message.into() }
	}

	/// Returns `true` when the stored record exists but is undecodable.
	pub fn is_corrupt(&self) -> bool {
		matches!(self, Self::Corrupt { .. })
	}
}
