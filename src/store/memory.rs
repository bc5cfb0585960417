//! Thread-safe in-memory [`TokenStore`] for tests and ephemeral runs.

// self
use crate::{
	_prelude::*,
	auth::Credential,
	store::{StoreFuture, TokenStore},
};

/// Single in-process credential slot.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore(Arc<Mutex<Option<Credential>>>);
impl MemoryStore {
	/// Creates a store that already holds `credential`.
	pub fn with_credential(credential: Credential) -> Self {
		Self(Arc::new(Mutex::new(Some(credential))))
	}

	/// Returns the stored credential without going through the async contract.
	pub fn snapshot(&self) -> Option<Credential> {
		self.0.lock().clone()
	}
}
impl TokenStore for MemoryStore {
	fn load(&self) -> StoreFuture<'_, Option<Credential>> {
		let slot = self.0.clone();

		Box::pin(async move { Ok(slot.lock().clone()) })
	}

	fn save(&self, credential: Credential) -> StoreFuture<'_, ()> {
		let slot = self.0.clone();

		Box::pin(async move {
			*slot.lock() = Some(credential);

			Ok(())
		})
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[tokio::test]
	async fn save_replaces_previous_credential() {
		let store = MemoryStore::default();

		assert_eq!(store.load().await.expect("Empty store should load."), None);

		for token in ["first", "second"] {
			let credential = Credential::builder()
				.access_token(token)
				.build()
				.expect("Credential fixture should build.");

			store.save(credential).await.expect("Memory store should accept saves.");
		}

		let stored = store.snapshot().expect("Memory store should hold the latest credential.");

		assert_eq!(stored.access_token.expose(), "second");
	}
}
