//! Credential lifecycle manager: cache first, refresh when possible, consent as a last resort.
//!
//! ```text
//! Uninitialized ──load──▶ Cached ──valid / refreshed──▶ Ready
//!       │                   │
//!       └──nothing usable───┴──▶ Obtaining ──first source succeeds──▶ Ready
//!                                    │
//!                                    └──every source fails──▶ Failed (terminal)
//! ```
//!
//! Once `Ready`, [`CredentialManager::resolve`] returns the held credential without touching the
//! store, the sources, or the network. Concurrent callers are serialized so at most one
//! resolution runs at a time.

// self
use crate::{
	_prelude::*,
	auth::{Credential, ScopeSet},
	consent::CredentialSource,
	error::SourceFailure,
	oauth::TokenRefresher,
	obs::{self, FlowKind, FlowSpan},
	store::TokenStore,
	transport::DEFAULT_REFRESH_WINDOW,
};

/// Observable resolution state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ManagerState {
	/// Nothing has been attempted yet.
	Uninitialized,
	/// A stored credential was loaded and is being checked.
	Cached,
	/// Credential sources are being tried.
	Obtaining,
	/// A credential is held and returned on every call.
	Ready,
	/// Every source failed; later calls fail immediately.
	Failed,
}

#[derive(Default)]
struct Resolution {
	credential: Option<Credential>,
	failures: Vec<SourceFailure>,
}

/// Resolves one credential per process and hands it out on demand.
pub struct CredentialManager {
	store: Arc<dyn TokenStore>,
	sources: Vec<Arc<dyn CredentialSource>>,
	refresher: Option<Arc<dyn TokenRefresher>>,
	required_scopes: ScopeSet,
	refresh_window: Duration,
	state: Mutex<ManagerState>,
	resolution: AsyncMutex<Resolution>,
}
impl CredentialManager {
	/// Creates a manager backed by `store` with no sources configured yet.
	pub fn new(store: Arc<dyn TokenStore>) -> Self {
		Self {
			store,
			sources: Vec::new(),
			refresher: None,
			required_scopes: ScopeSet::default(),
			refresh_window: DEFAULT_REFRESH_WINDOW,
			state: Mutex::new(ManagerState::Uninitialized),
			resolution: AsyncMutex::new(Resolution::default()),
		}
	}

	/// Appends a credential source; sources are tried in insertion order.
	pub fn with_source(mut self, source: Arc<dyn CredentialSource>) -> Self {
		self.sources.push(source);

		self
	}

	/// Enables refreshing an expired cached credential before falling back to the sources.
	pub fn with_refresher(mut self, refresher: Arc<dyn TokenRefresher>) -> Self {
		self.refresher = Some(refresher);

		self
	}

	/// Scopes a cached credential must cover to be reused.
	pub fn with_required_scopes(mut self, scopes: ScopeSet) -> Self {
		self.required_scopes = scopes;

		self
	}

	/// Overrides how close to expiry a cached credential is refreshed; negative values mean zero.
	pub fn with_refresh_window(mut self, window: Duration) -> Self {
		self.refresh_window = if window.is_negative() { Duration::ZERO } else { window };

		self
	}

	/// Current resolution state.
	pub fn state(&self) -> ManagerState {
		*self.state.lock()
	}

	/// Returns a usable credential, resolving it on first use.
	pub async fn resolve(&self) -> Result<Credential> {
		let span = FlowSpan::new(FlowKind::Resolve, "resolve");
		let result = span.instrument(self.resolve_serialized()).await;

		obs::record_result(FlowKind::Resolve, &result);

		result
	}

	async fn resolve_serialized(&self) -> Result<Credential> {
		let mut resolution = self.resolution.lock().await;

		match (self.state(), &resolution.credential) {
			(ManagerState::Ready, Some(credential)) => return Ok(credential.clone()),
			(ManagerState::Failed, _) =>
				return Err(Error::CredentialUnavailable { failures: resolution.failures.clone() }),
			_ => {},
		}

		if let Some(credential) = self.from_cache().await {
			return Ok(self.ready(&mut resolution, credential));
		}

		self.set_state(ManagerState::Obtaining);

		let mut failures = Vec::with_capacity(self.sources.len());

		for source in &self.sources {
			match source.obtain().await {
				Ok(credential) => {
					tracing::info!(source = source.label(), "Obtained a new credential.");

					self.persist(&credential).await;

					return Ok(self.ready(&mut resolution, credential));
				},
				Err(e) => {
					tracing::warn!(source = source.label(), error = %e, "Credential source failed.");

					failures.push(SourceFailure { source: source.label(), message: e.to_string() });
				},
			}
		}

		tracing::error!(attempted = failures.len(), "No credential source produced a credential.");

		resolution.failures = failures.clone();
		self.set_state(ManagerState::Failed);

		Err(Error::CredentialUnavailable { failures })
	}

	/// Loads the stored credential and returns it when it can be used as-is or after a refresh.
	async fn from_cache(&self) -> Option<Credential> {
		let cached = match self.store.load().await {
			Ok(Some(credential)) => credential,
			Ok(None) => {
				tracing::debug!("No stored credential found.");

				return None;
			},
			Err(e) if e.is_corrupt() => {
				tracing::warn!(error = %e, "Stored credential is corrupt; treating it as missing.");

				return None;
			},
			Err(e) => {
				tracing::warn!(error = %e, "Stored credential could not be read.");

				return None;
			},
		};

		self.set_state(ManagerState::Cached);

		if !cached.covers(&self.required_scopes) {
			tracing::info!(
				granted = %cached.scope.fingerprint(),
				required = %self.required_scopes.fingerprint(),
				"Stored credential lacks required scopes."
			);

			return None;
		}

		let now = OffsetDateTime::now_utc();

		if !cached.expires_within(self.refresh_window, now) {
			tracing::debug!("Using stored credential.");

			return Some(cached);
		}
		if let Some(refresher) = self.refresher.as_ref().filter(|_| cached.can_refresh()) {
			match refresher.refresh(&cached).await {
				Ok(refreshed) => {
					tracing::info!("Refreshed stored credential.");

					self.persist(&refreshed).await;

					return Some(refreshed);
				},
				Err(e) => tracing::warn!(error = %e, "Refreshing stored credential failed."),
			}
		}
		if cached.is_valid_at(now) {
			tracing::debug!("Using stored credential close to expiry.");

			return Some(cached);
		}

		tracing::debug!("Stored credential expired.");

		None
	}

	async fn persist(&self, credential: &Credential) {
		if let Err(e) = self.store.save(credential.clone()).await {
			tracing::error!(error = %e, "Failed to persist credential; continuing with it in memory.");
		}
	}

	fn ready(&self, resolution: &mut Resolution, credential: Credential) -> Credential {
		resolution.credential = Some(credential.clone());
		self.set_state(ManagerState::Ready);

		credential
	}

	fn set_state(&self, state: ManagerState) {
		*self.state.lock() = state;
	}
}
impl Debug for CredentialManager {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("CredentialManager")
			.field("state", &self.state())
			.field("sources", &self.sources.iter().map(|s| s.label()).collect::<Vec<_>>())
			.field("required_scopes", &self.required_scopes)
			.field("refresh_window", &self.refresh_window)
			.finish_non_exhaustive()
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::{
		_preludet::{CountingStore, ScriptedRefresher, ScriptedSource},
		store::{FileStore, MemoryStore, StoreError, StoreFuture, TokenCodec},
	};

	struct BrokenStore;
	impl TokenStore for BrokenStore {
		fn load(&self) -> StoreFuture<'_, Option<Credential>> {
			Box::pin(async { Err(StoreError::corrupt("bad magic")) })
		}

		fn save(&self, _credential: Credential) -> StoreFuture<'_, ()> {
			Box::pin(async { Err(StoreError::Backend { message: "read-only volume".into() }) })
		}
	}

	fn credential(access: &str, expires_in: Option<Duration>, refresh: bool) -> Credential {
		let mut builder = Credential::builder().access_token(access);

		if let Some(delta) = expires_in {
			builder = builder.expires_in(delta);
		}
		if refresh {
			builder = builder.refresh_token("refresh");
		}

		builder.build().expect("Credential fixture should build.")
	}

	#[tokio::test]
	async fn ready_state_short_circuits_all_io() {
		let store = Arc::new(CountingStore::default());
		let source = Arc::new(ScriptedSource::succeeding("interactive", "abc123"));
		let manager = CredentialManager::new(store.clone()).with_source(source.clone());

		assert_eq!(manager.state(), ManagerState::Uninitialized);

		let first = manager.resolve().await.expect("First resolution should succeed.");
		let second = manager.resolve().await.expect("Second resolution should succeed.");

		assert_eq!(first, second);
		assert_eq!(source.calls(), 1);
		assert_eq!((store.loads(), store.saves()), (1, 1));
		assert_eq!(manager.state(), ManagerState::Ready);
		assert_eq!(store.snapshot(), Some(first));
	}

	#[tokio::test]
	async fn ready_state_from_cache_never_touches_the_store_again() {
		let cached = credential("cached", Some(Duration::hours(1)), false);
		let store = Arc::new(CountingStore::with_credential(cached.clone()));
		let manager = CredentialManager::new(store.clone());

		for _ in 0..3 {
			assert_eq!(manager.resolve().await.expect("Cached credential should resolve."), cached);
		}

		assert_eq!((store.loads(), store.saves()), (1, 0));
	}

	#[tokio::test]
	async fn corrupt_token_file_behaves_like_a_missing_one() {
		for codec in [TokenCodec::Json, TokenCodec::Binary] {
			for contents in [None, Some(&b"\x00\x01 definitely not a token"[..])] {
				let dir = tempfile::tempdir().expect("Temporary directory should be created.");
				let path = dir.path().join("token");

				if let Some(bytes) = contents {
					std::fs::write(&path, bytes).expect("Corrupt fixture should be written.");
				}

				let source = Arc::new(ScriptedSource::succeeding("static_token", "abc123"));
				let manager =
					CredentialManager::new(Arc::new(FileStore::open(&path).with_codec(codec)))
						.with_source(source.clone());
				let resolved = manager.resolve().await.expect("Source should resolve.");
				let persisted = codec
					.decode(&std::fs::read(&path).expect("Token file should be written."))
					.expect("Persisted token should decode.");

				assert_eq!(source.calls(), 1, "{codec:?} with {contents:?}");
				assert_eq!(persisted, resolved, "{codec:?} with {contents:?}");
				assert_eq!(manager.state(), ManagerState::Ready);
			}
		}
	}

	#[tokio::test]
	async fn valid_cached_credential_skips_sources() {
		let cached = credential("cached", Some(Duration::hours(1)), false);
		let source = Arc::new(ScriptedSource::succeeding("interactive", "fresh"));
		let manager = CredentialManager::new(Arc::new(MemoryStore::with_credential(cached.clone())))
			.with_source(source.clone());

		assert_eq!(manager.resolve().await.expect("Cached credential should resolve."), cached);
		assert_eq!(source.calls(), 0);
	}

	#[tokio::test]
	async fn expired_cached_credential_is_refreshed_and_persisted() {
		let store = Arc::new(MemoryStore::with_credential(credential(
			"expired",
			Some(Duration::seconds(-5)),
			true,
		)));
		let refresher = Arc::new(ScriptedRefresher::succeeding("refreshed"));
		let source = Arc::new(ScriptedSource::succeeding("interactive", "fresh"));
		let manager = CredentialManager::new(store.clone())
			.with_refresher(refresher.clone())
			.with_source(source.clone());
		let resolved = manager.resolve().await.expect("Refreshed credential should resolve.");

		assert_eq!(resolved.access_token.expose(), "refreshed");
		assert_eq!(refresher.calls(), 1);
		assert_eq!(source.calls(), 0);
		assert_eq!(store.snapshot(), Some(resolved));
	}

	#[tokio::test]
	async fn failed_refresh_falls_back_to_sources() {
		let store = Arc::new(MemoryStore::with_credential(credential(
			"expired",
			Some(Duration::seconds(-5)),
			true,
		)));
		let source = Arc::new(ScriptedSource::succeeding("interactive", "fresh"));
		let manager = CredentialManager::new(store)
			.with_refresher(Arc::new(ScriptedRefresher::failing()))
			.with_source(source.clone());
		let resolved = manager.resolve().await.expect("Fallback source should resolve.");

		assert_eq!(resolved.access_token.expose(), "fresh");
		assert_eq!(source.calls(), 1);
	}

	#[tokio::test]
	async fn sources_are_tried_in_order_until_one_succeeds() {
		let first = Arc::new(ScriptedSource::failing("interactive"));
		let second = Arc::new(ScriptedSource::succeeding("static_token", "abc123"));
		let third = Arc::new(ScriptedSource::succeeding("service_account", "unused"));
		let manager = CredentialManager::new(Arc::new(MemoryStore::default()))
			.with_source(first.clone())
			.with_source(second.clone())
			.with_source(third.clone());
		let resolved = manager.resolve().await.expect("Second source should resolve.");

		assert_eq!(resolved.access_token.expose(), "abc123");
		assert_eq!((first.calls(), second.calls(), third.calls()), (1, 1, 0));
	}

	#[tokio::test]
	async fn corrupt_store_and_failed_save_do_not_block_resolution() {
		let source = Arc::new(ScriptedSource::succeeding("static_token", "abc123"));
		let manager = CredentialManager::new(Arc::new(BrokenStore)).with_source(source.clone());
		let resolved = manager.resolve().await.expect("Source should resolve despite the store.");

		assert_eq!(resolved.access_token.expose(), "abc123");
		assert_eq!(manager.state(), ManagerState::Ready);
	}

	#[tokio::test]
	async fn exhausted_sources_fail_terminally() {
		let source = Arc::new(ScriptedSource::failing("interactive"));
		let manager = CredentialManager::new(Arc::new(MemoryStore::default()))
			.with_source(source.clone());

		for _ in 0..2 {
			let err = manager.resolve().await.expect_err("Resolution must fail.");

			assert!(matches!(
				&err,
				Error::CredentialUnavailable { failures } if failures.len() == 1
					&& failures[0].source == "interactive"
			));
		}

		assert_eq!(source.calls(), 1);
		assert_eq!(manager.state(), ManagerState::Failed);
	}

	#[tokio::test]
	async fn no_sources_and_no_cache_is_unavailable() {
		let manager = CredentialManager::new(Arc::new(MemoryStore::default()));
		let err = manager.resolve().await.expect_err("Resolution must fail.");

		assert!(matches!(err, Error::CredentialUnavailable { failures } if failures.is_empty()));
	}

	#[tokio::test]
	async fn cached_credential_with_narrower_scope_is_replaced() {
		let narrow = Credential::builder()
			.access_token("narrow")
			.scope(ScopeSet::new(["email"]).expect("Scope fixture should be valid."))
			.build()
			.expect("Credential fixture should build.");
		let source = Arc::new(ScriptedSource::succeeding("interactive", "wide"));
		let manager = CredentialManager::new(Arc::new(MemoryStore::with_credential(narrow)))
			.with_required_scopes(ScopeSet::new(["drive.readonly"]).expect("Scope should be valid."))
			.with_source(source.clone());

		assert_eq!(
			manager.resolve().await.expect("Source should resolve.").access_token.expose(),
			"wide"
		);
		assert_eq!(source.calls(), 1);
	}

	#[tokio::test]
	async fn concurrent_resolutions_share_one_attempt() {
		let source = Arc::new(ScriptedSource::succeeding("interactive", "abc123"));
		let manager = Arc::new(
			CredentialManager::new(Arc::new(MemoryStore::default())).with_source(source.clone()),
		);
		let tasks = (0..8)
			.map(|_| {
				let manager = manager.clone();

				tokio::spawn(async move { manager.resolve().await })
			})
			.collect::<Vec<_>>();

		for task in tasks {
			task.await.expect("Task should not panic.").expect("Resolution should succeed.");
		}

		assert_eq!(source.calls(), 1);
	}
}
