#![cfg(feature = "reqwest")]

// crates.io
use time::{Duration, macros::datetime};
// self
use drive_credentials::{
	auth::{Credential, ScopeSet},
	store::{FileStore, StoreError, TokenCodec, TokenStore},
};

fn credential() -> Credential {
	Credential::builder()
		.access_token("ya29.fixture")
		.refresh_token("1//refresh-fixture")
		.expiry(datetime!(2025-11-10 12:00 UTC) + Duration::hours(1))
		.scope(
			ScopeSet::new(["https://www.googleapis.com/auth/drive.readonly"])
				.expect("Fixture scope should be valid."),
		)
		.build()
		.expect("Credential fixture should build successfully.")
}

#[tokio::test]
async fn json_and_binary_stores_round_trip() {
	let dir = tempfile::tempdir().expect("Temporary directory should be created.");

	for (file, codec) in [("token.json", TokenCodec::Json), ("token.bin", TokenCodec::Binary)] {
		let store = FileStore::open(dir.path().join(file)).with_codec(codec);

		store.save(credential()).await.expect("Credential should persist.");

		let loaded = store
			.load()
			.await
			.expect("Persisted credential should load.")
			.expect("Persisted credential should be present.");

		assert_eq!(loaded, credential());
	}

	let json = std::fs::read_to_string(dir.path().join("token.json"))
		.expect("JSON token file should be readable.");

	assert!(json.contains("\"access_token\""));
	assert!(json.contains("ya29.fixture"));
}

#[tokio::test]
async fn missing_and_corrupt_files_never_yield_a_credential() {
	let dir = tempfile::tempdir().expect("Temporary directory should be created.");
	let missing = FileStore::open(dir.path().join("nested/absent.json"));

	assert_eq!(missing.load().await.expect("Missing file should not be an error."), None);

	let corrupt_path = dir.path().join("corrupt.json");

	std::fs::write(&corrupt_path, b"{\"access_token\": 42").expect("Fixture should be written.");

	let err = FileStore::open(&corrupt_path)
		.load()
		.await
		.expect_err("Truncated JSON should be rejected.");

	assert!(matches!(err, StoreError::Corrupt { .. }));

	let binary_path = dir.path().join("token.bin");
	let binary = FileStore::open(&binary_path).with_codec(TokenCodec::Binary);

	binary.save(credential()).await.expect("Credential should persist.");

	let mut bytes = std::fs::read(&binary_path).expect("Binary token should be readable.");
	let last = bytes.len() - 1;

	bytes[last] ^= 0xFF;
	std::fs::write(&binary_path, bytes).expect("Tampered token should be written.");

	assert!(binary.load().await.expect_err("Tampered frame should be rejected.").is_corrupt());
}

#[tokio::test]
async fn saving_creates_parent_directories_and_replaces_previous_value() {
	let dir = tempfile::tempdir().expect("Temporary directory should be created.");
	let store = FileStore::open(dir.path().join("a/b/token.json"));
	let rotated = Credential::builder()
		.access_token("ya29.rotated")
		.build()
		.expect("Rotated credential should build.");

	store.save(credential()).await.expect("First save should succeed.");
	store.save(rotated.clone()).await.expect("Second save should succeed.");

	let loaded = store
		.load()
		.await
		.expect("Token should load.")
		.expect("Token should be present.");

	assert_eq!(loaded, rotated);
	assert!(!dir.path().join("a/b/token.json.tmp").exists());
}
