//! Exchanges a service-account assertion against a local mock token endpoint, then lists a mock
//! Drive folder with the resulting credential.

// std
use std::sync::Arc;
// crates.io
use color_eyre::Result;
use httpmock::prelude::*;
use url::Url;
// self
use drive_credentials::{
	auth::ScopeSet,
	config::DRIVE_READONLY_SCOPE,
	consent::ServiceAccount,
	http::ReqwestHttpClient,
	lifecycle::CredentialManager,
	listing::{ListQuery, ResourceLister},
	store::MemoryStore,
	transport::TransportFactory,
};

const PRIVATE_KEY: &str = include_str!("../tests/fixtures/service_account_key.pem");

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let server = MockServer::start_async().await;
	let token_mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/token").body_includes("assertion=");
			then.status(200).header("content-type", "application/json").body(
				"{\"access_token\":\"sa-access\",\"token_type\":\"Bearer\",\"expires_in\":3600}",
			);
		})
		.await;
	let files_mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/drive/v3/files").header("authorization", "Bearer sa-access");
			then.status(200).header("content-type", "application/json").body(
				"{\"files\":[{\"id\":\"1\",\"name\":\"q3-report.pdf\",\"size\":\"52311\"},{\"id\":\"2\",\"name\":\"Reports\"}]}",
			);
		})
		.await;
	let key = serde_json::json!({
		"type": "service_account",
		"private_key_id": "demo-key",
		"private_key": PRIVATE_KEY,
		"client_email": "robot@demo-project.iam.gserviceaccount.com",
		"token_uri": server.url("/token"),
	});
	let source =
		ServiceAccount::from_json(serde_json::to_vec(&key)?, ScopeSet::new([DRIVE_READONLY_SCOPE])?)?;
	let manager = CredentialManager::new(Arc::new(MemoryStore::default()))
		.with_source(Arc::new(source));
	let credential = manager.resolve().await?;
	let transport = TransportFactory::<ReqwestHttpClient>::new(ReqwestHttpClient::new()?)
		.build(&credential);
	let lister = ResourceLister::new(transport, Url::parse(&server.url("/drive/v3/files"))?);

	for item in lister.collect(&ListQuery::new()).await? {
		println!("{item}");
	}

	token_mock.assert_async().await;
	files_mock.assert_async().await;

	Ok(())
}
