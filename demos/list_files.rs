//! Resolves a Drive credential (cached token, interactive consent, or `ACCESS_TOKEN`) and prints
//! every file whose name contains `report`.
//!
//! Expects `CLIENT_ID` and `CLIENT_SECRET` in the environment or a `.env` file; the credential is
//! cached in `token.json` next to the working directory.

// std
use std::{path::Path, sync::Arc};
// crates.io
use color_eyre::Result;
// self
use drive_credentials::{
	config::{self, ServiceConfig},
	consent::{InteractiveConsent, StaticToken},
	http::ReqwestHttpClient,
	lifecycle::CredentialManager,
	listing::{ListQuery, ResourceLister},
	oauth::{OAuthClient, TokenRefresher},
	store::FileStore,
	transport::TransportFactory,
};

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	if Path::new(".env").exists() {
		config::load_dotenv(".env")?;
	}

	let config = ServiceConfig::from_env()?;
	let scopes = config.scopes.clone();
	let client = Arc::new(OAuthClient::new(config)?);
	let refresher: Arc<dyn TokenRefresher> = client.clone();
	let manager = CredentialManager::new(Arc::new(FileStore::open("token.json")))
		.with_source(Arc::new(InteractiveConsent::new(client)))
		.with_source(Arc::new(StaticToken::from_env()))
		.with_refresher(refresher.clone())
		.with_required_scopes(scopes);
	let credential = manager.resolve().await?;
	let transport = TransportFactory::<ReqwestHttpClient>::new(ReqwestHttpClient::new()?)
		.with_refresher(refresher)
		.build(&credential);
	let lister = ResourceLister::drive(transport)?;
	let query = ListQuery::new().with_filter("name contains 'report'");
	let summary = lister.for_each(&query, |item| println!("{item}")).await?;

	println!("Listed {} file(s) across {} page(s).", summary.items, summary.pages);

	Ok(())
}
