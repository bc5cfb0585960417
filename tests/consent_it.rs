#![cfg(feature = "reqwest")]

// std
use std::{io::Cursor, sync::Arc};
// crates.io
use httpmock::prelude::*;
// self
use drive_credentials::{
	auth::{Credential, ScopeSet},
	config::ServiceConfig,
	consent::{ConsentError, CredentialSource, InteractiveConsent, LinePrompt, ServiceAccount},
	error::Error,
	oauth::{OAuthClient, TokenRefresher},
	url::Url,
};

const PRIVATE_KEY: &str = include_str!("fixtures/service_account_key.pem");
const DRIVE_SCOPE: &str = "https://www.googleapis.com/auth/drive.readonly";

fn service_config(server: &MockServer) -> ServiceConfig {
	ServiceConfig::builder("client-id", "client-secret")
		.authorization_endpoint(
			Url::parse(&server.url("/authorize")).expect("Authorize URL should parse."),
		)
		.token_endpoint(Url::parse(&server.url("/token")).expect("Token URL should parse."))
		.build()
		.expect("Service config should validate.")
}

fn key_payload(server: &MockServer) -> Vec<u8> {
	serde_json::to_vec(&serde_json::json!({
		"type": "service_account",
		"project_id": "demo-project",
		"private_key_id": "kid-1",
		"private_key": PRIVATE_KEY,
		"client_email": "robot@demo-project.iam.gserviceaccount.com",
		"token_uri": server.url("/token"),
	}))
	.expect("Key payload should serialize.")
}

fn drive_scope() -> ScopeSet {
	ScopeSet::new([DRIVE_SCOPE]).expect("Drive scope should be valid.")
}

#[tokio::test]
async fn interactive_consent_rejects_blank_input_without_calling_the_token_endpoint() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(POST).path("/token");
			then.status(500);
		})
		.await;
	let client = Arc::new(OAuthClient::new(service_config(&server)).expect("Client should build."));
	let consent = InteractiveConsent::new(client)
		.with_prompt(Arc::new(LinePrompt::new(Cursor::new(b"\n".to_vec()), Vec::new())));
	let err = consent.obtain().await.expect_err("Blank input should fail.");

	assert!(matches!(err, ConsentError::UserInput { .. }));
	assert_eq!(consent.label(), "interactive");

	mock.assert_hits_async(0).await;
}

#[tokio::test]
async fn rejected_authorization_code_is_an_exchange_failure() {
	let server = MockServer::start_async().await;

	server
		.mock_async(|when, then| {
			when.method(POST).path("/token");
			then.status(400)
				.header("content-type", "application/json")
				.body("{\"error\":\"invalid_grant\",\"error_description\":\"Malformed auth code.\"}");
		})
		.await;

	let client = Arc::new(OAuthClient::new(service_config(&server)).expect("Client should build."));
	let consent = InteractiveConsent::new(client)
		.with_prompt(Arc::new(LinePrompt::new(Cursor::new(b"bogus\n".to_vec()), Vec::new())));
	let err = consent.obtain().await.expect_err("Rejected code should fail.");

	assert!(matches!(err, ConsentError::Exchange { ref reason } if reason.contains("Malformed")));
}

#[tokio::test]
async fn service_account_exchanges_a_signed_assertion() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/token")
				.header("content-type", "application/x-www-form-urlencoded")
				.body_includes("grant_type=urn%3Aietf%3Aparams%3Aoauth%3Agrant-type%3Ajwt-bearer")
				.body_includes("assertion=");
			then.status(200)
				.header("content-type", "application/json")
				.body("{\"access_token\":\"sa-access\",\"token_type\":\"Bearer\",\"expires_in\":3600}");
		})
		.await;
	let source = ServiceAccount::from_json(key_payload(&server), drive_scope())
		.expect("Service account source should build.");
	let credential = source.obtain().await.expect("Assertion exchange should succeed.");

	mock.assert_async().await;

	assert_eq!(credential.access_token.expose(), "sa-access");
	assert!(credential.refresh_token.is_none());
	assert!(credential.expiry.is_some());
	assert!(credential.covers(&drive_scope()));
	assert_eq!(source.label(), "service_account");
}

#[tokio::test]
async fn malformed_key_fails_at_obtain_time() {
	let source = ServiceAccount::from_json(b"{\"type\":\"service_account\"}".to_vec(), drive_scope())
		.expect("Construction should not parse the key.");
	let err = source.obtain().await.expect_err("Malformed key should fail.");

	assert!(matches!(err, ConsentError::Parse { .. }));
}

#[tokio::test]
async fn refresh_keeps_the_previous_refresh_token_when_none_is_returned() {
	let server = MockServer::start_async().await;
	let mock = server
		.mock_async(|when, then| {
			when.method(POST)
				.path("/token")
				.body_includes("grant_type=refresh_token")
				.body_includes("refresh_token=1%2Frefresh");
			then.status(200)
				.header("content-type", "application/json")
				.body("{\"access_token\":\"rotated\",\"token_type\":\"Bearer\",\"expires_in\":3600}");
		})
		.await;
	let client = OAuthClient::new(service_config(&server)).expect("Client should build.");
	let stale = Credential::builder()
		.access_token("stale")
		.refresh_token("1/refresh")
		.expiry(time::OffsetDateTime::now_utc() - time::Duration::minutes(1))
		.build()
		.expect("Stale credential should build.");
	let rotated = client.refresh(&stale).await.expect("Refresh should succeed.");

	mock.assert_async().await;

	assert_eq!(rotated.access_token.expose(), "rotated");
	assert_eq!(rotated.refresh_token.as_ref().map(|secret| secret.expose()), Some("1/refresh"));
	assert!(rotated.is_valid());
}

#[tokio::test]
async fn revoked_refresh_token_is_an_invalid_grant() {
	let server = MockServer::start_async().await;

	server
		.mock_async(|when, then| {
			when.method(POST).path("/token");
			then.status(400)
				.header("content-type", "application/json")
				.body("{\"error\":\"invalid_grant\",\"error_description\":\"Token has been revoked.\"}");
		})
		.await;

	let client = OAuthClient::new(service_config(&server)).expect("Client should build.");
	let credential = Credential::builder()
		.access_token("stale")
		.refresh_token("1/revoked")
		.build()
		.expect("Credential should build.");
	let err = client.refresh(&credential).await.expect_err("Revoked token should fail.");

	assert!(matches!(err, Error::InvalidGrant { .. }));
}
