//! Operator-driven authorization code consent (out-of-band redirect).

// self
use crate::{
	_prelude::*,
	auth::Credential,
	consent::{ConsentError, ConsentFuture, ConsentPrompt, CredentialSource, StdioPrompt},
	http::TokenHttpClient,
	oauth::{OAuthClient, TransportErrorMapper},
	obs::{self, FlowKind, FlowSpan},
};

/// `state` value sent when none is configured.
pub const DEFAULT_STATE: &str = "state-token";

/// Prints the consent URL, reads the authorization code, and exchanges it.
pub struct InteractiveConsent<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	client: Arc<OAuthClient<C, M>>,
	prompt: Arc<dyn ConsentPrompt>,
	state: String,
}
impl<C, M> InteractiveConsent<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	/// Creates a consent source that talks to the operator over stdio.
	pub fn new(client: Arc<OAuthClient<C, M>>) -> Self {
		Self { client, prompt: Arc::new(StdioPrompt), state: DEFAULT_STATE.into() }
	}

	/// Replaces the operator console.
	pub fn with_prompt(mut self, prompt: Arc<dyn ConsentPrompt>) -> Self {
		self.prompt = prompt;

		self
	}

	/// Overrides the `state` query parameter.
	pub fn with_state(mut self, state: impl Into<String>) -> Self {
		self.state = state.into();

		self
	}

	async fn run(&self) -> Result<Credential, ConsentError> {
		let url = self.client.authorize_url(&self.state);
		let line = self.prompt.ask(&url).map_err(|e| ConsentError::UserInput {
			reason: format!("console could not be read: {e}"),
		})?;
		let code = line
			.as_deref()
			.map(str::trim)
			.filter(|code| !code.is_empty())
			.ok_or_else(|| ConsentError::UserInput { reason: "no authorization code entered".into() })?;

		tracing::debug!("Exchanging operator-supplied authorization code.");

		Ok(self.client.exchange_code(code).await?)
	}
}
impl<C, M> CredentialSource for InteractiveConsent<C, M>
where
	C: ?Sized + TokenHttpClient,
	M: ?Sized + TransportErrorMapper<C::TransportError>,
{
	fn label(&self) -> &'static str {
		"interactive"
	}

	fn obtain(&self) -> ConsentFuture<'_> {
		Box::pin(async move {
			let span = FlowSpan::new(FlowKind::InteractiveConsent, "obtain");
			let result = span.instrument(self.run()).await;

			obs::record_result(FlowKind::InteractiveConsent, &result);

			result
		})
	}
}
