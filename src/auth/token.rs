//! Token-bearing types: the [`Credential`](credential::Credential) and its redacted secrets.

pub mod credential;
pub mod secret;
