//! Credential model, scope sets, and redacted secrets.

pub mod scope;
pub mod token;

pub use scope::*;
pub use token::{credential::*, secret::*};
