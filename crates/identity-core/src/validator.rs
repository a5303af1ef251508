//! Token Validator: the external authentication boundary. spec.md §4.E.
//!
//! One async method, `async-trait`-based the same way the teacher's
//! `control` module defines its external-service ports — the core depends
//! only on this contract; §4.N provides the reference implementation.

use async_trait::async_trait;

use crate::error::ValidatorError;

/// `Validate(token) -> Identity | InvalidToken | NotAuthenticated | TransientError`.
///
/// `InvalidToken` means the token is syntactically malformed or names a
/// principal that doesn't parse as an identity. `NotAuthenticated` means the
/// orchestrator rejected the token. Anything else is transient.
#[async_trait]
pub trait TokenValidator: Send + Sync {
	async fn validate(&self, token: &[u8]) -> Result<String, ValidatorError>;
}
