//! Error taxonomy for the identity issuance engine.
//!
//! `IssuanceError` is the only taxonomy that crosses the Certify RPC
//! boundary (spec.md §7); the others stay internal and are only ever
//! logged via their `Display` impl.

use std::sync::Arc;

/// Internal errors, wrapped by `IssuanceError` or surfaced only to the event
/// sink. None of these cross the RPC boundary directly.
#[derive(thiserror::Error, Debug, Clone)]
pub enum ChainError {
	#[error("certificate verification failed: {0}")]
	Verify(String),
	#[error("no root certificate present in trust anchors")]
	EmptyTrustAnchors,
	#[error("certificate chain is empty")]
	EmptyChain,
	#[error("SAN dns name mismatch: expected {expected}, certificate has none matching")]
	SanMismatch { expected: String },
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum LabelError {
	#[error("label {label:?} must not be empty")]
	Empty { label: &'static str },
	#[error("label {label:?} value {value:?} exceeds 63 characters")]
	TooLong { label: &'static str, value: String },
	#[error(
		"label {label:?} value {value:?} is not a valid DNS-1123 label (lowercase alphanumeric and '-', no leading/trailing '-')"
	)]
	InvalidLabel { label: &'static str, value: String },
	#[error(
		"subdomain {label:?} value {value:?} is not a valid DNS-1123 subdomain"
	)]
	InvalidSubdomain { label: &'static str, value: String },
}

#[derive(thiserror::Error, Debug, Clone)]
pub enum ParseError {
	#[error("input is empty")]
	Empty,
	#[error("malformed PEM block: {0}")]
	MalformedPem(String),
	#[error("expected a {expected} block, found {found}")]
	UnexpectedBlockType {
		expected: &'static str,
		found: String,
	},
	#[error("malformed DER: {0}")]
	MalformedDer(String),
	#[error("private key does not match certificate public key")]
	KeyMismatch,
}

#[derive(thiserror::Error, Debug, Clone)]
pub enum RotationError {
	#[error("failed to read credential material: {0}")]
	Io(String),
	#[error(transparent)]
	Parse(#[from] ParseError),
	#[error("intermediate failed verification against trust anchors: {0}")]
	Chain(#[from] ChainError),
}

/// The four validator outcomes, spec.md §4.E.
#[derive(thiserror::Error, Debug, Clone)]
pub enum ValidatorError {
	#[error("token is malformed or its principal is not a parseable identity: {0}")]
	InvalidToken(String),
	#[error("token was not authenticated by the orchestrator")]
	NotAuthenticated,
	#[error("transient validator error: {0}")]
	Transient(Arc<anyhow::Error>),
}

/// The client-facing taxonomy, spec.md §7. This is what the gRPC layer maps
/// 1:1 onto `tonic::Status` codes; `identity-core` itself never depends on
/// `tonic`.
#[derive(thiserror::Error, Debug, Clone)]
pub enum IssuanceError {
	#[error("no issuer is currently published")]
	Unavailable,
	#[error("invalid request: {0}")]
	InvalidArgument(String),
	#[error("request rejected by policy: {0}")]
	FailedPrecondition(String),
	#[error("internal error: {0}")]
	Internal(String),
}

impl From<LabelError> for IssuanceError {
	fn from(e: LabelError) -> Self {
		IssuanceError::InvalidArgument(e.to_string())
	}
}
