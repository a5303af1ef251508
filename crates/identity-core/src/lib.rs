//! Core identity issuance engine: transport-agnostic certificate signing,
//! trust verification, and credential rotation plumbing.
//!
//! This crate knows nothing about gRPC, HTTP, or the CLI; those live in
//! `identity-app`. It exposes plain Rust types and `async fn`s that the app
//! crate wires onto a transport.

pub mod cert;
pub mod csr;
pub mod error;
pub mod events;
pub mod issuer;
pub mod pem;
pub mod registry;
pub mod service;
pub mod trust_domain;
pub mod trust_store;
pub mod validator;
pub mod watcher;

#[cfg(test)]
mod test_support;

pub use cert::Certificate;
pub use cert::Credentials;
pub use cert::TrustChain;
pub use csr::CertificateRequest;
pub use error::IssuanceError;
pub use events::Event;
pub use events::EventSink;
pub use events::TracingEventSink;
pub use issuer::Issuer;
pub use registry::IssuerHandle;
pub use registry::Registry;
pub use service::IssuanceRequest;
pub use service::IssuanceResponse;
pub use service::IssuanceService;
pub use trust_domain::TrustDomain;
pub use trust_store::TrustAnchors;
pub use trust_store::TrustStore;
pub use validator::TokenValidator;
pub use watcher::CredentialWatcher;
pub use watcher::WatcherConfig;
