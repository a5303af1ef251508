//! Trust Store: a thin wrapper around a root certificate set. spec.md §4.D.
//!
//! Generalizes the verification half of `control::caclient::WorkloadCertificate`
//! (which builds a `RootCertStore` from a raw chain for
//! `WebPkiClientVerifier`) into a standalone, reusable chain verifier that
//! isn't tied to a live TLS handshake.

use std::sync::Arc;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use rustls::RootCertStore;
use rustls::server::WebPkiClientVerifier;
use rustls::server::danger::ClientCertVerifier;
use rustls_pki_types::CertificateDer;
use rustls_pki_types::UnixTime;

use crate::cert::Certificate;
use crate::error::ChainError;

/// An immutable set of root certificates, fixed for the life of the process.
/// spec.md §3.
#[derive(Clone)]
pub struct TrustAnchors {
	roots: Arc<RootCertStore>,
}

impl std::fmt::Debug for TrustAnchors {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("TrustAnchors").field("count", &self.roots.len()).finish()
	}
}

impl TrustAnchors {
	pub fn from_certificates(certs: &[Certificate]) -> Result<Self, ChainError> {
		if certs.is_empty() {
			return Err(ChainError::EmptyTrustAnchors);
		}
		let mut roots = RootCertStore::empty();
		let (_valid, invalid) = roots.add_parsable_certificates(certs.iter().map(|c| c.der().clone()));
		if invalid > 0 {
			tracing::warn!(invalid, "found invalid trust anchor certificates in bundle");
		}
		if roots.is_empty() {
			return Err(ChainError::EmptyTrustAnchors);
		}
		Ok(Self { roots: Arc::new(roots) })
	}
}

/// Verifies certificate chains against a fixed [`TrustAnchors`] set.
#[derive(Clone)]
pub struct TrustStore {
	anchors: TrustAnchors,
	verifier: Arc<dyn ClientCertVerifier>,
}

impl std::fmt::Debug for TrustStore {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("TrustStore").field("anchors", &self.anchors).finish_non_exhaustive()
	}
}

impl TrustStore {
	pub fn new(anchors: TrustAnchors) -> Result<Self, ChainError> {
		let verifier = WebPkiClientVerifier::builder_with_provider(
			anchors.roots.clone(),
			Arc::new(rustls::crypto::aws_lc_rs::default_provider()),
		)
		.build()
		.map_err(|e| ChainError::Verify(e.to_string()))?;
		Ok(Self { anchors, verifier })
	}

	pub fn anchors(&self) -> &TrustAnchors {
		&self.anchors
	}

	/// `Verify(chain, leaf, dnsName?, at?)`, spec.md §4.D. `intermediates` is
	/// ordered root-most first (spec.md §3 `TrustChain` convention);
	/// `dns_name` of `None` skips SAN matching, used when verifying an
	/// intermediate rather than an end-entity leaf.
	pub fn verify(
		&self,
		leaf: &Certificate,
		intermediates: &[Certificate],
		dns_name: Option<&str>,
		at: Option<SystemTime>,
	) -> Result<(), ChainError> {
		let at = at.unwrap_or_else(SystemTime::now);
		let now = UnixTime::since_unix_epoch(at.duration_since(UNIX_EPOCH).unwrap_or_default().as_secs());
		let intermediate_ders: Vec<CertificateDer<'static>> = intermediates.iter().map(|c| c.der().clone()).collect();

		self
			.verifier
			.verify_client_cert(leaf.der(), &intermediate_ders, now)
			.map_err(|e| ChainError::Verify(e.to_string()))?;

		if let Some(name) = dns_name
			&& !leaf.dns_names().iter().any(|n| n == name)
		{
			return Err(ChainError::SanMismatch { expected: name.to_string() });
		}
		Ok(())
	}
}
