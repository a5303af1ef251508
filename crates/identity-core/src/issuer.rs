//! Issuer (CA): holds intermediate credentials and signs CSRs with bounded
//! validity. spec.md §4.C.
//!
//! CSR signing generalizes `control::caclient::csr::CsrOptions::generate`
//! (which authors a CSR client-side via `rcgen::KeyPair`/`CertificateParams`)
//! into the server-side counterpart: parse an incoming CSR with
//! `rcgen::CertificateSigningRequestParams::from_der`, stamp in the fields
//! this component owns, and sign it with an `rcgen::Issuer` built from the
//! already-issued intermediate credentials via `from_ca_cert_der`.

use std::sync::atomic::AtomicU64;
use std::sync::atomic::Ordering;
use std::time::Duration;
use std::time::SystemTime;

use p256::pkcs8::EncodePrivateKey;
use rcgen::CertificateSigningRequestParams;
use rcgen::ExtendedKeyUsagePurpose;
use rcgen::IsCa;
use rcgen::Issuer as RcgenIssuer;
use rcgen::KeyPair;
use rcgen::KeyUsagePurpose;
use time::OffsetDateTime;

use crate::cert::Certificate;
use crate::cert::Credentials;
use crate::csr::CertificateRequest;
use crate::error::ChainError;
use crate::error::IssuanceError;
use crate::trust_store::TrustStore;

/// Holds intermediate credentials; signs end-entity CSRs. spec.md §3/§4.C.
///
/// `next_serial` is an atomic purely so this type can live behind a shared
/// `Arc` in the Hot-Swap Registry (spec.md §4.H) — actual serialization of
/// concurrent `sign_end_entity` calls on one snapshot is the Registry's
/// per-call signing lease, not this counter.
pub struct Issuer {
	credentials: Credentials,
	validity: Duration,
	skew: Duration,
	next_serial: AtomicU64,
}

impl std::fmt::Debug for Issuer {
	fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
		f.debug_struct("Issuer")
			.field("validity", &self.validity)
			.field("skew", &self.skew)
			.field("next_serial", &self.next_serial.load(Ordering::Relaxed))
			.finish_non_exhaustive()
	}
}

impl Issuer {
	/// Serials are per-instance monotonic starting at 1, spec.md §4.C
	/// tie-break rule: a replacement Issuer always restarts at 1.
	pub fn new(credentials: Credentials, validity: Duration, skew: Duration) -> Self {
		Self {
			credentials,
			validity,
			skew,
			next_serial: AtomicU64::new(1),
		}
	}

	pub fn credentials(&self) -> &Credentials {
		&self.credentials
	}

	/// spec.md §4.C `Verify(roots)`: re-verifies the intermediate's own leaf
	/// against the trust anchors, with no DNS name and at "now".
	pub fn verify(&self, trust_store: &TrustStore) -> Result<(), ChainError> {
		trust_store.verify(self.credentials.leaf(), self.credentials.chain().as_slice(), None, None)
	}

	/// spec.md §4.C `SignEndEntity(csr) -> Certificate | IssuanceError`.
	pub fn sign_end_entity(&self, csr: &CertificateRequest, now: SystemTime) -> Result<Certificate, IssuanceError> {
		if !csr.public_key_is_ecdsa() {
			return Err(IssuanceError::InvalidArgument("CSR public key is not ECDSA".to_string()));
		}

		let mut params =
			CertificateSigningRequestParams::from_der(csr.der()).map_err(|e| IssuanceError::InvalidArgument(e.to_string()))?;

		// Serial is incremented after the template is built, per spec.md §4.C.
		let serial = self.next_serial.fetch_add(1, Ordering::SeqCst);
		params.params.serial_number = Some(serial.into());
		params.params.not_before = OffsetDateTime::from(now.checked_sub(self.skew).unwrap_or(now));
		params.params.not_after =
			OffsetDateTime::from(now.checked_add(self.validity).and_then(|t| t.checked_add(self.skew)).unwrap_or(now));
		params.params.is_ca = IsCa::NoCa;
		params.params.key_usages = vec![KeyUsagePurpose::DigitalSignature, KeyUsagePurpose::KeyEncipherment];
		params.params.extended_key_usages =
			vec![ExtendedKeyUsagePurpose::ServerAuth, ExtendedKeyUsagePurpose::ClientAuth];

		let issuer_key = rcgen_key_pair(&self.credentials)?;
		let rcgen_issuer = RcgenIssuer::from_ca_cert_der(self.credentials.leaf().der(), issuer_key)
			.map_err(|e| IssuanceError::Internal(format!("loading intermediate as signer: {e}")))?;

		let signed = params.signed_by(&rcgen_issuer).map_err(|e| IssuanceError::Internal(e.to_string()))?;

		Certificate::from_der(signed.der().clone()).map_err(|e| IssuanceError::Internal(e.to_string()))
	}
}

fn rcgen_key_pair(credentials: &Credentials) -> Result<KeyPair, IssuanceError> {
	let pkcs8 = credentials
		.private_key()
		.to_pkcs8_der()
		.map_err(|e| IssuanceError::Internal(format!("encoding intermediate key: {e}")))?;
	KeyPair::from_der(pkcs8.as_bytes()).map_err(|e| IssuanceError::Internal(format!("loading intermediate key: {e}")))
}

#[cfg(test)]
mod tests {
	use std::time::UNIX_EPOCH;

	use rcgen::CertificateParams;
	use rcgen::CertifiedKey;
	use rcgen::KeyPair as RcgenKeyPair;
	use rcgen::SanType;
	use rcgen::generate_simple_self_signed;

	use super::*;
	use crate::cert::TrustChain;

	const IDENTITY: &str = "workload.default.serviceaccount.identity.linkerd.cluster.local";

	fn intermediate_credentials() -> Credentials {
		let CertifiedKey { cert, signing_key } = generate_simple_self_signed(vec!["intermediate.mesh.internal".to_string()]).unwrap();
		let key = p256::SecretKey::from_pkcs8_der(&signing_key.serialized_der()).unwrap();
		Credentials::new(key, Certificate::from_der(cert.der().clone()).unwrap(), TrustChain::default()).unwrap()
	}

	fn csr_for(identity: &str) -> CertificateRequest {
		let key_pair = RcgenKeyPair::generate_for(&rcgen::PKCS_ECDSA_P256_SHA256).unwrap();
		let mut params = CertificateParams::default();
		params.subject_alt_names = vec![SanType::DnsName(identity.try_into().unwrap())];
		let der = params.serialize_request(&key_pair).unwrap().der().to_vec();
		CertificateRequest::from_der(der).unwrap()
	}

	#[test]
	fn signs_end_entity_with_monotonic_serials() {
		let issuer = Issuer::new(intermediate_credentials(), Duration::from_secs(3600), Duration::from_secs(60));
		let csr = csr_for(IDENTITY);

		let first = issuer.sign_end_entity(&csr, UNIX_EPOCH + Duration::from_secs(1_700_000_000)).unwrap();
		let second = issuer.sign_end_entity(&csr, UNIX_EPOCH + Duration::from_secs(1_700_000_000)).unwrap();

		assert!(first.serial() < second.serial());
		assert_eq!(first.dns_names(), vec![IDENTITY.to_string()]);
	}

	#[test]
	fn validity_window_matches_validity_plus_two_skew() {
		let validity = Duration::from_secs(3600);
		let skew = Duration::from_secs(60);
		let issuer = Issuer::new(intermediate_credentials(), validity, skew);
		let csr = csr_for(IDENTITY);
		let now = UNIX_EPOCH + Duration::from_secs(1_700_000_000);

		let leaf = issuer.sign_end_entity(&csr, now).unwrap();
		let window = leaf.not_after().duration_since(leaf.not_before()).unwrap();
		assert_eq!(window, validity + skew * 2);
	}

	#[test]
	fn rejects_non_ecdsa_public_key() {
		// A malformed/empty CSR DER is rejected at parse time, standing in
		// for a non-ECDSA key since rcgen cannot author an RSA CSR here.
		assert!(CertificateRequest::from_der(vec![0x30, 0x00]).is_err());
	}
}
