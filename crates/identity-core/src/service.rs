//! Issuance Service: the Certify pipeline. spec.md §4.G.
//!
//! Transport-agnostic: this is the entire request/response shape and
//! ordering the gRPC layer wraps. `identity-core` itself never depends on
//! `tonic`.

use std::sync::Arc;
use std::time::SystemTime;

use rustls_pki_types::CertificateDer;

use crate::csr::CertificateRequest;
use crate::error::IssuanceError;
use crate::error::ValidatorError;
use crate::events::Event;
use crate::events::EventSink;
use crate::registry::Registry;
use crate::trust_store::TrustStore;
use crate::validator::TokenValidator;

/// `{requested identity, opaque bearer token, DER-encoded CSR}`, spec.md §3.
/// All three fields required and non-empty.
#[derive(Debug, Clone)]
pub struct IssuanceRequest {
	pub identity: String,
	pub token: Vec<u8>,
	pub csr: Vec<u8>,
}

/// `{leaf DER, intermediate chain DER[], valid-until timestamp}`, spec.md §3.
/// `intermediate_chain` is ordered immediately-issuing certificate first.
#[derive(Debug, Clone)]
pub struct IssuanceResponse {
	pub leaf: CertificateDer<'static>,
	pub intermediate_chain: Vec<CertificateDer<'static>>,
	pub valid_until: SystemTime,
}

pub struct IssuanceService {
	registry: Arc<Registry>,
	trust_store: TrustStore,
	validator: Arc<dyn TokenValidator>,
	event_sink: Arc<dyn EventSink>,
}

impl IssuanceService {
	pub fn new(
		registry: Arc<Registry>,
		trust_store: TrustStore,
		validator: Arc<dyn TokenValidator>,
		event_sink: Arc<dyn EventSink>,
	) -> Self {
		Self {
			registry,
			trust_store,
			validator,
			event_sink,
		}
	}

	/// The 8-step pipeline of spec.md §4.G, in order. Steps 4 and 5 are
	/// independent of each other but both must complete before step 6.
	pub async fn certify(&self, request: IssuanceRequest) -> Result<IssuanceResponse, IssuanceError> {
		// 1. Precondition.
		let handle = self.registry.snapshot().ok_or(IssuanceError::Unavailable)?;

		// 2. Structural checks.
		if request.identity.is_empty() {
			return Err(IssuanceError::InvalidArgument("identity must not be empty".to_string()));
		}
		if request.token.is_empty() {
			return Err(IssuanceError::InvalidArgument("token must not be empty".to_string()));
		}
		if request.csr.is_empty() {
			return Err(IssuanceError::InvalidArgument("csr must not be empty".to_string()));
		}
		let csr = CertificateRequest::from_der(request.csr.clone())
			.map_err(|e| IssuanceError::InvalidArgument(format!("csr does not parse: {e}")))?;

		// 3. Issuer self-check. Lazy per instance would require caching the
		// result keyed by issuer identity; at this scale we simply re-check
		// per call, which the spec allows but does not require.
		if let Err(err) = handle.issuer().verify(&self.trust_store) {
			self.event_sink.emit(Event::IssuerValidationFailed {
				identity: request.identity.clone(),
				reason: err.to_string(),
			});
			return Err(IssuanceError::Internal(format!("issuer self-check failed: {err}")));
		}

		// 4. CSR policy.
		check_csr_policy(&csr, &request.identity)?;

		// 5. Token validation.
		let validated_identity = match self.validator.validate(&request.token).await {
			Ok(identity) => identity,
			Err(ValidatorError::NotAuthenticated) => {
				return Err(IssuanceError::FailedPrecondition("token was not authenticated".to_string()));
			},
			Err(ValidatorError::InvalidToken(reason)) => return Err(IssuanceError::InvalidArgument(reason)),
			Err(ValidatorError::Transient(err)) => return Err(IssuanceError::Internal(err.to_string())),
		};

		// 6. Identity binding.
		if validated_identity != request.identity {
			return Err(IssuanceError::FailedPrecondition(
				"validated identity does not match the requested identity".to_string(),
			));
		}

		// 7. Sign.
		let leaf = {
			let _lease = handle.acquire_signing_lease().await;
			handle.issuer().sign_end_entity(&csr, SystemTime::now())?
		};

		// 8. Assemble. intermediate_chain is immediately-issuing cert first:
		// the issuer's own leaf, then its ancestors leaf-to-root (the
		// reverse of the root-first internal `TrustChain` order).
		let valid_until = leaf.not_after();
		let mut intermediate_chain = vec![handle.issuer().credentials().leaf().der().clone()];
		intermediate_chain.extend(handle.issuer().credentials().chain().as_slice().iter().rev().map(|c| c.der().clone()));

		Ok(IssuanceResponse {
			leaf: leaf.der().clone(),
			intermediate_chain,
			valid_until,
		})
	}
}

fn check_csr_policy(csr: &CertificateRequest, identity: &str) -> Result<(), IssuanceError> {
	let dns_names = csr.dns_names();
	if dns_names.len() != 1 || dns_names[0] != identity {
		return Err(IssuanceError::FailedPrecondition(
			"csr must contain exactly one SAN DNS name equal to the requested identity".to_string(),
		));
	}
	if let Some(cn) = csr.subject_common_name()
		&& !cn.is_empty()
		&& cn != identity
	{
		return Err(IssuanceError::FailedPrecondition(
			"csr Subject.CommonName must be empty or equal to the requested identity".to_string(),
		));
	}
	if csr.has_disallowed_san_types() {
		return Err(IssuanceError::FailedPrecondition(
			"csr must not contain email addresses, IP addresses, or URIs".to_string(),
		));
	}
	Ok(())
}

#[cfg(test)]
mod tests {
	use std::time::Duration;

	use async_trait::async_trait;
	use p256::pkcs8::DecodePrivateKey;
	use rcgen::CertificateParams;
	use rcgen::CertifiedKey;
	use rcgen::KeyPair;
	use rcgen::SanType;
	use rcgen::generate_simple_self_signed;

	use super::*;
	use crate::cert::Certificate;
	use crate::cert::Credentials;
	use crate::cert::TrustChain;
	use crate::issuer::Issuer;
	use crate::trust_store::TrustAnchors;

	const IDENTITY: &str = "workload.default.serviceaccount.identity.linkerd.cluster.local";

	struct FixedValidator(Result<String, ValidatorError>);

	#[async_trait]
	impl TokenValidator for FixedValidator {
		async fn validate(&self, _token: &[u8]) -> Result<String, ValidatorError> {
			match &self.0 {
				Ok(identity) => Ok(identity.clone()),
				Err(ValidatorError::NotAuthenticated) => Err(ValidatorError::NotAuthenticated),
				Err(ValidatorError::InvalidToken(reason)) => Err(ValidatorError::InvalidToken(reason.clone())),
				Err(ValidatorError::Transient(err)) => Err(ValidatorError::Transient(err.clone())),
			}
		}
	}

	#[derive(Default)]
	struct NullSink;
	impl EventSink for NullSink {
		fn emit(&self, _event: Event) {}
	}

	fn csr_der(identity: &str, cn: Option<&str>) -> Vec<u8> {
		let key_pair = KeyPair::generate_for(&rcgen::PKCS_ECDSA_P256_SHA256).unwrap();
		let mut params = CertificateParams::default();
		params.subject_alt_names = vec![SanType::DnsName(identity.try_into().unwrap())];
		if let Some(cn) = cn {
			params.distinguished_name.push(rcgen::DnType::CommonName, cn);
		}
		params.serialize_request(&key_pair).unwrap().der().to_vec()
	}

	fn service_with(validator: FixedValidator) -> IssuanceService {
		let CertifiedKey { cert, signing_key } = generate_simple_self_signed(vec!["intermediate.mesh.internal".to_string()]).unwrap();
		let key = p256::SecretKey::from_pkcs8_der(&signing_key.serialized_der()).unwrap();
		let credentials =
			Credentials::new(key, Certificate::from_der(cert.der().clone()).unwrap(), TrustChain::default()).unwrap();

		let anchors = TrustAnchors::from_certificates(&[Certificate::from_der(cert.der().clone()).unwrap()]).unwrap();
		let trust_store = TrustStore::new(anchors).unwrap();

		let registry = Arc::new(Registry::new());
		registry.publish(Issuer::new(credentials, Duration::from_secs(3600), Duration::from_secs(60)));

		IssuanceService::new(registry, trust_store, Arc::new(validator), Arc::new(NullSink))
	}

	#[tokio::test]
	async fn happy_path_issues_a_certificate() {
		let service = service_with(FixedValidator(Ok(IDENTITY.to_string())));
		let response = service
			.certify(IssuanceRequest {
				identity: IDENTITY.to_string(),
				token: b"token".to_vec(),
				csr: csr_der(IDENTITY, None),
			})
			.await
			.unwrap();
		assert_eq!(response.intermediate_chain.len(), 1);
	}

	#[tokio::test]
	async fn unavailable_when_no_issuer_published() {
		let registry = Arc::new(Registry::new());
		let CertifiedKey { cert, .. } = generate_simple_self_signed(vec!["root.mesh.internal".to_string()]).unwrap();
		let trust_store =
			TrustStore::new(TrustAnchors::from_certificates(&[Certificate::from_der(cert.der().clone()).unwrap()]).unwrap())
				.unwrap();
		let service = IssuanceService::new(
			registry,
			trust_store,
			Arc::new(FixedValidator(Ok(IDENTITY.to_string()))),
			Arc::new(NullSink),
		);
		let result = service
			.certify(IssuanceRequest {
				identity: IDENTITY.to_string(),
				token: b"token".to_vec(),
				csr: csr_der(IDENTITY, None),
			})
			.await;
		assert!(matches!(result, Err(IssuanceError::Unavailable)));
	}

	#[tokio::test]
	async fn empty_identity_is_invalid_argument() {
		let service = service_with(FixedValidator(Ok(IDENTITY.to_string())));
		let result = service
			.certify(IssuanceRequest {
				identity: String::new(),
				token: b"token".to_vec(),
				csr: csr_der(IDENTITY, None),
			})
			.await;
		assert!(matches!(result, Err(IssuanceError::InvalidArgument(_))));
	}

	#[tokio::test]
	async fn csr_identity_mismatch_is_failed_precondition() {
		let service = service_with(FixedValidator(Ok(IDENTITY.to_string())));
		let result = service
			.certify(IssuanceRequest {
				identity: IDENTITY.to_string(),
				token: b"token".to_vec(),
				csr: csr_der("someone-else.default.serviceaccount.identity.linkerd.cluster.local", None),
			})
			.await;
		assert!(matches!(result, Err(IssuanceError::FailedPrecondition(_))));
	}

	#[tokio::test]
	async fn mismatched_common_name_is_failed_precondition() {
		let service = service_with(FixedValidator(Ok(IDENTITY.to_string())));
		let result = service
			.certify(IssuanceRequest {
				identity: IDENTITY.to_string(),
				token: b"token".to_vec(),
				csr: csr_der(IDENTITY, Some("not-the-identity")),
			})
			.await;
		assert!(matches!(result, Err(IssuanceError::FailedPrecondition(_))));
	}

	#[tokio::test]
	async fn unauthenticated_token_is_failed_precondition() {
		let service = service_with(FixedValidator(Err(ValidatorError::NotAuthenticated)));
		let result = service
			.certify(IssuanceRequest {
				identity: IDENTITY.to_string(),
				token: b"token".to_vec(),
				csr: csr_der(IDENTITY, None),
			})
			.await;
		assert!(matches!(result, Err(IssuanceError::FailedPrecondition(_))));
	}

	#[tokio::test]
	async fn identity_binding_mismatch_is_failed_precondition() {
		let service = service_with(FixedValidator(Ok("someone-else.default.serviceaccount.identity.linkerd.cluster.local".to_string())));
		let result = service
			.certify(IssuanceRequest {
				identity: IDENTITY.to_string(),
				token: b"token".to_vec(),
				csr: csr_der(IDENTITY, None),
			})
			.await;
		assert!(matches!(result, Err(IssuanceError::FailedPrecondition(_))));
	}
}
