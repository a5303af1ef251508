//! Certificate, TrustChain, and Credentials data types. spec.md §3.
//!
//! A `Certificate` keeps only its DER bytes and re-parses on demand with
//! `x509-parser`, the same crate and access pattern as
//! `control::caclient::{expiration, identity}` — this sidesteps owning a
//! self-referential `X509Certificate<'a>` alongside its backing bytes.

use std::time::Duration;
use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use p256::SecretKey;
use p256::pkcs8::EncodePublicKey;
use rustls_pki_types::CertificateDer;
use x509_parser::certificate::X509Certificate;
use x509_parser::extensions::GeneralName;

use crate::error::ParseError;

/// A parsed X.509 structure plus its DER-encoded form, spec.md §3.
#[derive(Debug, Clone)]
pub struct Certificate {
	der: CertificateDer<'static>,
}

impl Certificate {
	/// Validates that `der` parses as X.509 and retains it. The parsed
	/// structure itself is never stored; every accessor below re-parses.
	pub fn from_der(der: CertificateDer<'static>) -> Result<Self, ParseError> {
		x509_parser::parse_x509_certificate(der.as_ref())
			.map_err(|e| ParseError::MalformedDer(e.to_string()))?;
		Ok(Self { der })
	}

	pub fn der(&self) -> &CertificateDer<'static> {
		&self.der
	}

	fn parsed(&self) -> X509Certificate<'_> {
		x509_parser::parse_x509_certificate(self.der.as_ref())
			.expect("validated in from_der")
			.1
	}

	pub fn not_before(&self) -> SystemTime {
		UNIX_EPOCH + Duration::from_secs(self.parsed().validity.not_before.timestamp().try_into().unwrap_or_default())
	}

	pub fn not_after(&self) -> SystemTime {
		UNIX_EPOCH + Duration::from_secs(self.parsed().validity.not_after.timestamp().try_into().unwrap_or_default())
	}

	/// Big-endian serial number bytes, as they appear on the wire.
	pub fn serial(&self) -> Vec<u8> {
		self.parsed().raw_serial().to_vec()
	}

	/// The raw DER `SubjectPublicKeyInfo`, used to check the leaf-matches-key
	/// invariant in [`Credentials::new`].
	pub fn subject_public_key_info_der(&self) -> Vec<u8> {
		self.parsed().public_key().raw.to_vec()
	}

	pub fn subject_common_name(&self) -> Option<String> {
		let parsed = self.parsed();
		parsed
			.subject()
			.iter_common_name()
			.next()
			.and_then(|cn| cn.as_str().ok())
			.map(str::to_string)
	}

	pub fn dns_names(&self) -> Vec<String> {
		let parsed = self.parsed();
		let Ok(Some(ext)) = parsed.subject_alternative_name() else {
			return Vec::new();
		};
		ext
			.value
			.general_names
			.iter()
			.filter_map(|n| match n {
				GeneralName::DNSName(name) => Some((*name).to_string()),
				_ => None,
			})
			.collect()
	}

	/// True if the SAN extension contains an email address, IP address, or
	/// URI — the classes spec.md §4.G step 4 rejects in a request CSR.
	pub fn has_disallowed_san_types(&self) -> bool {
		let parsed = self.parsed();
		let Ok(Some(ext)) = parsed.subject_alternative_name() else {
			return false;
		};
		ext.value.general_names.iter().any(|n| {
			matches!(
				n,
				GeneralName::RFC822Name(_) | GeneralName::IPAddress(_) | GeneralName::URI(_)
			)
		})
	}
}

/// An ordered sequence of certificates, root-most to leaf-most, exclusive of
/// the leaf itself. spec.md §3.
#[derive(Debug, Clone, Default)]
pub struct TrustChain(Vec<Certificate>);

impl TrustChain {
	pub fn new(certs: Vec<Certificate>) -> Self {
		Self(certs)
	}

	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}

	pub fn as_slice(&self) -> &[Certificate] {
		&self.0
	}

	/// The chain's DER bytes, root-first, for handing to the trust store.
	pub fn der_chain(&self) -> Vec<CertificateDer<'static>> {
		self.0.iter().map(|c| c.der().clone()).collect()
	}
}

/// `{PrivateKey, Leaf Certificate, TrustChain}`, spec.md §3. Constructing one
/// verifies the public-key-matches-private-key invariant; there is no way to
/// obtain a `Credentials` value that violates it.
#[derive(Debug, Clone)]
pub struct Credentials {
	private_key: SecretKey,
	leaf: Certificate,
	chain: TrustChain,
}

impl Credentials {
	pub fn new(private_key: SecretKey, leaf: Certificate, chain: TrustChain) -> Result<Self, ParseError> {
		let key_spki = private_key
			.public_key()
			.to_public_key_der()
			.map_err(|e| ParseError::MalformedDer(e.to_string()))?;
		if key_spki.as_bytes() != leaf.subject_public_key_info_der().as_slice() {
			return Err(ParseError::KeyMismatch);
		}
		Ok(Self {
			private_key,
			leaf,
			chain,
		})
	}

	pub fn private_key(&self) -> &SecretKey {
		&self.private_key
	}

	pub fn leaf(&self) -> &Certificate {
		&self.leaf
	}

	pub fn chain(&self) -> &TrustChain {
		&self.chain
	}
}
