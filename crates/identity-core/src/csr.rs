//! Certificate signing request introspection, used by the Issuance Service's
//! CSR policy check (spec.md §4.G step 4) and the Issuer's key-type rule
//! (spec.md §4.C). Parsed the same way `cert.rs` parses issued certificates:
//! keep only the DER, re-parse with `x509-parser` on demand.

use x509_parser::certification_request::X509CertificationRequest;
use x509_parser::extensions::GeneralName;
use x509_parser::extensions::ParsedExtension;
use x509_parser::oid_registry::OID_KEY_TYPE_EC_PUBLIC_KEY;

use crate::error::ParseError;

#[derive(Debug, Clone)]
pub struct CertificateRequest {
	der: Vec<u8>,
}

impl CertificateRequest {
	pub fn from_der(der: Vec<u8>) -> Result<Self, ParseError> {
		if der.is_empty() {
			return Err(ParseError::Empty);
		}
		X509CertificationRequest::from_der(&der).map_err(|e| ParseError::MalformedDer(e.to_string()))?;
		Ok(Self { der })
	}

	pub fn der(&self) -> &[u8] {
		&self.der
	}

	fn parsed(&self) -> X509CertificationRequest<'_> {
		X509CertificationRequest::from_der(&self.der).expect("validated in from_der").1
	}

	/// spec.md §4.C: "Rejects CSRs whose public key is not ECDSA."
	pub fn public_key_is_ecdsa(&self) -> bool {
		self.parsed().certification_request_info.subject_pki.algorithm.algorithm == OID_KEY_TYPE_EC_PUBLIC_KEY
	}

	pub fn subject_common_name(&self) -> Option<String> {
		let parsed = self.parsed();
		parsed
			.certification_request_info
			.subject
			.iter_common_name()
			.next()
			.and_then(|cn| cn.as_str().ok())
			.map(str::to_string)
	}

	pub fn dns_names(&self) -> Vec<String> {
		let parsed = self.parsed();
		let Some(san) = requested_san(&parsed) else {
			return Vec::new();
		};
		san
			.general_names
			.iter()
			.filter_map(|n| match n {
				GeneralName::DNSName(name) => Some((*name).to_string()),
				_ => None,
			})
			.collect()
	}

	/// spec.md §4.G step 4: "no email addresses, no IP addresses, no URIs."
	pub fn has_disallowed_san_types(&self) -> bool {
		let parsed = self.parsed();
		let Some(san) = requested_san(&parsed) else {
			return false;
		};
		san.general_names.iter().any(|n| {
			matches!(
				n,
				GeneralName::RFC822Name(_) | GeneralName::IPAddress(_) | GeneralName::URI(_)
			)
		})
	}
}

fn requested_san<'a>(
	parsed: &'a X509CertificationRequest<'a>,
) -> Option<&'a x509_parser::extensions::SubjectAlternativeName<'a>> {
	parsed.certification_request_info.requested_extensions().find_map(|ext| match ext {
		ParsedExtension::SubjectAlternativeName(san) => Some(san),
		_ => None,
	})
}
