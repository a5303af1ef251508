//! Trust Domain: canonicalizes and validates mesh-scoped identity names.
//! spec.md §4.A.

use crate::error::LabelError;

/// A DNS-1123 label: non-empty, at most 63 characters, lowercase
/// alphanumeric or `-`, no leading/trailing `-`.
fn validate_label(label: &'static str, value: &str) -> Result<(), LabelError> {
	if value.is_empty() {
		return Err(LabelError::Empty { label });
	}
	if value.len() > 63 {
		return Err(LabelError::TooLong {
			label,
			value: value.to_string(),
		});
	}
	let bytes = value.as_bytes();
	let valid = bytes.iter().all(|b| b.is_ascii_lowercase() || b.is_ascii_digit() || *b == b'-')
		&& bytes[0] != b'-'
		&& bytes[bytes.len() - 1] != b'-';
	if !valid {
		return Err(LabelError::InvalidLabel {
			label,
			value: value.to_string(),
		});
	}
	Ok(())
}

/// A DNS-1123 subdomain: one or more `.`-separated DNS-1123 labels.
fn validate_subdomain(label: &'static str, value: &str) -> Result<(), LabelError> {
	if value.is_empty() {
		return Err(LabelError::Empty { label });
	}
	for segment in value.split('.') {
		if validate_label("domain segment", segment).is_err() {
			return Err(LabelError::InvalidSubdomain {
				label,
				value: value.to_string(),
			});
		}
	}
	Ok(())
}

/// The mesh-scoped namespace into which all workload identities are minted.
///
/// Canonical identity shape: `<name>.<ns>.<type>.identity.<control-namespace>.<domain>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrustDomain {
	control_namespace: String,
	domain: String,
}

impl TrustDomain {
	pub fn new(control_namespace: impl Into<String>, domain: impl Into<String>) -> Result<Self, LabelError> {
		let control_namespace = control_namespace.into();
		let domain = domain.into();
		validate_label("controlNamespace", &control_namespace)?;
		validate_subdomain("domain", &domain)?;
		Ok(Self {
			control_namespace,
			domain,
		})
	}

	pub fn control_namespace(&self) -> &str {
		&self.control_namespace
	}

	pub fn domain(&self) -> &str {
		&self.domain
	}

	/// Formats the canonical identity string, re-validating every segment.
	pub fn identity(&self, ty: &str, name: &str, ns: &str) -> Result<String, LabelError> {
		validate_label("type", ty)?;
		validate_label("name", name)?;
		validate_label("ns", ns)?;
		Ok(format!(
			"{name}.{ns}.{ty}.identity.{control_ns}.{domain}",
			name = name,
			ns = ns,
			ty = ty,
			control_ns = self.control_namespace,
			domain = self.domain,
		))
	}
}

#[cfg(test)]
mod tests {
	use rstest::rstest;

	use super::*;

	#[rstest]
	#[case::empty("")]
	#[case::uppercase("Default")]
	#[case::interior_dot("default.sub")]
	#[case::leading_dash("-default")]
	#[case::trailing_dash("default-")]
	#[case::underscore("de_fault")]
	fn rejects_malformed_name_label(#[case] name: &str) {
		let td = TrustDomain::new("linkerd", "cluster.local").unwrap();
		assert!(td.identity("serviceaccount", name, "emojivoto").is_err());
	}

	#[rstest]
	#[case::simple("default")]
	#[case::with_digits("default-2")]
	#[case::max_length(&"a".repeat(63))]
	fn accepts_well_formed_name_label(#[case] name: &str) {
		let td = TrustDomain::new("linkerd", "cluster.local").unwrap();
		assert!(td.identity("serviceaccount", name, "emojivoto").is_ok());
	}

	#[test]
	fn formats_canonical_identity() {
		let td = TrustDomain::new("linkerd", "cluster.local").unwrap();
		let id = td.identity("serviceaccount", "default", "emojivoto").unwrap();
		assert_eq!(id, "default.emojivoto.serviceaccount.identity.linkerd.cluster.local");
	}

	#[test]
	fn rejects_empty_control_namespace() {
		assert!(matches!(
			TrustDomain::new("", "cluster.local"),
			Err(LabelError::Empty { label: "controlNamespace" })
		));
	}

	#[test]
	fn rejects_uppercase_and_interior_dots_in_label() {
		let td = TrustDomain::new("linkerd", "cluster.local").unwrap();
		assert!(td.identity("serviceaccount", "Default", "emojivoto").is_err());
		assert!(td.identity("serviceaccount", "default.sub", "emojivoto").is_err());
	}

	#[test]
	fn rejects_label_over_63_chars() {
		let long = "a".repeat(64);
		let td = TrustDomain::new("linkerd", "cluster.local").unwrap();
		assert!(td.identity("serviceaccount", &long, "emojivoto").is_err());
	}

	#[test]
	fn accepts_multi_label_domain() {
		assert!(TrustDomain::new("linkerd", "clusters.example.com").is_ok());
	}

	#[test]
	fn rejects_domain_with_invalid_segment() {
		assert!(TrustDomain::new("linkerd", "cluster..local").is_err());
	}
}
