//! PEM Codec: parses and serializes keys, certificates, and certificate
//! bundles. spec.md §4.B.
//!
//! Mirrors `control::caclient::{parse_key, parse_cert, parse_cert_multi}`'s
//! block-matching idiom, generalized into the server-side codec: accepts
//! both SEC1 and PKCS#8 EC private keys on input, always emits SEC1 on
//! output, and performs the leaf-first (wire) <-> root-first (internal)
//! reversal for certificate bundles.

use std::io::Cursor;

use p256::SecretKey;
use p256::pkcs8::DecodePrivateKey;
use p256::pkcs8::LineEnding;
use rustls_pemfile::Item;
use rustls_pki_types::CertificateDer;

use crate::error::ParseError;

/// Decodes a single EC private key PEM block, accepting either SEC1
/// (`EC PRIVATE KEY`) or PKCS#8 (`PRIVATE KEY`) form.
pub fn decode_private_key(pem: &[u8]) -> Result<SecretKey, ParseError> {
	if pem.is_empty() {
		return Err(ParseError::Empty);
	}
	let mut reader = std::io::BufReader::new(Cursor::new(pem));
	let item = rustls_pemfile::read_one(&mut reader)
		.map_err(|e| ParseError::MalformedPem(e.to_string()))?
		.ok_or(ParseError::Empty)?;
	match item {
		Item::Sec1Key(der) => {
			SecretKey::from_sec1_der(der.secret_sec1_der()).map_err(|e| ParseError::MalformedDer(e.to_string()))
		},
		Item::Pkcs8Key(der) => SecretKey::from_pkcs8_der(der.secret_pkcs8_der())
			.map_err(|e| ParseError::MalformedDer(e.to_string())),
		other => Err(ParseError::UnexpectedBlockType {
			expected: "EC PRIVATE KEY or PRIVATE KEY",
			found: format!("{other:?}"),
		}),
	}
}

/// Encodes a private key as a SEC1 (`EC PRIVATE KEY`) PEM block, per
/// spec.md §4.B's "emit SEC1 on output" rule regardless of the form it was
/// read in.
pub fn encode_private_key_sec1(key: &SecretKey) -> String {
	// p256's SEC1 encoder already emits the `EC PRIVATE KEY` PEM label.
	key
		.to_sec1_pem(LineEnding::LF)
		.expect("SEC1 encoding of a valid key cannot fail")
		.to_string()
}

fn decode_one_certificate(item: Item) -> Result<CertificateDer<'static>, ParseError> {
	match item {
		Item::X509Certificate(der) => Ok(der),
		other => Err(ParseError::UnexpectedBlockType {
			expected: "CERTIFICATE",
			found: format!("{other:?}"),
		}),
	}
}

/// Decodes every `CERTIFICATE` block out of a PEM buffer, in the order they
/// appear on the wire. Used directly for trust-anchor bundles (unordered
/// set, no reversal) and as the basis for [`decode_chain_wire_order`].
pub fn decode_certificates(pem: &[u8]) -> Result<Vec<CertificateDer<'static>>, ParseError> {
	if pem.is_empty() {
		return Err(ParseError::Empty);
	}
	let mut reader = std::io::BufReader::new(Cursor::new(pem));
	let items: Result<Vec<_>, _> = rustls_pemfile::read_all(&mut reader).collect();
	let items = items.map_err(|e| ParseError::MalformedPem(e.to_string()))?;
	if items.is_empty() {
		return Err(ParseError::Empty);
	}
	items.into_iter().map(decode_one_certificate).collect()
}

/// Decodes a `tls.crt`-shaped bundle: leaf-first on the wire (spec.md §6),
/// returned root-first (spec.md §3 `TrustChain` convention) by reversing
/// the parsed order.
pub fn decode_chain_wire_order(pem: &[u8]) -> Result<Vec<CertificateDer<'static>>, ParseError> {
	let mut certs = decode_certificates(pem)?;
	certs.reverse();
	Ok(certs)
}

fn encode_certificate_block(der: &CertificateDer<'_>) -> String {
	pem_rfc7468::encode_string("CERTIFICATE", pem_rfc7468::LineEnding::LF, der.as_ref())
		.expect("DER to PEM encoding of a certificate cannot fail")
}

/// Encodes a root-first internal chain back onto the wire, leaf-first.
pub fn encode_chain_wire_order(chain_root_first: &[CertificateDer<'_>]) -> String {
	chain_root_first
		.iter()
		.rev()
		.map(encode_certificate_block)
		.collect::<Vec<_>>()
		.join("")
}

/// Encodes an unordered set (trust anchors) with no reordering.
pub fn encode_certificates(certs: &[CertificateDer<'_>]) -> String {
	certs.iter().map(encode_certificate_block).collect::<Vec<_>>().join("")
}
