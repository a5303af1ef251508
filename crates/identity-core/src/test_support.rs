//! Test-only fixtures shared across unit test modules. Not compiled into
//! non-test builds.

use rcgen::CertifiedKey;
use rcgen::generate_simple_self_signed;

/// A throwaway self-signed certificate's DER bytes, distinguished only by
/// its subject alt name so callers can tell fixtures apart in assertions.
pub fn self_signed_der(san: &str) -> Vec<u8> {
	let CertifiedKey { cert, .. } =
		generate_simple_self_signed(vec![san.to_string()]).expect("self-signed cert generation cannot fail");
	cert.der().to_vec()
}
