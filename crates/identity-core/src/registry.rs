//! Hot-Swap Registry: holds the optional "current Issuer". spec.md §4.H.
//!
//! Generalizes `agent-core`'s `Atomic<T>`/`AtomicOption<T>` type aliases
//! (`crates/core/src/arc.rs`) over `arc_swap::ArcSwapOption`: `Snapshot` is
//! wait-free against `Publish` because `ArcSwapOption::load_full` never
//! blocks a concurrent `store`. `Publish` itself is only ever called by the
//! Credential Watcher, so no additional serialization is needed there.

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use tokio::sync::Mutex;
use tokio::sync::MutexGuard;

use crate::issuer::Issuer;

struct Published {
	issuer: Arc<Issuer>,
	/// The per-call signing lease, spec.md §4.H: two concurrent certify
	/// calls that captured the *same* snapshot serialize here rather than
	/// being rejected. A new `Publish` hands out a fresh lease, independent
	/// of any in-flight holders of the old one.
	signing_lease: Arc<Mutex<()>>,
}

/// A handle that pins the currently published Issuer for the duration of a
/// single certify call. Holding a handle prevents the Issuer it references
/// from being dropped, even after a later `Publish`.
#[derive(Clone)]
pub struct IssuerHandle {
	issuer: Arc<Issuer>,
	signing_lease: Arc<Mutex<()>>,
}

impl IssuerHandle {
	pub fn issuer(&self) -> &Issuer {
		&self.issuer
	}

	fn issuer_arc(&self) -> &Arc<Issuer> {
		&self.issuer
	}

	/// Acquires the short exclusive signing lease. Lease acquisition is
	/// expected to be sub-millisecond; callers wait rather than being
	/// rejected.
	pub async fn acquire_signing_lease(&self) -> MutexGuard<'_, ()> {
		self.signing_lease.lock().await
	}
}

/// Holds the optional current Issuer. spec.md §4.H.
#[derive(Default)]
pub struct Registry {
	current: ArcSwapOption<Published>,
}

impl Registry {
	pub fn new() -> Self {
		Self {
			current: ArcSwapOption::empty(),
		}
	}

	/// `Publish(newIssuer)`: atomically replaces the current value. New
	/// requests see the new issuer; in-flight requests that captured the
	/// old issuer continue with it.
	pub fn publish(&self, issuer: Issuer) {
		self.current.store(Some(Arc::new(Published {
			issuer: Arc::new(issuer),
			signing_lease: Arc::new(Mutex::new(())),
		})));
	}

	/// `Snapshot() -> Option<IssuerHandle>`.
	pub fn snapshot(&self) -> Option<IssuerHandle> {
		self.current.load_full().map(|p| IssuerHandle {
			issuer: p.issuer.clone(),
			signing_lease: p.signing_lease.clone(),
		})
	}
}

#[cfg(test)]
mod tests {
	use std::time::Duration;

	use p256::pkcs8::DecodePrivateKey;
	use rcgen::CertifiedKey;
	use rcgen::generate_simple_self_signed;

	use super::*;
	use crate::cert::Certificate;
	use crate::cert::Credentials;
	use crate::cert::TrustChain;

	fn issuer() -> Issuer {
		let CertifiedKey { cert, signing_key } = generate_simple_self_signed(vec!["intermediate.mesh.internal".to_string()]).unwrap();
		let key = p256::SecretKey::from_pkcs8_der(&signing_key.serialized_der()).unwrap();
		let credentials =
			Credentials::new(key, Certificate::from_der(cert.der().clone()).unwrap(), TrustChain::default()).unwrap();
		Issuer::new(credentials, Duration::from_secs(3600), Duration::from_secs(60))
	}

	#[test]
	fn snapshot_is_none_before_first_publish() {
		let registry = Registry::new();
		assert!(registry.snapshot().is_none());
	}

	#[test]
	fn snapshot_observes_published_issuer() {
		let registry = Registry::new();
		registry.publish(issuer());
		assert!(registry.snapshot().is_some());
	}

	#[tokio::test]
	async fn snapshot_taken_before_publish_keeps_old_issuer_alive() {
		let registry = Registry::new();
		registry.publish(issuer());
		let old = registry.snapshot().unwrap();

		registry.publish(issuer());
		let new = registry.snapshot().unwrap();

		// Distinct Issuer instances restart their serial space at 1, so two
		// independently-addressable handles prove both are alive at once.
		assert!(!Arc::ptr_eq(old.issuer_arc(), new.issuer_arc()));
	}

	#[tokio::test]
	async fn signing_lease_serializes_concurrent_holders() {
		let registry = Registry::new();
		registry.publish(issuer());
		let handle = registry.snapshot().unwrap();

		let _first = handle.acquire_signing_lease().await;
		let second = handle.signing_lease.try_lock();
		assert!(second.is_err());
	}
}
