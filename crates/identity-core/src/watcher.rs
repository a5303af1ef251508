//! Credential Watcher: watches the filesystem, reloads the Issuer on atomic
//! secret update. spec.md §4.F.
//!
//! Built on `notify` + `notify-debouncer-full` (teacher dependencies, listed
//! in its `Cargo.toml` but unused in the pack filtered for this exercise),
//! watching for the Kubernetes secret-mount convention described in
//! spec.md §6: a `CREATE` whose path is `<dir>/..data`.

use std::path::Path;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use notify::EventKind;
use notify::RecommendedWatcher;
use notify::RecursiveMode;
use notify_debouncer_full::DebounceEventResult;
use notify_debouncer_full::DebouncedEvent;
use notify_debouncer_full::Debouncer;
use notify_debouncer_full::FileIdMap;
use notify_debouncer_full::new_debouncer;
use tokio::sync::mpsc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::cert::Certificate;
use crate::cert::Credentials;
use crate::cert::TrustChain;
use crate::error::RotationError;
use crate::events::Event;
use crate::events::EventSink;
use crate::issuer::Issuer;
use crate::pem;
use crate::registry::Registry;
use crate::trust_store::TrustStore;

const DEBOUNCE_WINDOW: Duration = Duration::from_millis(200);

/// Everything the watcher needs to re-materialize and verify a new Issuer.
pub struct WatcherConfig {
	pub dir: PathBuf,
	pub trust_store: TrustStore,
	pub validity: Duration,
	pub skew: Duration,
	pub registry: Arc<Registry>,
	pub event_sink: Arc<dyn EventSink>,
}

/// Owns the filesystem watch and its background reload task. Dropping this
/// (or calling [`Self::shutdown`]) stops the watch.
pub struct CredentialWatcher {
	_debouncer: Debouncer<RecommendedWatcher, FileIdMap>,
	task: JoinHandle<()>,
	shutdown_tx: Option<oneshot::Sender<()>>,
}

impl CredentialWatcher {
	pub fn spawn(config: WatcherConfig) -> Result<Self, notify::Error> {
		let (raw_tx, mut raw_rx) = mpsc::unbounded_channel();
		let mut debouncer = new_debouncer(DEBOUNCE_WINDOW, None, move |result: DebounceEventResult| {
			let _ = raw_tx.send(result);
		})?;
		debouncer.watch(&config.dir, RecursiveMode::NonRecursive)?;

		let data_marker = config.dir.join("..data");
		let key_path = config.dir.join("tls.key");
		let cert_path = config.dir.join("tls.crt");
		let WatcherConfig {
			trust_store,
			validity,
			skew,
			registry,
			event_sink,
			..
		} = config;

		let (shutdown_tx, mut shutdown_rx) = oneshot::channel();

		let task = tokio::spawn(async move {
			loop {
				tokio::select! {
					_ = &mut shutdown_rx => return,
					msg = raw_rx.recv() => {
						let Some(result) = msg else { return };
						match result {
							Ok(events) => {
								if events.iter().any(|e| is_data_publish(e, &data_marker)) {
									reload(&key_path, &cert_path, &trust_store, validity, skew, &registry, &event_sink).await;
								}
							},
							Err(errors) => {
								for error in errors {
									event_sink.emit(Event::IssuerUpdateSkipped { reason: error.to_string() });
								}
								return;
							},
						}
					}
				}
			}
		});

		Ok(Self {
			_debouncer: debouncer,
			task,
			shutdown_tx: Some(shutdown_tx),
		})
	}

	/// Releases the watcher and waits for the reload loop to exit cleanly.
	pub async fn shutdown(mut self) {
		if let Some(tx) = self.shutdown_tx.take() {
			let _ = tx.send(());
		}
		let _ = self.task.await;
	}
}

fn is_data_publish(event: &DebouncedEvent, data_marker: &Path) -> bool {
	matches!(event.kind, EventKind::Create(_)) && event.paths.iter().any(|p| p == data_marker)
}

async fn reload(
	key_path: &Path,
	cert_path: &Path,
	trust_store: &TrustStore,
	validity: Duration,
	skew: Duration,
	registry: &Registry,
	event_sink: &Arc<dyn EventSink>,
) {
	match reload_inner(key_path, cert_path, trust_store, validity, skew).await {
		Ok(issuer) => {
			registry.publish(issuer);
			event_sink.emit(Event::IssuerUpdated);
		},
		Err(error) => {
			event_sink.emit(Event::IssuerUpdateSkipped { reason: error.to_string() });
		},
	}
}

async fn reload_inner(
	key_path: &Path,
	cert_path: &Path,
	trust_store: &TrustStore,
	validity: Duration,
	skew: Duration,
) -> Result<Issuer, RotationError> {
	let key_pem = tokio::fs::read(key_path).await.map_err(|e| RotationError::Io(e.to_string()))?;
	let cert_pem = tokio::fs::read(cert_path).await.map_err(|e| RotationError::Io(e.to_string()))?;

	let private_key = pem::decode_private_key(&key_pem)?;
	let mut chain = pem::decode_chain_wire_order(&cert_pem)?;
	let leaf_der = chain.pop().ok_or(RotationError::Parse(crate::error::ParseError::Empty))?;
	let leaf = Certificate::from_der(leaf_der)?;
	let ancestors = chain.into_iter().map(Certificate::from_der).collect::<Result<Vec<_>, _>>()?;
	let trust_chain = TrustChain::new(ancestors);

	let credentials = Credentials::new(private_key, leaf, trust_chain)?;

	trust_store.verify(credentials.leaf(), credentials.chain().as_slice(), None, None)?;

	Ok(Issuer::new(credentials, validity, skew))
}

#[cfg(test)]
mod tests {
	use std::io::Write;

	use p256::pkcs8::DecodePrivateKey;
	use rcgen::CertifiedKey;
	use rcgen::generate_simple_self_signed;

	use super::*;
	use crate::pem::encode_certificates;
	use crate::pem::encode_private_key_sec1;
	use crate::trust_store::TrustAnchors;

	#[tokio::test]
	async fn reload_inner_publishes_issuer_for_well_formed_material() {
		let CertifiedKey { cert, signing_key } = generate_simple_self_signed(vec!["intermediate.mesh.internal".to_string()]).unwrap();
		let key = p256::SecretKey::from_pkcs8_der(&signing_key.serialized_der()).unwrap();

		let dir = tempfile::tempdir().unwrap();
		let key_path = dir.path().join("tls.key");
		let cert_path = dir.path().join("tls.crt");
		std::fs::File::create(&key_path).unwrap().write_all(encode_private_key_sec1(&key).as_bytes()).unwrap();
		std::fs::File::create(&cert_path).unwrap().write_all(encode_certificates(&[cert.der().clone()]).as_bytes()).unwrap();

		let anchors = TrustAnchors::from_certificates(&[Certificate::from_der(cert.der().clone()).unwrap()]).unwrap();
		let trust_store = TrustStore::new(anchors).unwrap();

		let issuer = reload_inner(&key_path, &cert_path, &trust_store, Duration::from_secs(3600), Duration::from_secs(60))
			.await
			.unwrap();
		assert!(issuer.verify(&trust_store).is_ok());
	}

	#[tokio::test]
	async fn reload_inner_reports_missing_files() {
		let dir = tempfile::tempdir().unwrap();
		let anchors_cert = {
			let CertifiedKey { cert, .. } = generate_simple_self_signed(vec!["root.mesh.internal".to_string()]).unwrap();
			Certificate::from_der(cert.der().clone()).unwrap()
		};
		let trust_store = TrustStore::new(TrustAnchors::from_certificates(&[anchors_cert]).unwrap()).unwrap();

		let result = reload_inner(
			&dir.path().join("tls.key"),
			&dir.path().join("tls.crt"),
			&trust_store,
			Duration::from_secs(3600),
			Duration::from_secs(60),
		)
		.await;
		assert!(matches!(result, Err(RotationError::Io(_))));
	}
}
