//! `identityd`: wires the transport-agnostic identity issuance engine
//! (`identity-core`) onto a real gRPC transport, a Kubernetes TokenReview
//! client, structured logging, and a small admin surface.
//!
//! Mirrors the teacher's separation between a library crate and a thin
//! `*-app` binary crate that owns the CLI, logging setup, and wiring.

mod admin;
mod config;
mod grpc;
mod k8s_validator;
mod telemetry;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use config::Args;
use config::Config;
use identity_core::Certificate;
use identity_core::Credentials;
use identity_core::Issuer;
use identity_core::IssuanceService;
use identity_core::Registry;
use identity_core::TrustAnchors;
use identity_core::TrustChain;
use identity_core::TrustStore;
use identity_core::CredentialWatcher;
use identity_core::TracingEventSink;
use identity_core::WatcherConfig;
use identity_core::pem;
use identity_proto::identity_service_server::IdentityServiceServer;
use prometheus_client::registry::Registry as MetricsRegistry;
use tracing::info;
use tracing::warn;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
	telemetry::init();

	let config = Args::parse().into_config().context("invalid configuration")?;
	run(config).await
}

async fn run(config: Config) -> anyhow::Result<()> {
	let trust_anchors = load_trust_anchors(&config.trust_anchors)
		.await
		.context("loading trust anchor bundle")?;
	let trust_store = TrustStore::new(trust_anchors).context("constructing trust store")?;

	let registry = Arc::new(Registry::new());
	let initial_issuer = load_issuer(&config.issuer_dir, &trust_store, config.validity, config.clock_skew)
		.await
		.context("loading initial intermediate credentials")?;
	registry.publish(initial_issuer);
	info!(issuer_dir = %config.issuer_dir.display(), "initial issuer loaded");

	let mut metrics_registry = MetricsRegistry::default();
	let metrics = admin::Metrics::new(&mut metrics_registry);
	let event_sink = Arc::new(admin::MetricsEventSink::new(TracingEventSink::spawn(), metrics.clone()));

	let watcher = CredentialWatcher::spawn(WatcherConfig {
		dir: config.issuer_dir.clone(),
		trust_store: trust_store.clone(),
		validity: config.validity,
		skew: config.clock_skew,
		registry: registry.clone(),
		event_sink: event_sink.clone(),
	})
	.context("starting credential watcher")?;

	let http_client = reqwest::Client::builder()
		.timeout(Duration::from_secs(10))
		.build()
		.context("building token-review HTTP client")?;
	let service_account_token = std::fs::read_to_string("/var/run/secrets/kubernetes.io/serviceaccount/token").ok();
	let validator = Arc::new(k8s_validator::K8sTokenValidator::new(
		http_client,
		config.token_review_url.clone(),
		config.trust_domain.clone(),
		service_account_token,
	));

	let issuance_service = IssuanceService::new(registry.clone(), trust_store, validator, event_sink);
	let grpc_service = grpc::GrpcIdentityService::new(issuance_service, metrics.issuance.clone());
	let admin_router = admin::router(registry.clone(), metrics_registry);

	let grpc_addr = config.listen_addr.parse().context("invalid listen-addr")?;
	let admin_addr = config.admin_addr.parse().context("invalid admin-addr")?;

	let grpc_server = tonic::transport::Server::builder()
		.add_service(IdentityServiceServer::new(grpc_service))
		.serve(grpc_addr);

	let admin_server = axum::serve(tokio::net::TcpListener::bind(admin_addr).await.context("binding admin listener")?, admin_router);

	info!(%grpc_addr, %admin_addr, "identityd listening");

	tokio::select! {
		result = grpc_server => result.context("gRPC server exited")?,
		result = admin_server => result.context("admin server exited")?,
		_ = tokio::signal::ctrl_c() => {
			info!("received shutdown signal");
		}
	}

	watcher.shutdown().await;
	Ok(())
}

/// Loads the PEM trust-anchor bundle (spec.md §6): identical format to
/// `tls.crt` but containing only root certificates, parsed as an unordered
/// set (no leaf/chain reversal).
async fn load_trust_anchors(path: &std::path::Path) -> anyhow::Result<TrustAnchors> {
	let raw = tokio::fs::read(path).await.with_context(|| format!("reading {}", path.display()))?;
	let ders = pem::decode_certificates(&raw).context("parsing trust anchor bundle")?;
	let certs = ders.into_iter().map(Certificate::from_der).collect::<Result<Vec<_>, _>>()?;
	Ok(TrustAnchors::from_certificates(&certs)?)
}

/// Loads the initial intermediate CA from `<dir>/tls.key` and `<dir>/tls.crt`
/// (spec.md §6), verifying it against the trust anchors before constructing
/// the [`Issuer`]. This is the same validation [`CredentialWatcher`] performs
/// on every subsequent rotation.
async fn load_issuer(
	dir: &std::path::Path,
	trust_store: &TrustStore,
	validity: Duration,
	skew: Duration,
) -> anyhow::Result<Issuer> {
	let key_pem = tokio::fs::read(dir.join("tls.key")).await.context("reading tls.key")?;
	let cert_pem = tokio::fs::read(dir.join("tls.crt")).await.context("reading tls.crt")?;

	let private_key = pem::decode_private_key(&key_pem)?;
	let mut chain = pem::decode_chain_wire_order(&cert_pem)?;
	let leaf_der = chain.pop().context("tls.crt contains no certificates")?;
	let leaf = Certificate::from_der(leaf_der)?;
	let ancestors = chain.into_iter().map(Certificate::from_der).collect::<Result<Vec<_>, _>>()?;
	let trust_chain = TrustChain::new(ancestors);

	let credentials = Credentials::new(private_key, leaf, trust_chain)?;
	trust_store
		.verify(credentials.leaf(), credentials.chain().as_slice(), None, None)
		.context("intermediate does not verify against trust anchors")?;
	if credentials.chain().is_empty() {
		warn!("intermediate credentials carry no ancestor chain beyond the root-signed leaf");
	}

	Ok(Issuer::new(credentials, validity, skew))
}
