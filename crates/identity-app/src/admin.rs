//! Admin surface (SPEC_FULL.md §4.M): a small `axum` router exposing
//! `/healthz`, `/readyz`, and `/metrics`, grounded on the shape of the
//! teacher's `management::admin` module (a dedicated axum/hyper surface
//! living alongside the main service) without its config-dump/PAT/pprof
//! surface, which this project has no counterpart for.

use std::sync::Arc;

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::routing::get;
use identity_core::Event;
use identity_core::EventSink;
use identity_core::Registry;
use prometheus_client::encoding::text::encode;
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::registry::Registry as MetricsRegistry;
use tokio::sync::Mutex;

#[derive(Debug, Clone, Hash, PartialEq, Eq, prometheus_client::encoding::EncodeLabelSet)]
pub struct IssuanceOutcomeLabels {
	pub outcome: &'static str,
}

#[derive(Debug, Clone, Hash, PartialEq, Eq, prometheus_client::encoding::EncodeLabelSet)]
pub struct RotationOutcomeLabels {
	pub outcome: &'static str,
}

/// Process-lifetime counters surfaced on `/metrics`, mirroring the counts the
/// Event Sink (spec.md §4.I) and Certify pipeline (spec.md §4.G) already
/// produce as outcomes.
#[derive(Clone)]
pub struct Metrics {
	pub issuance: Family<IssuanceOutcomeLabels, Counter>,
	pub rotation: Family<RotationOutcomeLabels, Counter>,
}

impl Metrics {
	pub fn new(registry: &mut MetricsRegistry) -> Self {
		let issuance = Family::<IssuanceOutcomeLabels, Counter>::default();
		let rotation = Family::<RotationOutcomeLabels, Counter>::default();
		registry.register("identity_issuance_total", "Certify RPC outcomes by kind", issuance.clone());
		registry.register("identity_rotation_total", "Credential rotation outcomes by kind", rotation.clone());
		Self { issuance, rotation }
	}
}

/// Wraps another [`EventSink`] and additionally counts rotation outcomes
/// into the `/metrics` surface, so the Event Sink (spec.md §4.I) stays the
/// single place rotation results are observed from.
pub struct MetricsEventSink<S> {
	inner: S,
	metrics: Metrics,
}

impl<S: EventSink> MetricsEventSink<S> {
	pub fn new(inner: S, metrics: Metrics) -> Self {
		Self { inner, metrics }
	}
}

impl<S: EventSink> EventSink for MetricsEventSink<S> {
	fn emit(&self, event: Event) {
		let outcome = match &event {
			Event::IssuerUpdated => "updated",
			Event::IssuerUpdateSkipped { .. } => "skipped",
			Event::IssuerValidationFailed { .. } => "validation_failed",
		};
		self.metrics.rotation.get_or_create(&RotationOutcomeLabels { outcome }).inc();
		self.inner.emit(event);
	}
}

struct AdminState {
	registry: Arc<Registry>,
	metrics_registry: Mutex<MetricsRegistry>,
}

/// Builds the admin router. `metrics_registry` is the `prometheus-client`
/// registry [`Metrics::new`] registered the counters into.
pub fn router(registry: Arc<Registry>, metrics_registry: MetricsRegistry) -> Router {
	let state = Arc::new(AdminState {
		registry,
		metrics_registry: Mutex::new(metrics_registry),
	});
	Router::new()
		.route("/healthz", get(healthz))
		.route("/readyz", get(readyz))
		.route("/metrics", get(metrics))
		.with_state(state)
}

/// Process liveness: if this handler runs at all, the process is alive.
async fn healthz() -> impl IntoResponse {
	(StatusCode::OK, "ok")
}

/// Ready once an Issuer has been published at least once (spec.md §4.G step 1:
/// a certify call fails `Unavailable` until then).
async fn readyz(State(state): State<Arc<AdminState>>) -> impl IntoResponse {
	if state.registry.snapshot().is_some() {
		(StatusCode::OK, "ready")
	} else {
		(StatusCode::SERVICE_UNAVAILABLE, "no issuer published yet")
	}
}

async fn metrics(State(state): State<Arc<AdminState>>) -> impl IntoResponse {
	let mut buf = String::new();
	let registry = state.metrics_registry.lock().await;
	match encode(&mut buf, &registry) {
		Ok(()) => (StatusCode::OK, buf),
		Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, format!("failed to encode metrics: {e}")),
	}
}

#[cfg(test)]
mod tests {
	use axum::body::Body;
	use axum::http::Request;
	use tower::ServiceExt;

	use super::*;

	#[tokio::test]
	async fn healthz_is_always_ok() {
		let app = router(Arc::new(Registry::new()), MetricsRegistry::default());
		let response = app.oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap()).await.unwrap();
		assert_eq!(response.status(), StatusCode::OK);
	}

	#[tokio::test]
	async fn readyz_is_unavailable_before_first_publish() {
		let app = router(Arc::new(Registry::new()), MetricsRegistry::default());
		let response = app.oneshot(Request::builder().uri("/readyz").body(Body::empty()).unwrap()).await.unwrap();
		assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
	}

	#[tokio::test]
	async fn metrics_endpoint_serves_prometheus_text() {
		let mut metrics_registry = MetricsRegistry::default();
		let metrics = Metrics::new(&mut metrics_registry);
		metrics.issuance.get_or_create(&IssuanceOutcomeLabels { outcome: "ok" }).inc();

		let app = router(Arc::new(Registry::new()), metrics_registry);
		let response = app.oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap()).await.unwrap();
		assert_eq!(response.status(), StatusCode::OK);
	}
}
