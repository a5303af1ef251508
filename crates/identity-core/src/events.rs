//! Event Sink: fire-and-forget audit events. spec.md §4.I.
//!
//! The sink never blocks the hot path: events are pushed onto an unbounded
//! `tokio::sync::mpsc` channel and drained by a background task, the same
//! ack-without-blocking shape as `agent-core`'s `responsechannel::send_ignore`
//! generalized to a broadcast-style sink with no reply at all.

use tokio::sync::mpsc;
use tracing::info;
use tracing::warn;

/// spec.md §4.I's three event kinds.
#[derive(Debug, Clone)]
pub enum Event {
	/// Informational; emitted after a successful reload.
	IssuerUpdated,
	/// Warning; a reload was attempted but the new material failed
	/// validation, carrying the error reason.
	IssuerUpdateSkipped { reason: String },
	/// Warning; a pre-sign issuer self-check failed, carrying the requested
	/// identity and the error reason.
	IssuerValidationFailed { identity: String, reason: String },
}

/// The sink is fire-and-forget; the core must not block on it.
pub trait EventSink: Send + Sync {
	fn emit(&self, event: Event);
}

/// Default sink: logs each event at the level spec.md §4.I prescribes,
/// off the calling task via an unbounded channel drained by a background
/// task.
#[derive(Clone)]
pub struct TracingEventSink {
	tx: mpsc::UnboundedSender<Event>,
}

impl TracingEventSink {
	/// Spawns the background drain task and returns a sink handle. The
	/// drain task exits once every sink handle (and the original) is
	/// dropped.
	pub fn spawn() -> Self {
		let (tx, mut rx) = mpsc::unbounded_channel();
		tokio::spawn(async move {
			while let Some(event) = rx.recv().await {
				log_event(&event);
			}
		});
		Self { tx }
	}
}

impl EventSink for TracingEventSink {
	fn emit(&self, event: Event) {
		// An unbounded send only fails if the drain task's receiver was
		// dropped; there is nothing left to do but drop the event too.
		let _ = self.tx.send(event);
	}
}

fn log_event(event: &Event) {
	match event {
		Event::IssuerUpdated => info!("issuer updated"),
		Event::IssuerUpdateSkipped { reason } => warn!(reason, "issuer update skipped"),
		Event::IssuerValidationFailed { identity, reason } => {
			warn!(identity, reason, "issuer validation failed")
		},
	}
}

#[cfg(test)]
mod tests {
	use std::sync::Arc;
	use std::sync::Mutex;

	use super::*;

	#[derive(Default, Clone)]
	struct RecordingSink(Arc<Mutex<Vec<Event>>>);

	impl EventSink for RecordingSink {
		fn emit(&self, event: Event) {
			self.0.lock().unwrap().push(event);
		}
	}

	#[test]
	fn recording_sink_is_synchronous_and_lossless() {
		let sink = RecordingSink::default();
		sink.emit(Event::IssuerUpdated);
		sink.emit(Event::IssuerUpdateSkipped { reason: "bad pem".to_string() });
		assert_eq!(sink.0.lock().unwrap().len(), 2);
	}

	#[tokio::test]
	async fn tracing_sink_drains_without_blocking_the_emitter() {
		let sink = TracingEventSink::spawn();
		for _ in 0..100 {
			sink.emit(Event::IssuerUpdated);
		}
		// Give the background task a chance to drain; emit() itself never
		// awaits, so this only proves the drain loop keeps up.
		tokio::task::yield_now().await;
	}
}
