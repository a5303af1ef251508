//! Logging/tracing (SPEC_FULL.md §4.L). Initialized once in `main`, mirroring
//! the teacher's `tracing` + `tracing-subscriber` dependency set (`EnvFilter`,
//! JSON-capable formatting) without pulling in a dedicated `agent-core`-style
//! telemetry crate at this project's scale.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Installs a global subscriber: JSON-formatted events, level controlled by
/// `RUST_LOG` (defaulting to `info`).
pub fn init() {
	let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
	tracing_subscriber::registry()
		.with(filter)
		.with(tracing_subscriber::fmt::layer().json().with_target(true))
		.init();
}
