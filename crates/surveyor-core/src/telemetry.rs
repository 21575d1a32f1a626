//! Tracing bootstrap for hosts embedding the core.
//!
//! The library itself only emits `tracing` events; hosts decide where they
//! go. [`init_tracing`] wires up a reasonable default subscriber and is
//! idempotent — the global subscriber can only be installed once per
//! process, so later calls are no-ops.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Subscriber settings for [`init_tracing`].
#[derive(Debug, Clone)]
pub struct TelemetryOptions {
    /// Emit newline-delimited JSON instead of human-readable lines.
    pub json: bool,
    /// Filter directive used when `RUST_LOG` is unset, e.g. `"info"` or
    /// `"surveyor_core=debug"`.
    pub default_directive: String,
}

impl Default for TelemetryOptions {
    fn default() -> Self {
        Self {
            json: false,
            default_directive: "info".to_string(),
        }
    }
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` wins over `options.default_directive` when set. Safe to call
/// more than once; only the first call takes effect.
pub fn init_tracing(options: TelemetryOptions) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(options.default_directive));

    let registry = tracing_subscriber::registry().with(filter);
    if options.json {
        registry
            .with(fmt::layer().with_target(false).json())
            .try_init()
            .ok();
    } else {
        registry
            .with(fmt::layer().with_target(false))
            .try_init()
            .ok();
    }
}
