//! Subscriber wiring.

use tracing_subscriber::EnvFilter;

/// Install the global subscriber: JSON lines, `RUST_LOG` filtering, `info`
/// when unset.
pub fn init() {
    init_with_default("info");
}

/// Like [`init`], with a caller-picked fallback directive for when
/// `RUST_LOG` is not set. Test harnesses use `"warn"` to keep engine
/// chatter out of their output.
pub fn init_with_default(directive: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_target(false)
        .try_init();
}
