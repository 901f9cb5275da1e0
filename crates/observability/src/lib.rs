//! `rentflow-observability` — process-wide tracing setup.
//!
//! The domain and engine crates only emit `tracing` events (claim unwinds,
//! settlement amounts, compensation failures); where those events go is the
//! host's call. Binaries call [`init`] once at startup; test harnesses may
//! call it freely, later calls are no-ops.

pub mod tracing;

pub use tracing::{init, init_with_default};
