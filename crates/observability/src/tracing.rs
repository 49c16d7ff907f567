//! Tracing/logging initialization.
//!
//! JSON lines on stdout, filtered by `RUST_LOG` when set.

use tracing_subscriber::EnvFilter;

/// Directive used when `RUST_LOG` is absent or unparsable.
pub const DEFAULT_FILTER: &str = "info";

/// Initialize tracing for the process, falling back to `default_filter`.
///
/// Safe to call multiple times (subsequent calls are no-ops).
pub fn init(default_filter: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .json()
        .with_timer(tracing_subscriber::fmt::time::SystemTime)
        .with_target(false)
        .with_current_span(true)
        .try_init();
}

#[cfg(test)]
mod tests {
    #[test]
    fn init_twice_is_a_no_op() {
        super::init(super::DEFAULT_FILTER);
        super::init("debug");
        tracing::info!("still logging");
    }
}
