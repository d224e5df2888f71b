//! Shared tracing/logging setup for gatehouse processes.

/// Initialize process-wide observability (tracing/logging).
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    tracing::init();
}

/// Subscriber construction (filters, layers).
pub mod tracing;
