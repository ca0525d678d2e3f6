//! Tracing and logging (shared setup).

/// Initialize process-wide observability (tracing/logging).
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    self::tracing::init();
}

pub use self::tracing::component_span;

/// Tracing configuration (filters, layers, component spans).
pub mod tracing;
