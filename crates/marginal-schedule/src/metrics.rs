//! Tracing hooks for executed operations.
//!
//! Compiled to nothing unless the `tracing` feature is enabled.

#[cfg(feature = "tracing")]
pub fn emit_span(event: &str, key_values: &[(&str, String)]) {
    tracing::trace_span!("marginal", event).in_scope(|| {
        for (key, value) in key_values {
            tracing::trace!(key = %key, value = %value, "{event}");
        }
    });
}

#[cfg(not(feature = "tracing"))]
#[inline(always)]
pub fn emit_span(_event: &str, _key_values: &[(&str, String)]) {}
