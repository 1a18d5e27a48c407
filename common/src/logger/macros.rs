use tracing::{Level, Span, field};

use super::TraceId;

/// Root span for a run / drain cycle / setup phase.
pub fn root_span(name: &'static str, trace_id: &TraceId) -> Span {
    tracing::span!(
        Level::INFO,
        "root",
        name = %name,
        trace_id = %trace_id,
        group = field::Empty
    )
}

/// Child span; inherits the trace id from the enclosing root span.
pub fn child_span(name: &'static str) -> Span {
    tracing::span!(Level::INFO, "child", name = %name, group = field::Empty)
}
