use std::sync::Arc;

use baton::SpanContext;

/// The narrow view of a span produced by the underlying tracing SDK.
///
/// The shim layer consumes these handles read-only; recording and export
/// stay with the SDK. Handles are compared by identity, so they must be held
/// behind an `Arc`.
pub trait SdkSpan: Send + Sync {
    fn span_context(&self) -> SpanContext;
}

/// The narrow view of the underlying tracing SDK itself.
pub trait SdkTracer: Send + Sync {
    fn start_span(&self, name: &str, parent: Option<&SpanContext>) -> Arc<dyn SdkSpan>;
}

/// Identity of a handle: the address of its reference-counted allocation.
/// Stable for as long as any clone of the `Arc` is alive.
pub(crate) fn handle_key(span: &Arc<dyn SdkSpan>) -> usize {
    Arc::as_ptr(span) as *const () as usize
}

/// A tracer for when no SDK is wired up. Its spans carry the invalid
/// sentinel context, so propagators write nothing for them.
#[derive(Default, Debug)]
pub struct NoopTracer;

impl SdkTracer for NoopTracer {
    fn start_span(&self, _name: &str, _parent: Option<&SpanContext>) -> Arc<dyn SdkSpan> {
        Arc::new(NoopSpan)
    }
}

#[derive(Default, Debug)]
pub struct NoopSpan;

impl SdkSpan for NoopSpan {
    fn span_context(&self) -> SpanContext {
        SpanContext::invalid()
    }
}
