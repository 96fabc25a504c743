use std::sync::{Arc, Mutex};

use baton::{CorrelationContext, Entry, EntryMetadata, SpanContext};

use crate::sdk::SdkSpan;

/// An SDK span context paired with the correlation entries traveling with
/// it. This is the value handed across the propagation boundary in both
/// directions.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct SpanContextShim {
    span_context: SpanContext,
    correlation: CorrelationContext,
}

impl SpanContextShim {
    pub fn new(span_context: SpanContext, correlation: CorrelationContext) -> SpanContextShim {
        SpanContextShim {
            span_context,
            correlation,
        }
    }

    pub fn span_context(&self) -> &SpanContext {
        &self.span_context
    }

    pub fn correlation_context(&self) -> &CorrelationContext {
        &self.correlation
    }

    /// Returns a copy carrying the additional baggage entry.
    pub fn with_baggage_item(
        &self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> SpanContextShim {
        SpanContextShim {
            span_context: self.span_context.clone(),
            correlation: self
                .correlation
                .with_entry(key, value, EntryMetadata::UnlimitedPropagation),
        }
    }

    pub fn baggage_item(&self, key: &str) -> Option<&str> {
        self.correlation.get(key).map(Entry::value)
    }
}

/// The canonical wrapper for one underlying span handle.
///
/// Span shims are obtained through [`ShimTracer`](crate::ShimTracer), which
/// guarantees at most one live wrapper per handle; comparing wrappers by
/// identity is therefore equivalent to comparing the handles themselves.
pub struct SpanShim {
    span: Arc<dyn SdkSpan>,
    // baggage writes replace this snapshot wholesale; the correlation model
    // owns the entries, the wrapper only holds the latest value
    context: Mutex<SpanContextShim>,
}

impl SpanShim {
    pub fn new(span: Arc<dyn SdkSpan>, correlation: CorrelationContext) -> SpanShim {
        let context = SpanContextShim::new(span.span_context(), correlation);

        SpanShim {
            span,
            context: Mutex::new(context),
        }
    }

    /// The wrapped handle.
    pub fn span(&self) -> &Arc<dyn SdkSpan> {
        &self.span
    }

    /// The current span context plus baggage, as one value.
    pub fn context_shim(&self) -> SpanContextShim {
        self.context.lock().unwrap().clone()
    }

    pub fn set_baggage_item(&self, key: impl Into<String>, value: impl Into<String>) {
        let mut context = self.context.lock().unwrap();
        *context = context.with_baggage_item(key, value);
    }

    pub fn baggage_item(&self, key: &str) -> Option<String> {
        let context = self.context.lock().unwrap();
        context.baggage_item(key).map(str::to_owned)
    }
}
