//! An identity-preserving tracer shim over the `baton` propagation core.
//!
//! Two tracing APIs can share one notion of "current trace context" as long
//! as every underlying span handle is presented through exactly one wrapper
//! object. This crate keeps that guarantee with a weak identity cache, and
//! wires span activation, baggage, and carrier inject/extract through
//! `baton`'s contexts and propagators.
//!
//! The underlying SDK is consumed through the narrow [`SdkTracer`] /
//! [`SdkSpan`] traits; recording, sampling, and export never pass through
//! here.

mod cache;
mod propagation;
mod sdk;
mod span;

pub use cache::ShimCache;
pub use sdk::{NoopSpan, NoopTracer, SdkSpan, SdkTracer};
pub use span::{SpanContextShim, SpanShim};

use std::sync::Arc;

use baton::propagation::{
    ChainedPropagator, CorrelationPropagator, Extractor, Injector, TextMapPropagator,
    TraceContextPropagator,
};
use baton::{Context, ContextGuard, CorrelationContext};

use propagation::Propagation;
use sdk::handle_key;

/// The span handle held by the current context while a shim span is active.
struct ActiveSpan(Arc<dyn SdkSpan>);

pub struct ShimTracerBuilder {
    tracer: Arc<dyn SdkTracer>,
    propagator: Option<Box<dyn TextMapPropagator>>,
    url_encoding: bool,
}

impl ShimTracerBuilder {
    /// Sets the underlying SDK. Without one, spans come from [`NoopTracer`]
    /// and carry the invalid sentinel context.
    pub fn with_tracer(mut self, tracer: Arc<dyn SdkTracer>) -> ShimTracerBuilder {
        self.tracer = tracer;
        self
    }

    /// Replaces the configured propagator pipeline. Defaults to the W3C
    /// trace-context codec chained with the correlation codec.
    pub fn with_propagator(
        mut self,
        propagator: impl TextMapPropagator + 'static,
    ) -> ShimTracerBuilder {
        self.propagator = Some(Box::new(propagator));
        self
    }

    /// Enables percent-encoding of carrier values on inject, and decoding on
    /// extract. Off by default.
    pub fn with_url_encoding(mut self, url_encoding: bool) -> ShimTracerBuilder {
        self.url_encoding = url_encoding;
        self
    }

    pub fn build(self) -> ShimTracer {
        let propagator = self.propagator.unwrap_or_else(|| {
            Box::new(ChainedPropagator::new(
                TraceContextPropagator::new(),
                CorrelationPropagator::new(),
            ))
        });

        ShimTracer {
            tracer: self.tracer,
            propagator,
            spans: ShimCache::new(),
            propagation: Propagation::new(self.url_encoding),
        }
    }
}

/// Presents spans from the underlying SDK through identity-preserving
/// wrappers, and moves the current context in and out of carriers.
///
/// One `ShimTracer` owns one wrapper cache; wrappers obtained through it are
/// canonical for their handles, so callers may compare them by identity.
pub struct ShimTracer {
    tracer: Arc<dyn SdkTracer>,
    propagator: Box<dyn TextMapPropagator>,
    spans: ShimCache<SpanShim>,
    propagation: Propagation,
}

impl ShimTracer {
    pub fn builder() -> ShimTracerBuilder {
        ShimTracerBuilder {
            tracer: Arc::new(NoopTracer),
            propagator: None,
            url_encoding: false,
        }
    }

    /// Starts an SDK span parented to the current one and returns its
    /// wrapper. The wrapper inherits the correlation entries current on this
    /// flow, so baggage keeps flowing to child spans.
    pub fn start_span(&self, name: &str) -> Arc<SpanShim> {
        let current = Context::current();
        let parent = current
            .span_context()
            .filter(|span_context| span_context.is_valid());

        let span = self.tracer.start_span(name, parent);
        let correlation = current.correlation_context().cloned().unwrap_or_default();

        self.spans.get_or_create(handle_key(&span), || {
            Arc::new(SpanShim::new(span.clone(), correlation))
        })
    }

    /// Returns the canonical wrapper for `span`, creating one on first
    /// access.
    pub fn span_shim(&self, span: &Arc<dyn SdkSpan>) -> Arc<SpanShim> {
        self.spans.get_or_create(handle_key(span), || {
            Arc::new(SpanShim::new(span.clone(), CorrelationContext::new()))
        })
    }

    /// Registers an externally constructed wrapper as the canonical one for
    /// its handle, replacing any existing registration.
    pub fn associate_span_shim(&self, shim: &Arc<SpanShim>) {
        self.spans.associate(handle_key(shim.span()), shim);
    }

    /// Makes the shim's span current on this flow until the guard drops.
    /// The attached context carries the handle, its span context, and its
    /// correlation entries as of this call.
    pub fn activate(&self, shim: &Arc<SpanShim>) -> ContextGuard {
        let context_shim = shim.context_shim();

        Context::current()
            .with_value(ActiveSpan(shim.span().clone()))
            .with_span_context(context_shim.span_context().clone())
            .with_correlation_context(context_shim.correlation_context().clone())
            .attach()
    }

    /// The wrapper for the span most recently activated on this flow, if
    /// any.
    pub fn current_span(&self) -> Option<Arc<SpanShim>> {
        let current = Context::current();
        let span = &current.value::<ActiveSpan>()?.0;

        Some(self.span_shim(span))
    }

    /// Writes the context current on this flow into an outbound carrier.
    pub fn inject(&self, carrier: &mut dyn Injector) {
        self.propagation
            .inject_current(self.propagator.as_ref(), carrier);
    }

    /// Writes an explicit extracted or created context into an outbound
    /// carrier.
    pub fn inject_context(&self, context_shim: &SpanContextShim, carrier: &mut dyn Injector) {
        self.propagation
            .inject_text_map(self.propagator.as_ref(), context_shim, carrier);
    }

    /// Reads an inbound carrier through the configured propagators. Returns
    /// `None` when no valid span context was found; a malformed carrier is
    /// indistinguishable from an empty one.
    pub fn extract(&self, carrier: &dyn Extractor) -> Option<SpanContextShim> {
        self.propagation
            .extract_text_map(self.propagator.as_ref(), carrier)
    }

    /// Makes an extracted context current on this flow until the guard
    /// drops, so spans started under it join the inbound trace and its
    /// baggage is re-injected on outbound calls.
    pub fn attach_extracted(&self, context_shim: &SpanContextShim) -> ContextGuard {
        Context::current()
            .with_span_context(context_shim.span_context().clone())
            .with_correlation_context(context_shim.correlation_context().clone())
            .attach()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use baton::propagation::{BAGGAGE_HEADER, TRACEPARENT_HEADER};

    use super::*;
    use crate::sdk::testing::TestTracer;

    fn tracer() -> ShimTracer {
        ShimTracer::builder().with_tracer(Arc::new(TestTracer)).build()
    }

    #[test]
    fn span_shims_are_canonical_per_handle() {
        let tracer = tracer();
        let span = crate::sdk::testing::span();

        let first = tracer.span_shim(&span);
        let second = tracer.span_shim(&span);

        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn associated_shims_become_canonical() {
        let tracer = tracer();
        let span = crate::sdk::testing::span();

        let original = tracer.span_shim(&span);
        let replacement = Arc::new(SpanShim::new(span.clone(), CorrelationContext::new()));
        tracer.associate_span_shim(&replacement);

        let found = tracer.span_shim(&span);
        assert!(Arc::ptr_eq(&found, &replacement));
        assert!(!Arc::ptr_eq(&found, &original));
    }

    #[test]
    fn current_span_round_trips_through_activation() {
        let tracer = tracer();
        let shim = tracer.start_span("handling");

        assert!(tracer.current_span().is_none());

        {
            let _guard = tracer.activate(&shim);

            let current = tracer.current_span().unwrap();
            assert!(Arc::ptr_eq(&current, &shim));
        }

        assert!(tracer.current_span().is_none());
    }

    #[test]
    fn started_spans_join_the_active_trace() {
        let tracer = tracer();
        let parent = tracer.start_span("inbound");

        let _guard = tracer.activate(&parent);
        let child = tracer.start_span("outbound");

        let parent_context = parent.context_shim();
        let child_context = child.context_shim();
        assert_eq!(
            child_context.span_context().trace_id(),
            parent_context.span_context().trace_id()
        );
        assert_ne!(
            child_context.span_context().span_id(),
            parent_context.span_context().span_id()
        );
    }

    #[test]
    fn inject_extract_round_trip() {
        let tracer = tracer();
        let span = tracer.start_span("outbound");
        span.set_baggage_item("tenant", "acme");

        let mut carrier = HashMap::new();
        {
            let _guard = tracer.activate(&span);
            tracer.inject(&mut carrier);
        }

        assert!(carrier.contains_key(TRACEPARENT_HEADER));
        assert_eq!(carrier[BAGGAGE_HEADER], "tenant=acme");

        let extracted = tracer.extract(&carrier).unwrap();
        assert_eq!(extracted.span_context(), span.context_shim().span_context());
        assert_eq!(extracted.baggage_item("tenant"), Some("acme"));
    }

    #[test]
    fn attached_extracted_contexts_flow_back_out() {
        let tracer = tracer();

        let inbound = HashMap::from([(
            TRACEPARENT_HEADER.to_owned(),
            "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01".to_owned(),
        )]);
        let extracted = tracer.extract(&inbound).unwrap();

        let _guard = tracer.attach_extracted(&extracted);

        // a child started here continues the inbound trace
        let child = tracer.start_span("work");
        assert_eq!(
            child.context_shim().span_context().trace_id().to_string(),
            "4bf92f3577b34da6a3ce929d0e0e4736"
        );

        // and outbound injection reproduces the inbound identifiers
        let mut outbound = HashMap::new();
        tracer.inject(&mut outbound);
        assert_eq!(outbound[TRACEPARENT_HEADER], inbound[TRACEPARENT_HEADER]);
    }

    #[test]
    fn extracting_an_empty_carrier_finds_nothing() {
        let tracer = tracer();

        assert!(tracer.extract(&HashMap::new()).is_none());
    }

    #[test]
    fn noop_spans_inject_nothing() {
        let tracer = ShimTracer::builder().build();
        let span = tracer.start_span("ignored");

        let mut carrier = HashMap::new();
        let _guard = tracer.activate(&span);
        tracer.inject(&mut carrier);

        assert!(carrier.is_empty());
    }

    #[test]
    fn url_encoding_is_a_builder_knob() {
        let tracer = ShimTracer::builder()
            .with_tracer(Arc::new(TestTracer))
            .with_url_encoding(true)
            .build();

        let span = tracer.start_span("outbound");
        span.set_baggage_item("note", "contains spaces");

        let mut carrier = HashMap::new();
        {
            let _guard = tracer.activate(&span);
            tracer.inject(&mut carrier);
        }
        assert_eq!(carrier[BAGGAGE_HEADER], "note%3Dcontains%20spaces");

        let extracted = tracer.extract(&carrier).unwrap();
        assert_eq!(extracted.baggage_item("note"), Some("contains spaces"));
    }
}
