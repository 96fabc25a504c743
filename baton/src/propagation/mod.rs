//! Codecs between a [`Context`] and a textual key/value carrier.
//!
//! A propagator reads values out of a context and writes them as carrier
//! keys on the way out, and parses carrier keys back into context values on
//! the way in. Independent wire formats are composed with
//! [`ChainedPropagator`] so unrelated subsystems can each contribute their
//! own codec to a single inject/extract pipeline.

mod correlation;
mod trace_context;

pub use correlation::{CorrelationPropagator, BAGGAGE_HEADER};
pub use trace_context::{TraceContextPropagator, TRACEPARENT_HEADER, TRACESTATE_HEADER};

use std::collections::HashMap;

use crate::context::Context;

/// Writes key/value pairs into a carrier.
pub trait Injector {
    fn set(&mut self, key: &str, value: String);
}

/// Reads key/value pairs from a carrier.
///
/// `get` matches keys case-insensitively; transport headers do not have a
/// canonical case. `keys` exists for codecs and adapters that must walk the
/// whole carrier without knowing its key set up front.
pub trait Extractor {
    fn get(&self, key: &str) -> Option<&str>;
    fn keys(&self) -> Vec<&str>;
}

impl Injector for HashMap<String, String> {
    fn set(&mut self, key: &str, value: String) {
        self.insert(key.to_owned(), value);
    }
}

impl Extractor for HashMap<String, String> {
    fn get(&self, key: &str) -> Option<&str> {
        self.iter()
            .find(|(stored, _)| stored.eq_ignore_ascii_case(key))
            .map(|(_, value)| value.as_str())
    }

    fn keys(&self) -> Vec<&str> {
        self.keys().map(String::as_str).collect()
    }
}

/// A bidirectional codec between [`Context`] and a carrier.
///
/// Both operations are pure with respect to the propagator: implementations
/// hold no mutable state and may be invoked concurrently on different
/// context/carrier pairs.
///
/// `inject_context` must write nothing when the value it propagates is
/// absent from the context or is the invalid sentinel. `extract_with_context`
/// must return the input context unchanged when the carrier is malformed for
/// this codec's format; extraction never fails the caller.
pub trait TextMapPropagator: Send + Sync {
    fn inject_context(&self, cx: &Context, injector: &mut dyn Injector);

    fn extract_with_context(&self, cx: &Context, extractor: &dyn Extractor) -> Context;

    /// Injects from the context current on this execution flow.
    fn inject(&self, injector: &mut dyn Injector) {
        self.inject_context(&Context::current(), injector);
    }

    /// Extracts on top of the context current on this execution flow.
    fn extract(&self, extractor: &dyn Extractor) -> Context {
        self.extract_with_context(&Context::current(), extractor)
    }
}

/// Composes two propagators into one.
///
/// Injection runs the first propagator and then the second against the same
/// carrier and the same input context; when both write the same carrier key,
/// the second's value lands last and wins. Extraction threads the first
/// propagator's output context into the second, so later stages observe
/// values extracted by earlier ones.
///
/// A chain is itself a propagator, so chains nest: propagators added
/// incrementally by unrelated subsystems compose left-to-right.
pub struct ChainedPropagator {
    first: Box<dyn TextMapPropagator>,
    second: Box<dyn TextMapPropagator>,
}

impl ChainedPropagator {
    pub fn new(
        first: impl TextMapPropagator + 'static,
        second: impl TextMapPropagator + 'static,
    ) -> ChainedPropagator {
        ChainedPropagator {
            first: Box::new(first),
            second: Box::new(second),
        }
    }
}

impl TextMapPropagator for ChainedPropagator {
    fn inject_context(&self, cx: &Context, injector: &mut dyn Injector) {
        self.first.inject_context(cx, injector);
        self.second.inject_context(cx, injector);
    }

    fn extract_with_context(&self, cx: &Context, extractor: &dyn Extractor) -> Context {
        let cx = self.first.extract_with_context(cx, extractor);
        self.second.extract_with_context(&cx, extractor)
    }
}

/// A propagator that writes and reads nothing.
#[derive(Default, Debug)]
pub struct NoopPropagator;

impl TextMapPropagator for NoopPropagator {
    fn inject_context(&self, _cx: &Context, _injector: &mut dyn Injector) {}

    fn extract_with_context(&self, cx: &Context, _extractor: &dyn Extractor) -> Context {
        cx.clone()
    }
}
