use std::collections::HashMap;

use baton::propagation::{Extractor, Injector, TextMapPropagator};
use baton::Context;
use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use tracing::debug;

use crate::span::SpanContextShim;

// RFC 3986 unreserved characters pass through untouched
const CARRIER_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Carrier-level encoding policy plus the inject/extract plumbing shared by
/// the tracer facade.
///
/// When url-encoding is enabled, values are percent-encoded on the way into
/// a carrier and decoded on the way out, transparently to the propagators.
/// A value that fails to decode is used raw; encoding trouble never
/// surfaces to the caller.
pub(crate) struct Propagation {
    url_encoding: bool,
}

impl Propagation {
    pub(crate) fn new(url_encoding: bool) -> Propagation {
        Propagation { url_encoding }
    }

    /// Injects an explicit extracted or created context into `carrier`.
    pub(crate) fn inject_text_map(
        &self,
        propagator: &dyn TextMapPropagator,
        context_shim: &SpanContextShim,
        carrier: &mut dyn Injector,
    ) {
        let cx = Context::current()
            .with_span_context(context_shim.span_context().clone())
            .with_correlation_context(context_shim.correlation_context().clone());

        let mut carrier = EncodingInjector {
            inner: carrier,
            url_encoding: self.url_encoding,
        };
        propagator.inject_context(&cx, &mut carrier);
    }

    /// Injects whatever is current on this execution flow into `carrier`.
    pub(crate) fn inject_current(
        &self,
        propagator: &dyn TextMapPropagator,
        carrier: &mut dyn Injector,
    ) {
        let mut carrier = EncodingInjector {
            inner: carrier,
            url_encoding: self.url_encoding,
        };
        propagator.inject_context(&Context::current(), &mut carrier);
    }

    /// Runs `carrier` through the propagator and packages the result, or
    /// `None` when no valid span context was present.
    pub(crate) fn extract_text_map(
        &self,
        propagator: &dyn TextMapPropagator,
        carrier: &dyn Extractor,
    ) -> Option<SpanContextShim> {
        // snapshot the carrier up front so each value is decoded once,
        // whatever access pattern the propagators have
        let mut snapshot = HashMap::new();
        for key in carrier.keys() {
            if let Some(value) = carrier.get(key) {
                snapshot.insert(key.to_owned(), self.decoded_value(value));
            }
        }

        let cx = propagator.extract_with_context(&Context::current(), &snapshot);

        let span_context = match cx.span_context() {
            Some(span_context) if span_context.is_valid() => span_context.clone(),
            _ => return None,
        };
        let correlation = cx.correlation_context().cloned().unwrap_or_default();

        Some(SpanContextShim::new(span_context, correlation))
    }

    fn decoded_value(&self, value: &str) -> String {
        if !self.url_encoding {
            return value.to_owned();
        }

        match percent_decode_str(value).decode_utf8() {
            Ok(decoded) => decoded.into_owned(),
            Err(_) => {
                debug!("carrier value failed to percent-decode; using it raw");
                value.to_owned()
            }
        }
    }
}

struct EncodingInjector<'a> {
    inner: &'a mut dyn Injector,
    url_encoding: bool,
}

impl Injector for EncodingInjector<'_> {
    fn set(&mut self, key: &str, value: String) {
        let value = if self.url_encoding {
            utf8_percent_encode(&value, CARRIER_ENCODE_SET).to_string()
        } else {
            value
        };

        self.inner.set(key, value);
    }
}
