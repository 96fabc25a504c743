use tracing::debug;

use super::{Extractor, Injector, TextMapPropagator};
use crate::context::Context;
use crate::trace::{is_lower_hex, SpanContext, SpanId, TraceFlags, TraceId, TraceState};

pub const TRACEPARENT_HEADER: &str = "traceparent";
pub const TRACESTATE_HEADER: &str = "tracestate";

/// The W3C trace-context codec: `traceparent` carries the trace id, span id,
/// and flags; `tracestate` rides along opaquely.
///
/// Injection writes nothing for an absent or invalid span context.
/// Extraction accepts only a well-formed `traceparent` and otherwise leaves
/// the input context untouched.
pub struct TraceContextPropagator;

impl TraceContextPropagator {
    #[allow(clippy::new_without_default)]
    pub fn new() -> TraceContextPropagator {
        TraceContextPropagator
    }
}

impl TextMapPropagator for TraceContextPropagator {
    fn inject_context(&self, cx: &Context, injector: &mut dyn Injector) {
        let span_context = match cx.span_context() {
            Some(span_context) if span_context.is_valid() => span_context,
            _ => return,
        };

        injector.set(
            TRACEPARENT_HEADER,
            format!(
                "00-{}-{}-{}",
                span_context.trace_id(),
                span_context.span_id(),
                span_context.trace_flags()
            ),
        );

        if !span_context.trace_state().is_empty() {
            injector.set(
                TRACESTATE_HEADER,
                span_context.trace_state().as_header().to_owned(),
            );
        }
    }

    fn extract_with_context(&self, cx: &Context, extractor: &dyn Extractor) -> Context {
        let header = match extractor.get(TRACEPARENT_HEADER) {
            Some(header) => header,
            None => return cx.clone(),
        };

        let (trace_id, span_id, trace_flags) = match parse_traceparent(header.trim()) {
            Some(parts) => parts,
            None => {
                debug!("discarding malformed {TRACEPARENT_HEADER} header");
                return cx.clone();
            }
        };

        let trace_state = extractor
            .get(TRACESTATE_HEADER)
            .filter(|header| !header.is_empty())
            .map(TraceState::from_header)
            .unwrap_or_default();

        cx.with_span_context(SpanContext::new(trace_id, span_id, trace_flags, trace_state))
    }
}

fn parse_traceparent(header: &str) -> Option<(TraceId, SpanId, TraceFlags)> {
    let mut parts = header.split('-');

    let version = parts.next()?;
    if version.len() != 2 || !is_lower_hex(version) || version == "ff" {
        return None;
    }

    let trace_id = TraceId::from_hex(parts.next()?)?;
    let span_id = SpanId::from_hex(parts.next()?)?;

    let flags = parts.next()?;
    if flags.len() != 2 || !is_lower_hex(flags) {
        return None;
    }
    let trace_flags = TraceFlags::new(u8::from_str_radix(flags, 16).ok()?);

    // version 00 has exactly four fields; later versions may append more
    if version == "00" && parts.next().is_some() {
        return None;
    }

    if !trace_id.is_valid() || !span_id.is_valid() {
        return None;
    }

    Some((trace_id, span_id, trace_flags))
}
