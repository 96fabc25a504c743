use tracing::debug;

use super::{Extractor, Injector, TextMapPropagator};
use crate::context::Context;
use crate::correlation::EntryMetadata;

pub const BAGGAGE_HEADER: &str = "baggage";

/// The correlation-context codec: a single `baggage` header of comma-joined
/// `key=value` pairs.
///
/// Only entries marked [`EntryMetadata::UnlimitedPropagation`] are written;
/// entry metadata itself is not transmitted, and extracted entries default
/// to unlimited propagation. A pair without `=` marks the whole header
/// malformed and extraction leaves the input context untouched.
pub struct CorrelationPropagator;

impl CorrelationPropagator {
    #[allow(clippy::new_without_default)]
    pub fn new() -> CorrelationPropagator {
        CorrelationPropagator
    }
}

impl TextMapPropagator for CorrelationPropagator {
    fn inject_context(&self, cx: &Context, injector: &mut dyn Injector) {
        let correlation = match cx.correlation_context() {
            Some(correlation) if !correlation.is_empty() => correlation,
            _ => return,
        };

        let header = correlation
            .entries()
            .filter(|(_, entry)| entry.metadata() == EntryMetadata::UnlimitedPropagation)
            .map(|(key, entry)| format!("{key}={}", entry.value()))
            .collect::<Vec<_>>()
            .join(",");

        if !header.is_empty() {
            injector.set(BAGGAGE_HEADER, header);
        }
    }

    fn extract_with_context(&self, cx: &Context, extractor: &dyn Extractor) -> Context {
        let header = match extractor.get(BAGGAGE_HEADER) {
            Some(header) => header,
            None => return cx.clone(),
        };

        let mut pairs = Vec::new();
        for pair in header.split(',') {
            let pair = pair.trim();
            if pair.is_empty() {
                continue;
            }

            match pair.split_once('=') {
                Some((key, value)) if !key.trim().is_empty() => {
                    pairs.push((key.trim().to_owned(), value.trim().to_owned()));
                }
                _ => {
                    debug!("discarding malformed {BAGGAGE_HEADER} header");
                    return cx.clone();
                }
            }
        }

        if pairs.is_empty() {
            return cx.clone();
        }

        let mut correlation = cx.correlation_context().cloned().unwrap_or_default();
        for (key, value) in pairs {
            correlation = correlation.with_entry(key, value, EntryMetadata::UnlimitedPropagation);
        }

        cx.with_correlation_context(correlation)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::correlation::{CorrelationContext, Entry};

    fn carrier(value: &str) -> HashMap<String, String> {
        HashMap::from([(BAGGAGE_HEADER.to_owned(), value.to_owned())])
    }

    #[test]
    fn round_trip() {
        let correlation = CorrelationContext::new()
            .with_entry("tenant", "acme", EntryMetadata::UnlimitedPropagation)
            .with_entry("region", "eu-1", EntryMetadata::UnlimitedPropagation);
        let cx = Context::new().with_correlation_context(correlation.clone());

        let mut outbound = HashMap::new();
        CorrelationPropagator.inject_context(&cx, &mut outbound);

        let extracted = CorrelationPropagator.extract_with_context(&Context::new(), &outbound);
        assert_eq!(extracted.correlation_context(), Some(&correlation));
    }

    #[test]
    fn no_propagation_entries_are_held_back() {
        let correlation = CorrelationContext::new()
            .with_entry("tenant", "acme", EntryMetadata::UnlimitedPropagation)
            .with_entry("secret", "hunter2", EntryMetadata::NoPropagation);
        let cx = Context::new().with_correlation_context(correlation);

        let mut outbound = HashMap::new();
        CorrelationPropagator.inject_context(&cx, &mut outbound);

        assert_eq!(outbound[BAGGAGE_HEADER], "tenant=acme");
    }

    #[test]
    fn nothing_written_when_empty_or_fully_held_back() {
        let mut outbound = HashMap::new();
        CorrelationPropagator.inject_context(&Context::new(), &mut outbound);
        assert!(outbound.is_empty());

        let correlation =
            CorrelationContext::new().with_entry("secret", "hunter2", EntryMetadata::NoPropagation);
        let cx = Context::new().with_correlation_context(correlation);
        CorrelationPropagator.inject_context(&cx, &mut outbound);
        assert!(outbound.is_empty());
    }

    #[test]
    fn malformed_header_leaves_context_unchanged() {
        for header in ["tenant", "tenant=acme,orphan", "=acme"] {
            let cx = CorrelationPropagator.extract_with_context(&Context::new(), &carrier(header));
            assert!(cx.correlation_context().is_none(), "accepted {header:?}");
        }
    }

    #[test]
    fn benign_slop_is_tolerated() {
        let cx = CorrelationPropagator
            .extract_with_context(&Context::new(), &carrier(" tenant = acme , ,"));

        let correlation = cx.correlation_context().unwrap();
        assert_eq!(correlation.get("tenant").map(Entry::value), Some("acme"));
        assert_eq!(correlation.len(), 1);
    }

    #[test]
    fn extraction_merges_onto_existing_entries() {
        let existing = CorrelationContext::new()
            .with_entry("region", "eu-1", EntryMetadata::UnlimitedPropagation)
            .with_entry("tenant", "stale", EntryMetadata::UnlimitedPropagation);
        let base = Context::new().with_correlation_context(existing);

        let cx = CorrelationPropagator.extract_with_context(&base, &carrier("tenant=acme"));

        let correlation = cx.correlation_context().unwrap();
        assert_eq!(correlation.get("tenant").map(Entry::value), Some("acme"));
        assert_eq!(correlation.get("region").map(Entry::value), Some("eu-1"));
    }
}
