//! Cross-process context propagation for tracing instrumentation.
//!
//! This crate holds the pieces that move ambient trace state between
//! processes and between regions of one process: an immutable [`Context`]
//! with an execution-flow-scoped notion of "current", RAII scoping via
//! [`ContextGuard`], and the [`propagation`] codecs that read and write
//! textual key/value carriers such as HTTP headers.
//!
//! Nothing here records, samples, or exports spans. The underlying tracing
//! SDK owns those; this crate only ferries its identifiers (and any
//! correlation entries riding along) across boundaries.

mod context;
mod correlation;
mod trace;

pub mod propagation;

pub use context::{Context, ContextGuard};
pub use correlation::{CorrelationContext, CorrelationContextBuilder, Entry, EntryMetadata};
pub use trace::{SpanContext, SpanId, TraceFlags, TraceId, TraceState};
