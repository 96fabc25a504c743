use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::marker::PhantomData;
use std::sync::Arc;

use crate::correlation::CorrelationContext;
use crate::trace::SpanContext;

thread_local! {
    static CURRENT_CONTEXT: RefCell<Context> = RefCell::new(Context::new());
}

/// An immutable bag of values scoped to one logical execution flow.
///
/// A context is never mutated in place; `with_value` and friends return a
/// descendant context and leave the original untouched. Cloning is cheap
/// since the underlying map is shared.
///
/// At most one value per type is held. The active [`SpanContext`] and
/// [`CorrelationContext`] are stored this way and have dedicated accessors.
#[derive(Clone, Default)]
pub struct Context {
    entries: Arc<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>,
}

impl Context {
    /// Creates a context with no values.
    pub fn new() -> Context {
        Context::default()
    }

    /// Returns the context currently attached to this execution flow, or the
    /// empty context if none was ever attached.
    pub fn current() -> Context {
        CURRENT_CONTEXT.with(|current| current.borrow().clone())
    }

    /// Returns the value of type `T`, if one was set.
    pub fn value<T: 'static>(&self) -> Option<&T> {
        self.entries
            .get(&TypeId::of::<T>())
            .and_then(|value| value.downcast_ref())
    }

    /// Returns a descendant context that additionally holds `value`.
    pub fn with_value<T: Send + Sync + 'static>(&self, value: T) -> Context {
        let mut entries = (*self.entries).clone();
        entries.insert(TypeId::of::<T>(), Arc::new(value));

        Context {
            entries: Arc::new(entries),
        }
    }

    /// Returns the active span context, if one was set.
    pub fn span_context(&self) -> Option<&SpanContext> {
        self.value::<SpanContext>()
    }

    /// Returns a descendant context with `span_context` as the active one.
    pub fn with_span_context(&self, span_context: SpanContext) -> Context {
        self.with_value(span_context)
    }

    /// Returns the active correlation context, if one was set.
    pub fn correlation_context(&self) -> Option<&CorrelationContext> {
        self.value::<CorrelationContext>()
    }

    /// Returns a descendant context with `correlation` as the active one.
    pub fn with_correlation_context(&self, correlation: CorrelationContext) -> Context {
        self.with_value(correlation)
    }

    /// Makes this context the current one for this execution flow until the
    /// returned guard is dropped.
    ///
    /// Guards nest with strict stack discipline: each guard remembers the
    /// context that was current immediately before its own attach and
    /// restores exactly that on drop, no matter what nested guards did in
    /// between.
    pub fn attach(self) -> ContextGuard {
        let previous = CURRENT_CONTEXT.with(|current| current.replace(self));

        ContextGuard {
            previous: Some(previous),
            _not_send: PhantomData,
        }
    }
}

impl Debug for Context {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("Context")
            .field("values", &self.entries.len())
            .finish()
    }
}

/// Restores the previously current context when dropped.
///
/// Returned by [`Context::attach`]. The guard runs on every exit path of the
/// attaching block, normal or unwinding, and is pinned to the flow that
/// attached it.
#[derive(Debug)]
#[must_use = "dropping the guard restores the previous context"]
pub struct ContextGuard {
    previous: Option<Context>,
    // attach and restore must happen on the same thread
    _not_send: PhantomData<*const ()>,
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        if let Some(previous) = self.previous.take() {
            CURRENT_CONTEXT.with(|current| *current.borrow_mut() = previous);
        }
    }
}
