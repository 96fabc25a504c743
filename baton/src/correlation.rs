use std::collections::BTreeMap;

/// How far an entry may travel when its correlation context is injected into
/// an outbound carrier.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum EntryMetadata {
    /// The entry is written on every hop.
    UnlimitedPropagation,
    /// The entry stays in-process and is never written to a carrier.
    NoPropagation,
}

/// The value and propagation scope of one correlation label.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Entry {
    value: String,
    metadata: EntryMetadata,
}

impl Entry {
    pub fn new(value: impl Into<String>, metadata: EntryMetadata) -> Entry {
        Entry {
            value: value.into(),
            metadata,
        }
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub fn metadata(&self) -> EntryMetadata {
        self.metadata
    }
}

/// An immutable set of correlation entries keyed by label name.
///
/// Like [`Context`](crate::Context), a correlation context is never mutated;
/// `with_entry` returns a descendant holding the additional entry. Writing a
/// key that already exists replaces it.
#[derive(Clone, PartialEq, Eq, Default, Debug)]
pub struct CorrelationContext {
    entries: BTreeMap<String, Entry>,
}

impl CorrelationContext {
    /// Creates a correlation context with no entries.
    pub fn new() -> CorrelationContext {
        CorrelationContext::default()
    }

    pub fn builder() -> CorrelationContextBuilder {
        CorrelationContextBuilder {
            entries: BTreeMap::new(),
        }
    }

    /// Returns a descendant context that additionally holds the entry,
    /// replacing any previous entry under the same key.
    pub fn with_entry(
        &self,
        key: impl Into<String>,
        value: impl Into<String>,
        metadata: EntryMetadata,
    ) -> CorrelationContext {
        let mut entries = self.entries.clone();
        entries.insert(key.into(), Entry::new(value, metadata));

        CorrelationContext { entries }
    }

    pub fn get(&self, key: &str) -> Option<&Entry> {
        self.entries.get(key)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &Entry)> {
        self.entries.iter().map(|(key, entry)| (key.as_str(), entry))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Assembles a [`CorrelationContext`], optionally on top of a parent's
/// entries. Entries added later win, including over the parent's.
pub struct CorrelationContextBuilder {
    entries: BTreeMap<String, Entry>,
}

impl CorrelationContextBuilder {
    pub fn with_parent(mut self, parent: &CorrelationContext) -> CorrelationContextBuilder {
        for (key, entry) in parent.entries() {
            self.entries.insert(key.to_owned(), entry.clone());
        }
        self
    }

    pub fn insert(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
        metadata: EntryMetadata,
    ) -> CorrelationContextBuilder {
        self.entries.insert(key.into(), Entry::new(value, metadata));
        self
    }

    pub fn build(self) -> CorrelationContext {
        CorrelationContext {
            entries: self.entries,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_entry_leaves_original_unmodified() {
        let base = CorrelationContext::new();
        let derived = base.with_entry("tenant", "acme", EntryMetadata::UnlimitedPropagation);

        assert!(base.is_empty());
        assert_eq!(derived.get("tenant").map(Entry::value), Some("acme"));
    }

    #[test]
    fn duplicate_keys_last_write_wins() {
        let context = CorrelationContext::new()
            .with_entry("tenant", "acme", EntryMetadata::UnlimitedPropagation)
            .with_entry("tenant", "umbrella", EntryMetadata::NoPropagation);

        assert_eq!(context.len(), 1);

        let entry = context.get("tenant").unwrap();
        assert_eq!(entry.value(), "umbrella");
        assert_eq!(entry.metadata(), EntryMetadata::NoPropagation);
    }

    #[test]
    fn builder_entries_override_parent() {
        let parent = CorrelationContext::new()
            .with_entry("tenant", "acme", EntryMetadata::UnlimitedPropagation)
            .with_entry("region", "eu-1", EntryMetadata::UnlimitedPropagation);

        let context = CorrelationContext::builder()
            .with_parent(&parent)
            .insert("tenant", "umbrella", EntryMetadata::UnlimitedPropagation)
            .build();

        assert_eq!(context.get("tenant").map(Entry::value), Some("umbrella"));
        assert_eq!(context.get("region").map(Entry::value), Some("eu-1"));
    }
}
