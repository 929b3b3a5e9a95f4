//! Free-form metadata attached to types and fields
//!
//! Each key maps to an ordered list of values. Importers use it to carry
//! source locations, doc strings and C++ qualifiers alongside the layout.

use std::collections::BTreeMap;

/// Ordered multi-value map
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetaData {
    entries: BTreeMap<String, Vec<String>>,
}

impl MetaData {
    /// Create empty metadata
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a value to `key`
    pub fn add(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.entry(key.into()).or_default().push(value.into());
    }

    /// Replace every value of `key`
    pub fn set<I, S>(&mut self, key: impl Into<String>, values: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.entries
            .insert(key.into(), values.into_iter().map(Into::into).collect());
    }

    /// All values of `key`, in insertion order
    pub fn get(&self, key: &str) -> &[String] {
        self.entries.get(key).map(Vec::as_slice).unwrap_or(&[])
    }

    /// First value of `key`
    pub fn first(&self, key: &str) -> Option<&str> {
        self.get(key).first().map(String::as_str)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    /// Remove `key` and return its values
    pub fn remove(&mut self, key: &str) -> Vec<String> {
        self.entries.remove(key).unwrap_or_default()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Merge `other` into self, appending values key by key
    pub fn merge(&mut self, other: &MetaData) {
        for (key, values) in &other.entries {
            self.entries
                .entry(key.clone())
                .or_default()
                .extend(values.iter().cloned());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multi_value_order() {
        let mut meta = MetaData::new();
        meta.add("doc", "first");
        meta.add("doc", "second");
        meta.add("source_file_line", "test.h:10");

        assert_eq!(meta.get("doc"), ["first", "second"]);
        assert_eq!(meta.first("doc"), Some("first"));
        assert_eq!(meta.keys().collect::<Vec<_>>(), ["doc", "source_file_line"]);
        assert!(meta.get("missing").is_empty());
    }

    #[test]
    fn test_set_and_remove() {
        let mut meta = MetaData::new();
        meta.add("k", "a");
        meta.set("k", ["b", "c"]);
        assert_eq!(meta.get("k"), ["b", "c"]);
        assert_eq!(meta.remove("k"), ["b", "c"]);
        assert!(meta.is_empty());
    }

    #[test]
    fn test_merge() {
        let mut a = MetaData::new();
        a.add("k", "1");
        let mut b = MetaData::new();
        b.add("k", "2");
        b.add("j", "3");
        a.merge(&b);
        assert_eq!(a.get("k"), ["1", "2"]);
        assert_eq!(a.get("j"), ["3"]);
    }
}
