use std::collections::{BTreeMap, BTreeSet};

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

use super::controller::{FormError, FormResult};
use super::value::FieldKey;

/// Keyed container whose key set is fixed when it is created. Writes replace single
/// entries or, for reset, the whole map; entries are never added or removed.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldStore<V> {
    entries: BTreeMap<FieldKey, V>,
    revision: u64,
}

pub type ErrorStore = FieldStore<String>;

impl<V> FieldStore<V> {
    pub fn new(entries: BTreeMap<FieldKey, V>) -> Self {
        Self {
            entries,
            revision: 0,
        }
    }

    pub fn get(&self, key: &str) -> Option<&V> {
        self.entries.get(key)
    }

    pub fn set(&mut self, key: &str, value: V) -> FormResult<()> {
        let Some(slot) = self.entries.get_mut(key) else {
            return Err(FormError::UnknownField(FieldKey::new(key)));
        };
        *slot = value;
        self.revision = self.revision.wrapping_add(1);
        Ok(())
    }

    pub fn replace_all(&mut self, entries: BTreeMap<FieldKey, V>) -> FormResult<()> {
        if !self.entries.keys().eq(entries.keys()) {
            let expected = self.entries.keys().cloned().collect::<BTreeSet<_>>();
            let found = entries.keys().cloned().collect::<BTreeSet<_>>();
            return Err(FormError::KeySetMismatch {
                missing: expected.difference(&found).cloned().collect(),
                unexpected: found.difference(&expected).cloned().collect(),
            });
        }
        self.entries = entries;
        self.revision = self.revision.wrapping_add(1);
        Ok(())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&FieldKey, &V)> {
        self.entries.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &FieldKey> {
        self.entries.keys()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Bumped on every successful write.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn to_map(&self) -> BTreeMap<FieldKey, V>
    where
        V: Clone,
    {
        self.entries.clone()
    }
}

impl ErrorStore {
    pub fn has_errors(&self) -> bool {
        self.entries.values().any(|message| !message.is_empty())
    }

    pub fn first_error(&self) -> Option<&FieldKey> {
        self.entries
            .iter()
            .find_map(|(key, message)| (!message.is_empty()).then_some(key))
    }
}

/// Read-only view of every field's current message; `""` means no error.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FormErrors(pub(super) BTreeMap<FieldKey, String>);

impl FormErrors {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&FieldKey, &str)> {
        self.0.iter().map(|(key, message)| (key, message.as_str()))
    }

    pub fn has_errors(&self) -> bool {
        self.0.values().any(|message| !message.is_empty())
    }

    pub fn failing_count(&self) -> usize {
        self.0.values().filter(|message| !message.is_empty()).count()
    }

    pub fn first_error(&self) -> Option<&FieldKey> {
        self.0
            .iter()
            .find_map(|(key, message)| (!message.is_empty()).then_some(key))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for FormErrors {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (key, message) in &self.0 {
            map.serialize_entry(key, message)?;
        }
        map.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> FieldStore<u32> {
        FieldStore::new(
            [("a", 1), ("b", 2)]
                .into_iter()
                .map(|(key, value)| (FieldKey::new(key), value))
                .collect(),
        )
    }

    #[test]
    fn set_replaces_one_entry_only() {
        let mut store = store();
        store.set("a", 10).expect("set known key");
        assert_eq!(store.get("a"), Some(&10));
        assert_eq!(store.get("b"), Some(&2));
        assert_eq!(store.revision(), 1);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let mut store = store();
        assert_eq!(
            store.set("c", 3),
            Err(FormError::UnknownField(FieldKey::new("c")))
        );
        assert_eq!(store.len(), 2);
        assert_eq!(store.revision(), 0);
    }

    #[test]
    fn replace_all_requires_same_key_set() {
        let mut store = store();
        let error = store
            .replace_all([(FieldKey::new("a"), 5)].into_iter().collect())
            .expect_err("missing key");
        assert_eq!(
            error,
            FormError::KeySetMismatch {
                missing: vec![FieldKey::new("b")],
                unexpected: Vec::new(),
            }
        );

        store
            .replace_all(
                [(FieldKey::new("a"), 5), (FieldKey::new("b"), 6)]
                    .into_iter()
                    .collect(),
            )
            .expect("same key set");
        assert_eq!(store.get("b"), Some(&6));
    }

    #[test]
    fn error_store_reports_first_failing_key() {
        let mut errors = ErrorStore::new(
            ["email", "name"]
                .into_iter()
                .map(|key| (FieldKey::new(key), String::new()))
                .collect(),
        );
        assert!(!errors.has_errors());
        errors.set("name", "Name is required".into()).expect("set error");
        assert!(errors.has_errors());
        assert_eq!(errors.first_error().map(FieldKey::as_str), Some("name"));
    }
}
