//! Keyed-record storage for orders, suppliers, products and audit traces.
//!
//! The store is a collaborator behind a narrow seam: create / get / update /
//! delete / list plus query by a secondary key each record type declares.
//! Writes are serialized per store; `update` performs an optimistic version
//! check against the stored record.

use std::collections::{HashMap, HashSet};
use std::fmt::{Debug, Display};
use std::hash::Hash;
use std::sync::{Arc, RwLock};

use thiserror::Error;

use medchain_core::ExpectedVersion;

pub mod open_orders;
pub mod records;

pub use open_orders::{Claim, OpenOrderIndex, scan_open_order};
pub use records::index;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("{collection} {key} not found")]
    NotFound { collection: &'static str, key: String },

    #[error("conflict on {collection} {key}: {detail}")]
    Conflict {
        collection: &'static str,
        key: String,
        detail: String,
    },

    #[error("{collection} has no index named {index:?}")]
    UnknownIndex {
        collection: &'static str,
        index: String,
    },

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_))
    }
}

/// A value the keyed store can hold.
pub trait Record: Debug + Clone + Send + Sync + 'static {
    type Key: Debug + Clone + Eq + Hash + Display + Send + Sync + 'static;

    /// Collection name used in errors and logs.
    const COLLECTION: &'static str;

    /// Secondary indexes this record type can be queried by.
    const INDEXES: &'static [&'static str];

    fn key(&self) -> Self::Key;

    /// Version used for optimistic concurrency on `update`.
    fn version(&self) -> u64;

    /// Values of `index` for this record (empty when it has none; several for
    /// multi-valued indexes).
    fn index_values(&self, index: &str) -> Vec<String>;
}

pub trait KeyedStore<R: Record>: Send + Sync {
    /// Insert a new record; `Conflict` when the key is taken.
    fn create(&self, record: R) -> Result<(), StoreError>;

    fn get(&self, key: &R::Key) -> Result<Option<R>, StoreError>;

    /// Replace a record if the stored version matches `expected`.
    fn update(&self, record: R, expected: ExpectedVersion) -> Result<(), StoreError>;

    fn delete(&self, key: &R::Key) -> Result<(), StoreError>;

    /// Every record, in insertion order.
    fn list(&self) -> Result<Vec<R>, StoreError>;

    /// Records whose `index` contains `value`, in insertion order.
    fn query(&self, index: &str, value: &str) -> Result<Vec<R>, StoreError>;
}

impl<R, S> KeyedStore<R> for Arc<S>
where
    R: Record,
    S: KeyedStore<R> + ?Sized,
{
    fn create(&self, record: R) -> Result<(), StoreError> {
        (**self).create(record)
    }

    fn get(&self, key: &R::Key) -> Result<Option<R>, StoreError> {
        (**self).get(key)
    }

    fn update(&self, record: R, expected: ExpectedVersion) -> Result<(), StoreError> {
        (**self).update(record, expected)
    }

    fn delete(&self, key: &R::Key) -> Result<(), StoreError> {
        (**self).delete(key)
    }

    fn list(&self) -> Result<Vec<R>, StoreError> {
        (**self).list()
    }

    fn query(&self, index: &str, value: &str) -> Result<Vec<R>, StoreError> {
        (**self).query(index, value)
    }
}

#[derive(Debug)]
struct Entry<R> {
    seq: u64,
    record: R,
}

#[derive(Debug)]
struct Inner<R: Record> {
    next_seq: u64,
    records: HashMap<R::Key, Entry<R>>,
    /// index name -> value -> keys
    indexes: HashMap<&'static str, HashMap<String, HashSet<R::Key>>>,
}

impl<R: Record> Inner<R> {
    fn new() -> Self {
        Self {
            next_seq: 0,
            records: HashMap::new(),
            indexes: R::INDEXES.iter().map(|name| (*name, HashMap::new())).collect(),
        }
    }

    fn index(&mut self, record: &R) {
        let key = record.key();
        for (name, values) in self.indexes.iter_mut() {
            for value in record.index_values(name) {
                values.entry(value).or_default().insert(key.clone());
            }
        }
    }

    fn unindex(&mut self, record: &R) {
        let key = record.key();
        for (name, values) in self.indexes.iter_mut() {
            for value in record.index_values(name) {
                if let Some(keys) = values.get_mut(&value) {
                    keys.remove(&key);
                    if keys.is_empty() {
                        values.remove(&value);
                    }
                }
            }
        }
    }

    fn in_order<'a>(&self, entries: impl Iterator<Item = &'a Entry<R>>) -> Vec<R>
    where
        R: 'a,
    {
        let mut entries: Vec<&Entry<R>> = entries.collect();
        entries.sort_by_key(|e| e.seq);
        entries.into_iter().map(|e| e.record.clone()).collect()
    }
}

/// In-process keyed store with maintained secondary indexes.
#[derive(Debug)]
pub struct InMemoryKeyedStore<R: Record> {
    inner: RwLock<Inner<R>>,
}

impl<R: Record> InMemoryKeyedStore<R> {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(Inner::new()),
        }
    }

    pub fn len(&self) -> usize {
        self.inner.read().map(|i| i.records.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<R: Record> Default for InMemoryKeyedStore<R> {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned<R: Record>() -> StoreError {
    StoreError::Unavailable(format!("{} lock poisoned", R::COLLECTION))
}

impl<R: Record> KeyedStore<R> for InMemoryKeyedStore<R> {
    fn create(&self, record: R) -> Result<(), StoreError> {
        let mut inner = self.inner.write().map_err(|_| poisoned::<R>())?;
        let key = record.key();
        if inner.records.contains_key(&key) {
            return Err(StoreError::Conflict {
                collection: R::COLLECTION,
                key: key.to_string(),
                detail: "key already exists".into(),
            });
        }
        inner.index(&record);
        let seq = inner.next_seq;
        inner.next_seq += 1;
        inner.records.insert(key, Entry { seq, record });
        Ok(())
    }

    fn get(&self, key: &R::Key) -> Result<Option<R>, StoreError> {
        let inner = self.inner.read().map_err(|_| poisoned::<R>())?;
        Ok(inner.records.get(key).map(|e| e.record.clone()))
    }

    fn update(&self, record: R, expected: ExpectedVersion) -> Result<(), StoreError> {
        let mut inner = self.inner.write().map_err(|_| poisoned::<R>())?;
        let key = record.key();
        let Some(stored) = inner.records.get(&key) else {
            return Err(StoreError::NotFound {
                collection: R::COLLECTION,
                key: key.to_string(),
            });
        };
        let actual = stored.record.version();
        if !expected.matches(actual) {
            return Err(StoreError::Conflict {
                collection: R::COLLECTION,
                key: key.to_string(),
                detail: format!("expected {expected:?}, stored version is {actual}"),
            });
        }
        let seq = stored.seq;
        let previous = stored.record.clone();
        inner.unindex(&previous);
        inner.index(&record);
        inner.records.insert(key, Entry { seq, record });
        Ok(())
    }

    fn delete(&self, key: &R::Key) -> Result<(), StoreError> {
        let mut inner = self.inner.write().map_err(|_| poisoned::<R>())?;
        let Some(entry) = inner.records.remove(key) else {
            return Err(StoreError::NotFound {
                collection: R::COLLECTION,
                key: key.to_string(),
            });
        };
        inner.unindex(&entry.record);
        Ok(())
    }

    fn list(&self) -> Result<Vec<R>, StoreError> {
        let inner = self.inner.read().map_err(|_| poisoned::<R>())?;
        Ok(inner.in_order(inner.records.values()))
    }

    fn query(&self, index: &str, value: &str) -> Result<Vec<R>, StoreError> {
        let inner = self.inner.read().map_err(|_| poisoned::<R>())?;
        let Some(values) = inner.indexes.get(index) else {
            return Err(StoreError::UnknownIndex {
                collection: R::COLLECTION,
                index: index.to_string(),
            });
        };
        let Some(keys) = values.get(value) else {
            return Ok(Vec::new());
        };
        Ok(inner.in_order(keys.iter().filter_map(|k| inner.records.get(k))))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Note {
        id: u32,
        tags: Vec<&'static str>,
        version: u64,
    }

    impl Record for Note {
        type Key = u32;
        const COLLECTION: &'static str = "notes";
        const INDEXES: &'static [&'static str] = &["tag"];

        fn key(&self) -> u32 {
            self.id
        }

        fn version(&self) -> u64 {
            self.version
        }

        fn index_values(&self, index: &str) -> Vec<String> {
            match index {
                "tag" => self.tags.iter().map(|t| t.to_string()).collect(),
                _ => Vec::new(),
            }
        }
    }

    fn note(id: u32, tags: &[&'static str], version: u64) -> Note {
        Note {
            id,
            tags: tags.to_vec(),
            version,
        }
    }

    #[test]
    fn create_rejects_duplicate_keys() {
        let store = InMemoryKeyedStore::new();
        store.create(note(1, &["a"], 1)).unwrap();
        let err = store.create(note(1, &["b"], 1)).unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));
        assert_eq!(store.get(&1).unwrap(), Some(note(1, &["a"], 1)));
    }

    #[test]
    fn update_checks_the_stored_version() {
        let store = InMemoryKeyedStore::new();
        store.create(note(1, &["a"], 1)).unwrap();

        store.update(note(1, &["a"], 2), ExpectedVersion::Exact(1)).unwrap();
        let stale = store.update(note(1, &["a"], 3), ExpectedVersion::Exact(1));
        assert!(matches!(stale, Err(StoreError::Conflict { .. })));

        store.update(note(1, &["a"], 9), ExpectedVersion::Any).unwrap();
        assert_eq!(store.get(&1).unwrap().unwrap().version, 9);
    }

    #[test]
    fn update_of_missing_record_is_not_found() {
        let store: InMemoryKeyedStore<Note> = InMemoryKeyedStore::new();
        let err = store.update(note(7, &[], 1), ExpectedVersion::Any).unwrap_err();
        assert_eq!(
            err,
            StoreError::NotFound {
                collection: "notes",
                key: "7".into()
            }
        );
    }

    #[test]
    fn secondary_index_follows_updates_and_deletes() {
        let store = InMemoryKeyedStore::new();
        store.create(note(1, &["open", "cold"], 1)).unwrap();
        store.create(note(2, &["open"], 1)).unwrap();

        let open: Vec<u32> = store.query("tag", "open").unwrap().iter().map(|n| n.id).collect();
        assert_eq!(open, vec![1, 2]);
        assert_eq!(store.query("tag", "cold").unwrap().len(), 1);

        store.update(note(1, &["closed"], 2), ExpectedVersion::Exact(1)).unwrap();
        assert_eq!(store.query("tag", "open").unwrap(), vec![note(2, &["open"], 1)]);
        assert!(store.query("tag", "cold").unwrap().is_empty());

        store.delete(&2).unwrap();
        assert!(store.query("tag", "open").unwrap().is_empty());
        assert!(matches!(store.delete(&2), Err(StoreError::NotFound { .. })));
    }

    #[test]
    fn list_keeps_insertion_order_across_updates() {
        let store = InMemoryKeyedStore::new();
        for id in [5, 3, 9] {
            store.create(note(id, &[], 1)).unwrap();
        }
        store.update(note(5, &[], 2), ExpectedVersion::Any).unwrap();
        let ids: Vec<u32> = store.list().unwrap().iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![5, 3, 9]);
    }

    #[test]
    fn unknown_index_is_an_error() {
        let store: InMemoryKeyedStore<Note> = InMemoryKeyedStore::new();
        assert!(matches!(
            store.query("color", "red"),
            Err(StoreError::UnknownIndex { .. })
        ));
    }

    #[test]
    fn only_unavailability_is_transient() {
        assert!(StoreError::Unavailable("down".into()).is_transient());
        assert!(!StoreError::NotFound { collection: "notes", key: "1".into() }.is_transient());
    }
}
