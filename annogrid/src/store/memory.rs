//! In-memory object store.
//!
//! Records live in per-entity vectors behind a `parking_lot` lock. Queries
//! evaluate filters with [`Filter::matches`] and return owned record copies,
//! which keeps the snapshot boundary honest: nothing handed out references
//! live store state. Mutations notify registered observers after the lock
//! is released, so an observer may immediately query or mutate the store.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use parking_lot::RwLock;
use tracing::debug;

use crate::query::Filter;
use crate::snapshot::{FieldValue, PrimaryKey};

use super::{ChangeObserver, ObjectRecord, ObjectStore, ObserverToken, StoreError};

/// A record held by [`MemoryStore`]: a primary key plus a field map.
#[derive(Debug, Clone, PartialEq)]
pub struct MemoryRecord {
    primary_key: PrimaryKey,
    values: BTreeMap<String, FieldValue>,
}

impl MemoryRecord {
    /// Create an empty record with the given primary key.
    pub fn new(primary_key: impl Into<PrimaryKey>) -> Self {
        Self {
            primary_key: primary_key.into(),
            values: BTreeMap::new(),
        }
    }

    /// Set a field value.
    pub fn with_value(mut self, path: impl Into<String>, value: FieldValue) -> Self {
        self.values.insert(path.into(), value);
        self
    }

    /// Set a numeric field.
    pub fn with_number(self, path: impl Into<String>, value: f64) -> Self {
        self.with_value(path, FieldValue::Number(value))
    }

    /// Set a text field.
    pub fn with_text(self, path: impl Into<String>, value: impl Into<String>) -> Self {
        self.with_value(path, FieldValue::Text(value.into()))
    }
}

impl ObjectRecord for MemoryRecord {
    fn primary_key(&self) -> PrimaryKey {
        self.primary_key.clone()
    }

    fn field(&self, path: &str) -> Option<FieldValue> {
        self.values.get(path).cloned()
    }
}

/// An in-memory [`ObjectStore`].
pub struct MemoryStore {
    entities: RwLock<HashMap<String, Vec<MemoryRecord>>>,
    observers: RwLock<HashMap<ObserverToken, (String, ChangeObserver)>>,
    next_token: AtomicU64,
    available: AtomicBool,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            entities: RwLock::new(HashMap::new()),
            observers: RwLock::new(HashMap::new()),
            next_token: AtomicU64::new(1),
            available: AtomicBool::new(true),
        }
    }

    /// Ensure `entity` exists, so queries against it succeed while empty.
    pub fn register_entity(&self, entity: impl Into<String>) {
        self.entities.write().entry(entity.into()).or_default();
    }

    /// Insert a record, replacing any existing record with the same primary
    /// key. Creates the entity if needed and notifies its observers.
    pub fn insert(&self, entity: &str, record: MemoryRecord) {
        {
            let mut entities = self.entities.write();
            let records = entities.entry(entity.to_string()).or_default();
            records.retain(|existing| existing.primary_key != record.primary_key);
            records.push(record);
        }
        self.notify(entity);
    }

    /// Remove the record with `key`. Returns whether a record was removed;
    /// observers are notified only on an actual removal.
    pub fn remove(&self, entity: &str, key: &PrimaryKey) -> bool {
        let removed = {
            let mut entities = self.entities.write();
            match entities.get_mut(entity) {
                Some(records) => {
                    let before = records.len();
                    records.retain(|record| &record.primary_key != key);
                    records.len() != before
                }
                None => false,
            }
        };
        if removed {
            self.notify(entity);
        }
        removed
    }

    /// Number of records stored for `entity`.
    pub fn len(&self, entity: &str) -> usize {
        self.entities
            .read()
            .get(entity)
            .map_or(0, |records| records.len())
    }

    /// Whether `entity` has no records.
    pub fn is_empty(&self, entity: &str) -> bool {
        self.len(entity) == 0
    }

    /// Toggle simulated availability. While unavailable every query fails
    /// with [`StoreError::Unavailable`].
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    fn notify(&self, entity: &str) {
        // Clone the callbacks out of the lock so observers may re-enter.
        let observers: Vec<ChangeObserver> = self
            .observers
            .read()
            .values()
            .filter(|(observed, _)| observed == entity)
            .map(|(_, observer)| observer.clone())
            .collect();
        if !observers.is_empty() {
            debug!(entity, count = observers.len(), "notifying store observers");
        }
        for observer in observers {
            observer();
        }
    }
}

impl ObjectStore for MemoryStore {
    fn query(
        &self,
        entity: &str,
        filter: Option<&Filter>,
    ) -> Result<Vec<Box<dyn ObjectRecord>>, StoreError> {
        if !self.available.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("store is offline".to_string()));
        }
        let entities = self.entities.read();
        let records = entities
            .get(entity)
            .ok_or_else(|| StoreError::UnknownEntity(entity.to_string()))?;
        Ok(records
            .iter()
            .filter(|record| filter.map_or(true, |f| f.matches(*record)))
            .map(|record| Box::new(record.clone()) as Box<dyn ObjectRecord>)
            .collect())
    }

    fn observe(&self, entity: &str, observer: ChangeObserver) -> Result<ObserverToken, StoreError> {
        let token = ObserverToken::new(self.next_token.fetch_add(1, Ordering::Relaxed));
        self.observers
            .write()
            .insert(token, (entity.to_string(), observer));
        Ok(token)
    }

    fn unobserve(&self, token: ObserverToken) {
        self.observers.write().remove(&token);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;

    fn pin(key: i64, lat: f64, lon: f64) -> MemoryRecord {
        MemoryRecord::new(key)
            .with_number("lat", lat)
            .with_number("lon", lon)
    }

    #[test]
    fn test_query_unknown_entity_fails() {
        let store = MemoryStore::new();
        assert_eq!(
            store.query("Pin", None).unwrap_err(),
            StoreError::UnknownEntity("Pin".to_string())
        );
    }

    #[test]
    fn test_registered_entity_queries_empty() {
        let store = MemoryStore::new();
        store.register_entity("Pin");
        assert!(store.query("Pin", None).unwrap().is_empty());
    }

    #[test]
    fn test_insert_and_query() {
        let store = MemoryStore::new();
        store.insert("Pin", pin(1, 10.0, 20.0));
        store.insert("Pin", pin(2, 30.0, 40.0));

        let records = store.query("Pin", None).unwrap();
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn test_insert_replaces_by_primary_key() {
        let store = MemoryStore::new();
        store.insert("Pin", pin(1, 10.0, 20.0));
        store.insert("Pin", pin(1, 11.0, 21.0));

        let records = store.query("Pin", None).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(
            records[0].field("lat"),
            Some(FieldValue::Number(11.0))
        );
    }

    #[test]
    fn test_query_applies_filter() {
        let store = MemoryStore::new();
        store.insert("Pin", pin(1, 10.0, 20.0));
        store.insert("Pin", pin(2, 30.0, 40.0));

        let filter = Filter::range("lat", 0.0, 15.0);
        let records = store.query("Pin", Some(&filter)).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].primary_key(), PrimaryKey::Int(1));
    }

    #[test]
    fn test_remove() {
        let store = MemoryStore::new();
        store.insert("Pin", pin(1, 10.0, 20.0));
        assert!(store.remove("Pin", &PrimaryKey::Int(1)));
        assert!(!store.remove("Pin", &PrimaryKey::Int(1)));
        assert!(store.is_empty("Pin"));
    }

    #[test]
    fn test_unavailable_store_fails_queries() {
        let store = MemoryStore::new();
        store.insert("Pin", pin(1, 10.0, 20.0));
        store.set_available(false);
        assert!(matches!(
            store.query("Pin", None),
            Err(StoreError::Unavailable(_))
        ));
        store.set_available(true);
        assert_eq!(store.query("Pin", None).unwrap().len(), 1);
    }

    #[test]
    fn test_observers_fire_for_their_entity_only() {
        let store = MemoryStore::new();
        let pin_changes = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&pin_changes);
        store
            .observe(
                "Pin",
                Arc::new(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .unwrap();

        store.insert("Pin", pin(1, 10.0, 20.0));
        store.insert("Other", pin(1, 10.0, 20.0));
        assert_eq!(pin_changes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unobserve_stops_notifications() {
        let store = MemoryStore::new();
        let changes = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&changes);
        let token = store
            .observe(
                "Pin",
                Arc::new(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                }),
            )
            .unwrap();

        store.insert("Pin", pin(1, 10.0, 20.0));
        store.unobserve(token);
        store.insert("Pin", pin(2, 30.0, 40.0));
        assert_eq!(changes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_observer_may_reenter_store() {
        let store = Arc::new(MemoryStore::new());
        store.register_entity("Pin");

        let seen = Arc::new(AtomicUsize::new(0));
        let store_clone = Arc::clone(&store);
        let seen_clone = Arc::clone(&seen);
        store
            .observe(
                "Pin",
                Arc::new(move || {
                    // Querying from inside the callback must not deadlock.
                    let records = store_clone.query("Pin", None).unwrap();
                    seen_clone.store(records.len(), Ordering::SeqCst);
                }),
            )
            .unwrap();

        store.insert("Pin", pin(1, 10.0, 20.0));
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_concurrent_access() {
        let store = Arc::new(MemoryStore::new());
        let mut handles = Vec::new();
        for i in 0..8i64 {
            let store = Arc::clone(&store);
            handles.push(std::thread::spawn(move || {
                for j in 0..50i64 {
                    store.insert("Pin", pin(i * 100 + j, 10.0, 20.0));
                    let _ = store.query("Pin", None);
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(store.len("Pin"), 8 * 50);
    }
}
