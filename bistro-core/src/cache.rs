//! In-memory copy of the remote collections.
//!
//! Collections are keyed by record id, so no two cached records share an id.
//! The cache itself does no locking; [`Session`](crate::Session) owns it
//! behind a lock.

use std::collections::BTreeMap;

use crate::models::{Identified, Order, Product};

/// Records of one kind, keyed by id.
#[derive(Debug, Clone, PartialEq)]
pub struct Collection<T> {
    records: BTreeMap<i64, T>,
}

impl<T> Default for Collection<T> {
    fn default() -> Self {
        Self {
            records: BTreeMap::new(),
        }
    }
}

impl<T: Identified + Clone> Collection<T> {
    /// Discards current contents and loads `records`. A later record wins if
    /// ids repeat.
    pub fn replace_all(&mut self, records: Vec<T>) {
        self.records = records.into_iter().map(|r| (r.id(), r)).collect();
    }

    /// Inserts or replaces by id, returning the previous value.
    pub fn upsert(&mut self, record: T) -> Option<T> {
        self.records.insert(record.id(), record)
    }

    pub fn remove(&mut self, id: i64) -> Option<T> {
        self.records.remove(&id)
    }

    pub fn get(&self, id: i64) -> Option<&T> {
        self.records.get(&id)
    }

    pub fn contains(&self, id: i64) -> bool {
        self.records.contains_key(&id)
    }

    /// Records in ascending id order.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.records.values()
    }

    pub fn max_id(&self) -> Option<i64> {
        self.records.keys().next_back().copied()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }
}

/// Products and orders held for the current session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LocalCache {
    pub products: Collection<Product>,
    pub orders: Collection<Order>,
}

impl LocalCache {
    pub fn clear(&mut self) {
        self.products.clear();
        self.orders.clear();
    }
}

/// Selects the cache collection for a record type.
pub trait CacheEntity: Identified + Clone + Sized {
    fn collection(cache: &LocalCache) -> &Collection<Self>;
    fn collection_mut(cache: &mut LocalCache) -> &mut Collection<Self>;
}

impl CacheEntity for Product {
    fn collection(cache: &LocalCache) -> &Collection<Self> {
        &cache.products
    }

    fn collection_mut(cache: &mut LocalCache) -> &mut Collection<Self> {
        &mut cache.products
    }
}

impl CacheEntity for Order {
    fn collection(cache: &LocalCache) -> &Collection<Self> {
        &cache.orders
    }

    fn collection_mut(cache: &mut LocalCache) -> &mut Collection<Self> {
        &mut cache.orders
    }
}
