//! Signed-in state: the credential, the local cache and the write gate.

use std::cmp::Reverse;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{Mutex, MutexGuard, RwLock};

use crate::cache::LocalCache;
use crate::models::{Order, Product};
use crate::table::AccessToken;

/// One signed-in session.
///
/// Created by [`Session::sign_in`] and ended by [`Session::sign_out`], which
/// drops the credential and empties the cache. Mutations hold the write gate
/// for their whole remote round trip. Refreshes read the remote without it
/// and take it only to swap in what they read, so a stalled read never holds
/// up a mutation or sign-out.
#[derive(Debug)]
pub struct Session {
    credential: RwLock<Option<AccessToken>>,
    cache: RwLock<LocalCache>,
    gate: Mutex<()>,
    generation: AtomicU64,
    writes: AtomicU64,
}

impl Session {
    pub fn sign_in(token: AccessToken) -> Self {
        tracing::debug!("Session started");
        Self {
            credential: RwLock::new(Some(token)),
            cache: RwLock::new(LocalCache::default()),
            gate: Mutex::new(()),
            generation: AtomicU64::new(0),
            writes: AtomicU64::new(0),
        }
    }

    /// Clears the credential and both collections without waiting for
    /// in-flight calls. Their results are dropped when they come back.
    pub async fn sign_out(&self) {
        let mut credential = self.credential.write().await;
        *credential = None;
        self.cache.write().await.clear();
        drop(credential);
        tracing::info!("Signed out, local cache cleared");
    }

    pub async fn credential(&self) -> Option<AccessToken> {
        self.credential.read().await.clone()
    }

    pub async fn is_active(&self) -> bool {
        self.credential.read().await.is_some()
    }

    /// Cached products, newest id first.
    pub async fn products(&self) -> Vec<Product> {
        let cache = self.cache.read().await;
        let mut products: Vec<Product> = cache.products.iter().cloned().collect();
        products.sort_by_key(|p| Reverse(p.id));
        products
    }

    /// Cached orders, most recently created first. Orders without a creation
    /// time sort last.
    pub async fn orders(&self) -> Vec<Order> {
        let cache = self.cache.read().await;
        let mut orders: Vec<Order> = cache.orders.iter().cloned().collect();
        orders.sort_by_key(|o| Reverse((o.created_at, o.id)));
        orders
    }

    pub async fn product(&self, id: i64) -> Option<Product> {
        self.cache.read().await.products.get(id).cloned()
    }

    pub async fn order(&self, id: i64) -> Option<Order> {
        self.cache.read().await.orders.get(id).cloned()
    }

    /// Number of successful refreshes so far.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    pub(crate) async fn lock_writes(&self) -> MutexGuard<'_, ()> {
        self.gate.lock().await
    }

    pub(crate) fn cache(&self) -> &RwLock<LocalCache> {
        &self.cache
    }

    /// Runs `f` on the cache unless the session has been signed out. The
    /// credential stays read-locked meanwhile, so sign-out cannot clear the
    /// cache halfway through.
    pub(crate) async fn update_cache<T>(
        &self,
        f: impl FnOnce(&mut LocalCache) -> T,
    ) -> Option<T> {
        let credential = self.credential.read().await;
        credential.as_ref()?;
        let mut cache = self.cache.write().await;
        Some(f(&mut cache))
    }

    /// Number of writes the remote has accepted in this session.
    pub(crate) fn writes(&self) -> u64 {
        self.writes.load(Ordering::SeqCst)
    }

    pub(crate) fn record_write(&self) {
        self.writes.fetch_add(1, Ordering::SeqCst);
    }

    pub(crate) fn advance_generation(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::SeqCst) + 1
    }
}
