//! Optimistic create/update/delete over the remote table.
//!
//! Every mutation follows the same protocol while holding the session's
//! write gate:
//!
//! 1. Fail with [`SyncError::Auth`] if the session has no credential.
//! 2. Validate the change and apply it to the local cache, in the form it
//!    will read back from the sheet.
//! 3. Encode the record and write it to the remote sheet, locating the row
//!    by id for updates and deletes.
//! 4. On remote failure, put the cache back exactly as it was and return
//!    [`SyncError::Rejected`].
//!
//! Refreshes read the sheet without the gate and take it only to replace the
//! cache. A read that overlapped an accepted write is thrown away and made
//! again, so a refresh never overwrites a change with older rows.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

use crate::cache::CacheEntity;
use crate::codec::{decode_rows, EntityKind, SheetRecord};
use crate::error::{Result, SyncError};
use crate::models::{validate_fields, NewProduct, Order, OrderStatus, Product};
use crate::session::Session;
use crate::table::{AccessToken, RemoteTable, SheetRange, TableError};

/// Sheet names for each collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SheetLayout {
    pub products: String,
    pub orders: String,
}

impl Default for SheetLayout {
    fn default() -> Self {
        Self {
            products: "Products".to_string(),
            orders: "Orders".to_string(),
        }
    }
}

impl SheetLayout {
    pub fn sheet(&self, kind: EntityKind) -> &str {
        match kind {
            EntityKind::Products => &self.products,
            EntityKind::Orders => &self.orders,
        }
    }
}

/// What to do when an update cannot find the record's row in the sheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MissingRowPolicy {
    /// Append the record as a new row.
    #[default]
    Append,
    /// Reject the update and roll back.
    Fail,
}

impl fmt::Display for MissingRowPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MissingRowPolicy::Append => write!(f, "append"),
            MissingRowPolicy::Fail => write!(f, "fail"),
        }
    }
}

impl FromStr for MissingRowPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "append" => Ok(MissingRowPolicy::Append),
            "fail" => Ok(MissingRowPolicy::Fail),
            _ => Err(format!(
                "Invalid missing row policy '{}'. Valid options: append, fail",
                s
            )),
        }
    }
}

/// How many times a refresh reads again after its rows were made stale by a
/// concurrent write.
const REFRESH_ATTEMPTS: usize = 3;

/// Applies use-case operations to a [`Session`] and a [`RemoteTable`].
#[derive(Debug)]
pub struct SyncCoordinator<T> {
    table: T,
    layout: SheetLayout,
    policy: MissingRowPolicy,
}

impl<T: RemoteTable> SyncCoordinator<T> {
    pub fn new(table: T) -> Self {
        Self {
            table,
            layout: SheetLayout::default(),
            policy: MissingRowPolicy::default(),
        }
    }

    pub fn with_layout(mut self, layout: SheetLayout) -> Self {
        self.layout = layout;
        self
    }

    pub fn with_missing_row_policy(mut self, policy: MissingRowPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn table(&self) -> &T {
        &self.table
    }

    pub fn layout(&self) -> &SheetLayout {
        &self.layout
    }

    pub fn missing_row_policy(&self) -> MissingRowPolicy {
        self.policy
    }

    /// Reloads both collections.
    pub async fn load_all(&self, session: &Session) -> Result<()> {
        self.refresh_products(session).await?;
        self.refresh_orders(session).await?;
        Ok(())
    }

    /// Replaces cached products with the sheet's contents. Returns how many
    /// products are cached afterwards.
    pub async fn refresh_products(&self, session: &Session) -> Result<usize> {
        self.refresh::<Product>(session).await
    }

    /// Replaces cached orders with the sheet's contents. Returns how many
    /// orders are cached afterwards.
    pub async fn refresh_orders(&self, session: &Session) -> Result<usize> {
        self.refresh::<Order>(session).await
    }

    /// Reads the sheet, then swaps the rows into the cache under the write
    /// gate. If writes keep landing during every read, the cache is left as
    /// those writes made it.
    async fn refresh<R: SheetRecord + CacheEntity>(&self, session: &Session) -> Result<usize> {
        let sheet = self.layout.sheet(R::KIND);

        for attempt in 1..=REFRESH_ATTEMPTS {
            let token = require_credential(session).await?;
            let writes = session.writes();

            let rows = self
                .table
                .fetch_range(&token, sheet, SheetRange::DATA_ROWS)
                .await
                .map_err(|e| {
                    tracing::warn!("Failed to read {}: {}", R::KIND, e);
                    SyncError::Read(e)
                })?;
            let records: Vec<R> = decode_rows(&rows, SheetRange::DATA_ROWS.first_row);
            let count = records.len();

            let _gate = session.lock_writes().await;
            if session.writes() != writes {
                tracing::debug!(
                    "Discarding {} read {}: a write landed while reading",
                    R::KIND,
                    attempt
                );
                continue;
            }
            session
                .update_cache(|cache| R::collection_mut(cache).replace_all(records))
                .await
                .ok_or(SyncError::Auth)?;
            let generation = session.advance_generation();
            tracing::debug!(
                "Loaded {} {} from {} row(s) (generation {})",
                count,
                R::KIND,
                rows.len(),
                generation
            );
            return Ok(count);
        }

        tracing::warn!(
            "Gave up refreshing {} after {} reads overlapped writes",
            R::KIND,
            REFRESH_ATTEMPTS
        );
        let cache = session.cache().read().await;
        Ok(R::collection(&cache).len())
    }

    /// Adds a product to the catalog.
    ///
    /// The id is derived from the creation time in milliseconds, bumped past
    /// the highest cached id when needed so products created within the same
    /// millisecond still get distinct ids.
    pub async fn create_product(&self, session: &Session, draft: NewProduct) -> Result<Product> {
        let _gate = session.lock_writes().await;
        let token = require_credential(session).await?;
        draft.validate().map_err(SyncError::InvalidProduct)?;

        let created_at = now();
        let product = session
            .update_cache(|cache| {
                let next_free = cache.products.max_id().map_or(1, |max| max + 1);
                let id = created_at.timestamp_millis().max(next_free);
                let product = draft.into_product(id, created_at).normalized();
                cache.products.upsert(product.clone());
                product
            })
            .await
            .ok_or(SyncError::Auth)?;

        let sheet = self.layout.sheet(EntityKind::Products);
        match self.table.append_row(&token, sheet, product.encode()).await {
            Ok(()) => {
                session.record_write();
                tracing::info!("Created product {} ({})", product.id, product.name);
                Ok(product)
            }
            Err(e) => {
                session
                    .update_cache(|cache| cache.products.remove(product.id))
                    .await;
                tracing::warn!("Rolled back creation of product {}: {}", product.id, e);
                Err(SyncError::Rejected(e))
            }
        }
    }

    /// Saves edits to a cached product. The creation time is kept from the
    /// cached record.
    pub async fn update_product(&self, session: &Session, product: Product) -> Result<Product> {
        let _gate = session.lock_writes().await;
        let token = require_credential(session).await?;
        validate_fields(&product.name, product.price).map_err(SyncError::InvalidProduct)?;

        let previous = session
            .product(product.id)
            .await
            .ok_or(SyncError::ProductNotFound(product.id))?;
        let updated = Product {
            name: product.name.trim().to_string(),
            created_at: previous.created_at,
            ..product
        };
        self.commit_update(session, &token, previous, updated).await
    }

    /// Flips a product between active and inactive.
    pub async fn toggle_product_status(&self, session: &Session, id: i64) -> Result<Product> {
        let _gate = session.lock_writes().await;
        let token = require_credential(session).await?;

        let previous = session
            .product(id)
            .await
            .ok_or(SyncError::ProductNotFound(id))?;
        let updated = Product {
            status: previous.status.toggled(),
            ..previous.clone()
        };
        self.commit_update(session, &token, previous, updated).await
    }

    /// Removes a product from the cache and the sheet.
    ///
    /// A product whose row is already gone counts as deleted. Returns the
    /// removed product if it was cached.
    pub async fn delete_product(&self, session: &Session, id: i64) -> Result<Option<Product>> {
        let _gate = session.lock_writes().await;
        let token = require_credential(session).await?;

        let removed = session
            .update_cache(|cache| cache.products.remove(id))
            .await
            .ok_or(SyncError::Auth)?;
        let sheet = self.layout.sheet(EntityKind::Products);
        let result = match self.table.find_row_index(&token, sheet, id).await {
            Ok(index) => self.table.delete_row(&token, sheet, index).await,
            Err(TableError::NotFound) => {
                tracing::debug!("Product {} has no row, nothing to delete", id);
                Ok(())
            }
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => {
                session.record_write();
                tracing::info!("Deleted product {}", id);
                Ok(removed)
            }
            Err(e) => {
                if let Some(product) = removed {
                    session
                        .update_cache(|cache| cache.products.upsert(product))
                        .await;
                }
                tracing::warn!("Rolled back deletion of product {}: {}", id, e);
                Err(SyncError::Rejected(e))
            }
        }
    }

    /// Moves an order one step forward in the kitchen workflow.
    pub async fn update_order_status(
        &self,
        session: &Session,
        id: i64,
        status: OrderStatus,
    ) -> Result<Order> {
        let _gate = session.lock_writes().await;
        let token = require_credential(session).await?;

        let previous = session.order(id).await.ok_or(SyncError::OrderNotFound(id))?;
        if !previous.status.can_advance_to(status) {
            return Err(SyncError::InvalidTransition {
                id,
                from: previous.status,
                to: status,
            });
        }
        let updated = Order {
            status,
            updated_at: Some(now()),
            ..previous.clone()
        };
        self.commit_update(session, &token, previous, updated).await
    }

    /// Replaces a cached record optimistically and writes it to its row,
    /// restoring `previous` if the write fails. Caller holds the gate.
    async fn commit_update<R: SheetRecord + CacheEntity>(
        &self,
        session: &Session,
        token: &AccessToken,
        previous: R,
        updated: R,
    ) -> Result<R> {
        let updated = updated.normalized();
        session
            .update_cache(|cache| R::collection_mut(cache).upsert(updated.clone()))
            .await
            .ok_or(SyncError::Auth)?;

        match self.write_existing(token, &updated).await {
            Ok(()) => {
                session.record_write();
                tracing::info!("Updated {} record {}", R::KIND, updated.id());
                Ok(updated)
            }
            Err(e) => {
                session
                    .update_cache(|cache| R::collection_mut(cache).upsert(previous))
                    .await;
                tracing::warn!(
                    "Rolled back update of {} record {}: {}",
                    R::KIND,
                    updated.id(),
                    e
                );
                Err(SyncError::Rejected(e))
            }
        }
    }

    /// Overwrites the record's row, applying the missing-row policy when the
    /// id is not found in the sheet.
    async fn write_existing<R: SheetRecord>(
        &self,
        token: &AccessToken,
        record: &R,
    ) -> std::result::Result<(), TableError> {
        let sheet = self.layout.sheet(R::KIND);
        match self.table.find_row_index(token, sheet, record.id()).await {
            Ok(index) => {
                self.table
                    .update_row(token, sheet, index, record.encode())
                    .await
            }
            Err(TableError::NotFound) => match self.policy {
                MissingRowPolicy::Append => {
                    tracing::warn!(
                        "No row for {} record {}, appending it",
                        R::KIND,
                        record.id()
                    );
                    self.table.append_row(token, sheet, record.encode()).await
                }
                MissingRowPolicy::Fail => Err(TableError::NotFound),
            },
            Err(e) => Err(e),
        }
    }
}

async fn require_credential(session: &Session) -> Result<AccessToken> {
    session.credential().await.ok_or(SyncError::Auth)
}

/// Current time at the millisecond precision stored in the sheet.
fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(3)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::{MemoryTable, Row, RowIndex, TableOp};
    use futures::future::{BoxFuture, FutureExt};
    use rust_decimal::Decimal;
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::Semaphore;

    use crate::models::{OrderItem, ProductStatus};

    fn setup() -> (SyncCoordinator<MemoryTable>, Session) {
        let table = MemoryTable::restaurant("Products", "Orders");
        let session = Session::sign_in(AccessToken::new("test-token").unwrap());
        (SyncCoordinator::new(table), session)
    }

    fn token() -> AccessToken {
        AccessToken::new("test-token").unwrap()
    }

    fn soup() -> Product {
        NewProduct::new("Soup", Decimal::new(1250, 2)).into_product(5001, now())
    }

    fn pending_order() -> Order {
        Order::new(
            1001,
            vec![OrderItem::new("Soup", 2, Decimal::new(1250, 2))],
        )
        .with_customer("Ana")
        .with_created_at(now())
    }

    async fn seeded() -> (SyncCoordinator<MemoryTable>, Session) {
        let (coordinator, session) = setup();
        coordinator.table().seed("Products", soup().encode()).await;
        coordinator
            .table()
            .seed("Orders", pending_order().encode())
            .await;
        coordinator.load_all(&session).await.unwrap();
        (coordinator, session)
    }

    #[tokio::test]
    async fn test_create_product_appends_row() {
        let (coordinator, session) = setup();

        let product = coordinator
            .create_product(&session, NewProduct::new("Soup", Decimal::new(1250, 2)))
            .await
            .unwrap();

        let cached = session.products().await;
        assert_eq!(cached.len(), 1);
        assert_eq!(cached[0].price, Decimal::new(1250, 2));
        assert_eq!(cached[0].status, ProductStatus::Active);

        let index = coordinator
            .table()
            .find_row_index(&token(), "Products", product.id)
            .await
            .unwrap();
        assert!(index.get() >= 2);

        let rows = coordinator.table().rows("Products").await;
        assert_eq!(Product::decode(&rows[1]).unwrap(), product);
    }

    #[tokio::test]
    async fn test_rapid_creates_get_distinct_ids() {
        let (coordinator, session) = setup();
        let first = coordinator
            .create_product(&session, NewProduct::new("Soup", Decimal::ONE))
            .await
            .unwrap();
        let second = coordinator
            .create_product(&session, NewProduct::new("Tea", Decimal::ONE))
            .await
            .unwrap();
        assert!(second.id > first.id);
    }

    #[tokio::test]
    async fn test_create_rolls_back_on_remote_failure() {
        let (coordinator, session) = setup();
        coordinator
            .table()
            .fail_next(TableOp::Append, TableError::Remote("quota exceeded".to_string()))
            .await;

        let result = coordinator
            .create_product(&session, NewProduct::new("Soup", Decimal::ONE))
            .await;
        assert!(matches!(result, Err(SyncError::Rejected(TableError::Remote(_)))));
        assert!(session.products().await.is_empty());
    }

    #[tokio::test]
    async fn test_create_validates_before_touching_anything() {
        let (coordinator, session) = setup();
        let result = coordinator
            .create_product(&session, NewProduct::new(" ", Decimal::ONE))
            .await;
        assert!(matches!(result, Err(SyncError::InvalidProduct(_))));

        let result = coordinator
            .create_product(&session, NewProduct::new("Soup", Decimal::new(-5, 0)))
            .await;
        assert!(matches!(result, Err(SyncError::InvalidProduct(_))));
        assert_eq!(coordinator.table().calls(), 0);
    }

    #[tokio::test]
    async fn test_signed_out_session_is_rejected() {
        let (coordinator, session) = seeded().await;
        let calls = coordinator.table().calls();
        session.sign_out().await;

        let result = coordinator.toggle_product_status(&session, 5001).await;
        assert!(matches!(result, Err(SyncError::Auth)));
        let result = coordinator.refresh_orders(&session).await;
        assert!(result.unwrap_err().requires_sign_in());
        assert_eq!(coordinator.table().calls(), calls);
    }

    #[tokio::test]
    async fn test_order_status_rolls_back_on_update_failure() {
        let (coordinator, session) = seeded().await;
        let before = session.order(1001).await.unwrap();
        assert_eq!(before.status, OrderStatus::Pending);

        coordinator
            .table()
            .fail_next(TableOp::Update, TableError::Remote("backend error".to_string()))
            .await;
        let result = coordinator
            .update_order_status(&session, 1001, OrderStatus::Preparing)
            .await;

        assert!(matches!(result, Err(SyncError::Rejected(_))));
        assert_eq!(session.order(1001).await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_order_status_advances() {
        let (coordinator, session) = seeded().await;
        let before = session.order(1001).await.unwrap();

        let updated = coordinator
            .update_order_status(&session, 1001, OrderStatus::Preparing)
            .await
            .unwrap();
        assert_eq!(updated.status, OrderStatus::Preparing);
        assert!(updated.updated_at >= before.updated_at);
        assert_eq!(updated.created_at, before.created_at);

        let rows = coordinator.table().rows("Orders").await;
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1][4], json!("preparing"));
    }

    #[tokio::test]
    async fn test_invalid_transitions_fail_fast() {
        let (coordinator, session) = seeded().await;
        let calls = coordinator.table().calls();

        let result = coordinator
            .update_order_status(&session, 1001, OrderStatus::Ready)
            .await;
        assert!(matches!(
            result,
            Err(SyncError::InvalidTransition {
                id: 1001,
                from: OrderStatus::Pending,
                to: OrderStatus::Ready
            })
        ));
        let result = coordinator
            .update_order_status(&session, 1001, OrderStatus::Pending)
            .await;
        assert!(matches!(result, Err(SyncError::InvalidTransition { .. })));
        assert_eq!(coordinator.table().calls(), calls);
    }

    #[tokio::test]
    async fn test_unknown_order() {
        let (coordinator, session) = seeded().await;
        let result = coordinator
            .update_order_status(&session, 42, OrderStatus::Preparing)
            .await;
        assert!(matches!(result, Err(SyncError::OrderNotFound(42))));
    }

    #[tokio::test]
    async fn test_toggle_product_status() {
        let (coordinator, session) = seeded().await;
        let toggled = coordinator.toggle_product_status(&session, 5001).await.unwrap();
        assert_eq!(toggled.status, ProductStatus::Inactive);

        let rows = coordinator.table().rows("Products").await;
        assert_eq!(rows[1][4], json!("inactive"));
        assert!(matches!(
            coordinator.toggle_product_status(&session, 9).await,
            Err(SyncError::ProductNotFound(9))
        ));
    }

    #[tokio::test]
    async fn test_update_product_keeps_created_at() {
        let (coordinator, session) = seeded().await;
        let original = session.product(5001).await.unwrap();

        let mut edited = original.clone();
        edited.name = "  Tomato Soup ".to_string();
        edited.price = Decimal::new(1400, 2);
        edited.created_at = None;

        let saved = coordinator.update_product(&session, edited).await.unwrap();
        assert_eq!(saved.name, "Tomato Soup");
        assert_eq!(saved.created_at, original.created_at);
        assert_eq!(session.product(5001).await.unwrap(), saved);

        let mut invalid = saved.clone();
        invalid.name = String::new();
        assert!(matches!(
            coordinator.update_product(&session, invalid).await,
            Err(SyncError::InvalidProduct(_))
        ));
    }

    #[tokio::test]
    async fn test_update_of_missing_row_appends_by_default() {
        let (coordinator, session) = setup();
        session.cache().write().await.products.upsert(soup());

        coordinator.toggle_product_status(&session, 5001).await.unwrap();

        let rows = coordinator.table().rows("Products").await;
        assert_eq!(rows.len(), 2);
        assert_eq!(Product::decode(&rows[1]).unwrap().status, ProductStatus::Inactive);
    }

    #[tokio::test]
    async fn test_update_of_missing_row_can_fail() {
        let (coordinator, session) = setup();
        let coordinator = coordinator.with_missing_row_policy(MissingRowPolicy::Fail);
        let original = soup();
        session.cache().write().await.products.upsert(original.clone());

        let result = coordinator.toggle_product_status(&session, 5001).await;
        assert!(matches!(result, Err(SyncError::Rejected(TableError::NotFound))));
        assert_eq!(session.product(5001).await.unwrap(), original);
        assert_eq!(coordinator.table().rows("Products").await.len(), 1);
    }

    #[tokio::test]
    async fn test_delete_product() {
        let (coordinator, session) = seeded().await;
        let removed = coordinator.delete_product(&session, 5001).await.unwrap();
        assert_eq!(removed.map(|p| p.id), Some(5001));
        assert!(session.product(5001).await.is_none());
        assert_eq!(coordinator.table().rows("Products").await.len(), 1);
    }

    #[tokio::test]
    async fn test_delete_missing_product_is_noop() {
        let (coordinator, session) = seeded().await;
        let before = session.products().await;

        let removed = coordinator.delete_product(&session, 777).await.unwrap();
        assert!(removed.is_none());
        assert_eq!(session.products().await, before);
        assert_eq!(coordinator.table().rows("Products").await.len(), 2);
    }

    #[tokio::test]
    async fn test_delete_rolls_back_on_failure() {
        let (coordinator, session) = seeded().await;
        let before = session.product(5001).await.unwrap();
        coordinator
            .table()
            .fail_next(TableOp::Delete, TableError::Remote("backend error".to_string()))
            .await;

        let result = coordinator.delete_product(&session, 5001).await;
        assert!(matches!(result, Err(SyncError::Rejected(_))));
        assert_eq!(session.product(5001).await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_expired_token_on_write_requires_sign_in() {
        let (coordinator, session) = seeded().await;
        coordinator.table().set_token_expired(true);

        let err = coordinator
            .toggle_product_status(&session, 5001)
            .await
            .unwrap_err();
        assert!(err.requires_sign_in());
        assert!(session.product(5001).await.unwrap().is_active());
    }

    #[tokio::test]
    async fn test_failed_refresh_leaves_cache() {
        let (coordinator, session) = seeded().await;
        let before = session.orders().await;
        let generation = session.generation();
        coordinator
            .table()
            .fail_next(TableOp::Fetch, TableError::Auth)
            .await;

        let err = coordinator.refresh_orders(&session).await.unwrap_err();
        assert!(matches!(err, SyncError::Read(TableError::Auth)));
        assert!(err.requires_sign_in());
        assert_eq!(session.orders().await, before);
        assert_eq!(session.generation(), generation);
    }

    #[tokio::test]
    async fn test_refresh_drops_invalid_rows() {
        let (coordinator, session) = seeded().await;
        coordinator
            .table()
            .seed(
                "Orders",
                vec![json!(1002), json!("Ben"), json!("{invalid"), json!(9)],
            )
            .await;
        coordinator
            .table()
            .seed("Orders", vec![json!("abc"), json!("Cy")])
            .await;

        let count = coordinator.refresh_orders(&session).await.unwrap();
        assert_eq!(count, 1);
        assert!(session.order(1002).await.is_none());
        assert!(session.order(1001).await.is_some());
    }

    #[tokio::test]
    async fn test_refresh_replaces_cache() {
        let (coordinator, session) = seeded().await;
        session
            .cache()
            .write()
            .await
            .orders
            .upsert(Order::new(99, Vec::new()));

        coordinator.refresh_orders(&session).await.unwrap();
        assert!(session.order(99).await.is_none());
        assert_eq!(session.orders().await.len(), 1);
    }

    #[tokio::test]
    async fn test_refresh_waits_for_in_flight_mutation() {
        let (coordinator, session) = setup();
        let coordinator = Arc::new(coordinator);
        let session = Arc::new(session);

        let gate = session.lock_writes().await;
        let task = {
            let coordinator = coordinator.clone();
            let session = session.clone();
            tokio::spawn(async move { coordinator.refresh_orders(&session).await })
        };

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(session.generation(), 0);

        drop(gate);
        task.await.unwrap().unwrap();
        assert_eq!(session.generation(), 1);
    }

    /// Memory table whose next full read returns what it saw only once
    /// `release` hands out a permit.
    struct HeldTable {
        inner: MemoryTable,
        hold_next_read: AtomicBool,
        release: Semaphore,
    }

    impl HeldTable {
        fn new() -> Self {
            Self {
                inner: MemoryTable::restaurant("Products", "Orders"),
                hold_next_read: AtomicBool::new(true),
                release: Semaphore::new(0),
            }
        }
    }

    impl RemoteTable for HeldTable {
        fn fetch_range<'a>(
            &'a self,
            token: &'a AccessToken,
            sheet: &'a str,
            range: SheetRange,
        ) -> BoxFuture<'a, std::result::Result<Vec<Row>, TableError>> {
            async move {
                let rows = self.inner.fetch_range(token, sheet, range).await?;
                if range == SheetRange::DATA_ROWS && self.hold_next_read.swap(false, Ordering::SeqCst)
                {
                    let _permit = self
                        .release
                        .acquire()
                        .await
                        .map_err(|e| TableError::Remote(e.to_string()))?;
                }
                Ok(rows)
            }
            .boxed()
        }

        fn append_row<'a>(
            &'a self,
            token: &'a AccessToken,
            sheet: &'a str,
            row: Row,
        ) -> BoxFuture<'a, std::result::Result<(), TableError>> {
            self.inner.append_row(token, sheet, row)
        }

        fn update_row<'a>(
            &'a self,
            token: &'a AccessToken,
            sheet: &'a str,
            index: RowIndex,
            row: Row,
        ) -> BoxFuture<'a, std::result::Result<(), TableError>> {
            self.inner.update_row(token, sheet, index, row)
        }

        fn delete_row<'a>(
            &'a self,
            token: &'a AccessToken,
            sheet: &'a str,
            index: RowIndex,
        ) -> BoxFuture<'a, std::result::Result<(), TableError>> {
            self.inner.delete_row(token, sheet, index)
        }
    }

    fn held_setup() -> (Arc<SyncCoordinator<HeldTable>>, Arc<Session>) {
        let session = Session::sign_in(token());
        (Arc::new(SyncCoordinator::new(HeldTable::new())), Arc::new(session))
    }

    #[tokio::test]
    async fn test_stalled_refresh_blocks_neither_writes_nor_sign_out() {
        let (coordinator, session) = held_setup();
        let refresh = {
            let coordinator = coordinator.clone();
            let session = session.clone();
            tokio::spawn(async move { coordinator.refresh_orders(&session).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        let created = tokio::time::timeout(
            Duration::from_secs(1),
            coordinator.create_product(&session, NewProduct::new("Soup", Decimal::ONE)),
        )
        .await
        .unwrap()
        .unwrap();
        assert!(session.product(created.id).await.is_some());

        tokio::time::timeout(Duration::from_secs(1), session.sign_out())
            .await
            .unwrap();
        assert!(!session.is_active().await);
        assert!(session.products().await.is_empty());

        assert!(!refresh.is_finished());
        refresh.abort();
    }

    #[tokio::test]
    async fn test_refresh_rereads_after_overlapping_write() {
        let (coordinator, session) = held_setup();
        let refresh = {
            let coordinator = coordinator.clone();
            let session = session.clone();
            tokio::spawn(async move { coordinator.refresh_products(&session).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        let created = coordinator
            .create_product(&session, NewProduct::new("Soup", Decimal::ONE))
            .await
            .unwrap();
        coordinator.table().release.add_permits(1);

        assert_eq!(refresh.await.unwrap().unwrap(), 1);
        assert_eq!(session.product(created.id).await, Some(created));
        assert_eq!(session.generation(), 1);
    }

    #[tokio::test]
    async fn test_refresh_after_sign_out_mid_read_leaves_cache_empty() {
        let (coordinator, session) = held_setup();
        coordinator
            .table()
            .inner
            .seed("Orders", pending_order().encode())
            .await;
        let refresh = {
            let coordinator = coordinator.clone();
            let session = session.clone();
            tokio::spawn(async move { coordinator.refresh_orders(&session).await })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        session.sign_out().await;
        coordinator.table().release.add_permits(1);

        assert!(matches!(refresh.await.unwrap(), Err(SyncError::Auth)));
        assert!(session.orders().await.is_empty());
        assert_eq!(session.generation(), 0);
    }

    #[tokio::test]
    async fn test_cached_update_matches_the_sheet() {
        let (coordinator, session) = seeded().await;
        let mut edited = session.product(5001).await.unwrap();
        edited.price = Decimal::from_str("0.12345678901234567891").unwrap();
        edited.description = Some("   ".to_string());

        let saved = coordinator.update_product(&session, edited).await.unwrap();
        assert_eq!(saved.description, None);
        let cached = session.product(5001).await.unwrap();
        assert_eq!(cached, saved);

        coordinator.refresh_products(&session).await.unwrap();
        assert_eq!(session.product(5001).await.unwrap(), cached);
    }

    #[test]
    fn test_layout_and_policy() {
        let layout = SheetLayout::default();
        assert_eq!(layout.sheet(EntityKind::Products), "Products");
        assert_eq!(layout.sheet(EntityKind::Orders), "Orders");
        assert_eq!(MissingRowPolicy::from_str("FAIL").unwrap(), MissingRowPolicy::Fail);
        assert!(MissingRowPolicy::from_str("ignore").is_err());
        assert_eq!(MissingRowPolicy::default().to_string(), "append");
    }
}
