//! Bistro Core Library
//!
//! Catalog and order models, the sheet row codec, and the sync layer that
//! keeps a local cache in step with a remote spreadsheet.

pub mod cache;
pub mod codec;
pub mod coordinator;
pub mod error;
pub mod models;
pub mod refresh;
pub mod report;
pub mod session;
pub mod table;

pub use cache::{CacheEntity, Collection, LocalCache};
pub use codec::{decode_rows, DecodeError, EntityKind, SheetRecord};
pub use coordinator::{MissingRowPolicy, SheetLayout, SyncCoordinator};
pub use error::{SyncError, Result};
pub use models::{
    Category, Identified, NewProduct, Order, OrderItem, OrderStatus, Product, ProductStatus,
};
pub use refresh::{spawn_order_refresh, RefreshHandle, DEFAULT_REFRESH_INTERVAL};
pub use report::{DashboardStats, OrderFilter, ProductFilter};
pub use session::Session;
pub use table::{
    AccessToken, MemoryTable, RemoteTable, Row, RowIndex, SheetRange, SheetsClient, TableError,
    TableOp,
};

pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
