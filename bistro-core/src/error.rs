use thiserror::Error;

use crate::models::OrderStatus;
use crate::table::TableError;

/// Errors surfaced by the sync coordinator.
#[derive(Debug, Error)]
pub enum SyncError {
    /// No credential in the session. Nothing was changed.
    #[error("not signed in")]
    Auth,

    #[error("product {0} not found")]
    ProductNotFound(i64),

    #[error("order {0} not found")]
    OrderNotFound(i64),

    /// Local validation failed before anything was changed.
    #[error("invalid product: {0}")]
    InvalidProduct(String),

    #[error("order {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: i64,
        from: OrderStatus,
        to: OrderStatus,
    },

    /// The remote refused a write. The optimistic local change was undone.
    #[error("remote write failed: {0}")]
    Rejected(#[source] TableError),

    /// A refresh could not read the remote. The cache was left as it was.
    #[error("remote read failed: {0}")]
    Read(#[source] TableError),
}

impl SyncError {
    /// True when the user has to sign in (again) before retrying.
    pub fn requires_sign_in(&self) -> bool {
        matches!(
            self,
            SyncError::Auth
                | SyncError::Rejected(TableError::Auth)
                | SyncError::Read(TableError::Auth)
        )
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
