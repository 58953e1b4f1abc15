//! In-process [`RemoteTable`] test double.
//!
//! Sheets are plain vectors of rows with the header in row 1. Failures can be
//! scheduled per operation kind to exercise rollback paths.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use futures::future::{BoxFuture, FutureExt};
use serde_json::Value;
use tokio::sync::Mutex;

use super::{AccessToken, RemoteTable, Row, RowIndex, SheetRange, TableError};

/// Operation kinds that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TableOp {
    Fetch,
    Append,
    Update,
    Delete,
}

#[derive(Debug, Default)]
pub struct MemoryTable {
    sheets: Mutex<HashMap<String, Vec<Row>>>,
    failures: Mutex<HashMap<TableOp, Vec<TableError>>>,
    expired: AtomicBool,
    calls: AtomicUsize,
}

impl MemoryTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a sheet containing only a header row.
    pub fn with_sheet(mut self, name: &str, header: &[&str]) -> Self {
        let header: Row = header.iter().map(|h| Value::from(*h)).collect();
        self.sheets.get_mut().insert(name.to_string(), vec![header]);
        self
    }

    /// Sheets for products and orders with their standard headers.
    pub fn restaurant(products: &str, orders: &str) -> Self {
        Self::new()
            .with_sheet(
                products,
                &[
                    "id",
                    "name",
                    "category",
                    "price",
                    "status",
                    "description",
                    "created_at",
                ],
            )
            .with_sheet(
                orders,
                &[
                    "id",
                    "customer",
                    "items",
                    "total",
                    "status",
                    "created_at",
                    "updated_at",
                ],
            )
    }

    /// Appends a raw row directly, bypassing failure injection.
    pub async fn seed(&self, sheet: &str, row: Row) {
        self.sheets
            .lock()
            .await
            .entry(sheet.to_string())
            .or_default()
            .push(row);
    }

    /// All rows of a sheet, header included.
    pub async fn rows(&self, sheet: &str) -> Vec<Row> {
        self.sheets
            .lock()
            .await
            .get(sheet)
            .cloned()
            .unwrap_or_default()
    }

    /// Makes the next `op` call fail with `error`. Calls queue up in order.
    pub async fn fail_next(&self, op: TableOp, error: TableError) {
        self.failures.lock().await.entry(op).or_default().push(error);
    }

    /// Makes every call fail with [`TableError::Auth`] until reset.
    pub fn set_token_expired(&self, expired: bool) {
        self.expired.store(expired, Ordering::SeqCst);
    }

    /// Number of calls received, including failed ones.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn begin(&self, op: TableOp) -> Result<(), TableError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.expired.load(Ordering::SeqCst) {
            return Err(TableError::Auth);
        }
        let mut failures = self.failures.lock().await;
        match failures.get_mut(&op) {
            Some(queue) if !queue.is_empty() => Err(queue.remove(0)),
            _ => Ok(()),
        }
    }
}

fn unknown_sheet(sheet: &str) -> TableError {
    TableError::Remote(format!("Unable to parse range: {}", sheet))
}

impl RemoteTable for MemoryTable {
    fn fetch_range<'a>(
        &'a self,
        _token: &'a AccessToken,
        sheet: &'a str,
        range: SheetRange,
    ) -> BoxFuture<'a, Result<Vec<Row>, TableError>> {
        async move {
            self.begin(TableOp::Fetch).await?;
            let sheets = self.sheets.lock().await;
            let rows = sheets.get(sheet).ok_or_else(|| unknown_sheet(sheet))?;

            let first = usize::from(range.first_column);
            let last = usize::from(range.last_column);
            let mut values: Vec<Row> = rows
                .iter()
                .skip(range.first_row.saturating_sub(1) as usize)
                .map(|row| {
                    let mut cells: Row = row
                        .iter()
                        .skip(first)
                        .take(last + 1 - first)
                        .cloned()
                        .collect();
                    while cells.last().is_some_and(|c| c.is_null()) {
                        cells.pop();
                    }
                    cells
                })
                .collect();
            while values.last().is_some_and(|row| row.is_empty()) {
                values.pop();
            }
            Ok(values)
        }
        .boxed()
    }

    fn append_row<'a>(
        &'a self,
        _token: &'a AccessToken,
        sheet: &'a str,
        row: Row,
    ) -> BoxFuture<'a, Result<(), TableError>> {
        async move {
            self.begin(TableOp::Append).await?;
            let mut sheets = self.sheets.lock().await;
            let rows = sheets.get_mut(sheet).ok_or_else(|| unknown_sheet(sheet))?;
            rows.push(row);
            Ok(())
        }
        .boxed()
    }

    fn update_row<'a>(
        &'a self,
        _token: &'a AccessToken,
        sheet: &'a str,
        index: RowIndex,
        row: Row,
    ) -> BoxFuture<'a, Result<(), TableError>> {
        async move {
            self.begin(TableOp::Update).await?;
            let mut sheets = self.sheets.lock().await;
            let rows = sheets.get_mut(sheet).ok_or_else(|| unknown_sheet(sheet))?;
            let position = index.zero_based() as usize;
            if position >= rows.len() {
                rows.resize(position + 1, Vec::new());
            }
            rows[position] = row;
            Ok(())
        }
        .boxed()
    }

    fn delete_row<'a>(
        &'a self,
        _token: &'a AccessToken,
        sheet: &'a str,
        index: RowIndex,
    ) -> BoxFuture<'a, Result<(), TableError>> {
        async move {
            self.begin(TableOp::Delete).await?;
            let mut sheets = self.sheets.lock().await;
            let rows = sheets.get_mut(sheet).ok_or_else(|| unknown_sheet(sheet))?;
            let position = index.zero_based() as usize;
            if position < rows.len() {
                rows.remove(position);
            }
            Ok(())
        }
        .boxed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn token() -> AccessToken {
        AccessToken::new("test-token").unwrap()
    }

    #[tokio::test]
    async fn test_append_then_find() {
        let table = MemoryTable::restaurant("Products", "Orders");
        table
            .append_row(&token(), "Products", vec![json!(10), json!("Soup")])
            .await
            .unwrap();
        table
            .append_row(&token(), "Products", vec![json!(11), json!("Tea")])
            .await
            .unwrap();

        let index = table.find_row_index(&token(), "Products", 11).await.unwrap();
        assert_eq!(index.get(), 3);
        assert_eq!(
            table.find_row_index(&token(), "Products", 99).await,
            Err(TableError::NotFound)
        );
    }

    #[tokio::test]
    async fn test_fetch_data_rows_skips_header() {
        let table = MemoryTable::restaurant("Products", "Orders");
        table.seed("Orders", vec![json!(1), json!("Ana")]).await;

        let rows = table
            .fetch_range(&token(), "Orders", SheetRange::DATA_ROWS)
            .await
            .unwrap();
        assert_eq!(rows, vec![vec![json!(1), json!("Ana")]]);
    }

    #[tokio::test]
    async fn test_delete_shifts_rows_up() {
        let table = MemoryTable::restaurant("Products", "Orders");
        for id in [1, 2, 3] {
            table.seed("Products", vec![json!(id)]).await;
        }
        let index = table.find_row_index(&token(), "Products", 2).await.unwrap();
        table.delete_row(&token(), "Products", index).await.unwrap();

        assert_eq!(
            table.find_row_index(&token(), "Products", 3).await.unwrap(),
            index
        );
        assert_eq!(table.rows("Products").await.len(), 3);
    }

    #[tokio::test]
    async fn test_scheduled_failure_fires_once() {
        let table = MemoryTable::restaurant("Products", "Orders");
        table
            .fail_next(TableOp::Append, TableError::Remote("quota".to_string()))
            .await;

        let first = table.append_row(&token(), "Products", vec![json!(1)]).await;
        assert_eq!(first, Err(TableError::Remote("quota".to_string())));
        assert!(table
            .append_row(&token(), "Products", vec![json!(1)])
            .await
            .is_ok());
        assert_eq!(table.calls(), 2);
    }

    #[tokio::test]
    async fn test_expired_token() {
        let table = MemoryTable::restaurant("Products", "Orders");
        table.set_token_expired(true);
        assert_eq!(
            table
                .fetch_range(&token(), "Products", SheetRange::DATA_ROWS)
                .await,
            Err(TableError::Auth)
        );
    }

    #[tokio::test]
    async fn test_unknown_sheet_is_remote_error() {
        let table = MemoryTable::new();
        assert!(matches!(
            table.append_row(&token(), "Menu", vec![]).await,
            Err(TableError::Remote(_))
        ));
    }
}
