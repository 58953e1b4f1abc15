//! Remote tabular store access.
//!
//! A [`RemoteTable`] addresses rows by sheet name and cell range. It keeps no
//! state about the records it stores: every call carries the caller's
//! [`AccessToken`] and row positions are re-derived on each operation.
//!
//! Two implementations are provided:
//! - [`SheetsClient`]: the Google Sheets v4 REST API over `reqwest`.
//! - [`MemoryTable`]: an in-process test double with failure injection.

mod memory;
mod sheets;

use std::fmt;

use futures::future::{BoxFuture, FutureExt};
use serde_json::Value;
use thiserror::Error;

use crate::codec::parse_id;

pub use memory::{MemoryTable, TableOp};
pub use sheets::{SheetsClient, DEFAULT_BASE_URL};

/// One sheet row: cells in column order, starting at column A.
pub type Row = Vec<Value>;

/// Number of columns in every sheet layout (A through G).
pub const COLUMN_COUNT: u8 = 7;

/// Opaque bearer credential obtained from the identity provider.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken(String);

impl AccessToken {
    /// Wraps a bearer token. Blank input yields `None`.
    pub fn new(token: impl Into<String>) -> Option<Self> {
        let token = token.into();
        let trimmed = token.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    pub fn secret(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(****)")
    }
}

/// 1-based position of a row within its sheet. Row 1 is the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RowIndex(u32);

impl RowIndex {
    /// Returns `None` for 0, which is not a valid sheet row.
    pub fn new(row: u32) -> Option<Self> {
        if row == 0 {
            None
        } else {
            Some(Self(row))
        }
    }

    pub fn get(self) -> u32 {
        self.0
    }

    /// Zero-based offset, as used by dimension ranges in batch updates.
    pub fn zero_based(self) -> u32 {
        self.0 - 1
    }
}

impl fmt::Display for RowIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A rectangular block of a sheet, open-ended downwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SheetRange {
    /// First row included (1-based).
    pub first_row: u32,
    /// Zero-based column offsets, inclusive.
    pub first_column: u8,
    pub last_column: u8,
}

impl SheetRange {
    /// The identity column, header included.
    pub const IDENTITY_COLUMN: SheetRange = SheetRange {
        first_row: 1,
        first_column: 0,
        last_column: 0,
    };

    /// Every data row of a full-width layout, header excluded.
    pub const DATA_ROWS: SheetRange = SheetRange {
        first_row: 2,
        first_column: 0,
        last_column: COLUMN_COUNT - 1,
    };

    /// A single full-width row in A1 notation, e.g. `Products!A4:G4`.
    pub fn row_to_a1(sheet: &str, row: RowIndex) -> String {
        format!(
            "{}!A{}:{}{}",
            quote_sheet_name(sheet),
            row,
            column_letter(COLUMN_COUNT - 1),
            row
        )
    }

    /// Renders the range in A1 notation, qualified with the sheet name.
    pub fn to_a1(&self, sheet: &str) -> String {
        format!(
            "{}!{}{}:{}",
            quote_sheet_name(sheet),
            column_letter(self.first_column),
            self.first_row,
            column_letter(self.last_column)
        )
    }
}

pub(crate) fn column_letter(offset: u8) -> char {
    char::from(b'A' + offset.min(25))
}

/// Quotes a sheet name for A1 notation when it contains anything other than
/// ASCII letters, digits or underscores.
pub(crate) fn quote_sheet_name(sheet: &str) -> String {
    let plain = !sheet.is_empty()
        && sheet
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');
    if plain {
        sheet.to_string()
    } else {
        format!("'{}'", sheet.replace('\'', "''"))
    }
}

/// Errors reported by a [`RemoteTable`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TableError {
    /// No usable credential, or the remote rejected it.
    #[error("access token missing or expired, sign in again")]
    Auth,
    /// The requested row does not exist.
    #[error("row not found")]
    NotFound,
    /// Transport failure or an error reported by the remote service.
    #[error("remote table error: {0}")]
    Remote(String),
}

/// Row-level access to a remote spreadsheet.
///
/// Implementations are stateless per call apart from caches of sheet
/// structure (never of row positions).
pub trait RemoteTable: Send + Sync {
    /// Reads the cells in `range` of `sheet`, row by row. Trailing empty cells
    /// and trailing empty rows may be omitted by the remote.
    fn fetch_range<'a>(
        &'a self,
        token: &'a AccessToken,
        sheet: &'a str,
        range: SheetRange,
    ) -> BoxFuture<'a, Result<Vec<Row>, TableError>>;

    /// Appends `row` after the last row of `sheet`.
    fn append_row<'a>(
        &'a self,
        token: &'a AccessToken,
        sheet: &'a str,
        row: Row,
    ) -> BoxFuture<'a, Result<(), TableError>>;

    /// Overwrites the row at `index`.
    fn update_row<'a>(
        &'a self,
        token: &'a AccessToken,
        sheet: &'a str,
        index: RowIndex,
        row: Row,
    ) -> BoxFuture<'a, Result<(), TableError>>;

    /// Removes the row at `index`; following rows shift up by one.
    fn delete_row<'a>(
        &'a self,
        token: &'a AccessToken,
        sheet: &'a str,
        index: RowIndex,
    ) -> BoxFuture<'a, Result<(), TableError>>;

    /// Scans the identity column top to bottom and returns the first row whose
    /// id equals `id`, or [`TableError::NotFound`].
    ///
    /// This is a linear scan per call; tables are expected to stay in the
    /// tens to low hundreds of rows.
    fn find_row_index<'a>(
        &'a self,
        token: &'a AccessToken,
        sheet: &'a str,
        id: i64,
    ) -> BoxFuture<'a, Result<RowIndex, TableError>> {
        async move {
            let column = self
                .fetch_range(token, sheet, SheetRange::IDENTITY_COLUMN)
                .await?;
            locate_id(&column, SheetRange::IDENTITY_COLUMN.first_row, id)
                .ok_or(TableError::NotFound)
        }
        .boxed()
    }
}

/// Position of the first row in `column` (starting at sheet row `first_row`)
/// whose leading cell parses to `id`.
pub(crate) fn locate_id(column: &[Row], first_row: u32, id: i64) -> Option<RowIndex> {
    column
        .iter()
        .position(|row| {
            row.first()
                .and_then(|cell| parse_id(cell).ok())
                .is_some_and(|found| found == id)
        })
        .and_then(|offset| u32::try_from(offset).ok())
        .and_then(|offset| RowIndex::new(first_row + offset))
}
