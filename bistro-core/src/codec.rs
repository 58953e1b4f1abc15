//! Row codec: typed records to and from flat sheet rows.
//!
//! Column order is fixed per sheet and must match the spreadsheet exactly:
//!
//! | sheet    | A  | B        | C        | D     | E      | F           | G          |
//! |----------|----|----------|----------|-------|--------|-------------|------------|
//! | Products | id | name     | category | price | status | description | created_at |
//! | Orders   | id | customer | items    | total | status | created_at  | updated_at |
//!
//! Decoding is lenient about cell contents: missing trailing cells and
//! unparsable values fall back to defaults. Only two things make a row
//! invalid: an absent or non-numeric id, and an `items` payload that is not
//! valid JSON. Invalid rows are dropped by [`decode_rows`].

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;
use serde_json::Value;
use thiserror::Error;

use crate::models::{
    Category, Identified, Order, OrderItem, OrderStatus, Product, ProductStatus,
};
use crate::table::Row;

/// The two record collections kept in the spreadsheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Products,
    Orders,
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntityKind::Products => write!(f, "products"),
            EntityKind::Orders => write!(f, "orders"),
        }
    }
}

/// Why a row could not be turned into a record.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum DecodeError {
    #[error("row has no id")]
    MissingId,
    #[error("invalid id '{0}'")]
    InvalidId(String),
    #[error("invalid items payload: {0}")]
    InvalidItems(String),
}

/// A record stored as one row of a sheet.
pub trait SheetRecord: Identified + Sized {
    /// Which sheet the record lives in.
    const KIND: EntityKind;

    /// Cells in sheet column order.
    fn encode(&self) -> Row;

    /// Builds a record from a row. Missing trailing cells are allowed.
    fn decode(row: &[Value]) -> Result<Self, DecodeError>;

    /// The record as it reads back after being written, e.g. a blank
    /// description becomes `None`.
    fn normalized(self) -> Self {
        match Self::decode(&self.encode()) {
            Ok(record) => record,
            Err(_) => self,
        }
    }
}

impl SheetRecord for Product {
    const KIND: EntityKind = EntityKind::Products;

    fn encode(&self) -> Row {
        vec![
            Value::from(self.id),
            Value::from(self.name.clone()),
            Value::from(self.category.tag()),
            amount_cell(self.price),
            Value::from(self.status.to_string()),
            Value::from(self.description.clone().unwrap_or_default()),
            timestamp_cell(self.created_at),
        ]
    }

    fn decode(row: &[Value]) -> Result<Self, DecodeError> {
        let id = parse_id(cell(row, 0))?;
        Ok(Product {
            id,
            name: text(cell(row, 1)),
            category: Category::from_tag(&text(cell(row, 2))),
            price: parse_amount(cell(row, 3)),
            status: ProductStatus::from_str(&text(cell(row, 4))).unwrap_or_default(),
            description: optional_text(cell(row, 5)),
            created_at: parse_timestamp(cell(row, 6)),
        })
    }
}

impl SheetRecord for Order {
    const KIND: EntityKind = EntityKind::Orders;

    fn encode(&self) -> Row {
        let items = serde_json::to_string(&self.items).unwrap_or_else(|_| "[]".to_string());
        vec![
            Value::from(self.id),
            Value::from(self.customer.clone().unwrap_or_default()),
            Value::from(items),
            amount_cell(self.total),
            Value::from(self.status.to_string()),
            timestamp_cell(self.created_at),
            timestamp_cell(self.updated_at),
        ]
    }

    fn decode(row: &[Value]) -> Result<Self, DecodeError> {
        let id = parse_id(cell(row, 0))?;
        Ok(Order {
            id,
            customer: optional_text(cell(row, 1)),
            items: parse_items(cell(row, 2))?,
            total: parse_amount(cell(row, 3)),
            status: OrderStatus::from_str(&text(cell(row, 4))).unwrap_or_default(),
            created_at: parse_timestamp(cell(row, 5)),
            updated_at: parse_timestamp(cell(row, 6)),
        })
    }
}

/// Decodes every row, skipping the ones that are invalid.
///
/// `first_row` is the sheet row of `rows[0]`, used only for log messages.
pub fn decode_rows<R: SheetRecord>(rows: &[Row], first_row: u32) -> Vec<R> {
    let mut records = Vec::with_capacity(rows.len());
    for (offset, row) in rows.iter().enumerate() {
        if row.iter().all(is_blank) {
            continue;
        }
        match R::decode(row) {
            Ok(record) => records.push(record),
            Err(e) => {
                tracing::warn!(
                    "Skipping {} row {}: {}",
                    R::KIND,
                    first_row as usize + offset,
                    e
                );
            }
        }
    }
    records
}

const NULL: Value = Value::Null;

fn cell(row: &[Value], index: usize) -> &Value {
    row.get(index).unwrap_or(&NULL)
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        _ => false,
    }
}

fn text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        other => other.to_string(),
    }
}

fn optional_text(value: &Value) -> Option<String> {
    let text = text(value);
    if text.trim().is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Parses an identity cell. Accepts integers, integral floats and numeric
/// text; zero is not a valid id.
pub(crate) fn parse_id(value: &Value) -> Result<i64, DecodeError> {
    let id = match value {
        Value::Null => return Err(DecodeError::MissingId),
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).and_then(|f| f.to_i64())),
        Value::String(s) if s.trim().is_empty() => return Err(DecodeError::MissingId),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>().ok().or_else(|| {
                s.parse::<f64>()
                    .ok()
                    .filter(|f| f.fract() == 0.0)
                    .and_then(|f| f.to_i64())
            })
        }
        _ => None,
    };
    match id {
        Some(id) if id != 0 => Ok(id),
        _ => Err(DecodeError::InvalidId(text(value))),
    }
}

/// Reads an amount from a number or numeric text.
pub(crate) fn amount_from_value(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => Decimal::from_str(&n.to_string())
            .ok()
            .or_else(|| n.as_f64().and_then(Decimal::from_f64)),
        Value::String(s) => Decimal::from_str(s.trim()).ok(),
        _ => None,
    }
}

/// Parses a money cell. Blank, unparsable and negative values become zero.
fn parse_amount(value: &Value) -> Decimal {
    match amount_from_value(value) {
        Some(amount) if amount >= Decimal::ZERO => amount,
        _ => Decimal::ZERO,
    }
}

/// A number when `amount` survives the trip through `f64`, decimal text
/// otherwise.
pub(crate) fn amount_cell(amount: Decimal) -> Value {
    amount
        .to_f64()
        .filter(|f| Decimal::from_f64(*f) == Some(amount))
        .and_then(serde_json::Number::from_f64)
        .map(Value::Number)
        .unwrap_or_else(|| Value::from(amount.to_string()))
}

fn parse_items(value: &Value) -> Result<Vec<OrderItem>, DecodeError> {
    let items: Vec<OrderItem> = match value {
        Value::Null => return Ok(Vec::new()),
        Value::String(s) if s.trim().is_empty() => return Ok(Vec::new()),
        Value::String(s) => {
            serde_json::from_str(s).map_err(|e| DecodeError::InvalidItems(e.to_string()))?
        }
        other => {
            return Err(DecodeError::InvalidItems(format!(
                "expected JSON text, found {}",
                other
            )))
        }
    };
    if let Some(item) = items.iter().find(|item| item.quantity == 0) {
        return Err(DecodeError::InvalidItems(format!(
            "item '{}' has zero quantity",
            item.name
        )));
    }
    Ok(items)
}

fn timestamp_cell(timestamp: Option<DateTime<Utc>>) -> Value {
    match timestamp {
        Some(ts) => Value::from(ts.to_rfc3339_opts(SecondsFormat::Millis, true)),
        None => Value::from(""),
    }
}

/// Parses a timestamp cell: RFC 3339 text, `YYYY-MM-DD HH:MM:SS` text (taken
/// as UTC), or a spreadsheet serial date number.
fn parse_timestamp(value: &Value) -> Option<DateTime<Utc>> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                return None;
            }
            DateTime::parse_from_rfc3339(s)
                .map(|ts| ts.with_timezone(&Utc))
                .ok()
                .or_else(|| {
                    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
                        .ok()
                        .map(|naive| Utc.from_utc_datetime(&naive))
                })
        }
        Value::Number(n) => n.as_f64().and_then(from_serial_date),
        _ => None,
    }
}

/// Spreadsheet serial dates count days since 1899-12-30.
fn from_serial_date(serial: f64) -> Option<DateTime<Utc>> {
    if !serial.is_finite() || serial < 0.0 {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?.and_hms_opt(0, 0, 0)?;
    let millis = (serial * 86_400_000.0).round().to_i64()?;
    let naive = epoch.checked_add_signed(Duration::milliseconds(millis))?;
    Some(Utc.from_utc_datetime(&naive))
}
