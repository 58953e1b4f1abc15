//! Google Sheets v4 REST client.
//!
//! Values are read unformatted (numbers as numbers, dates as serial numbers)
//! and written with `USER_ENTERED` so the spreadsheet parses them the same way
//! it would if they were typed in.

use std::collections::HashMap;
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt};
use reqwest::{RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tokio::sync::Mutex;

use super::{quote_sheet_name, AccessToken, RemoteTable, Row, RowIndex, SheetRange, TableError};

/// Default endpoint for the spreadsheets collection.
pub const DEFAULT_BASE_URL: &str = "https://sheets.googleapis.com/v4/spreadsheets";

/// Upper bound on a single API request, connection included.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Response body of `values.get`.
#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Row>,
}

/// Response body of `spreadsheets.get` restricted to sheet properties.
#[derive(Debug, Deserialize)]
struct SpreadsheetMeta {
    #[serde(default)]
    sheets: Vec<SheetMeta>,
}

#[derive(Debug, Deserialize)]
struct SheetMeta {
    properties: SheetProperties,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SheetProperties {
    sheet_id: i64,
    title: String,
}

/// Error envelope returned by Google APIs.
#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(default)]
    message: String,
}

/// Client for a single spreadsheet.
///
/// The numeric id of each sheet (needed to delete rows) is looked up once and
/// cached for the lifetime of the client; sheet names are assumed not to
/// change during a session.
#[derive(Debug)]
pub struct SheetsClient {
    http: reqwest::Client,
    base_url: String,
    spreadsheet_id: String,
    sheet_ids: Mutex<HashMap<String, i64>>,
}

impl SheetsClient {
    pub fn new(spreadsheet_id: impl Into<String>) -> Self {
        Self::with_base_url(spreadsheet_id, DEFAULT_BASE_URL)
    }

    /// Creates a client against a different endpoint, e.g. a local mock.
    pub fn with_base_url(spreadsheet_id: impl Into<String>, base_url: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(REQUEST_TIMEOUT)
                .build()
                .unwrap_or_default(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            spreadsheet_id: spreadsheet_id.into(),
            sheet_ids: Mutex::new(HashMap::new()),
        }
    }

    pub fn spreadsheet_id(&self) -> &str {
        &self.spreadsheet_id
    }

    /// Forgets cached sheet ids so the next delete looks them up again.
    pub async fn invalidate_sheet_ids(&self) {
        self.sheet_ids.lock().await.clear();
    }

    fn spreadsheet_url(&self) -> String {
        format!("{}/{}", self.base_url, self.spreadsheet_id)
    }

    fn values_url(&self, range: &str) -> String {
        format!(
            "{}/values/{}",
            self.spreadsheet_url(),
            urlencoding::encode(range)
        )
    }

    async fn send(&self, request: RequestBuilder, token: &AccessToken) -> Result<Response, TableError> {
        let response = request
            .bearer_auth(token.secret())
            .send()
            .await
            .map_err(|e| TableError::Remote(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(TableError::Auth);
        }

        let message = response
            .json::<ApiErrorBody>()
            .await
            .map(|body| body.error.message)
            .unwrap_or_default();
        if message.is_empty() {
            Err(TableError::Remote(format!("server returned status {}", status)))
        } else {
            Err(TableError::Remote(format!("{}: {}", status, message)))
        }
    }

    /// Resolves the numeric id of `sheet`, fetching the spreadsheet's sheet
    /// list on first use.
    async fn sheet_id(&self, token: &AccessToken, sheet: &str) -> Result<i64, TableError> {
        if let Some(id) = self.sheet_ids.lock().await.get(sheet) {
            return Ok(*id);
        }

        let request = self
            .http
            .get(self.spreadsheet_url())
            .query(&[("fields", "sheets.properties(sheetId,title)")]);
        let meta: SpreadsheetMeta = self
            .send(request, token)
            .await?
            .json()
            .await
            .map_err(|e| TableError::Remote(e.to_string()))?;

        let mut ids = self.sheet_ids.lock().await;
        for entry in meta.sheets {
            ids.insert(entry.properties.title, entry.properties.sheet_id);
        }
        tracing::debug!("Cached ids for {} sheet(s)", ids.len());

        ids.get(sheet)
            .copied()
            .ok_or_else(|| TableError::Remote(format!("sheet '{}' not found in spreadsheet", sheet)))
    }
}

impl RemoteTable for SheetsClient {
    fn fetch_range<'a>(
        &'a self,
        token: &'a AccessToken,
        sheet: &'a str,
        range: SheetRange,
    ) -> BoxFuture<'a, Result<Vec<Row>, TableError>> {
        async move {
            let a1 = range.to_a1(sheet);
            let request = self.http.get(self.values_url(&a1)).query(&[
                ("majorDimension", "ROWS"),
                ("valueRenderOption", "UNFORMATTED_VALUE"),
                ("dateTimeRenderOption", "SERIAL_NUMBER"),
            ]);
            let body: ValueRange = self
                .send(request, token)
                .await?
                .json()
                .await
                .map_err(|e| TableError::Remote(e.to_string()))?;
            tracing::debug!("Fetched {} row(s) from {}", body.values.len(), a1);
            Ok(body.values)
        }
        .boxed()
    }

    fn append_row<'a>(
        &'a self,
        token: &'a AccessToken,
        sheet: &'a str,
        row: Row,
    ) -> BoxFuture<'a, Result<(), TableError>> {
        async move {
            let url = format!("{}:append", self.values_url(&quote_sheet_name(sheet)));
            let request = self
                .http
                .post(url)
                .query(&[
                    ("valueInputOption", "USER_ENTERED"),
                    ("insertDataOption", "INSERT_ROWS"),
                ])
                .json(&json!({ "values": [row] }));
            self.send(request, token).await?;
            tracing::debug!("Appended row to {}", sheet);
            Ok(())
        }
        .boxed()
    }

    fn update_row<'a>(
        &'a self,
        token: &'a AccessToken,
        sheet: &'a str,
        index: RowIndex,
        row: Row,
    ) -> BoxFuture<'a, Result<(), TableError>> {
        async move {
            let a1 = SheetRange::row_to_a1(sheet, index);
            let request = self
                .http
                .put(self.values_url(&a1))
                .query(&[("valueInputOption", "USER_ENTERED")])
                .json(&json!({
                    "range": a1,
                    "majorDimension": "ROWS",
                    "values": [row],
                }));
            self.send(request, token).await?;
            tracing::debug!("Updated {}", a1);
            Ok(())
        }
        .boxed()
    }

    fn delete_row<'a>(
        &'a self,
        token: &'a AccessToken,
        sheet: &'a str,
        index: RowIndex,
    ) -> BoxFuture<'a, Result<(), TableError>> {
        async move {
            let sheet_id = self.sheet_id(token, sheet).await?;
            let url = format!("{}:batchUpdate", self.spreadsheet_url());
            let request = self.http.post(url).json(&json!({
                "requests": [{
                    "deleteDimension": {
                        "range": {
                            "sheetId": sheet_id,
                            "dimension": "ROWS",
                            "startIndex": index.zero_based(),
                            "endIndex": index.get(),
                        }
                    }
                }]
            }));
            self.send(request, token).await?;
            tracing::debug!("Deleted row {} of {}", index, sheet);
            Ok(())
        }
        .boxed()
    }
}
