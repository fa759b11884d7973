use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use super::{error_for_status, read_error, Platform};
use crate::error::{ClientError, ClientResult};

/// Row-not-found code of the REST layer when a single object is requested
const NO_ROWS_CODE: &str = "PGRST116";

/// A table query built up from filters, executed by one of the terminal methods
pub struct Query<'a> {
    platform: &'a Platform,
    table: &'static str,
    params: Vec<(String, String)>,
}

impl<'a> Query<'a> {
    pub(crate) fn new(platform: &'a Platform, table: &'static str) -> Self {
        Self {
            platform,
            table,
            params: Vec::new(),
        }
    }

    pub fn select(mut self, columns: &str) -> Self {
        let compact: String = columns.split_whitespace().collect();
        self.params.push(("select".to_string(), compact));
        self
    }

    pub fn eq(mut self, column: &str, value: &str) -> Self {
        self.params.push((column.to_string(), format!("eq.{}", value)));
        self
    }

    pub fn neq(mut self, column: &str, value: &str) -> Self {
        self.params.push((column.to_string(), format!("neq.{}", value)));
        self
    }

    pub fn is_in(mut self, column: &str, values: &[String]) -> Self {
        let quoted: Vec<String> = values.iter().map(|v| format!("\"{}\"", v)).collect();
        self.params
            .push((column.to_string(), format!("in.({})", quoted.join(","))));
        self
    }

    pub fn order(mut self, column: &str, ascending: bool) -> Self {
        let direction = if ascending { "asc" } else { "desc" };
        self.params
            .push(("order".to_string(), format!("{}.{}", column, direction)));
        self
    }

    pub fn limit(mut self, count: usize) -> Self {
        self.params.push(("limit".to_string(), count.to_string()));
        self
    }

    pub fn table(&self) -> &'static str {
        self.table
    }

    /// All matching rows
    pub async fn fetch<T: DeserializeOwned>(self) -> ClientResult<Vec<T>> {
        let response = error_for_status(self.request(Method::GET).send().await?).await?;
        Ok(response.json().await?)
    }

    /// Exactly one row; a missing row is `NotFound`
    pub async fn single<T: DeserializeOwned>(self) -> ClientResult<T> {
        let table = self.table;
        let response = self
            .request(Method::GET)
            .header("Accept", "application/vnd.pgrst.object+json")
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response.json().await?);
        }

        let (message, code) = read_error(response).await;
        if status == StatusCode::NOT_ACCEPTABLE && code.as_deref() == Some(NO_ROWS_CODE) {
            return Err(ClientError::not_found(table, message));
        }
        Err(ClientError::remote(status.as_u16(), message))
    }

    /// First matching row, if any
    pub async fn maybe_single<T: DeserializeOwned>(self) -> ClientResult<Option<T>> {
        let rows: Vec<T> = self.limit(1).fetch().await?;
        Ok(rows.into_iter().next())
    }

    /// Insert rows and return what was stored
    pub async fn insert<T: DeserializeOwned>(self, rows: &Value) -> ClientResult<Vec<T>> {
        let response = self
            .request(Method::POST)
            .header("Prefer", "return=representation")
            .json(rows)
            .send()
            .await?;
        let response = error_for_status(response).await?;
        Ok(response.json().await?)
    }

    /// Insert rows without reading them back
    pub async fn insert_only(self, rows: &Value) -> ClientResult<()> {
        let response = self
            .request(Method::POST)
            .header("Prefer", "return=minimal")
            .json(rows)
            .send()
            .await?;
        error_for_status(response).await?;
        Ok(())
    }

    /// Insert or merge on primary key
    pub async fn upsert(self, rows: &Value) -> ClientResult<()> {
        let response = self
            .request(Method::POST)
            .header("Prefer", "resolution=merge-duplicates,return=minimal")
            .json(rows)
            .send()
            .await?;
        error_for_status(response).await?;
        Ok(())
    }

    /// Patch every matching row
    pub async fn update(self, patch: &Value) -> ClientResult<()> {
        let response = self
            .request(Method::PATCH)
            .header("Prefer", "return=minimal")
            .json(patch)
            .send()
            .await?;
        error_for_status(response).await?;
        Ok(())
    }

    /// Delete every matching row
    pub async fn delete(self) -> ClientResult<()> {
        let response = self.request(Method::DELETE).send().await?;
        error_for_status(response).await?;
        Ok(())
    }

    fn request(&self, method: Method) -> RequestBuilder {
        let url = self.platform.config().rest_url(self.table);
        debug!(table = self.table, method = %method, params = ?self.params, "REST request");
        self.platform
            .http()
            .request(method, url)
            .headers(self.platform.headers())
            .query(&self.params)
    }
}
