//! PostgREST client (the Supabase data API).
//!
//! Endpoints used, all under `{url}/rest/v1/{table}`:
//!   POST  ?on_conflict=a,b   upsert (Prefer: resolution=merge-duplicates)
//!   POST                     insert
//!   GET   ?select=*&c=eq.v   select
//!   PATCH ?c=eq.v            update
//!   DELETE ?c=eq.v           delete
//!   HEAD  (Prefer: count=exact, read Content-Range)

use async_trait::async_trait;
use reqwest::header::CONTENT_RANGE;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, instrument};
use url::Url;

use crate::error::{DbError, Result};
use crate::store::{Filter, Store};
use crate::Row;

/// Postgres `unique_violation`.
const UNIQUE_VIOLATION: &str = "23505";

/// Connection settings for a PostgREST endpoint.
#[derive(Debug, Clone)]
pub struct RestConfig {
    /// Project URL, e.g. `https://<ref>.supabase.co`.
    pub url: Url,
    /// Service-role or anon key, sent as `apikey` and bearer token.
    pub api_key: SecretString,
    pub timeout: Duration,
}

impl RestConfig {
    pub fn new(url: Url, api_key: SecretString) -> Self {
        Self { url, api_key, timeout: Duration::from_secs(30) }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// PostgREST-backed [`Store`].
#[derive(Debug, Clone)]
pub struct RestStore {
    client: Client,
    base: Url,
    api_key: SecretString,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    code: Option<String>,
    message: Option<String>,
    details: Option<String>,
    hint: Option<String>,
}

impl RestStore {
    pub fn new(config: RestConfig) -> Result<Self> {
        let mut root = config.url;
        if !root.path().ends_with('/') {
            let path = format!("{}/", root.path());
            root.set_path(&path);
        }
        let base = root
            .join("rest/v1/")
            .map_err(|e| DbError::Config(format!("invalid storage URL: {e}")))?;

        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("bencao/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { client, base, api_key: config.api_key })
    }

    fn table_url(&self, table: &str) -> Result<Url> {
        self.base
            .join(table)
            .map_err(|e| DbError::Config(format!("invalid table name {table:?}: {e}")))
    }

    fn request(&self, method: Method, table: &str) -> Result<RequestBuilder> {
        let key = self.api_key.expose_secret();
        Ok(self
            .client
            .request(method, self.table_url(table)?)
            .header("apikey", key)
            .bearer_auth(key))
    }

    async fn read_rows(resp: Response) -> Result<Vec<Row>> {
        let resp = check_status(resp).await?;
        let rows: Vec<Row> = resp.json().await?;
        Ok(rows)
    }
}

#[async_trait]
impl Store for RestStore {
    fn name(&self) -> &str {
        "postgrest"
    }

    #[instrument(skip(self, row))]
    async fn upsert(&self, table: &str, row: Row, conflict_keys: &[&str]) -> Result<Row> {
        let resp = self
            .request(Method::POST, table)?
            .query(&[("on_conflict", conflict_keys.join(","))])
            .header("Prefer", "resolution=merge-duplicates,return=representation")
            .json(&[row])
            .send()
            .await?;

        let mut rows = Self::read_rows(resp).await?;
        if rows.is_empty() {
            return Err(DbError::InvalidResponse(format!("upsert into {table} returned no rows")));
        }
        Ok(rows.swap_remove(0))
    }

    #[instrument(skip(self))]
    async fn select(&self, table: &str, filters: &[Filter], limit: Option<usize>) -> Result<Vec<Row>> {
        let mut params = vec![("select".to_string(), "*".to_string())];
        params.extend(filter_params(filters));
        if let Some(n) = limit {
            params.push(("limit".to_string(), n.to_string()));
        }

        let resp = self.request(Method::GET, table)?.query(&params).send().await?;
        let rows = Self::read_rows(resp).await?;
        debug!(table, n = rows.len(), "select returned rows");
        Ok(rows)
    }

    #[instrument(skip(self, row))]
    async fn insert(&self, table: &str, row: Row) -> Result<Row> {
        let resp = self
            .request(Method::POST, table)?
            .header("Prefer", "return=representation")
            .json(&[row])
            .send()
            .await?;

        let mut rows = Self::read_rows(resp).await?;
        if rows.is_empty() {
            return Err(DbError::InvalidResponse(format!("insert into {table} returned no rows")));
        }
        Ok(rows.swap_remove(0))
    }

    #[instrument(skip(self, patch))]
    async fn update(&self, table: &str, filters: &[Filter], patch: Row) -> Result<Vec<Row>> {
        let resp = self
            .request(Method::PATCH, table)?
            .query(&filter_params(filters))
            .header("Prefer", "return=representation")
            .json(&patch)
            .send()
            .await?;
        Self::read_rows(resp).await
    }

    #[instrument(skip(self))]
    async fn delete(&self, table: &str, filters: &[Filter]) -> Result<Vec<Row>> {
        if filters.is_empty() {
            return Err(DbError::Config(format!("refusing unfiltered delete on {table}")));
        }
        let resp = self
            .request(Method::DELETE, table)?
            .query(&filter_params(filters))
            .header("Prefer", "return=representation")
            .send()
            .await?;
        Self::read_rows(resp).await
    }

    #[instrument(skip(self))]
    async fn count(&self, table: &str) -> Result<usize> {
        let resp = self
            .request(Method::HEAD, table)?
            .query(&[("select", "id")])
            .header("Prefer", "count=exact")
            .send()
            .await?;
        let resp = check_status(resp).await?;

        let range = resp
            .headers()
            .get(CONTENT_RANGE)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| DbError::InvalidResponse(format!("count of {table}: no Content-Range header")))?;
        parse_content_range_total(range)
            .ok_or_else(|| DbError::InvalidResponse(format!("count of {table}: bad Content-Range {range:?}")))
    }
}

/// Turn equality filters into PostgREST `column=eq.value` query pairs.
fn filter_params(filters: &[Filter]) -> Vec<(String, String)> {
    filters
        .iter()
        .map(|f| {
            let value = match &f.value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (f.column.clone(), format!("eq.{value}"))
        })
        .collect()
}

/// `0-24/3573` → 3573, `*/0` → 0.
fn parse_content_range_total(range: &str) -> Option<usize> {
    range.rsplit('/').next()?.trim().parse().ok()
}

async fn check_status(resp: Response) -> Result<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let body = resp.text().await.unwrap_or_default();
    let parsed: Option<ApiErrorBody> = serde_json::from_str(&body).ok();
    let code = parsed.as_ref().and_then(|b| b.code.clone());
    let message = match parsed {
        Some(b) => {
            let mut msg = b.message.unwrap_or_else(|| status.to_string());
            if let Some(details) = b.details.filter(|d| !d.is_empty()) {
                msg.push_str(&format!(" ({details})"));
            }
            if let Some(hint) = b.hint.filter(|h| !h.is_empty()) {
                msg.push_str(&format!(" hint: {hint}"));
            }
            msg
        }
        None if body.trim().is_empty() => status.to_string(),
        None => body,
    };

    if status == StatusCode::CONFLICT || code.as_deref() == Some(UNIQUE_VIOLATION) {
        return Err(DbError::Duplicate(message));
    }
    Err(DbError::Api { status: status.as_u16(), code, message })
}
