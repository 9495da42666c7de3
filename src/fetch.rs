//! Paginated story fetch.
//!
//! Stage 1 of the generation run. Pulls every item of a CMS collection, one
//! page at a time, through the [`PageSource`] seam. The production source is
//! [`HttpSource`]; tests script pages with a fake.
//!
//! ## Termination
//!
//! Pagination stops at the first of:
//!
//! 1. a page with zero items,
//! 2. a short page (fewer items than requested),
//! 3. the running offset reaching a reported `pagination.total`.
//!
//! Upstream `total` values are sometimes stale or missing entirely, so a
//! short page ends the fetch even when `total` says otherwise. Pages are
//! requested strictly in sequence.
//!
//! ## Wire format
//!
//! ```text
//! GET <base>/collections/{id}/items?offset=0&limit=100
//! Authorization: Bearer <token>
//! accept-version: 2.0.0
//!
//! { "items": [ { "id", "slug", "fieldData": { ... } } ],
//!   "pagination": { "total", "offset", "limit" } }
//! ```

use crate::config::{ConfigError, SourceConfig};
use crate::types::{Story, normalize_stories};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

/// Upstream per-request item limit.
pub const MAX_PAGE_SIZE: usize = 100;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("upstream returned HTTP {status}: {body}")]
    Upstream { status: u16, body: String },
    #[error("unexpected response shape: {0}")]
    Schema(String),
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Pagination metadata as reported by the upstream. Every field is advisory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct Pagination {
    #[serde(default)]
    pub total: Option<usize>,
    #[serde(default)]
    pub offset: Option<usize>,
    #[serde(default)]
    pub limit: Option<usize>,
}

/// One page of a collection.
#[derive(Debug, Clone, Default)]
pub struct Page {
    pub items: Vec<Story>,
    pub pagination: Option<Pagination>,
}

/// A paginated collection source.
#[async_trait]
pub trait PageSource: Send + Sync {
    /// Fetch up to `limit` items starting at `offset`.
    async fn fetch_page(&self, offset: usize, limit: usize) -> Result<Page, FetchError>;
}

/// Clamp a configured page size into `1..=MAX_PAGE_SIZE`.
pub fn clamp_page_size(page_size: usize) -> usize {
    page_size.clamp(1, MAX_PAGE_SIZE)
}

/// Fetch every story in the collection.
///
/// Featured flags are normalized before returning.
pub async fn fetch_all<S>(source: &S, page_size: usize) -> Result<Vec<Story>, FetchError>
where
    S: PageSource + ?Sized,
{
    let limit = clamp_page_size(page_size);
    let mut stories: Vec<Story> = Vec::new();
    let mut offset = 0;

    loop {
        let page = source.fetch_page(offset, limit).await?;
        let count = page.items.len();
        let total = page.pagination.and_then(|p| p.total);
        info!(
            offset,
            count,
            fetched = stories.len() + count,
            total = ?total,
            "Fetched page"
        );

        if count == 0 {
            debug!(offset, "Empty page, end of collection");
            break;
        }

        stories.extend(page.items);
        offset += count;

        if count < limit {
            debug!(count, limit, "Short page, end of collection");
            break;
        }
        if let Some(total) = total
            && offset >= total
        {
            debug!(offset, total, "Reached reported total");
            break;
        }
    }

    normalize_stories(&mut stories);

    let featured: Vec<&str> = stories
        .iter()
        .filter(|s| s.is_featured())
        .map(Story::label)
        .collect();
    debug!(?featured, "Featured stories in collection");
    info!(count = stories.len(), "Fetched collection");

    Ok(stories)
}

/// Parse one page body.
///
/// The body must be a JSON object with an `items` array whose entries carry
/// `fieldData` (or the legacy `fields`). `pagination` is optional; a
/// malformed one is ignored rather than failing the page.
pub fn parse_page(body: &str) -> Result<Page, FetchError> {
    let json: Value = serde_json::from_str(body)
        .map_err(|e| FetchError::Schema(format!("response is not JSON: {e}")))?;

    let items = json
        .get("items")
        .and_then(Value::as_array)
        .ok_or_else(|| FetchError::Schema("response has no items array".into()))?;

    let items = items
        .iter()
        .enumerate()
        .map(|(index, item)| parse_item(index, item))
        .collect::<Result<Vec<_>, _>>()?;

    let pagination = json
        .get("pagination")
        .and_then(|p| Pagination::deserialize(p).ok());

    Ok(Page { items, pagination })
}

fn parse_item(index: usize, item: &Value) -> Result<Story, FetchError> {
    if item.get("fieldData").is_none() && item.get("fields").is_none() {
        return Err(FetchError::Schema(format!(
            "item at index {index} has no fieldData"
        )));
    }
    Story::deserialize(item).map_err(|e| FetchError::Schema(format!("item at index {index}: {e}")))
}

/// Collection items endpoint for a base URL and collection id.
pub fn items_url(base_url: &str, collection_id: &str) -> String {
    format!(
        "{}/collections/{}/items",
        base_url.trim_end_matches('/'),
        collection_id
    )
}

/// [`PageSource`] backed by the CMS REST API.
#[derive(Debug, Clone)]
pub struct HttpSource {
    client: reqwest::Client,
    items_url: String,
    token: String,
    api_version: String,
}

impl HttpSource {
    pub fn new(config: &SourceConfig, token: impl Into<String>) -> Result<Self, FetchError> {
        let collection_id = config.require_collection_id()?;
        let mut builder =
            reqwest::Client::builder().user_agent(concat!("storyfront/", env!("CARGO_PKG_VERSION")));
        if let Some(secs) = config.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }
        Ok(Self {
            client: builder.build()?,
            items_url: items_url(&config.base_url, collection_id),
            token: token.into(),
            api_version: config.api_version.clone(),
        })
    }
}

#[async_trait]
impl PageSource for HttpSource {
    async fn fetch_page(&self, offset: usize, limit: usize) -> Result<Page, FetchError> {
        debug!(url = %self.items_url, offset, limit, "Requesting page");
        let response = self
            .client
            .get(&self.items_url)
            .query(&[("offset", offset), ("limit", limit)])
            .bearer_auth(&self.token)
            .header("accept-version", &self.api_version)
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(FetchError::Upstream {
                status: status.as_u16(),
                body,
            });
        }
        parse_page(&body)
    }
}
