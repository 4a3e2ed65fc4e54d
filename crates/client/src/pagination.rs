//! Page-walking collection over list endpoints.
//!
//! A list endpoint answers with either a bare JSON array (the complete
//! collection) or an envelope `{ "results": [...], "next": url|null }`.
//! [`collect_all`] follows `next` links until they run out and returns the
//! concatenated items in server page order.

use std::collections::HashSet;

use async_trait::async_trait;
use reqwest::Url;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// Coarse classification of a [`CollectError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Transport error, non-success status, or a misbehaving page chain.
    Fetch,
    /// A body that matches neither supported page shape.
    Parse,
}

/// Errors from a collection walk.
///
/// `Clone` so a single failed walk can be reported to every caller that
/// was waiting on it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CollectError {
    /// The request never produced a response (network, DNS, TLS, timeout).
    #[error("Request to {url} failed: {reason}")]
    Transport { url: String, reason: String },

    /// The server answered with a non-2xx status.
    #[error("{url} returned HTTP {status}: {body}")]
    Status { url: String, status: u16, body: String },

    /// A URL could not be built or resolved.
    #[error("Invalid URL {url}: {reason}")]
    InvalidUrl { url: String, reason: String },

    /// The walk needed more pages than allowed.
    #[error("Page limit of {limit} exceeded while collecting {start_url}")]
    PageLimitExceeded { start_url: String, limit: usize },

    /// A `next` link pointed at a page already fetched in this walk.
    #[error("Pagination cycle: {url} was already fetched")]
    Cycle { url: String },

    /// The body was not a bare collection or a results envelope, or its
    /// items did not decode.
    #[error("Unparsable page from {url}: {reason}")]
    Parse { url: String, reason: String },
}

impl CollectError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Parse { .. } => FailureKind::Parse,
            _ => FailureKind::Fetch,
        }
    }
}

/// Something that can GET a URL and hand back its JSON body.
///
/// Implementations must map non-success statuses to
/// [`CollectError::Status`] and unreadable bodies to
/// [`CollectError::Parse`].
#[async_trait]
pub trait PageSource: Send + Sync {
    async fn fetch_page(&self, url: &str) -> Result<Value, CollectError>;
}

// ---------------------------------------------------------------------------
// Page shapes
// ---------------------------------------------------------------------------

/// One decoded list response.
#[derive(Debug, PartialEq)]
pub enum Page<T> {
    /// A bare array: the complete collection.
    Bare(Vec<T>),
    /// A results envelope with an optional link to the following page.
    Envelope { results: Vec<T>, next: Option<String> },
}

/// Classify and decode a list response body.
pub fn parse_page<T: DeserializeOwned>(url: &str, body: Value) -> Result<Page<T>, CollectError> {
    let parse_err = |reason: String| CollectError::Parse {
        url: url.to_string(),
        reason,
    };

    match body {
        Value::Array(items) => {
            let items = decode_items(Value::Array(items)).map_err(parse_err)?;
            Ok(Page::Bare(items))
        }
        Value::Object(mut map) => {
            let results = match map.remove("results") {
                Some(v @ Value::Array(_)) => decode_items(v).map_err(parse_err)?,
                Some(other) => {
                    return Err(parse_err(format!(
                        "\"results\" is {}, expected an array",
                        json_type(&other)
                    )))
                }
                None => return Err(parse_err("object has no \"results\" field".into())),
            };
            let next = match map.remove("next") {
                None | Some(Value::Null) => None,
                Some(Value::String(s)) if s.trim().is_empty() => None,
                Some(Value::String(s)) => Some(s),
                Some(other) => {
                    return Err(parse_err(format!(
                        "\"next\" is {}, expected a string or null",
                        json_type(&other)
                    )))
                }
            };
            Ok(Page::Envelope { results, next })
        }
        other => Err(parse_err(format!(
            "body is {}, expected an array or an object",
            json_type(&other)
        ))),
    }
}

fn decode_items<T: DeserializeOwned>(items: Value) -> Result<Vec<T>, String> {
    serde_json::from_value(items).map_err(|e| format!("item decode failed: {e}"))
}

fn json_type(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Resolve a `next` link against the page that returned it.
fn resolve_next(current: &str, next: &str) -> Result<String, CollectError> {
    let invalid = |reason: String| CollectError::InvalidUrl {
        url: next.to_string(),
        reason,
    };
    let base = Url::parse(current).map_err(|e| invalid(format!("base {current}: {e}")))?;
    base.join(next)
        .map(String::from)
        .map_err(|e| invalid(e.to_string()))
}

// ---------------------------------------------------------------------------
// Collector
// ---------------------------------------------------------------------------

/// Fetch every page starting at `start_url` and concatenate the items.
///
/// Stops when a page has no `next` link, or immediately when a page is a
/// bare array (that body is the complete result and replaces anything
/// collected so far). Fails if any request fails, if any body is
/// unparsable, if a `next` link revisits a page, or if more than
/// `max_pages` pages would be fetched.
pub async fn collect_all<T, S>(
    source: &S,
    start_url: &str,
    max_pages: usize,
) -> Result<Vec<T>, CollectError>
where
    T: DeserializeOwned,
    S: PageSource + ?Sized,
{
    let mut items: Vec<T> = Vec::new();
    let mut visited: HashSet<String> = HashSet::new();
    let mut next_url = Some(start_url.to_string());
    let mut pages = 0usize;

    while let Some(url) = next_url.take() {
        if pages >= max_pages {
            return Err(CollectError::PageLimitExceeded {
                start_url: start_url.to_string(),
                limit: max_pages,
            });
        }
        if !visited.insert(url.clone()) {
            return Err(CollectError::Cycle { url });
        }

        let body = source.fetch_page(&url).await?;
        pages += 1;

        match parse_page::<T>(&url, body)? {
            Page::Bare(all) => {
                if !items.is_empty() {
                    tracing::warn!(
                        url = %url,
                        discarded = items.len(),
                        "Bare collection after paginated pages, replacing accumulated items",
                    );
                }
                tracing::debug!(url = %url, page = pages, count = all.len(), "Fetched bare collection");
                items = all;
            }
            Page::Envelope { results, next } => {
                tracing::debug!(url = %url, page = pages, count = results.len(), "Fetched page");
                items.extend(results);
                next_url = next.map(|n| resolve_next(&url, &n)).transpose()?;
            }
        }
    }

    tracing::info!(start_url, items = items.len(), pages, "Collection complete");
    Ok(items)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
