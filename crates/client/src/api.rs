//! REST API client for the aid backend.
//!
//! Wraps the list, write, photo upload, and statistics endpoints using
//! [`reqwest`]. List calls walk every page via
//! [`collect_all`](crate::pagination::collect_all); write calls surface the
//! server's JSON error body on rejection.

use async_trait::async_trait;
use bansos_core::recipient::{AidTypeRef, DistrictRef, Photo, RecipientPayload, RecipientRecord};
use bansos_core::statistics::Statistics;
use bansos_core::types::DbId;
use reqwest::Url;
use serde_json::Value;

use crate::config::ClientConfig;
use crate::pagination::{collect_all, CollectError, PageSource};

/// Maximum number of photos accepted in one upload batch.
pub const MAX_PHOTOS_PER_UPLOAD: usize = 10;

const RECIPIENTS_PATH: &str = "penerima-bantuan/";
const DISTRICTS_PATH: &str = "kecamatan/";
const AID_TYPES_PATH: &str = "jenis-bantuan/";
const PHOTOS_PATH: &str = "photos/";
const PHOTO_UPLOAD_PATH: &str = "photos/upload/";
const STATISTICS_PATH: &str = "penerima-bantuan/statistics/";

/// Errors from the write / detail endpoints.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The HTTP request itself failed (network, DNS, TLS, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The server rejected the request with a JSON error body
    /// (typically field validation messages).
    #[error("API rejected request ({status}): {body}")]
    Rejected {
        status: u16,
        body: Value,
    },

    /// Non-2xx status with a body that is not JSON.
    #[error("API error ({status}): {body}")]
    Status {
        status: u16,
        body: String,
    },

    #[error("Too many photos in one upload: {count} (max {max})")]
    TooManyPhotos { count: usize, max: usize },
}

impl ApiError {
    /// Field-level validation messages from a rejected write, if any.
    ///
    /// Returns `(field, message)` pairs for the usual
    /// `{"field": ["message", ...]}` error shape.
    pub fn field_errors(&self) -> Vec<(String, String)> {
        let Self::Rejected { body: Value::Object(map), .. } = self else {
            return Vec::new();
        };
        map.iter()
            .flat_map(|(field, v)| {
                let messages: Vec<String> = match v {
                    Value::Array(items) => items
                        .iter()
                        .map(|m| m.as_str().map(String::from).unwrap_or_else(|| m.to_string()))
                        .collect(),
                    Value::String(s) => vec![s.clone()],
                    other => vec![other.to_string()],
                };
                messages.into_iter().map(move |m| (field.clone(), m))
            })
            .collect()
    }
}

/// A photo file queued for upload.
#[derive(Debug, Clone)]
pub struct PhotoUpload {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// HTTP client for one aid API deployment.
#[derive(Debug, Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    config: ClientConfig,
}

impl ApiClient {
    /// Create a client with its own connection pool and the configured
    /// request timeout.
    pub fn new(config: ClientConfig) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self { client, config })
    }

    /// Create a client reusing an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, config: ClientConfig) -> Self {
        Self { client, config }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    // ---- list endpoints (all pages) ----

    /// URL of the recipient list, optionally narrowed by server-side search.
    pub fn recipients_url(&self, search: Option<&str>) -> Result<String, CollectError> {
        let base = self.config.endpoint(RECIPIENTS_PATH);
        match search.map(str::trim).filter(|s| !s.is_empty()) {
            None => Ok(base),
            Some(q) => Url::parse_with_params(&base, &[("search", q)])
                .map(String::from)
                .map_err(|e| CollectError::InvalidUrl {
                    url: base,
                    reason: e.to_string(),
                }),
        }
    }

    pub fn districts_url(&self) -> String {
        self.config.endpoint(DISTRICTS_PATH)
    }

    pub fn aid_types_url(&self) -> String {
        self.config.endpoint(AID_TYPES_PATH)
    }

    pub async fn list_recipients(&self) -> Result<Vec<RecipientRecord>, CollectError> {
        let url = self.recipients_url(None)?;
        collect_all(self, &url, self.config.max_pages).await
    }

    pub async fn search_recipients(&self, query: &str) -> Result<Vec<RecipientRecord>, CollectError> {
        let url = self.recipients_url(Some(query))?;
        collect_all(self, &url, self.config.max_pages).await
    }

    pub async fn list_districts(&self) -> Result<Vec<DistrictRef>, CollectError> {
        collect_all(self, &self.districts_url(), self.config.max_pages).await
    }

    pub async fn list_aid_types(&self) -> Result<Vec<AidTypeRef>, CollectError> {
        collect_all(self, &self.aid_types_url(), self.config.max_pages).await
    }

    // ---- single-record endpoints ----

    pub async fn get_recipient(&self, id: DbId) -> Result<RecipientRecord, ApiError> {
        let response = self
            .client
            .get(self.recipient_url(id))
            .send()
            .await?;
        Self::parse_response(response).await
    }

    /// Create a recipient. Callers refresh the store afterwards.
    pub async fn create_recipient(
        &self,
        payload: &RecipientPayload,
    ) -> Result<RecipientRecord, ApiError> {
        let response = self
            .client
            .post(self.config.endpoint(RECIPIENTS_PATH))
            .json(payload)
            .send()
            .await?;

        let created: RecipientRecord = Self::parse_response(response).await?;
        tracing::info!(recipient_id = created.id, "Recipient created");
        Ok(created)
    }

    /// Replace a recipient's fields.
    pub async fn update_recipient(
        &self,
        id: DbId,
        payload: &RecipientPayload,
    ) -> Result<RecipientRecord, ApiError> {
        let response = self
            .client
            .put(self.recipient_url(id))
            .json(payload)
            .send()
            .await?;

        let updated = Self::parse_response(response).await?;
        tracing::info!(recipient_id = id, "Recipient updated");
        Ok(updated)
    }

    pub async fn delete_recipient(&self, id: DbId) -> Result<(), ApiError> {
        let response = self
            .client
            .delete(self.recipient_url(id))
            .send()
            .await?;

        Self::check_status(response).await?;
        tracing::info!(recipient_id = id, "Recipient deleted");
        Ok(())
    }

    // ---- photos ----

    /// Upload one photo for a recipient as `multipart/form-data`.
    pub async fn upload_photo(
        &self,
        recipient_id: DbId,
        upload: PhotoUpload,
    ) -> Result<Photo, ApiError> {
        let part = reqwest::multipart::Part::bytes(upload.bytes).file_name(upload.file_name);
        let form = reqwest::multipart::Form::new()
            .part("file", part)
            .text("penerima_bantuan", recipient_id.to_string());

        let response = self
            .client
            .post(self.config.endpoint(PHOTO_UPLOAD_PATH))
            .multipart(form)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// Upload a batch of photos in order, stopping at the first failure.
    ///
    /// Batches larger than [`MAX_PHOTOS_PER_UPLOAD`] are rejected before
    /// any request is sent.
    pub async fn upload_photos(
        &self,
        recipient_id: DbId,
        uploads: Vec<PhotoUpload>,
    ) -> Result<Vec<Photo>, ApiError> {
        if uploads.len() > MAX_PHOTOS_PER_UPLOAD {
            return Err(ApiError::TooManyPhotos {
                count: uploads.len(),
                max: MAX_PHOTOS_PER_UPLOAD,
            });
        }

        let mut photos = Vec::with_capacity(uploads.len());
        for upload in uploads {
            photos.push(self.upload_photo(recipient_id, upload).await?);
        }
        tracing::info!(recipient_id, count = photos.len(), "Photos uploaded");
        Ok(photos)
    }

    pub async fn delete_photo(&self, photo_id: DbId) -> Result<(), ApiError> {
        let response = self
            .client
            .delete(self.config.endpoint(&format!("{PHOTOS_PATH}{photo_id}/")))
            .send()
            .await?;
        Self::check_status(response).await
    }

    // ---- statistics ----

    pub async fn fetch_statistics(&self) -> Result<Statistics, ApiError> {
        let response = self
            .client
            .get(self.config.endpoint(STATISTICS_PATH))
            .send()
            .await?;
        Self::parse_response(response).await
    }

    // ---- private helpers ----

    fn recipient_url(&self, id: DbId) -> String {
        self.config.endpoint(&format!("{RECIPIENTS_PATH}{id}/"))
    }

    /// Ensure the response has a success status code. A JSON error body
    /// becomes [`ApiError::Rejected`], anything else [`ApiError::Status`].
    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable body>".to_string());
        match serde_json::from_str::<Value>(&body) {
            Ok(json) => Err(ApiError::Rejected {
                status: status.as_u16(),
                body: json,
            }),
            Err(_) => Err(ApiError::Status {
                status: status.as_u16(),
                body,
            }),
        }
    }

    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, ApiError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }

    async fn check_status(response: reqwest::Response) -> Result<(), ApiError> {
        Self::ensure_success(response).await?;
        Ok(())
    }
}

#[async_trait]
impl PageSource for ApiClient {
    async fn fetch_page(&self, url: &str) -> Result<Value, CollectError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| CollectError::Transport {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(CollectError::Status {
                url: url.to_string(),
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response.bytes().await.map_err(|e| CollectError::Transport {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        decode_page_body(url, &bytes)
    }
}

/// Decode a fully received page body. Only malformed JSON is a parse
/// failure; errors while receiving the body are transport failures.
fn decode_page_body(url: &str, bytes: &[u8]) -> Result<Value, CollectError> {
    serde_json::from_slice(bytes).map_err(|e| CollectError::Parse {
        url: url.to_string(),
        reason: e.to_string(),
    })
}
