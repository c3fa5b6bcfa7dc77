use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Url;
use serde::Deserialize;
use thiserror::Error;

use crate::config::StorageBucket;

/// Signed URLs stay valid for 10 minutes.
pub const SIGNED_URL_TTL_SECS: u64 = 600;

#[derive(Debug, Error, PartialEq)]
pub enum StorageError {
    #[error("File name is empty after sanitizing")]
    InvalidKey,
    #[error("{0}")]
    Upstream(String),
}

// 1. StorageService Contract
/// StorageService
///
/// Resolves a URL a browser can fetch an object from. Public buckets get their permanent
/// public URL; private buckets get a short-lived signed URL.
#[async_trait]
pub trait StorageService: Send + Sync {
    async fn object_url(&self, bucket: &StorageBucket, key: &str) -> Result<String, StorageError>;
}

/// sanitize_key
///
/// Removes directory navigation components (`..`, `.`) and empty segments from a
/// user-provided object key.
pub fn sanitize_key(key: &str) -> String {
    key.split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".." && *segment != ".")
        .collect::<Vec<_>>()
        .join("/")
}

// 2. The Real Implementation (Supabase Storage API)
#[derive(Deserialize)]
struct SignedUrlResponse {
    #[serde(rename = "signedURL")]
    signed_url: String,
}

/// object_route_url
///
/// Appends `route` and then every segment of `key` to `base`, percent-encoding each one,
/// so characters such as ` `, `#` or `?` stay inside the object path.
pub fn object_route_url(base: &str, route: &[&str], key: &str) -> Result<Url, StorageError> {
    let mut url = Url::parse(base).map_err(|e| StorageError::Upstream(e.to_string()))?;
    url.path_segments_mut()
        .map_err(|_| StorageError::Upstream(format!("{} cannot carry an object path", base)))?
        .pop_if_empty()
        .extend(route)
        .extend(key.split('/'));
    Ok(url)
}

/// SupabaseStorageClient
///
/// Talks to `{SUPABASE_URL}/storage/v1`. Signing requires the privileged service-role key,
/// which never leaves the server.
#[derive(Clone)]
pub struct SupabaseStorageClient {
    client: reqwest::Client,
    storage_url: String,
    service_role_key: String,
}

impl SupabaseStorageClient {
    pub fn new(supabase_url: &str, service_role_key: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            storage_url: format!("{}/storage/v1", supabase_url.trim_end_matches('/')),
            service_role_key: service_role_key.to_string(),
        }
    }

    pub fn public_url(&self, bucket: &str, key: &str) -> Result<String, StorageError> {
        object_route_url(&self.storage_url, &["object", "public", bucket], key).map(String::from)
    }
}

#[async_trait]
impl StorageService for SupabaseStorageClient {
    async fn object_url(&self, bucket: &StorageBucket, key: &str) -> Result<String, StorageError> {
        let key = sanitize_key(key);
        if key.is_empty() {
            return Err(StorageError::InvalidKey);
        }

        if bucket.public {
            return self.public_url(&bucket.name, &key);
        }

        let sign_url = object_route_url(&self.storage_url, &["object", "sign", bucket.name.as_str()], &key)?;
        let response = self
            .client
            .post(sign_url)
            .header("apikey", &self.service_role_key)
            .bearer_auth(&self.service_role_key)
            .json(&serde_json::json!({ "expiresIn": SIGNED_URL_TTL_SECS }))
            .send()
            .await
            .map_err(|e| StorageError::Upstream(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::error!(bucket = %bucket.name, %status, "storage signing failed: {}", body);
            return Err(StorageError::Upstream(format!(
                "Failed to sign storage URL ({})",
                status
            )));
        }

        let signed = response
            .json::<SignedUrlResponse>()
            .await
            .map_err(|e| StorageError::Upstream(e.to_string()))?;

        // The API answers with a path relative to /storage/v1.
        if signed.signed_url.starts_with("http") {
            Ok(signed.signed_url)
        } else {
            Ok(format!("{}{}", self.storage_url, signed.signed_url))
        }
    }
}

// 3. The Mock Implementation (For Tests)
const MOCK_STORAGE_URL: &str = "http://localhost:54321/storage/v1";

/// MockStorageService
///
/// Deterministic URLs without any network, so handler tests can assert on them.
#[derive(Clone, Default)]
pub struct MockStorageService {
    /// When true, all operations return a simulated failure.
    pub should_fail: bool,
}

impl MockStorageService {
    pub fn new() -> Self {
        Self { should_fail: false }
    }

    pub fn new_failing() -> Self {
        Self { should_fail: true }
    }
}

#[async_trait]
impl StorageService for MockStorageService {
    async fn object_url(&self, bucket: &StorageBucket, key: &str) -> Result<String, StorageError> {
        if self.should_fail {
            return Err(StorageError::Upstream(
                "Mock Storage Error: Simulation requested".to_string(),
            ));
        }

        let key = sanitize_key(key);
        if key.is_empty() {
            return Err(StorageError::InvalidKey);
        }

        if bucket.public {
            let url = object_route_url(MOCK_STORAGE_URL, &["object", "public", bucket.name.as_str()], &key)?;
            Ok(url.into())
        } else {
            let mut url = object_route_url(MOCK_STORAGE_URL, &["object", "sign", bucket.name.as_str()], &key)?;
            url.set_query(Some("token=fake"));
            Ok(url.into())
        }
    }
}

/// StorageState
///
/// The concrete type used to share the storage service across the application state.
pub type StorageState = Arc<dyn StorageService>;
