//! HTTP content service with an on-disk cache.
//!
//! Free assets download from `{base}/free/{path}`. Premium assets need a
//! signed URL from `{base}/sign?path=...`, requested with the session's bearer
//! token. Downloads land under the cache directory at the asset's full path;
//! paths that would escape the cache root are rejected before any I/O.

#[cfg(test)]
#[path = "content_test.rs"]
mod content_test;

use std::path::{Component, Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, info};
use uuid::Uuid;

use crate::collab::{AuthContext, ContentService};
use crate::config::env_parse;
use crate::entry::{AssetTier, PlacementEntry};
use crate::error::ContentError;

pub const DEFAULT_CACHE_DIR: &str = "./stamp-cache";
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 60;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

// =============================================================================
// CONFIG
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentConfig {
    /// Cloud API root, without a trailing slash.
    pub base_url: String,
    pub cache_dir: PathBuf,
    pub request_timeout_secs: u64,
    pub connect_timeout_secs: u64,
}

impl ContentConfig {
    #[must_use]
    pub fn new(base_url: &str, cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_url: base_url.trim().trim_end_matches('/').to_string(),
            cache_dir: cache_dir.into(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            connect_timeout_secs: DEFAULT_CONNECT_TIMEOUT_SECS,
        }
    }

    /// Build config from environment variables.
    ///
    /// Required:
    /// - `STAMP_CLOUD_BASE_URL`
    ///
    /// Optional:
    /// - `STAMP_CACHE_DIR`: default `./stamp-cache`
    /// - `STAMP_REQUEST_TIMEOUT_SECS`: default 60
    /// - `STAMP_CONNECT_TIMEOUT_SECS`: default 10
    ///
    /// # Errors
    ///
    /// Returns `Config` when the base URL is missing or blank.
    pub fn from_env() -> Result<Self, ContentError> {
        let base_url = std::env::var("STAMP_CLOUD_BASE_URL")
            .map_err(|_| ContentError::Config("STAMP_CLOUD_BASE_URL is not set".into()))?;
        if base_url.trim().is_empty() {
            return Err(ContentError::Config("STAMP_CLOUD_BASE_URL is blank".into()));
        }
        let cache_dir = std::env::var("STAMP_CACHE_DIR").unwrap_or_else(|_| DEFAULT_CACHE_DIR.to_string());
        let mut config = Self::new(&base_url, cache_dir);
        config.request_timeout_secs = env_parse("STAMP_REQUEST_TIMEOUT_SECS", DEFAULT_REQUEST_TIMEOUT_SECS);
        config.connect_timeout_secs = env_parse("STAMP_CONNECT_TIMEOUT_SECS", DEFAULT_CONNECT_TIMEOUT_SECS);
        Ok(config)
    }
}

// =============================================================================
// SERVICE
// =============================================================================

pub struct HttpContentService {
    http: reqwest::Client,
    config: ContentConfig,
}

#[derive(Deserialize)]
struct SignedUrl {
    url: String,
}

impl HttpContentService {
    /// # Errors
    ///
    /// Returns `Http` if the HTTP client cannot be built.
    pub fn new(config: ContentConfig) -> Result<Self, ContentError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()?;
        Ok(Self { http, config })
    }

    /// Where `entry` is cached on disk.
    ///
    /// # Errors
    ///
    /// Returns `MissingPath` for entries without a path and `UnsafePath` for
    /// paths that are absolute or climb out of the cache root.
    pub fn cache_path(&self, entry: &PlacementEntry) -> Result<PathBuf, ContentError> {
        let relative = relative_asset_path(entry)?;
        Ok(self.config.cache_dir.join(relative))
    }

    fn free_url(&self, path: &str) -> String {
        format!("{}/free/{}", self.config.base_url, path)
    }

    async fn sign(&self, path: &str, token: &str) -> Result<String, ContentError> {
        let url = format!("{}/sign", self.config.base_url);
        let response = self.http.get(&url).query(&[("path", path)]).bearer_auth(token).send().await?;
        let status = response.status().as_u16();
        if !response.status().is_success() {
            return Err(ContentError::Status { status, url });
        }
        let text = response.text().await?;
        let signed: SignedUrl =
            serde_json::from_str(&text).map_err(|e| ContentError::BadResponse(format!("sign response: {e}")))?;
        if signed.url.trim().is_empty() {
            return Err(ContentError::BadResponse("sign response had an empty url".into()));
        }
        Ok(signed.url)
    }
}

#[async_trait::async_trait]
impl ContentService for HttpContentService {
    async fn resolve_remote_url(&self, entry: &PlacementEntry, auth: &AuthContext) -> Result<String, ContentError> {
        let path = relative_asset_path(entry)?;
        match entry.tier {
            AssetTier::Free => Ok(self.free_url(&path)),
            AssetTier::Premium => {
                let token = auth
                    .state
                    .as_deref()
                    .filter(|t| auth.authenticated && !t.is_empty())
                    .ok_or_else(|| ContentError::AuthRequired(entry.display_name.clone()))?;
                self.sign(&path, token).await
            }
        }
    }

    async fn ensure_local(
        &self,
        entry: &PlacementEntry,
        url: &str,
        auth: &AuthContext,
    ) -> Result<String, ContentError> {
        let target = self.cache_path(entry)?;
        if tokio::fs::try_exists(&target).await? {
            return Ok(target.to_string_lossy().into_owned());
        }

        let mut request = self.http.get(url);
        if entry.tier == AssetTier::Premium {
            if let Some(token) = auth.state.as_deref() {
                request = request.bearer_auth(token);
            }
        }
        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(ContentError::Status { status: response.status().as_u16(), url: url.to_string() });
        }
        let bytes = response.bytes().await?;

        write_cached(&target, &bytes).await?;

        info!(identity = %entry.identity_key, bytes = bytes.len(), path = %target.display(), "asset cached");
        Ok(target.to_string_lossy().into_owned())
    }

    async fn probe_local(&self, entry: &PlacementEntry) -> Result<Option<String>, ContentError> {
        let target = self.cache_path(entry)?;
        if tokio::fs::try_exists(&target).await? {
            debug!(identity = %entry.identity_key, "asset found in cache");
            return Ok(Some(target.to_string_lossy().into_owned()));
        }
        Ok(None)
    }

    fn local_path(&self, entry: &PlacementEntry) -> Option<String> {
        match self.cache_path(entry) {
            Ok(target) if target.is_file() => Some(target.to_string_lossy().into_owned()),
            _ => None,
        }
    }
}

/// Write `bytes` to `target` through a temp file unique to this write, so
/// concurrent downloads never share a partial file.
async fn write_cached(target: &Path, bytes: &[u8]) -> Result<(), ContentError> {
    if let Some(parent) = target.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let file_name = target.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
    let partial = target.with_file_name(format!("{file_name}.{}.partial", Uuid::new_v4()));
    tokio::fs::write(&partial, bytes).await?;
    if let Err(e) = tokio::fs::rename(&partial, target).await {
        if let Err(cleanup) = tokio::fs::remove_file(&partial).await {
            debug!(path = %partial.display(), error = %cleanup, "partial download not removed");
        }
        return Err(e.into());
    }
    Ok(())
}

/// Validate an entry's full path for use under the cache root.
fn relative_asset_path(entry: &PlacementEntry) -> Result<String, ContentError> {
    let path = entry.full_path.trim().replace('\\', "/");
    if path.is_empty() {
        return Err(ContentError::MissingPath(entry.display_name.clone()));
    }
    let safe = Path::new(&path).components().all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
    if !safe {
        return Err(ContentError::UnsafePath(path));
    }
    Ok(path)
}
