//! Re-hosting of upstream video URLs.
//!
//! Upstream result URLs are short-lived. When storage is configured, the
//! finished video is copied into our own bucket so the history keeps a
//! durable link. Re-hosting is strictly best effort: any failure falls back
//! to the upstream URL.

use std::time::Duration;

use tracing::{info, warn};

use crate::client::ObjectStore;
use crate::error::{StorageError, StorageResult};

const DOWNLOAD_TIMEOUT_SECS: u64 = 120;

/// Copies finished videos from upstream URLs into the object store.
pub struct VideoRehoster {
    http: reqwest::Client,
    store: ObjectStore,
}

impl VideoRehoster {
    pub fn new(store: ObjectStore) -> StorageResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(DOWNLOAD_TIMEOUT_SECS))
            .build()
            .map_err(|e| StorageError::config_error(e.to_string()))?;
        Ok(Self { http, store })
    }

    /// Copy `source_url` into the bucket and return the public URL.
    ///
    /// Returns `None` on any failure so the caller can keep the upstream URL.
    pub async fn rehost(&self, source_url: &str, video_name: &str) -> Option<String> {
        match self.try_rehost(source_url, video_name).await {
            Ok(url) => {
                info!(video_name, "Re-hosted video");
                Some(url)
            }
            Err(e) => {
                warn!(video_name, error = %e, "Re-hosting failed, keeping upstream URL");
                None
            }
        }
    }

    async fn try_rehost(&self, source_url: &str, video_name: &str) -> StorageResult<String> {
        let response = self
            .http
            .get(source_url)
            .send()
            .await
            .map_err(|e| StorageError::download_failed(e.to_string()))?
            .error_for_status()
            .map_err(|e| StorageError::download_failed(e.to_string()))?;

        let bytes = response
            .bytes()
            .await
            .map_err(|e| StorageError::download_failed(e.to_string()))?;

        if bytes.is_empty() {
            return Err(StorageError::download_failed("empty response body"));
        }

        let key = format!("videos/{}", video_name);
        self.store
            .upload_bytes(bytes.to_vec(), &key, "video/mp4")
            .await?;

        Ok(self.store.public_url(&key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::StorageConfig;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_store() -> ObjectStore {
        ObjectStore::new(StorageConfig {
            endpoint_url: "http://127.0.0.1:1".to_string(),
            access_key_id: "ak".to_string(),
            secret_access_key: "sk".to_string(),
            bucket_name: "videos".to_string(),
            region: "auto".to_string(),
            public_base_url: "https://cdn.example.com".to_string(),
        })
    }

    #[tokio::test]
    async fn test_download_failure_returns_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/video.mp4"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let rehoster = VideoRehoster::new(test_store()).unwrap();
        let url = format!("{}/video.mp4", server.uri());
        assert!(rehoster.rehost(&url, "v.mp4").await.is_none());
    }

    #[tokio::test]
    async fn test_empty_body_returns_none() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/video.mp4"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(Vec::<u8>::new()))
            .mount(&server)
            .await;

        let rehoster = VideoRehoster::new(test_store()).unwrap();
        let url = format!("{}/video.mp4", server.uri());
        assert!(rehoster.rehost(&url, "v.mp4").await.is_none());
    }
}
