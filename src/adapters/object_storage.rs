//! S3-compatible object storage uploader.
//!
//! Objects go into a bucket that is publicly readable, so the recognizer can
//! fetch them by plain URL: `<endpoint>/<bucket>/<object name>`.

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use object_store::aws::AmazonS3Builder;
use object_store::ObjectStore;
use tracing::info;
use url::Url;

use super::ArtifactUploader;

/// Uploads artifacts through any [`ObjectStore`]
pub struct ObjectStorageUploader {
    store: Arc<dyn ObjectStore>,
    endpoint: Url,
    bucket: String,
}

impl ObjectStorageUploader {
    /// Build an S3 client for `bucket` at `endpoint`
    pub fn new(
        endpoint: &str,
        bucket: &str,
        region: &str,
        access_key: &str,
        secret_key: &str,
    ) -> Result<Self> {
        let endpoint_url = if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
            endpoint.to_string()
        } else {
            format!("https://{}", endpoint)
        };

        let store = AmazonS3Builder::new()
            .with_region(region)
            .with_access_key_id(access_key)
            .with_secret_access_key(secret_key)
            .with_bucket_name(bucket)
            .with_endpoint(&endpoint_url)
            .with_allow_http(endpoint_url.starts_with("http://"))
            .build()
            .context("Failed to build object storage client")?;

        info!(endpoint = %endpoint_url, bucket, region, "Object storage configured");

        Self::with_store(Arc::new(store), &endpoint_url, bucket)
    }

    /// Wrap an existing store; `endpoint` is only used to form public URLs
    pub fn with_store(store: Arc<dyn ObjectStore>, endpoint: &str, bucket: &str) -> Result<Self> {
        let endpoint =
            Url::parse(endpoint).with_context(|| format!("Invalid storage endpoint '{}'", endpoint))?;

        Ok(Self {
            store,
            endpoint,
            bucket: bucket.to_string(),
        })
    }

    /// Public URL of an object, with the name percent-encoded
    pub fn public_url(&self, object_name: &str) -> Result<String> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("Storage endpoint '{}' cannot carry a path", self.endpoint))?
            .pop_if_empty()
            .push(&self.bucket)
            .push(object_name);
        Ok(url.to_string())
    }
}

#[async_trait]
impl ArtifactUploader for ObjectStorageUploader {
    async fn upload(&self, local: &Path, object_name: &str) -> Result<String> {
        let data = tokio::fs::read(local)
            .await
            .with_context(|| format!("Failed to read {}", local.display()))?;
        let size = data.len();

        let path = object_store::path::Path::from(object_name);
        self.store
            .put(&path, bytes::Bytes::from(data).into())
            .await
            .with_context(|| format!("Failed to upload '{}' to bucket '{}'", object_name, self.bucket))?;

        let uri = self.public_url(object_name)?;
        info!(object = object_name, bytes = size, %uri, "Artifact uploaded");
        Ok(uri)
    }
}
