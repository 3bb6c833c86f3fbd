//! Yandex Disk REST API source.
//!
//! Lists folders page by page and streams file content through the
//! short-lived download links the API hands out.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use serde::Deserialize;
use tokio::io::AsyncWriteExt;
use tokio::time::Instant;
use tracing::{debug, info};

use super::{ItemSource, RemoteItem};

pub const DEFAULT_API_BASE: &str = "https://cloud-api.yandex.net/v1/disk";

/// Items requested per listing page
const PAGE_LIMIT: usize = 1000;

const PROGRESS_LOG_INTERVAL: Duration = Duration::from_secs(10);

/// Yandex Disk client authenticated with an OAuth token
pub struct YandexDiskSource {
    token: String,
    api_base: String,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct ResourceResponse {
    #[serde(rename = "_embedded", default)]
    embedded: Option<ResourceList>,
}

#[derive(Debug, Default, Deserialize)]
struct ResourceList {
    #[serde(default)]
    items: Vec<RemoteItem>,

    #[serde(default)]
    total: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct DownloadLink {
    href: String,
}

impl YandexDiskSource {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            api_base: DEFAULT_API_BASE.to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// Point the client at a different API root
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        self.api_base = api_base.into().trim_end_matches('/').to_string();
        self
    }

    fn auth_header(&self) -> String {
        format!("OAuth {}", self.token)
    }

    fn api_url(&self, endpoint: &str) -> String {
        format!("{}/{}", self.api_base, endpoint)
    }

    async fn list_page(&self, path: &str, offset: usize) -> Result<ResourceList> {
        let response = self
            .client
            .get(self.api_url("resources"))
            .header(AUTHORIZATION, self.auth_header())
            .query(&[
                ("path", path.to_string()),
                ("limit", PAGE_LIMIT.to_string()),
                ("offset", offset.to_string()),
            ])
            .send()
            .await
            .with_context(|| format!("Failed to list '{}'", path))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Listing '{}' failed with {}: {}", path, status, body.trim());
        }

        let page: ResourceResponse = response
            .json()
            .await
            .with_context(|| format!("Failed to parse listing of '{}'", path))?;

        Ok(page.embedded.unwrap_or_default())
    }

    async fn download_href(&self, path: &str) -> Result<String> {
        let response = self
            .client
            .get(self.api_url("resources/download"))
            .header(AUTHORIZATION, self.auth_header())
            .query(&[("path", path)])
            .send()
            .await
            .with_context(|| format!("Failed to request download link for '{}'", path))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            anyhow::bail!("Download link for '{}' failed with {}: {}", path, status, body.trim());
        }

        let link: DownloadLink = response
            .json()
            .await
            .context("Failed to parse download link response")?;

        Ok(link.href)
    }
}

#[async_trait]
impl ItemSource for YandexDiskSource {
    fn name(&self) -> &str {
        "yandex-disk"
    }

    async fn list_dir(&self, path: &str) -> Result<Vec<RemoteItem>> {
        let mut items = Vec::new();
        let mut offset = 0;

        loop {
            let page = self.list_page(path, offset).await?;
            let count = page.items.len();
            items.extend(page.items);
            offset += count;

            let more = match page.total {
                Some(total) => (offset as u64) < total,
                None => count == PAGE_LIMIT,
            };
            if count == 0 || !more {
                break;
            }
        }

        debug!(path, items = items.len(), "Listed folder");
        Ok(items)
    }

    async fn download(&self, item: &RemoteItem, dest: &Path) -> Result<u64> {
        let href = self.download_href(&item.path).await?;

        let mut response = self
            .client
            .get(&href)
            .send()
            .await
            .with_context(|| format!("Failed to start download of '{}'", item.path))?
            .error_for_status()
            .with_context(|| format!("Download of '{}' rejected", item.path))?;

        let mut file = tokio::fs::File::create(dest)
            .await
            .with_context(|| format!("Failed to create {}", dest.display()))?;

        let total = item.size.or_else(|| response.content_length());
        let mut written: u64 = 0;
        let mut last_report = Instant::now();

        while let Some(chunk) = response
            .chunk()
            .await
            .with_context(|| format!("Download of '{}' interrupted", item.path))?
        {
            file.write_all(&chunk)
                .await
                .with_context(|| format!("Failed to write {}", dest.display()))?;
            written += chunk.len() as u64;

            if last_report.elapsed() >= PROGRESS_LOG_INTERVAL {
                last_report = Instant::now();
                match total {
                    Some(total) if total > 0 => info!(
                        source_id = %item.path,
                        written,
                        total,
                        percent = %format!("{:.1}", written as f64 * 100.0 / total as f64),
                        "Downloading"
                    ),
                    _ => info!(source_id = %item.path, written, "Downloading"),
                }
            }
        }

        file.flush().await.context("Failed to flush download")?;
        info!(source_id = %item.path, bytes = written, "Download complete");
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::ItemKind;

    #[test]
    fn test_parse_listing_page() {
        let json = r#"{
            "path": "disk:/Courses",
            "type": "dir",
            "_embedded": {
                "path": "disk:/Courses",
                "limit": 1000,
                "offset": 0,
                "total": 2,
                "items": [
                    {"path": "disk:/Courses/Rust", "name": "Rust", "type": "dir"},
                    {"path": "disk:/Courses/intro.mp4", "name": "intro.mp4", "type": "file",
                     "mime_type": "video/mp4", "size": 42}
                ]
            }
        }"#;

        let page: ResourceResponse = serde_json::from_str(json).unwrap();
        let list = page.embedded.unwrap();
        assert_eq!(list.total, Some(2));
        assert_eq!(list.items[0].kind, ItemKind::Dir);
        assert_eq!(list.items[1].size, Some(42));
    }

    #[test]
    fn test_file_resource_has_no_listing() {
        let json = r#"{"path": "disk:/a.mp4", "type": "file"}"#;
        let page: ResourceResponse = serde_json::from_str(json).unwrap();
        assert!(page.embedded.is_none());
    }

    #[test]
    fn test_api_url_and_auth() {
        let source = YandexDiskSource::new("TOKEN").with_api_base("http://localhost:9000/v1/disk/");
        assert_eq!(source.api_url("resources"), "http://localhost:9000/v1/disk/resources");
        assert_eq!(source.auth_header(), "OAuth TOKEN");
    }
}
