// Panel acquisition: turns a chapter reference (remote URL or local
// directory) into the ordered list of decoded panel images.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use async_trait::async_trait;
use futures::future::join_all;
use image::DynamicImage;
use tokio::sync::Semaphore;
use tracing::{debug, info, instrument, warn};

use crate::core::config::AcquireConfig;
use crate::core::errors::AcquireError;

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "gif", "bmp"];

/// Produces the ordered panels of one chapter. A `None` slot is a panel
/// that could not be fetched or decoded; downstream stages skip it while
/// preserving the indices of its neighbors.
#[async_trait]
pub trait PanelSource: Send + Sync {
    async fn fetch(&self) -> Result<Vec<Option<DynamicImage>>, AcquireError>;
}

/// Scrapes a chapter page for its panel image URLs and downloads them
/// concurrently, bounded by a semaphore, with per-panel retry.
pub struct HttpPanelSource {
    client: reqwest::Client,
    chapter_url: String,
    config: AcquireConfig,
}

impl HttpPanelSource {
    pub fn new(chapter_url: String, config: AcquireConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.download_timeout)
            .user_agent("Mozilla/5.0 (compatible; manhwa-translate)")
            .build()
            .context("building download client")?;
        Ok(Self {
            client,
            chapter_url,
            config,
        })
    }

    async fn fetch_page(&self) -> Result<String, AcquireError> {
        let response = self
            .client
            .get(&self.chapter_url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|_| AcquireError::DownloadFailed {
                url: self.chapter_url.clone(),
                attempts: 1,
            })?;
        response.text().await.map_err(|_| AcquireError::DownloadFailed {
            url: self.chapter_url.clone(),
            attempts: 1,
        })
    }

    async fn download_panel(&self, url: &str) -> Option<DynamicImage> {
        for attempt in 0..self.config.download_retries {
            if attempt > 0 {
                tokio::time::sleep(Duration::from_secs(2u64.saturating_pow(attempt))).await;
            }
            match self.try_download(url).await {
                Ok(image) => return Some(image),
                Err(e) => {
                    warn!(url, attempt, error = %e, "panel download attempt failed");
                }
            }
        }
        warn!(url, attempts = self.config.download_retries, "giving up on panel");
        None
    }

    async fn try_download(&self, url: &str) -> anyhow::Result<DynamicImage> {
        let bytes = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        Ok(image::load_from_memory(&bytes)?)
    }
}

#[async_trait]
impl PanelSource for HttpPanelSource {
    #[instrument(skip_all, fields(url = %self.chapter_url))]
    async fn fetch(&self) -> Result<Vec<Option<DynamicImage>>, AcquireError> {
        let page = self.fetch_page().await?;
        let urls = extract_image_urls(&page, &self.chapter_url);
        if urls.is_empty() {
            return Err(AcquireError::EmptyDocument(self.chapter_url.clone()));
        }
        info!("found {} panel URLs on chapter page", urls.len());

        let semaphore = Arc::new(Semaphore::new(self.config.max_concurrent_downloads.max(1)));
        let downloads = urls.iter().map(|url| {
            let semaphore = Arc::clone(&semaphore);
            async move {
                // Closed-semaphore case cannot happen; treat it as a miss.
                let Ok(_permit) = semaphore.acquire().await else {
                    return None;
                };
                self.download_panel(url).await
            }
        });

        Ok(join_all(downloads).await)
    }
}

/// Pull panel image URLs out of a chapter page, in document order.
fn extract_image_urls(html: &str, base_url: &str) -> Vec<String> {
    let mut urls = Vec::new();
    let mut rest = html;

    while let Some(img_at) = rest.find("<img") {
        rest = &rest[img_at + 4..];
        let Some(tag_end) = rest.find('>') else { break };
        let tag = &rest[..tag_end];

        // Lazy-loading sites put the real URL in data-src.
        let src = attr_value(tag, "data-src").or_else(|| attr_value(tag, "src"));
        if let Some(src) = src {
            let lowered = src.to_lowercase();
            let is_image = IMAGE_EXTENSIONS
                .iter()
                .any(|ext| lowered.split('?').next().unwrap_or("").ends_with(ext));
            if is_image {
                urls.push(absolutize(src, base_url));
            }
        }
        rest = &rest[tag_end..];
    }
    urls
}

fn attr_value<'a>(tag: &'a str, name: &str) -> Option<&'a str> {
    let pattern = format!("{name}=\"");
    let start = tag.find(&pattern)? + pattern.len();
    let end = tag[start..].find('"')?;
    let value = &tag[start..start + end];
    (!value.trim().is_empty()).then(|| value.trim())
}

fn absolutize(src: &str, base_url: &str) -> String {
    if src.starts_with("http://") || src.starts_with("https://") {
        return src.to_string();
    }
    if let Some(rest) = src.strip_prefix("//") {
        return format!("https://{rest}");
    }
    let origin = base_url
        .find("://")
        .and_then(|i| base_url[i + 3..].find('/').map(|j| &base_url[..i + 3 + j]))
        .unwrap_or(base_url);
    if src.starts_with('/') {
        format!("{origin}{src}")
    } else {
        format!("{}/{src}", base_url.trim_end_matches('/'))
    }
}

/// Reads a local directory of panel images, ordered by file name.
pub struct DirectoryPanelSource {
    dir: PathBuf,
}

impl DirectoryPanelSource {
    pub fn new(dir: PathBuf) -> Self {
        Self { dir }
    }
}

#[async_trait]
impl PanelSource for DirectoryPanelSource {
    #[instrument(skip_all, fields(dir = %self.dir.display()))]
    async fn fetch(&self) -> Result<Vec<Option<DynamicImage>>, AcquireError> {
        if !self.dir.is_dir() {
            return Err(AcquireError::DocumentNotFound(
                self.dir.display().to_string(),
            ));
        }

        let mut paths: Vec<PathBuf> = std::fs::read_dir(&self.dir)?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| {
                p.extension()
                    .and_then(|e| e.to_str())
                    .map(|e| IMAGE_EXTENSIONS.contains(&e.to_lowercase().as_str()))
                    .unwrap_or(false)
            })
            .collect();
        paths.sort();

        if paths.is_empty() {
            return Err(AcquireError::EmptyDocument(self.dir.display().to_string()));
        }
        debug!("loading {} panel file(s)", paths.len());

        let mut panels = Vec::with_capacity(paths.len());
        for path in paths {
            let loaded = tokio::task::spawn_blocking(move || image::open(&path).ok())
                .await
                .unwrap_or(None);
            if loaded.is_none() {
                warn!("skipping unreadable panel file");
            }
            panels.push(loaded);
        }
        Ok(panels)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_image_urls_in_document_order() {
        let html = r#"
            <div><img src="https://cdn.example.com/ch1/001.jpg"></div>
            <img data-src="https://cdn.example.com/ch1/002.png" src="spinner.gif.php">
            <img src="/static/003.webp">
            <a href="next.html">next</a>
        "#;
        let urls = extract_image_urls(html, "https://reader.example.com/ch1/");
        assert_eq!(
            urls,
            vec![
                "https://cdn.example.com/ch1/001.jpg".to_string(),
                "https://cdn.example.com/ch1/002.png".to_string(),
                "https://reader.example.com/static/003.webp".to_string(),
            ]
        );
    }

    #[test]
    fn query_strings_do_not_hide_extensions() {
        let html = r#"<img src="https://cdn.example.com/p.jpg?v=3">"#;
        let urls = extract_image_urls(html, "https://reader.example.com");
        assert_eq!(urls.len(), 1);
    }

    #[test]
    fn non_image_sources_are_ignored() {
        let html = r#"<img src="tracker.php"><img src="banner.svg">"#;
        assert!(extract_image_urls(html, "https://x.example.com").is_empty());
    }

    #[tokio::test]
    async fn missing_directory_is_reported() {
        let source = DirectoryPanelSource::new(PathBuf::from("/definitely/not/here"));
        assert!(matches!(
            source.fetch().await,
            Err(AcquireError::DocumentNotFound(_))
        ));
    }

    #[tokio::test]
    async fn empty_directory_is_reported() {
        let dir = std::env::temp_dir().join(format!("panels-empty-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let source = DirectoryPanelSource::new(dir.clone());
        assert!(matches!(
            source.fetch().await,
            Err(AcquireError::EmptyDocument(_))
        ));
        let _ = std::fs::remove_dir(&dir);
    }
}
