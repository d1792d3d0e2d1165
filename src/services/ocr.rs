// OCR collaborator: sends an image to the external detection service and
// maps its answer into region records.

use std::io::Cursor;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use image::DynamicImage;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, instrument};

use crate::core::config::OcrConfig;
use crate::core::errors::OcrError;
use crate::core::types::{Rect, TextRegion};

/// Text detection over one image. Regions come back in the coordinate
/// space of the submitted image with `panel_index` left at zero; the
/// caller owns any offsetting and panel attribution.
#[async_trait]
pub trait OcrEngine: Send + Sync {
    async fn detect(&self, image: &DynamicImage) -> Result<Vec<TextRegion>, OcrError>;
}

#[derive(Deserialize)]
struct OcrResponse {
    regions: Vec<TextRegion>,
}

/// HTTP client for a PaddleOCR-style detection service.
pub struct RemoteOcrClient {
    client: reqwest::Client,
    config: OcrConfig,
}

impl RemoteOcrClient {
    pub fn new(config: OcrConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            config,
        }
    }
}

#[async_trait]
impl OcrEngine for RemoteOcrClient {
    #[instrument(skip_all, fields(w = image.width(), h = image.height()))]
    async fn detect(&self, image: &DynamicImage) -> Result<Vec<TextRegion>, OcrError> {
        let mut png = Vec::new();
        image.write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)?;

        let body = json!({ "image": BASE64.encode(&png) });

        let response = self
            .client
            .post(&self.config.endpoint)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;

        let parsed: OcrResponse = response
            .json()
            .await
            .map_err(|e| OcrError::MalformedResponse(e.to_string()))?;

        let total = parsed.regions.len();
        let regions: Vec<TextRegion> = parsed
            .regions
            .into_iter()
            .filter(|r| r.confidence >= self.config.confidence_threshold)
            .filter(|r| !r.text.trim().is_empty())
            .map(|mut r| {
                // Detection polygons are authoritative over whatever rect
                // the service reported alongside them.
                if let Some(rect) = r.polygon.as_deref().and_then(Rect::bounding) {
                    r.rect = rect;
                }
                r.panel_index = 0;
                r
            })
            .collect();

        debug!(
            detected = total,
            kept = regions.len(),
            threshold = self.config.confidence_threshold,
            "OCR pass finished"
        );
        Ok(regions)
    }
}
