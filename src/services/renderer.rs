// Draws translated text back onto the cleaned canvas with cosmic-text.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use cosmic_text::{
    Attrs, Buffer, Color as CosmicColor, Family, FontSystem, Metrics, Shaping, SwashCache,
};
use image::{Rgba, RgbaImage};
use tokio::sync::Mutex;
use tracing::{debug, info};

use crate::core::config::RenderConfig;
use crate::core::errors::RenderError;
use crate::core::types::TextRegion;
use crate::stages::layout_solver::Layout;

/// Draws one region's solved layout onto the canvas under the renderer's
/// font stack.
#[async_trait]
pub trait TextRenderer: Send + Sync {
    async fn draw_region(
        &self,
        img: &mut RgbaImage,
        region: &TextRegion,
        layout: &Layout,
    ) -> Result<(), RenderError>;
}

/// cosmic-text backed renderer. The font system and glyph cache need
/// `&mut`, so both sit behind async mutexes shared across draws.
pub struct CosmicTextRenderer {
    font_system: Arc<Mutex<FontSystem>>,
    swash_cache: Arc<Mutex<SwashCache>>,
    stroke_width: i32,
}

impl CosmicTextRenderer {
    /// Build the renderer from the fonts in `config.font_dir`. System
    /// fonts are never scanned, so startup stays fast and output is
    /// reproducible across machines.
    pub fn new(config: &RenderConfig) -> Result<Self, RenderError> {
        use cosmic_text::fontdb;

        let mut db = fontdb::Database::new();
        let mut loaded = 0usize;

        if let Ok(entries) = std::fs::read_dir(&config.font_dir) {
            for entry in entries.flatten() {
                let path = entry.path();
                if is_font_file(&path) {
                    if let Ok(data) = std::fs::read(&path) {
                        db.load_font_data(data);
                        loaded += 1;
                        debug!("loaded font {}", path.display());
                    }
                }
            }
        }

        if loaded == 0 {
            return Err(RenderError::NoFonts(config.font_dir.clone()));
        }
        info!("renderer initialized with {} font file(s)", loaded);

        let font_system = FontSystem::new_with_locale_and_db("en-US".to_string(), db);

        Ok(Self {
            font_system: Arc::new(Mutex::new(font_system)),
            swash_cache: Arc::new(Mutex::new(SwashCache::new())),
            stroke_width: config.stroke_width,
        })
    }

    async fn draw_line(
        &self,
        img: &mut RgbaImage,
        text: &str,
        font_size: f32,
        line_height: f32,
        x: i32,
        y: i32,
        color: Rgba<u8>,
    ) {
        let buffer = {
            let mut font_system = self.font_system.lock().await;
            let metrics = Metrics::new(font_size, line_height);
            let mut buffer = Buffer::new(&mut font_system, metrics);
            let attrs = Attrs::new().family(Family::SansSerif);
            buffer.set_text(&mut font_system, text, &attrs, Shaping::Advanced);
            buffer.shape_until_scroll(&mut font_system, false);
            buffer
        };

        let cosmic_color = CosmicColor::rgba(color[0], color[1], color[2], color[3]);

        let mut font_system = self.font_system.lock().await;
        let mut swash_cache = self.swash_cache.lock().await;

        buffer.draw(
            &mut font_system,
            &mut swash_cache,
            cosmic_color,
            |px_x, px_y, _w, _h, pixel_color| {
                let img_x = x + px_x;
                let img_y = y + px_y;
                if img_x < 0
                    || img_y < 0
                    || img_x >= img.width() as i32
                    || img_y >= img.height() as i32
                {
                    return;
                }

                let existing = img.get_pixel(img_x as u32, img_y as u32);
                let alpha = pixel_color.a() as f32 / 255.0;
                let inv_alpha = 1.0 - alpha;
                let blended = Rgba([
                    ((pixel_color.r() as f32 * alpha) + (existing[0] as f32 * inv_alpha)) as u8,
                    ((pixel_color.g() as f32 * alpha) + (existing[1] as f32 * inv_alpha)) as u8,
                    ((pixel_color.b() as f32 * alpha) + (existing[2] as f32 * inv_alpha)) as u8,
                    existing[3].max(pixel_color.a()),
                ]);
                img.put_pixel(img_x as u32, img_y as u32, blended);
            },
        );
    }
}

fn is_font_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| matches!(e.to_lowercase().as_str(), "ttf" | "otf" | "ttc"))
        .unwrap_or(false)
}

#[async_trait]
impl TextRenderer for CosmicTextRenderer {
    async fn draw_region(
        &self,
        img: &mut RgbaImage,
        region: &TextRegion,
        layout: &Layout,
    ) -> Result<(), RenderError> {
        if layout.lines.is_empty() {
            return Ok(());
        }

        let line_height = layout.line_height();
        // Center the block vertically inside the region.
        let start_y =
            region.rect.y + ((region.rect.h as f32 - layout.block_height()) / 2.0).max(0.0) as i32;

        for (i, line) in layout.lines.iter().enumerate() {
            // Estimated line width mirrors the layout solver's glyph model
            // so centering stays consistent with the fit decision.
            let est_width = line.chars().count() as f32 * layout.font_size * 0.6;
            let x = region.rect.x + ((region.rect.w as f32 - est_width) / 2.0).max(0.0) as i32;
            let y = start_y + (i as f32 * line_height) as i32;

            // White outline first so black fill stays legible on art.
            let w = self.stroke_width;
            for dy in -w..=w {
                for dx in -w..=w {
                    if dx == 0 && dy == 0 {
                        continue;
                    }
                    if dx * dx + dy * dy <= w * w + 1 {
                        self.draw_line(
                            img,
                            line,
                            layout.font_size,
                            line_height,
                            x + dx,
                            y + dy,
                            Rgba([255, 255, 255, 255]),
                        )
                        .await;
                    }
                }
            }
            self.draw_line(
                img,
                line,
                layout.font_size,
                line_height,
                x,
                y,
                Rgba([0, 0, 0, 255]),
            )
            .await;
        }
        Ok(())
    }
}
