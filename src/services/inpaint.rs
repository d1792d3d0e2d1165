// Text removal: paints masked pixels out of the canvas so translated text
// can be drawn on a clean background.

use image::{DynamicImage, GrayImage, Rgba, RgbaImage};
use tracing::{debug, instrument};

/// Erases the masked area of a canvas. Synchronous and CPU-bound; the
/// pipeline runs it on the blocking pool.
pub trait Inpainter: Send + Sync {
    fn inpaint(&self, canvas: &DynamicImage, mask: &GrayImage) -> DynamicImage;
}

/// Diffusion-style inpainter: repeatedly fills masked pixels from the
/// average of their already-known 8-neighbors, so background tones bleed
/// inward from the mask boundary. Good enough for the flat speech-bubble
/// fills where manhwa text lives; pixels still unknown after the
/// configured passes fall back to white.
pub struct NeighborFillInpainter {
    passes: u32,
}

impl NeighborFillInpainter {
    pub fn new(passes: u32) -> Self {
        Self { passes: passes.max(1) }
    }
}

impl Inpainter for NeighborFillInpainter {
    #[instrument(skip_all, fields(w = canvas.width(), h = canvas.height()))]
    fn inpaint(&self, canvas: &DynamicImage, mask: &GrayImage) -> DynamicImage {
        let mut out = canvas.to_rgba8();
        let (w, h) = (out.width(), out.height());

        let mut known: Vec<bool> = mask.pixels().map(|p| p[0] == 0).collect();
        let mut unknown: Vec<(u32, u32)> = (0..h)
            .flat_map(|y| (0..w).map(move |x| (x, y)))
            .filter(|&(x, y)| !known[(y * w + x) as usize])
            .collect();

        if unknown.is_empty() {
            return canvas.clone();
        }
        debug!(masked = unknown.len(), passes = self.passes, "inpainting canvas");

        for _ in 0..self.passes {
            if unknown.is_empty() {
                break;
            }
            let mut filled = Vec::new();
            let mut still_unknown = Vec::new();

            for &(x, y) in &unknown {
                if let Some(color) = neighbor_average(&out, &known, w, h, x, y) {
                    filled.push((x, y, color));
                } else {
                    still_unknown.push((x, y));
                }
            }

            if filled.is_empty() {
                break;
            }
            // Newly filled pixels become known only after the pass so the
            // fill front advances one ring per iteration.
            for &(x, y, color) in &filled {
                out.put_pixel(x, y, color);
                known[(y * w + x) as usize] = true;
            }
            unknown = still_unknown;
        }

        for (x, y) in unknown {
            out.put_pixel(x, y, Rgba([255, 255, 255, 255]));
        }

        DynamicImage::ImageRgba8(out)
    }
}

fn neighbor_average(
    img: &RgbaImage,
    known: &[bool],
    w: u32,
    h: u32,
    x: u32,
    y: u32,
) -> Option<Rgba<u8>> {
    let mut sum = [0u32; 3];
    let mut count = 0u32;
    for dy in -1i64..=1 {
        for dx in -1i64..=1 {
            if dx == 0 && dy == 0 {
                continue;
            }
            let nx = x as i64 + dx;
            let ny = y as i64 + dy;
            if nx < 0 || ny < 0 || nx >= w as i64 || ny >= h as i64 {
                continue;
            }
            if known[(ny as u32 * w + nx as u32) as usize] {
                let p = img.get_pixel(nx as u32, ny as u32);
                sum[0] += p[0] as u32;
                sum[1] += p[1] as u32;
                sum[2] += p[2] as u32;
                count += 1;
            }
        }
    }
    if count == 0 {
        return None;
    }
    Some(Rgba([
        (sum[0] / count) as u8,
        (sum[1] / count) as u8,
        (sum[2] / count) as u8,
        255,
    ]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn masked_text_is_replaced_by_surrounding_tone() {
        // Gray background with a black "glyph" in the middle, fully masked.
        let mut canvas = RgbaImage::from_pixel(20, 20, Rgba([200, 200, 200, 255]));
        let mut mask = GrayImage::from_pixel(20, 20, Luma([0]));
        for y in 8..12 {
            for x in 8..12 {
                canvas.put_pixel(x, y, Rgba([0, 0, 0, 255]));
                mask.put_pixel(x, y, Luma([255]));
            }
        }

        let inpainter = NeighborFillInpainter::new(16);
        let out = inpainter
            .inpaint(&DynamicImage::ImageRgba8(canvas), &mask)
            .to_rgba8();

        for y in 8..12 {
            for x in 8..12 {
                let p = out.get_pixel(x, y);
                assert!(p[0] > 150, "pixel ({x},{y}) kept glyph color: {:?}", p);
            }
        }
    }

    #[test]
    fn unmasked_pixels_are_untouched() {
        let canvas = RgbaImage::from_pixel(10, 10, Rgba([37, 41, 43, 255]));
        let mut mask = GrayImage::from_pixel(10, 10, Luma([0]));
        mask.put_pixel(5, 5, Luma([255]));

        let inpainter = NeighborFillInpainter::new(4);
        let out = inpainter
            .inpaint(&DynamicImage::ImageRgba8(canvas), &mask)
            .to_rgba8();

        assert_eq!(out.get_pixel(0, 0), &Rgba([37, 41, 43, 255]));
        assert_eq!(out.get_pixel(5, 5), &Rgba([37, 41, 43, 255]));
    }

    #[test]
    fn empty_mask_returns_canvas_unchanged() {
        let canvas = DynamicImage::ImageRgba8(RgbaImage::from_pixel(5, 5, Rgba([1, 2, 3, 255])));
        let mask = GrayImage::from_pixel(5, 5, Luma([0]));
        let out = NeighborFillInpainter::new(8).inpaint(&canvas, &mask);
        assert_eq!(out.to_rgba8(), canvas.to_rgba8());
    }
}
