// Inpainting mask construction: rasterizes detected text regions onto a
// binary mask and dilates it so the inpainter erases glyph edges cleanly.

use image::{GrayImage, Luma};
use tracing::debug;

use crate::core::types::TextRegion;

/// Build the binary inpainting mask for a canvas of the given dimensions.
///
/// Every detected region contributes to the mask, whatever its filter
/// decision, so the cleaned canvas carries no source-language text at all.
/// Regions with a polygon are rasterized by scanline fill; rectangle-only
/// regions fill their bounding box. The result is dilated by `dilation`
/// pixels in each direction.
pub fn build_mask(width: u32, height: u32, regions: &[TextRegion], dilation: u32) -> GrayImage {
    let mut mask = GrayImage::from_pixel(width, height, Luma([0]));

    for region in regions {
        match &region.polygon {
            Some(polygon) if polygon.len() >= 3 => fill_polygon(&mut mask, polygon),
            _ => fill_rect(&mut mask, region),
        }
    }

    debug!("mask rasterized for {} region(s), dilating by {}", regions.len(), dilation);

    if dilation > 0 {
        dilate(&mask, dilation)
    } else {
        mask
    }
}

fn fill_rect(mask: &mut GrayImage, region: &TextRegion) {
    let (w, h) = (mask.width() as i32, mask.height() as i32);
    let x0 = region.rect.x.max(0);
    let y0 = region.rect.y.max(0);
    let x1 = (region.rect.x + region.rect.w).min(w);
    let y1 = (region.rect.y + region.rect.h).min(h);
    for y in y0..y1 {
        for x in x0..x1 {
            mask.put_pixel(x as u32, y as u32, Luma([255]));
        }
    }
}

/// Even-odd scanline fill. Handles the convex-ish quads OCR produces as
/// well as any simple polygon.
fn fill_polygon(mask: &mut GrayImage, polygon: &[[i32; 2]]) {
    let ys = polygon.iter().map(|p| p[1]);
    let y_min = ys.clone().min().unwrap_or(0).max(0);
    let y_max = polygon
        .iter()
        .map(|p| p[1])
        .max()
        .unwrap_or(0)
        .min(mask.height() as i32 - 1);

    for y in y_min..=y_max {
        let mut crossings = Vec::new();
        for i in 0..polygon.len() {
            let a = polygon[i];
            let b = polygon[(i + 1) % polygon.len()];
            let (y0, y1) = (a[1], b[1]);
            if (y0 <= y && y < y1) || (y1 <= y && y < y0) {
                let t = (y - y0) as f64 / (y1 - y0) as f64;
                crossings.push(a[0] as f64 + t * (b[0] - a[0]) as f64);
            }
        }
        crossings.sort_by(|a, b| a.total_cmp(b));
        for pair in crossings.chunks_exact(2) {
            let x0 = (pair[0].floor() as i32).max(0);
            let x1 = (pair[1].ceil() as i32).min(mask.width() as i32 - 1);
            for x in x0..=x1 {
                mask.put_pixel(x as u32, y as u32, Luma([255]));
            }
        }
    }
}

/// Separable box dilation: a horizontal max pass followed by a vertical
/// one, O(radius) per pixel instead of a full kernel sweep.
fn dilate(mask: &GrayImage, radius: u32) -> GrayImage {
    let (w, h) = (mask.width(), mask.height());
    let r = radius as i64;

    let mut horizontal = GrayImage::from_pixel(w, h, Luma([0]));
    for y in 0..h {
        for x in 0..w {
            let lo = (x as i64 - r).max(0) as u32;
            let hi = (x as i64 + r).min(w as i64 - 1) as u32;
            if (lo..=hi).any(|xx| mask.get_pixel(xx, y)[0] > 0) {
                horizontal.put_pixel(x, y, Luma([255]));
            }
        }
    }

    let mut out = GrayImage::from_pixel(w, h, Luma([0]));
    for y in 0..h {
        for x in 0..w {
            let lo = (y as i64 - r).max(0) as u32;
            let hi = (y as i64 + r).min(h as i64 - 1) as u32;
            if (lo..=hi).any(|yy| horizontal.get_pixel(x, yy)[0] > 0) {
                out.put_pixel(x, y, Luma([255]));
            }
        }
    }
    out
}
