// Whitespace-driven splitter: finds horizontal gutters on the stitched
// canvas and cuts it into sub-panels that fit OCR input limits, without
// ever slicing through detected text.

use image::DynamicImage;
use rayon::prelude::*;
use tracing::{debug, info};

use crate::core::config::SplitConfig;
use crate::core::types::TextRegion;

/// One sub-panel slice: the cropped image plus its vertical offset on the
/// original canvas, used to map OCR coordinates back to canvas space.
pub struct Slice {
    pub image: DynamicImage,
    pub y_offset: u32,
}

/// Find safe horizontal cut positions on the canvas.
///
/// A cut is the midpoint of a whitespace run at least
/// `min_whitespace_height` rows tall, kept only if it stays at least
/// `min_margin_from_text` pixels away from every region's vertical extent.
/// When more cuts survive than `max_subpanels` allows, an evenly strided
/// subset is kept so slices stay balanced. Never fails: a canvas with no
/// usable gutter yields no cuts and therefore a single slice.
pub fn find_cuts(canvas: &DynamicImage, regions: &[TextRegion], cfg: &SplitConfig) -> Vec<u32> {
    let gray = canvas.to_luma8();
    let (width, height) = (gray.width(), gray.height());
    if height == 0 || width == 0 {
        return Vec::new();
    }

    let raw = gray.as_raw();

    // Row whiteness scan is the hot loop on a 30k-pixel-tall canvas. A
    // row qualifies only when its white fraction strictly exceeds the
    // threshold; an exactly-at-threshold row does not.
    let white_rows: Vec<bool> = (0..height as usize)
        .into_par_iter()
        .map(|y| {
            let row = &raw[y * width as usize..(y + 1) * width as usize];
            let count = row.iter().filter(|&&p| p >= cfg.white_luma_cutoff).count();
            count as f32 > width as f32 * cfg.white_row_fraction
        })
        .collect();

    let mut candidates = Vec::new();
    let mut run_start: Option<usize> = None;
    for y in 0..=white_rows.len() {
        let white = y < white_rows.len() && white_rows[y];
        match (white, run_start) {
            (true, None) => run_start = Some(y),
            (false, Some(start)) => {
                let len = y - start;
                if len >= cfg.min_whitespace_height as usize {
                    candidates.push((start + len / 2) as u32);
                }
                run_start = None;
            }
            _ => {}
        }
    }

    let margin = cfg.min_margin_from_text as i64;
    let mut cuts: Vec<u32> = candidates
        .into_iter()
        .filter(|&cut| {
            let cut = cut as i64;
            !regions.iter().any(|r| {
                let top = r.rect.y as i64;
                let bottom = (r.rect.y + r.rect.h) as i64;
                cut + margin > top && cut - margin < bottom
            })
        })
        .filter(|&cut| cut > 0 && cut < height)
        .collect();

    let max_cuts = cfg.max_subpanels.saturating_sub(1);
    if cuts.len() > max_cuts {
        debug!(
            "thinning {} safe cuts down to {} to respect the sub-panel cap",
            cuts.len(),
            max_cuts
        );
        cuts = thin_by_stride(&cuts, max_cuts);
    }

    info!("smart split selected {} cut(s)", cuts.len());
    cuts
}

/// Keep `keep` entries from `cuts`, spaced evenly by index.
fn thin_by_stride(cuts: &[u32], keep: usize) -> Vec<u32> {
    if keep == 0 {
        return Vec::new();
    }
    let stride = cuts.len() as f64 / keep as f64;
    (0..keep)
        .map(|i| cuts[(i as f64 * stride) as usize])
        .collect()
}

/// Slice the canvas at the given cut positions (ascending, exclusive of the
/// canvas edges). With no cuts the whole canvas comes back as one slice.
pub fn slice_at_cuts(canvas: &DynamicImage, cuts: &[u32]) -> Vec<Slice> {
    let height = canvas.height();
    let width = canvas.width();

    let mut bounds = Vec::with_capacity(cuts.len() + 2);
    bounds.push(0);
    bounds.extend_from_slice(cuts);
    bounds.push(height);

    bounds
        .windows(2)
        .filter(|pair| pair[1] > pair[0])
        .map(|pair| Slice {
            image: canvas.crop_imm(0, pair[0], width, pair[1] - pair[0]),
            y_offset: pair[0],
        })
        .collect()
}
