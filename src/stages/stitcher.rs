// Vertical panel stitcher: concatenates ordered panels into one canvas and
// emits the coordinate map used for provenance.

use image::{DynamicImage, Rgba, RgbaImage};
use tracing::{info, warn};

use crate::core::errors::StitchError;
use crate::core::types::CoordinateSpan;

/// Result of stitching: the tall canvas plus the panel provenance map.
pub struct StitchOutput {
    pub canvas: DynamicImage,
    pub coord_map: Vec<CoordinateSpan>,
}

/// Stitch decoded panels top-to-bottom into a single canvas.
///
/// The canvas is as wide as the widest panel; narrower panels are pasted
/// horizontally centered on a white background. Slots that failed to decode
/// (`None`) are skipped with a warning; their index simply never appears in
/// the coordinate map, which stays contiguous over the panels that landed.
pub fn stitch_panels(panels: &[Option<DynamicImage>]) -> Result<StitchOutput, StitchError> {
    if panels.is_empty() {
        return Err(StitchError::NoPanels);
    }

    let decoded: Vec<(usize, &DynamicImage)> = panels
        .iter()
        .enumerate()
        .filter_map(|(i, p)| p.as_ref().map(|img| (i, img)))
        .collect();

    if decoded.is_empty() {
        return Err(StitchError::AllPanelsFailed(panels.len()));
    }

    for (i, slot) in panels.iter().enumerate() {
        if slot.is_none() {
            warn!("panel {} failed to decode, leaving a gap in the chapter", i);
        }
    }

    let max_width = decoded.iter().map(|(_, img)| img.width()).max().unwrap_or(1);
    let total_height: u32 = decoded.iter().map(|(_, img)| img.height()).sum();

    info!(
        "Stitching {} panels into {}x{} canvas",
        decoded.len(),
        max_width,
        total_height
    );

    let mut canvas = RgbaImage::from_pixel(max_width, total_height, Rgba([255, 255, 255, 255]));

    let mut coord_map = Vec::with_capacity(decoded.len());
    let mut current_y: u32 = 0;

    for (panel_index, panel) in decoded {
        let x_offset = (max_width - panel.width()) / 2;
        image::imageops::overlay(
            &mut canvas,
            &panel.to_rgba8(),
            x_offset as i64,
            current_y as i64,
        );

        let y_end = current_y + panel.height();
        coord_map.push(CoordinateSpan {
            y_start: current_y,
            y_end,
            panel_index,
        });
        current_y = y_end;
    }

    Ok(StitchOutput {
        canvas: DynamicImage::ImageRgba8(canvas),
        coord_map,
    })
}
