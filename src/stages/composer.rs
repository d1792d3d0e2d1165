// Final assembly: cuts the rendered canvas back into the original panel
// spans and writes the chapter artifacts to disk.

use std::fs;
use std::path::Path;

use anyhow::Context;
use image::DynamicImage;
use tracing::info;

use crate::core::types::{CoordinateSpan, TextRegion};

/// Cut the rendered canvas back into per-panel images using the stitcher's
/// coordinate map. Each entry keeps its original panel index so gaps left
/// by failed downloads survive into the output naming.
pub fn split_by_coord_map(
    canvas: &DynamicImage,
    coord_map: &[CoordinateSpan],
) -> Vec<(usize, DynamicImage)> {
    coord_map
        .iter()
        .filter(|span| span.y_end > span.y_start)
        .map(|span| {
            let slice = canvas.crop_imm(0, span.y_start, canvas.width(), span.y_end - span.y_start);
            (span.panel_index, slice)
        })
        .collect()
}

/// Write the translated chapter to `out_dir`: numbered panel images, the
/// full canvas, and the enriched region records as JSON.
pub fn write_outputs(
    out_dir: &Path,
    canvas: &DynamicImage,
    panels: &[(usize, DynamicImage)],
    regions: &[TextRegion],
) -> anyhow::Result<()> {
    fs::create_dir_all(out_dir)
        .with_context(|| format!("creating output directory {}", out_dir.display()))?;

    for (index, panel) in panels {
        let path = out_dir.join(format!("panel_{index:03}.png"));
        panel
            .save(&path)
            .with_context(|| format!("saving {}", path.display()))?;
    }

    let canvas_path = out_dir.join("canvas.png");
    canvas
        .save(&canvas_path)
        .with_context(|| format!("saving {}", canvas_path.display()))?;

    let regions_path = out_dir.join("regions.json");
    let json = serde_json::to_string_pretty(regions).context("serializing region records")?;
    fs::write(&regions_path, json)
        .with_context(|| format!("writing {}", regions_path.display()))?;

    info!(
        "wrote {} panel(s), canvas, and {} region record(s) to {}",
        panels.len(),
        regions.len(),
        out_dir.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    #[test]
    fn split_restores_original_panel_heights() {
        let canvas = DynamicImage::ImageRgba8(RgbaImage::from_pixel(
            100,
            300,
            Rgba([10, 10, 10, 255]),
        ));
        let map = vec![
            CoordinateSpan { y_start: 0, y_end: 120, panel_index: 0 },
            CoordinateSpan { y_start: 120, y_end: 300, panel_index: 2 },
        ];

        let panels = split_by_coord_map(&canvas, &map);
        assert_eq!(panels.len(), 2);
        assert_eq!(panels[0].0, 0);
        assert_eq!(panels[0].1.height(), 120);
        assert_eq!(panels[1].0, 2);
        assert_eq!(panels[1].1.height(), 180);
        assert_eq!(panels[1].1.width(), 100);
    }

    #[test]
    fn empty_spans_are_dropped() {
        let canvas = DynamicImage::ImageRgba8(RgbaImage::new(10, 10));
        let map = vec![CoordinateSpan { y_start: 5, y_end: 5, panel_index: 0 }];
        assert!(split_by_coord_map(&canvas, &map).is_empty());
    }
}
