// Small geometry helpers shared by the pipeline stages.

use crate::core::types::TextRegion;

/// Translate regions from slice-local coordinates into canvas space and
/// stamp them with the sub-panel they were detected on.
pub fn into_canvas_space(
    mut regions: Vec<TextRegion>,
    y_offset: u32,
    panel_index: usize,
) -> Vec<TextRegion> {
    for region in &mut regions {
        region.rect.y += y_offset as i32;
        if let Some(polygon) = &mut region.polygon {
            for point in polygon {
                point[1] += y_offset as i32;
            }
        }
        region.panel_index = panel_index;
    }
    regions
}

/// Reading order for vertical comics: top to bottom, ties left to right.
pub fn sort_reading_order(regions: &mut [TextRegion]) {
    regions.sort_by_key(|r| (r.rect.y, r.rect.x));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::Rect;

    #[test]
    fn offsets_rect_and_polygon_together() {
        let regions = vec![TextRegion::from_polygon(
            vec![[0, 0], [10, 0], [10, 10], [0, 10]],
            "t",
            0.9,
        )];
        let moved = into_canvas_space(regions, 500, 3);

        assert_eq!(moved[0].rect.y, 500);
        assert_eq!(moved[0].rect.x, 0);
        assert_eq!(moved[0].polygon.as_ref().unwrap()[2], [10, 510]);
        assert_eq!(moved[0].panel_index, 3);
    }

    #[test]
    fn reading_order_is_top_down_then_left_right() {
        let mut regions = vec![
            TextRegion::from_rect(Rect::new(50, 100, 10, 10), "third", 0.9),
            TextRegion::from_rect(Rect::new(0, 0, 10, 10), "first", 0.9),
            TextRegion::from_rect(Rect::new(10, 100, 10, 10), "second", 0.9),
        ];
        sort_reading_order(&mut regions);
        let texts: Vec<&str> = regions.iter().map(|r| r.text.as_str()).collect();
        assert_eq!(texts, vec!["first", "second", "third"]);
    }
}
