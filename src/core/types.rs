// Core data model shared across all pipeline stages

use serde::{Deserialize, Serialize};

/// Axis-aligned rectangle in canvas or panel pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}

impl Rect {
    pub fn new(x: i32, y: i32, w: i32, h: i32) -> Self {
        Self { x, y, w, h }
    }

    pub fn top(&self) -> i32 {
        self.y
    }

    pub fn bottom(&self) -> i32 {
        self.y + self.h
    }

    /// Axis-aligned bounding box of a polygon. Returns None for fewer than 3 points.
    pub fn bounding(polygon: &[[i32; 2]]) -> Option<Self> {
        if polygon.len() < 3 {
            return None;
        }
        let min_x = polygon.iter().map(|p| p[0]).min()?;
        let max_x = polygon.iter().map(|p| p[0]).max()?;
        let min_y = polygon.iter().map(|p| p[1]).min()?;
        let max_y = polygon.iter().map(|p| p[1]).max()?;
        Some(Self::new(min_x, min_y, max_x - min_x, max_y - min_y))
    }
}

/// Filter agent decision for one text region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FilterDecision {
    Keep,
    Drop,
}

/// Fixed-schema record written by the filter stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterOutcome {
    pub decision: FilterDecision,
    pub category: String,
    pub confidence: f32,
    pub reasoning: String,
}

impl FilterOutcome {
    /// Conservative default: anything we cannot classify stays in the chapter.
    pub fn keep(reasoning: impl Into<String>) -> Self {
        Self {
            decision: FilterDecision::Keep,
            category: "dialogue".to_string(),
            confidence: 0.5,
            reasoning: reasoning.into(),
        }
    }
}

/// Fixed-schema record written by the translation stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranslationOutcome {
    pub translated: String,
    pub tone: String,
    #[serde(default)]
    pub notes: String,
}

impl TranslationOutcome {
    /// Conservative default: the original text passes through unchanged.
    pub fn passthrough(original: &str, notes: impl Into<String>) -> Self {
        Self {
            translated: original.to_string(),
            tone: "unknown".to_string(),
            notes: notes.into(),
        }
    }
}

/// A detected span of text with geometry and per-stage enrichment.
///
/// Identity is positional: a region is addressed by its index within the
/// owning collection. `panel_index` is assigned exactly once, by whichever
/// stage owns panel segmentation at detection time, and never mutated after.
/// Regions are enriched in place and never removed; a region the filter
/// drops still participates in mask building.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TextRegion {
    #[serde(flatten)]
    pub rect: Rect,
    pub text: String,
    pub confidence: f32,
    pub panel_index: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub polygon: Option<Vec<[i32; 2]>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<FilterOutcome>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub translation: Option<TranslationOutcome>,
}

impl TextRegion {
    pub fn from_rect(rect: Rect, text: impl Into<String>, confidence: f32) -> Self {
        Self {
            rect,
            text: text.into(),
            confidence,
            panel_index: 0,
            polygon: None,
            filter: None,
            translation: None,
        }
    }

    /// Build from a detection polygon; the rect is derived as the polygon's
    /// axis-aligned bounding box and the polygon stays authoritative.
    pub fn from_polygon(polygon: Vec<[i32; 2]>, text: impl Into<String>, confidence: f32) -> Self {
        let rect = Rect::bounding(&polygon).unwrap_or(Rect::new(0, 0, 0, 0));
        Self {
            rect,
            text: text.into(),
            confidence,
            panel_index: 0,
            polygon: Some(polygon),
            filter: None,
            translation: None,
        }
    }

    pub fn is_kept(&self) -> bool {
        // Unfiltered regions count as kept; only an explicit DROP excludes one.
        !matches!(
            self.filter,
            Some(FilterOutcome {
                decision: FilterDecision::Drop,
                ..
            })
        )
    }
}

/// One entry of the stitcher's coordinate map: the vertical span
/// `[y_start, y_end)` of the canvas contributed by source panel `panel_index`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinateSpan {
    pub y_start: u32,
    pub y_end: u32,
    pub panel_index: usize,
}
