//! Field geometry
//!
//! Converts the oracle's normalized, top-left-origin polygons into PDF
//! point rectangles (bottom-left origin) and places the input area next
//! to the detected label instead of on top of it.
//!
//! The label offsets are estimates tuned on sample forms, so every constant
//! lives in [`GeometryConfig`].

use serde::{Deserialize, Serialize};

use super::types::{FieldKind, NormalizedRect};
use crate::oracle::NormalizedVertex;

/// Rectangle in PDF points, origin at the bottom-left of the page
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PdfRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl PdfRect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self { x, y, width, height }
    }

    /// Build from two corners in any order
    pub fn from_corners(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self {
            x: x1.min(x2),
            y: y1.min(y2),
            width: (x2 - x1).abs(),
            height: (y2 - y1).abs(),
        }
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn top(&self) -> f64 {
        self.y + self.height
    }

    /// Finite with a positive area
    pub fn is_valid(&self) -> bool {
        [self.x, self.y, self.width, self.height]
            .iter()
            .all(|v| v.is_finite())
            && self.width > 0.0
            && self.height > 0.0
    }

    /// Same size, shifted horizontally
    pub fn shifted_x(&self, dx: f64) -> Self {
        Self { x: self.x + dx, ..*self }
    }
}

/// Page size in points
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageSize {
    pub width: f64,
    pub height: f64,
}

impl PageSize {
    /// US Letter, used when a page has no usable MediaBox
    pub const LETTER: PageSize = PageSize {
        width: 612.0,
        height: 792.0,
    };
}

/// Heuristic constants for field placement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeometryConfig {
    /// Average glyph advance used to estimate where the separator ends
    pub glyph_width: f64,
    /// Gap between the separator and the input area
    pub label_margin: f64,
    /// Drop below the label baseline
    pub line_margin: f64,
    pub min_text_width: f64,
    pub min_text_height: f64,
    /// Checkboxes are always this square
    pub checkbox_size: f64,
    pub min_signature_width: f64,
    pub min_signature_height: f64,
    /// Horizontal distance between the boxes of a yes/no group
    pub yes_no_spacing: f64,
    pub text_font_size: f32,
}

impl Default for GeometryConfig {
    fn default() -> Self {
        Self {
            glyph_width: 5.5,
            label_margin: 4.0,
            line_margin: 2.0,
            min_text_width: 150.0,
            min_text_height: 16.0,
            checkbox_size: 12.0,
            min_signature_width: 180.0,
            min_signature_height: 40.0,
            yes_no_spacing: 40.0,
            text_font_size: 10.0,
        }
    }
}

impl GeometryConfig {
    /// Minimum (width, height) for a field kind
    pub fn minimum_size(&self, kind: FieldKind) -> (f64, f64) {
        match kind {
            FieldKind::Checkbox => (self.checkbox_size, self.checkbox_size),
            FieldKind::Signature => (self.min_signature_width, self.min_signature_height),
            _ => (self.min_text_width, self.min_text_height),
        }
    }

    /// Estimated distance from the label start to the input area, given
    /// the char position of the separator
    pub fn separator_offset(&self, separator_index: usize) -> f64 {
        (separator_index + 1) as f64 * self.glyph_width + self.label_margin
    }
}

/// Place the input area for a label polygon
///
/// `vertices` are ordered top-left, top-right, bottom-right, bottom-left.
/// `separator_index` is where the label/value separator sits in the block
/// text, as found by `split_label`. Returns `None` when fewer than four
/// vertices are supplied.
pub fn to_pdf_rect(
    vertices: &[NormalizedVertex],
    page: PageSize,
    separator_index: Option<usize>,
    kind: FieldKind,
    config: &GeometryConfig,
) -> Option<PdfRect> {
    if vertices.len() < 4 {
        return None;
    }

    let label_x = vertices[0].x * page.width;
    let label_top = page.height - vertices[0].y * page.height;
    let raw_width = ((vertices[1].x - vertices[0].x) * page.width).max(0.0);
    let raw_height = ((vertices[2].y - vertices[0].y) * page.height).max(0.0);

    let offset = separator_index
        .map(|index| config.separator_offset(index))
        .unwrap_or(0.0);

    let (min_width, min_height) = config.minimum_size(kind);
    let (width, height) = match kind {
        FieldKind::Checkbox => (min_width, min_height),
        _ => (
            (raw_width - offset).max(min_width),
            raw_height.max(min_height),
        ),
    };

    let mut x = label_x + offset;
    let mut y = label_top - raw_height - config.line_margin;

    // Keep the widget on the page without shrinking it below the minimums
    if x + width > page.width {
        x = page.width - width;
    }
    if y + height > page.height {
        y = page.height - height;
    }
    x = x.max(0.0);
    y = y.max(0.0);

    Some(PdfRect::new(x, y, width, height))
}

impl NormalizedRect {
    /// Express a point rectangle relative to its page (top-left origin)
    pub fn from_pdf_rect(rect: &PdfRect, page: PageSize) -> Option<Self> {
        if page.width <= 0.0 || page.height <= 0.0 || !rect.is_valid() {
            return None;
        }
        let x = (rect.x / page.width).clamp(0.0, 1.0);
        let y = ((page.height - rect.top()) / page.height).clamp(0.0, 1.0);
        let width = (rect.width / page.width).min(1.0 - x);
        let height = (rect.height / page.height).min(1.0 - y);
        if width <= 0.0 || height <= 0.0 {
            return None;
        }
        Some(Self { x, y, width, height })
    }
}

/// Centered, aspect-preserving placement of an image inside a rectangle
pub fn fit_image(rect: &PdfRect, image_width: u32, image_height: u32) -> PdfRect {
    if image_width == 0 || image_height == 0 || !rect.is_valid() {
        return *rect;
    }
    let image_aspect = image_width as f64 / image_height as f64;
    let rect_aspect = rect.width / rect.height;

    let (width, height) = if rect_aspect > image_aspect {
        (rect.height * image_aspect, rect.height)
    } else {
        (rect.width, rect.width / image_aspect)
    };

    PdfRect::new(
        rect.x + (rect.width - width) / 2.0,
        rect.y + (rect.height - height) / 2.0,
        width,
        height,
    )
}
