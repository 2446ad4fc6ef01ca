//! Text spans for keyword search.
//!
//! Converts per-segment text into composite-pixel spans, filters them by
//! part rectangles, and cleans the result for metadata storage.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::geom::{PdfRect, PixelMapper};
use crate::model::PixelRect;
use crate::pdf::TextData;

static DOT_LEADER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\.{3,}").unwrap());
static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// One line of text positioned in composite pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct TextSpanPx {
    pub top: i32,
    pub bottom: i32,
    pub left: i32,
    pub right: i32,
    pub text: String,
}

/// Extracts positioned line texts from one segment, sorted by top edge.
pub fn extract_text_spans(
    data: &TextData,
    clip: PdfRect,
    dpi: u32,
    y_offset: i32,
    trim_offset: (i32, i32),
) -> Vec<TextSpanPx> {
    let mapper = PixelMapper::new(clip, dpi, y_offset, trim_offset);
    let mut spans: Vec<TextSpanPx> = Vec::new();

    for line in data.lines() {
        let text = line.text();
        let trimmed = text.trim();
        if trimmed.is_empty() {
            continue;
        }
        let Some(bbox) = line.bbox() else { continue };
        let gbox = mapper.glyph_box(bbox);
        spans.push(TextSpanPx {
            top: gbox.top.max(0),
            bottom: gbox.bottom.max(1),
            left: gbox.left.max(0),
            right: gbox.right.max(1),
            text: trimmed.to_string(),
        });
    }

    spans.sort_by_key(|s| s.top);
    spans
}

/// Concatenates the text of spans overlapping a part rectangle.
///
/// Filtering is by both axes: margin text ("DO NOT WRITE IN THIS AREA")
/// sits outside the content rectangle horizontally and must not leak into
/// keyword text.
pub fn text_for_region(spans: &[TextSpanPx], rect: &PixelRect, composite_width: i32) -> String {
    let right = rect.right_or(composite_width);
    let mut parts: Vec<&str> = Vec::new();

    for span in spans {
        if span.bottom <= rect.top {
            continue;
        }
        if span.top >= rect.bottom {
            // Spans are sorted by top edge.
            break;
        }
        if span.right <= rect.left || span.left >= right {
            continue;
        }
        parts.push(&span.text);
    }
    parts.join(" ").trim().to_string()
}

/// Removes answer-line dot leaders and collapses whitespace.
pub fn sanitize_metadata_text(text: &str) -> String {
    let without_dots = DOT_LEADER_RE.replace_all(text, " ");
    WHITESPACE_RE.replace_all(&without_dots, " ").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn span(top: i32, bottom: i32, left: i32, right: i32, text: &str) -> TextSpanPx {
        TextSpanPx { top, bottom, left, right, text: text.to_string() }
    }

    #[test]
    fn region_filter_is_two_dimensional() {
        let spans = vec![
            span(10, 30, 50, 400, "Question text"),
            span(10, 30, 500, 600, "DO NOT WRITE"),
            span(400, 420, 50, 300, "Out of range below"),
        ];
        let rect = PixelRect::new(0, 100, 0, Some(450)).unwrap();
        assert_eq!(text_for_region(&spans, &rect, 1654), "Question text");
    }

    #[test]
    fn sanitize_strips_answer_lines() {
        assert_eq!(sanitize_metadata_text("Explain: ........"), "Explain:");
        assert_eq!(sanitize_metadata_text("a  b\n c"), "a b c");
    }
}
