//! Horizontal bounds finalization.
//!
//! Vertical bounds come from the tree builder; this module settles left and
//! right edges and the per-question horizontal offset. Stored rectangles are
//! the true detected positions: the offset is reported for render-time
//! alignment but never applied here.

use crate::config::SliceConfig;
use crate::detect::MarkColumns;
use crate::geom::GlyphBox;

/// Slack below a part's bottom when searching for its mark box. Mark boxes
/// sit on the last line of a part and routinely poke past the measured
/// boundary.
const MARK_LOOKUP_SLACK_PX: i32 = 50;

/// Resolves left/right edges for every part of one question.
#[derive(Debug, Clone)]
pub struct HorizontalCalc {
    columns: MarkColumns,
    /// Right edge of true content: the rightmost mark column plus padding,
    /// or the composite width when the question has no marks at all.
    content_right: i32,
    numeral_left: Option<i32>,
    padding: i32,
}

impl HorizontalCalc {
    pub fn new(
        columns: MarkColumns,
        composite_width: i32,
        numeral_bbox: Option<GlyphBox>,
        cfg: &SliceConfig,
    ) -> Self {
        let padding = cfg.padding_px as i32;
        let content_right = columns
            .max_margin()
            .map_or(composite_width, |m| (m + padding).min(composite_width));
        Self {
            columns,
            content_right,
            numeral_left: numeral_bbox.map(|b| b.left),
            padding,
        }
    }

    pub fn content_right(&self) -> i32 {
        self.content_right
    }

    /// Left edge for the question root: just left of the numeral glyphs.
    pub fn root_left(&self) -> i32 {
        self.numeral_left.map_or(0, |x| (x - self.padding).max(0))
    }

    /// Left edge for a sub-part: just left of its label glyphs.
    pub fn label_left(&self, label_box: Option<GlyphBox>) -> i32 {
        label_box.map_or(0, |b| (b.left - self.padding).max(0))
    }

    /// Right edge for a part spanning `[top, bottom)`.
    ///
    /// A mark inside the span (with slack) pins the edge to that page's
    /// mark column; otherwise the part gets `content_right`. Once any mark
    /// exists, nothing falls back to the composite width, which is how
    /// parent and context rectangles end up correctly clipped.
    pub fn right_for(&self, top: i32, bottom: i32) -> i32 {
        for &(mark_y, margin) in &self.columns.margins {
            if top <= mark_y && mark_y <= bottom + MARK_LOOKUP_SLACK_PX {
                return (margin + self.padding).min(self.content_right);
            }
        }
        self.content_right
    }

    /// Signed shift of this question's numeral from the batch reference.
    /// Positive means the question sits right of the reference.
    pub fn horizontal_offset(&self, reference_x: Option<i32>) -> i32 {
        match (self.numeral_left, reference_x) {
            (Some(numeral), Some(reference)) => numeral - reference,
            _ => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{normalize_mark_boxes, MarkBox};
    use crate::diagnostics::DiagContext;

    fn columns(marks: &[MarkBox]) -> MarkColumns {
        let ctx = DiagContext {
            pdf_name: "t".into(),
            exam_code: "0478".into(),
            question_number: 1,
        };
        normalize_mark_boxes(marks, None, &ctx)
    }

    fn mark(value: u32, y: i32, right: i32) -> MarkBox {
        MarkBox {
            value,
            y,
            bbox: GlyphBox { left: right - 30, top: y, right, bottom: y + 20 },
        }
    }

    #[test]
    fn no_marks_means_full_width() {
        let calc = HorizontalCalc::new(MarkColumns::default(), 1654, None, &SliceConfig::default());
        assert_eq!(calc.content_right(), 1654);
        assert_eq!(calc.right_for(0, 500), 1654);
    }

    #[test]
    fn marks_pin_the_right_edge() {
        let calc = HorizontalCalc::new(
            columns(&[mark(3, 100, 1600)]),
            1654,
            None,
            &SliceConfig::default(),
        );
        assert_eq!(calc.content_right(), 1605);
        // Part containing the mark.
        assert_eq!(calc.right_for(0, 120), 1605);
        // Part without a mark still clips to content, not composite width.
        assert_eq!(calc.right_for(400, 600), 1605);
    }

    #[test]
    fn left_edges_hug_the_labels() {
        let numeral = GlyphBox { left: 60, top: 0, right: 90, bottom: 25 };
        let calc = HorizontalCalc::new(
            MarkColumns::default(),
            1654,
            Some(numeral),
            &SliceConfig::default(),
        );
        assert_eq!(calc.root_left(), 55);
        let label = GlyphBox { left: 3, top: 100, right: 40, bottom: 120 };
        assert_eq!(calc.label_left(Some(label)), 0);
        assert_eq!(calc.label_left(None), 0);
    }

    #[test]
    fn offset_is_signed_and_unapplied() {
        let numeral = GlyphBox { left: 70, top: 0, right: 95, bottom: 25 };
        let calc = HorizontalCalc::new(
            MarkColumns::default(),
            1654,
            Some(numeral),
            &SliceConfig::default(),
        );
        assert_eq!(calc.horizontal_offset(Some(50)), 20);
        assert_eq!(calc.horizontal_offset(None), 0);
    }
}
