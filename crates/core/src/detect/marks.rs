//! Mark-box detection: `[N]` allocations in the right margin.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::warn;

use crate::diagnostics::{DiagContext, DiagnosticsCollector};
use crate::geom::{GlyphBox, PdfRect, PixelMapper};
use crate::pdf::TextData;

static MARK_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[\s*(\d{1,2})\s*\]").unwrap());

/// Y gap between marks that indicates a page boundary inside a composite.
const PAGE_GAP_THRESHOLD_PX: i32 = 200;

/// A mark further left of the page's mark column than this is a bracketed
/// number inside body text, not an allocation.
const OUTLIER_DEVIATION_PX: i32 = 100;

/// Residual right-edge spread that still earns a warning.
const MINOR_VARIANCE_PX: i32 = 10;

/// A detected `[N]` mark allocation in composite pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarkBox {
    pub value: u32,
    /// Top of the mark glyph box; the anchor used for part assignment.
    pub y: i32,
    pub bbox: GlyphBox,
}

/// Scans every span of a segment's text for `[N]` tokens.
///
/// No positional filtering happens here; prose routinely contains bracketed
/// numbers, and telling them apart needs the whole question's marks at once
/// (see [`normalize_mark_boxes`]).
pub fn detect_mark_boxes(
    data: &TextData,
    clip: PdfRect,
    dpi: u32,
    y_offset: i32,
    trim_offset: (i32, i32),
) -> Vec<MarkBox> {
    let mapper = PixelMapper::new(clip, dpi, y_offset, trim_offset);
    let mut marks = Vec::new();

    for line in data.lines() {
        for span in &line.spans {
            if span.chars.is_empty() {
                continue;
            }
            let (text, offsets) = span.text_with_offsets();
            for caps in MARK_PATTERN.captures_iter(&text) {
                let Ok(value) = caps[1].parse::<u32>() else { continue };
                let m = caps.get(0).unwrap();
                let Some(bbox) = span.bbox_for_byte_range(&offsets, m.start(), m.end()) else {
                    continue;
                };
                let gbox = mapper.glyph_box(bbox);
                marks.push(MarkBox { value, y: gbox.top, bbox: gbox });
            }
        }
    }
    marks
}

/// Accepted marks plus the per-page right-margin column they establish.
#[derive(Debug, Clone, Default)]
pub struct MarkColumns {
    /// Marks that survived outlier rejection, sorted by Y.
    pub accepted: Vec<MarkBox>,
    /// `(mark_y, page_margin_right_edge)` for each accepted mark.
    pub margins: Vec<(i32, i32)>,
}

impl MarkColumns {
    /// Right-margin column for a mark at the given Y, if one was accepted
    /// there.
    pub fn margin_at(&self, y: i32) -> Option<i32> {
        self.margins.iter().find(|&&(my, _)| my == y).map(|&(_, m)| m)
    }

    /// The rightmost margin across all pages of the question.
    pub fn max_margin(&self) -> Option<i32> {
        self.margins.iter().map(|&(_, m)| m).max()
    }

    pub fn is_empty(&self) -> bool {
        self.accepted.is_empty()
    }
}

/// Rejects false-positive marks and derives the per-page mark column.
///
/// Marks are clustered into pages by Y gaps, then each cluster's rightmost
/// edge defines the page's mark column. Anything more than 100px left of
/// that column is a bracketed number inside body text: it is dropped and a
/// `layout_issue` diagnostic records the rejection. Survivors whose right
/// edges still spread more than 10px get a minor-variance warning but are
/// kept; the column is the maximum right edge.
pub fn normalize_mark_boxes(
    marks: &[MarkBox],
    diagnostics: Option<&DiagnosticsCollector>,
    ctx: &DiagContext,
) -> MarkColumns {
    if marks.is_empty() {
        return MarkColumns::default();
    }

    let mut sorted: Vec<MarkBox> = marks.to_vec();
    sorted.sort_by_key(|m| m.y);

    let mut columns = MarkColumns::default();

    for (page_idx, cluster) in cluster_by_page(&sorted).into_iter().enumerate() {
        let max_right = cluster.iter().map(|m| m.bbox.right).max().unwrap_or(0);

        let mut survivors = Vec::with_capacity(cluster.len());
        for mark in cluster {
            let deviation = max_right - mark.bbox.right;
            if deviation > OUTLIER_DEVIATION_PX {
                warn!(
                    value = mark.value,
                    y = mark.y,
                    deviation,
                    "skipping outlier mark box inside body text"
                );
                if let Some(collector) = diagnostics {
                    collector.add_layout_issue(
                        ctx,
                        page_idx,
                        format!(
                            "Skipping malformed mark box: [mark {}] deviates by {}px from margin",
                            mark.value, deviation
                        ),
                        (mark.y, mark.bbox.bottom),
                        format!("Mark [{}]", mark.value),
                        format!("Margin @ {max_right}"),
                    );
                }
            } else {
                survivors.push(mark);
            }
        }

        if survivors.is_empty() {
            continue;
        }

        let min_right = survivors.iter().map(|m| m.bbox.right).min().unwrap_or(max_right);
        if max_right - min_right > MINOR_VARIANCE_PX {
            warn!(
                min_right,
                max_right,
                "mark boxes vary within page, using max right edge"
            );
        }

        for mark in survivors {
            columns.margins.push((mark.y, max_right));
            columns.accepted.push(mark);
        }
    }

    columns.accepted.sort_by_key(|m| m.y);
    columns.margins.sort_by_key(|&(y, _)| y);
    columns
}

/// Splits Y-sorted marks into per-page clusters at large gaps.
fn cluster_by_page(sorted: &[MarkBox]) -> Vec<Vec<MarkBox>> {
    let mut pages: Vec<Vec<MarkBox>> = Vec::new();
    let mut current: Vec<MarkBox> = Vec::new();

    for &mark in sorted {
        match current.last() {
            Some(prev) if mark.y - prev.y > PAGE_GAP_THRESHOLD_PX => {
                pages.push(std::mem::take(&mut current));
                current.push(mark);
            }
            _ => current.push(mark),
        }
    }
    if !current.is_empty() {
        pages.push(current);
    }
    pages
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mark(value: u32, y: i32, right: i32) -> MarkBox {
        MarkBox {
            value,
            y,
            bbox: GlyphBox { left: right - 30, top: y, right, bottom: y + 20 },
        }
    }

    fn ctx() -> DiagContext {
        DiagContext {
            pdf_name: "0478_s24_qp_12".into(),
            exam_code: "0478".into(),
            question_number: 1,
        }
    }

    #[test]
    fn stray_prose_mark_is_rejected() {
        let marks = vec![mark(4, 100, 1600), mark(1, 150, 800)];
        let columns = normalize_mark_boxes(&marks, None, &ctx());
        assert_eq!(columns.accepted.len(), 1);
        assert_eq!(columns.accepted[0].value, 4);
        assert_eq!(columns.max_margin(), Some(1600));
    }

    #[test]
    fn rejection_is_recorded_as_layout_issue() {
        let collector = DiagnosticsCollector::new();
        let marks = vec![mark(4, 100, 1600), mark(1, 150, 800)];
        normalize_mark_boxes(&marks, Some(&collector), &ctx());
        let report = collector.report();
        assert_eq!(report.total_issues, 1);
        assert_eq!(report.issues[0].issue_type, "layout_issue");
    }

    #[test]
    fn pages_cluster_independently() {
        // Second page sits 2000px lower and is 40px narrower; both of its
        // marks are within tolerance of their own page's margin.
        let marks = vec![
            mark(2, 100, 1600),
            mark(3, 300, 1598),
            mark(4, 2400, 1560),
            mark(5, 2600, 1561),
        ];
        let columns = normalize_mark_boxes(&marks, None, &ctx());
        assert_eq!(columns.accepted.len(), 4);
        assert_eq!(columns.margin_at(100), Some(1600));
        assert_eq!(columns.margin_at(2400), Some(1561));
        assert_eq!(columns.max_margin(), Some(1600));
    }

    #[test]
    fn all_marks_within_tolerance_survive() {
        let marks = vec![mark(1, 100, 1600), mark(2, 200, 1520)];
        let columns = normalize_mark_boxes(&marks, None, &ctx());
        assert_eq!(columns.accepted.len(), 2);
    }
}
