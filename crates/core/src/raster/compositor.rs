//! Stitches rendered page segments into a single composite image.

use image::{GenericImage, GrayImage, Luma};

use crate::error::{ExtractError, Result};
use crate::geom::PdfRect;
use crate::pdf::PdfPages;

/// Where a question starts and ends within the PDF, potentially spanning
/// multiple pages. Coordinates are PDF points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuestionSpan {
    pub start_page: usize,
    pub start_y: f64,
    pub end_page: usize,
    pub end_y: f64,
}

/// A rendered section of one PDF page.
///
/// `y_offset` is assigned during stitching and translates PDF-space Y in
/// this segment's clip to composite-space Y; together with `trim_offset` it
/// lets every downstream component work in composite pixels while still
/// being able to go back to per-page PDF coordinates.
pub struct PageSegment {
    pub page_index: usize,
    pub image: GrayImage,
    pub y_offset: i32,
    pub clip: PdfRect,
    pub trim_offset: (i32, i32),
}

/// Vertically concatenates segments into one grayscale image, assigning
/// each segment's `y_offset` as it goes. Width is the widest segment;
/// narrower segments sit on a white background.
pub fn stitch_segments(segments: &mut [PageSegment]) -> Result<GrayImage> {
    if segments.is_empty() {
        return Err(ExtractError::EmptyComposite);
    }
    let total_height: u32 = segments.iter().map(|s| s.image.height()).sum();
    let max_width = segments.iter().map(|s| s.image.width()).max().unwrap_or(1);

    let mut composite = GrayImage::from_pixel(max_width.max(1), total_height.max(1), Luma([255]));
    let mut y = 0u32;
    for segment in segments.iter_mut() {
        composite
            .copy_from(&segment.image, 0, y)
            .map_err(|e| ExtractError::RenderError(e.to_string()))?;
        segment.y_offset = y as i32;
        y += segment.image.height();
    }
    Ok(composite)
}

/// Renders every page region a question occupies and stitches the result.
///
/// The first page is clipped from `start_y`, the last to `end_y`, and any
/// pages between contribute their full height. Pages whose share of the
/// span is empty are skipped.
pub fn render_question_composite(
    doc: &dyn PdfPages,
    span: QuestionSpan,
    dpi: u32,
    trim_whitespace: bool,
) -> Result<(GrayImage, Vec<PageSegment>)> {
    let mut segments = Vec::new();

    for page_index in span.start_page..=span.end_page {
        let size = doc.page_size(page_index)?;
        let top = if page_index == span.start_page { span.start_y } else { 0.0 };
        let bottom = if page_index == span.end_page { span.end_y } else { size.height };
        if bottom <= top {
            continue;
        }

        let clip = PdfRect::new(0.0, top, size.width, bottom);
        let rendered = doc.render_region(page_index, clip, dpi, trim_whitespace)?;
        segments.push(PageSegment {
            page_index,
            image: rendered.image,
            y_offset: 0,
            clip,
            trim_offset: rendered.trim_offset,
        });
    }

    let composite = stitch_segments(&mut segments)?;
    Ok((composite, segments))
}
