//! Mark-scheme binding: locating the matching MS PDF, mapping its pages to
//! question numbers, and rendering per-question MS images.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use image::{GenericImage, GrayImage, Luma};
use once_cell::sync::Lazy;
use regex::Regex;
use rustc_hash::FxHashMap;
use tracing::{debug, warn};

use crate::error::{ExtractError, Result};
use crate::geom::PdfRect;
use crate::pdf::PdfPages;

static QUESTION_HEADER_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)question\s+(\d{1,2})").unwrap());
static QUESTION_LINE_WITH_PARTS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?im)^\s*(\d{1,2})(\s*\([a-z]+\))+").unwrap());
static QUESTION_TABLE_HEADER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)question\s+answer\s+marks\s+(\d{1,2})").unwrap());

/// Locates the mark scheme for a question paper by the `_qp_` to `_ms_`
/// stem transform, first beside the paper, then in any search directories.
pub fn find_markscheme_pdf(question_pdf: &Path, search_dirs: &[PathBuf]) -> Option<PathBuf> {
    let stem = question_pdf.file_stem()?.to_str()?;
    if !stem.contains("_qp_") {
        return None;
    }
    let ms_name = format!("{}.pdf", stem.replace("_qp_", "_ms_"));

    let sibling = question_pdf.parent()?.join(&ms_name);
    if sibling.exists() {
        return Some(sibling);
    }
    for dir in search_dirs {
        let candidate = dir.join(&ms_name);
        if candidate.exists() {
            return Some(candidate);
        }
    }
    None
}

/// Scans an MS document and maps question numbers to the pages mentioning
/// them.
///
/// Three patterns count as a mention: a `Question N` header, an `N(a)`-style
/// line start, and the `Question Answer Marks N` table header. A page with
/// no mention continues whatever the previous page covered.
pub fn map_ms_pages(
    doc: &dyn PdfPages,
    question_numbers: &BTreeSet<u32>,
) -> Result<FxHashMap<u32, Vec<usize>>> {
    let mut mapping: FxHashMap<u32, Vec<usize>> = FxHashMap::default();
    let mut last_tokens: BTreeSet<u32> = BTreeSet::new();

    for page in 0..doc.page_count() {
        let text = doc.plain_text(page, None)?;
        let mut tokens = find_question_tokens(&text, question_numbers);
        if tokens.is_empty() {
            tokens = last_tokens.clone();
        }
        if tokens.is_empty() {
            continue;
        }
        for &qnum in &tokens {
            mapping.entry(qnum).or_default().push(page);
        }
        last_tokens = tokens;
    }

    debug!(questions = mapping.len(), pages = doc.page_count(), "mapped mark-scheme pages");
    Ok(mapping)
}

fn find_question_tokens(text: &str, available: &BTreeSet<u32>) -> BTreeSet<u32> {
    let mut tokens = BTreeSet::new();
    for pattern in [&QUESTION_HEADER_PATTERN, &QUESTION_LINE_WITH_PARTS, &QUESTION_TABLE_HEADER] {
        for caps in pattern.captures_iter(text) {
            if let Ok(value) = caps[1].parse::<u32>() {
                if available.contains(&value) {
                    tokens.insert(value);
                }
            }
        }
    }
    tokens
}

/// Renders the mapped MS pages for one question as a single stitched
/// grayscale image. Returns `None` when no page renders.
pub fn render_markscheme_image(
    doc: &dyn PdfPages,
    question_number: u32,
    page_indices: &[usize],
    dpi: u32,
) -> Result<Option<GrayImage>> {
    let mut images = Vec::new();
    for &page in page_indices {
        if page >= doc.page_count() {
            warn!(page, question = question_number, "mark-scheme page out of range");
            continue;
        }
        let size = doc.page_size(page)?;
        let clip = PdfRect::new(0.0, 0.0, size.width, size.height);
        let rendered = doc.render_region(page, clip, dpi, true)?;
        images.push(rendered.image);
    }

    if images.is_empty() {
        return Ok(None);
    }
    Ok(Some(stitch_vertically(images)?))
}

fn stitch_vertically(images: Vec<GrayImage>) -> Result<GrayImage> {
    if images.len() == 1 {
        return Ok(images.into_iter().next().unwrap());
    }
    let width = images.iter().map(GrayImage::width).max().unwrap_or(1);
    let height: u32 = images.iter().map(GrayImage::height).sum();
    let mut canvas = GrayImage::from_pixel(width.max(1), height.max(1), Luma([255]));
    let mut offset = 0u32;
    for img in &images {
        canvas
            .copy_from(img, 0, offset)
            .map_err(|e| ExtractError::RenderError(e.to_string()))?;
        offset += img.height();
    }
    Ok(canvas)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_patterns_cover_headers_lines_and_tables() {
        let available: BTreeSet<u32> = (1..=9).collect();
        let text = "Question 3\n4(a) award one mark\nQuestion Answer Marks 5\nsection 77";
        let tokens = find_question_tokens(text, &available);
        assert_eq!(tokens, BTreeSet::from([3, 4, 5]));
    }

    #[test]
    fn tokens_outside_the_expected_set_are_ignored() {
        let available = BTreeSet::from([1, 2]);
        let tokens = find_question_tokens("Question 9", &available);
        assert!(tokens.is_empty());
    }

    #[test]
    fn ms_name_transform() {
        let dir = tempfile::tempdir().unwrap();
        let qp = dir.path().join("0478_s24_qp_12.pdf");
        let ms = dir.path().join("0478_s24_ms_12.pdf");
        std::fs::write(&qp, b"").unwrap();
        std::fs::write(&ms, b"").unwrap();
        assert_eq!(find_markscheme_pdf(&qp, &[]), Some(ms));
        assert_eq!(find_markscheme_pdf(&dir.path().join("notes.pdf"), &[]), None);
    }
}
