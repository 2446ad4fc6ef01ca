//! Part-label detection: `(a)`, `(b)` letters and `(i)`, `(ii)` romans.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::geom::{GlyphBox, PdfRect, PixelMapper};
use crate::pdf::TextData;

static SECTION_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\(\s*([a-z])\s*\)").unwrap());
static ROMAN_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\(\s*((?:i{1,3}|iv|v|vi{0,3}|ix|x))\s*\)").unwrap());
static NUMERAL_PREFIX_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{1,2}\s*$").unwrap());

/// Single letters that read as roman numerals, never section letters.
const ROMAN_LETTERS: [char; 3] = ['i', 'v', 'x'];

/// Fraction of the clip width forming the left band labels must start in.
const LEFT_BAND_RATIO: f64 = 0.35;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelKind {
    Letter,
    Roman,
}

/// A detected part label in composite pixel coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct PartLabel {
    /// Label text without parentheses: `"a"`, `"ii"`.
    pub label: String,
    pub kind: LabelKind,
    /// Top of the label glyph box; the part's anchor Y.
    pub y: i32,
    pub bbox: GlyphBox,
}

/// Detects letter and roman labels within one composite segment's clip.
///
/// A `(x)` token only counts when it effectively starts its line: the text
/// before it, after stripping any labels already matched on the line, must
/// be empty or a 1-2 digit question numeral. That admits inline roots like
/// `"12 (a)"` and chains like `"(a) (i)"` while rejecting parenthesised
/// asides inside prose. The label must also start in the left band of the
/// clip.
pub fn detect_part_labels(
    data: &TextData,
    clip: PdfRect,
    dpi: u32,
    y_offset: i32,
    trim_offset: (i32, i32),
) -> (Vec<PartLabel>, Vec<PartLabel>) {
    let mapper = PixelMapper::new(clip, dpi, y_offset, trim_offset);
    let x_limit = clip.x0 + clip.width() * LEFT_BAND_RATIO;

    let mut letters = Vec::new();
    let mut romans = Vec::new();

    for line in data.lines() {
        let mut text_seen_in_line = false;
        for span in &line.spans {
            if span.chars.is_empty() {
                continue;
            }
            let (text, offsets) = span.text_with_offsets();

            for caps in SECTION_PATTERN.captures_iter(&text) {
                let label: String = caps[1].to_lowercase();
                if label.chars().all(|c| ROMAN_LETTERS.contains(&c)) {
                    continue;
                }
                let m = caps.get(0).unwrap();
                if !starts_line(&text[..m.start()], text_seen_in_line) {
                    continue;
                }
                let Some(bbox) = span.bbox_for_byte_range(&offsets, m.start(), m.end()) else {
                    continue;
                };
                if bbox.x0 > x_limit {
                    continue;
                }
                let gbox = mapper.glyph_box(bbox);
                letters.push(PartLabel { label, kind: LabelKind::Letter, y: gbox.top, bbox: gbox });
            }

            for caps in ROMAN_PATTERN.captures_iter(&text) {
                let label = caps[1].to_lowercase();
                let m = caps.get(0).unwrap();
                if !starts_line(&text[..m.start()], text_seen_in_line) {
                    continue;
                }
                let Some(bbox) = span.bbox_for_byte_range(&offsets, m.start(), m.end()) else {
                    continue;
                };
                if bbox.x0 > x_limit {
                    continue;
                }
                let gbox = mapper.glyph_box(bbox);
                romans.push(PartLabel { label, kind: LabelKind::Roman, y: gbox.top, bbox: gbox });
            }

            if text.chars().any(|c| c.is_ascii_alphanumeric()) {
                text_seen_in_line = true;
            }
        }
    }

    let letters = filter_alphabetical_sequence(letters);
    (letters, romans)
}

/// Line-start rule shared by both label kinds.
fn starts_line(preceding: &str, text_seen_in_line: bool) -> bool {
    if text_seen_in_line {
        return false;
    }
    let cleaned = SECTION_PATTERN.replace_all(preceding, "");
    let cleaned = ROMAN_PATTERN.replace_all(&cleaned, "");
    !cleaned.chars().any(|c| c.is_ascii_alphanumeric()) || NUMERAL_PREFIX_RE.is_match(&cleaned)
}

/// Keeps only a plausible alphabetical prefix of the detected letters.
///
/// Letters are walked top to bottom; one skipped letter is tolerated (the
/// tree builder flags it later), but a jump past that ends the sequence:
/// a `(s)` after `(b)` is stray prose, and everything below it is no more
/// trustworthy.
fn filter_alphabetical_sequence(mut letters: Vec<PartLabel>) -> Vec<PartLabel> {
    if letters.is_empty() {
        return letters;
    }
    letters.sort_by_key(|l| l.y);

    let mut valid = Vec::with_capacity(letters.len());
    let mut expected_next = letter_index(&letters[0].label).map(|i| i + 1);
    valid.push(letters[0].clone());

    for det in letters.into_iter().skip(1) {
        let Some(idx) = letter_index(&det.label) else { continue };
        if let Some(expected) = expected_next {
            if idx > expected + 1 {
                debug!(label = %det.label, "letter too far ahead of sequence, stopping");
                break;
            }
            expected_next = Some(expected.max(idx + 1));
        }
        valid.push(det);
    }
    valid
}

fn letter_index(label: &str) -> Option<u32> {
    let mut chars = label.chars();
    let c = chars.next()?;
    if chars.next().is_some() || !c.is_ascii_lowercase() {
        return None;
    }
    Some(c as u32 - 'a' as u32)
}

/// Position of a roman numeral in the expected sequence i, ii, iii, ...
pub fn roman_index(label: &str) -> Option<u32> {
    const SEQUENCE: [&str; 12] =
        ["i", "ii", "iii", "iv", "v", "vi", "vii", "viii", "ix", "x", "xi", "xii"];
    SEQUENCE.iter().position(|&r| r == label).map(|i| i as u32)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::{TextBlock, TextChar, TextLine, TextSpan};

    fn line(text: &str, x0: f64, y0: f64) -> TextLine {
        let chars = text
            .chars()
            .enumerate()
            .map(|(i, ch)| TextChar {
                ch,
                bbox: PdfRect::new(
                    x0 + i as f64 * 6.0,
                    y0,
                    x0 + (i + 1) as f64 * 6.0,
                    y0 + 10.0,
                ),
            })
            .collect();
        TextLine { spans: vec![TextSpan { chars }] }
    }

    fn data(lines: Vec<TextLine>) -> TextData {
        TextData { blocks: vec![TextBlock { lines }] }
    }

    fn clip() -> PdfRect {
        PdfRect::new(0.0, 0.0, 595.0, 842.0)
    }

    fn detect(d: &TextData) -> (Vec<PartLabel>, Vec<PartLabel>) {
        detect_part_labels(d, clip(), 72, 0, (0, 0))
    }

    #[test]
    fn detects_line_start_letters_and_romans() {
        let d = data(vec![
            line("(a) Describe the bus.", 40.0, 100.0),
            line("(i) Name one register.", 60.0, 140.0),
        ]);
        let (letters, romans) = detect(&d);
        assert_eq!(letters.len(), 1);
        assert_eq!(letters[0].label, "a");
        assert_eq!(romans.len(), 1);
        assert_eq!(romans[0].label, "i");
    }

    #[test]
    fn allows_numeral_prefix_and_chained_labels() {
        let d = data(vec![line("8 (a) (i) State one advantage.", 30.0, 100.0)]);
        let (letters, romans) = detect(&d);
        assert_eq!(letters.len(), 1);
        assert_eq!(romans.len(), 1);
    }

    #[test]
    fn rejects_labels_inside_prose() {
        let d = data(vec![line("Compare (a) with the others.", 40.0, 100.0)]);
        let (letters, romans) = detect(&d);
        assert!(letters.is_empty());
        assert!(romans.is_empty());
    }

    #[test]
    fn rejects_labels_outside_left_band() {
        let d = data(vec![line("(b) far right", 400.0, 100.0)]);
        let (letters, _) = detect(&d);
        assert!(letters.is_empty());
    }

    #[test]
    fn stray_letter_ends_the_sequence() {
        let d = data(vec![
            line("(a) First part", 40.0, 100.0),
            line("(b) Second part", 40.0, 200.0),
            line("(s) seconds of latency", 40.0, 300.0),
        ]);
        let (letters, _) = detect(&d);
        let labels: Vec<&str> = letters.iter().map(|l| l.label.as_str()).collect();
        assert_eq!(labels, vec!["a", "b"]);
    }

    #[test]
    fn single_letter_gap_survives_detection() {
        let d = data(vec![
            line("(a) First part", 40.0, 100.0),
            line("(c) Third part", 40.0, 200.0),
        ]);
        let (letters, _) = detect(&d);
        let labels: Vec<&str> = letters.iter().map(|l| l.label.as_str()).collect();
        assert_eq!(labels, vec!["a", "c"]);
    }

    #[test]
    fn single_i_v_x_are_romans_not_letters() {
        let d = data(vec![line("(v) Explain why.", 40.0, 100.0)]);
        let (letters, romans) = detect(&d);
        assert!(letters.is_empty());
        assert_eq!(romans[0].label, "v");
    }
}
