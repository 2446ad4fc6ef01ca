//! Top-level question numeral detection.
//!
//! Scans each page's left margin for lines starting with a question number,
//! filters headers, footers, dot leaders and pseudocode listings, then
//! resolves the candidates into one monotonic sequence per document.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::ExtractionConfig;
use crate::error::Result;
use crate::geom::PdfRect;
use crate::pdf::{PdfPages, TextLine};

static QUESTION_NUMBER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([1-9]\d?)(?:\s|$|\()").unwrap());
static QUESTION_TOKEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bquestion\s*(\d{1,2})\b").unwrap());
static NUMBERED_BODY_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d+\s+(.*)").unwrap());
static ASSIGNMENT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Z]\w*\s*<-\s*").unwrap());

/// Keywords that mark a line as program listing rather than prose. Exam
/// pseudocode is uppercase and line numbered, which otherwise looks exactly
/// like a question start.
const PSEUDOCODE_KEYWORDS: &[&str] = &[
    "DECLARE", "INPUT", "OUTPUT", "FOR", "NEXT", "WHILE", "UNTIL", "CASE", "ELSE", "ENDIF",
    "ELSEIF", "THEN",
];

/// A detected question start marker.
#[derive(Debug, Clone, PartialEq)]
pub struct QuestionStart {
    pub number: u32,
    pub page: usize,
    /// Y in PDF points from the page top. Zero for the `Question N`
    /// fallback, which carries no line position.
    pub y: f64,
    pub x: f64,
    /// Tight box of the numeral glyphs, in PDF points.
    pub bbox: Option<PdfRect>,
    pub is_pseudocode: bool,
}

/// Detects question starts across all pages and resolves them into a
/// strictly increasing, duplicate-free sequence.
pub fn detect_question_starts(
    doc: &dyn PdfPages,
    config: &ExtractionConfig,
) -> Result<Vec<QuestionStart>> {
    let mut candidates = Vec::new();
    for page in 0..doc.page_count() {
        scan_page(doc, page, config, &mut candidates)?;
    }
    Ok(resolve_sequence(candidates))
}

fn scan_page(
    doc: &dyn PdfPages,
    page: usize,
    config: &ExtractionConfig,
    out: &mut Vec<QuestionStart>,
) -> Result<()> {
    let size = doc.page_size(page)?;
    let clip = PdfRect::new(0.0, 0.0, size.width, size.height);
    let data = doc.text_data(page, clip)?;

    let header_limit = size.height * config.header_ratio;
    let footer_limit = size.height * (1.0 - config.footer_ratio);
    let mut seen_numbers = Vec::new();

    for line in data.lines() {
        let Some(line_bbox) = line.bbox() else { continue };
        let text = line.text();
        let trimmed = text.trim();
        if trimmed.is_empty() {
            continue;
        }
        // Dot leaders are answer lines, not content.
        if trimmed.matches('.').count() >= 4 {
            continue;
        }
        if line_bbox.x0 > size.width * 0.12 {
            continue;
        }
        let Some(caps) = QUESTION_NUMBER_RE.captures(trimmed) else { continue };
        // Headers and footers: page numbers live in the footer and would
        // otherwise read as question starts.
        if line_bbox.y0 < header_limit || line_bbox.y0 > footer_limit {
            continue;
        }
        if line_bbox.x0 > size.width * 0.23 {
            continue;
        }

        let number: u32 = match caps[1].parse() {
            Ok(n) => n,
            Err(_) => continue,
        };
        let is_pseudocode = looks_like_pseudocode(trimmed, line);
        let bbox = numeral_bbox(line, &caps[1]).or(Some(line_bbox));

        seen_numbers.push(number);
        out.push(QuestionStart {
            number,
            page,
            y: line_bbox.y0,
            x: line_bbox.x0,
            bbox,
            is_pseudocode,
        });
    }

    // Fallback: "Question N" tokens anywhere on the page. These have no
    // reliable line position, so they get y=0 and lose ties to real
    // left-margin detections.
    let plain = doc.plain_text(page, None)?;
    for caps in QUESTION_TOKEN_RE.captures_iter(&plain) {
        let Ok(number) = caps[1].parse::<u32>() else { continue };
        if seen_numbers.contains(&number) {
            continue;
        }
        out.push(QuestionStart {
            number,
            page,
            y: 0.0,
            x: 0.0,
            bbox: Some(PdfRect::new(0.0, 0.0, size.width, 0.0)),
            is_pseudocode: false,
        });
    }
    Ok(())
}

/// Tight box of just the numeral digits, never the whole line. A line like
/// `"12 (a) text"` must yield the box of `"12"` alone.
fn numeral_bbox(line: &TextLine, numeral: &str) -> Option<PdfRect> {
    let chars: Vec<_> = line.chars().skip_while(|c| c.ch.is_whitespace()).collect();
    let text: String = chars.iter().map(|c| c.ch).collect();
    if !text.starts_with(numeral) {
        return None;
    }
    let digits = &chars[..numeral.chars().count()];
    let mut it = digits.iter();
    let first = it.next()?;
    Some(it.fold(first.bbox, |acc, c| acc.union(&c.bbox)))
}

fn looks_like_pseudocode(text: &str, line: &TextLine) -> bool {
    let body = NUMBERED_BODY_RE
        .captures(text)
        .map_or(text, |caps| caps.get(1).unwrap().as_str());

    if PSEUDOCODE_KEYWORDS.iter().any(|kw| has_word(body, kw)) {
        return true;
    }
    if body.contains('←') || body.contains(":=") {
        return true;
    }
    let upper = body.to_uppercase();
    if ["IF ", "ELSE", "END", "REPEAT", "UNTIL"].iter().any(|p| upper.starts_with(p)) {
        return true;
    }
    if ASSIGNMENT_RE.is_match(body) {
        return true;
    }

    // Very short alphabetic lines with no sentence punctuation read like
    // identifiers, not question stems.
    let words = body.split_whitespace().count();
    if words <= 2
        && !body.chars().any(|c| ".?:;".contains(c))
        && !body.to_lowercase().contains("question")
        && body.chars().any(char::is_alphabetic)
    {
        return true;
    }

    // A single all-caps span is a listing fragment.
    if line.spans.len() == 1 {
        let span_text: String = line.spans[0].chars.iter().map(|c| c.ch).collect();
        let span_text = span_text.trim();
        if !span_text.is_empty()
            && span_text.chars().any(char::is_alphabetic)
            && span_text == span_text.to_uppercase()
        {
            return true;
        }
    }
    false
}

fn has_word(text: &str, word: &str) -> bool {
    text.split(|c: char| !c.is_alphanumeric()).any(|w| w == word)
}

/// Greedy monotonic resolution.
///
/// Walks candidates sorted by (page, y), always looking for the next
/// expected number first; among equal numbers, real line detections (y > 0)
/// beat the `Question N` fallback and prose beats pseudocode. When the
/// expected number is absent the walk jumps to the next unused candidate,
/// accepting non-contiguous numbering. Numbers already accepted are never
/// accepted again.
fn resolve_sequence(starts: Vec<QuestionStart>) -> Vec<QuestionStart> {
    let mut ordered = starts;
    ordered.sort_by(|a, b| {
        (a.page, a.y)
            .partial_cmp(&(b.page, b.y))
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    if ordered.is_empty() {
        return ordered;
    }

    let mut used = vec![false; ordered.len()];
    let mut resolved_numbers: Vec<u32> = Vec::new();
    let mut resolved = Vec::new();
    let mut expected: u32 = 1;
    let mut search_from = 0usize;

    loop {
        let found = find_candidate_with_number(&ordered, search_from, expected, &used);
        let idx = match found {
            Some(idx) => idx,
            None => {
                // Jump forward to whatever number comes next.
                let Some(idx) = (search_from..ordered.len()).find(|&i| !used[i]) else {
                    break;
                };
                if resolved_numbers.contains(&ordered[idx].number) {
                    used[idx] = true;
                    continue;
                }
                idx
            }
        };
        used[idx] = true;
        resolved_numbers.push(ordered[idx].number);
        expected = ordered[idx].number + 1;
        search_from = idx + 1;
        resolved.push(ordered[idx].clone());
    }

    resolved
}

/// Best candidate carrying the target number at or after `start`.
fn find_candidate_with_number(
    ordered: &[QuestionStart],
    start: usize,
    target: u32,
    used: &[bool],
) -> Option<usize> {
    let mut best: Option<usize> = None;
    for idx in start..ordered.len() {
        if used[idx] || ordered[idx].number != target {
            continue;
        }
        let candidate = &ordered[idx];
        match best {
            None => {
                best = Some(idx);
                if candidate.y > 0.0 && !candidate.is_pseudocode {
                    break;
                }
            }
            Some(current) => {
                let current = &ordered[current];
                if current.y == 0.0 && candidate.y > 0.0 {
                    best = Some(idx);
                    if !candidate.is_pseudocode {
                        break;
                    }
                } else if current.is_pseudocode && !candidate.is_pseudocode {
                    best = Some(idx);
                    break;
                }
            }
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    fn start(number: u32, page: usize, y: f64, pseudocode: bool) -> QuestionStart {
        QuestionStart { number, page, y, x: 30.0, bbox: None, is_pseudocode: pseudocode }
    }

    #[test]
    fn sequence_is_strictly_increasing_without_duplicates() {
        let resolved = resolve_sequence(vec![
            start(1, 0, 100.0, false),
            start(2, 0, 400.0, false),
            start(2, 1, 100.0, false),
            start(3, 1, 300.0, false),
        ]);
        let numbers: Vec<u32> = resolved.iter().map(|s| s.number).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
    }

    #[test]
    fn prefers_real_position_over_fallback() {
        let resolved = resolve_sequence(vec![
            start(1, 0, 0.0, false),
            start(1, 0, 120.0, false),
        ]);
        assert_eq!(resolved.len(), 1);
        assert!(resolved[0].y > 0.0);
    }

    #[test]
    fn prefers_prose_over_pseudocode() {
        let resolved = resolve_sequence(vec![
            start(1, 0, 100.0, false),
            start(2, 0, 200.0, true),
            start(2, 0, 500.0, false),
        ]);
        assert_eq!(resolved.len(), 2);
        assert!(!resolved[1].is_pseudocode);
        assert_eq!(resolved[1].y, 500.0);
    }

    #[test]
    fn jumps_over_missing_numbers() {
        let resolved = resolve_sequence(vec![
            start(1, 0, 100.0, false),
            start(4, 1, 100.0, false),
            start(5, 1, 400.0, false),
        ]);
        let numbers: Vec<u32> = resolved.iter().map(|s| s.number).collect();
        assert_eq!(numbers, vec![1, 4, 5]);
    }
}
