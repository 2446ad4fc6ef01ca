//! Paper identity parsed from exam PDF file names.

use once_cell::sync::Lazy;
use regex::Regex;

static EXAM_CODE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d{3,5})_").unwrap());
static SERIES_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)[smw](\d{2})").unwrap());
static PAPER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"qp_(\d)(\d)?").unwrap());

/// Identity of one question paper, parsed from a standard Cambridge-style
/// file stem such as `0478_s24_qp_12`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaperIdent {
    /// Syllabus code, e.g. `"0478"`.
    pub exam_code: String,
    /// Four-digit year in the range 2000..=2100.
    pub year: u16,
    /// Paper number, 1..=9.
    pub paper: u8,
    /// Variant number, 1..=9.
    pub variant: u8,
}

impl PaperIdent {
    /// Parses a file stem. Unknown fields fall back to defaults rather than
    /// failing: a mis-named PDF still extracts, it just sorts under a
    /// generic identity.
    pub fn from_stem(stem: &str) -> Self {
        let exam_code = match EXAM_CODE_RE.captures(stem) {
            Some(caps) => caps[1].to_string(),
            None => {
                let head = stem.split('_').next().unwrap_or(stem);
                let digits: String = head.chars().filter(char::is_ascii_digit).collect();
                if digits.is_empty() {
                    head.to_ascii_lowercase()
                } else {
                    digits
                }
            }
        };

        let year = SERIES_RE
            .captures(stem)
            .and_then(|caps| caps[1].parse::<u16>().ok())
            .map(|two| if two < 50 { 2000 + two } else { 1900 + two })
            .filter(|y| (2000..=2100).contains(y))
            .unwrap_or(2024);

        let (paper, variant) = PAPER_RE
            .captures(stem)
            .map(|caps| {
                let paper = caps[1].parse().unwrap_or(1);
                let variant = caps
                    .get(2)
                    .and_then(|m| m.as_str().parse().ok())
                    .unwrap_or(1);
                (paper, variant)
            })
            .unwrap_or((1, 1));

        Self {
            exam_code,
            year,
            paper: paper.clamp(1, 9),
            variant: variant.clamp(1, 9),
        }
    }
}
