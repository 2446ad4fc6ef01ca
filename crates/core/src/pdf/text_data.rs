//! Character-granularity text structure extracted from a page clip.
//!
//! Mirrors the block / line / span / char nesting that PDF text extractors
//! produce, with all boxes in PDF points. The same [`TextData`] instance is
//! extracted once per composite segment and shared by the part-label and
//! mark-box detectors.

use crate::geom::PdfRect;

/// One positioned character.
#[derive(Debug, Clone, PartialEq)]
pub struct TextChar {
    pub ch: char,
    pub bbox: PdfRect,
}

/// A run of characters sharing font attributes.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TextSpan {
    pub chars: Vec<TextChar>,
}

impl TextSpan {
    /// Concatenated span text, with each character's byte offset recorded
    /// so regex match positions can be mapped back to character boxes.
    pub fn text_with_offsets(&self) -> (String, Vec<usize>) {
        let mut text = String::new();
        let mut offsets = Vec::with_capacity(self.chars.len());
        for c in &self.chars {
            offsets.push(text.len());
            text.push(c.ch);
        }
        (text, offsets)
    }

    /// Union box of the characters covering the byte range `[start, end)`
    /// of the concatenated span text.
    pub fn bbox_for_byte_range(
        &self,
        offsets: &[usize],
        start: usize,
        end: usize,
    ) -> Option<PdfRect> {
        let lo = offsets.partition_point(|&o| o < start);
        let hi = offsets.partition_point(|&o| o < end);
        let mut it = self.chars[lo..hi].iter();
        let first = it.next()?;
        Some(it.fold(first.bbox, |acc, c| acc.union(&c.bbox)))
    }
}

/// One visual line of text.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TextLine {
    pub spans: Vec<TextSpan>,
}

impl TextLine {
    pub fn chars(&self) -> impl Iterator<Item = &TextChar> {
        self.spans.iter().flat_map(|s| s.chars.iter())
    }

    pub fn text(&self) -> String {
        self.chars().map(|c| c.ch).collect()
    }

    /// Union box of every character on the line.
    pub fn bbox(&self) -> Option<PdfRect> {
        let mut it = self.chars();
        let first = it.next()?;
        Some(it.fold(first.bbox, |acc, c| acc.union(&c.bbox)))
    }
}

/// A paragraph-level group of lines.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TextBlock {
    pub lines: Vec<TextLine>,
}

/// All text of one page clip.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TextData {
    pub blocks: Vec<TextBlock>,
}

impl TextData {
    pub fn lines(&self) -> impl Iterator<Item = &TextLine> {
        self.blocks.iter().flat_map(|b| b.lines.iter())
    }
}
