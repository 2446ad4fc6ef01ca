#![allow(dead_code)]
//! In-memory PDF fake shared by the integration tests.
//!
//! Pages are flat lists of positioned text items; every character is 6pt
//! wide and 10pt tall, which makes expected pixel coordinates easy to
//! derive by hand. Rendering produces blank rasters of the right size, so
//! geometry tests run without a PDF engine.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use image::{GrayImage, Luma};
use qslice_core::error::{ExtractError, Result};
use qslice_core::geom::PdfRect;
use qslice_core::pdf::{
    PageSize, PdfOpener, PdfPages, RenderedRegion, TextBlock, TextChar, TextData, TextLine,
    TextSpan,
};
use qslice_core::ExtractionConfig;

pub const CHAR_W: f64 = 6.0;
pub const CHAR_H: f64 = 10.0;

#[derive(Debug, Clone)]
pub struct FakeItem {
    pub text: String,
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone)]
pub struct FakePage {
    pub width: f64,
    pub height: f64,
    pub items: Vec<FakeItem>,
}

impl FakePage {
    pub fn a4() -> Self {
        Self { width: 595.0, height: 842.0, items: Vec::new() }
    }

    pub fn with(mut self, text: &str, x: f64, y: f64) -> Self {
        self.items.push(FakeItem { text: text.to_string(), x, y });
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct FakeDoc {
    pub pages: Vec<FakePage>,
}

impl FakeDoc {
    pub fn new(pages: Vec<FakePage>) -> Self {
        Self { pages }
    }

    fn page(&self, index: usize) -> Result<&FakePage> {
        self.pages.get(index).ok_or(ExtractError::PageOutOfRange {
            index,
            count: self.pages.len(),
        })
    }
}

fn item_line(item: &FakeItem, clip: PdfRect) -> Option<TextLine> {
    let cy = item.y + CHAR_H / 2.0;
    if cy < clip.y0 || cy > clip.y1 {
        return None;
    }
    let chars: Vec<TextChar> = item
        .text
        .chars()
        .enumerate()
        .map(|(i, ch)| TextChar {
            ch,
            bbox: PdfRect::new(
                item.x + i as f64 * CHAR_W,
                item.y,
                item.x + (i + 1) as f64 * CHAR_W,
                item.y + CHAR_H,
            ),
        })
        .collect();
    if chars.is_empty() {
        return None;
    }
    Some(TextLine { spans: vec![TextSpan { chars }] })
}

impl PdfPages for FakeDoc {
    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn page_size(&self, index: usize) -> Result<PageSize> {
        let page = self.page(index)?;
        Ok(PageSize { width: page.width, height: page.height })
    }

    fn render_region(
        &self,
        index: usize,
        clip: PdfRect,
        dpi: u32,
        _trim: bool,
    ) -> Result<RenderedRegion> {
        let _ = self.page(index)?;
        if clip.width() <= 0.0 || clip.height() <= 0.0 {
            return Err(ExtractError::InvalidClip(format!("{clip:?}")));
        }
        let scale = f64::from(dpi) / 72.0;
        let width = (clip.width() * scale).round().max(1.0) as u32;
        let height = (clip.height() * scale).round().max(1.0) as u32;
        Ok(RenderedRegion {
            image: GrayImage::from_pixel(width, height, Luma([255])),
            trim_offset: (0, 0),
        })
    }

    fn text_data(&self, index: usize, clip: PdfRect) -> Result<TextData> {
        let page = self.page(index)?;
        let lines: Vec<TextLine> =
            page.items.iter().filter_map(|item| item_line(item, clip)).collect();
        Ok(TextData { blocks: vec![TextBlock { lines }] })
    }

    fn plain_text(&self, index: usize, clip: Option<PdfRect>) -> Result<String> {
        let page = self.page(index)?;
        let clip = clip.unwrap_or_else(|| PdfRect::new(0.0, 0.0, page.width, page.height));
        let texts: Vec<String> = page
            .items
            .iter()
            .filter(|item| {
                let cy = item.y + CHAR_H / 2.0;
                clip.y0 <= cy && cy <= clip.y1
            })
            .map(|item| item.text.clone())
            .collect();
        Ok(texts.join("\n"))
    }
}

/// Serves fake documents by file stem; the paths themselves must exist on
/// disk (empty placeholder files are enough).
#[derive(Debug, Clone, Default)]
pub struct FakeOpener {
    docs: HashMap<String, FakeDoc>,
}

impl FakeOpener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, stem: &str, doc: FakeDoc) {
        self.docs.insert(stem.to_string(), doc);
    }
}

impl PdfOpener for FakeOpener {
    fn open(&self, path: &Path) -> Result<Box<dyn PdfPages>> {
        let stem = path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| ExtractError::PdfNotFound(path.to_path_buf()))?;
        match self.docs.get(stem) {
            Some(doc) => Ok(Box::new(doc.clone())),
            None => Err(ExtractError::PdfNotFound(path.to_path_buf())),
        }
    }
}

/// Registers a fake document and creates its placeholder file.
pub fn stage_pdf(dir: &Path, opener: &mut FakeOpener, stem: &str, doc: FakeDoc) -> PathBuf {
    let path = dir.join(format!("{stem}.pdf"));
    std::fs::write(&path, b"").expect("placeholder pdf");
    opener.insert(stem, doc);
    path
}

/// 72 DPI keeps PDF points and composite pixels identical, and trimming is
/// off so expected geometry can be computed by hand.
pub fn test_config() -> ExtractionConfig {
    ExtractionConfig {
        dpi: 72,
        trim_whitespace: false,
        extract_markschemes: false,
        write_workers: 0,
        ..ExtractionConfig::default()
    }
}
