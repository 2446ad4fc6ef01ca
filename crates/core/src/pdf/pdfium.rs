//! PDFium-backed implementation of the page access traits.
//!
//! Binds to a system PDFium library at runtime, falling back to a binary in
//! the working directory. PDFium reports glyph boxes in bottom-up page
//! coordinates; everything is flipped to top-down here so the rest of the
//! pipeline sees one convention.

use std::path::Path;
use std::sync::Mutex;

use image::GrayImage;
use once_cell::sync::OnceCell;
use pdfium_render::prelude::*;

use crate::error::{ExtractError, Result};
use crate::geom::PdfRect;

use super::{PageSize, PdfOpener, PdfPages, RenderedRegion, TextBlock, TextChar, TextData, TextLine, TextSpan};

struct PdfiumWrapper(Pdfium);

// Pdfium handles are used behind a Mutex; the library itself is loaded once.
unsafe impl Send for PdfiumWrapper {}
unsafe impl Sync for PdfiumWrapper {}

static PDFIUM: OnceCell<PdfiumWrapper> = OnceCell::new();

fn pdfium() -> Result<&'static Pdfium> {
    let wrapper = PDFIUM.get_or_try_init(|| {
        let bindings = Pdfium::bind_to_system_library()
            .or_else(|_| {
                Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
            })
            .map_err(|e| ExtractError::RenderError(format!("could not load PDFium: {e}")))?;
        Ok::<_, ExtractError>(PdfiumWrapper(Pdfium::new(bindings)))
    })?;
    Ok(&wrapper.0)
}

struct DocumentWrapper(PdfDocument<'static>);

unsafe impl Send for DocumentWrapper {}
unsafe impl Sync for DocumentWrapper {}

/// One open PDF document.
pub struct PdfiumDocument {
    inner: Mutex<DocumentWrapper>,
    page_count: usize,
}

impl PdfiumDocument {
    pub fn open(path: &Path) -> Result<Self> {
        let doc = pdfium()?
            .load_pdf_from_file(path, None)
            .map_err(|e| ExtractError::RenderError(format!("{}: {e}", path.display())))?;
        let page_count = doc.pages().len() as usize;
        if page_count == 0 {
            return Err(ExtractError::EmptyDocument);
        }
        Ok(Self {
            inner: Mutex::new(DocumentWrapper(doc)),
            page_count,
        })
    }

    fn with_page<R>(&self, index: usize, f: impl FnOnce(&PdfPage) -> Result<R>) -> Result<R> {
        if index >= self.page_count {
            return Err(ExtractError::PageOutOfRange { index, count: self.page_count });
        }
        let guard = self
            .inner
            .lock()
            .map_err(|_| ExtractError::RenderError("document lock poisoned".into()))?;
        let page = guard
            .0
            .pages()
            .get(index as u16)
            .map_err(|e| ExtractError::RenderError(e.to_string()))?;
        f(&page)
    }
}

impl PdfPages for PdfiumDocument {
    fn page_count(&self) -> usize {
        self.page_count
    }

    fn page_size(&self, index: usize) -> Result<PageSize> {
        self.with_page(index, |page| {
            Ok(PageSize {
                width: f64::from(page.width().value),
                height: f64::from(page.height().value),
            })
        })
    }

    fn render_region(&self, index: usize, clip: PdfRect, dpi: u32, trim: bool) -> Result<RenderedRegion> {
        if clip.width() <= 0.0 || clip.height() <= 0.0 {
            return Err(ExtractError::InvalidClip(format!("{clip:?}")));
        }
        self.with_page(index, |page| {
            let scale = f64::from(dpi) / 72.0;
            let page_w = f64::from(page.width().value);
            let page_h = f64::from(page.height().value);
            let config = PdfRenderConfig::new()
                .set_target_width((page_w * scale) as i32)
                .set_target_height((page_h * scale) as i32)
                .render_annotations(true);
            let bitmap = page
                .render_with_config(&config)
                .map_err(|e| ExtractError::RenderError(e.to_string()))?;
            let full = bitmap.as_image().to_luma8();

            // PDFium renders whole pages; cut the requested clip out of the
            // full raster.
            let x0 = ((clip.x0 * scale).round() as u32).min(full.width());
            let y0 = ((clip.y0 * scale).round() as u32).min(full.height());
            let x1 = ((clip.x1 * scale).round() as u32).clamp(x0 + 1, full.width());
            let y1 = ((clip.y1 * scale).round() as u32).clamp(y0 + 1, full.height());
            let clipped: GrayImage =
                image::imageops::crop_imm(&full, x0, y0, x1 - x0, y1 - y0).to_image();

            if trim {
                let (image, trim_offset) = super::trim::trim_default(&clipped);
                Ok(RenderedRegion { image, trim_offset })
            } else {
                Ok(RenderedRegion { image: clipped, trim_offset: (0, 0) })
            }
        })
    }

    fn text_data(&self, index: usize, clip: PdfRect) -> Result<TextData> {
        self.with_page(index, |page| {
            let text = page
                .text()
                .map_err(|e| ExtractError::RenderError(e.to_string()))?;
            let page_h = f64::from(page.height().value);

            let mut chars: Vec<TextChar> = Vec::new();
            for ch in text.chars().iter() {
                let Some(unicode) = ch.unicode_char() else { continue };
                let Ok(bounds) = ch.loose_bounds() else { continue };
                // Flip bottom-up page coordinates to top-down.
                let bbox = PdfRect::new(
                    f64::from(bounds.left.value),
                    page_h - f64::from(bounds.top.value),
                    f64::from(bounds.right.value),
                    page_h - f64::from(bounds.bottom.value),
                );
                let cy = (bbox.y0 + bbox.y1) / 2.0;
                let cx = (bbox.x0 + bbox.x1) / 2.0;
                if cy < clip.y0 || cy > clip.y1 || cx < clip.x0 || cx > clip.x1 {
                    continue;
                }
                chars.push(TextChar { ch: unicode, bbox });
            }

            Ok(group_into_lines(chars))
        })
    }

    fn plain_text(&self, index: usize, clip: Option<PdfRect>) -> Result<String> {
        match clip {
            None => self.with_page(index, |page| {
                let text = page
                    .text()
                    .map_err(|e| ExtractError::RenderError(e.to_string()))?;
                Ok(text.all())
            }),
            Some(clip) => {
                let data = self.text_data(index, clip)?;
                let mut out = String::new();
                for line in data.lines() {
                    if !out.is_empty() {
                        out.push('\n');
                    }
                    out.push_str(&line.text());
                }
                Ok(out)
            }
        }
    }
}

/// Groups reading-order characters into lines by vertical midpoint.
fn group_into_lines(chars: Vec<TextChar>) -> TextData {
    let mut lines: Vec<TextLine> = Vec::new();
    let mut current: Vec<TextChar> = Vec::new();
    let mut current_mid = 0.0f64;

    for ch in chars {
        let mid = (ch.bbox.y0 + ch.bbox.y1) / 2.0;
        let height = ch.bbox.height().max(1.0);
        if current.is_empty() || (mid - current_mid).abs() <= height * 0.5 {
            if current.is_empty() {
                current_mid = mid;
            }
            current.push(ch);
        } else {
            lines.push(TextLine { spans: vec![TextSpan { chars: std::mem::take(&mut current) }] });
            current_mid = mid;
            current.push(ch);
        }
    }
    if !current.is_empty() {
        lines.push(TextLine { spans: vec![TextSpan { chars: current }] });
    }

    TextData { blocks: vec![TextBlock { lines }] }
}

/// Opener handing out [`PdfiumDocument`] instances.
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfiumOpener;

impl PdfOpener for PdfiumOpener {
    fn open(&self, path: &Path) -> Result<Box<dyn PdfPages>> {
        if !path.exists() {
            return Err(ExtractError::PdfNotFound(path.to_path_buf()));
        }
        Ok(Box::new(PdfiumDocument::open(path)?))
    }
}
