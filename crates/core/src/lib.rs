//! qslice - exam question-paper extraction.
//!
//! Converts examination booklet PDFs (question papers with matching mark
//! schemes) into a content-addressable cache of per-question assets: a
//! stitched grayscale composite image plus a structured description of each
//! part's pixel region, validation status and extracted text. A downstream
//! builder consumes that cache to assemble new practice papers.
//!
//! The library never talks to a PDF engine directly: rendering and text
//! extraction come in through the [`pdf::PdfPages`] trait, with a
//! `pdfium-render` implementation behind the `pdfium` feature.

pub mod bounds;
pub mod cache;
pub mod classify;
pub mod config;
pub mod detect;
pub mod diagnostics;
pub mod error;
pub mod geom;
pub mod markscheme;
pub mod model;
pub mod pdf;
pub mod pipeline;
pub mod raster;
pub mod text;
pub mod timing;
pub mod tree;

pub use config::{ExtractionConfig, SliceConfig};
pub use error::{ExtractError, Result};
pub use pipeline::{extract_question_paper, ExtractionResult};
