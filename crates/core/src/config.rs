//! Extraction parameters.
//!
//! Contains ExtractionConfig for pipeline-wide settings and SliceConfig
//! for bounds calculation.

/// Parameters for the extraction pipeline.
///
/// Controls rendering resolution, header/footer exclusion zones and
/// optional pipeline stages.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionConfig {
    /// Resolution used for all page rendering, in dots per inch.
    pub dpi: u32,

    /// Fraction of the page height treated as a header zone. Question
    /// numerals detected inside it are ignored.
    pub header_ratio: f64,

    /// Fraction of the page height treated as a footer zone. Page numbers
    /// live here, so numeral candidates inside it are ignored.
    pub footer_ratio: f64,

    /// Whether rendered clips have their whitespace margins trimmed.
    pub trim_whitespace: bool,

    /// Whether to locate and extract the matching mark-scheme PDF.
    pub extract_markschemes: bool,

    /// Whether the pipeline creates its own diagnostics collector when the
    /// caller does not supply one.
    pub run_diagnostics: bool,

    /// Background workers for image encoding. Zero disables the queue and
    /// writes composites synchronously.
    pub write_workers: usize,

    /// Settings for slice bounds calculation.
    pub slice: SliceConfig,
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            dpi: 200,
            header_ratio: 0.08,
            footer_ratio: 0.08,
            trim_whitespace: true,
            extract_markschemes: true,
            run_diagnostics: false,
            write_workers: 4,
            slice: SliceConfig::default(),
        }
    }
}

/// Settings for slice bounds calculation.
///
/// Bounds are stored as exact detected coordinates; the only adjustment is
/// a small padding so label glyphs and mark boxes are not clipped flush.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SliceConfig {
    /// Pixels of padding applied around detected edges.
    pub padding_px: u32,

    /// Minimum height for any part region.
    pub min_height_px: u32,
}

impl Default for SliceConfig {
    fn default() -> Self {
        Self {
            padding_px: 5,
            min_height_px: 20,
        }
    }
}
