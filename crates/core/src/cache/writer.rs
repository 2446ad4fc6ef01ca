//! Artifact writing: `composite.png`, `regions.json`, the per-question
//! mark-scheme image, and `questions.jsonl` appends.
//!
//! Every write is atomic: content goes to a temp file in the target
//! directory and is renamed into place, so a crash never leaves a partial
//! artifact behind.

use std::io::Write;
use std::path::Path;

use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::{GrayImage, ImageEncoder};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;
use tracing::debug;

use crate::error::Result;
use crate::geom::GlyphBox;
use crate::model::{Part, PixelRect, QuestionRecord};

use super::lock::locked_append_jsonl;
use super::write_queue::WriteQueue;

/// Schema version of `regions.json`.
pub const REGIONS_SCHEMA_VERSION: u32 = 3;

/// Width and height of the composite raster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompositeSize {
    pub width: i32,
    pub height: i32,
}

/// A rectangle as stored in `regions.json`: all four edges concrete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoundsJson {
    pub top: i32,
    pub bottom: i32,
    pub left: i32,
    pub right: i32,
}

impl BoundsJson {
    fn from_rect(rect: &PixelRect, composite_width: i32) -> Self {
        Self {
            top: rect.top,
            bottom: rect.bottom,
            left: rect.left,
            right: rect.right_or(composite_width),
        }
    }
}

/// One part's entry in the regions map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionEntry {
    pub kind: String,
    /// Present only on leaves; internal parts reconstruct marks by
    /// summation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub marks: Option<u32>,
    pub bounds: BoundsJson,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label_bbox: Option<BoundsJson>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_bounds: Option<BoundsJson>,
    pub child_is_inline: bool,
    /// Only serialized when the part is invalid.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub is_valid: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub validation_issues: Option<Vec<String>>,
}

/// The `regions.json` document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionsDoc {
    pub schema_version: u32,
    pub question_id: String,
    pub composite_size: CompositeSize,
    pub horizontal_offset: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub numeral_bbox: Option<[i32; 4]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mark_bboxes: Option<Vec<[i32; 4]>>,
    /// Keyed by part label, in document order (root first).
    pub regions: IndexMap<String, RegionEntry>,
}

impl RegionsDoc {
    /// Total marks reconstructed from serialized leaves.
    pub fn total_marks(&self) -> u32 {
        self.regions.values().filter_map(|r| r.marks).sum()
    }
}

/// Everything the writer persists for one question.
pub struct QuestionArtifacts {
    pub question_id: String,
    pub composite: GrayImage,
    pub horizontal_offset: i32,
    pub numeral_bbox: Option<GlyphBox>,
    pub mark_bboxes: Vec<GlyphBox>,
    /// Stitched mark-scheme image, when one was extracted.
    pub markscheme: Option<GrayImage>,
}

/// Builds the `regions.json` document for a part tree.
pub fn build_regions_doc(
    question_id: &str,
    root: &Part,
    composite_size: CompositeSize,
    horizontal_offset: i32,
    numeral_bbox: Option<GlyphBox>,
    mark_bboxes: &[GlyphBox],
) -> RegionsDoc {
    let mut regions = IndexMap::new();
    for part in root.iter_all() {
        let entry = RegionEntry {
            kind: part.kind.as_str().to_string(),
            marks: part.is_leaf().then_some(part.marks.value),
            bounds: BoundsJson::from_rect(&part.content_rect, composite_size.width),
            label_bbox: part
                .label_rect
                .as_ref()
                .map(|r| BoundsJson::from_rect(r, composite_size.width)),
            context_bounds: part
                .context_rect
                .as_ref()
                .map(|r| BoundsJson::from_rect(r, composite_size.width)),
            child_is_inline: part.child_is_inline,
            is_valid: (!part.is_valid).then_some(false),
            validation_issues: (!part.is_valid).then(|| part.validation_issues.clone()),
        };
        regions.insert(part.label.clone(), entry);
    }

    RegionsDoc {
        schema_version: REGIONS_SCHEMA_VERSION,
        question_id: question_id.to_string(),
        composite_size,
        horizontal_offset,
        numeral_bbox: numeral_bbox.map(|b| b.as_array()),
        mark_bboxes: if mark_bboxes.is_empty() {
            None
        } else {
            Some(mark_bboxes.iter().map(GlyphBox::as_array).collect())
        },
        regions,
    }
}

/// Persists one question's artifacts into its cache directory.
///
/// `regions.json` is always written synchronously; image writes go through
/// the queue when one is supplied so the pipeline can continue with the
/// next question.
pub fn write_question(
    artifacts: QuestionArtifacts,
    root: &Part,
    question_dir: &Path,
    queue: Option<&WriteQueue>,
) -> Result<()> {
    let QuestionArtifacts {
        question_id,
        composite,
        horizontal_offset,
        numeral_bbox,
        mark_bboxes,
        markscheme,
    } = artifacts;

    std::fs::create_dir_all(question_dir)?;

    let composite_size = CompositeSize {
        width: composite.width() as i32,
        height: composite.height() as i32,
    };
    let doc = build_regions_doc(
        &question_id,
        root,
        composite_size,
        horizontal_offset,
        numeral_bbox,
        &mark_bboxes,
    );
    write_json_atomic(&doc, &question_dir.join("regions.json"))?;

    let composite_path = question_dir.join("composite.png");
    let ms_target = markscheme.map(|img| (img, question_dir.join(format!("{question_id}_ms.png"))));

    match queue {
        Some(queue) => {
            queue.queue_png(composite, composite_path);
            if let Some((img, path)) = ms_target {
                queue.queue_png(img, path);
            }
        }
        None => {
            write_png_atomic(&composite, &composite_path)?;
            if let Some((img, path)) = ms_target {
                write_png_atomic(&img, &path)?;
            }
        }
    }

    debug!(question = %question_id, dir = %question_dir.display(), "wrote question artifacts");
    Ok(())
}

/// Appends all of one PDF's records to the shared metadata file under the
/// exclusive lock.
pub fn append_question_records(
    cache_root: &Path,
    exam_code: &str,
    records: &[QuestionRecord],
) -> Result<()> {
    let path = cache_root.join(exam_code).join("_metadata").join("questions.jsonl");
    locked_append_jsonl(&path, records)
}

/// Atomic PNG write at the fastest compression level; composites are large
/// and compress poorly, so encoder speed wins over the few percent of size.
pub(crate) fn write_png_atomic(image: &GrayImage, path: &Path) -> Result<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent)?;

    let mut tmp = NamedTempFile::new_in(parent)?;
    let encoder =
        PngEncoder::new_with_quality(&mut tmp, CompressionType::Fast, FilterType::Adaptive);
    encoder.write_image(
        image.as_raw(),
        image.width(),
        image.height(),
        image::ColorType::L8,
    )?;
    tmp.flush()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

fn write_json_atomic<T: Serialize>(value: &T, path: &Path) -> Result<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(parent)?;

    let mut tmp = NamedTempFile::new_in(parent)?;
    tmp.write_all(serde_json::to_string_pretty(value)?.as_bytes())?;
    tmp.flush()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Marks, PartKind};

    fn leaf(label: &str, top: i32, bottom: i32, marks: u32) -> Part {
        Part::new(
            label.to_string(),
            PartKind::Roman,
            Marks::explicit(marks),
            PixelRect::new(top, bottom, 10, Some(1600)).unwrap(),
            None,
            Some(PixelRect::new(top, top + 20, 10, Some(40)).unwrap()),
            false,
            Vec::new(),
            true,
            Vec::new(),
        )
        .unwrap()
    }

    fn sample_tree() -> Part {
        let romans = vec![leaf("1(a)(i)", 100, 300, 2), leaf("1(a)(ii)", 300, 500, 3)];
        let letter = Part::new(
            "1(a)".to_string(),
            PartKind::Letter,
            Marks::aggregate(romans.iter()),
            PixelRect::new(80, 500, 5, Some(1600)).unwrap(),
            Some(PixelRect::new(80, 100, 5, Some(1600)).unwrap()),
            None,
            false,
            romans,
            true,
            Vec::new(),
        )
        .unwrap();
        Part::new(
            "1".to_string(),
            PartKind::Question,
            Marks::aggregate(std::iter::once(&letter)),
            PixelRect::new(0, 500, 0, Some(1600)).unwrap(),
            Some(PixelRect::new(0, 80, 0, Some(1600)).unwrap()),
            None,
            false,
            vec![letter],
            true,
            Vec::new(),
        )
        .unwrap()
    }

    #[test]
    fn only_leaves_serialize_marks() {
        let root = sample_tree();
        let doc = build_regions_doc(
            "0478_s24_qp_12_q1",
            &root,
            CompositeSize { width: 1654, height: 520 },
            0,
            None,
            &[],
        );
        assert_eq!(doc.regions["1"].marks, None);
        assert_eq!(doc.regions["1(a)"].marks, None);
        assert_eq!(doc.regions["1(a)(i)"].marks, Some(2));
        assert_eq!(doc.regions["1(a)(ii)"].marks, Some(3));
        assert_eq!(doc.total_marks(), root.total_marks());
    }

    #[test]
    fn regions_are_in_document_order() {
        let root = sample_tree();
        let doc = build_regions_doc(
            "q",
            &root,
            CompositeSize { width: 1654, height: 520 },
            0,
            None,
            &[],
        );
        let keys: Vec<&String> = doc.regions.keys().collect();
        assert_eq!(keys, vec!["1", "1(a)", "1(a)(i)", "1(a)(ii)"]);
    }

    #[test]
    fn serialization_round_trips_byte_equal() {
        let root = sample_tree();
        let doc = build_regions_doc(
            "q",
            &root,
            CompositeSize { width: 1654, height: 520 },
            -7,
            Some(GlyphBox { left: 10, top: 5, right: 40, bottom: 30 }),
            &[GlyphBox { left: 1550, top: 280, right: 1600, bottom: 300 }],
        );
        let first = serde_json::to_string_pretty(&doc).unwrap();
        let parsed: RegionsDoc = serde_json::from_str(&first).unwrap();
        let second = serde_json::to_string_pretty(&parsed).unwrap();
        assert_eq!(first, second);
        assert_eq!(parsed, doc);
    }

    #[test]
    fn validity_fields_appear_only_when_invalid() {
        let mut root = sample_tree();
        root.children[0].children[0].is_valid = false;
        root.children[0].children[0]
            .validation_issues
            .push("No mark box detected (uses composite_height)".to_string());
        let doc = build_regions_doc(
            "q",
            &root,
            CompositeSize { width: 1654, height: 520 },
            0,
            None,
            &[],
        );
        let json = serde_json::to_value(&doc).unwrap();
        assert!(json["regions"]["1"].get("is_valid").is_none());
        assert_eq!(json["regions"]["1(a)(i)"]["is_valid"], serde_json::json!(false));
    }
}
