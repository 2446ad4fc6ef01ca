//! Pipeline orchestration for one question paper.
//!
//! Drives numeral detection, per-question compositing, detection, tree
//! construction, bounds finalization and writing. Failures of a single
//! question are caught, logged and surfaced as warnings; only whole-PDF
//! failures propagate to the caller.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use rustc_hash::FxHashMap;
use tracing::{debug, info, warn};

use crate::bounds::HorizontalCalc;
use crate::cache::writer::{append_question_records, write_question, QuestionArtifacts};
use crate::cache::WriteQueue;
use crate::classify::{
    classify_all_parts, consensus_topic, propagate_topics, TopicClassifier, UNKNOWN_TOPIC,
};
use crate::config::ExtractionConfig;
use crate::detect::{
    detect_mark_boxes, detect_part_labels, detect_question_starts, normalize_mark_boxes,
    QuestionStart,
};
use crate::diagnostics::{DiagContext, DiagnosticsCollector};
use crate::error::{ExtractError, Result};
use crate::geom::{GlyphBox, PixelMapper};
use crate::markscheme::{find_markscheme_pdf, map_ms_pages, render_markscheme_image};
use crate::model::{PaperIdent, Part, QuestionRecord, QUESTION_SCHEMA_VERSION};
use crate::pdf::{PdfOpener, PdfPages};
use crate::raster::{render_question_composite, PageSegment, QuestionSpan};
use crate::text::{extract_text_spans, sanitize_metadata_text, text_for_region, TextSpanPx};
use crate::timing::TimingLog;
use crate::tree::{build_part_tree, TreeInput};

/// Numeral boxes wider than this captured a whole line, not a number.
const MAX_NUMERAL_WIDTH_PX: i32 = 100;

/// Outcome of extracting one PDF.
#[derive(Debug, Clone)]
pub struct ExtractionResult {
    pub question_count: usize,
    pub question_ids: Vec<String>,
    pub warnings: Vec<String>,
    pub output_dir: PathBuf,
}

/// Extracts every question of one question paper into the cache.
///
/// The cache layout produced under `output_dir` is
/// `{exam_code}/{topic}/{question_id}/` per question plus
/// `{exam_code}/_metadata/` for the shared files.
pub fn extract_question_paper(
    opener: &dyn PdfOpener,
    pdf_path: &Path,
    output_dir: &Path,
    config: &ExtractionConfig,
    classifier: &dyn TopicClassifier,
    ms_search_dirs: &[PathBuf],
    diagnostics: Option<&DiagnosticsCollector>,
) -> Result<ExtractionResult> {
    if !pdf_path.exists() {
        return Err(ExtractError::PdfNotFound(pdf_path.to_path_buf()));
    }
    let pdf_name = pdf_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("paper")
        .to_string();
    let ident = PaperIdent::from_stem(&pdf_name);
    std::fs::create_dir_all(output_dir)?;

    let owned_collector =
        (diagnostics.is_none() && config.run_diagnostics).then(DiagnosticsCollector::new);
    let collector = diagnostics.or(owned_collector.as_ref());

    let mut timing = TimingLog::new();
    let mut warnings: Vec<String> = Vec::new();
    let mut question_ids: Vec<String> = Vec::new();
    let mut records: Vec<QuestionRecord> = Vec::new();

    let doc = opener.open(pdf_path)?;
    if doc.page_count() == 0 {
        return Err(ExtractError::EmptyDocument);
    }

    let numerals =
        timing.time_paper("numeral_detection", || detect_question_starts(doc.as_ref(), config))?;
    info!(pdf = %pdf_name, questions = numerals.len(), "detected question starts");

    if numerals.is_empty() {
        warnings.push("No questions detected in PDF".to_string());
        return Ok(ExtractionResult {
            question_count: 0,
            question_ids,
            warnings,
            output_dir: output_dir.to_path_buf(),
        });
    }

    // Mark scheme, when the sibling _ms_ PDF exists.
    let mut ms_doc: Option<Box<dyn PdfPages>> = None;
    let mut ms_mapping: FxHashMap<u32, Vec<usize>> = FxHashMap::default();
    if config.extract_markschemes {
        if let Some(ms_path) = find_markscheme_pdf(pdf_path, ms_search_dirs) {
            info!(ms = %ms_path.display(), "found mark scheme");
            match opener.open(&ms_path) {
                Ok(opened) => {
                    let numbers: BTreeSet<u32> = numerals.iter().map(|n| n.number).collect();
                    ms_mapping = timing
                        .time_paper("ms_page_mapping", || map_ms_pages(opened.as_ref(), &numbers))?;
                    ms_doc = Some(opened);
                }
                Err(e) => {
                    warn!(error = %e, "failed to open mark scheme, continuing without");
                }
            }
        }
    }

    let queue = match config.write_workers {
        0 => None,
        workers => Some(WriteQueue::new(workers)?),
    };

    let mut reference_x: Option<i32> = None;

    for (i, numeral) in numerals.iter().enumerate() {
        let next = numerals.get(i + 1);
        let outcome = extract_single_question(
            doc.as_ref(),
            numeral,
            next,
            &ident,
            &pdf_name,
            output_dir,
            config,
            classifier,
            ms_doc.as_deref(),
            &ms_mapping,
            &mut timing,
            queue.as_ref(),
            collector,
            &mut reference_x,
        );
        match outcome {
            Ok((question_id, record)) => {
                debug!(question = %question_id, "extracted");
                question_ids.push(question_id);
                records.push(record);
            }
            Err(e) => {
                let msg = format!(
                    "Failed to extract question {}: {e} [PDF: {pdf_name}, Exam: {}, Page: {}]",
                    numeral.number, ident.exam_code, numeral.page
                );
                warn!(
                    question = numeral.number,
                    page = numeral.page,
                    error = %e,
                    "question extraction failed, continuing"
                );
                warnings.push(msg);
                if let Some(collector) = collector {
                    let ctx = DiagContext {
                        pdf_name: pdf_name.clone(),
                        exam_code: ident.exam_code.clone(),
                        question_number: numeral.number,
                    };
                    collector.add_invalid_question(&ctx, &[e.to_string()], (0, 0));
                }
            }
        }
    }

    // The PDF is not done until its images are actually on disk.
    if let Some(queue) = &queue {
        for failure in queue.wait_all() {
            warnings.push(format!("Background write failed: {failure}"));
        }
    }

    append_question_records(output_dir, &ident.exam_code, &records)?;

    let metadata_dir = output_dir.join(&ident.exam_code).join("_metadata");
    if let Some(own) = &owned_collector {
        if own.issue_count() > 0 {
            own.report().save(&metadata_dir.join("detection_diagnostics.json"))?;
        }
    }
    timing.save_merged(&metadata_dir.join("timing.json"))?;
    info!("{}", timing.summary());
    info!(
        pdf = %pdf_name,
        exam = %ident.exam_code,
        questions = question_ids.len(),
        "completed extraction"
    );

    Ok(ExtractionResult {
        question_count: question_ids.len(),
        question_ids,
        warnings,
        output_dir: output_dir.to_path_buf(),
    })
}

#[allow(clippy::too_many_arguments)]
fn extract_single_question(
    doc: &dyn PdfPages,
    numeral: &QuestionStart,
    next: Option<&QuestionStart>,
    ident: &PaperIdent,
    pdf_name: &str,
    output_dir: &Path,
    config: &ExtractionConfig,
    classifier: &dyn TopicClassifier,
    ms_doc: Option<&dyn PdfPages>,
    ms_mapping: &FxHashMap<u32, Vec<usize>>,
    timing: &mut TimingLog,
    queue: Option<&WriteQueue>,
    collector: Option<&DiagnosticsCollector>,
    reference_x: &mut Option<i32>,
) -> Result<(String, QuestionRecord)> {
    let dpi = config.dpi;
    let question_id = format!("{pdf_name}_q{}", numeral.number);
    let ctx = DiagContext {
        pdf_name: pdf_name.to_string(),
        exam_code: ident.exam_code.clone(),
        question_number: numeral.number,
    };

    // Question span: this numeral to the next, or the end of the document.
    let (end_page, end_y) = match next {
        Some(next) => (next.page, next.y),
        None => {
            let last = doc.page_count() - 1;
            (last, doc.page_size(last)?.height)
        }
    };
    let span = QuestionSpan {
        start_page: numeral.page,
        start_y: numeral.y,
        end_page,
        end_y,
    };

    let (composite, segments) = timing.time_question(&question_id, "composite_creation", || {
        render_question_composite(doc, span, dpi, config.trim_whitespace)
    })?;
    let composite_width = composite.width() as i32;
    let composite_height = composite.height() as i32;

    // One text extraction per segment, shared by both detectors.
    let mut letters = Vec::new();
    let mut romans = Vec::new();
    let mut raw_marks = Vec::new();
    timing.time_question(&question_id, "part_detection", || -> Result<()> {
        for segment in &segments {
            let data = doc.text_data(segment.page_index, segment.clip)?;
            let (seg_letters, seg_romans) =
                detect_part_labels(&data, segment.clip, dpi, segment.y_offset, segment.trim_offset);
            letters.extend(seg_letters);
            romans.extend(seg_romans);
            raw_marks.extend(detect_mark_boxes(
                &data,
                segment.clip,
                dpi,
                segment.y_offset,
                segment.trim_offset,
            ));
        }
        Ok(())
    })?;
    debug!(
        question = numeral.number,
        letters = letters.len(),
        romans = romans.len(),
        marks = raw_marks.len(),
        "detection complete"
    );

    let columns = timing.time_question(&question_id, "bounds_calculation", || {
        normalize_mark_boxes(&raw_marks, collector, &ctx)
    });

    // Numeral box in composite pixels, with the oversize sanity check: an
    // overwide box means detection grabbed a whole line.
    let numeral_bbox = numeral_bbox_in_composite(numeral, &segments, dpi);
    if let Some(gbox) = numeral_bbox {
        if gbox.width() > MAX_NUMERAL_WIDTH_PX {
            warn!(
                question = numeral.number,
                width = gbox.width(),
                "oversized numeral bbox, detection may have captured the whole line"
            );
            if let Some(collector) = collector {
                collector.add_layout_issue(
                    &ctx,
                    numeral.page,
                    format!("Oversized numeral bbox: width={}px", gbox.width()),
                    (gbox.top, gbox.bottom),
                    String::new(),
                    String::new(),
                );
            }
        }
    }

    let calc = HorizontalCalc::new(
        columns.clone(),
        composite_width,
        numeral_bbox,
        &config.slice,
    );
    let horizontal_offset = calc.horizontal_offset(*reference_x);
    if reference_x.is_none() {
        *reference_x = numeral_bbox.map(|b| b.left);
    }

    // Diagnostics callback: the PDF text of a composite Y-span, so gap
    // reports show what actually sits between two labels.
    let text_between = |y0: i32, y1: i32| segment_text_between(doc, &segments, dpi, y0, y1);
    let text_between: &dyn Fn(i32, i32) -> String = &text_between;

    let part_tree = timing.time_question(&question_id, "tree_building", || {
        build_part_tree(
            &TreeInput {
                question_number: numeral.number,
                letters: &letters,
                romans: &romans,
                composite_width,
                composite_height,
            },
            &columns,
            numeral_bbox,
            &calc,
            collector,
            &ctx,
            Some(text_between),
        )
    })?;

    // Per-part text for keyword search, filtered by the final rectangles.
    let (root_text, child_text) = timing.time_question(&question_id, "text_extraction", || {
        extract_question_text(doc, &segments, &part_tree, dpi, composite_width)
    })?;

    // Topic classification plus propagation and consensus.
    let mut part_texts: IndexMap<String, String> = IndexMap::new();
    part_texts.insert(part_tree.label.clone(), root_text.clone());
    for (label, text) in &child_text {
        part_texts.insert(label.clone(), text.clone());
    }
    let raw_topics = classify_all_parts(&part_tree, &part_texts, &ident.exam_code, classifier);
    let propagated = propagate_topics(&raw_topics, &part_tree);
    let topic = consensus_topic(&raw_topics, &part_tree);

    let mut sub_topics: BTreeSet<String> = BTreeSet::new();
    let mut child_topics: IndexMap<String, String> = IndexMap::new();
    for part in part_tree.iter_all() {
        let Some(assigned) = propagated.get(&part.label) else { continue };
        if assigned != UNKNOWN_TOPIC {
            sub_topics.insert(assigned.clone());
        }
        if part.label != part_tree.label {
            child_topics.insert(part.label.clone(), assigned.clone());
        }
    }

    let question_dir = output_dir
        .join(&ident.exam_code)
        .join(&topic)
        .join(&question_id);

    // Mark-scheme image for this question, when mapped.
    let mut markscheme = None;
    let mut markscheme_path = None;
    if let (Some(ms), Some(pages)) = (ms_doc, ms_mapping.get(&numeral.number)) {
        if let Some(image) = render_markscheme_image(ms, numeral.number, pages, dpi)? {
            markscheme_path = Some(format!("{question_id}_ms.png"));
            markscheme = Some(image);
        }
    }

    let mut validation_failures: Vec<String> = Vec::new();
    if part_tree.leaf_count() == 0 {
        validation_failures.push("No leaf parts detected".to_string());
    }
    let is_valid = validation_failures.is_empty();
    if !is_valid {
        warn!(
            question = numeral.number,
            failures = ?validation_failures,
            "question marked invalid"
        );
        if let Some(collector) = collector {
            collector.add_invalid_question(&ctx, &validation_failures, (0, composite_height));
        }
    }

    let total_marks = part_tree.total_marks();
    let part_count = part_tree.leaf_count();

    timing.time_question(&question_id, "file_writing", || {
        write_question(
            QuestionArtifacts {
                question_id: question_id.clone(),
                composite,
                horizontal_offset,
                numeral_bbox,
                mark_bboxes: columns.accepted.iter().map(|m| m.bbox).collect(),
                markscheme,
            },
            &part_tree,
            &question_dir,
            queue,
        )
    })?;

    let record = QuestionRecord {
        schema_version: QUESTION_SCHEMA_VERSION,
        question_id: question_id.clone(),
        exam_code: ident.exam_code.clone(),
        year: ident.year,
        paper: ident.paper,
        variant: ident.variant,
        question_number: numeral.number,
        total_marks,
        part_count,
        topic: topic.clone(),
        sub_topics: sub_topics.into_iter().collect(),
        child_topics,
        relative_path: format!("{}/{topic}/{question_id}", ident.exam_code),
        root_text,
        child_text,
        markscheme_path,
        is_valid,
    };

    Ok((question_id, record))
}

/// Translates the numeral box from PDF points to composite pixels using the
/// first segment's mapping.
fn numeral_bbox_in_composite(
    numeral: &QuestionStart,
    segments: &[PageSegment],
    dpi: u32,
) -> Option<GlyphBox> {
    let bbox = numeral.bbox?;
    let first = segments.first()?;
    let mapper = PixelMapper::new(first.clip, dpi, first.y_offset, first.trim_offset);
    Some(mapper.glyph_box(bbox))
}

/// PDF text of a composite Y-span, for diagnostics. Walks the segments that
/// overlap the span and extracts their full-width slice of page text.
fn segment_text_between(
    doc: &dyn PdfPages,
    segments: &[PageSegment],
    dpi: u32,
    y0: i32,
    y1: i32,
) -> String {
    let scale = f64::from(dpi) / 72.0;
    let mut parts = Vec::new();

    for segment in segments {
        let seg_top = segment.y_offset;
        let seg_bottom = segment.y_offset + (segment.clip.height() * scale).round() as i32;
        if seg_bottom < y0 || seg_top > y1 {
            continue;
        }
        let local_y0 = y0.max(seg_top);
        let local_y1 = y1.min(seg_bottom);
        let pdf_y0 = f64::from(local_y0 - seg_top) / scale + segment.clip.y0;
        let pdf_y1 = f64::from(local_y1 - seg_top) / scale + segment.clip.y0;

        let clip = crate::geom::PdfRect::new(segment.clip.x0, pdf_y0, segment.clip.x1, pdf_y1);
        match doc.plain_text(segment.page_index, Some(clip)) {
            Ok(text) if !text.trim().is_empty() => parts.push(text.trim().to_string()),
            _ => {}
        }
    }
    parts.join(" ")
}

/// Extracts and sanitizes per-part text using the final part rectangles.
fn extract_question_text(
    doc: &dyn PdfPages,
    segments: &[PageSegment],
    part_tree: &Part,
    dpi: u32,
    composite_width: i32,
) -> Result<(String, IndexMap<String, String>)> {
    let mut spans: Vec<TextSpanPx> = Vec::new();
    for segment in segments {
        let data = doc.text_data(segment.page_index, segment.clip)?;
        spans.extend(extract_text_spans(
            &data,
            segment.clip,
            dpi,
            segment.y_offset,
            segment.trim_offset,
        ));
    }
    spans.sort_by_key(|s| s.top);

    let mut root_text = String::new();
    let mut child_text: IndexMap<String, String> = IndexMap::new();

    for part in part_tree.iter_all() {
        let text = sanitize_metadata_text(&text_for_region(
            &spans,
            &part.content_rect,
            composite_width,
        ));
        if text.is_empty() {
            continue;
        }
        if part.label == part_tree.label {
            root_text = text;
        } else {
            child_text.insert(part.label.clone(), text);
        }
    }

    Ok((root_text, child_text))
}
