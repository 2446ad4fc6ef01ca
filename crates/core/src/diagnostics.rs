//! Detection diagnostics: a structured event stream collected during
//! extraction and rendered to `detection_diagnostics.json`.
//!
//! The collector is a per-extraction value passed in by the caller; when
//! the caller does not care, no collector exists and events are discarded
//! at the call sites. Formatting beyond the JSON report is someone else's
//! job.

use std::collections::BTreeSet;
use std::path::Path;
use std::sync::Mutex;

use indexmap::IndexMap;
use itertools::Itertools;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::Result;
use crate::geom::GlyphBox;

/// Context threaded through detection so events can name their source.
#[derive(Debug, Clone)]
pub struct DiagContext {
    pub pdf_name: String,
    pub exam_code: String,
    pub question_number: u32,
}

/// One recorded detection issue.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionIssue {
    pub issue_type: String,
    pub pdf_name: String,
    pub exam_code: String,
    pub question_number: u32,
    pub message: String,
    pub y_span: [i32; 2],
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub prev_label: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub next_label: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub pdf_content_between_labels: String,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub validation_outcome: IndexMap<String, String>,
}

/// Extracted gap text is capped so a misdetected span cannot balloon the
/// report.
const MAX_GAP_TEXT: usize = 2000;

fn format_label_info(label: &str, kind: &str, y: i32, bbox: Option<GlyphBox>) -> String {
    match bbox {
        Some(b) => format!("({label}) {kind} @ y={y} bbox:{:?}", b.as_array()),
        None => format!("({label}) {kind} @ y={y}"),
    }
}

fn truncate(text: String) -> String {
    if text.len() <= MAX_GAP_TEXT {
        return text;
    }
    let mut end = MAX_GAP_TEXT;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    text[..end].to_string()
}

/// Thread-safe sink for detection issues.
#[derive(Debug, Default)]
pub struct DiagnosticsCollector {
    inner: Mutex<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    issues: Vec<DetectionIssue>,
    pdfs: BTreeSet<String>,
}

impl DiagnosticsCollector {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&self, issue: DetectionIssue) {
        let mut inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        inner.pdfs.insert(issue.pdf_name.clone());
        inner.issues.push(issue);
    }

    /// A skipped letter: `(a)` followed by `(c)`.
    #[allow(clippy::too_many_arguments)]
    pub fn add_letter_gap(
        &self,
        ctx: &DiagContext,
        current_label: &str,
        next_label: &str,
        missed: &[String],
        y_span: (i32, i32),
        prev_bbox: Option<GlyphBox>,
        next_bbox: Option<GlyphBox>,
        pdf_content: String,
    ) {
        let missed_list = missed.iter().map(|m| format!("({m})")).join(", ");
        self.push(DetectionIssue {
            issue_type: "letter_gap".into(),
            pdf_name: ctx.pdf_name.clone(),
            exam_code: ctx.exam_code.clone(),
            question_number: ctx.question_number,
            message: format!(
                "Q{}: Letter gap ({current_label}) to ({next_label}), missed: {missed_list}. Y: {}-{}",
                ctx.question_number, y_span.0, y_span.1
            ),
            y_span: [y_span.0, y_span.1],
            prev_label: format_label_info(current_label, "letter", y_span.0, prev_bbox),
            next_label: format_label_info(next_label, "letter", y_span.1, next_bbox),
            pdf_content_between_labels: truncate(pdf_content),
            validation_outcome: IndexMap::new(),
        });
    }

    /// A skipped roman: `(i)` followed by `(iii)`.
    #[allow(clippy::too_many_arguments)]
    pub fn add_roman_gap(
        &self,
        ctx: &DiagContext,
        parent_label: &str,
        current_roman: &str,
        next_roman: &str,
        missed: &[String],
        y_span: (i32, i32),
        prev_bbox: Option<GlyphBox>,
        next_bbox: Option<GlyphBox>,
        pdf_content: String,
    ) {
        let missed_list = missed.iter().map(|m| format!("({m})")).join(", ");
        self.push(DetectionIssue {
            issue_type: "roman_gap".into(),
            pdf_name: ctx.pdf_name.clone(),
            exam_code: ctx.exam_code.clone(),
            question_number: ctx.question_number,
            message: format!(
                "Q{}: Roman gap in {parent_label}: ({current_roman}) to ({next_roman}), missed: {missed_list}. Y: {}-{}",
                ctx.question_number, y_span.0, y_span.1
            ),
            y_span: [y_span.0, y_span.1],
            prev_label: format_label_info(current_roman, "roman", y_span.0, prev_bbox),
            next_label: format_label_info(next_roman, "roman", y_span.1, next_bbox),
            pdf_content_between_labels: truncate(pdf_content),
            validation_outcome: IndexMap::new(),
        });
    }

    /// A roman sequence going backwards: a parent letter was likely missed.
    #[allow(clippy::too_many_arguments)]
    pub fn add_roman_reset(
        &self,
        ctx: &DiagContext,
        parent_label: &str,
        prev_roman: &str,
        reset_roman: &str,
        y_span: (i32, i32),
        prev_bbox: Option<GlyphBox>,
        next_bbox: Option<GlyphBox>,
        pdf_content: String,
    ) {
        self.push(DetectionIssue {
            issue_type: "roman_reset".into(),
            pdf_name: ctx.pdf_name.clone(),
            exam_code: ctx.exam_code.clone(),
            question_number: ctx.question_number,
            message: format!(
                "Q{}: Roman reset in {parent_label}: ({prev_roman}) to ({reset_roman}). Missed parent label? Y: {}-{}",
                ctx.question_number, y_span.0, y_span.1
            ),
            y_span: [y_span.0, y_span.1],
            prev_label: format_label_info(prev_roman, "roman", y_span.0, prev_bbox),
            next_label: format_label_info(reset_roman, "roman", y_span.1, next_bbox),
            pdf_content_between_labels: truncate(pdf_content),
            validation_outcome: IndexMap::new(),
        });
    }

    /// More romans than letters: parent labels were likely missed.
    pub fn add_orphaned_romans(
        &self,
        ctx: &DiagContext,
        letters: &[String],
        romans: &[String],
        y_span: (i32, i32),
        prev_label_info: String,
        next_label_info: String,
        validation_outcome: IndexMap<String, String>,
    ) {
        self.push(DetectionIssue {
            issue_type: "orphaned_romans".into(),
            pdf_name: ctx.pdf_name.clone(),
            exam_code: ctx.exam_code.clone(),
            question_number: ctx.question_number,
            message: format!(
                "Q{}: {} romans but only {} letters. Letters: {letters:?}, Romans: {romans:?}",
                ctx.question_number,
                romans.len(),
                letters.len()
            ),
            y_span: [y_span.0, y_span.1],
            prev_label: prev_label_info,
            next_label: next_label_info,
            pdf_content_between_labels: String::new(),
            validation_outcome,
        });
    }

    /// A layout consistency problem: stray mark boxes, oversized numeral
    /// boxes, composite-height fallbacks.
    pub fn add_layout_issue(
        &self,
        ctx: &DiagContext,
        page_index: usize,
        message: String,
        y_span: (i32, i32),
        prev_label_info: String,
        next_label_info: String,
    ) {
        self.push(DetectionIssue {
            issue_type: "layout_issue".into(),
            pdf_name: ctx.pdf_name.clone(),
            exam_code: ctx.exam_code.clone(),
            question_number: ctx.question_number,
            message: format!(
                "Q{} Layout Issue (Page {page_index}): {message}",
                ctx.question_number
            ),
            y_span: [y_span.0, y_span.1],
            prev_label: prev_label_info,
            next_label: next_label_info,
            pdf_content_between_labels: String::new(),
            validation_outcome: IndexMap::new(),
        });
    }

    /// A question that failed extraction or validation as a whole.
    pub fn add_invalid_question(
        &self,
        ctx: &DiagContext,
        failures: &[String],
        y_span: (i32, i32),
    ) {
        self.push(DetectionIssue {
            issue_type: "invalid_question".into(),
            pdf_name: ctx.pdf_name.clone(),
            exam_code: ctx.exam_code.clone(),
            question_number: ctx.question_number,
            message: format!("Q{} INVALID: {}", ctx.question_number, failures.join(", ")),
            y_span: [y_span.0, y_span.1],
            prev_label: String::new(),
            next_label: String::new(),
            pdf_content_between_labels: String::new(),
            validation_outcome: IndexMap::new(),
        });
    }

    pub fn issue_count(&self) -> usize {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).issues.len()
    }

    pub fn report(&self) -> DiagnosticsReport {
        let inner = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        DiagnosticsReport::from_issues(inner.issues.clone(), &inner.pdfs)
    }
}

/// The serialized diagnostics report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticsReport {
    pub generated_at: String,
    pub source_pdfs: Vec<String>,
    pub total_issues: usize,
    pub summary_by_type: IndexMap<String, usize>,
    pub issues: Vec<DetectionIssue>,
}

impl DiagnosticsReport {
    fn from_issues(issues: Vec<DetectionIssue>, pdfs: &BTreeSet<String>) -> Self {
        let mut summary_by_type: IndexMap<String, usize> = IndexMap::new();
        for issue in &issues {
            *summary_by_type.entry(issue.issue_type.clone()).or_insert(0) += 1;
        }
        Self {
            generated_at: chrono::Utc::now().to_rfc3339(),
            source_pdfs: pdfs.iter().cloned().collect(),
            total_issues: issues.len(),
            summary_by_type,
            issues,
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)?;
        info!(path = %path.display(), issues = self.total_issues, "detection diagnostics saved");
        Ok(())
    }
}
