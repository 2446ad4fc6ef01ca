//! Tree builder behavior on synthetic detections: inline folding, sequence
//! validation, mark assignment and context rectangles.

use qslice_core::bounds::HorizontalCalc;
use qslice_core::detect::labels::{LabelKind, PartLabel};
use qslice_core::detect::{normalize_mark_boxes, MarkBox, MarkColumns};
use qslice_core::diagnostics::{DiagContext, DiagnosticsCollector};
use qslice_core::geom::GlyphBox;
use qslice_core::model::{MarkSource, Part};
use qslice_core::tree::{build_part_tree, TreeInput};
use qslice_core::SliceConfig;

const WIDTH: i32 = 595;
const HEIGHT: i32 = 742;

fn letter(label: &str, y: i32) -> PartLabel {
    PartLabel {
        label: label.to_string(),
        kind: LabelKind::Letter,
        y,
        bbox: GlyphBox { left: 50, top: y, right: 68, bottom: y + 10 },
    }
}

fn roman(label: &str, y: i32) -> PartLabel {
    PartLabel {
        label: label.to_string(),
        kind: LabelKind::Roman,
        y,
        bbox: GlyphBox { left: 70, top: y, right: 94, bottom: y + 10 },
    }
}

fn mark(value: u32, y: i32) -> MarkBox {
    MarkBox {
        value,
        y,
        bbox: GlyphBox { left: 500, top: y, right: 518, bottom: y + 10 },
    }
}

fn ctx() -> DiagContext {
    DiagContext {
        pdf_name: "0478_s24_qp_12".into(),
        exam_code: "0478".into(),
        question_number: 1,
    }
}

fn build(
    question_number: u32,
    letters: &[PartLabel],
    romans: &[PartLabel],
    marks: &[MarkBox],
    collector: Option<&DiagnosticsCollector>,
) -> Part {
    let columns = normalize_mark_boxes(marks, None, &ctx());
    build_with_columns(question_number, letters, romans, columns, collector)
}

fn build_with_columns(
    question_number: u32,
    letters: &[PartLabel],
    romans: &[PartLabel],
    columns: MarkColumns,
    collector: Option<&DiagnosticsCollector>,
) -> Part {
    let calc = HorizontalCalc::new(columns.clone(), WIDTH, None, &SliceConfig::default());
    build_part_tree(
        &TreeInput {
            question_number,
            letters,
            romans,
            composite_width: WIDTH,
            composite_height: HEIGHT,
        },
        &columns,
        None,
        &calc,
        collector,
        &DiagContext { question_number, ..ctx() },
        None,
    )
    .expect("tree builds")
}

#[test]
fn single_part_question_clamps_to_mark_box() {
    let root = build(1, &[], &[], &[mark(6, 0)], None);
    assert!(root.is_leaf());
    assert_eq!(root.marks.value, 6);
    assert_eq!(root.marks.source, MarkSource::Explicit);
    assert_eq!(root.content_rect.top, 0);
    // Mark bottom 10 plus trailing padding.
    assert_eq!(root.content_rect.bottom, 15);
    assert!(root.is_valid);
    assert_eq!(root.total_marks(), 6);
    assert_eq!(root.leaf_count(), 1);
}

#[test]
fn leaf_without_mark_box_is_invalid() {
    let root = build(1, &[letter("a", 100)], &[], &[], None);
    let a = &root.children[0];
    assert_eq!(a.content_rect.bottom, HEIGHT);
    assert!(!a.is_valid);
    assert!(a.validation_issues[0].contains("composite_height"));
}

#[test]
fn letter_gap_invalidates_the_earlier_letter() {
    let collector = DiagnosticsCollector::new();
    let root = build(
        1,
        &[letter("a", 50), letter("c", 200)],
        &[],
        &[mark(2, 90), mark(3, 240)],
        Some(&collector),
    );

    let a = &root.children[0];
    let c = &root.children[1];
    assert_eq!(a.label, "1(a)");
    assert!(!a.is_valid);
    assert!(a.validation_issues[0].contains("missed letter"));
    assert!(a.validation_issues[0].contains("(b)"));
    assert!(c.is_valid);
    assert_eq!(root.total_marks(), 5);

    let report = collector.report();
    assert_eq!(report.summary_by_type.get("letter_gap"), Some(&1));
    let issue = &report.issues[0];
    assert!(issue.prev_label.starts_with("(a)"));
    assert!(issue.next_label.starts_with("(c)"));
    assert!(issue.message.contains("(b)"));
    assert_eq!(issue.y_span, [50, 200]);
}

#[test]
fn roman_reset_invalidates_the_rest_of_the_group() {
    let collector = DiagnosticsCollector::new();
    let root = build(
        1,
        &[letter("a", 30)],
        &[roman("i", 60), roman("ii", 120), roman("i", 180), roman("ii", 240)],
        &[mark(1, 70), mark(2, 130), mark(1, 190), mark(2, 250)],
        Some(&collector),
    );

    let a = &root.children[0];
    assert_eq!(a.children.len(), 4);
    assert_eq!(a.children[0].label, "1(a)(i)");
    assert_eq!(a.children[1].label, "1(a)(ii)");
    assert!(a.children[0].is_valid);
    assert!(a.children[1].is_valid);
    assert!(!a.children[2].is_valid);
    assert!(!a.children[3].is_valid);
    assert!(a.children[2].validation_issues[0].contains("parent label likely missed"));
    assert!(a.children[3].validation_issues[0].contains("parent label likely missed"));

    let report = collector.report();
    assert_eq!(report.summary_by_type.get("roman_reset"), Some(&1));
}

#[test]
fn roman_gap_is_reported_without_invalidation() {
    let collector = DiagnosticsCollector::new();
    let root = build(
        1,
        &[letter("a", 30)],
        &[roman("i", 60), roman("iii", 160)],
        &[mark(1, 70), mark(2, 170)],
        Some(&collector),
    );

    let a = &root.children[0];
    assert!(a.children.iter().all(|c| c.is_valid));
    let report = collector.report();
    assert_eq!(report.summary_by_type.get("roman_gap"), Some(&1));
    assert!(report.issues[0].message.contains("(ii)"));
}

#[test]
fn inline_chain_folds_root_letter_and_roman() {
    // "8 (a) (i) ..." on one line: all three labels share y=0.
    let root = build(
        8,
        &[letter("a", 0)],
        &[roman("i", 2)],
        &[mark(2, 5)],
        None,
    );

    assert!(root.child_is_inline);
    let a = &root.children[0];
    assert!(a.child_is_inline);
    assert!(a.context_rect.is_none());
    assert!(root.context_rect.is_none());

    let leaf = &a.children[0];
    assert_eq!(leaf.label, "8(a)(i)");
    assert_eq!(leaf.marks.value, 2);
    assert_eq!(root.total_marks(), 2);
}

#[test]
fn context_rect_spans_header_only() {
    let root = build(
        1,
        &[letter("a", 150), letter("b", 400)],
        &[],
        &[mark(2, 190), mark(3, 440)],
        None,
    );

    let context = root.context_rect.expect("root has a header strip");
    assert_eq!(context.top, root.content_rect.top);
    assert_eq!(context.bottom, 150);
    assert!(context.bottom <= root.children[0].content_rect.top);
}

#[test]
fn leaves_adopt_the_lowest_mark_in_their_span() {
    let root = build(
        1,
        &[letter("a", 100), letter("b", 500)],
        &[],
        &[mark(2, 200), mark(3, 400)],
        None,
    );

    let a = &root.children[0];
    let b = &root.children[1];
    // Both marks sit in (a)'s label-to-label span; it takes the lower one
    // and the other is not reused.
    assert_eq!(a.marks.value, 3);
    assert_eq!(b.marks.value, 0);
    assert_eq!(b.marks.source, MarkSource::Inferred);
    assert_eq!(root.total_marks(), 3);
}

#[test]
fn children_are_ordered_and_disjoint() {
    let root = build(
        2,
        &[letter("a", 100), letter("b", 300), letter("c", 520)],
        &[roman("i", 130), roman("ii", 200), roman("i", 330), roman("ii", 420)],
        &[mark(1, 140), mark(2, 210), mark(3, 340), mark(4, 430), mark(5, 560)],
        None,
    );

    for node in root.iter_all() {
        for pair in node.children.windows(2) {
            assert!(pair[0].content_rect.top <= pair[1].content_rect.top);
            assert!(!pair[0].content_rect.overlaps_vertically(&pair[1].content_rect));
        }
        assert!(node.content_rect.bottom > node.content_rect.top);
        let right = node.content_rect.right_or(WIDTH);
        assert!(right > node.content_rect.left);
    }
    // The second (i)/(ii) run nests under (b), not (a): the reset rule only
    // fires within one letter group.
    assert_eq!(root.children[1].children.len(), 2);
    assert!(root.children[1].children.iter().all(|c| c.is_valid));
}

#[test]
fn orphaned_romans_are_reported_with_outcome() {
    let collector = DiagnosticsCollector::new();
    build(
        3,
        &[letter("a", 50)],
        &[roman("i", 80), roman("ii", 140), roman("i", 300), roman("ii", 380)],
        &[mark(1, 90), mark(1, 150), mark(2, 310), mark(2, 390)],
        Some(&collector),
    );

    let report = collector.report();
    assert_eq!(report.summary_by_type.get("orphaned_romans"), Some(&1));
    let orphaned = report
        .issues
        .iter()
        .find(|i| i.issue_type == "orphaned_romans")
        .expect("orphaned_romans issue");
    assert!(!orphaned.validation_outcome.is_empty());
    assert!(orphaned
        .validation_outcome
        .values()
        .any(|status| status.starts_with("INVALID")));
}
