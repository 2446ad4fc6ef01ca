//! Hierarchical part-tree construction.
//!
//! Turns flat label and mark detections into the immutable [`Part`] tree:
//! letters nest under the question root, romans nest under letters, leaf
//! bottoms are pinned to mark boxes, inline labels are folded together, and
//! sequence invariants (a/b/c, i/ii/iii) are enforced with diagnostics for
//! every violation.

use indexmap::IndexMap;
use smallvec::SmallVec;
use tracing::warn;

use crate::bounds::HorizontalCalc;
use crate::detect::labels::roman_index;
use crate::detect::{MarkBox, MarkColumns, PartLabel};
use crate::diagnostics::{DiagContext, DiagnosticsCollector};
use crate::geom::GlyphBox;
use crate::model::{Marks, Part, PartKind, PixelRect};

/// Labels closer together than this share a line.
const INLINE_THRESHOLD_PX: i32 = 10;

/// Padding below the last mark box when clamping trailing leaves.
const TRAILING_PAD_PX: i32 = 5;

const LETTER_SEQUENCE: &str = "abcdefghijkl";

/// Callback extracting PDF text for a composite Y-span, used to put the
/// actual page content of a suspect gap into the diagnostics report.
pub type TextBetween<'a> = &'a dyn Fn(i32, i32) -> String;

/// Flat detection results for one question.
pub struct TreeInput<'a> {
    pub question_number: u32,
    pub letters: &'a [PartLabel],
    pub romans: &'a [PartLabel],
    pub composite_width: i32,
    pub composite_height: i32,
}

/// Mutable node state while the tree takes shape.
struct NodeBuilder {
    label: String,
    kind: PartKind,
    top: i32,
    bottom: i32,
    /// Span used for mark assignment: label to next sibling label, before
    /// any mark clamping.
    assign_top: i32,
    assign_bottom: i32,
    label_box: Option<GlyphBox>,
    child_is_inline: bool,
    marks_value: Option<u32>,
    is_valid: bool,
    issues: Vec<String>,
    children: Vec<NodeBuilder>,
}

impl NodeBuilder {
    fn new(label: String, kind: PartKind, top: i32, bottom: i32) -> Self {
        Self {
            label,
            kind,
            top,
            bottom,
            assign_top: top,
            assign_bottom: bottom,
            label_box: None,
            child_is_inline: false,
            marks_value: None,
            is_valid: true,
            issues: Vec::new(),
            children: Vec::new(),
        }
    }

    fn invalidate(&mut self, reason: String) {
        self.is_valid = false;
        self.issues.push(reason);
    }
}

/// Builds the immutable part tree for one question.
///
/// `columns` must already have outliers rejected; every accepted mark is a
/// candidate for leaf assignment. `text_between` feeds gap diagnostics with
/// the PDF text of the suspect span.
#[allow(clippy::too_many_arguments)]
pub fn build_part_tree(
    input: &TreeInput,
    columns: &MarkColumns,
    numeral_bbox: Option<GlyphBox>,
    calc: &HorizontalCalc,
    diagnostics: Option<&DiagnosticsCollector>,
    ctx: &DiagContext,
    text_between: Option<TextBetween>,
) -> crate::error::Result<Part> {
    let mut letters: Vec<PartLabel> = input.letters.to_vec();
    letters.sort_by_key(|l| l.y);
    let mut romans: Vec<PartLabel> = input.romans.to_vec();
    romans.sort_by_key(|r| r.y);
    let marks = &columns.accepted;
    let height = input.composite_height;

    let mut root = build_spans(input.question_number, &letters, &romans, marks, height);
    root.label_box = numeral_bbox;

    validate_letter_sequence(&mut root, ctx, diagnostics, text_between);
    validate_roman_sequences(&mut root, ctx, diagnostics, text_between);

    assign_marks(&mut root, marks);

    let part = seal(&root, calc, input.composite_width)?;

    if romans.len() > letters.len() {
        warn!(
            letters = letters.len(),
            romans = romans.len(),
            "more romans than letters, parent labels may have been missed"
        );
        if let Some(collector) = diagnostics {
            let letter_names: Vec<String> = letters.iter().map(|l| l.label.clone()).collect();
            let roman_names: Vec<String> = romans.iter().map(|r| r.label.clone()).collect();
            let first_roman = &romans[0];
            let prev_info = letters
                .last()
                .map(|l| format!("({}) @ y={}", l.label, l.y))
                .unwrap_or_default();
            let next_info = format!("({}) @ y={}", first_roman.label, first_roman.y);
            collector.add_orphaned_romans(
                ctx,
                &letter_names,
                &roman_names,
                (0, first_roman.y),
                prev_info,
                next_info,
                validation_outcome(&part),
            );
        }
    }

    Ok(part)
}

/// Per-part validation status, as recorded in diagnostics reports.
pub fn validation_outcome(root: &Part) -> IndexMap<String, String> {
    let mut outcome = IndexMap::new();
    for part in root.iter_all() {
        let status = if part.is_valid {
            "VALID".to_string()
        } else {
            let reason = part
                .validation_issues
                .first()
                .map_or("Unknown", String::as_str);
            format!("INVALID: {reason}")
        };
        outcome.insert(part.label.clone(), status);
    }
    outcome
}

/// Computes the vertical span of every node.
///
/// Letters span label-to-label; romans nest inside their letter by Y
/// containment; leaf bottoms are pinned to the mark box that closes them,
/// clamped so siblings never overlap. A trailing leaf with no sibling below
/// is clamped to the lowest mark box so trailing whitespace is not
/// captured; if no clamp applies it keeps the composite bottom and is
/// marked invalid.
fn build_spans(
    question_number: u32,
    letters: &[PartLabel],
    romans: &[PartLabel],
    marks: &[MarkBox],
    height: i32,
) -> NodeBuilder {
    let max_mark_bottom = marks.iter().map(|m| m.bbox.bottom).max();
    let fallback_bottom = |at_height: i32| -> i32 {
        match max_mark_bottom {
            Some(b) if at_height == height => (b + TRAILING_PAD_PX).min(height),
            _ => at_height,
        }
    };

    let mut root = NodeBuilder::new(question_number.to_string(), PartKind::Question, 0, height);

    if letters.is_empty() {
        // Single-part question: the root is the leaf.
        root.bottom = fallback_bottom(height);
        root.assign_bottom = height;
        if root.bottom == height {
            root.invalidate("No mark box detected (uses composite_height)".to_string());
        }
        return root;
    }

    for (i, letter) in letters.iter().enumerate() {
        let next_letter_y = letters.get(i + 1).map_or(height, |l| l.y);
        let letter_romans: SmallVec<[&PartLabel; 4]> = romans
            .iter()
            .filter(|r| letter.y <= r.y && r.y < next_letter_y)
            .collect();

        let mut node = NodeBuilder::new(
            format!("{question_number}({})", letter.label),
            PartKind::Letter,
            letter.y,
            next_letter_y,
        );
        node.label_box = Some(letter.bbox);
        node.assign_bottom = next_letter_y;

        if letter_romans.is_empty() {
            let own_mark = find_mark_in(marks, letter.y, next_letter_y);
            node.bottom = match own_mark {
                Some(mark) => mark.bbox.bottom.min(next_letter_y),
                None => fallback_bottom(next_letter_y),
            };
            if node.bottom == height {
                node.invalidate("No mark box detected (uses composite_height)".to_string());
            }
        } else {
            if (letter_romans[0].y - letter.y).abs() < INLINE_THRESHOLD_PX {
                node.child_is_inline = true;
            }
            for (j, roman) in letter_romans.iter().enumerate() {
                let next_roman_y = letter_romans.get(j + 1).map_or(next_letter_y, |r| r.y);
                let mut child = NodeBuilder::new(
                    format!("{}({})", node.label, roman.label),
                    PartKind::Roman,
                    roman.y,
                    next_roman_y,
                );
                child.label_box = Some(roman.bbox);
                child.assign_bottom = next_roman_y;
                child.bottom = match find_mark_in(marks, roman.y, next_roman_y) {
                    Some(mark) => mark.bbox.bottom.min(next_roman_y),
                    None => fallback_bottom(next_roman_y),
                };
                if child.bottom == height {
                    child.invalidate("No mark box detected (uses composite_height)".to_string());
                }
                node.children.push(child);
            }
            node.bottom = node.children.last().map_or(node.bottom, |c| c.bottom);
        }

        root.children.push(node);
    }

    if (letters[0].y - root.top).abs() < INLINE_THRESHOLD_PX {
        root.child_is_inline = true;
    }
    root.bottom = root.children.last().map_or(height, |c| c.bottom);
    root
}

/// First mark whose anchor Y falls inside `[top, bottom)`.
fn find_mark_in(marks: &[MarkBox], top: i32, bottom: i32) -> Option<&MarkBox> {
    marks.iter().find(|m| top <= m.y && m.y < bottom)
}

/// Flags letter gaps: when `(a)` is followed by `(c)`, the `(a)` span
/// secretly contains the unseen `(b)`, so its bottom boundary cannot be
/// trusted.
fn validate_letter_sequence(
    root: &mut NodeBuilder,
    ctx: &DiagContext,
    diagnostics: Option<&DiagnosticsCollector>,
    text_between: Option<TextBetween>,
) {
    for i in 0..root.children.len().saturating_sub(1) {
        let (curr_letter, next_letter) = (letter_of(&root.children[i]), letter_of(&root.children[i + 1]));
        let (Some(curr), Some(next)) = (curr_letter, next_letter) else { continue };
        let (Some(curr_idx), Some(next_idx)) =
            (LETTER_SEQUENCE.find(curr), LETTER_SEQUENCE.find(next))
        else {
            continue;
        };
        if next_idx <= curr_idx + 1 {
            continue;
        }

        let missed: Vec<String> = LETTER_SEQUENCE[curr_idx + 1..next_idx]
            .chars()
            .map(|c| c.to_string())
            .collect();
        let y_span = (root.children[i].top, root.children[i + 1].top);
        let missed_display: Vec<String> = missed.iter().map(|m| format!("({m})")).collect();

        root.children[i].invalidate(format!(
            "Boundary unreliable - missed letter(s): {}",
            missed_display.join(", ")
        ));
        warn!(
            question = ctx.question_number,
            part = %root.children[i].label,
            from = %curr,
            to = %next,
            "letter gap detected, marking earlier part invalid"
        );

        if let Some(collector) = diagnostics {
            let content = extract_between(text_between, y_span);
            collector.add_letter_gap(
                ctx,
                &curr.to_string(),
                &next.to_string(),
                &missed,
                y_span,
                root.children[i].label_box,
                root.children[i + 1].label_box,
                content,
            );
        }
    }
}

/// Checks each letter's roman children for gaps and resets. A reset (ii
/// followed by i) means a parent letter went undetected: the resetting
/// roman and everything after it in the group belong to that unseen parent,
/// so they are all untrustworthy.
fn validate_roman_sequences(
    root: &mut NodeBuilder,
    ctx: &DiagContext,
    diagnostics: Option<&DiagnosticsCollector>,
    text_between: Option<TextBetween>,
) {
    for letter in &mut root.children {
        let parent_label = letter.label.clone();
        let mut prev: Option<(u32, String, i32, Option<GlyphBox>)> = None;

        let mut reset_at: Option<usize> = None;
        for (j, roman) in letter.children.iter().enumerate() {
            let roman_label = roman_of(roman);
            let Some(curr_idx) = roman_index(&roman_label) else { continue };

            if let Some((prev_idx, prev_label, prev_y, prev_box)) = &prev {
                if curr_idx <= *prev_idx {
                    let y_span = (*prev_y, roman.top);
                    warn!(
                        question = ctx.question_number,
                        parent = %parent_label,
                        from = %prev_label,
                        to = %roman_label,
                        "roman reset detected, missed parent label likely"
                    );
                    if let Some(collector) = diagnostics {
                        let content = extract_between(text_between, y_span);
                        collector.add_roman_reset(
                            ctx,
                            &parent_label,
                            prev_label,
                            &roman_label,
                            y_span,
                            *prev_box,
                            roman.label_box,
                            content,
                        );
                    }
                    reset_at = Some(j);
                    break;
                } else if curr_idx > prev_idx + 1 {
                    let missed: Vec<String> = (*prev_idx + 1..curr_idx)
                        .filter_map(|idx| roman_name(idx))
                        .collect();
                    let y_span = (*prev_y, roman.top);
                    warn!(
                        question = ctx.question_number,
                        parent = %parent_label,
                        from = %prev_label,
                        to = %roman_label,
                        "roman gap detected"
                    );
                    if let Some(collector) = diagnostics {
                        let content = extract_between(text_between, y_span);
                        collector.add_roman_gap(
                            ctx,
                            &parent_label,
                            prev_label,
                            &roman_label,
                            &missed,
                            y_span,
                            *prev_box,
                            roman.label_box,
                            content,
                        );
                    }
                }
            }
            prev = Some((curr_idx, roman_label, roman.top, roman.label_box));
        }

        if let Some(start) = reset_at {
            for roman in &mut letter.children[start..] {
                let y = roman.top;
                roman.invalidate(format!("Orphaned - parent label likely missed before Y={y}"));
            }
        }
    }
}

/// Walks leaves in document order, each adopting the lowest unconsumed mark
/// inside its label-to-label span.
fn assign_marks(root: &mut NodeBuilder, marks: &[MarkBox]) {
    let mut used = vec![false; marks.len()];
    assign_marks_rec(root, marks, &mut used);
}

fn assign_marks_rec(node: &mut NodeBuilder, marks: &[MarkBox], used: &mut [bool]) {
    if node.children.is_empty() {
        let mut best: Option<usize> = None;
        for (i, mark) in marks.iter().enumerate() {
            if used[i] || mark.y < node.assign_top || mark.y >= node.assign_bottom {
                continue;
            }
            if best.map_or(true, |b| marks[b].y < mark.y) {
                best = Some(i);
            }
        }
        if let Some(i) = best {
            used[i] = true;
            node.marks_value = Some(marks[i].value);
        }
        return;
    }
    for child in &mut node.children {
        assign_marks_rec(child, marks, used);
    }
}

/// Converts the builder tree into immutable [`Part`]s with final
/// rectangles.
fn seal(node: &NodeBuilder, calc: &HorizontalCalc, composite_width: i32) -> crate::error::Result<Part> {
    let children: Vec<Part> = node
        .children
        .iter()
        .map(|c| seal(c, calc, composite_width))
        .collect::<crate::error::Result<_>>()?;

    let marks = match node.marks_value {
        Some(value) => Marks::explicit(value),
        None if !children.is_empty() => Marks::aggregate(children.iter()),
        None => Marks::zero(),
    };

    let top = node.top.max(0);
    let bottom = node.bottom.max(top + 1);
    let left = match node.kind {
        PartKind::Question => calc.root_left(),
        _ => calc.label_left(node.label_box),
    };
    let right = calc.right_for(top, bottom).max(left + 1);
    let content_rect = PixelRect::new(top, bottom, left, Some(right))?;

    let context_rect = if children.is_empty() {
        None
    } else {
        match context_bottom(node) {
            Some(cb) if cb > top => Some(PixelRect::new(top, cb, left, Some(right))?),
            _ => None,
        }
    };

    let label_rect = node
        .label_box
        .map(|b| {
            PixelRect::new(
                b.top.max(0),
                b.bottom.max(b.top.max(0) + 1),
                b.left.max(0),
                Some(b.right.max(b.left.max(0) + 1)),
            )
        })
        .transpose()?;

    Part::new(
        node.label.clone(),
        node.kind,
        marks,
        content_rect,
        context_rect,
        label_rect,
        node.child_is_inline,
        children,
        node.is_valid,
        node.issues.clone(),
    )
}

/// Bottom of an internal node's header strip: the top of its first
/// descendant that does not share a line with its parent. An inline chain
/// like `"8 (a) (i)"` recurses through `(a)` to reach `(i)`.
fn context_bottom(node: &NodeBuilder) -> Option<i32> {
    let first = node.children.first()?;
    if !node.child_is_inline {
        return Some(first.top);
    }
    if first.children.is_empty() {
        Some(first.top)
    } else {
        context_bottom(first)
    }
}

fn extract_between(text_between: Option<TextBetween>, y_span: (i32, i32)) -> String {
    match text_between {
        Some(f) if y_span.0 < y_span.1 => f(y_span.0, y_span.1),
        _ => String::new(),
    }
}

fn letter_of(node: &NodeBuilder) -> Option<char> {
    node.label.split('(').nth(1)?.trim_end_matches(')').chars().next()
}

fn roman_of(node: &NodeBuilder) -> String {
    node.label
        .rsplit('(')
        .next()
        .map(|s| s.trim_end_matches(')').to_string())
        .unwrap_or_default()
}

fn roman_name(index: u32) -> Option<String> {
    const SEQUENCE: [&str; 12] =
        ["i", "ii", "iii", "iv", "v", "vi", "vii", "viii", "ix", "x", "xi", "xii"];
    SEQUENCE.get(index as usize).map(|s| s.to_string())
}
