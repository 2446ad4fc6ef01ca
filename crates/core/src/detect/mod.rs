//! Heuristic detection on extracted PDF text: question numerals, part
//! labels and mark boxes.
//!
//! Detection runs on noisy source material, so every detector is a filter
//! pipeline: broad pattern matches first, then positional and sequence
//! constraints to shed false positives.

pub mod labels;
pub mod marks;
pub mod numerals;

pub use labels::{detect_part_labels, LabelKind, PartLabel};
pub use marks::{normalize_mark_boxes, detect_mark_boxes, MarkBox, MarkColumns};
pub use numerals::{detect_question_starts, QuestionStart};
