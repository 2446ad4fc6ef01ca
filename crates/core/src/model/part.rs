//! The immutable part tree.

use serde::{Deserialize, Serialize};

use crate::error::{ExtractError, Result};

use super::{Marks, PixelRect};

/// Structural level of a part. A closed set of three depths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PartKind {
    /// Depth 0, the root; labelled by the question numeral ("1").
    Question,
    /// Depth 1, a lettered sub-part ("1(a)").
    Letter,
    /// Depth 2, a roman sub-sub-part ("1(a)(ii)").
    Roman,
}

impl PartKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PartKind::Question => "question",
            PartKind::Letter => "letter",
            PartKind::Roman => "roman",
        }
    }
}

/// One node of the question structure tree.
///
/// Parts are assembled bottom-up by the tree builder and never mutated
/// afterwards. Children own their subtrees; there are no back references.
#[derive(Debug, Clone, PartialEq)]
pub struct Part {
    /// Canonical label: `"1"`, `"1(a)"`, `"1(a)(ii)"`.
    pub label: String,
    pub kind: PartKind,
    /// Explicit for leaves; aggregate for internal nodes.
    pub marks: Marks,
    /// Full span occupied by this part and its descendants.
    pub content_rect: PixelRect,
    /// Header strip of an internal node: from its top to the top of its
    /// first non-inline descendant. Absent for leaves.
    pub context_rect: Option<PixelRect>,
    /// Tight pixel box of the label glyphs themselves.
    pub label_rect: Option<PixelRect>,
    /// Label shares a line with its first child (e.g. `"8 (a)"`).
    pub child_is_inline: bool,
    /// Ordered by `content_rect.top`, pairwise non-overlapping.
    pub children: Vec<Part>,
    pub is_valid: bool,
    pub validation_issues: Vec<String>,
}

impl Part {
    /// Validates child ordering and overlap, then seals the node.
    pub fn new(
        label: String,
        kind: PartKind,
        marks: Marks,
        content_rect: PixelRect,
        context_rect: Option<PixelRect>,
        label_rect: Option<PixelRect>,
        child_is_inline: bool,
        children: Vec<Part>,
        is_valid: bool,
        validation_issues: Vec<String>,
    ) -> Result<Self> {
        for pair in children.windows(2) {
            let (a, b) = (&pair[0], &pair[1]);
            if b.content_rect.top < a.content_rect.top {
                return Err(ExtractError::InvalidRect(format!(
                    "children of {label} out of order: {} before {}",
                    a.label, b.label
                )));
            }
            if a.content_rect.overlaps_vertically(&b.content_rect) {
                return Err(ExtractError::InvalidRect(format!(
                    "children of {label} overlap: {} and {}",
                    a.label, b.label
                )));
            }
        }
        Ok(Self {
            label,
            kind,
            marks,
            content_rect,
            context_rect,
            label_rect,
            child_is_inline,
            children,
            is_valid,
            validation_issues,
        })
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Total marks, always recomputed by summing over leaves.
    pub fn total_marks(&self) -> u32 {
        if self.is_leaf() {
            self.marks.value
        } else {
            self.children.iter().map(Part::total_marks).sum()
        }
    }

    pub fn leaf_count(&self) -> usize {
        if self.is_leaf() {
            1
        } else {
            self.children.iter().map(Part::leaf_count).sum()
        }
    }

    /// Depth-first iterator over every node, root first.
    pub fn iter_all(&self) -> impl Iterator<Item = &Part> {
        let mut out = Vec::new();
        self.collect_all(&mut out);
        out.into_iter()
    }

    fn collect_all<'a>(&'a self, out: &mut Vec<&'a Part>) {
        out.push(self);
        for child in &self.children {
            child.collect_all(out);
        }
    }

    /// Iterator over leaf nodes in document order.
    pub fn iter_leaves(&self) -> impl Iterator<Item = &Part> {
        self.iter_all().filter(|p| p.is_leaf())
    }
}
