//! Topic classification boundary.
//!
//! Classification itself is an external concern plugged in through
//! [`TopicClassifier`]; this module owns only the propagation rules that
//! turn per-part classifications into a coherent tree labelling.

use indexmap::IndexMap;
use rustc_hash::FxHashMap;

use crate::model::Part;

/// Topic assigned when no classifier evidence exists.
pub const UNKNOWN_TOPIC: &str = "00. Unknown";

/// Pluggable classifier: text plus exam code in, topic out.
pub trait TopicClassifier: Send + Sync {
    fn classify(&self, text: &str, exam_code: &str) -> Option<String>;
}

/// Classifier that knows nothing; every part stays unknown.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullClassifier;

impl TopicClassifier for NullClassifier {
    fn classify(&self, _text: &str, _exam_code: &str) -> Option<String> {
        None
    }
}

fn is_unknown(topic: Option<&String>) -> bool {
    topic.map_or(true, |t| t.is_empty() || t == UNKNOWN_TOPIC)
}

/// Classifies every part's text individually.
pub fn classify_all_parts(
    root: &Part,
    part_texts: &IndexMap<String, String>,
    exam_code: &str,
    classifier: &dyn TopicClassifier,
) -> FxHashMap<String, String> {
    let mut topics = FxHashMap::default();
    for part in root.iter_all() {
        let Some(text) = part_texts.get(&part.label) else { continue };
        if let Some(topic) = classifier.classify(text, exam_code) {
            topics.insert(part.label.clone(), topic);
        }
    }
    topics
}

/// Fills unknown topics from relatives.
///
/// Two passes: first each internal node adopts its first classified
/// child's topic; then an unknown sibling flanked by two siblings agreeing
/// on the same topic adopts it. The sibling pass runs once, left to right.
pub fn propagate_topics(topics: &FxHashMap<String, String>, root: &Part) -> FxHashMap<String, String> {
    let mut out = topics.clone();
    propagate_up(root, &mut out);
    adopt_from_siblings(root, &mut out);
    out
}

fn propagate_up(part: &Part, topics: &mut FxHashMap<String, String>) -> Option<String> {
    let mut first_child_topic = None;
    for child in &part.children {
        let child_topic = propagate_up(child, topics);
        if first_child_topic.is_none() {
            first_child_topic = child_topic;
        }
    }
    if is_unknown(topics.get(&part.label)) {
        if let Some(topic) = first_child_topic {
            topics.insert(part.label.clone(), topic);
        }
    }
    topics.get(&part.label).cloned()
}

fn adopt_from_siblings(part: &Part, topics: &mut FxHashMap<String, String>) {
    let n = part.children.len();
    for i in 1..n.saturating_sub(1) {
        let middle = &part.children[i].label;
        if !is_unknown(topics.get(middle)) {
            continue;
        }
        let before = topics.get(&part.children[i - 1].label).cloned();
        let after = topics.get(&part.children[i + 1].label).cloned();
        if let (Some(before), Some(after)) = (before, after) {
            if before == after && !before.is_empty() && before != UNKNOWN_TOPIC {
                topics.insert(middle.clone(), before);
            }
        }
    }
    for child in &part.children {
        adopt_from_siblings(child, topics);
    }
}

/// Final topic for the whole question.
///
/// The root's own classification wins; otherwise the majority topic among
/// classified parts, ties resolved by first appearance in document order.
pub fn consensus_topic(topics: &FxHashMap<String, String>, root: &Part) -> String {
    if let Some(topic) = topics.get(&root.label) {
        if !is_unknown(Some(topic)) {
            return topic.clone();
        }
    }

    let mut counts: IndexMap<String, usize> = IndexMap::new();
    for part in root.iter_all() {
        if let Some(topic) = topics.get(&part.label) {
            if !is_unknown(Some(topic)) {
                *counts.entry(topic.clone()).or_insert(0) += 1;
            }
        }
    }
    counts
        .iter()
        .max_by_key(|(_, &count)| count)
        .map(|(topic, _)| topic.clone())
        .unwrap_or_else(|| UNKNOWN_TOPIC.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Marks, PartKind, PixelRect};

    fn part(label: &str, children: Vec<Part>) -> Part {
        let top = 0;
        let bottom = 1000;
        Part::new(
            label.to_string(),
            if label.contains('(') { PartKind::Letter } else { PartKind::Question },
            Marks::zero(),
            PixelRect::spanning(top, bottom).unwrap(),
            None,
            None,
            false,
            children,
            true,
            Vec::new(),
        )
        .unwrap()
    }

    fn tree_abc() -> Part {
        // Overlap checks only care about ordering, so give children
        // staggered rows.
        let a = Part {
            content_rect: PixelRect::spanning(0, 100).unwrap(),
            ..part("1(a)", vec![])
        };
        let b = Part {
            content_rect: PixelRect::spanning(100, 200).unwrap(),
            ..part("1(b)", vec![])
        };
        let c = Part {
            content_rect: PixelRect::spanning(200, 300).unwrap(),
            ..part("1(c)", vec![])
        };
        part("1", vec![a, b, c])
    }

    #[test]
    fn unknown_parent_adopts_first_child_topic() {
        let root = tree_abc();
        let mut topics = FxHashMap::default();
        topics.insert("1(a)".to_string(), "algorithms".to_string());
        let out = propagate_topics(&topics, &root);
        assert_eq!(out.get("1").map(String::as_str), Some("algorithms"));
    }

    #[test]
    fn sibling_adopts_when_flanked_by_agreement() {
        let root = tree_abc();
        let mut topics = FxHashMap::default();
        topics.insert("1(a)".to_string(), "networks".to_string());
        topics.insert("1(c)".to_string(), "networks".to_string());
        let out = propagate_topics(&topics, &root);
        assert_eq!(out.get("1(b)").map(String::as_str), Some("networks"));
    }

    #[test]
    fn disagreeing_flanks_do_not_propagate() {
        let root = tree_abc();
        let mut topics = FxHashMap::default();
        topics.insert("1(a)".to_string(), "networks".to_string());
        topics.insert("1(c)".to_string(), "databases".to_string());
        let out = propagate_topics(&topics, &root);
        assert!(out.get("1(b)").is_none());
    }

    #[test]
    fn consensus_prefers_majority() {
        let root = tree_abc();
        let mut topics = FxHashMap::default();
        topics.insert("1(a)".to_string(), "networks".to_string());
        topics.insert("1(b)".to_string(), "databases".to_string());
        topics.insert("1(c)".to_string(), "databases".to_string());
        assert_eq!(consensus_topic(&topics, &root), "databases");
    }

    #[test]
    fn no_evidence_stays_unknown() {
        let root = tree_abc();
        let topics = FxHashMap::default();
        assert_eq!(consensus_topic(&topics, &root), UNKNOWN_TOPIC);
    }
}
