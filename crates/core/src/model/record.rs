//! The per-question metadata line appended to `questions.jsonl`.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Schema version of [`QuestionRecord`].
pub const QUESTION_SCHEMA_VERSION: u32 = 9;

/// One line of `questions.jsonl`.
///
/// Records are self-describing because parallel extractions append to the
/// shared file in no particular order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuestionRecord {
    pub schema_version: u32,
    pub question_id: String,
    pub exam_code: String,
    pub year: u16,
    pub paper: u8,
    pub variant: u8,
    pub question_number: u32,
    pub total_marks: u32,
    pub part_count: usize,
    pub topic: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sub_topics: Vec<String>,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub child_topics: IndexMap<String, String>,
    /// `exam_code/topic/question_id`, relative to the cache root.
    pub relative_path: String,
    #[serde(default)]
    pub root_text: String,
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub child_text: IndexMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub markscheme_path: Option<String>,
    pub is_valid: bool,
}
