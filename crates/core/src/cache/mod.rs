//! Cache persistence: atomic artifact writes, process-safe shared files,
//! background image encoding, and schema-checked readback.

pub mod lock;
pub mod reader;
pub mod write_queue;
pub mod writer;

pub use reader::{read_questions_jsonl, read_regions, RegionsDoc};
pub use write_queue::WriteQueue;
pub use writer::{append_question_records, write_question, QuestionArtifacts, REGIONS_SCHEMA_VERSION};
