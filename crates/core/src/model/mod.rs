//! Core data model: validated value types shared by the extractor and any
//! cache consumer.
//!
//! Every entity here is immutable after construction and enforces its
//! invariants in the constructor.

mod marks;
mod paper;
mod part;
mod record;
mod rect;

pub use marks::{MarkSource, Marks};
pub use paper::PaperIdent;
pub use part::{Part, PartKind};
pub use record::{QuestionRecord, QUESTION_SCHEMA_VERSION};
pub use rect::PixelRect;
