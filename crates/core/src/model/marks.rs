//! Mark values and their provenance.

use serde::{Deserialize, Serialize};

use crate::error::{ExtractError, Result};

/// How a mark value was determined.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarkSource {
    /// Read directly from a `[N]` mark box.
    Explicit,
    /// Sum of leaf children, materialized on read.
    Aggregate,
    /// No evidence found; the value is always zero today.
    Inferred,
}

/// Validated mark information.
///
/// Never store a total separately; totals are always recomputed by summing
/// over leaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Marks {
    pub value: u32,
    pub source: MarkSource,
}

impl Marks {
    /// Marks read directly from a `[N]` box.
    pub fn explicit(value: u32) -> Self {
        Self { value, source: MarkSource::Explicit }
    }

    /// Marks inferred without direct evidence.
    pub fn inferred(value: u32) -> Self {
        Self { value, source: MarkSource::Inferred }
    }

    /// Zero marks for parts with no evidence at all.
    pub fn zero() -> Self {
        Self::inferred(0)
    }

    /// Aggregate marks summed over already-built children.
    pub fn aggregate<'a, I>(children: I) -> Self
    where
        I: IntoIterator<Item = &'a super::Part>,
    {
        let total = children.into_iter().map(super::Part::total_marks).sum();
        Self { value: total, source: MarkSource::Aggregate }
    }

    /// Validates a raw mark value read back from the cache.
    pub fn from_cache(value: i64) -> Result<Self> {
        u32::try_from(value)
            .map(Self::explicit)
            .map_err(|_| ExtractError::InvalidMarks(format!("marks cannot be negative: {value}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cache_rejects_negative_values() {
        assert!(Marks::from_cache(-1).is_err());
        assert_eq!(Marks::from_cache(4).unwrap().value, 4);
    }
}
