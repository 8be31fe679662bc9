//! Declarative filter expressions evaluated by a store.

use serde::{Deserialize, Serialize};

use crate::store::ObjectRecord;

/// A filter expression tree.
///
/// Filters are plain data: the engine builds them and hands them to the
/// store, which interprets them against its own records. [`Filter::matches`]
/// provides the reference evaluation used by the in-memory store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Filter {
    /// A numeric field lies in `[min, max]` (inclusive on both ends).
    Range {
        /// Field path the range applies to.
        path: String,
        /// Inclusive lower bound.
        min: f64,
        /// Inclusive upper bound.
        max: f64,
    },
    /// All sub-filters match.
    And(Vec<Filter>),
    /// At least one sub-filter matches.
    Or(Vec<Filter>),
}

impl Filter {
    /// A numeric range filter on `path`.
    pub fn range(path: impl Into<String>, min: f64, max: f64) -> Self {
        Filter::Range {
            path: path.into(),
            min,
            max,
        }
    }

    /// The conjunction of `filters`.
    pub fn and(filters: Vec<Filter>) -> Self {
        Filter::And(filters)
    }

    /// The disjunction of `filters`.
    pub fn or(filters: Vec<Filter>) -> Self {
        Filter::Or(filters)
    }

    /// Evaluate this filter against a record.
    ///
    /// A range over a missing or non-numeric field does not match.
    pub fn matches(&self, record: &dyn ObjectRecord) -> bool {
        match self {
            Filter::Range { path, min, max } => record
                .field(path)
                .and_then(|value| value.as_number())
                .is_some_and(|value| value >= *min && value <= *max),
            Filter::And(filters) => filters.iter().all(|f| f.matches(record)),
            Filter::Or(filters) => filters.iter().any(|f| f.matches(record)),
        }
    }
}
