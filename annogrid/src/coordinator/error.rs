//! Fetch-time error types.

use thiserror::Error;

use crate::store::StoreError;

/// Errors reported by a fetch.
///
/// Fetch-time errors are recoverable: the coordinator transitions to
/// `Failed` and keeps the previously published annotation set, so a
/// transient store outage never blanks the map.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FetchError {
    /// The store query failed.
    #[error("store query failed: {0}")]
    Store(#[from] StoreError),
}
