//! The object store boundary.
//!
//! The engine never owns persistence: it queries an injected
//! [`ObjectStore`], reads typed field values off the returned records, and
//! immediately copies everything it needs into snapshots. The store handle
//! is an explicit constructor argument everywhere; there is no process-wide
//! default.
//!
//! [`MemoryStore`] is the reference implementation, used by the test suite
//! and as a lightweight adapter for in-process data.

mod memory;

pub use memory::{MemoryRecord, MemoryStore};

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use crate::query::Filter;
use crate::snapshot::{FieldValue, PrimaryKey};

/// Errors reported by an object store.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoreError {
    /// The store cannot be reached. Recoverable: the coordinator keeps the
    /// last published annotations.
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The entity identifier does not exist in the store.
    #[error("unknown entity `{0}`")]
    UnknownEntity(String),

    /// The store does not deliver change notifications.
    #[error("store does not support change observation")]
    ObservationUnsupported,
}

/// A record returned from a store query.
///
/// Implementations expose the record's primary key and typed field reads;
/// the engine copies values out and never holds the record past snapshot
/// capture.
pub trait ObjectRecord: Send + std::fmt::Debug {
    /// The record's primary key.
    fn primary_key(&self) -> PrimaryKey;

    /// Read the field at `path`, if present.
    fn field(&self, path: &str) -> Option<FieldValue>;
}

/// Callback invoked when observed data changes.
pub type ChangeObserver = Arc<dyn Fn() + Send + Sync>;

/// Identifies a registered change observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObserverToken(u64);

impl ObserverToken {
    /// Wrap a raw token value.
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw token value.
    pub fn raw(&self) -> u64 {
        self.0
    }
}

/// A queryable store of geotagged records.
pub trait ObjectStore: Send + Sync {
    /// Execute a query for `entity`, returning the records matching
    /// `filter` (all records when `filter` is `None`).
    fn query(
        &self,
        entity: &str,
        filter: Option<&Filter>,
    ) -> Result<Vec<Box<dyn ObjectRecord>>, StoreError>;

    /// Register `observer` to be invoked whenever `entity`'s data changes.
    ///
    /// Stores without change delivery return
    /// [`StoreError::ObservationUnsupported`].
    fn observe(&self, entity: &str, observer: ChangeObserver) -> Result<ObserverToken, StoreError>;

    /// Remove a previously registered observer. Unknown tokens are ignored.
    fn unobserve(&self, token: ObserverToken);
}

/// Unregisters a store observer when dropped.
pub struct StoreObserverGuard {
    store: Arc<dyn ObjectStore>,
    token: ObserverToken,
}

impl StoreObserverGuard {
    /// Tie `token`'s lifetime to the returned guard.
    pub fn new(store: Arc<dyn ObjectStore>, token: ObserverToken) -> Self {
        Self { store, token }
    }

    /// The guarded token.
    pub fn token(&self) -> ObserverToken {
        self.token
    }
}

impl Drop for StoreObserverGuard {
    fn drop(&mut self) {
        self.store.unobserve(self.token);
    }
}

impl fmt::Debug for StoreObserverGuard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreObserverGuard")
            .field("token", &self.token)
            .finish_non_exhaustive()
    }
}
