//! Annogrid - grid-based map annotation clustering.
//!
//! This library sits between a persisted object store and an interactive
//! map surface: it fetches geotagged records inside a visible region,
//! groups them into spatial clusters appropriate to the current zoom level,
//! optionally sorts them by distance from a reference point, and produces a
//! stable, diffable set of annotation descriptors for rendering.
//!
//! # Pipeline
//!
//! ```text
//! viewport ──► region filter ──► store query ──► SafeSnapshots
//!                                                     │
//!                                   distance sort ── limit ── grid clustering
//!                                                     │
//!                                        AnnotationSet (diffable by identity)
//! ```
//!
//! Everything downstream of snapshot capture operates on owned value types,
//! so the pure stages are safe to run on any thread; only the store query
//! touches store-owned state.
//!
//! # Example
//!
//! ```
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! use std::sync::Arc;
//!
//! use annogrid::{
//!     Coordinate, CoordinatorConfig, FetchCoordinator, FetchRequest, MemoryRecord,
//!     MemoryStore, Region, Viewport,
//! };
//!
//! let store = Arc::new(MemoryStore::new());
//! store.insert(
//!     "Restaurant",
//!     MemoryRecord::new(1)
//!         .with_number("lat", 37.7749)
//!         .with_number("lon", -122.4194)
//!         .with_text("name", "Blue Bottle"),
//! );
//!
//! let region = Region::new(Coordinate::new(37.77, -122.42)?, 0.5, 0.5)?;
//! let request = FetchRequest::builder("Restaurant", "lat", "lon")
//!     .region(region)
//!     .build()?;
//! let coordinator = FetchCoordinator::new(
//!     store,
//!     request,
//!     CoordinatorConfig::default().with_title_path("name"),
//! );
//!
//! let viewport = Viewport::from_region(&region, 800.0);
//! coordinator.perform_clustering_fetch(&viewport)?;
//! for group in coordinator.annotations().groups() {
//!     println!("{:?}: {} member(s)", group.title(), group.member_count());
//! }
//! # Ok(())
//! # }
//! ```

pub mod cluster;
pub mod coord;
pub mod coordinator;
pub mod query;
pub mod snapshot;
pub mod sort;
pub mod store;
pub mod zoom;

pub use cluster::{
    cluster_centroid, default_cell_size, AnnotationDiff, AnnotationGroup, AnnotationSet,
    CellSizeForZoom, ClusterGridEngine, ClusterTitleTemplate, GridCellKey, GroupIdentity,
    TemplateError, COUNT_TOKEN, DEFAULT_CLUSTER_TITLE_TEMPLATE,
};
pub use coord::{
    great_circle_distance, normalize_longitude, project, unproject, CoordError, Coordinate,
    ProjectedRect, Region, WorldPoint, EARTH_RADIUS_M, WORLD_SIZE,
};
pub use coordinator::{
    ClusterConfig, CoordinatorConfig, FetchCoordinator, FetchError, FetchOutcome, FetchState,
    ResultsLimit,
};
pub use query::{region_filter, FetchRequest, FetchRequestBuilder, Filter, QueryError};
pub use snapshot::{CaptureError, FieldValue, PrimaryKey, SafeSnapshot, NO_DISTANCE};
pub use sort::{sort_by_distance, SortDescriptor};
pub use store::{
    ChangeObserver, MemoryRecord, MemoryStore, ObjectRecord, ObjectStore, ObserverToken,
    StoreError, StoreObserverGuard,
};
pub use zoom::{Viewport, ZoomLevel, MAX_ZOOM_LEVEL, MIN_ZOOM_LEVEL};
