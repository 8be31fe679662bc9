//! Fetch orchestration.
//!
//! [`FetchCoordinator`] drives the full pipeline for one annotation layer:
//! it turns the current [`FetchRequest`] into a store filter, queries the
//! store, captures [`SafeSnapshot`]s, sorts and truncates them, groups them
//! through the [`ClusterGridEngine`], and publishes the resulting
//! [`AnnotationSet`] for a renderer to diff.
//!
//! # State machine
//!
//! ```text
//! Idle ──performFetch──► Fetching ──success──► Ready
//!  ▲                        │
//!  │                        └──failure──► Failed (previous set retained)
//!  └──updateFetchRequest── Ready/Failed
//! ```
//!
//! # Concurrency
//!
//! The coordinator has no thread pool: fetches run synchronously on the
//! calling thread, and only the store query touches non-owned state. Every
//! fetch is stamped with a generation number, and issuing a fetch (or
//! replacing the request) supersedes all earlier in-flight fetches: their
//! pure stages may still run, but publishing happens under a single lock
//! and only for the most recently issued generation, so a superseded fetch
//! can never overwrite the results of a newer request that completed
//! first, and readers never observe a half-updated set.

mod error;

pub use error::FetchError;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, info, warn};

use crate::cluster::{
    AnnotationGroup, AnnotationSet, CellSizeForZoom, ClusterGridEngine, ClusterTitleTemplate,
    default_cell_size,
};
use crate::query::FetchRequest;
use crate::snapshot::SafeSnapshot;
use crate::sort::sort_by_distance;
use crate::store::{ObjectStore, StoreError, StoreObserverGuard};
use crate::zoom::{Viewport, ZoomLevel, MAX_ZOOM_LEVEL};

/// The coordinator's fetch lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchState {
    /// No fetch has run against the current request.
    Idle,
    /// A fetch is in flight.
    Fetching,
    /// The last fetch published its results.
    Ready,
    /// The last fetch failed; the previous results are still published.
    Failed,
}

/// How a completed fetch ended.
#[derive(Debug, Clone)]
pub enum FetchOutcome {
    /// The fetch published this annotation set.
    Published(Arc<AnnotationSet>),
    /// A newer request superseded the fetch; nothing was published.
    Superseded,
}

impl FetchOutcome {
    /// Whether the fetch published its results.
    pub fn is_published(&self) -> bool {
        matches!(self, FetchOutcome::Published(_))
    }
}

/// Caps how many records a fetch keeps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResultsLimit {
    /// Keep every fetched record.
    #[default]
    Unlimited,
    /// Keep at most this many records.
    Max(usize),
}

impl ResultsLimit {
    fn apply(self, snapshots: &mut Vec<SafeSnapshot>) {
        if let ResultsLimit::Max(limit) = self {
            snapshots.truncate(limit);
        }
    }
}

/// Clustering configuration.
///
/// Defaults match the original annotation layer: clustering enabled at every
/// zoom level, the default cell-size steps, and the default cluster title.
#[derive(Clone)]
pub struct ClusterConfig {
    enabled: bool,
    max_zoom_level: ZoomLevel,
    cell_size: CellSizeForZoom,
    title_template: ClusterTitleTemplate,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_zoom_level: MAX_ZOOM_LEVEL,
            cell_size: Arc::new(default_cell_size),
            title_template: ClusterTitleTemplate::default(),
        }
    }
}

impl ClusterConfig {
    /// Enable or disable clustering.
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Deepest zoom level at which clustering still applies; beyond it a
    /// clustering fetch emits unique annotations.
    pub fn with_max_zoom_level(mut self, max_zoom_level: ZoomLevel) -> Self {
        self.max_zoom_level = max_zoom_level;
        self
    }

    /// Replace the cell-size-by-zoom policy.
    pub fn with_cell_size(mut self, cell_size: CellSizeForZoom) -> Self {
        self.cell_size = cell_size;
        self
    }

    /// Replace the cluster title template.
    pub fn with_title_template(mut self, title_template: ClusterTitleTemplate) -> Self {
        self.title_template = title_template;
        self
    }
}

impl fmt::Debug for ClusterConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClusterConfig")
            .field("enabled", &self.enabled)
            .field("max_zoom_level", &self.max_zoom_level)
            .field("title_template", &self.title_template)
            .finish_non_exhaustive()
    }
}

/// Coordinator configuration: annotation key paths, the results limit, and
/// clustering behavior.
#[derive(Debug, Clone, Default)]
pub struct CoordinatorConfig {
    title_path: Option<String>,
    subtitle_path: Option<String>,
    results_limit: ResultsLimit,
    cluster: ClusterConfig,
}

impl CoordinatorConfig {
    /// Key path resolved into each annotation's title.
    pub fn with_title_path(mut self, path: impl Into<String>) -> Self {
        self.title_path = Some(path.into());
        self
    }

    /// Key path resolved into each annotation's subtitle.
    pub fn with_subtitle_path(mut self, path: impl Into<String>) -> Self {
        self.subtitle_path = Some(path.into());
        self
    }

    /// Cap the number of records a fetch keeps. The limit applies to the
    /// snapshot list (after sorting), not the post-cluster group count.
    pub fn with_results_limit(mut self, limit: ResultsLimit) -> Self {
        self.results_limit = limit;
        self
    }

    /// Replace the clustering configuration.
    pub fn with_cluster(mut self, cluster: ClusterConfig) -> Self {
        self.cluster = cluster;
        self
    }
}

struct Published {
    annotations: Arc<AnnotationSet>,
    snapshots: Arc<Vec<SafeSnapshot>>,
}

/// Performs location fetches against an object store and publishes
/// diffable annotation sets.
pub struct FetchCoordinator {
    store: Arc<dyn ObjectStore>,
    config: CoordinatorConfig,
    engine: ClusterGridEngine,
    request: RwLock<Arc<FetchRequest>>,
    published: RwLock<Published>,
    state: RwLock<FetchState>,
    generation: AtomicU64,
    observer: Mutex<Option<StoreObserverGuard>>,
}

impl FetchCoordinator {
    /// Create a coordinator for `request` against `store`.
    pub fn new(store: Arc<dyn ObjectStore>, request: FetchRequest, config: CoordinatorConfig) -> Self {
        let engine = ClusterGridEngine::new(config.cluster.title_template.clone())
            .with_cell_size(config.cluster.cell_size.clone());
        Self {
            store,
            config,
            engine,
            request: RwLock::new(Arc::new(request)),
            published: RwLock::new(Published {
                annotations: Arc::new(AnnotationSet::default()),
                snapshots: Arc::new(Vec::new()),
            }),
            state: RwLock::new(FetchState::Idle),
            generation: AtomicU64::new(0),
            observer: Mutex::new(None),
        }
    }

    /// Fetch without clustering: one unique annotation per record.
    pub fn perform_fetch(&self) -> Result<FetchOutcome, FetchError> {
        self.fetch(None)
    }

    /// Fetch and cluster for the given viewport.
    ///
    /// Clusters only when clustering is enabled and the viewport's zoom
    /// level does not exceed the configured maximum; otherwise the fetch
    /// emits unique annotations, like [`Self::perform_fetch`].
    pub fn perform_clustering_fetch(&self, viewport: &Viewport) -> Result<FetchOutcome, FetchError> {
        self.fetch(Some(viewport))
    }

    /// Replace the fetch request.
    ///
    /// Invalidates any fetch in flight (it will complete as superseded) and
    /// returns the coordinator to `Idle`; call a fetch method to produce
    /// results for the new request. The previously published annotations
    /// remain available until then.
    pub fn update_request(&self, request: FetchRequest) {
        *self.request.write() = Arc::new(request);
        self.generation.fetch_add(1, Ordering::SeqCst);
        *self.state.write() = FetchState::Idle;
        debug!("fetch request replaced; coordinator idle");
    }

    /// The current fetch request.
    pub fn request(&self) -> Arc<FetchRequest> {
        Arc::clone(&self.request.read())
    }

    /// The most recently published annotation set.
    pub fn annotations(&self) -> Arc<AnnotationSet> {
        Arc::clone(&self.published.read().annotations)
    }

    /// The snapshots behind the most recently published set, in pipeline
    /// order (distance order when a sort descriptor is configured).
    pub fn snapshots(&self) -> Arc<Vec<SafeSnapshot>> {
        Arc::clone(&self.published.read().snapshots)
    }

    /// The coordinator's lifecycle state.
    pub fn state(&self) -> FetchState {
        *self.state.read()
    }

    /// The coordinator configuration.
    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// Register `on_change` to run whenever the store reports a change to
    /// the current request's entity. Replaces any previous registration;
    /// the observer is removed on [`Self::stop_observing`] or drop.
    ///
    /// The callback decides whether to re-fetch — a fetch needs a current
    /// viewport, which only the caller has.
    pub fn observe_store<F>(&self, on_change: F) -> Result<(), StoreError>
    where
        F: Fn() + Send + Sync + 'static,
    {
        let request = self.request();
        let token = self.store.observe(request.entity(), Arc::new(on_change))?;
        let guard = StoreObserverGuard::new(Arc::clone(&self.store), token);
        *self.observer.lock() = Some(guard);
        Ok(())
    }

    /// Remove the store observer, if any.
    pub fn stop_observing(&self) {
        self.observer.lock().take();
    }

    fn fetch(&self, viewport: Option<&Viewport>) -> Result<FetchOutcome, FetchError> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        *self.state.write() = FetchState::Fetching;

        let request = self.request();
        let filter = request.filter();
        let records = match self.store.query(request.entity(), filter.as_ref()) {
            Ok(records) => records,
            Err(error) => {
                // Only the most recent fetch may move the state machine.
                if self.is_current(generation) {
                    *self.state.write() = FetchState::Failed;
                }
                warn!(
                    entity = request.entity(),
                    error = %error,
                    "fetch failed; retaining previously published annotations"
                );
                return Err(FetchError::Store(error));
            }
        };

        if !self.is_current(generation) {
            debug!(generation, "fetch superseded after store query");
            return Ok(FetchOutcome::Superseded);
        }

        let mut snapshots = Vec::with_capacity(records.len());
        let mut dropped = 0usize;
        for record in &records {
            match SafeSnapshot::capture(
                record.as_ref(),
                request.latitude_path(),
                request.longitude_path(),
                self.config.title_path.as_deref(),
                self.config.subtitle_path.as_deref(),
            ) {
                Ok(snapshot) => snapshots.push(snapshot),
                Err(error) => {
                    dropped += 1;
                    debug!(error = %error, "excluding record from fetch results");
                }
            }
        }
        if dropped > 0 {
            debug!(dropped, kept = snapshots.len(), "records excluded for invalid coordinates");
        }

        if let Some(descriptor) = request.sort() {
            sort_by_distance(&mut snapshots, descriptor);
        }
        self.config.results_limit.apply(&mut snapshots);

        let groups: Vec<AnnotationGroup> = match viewport {
            Some(viewport) if self.should_cluster(viewport) => {
                self.engine.cluster(snapshots.clone(), viewport)
            }
            _ => snapshots.iter().cloned().map(AnnotationGroup::unique).collect(),
        };

        let annotations = Arc::new(AnnotationSet::new(groups));
        let snapshots = Arc::new(snapshots);
        {
            let mut published = self.published.write();
            if !self.is_current(generation) {
                debug!(generation, "fetch superseded before publish");
                return Ok(FetchOutcome::Superseded);
            }
            published.annotations = Arc::clone(&annotations);
            published.snapshots = snapshots;
            *self.state.write() = FetchState::Ready;
        }

        info!(
            entity = request.entity(),
            groups = annotations.len(),
            generation,
            "published annotation set"
        );
        Ok(FetchOutcome::Published(annotations))
    }

    fn should_cluster(&self, viewport: &Viewport) -> bool {
        self.config.cluster.enabled && viewport.zoom_level() <= self.config.cluster.max_zoom_level
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }
}

impl fmt::Debug for FetchCoordinator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FetchCoordinator")
            .field("state", &self.state())
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coord::{Coordinate, Region};
    use crate::query::Filter;
    use crate::sort::SortDescriptor;
    use crate::store::{MemoryRecord, MemoryStore};

    fn seeded_store() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        for (key, lat, lon, name) in [
            (1, 37.7749, -122.4194, "Mission"),
            (2, 37.7750, -122.4195, "SoMa"),
            (3, 37.9000, -122.5000, "Marin"),
        ] {
            store.insert(
                "Place",
                MemoryRecord::new(key)
                    .with_number("lat", lat)
                    .with_number("lon", lon)
                    .with_text("name", name),
            );
        }
        store
    }

    fn bay_area_region() -> Region {
        Region::new(Coordinate::new(37.8, -122.45).unwrap(), 1.0, 1.0).unwrap()
    }

    fn request() -> FetchRequest {
        FetchRequest::builder("Place", "lat", "lon")
            .region(bay_area_region())
            .build()
            .unwrap()
    }

    fn coordinator(store: Arc<MemoryStore>) -> FetchCoordinator {
        FetchCoordinator::new(
            store,
            request(),
            CoordinatorConfig::default().with_title_path("name"),
        )
    }

    #[test]
    fn test_initial_state_is_idle() {
        let coordinator = coordinator(seeded_store());
        assert_eq!(coordinator.state(), FetchState::Idle);
        assert!(coordinator.annotations().is_empty());
    }

    #[test]
    fn test_perform_fetch_publishes_unique_groups() {
        let coordinator = coordinator(seeded_store());
        let outcome = coordinator.perform_fetch().unwrap();
        assert!(outcome.is_published());
        assert_eq!(coordinator.state(), FetchState::Ready);

        let annotations = coordinator.annotations();
        assert_eq!(annotations.len(), 3);
        assert!(annotations.groups().iter().all(|g| !g.is_cluster()));
    }

    #[test]
    fn test_region_filter_excludes_outside_records() {
        let store = seeded_store();
        store.insert(
            "Place",
            MemoryRecord::new(99)
                .with_number("lat", 51.5)
                .with_number("lon", -0.1)
                .with_text("name", "London"),
        );
        let coordinator = coordinator(store);
        coordinator.perform_fetch().unwrap();
        assert_eq!(coordinator.annotations().len(), 3);
    }

    #[test]
    fn test_records_without_coordinates_are_dropped() {
        let store = seeded_store();
        store.insert(
            "Place",
            MemoryRecord::new(50).with_text("name", "no coordinates"),
        );
        store.insert(
            "Place",
            MemoryRecord::new(51)
                .with_number("lat", 95.0)
                .with_number("lon", 0.0),
        );
        let coordinator = FetchCoordinator::new(
            store,
            FetchRequest::builder("Place", "lat", "lon").build().unwrap(),
            CoordinatorConfig::default(),
        );
        coordinator.perform_fetch().unwrap();
        // The two malformed records vanish; the fetch itself succeeds.
        assert_eq!(coordinator.annotations().len(), 3);
        assert_eq!(coordinator.state(), FetchState::Ready);
    }

    #[test]
    fn test_failed_fetch_retains_previous_annotations() {
        let store = seeded_store();
        let coordinator = coordinator(Arc::clone(&store));
        coordinator.perform_fetch().unwrap();
        let published = coordinator.annotations();

        store.set_available(false);
        let result = coordinator.perform_fetch();
        assert!(result.is_err());
        assert_eq!(coordinator.state(), FetchState::Failed);
        assert_eq!(coordinator.annotations().len(), published.len());
        assert_eq!(
            coordinator.annotations().identities(),
            published.identities()
        );
    }

    #[test]
    fn test_clustering_fetch_groups_nearby_records() {
        let coordinator = coordinator(seeded_store());
        // Zoomed far out: the whole region falls into one 88 px cell.
        let viewport = Viewport::from_region(
            &Region::new(Coordinate::new(37.8, -122.45).unwrap(), 40.0, 40.0).unwrap(),
            800.0,
        );
        coordinator.perform_clustering_fetch(&viewport).unwrap();

        let annotations = coordinator.annotations();
        assert_eq!(annotations.len(), 1);
        assert!(annotations.groups()[0].is_cluster());
        assert_eq!(annotations.groups()[0].member_count(), 3);
    }

    #[test]
    fn test_clustering_disabled_emits_uniques() {
        let coordinator = FetchCoordinator::new(
            seeded_store(),
            request(),
            CoordinatorConfig::default()
                .with_cluster(ClusterConfig::default().with_enabled(false)),
        );
        let viewport = Viewport::from_region(&bay_area_region(), 800.0);
        coordinator.perform_clustering_fetch(&viewport).unwrap();
        assert!(coordinator
            .annotations()
            .groups()
            .iter()
            .all(|g| !g.is_cluster()));
    }

    #[test]
    fn test_zoom_beyond_max_level_emits_uniques() {
        let coordinator = FetchCoordinator::new(
            seeded_store(),
            request(),
            CoordinatorConfig::default()
                .with_cluster(ClusterConfig::default().with_max_zoom_level(5)),
        );
        // A one-degree region is far deeper than zoom level 5.
        let viewport = Viewport::from_region(&bay_area_region(), 800.0);
        assert!(viewport.zoom_level() > 5);
        coordinator.perform_clustering_fetch(&viewport).unwrap();
        assert!(coordinator
            .annotations()
            .groups()
            .iter()
            .all(|g| !g.is_cluster()));
    }

    #[test]
    fn test_results_limit_truncates_after_sort() {
        let request = FetchRequest::builder("Place", "lat", "lon")
            .region(bay_area_region())
            .sort(SortDescriptor::nearest_first(
                Coordinate::new(37.7749, -122.4194).unwrap(),
            ))
            .build()
            .unwrap();
        let coordinator = FetchCoordinator::new(
            seeded_store(),
            request,
            CoordinatorConfig::default().with_results_limit(ResultsLimit::Max(2)),
        );
        coordinator.perform_fetch().unwrap();

        let snapshots = coordinator.snapshots();
        assert_eq!(snapshots.len(), 2);
        // The two nearest records survive the limit.
        assert!(snapshots.iter().all(|s| s.has_distance()));
        assert!(snapshots[0].current_distance() <= snapshots[1].current_distance());
    }

    #[test]
    fn test_base_filter_is_anded_with_region() {
        let store = seeded_store();
        for key in 1..=3 {
            let rating = f64::from(key);
            store.insert(
                "Place",
                MemoryRecord::new(100 + key)
                    .with_number("lat", 37.8)
                    .with_number("lon", -122.4)
                    .with_number("rating", rating),
            );
        }
        let request = FetchRequest::builder("Place", "lat", "lon")
            .region(bay_area_region())
            .base_filter(Filter::range("rating", 2.0, 3.0))
            .build()
            .unwrap();
        let coordinator =
            FetchCoordinator::new(store, request, CoordinatorConfig::default());
        coordinator.perform_fetch().unwrap();
        assert_eq!(coordinator.annotations().len(), 2);
    }

    #[test]
    fn test_update_request_resets_to_idle() {
        let coordinator = coordinator(seeded_store());
        coordinator.perform_fetch().unwrap();
        assert_eq!(coordinator.state(), FetchState::Ready);

        coordinator.update_request(
            FetchRequest::builder("Place", "lat", "lon").build().unwrap(),
        );
        assert_eq!(coordinator.state(), FetchState::Idle);
        // Previous annotations stay published until the next fetch.
        assert_eq!(coordinator.annotations().len(), 3);
    }

    #[test]
    fn test_snapshots_retain_no_distance_without_sort() {
        let coordinator = coordinator(seeded_store());
        coordinator.perform_fetch().unwrap();
        assert!(coordinator.snapshots().iter().all(|s| !s.has_distance()));
    }

    #[test]
    fn test_observe_store_fires_and_stops() {
        let store = seeded_store();
        let coordinator = coordinator(Arc::clone(&store));

        let fired = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&fired);
        coordinator
            .observe_store(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        store.insert("Place", MemoryRecord::new(77));
        assert_eq!(fired.load(Ordering::SeqCst), 1);

        coordinator.stop_observing();
        store.insert("Place", MemoryRecord::new(78));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_observer_released_on_drop() {
        let store = seeded_store();
        let fired = Arc::new(AtomicU64::new(0));
        {
            let coordinator = coordinator(Arc::clone(&store));
            let counter = Arc::clone(&fired);
            coordinator
                .observe_store(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                })
                .unwrap();
        }
        store.insert("Place", MemoryRecord::new(79));
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }
}
