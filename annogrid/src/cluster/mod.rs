//! Grid-based annotation clustering.
//!
//! The visible map is covered by a uniform pixel grid whose cell size is a
//! function of the discrete zoom level. Every snapshot is projected into
//! world pixel space at the viewport's zoom scale and assigned to the cell
//! containing it; each occupied cell becomes one [`AnnotationGroup`].
//!
//! The grid is anchored to the world pixel origin rather than the viewport
//! origin, so panning the viewport does not shift cell boundaries: a fixed
//! set of snapshots at a fixed zoom level always produces the same groups.

mod annotation;

pub use annotation::{
    cluster_centroid, AnnotationDiff, AnnotationGroup, AnnotationSet, GroupIdentity,
};

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::coord::project;
use crate::snapshot::SafeSnapshot;
use crate::zoom::{Viewport, ZoomLevel};

/// Placeholder substituted with the member count in cluster titles.
pub const COUNT_TOKEN: &str = "$COUNT";

/// Default cluster title template.
pub const DEFAULT_CLUSTER_TITLE_TEMPLATE: &str = "$COUNT objects in this area";

/// Grid cell edge length in pixels for a zoom level.
pub type CellSizeForZoom = Arc<dyn Fn(ZoomLevel) -> u32 + Send + Sync>;

/// The default cell-size policy: 88 px when zoomed out, stepping down to
/// 16 px at the deepest levels.
pub fn default_cell_size(zoom: ZoomLevel) -> u32 {
    match zoom {
        0..=14 => 88,
        15..=17 => 64,
        18 => 32,
        _ => 16,
    }
}

/// Errors raised while configuring clustering.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TemplateError {
    /// The cluster title template lacks the `$COUNT` placeholder.
    #[error("cluster title template `{0}` is missing the `$COUNT` placeholder")]
    MissingCountToken(String),
}

/// A validated cluster title template containing the [`COUNT_TOKEN`]
/// placeholder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClusterTitleTemplate(String);

impl ClusterTitleTemplate {
    /// Validate and wrap a template string.
    pub fn new(template: impl Into<String>) -> Result<Self, TemplateError> {
        let template = template.into();
        if !template.contains(COUNT_TOKEN) {
            return Err(TemplateError::MissingCountToken(template));
        }
        Ok(Self(template))
    }

    /// Render the template with a member count.
    pub fn render(&self, count: usize) -> String {
        self.0.replace(COUNT_TOKEN, &count.to_string())
    }

    /// The raw template string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ClusterTitleTemplate {
    fn default() -> Self {
        Self(DEFAULT_CLUSTER_TITLE_TEMPLATE.to_string())
    }
}

/// A grid cell key: the cell's row/column in the world pixel grid.
///
/// Cells are transient; keys are recomputed from scratch every fetch cycle
/// and never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GridCellKey {
    /// Cell row (y / cell size).
    pub row: i64,
    /// Cell column (x / cell size).
    pub col: i64,
}

/// Buckets snapshots into a zoom-dependent pixel grid.
pub struct ClusterGridEngine {
    cell_size: CellSizeForZoom,
    title_template: ClusterTitleTemplate,
}

impl ClusterGridEngine {
    /// Create an engine with the default cell-size policy.
    pub fn new(title_template: ClusterTitleTemplate) -> Self {
        Self {
            cell_size: Arc::new(default_cell_size),
            title_template,
        }
    }

    /// Replace the cell-size policy.
    pub fn with_cell_size(mut self, cell_size: CellSizeForZoom) -> Self {
        self.cell_size = cell_size;
        self
    }

    /// Cell edge length in pixels at `zoom`. Never below 1.
    pub fn cell_size_for(&self, zoom: ZoomLevel) -> u32 {
        (self.cell_size)(zoom).max(1)
    }

    /// Group snapshots into one cluster per occupied grid cell.
    ///
    /// Every snapshot lands in exactly one group, and each occupied cell
    /// produces a `Cluster` regardless of its member count. Groups are
    /// emitted in cell-key order, so identical inputs yield identical
    /// output, identities included.
    pub fn cluster(&self, snapshots: Vec<SafeSnapshot>, viewport: &Viewport) -> Vec<AnnotationGroup> {
        let scale = viewport.zoom_scale();
        if !scale.is_finite() || scale <= 0.0 {
            warn!(scale, "degenerate viewport scale; emitting unique annotations");
            return snapshots
                .into_iter()
                .map(AnnotationGroup::unique)
                .collect();
        }

        let zoom = viewport.zoom_level();
        let cell_px = f64::from(self.cell_size_for(zoom));
        debug!(
            zoom_level = zoom,
            cell_px,
            snapshots = snapshots.len(),
            "assigning snapshots to grid cells"
        );

        let mut cells: BTreeMap<GridCellKey, Vec<SafeSnapshot>> = BTreeMap::new();
        for snapshot in snapshots {
            let point = project(snapshot.coordinate());
            let key = GridCellKey {
                row: (point.y() / scale / cell_px).floor() as i64,
                col: (point.x() / scale / cell_px).floor() as i64,
            };
            cells.entry(key).or_default().push(snapshot);
        }

        cells
            .into_values()
            .filter_map(|members| AnnotationGroup::cluster(members, &self.title_template))
            .collect()
    }
}

impl fmt::Debug for ClusterGridEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClusterGridEngine")
            .field("title_template", &self.title_template)
            .finish_non_exhaustive()
    }
}
