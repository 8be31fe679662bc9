//! Distance sorting of snapshots relative to a reference coordinate.

use serde::{Deserialize, Serialize};

use crate::coord::{great_circle_distance, Coordinate};
use crate::snapshot::SafeSnapshot;

/// Describes a distance sort: a reference coordinate and a direction.
///
/// Reversing the direction is a flag flip; the reference coordinate and any
/// already-computed distances are reused as-is.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SortDescriptor {
    reference: Coordinate,
    nearest_first: bool,
}

impl SortDescriptor {
    /// Create a sort descriptor.
    pub fn new(reference: Coordinate, nearest_first: bool) -> Self {
        Self {
            reference,
            nearest_first,
        }
    }

    /// Sort with the closest snapshot first.
    pub fn nearest_first(reference: Coordinate) -> Self {
        Self::new(reference, true)
    }

    /// Sort with the farthest snapshot first.
    pub fn farthest_first(reference: Coordinate) -> Self {
        Self::new(reference, false)
    }

    /// A descriptor with the opposite direction and the same reference.
    pub fn reversed(&self) -> Self {
        Self {
            reference: self.reference,
            nearest_first: !self.nearest_first,
        }
    }

    /// The coordinate distances are measured from.
    pub fn reference(&self) -> Coordinate {
        self.reference
    }

    /// Whether the closest snapshot sorts first.
    pub fn is_nearest_first(&self) -> bool {
        self.nearest_first
    }
}

/// Sort snapshots by great-circle distance from the descriptor's reference.
///
/// Populates each snapshot's `current_distance` as a side effect. The sort
/// is stable, with ties keeping input order; the farthest-first direction is
/// the exact reverse of the nearest-first one, so
/// `reverse(sort(nearest)) == sort(farthest)` holds even with ties.
pub fn sort_by_distance(snapshots: &mut [SafeSnapshot], descriptor: &SortDescriptor) {
    for snapshot in snapshots.iter_mut() {
        let distance = great_circle_distance(descriptor.reference(), snapshot.coordinate());
        snapshot.set_current_distance(distance);
    }
    snapshots.sort_by(|a, b| a.current_distance().total_cmp(&b.current_distance()));
    if !descriptor.is_nearest_first() {
        snapshots.reverse();
    }
}
