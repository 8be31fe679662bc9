//! Annotation groups and the published annotation set.
//!
//! Groups are immutable values. A renderer never mutates a group in place;
//! it diffs successive published sets by [`GroupIdentity`] and adds/removes
//! annotations accordingly, which is what keeps an unchanged grid cell from
//! flickering between fetch cycles.

use std::collections::BTreeSet;
use std::slice;

use serde::Serialize;

use crate::coord::{normalize_longitude, Coordinate};
use crate::snapshot::{PrimaryKey, SafeSnapshot};

use super::ClusterTitleTemplate;

/// The stable identity of an annotation group: the sorted primary keys of
/// its members.
///
/// A grid cell whose membership did not change between fetch cycles yields
/// an identical identity, regardless of member order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct GroupIdentity(Vec<PrimaryKey>);

impl GroupIdentity {
    fn from_members(members: &[SafeSnapshot]) -> Self {
        let mut keys: Vec<PrimaryKey> =
            members.iter().map(|s| s.primary_key().clone()).collect();
        keys.sort();
        Self(keys)
    }

    /// The sorted member primary keys.
    pub fn keys(&self) -> &[PrimaryKey] {
        &self.0
    }
}

/// One renderable map annotation: a single record or a cluster of records.
#[derive(Debug, Clone, Serialize)]
pub enum AnnotationGroup {
    /// A single record, rendered with its own title and subtitle.
    Unique(SafeSnapshot),
    /// Several records rendered as one aggregate annotation.
    Cluster {
        /// Member snapshots, in pipeline order.
        members: Vec<SafeSnapshot>,
        /// Unweighted mean of the member coordinates.
        centroid: Coordinate,
        /// Rendered cluster title (member count substituted).
        title: String,
    },
}

impl AnnotationGroup {
    /// Wrap a single snapshot.
    pub fn unique(snapshot: SafeSnapshot) -> Self {
        AnnotationGroup::Unique(snapshot)
    }

    /// Build a cluster group from its members. Returns `None` for an empty
    /// member list; a cluster always holds at least one snapshot.
    pub fn cluster(members: Vec<SafeSnapshot>, template: &ClusterTitleTemplate) -> Option<Self> {
        let centroid = cluster_centroid(&members)?;
        let title = template.render(members.len());
        Some(AnnotationGroup::Cluster {
            members,
            centroid,
            title,
        })
    }

    /// The group's identity for renderer diffing.
    pub fn identity(&self) -> GroupIdentity {
        GroupIdentity::from_members(self.members())
    }

    /// Where the annotation is placed: the snapshot's coordinate for a
    /// unique group, the centroid for a cluster.
    pub fn coordinate(&self) -> Coordinate {
        match self {
            AnnotationGroup::Unique(snapshot) => snapshot.coordinate(),
            AnnotationGroup::Cluster { centroid, .. } => *centroid,
        }
    }

    /// The annotation title.
    pub fn title(&self) -> Option<&str> {
        match self {
            AnnotationGroup::Unique(snapshot) => snapshot.title(),
            AnnotationGroup::Cluster { title, .. } => Some(title),
        }
    }

    /// The annotation subtitle. Clusters have none.
    pub fn subtitle(&self) -> Option<&str> {
        match self {
            AnnotationGroup::Unique(snapshot) => snapshot.subtitle(),
            AnnotationGroup::Cluster { .. } => None,
        }
    }

    /// The member snapshots.
    pub fn members(&self) -> &[SafeSnapshot] {
        match self {
            AnnotationGroup::Unique(snapshot) => slice::from_ref(snapshot),
            AnnotationGroup::Cluster { members, .. } => members,
        }
    }

    /// Number of member snapshots.
    pub fn member_count(&self) -> usize {
        self.members().len()
    }

    /// Whether this group is a cluster.
    pub fn is_cluster(&self) -> bool {
        matches!(self, AnnotationGroup::Cluster { .. })
    }
}

/// Unweighted mean of the member coordinates.
///
/// If member longitudes span more than 180°, negative longitudes are shifted
/// by +360° before averaging and the mean is wrapped back into [-180, 180),
/// so clusters straddling the antimeridian center near their members rather
/// than on the far side of the globe.
pub fn cluster_centroid(members: &[SafeSnapshot]) -> Option<Coordinate> {
    if members.is_empty() {
        return None;
    }
    let count = members.len() as f64;
    let mean_lat = members
        .iter()
        .map(|s| s.coordinate().latitude())
        .sum::<f64>()
        / count;

    let longitudes: Vec<f64> = members.iter().map(|s| s.coordinate().longitude()).collect();
    let min = longitudes.iter().copied().fold(f64::INFINITY, f64::min);
    let max = longitudes.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let mean_lon = if max - min > 180.0 {
        longitudes
            .iter()
            .map(|&lon| if lon < 0.0 { lon + 360.0 } else { lon })
            .sum::<f64>()
            / count
    } else {
        longitudes.iter().sum::<f64>() / count
    };

    Some(Coordinate::clamped(mean_lat, normalize_longitude(mean_lon)))
}

/// The set of annotation groups published by one fetch cycle.
#[derive(Debug, Clone, Default, Serialize)]
pub struct AnnotationSet {
    groups: Vec<AnnotationGroup>,
}

impl AnnotationSet {
    /// Wrap a list of groups.
    pub fn new(groups: Vec<AnnotationGroup>) -> Self {
        Self { groups }
    }

    /// The contained groups.
    pub fn groups(&self) -> &[AnnotationGroup] {
        &self.groups
    }

    /// Number of groups.
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    /// Whether the set has no groups.
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// The identities of all groups.
    pub fn identities(&self) -> BTreeSet<GroupIdentity> {
        self.groups.iter().map(AnnotationGroup::identity).collect()
    }

    /// Whether a group with `identity` is present.
    pub fn contains(&self, identity: &GroupIdentity) -> bool {
        self.groups.iter().any(|g| &g.identity() == identity)
    }

    /// Groups to add and remove when replacing `previous` with this set.
    ///
    /// Groups present in both sets (by identity) appear in neither list, so
    /// a renderer applying the diff leaves unchanged annotations untouched.
    pub fn diff_from(&self, previous: &AnnotationSet) -> AnnotationDiff {
        let previous_ids = previous.identities();
        let current_ids = self.identities();

        AnnotationDiff {
            added: self
                .groups
                .iter()
                .filter(|g| !previous_ids.contains(&g.identity()))
                .cloned()
                .collect(),
            removed: previous
                .groups
                .iter()
                .filter(|g| !current_ids.contains(&g.identity()))
                .cloned()
                .collect(),
        }
    }
}

/// The add/remove lists produced by [`AnnotationSet::diff_from`].
#[derive(Debug, Clone, Default)]
pub struct AnnotationDiff {
    /// Groups present in the new set only.
    pub added: Vec<AnnotationGroup>,
    /// Groups present in the previous set only.
    pub removed: Vec<AnnotationGroup>,
}
