//! Thread-safe, store-independent record snapshots.
//!
//! A [`SafeSnapshot`] copies everything the annotation pipeline needs out of
//! a live store record: the primary key, the coordinate, the fields backing
//! the title/subtitle key paths, and a transient sort distance. Once
//! captured, a snapshot holds no reference back to the store, so it can be
//! read from any thread and outlives mutation or deletion of the record it
//! was taken from. This boundary is the pipeline's thread-safety fence:
//! nothing downstream of capture touches store-owned state.

use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::coord::{Coordinate, CoordError};
use crate::store::ObjectRecord;

/// Value of [`SafeSnapshot::current_distance`] when no distance sort has run.
pub const NO_DISTANCE: f64 = -1.0;

/// A field value read off a store record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldValue {
    /// Numeric field.
    Number(f64),
    /// String field.
    Text(String),
    /// A latitude/longitude pair stored as a single field.
    Coordinate(Coordinate),
}

impl FieldValue {
    /// The numeric value, if this is a number.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            FieldValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// The string value, if this is text.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Render the value for display in an annotation title or subtitle.
    pub fn display_string(&self) -> String {
        match self {
            FieldValue::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    format!("{}", *n as i64)
                } else {
                    n.to_string()
                }
            }
            FieldValue::Text(s) => s.clone(),
            FieldValue::Coordinate(c) => format!("{}, {}", c.latitude(), c.longitude()),
        }
    }
}

/// A record's primary key, copied at snapshot time.
///
/// Ordered so cluster identities can be built from sorted member keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PrimaryKey {
    /// Integer key.
    Int(i64),
    /// String key.
    Text(String),
}

impl fmt::Display for PrimaryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PrimaryKey::Int(v) => write!(f, "{v}"),
            PrimaryKey::Text(v) => write!(f, "{v}"),
        }
    }
}

impl From<i64> for PrimaryKey {
    fn from(v: i64) -> Self {
        PrimaryKey::Int(v)
    }
}

impl From<i32> for PrimaryKey {
    fn from(v: i32) -> Self {
        PrimaryKey::Int(i64::from(v))
    }
}

impl From<&str> for PrimaryKey {
    fn from(v: &str) -> Self {
        PrimaryKey::Text(v.to_string())
    }
}

impl From<String> for PrimaryKey {
    fn from(v: String) -> Self {
        PrimaryKey::Text(v)
    }
}

/// Why a record could not be captured as a snapshot.
///
/// Capture failures are per-record: the coordinator drops the record and
/// continues with the rest of the fetch.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CaptureError {
    /// The coordinate field path did not resolve to a numeric value.
    #[error("field `{0}` does not contain a numeric coordinate value")]
    MissingCoordinate(String),

    /// The coordinate fields resolved but are out of range.
    #[error("record coordinate is out of range: {0}")]
    InvalidCoordinate(#[from] CoordError),
}

/// An immutable copy of one record's annotation-relevant fields.
///
/// Equality and hashing use only the primary key, so two snapshots of the
/// same record taken in different fetch cycles compare equal even when field
/// values changed between cycles.
#[derive(Debug, Clone, Serialize)]
pub struct SafeSnapshot {
    primary_key: PrimaryKey,
    coordinate: Coordinate,
    title: Option<String>,
    subtitle: Option<String>,
    current_distance: f64,
    values: BTreeMap<String, FieldValue>,
}

impl SafeSnapshot {
    /// Copy the annotation-relevant fields out of a store record.
    ///
    /// The latitude/longitude paths must resolve to numeric fields, or to a
    /// coordinate-pair field, from which the respective component is taken.
    pub fn capture(
        record: &dyn ObjectRecord,
        latitude_path: &str,
        longitude_path: &str,
        title_path: Option<&str>,
        subtitle_path: Option<&str>,
    ) -> Result<Self, CaptureError> {
        let latitude = coordinate_component(record, latitude_path, Coordinate::latitude)?;
        let longitude = coordinate_component(record, longitude_path, Coordinate::longitude)?;
        let coordinate = Coordinate::new(latitude, longitude)?;

        let mut values = BTreeMap::new();
        for path in [Some(latitude_path), Some(longitude_path), title_path, subtitle_path]
            .into_iter()
            .flatten()
        {
            if let Some(value) = record.field(path) {
                values.insert(path.to_string(), value);
            }
        }

        let title = title_path
            .and_then(|path| values.get(path))
            .map(FieldValue::display_string);
        let subtitle = subtitle_path
            .and_then(|path| values.get(path))
            .map(FieldValue::display_string);

        Ok(Self {
            primary_key: record.primary_key(),
            coordinate,
            title,
            subtitle,
            current_distance: NO_DISTANCE,
            values,
        })
    }

    /// The primary key copied from the source record.
    pub fn primary_key(&self) -> &PrimaryKey {
        &self.primary_key
    }

    /// The record's coordinate.
    pub fn coordinate(&self) -> Coordinate {
        self.coordinate
    }

    /// Annotation title, resolved from the configured title key path.
    pub fn title(&self) -> Option<&str> {
        self.title.as_deref()
    }

    /// Annotation subtitle, resolved from the configured subtitle key path.
    pub fn subtitle(&self) -> Option<&str> {
        self.subtitle.as_deref()
    }

    /// Distance to the sort reference coordinate in meters, or
    /// [`NO_DISTANCE`] if this snapshot never passed through a distance sort.
    pub fn current_distance(&self) -> f64 {
        self.current_distance
    }

    /// Whether a distance sort populated [`Self::current_distance`].
    pub fn has_distance(&self) -> bool {
        self.current_distance >= 0.0
    }

    /// Set the transient sort distance.
    pub fn set_current_distance(&mut self, distance: f64) {
        self.current_distance = distance;
    }

    /// Look up a copied field value by path.
    pub fn value(&self, path: &str) -> Option<&FieldValue> {
        self.values.get(path)
    }
}

impl PartialEq for SafeSnapshot {
    fn eq(&self, other: &Self) -> bool {
        self.primary_key == other.primary_key
    }
}

impl Eq for SafeSnapshot {}

impl Hash for SafeSnapshot {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.primary_key.hash(state);
    }
}

fn coordinate_component(
    record: &dyn ObjectRecord,
    path: &str,
    component: fn(&Coordinate) -> f64,
) -> Result<f64, CaptureError> {
    match record.field(path) {
        Some(FieldValue::Number(n)) => Ok(n),
        Some(FieldValue::Coordinate(c)) => Ok(component(&c)),
        _ => Err(CaptureError::MissingCoordinate(path.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryRecord;

    fn record(lat: f64, lon: f64) -> MemoryRecord {
        MemoryRecord::new(7)
            .with_number("lat", lat)
            .with_number("lon", lon)
            .with_text("name", "Blue Bottle")
            .with_text("street", "66 Mint St")
    }

    #[test]
    fn test_capture_copies_fields() {
        let snapshot = SafeSnapshot::capture(
            &record(37.7749, -122.4194),
            "lat",
            "lon",
            Some("name"),
            Some("street"),
        )
        .unwrap();

        assert_eq!(snapshot.primary_key(), &PrimaryKey::Int(7));
        assert_eq!(snapshot.title(), Some("Blue Bottle"));
        assert_eq!(snapshot.subtitle(), Some("66 Mint St"));
        assert!((snapshot.coordinate().latitude() - 37.7749).abs() < 1e-9);
        assert_eq!(
            snapshot.value("name"),
            Some(&FieldValue::Text("Blue Bottle".to_string()))
        );
    }

    #[test]
    fn test_capture_without_title_paths() {
        let snapshot =
            SafeSnapshot::capture(&record(1.0, 2.0), "lat", "lon", None, None).unwrap();
        assert_eq!(snapshot.title(), None);
        assert_eq!(snapshot.subtitle(), None);
    }

    #[test]
    fn test_capture_missing_coordinate_field() {
        let result =
            SafeSnapshot::capture(&record(1.0, 2.0), "missing", "lon", None, None);
        assert!(matches!(result, Err(CaptureError::MissingCoordinate(_))));
    }

    #[test]
    fn test_capture_non_numeric_coordinate_field() {
        let result = SafeSnapshot::capture(&record(1.0, 2.0), "name", "lon", None, None);
        assert!(matches!(result, Err(CaptureError::MissingCoordinate(_))));
    }

    #[test]
    fn test_capture_out_of_range_coordinate() {
        let result = SafeSnapshot::capture(&record(95.0, 2.0), "lat", "lon", None, None);
        assert!(matches!(result, Err(CaptureError::InvalidCoordinate(_))));
    }

    #[test]
    fn test_capture_from_coordinate_pair_field() {
        let record = MemoryRecord::new("pair").with_value(
            "location",
            FieldValue::Coordinate(Coordinate::new(12.0, 34.0).unwrap()),
        );
        let snapshot =
            SafeSnapshot::capture(&record, "location", "location", None, None).unwrap();
        assert_eq!(snapshot.coordinate().latitude(), 12.0);
        assert_eq!(snapshot.coordinate().longitude(), 34.0);
    }

    #[test]
    fn test_distance_defaults_to_sentinel() {
        let snapshot =
            SafeSnapshot::capture(&record(1.0, 2.0), "lat", "lon", None, None).unwrap();
        assert_eq!(snapshot.current_distance(), NO_DISTANCE);
        assert!(!snapshot.has_distance());
    }

    #[test]
    fn test_identity_is_primary_key() {
        let a = SafeSnapshot::capture(&record(1.0, 2.0), "lat", "lon", None, None).unwrap();
        let b = SafeSnapshot::capture(&record(3.0, 4.0), "lat", "lon", None, None).unwrap();
        // Same key, different coordinates: still the same record.
        assert_eq!(a, b);

        let other = MemoryRecord::new(8)
            .with_number("lat", 1.0)
            .with_number("lon", 2.0);
        let c = SafeSnapshot::capture(&other, "lat", "lon", None, None).unwrap();
        assert_ne!(a, c);
    }

    #[test]
    fn test_primary_key_ordering() {
        let mut keys = vec![
            PrimaryKey::Text("b".to_string()),
            PrimaryKey::Int(2),
            PrimaryKey::Text("a".to_string()),
            PrimaryKey::Int(1),
        ];
        keys.sort();
        assert_eq!(
            keys,
            vec![
                PrimaryKey::Int(1),
                PrimaryKey::Int(2),
                PrimaryKey::Text("a".to_string()),
                PrimaryKey::Text("b".to_string()),
            ]
        );
    }

    #[test]
    fn test_field_value_display() {
        assert_eq!(FieldValue::Number(42.0).display_string(), "42");
        assert_eq!(FieldValue::Number(1.5).display_string(), "1.5");
        assert_eq!(
            FieldValue::Text("hello".to_string()).display_string(),
            "hello"
        );
    }
}
