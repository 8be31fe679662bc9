//! Region queries: filter generation and fetch requests.
//!
//! [`region_filter`] converts a search [`Region`] into a [`Filter`] over the
//! record's latitude/longitude field paths, splitting regions that extend
//! past the antimeridian into two longitude ranges. [`FetchRequest`] bundles
//! the filter inputs with the entity to query and an optional caller filter
//! and sort; it is immutable once built, so changing the search region means
//! building a new request.

mod filter;

pub use filter::Filter;

use thiserror::Error;

use crate::coord::{normalize_longitude, Region};
use crate::sort::SortDescriptor;

/// Errors raised while constructing a fetch request.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum QueryError {
    /// Empty entity identifier.
    #[error("entity identifier must not be empty")]
    EmptyEntity,

    /// A field path is empty, has an empty segment, or contains whitespace.
    #[error("invalid field path: `{0}`")]
    InvalidFieldPath(String),
}

/// Build the filter selecting records inside `region`.
///
/// For a region contained in [-180, 180) this is a latitude range ANDed with
/// a single longitude range. For a region extending past the antimeridian
/// the longitude test becomes the OR of `[west, 180]` and `[-180, east]`
/// with the overflowing bound wrapped back into range. A longitude span of
/// 360° or more degenerates to the full longitude range.
///
/// Pure and infallible: field paths are validated when the [`FetchRequest`]
/// is built, not here.
pub fn region_filter(region: &Region, latitude_path: &str, longitude_path: &str) -> Filter {
    let latitude = Filter::range(latitude_path, region.south(), region.north());

    let west = region.west();
    let east = region.east();
    let longitude = if region.longitude_span() >= 360.0 {
        Filter::range(longitude_path, -180.0, 180.0)
    } else if west < -180.0 || east > 180.0 {
        let lower = if west < -180.0 {
            normalize_longitude(west)
        } else {
            west
        };
        let upper = if east > 180.0 {
            normalize_longitude(east)
        } else {
            east
        };
        Filter::or(vec![
            Filter::range(longitude_path, lower, 180.0),
            Filter::range(longitude_path, -180.0, upper),
        ])
    } else {
        Filter::range(longitude_path, west, east)
    };

    Filter::and(vec![latitude, longitude])
}

/// An immutable description of one location fetch.
///
/// Carries the entity to query, the latitude/longitude field paths, an
/// optional search region, an optional caller-supplied base filter (ANDed
/// with the generated region filter), and an optional distance sort.
#[derive(Debug, Clone)]
pub struct FetchRequest {
    entity: String,
    latitude_path: String,
    longitude_path: String,
    region: Option<Region>,
    base_filter: Option<Filter>,
    sort: Option<SortDescriptor>,
}

impl FetchRequest {
    /// Start building a request for `entity`, reading coordinates from the
    /// given field paths.
    pub fn builder(
        entity: impl Into<String>,
        latitude_path: impl Into<String>,
        longitude_path: impl Into<String>,
    ) -> FetchRequestBuilder {
        FetchRequestBuilder {
            entity: entity.into(),
            latitude_path: latitude_path.into(),
            longitude_path: longitude_path.into(),
            region: None,
            base_filter: None,
            sort: None,
        }
    }

    /// The entity identifier to query.
    pub fn entity(&self) -> &str {
        &self.entity
    }

    /// Field path of the latitude value.
    pub fn latitude_path(&self) -> &str {
        &self.latitude_path
    }

    /// Field path of the longitude value.
    pub fn longitude_path(&self) -> &str {
        &self.longitude_path
    }

    /// The search region, if any.
    pub fn region(&self) -> Option<&Region> {
        self.region.as_ref()
    }

    /// The caller-supplied base filter, if any.
    pub fn base_filter(&self) -> Option<&Filter> {
        self.base_filter.as_ref()
    }

    /// The distance sort, if any.
    pub fn sort(&self) -> Option<&SortDescriptor> {
        self.sort.as_ref()
    }

    /// The complete store filter: the generated region filter ANDed with the
    /// base filter. `None` when the request has neither.
    pub fn filter(&self) -> Option<Filter> {
        let region = self
            .region
            .as_ref()
            .map(|r| region_filter(r, &self.latitude_path, &self.longitude_path));
        match (region, &self.base_filter) {
            (Some(region), Some(base)) => Some(Filter::and(vec![region, base.clone()])),
            (Some(region), None) => Some(region),
            (None, Some(base)) => Some(base.clone()),
            (None, None) => None,
        }
    }
}

/// Builder for [`FetchRequest`]. Field paths are validated on `build`.
#[derive(Debug, Clone)]
pub struct FetchRequestBuilder {
    entity: String,
    latitude_path: String,
    longitude_path: String,
    region: Option<Region>,
    base_filter: Option<Filter>,
    sort: Option<SortDescriptor>,
}

impl FetchRequestBuilder {
    /// Restrict the fetch to `region`.
    pub fn region(mut self, region: Region) -> Self {
        self.region = Some(region);
        self
    }

    /// AND `filter` with the generated region filter.
    pub fn base_filter(mut self, filter: Filter) -> Self {
        self.base_filter = Some(filter);
        self
    }

    /// Sort results by distance as described.
    pub fn sort(mut self, sort: SortDescriptor) -> Self {
        self.sort = Some(sort);
        self
    }

    /// Validate and build the request.
    pub fn build(self) -> Result<FetchRequest, QueryError> {
        if self.entity.trim().is_empty() {
            return Err(QueryError::EmptyEntity);
        }
        validate_field_path(&self.latitude_path)?;
        validate_field_path(&self.longitude_path)?;
        Ok(FetchRequest {
            entity: self.entity,
            latitude_path: self.latitude_path,
            longitude_path: self.longitude_path,
            region: self.region,
            base_filter: self.base_filter,
            sort: self.sort,
        })
    }
}

fn validate_field_path(path: &str) -> Result<(), QueryError> {
    let malformed = path.is_empty()
        || path.chars().any(char::is_whitespace)
        || path.split('.').any(str::is_empty);
    if malformed {
        return Err(QueryError::InvalidFieldPath(path.to_string()));
    }
    Ok(())
}
