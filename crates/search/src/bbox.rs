//! Bounding-box sanitizing for map fitting and search requests.
//!
//! STAC documents in the wild carry boxes with elevation, boxes slightly
//! past the antimeridian, and boxes with inverted corners. [`sanitize`]
//! reduces them to a 2D box clamped to the WGS-84 domain without trying to
//! repair the geometry itself.

use std::fmt;

use crate::error::{Result, SearchError};
use crate::models::StacValue;

/// A geographic bounding box `[west, south, east, north]` in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BBox {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
}

impl BBox {
    pub fn new(west: f64, south: f64, east: f64, north: f64) -> Self {
        Self {
            west,
            south,
            east,
            north,
        }
    }

    /// The box as `[west, south, east, north]`.
    pub fn to_vec(&self) -> Vec<f64> {
        vec![self.west, self.south, self.east, self.north]
    }

    /// Grow this box so it also covers `other`.
    pub fn union(&self, other: &BBox) -> BBox {
        BBox {
            west: self.west.min(other.west),
            south: self.south.min(other.south),
            east: self.east.max(other.east),
            north: self.north.max(other.north),
        }
    }
}

impl fmt::Display for BBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{},{},{}", self.west, self.south, self.east, self.north)
    }
}

/// Normalize a 4- or 6-element bbox into a clamped 2D [`BBox`].
///
/// A 6-element box is `[x0, y0, z0, x1, y1, z1]`; the elevations are
/// dropped. Only the domain bounds are enforced: `west > east` is passed
/// through untouched.
pub fn sanitize(bbox: &[f64]) -> Result<BBox> {
    let (west, south, east, north) = match *bbox {
        [w, s, e, n] => (w, s, e, n),
        [w, s, _, e, n, _] => (w, s, e, n),
        _ => return Err(SearchError::InvalidBbox { len: bbox.len() }),
    };
    Ok(BBox {
        west: west.max(-180.0),
        south: south.max(-90.0),
        east: east.min(180.0),
        north: north.min(90.0),
    })
}

/// Union of several raw bboxes, skipping any that cannot be sanitized.
pub fn union_all<'a>(boxes: impl IntoIterator<Item = &'a [f64]>) -> Option<BBox> {
    boxes
        .into_iter()
        .filter_map(|b| sanitize(b).ok())
        .reduce(|acc, b| acc.union(&b))
}

/// The box a map should fit to when `value` is loaded.
pub fn value_bbox(value: &StacValue) -> Option<BBox> {
    match value {
        StacValue::Catalog(_) => None,
        StacValue::Collection(collection) => collection
            .extent
            .as_ref()
            .and_then(|e| e.spatial.as_ref())
            .and_then(|s| s.bbox.first())
            .and_then(|b| sanitize(b).ok()),
        StacValue::Item(item) => item.bbox.as_deref().and_then(|b| sanitize(b).ok()),
        StacValue::ItemCollection(collection) => {
            union_all(collection.features.iter().filter_map(|f| f.bbox.as_deref()))
        }
    }
}
