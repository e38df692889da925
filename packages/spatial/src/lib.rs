#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Spatial containment of fine-grained units (LSOAs) in wards.
//!
//! Loads boundary polygons from `GeoJSON` feature collections, builds an
//! R-tree over the ward polygons, and assigns every fine unit to the ward
//! whose polygon contains the fine unit's centroid. The result is the
//! [`Containment`] lookup consumed by the risk aggregator.

use std::path::Path;

use geo::{BoundingRect, Centroid, Contains, MultiPolygon};
use geojson::GeoJson;
use rstar::{AABB, RTree, RTreeObject};
use thiserror::Error;
use ward_patrol_aggregate::{AggregateError, Containment};
use ward_patrol_allocation_models::UnitCode;

/// Errors that can occur while loading boundaries or building containment.
#[derive(Debug, Error)]
pub enum SpatialError {
    /// Reading a boundary file failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The boundary file is not valid `GeoJSON`.
    #[error("GeoJSON error: {0}")]
    GeoJson(#[from] geojson::Error),

    /// The boundary file is valid `GeoJSON` but not a `FeatureCollection`.
    #[error("Expected a GeoJSON FeatureCollection")]
    NotFeatureCollection,

    /// The derived pairs do not form a valid containment.
    #[error("Containment error: {0}")]
    Containment(#[from] AggregateError),
}

/// A named boundary polygon.
#[derive(Debug, Clone)]
pub struct Boundary {
    /// Code of the unit the polygon outlines.
    pub code: UnitCode,
    /// The unit's outline.
    pub polygon: MultiPolygon<f64>,
}

/// Parses a `GeoJSON` `FeatureCollection` into boundaries.
///
/// Each feature's unit code is read from `code_property` (string or
/// number). Features without that property, or whose geometry is not a
/// `Polygon`/`MultiPolygon`, are skipped with a warning.
///
/// # Errors
///
/// Returns [`SpatialError`] if the text is not a `GeoJSON` feature
/// collection.
pub fn parse_boundaries(
    geojson_str: &str,
    code_property: &str,
) -> Result<Vec<Boundary>, SpatialError> {
    let GeoJson::FeatureCollection(collection) = geojson_str.parse::<GeoJson>()? else {
        return Err(SpatialError::NotFeatureCollection);
    };

    let mut boundaries = Vec::with_capacity(collection.features.len());

    for (idx, feature) in collection.features.into_iter().enumerate() {
        let code = match feature.property(code_property) {
            Some(serde_json::Value::String(s)) if !s.trim().is_empty() => UnitCode::new(s),
            Some(serde_json::Value::Number(n)) => UnitCode::new(n.to_string()),
            _ => {
                log::warn!("Skipping feature {idx}: missing '{code_property}' property");
                continue;
            }
        };

        let Some(polygon) = feature.geometry.and_then(to_multipolygon) else {
            log::warn!("Skipping boundary {code}: unsupported or missing geometry");
            continue;
        };

        boundaries.push(Boundary { code, polygon });
    }

    Ok(boundaries)
}

/// Reads and parses a `GeoJSON` boundary file.
///
/// # Errors
///
/// Returns [`SpatialError`] if the file cannot be read or parsed.
pub fn read_boundaries_file(
    path: &Path,
    code_property: &str,
) -> Result<Vec<Boundary>, SpatialError> {
    let text = std::fs::read_to_string(path)?;
    let boundaries = parse_boundaries(&text, code_property)?;
    log::info!(
        "Loaded {} boundaries from {}",
        boundaries.len(),
        path.display()
    );
    Ok(boundaries)
}

/// A ward polygon stored in the R-tree.
struct WardEntry {
    code: UnitCode,
    envelope: AABB<[f64; 2]>,
    polygon: MultiPolygon<f64>,
}

impl RTreeObject for WardEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// R-tree index over ward polygons for point-in-polygon lookups.
pub struct WardIndex {
    wards: RTree<WardEntry>,
    codes: Vec<UnitCode>,
}

impl WardIndex {
    /// Bulk-loads ward boundaries into an R-tree.
    #[must_use]
    pub fn new(wards: Vec<Boundary>) -> Self {
        let codes = wards.iter().map(|w| w.code.clone()).collect();
        let entries = wards
            .into_iter()
            .map(|w| WardEntry {
                envelope: compute_envelope(&w.polygon),
                code: w.code,
                polygon: w.polygon,
            })
            .collect();

        Self {
            wards: RTree::bulk_load(entries),
            codes,
        }
    }

    /// Looks up the ward containing a point.
    ///
    /// Wards tile their area without overlap, so the first match wins.
    #[must_use]
    pub fn lookup(&self, x: f64, y: f64) -> Option<&UnitCode> {
        let point = geo::Point::new(x, y);
        let query_env = AABB::from_point([x, y]);

        self.wards
            .locate_in_envelope_intersecting(&query_env)
            .find(|entry| entry.polygon.contains(&point))
            .map(|entry| &entry.code)
    }

    /// Codes of every indexed ward, in load order.
    #[must_use]
    pub fn codes(&self) -> &[UnitCode] {
        &self.codes
    }
}

/// Outcome of a spatial containment build.
#[derive(Debug, Clone)]
pub struct ContainmentBuild {
    /// Fine unit -> ward lookup, with every ward registered.
    pub containment: Containment,
    /// Fine units whose centroid lies in no ward.
    pub unmatched: Vec<UnitCode>,
}

/// Assigns every fine unit to the ward containing its centroid.
///
/// # Errors
///
/// Returns [`SpatialError::Containment`] if the same fine unit code lands in
/// two different wards.
pub fn build_containment(
    fine: &[Boundary],
    wards: &WardIndex,
) -> Result<ContainmentBuild, SpatialError> {
    let mut pairs = Vec::with_capacity(fine.len());
    let mut unmatched = Vec::new();

    for unit in fine {
        let ward = unit
            .polygon
            .centroid()
            .and_then(|c| wards.lookup(c.x(), c.y()));

        match ward {
            Some(ward) => pairs.push((unit.code.clone(), ward.clone())),
            None => unmatched.push(unit.code.clone()),
        }
    }

    if !unmatched.is_empty() {
        log::warn!(
            "{} of {} units have no containing ward",
            unmatched.len(),
            fine.len()
        );
    }

    let containment =
        Containment::from_pairs(pairs)?.with_coarse_units(wards.codes().iter().cloned());

    log::info!(
        "Assigned {} units to {} wards",
        containment.len(),
        containment.coarse_units().len()
    );

    Ok(ContainmentBuild {
        containment,
        unmatched,
    })
}

/// Converts a `GeoJSON` geometry into a [`MultiPolygon`].
/// Handles both `Polygon` and `MultiPolygon` geometry types.
fn to_multipolygon(geometry: geojson::Geometry) -> Option<MultiPolygon<f64>> {
    let geo_geom: geo::Geometry<f64> = geometry.try_into().ok()?;
    match geo_geom {
        geo::Geometry::MultiPolygon(mp) => Some(mp),
        geo::Geometry::Polygon(p) => Some(MultiPolygon(vec![p])),
        _ => None,
    }
}

/// Compute the bounding box envelope for a [`MultiPolygon`].
fn compute_envelope(mp: &MultiPolygon<f64>) -> AABB<[f64; 2]> {
    mp.bounding_rect().map_or_else(
        || AABB::from_point([0.0, 0.0]),
        |rect| AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]),
    )
}
