//! Coordinate reprojection backed by `proj4rs`.
//!
//! Layers carry their CRS as a PROJ.4 definition; a [`Reprojector`] pairs
//! two of them. Geographic coordinates are degrees on the way in and out,
//! converted to the radians `proj4rs` works in.

use geo::{Coord, MapCoords, MultiPolygon};
use midcity_tract_models::{AlbersParams, Crs, TractLayer};
use proj4rs::proj::Proj;
use proj4rs::transform::transform;

use crate::ProjectionError;

/// Transforms coordinates from one CRS to another.
pub struct Reprojector {
    source: Proj,
    target: Proj,
    source_crs: Crs,
    target_crs: Crs,
}

impl std::fmt::Debug for Reprojector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reprojector")
            .field("source_crs", &self.source_crs)
            .field("target_crs", &self.target_crs)
            .finish_non_exhaustive()
    }
}

impl Reprojector {
    /// Builds a transformer from `source` to `target`.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError::InvalidDefinition`] if either definition
    /// is rejected by `proj4rs`.
    pub fn new(source: &Crs, target: &Crs) -> Result<Self, ProjectionError> {
        Ok(Self {
            source: parse(source)?,
            target: parse(target)?,
            source_crs: source.clone(),
            target_crs: target.clone(),
        })
    }

    /// Transforms a single coordinate pair.
    ///
    /// # Errors
    ///
    /// Returns [`ProjectionError::Transform`] if the point falls outside
    /// the domain of either projection.
    pub fn transform(&self, x: f64, y: f64) -> Result<(f64, f64), ProjectionError> {
        let mut point = if self.source_crs.is_geographic() {
            (x.to_radians(), y.to_radians(), 0.0)
        } else {
            (x, y, 0.0)
        };

        transform(&self.source, &self.target, &mut point).map_err(|e| {
            ProjectionError::Transform {
                x,
                y,
                message: format!("{e:?}"),
            }
        })?;

        if self.target_crs.is_geographic() {
            Ok((point.0.to_degrees(), point.1.to_degrees()))
        } else {
            Ok((point.0, point.1))
        }
    }

    /// Transforms every vertex of `geometry`.
    ///
    /// # Errors
    ///
    /// Returns the first [`ProjectionError`] hit.
    pub fn reproject(
        &self,
        geometry: &MultiPolygon<f64>,
    ) -> Result<MultiPolygon<f64>, ProjectionError> {
        geometry.try_map_coords(|c| self.transform(c.x, c.y).map(|(x, y)| Coord { x, y }))
    }
}

fn parse(crs: &Crs) -> Result<Proj, ProjectionError> {
    Proj::from_proj_string(crs.definition()).map_err(|e| ProjectionError::InvalidDefinition {
        definition: crs.definition().to_owned(),
        message: format!("{e:?}"),
    })
}

/// Returns a copy of `layer` expressed in `target`. Layers already in
/// `target` are cloned unchanged.
///
/// # Errors
///
/// Returns [`ProjectionError`] if a definition is invalid or a vertex
/// cannot be transformed.
pub fn reproject_layer(layer: &TractLayer, target: &Crs) -> Result<TractLayer, ProjectionError> {
    let mut out = layer.clone();
    if layer.crs == *target || layer.crs.definition() == target.definition() {
        return Ok(out);
    }

    let reprojector = Reprojector::new(&layer.crs, target)?;
    for feature in &mut out.features {
        feature.geometry = reprojector.reproject(&feature.geometry)?;
    }
    out.crs = target.clone();

    log::debug!(
        "Reprojected {} features from '{}' to '{}'",
        out.len(),
        layer.crs,
        target
    );
    Ok(out)
}

/// Returns a copy of `layer` in the Albers equal-area projection described
/// by `params`, so planar areas are true areas.
///
/// # Errors
///
/// Returns [`ProjectionError`] if the layer cannot be reprojected.
pub fn to_equal_area(layer: &TractLayer, params: &AlbersParams) -> Result<TractLayer, ProjectionError> {
    reproject_layer(layer, &Crs::albers(params))
}
