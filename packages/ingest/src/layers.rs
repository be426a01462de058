//! Tract polygon layers from `GeoJSON`.

use std::collections::BTreeMap;
use std::path::Path;

use geo::MultiPolygon;
use geojson::GeoJson;
use midcity_tract_models::{AttributeValue, Crs, TractFeature, TractLayer};

use crate::IngestError;

/// Parses a `GeoJSON` `FeatureCollection` (or single `Feature`) into a
/// layer in the given coordinate reference.
///
/// Features without polygonal geometry are skipped.
///
/// # Errors
///
/// Returns [`IngestError`] if the text is not valid `GeoJSON` or is a bare
/// geometry.
pub fn parse_layer(geojson_str: &str, crs: Crs) -> Result<TractLayer, IngestError> {
    let features = match geojson_str.parse::<GeoJson>()? {
        GeoJson::FeatureCollection(fc) => fc.features,
        GeoJson::Feature(feature) => vec![feature],
        GeoJson::Geometry(_) => {
            return Err(IngestError::Format {
                message: "expected a FeatureCollection, found a bare geometry".to_owned(),
            });
        }
    };

    let total = features.len();
    let mut out = Vec::with_capacity(total);
    for (i, feature) in features.into_iter().enumerate() {
        let Some(geometry) = feature.geometry.and_then(to_multipolygon) else {
            log::warn!("Skipping feature {i}: missing or non-polygonal geometry");
            continue;
        };

        let properties: BTreeMap<String, AttributeValue> = feature
            .properties
            .unwrap_or_default()
            .into_iter()
            .map(|(k, v)| (k, json_to_attribute(v)))
            .collect();

        out.push(TractFeature::new(geometry, properties));
    }

    if out.len() < total {
        log::warn!("Kept {} of {total} features", out.len());
    }

    Ok(TractLayer::new(crs, out))
}

/// Reads a layer from a `GeoJSON` file.
///
/// # Errors
///
/// Returns [`IngestError`] if the file cannot be read or parsed.
pub fn read_layer(path: &Path, crs: Crs) -> Result<TractLayer, IngestError> {
    log::info!("Reading layer {}", path.display());
    let content = std::fs::read_to_string(path)?;
    let layer = parse_layer(&content, crs)?;
    log::info!("{}: {} features", path.display(), layer.len());
    Ok(layer)
}

/// Resolves the tract id column and rewrites every id through
/// [`midcity_tract_models::TractId::normalize`], storing it as text.
///
/// Returns the resolved column name.
///
/// # Errors
///
/// Returns [`IngestError::MissingField`] if no candidate column exists.
pub fn normalize_layer_ids<S: AsRef<str>>(
    layer: &mut TractLayer,
    candidates: &[S],
) -> Result<String, IngestError> {
    let field = layer.require_field(candidates)?;
    for feature in &mut layer.features {
        if let Some(id) = feature.tract_id(&field) {
            feature.set(field.clone(), id.into_string());
        }
    }
    Ok(field)
}

fn to_multipolygon(geometry: geojson::Geometry) -> Option<MultiPolygon<f64>> {
    let geometry: geo::Geometry<f64> = geometry.try_into().ok()?;
    match geometry {
        geo::Geometry::MultiPolygon(mp) => Some(mp),
        geo::Geometry::Polygon(p) => Some(MultiPolygon::new(vec![p])),
        _ => None,
    }
}

fn json_to_attribute(value: serde_json::Value) -> AttributeValue {
    match value {
        serde_json::Value::Null => AttributeValue::Missing,
        serde_json::Value::Number(n) => n.as_f64().map_or(AttributeValue::Missing, AttributeValue::Number),
        serde_json::Value::String(s) => AttributeValue::Text(s),
        other => AttributeValue::Text(other.to_string()),
    }
}
