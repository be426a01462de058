//! `GeoJSON` and CSV writers.

use std::io::{BufWriter, Write as _};
use std::path::Path;

use geojson::{Feature, FeatureCollection, Geometry, JsonObject, JsonValue};
use midcity_contiguity::{
    COMPONENT_POPULATION_FIELD, COMPONENT_SIZE_FIELD, CityRow, POPULATION_FIELD,
};
use midcity_tract_models::{AttributeValue, TractId, TractLayer};

use crate::OutputError;

/// Converts a layer to a `GeoJSON` `FeatureCollection`. Coordinates are
/// written as they are, in the layer's coordinate reference.
#[must_use]
pub fn layer_to_geojson(layer: &TractLayer) -> FeatureCollection {
    layer
        .features
        .iter()
        .map(|feature| {
            let properties: JsonObject = feature
                .properties
                .iter()
                .map(|(k, v)| (k.clone(), attribute_to_json(v)))
                .collect();
            Feature {
                bbox: None,
                geometry: Some(Geometry::new(geojson::Value::from(&feature.geometry))),
                id: None,
                properties: Some(properties),
                foreign_members: None,
            }
        })
        .collect()
}

/// Writes `layer` to `path` as `GeoJSON`, creating parent directories.
///
/// # Errors
///
/// Returns [`OutputError`] if the file cannot be created or written.
pub fn write_layer(path: &Path, layer: &TractLayer) -> Result<(), OutputError> {
    let mut writer = BufWriter::new(create(path)?);
    serde_json::to_writer(&mut writer, &layer_to_geojson(layer))?;
    writer.flush()?;
    log::info!("Wrote {} features to {}", layer.len(), path.display());
    Ok(())
}

/// Writes the selected city list. Municipality and state columns keep the
/// names they had on the input layer.
///
/// # Errors
///
/// Returns [`OutputError`] if the file cannot be created or written.
pub fn write_city_list(
    path: &Path,
    municipality_header: &str,
    state_header: &str,
    rows: &[CityRow],
) -> Result<(), OutputError> {
    let mut writer = csv::Writer::from_writer(create(path)?);
    writer.write_record([
        municipality_header,
        state_header,
        POPULATION_FIELD,
        COMPONENT_POPULATION_FIELD,
        COMPONENT_SIZE_FIELD,
    ])?;
    for row in rows {
        writer.write_record(&[
            row.municipality.clone(),
            row.state.clone(),
            format_number(row.population),
            format_number(row.component_population),
            row.component_size.to_string(),
        ])?;
    }
    writer.flush()?;
    log::info!("Wrote {} cities to {}", rows.len(), path.display());
    Ok(())
}

/// Writes one tract id per row under `header`.
///
/// # Errors
///
/// Returns [`OutputError`] if the file cannot be created or written.
pub fn write_tract_ids(path: &Path, header: &str, ids: &[TractId]) -> Result<(), OutputError> {
    let mut writer = csv::Writer::from_writer(create(path)?);
    writer.write_record([header])?;
    for id in ids {
        writer.write_record([id.as_str()])?;
    }
    writer.flush()?;
    log::info!("Wrote {} tract ids to {}", ids.len(), path.display());
    Ok(())
}

fn create(path: &Path) -> Result<std::fs::File, OutputError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    Ok(std::fs::File::create(path)?)
}

fn attribute_to_json(value: &AttributeValue) -> JsonValue {
    match value {
        AttributeValue::Number(n) => {
            serde_json::Number::from_f64(*n).map_or(JsonValue::Null, JsonValue::Number)
        }
        AttributeValue::Text(s) => JsonValue::String(s.clone()),
        AttributeValue::Missing => JsonValue::Null,
    }
}

/// Renders integral values without a fractional part.
fn format_number(value: f64) -> String {
    if value.is_finite() && value.fract() == 0.0 {
        format!("{value:.0}")
    } else {
        value.to_string()
    }
}
