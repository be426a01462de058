//! Attribute joins between indicator tables and tract layers.

use midcity_indicators::IndicatorTable;
use midcity_tract_models::{AttributeValue, TractLayer};

use crate::OutputError;

/// Left-joins every column of `table` onto `layer` by tract id.
///
/// Ids on the layer are compared after normalization. Tracts without a
/// matching row get missing values; existing columns of the same name are
/// overwritten.
///
/// # Errors
///
/// Returns [`OutputError::Invalid`] if no feature of `layer` has
/// `id_field`.
pub fn join_indicators(
    layer: &TractLayer,
    id_field: &str,
    table: &IndicatorTable,
) -> Result<TractLayer, OutputError> {
    if !layer.is_empty() && !layer.field_names().contains(id_field) {
        return Err(OutputError::Invalid {
            message: format!("join column '{id_field}' not found on layer"),
        });
    }

    let by_id = table.by_id();
    let mut out = layer.clone();
    let mut matched = 0_usize;

    for feature in &mut out.features {
        let row = feature
            .tract_id(id_field)
            .and_then(|id| by_id.get(&id).copied());
        if row.is_some() {
            matched += 1;
        }
        for (i, column) in table.columns.iter().enumerate() {
            let value = row.and_then(|r| r.values.get(i).copied());
            feature.set(*column, AttributeValue::from(value));
        }
    }

    log::info!(
        "Joined {} onto {} tracts ({matched} matched)",
        table.columns.join(", "),
        out.len()
    );

    Ok(out)
}

/// Returns a copy of `layer` keeping only `id_field` and `columns`
/// (absent columns are written as missing).
#[must_use]
pub fn project_columns(layer: &TractLayer, id_field: &str, columns: &[&str]) -> TractLayer {
    let mut out = layer.clone();
    for feature in &mut out.features {
        let mut properties = std::collections::BTreeMap::new();
        for name in std::iter::once(id_field).chain(columns.iter().copied()) {
            let value = feature
                .get(name)
                .cloned()
                .unwrap_or(AttributeValue::Missing);
            properties.insert(name.to_owned(), value);
        }
        feature.properties = properties;
    }
    out
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use geo::MultiPolygon;
    use midcity_indicators::{IndicatorRow, P_AGUA, P_ESGO};
    use midcity_tract_models::{Crs, TractFeature, TractId};

    use super::*;

    fn layer() -> TractLayer {
        let features = ["110002000000000", "1,10002E+14", "999"]
            .iter()
            .map(|id| {
                let mut props = BTreeMap::new();
                props.insert("CD_SETOR".to_owned(), AttributeValue::from(*id));
                props.insert("NM_MUN".to_owned(), AttributeValue::from("Ariquemes"));
                TractFeature::new(MultiPolygon::new(vec![]), props)
            })
            .collect();
        TractLayer::new(Crs::Geographic, features)
    }

    fn table() -> IndicatorTable {
        IndicatorTable {
            columns: vec![P_AGUA, P_ESGO],
            rows: vec![IndicatorRow {
                id: TractId::normalize("110002000000000"),
                values: vec![80.0, 0.0],
            }],
        }
    }

    #[test]
    fn left_join_matches_normalized_ids() {
        let joined = join_indicators(&layer(), "CD_SETOR", &table()).unwrap();

        assert_eq!(joined.features[0].number(P_AGUA), Some(80.0));
        assert_eq!(joined.features[1].number(P_AGUA), Some(80.0));
        assert_eq!(joined.features[1].number(P_ESGO), Some(0.0));
        assert_eq!(joined.features[2].get(P_AGUA), Some(&AttributeValue::Missing));
        assert_eq!(joined.features[2].text("NM_MUN").as_deref(), Some("Ariquemes"));
    }

    #[test]
    fn missing_join_column_is_an_error() {
        assert!(matches!(
            join_indicators(&layer(), "CD_SETOR_2010", &table()),
            Err(OutputError::Invalid { .. })
        ));
    }

    #[test]
    fn projects_selected_columns() {
        let joined = join_indicators(&layer(), "CD_SETOR", &table()).unwrap();
        let projected = project_columns(&joined, "CD_SETOR", &[P_AGUA, "P_Lixo"]);

        let keys: Vec<&str> = projected.features[0]
            .properties
            .keys()
            .map(String::as_str)
            .collect();
        assert_eq!(keys, vec!["CD_SETOR", "P_Agua", "P_Lixo"]);
        assert_eq!(projected.features[0].get("P_Lixo"), Some(&AttributeValue::Missing));
    }
}
