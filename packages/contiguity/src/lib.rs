#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Mid-sized city selection by urban contiguity.
//!
//! Urban tracts are dissolved into one footprint per municipality, the
//! footprints are linked into contiguous components, and a municipality
//! is selected when it is large enough on its own while the conurbation
//! it belongs to stays inside the configured population band. The
//! selected municipalities are then mapped back to their tracts.

pub mod adjacency;
pub mod components;
pub mod dissolve;
pub mod urban;

use std::collections::{BTreeMap, BTreeSet};

use geo::{MultiPolygon, unary_union};
use midcity_config::{FieldCandidates, PipelineConfig, SelectionConfig};
use midcity_spatial::{repair, repair_layer};
use midcity_tract_models::{AttributeValue, MissingField, TractFeature, TractId, TractLayer};
use thiserror::Error;

pub use adjacency::{AdjacencyGraph, are_adjacent};
pub use components::Components;
pub use dissolve::{DissolveColumns, Footprint, FootprintKey, POPULATION_FIELD, dissolve};
pub use urban::UrbanFilter;

/// Column holding the component label on footprint layers.
pub const COMPONENT_FIELD: &str = "component";
/// Column holding the component population.
pub const COMPONENT_POPULATION_FIELD: &str = "comp_pop";
/// Column holding the component member count.
pub const COMPONENT_SIZE_FIELD: &str = "comp_n";

/// Errors that can occur during city selection.
#[derive(Debug, Error)]
pub enum ContiguityError {
    /// A required column is missing from the tract layer.
    #[error("{field} column: {source}")]
    MissingField {
        /// Logical field name.
        field: &'static str,
        /// The candidates that were tried.
        source: MissingField,
    },

    /// The layer has neither a situation code nor a situation text column.
    #[error("No urban/rural situation column found, tried: {}", tried.join(", "))]
    NoSituationColumn {
        /// Every candidate that was tried.
        tried: Vec<String>,
    },

    /// A selected municipality is below the minimum city population.
    #[error(
        "Selected city {municipality}/{state} has population {population}, \
         below the minimum of {minimum}"
    )]
    PostConditionViolated {
        /// Municipality name.
        municipality: String,
        /// State.
        state: String,
        /// Its urban population.
        population: f64,
        /// The configured minimum.
        minimum: f64,
    },
}

/// A footprint with its component membership.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassifiedFootprint {
    /// The dissolved municipality.
    pub footprint: Footprint,
    /// Component label.
    pub component: usize,
    /// Total population of the component.
    pub component_population: f64,
    /// Number of footprints in the component.
    pub component_size: usize,
}

impl ClassifiedFootprint {
    /// Renders the footprint with its component columns.
    #[must_use]
    pub fn to_feature(&self, columns: &DissolveColumns) -> TractFeature {
        let mut feature = self.footprint.to_feature(columns);
        #[allow(clippy::cast_precision_loss)]
        {
            feature.set(COMPONENT_FIELD, self.component as f64);
            feature.set(COMPONENT_SIZE_FIELD, self.component_size as f64);
        }
        feature.set(COMPONENT_POPULATION_FIELD, self.component_population);
        feature
    }
}

/// The union of the selected footprints of one component.
#[derive(Debug, Clone, PartialEq)]
pub struct ComponentFootprint {
    /// Component label.
    pub component: usize,
    /// Dissolved geometry of the selected members.
    pub geometry: MultiPolygon<f64>,
    /// Summed population of the selected members.
    pub population: f64,
}

/// One row of the selected city list.
#[derive(Debug, Clone, PartialEq)]
pub struct CityRow {
    /// Municipality name.
    pub municipality: String,
    /// State.
    pub state: String,
    /// Urban population of the municipality.
    pub population: f64,
    /// Population of its component.
    pub component_population: f64,
    /// Number of municipalities in its component.
    pub component_size: usize,
}

/// Everything produced by one selection run.
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    /// Columns used for the dissolve.
    pub columns: DissolveColumns,
    /// Urban subset of the input tracts.
    pub urban: TractLayer,
    /// Every municipal footprint, ordered by key, with its component.
    pub footprints: Vec<ClassifiedFootprint>,
    /// Indexes into `footprints` of the selected municipalities.
    pub selected: Vec<usize>,
    /// Union of the selected footprints per component, by label.
    pub components: Vec<ComponentFootprint>,
    /// Selected municipalities, sorted by state then municipality.
    pub cities: Vec<CityRow>,
    /// Ids of the urban tracts of the selected municipalities, sorted.
    pub tract_ids: Vec<TractId>,
    /// Input tracts whose id is selected and that are urban.
    pub tracts: TractLayer,
}

impl Selection {
    /// Every footprint as a layer.
    #[must_use]
    pub fn footprint_layer(&self) -> TractLayer {
        TractLayer::new(
            self.urban.crs.clone(),
            self.footprints
                .iter()
                .map(|f| f.to_feature(&self.columns))
                .collect(),
        )
    }

    /// The selected footprints as a layer.
    #[must_use]
    pub fn selected_layer(&self) -> TractLayer {
        TractLayer::new(
            self.urban.crs.clone(),
            self.selected
                .iter()
                .map(|&i| self.footprints[i].to_feature(&self.columns))
                .collect(),
        )
    }

    /// The component dissolve of the selected footprints as a layer.
    #[must_use]
    pub fn component_layer(&self) -> TractLayer {
        let features = self
            .components
            .iter()
            .map(|c| {
                let mut properties = BTreeMap::new();
                #[allow(clippy::cast_precision_loss)]
                properties.insert(
                    COMPONENT_FIELD.to_owned(),
                    AttributeValue::Number(c.component as f64),
                );
                properties.insert(
                    POPULATION_FIELD.to_owned(),
                    AttributeValue::Number(c.population),
                );
                TractFeature::new(c.geometry.clone(), properties)
            })
            .collect();
        TractLayer::new(self.urban.crs.clone(), features)
    }
}

/// Selects mid-sized cities from a tract layer.
#[derive(Debug, Clone)]
pub struct ContiguitySelector {
    fields: FieldCandidates,
    thresholds: SelectionConfig,
}

impl ContiguitySelector {
    /// Creates a selector.
    #[must_use]
    pub const fn new(fields: FieldCandidates, thresholds: SelectionConfig) -> Self {
        Self { fields, thresholds }
    }

    /// Creates a selector from the pipeline configuration.
    #[must_use]
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.fields.clone(), config.selection)
    }

    /// Whether a footprint passes the selection rule. All bounds are
    /// inclusive.
    #[must_use]
    pub fn keeps(&self, population: f64, component_population: f64) -> bool {
        let t = &self.thresholds;
        population >= t.min_city_population
            && component_population >= t.min_component_population
            && component_population <= t.max_component_population
    }

    /// Runs the selection over `tracts`.
    ///
    /// # Errors
    ///
    /// Returns [`ContiguityError`] if a required column is missing, the
    /// layer has no situation column, or a selected city falls below the
    /// minimum population.
    pub fn select(&self, tracts: &TractLayer) -> Result<Selection, ContiguityError> {
        let id_field = tracts
            .require_field(&self.fields.tract_id)
            .map_err(|source| ContiguityError::MissingField {
                field: "tract_id",
                source,
            })?;
        let filter = UrbanFilter::resolve(tracts, &self.fields)?;

        let mut urban = filter.apply(tracts);
        let repaired = repair_layer(&mut urban);
        log::info!(
            "{} of {} tracts are urban ({repaired} geometries repaired)",
            urban.len(),
            tracts.len()
        );

        let columns = DissolveColumns::resolve(tracts, &self.fields)?;
        let footprints = dissolve(&urban, &columns);

        let geometries: Vec<MultiPolygon<f64>> =
            footprints.iter().map(|f| f.geometry.clone()).collect();
        let graph = AdjacencyGraph::build(&geometries, self.thresholds.contiguity);
        let components = Components::label(&graph);
        let populations: Vec<f64> = footprints.iter().map(|f| f.population).collect();
        let totals = components.totals(&populations);

        log::info!(
            "{} footprints, {} adjacencies, {} components",
            footprints.len(),
            graph.edge_count(),
            components.count()
        );

        let footprints: Vec<ClassifiedFootprint> = footprints
            .into_iter()
            .zip(components.labels())
            .map(|(footprint, &component)| {
                let (component_population, component_size) = totals[component];
                ClassifiedFootprint {
                    footprint,
                    component,
                    component_population,
                    component_size,
                }
            })
            .collect();

        let selected: Vec<usize> = footprints
            .iter()
            .enumerate()
            .filter(|(_, f)| self.keeps(f.footprint.population, f.component_population))
            .map(|(i, _)| i)
            .collect();

        self.check_selected(&footprints, &selected)?;
        log::info!("Selected {} mid-sized cities", selected.len());

        let component_footprints = dissolve_components(&footprints, &selected);
        let cities = city_rows(&footprints, &selected);

        let pairs: BTreeSet<&FootprintKey> =
            selected.iter().map(|&i| &footprints[i].footprint.key).collect();
        let tract_ids: Vec<TractId> = urban
            .features
            .iter()
            .filter(|f| columns.key(f).is_some_and(|key| pairs.contains(&key)))
            .filter_map(|f| f.tract_id(&id_field))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();

        let id_set: BTreeSet<&TractId> = tract_ids.iter().collect();
        let selected_tracts = tracts.filtered(|f| {
            f.tract_id(&id_field).is_some_and(|id| id_set.contains(&id)) && filter.is_urban(f)
        });

        log::info!(
            "{} tract ids selected, {} tracts in the final layer",
            tract_ids.len(),
            selected_tracts.len()
        );

        Ok(Selection {
            columns,
            urban,
            footprints,
            selected,
            components: component_footprints,
            cities,
            tract_ids,
            tracts: selected_tracts,
        })
    }

    fn check_selected(
        &self,
        footprints: &[ClassifiedFootprint],
        selected: &[usize],
    ) -> Result<(), ContiguityError> {
        let minimum = self.thresholds.min_city_population;
        match selected
            .iter()
            .map(|&i| &footprints[i].footprint)
            .find(|f| f.population < minimum)
        {
            Some(f) => Err(ContiguityError::PostConditionViolated {
                municipality: f.key.municipality.clone(),
                state: f.key.state.clone(),
                population: f.population,
                minimum,
            }),
            None => Ok(()),
        }
    }
}

fn dissolve_components(
    footprints: &[ClassifiedFootprint],
    selected: &[usize],
) -> Vec<ComponentFootprint> {
    let groups = selected.iter().map(|&i| &footprints[i]).fold(
        BTreeMap::<usize, (Vec<&MultiPolygon<f64>>, f64)>::new(),
        |mut acc, f| {
            let entry = acc.entry(f.component).or_default();
            entry.0.push(&f.footprint.geometry);
            entry.1 += f.footprint.population;
            acc
        },
    );

    groups
        .into_iter()
        .map(|(component, (geometries, population))| ComponentFootprint {
            component,
            geometry: repair(&unary_union(geometries)),
            population,
        })
        .collect()
}

fn city_rows(footprints: &[ClassifiedFootprint], selected: &[usize]) -> Vec<CityRow> {
    let mut rows: Vec<CityRow> = selected
        .iter()
        .map(|&i| {
            let f = &footprints[i];
            CityRow {
                municipality: f.footprint.key.municipality.clone(),
                state: f.footprint.key.state.clone(),
                population: f.footprint.population,
                component_population: f.component_population,
                component_size: f.component_size,
            }
        })
        .collect();
    rows.sort_by(|a, b| {
        a.state
            .cmp(&b.state)
            .then_with(|| a.municipality.cmp(&b.municipality))
    });
    rows
}
