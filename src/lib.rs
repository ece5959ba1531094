//! Census table catalog with natural-breaks choropleth classification.
//!
//! Yearly tables (`region.year.geography.survey.tableId.csv`) and boundary
//! files (`region.year.geography[.suffix].json`) are indexed into a
//! [`Catalog`]. Activating a dataset loads its rows once, derives one value
//! per region and classifies those values with Jenks natural breaks; the
//! result feeds a [`ChoroplethScale`] and the chart builders.

pub mod chart;
pub mod classify;
pub mod color;
pub mod config;
pub mod data;
pub mod error;

pub use classify::{classify_or_uniform, jenks_breaks, uniform_breaks, BreakMethod, Breaks};
pub use color::{ChoroplethScale, LegendEntry};
pub use config::AtlasConfig;
pub use data::catalog::{Activation, Catalog, Facet, Registration};
pub use data::filter::{Constraint, FilterConstraints, WILDCARD};
pub use data::loader::{FsFetcher, PayloadFetcher, TableParameterIndex};
pub use data::model::{
    BoundaryKey, BoundaryLayer, BoundaryRecord, ChoroplethMode, DatasetKey, DatasetRecord,
    FeatureRef, TableData, TableParameters,
};
pub use data::payload::LoadState;
pub use error::{AtlasError, ClassifyError, PayloadError};
