use std::collections::{BTreeSet, HashMap};
use std::ops::RangeInclusive;
use std::sync::Arc;

use futures::future::join_all;
use log::{debug, info, warn};

use super::filter::{filter_records, FilterConstraints};
use super::loader::{
    parse_boundary, parse_manifest_path, parse_table, ManifestEntry, PayloadFetcher,
    TableParameterIndex,
};
use super::model::{
    BoundaryKey, BoundaryLayer, BoundaryRecord, DatasetKey, DatasetRecord, TableData,
};
use crate::error::{AtlasError, PayloadError, Result};

// ---------------------------------------------------------------------------
// Facets
// ---------------------------------------------------------------------------

/// One filterable dimension of the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Facet {
    Region,
    Geography,
    Survey,
    Year,
    TableId,
}

impl Facet {
    pub const ALL: [Facet; 5] = [
        Facet::Region,
        Facet::Geography,
        Facet::Survey,
        Facet::Year,
        Facet::TableId,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Facet::Region => "region",
            Facet::Geography => "geography",
            Facet::Survey => "survey",
            Facet::Year => "year",
            Facet::TableId => "table",
        }
    }
}

/// Unique facet values seen across all registered datasets.
#[derive(Debug, Default)]
struct FacetIndex {
    regions: BTreeSet<String>,
    geographies: BTreeSet<String>,
    surveys: BTreeSet<String>,
    years: BTreeSet<u16>,
    table_ids: BTreeSet<String>,
}

impl FacetIndex {
    fn add(&mut self, key: &DatasetKey) {
        self.regions.insert(key.region.to_ascii_uppercase());
        self.geographies.insert(key.geography.clone());
        self.surveys.insert(key.survey.clone());
        self.years.insert(key.year);
        self.table_ids.insert(key.table_id.clone());
    }
}

// ---------------------------------------------------------------------------
// Catalog
// ---------------------------------------------------------------------------

/// Outcome of registering one manifest path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Registration {
    Dataset(DatasetKey),
    Boundary(BoundaryKey),
    /// Blank line or unrecognised extension.
    Ignored,
}

/// A dataset made ready for rendering.
#[derive(Debug, Clone)]
pub struct Activation {
    pub dataset: Arc<DatasetRecord>,
    pub table: Arc<TableData>,
    pub boundary: Option<Arc<BoundaryRecord>>,
    pub layer: Option<Arc<BoundaryLayer>>,
}

/// Every dataset and boundary file listed in the manifest, keyed by their
/// composite identifiers.
///
/// Registration needs `&mut self`; everything after start-up, payload
/// loading included, works through `&self`.
pub struct Catalog {
    params: TableParameterIndex,
    fetcher: Arc<dyn PayloadFetcher>,
    classes: usize,
    datasets: HashMap<DatasetKey, Arc<DatasetRecord>>,
    boundaries: HashMap<BoundaryKey, Arc<BoundaryRecord>>,
    facets: FacetIndex,
}

impl std::fmt::Debug for Catalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Catalog")
            .field("datasets", &self.datasets.len())
            .field("boundaries", &self.boundaries.len())
            .field("classes", &self.classes)
            .finish()
    }
}

impl Catalog {
    /// An empty catalog resolving table ids against `params`.
    ///
    /// `classes` is the number of choropleth classes computed for every
    /// loaded table.
    pub fn new(params: TableParameterIndex, fetcher: Arc<dyn PayloadFetcher>, classes: usize) -> Self {
        Self {
            params,
            fetcher,
            classes,
            datasets: HashMap::new(),
            boundaries: HashMap::new(),
            facets: FacetIndex::default(),
        }
    }

    /// Build a catalog from a newline-separated manifest.
    ///
    /// Malformed lines are logged and skipped.
    pub fn from_manifest(
        params: TableParameterIndex,
        manifest: &str,
        fetcher: Arc<dyn PayloadFetcher>,
        classes: usize,
    ) -> Self {
        let mut catalog = Self::new(params, fetcher, classes);
        for line in manifest.lines() {
            if let Err(err) = catalog.register(line) {
                warn!("skipping manifest entry: {err}");
            }
        }
        info!(
            "catalog: {} datasets ({} drawable), {} boundary files",
            catalog.datasets.len(),
            catalog.listing().len(),
            catalog.boundaries.len()
        );
        catalog
    }

    /// Parse one manifest path and add its record.
    ///
    /// A second path with the same composite key replaces the first.
    pub fn register(&mut self, path: &str) -> Result<Registration> {
        match parse_manifest_path(path)? {
            None => Ok(Registration::Ignored),
            Some(ManifestEntry::Dataset { key, path }) => {
                let params = self.params.get(&key.table_id).cloned();
                if params.is_none() {
                    warn!("{}", AtlasError::MissingMetadata(key.table_id.clone()));
                }
                self.facets.add(&key);
                let record = Arc::new(DatasetRecord::new(key.clone(), &path, params));
                if let Some(previous) = self.datasets.insert(key.clone(), record) {
                    warn!("duplicate dataset {key}: '{}' replaced by '{path}'", previous.path);
                }
                debug!("registered dataset {key}");
                Ok(Registration::Dataset(key))
            }
            Some(ManifestEntry::Boundary { key, path }) => {
                let record = Arc::new(BoundaryRecord::new(key.clone(), &path));
                if let Some(previous) = self.boundaries.insert(key.clone(), record) {
                    warn!("duplicate boundary {key}: '{}' replaced by '{path}'", previous.path);
                }
                debug!("registered boundary {key}");
                Ok(Registration::Boundary(key))
            }
        }
    }

    pub fn len(&self) -> usize {
        self.datasets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.datasets.is_empty()
    }

    pub fn boundary_count(&self) -> usize {
        self.boundaries.len()
    }

    pub fn classes(&self) -> usize {
        self.classes
    }

    pub fn lookup_dataset(&self, key: &DatasetKey) -> Option<Arc<DatasetRecord>> {
        self.datasets.get(key).cloned()
    }

    pub fn lookup_boundary(&self, key: &BoundaryKey) -> Option<Arc<BoundaryRecord>> {
        self.boundaries.get(key).cloned()
    }

    /// The boundary file a dataset is drawn on, if listed.
    pub fn boundary_for(&self, dataset: &DatasetRecord) -> Option<Arc<BoundaryRecord>> {
        self.lookup_boundary(&dataset.key.boundary_key())
    }

    /// Datasets that can be drawn (a boundary file exists), ordered by key.
    pub fn listing(&self) -> Vec<Arc<DatasetRecord>> {
        let mut visible: Vec<Arc<DatasetRecord>> = self
            .datasets
            .values()
            .filter(|record| self.boundaries.contains_key(&record.key.boundary_key()))
            .cloned()
            .collect();
        visible.sort_by(|a, b| a.key.cmp(&b.key));
        visible
    }

    /// Drawable datasets passing `constraints`, ordered by key.
    pub fn filtered(&self, constraints: &FilterConstraints) -> Vec<Arc<DatasetRecord>> {
        filter_records(&self.listing(), constraints)
    }

    /// Datasets whose table id has no parameters, ordered by key.
    pub fn missing_metadata(&self) -> Vec<Arc<DatasetRecord>> {
        let mut missing: Vec<Arc<DatasetRecord>> = self
            .datasets
            .values()
            .filter(|record| !record.has_metadata())
            .cloned()
            .collect();
        missing.sort_by(|a, b| a.key.cmp(&b.key));
        missing
    }

    /// Unique values of one facet: years descending, everything else
    /// ascending.
    pub fn facet_values(&self, facet: Facet) -> Vec<String> {
        fn owned(set: &BTreeSet<String>) -> Vec<String> {
            set.iter().cloned().collect()
        }
        match facet {
            Facet::Region => owned(&self.facets.regions),
            Facet::Geography => owned(&self.facets.geographies),
            Facet::Survey => owned(&self.facets.surveys),
            Facet::TableId => owned(&self.facets.table_ids),
            Facet::Year => self.facets.years.iter().rev().map(u16::to_string).collect(),
        }
    }

    /// The same table for every year in `years` that the catalog holds,
    /// ascending by year. Missing years are logged and skipped.
    pub fn time_series(
        &self,
        region: &str,
        geography: &str,
        survey: &str,
        table_id: &str,
        years: RangeInclusive<u16>,
    ) -> Vec<Arc<DatasetRecord>> {
        let template = DatasetKey::new(region, *years.start(), geography, survey, table_id);
        let series: Vec<Arc<DatasetRecord>> = years
            .filter_map(|year| {
                let key = template.with_year(year);
                let found = self.lookup_dataset(&key);
                if found.is_none() {
                    info!("{}", AtlasError::LookupMiss(key.to_string()));
                }
                found
            })
            .collect();
        if series.is_empty() {
            info!(
                "no datasets match {}.YEAR.{}.{}.{}",
                template.region, template.geography, template.survey, template.table_id
            );
        }
        series
    }

    /// [`Catalog::time_series`] for the table identified by `key`.
    pub fn time_series_for(&self, key: &DatasetKey, years: RangeInclusive<u16>) -> Vec<Arc<DatasetRecord>> {
        self.time_series(&key.region, &key.geography, &key.survey, &key.table_id, years)
    }

    // -- payload loading --

    /// Load (once) and classify the rows of `record`.
    pub async fn load_table(
        &self,
        record: &DatasetRecord,
    ) -> std::result::Result<Arc<TableData>, PayloadError> {
        let result = record
            .table
            .ensure_loaded(|| {
                let fetcher = Arc::clone(&self.fetcher);
                let path = record.path.clone();
                let params = record.table_params.clone();
                let classes = self.classes;
                async move {
                    info!("retrieving table {path}");
                    let text = fetcher.fetch_text(&path).await?;
                    parse_table(&path, &text, params.as_deref(), classes)
                }
            })
            .await;
        if let Err(err) = &result {
            warn!("{err}");
        }
        result
    }

    /// Load (once) the polygons of `record`.
    pub async fn load_boundary(
        &self,
        record: &BoundaryRecord,
    ) -> std::result::Result<Arc<BoundaryLayer>, PayloadError> {
        let result = record
            .layer
            .ensure_loaded(|| {
                let fetcher = Arc::clone(&self.fetcher);
                let path = record.path.clone();
                async move {
                    info!("retrieving boundary {path}");
                    let text = fetcher.fetch_text(&path).await?;
                    parse_boundary(&path, &text)
                }
            })
            .await;
        if let Err(err) = &result {
            warn!("{err}");
        }
        result
    }

    /// Make the dataset at `key` ready to draw: its rows, and its polygons
    /// when `with_boundary` is set, are loaded concurrently.
    pub async fn activate(&self, key: &DatasetKey, with_boundary: bool) -> Result<Activation> {
        let dataset = self
            .lookup_dataset(key)
            .ok_or_else(|| AtlasError::LookupMiss(key.to_string()))?;

        if !with_boundary {
            let table = self.load_table(&dataset).await?;
            return Ok(Activation {
                dataset,
                table,
                boundary: None,
                layer: None,
            });
        }

        let boundary_key = key.boundary_key();
        let boundary = self
            .lookup_boundary(&boundary_key)
            .ok_or_else(|| AtlasError::LookupMiss(boundary_key.to_string()))?;
        let (table, layer) =
            futures::try_join!(self.load_table(&dataset), self.load_boundary(&boundary))?;

        Ok(Activation {
            dataset,
            table,
            boundary: Some(boundary),
            layer: Some(layer),
        })
    }

    /// Time series for `key` with every table loaded; years whose table
    /// fails to load are skipped.
    pub async fn load_time_series(
        &self,
        key: &DatasetKey,
        years: RangeInclusive<u16>,
    ) -> Vec<(Arc<DatasetRecord>, Arc<TableData>)> {
        let records = self.time_series_for(key, years);
        let tables = join_all(records.iter().map(|record| self.load_table(record))).await;
        records
            .into_iter()
            .zip(tables)
            .filter_map(|(record, table)| table.ok().map(|t| (record, t)))
            .collect()
    }
}
