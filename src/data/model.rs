use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Deserializer};

use super::payload::{LazyPayload, LoadState};
use crate::classify::Breaks;
use crate::error::AtlasError;

// ---------------------------------------------------------------------------
// TableParameters – per-table metadata from the parameter feed
// ---------------------------------------------------------------------------

/// Layout and labels of one census table.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableParameters {
    pub table_id: String,
    #[serde(default)]
    pub table_title: Option<String>,
    #[serde(default)]
    pub legend_title: Option<String>,
    /// Column where the numeric group blocks begin.
    #[serde(deserialize_with = "flex_index")]
    pub offset: usize,
    /// One label per sub-column within a group block.
    #[serde(default)]
    pub groups: Vec<String>,
    /// One label per group block.
    #[serde(default)]
    pub categories: Vec<String>,
    /// Group-relative columns feeding the choropleth value.
    #[serde(default, deserialize_with = "flex_indices")]
    pub choro_idx: Option<Vec<usize>>,
}

/// How the choropleth value of a row is derived.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChoroplethMode {
    /// The field at `offset`.
    Total,
    /// The field at `offset + column`.
    Column(usize),
    /// `100 × Σ numerators / denominator`, all relative to `offset`.
    Ratio {
        denominator: usize,
        numerators: Vec<usize>,
    },
}

impl TableParameters {
    pub fn choropleth_mode(&self) -> ChoroplethMode {
        match self.choro_idx.as_deref() {
            None | Some([]) => ChoroplethMode::Total,
            Some([column]) => ChoroplethMode::Column(*column),
            Some([denominator, numerators @ ..]) => ChoroplethMode::Ratio {
                denominator: *denominator,
                numerators: numerators.to_vec(),
            },
        }
    }
}

/// Indices in the feed are sometimes written as strings (`"2"`).
#[derive(Deserialize)]
#[serde(untagged)]
enum FlexIndex {
    Number(usize),
    Text(String),
}

impl FlexIndex {
    fn into_index<E: serde::de::Error>(self) -> Result<usize, E> {
        match self {
            FlexIndex::Number(n) => Ok(n),
            FlexIndex::Text(s) => s
                .trim()
                .parse()
                .map_err(|_| E::custom(format!("'{s}' is not a column index"))),
        }
    }
}

fn flex_index<'de, D: Deserializer<'de>>(deserializer: D) -> Result<usize, D::Error> {
    FlexIndex::deserialize(deserializer)?.into_index()
}

fn flex_indices<'de, D: Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<Vec<usize>>, D::Error> {
    let raw: Option<Vec<FlexIndex>> = Option::deserialize(deserializer)?;
    raw.map(|items| items.into_iter().map(FlexIndex::into_index::<D::Error>).collect())
        .transpose()
}

// ---------------------------------------------------------------------------
// Composite keys
// ---------------------------------------------------------------------------

/// `(region, year, geographyLevel)` – identifies a boundary file.
///
/// Regions are stored lower-case so lookups ignore case.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BoundaryKey {
    pub region: String,
    pub year: u16,
    pub geography: String,
}

/// `(region, year, geographyLevel, surveyCode, tableId)` – identifies a
/// tabular dataset.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DatasetKey {
    pub region: String,
    pub year: u16,
    pub geography: String,
    pub survey: String,
    pub table_id: String,
}

pub(crate) fn parse_year(token: &str, input: &str) -> Result<u16, AtlasError> {
    token
        .parse()
        .map_err(|_| AtlasError::parse(input, format!("'{token}' is not a year")))
}

fn require_tokens<'a>(input: &'a str, count: usize) -> Result<Vec<&'a str>, AtlasError> {
    let tokens: Vec<&str> = input.split('.').collect();
    if tokens.len() < count || tokens[..count].iter().any(|t| t.trim().is_empty()) {
        return Err(AtlasError::parse(
            input,
            format!("expected {count} non-empty dot-separated fields"),
        ));
    }
    Ok(tokens)
}

impl BoundaryKey {
    pub fn new(region: &str, year: u16, geography: &str) -> Self {
        Self {
            region: region.to_ascii_lowercase(),
            year,
            geography: geography.to_string(),
        }
    }
}

impl DatasetKey {
    pub fn new(region: &str, year: u16, geography: &str, survey: &str, table_id: &str) -> Self {
        Self {
            region: region.to_ascii_lowercase(),
            year,
            geography: geography.to_string(),
            survey: survey.to_string(),
            table_id: table_id.to_string(),
        }
    }

    /// Key of the boundary file this dataset is drawn on.
    pub fn boundary_key(&self) -> BoundaryKey {
        BoundaryKey {
            region: self.region.clone(),
            year: self.year,
            geography: self.geography.clone(),
        }
    }

    /// The same table for another year.
    pub fn with_year(&self, year: u16) -> Self {
        Self {
            year,
            ..self.clone()
        }
    }
}

impl FromStr for BoundaryKey {
    type Err = AtlasError;

    /// Parses the leading `region.year.geography` fields; trailing fields
    /// (resolution suffixes, extensions) are ignored.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let t = require_tokens(s, 3)?;
        Ok(Self::new(t[0], parse_year(t[1], s)?, t[2]))
    }
}

impl FromStr for DatasetKey {
    type Err = AtlasError;

    /// Parses the leading `region.year.geography.survey.tableId` fields.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let t = require_tokens(s, 5)?;
        Ok(Self::new(t[0], parse_year(t[1], s)?, t[2], t[3], t[4]))
    }
}

impl fmt::Display for BoundaryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.region, self.year, self.geography)
    }
}

impl fmt::Display for DatasetKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}.{}",
            self.region, self.year, self.geography, self.survey, self.table_id
        )
    }
}

// ---------------------------------------------------------------------------
// Loaded payloads
// ---------------------------------------------------------------------------

/// Parsed rows of one tabular file plus its classification.
#[derive(Debug, Clone)]
pub struct TableData {
    /// Header row.
    pub variable_names: Vec<String>,
    /// Data rows: column 0 region name, column 1 GEOID, numeric from `offset`.
    pub rows: Vec<Vec<String>>,
    /// GEOID → row index.
    pub geoid_index: HashMap<String, usize>,
    /// Class boundaries of the derived values, if any value could be derived.
    pub breaks: Option<Breaks>,
}

impl TableData {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn row_for_geoid(&self, geoid: &str) -> Option<usize> {
        self.geoid_index.get(geoid).copied()
    }

    pub fn region_name(&self, row: usize) -> Option<&str> {
        self.rows.get(row)?.first().map(String::as_str)
    }
}

/// One polygon feature's identity inside a boundary file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureRef {
    pub geoid: String,
    pub name: Option<String>,
}

/// A loaded boundary file. The geometry is kept opaque for the renderer.
#[derive(Debug, Clone)]
pub struct BoundaryLayer {
    pub collection: serde_json::Value,
    pub features: Vec<FeatureRef>,
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// One tabular data file known to the catalog.
#[derive(Debug)]
pub struct DatasetRecord {
    pub key: DatasetKey,
    /// Path as listed in the manifest.
    pub path: String,
    /// `None` when the parameter feed has no entry for the table id.
    pub table_params: Option<Arc<TableParameters>>,
    pub(crate) table: LazyPayload<TableData>,
}

impl DatasetRecord {
    pub fn new(key: DatasetKey, path: &str, table_params: Option<Arc<TableParameters>>) -> Self {
        Self {
            key,
            path: path.to_string(),
            table_params,
            table: LazyPayload::new(),
        }
    }

    pub fn table(&self) -> Option<Arc<TableData>> {
        self.table.get()
    }

    pub fn load_state(&self) -> LoadState {
        self.table.state()
    }

    pub fn has_metadata(&self) -> bool {
        self.table_params.is_some()
    }

    /// Title for listings, or a marker when metadata is missing.
    pub fn display_title(&self) -> &str {
        self.table_params
            .as_ref()
            .and_then(|p| p.table_title.as_deref())
            .unwrap_or("MISSING CHART INFORMATION")
    }
}

/// One boundary (polygon) file known to the catalog.
#[derive(Debug)]
pub struct BoundaryRecord {
    pub key: BoundaryKey,
    pub path: String,
    pub(crate) layer: LazyPayload<BoundaryLayer>,
}

impl BoundaryRecord {
    pub fn new(key: BoundaryKey, path: &str) -> Self {
        Self {
            key,
            path: path.to_string(),
            layer: LazyPayload::new(),
        }
    }

    pub fn layer(&self) -> Option<Arc<BoundaryLayer>> {
        self.layer.get()
    }

    pub fn load_state(&self) -> LoadState {
        self.layer.state()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dataset_key_parses_and_displays() {
        let key: DatasetKey = "US.2015.tract.acs5.B01001".parse().unwrap();
        assert_eq!(key, DatasetKey::new("us", 2015, "tract", "acs5", "B01001"));
        assert_eq!(key.to_string(), "us.2015.tract.acs5.B01001");
        assert_eq!(key.boundary_key().to_string(), "us.2015.tract");
        assert_eq!(key.with_year(2016).year, 2016);
    }

    #[test]
    fn boundary_key_ignores_trailing_fields() {
        let key: BoundaryKey = "sc.2014.county.500k".parse().unwrap();
        assert_eq!(key, BoundaryKey::new("sc", 2014, "county"));
    }

    #[test]
    fn malformed_keys_are_parse_errors() {
        assert!(matches!(
            "us.2015.tract".parse::<DatasetKey>(),
            Err(AtlasError::Parse { .. })
        ));
        assert!(matches!(
            "us.twenty.tract".parse::<BoundaryKey>(),
            Err(AtlasError::Parse { .. })
        ));
        assert!("us..tract".parse::<BoundaryKey>().is_err());
    }

    #[test]
    fn table_parameters_accept_string_indices() {
        let params: TableParameters = serde_json::from_str(
            r#"{"tableId":"B05003","tableTitle":"Sex by Age","offset":"2",
                "groups":["Total","Native"],"categories":["All","Male"],
                "choroIdx":["0", 1, "2"]}"#,
        )
        .unwrap();
        assert_eq!(params.offset, 2);
        assert_eq!(params.legend_title, None);
        assert_eq!(
            params.choropleth_mode(),
            ChoroplethMode::Ratio {
                denominator: 0,
                numerators: vec![1, 2]
            }
        );
    }

    #[test]
    fn choropleth_mode_follows_choro_idx_length() {
        let mut params: TableParameters =
            serde_json::from_str(r#"{"tableId":"B01001","offset":2}"#).unwrap();
        assert_eq!(params.choropleth_mode(), ChoroplethMode::Total);
        params.choro_idx = Some(vec![]);
        assert_eq!(params.choropleth_mode(), ChoroplethMode::Total);
        params.choro_idx = Some(vec![3]);
        assert_eq!(params.choropleth_mode(), ChoroplethMode::Column(3));
    }

    #[test]
    fn bad_offset_is_rejected() {
        let parsed = serde_json::from_str::<TableParameters>(r#"{"tableId":"X","offset":"two"}"#);
        assert!(parsed.is_err());
    }
}
