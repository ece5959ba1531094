use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use log::{info, warn};
use serde::Deserialize;
use serde_json::Value as JsonValue;

use super::model::{
    BoundaryKey, BoundaryLayer, DatasetKey, FeatureRef, TableData, TableParameters,
};
use super::value::derive_all;
use crate::classify::classify_or_uniform;
use crate::error::{AtlasError, PayloadError, Result};

// ---------------------------------------------------------------------------
// Fetching – the I/O collaborator
// ---------------------------------------------------------------------------

/// Retrieves the text of a manifest path (file, HTTP, …).
#[async_trait]
pub trait PayloadFetcher: Send + Sync {
    async fn fetch_text(&self, path: &str) -> std::result::Result<String, PayloadError>;
}

/// Reads manifest paths relative to a root directory.
#[derive(Debug, Clone)]
pub struct FsFetcher {
    root: PathBuf,
}

impl FsFetcher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(path)
    }
}

#[async_trait]
impl PayloadFetcher for FsFetcher {
    async fn fetch_text(&self, path: &str) -> std::result::Result<String, PayloadError> {
        let full = self.resolve(path);
        tokio::fs::read_to_string(&full)
            .await
            .map_err(|e| PayloadError::new(path, format!("{}: {e}", full.display())))
    }
}

// ---------------------------------------------------------------------------
// Table parameter feed
// ---------------------------------------------------------------------------

/// Table parameters keyed by table id.
pub type TableParameterIndex = HashMap<String, Arc<TableParameters>>;

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ParameterFeed {
    acs_table_parameters: Vec<TableParameters>,
}

/// Parse the feed `{ "acsTableParameters": [ ... ] }`.
///
/// A malformed feed is an error; duplicate table ids keep the last entry.
pub fn parse_table_parameters(text: &str) -> Result<TableParameterIndex> {
    let feed: ParameterFeed =
        serde_json::from_str(text).map_err(|e| AtlasError::Metadata(e.to_string()))?;

    let mut index = TableParameterIndex::with_capacity(feed.acs_table_parameters.len());
    for params in feed.acs_table_parameters {
        let id = params.table_id.clone();
        if index.insert(id.clone(), Arc::new(params)).is_some() {
            warn!("duplicate table parameters for '{id}'; keeping the last entry");
        }
    }
    info!("loaded parameters for {} tables", index.len());
    Ok(index)
}

pub fn load_table_parameters(path: &Path) -> Result<TableParameterIndex> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| AtlasError::Metadata(format!("{}: {e}", path.display())))?;
    parse_table_parameters(&text)
}

// ---------------------------------------------------------------------------
// Manifest
// ---------------------------------------------------------------------------

/// A recognised manifest line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestEntry {
    Dataset { key: DatasetKey, path: String },
    Boundary { key: BoundaryKey, path: String },
}

/// Classify one manifest path by extension and parse its key.
///
/// Returns `Ok(None)` for blank lines and unrecognised extensions (logged),
/// and a parse error for a recognised file whose name is malformed.
pub fn parse_manifest_path(line: &str) -> Result<Option<ManifestEntry>> {
    let path = line.trim();
    if path.is_empty() {
        return Ok(None);
    }

    let file_name = path.rsplit('/').next().unwrap_or(path);
    let ext = file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();

    match ext.as_str() {
        "csv" => {
            // The extension must not be mistaken for the table id.
            if file_name.split('.').count() < 6 {
                return Err(AtlasError::parse(path, "missing table id"));
            }
            Ok(Some(ManifestEntry::Dataset {
                key: file_name.parse()?,
                path: path.to_string(),
            }))
        }
        "json" | "geojson" => {
            if file_name.split('.').count() < 4 {
                return Err(AtlasError::parse(path, "missing geography level"));
            }
            Ok(Some(ManifestEntry::Boundary {
                key: file_name.parse()?,
                path: path.to_string(),
            }))
        }
        other => {
            info!("unrecognised file type '.{other}' in manifest: {path}");
            Ok(None)
        }
    }
}

pub fn read_manifest(path: &Path) -> Result<String> {
    std::fs::read_to_string(path)
        .map_err(|e| AtlasError::Manifest(format!("{}: {e}", path.display())))
}

// ---------------------------------------------------------------------------
// Tabular payload
// ---------------------------------------------------------------------------

/// Parse a CSV table: header row, then one row per region.
///
/// Breaks are computed from the derived values when `params` is known.
pub fn parse_table(
    path: &str,
    text: &str,
    params: Option<&TableParameters>,
    classes: usize,
) -> std::result::Result<TableData, PayloadError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut records = reader.records();
    let variable_names: Vec<String> = match records.next() {
        Some(header) => header
            .map_err(|e| PayloadError::new(path, format!("CSV header: {e}")))?
            .iter()
            .map(str::to_string)
            .collect(),
        None => Vec::new(),
    };

    let mut rows = Vec::new();
    for (row_no, result) in records.enumerate() {
        let record = result.map_err(|e| PayloadError::new(path, format!("CSV row {row_no}: {e}")))?;
        rows.push(record.iter().map(str::to_string).collect::<Vec<String>>());
    }

    let mut geoid_index = HashMap::with_capacity(rows.len());
    for (i, row) in rows.iter().enumerate() {
        if let Some(geoid) = row.get(1) {
            geoid_index.entry(geoid.clone()).or_insert(i);
        }
    }

    let breaks = params.and_then(|p| {
        let values = derive_all(p, &rows);
        let breaks = classify_or_uniform(&values, classes);
        if let Some(b) = &breaks {
            info!("{path}: {:?} breaks {:?}", b.method(), b.bounds());
        }
        breaks
    });

    Ok(TableData {
        variable_names,
        rows,
        geoid_index,
        breaks,
    })
}

// ---------------------------------------------------------------------------
// Boundary payload
// ---------------------------------------------------------------------------

/// GEOID of a feature: the `GEOID` property, or `GEO_ID` with everything up
/// to the last `"US"` removed (`"0500000US45001"` → `"45001"`).
pub fn feature_geoid(properties: &serde_json::Map<String, JsonValue>) -> Option<String> {
    if let Some(geoid) = properties.get("GEOID").and_then(JsonValue::as_str) {
        return Some(geoid.to_string());
    }
    let combined = properties.get("GEO_ID").and_then(JsonValue::as_str)?;
    let start = combined.rfind("US").map(|i| i + 2).unwrap_or(0);
    Some(combined[start..].to_string())
}

/// Parse a GeoJSON feature collection, keeping it opaque apart from the
/// per-feature identifiers.
pub fn parse_boundary(path: &str, text: &str) -> std::result::Result<BoundaryLayer, PayloadError> {
    let collection: JsonValue = serde_json::from_str(text)
        .map_err(|e| PayloadError::new(path, format!("parsing GeoJSON: {e}")))?;

    let features = collection
        .get("features")
        .and_then(JsonValue::as_array)
        .ok_or_else(|| PayloadError::new(path, "expected a FeatureCollection"))?;

    let mut refs = Vec::with_capacity(features.len());
    for (i, feature) in features.iter().enumerate() {
        let props = feature.get("properties").and_then(JsonValue::as_object);
        match props.and_then(feature_geoid) {
            Some(geoid) => refs.push(FeatureRef {
                geoid,
                name: props
                    .and_then(|p| p.get("NAME"))
                    .and_then(JsonValue::as_str)
                    .map(str::to_string),
            }),
            None => warn!("{path}: feature {i} has no GEOID"),
        }
    }

    Ok(BoundaryLayer {
        collection,
        features: refs,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::BreakMethod;
    use std::io::Write;

    const PARAMS: &str = r#"{"acsTableParameters":[
        {"tableId":"B01001","tableTitle":"Sex by Age","legendTitle":"Population",
         "offset":2,"groups":["Total","0-9","10-19"],"categories":["All"],"choroIdx":[]},
        {"tableId":"B05002","offset":"3"}
    ]}"#;

    #[test]
    fn parses_parameter_feed() {
        let index = parse_table_parameters(PARAMS).unwrap();
        assert_eq!(index.len(), 2);
        assert_eq!(index["B01001"].groups.len(), 3);
        assert_eq!(index["B05002"].offset, 3);
    }

    #[test]
    fn malformed_feed_is_fatal() {
        assert!(matches!(
            parse_table_parameters(r#"{"tables":[]}"#),
            Err(AtlasError::Metadata(_))
        ));
        assert!(parse_table_parameters("not json").is_err());
    }

    #[test]
    fn manifest_paths_dispatch_on_extension() {
        let entry = parse_manifest_path("data/2015/us/us.2015.tract.acs5.B01001.csv\r")
            .unwrap()
            .unwrap();
        assert_eq!(
            entry,
            ManifestEntry::Dataset {
                key: DatasetKey::new("us", 2015, "tract", "acs5", "B01001"),
                path: "data/2015/us/us.2015.tract.acs5.B01001.csv".into(),
            }
        );

        for path in ["us.2015.tract.json", "us.2015.tract.500k.geojson"] {
            match parse_manifest_path(path).unwrap() {
                Some(ManifestEntry::Boundary { key, .. }) => {
                    assert_eq!(key, BoundaryKey::new("us", 2015, "tract"))
                }
                other => panic!("unexpected {other:?}"),
            }
        }

        assert_eq!(parse_manifest_path("   ").unwrap(), None);
        assert_eq!(parse_manifest_path("notes/readme.txt").unwrap(), None);
    }

    #[test]
    fn malformed_manifest_names_are_parse_errors() {
        assert!(parse_manifest_path("us.2015.tract.acs5.csv").is_err());
        assert!(parse_manifest_path("us.tract.json").is_err());
        assert!(parse_manifest_path("us.xx.tract.acs5.B01001.csv").is_err());
    }

    #[test]
    fn parses_table_and_classifies() {
        let index = parse_table_parameters(PARAMS).unwrap();
        let text = "NAME,GEOID,Total,0-9,10-19\nRegionA,US9901,100,40,60\n";
        let table = parse_table("t.csv", text, Some(index["B01001"].as_ref()), 1).unwrap();
        assert_eq!(table.variable_names[2], "Total");
        assert_eq!(table.len(), 1);
        assert_eq!(table.row_for_geoid("US9901"), Some(0));
        assert_eq!(table.region_name(0), Some("RegionA"));
        let breaks = table.breaks.unwrap();
        assert_eq!(breaks.bounds(), &[100.0, 100.0]);
        assert_eq!(breaks.method(), BreakMethod::NaturalBreaks);
    }

    #[test]
    fn table_without_parameters_has_no_breaks() {
        let table = parse_table("t.csv", "a,b\nx,1\ny,2,3\n", None, 5).unwrap();
        assert_eq!(table.len(), 2);
        assert!(table.breaks.is_none());
    }

    #[test]
    fn geoid_falls_back_to_geo_id() {
        let text = r#"{"type":"FeatureCollection","features":[
            {"type":"Feature","properties":{"GEOID":"45001","NAME":"Abbeville"},"geometry":null},
            {"type":"Feature","properties":{"GEO_ID":"0500000US45003","NAME":"Aiken"},"geometry":null},
            {"type":"Feature","properties":{"NAME":"Nowhere"},"geometry":null}
        ]}"#;
        let layer = parse_boundary("sc.json", text).unwrap();
        let ids: Vec<&str> = layer.features.iter().map(|f| f.geoid.as_str()).collect();
        assert_eq!(ids, vec!["45001", "45003"]);
        assert_eq!(layer.features[1].name.as_deref(), Some("Aiken"));
    }

    #[test]
    fn boundary_must_be_a_collection() {
        assert!(parse_boundary("x.json", r#"{"type":"Feature"}"#).is_err());
        assert!(parse_boundary("x.json", "{").is_err());
    }

    #[tokio::test]
    async fn fs_fetcher_reads_relative_to_root() {
        let dir = tempfile::tempdir().unwrap();
        let mut file = std::fs::File::create(dir.path().join("a.csv")).unwrap();
        writeln!(file, "h1,h2").unwrap();

        let fetcher = FsFetcher::new(dir.path());
        assert_eq!(fetcher.fetch_text("a.csv").await.unwrap(), "h1,h2\n");
        let err = fetcher.fetch_text("missing.csv").await.unwrap_err();
        assert_eq!(err.path, "missing.csv");
    }
}
