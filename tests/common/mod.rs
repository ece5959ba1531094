#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use acs_atlas::data::loader::parse_table_parameters;
use acs_atlas::{Catalog, PayloadError, PayloadFetcher, TableParameterIndex};
use async_trait::async_trait;

pub const PARAMS: &str = r#"{"acsTableParameters":[
    {"tableId":"B01001","tableTitle":"Sex by Age","legendTitle":"Population",
     "offset":2,"groups":["Total","0-9","10-19"],"categories":["All"],"choroIdx":[]},
    {"tableId":"B05003","tableTitle":"Nativity","legendTitle":"% Native",
     "offset":2,"groups":["Total","Native","Foreign"],"categories":["All","Male","Female"],
     "choroIdx":[0,1]}
]}"#;

pub fn params() -> TableParameterIndex {
    parse_table_parameters(PARAMS).expect("test parameters parse")
}

/// In-memory fetcher that counts requests per path.
#[derive(Default)]
pub struct MemoryFetcher {
    files: Mutex<HashMap<String, String>>,
    calls: Mutex<HashMap<String, usize>>,
    total: AtomicUsize,
}

impl MemoryFetcher {
    pub fn with(files: &[(&str, &str)]) -> Arc<Self> {
        let fetcher = Self::default();
        for (path, text) in files {
            fetcher.put(path, text);
        }
        Arc::new(fetcher)
    }

    pub fn put(&self, path: &str, text: &str) {
        self.files
            .lock()
            .unwrap()
            .insert(path.to_string(), text.to_string());
    }

    pub fn calls(&self, path: &str) -> usize {
        self.calls.lock().unwrap().get(path).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.total.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PayloadFetcher for MemoryFetcher {
    async fn fetch_text(&self, path: &str) -> Result<String, PayloadError> {
        self.total.fetch_add(1, Ordering::SeqCst);
        *self
            .calls
            .lock()
            .unwrap()
            .entry(path.to_string())
            .or_default() += 1;
        // Give other callers a chance to attach while this load is pending.
        tokio::task::yield_now().await;
        self.files
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or_else(|| PayloadError::new(path, "not found"))
    }
}

pub fn catalog(manifest: &str, fetcher: Arc<MemoryFetcher>, classes: usize) -> Catalog {
    Catalog::from_manifest(params(), manifest, fetcher, classes)
}
