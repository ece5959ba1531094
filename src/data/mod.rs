//! Data layer: catalog, payload loading, value derivation and filtering.
//!
//! Architecture:
//! ```text
//!  manifest lines + tableParameters.json
//!        │
//!        ▼
//!   ┌──────────┐
//!   │  loader   │  path → DatasetKey / BoundaryKey, feed → TableParameters
//!   └──────────┘
//!        │
//!        ▼
//!   ┌──────────┐
//!   │ catalog   │  keyed records, facet index, time series
//!   └──────────┘
//!        │                      │
//!        ▼                      ▼
//!   ┌──────────┐          ┌──────────┐
//!   │  filter   │          │ payload   │  load once: CSV rows → value → breaks
//!   └──────────┘          └──────────┘
//! ```

pub mod catalog;
pub mod filter;
pub mod loader;
pub mod model;
pub mod payload;
pub mod value;
