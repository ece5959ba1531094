//! Value deriver: one choropleth scalar per table row.

use log::debug;

use super::model::{ChoroplethMode, TableData, TableParameters};
use crate::classify::Breaks;
use crate::error::{AtlasError, Result};

/// Parse the numeric field at `column`, exactly as written.
pub fn numeric_field(row: &[String], column: usize) -> Result<f64> {
    let raw = row
        .get(column)
        .ok_or_else(|| AtlasError::missing_value(format!("row has no column {column}")))?;
    raw.trim()
        .parse::<f64>()
        .map_err(|_| AtlasError::missing_value(format!("column {column}: '{raw}' is not numeric")))
}

/// Derive the choropleth value of one row according to `params.choroIdx`.
pub fn derive_value(params: &TableParameters, row: &[String]) -> Result<f64> {
    let offset = params.offset;
    let value = match params.choropleth_mode() {
        ChoroplethMode::Total => numeric_field(row, offset)?,
        ChoroplethMode::Column(column) => numeric_field(row, offset + column)?,
        ChoroplethMode::Ratio {
            denominator,
            numerators,
        } => {
            let mut sum = 0.0;
            for column in numerators {
                sum += numeric_field(row, offset + column)?;
            }
            100.0 * sum / numeric_field(row, offset + denominator)?
        }
    };
    if value.is_finite() {
        Ok(value)
    } else {
        Err(AtlasError::missing_value(format!("derived value {value} is not finite")))
    }
}

/// Derive the value of row `row` of a loaded table.
pub fn derive_row(params: &TableParameters, table: &TableData, row: usize) -> Result<f64> {
    let fields = table
        .rows
        .get(row)
        .ok_or_else(|| AtlasError::missing_value(format!("no row {row}")))?;
    derive_value(params, fields)
}

/// Derived values of every row that has one, in row order.
///
/// Rows without a value are skipped; they stay in the table and render as
/// "no data".
pub fn derive_all(params: &TableParameters, rows: &[Vec<String>]) -> Vec<f64> {
    let mut skipped = 0usize;
    let values: Vec<f64> = rows
        .iter()
        .filter_map(|row| match derive_value(params, row) {
            Ok(v) => Some(v),
            Err(_) => {
                skipped += 1;
                None
            }
        })
        .collect();
    if skipped > 0 {
        debug!(
            "table {}: {skipped} of {} rows have no choropleth value",
            params.table_id,
            rows.len()
        );
    }
    values
}

/// Class of the region with `geoid`, or `None` when the region has no row
/// or no derivable value.
pub fn region_class(
    params: &TableParameters,
    table: &TableData,
    breaks: &Breaks,
    geoid: &str,
) -> Option<usize> {
    let row = table.row_for_geoid(geoid)?;
    derive_row(params, table, row)
        .ok()
        .map(|value| breaks.class_of(value))
}
