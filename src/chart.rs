//! Chart series for one region: bars across a table's groups, and a trend
//! of one group across years. Drawing is left to the caller.

use std::sync::Arc;

use log::info;

use crate::color::{generate_palette, Rgb8};
use crate::data::model::{DatasetRecord, TableData, TableParameters};
use crate::data::value::numeric_field;
use crate::error::{AtlasError, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct BarSeries {
    /// Category label.
    pub name: String,
    pub color: Rgb8,
    /// `(group label, value)`; `None` where the field is not numeric.
    pub bars: Vec<(String, Option<f64>)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BarChart {
    pub title: String,
    pub series: Vec<BarSeries>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrendSeries {
    pub name: String,
    pub color: Rgb8,
    /// `(year, value)` ascending by year.
    pub points: Vec<(u16, f64)>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TrendChart {
    pub title: String,
    pub y_label: String,
    pub series: Vec<TrendSeries>,
}

fn table_title(params: &TableParameters) -> &str {
    params.table_title.as_deref().unwrap_or(&params.table_id)
}

/// The first category/group is a total whenever there is more than one.
fn first_detail(len: usize) -> usize {
    usize::from(len > 1)
}

fn region_row<'t>(table: &'t TableData, geoid: &str) -> Result<&'t [String]> {
    table
        .row_for_geoid(geoid)
        .and_then(|row| table.rows.get(row))
        .map(Vec::as_slice)
        .ok_or_else(|| AtlasError::LookupMiss(format!("GEOID {geoid}")))
}

/// One bar series per category, one bar per group, for the region `geoid`.
pub fn bar_chart(
    params: &TableParameters,
    table: &TableData,
    year: u16,
    geoid: &str,
) -> Result<BarChart> {
    let row = region_row(table, geoid)?;
    let group_size = params.groups.len();
    let categories = &params.categories[first_detail(params.categories.len())..];
    let colors = generate_palette(categories.len());

    let series = categories
        .iter()
        .zip(colors)
        .enumerate()
        .map(|(i, (name, color))| {
            let block = params.offset + group_size * (i + first_detail(params.categories.len()));
            let bars = params
                .groups
                .iter()
                .enumerate()
                .skip(first_detail(group_size))
                .map(|(g, label)| (label.clone(), numeric_field(row, block + g).ok()))
                .collect();
            BarSeries {
                name: name.clone(),
                color,
                bars,
            }
        })
        .collect();

    let region = row.first().map(String::as_str).unwrap_or(geoid);
    Ok(BarChart {
        title: format!("{} - {region} ({year})", table_title(params)),
        series,
    })
}

/// One line per category for group `group` of the region `geoid` across
/// the loaded tables of a time series.
///
/// Years whose table lacks the region or a numeric value are skipped.
pub fn trend_chart(
    params: &TableParameters,
    series: &[(Arc<DatasetRecord>, Arc<TableData>)],
    geoid: &str,
    group: usize,
) -> Result<TrendChart> {
    let group_label = params
        .groups
        .get(group)
        .ok_or_else(|| AtlasError::missing_value(format!("table has no group {group}")))?;
    let group_size = params.groups.len();
    let first = first_detail(params.categories.len());
    let categories = &params.categories[first..];

    let mut lines: Vec<Vec<(u16, f64)>> = vec![Vec::new(); categories.len()];
    let mut region_name: Option<String> = None;
    let mut years: Vec<u16> = Vec::new();

    for (record, table) in series {
        let Ok(row) = region_row(table, geoid) else {
            info!("no data for GEOID {geoid} in {}", record.key);
            continue;
        };
        years.push(record.key.year);
        region_name = row.first().cloned().or(region_name);
        for (i, line) in lines.iter_mut().enumerate() {
            let column = params.offset + group + group_size * (first + i);
            if let Ok(value) = numeric_field(row, column) {
                line.push((record.key.year, value));
            }
        }
    }

    let span = match (years.iter().min(), years.iter().max()) {
        (Some(lo), Some(hi)) => format!("{lo}-{hi}"),
        _ => "no data".to_string(),
    };
    let colors = generate_palette(categories.len());
    let series = categories
        .iter()
        .zip(colors)
        .zip(lines)
        .map(|((name, color), points)| TrendSeries {
            name: name.clone(),
            color,
            points,
        })
        .collect();

    Ok(TrendChart {
        title: format!(
            "{} ({group_label}) - {} ({span})",
            table_title(params),
            region_name.as_deref().unwrap_or(geoid)
        ),
        y_label: params.groups.first().cloned().unwrap_or_default(),
        series,
    })
}
