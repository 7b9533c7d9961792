//! CSV tables that drive the compilers: scoring fields, classification buckets and metrics.

use crate::error::ConfigError;
use core_types::{Aggregation, FieldSpec, FieldTable, FormulaTemplate, Side};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::io;
use std::path::Path;
use tracing::info;

/// One row of the scoring field table.
#[derive(Debug, Clone, Deserialize)]
struct FieldRow {
    field: String,
    current_name: String,
    current: FormulaTemplate,
    change_name: String,
    change: FormulaTemplate,
    #[serde(with = "rust_decimal::serde::str")]
    weight: Decimal,
    side: Side,
    score: String,
}

/// A `low_limit < x <= high_limit` bucket.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RangeBucketRow {
    #[serde(with = "rust_decimal::serde::str")]
    pub low_limit: Decimal,
    #[serde(with = "rust_decimal::serde::str")]
    pub high_limit: Decimal,
    pub label: String,
}

/// Maps a single rating to the bucket it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RatingRow {
    #[serde(alias = "sp_rtg")]
    pub rating: String,
    pub bucket: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MetricRow {
    pub name: String,
    pub formula: FormulaTemplate,
    #[serde(default)]
    pub aggregation: Option<Aggregation>,
}

/// Loads the scoring field table.
///
/// Each row yields a `Current` and a `Change` spec; `score_groups` are appended as `Score`
/// specs in the given order.
pub fn load_field_table(path: &Path, score_groups: &[String]) -> Result<FieldTable, ConfigError> {
    let rows: Vec<FieldRow> = read_path(path)?;
    let table = field_table_from_rows(rows, score_groups);
    info!(path = %path.display(), fields = table.len(), "Loaded field table");
    Ok(table)
}

pub fn read_field_table<R: io::Read>(
    reader: R,
    score_groups: &[String],
) -> Result<FieldTable, ConfigError> {
    let rows: Vec<FieldRow> = read_rows(reader, "<reader>")?;
    Ok(field_table_from_rows(rows, score_groups))
}

fn field_table_from_rows(rows: Vec<FieldRow>, score_groups: &[String]) -> FieldTable {
    let mut specs = Vec::with_capacity(rows.len() * 2 + score_groups.len());
    for row in rows {
        tracing::trace!(field = %row.field, "Reading field row");
        specs.push(FieldSpec::current(row.current_name, row.current));
        specs.push(FieldSpec::change(
            row.change_name,
            row.change,
            row.weight,
            row.side,
            row.score,
        ));
    }
    specs.extend(score_groups.iter().map(FieldSpec::score));
    FieldTable::new(specs)
}

pub fn load_range_buckets(path: &Path) -> Result<Vec<RangeBucketRow>, ConfigError> {
    let rows = read_path(path)?;
    info!(path = %path.display(), buckets = rows.len(), "Loaded range buckets");
    Ok(rows)
}

pub fn load_rating_table(path: &Path) -> Result<Vec<RatingRow>, ConfigError> {
    let rows = read_path(path)?;
    info!(path = %path.display(), mappings = rows.len(), "Loaded rating buckets");
    Ok(rows)
}

pub fn load_metrics(path: &Path) -> Result<Vec<MetricRow>, ConfigError> {
    let rows: Vec<MetricRow> = read_path(path)?;
    if rows.is_empty() {
        return Err(ConfigError::TableSchema {
            path: path.display().to_string(),
            reason: "at least one metric must be defined".to_string(),
        });
    }
    info!(path = %path.display(), metrics = rows.len(), "Loaded metric definitions");
    Ok(rows)
}

fn read_path<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>, ConfigError> {
    let source = path.display().to_string();
    let file = std::fs::File::open(path).map_err(|e| ConfigError::Table {
        path: source.clone(),
        source: csv::Error::from(e),
    })?;
    read_rows(file, &source)
}

fn read_rows<T: DeserializeOwned, R: io::Read>(reader: R, source: &str) -> Result<Vec<T>, ConfigError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);

    reader
        .deserialize()
        .collect::<Result<Vec<T>, csv::Error>>()
        .map_err(|source_err| ConfigError::Table {
            path: source.to_string(),
            source: source_err,
        })
}
