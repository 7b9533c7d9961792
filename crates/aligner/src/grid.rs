use crate::error::AlignError;
use crate::table::{AlignedTable, AlignedTables};
use core_types::Value;
use executor::{BatchOutcome, BatchReport};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashSet};
use tracing::debug;

/// One ordered axis of a grid: the reply field that names the row or column, and the
/// labels to show in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GridAxis {
    pub key: String,
    pub labels: Vec<String>,
}

impl GridAxis {
    pub fn new(key: impl Into<String>, labels: Vec<String>) -> Result<Self, AlignError> {
        let mut seen = HashSet::new();
        for label in &labels {
            if !seen.insert(label.as_str()) {
                return Err(AlignError::DuplicateLabel(label.clone()));
            }
        }
        Ok(Self {
            key: key.into(),
            labels,
        })
    }

    fn position(&self, row: &BTreeMap<String, Value>) -> Option<usize> {
        let label = match row.get(&self.key)? {
            Value::Text(text) => text.clone(),
            Value::Number(n) => n.normalize().to_string(),
            Value::Bool(_) | Value::Missing => return None,
        };
        self.labels.iter().position(|l| *l == label)
    }
}

/// Pivots rows grouped by two keys into a single table.
///
/// Each reply row names its row and column through the two axis keys. Rows whose keys fall
/// outside either axis are dropped. Several values landing in one cell are averaged.
/// Every cell with no value stays `None`.
#[derive(Debug, Clone)]
pub struct GridAligner {
    value: String,
    rows: GridAxis,
    columns: GridAxis,
}

impl GridAligner {
    pub fn new(value: impl Into<String>, rows: GridAxis, columns: GridAxis) -> Result<Self, AlignError> {
        if rows.key == columns.key {
            return Err(AlignError::SameKey(rows.key));
        }
        Ok(Self {
            value: value.into(),
            rows,
            columns,
        })
    }

    pub fn align(&self, report: &BatchReport) -> AlignedTables {
        let mut sums: BTreeMap<(usize, usize), (Decimal, u32)> = BTreeMap::new();
        for outcome in report.outcomes() {
            let BatchOutcome::Success { table, .. } = outcome else {
                continue;
            };
            for row in table.rows() {
                let Some(value) = row.values.get(&self.value).and_then(Value::as_number) else {
                    continue;
                };
                match (self.rows.position(&row.values), self.columns.position(&row.values)) {
                    (Some(r), Some(c)) => {
                        let entry = sums.entry((r, c)).or_insert((Decimal::ZERO, 0));
                        entry.0 += value;
                        entry.1 += 1;
                    }
                    _ => debug!(label = %row.label, value = %self.value, "Dropping grid row outside the axes"),
                }
            }
        }

        let mut grid = AlignedTable::empty(
            self.value.clone(),
            self.rows.labels.clone(),
            self.columns.labels.clone(),
        );
        for ((r, c), (sum, count)) in sums {
            grid.set(r, c, sum / Decimal::from(count));
        }
        AlignedTables::new(vec![grid], report.submitted(), report.failed())
    }
}
