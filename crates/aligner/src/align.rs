use crate::error::AlignError;
use crate::table::{AlignedTable, AlignedTables};
use core_types::{ALL_LABEL, Provenance, ResultTable, Selection};
use executor::{BatchOutcome, BatchReport};
use rust_decimal::Decimal;
use std::collections::HashSet;
use tracing::debug;

/// Which provenance field picks a value's row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RowAxis {
    /// Rows are classification bucket labels, plus the synthetic "All" row.
    #[default]
    Selection,
    /// Rows are time-offset tags; the selection is ignored.
    Offset,
}

/// Reindexes the outcomes of a batch into one table per metric.
#[derive(Debug, Clone)]
pub struct ResultAligner {
    canonical: Vec<String>,
    axis: RowAxis,
}

impl ResultAligner {
    pub fn new(canonical: Vec<String>) -> Result<Self, AlignError> {
        let mut seen = HashSet::new();
        for label in &canonical {
            if !seen.insert(label.as_str()) {
                return Err(AlignError::DuplicateLabel(label.clone()));
            }
        }
        Ok(Self {
            canonical,
            axis: RowAxis::Selection,
        })
    }

    /// Aligns rows on time-offset tags, in the given order.
    pub fn on_offsets(tags: Vec<String>) -> Result<Self, AlignError> {
        Ok(Self {
            axis: RowAxis::Offset,
            ..Self::new(tags)?
        })
    }

    pub fn axis(&self) -> RowAxis {
        self.axis
    }

    pub fn align(&self, report: &BatchReport) -> AlignedTables {
        let outcomes = report.outcomes();

        let mut metrics: Vec<&str> = Vec::new();
        let mut columns: Vec<&str> = Vec::new();
        let mut has_all = false;
        for outcome in outcomes {
            let provenance = outcome.descriptor().provenance();
            for metric in &provenance.metrics {
                if !metrics.contains(&metric.as_str()) {
                    metrics.push(metric);
                }
            }
            if !columns.contains(&provenance.universe_label.as_str()) {
                columns.push(&provenance.universe_label);
            }
            has_all |= provenance.selection == Selection::All;
        }

        let mut rows = self.canonical.clone();
        if self.axis == RowAxis::Selection && has_all && !rows.iter().any(|r| r == ALL_LABEL) {
            rows.push(ALL_LABEL.to_string());
        }
        let columns: Vec<String> = columns.into_iter().map(String::from).collect();

        let mut tables: Vec<AlignedTable> = metrics
            .iter()
            .map(|metric| AlignedTable::empty(*metric, rows.clone(), columns.clone()))
            .collect();

        for outcome in outcomes {
            let BatchOutcome::Success { descriptor, table } = outcome else {
                continue;
            };
            let provenance = descriptor.provenance();
            let Some(column) = columns.iter().position(|c| *c == provenance.universe_label) else {
                continue;
            };
            for metric in &provenance.metrics {
                let Some(target) = tables.iter_mut().find(|t| t.metric == *metric) else {
                    continue;
                };
                for (label, value) in self.placements(provenance, table, metric) {
                    match rows.iter().position(|r| *r == label) {
                        Some(row) => {
                            if !target.fill(row, column, value) {
                                debug!(%label, column = %provenance.universe_label, %metric, "Cell already filled, keeping first value");
                            }
                        }
                        None => debug!(%label, %metric, request = %provenance, "Dropping row outside the canonical order"),
                    }
                }
            }
        }

        AlignedTables::new(tables, report.submitted(), report.failed())
    }

    /// The (row label, value) pairs one successful table contributes for `metric`.
    fn placements(&self, provenance: &Provenance, table: &ResultTable, metric: &str) -> Vec<(String, Decimal)> {
        let first = || {
            table
                .rows()
                .first()
                .and_then(|row| row.values.get(metric))
                .and_then(|value| value.as_number())
        };

        match (self.axis, &provenance.selection) {
            (RowAxis::Offset, _) => first()
                .map(|value| vec![(provenance.offset.clone(), value)])
                .unwrap_or_default(),
            (RowAxis::Selection, Selection::Bucket(label)) => first()
                .map(|value| vec![(label.clone(), value)])
                .unwrap_or_default(),
            (RowAxis::Selection, Selection::All) => first()
                .map(|value| vec![(ALL_LABEL.to_string(), value)])
                .unwrap_or_default(),
            (RowAxis::Selection, Selection::Grouped) => table
                .rows()
                .iter()
                .filter_map(|row| {
                    let value = row.values.get(metric)?.as_number()?;
                    Some((row.label.clone(), value))
                })
                .collect(),
        }
    }
}

/// Aligns `report` on classification labels in `canonical` order.
pub fn align(report: &BatchReport, canonical: &[String]) -> Result<AlignedTables, AlignError> {
    Ok(ResultAligner::new(canonical.to_vec())?.align(report))
}
