use rust_decimal::Decimal;
use serde::Serialize;

/// One metric's values reindexed to a fixed row and column order.
///
/// Every (row, column) pair has a cell. A cell with no successful value behind it is
/// `None`; it is never omitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AlignedTable {
    pub metric: String,
    pub rows: Vec<String>,
    pub columns: Vec<String>,
    cells: Vec<Vec<Option<Decimal>>>,
}

impl AlignedTable {
    pub(crate) fn empty(metric: impl Into<String>, rows: Vec<String>, columns: Vec<String>) -> Self {
        let cells = vec![vec![None; columns.len()]; rows.len()];
        Self {
            metric: metric.into(),
            rows,
            columns,
            cells,
        }
    }

    /// Stores `value` unless the cell is already filled. Returns whether it was stored.
    pub(crate) fn fill(&mut self, row: usize, column: usize, value: Decimal) -> bool {
        match self.cells.get_mut(row).and_then(|r| r.get_mut(column)) {
            Some(cell @ None) => {
                *cell = Some(value);
                true
            }
            _ => false,
        }
    }

    /// Stores `value`, replacing whatever the cell held.
    pub(crate) fn set(&mut self, row: usize, column: usize, value: Decimal) {
        if let Some(cell) = self.cells.get_mut(row).and_then(|r| r.get_mut(column)) {
            *cell = Some(value);
        }
    }

    pub fn cell(&self, row: &str, column: &str) -> Option<Decimal> {
        let r = self.rows.iter().position(|label| label == row)?;
        let c = self.columns.iter().position(|label| label == column)?;
        self.cells[r][c]
    }

    /// Cells in row-major order, one inner vector per row.
    pub fn cells(&self) -> &[Vec<Option<Decimal>>] {
        &self.cells
    }

    pub fn empty_cells(&self) -> usize {
        self.cells.iter().flatten().filter(|cell| cell.is_none()).count()
    }
}

/// Every aligned table of one batch, keyed by metric in first-submission order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AlignedTables {
    tables: Vec<AlignedTable>,
    submitted: usize,
    failed: usize,
}

impl AlignedTables {
    pub(crate) fn new(tables: Vec<AlignedTable>, submitted: usize, failed: usize) -> Self {
        Self {
            tables,
            submitted,
            failed,
        }
    }

    pub fn get(&self, metric: &str) -> Option<&AlignedTable> {
        self.tables.iter().find(|table| table.metric == metric)
    }

    pub fn iter(&self) -> impl Iterator<Item = &AlignedTable> {
        self.tables.iter()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn submitted(&self) -> usize {
        self.submitted
    }

    /// Number of requests in the batch that produced no table.
    pub fn failed(&self) -> usize {
        self.failed
    }
}
