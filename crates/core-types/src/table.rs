use crate::expression::Value;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ResultRow {
    pub label: String,
    #[serde(default)]
    pub values: BTreeMap<String, Value>,
}

/// The tabular reply of the data service for one request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ResultTable {
    #[serde(default)]
    rows: Vec<ResultRow>,
}

impl ResultTable {
    pub fn new(rows: Vec<ResultRow>) -> Self {
        Self { rows }
    }

    /// A one-row table, the usual shape of an aggregated request.
    pub fn single(label: impl Into<String>, values: impl IntoIterator<Item = (String, Value)>) -> Self {
        Self::new(vec![ResultRow {
            label: label.into(),
            values: values.into_iter().collect(),
        }])
    }

    pub fn rows(&self) -> &[ResultRow] {
        &self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn value(&self, row: &str, column: &str) -> Option<&Value> {
        self.rows
            .iter()
            .find(|r| r.label == row)
            .and_then(|r| r.values.get(column))
    }

    pub fn number(&self, row: &str, column: &str) -> Option<Decimal> {
        self.value(row, column).and_then(Value::as_number)
    }
}
