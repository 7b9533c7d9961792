use crate::error::PlanError;
use compiler::{Classification, filter};
use configuration::MetricRow;
use core_types::{
    Aggregation, Expression, FormulaTemplate, Provenance, RequestDescriptor, Selection,
    TemplateParams,
};
use itertools::iproduct;
use std::collections::HashSet;
use tracing::info;

/// A named universe that metrics are aggregated over.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComparisonUniverse {
    /// Kind of universe, e.g. "Sector".
    pub name: String,
    /// Display label and output column, e.g. "Industrials".
    pub label: String,
    pub expression: Expression,
}

impl ComparisonUniverse {
    pub fn new(name: impl Into<String>, label: impl Into<String>, expression: Expression) -> Self {
        Self {
            name: name.into(),
            label: label.into(),
            expression,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimeOffset {
    pub tag: String,
    pub value: String,
}

impl TimeOffset {
    pub fn new(tag: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            value: value.into(),
        }
    }

    /// The as-of-today offset used when no offsets are requested.
    pub fn current() -> Self {
        Self::new("current", "-0D")
    }

    /// Offsets tagged by their own value, e.g. "-1M".
    pub fn from_values(values: &[String]) -> Vec<Self> {
        values.iter().map(|v| Self::new(v.clone(), v.clone())).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetricDefinition {
    pub name: String,
    template: FormulaTemplate,
    pub aggregation: Aggregation,
}

impl MetricDefinition {
    pub fn new(
        name: impl Into<String>,
        template: FormulaTemplate,
        aggregation: Aggregation,
    ) -> Result<Self, PlanError> {
        let name = name.into();
        template
            .check_placeholders(&["offset"])
            .map_err(|source| PlanError::InvalidMetric {
                name: name.clone(),
                source,
            })?;
        Ok(Self {
            name,
            template,
            aggregation,
        })
    }

    pub fn from_row(row: &MetricRow) -> Result<Self, PlanError> {
        Self::new(
            row.name.clone(),
            row.formula.clone(),
            row.aggregation.unwrap_or_default(),
        )
    }

    pub fn depends_on_offset(&self) -> bool {
        self.template.placeholders().next().is_some()
    }

    /// The per-security metric with the offset substituted.
    pub fn at(&self, offset: &TimeOffset) -> Result<Expression, PlanError> {
        self.template
            .render(&TemplateParams::new().with("offset", &offset.value))
            .map_err(|source| PlanError::InvalidMetric {
                name: self.name.clone(),
                source,
            })
    }

    /// `agg(group(metric[, by]))` with the offset substituted.
    pub fn aggregated(&self, offset: &TimeOffset, by: Option<&Expression>) -> Result<Expression, PlanError> {
        let mut group_args = vec![self.at(offset)?];
        group_args.extend(by.cloned());
        Ok(Expression::call(
            self.aggregation.function_name(),
            vec![Expression::call("group", group_args)],
        ))
    }
}

/// Expands classification × universe × metric × offset into independent requests.
#[derive(Debug, Clone)]
pub struct RequestBatchBuilder {
    include_all: bool,
    grouped: bool,
    selections: Option<Vec<Selection>>,
}

impl Default for RequestBatchBuilder {
    fn default() -> Self {
        Self {
            include_all: true,
            grouped: false,
            selections: None,
        }
    }
}

impl RequestBatchBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds one unfiltered request per universe, reported as the "All" row.
    pub fn include_all(mut self, include_all: bool) -> Self {
        self.include_all = include_all;
        self
    }

    /// Replaces the per-bucket requests with one request grouped by the classification.
    pub fn grouped(mut self, grouped: bool) -> Self {
        self.grouped = grouped;
        self
    }

    /// Requests exactly these selections instead of deriving them from the classification.
    pub fn with_selections(mut self, selections: Vec<Selection>) -> Self {
        self.selections = Some(selections);
        self
    }

    fn selections(&self, classification: &Classification) -> Result<Vec<Selection>, PlanError> {
        if let Some(selections) = &self.selections {
            for selection in selections {
                if let Selection::Bucket(label) = selection {
                    if !classification.labels().contains(label) {
                        return Err(PlanError::UnknownBucket {
                            classification: classification.name().to_string(),
                            label: label.clone(),
                        });
                    }
                }
            }
            return Ok(selections.clone());
        }

        let mut selections: Vec<Selection> = if self.grouped {
            vec![Selection::Grouped]
        } else {
            classification
                .labels()
                .iter()
                .cloned()
                .map(Selection::Bucket)
                .collect()
        };
        if self.include_all {
            selections.push(Selection::All);
        }
        Ok(selections)
    }

    /// Builds one descriptor per selection × universe × metric × offset, in that nesting
    /// order. An empty offset list means the single current offset.
    pub fn build(
        &self,
        classification: &Classification,
        universes: &[ComparisonUniverse],
        metrics: &[MetricDefinition],
        offsets: &[TimeOffset],
    ) -> Result<Vec<RequestDescriptor>, PlanError> {
        if universes.is_empty() {
            return Err(PlanError::EmptyAxis("universe"));
        }
        if metrics.is_empty() {
            return Err(PlanError::EmptyAxis("metric"));
        }
        ensure_unique(universes.iter().map(|u| u.label.as_str()), PlanError::DuplicateUniverse)?;
        ensure_unique(metrics.iter().map(|m| m.name.as_str()), PlanError::DuplicateMetric)?;

        let default_offsets = [TimeOffset::current()];
        let offsets = if offsets.is_empty() {
            &default_offsets[..]
        } else {
            offsets
        };
        ensure_unique(offsets.iter().map(|o| o.tag.as_str()), PlanError::DuplicateOffset)?;
        if offsets.len() > 1 {
            if let Some(metric) = metrics.iter().find(|m| !m.depends_on_offset()) {
                return Err(PlanError::OffsetInsensitive(metric.name.clone()));
            }
        }

        let selections = self.selections(classification)?;
        let mut descriptors = Vec::with_capacity(selections.len() * universes.len() * metrics.len() * offsets.len());

        for (index, (selection, universe, metric, offset)) in
            iproduct!(selections.iter(), universes.iter(), metrics.iter(), offsets.iter()).enumerate()
        {
            let (scope, group_by) = match selection {
                Selection::Bucket(label) => (
                    filter(
                        universe.expression.clone(),
                        classification.expression().clone().equals(Expression::text(label.clone())),
                    ),
                    None,
                ),
                Selection::All => (universe.expression.clone(), None),
                Selection::Grouped => (universe.expression.clone(), Some(classification.expression())),
            };

            let field = metric.aggregated(offset, group_by)?;
            let provenance = Provenance {
                index,
                classification: classification.name().to_string(),
                selection: selection.clone(),
                universe_name: universe.name.clone(),
                universe_label: universe.label.clone(),
                metrics: vec![metric.name.clone()],
                offset: offset.tag.clone(),
            };
            let label = format!("{selection} | {} | {} | {}", universe.label, metric.name, offset.tag);
            descriptors.push(RequestDescriptor::new(
                label,
                scope,
                vec![(metric.name.clone(), field)],
                provenance,
            ));
        }

        info!(
            classification = classification.name(),
            selections = selections.len(),
            universes = universes.len(),
            metrics = metrics.len(),
            offsets = offsets.len(),
            requests = descriptors.len(),
            "Planned request batch"
        );
        Ok(descriptors)
    }
}

pub(crate) fn ensure_unique<'a>(
    names: impl Iterator<Item = &'a str>,
    error: fn(String) -> PlanError,
) -> Result<(), PlanError> {
    let mut seen = HashSet::new();
    for name in names {
        if !seen.insert(name) {
            return Err(error(name.to_string()));
        }
    }
    Ok(())
}
