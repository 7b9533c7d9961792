use crate::error::CompileError;
use core_types::{Expression, FieldKind, FieldSpec, FieldTable, Periodicity, TemplateParams};
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::fmt;
use tracing::debug;

const CURRENT_PLACEHOLDERS: &[&str] = &["fpt", "periodicity"];
const CHANGE_PLACEHOLDERS: &[&str] = &["fpt", "periodicity", "lookback", "fpo", "period"];

/// Periodicity and lookback substituted into the field templates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScoringParams {
    pub periodicity: Periodicity,
    pub lookback: u32,
}

impl ScoringParams {
    fn current(&self) -> TemplateParams {
        TemplateParams::new()
            .with("fpt", self.periodicity.code())
            .with("periodicity", self.periodicity.code())
    }

    fn change(&self) -> TemplateParams {
        self.current()
            .with("lookback", self.lookback)
            .with("fpo", self.lookback)
            .with("period", self.periodicity.period_unit())
    }
}

/// A named expression bound in the `let` block of a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    pub name: String,
    pub kind: FieldKind,
    pub expression: Expression,
}

impl fmt::Display for Fragment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={};", self.name, self.expression)
    }
}

/// Fragments in binding order, unique by name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FragmentSet {
    fragments: Vec<Fragment>,
    positions: HashMap<String, usize>,
}

impl FragmentSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a fragment. A repeat with the same definition is absorbed; a repeat with a
    /// different definition is an error.
    pub fn insert(&mut self, fragment: Fragment) -> Result<(), CompileError> {
        if let Some(&position) = self.positions.get(&fragment.name) {
            if self.fragments[position].expression == fragment.expression {
                return Ok(());
            }
            return Err(CompileError::ConflictingFragment(fragment.name));
        }
        self.positions.insert(fragment.name.clone(), self.fragments.len());
        self.fragments.push(fragment);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Fragment> {
        self.positions.get(name).map(|&i| &self.fragments[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = &Fragment> + '_ {
        self.fragments.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.fragments.iter().map(|f| f.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    /// `(name, expression)` pairs for a request's `let` block.
    pub fn bindings(&self) -> Vec<(String, Expression)> {
        self.fragments
            .iter()
            .map(|f| (f.name.clone(), f.expression.clone()))
            .collect()
    }
}

impl fmt::Display for FragmentSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for fragment in &self.fragments {
            write!(f, "{fragment}")?;
        }
        Ok(())
    }
}

/// The normalized score of one group.
///
/// The numerator counts agreeing change fields while the normalizer sums their weights, so
/// the score only stays within `[0, 1]` when every weight is at least one. Two agreeing fields
/// of weight 0.5 score 2.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoreDefinition {
    pub group: String,
    pub expression: Expression,
    /// Sum of the weights of the group's change fields.
    pub normalizer: Decimal,
    /// Change fields contributing to the score, in table order.
    pub members: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledScoring {
    pub current: Vec<Fragment>,
    pub change: Vec<Fragment>,
    pub scores: Vec<ScoreDefinition>,
    /// True for entities whose score is positive in every group.
    pub pass_filter: Expression,
    /// current, change and score fragments merged in that order.
    pub fragments: FragmentSet,
}

impl CompiledScoring {
    pub fn normalizer(&self, group: &str) -> Option<Decimal> {
        self.scores
            .iter()
            .find(|score| score.group == group)
            .map(|score| score.normalizer)
    }

    pub fn groups(&self) -> impl Iterator<Item = &str> + '_ {
        self.scores.iter().map(|score| score.group.as_str())
    }
}

/// Compiles a `FieldTable` into current, change and score fragments plus a pass filter.
pub struct ScoringQueryCompiler {
    params: ScoringParams,
}

impl ScoringQueryCompiler {
    pub fn new(params: ScoringParams) -> Self {
        Self { params }
    }

    /// Validates the whole table first; either every fragment compiles or none is returned.
    pub fn compile(&self, table: &FieldTable) -> Result<CompiledScoring, CompileError> {
        let groups = declared_groups(table)?;
        let change_specs: Vec<&FieldSpec> = table.of_kind(FieldKind::Change).collect();

        for spec in table.specs() {
            if spec.weight < Decimal::ZERO {
                return Err(CompileError::NegativeWeight {
                    field: spec.name.clone(),
                    weight: spec.weight,
                });
            }
        }
        for spec in &change_specs {
            let group = spec
                .group
                .as_deref()
                .ok_or_else(|| CompileError::MissingGroup(spec.name.clone()))?;
            if !groups.iter().any(|g| g == group) {
                return Err(CompileError::UndeclaredGroup {
                    field: spec.name.clone(),
                    group: group.to_string(),
                });
            }
        }

        let current_params = self.params.current();
        let current = table
            .of_kind(FieldKind::Current)
            .map(|spec| render(spec, CURRENT_PLACEHOLDERS, &current_params))
            .collect::<Result<Vec<_>, _>>()?;

        let change_params = self.params.change();
        let change = change_specs
            .iter()
            .map(|spec| render(spec, CHANGE_PLACEHOLDERS, &change_params))
            .collect::<Result<Vec<_>, _>>()?;

        let scores = groups
            .iter()
            .map(|group| score_definition(group, &change_specs))
            .collect::<Result<Vec<_>, _>>()?;

        let pass_filter = Expression::all(
            scores
                .iter()
                .map(|score| Expression::reference(score.group.clone()).gt(Expression::number(Decimal::ZERO))),
        );

        let mut fragments = FragmentSet::new();
        for fragment in current.iter().chain(change.iter()) {
            fragments.insert(fragment.clone())?;
        }
        for score in &scores {
            fragments.insert(Fragment {
                name: score.group.clone(),
                kind: FieldKind::Score,
                expression: score.expression.clone(),
            })?;
        }

        debug!(
            current = current.len(),
            change = change.len(),
            groups = scores.len(),
            fragments = fragments.len(),
            "Compiled scoring query"
        );

        Ok(CompiledScoring {
            current,
            change,
            scores,
            pass_filter,
            fragments,
        })
    }
}

/// Score groups in declaration order.
fn declared_groups(table: &FieldTable) -> Result<Vec<String>, CompileError> {
    let mut groups: Vec<String> = Vec::new();
    for spec in table.of_kind(FieldKind::Score) {
        let group = spec.group.clone().unwrap_or_else(|| spec.name.clone());
        if groups.contains(&group) {
            return Err(CompileError::DuplicateScore(group));
        }
        groups.push(group);
    }
    Ok(groups)
}

fn render(
    spec: &FieldSpec,
    allowed: &[&str],
    params: &TemplateParams,
) -> Result<Fragment, CompileError> {
    let template = spec
        .template
        .as_ref()
        .ok_or_else(|| CompileError::MissingFormula(spec.name.clone()))?;
    template.check_placeholders(allowed)?;
    Ok(Fragment {
        name: spec.name.clone(),
        kind: spec.kind,
        expression: template.render(params)?,
    })
}

/// `(Σ if(change*weight*side>0,1,0)) / Σ weight` over the group's change fields.
fn score_definition(group: &str, change_specs: &[&FieldSpec]) -> Result<ScoreDefinition, CompileError> {
    let members: Vec<&FieldSpec> = change_specs
        .iter()
        .copied()
        .filter(|spec| spec.group.as_deref() == Some(group))
        .collect();

    let normalizer: Decimal = members.iter().map(|spec| spec.weight).sum();
    if normalizer.is_zero() {
        return Err(CompileError::ZeroWeightGroup(group.to_string()));
    }

    let indicators = members.iter().map(|spec| {
        let agreement = Expression::reference(spec.name.clone())
            * Expression::number(spec.weight)
            * Expression::number(spec.side.sign());
        Expression::if_then_else(
            agreement.gt(Expression::number(Decimal::ZERO)),
            Expression::number(Decimal::ONE),
            Expression::number(Decimal::ZERO),
        )
    });
    let expression = Expression::sum(indicators) / Expression::number(normalizer);

    Ok(ScoreDefinition {
        group: group.to_string(),
        expression,
        normalizer,
        members: members.iter().map(|spec| spec.name.clone()).collect(),
    })
}
