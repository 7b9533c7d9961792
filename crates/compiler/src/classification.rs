use crate::error::CompileError;
use configuration::{RangeBucketRow, RatingRow};
use core_types::{Environment, EvalError, Expression, Value};
use rust_decimal::Decimal;
use tracing::debug;

/// The condition half of a `ClassificationRule`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Predicate {
    /// `low < x <= high`
    Range { low: Decimal, high: Decimal },
    /// `x ∈ values`
    Membership { values: Vec<Value> },
}

impl Predicate {
    fn condition(&self, subject: &Expression) -> Expression {
        match self {
            Predicate::Range { low, high } => subject
                .clone()
                .gt(Expression::number(*low))
                .and(subject.clone().le(Expression::number(*high))),
            Predicate::Membership { values } => subject.clone().is_in(values.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassificationRule {
    predicate: Predicate,
    label: String,
}

impl ClassificationRule {
    pub fn range(low: Decimal, high: Decimal, label: impl Into<String>) -> Result<Self, CompileError> {
        let label = checked_label(label.into())?;
        if low >= high {
            return Err(CompileError::InvalidRule {
                label,
                reason: format!("lower bound {low} is not below upper bound {high}"),
            });
        }
        Ok(Self {
            predicate: Predicate::Range { low, high },
            label,
        })
    }

    pub fn membership(values: Vec<Value>, label: impl Into<String>) -> Result<Self, CompileError> {
        let label = checked_label(label.into())?;
        if values.is_empty() {
            return Err(CompileError::InvalidRule {
                label,
                reason: "membership list is empty".to_string(),
            });
        }
        Ok(Self {
            predicate: Predicate::Membership { values },
            label,
        })
    }

    pub fn predicate(&self) -> &Predicate {
        &self.predicate
    }

    pub fn label(&self) -> &str {
        &self.label
    }
}

fn checked_label(label: String) -> Result<String, CompileError> {
    if label.trim().is_empty() {
        return Err(CompileError::InvalidRule {
            label,
            reason: "label is empty".to_string(),
        });
    }
    Ok(label)
}

/// Range rules in table order.
pub fn range_rules(rows: &[RangeBucketRow]) -> Result<Vec<ClassificationRule>, CompileError> {
    rows.iter()
        .map(|row| ClassificationRule::range(row.low_limit, row.high_limit, row.label.clone()))
        .collect()
}

/// Collapses `rating -> bucket` rows into one membership rule per bucket.
///
/// Buckets keep the order in which they first appear; ratings keep their row order.
pub fn membership_rules(rows: &[RatingRow]) -> Result<Vec<ClassificationRule>, CompileError> {
    let mut buckets: Vec<(&str, Vec<Value>)> = Vec::new();
    for row in rows {
        let rating = Value::Text(row.rating.clone());
        match buckets.iter_mut().find(|(bucket, _)| *bucket == row.bucket) {
            Some((_, values)) => values.push(rating),
            None => buckets.push((row.bucket.as_str(), vec![rating])),
        }
    }
    buckets
        .into_iter()
        .map(|(bucket, values)| ClassificationRule::membership(values, bucket))
        .collect()
}

/// A compiled classification axis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    name: String,
    expression: Expression,
    labels: Vec<String>,
}

impl Classification {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Evaluates to the label of the first matching rule, or the fallback.
    pub fn expression(&self) -> &Expression {
        &self.expression
    }

    /// Canonical label order: rule labels in table order without repeats, then the fallback.
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Classifies one entity locally.
    pub fn classify(&self, env: &dyn Environment) -> Result<String, EvalError> {
        match self.expression.eval(env)? {
            Value::Text(label) => Ok(label),
            other => Err(EvalError::TypeMismatch {
                op: "classify",
                lhs: "label",
                rhs: other.type_name(),
            }),
        }
    }
}

/// Turns an ordered rule list into one nested conditional expression over `subject`.
#[derive(Debug, Clone)]
pub struct ClassificationExpressionBuilder {
    name: String,
    subject: Expression,
}

impl ClassificationExpressionBuilder {
    pub fn new(name: impl Into<String>, subject: Expression) -> Self {
        Self {
            name: name.into(),
            subject,
        }
    }

    /// Builds `if(p0,l0,if(p1,l1,...,fallback))`.
    ///
    /// Rules are tried in order and the first match wins, so a later rule whose predicate
    /// repeats an earlier one can never be selected.
    pub fn build(
        &self,
        rules: &[ClassificationRule],
        fallback: &str,
    ) -> Result<Classification, CompileError> {
        if fallback.trim().is_empty() {
            return Err(CompileError::EmptyFallback(self.name.clone()));
        }

        let expression = rules
            .iter()
            .rfold(Expression::text(fallback), |otherwise, rule| {
                Expression::if_then_else(
                    rule.predicate.condition(&self.subject),
                    Expression::text(rule.label.clone()),
                    otherwise,
                )
            });

        let mut labels: Vec<String> = Vec::with_capacity(rules.len() + 1);
        for label in rules.iter().map(|r| r.label.as_str()).chain(std::iter::once(fallback)) {
            if !labels.iter().any(|l| l == label) {
                labels.push(label.to_string());
            }
        }

        debug!(classification = %self.name, rules = rules.len(), %expression, "Built classification");
        Ok(Classification {
            name: self.name.clone(),
            expression,
            labels,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;
    use std::collections::BTreeMap;

    fn years(value: Decimal) -> BTreeMap<String, Value> {
        BTreeMap::from([("years".to_string(), Value::Number(value))])
    }

    fn maturity_rules() -> Vec<ClassificationRule> {
        vec![
            ClassificationRule::range(dec!(0), dec!(5), "0-5").unwrap(),
            ClassificationRule::range(dec!(5), dec!(10), "5-10").unwrap(),
        ]
    }

    #[test]
    fn empty_rule_list_is_the_fallback_literal() {
        let builder = ClassificationExpressionBuilder::new("Maturity", Expression::reference("years"));
        let classification = builder.build(&[], "other").unwrap();
        assert_eq!(classification.expression(), &Expression::text("other"));
        assert_eq!(classification.labels(), ["other"]);
    }

    #[test]
    fn renders_nested_conditionals() {
        let builder = ClassificationExpressionBuilder::new("Maturity", Expression::reference("years"));
        let classification = builder.build(&maturity_rules(), "10+").unwrap();
        assert_eq!(
            classification.expression().to_string(),
            "if(years>0 AND years<=5,'0-5',if(years>5 AND years<=10,'5-10','10+'))"
        );
        assert_eq!(classification.labels(), ["0-5", "5-10", "10+"]);
    }

    #[test]
    fn range_bounds_are_open_below_and_closed_above() {
        let builder = ClassificationExpressionBuilder::new("Maturity", Expression::reference("years"));
        let classification = builder.build(&maturity_rules(), "10+").unwrap();

        assert_eq!(classification.classify(&years(dec!(5))).unwrap(), "0-5");
        assert_eq!(classification.classify(&years(dec!(5.01))).unwrap(), "5-10");
        assert_eq!(classification.classify(&years(dec!(0))).unwrap(), "10+");
        assert_eq!(classification.classify(&years(dec!(30))).unwrap(), "10+");

        let missing = BTreeMap::from([("years".to_string(), Value::Missing)]);
        assert_eq!(classification.classify(&missing).unwrap(), "10+");
    }

    #[test]
    fn identical_predicates_resolve_to_the_earlier_rule() {
        let rules = vec![
            ClassificationRule::range(dec!(0), dec!(5), "first").unwrap(),
            ClassificationRule::range(dec!(0), dec!(5), "second").unwrap(),
        ];
        let builder = ClassificationExpressionBuilder::new("Maturity", Expression::reference("years"));
        let classification = builder.build(&rules, "other").unwrap();
        assert_eq!(classification.classify(&years(dec!(3))).unwrap(), "first");
    }

    #[test]
    fn rejects_invalid_rules() {
        assert!(matches!(
            ClassificationRule::range(dec!(5), dec!(5), "x"),
            Err(CompileError::InvalidRule { .. })
        ));
        assert!(ClassificationRule::range(dec!(0), dec!(5), " ").is_err());
        assert!(ClassificationRule::membership(vec![], "AA").is_err());

        let builder = ClassificationExpressionBuilder::new("Rating", Expression::reference("rating"));
        assert_eq!(
            builder.build(&[], "").unwrap_err(),
            CompileError::EmptyFallback("Rating".to_string())
        );
    }

    #[test]
    fn rating_rows_collapse_into_membership_rules() {
        let rows: Vec<RatingRow> = [("AAA", "AAA"), ("AA+", "AA"), ("BBB", "BBB"), ("AA", "AA")]
            .into_iter()
            .map(|(rating, bucket)| RatingRow {
                rating: rating.to_string(),
                bucket: bucket.to_string(),
            })
            .collect();
        let rules = membership_rules(&rows).unwrap();

        let labels: Vec<_> = rules.iter().map(ClassificationRule::label).collect();
        assert_eq!(labels, vec!["AAA", "AA", "BBB"]);
        assert_eq!(
            rules[1].predicate(),
            &Predicate::Membership {
                values: vec![Value::from("AA+"), Value::from("AA")]
            }
        );

        let builder = ClassificationExpressionBuilder::new("Rating", Expression::reference("rating"));
        let classification = builder.build(&rules, "unrated").unwrap();
        let env = BTreeMap::from([("rating".to_string(), Value::from("AA"))]);
        assert_eq!(classification.classify(&env).unwrap(), "AA");
        let env = BTreeMap::from([("rating".to_string(), Value::from("CCC"))]);
        assert_eq!(classification.classify(&env).unwrap(), "unrated");
    }

    #[test]
    fn repeated_labels_appear_once_in_canonical_order() {
        let rules = vec![
            ClassificationRule::range(dec!(0), dec!(1), "short").unwrap(),
            ClassificationRule::range(dec!(1), dec!(3), "mid").unwrap(),
            ClassificationRule::range(dec!(3), dec!(4), "short").unwrap(),
        ];
        let builder = ClassificationExpressionBuilder::new("Maturity", Expression::reference("years"));
        let classification = builder.build(&rules, "mid").unwrap();
        assert_eq!(classification.labels(), ["short", "mid"]);
    }

    fn linear_first_match(rules: &[(i64, i64)], x: i64) -> String {
        rules
            .iter()
            .enumerate()
            .find(|(_, (low, high))| *low < x && x <= *high)
            .map(|(i, _)| format!("r{i}"))
            .unwrap_or_else(|| "fallback".to_string())
    }

    proptest! {
        #[test]
        fn nested_expression_matches_linear_first_match(
            bounds in prop::collection::vec((-20i64..20, 1i64..15), 0..8),
            x in -25i64..40,
        ) {
            let rules: Vec<(i64, i64)> = bounds.iter().map(|(low, width)| (*low, low + width)).collect();
            let compiled: Vec<ClassificationRule> = rules
                .iter()
                .enumerate()
                .map(|(i, (low, high))| {
                    ClassificationRule::range(Decimal::from(*low), Decimal::from(*high), format!("r{i}")).unwrap()
                })
                .collect();
            let builder = ClassificationExpressionBuilder::new("Axis", Expression::reference("years"));
            let classification = builder.build(&compiled, "fallback").unwrap();

            let label = classification.classify(&years(Decimal::from(x))).unwrap();
            prop_assert_eq!(label, linear_first_match(&rules, x));
        }
    }
}
