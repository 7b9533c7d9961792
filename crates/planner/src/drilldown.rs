use crate::batch::{ComparisonUniverse, MetricDefinition, TimeOffset, ensure_unique};
use crate::error::PlanError;
use compiler::{Classification, filter};
use core_types::{Expression, Provenance, RequestDescriptor, Selection};
use tracing::debug;

fn service_field(name: &str) -> Expression {
    Expression::call(name, vec![])
}

fn usd_amount() -> Expression {
    Expression::formula("amt_outstanding(currency='USD')")
}

/// The bonds behind one cell of a peer comparison, listed one row per security.
///
/// The universe is narrowed to the bucket (when one is given) and then to the `limit`
/// largest bonds by USD amount outstanding.
#[derive(Debug, Clone)]
pub struct DrilldownQuery {
    limit: u32,
    offset: TimeOffset,
}

impl DrilldownQuery {
    pub fn new(limit: u32) -> Result<Self, PlanError> {
        if limit == 0 {
            return Err(PlanError::ZeroLimit);
        }
        Ok(Self {
            limit,
            offset: TimeOffset::current(),
        })
    }

    /// Evaluates every metric at `offset` instead of today.
    pub fn at_offset(mut self, offset: TimeOffset) -> Self {
        self.offset = offset;
        self
    }

    pub fn build(
        &self,
        classification: &Classification,
        bucket: Option<&str>,
        universe: &ComparisonUniverse,
        metrics: &[MetricDefinition],
    ) -> Result<RequestDescriptor, PlanError> {
        let selection = match bucket {
            Some(label) if classification.labels().iter().any(|l| l == label) => {
                Selection::Bucket(label.to_string())
            }
            Some(label) => {
                return Err(PlanError::UnknownBucket {
                    classification: classification.name().to_string(),
                    label: label.to_string(),
                });
            }
            None => Selection::All,
        };

        let mut scope = universe.expression.clone();
        if let Selection::Bucket(label) = &selection {
            scope = filter(
                scope,
                classification.expression().clone().equals(Expression::text(label.clone())),
            );
        }
        let ranked = Expression::call("grouprank", vec![usd_amount()]);
        let scope = filter(scope, ranked.le(Expression::number(self.limit)));

        let mut fields = vec![
            ("Name".to_string(), service_field("name")),
            ("Ticker".to_string(), service_field("ticker")),
        ];
        for metric in metrics {
            fields.push((metric.name.clone(), metric.at(&self.offset)?));
        }
        fields.extend([
            (
                "Years to mat".to_string(),
                (service_field("maturity") - service_field("today")) / Expression::number(365),
            ),
            (
                "Amt Out (M)".to_string(),
                Expression::formula("amt_outstanding(currency='USD').value")
                    / Expression::number(1_000_000),
            ),
            ("Currency".to_string(), service_field("crncy")),
            ("Coupon Type".to_string(), service_field("cpn_typ")),
            ("Payment Rank".to_string(), service_field("payment_rank")),
        ]);
        ensure_unique(fields.iter().map(|(name, _)| name.as_str()), PlanError::DuplicateMetric)?;

        let provenance = Provenance {
            index: 0,
            classification: classification.name().to_string(),
            selection: selection.clone(),
            universe_name: universe.name.clone(),
            universe_label: universe.label.clone(),
            metrics: metrics.iter().map(|m| m.name.clone()).collect(),
            offset: self.offset.tag.clone(),
        };
        debug!(%provenance, limit = self.limit, "Planned drilldown");
        Ok(RequestDescriptor::new(
            format!("Drilldown | {selection} | {}", universe.label),
            scope,
            fields,
            provenance,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use compiler::{ClassificationExpressionBuilder, ClassificationRule};
    use core_types::{Aggregation, FormulaTemplate};
    use rust_decimal_macros::dec;

    fn classification() -> Classification {
        let rules = vec![ClassificationRule::range(dec!(0), dec!(5), "0-5").unwrap()];
        ClassificationExpressionBuilder::new("Maturity Bucket", Expression::reference("years"))
            .build(&rules, "5+")
            .unwrap()
    }

    fn universe() -> ComparisonUniverse {
        ComparisonUniverse::new("Sector", "Industrials", Expression::reference("U1"))
    }

    fn metrics() -> Vec<MetricDefinition> {
        vec![
            MetricDefinition::new(
                "OAS",
                FormulaTemplate::parse("spread(spread_type='OAS',dates={offset}).value").unwrap(),
                Aggregation::Avg,
            )
            .unwrap(),
        ]
    }

    #[test]
    fn lists_the_largest_bonds_of_a_bucket() {
        let request = DrilldownQuery::new(25)
            .unwrap()
            .build(&classification(), Some("0-5"), &universe(), &metrics())
            .unwrap();

        assert_eq!(
            request.universe().to_string(),
            "filter(filter(U1,if(years>0 AND years<=5,'0-5','5+')=='0-5'),\
grouprank(amt_outstanding(currency='USD'))<=25)"
        );
        let names: Vec<_> = request.fields().iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(
            names,
            vec!["Name", "Ticker", "OAS", "Years to mat", "Amt Out (M)", "Currency", "Coupon Type", "Payment Rank"]
        );
        assert_eq!(request.fields()[2].1.to_string(), "spread(spread_type='OAS',dates=-0D).value");
        assert_eq!(request.fields()[3].1.to_string(), "(maturity()-today())/365");
        assert_eq!(
            request.fields()[4].1.to_string(),
            "(amt_outstanding(currency='USD').value)/1000000"
        );
        assert_eq!(request.provenance().selection, Selection::Bucket("0-5".to_string()));
    }

    #[test]
    fn without_a_bucket_only_the_rank_filter_applies() {
        let request = DrilldownQuery::new(100)
            .unwrap()
            .at_offset(TimeOffset::new("-1M", "-1M"))
            .build(&classification(), None, &universe(), &metrics())
            .unwrap();
        assert_eq!(
            request.universe().to_string(),
            "filter(U1,grouprank(amt_outstanding(currency='USD'))<=100)"
        );
        assert_eq!(request.fields()[2].1.to_string(), "spread(spread_type='OAS',dates=-1M).value");
        assert_eq!(request.provenance().selection, Selection::All);
        assert_eq!(request.provenance().offset, "-1M");
    }

    #[test]
    fn rejects_bad_requests() {
        assert_eq!(DrilldownQuery::new(0).unwrap_err(), PlanError::ZeroLimit);

        let query = DrilldownQuery::new(10).unwrap();
        assert!(matches!(
            query.build(&classification(), Some("30+"), &universe(), &metrics()),
            Err(PlanError::UnknownBucket { .. })
        ));

        let clashing = vec![
            MetricDefinition::new("Ticker", FormulaTemplate::parse("ticker()").unwrap(), Aggregation::Avg)
                .unwrap(),
        ];
        assert_eq!(
            query.build(&classification(), None, &universe(), &clashing).unwrap_err(),
            PlanError::DuplicateMetric("Ticker".to_string())
        );
    }
}
