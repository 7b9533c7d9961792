use configuration::{HeatmapConfig, HeatmapScope, ScreeningUniverseConfig};
use core_types::{Expression, Provenance, RequestDescriptor, Selection, Value};

use crate::screening::{filter, members};

/// Name of the service field holding the composite rating. Heatmap rows are its values.
pub const RATING_KEY: &str = "BB_COMPOSITE";
/// Name of the duration bucket binding. Heatmap columns are its values.
pub const DURATION_KEY: &str = "#duration_buckets";
/// Name of the averaged spread in the reply.
pub const AVG_SPREAD: &str = "#avg_spread";

fn financials() -> Expression {
    Expression::call(
        "classification_name",
        vec![Expression::text("BICS"), Expression::text("1")],
    )
}

/// Screening members restricted to the heatmap scope.
pub fn heatmap_universe(config: &ScreeningUniverseConfig, scope: HeatmapScope) -> Expression {
    let universe = members(config);
    match scope {
        HeatmapScope::All => universe,
        HeatmapScope::Financials => {
            filter(universe, financials().equals(Expression::text("Financials")))
        }
        HeatmapScope::ExFinancials => {
            filter(universe, financials().not_equals(Expression::text("Financials")))
        }
    }
}

fn list<T: std::fmt::Display>(items: impl IntoIterator<Item = T>) -> Expression {
    let parts: Vec<String> = items.into_iter().map(|item| item.to_string()).collect();
    Expression::formula(format!("[{}]", parts.join(",")))
}

/// One request averaging the spread over every (rating, duration bucket) pair.
///
/// The reply holds one row per pair that has bonds, carrying the rating under
/// [`RATING_KEY`], the bucket under [`DURATION_KEY`] and the average under [`AVG_SPREAD`].
/// Bonds without a duration bucket or a rating are left out.
pub fn heatmap_request(
    universe: &ScreeningUniverseConfig,
    heatmap: &HeatmapConfig,
    scope: HeatmapScope,
) -> RequestDescriptor {
    let bindings = vec![
        ("#duration".to_string(), Expression::formula("DURATION(fill=prev)")),
        ("#bins".to_string(), list(&heatmap.duration_bins)),
        (
            "#bin_names".to_string(),
            list(heatmap.duration_labels.iter().cloned().map(Value::Text)),
        ),
        (
            DURATION_KEY.to_string(),
            Expression::call(
                "bins",
                vec![
                    Expression::reference("#duration"),
                    Expression::reference("#bins"),
                    Expression::reference("#bin_names"),
                ],
            ),
        ),
    ];

    let spread = Expression::formula(format!(
        "SPREAD(SPREAD_TYPE={},fill=prev)",
        Value::Text(heatmap.spread_type.clone())
    ));
    let average = Expression::call(
        "AVG",
        vec![Expression::call(
            "GROUP",
            vec![spread, list([RATING_KEY, DURATION_KEY])],
        )],
    );

    let scope_label = match scope {
        HeatmapScope::All => "All",
        HeatmapScope::Financials => "Financials",
        HeatmapScope::ExFinancials => "Ex-Financials",
    };
    let rated = Expression::reference(DURATION_KEY)
        .not_equals(Expression::Literal(Value::Missing))
        .and(Expression::call("len", vec![Expression::reference(RATING_KEY)]).gt(Expression::number(0)));
    let provenance = Provenance {
        index: 0,
        classification: "Heatmap".to_string(),
        selection: Selection::Grouped,
        universe_name: "Heatmap".to_string(),
        universe_label: scope_label.to_string(),
        metrics: vec![AVG_SPREAD.to_string()],
        offset: "current".to_string(),
    };

    RequestDescriptor::new(
        format!("Heatmap | {scope_label}"),
        filter(heatmap_universe(universe, scope), rated),
        vec![(AVG_SPREAD.to_string(), average)],
        provenance,
    )
    .with_bindings(bindings)
}
