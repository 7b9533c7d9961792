use crate::scoring::CompiledScoring;
use configuration::{ScreeningUniverseConfig, SpreadSide};
use core_types::{Expression, Provenance, RequestDescriptor, Selection, Value};
use rust_decimal::Decimal;
use std::fmt;

pub const ISSUER: &str = "#issuer";
pub const NAME: &str = "#name";

/// Members of the configured index, or of the portfolio when `portfolio_only` is set.
pub fn members(config: &ScreeningUniverseConfig) -> Expression {
    let ticker = Value::Text(config.ticker.clone());
    if config.portfolio_only {
        Expression::formula(format!("members({ticker},type=PORT)"))
    } else {
        Expression::call("members", vec![Expression::Literal(ticker)])
    }
}

/// Members of the configured index or portfolio, narrowed by asset class and spread.
pub fn screening_universe(config: &ScreeningUniverseConfig) -> Expression {
    let mut universe = members(config);

    if let Some(asset_class) = &config.asset_class {
        universe = filter(
            universe,
            Expression::reference("SRCH_ASSET_CLASS").equals(Expression::text(asset_class.clone())),
        );
    }

    if let Some(spread) = &config.spread {
        universe = filter(
            universe,
            spread_condition(&spread.spread_type, spread.side, spread.level),
        );
    }

    universe
}

pub fn filter(universe: Expression, condition: Expression) -> Expression {
    Expression::call("filter", vec![universe, condition])
}

/// A complete screening query: bindings, requested items, universe and preferences.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScreeningQuery {
    bindings: Vec<(String, Expression)>,
    items: Vec<(String, Expression)>,
    universe: Expression,
    preferences: Vec<(String, String)>,
}

impl ScreeningQuery {
    /// Issuers passing every score group, with their filtered scores.
    pub fn filtered_scores(scoring: &CompiledScoring, universe: Expression) -> Self {
        let passing = |value: Expression| {
            Expression::call(
                "dropna",
                vec![
                    Expression::call("matches", vec![value, scoring.pass_filter.clone()]),
                    Expression::boolean(true),
                ],
            )
        };

        let mut items = vec![
            (
                format!("{ISSUER}_filtered"),
                passing(Expression::call(ISSUER, vec![])),
            ),
            (NAME.to_string(), passing(Expression::reference("NAME"))),
        ];
        items.extend(
            scoring
                .groups()
                .map(|group| (format!("{group}_filtered"), passing(Expression::reference(group)))),
        );

        Self {
            bindings: Self::bindings(scoring, false),
            items,
            universe,
            preferences: default_preferences(),
        }
    }

    /// Every current, change and score value for a single security.
    pub fn issuer_detail(scoring: &CompiledScoring, security: &str) -> Self {
        let mut items = vec![(NAME.to_string(), Expression::reference(NAME))];
        items.extend(
            scoring
                .fragments
                .names()
                .map(|name| (name.to_string(), Expression::reference(name))),
        );

        Self {
            bindings: Self::bindings(scoring, true),
            items,
            universe: Expression::formula(format!("[{}]", Value::Text(security.to_string()))),
            preferences: default_preferences(),
        }
    }

    fn bindings(scoring: &CompiledScoring, with_name: bool) -> Vec<(String, Expression)> {
        let mut bindings = vec![(
            ISSUER.to_string(),
            Expression::formula("VALUE(ID,issuerof(),mapby=lineage)"),
        )];
        if with_name {
            bindings.push((NAME.to_string(), Expression::reference("NAME")));
        }
        bindings.extend(scoring.fragments.bindings());
        bindings
    }

    pub fn universe(&self) -> &Expression {
        &self.universe
    }

    pub fn items(&self) -> &[(String, Expression)] {
        &self.items
    }

    /// The query as a single executable request.
    pub fn into_request(self, label: impl Into<String>) -> RequestDescriptor {
        let label = label.into();
        let provenance = Provenance {
            index: 0,
            classification: "Screening".to_string(),
            selection: Selection::All,
            universe_name: "Screening".to_string(),
            universe_label: label.clone(),
            metrics: self.items.iter().map(|(name, _)| name.clone()).collect(),
            offset: "current".to_string(),
        };
        RequestDescriptor::new(label, self.universe, self.items, provenance).with_bindings(self.bindings)
    }
}

fn default_preferences() -> Vec<(String, String)> {
    vec![("unitscheck".to_string(), "ignore".to_string())]
}

impl fmt::Display for ScreeningQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("let(")?;
        for (name, expression) in &self.bindings {
            write!(f, "{name}={expression};")?;
        }
        f.write_str(")get(")?;
        for (i, (name, expression)) in self.items.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{expression} as {name}")?;
        }
        write!(f, ")for({})preferences(", self.universe)?;
        for (i, (key, value)) in self.preferences.iter().enumerate() {
            if i > 0 {
                f.write_str(",")?;
            }
            write!(f, "{key}={value}")?;
        }
        f.write_str(")")
    }
}

pub fn spread_condition(spread_type: &str, side: SpreadSide, level: Decimal) -> Expression {
    let measure = Expression::formula(format!("SPREAD(SPREAD_TYPE={spread_type},fill=prev)"));
    match side {
        SpreadSide::Above => measure.gt(Expression::number(level)),
        SpreadSide::Below => measure.lt(Expression::number(level)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scoring::{ScoringParams, ScoringQueryCompiler};
    use configuration::SpreadThreshold;
    use core_types::{FieldSpec, FieldTable, FormulaTemplate, Periodicity, Side};
    use rust_decimal_macros::dec;

    fn scoring() -> CompiledScoring {
        let table = FieldTable::new(vec![
            FieldSpec::current("#nd", FormulaTemplate::parse("NET_DEBT(fpt={fpt})").unwrap()),
            FieldSpec::change(
                "#nd_chg",
                FormulaTemplate::parse("NET_DEBT(fpt={fpt},fpo=-{lookback}{period})").unwrap(),
                dec!(1),
                Side::Negative,
                "#lev",
            ),
            FieldSpec::score("#lev"),
        ]);
        ScoringQueryCompiler::new(ScoringParams {
            periodicity: Periodicity::Annual,
            lookback: 1,
        })
        .compile(&table)
        .unwrap()
    }

    fn universe_config() -> ScreeningUniverseConfig {
        ScreeningUniverseConfig {
            ticker: "LUACTRUU Index".to_string(),
            portfolio_only: false,
            asset_class: Some("Corporates".to_string()),
            spread: None,
        }
    }

    #[test]
    fn universe_filters_by_asset_class() {
        assert_eq!(
            screening_universe(&universe_config()).to_string(),
            "filter(members('LUACTRUU Index'),SRCH_ASSET_CLASS=='Corporates')"
        );
    }

    #[test]
    fn portfolio_universe_with_spread_threshold() {
        let mut config = universe_config();
        config.portfolio_only = true;
        config.asset_class = None;
        config.spread = Some(SpreadThreshold {
            side: SpreadSide::Above,
            level: dec!(150),
            spread_type: "G".to_string(),
        });
        assert_eq!(
            screening_universe(&config).to_string(),
            "filter(members('LUACTRUU Index',type=PORT),(SPREAD(SPREAD_TYPE=G,fill=prev))>150)"
        );
        assert_eq!(
            spread_condition("G", SpreadSide::Below, dec!(90)).to_string(),
            "(SPREAD(SPREAD_TYPE=G,fill=prev))<90"
        );
    }

    #[test]
    fn renders_the_full_screening_query() {
        let query = ScreeningQuery::filtered_scores(&scoring(), screening_universe(&universe_config()));
        assert_eq!(
            query.to_string(),
            "let(#issuer=VALUE(ID,issuerof(),mapby=lineage);#nd=NET_DEBT(fpt=A);\
#nd_chg=NET_DEBT(fpt=A,fpo=-1Y);#lev=if(#nd_chg*1*-1>0,1,0)/1;)\
get(dropna(matches(#issuer(),#lev>0),true) as #issuer_filtered,\
dropna(matches(NAME,#lev>0),true) as #name,\
dropna(matches(#lev,#lev>0),true) as #lev_filtered)\
for(filter(members('LUACTRUU Index'),SRCH_ASSET_CLASS=='Corporates'))\
preferences(unitscheck=ignore)"
        );
    }

    #[test]
    fn request_carries_bindings_and_items() {
        let request = ScreeningQuery::filtered_scores(&scoring(), screening_universe(&universe_config()))
            .into_request("LUACTRUU Index");
        assert_eq!(request.bindings().len(), 4);
        assert_eq!(request.fields().len(), 3);
        assert_eq!(request.provenance().metrics[2], "#lev_filtered");
        assert!(request.query().starts_with("let(#issuer="));
    }

    #[test]
    fn issuer_detail_requests_every_fragment() {
        let query = ScreeningQuery::issuer_detail(&scoring(), "ACME 4 01/30/30 Corp");
        let names: Vec<_> = query.items().iter().map(|(name, _)| name.as_str()).collect();
        assert_eq!(names, vec!["#name", "#nd", "#nd_chg", "#lev"]);
        assert_eq!(query.universe().to_string(), "['ACME 4 01/30/30 Corp']");
    }
}
