use crate::batch::ComparisonUniverse;
use compiler::{Classification, filter};
use configuration::{PeerUniverseConfig, PeersConfig};
use core_types::{Expression, Value};

fn service_field(name: &str) -> Expression {
    Expression::call(name, vec![])
}

fn bics(level: &str) -> Expression {
    Expression::call(
        "classification_name",
        vec![Expression::text("BICS"), Expression::text(level)],
    )
}

/// Narrows `start` by seniority, currency, minimum USD amount outstanding and country.
pub fn base_universe(start: Expression, peers: &PeersConfig) -> Expression {
    let config = &peers.universe;
    let mut universe = start;

    if let Some(seniority) = config.seniority {
        let ranks = peers
            .payment_ranks(seniority)
            .iter()
            .cloned()
            .map(Value::Text)
            .collect();
        universe = filter(universe, service_field("payment_rank").is_in(ranks));
    }
    if let Some(currency) = &config.currency {
        universe = filter(
            universe,
            service_field("crncy").equals(Expression::text(currency.clone())),
        );
    }

    let amount = Expression::formula("amt_outstanding(currency='USD')");
    universe = filter(
        universe,
        amount.ge(Expression::number(config.min_amount_outstanding)),
    );
    filter(
        universe,
        service_field("country_iso").equals(Expression::text(config.country.clone())),
    )
}

/// All active bonds, or the members of the configured index.
pub fn starting_universe(config: &PeerUniverseConfig) -> Expression {
    match &config.index {
        Some(index) => Expression::call("members", vec![Expression::text(index.clone())]),
        None => Expression::call("bondsuniv", vec![Expression::text("active")]),
    }
}

/// Bonds of the issuer's credit family.
pub fn issuer_bonds(config: &PeerUniverseConfig) -> Expression {
    Expression::formula(format!(
        "bonds({},issuedby='credit_family')",
        Value::Text(config.issuer.clone())
    ))
}

pub fn issuer_label(config: &PeerUniverseConfig) -> String {
    match &config.issuer_label {
        Some(label) => label.clone(),
        None => {
            let ticker = config.issuer.split_whitespace().next().unwrap_or(&config.issuer);
            format!("{ticker} Bonds")
        }
    }
}

/// The standard comparison set around the configured issuer: its own bonds, its rating
/// bucket, its sector, its industry group, and the two rating intersections.
pub fn comparison_set(peers: &PeersConfig, rating: &Classification) -> Vec<ComparisonUniverse> {
    let config = &peers.universe;
    let base = base_universe(starting_universe(config), peers);
    let in_rating = |universe: Expression| {
        filter(
            universe,
            rating
                .expression()
                .clone()
                .equals(Expression::text(config.rating_bucket.clone())),
        )
    };
    let in_bics = |universe: Expression, level: &str, value: &str| {
        filter(universe, bics(level).equals(Expression::text(value)))
    };

    vec![
        ComparisonUniverse::new(
            "Ticker",
            issuer_label(config),
            base_universe(issuer_bonds(config), peers),
        ),
        ComparisonUniverse::new(
            "Rating",
            format!("All {} Rated", config.rating_bucket),
            in_rating(base.clone()),
        ),
        ComparisonUniverse::new(
            "Sector",
            config.sector.clone(),
            in_bics(base.clone(), "1", &config.sector),
        ),
        ComparisonUniverse::new(
            "Industry Group",
            config.industry_group.clone(),
            in_bics(base.clone(), "2", &config.industry_group),
        ),
        ComparisonUniverse::new(
            "Sector & Rating",
            format!("{} and {}", config.rating_bucket, config.sector),
            in_rating(in_bics(base.clone(), "1", &config.sector)),
        ),
        ComparisonUniverse::new(
            "Industry & Rating",
            format!("{} and {}", config.rating_bucket, config.industry_group),
            in_rating(in_bics(base, "2", &config.industry_group)),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use compiler::{ClassificationExpressionBuilder, ClassificationRule};
    use configuration::Seniority;
    use rust_decimal_macros::dec;
    use std::path::PathBuf;

    fn peers(seniority: Option<Seniority>, currency: Option<&str>) -> PeersConfig {
        PeersConfig {
            maturity_buckets: PathBuf::from("maturity.csv"),
            maturity_fallback: "other".to_string(),
            maturity_subject: "YEARS".to_string(),
            rating_buckets: PathBuf::from("ratings.csv"),
            rating_fallback: "unrated".to_string(),
            rating_subject: "RATING".to_string(),
            metrics: PathBuf::from("metrics.csv"),
            include_all: true,
            grouped: false,
            trend_offsets: vec!["-0D".to_string()],
            drilldown_limit: 100,
            senior_ranks: vec!["Secured".to_string(), "Sr Unsecured".to_string()],
            subordinated_ranks: vec!["Subordinated".to_string()],
            universe: PeerUniverseConfig {
                issuer: "ACME US Equity".to_string(),
                issuer_label: None,
                country: "US".to_string(),
                rating_bucket: "BBB".to_string(),
                sector: "Industrials".to_string(),
                industry_group: "Machinery".to_string(),
                index: None,
                seniority,
                currency: currency.map(String::from),
                min_amount_outstanding: dec!(25000000),
            },
        }
    }

    fn rating() -> Classification {
        let rules = vec![ClassificationRule::membership(vec![Value::from("BBB")], "BBB").unwrap()];
        ClassificationExpressionBuilder::new("Rating", Expression::reference("RTG"))
            .build(&rules, "unrated")
            .unwrap()
    }

    #[test]
    fn base_universe_applies_amount_and_country() {
        let peers = peers(None, None);
        assert_eq!(
            base_universe(starting_universe(&peers.universe), &peers).to_string(),
            "filter(filter(bondsuniv('active'),(amt_outstanding(currency='USD'))>=25000000),country_iso()=='US')"
        );
    }

    #[test]
    fn seniority_and_currency_narrow_the_start() {
        let peers = peers(Some(Seniority::Senior), Some("USD"));
        let rendered = base_universe(Expression::reference("START"), &peers).to_string();
        assert!(rendered.starts_with(
            "filter(filter(filter(filter(START,in(payment_rank(),['Secured','Sr Unsecured'])),crncy()=='USD')"
        ));
    }

    #[test]
    fn builds_the_six_standard_comparison_universes() {
        let set = comparison_set(&peers(None, None), &rating());
        let labels: Vec<_> = set.iter().map(|u| u.label.as_str()).collect();
        assert_eq!(
            labels,
            vec![
                "ACME Bonds",
                "All BBB Rated",
                "Industrials",
                "Machinery",
                "BBB and Industrials",
                "BBB and Machinery",
            ]
        );
        assert!(set[0].expression.to_string().contains("bonds('ACME US Equity',issuedby='credit_family')"));
        assert!(set[4].expression.to_string().ends_with("=='BBB')"));
        assert!(set[3].expression.to_string().contains("classification_name('BICS','2')=='Machinery'"));
    }
}
