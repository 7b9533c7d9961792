use crate::error::ConfigError;
use crate::settings::Config;
use std::path::Path;

// Declare the modules that make up this crate.
pub mod error;
pub mod logging;
pub mod settings;
pub mod tables;

// Re-export the core types to provide a clean public API.
pub use settings::{
    BatchConfig, HeatmapConfig, HeatmapScope, LoggingConfig, PeerUniverseConfig, PeersConfig, ScreeningConfig,
    ScreeningUniverseConfig, Seniority, ServiceConfig, SpreadSide, SpreadThreshold,
};
pub use tables::{MetricRow, RangeBucketRow, RatingRow};

/// Loads the application configuration from the `config.toml` file.
///
/// Values can be overridden with `PEERSCOPE__`-prefixed environment variables, e.g.
/// `PEERSCOPE__SERVICE__API_KEY`.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(Path::new("config.toml"))
}

pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let builder = config::Config::builder()
        .add_source(config::File::from(path))
        .add_source(
            config::Environment::with_prefix("PEERSCOPE")
                .prefix_separator("__")
                .separator("__"),
        )
        .build()?;

    // Attempt to deserialize the entire configuration into our `Config` struct
    let config = builder.try_deserialize::<Config>()?;
    config.validate().map_err(ConfigError::ValidationError)?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_types::Periodicity;
    use std::time::Duration;

    const MINIMAL: &str = r##"
[service]
base_url = "http://localhost:8080"
timeout = "45s"

[batch]
max_concurrency = 4

[screening]
field_table = "settings/fields.csv"
periodicity = "Q"
lookback = 4
score_groups = ["#leverage", "#profitability"]

[screening.universe]
ticker = "LUACTRUU Index"

[peers]
maturity_buckets = "settings/maturity_buckets.csv"
rating_buckets = "settings/rating_buckets.csv"
metrics = "settings/metrics.csv"

[peers.universe]
issuer = "ACME"
country = "US"
rating_bucket = "BBB"
sector = "Industrials"
industry_group = "Machinery"
seniority = "senior"
"##;

    fn write_config(contents: &str) -> tempfile::TempDir {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("config.toml"), contents).unwrap();
        dir
    }

    #[test]
    fn loads_minimal_config_with_defaults() {
        let dir = write_config(MINIMAL);
        let config = load_config_from(&dir.path().join("config.toml")).unwrap();

        assert_eq!(config.service.timeout, Duration::from_secs(45));
        assert_eq!(config.batch.max_concurrency, Some(4));
        assert_eq!(config.screening.periodicity, Periodicity::Quarterly);
        assert_eq!(config.screening.score_groups, vec!["#leverage", "#profitability"]);
        assert_eq!(config.screening.universe.asset_class.as_deref(), Some("Corporates"));
        assert_eq!(config.peers.maturity_fallback, "other");
        assert_eq!(config.peers.rating_fallback, "unrated");
        assert!(config.peers.include_all);
        assert_eq!(config.peers.trend_offsets[0], "-0D");
        assert_eq!(config.peers.universe.seniority, Some(Seniority::Senior));
        assert_eq!(
            config.peers.payment_ranks(Seniority::Subordinated)[0],
            "Sr Subordinated"
        );
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn zero_concurrency_fails_validation() {
        let dir = write_config(&MINIMAL.replace("max_concurrency = 4", "max_concurrency = 0"));
        let err = load_config_from(&dir.path().join("config.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn repeated_trend_offset_fails_validation() {
        let config = MINIMAL.replace(
            "[peers]\n",
            "[peers]\ntrend_offsets = [\"-0D\", \"-1M\", \"-1M\"]\n",
        );
        let dir = write_config(&config);
        match load_config_from(&dir.path().join("config.toml")).unwrap_err() {
            ConfigError::ValidationError(message) => assert!(message.contains("'-1M'")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn heatmap_defaults_and_bucket_count_check() {
        let dir = write_config(MINIMAL);
        let config = load_config_from(&dir.path().join("config.toml")).unwrap();
        let heatmap = &config.screening.heatmap;
        assert_eq!(heatmap.scope, HeatmapScope::All);
        assert_eq!(heatmap.rating_order.len(), 22);
        assert_eq!(heatmap.duration_labels.len(), 13);
        assert_eq!(heatmap.duration_labels.last().map(String::as_str), Some("20+"));
        assert_eq!(config.peers.drilldown_limit, 100);

        let short = MINIMAL.replace(
            "[screening.universe]",
            "[screening.heatmap]\nscope = \"ex-financials\"\nduration_bins = [5, 10]\nduration_labels = [\"0-5\", \"5+\"]\n\n[screening.universe]",
        );
        let dir = write_config(&short);
        assert!(matches!(
            load_config_from(&dir.path().join("config.toml")).unwrap_err(),
            ConfigError::ValidationError(_)
        ));
    }

    #[test]
    fn unknown_periodicity_fails_to_load() {
        let dir = write_config(&MINIMAL.replace("periodicity = \"Q\"", "periodicity = \"W\""));
        let err = load_config_from(&dir.path().join("config.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::LoadError(_)));
    }
}
