use core_types::Periodicity;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// The root configuration structure for the entire application.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    #[serde(default)]
    pub batch: BatchConfig,
    pub screening: ScreeningConfig,
    pub peers: PeersConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Connection settings for the external data service.
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Base URL; queries are posted to `{base_url}/query`.
    pub base_url: String,
    /// Sent as the API key header. Usually supplied through `PEERSCOPE__SERVICE__API_KEY`.
    #[serde(default)]
    pub api_key: String,
    /// Per-request timeout, e.g. "30s" or "2m".
    #[serde(with = "humantime_serde", default = "default_timeout")]
    pub timeout: Duration,
}

fn default_timeout() -> Duration {
    Duration::from_secs(30)
}

/// Limits applied when a batch of requests is executed.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct BatchConfig {
    /// Maximum number of in-flight requests. Absent means unbounded.
    #[serde(default)]
    pub max_concurrency: Option<usize>,
}

/// Inputs of the credit screening query.
#[derive(Debug, Clone, Deserialize)]
pub struct ScreeningConfig {
    /// CSV with the current/change field formulas, weights and sides.
    pub field_table: PathBuf,
    pub periodicity: Periodicity,
    /// Number of periods the change fields look back.
    pub lookback: u32,
    /// Score groups in output order. Every `score` value in the field table must be listed here.
    pub score_groups: Vec<String>,
    pub universe: ScreeningUniverseConfig,
    #[serde(default)]
    pub heatmap: HeatmapConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScreeningUniverseConfig {
    /// Index or portfolio whose members are screened.
    pub ticker: String,
    /// Treat `ticker` as a portfolio identifier.
    #[serde(default)]
    pub portfolio_only: bool,
    #[serde(default = "default_asset_class")]
    pub asset_class: Option<String>,
    #[serde(default)]
    pub spread: Option<SpreadThreshold>,
}

fn default_asset_class() -> Option<String> {
    Some("Corporates".to_string())
}

/// Keeps only issues whose spread is above or below `level`.
#[derive(Debug, Clone, Deserialize)]
pub struct SpreadThreshold {
    pub side: SpreadSide,
    pub level: Decimal,
    #[serde(default = "default_spread_type")]
    pub spread_type: String,
}

fn default_spread_type() -> String {
    "G".to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum SpreadSide {
    #[serde(rename = ">", alias = "above")]
    Above,
    #[serde(rename = "<", alias = "below")]
    Below,
}

impl SpreadSide {
    pub fn symbol(self) -> &'static str {
        match self {
            SpreadSide::Above => ">",
            SpreadSide::Below => "<",
        }
    }
}

/// Which part of the screened universe the spread heatmap covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum HeatmapScope {
    #[default]
    All,
    Financials,
    ExFinancials,
}

/// Average spread by rating and duration bucket.
#[derive(Debug, Clone, Deserialize)]
pub struct HeatmapConfig {
    #[serde(default)]
    pub scope: HeatmapScope,
    /// Row order of the heatmap; ratings outside it are not shown.
    #[serde(default = "default_rating_order")]
    pub rating_order: Vec<String>,
    /// Upper duration limits in years, ascending.
    #[serde(default = "default_duration_bins")]
    pub duration_bins: Vec<u32>,
    /// Column order of the heatmap. One label per bin plus one for the open-ended top bucket.
    #[serde(default = "default_duration_labels")]
    pub duration_labels: Vec<String>,
    #[serde(default = "default_heatmap_spread_type")]
    pub spread_type: String,
}

impl Default for HeatmapConfig {
    fn default() -> Self {
        Self {
            scope: HeatmapScope::default(),
            rating_order: default_rating_order(),
            duration_bins: default_duration_bins(),
            duration_labels: default_duration_labels(),
            spread_type: default_heatmap_spread_type(),
        }
    }
}

fn default_rating_order() -> Vec<String> {
    [
        "AAA", "AA+", "AA", "AA-", "A+", "A", "A-", "BBB+", "BBB", "BBB-", "BB+", "BB", "BB-",
        "B+", "B", "B-", "CCC+", "CCC", "CCC-", "CC", "C", "DDD",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_duration_bins() -> Vec<u32> {
    vec![1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 15, 20]
}

fn default_duration_labels() -> Vec<String> {
    [
        "0-1", "1-2", "2-3", "3-4", "4-5", "5-6", "6-7", "7-8", "8-9", "9-10", "10-15", "15-20",
        "20+",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_heatmap_spread_type() -> String {
    "OAS".to_string()
}

/// Inputs of the peer comparison and trend tables.
#[derive(Debug, Clone, Deserialize)]
pub struct PeersConfig {
    /// CSV of `low_limit,high_limit,label` maturity buckets.
    pub maturity_buckets: PathBuf,
    #[serde(default = "default_maturity_fallback")]
    pub maturity_fallback: String,
    /// Years-to-maturity formula the buckets are applied to.
    #[serde(default = "default_maturity_subject")]
    pub maturity_subject: String,

    /// CSV of `rating,bucket` rows.
    pub rating_buckets: PathBuf,
    #[serde(default = "default_rating_fallback")]
    pub rating_fallback: String,
    #[serde(default = "default_rating_subject")]
    pub rating_subject: String,

    /// CSV of `name,formula[,aggregation]` metric definitions.
    pub metrics: PathBuf,

    /// Issue one unfiltered request per universe, reported as the "All" row.
    #[serde(default = "default_true")]
    pub include_all: bool,
    /// Issue one request per universe grouped by maturity bucket instead of one per bucket.
    #[serde(default)]
    pub grouped: bool,

    /// Offsets used by the trend table, e.g. "-0D", "-1M".
    #[serde(default = "default_trend_offsets")]
    pub trend_offsets: Vec<String>,

    /// Largest number of bonds a drilldown returns, ranked by USD amount outstanding.
    #[serde(default = "default_drilldown_limit")]
    pub drilldown_limit: u32,

    #[serde(default = "default_senior_ranks")]
    pub senior_ranks: Vec<String>,
    #[serde(default = "default_subordinated_ranks")]
    pub subordinated_ranks: Vec<String>,

    pub universe: PeerUniverseConfig,
}

/// Describes the issuer the comparison universes are built around.
#[derive(Debug, Clone, Deserialize)]
pub struct PeerUniverseConfig {
    pub issuer: String,
    /// Display label of the issuer universe; defaults to `"{issuer} Bonds"`.
    #[serde(default)]
    pub issuer_label: Option<String>,
    pub country: String,
    pub rating_bucket: String,
    pub sector: String,
    pub industry_group: String,
    /// Start from the members of this index instead of all active bonds.
    #[serde(default)]
    pub index: Option<String>,
    #[serde(default)]
    pub seniority: Option<Seniority>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default = "default_min_amount_outstanding")]
    pub min_amount_outstanding: Decimal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum Seniority {
    Senior,
    #[serde(alias = "sub")]
    Subordinated,
}

fn default_true() -> bool {
    true
}

fn default_maturity_fallback() -> String {
    "other".to_string()
}

fn default_maturity_subject() -> String {
    "(MATURITY()-TODAY())/365".to_string()
}

fn default_rating_fallback() -> String {
    "unrated".to_string()
}

fn default_rating_subject() -> String {
    "RATING(RATING_SOURCE='SP').VALUE".to_string()
}

fn default_trend_offsets() -> Vec<String> {
    ["-0D", "-1W", "-2W", "-1M", "-2M", "-3M", "-6M", "-9M", "-11M"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_drilldown_limit() -> u32 {
    100
}

fn default_senior_ranks() -> Vec<String> {
    [
        "1st lien",
        "1.5 Lien",
        "2nd lien",
        "3rd lien",
        "Asset Backed",
        "Secured",
        "Sr Unsecured",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

fn default_subordinated_ranks() -> Vec<String> {
    ["Sr Subordinated", "Subordinated", "Jr Subordinated", "Unsecured"]
        .into_iter()
        .map(String::from)
        .collect()
}

fn default_min_amount_outstanding() -> Decimal {
    dec!(25000000)
}

/// Logging output settings.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive; `RUST_LOG` takes precedence.
    #[serde(default = "default_level")]
    pub level: String,
    /// When set, logs are also written to a daily-rolling file in this directory.
    #[serde(default)]
    pub directory: Option<PathBuf>,
    #[serde(default = "default_file_prefix")]
    pub file_prefix: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_level(),
            directory: None,
            file_prefix: default_file_prefix(),
        }
    }
}

fn default_level() -> String {
    "info".to_string()
}

fn default_file_prefix() -> String {
    "peerscope.log".to_string()
}

impl Config {
    /// Checks the invariants serde cannot express.
    pub fn validate(&self) -> Result<(), String> {
        if self.service.base_url.trim().is_empty() {
            return Err("service.base_url must not be empty".to_string());
        }
        if self.service.timeout.is_zero() {
            return Err("service.timeout must be greater than zero".to_string());
        }
        if self.batch.max_concurrency == Some(0) {
            return Err("batch.max_concurrency must be at least 1".to_string());
        }
        if self.screening.score_groups.is_empty() {
            return Err("screening.score_groups must name at least one group".to_string());
        }
        if self.peers.universe.min_amount_outstanding < Decimal::ZERO {
            return Err("peers.universe.min_amount_outstanding must not be negative".to_string());
        }
        if self.peers.trend_offsets.is_empty() {
            return Err("peers.trend_offsets must contain at least one offset".to_string());
        }
        if self.peers.drilldown_limit == 0 {
            return Err("peers.drilldown_limit must be at least 1".to_string());
        }
        let heatmap = &self.screening.heatmap;
        if heatmap.duration_labels.len() != heatmap.duration_bins.len() + 1 {
            return Err(format!(
                "screening.heatmap needs {} duration labels for {} bins, found {}",
                heatmap.duration_bins.len() + 1,
                heatmap.duration_bins.len(),
                heatmap.duration_labels.len()
            ));
        }
        if heatmap.duration_bins.windows(2).any(|pair| pair[0] >= pair[1]) {
            return Err("screening.heatmap.duration_bins must be strictly ascending".to_string());
        }
        for (i, offset) in self.peers.trend_offsets.iter().enumerate() {
            if self.peers.trend_offsets[..i].contains(offset) {
                return Err(format!("peers.trend_offsets lists '{offset}' more than once"));
            }
        }
        Ok(())
    }
}

impl PeersConfig {
    /// Payment ranks accepted for the configured seniority.
    pub fn payment_ranks(&self, seniority: Seniority) -> &[String] {
        match seniority {
            Seniority::Senior => &self.senior_ranks,
            Seniority::Subordinated => &self.subordinated_ranks,
        }
    }
}
