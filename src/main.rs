use aligner::{AlignError, AlignedTable, AlignedTables, GridAligner, GridAxis, ResultAligner};
use api_client::error::ApiError;
use api_client::{HttpQueryService, QueryService};
use async_trait::async_trait;
use clap::{Parser, Subcommand, ValueEnum};
use comfy_table::{Cell, CellAlignment, Table};
use compiler::heatmap::{AVG_SPREAD, DURATION_KEY, RATING_KEY};
use compiler::{
    Classification, ClassificationExpressionBuilder, CompileError, ScoringParams,
    ScoringQueryCompiler, ScreeningQuery, heatmap_request, membership_rules, range_rules,
    screening_universe,
};
use configuration::error::ConfigError;
use configuration::settings::Config;
use configuration::{HeatmapScope, PeersConfig, Seniority, tables};
use core_types::{Expression, RequestDescriptor, ResultTable, Selection, Value};
use executor::{BatchExecutor, BatchReport, ConcurrencyPolicy};
use indicatif::{ProgressBar, ProgressStyle};
use planner::{
    DrilldownQuery, MetricDefinition, PlanError, RequestBatchBuilder, TimeOffset, comparison_set,
};
use std::sync::Arc;
use tracing::{error, info};

/// The main entry point for the peerscope command-line tool.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is fine; the config file and environment still apply.
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let mut config = configuration::load_config()?;
    let _log_guard = configuration::logging::init(&config.logging)?;

    let result = match cli.command {
        Commands::Screen(args) => handle_screen(args, &config).await,
        Commands::Heatmap(args) => handle_heatmap(args, &config).await,
        Commands::Peers(args) => {
            if let Some(seniority) = args.seniority {
                config.peers.universe.seniority = Some(seniority);
            }
            handle_peers(args, &config).await
        }
        Commands::Trend(args) => handle_trend(args, &config).await,
        Commands::Drilldown(args) => handle_drilldown(args, &config).await,
    };
    result.inspect_err(|e| error!(kind = error_kind(e), error = %e, "Command failed"))
}

/// A short name for the stage an error came from.
fn error_kind(error: &anyhow::Error) -> &'static str {
    if let Some(config) = error.downcast_ref::<ConfigError>() {
        return match config {
            ConfigError::LoadError(_) => "config-load",
            ConfigError::ValidationError(_) => "config-validation",
            ConfigError::Table { .. } => "table-read",
            ConfigError::TableSchema { .. } => "table-schema",
            ConfigError::Logging(_) => "logging",
        };
    }
    if error.downcast_ref::<CompileError>().is_some() {
        "compile"
    } else if error.downcast_ref::<PlanError>().is_some() {
        "plan"
    } else if error.downcast_ref::<AlignError>().is_some() {
        "align"
    } else if error.downcast_ref::<ApiError>().is_some() {
        "service"
    } else {
        "other"
    }
}

// ==============================================================================
// CLI Structure
// ==============================================================================

/// Fundamental screens and bond peer comparisons against the analytics data service.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the scoring screen over the configured universe.
    Screen(ScreenArgs),
    /// Average spread of the screening members by rating and duration bucket.
    Heatmap(HeatmapArgs),
    /// Compare a metric across classification buckets and peer universes.
    Peers(PeersArgs),
    /// Compare a metric across time offsets and peer universes.
    Trend(TrendArgs),
    /// List the largest bonds behind one bucket of one comparison universe.
    Drilldown(DrilldownArgs),
}

#[derive(Parser)]
struct ScreenArgs {
    /// Show every current, change and score value for a single security instead.
    #[arg(long)]
    detail: Option<String>,
}

#[derive(Parser)]
struct HeatmapArgs {
    /// Financials only, everything but Financials, or all members. Defaults to the configured scope.
    #[arg(long, value_enum)]
    scope: Option<HeatmapScope>,

    /// Print the grid as JSON.
    #[arg(long)]
    json: bool,
}

#[derive(Clone, Copy, ValueEnum)]
enum Axis {
    Maturity,
    Rating,
}

#[derive(Parser)]
struct PeersArgs {
    /// The classification that defines the table rows.
    #[arg(long, value_enum, default_value = "maturity")]
    by: Axis,

    /// Restrict the base universe to one seniority.
    #[arg(long, value_enum)]
    seniority: Option<Seniority>,

    /// Print the aligned tables as JSON.
    #[arg(long)]
    json: bool,
}

#[derive(Parser)]
struct TrendArgs {
    /// The classification the bucket belongs to.
    #[arg(long, value_enum, default_value = "maturity")]
    by: Axis,

    /// Restrict every universe to this bucket. Without it the universes are unfiltered.
    #[arg(long)]
    bucket: Option<String>,

    /// Print the aligned tables as JSON.
    #[arg(long)]
    json: bool,
}

#[derive(Parser)]
struct DrilldownArgs {
    /// The classification the bucket belongs to.
    #[arg(long, value_enum, default_value = "maturity")]
    by: Axis,

    /// The comparison universe, by kind (e.g. "Sector") or by column label.
    #[arg(long)]
    universe: String,

    /// Restrict the bonds to this bucket.
    #[arg(long)]
    bucket: Option<String>,

    /// Evaluate the metrics at this offset, e.g. "-1M".
    #[arg(long)]
    offset: Option<String>,

    /// Largest number of bonds to list. Defaults to `peers.drilldown_limit`.
    #[arg(long)]
    limit: Option<u32>,
}

// ==============================================================================
// Command Logic
// ==============================================================================

async fn handle_screen(args: ScreenArgs, config: &Config) -> anyhow::Result<()> {
    let screening = &config.screening;
    let fields = tables::load_field_table(&screening.field_table, &screening.score_groups)?;
    let scoring = ScoringQueryCompiler::new(ScoringParams {
        periodicity: screening.periodicity,
        lookback: screening.lookback,
    })
    .compile(&fields)?;

    let query = match &args.detail {
        Some(security) => ScreeningQuery::issuer_detail(&scoring, security),
        None => ScreeningQuery::filtered_scores(&scoring, screening_universe(&screening.universe)),
    };
    info!(query = %query, "Compiled screening query");

    let label = args.detail.as_deref().unwrap_or(&screening.universe.ticker).to_string();
    let report = run_batch(vec![query.into_request(label)], config).await?;

    for outcome in report.outcomes() {
        match (outcome.table(), outcome.cause()) {
            (Some(table), _) => println!("{}", render_result(outcome.descriptor(), table)),
            (None, Some(cause)) => eprintln!("Screen failed: {cause}"),
            (None, None) => {}
        }
    }
    Ok(())
}

async fn handle_heatmap(args: HeatmapArgs, config: &Config) -> anyhow::Result<()> {
    let screening = &config.screening;
    let heatmap = &screening.heatmap;
    let aligner = GridAligner::new(
        AVG_SPREAD,
        GridAxis::new(RATING_KEY, heatmap.rating_order.clone())?,
        GridAxis::new(DURATION_KEY, heatmap.duration_labels.clone())?,
    )?;

    let request = heatmap_request(&screening.universe, heatmap, args.scope.unwrap_or(heatmap.scope));
    info!(query = %request.query(), universe = %request.universe(), "Compiled heatmap query");

    let report = run_batch(vec![request], config).await?;
    print_aligned(&aligner.align(&report), "Rating", args.json)
}

async fn handle_peers(args: PeersArgs, config: &Config) -> anyhow::Result<()> {
    let peers = &config.peers;
    let classification = classification(args.by, peers)?;
    let rating = classification_for_universes(args.by, &classification, peers)?;
    let metrics = load_metrics(peers)?;

    let aligner = ResultAligner::new(classification.labels().to_vec())?;

    let requests = RequestBatchBuilder::new()
        .include_all(peers.include_all)
        .grouped(peers.grouped)
        .build(&classification, &comparison_set(peers, &rating), &metrics, &[])?;

    let report = run_batch(requests, config).await?;
    print_aligned(&aligner.align(&report), classification.name(), args.json)
}

async fn handle_trend(args: TrendArgs, config: &Config) -> anyhow::Result<()> {
    let peers = &config.peers;
    let classification = classification(args.by, peers)?;
    let rating = classification_for_universes(args.by, &classification, peers)?;
    let metrics = load_metrics(peers)?;
    let offsets = TimeOffset::from_values(&peers.trend_offsets);
    let aligner = ResultAligner::on_offsets(offsets.iter().map(|o| o.tag.clone()).collect())?;

    let selection = match args.bucket {
        Some(label) => Selection::Bucket(label),
        None => Selection::All,
    };
    let requests = RequestBatchBuilder::new()
        .with_selections(vec![selection.clone()])
        .build(&classification, &comparison_set(peers, &rating), &metrics, &offsets)?;

    let report = run_batch(requests, config).await?;
    print_aligned(&aligner.align(&report), &format!("Offset ({selection})"), args.json)
}

async fn handle_drilldown(args: DrilldownArgs, config: &Config) -> anyhow::Result<()> {
    let peers = &config.peers;
    let classification = classification(args.by, peers)?;
    let rating = classification_for_universes(args.by, &classification, peers)?;
    let metrics = load_metrics(peers)?;

    let universes = comparison_set(peers, &rating);
    let universe = universes
        .iter()
        .find(|u| u.name.eq_ignore_ascii_case(&args.universe) || u.label == args.universe)
        .ok_or_else(|| {
            let known: Vec<&str> = universes.iter().map(|u| u.name.as_str()).collect();
            anyhow::anyhow!("Unknown universe '{}'; expected one of: {}", args.universe, known.join(", "))
        })?;

    let mut query = DrilldownQuery::new(args.limit.unwrap_or(peers.drilldown_limit))?;
    if let Some(offset) = args.offset {
        query = query.at_offset(TimeOffset::new(offset.clone(), offset));
    }
    let request = query.build(&classification, args.bucket.as_deref(), universe, &metrics)?;

    let report = run_batch(vec![request], config).await?;
    for outcome in report.outcomes() {
        match (outcome.table(), outcome.cause()) {
            (Some(table), _) => println!("{}", render_result(outcome.descriptor(), table)),
            (None, Some(cause)) => eprintln!("Drilldown failed: {cause}"),
            (None, None) => {}
        }
    }
    Ok(())
}

fn classification(axis: Axis, peers: &PeersConfig) -> anyhow::Result<Classification> {
    let classification = match axis {
        Axis::Maturity => {
            let rules = range_rules(&tables::load_range_buckets(&peers.maturity_buckets)?)?;
            ClassificationExpressionBuilder::new(
                "Maturity Bucket",
                Expression::formula(peers.maturity_subject.clone()),
            )
            .build(&rules, &peers.maturity_fallback)?
        }
        Axis::Rating => {
            let rules = membership_rules(&tables::load_rating_table(&peers.rating_buckets)?)?;
            ClassificationExpressionBuilder::new(
                "Rating Bucket",
                Expression::formula(peers.rating_subject.clone()),
            )
            .build(&rules, &peers.rating_fallback)?
        }
    };
    Ok(classification)
}

/// The rating classification the comparison universes filter on.
fn classification_for_universes(
    axis: Axis,
    rows: &Classification,
    peers: &PeersConfig,
) -> anyhow::Result<Classification> {
    match axis {
        Axis::Rating => Ok(rows.clone()),
        Axis::Maturity => classification(Axis::Rating, peers),
    }
}

fn load_metrics(peers: &PeersConfig) -> anyhow::Result<Vec<MetricDefinition>> {
    tables::load_metrics(&peers.metrics)?
        .iter()
        .map(|row| MetricDefinition::from_row(row).map_err(anyhow::Error::from))
        .collect()
}

async fn run_batch(requests: Vec<RequestDescriptor>, config: &Config) -> anyhow::Result<BatchReport> {
    let progress_bar = ProgressBar::new(requests.len() as u64);
    progress_bar.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
            .progress_chars("#>-"),
    );

    let service = ProgressService {
        inner: HttpQueryService::new(&config.service)?,
        progress_bar: progress_bar.clone(),
    };
    let report = BatchExecutor::new(Arc::new(service))
        .with_timeout(config.service.timeout)
        .execute(requests, ConcurrencyPolicy::from_config(&config.batch))
        .await;

    progress_bar.finish_with_message(format!(
        "{} succeeded, {} failed",
        report.succeeded(),
        report.failed()
    ));
    Ok(report)
}

/// Advances a progress bar as each request completes.
struct ProgressService<S> {
    inner: S,
    progress_bar: ProgressBar,
}

#[async_trait]
impl<S: QueryService> QueryService for ProgressService<S> {
    async fn execute(&self, request: &RequestDescriptor) -> Result<ResultTable, ApiError> {
        let result = self.inner.execute(request).await;
        self.progress_bar.set_message(request.label().to_string());
        self.progress_bar.inc(1);
        result
    }
}

// ==============================================================================
// Output
// ==============================================================================

fn print_aligned(aligned: &AlignedTables, row_header: &str, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(aligned)?);
        return Ok(());
    }
    for table in aligned.iter() {
        println!("{}\n{}\n", table.metric, render_aligned(table, row_header));
    }
    if aligned.failed() > 0 {
        eprintln!(
            "{} of {} requests failed; their cells are empty.",
            aligned.failed(),
            aligned.submitted()
        );
    }
    Ok(())
}

fn render_aligned(aligned: &AlignedTable, row_header: &str) -> Table {
    let mut table = Table::new();
    let mut header = vec![Cell::new(row_header)];
    header.extend(aligned.columns.iter().map(Cell::new));
    table.set_header(header);

    for (label, cells) in aligned.rows.iter().zip(aligned.cells()) {
        let mut row = vec![Cell::new(label)];
        row.extend(cells.iter().map(|cell| {
            let text = cell.map(|v| v.round_dp(2).to_string()).unwrap_or_else(|| "-".to_string());
            Cell::new(text).set_alignment(CellAlignment::Right)
        }));
        table.add_row(row);
    }
    table
}

fn render_result(descriptor: &RequestDescriptor, result: &ResultTable) -> Table {
    let columns: Vec<&str> = descriptor.fields().iter().map(|(name, _)| name.as_str()).collect();
    let mut table = Table::new();
    let mut header = vec![Cell::new("Security")];
    header.extend(columns.iter().map(Cell::new));
    table.set_header(header);

    for row in result.rows() {
        let mut cells = vec![Cell::new(&row.label)];
        cells.extend(columns.iter().map(|column| {
            let text = match row.values.get(*column) {
                Some(Value::Number(n)) => n.round_dp(2).to_string(),
                Some(Value::Text(s)) => s.clone(),
                Some(Value::Bool(b)) => b.to_string(),
                Some(Value::Missing) | None => "-".to_string(),
            };
            Cell::new(text)
        }));
        table.add_row(cells);
    }
    table
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kind_names_the_failing_stage() {
        let validation = anyhow::Error::from(ConfigError::ValidationError("bad".to_string()));
        assert_eq!(error_kind(&validation), "config-validation");

        let plan = anyhow::Error::from(PlanError::DuplicateOffset("-1M".to_string()));
        assert_eq!(error_kind(&plan), "plan");

        let align = anyhow::Error::from(AlignError::DuplicateLabel("AA".to_string()));
        assert_eq!(error_kind(&align), "align");

        assert_eq!(error_kind(&anyhow::anyhow!("Unknown universe")), "other");
    }

    #[test]
    fn cli_parses_the_heatmap_and_drilldown_commands() {
        let cli = Cli::try_parse_from(["peerscope", "heatmap", "--scope", "ex-financials"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::Heatmap(HeatmapArgs { scope: Some(HeatmapScope::ExFinancials), json: false })
        ));

        let cli = Cli::try_parse_from([
            "peerscope", "drilldown", "--universe", "Sector", "--bucket", "5-10", "--limit", "20",
        ])
        .unwrap();
        let Commands::Drilldown(args) = cli.command else {
            panic!("expected the drilldown command");
        };
        assert_eq!(args.universe, "Sector");
        assert_eq!(args.bucket.as_deref(), Some("5-10"));
        assert_eq!(args.limit, Some(20));
    }
}
