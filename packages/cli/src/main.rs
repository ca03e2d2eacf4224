#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Command-line entry point for the accident map.
//!
//! ```text
//! accident_map rebuild
//! accident_map info
//! accident_map report --road-segment-id 900010 --years 5 --lang en
//! accident_map report --city 5000 --street 418
//! accident_map report --news-flash-id 1
//! ```
//!
//! Running `accident_map` with no subcommand enters interactive mode.
//!
//! Uses `indicatif-log-bridge` (via [`accident_map_cli_utils::init_logger`])
//! to route `log` output through `indicatif::MultiProgress` so that log
//! lines and progress bars never fight for the terminal.

mod config;

use std::path::PathBuf;
use std::sync::Arc;

use accident_map_accident_models::Language;
use accident_map_cli_utils::{IndicatifProgress, MultiProgress};
use accident_map_database::cache_store::CacheStore;
use accident_map_database::pool::DuckDbPool;
use accident_map_infographics::cache::ReportCache;
use accident_map_infographics::location::LocationRequest;
use accident_map_infographics::registry;
use accident_map_infographics::service::ReportService;
use accident_map_rebuild::CacheRebuildPipeline;
use accident_map_report_models::{LocationField, LocationFields};
use accident_map_statistics::duckdb_source::DuckDbStatistics;
use clap::{Args, Parser, Subcommand};
use dialoguer::{Input, Select};

use crate::config::Config;

/// Connections reserved for the report cache.
const CACHE_POOL_SIZE: usize = 2;

#[derive(Parser)]
#[command(
    name = "accident_map",
    about = "Serve accident infographics reports and rebuild their cache"
)]
struct Cli {
    /// Configuration file overriding the built-in defaults
    #[arg(long, global = true, env = "ACCIDENT_MAP_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Rebuild the report cache and publish it
    Rebuild,
    /// Show cache row counts and what a rebuild would stage
    Info,
    /// Print the report for a location as JSON
    Report(ReportArgs),
}

#[derive(Args, Default)]
struct ReportArgs {
    /// News item whose location seeds the request
    #[arg(long)]
    news_flash_id: Option<i64>,
    /// Road segment identifier
    #[arg(long)]
    road_segment_id: Option<i64>,
    /// Inter-city road number
    #[arg(long = "road")]
    road1: Option<i64>,
    /// Road segment name, used with --road
    #[arg(long)]
    segment_name: Option<String>,
    /// City symbol
    #[arg(long)]
    city: Option<i64>,
    /// City name, instead of --city
    #[arg(long)]
    city_name: Option<String>,
    /// Street code within the city
    #[arg(long)]
    street: Option<i64>,
    /// Street name, instead of --street
    #[arg(long)]
    street_name: Option<String>,
    /// Lookback window in years
    #[arg(long, default_value_t = 5)]
    years: i64,
    /// Output language (he, en, ar)
    #[arg(long)]
    lang: Option<Language>,
}

impl ReportArgs {
    fn request(&self, default_language: Language) -> LocationRequest {
        let mut fields = LocationFields::new();
        if let Some(id) = self.road_segment_id {
            fields.insert(LocationField::RoadSegmentId, id);
        }
        if let Some(road) = self.road1 {
            fields.insert(LocationField::Road1, road);
        }
        if let Some(name) = &self.segment_name {
            fields.insert(LocationField::RoadSegmentName, name.as_str());
        }
        if let Some(symbol) = self.city {
            fields.insert(LocationField::YishuvSymbol, symbol);
        }
        if let Some(name) = &self.city_name {
            fields.insert(LocationField::YishuvName, name.as_str());
        }
        if let Some(street) = self.street {
            fields.insert(LocationField::Street1, street);
        }
        if let Some(name) = &self.street_name {
            fields.insert(LocationField::Street1Hebrew, name.as_str());
        }

        LocationRequest {
            news_flash_id: self.news_flash_id,
            fields,
            lookback_years: self.years,
            language: self.lang.unwrap_or(default_language),
        }
    }
}

/// Interactive menu entries.
enum Action {
    Report,
    Rebuild,
    Info,
}

impl Action {
    const ALL: &[Self] = &[Self::Report, Self::Rebuild, Self::Info];

    #[must_use]
    const fn label(&self) -> &'static str {
        match self {
            Self::Report => "Show a location report",
            Self::Rebuild => "Rebuild the report cache",
            Self::Info => "Show cache status",
        }
    }
}

/// Open services over one database.
struct App {
    config: Config,
    service: ReportService,
    pipeline: CacheRebuildPipeline,
}

impl App {
    fn open(config: Config) -> Result<Self, Box<dyn std::error::Error>> {
        let conn = accident_map_database::open(&config.database_path)?;
        let stats_pool = DuckDbPool::from_connection(conn, config.pool_size)?;
        let cache_pool = stats_pool.share(CACHE_POOL_SIZE)?;

        let source = Arc::new(DuckDbStatistics::new(Arc::new(stats_pool)));
        let store = Arc::new(CacheStore::new(cache_pool));
        let widgets = registry::builtin();

        let service = ReportService::new(
            Arc::clone(&source),
            Arc::clone(&widgets),
            ReportCache::new(Arc::clone(&store)),
            config.widget_concurrency,
        );
        let pipeline = CacheRebuildPipeline::new(
            source,
            widgets,
            store,
            config.rebuild_config(),
            config.widget_concurrency,
        );

        log::info!("Opened {}", config.database_path.display());
        Ok(Self {
            config,
            service,
            pipeline,
        })
    }

    async fn report(&self, args: &ReportArgs) -> Result<(), Box<dyn std::error::Error>> {
        let request = args.request(self.config.default_language);
        let report = self.service.report(&request).await?;
        println!("{}", serde_json::to_string_pretty(&report)?);
        Ok(())
    }

    async fn rebuild(&self, multi: &MultiProgress) -> Result<(), Box<dyn std::error::Error>> {
        let cancel = self.pipeline.cancel_handle();
        let interrupt = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                log::warn!("Interrupted, cancelling rebuild before publish");
                cancel.cancel();
            }
        });

        let progress = IndicatifProgress::rebuild_bar(multi, "Listing eligible locations");
        let result = self.pipeline.run(&progress).await;
        interrupt.abort();
        let summary = result?;

        println!();
        println!("Eligible locations: {}", summary.eligible_locations);
        println!("Staged entries:     {}", summary.staged);
        println!("Failed entries:     {}", summary.failed);
        println!(
            "Live rows:          {} -> {}",
            summary.live_before, summary.live_after
        );
        println!("Swap:               {:.2?}", summary.swap_duration);
        println!("Total:              {:.2?}", summary.duration);
        Ok(())
    }

    async fn info(&self) -> Result<(), Box<dyn std::error::Error>> {
        let info = self.pipeline.info().await?;

        println!("Live rows:    {}", info.live);
        println!("Staging rows: {}", info.staging);
        println!("Lookback windows: {:?}", info.lookback_windows);
        for (kind, count) in &info.eligible {
            println!("  {kind:<16} {count} eligible");
        }
        println!("A rebuild would stage {} entries", info.expected_entries());
        Ok(())
    }
}

/// Prompts for the arguments of a report request.
fn prompt_report_args() -> Result<ReportArgs, Box<dyn std::error::Error>> {
    let kinds = ["Road segment", "Street in a city", "News item"];
    let kind = Select::new()
        .with_prompt("Location")
        .items(&kinds)
        .default(0)
        .interact()?;

    let mut args = ReportArgs::default();
    match kind {
        0 => {
            args.road_segment_id =
                Some(Input::new().with_prompt("Road segment id").interact_text()?);
        }
        1 => {
            args.city = Some(Input::new().with_prompt("City symbol").interact_text()?);
            args.street = Some(Input::new().with_prompt("Street code").interact_text()?);
        }
        _ => {
            args.news_flash_id = Some(Input::new().with_prompt("News item id").interact_text()?);
        }
    }

    args.years = Input::new()
        .with_prompt("Lookback years")
        .default(5)
        .interact_text()?;

    let languages = [Language::He, Language::En, Language::Ar];
    let labels = languages.iter().map(Language::as_ref).collect::<Vec<_>>();
    let language = Select::new()
        .with_prompt("Language")
        .items(&labels)
        .default(0)
        .interact()?;
    args.lang = Some(languages[language]);

    Ok(args)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let multi = accident_map_cli_utils::init_logger();
    let cli = Cli::parse();

    let config = Config::load(cli.config.as_deref())?;
    let app = App::open(config)?;

    let Some(command) = cli.command else {
        println!("Accident Map");
        println!();

        let labels: Vec<&str> = Action::ALL.iter().map(Action::label).collect();
        let idx = Select::new()
            .with_prompt("What would you like to do?")
            .items(&labels)
            .default(0)
            .interact()?;

        return match Action::ALL[idx] {
            Action::Report => app.report(&prompt_report_args()?).await,
            Action::Rebuild => app.rebuild(&multi).await,
            Action::Info => app.info().await,
        };
    };

    match command {
        Commands::Rebuild => app.rebuild(&multi).await,
        Commands::Info => app.info().await,
        Commands::Report(args) => app.report(&args).await,
    }
}
