//! CLI command definitions, routing, and tracing setup.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr, eyre};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use tracing::{info, warn};

use kidplanner_core::{
    CapabilityRegistry, OfflineCompletion, OpenRouterClient, PipelinePhase, PipelineState,
    ProgressReporter, RecommendationPipeline, RecommendationResponse, StageName, TextCompletion,
};
use kidplanner_discovery::{EventFinder, EventQuery, mock_events};
use kidplanner_shared::{
    ActivityRequest, AppConfig, AvailableDay, BudgetPreference, PipelineSettings, TimeOfDay,
    Transportation, api_key, init_config, load_config, render_listing,
};

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// KidPlanner: find, vet, and schedule local activities for kids.
#[derive(Parser)]
#[command(
    name = "kidplanner",
    version,
    about = "Recommend local activities for a child, checked for safety and fitted to the family schedule.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Run the recommendation pipeline for one child.
    Plan(PlanArgs),

    /// Print the events known to the configured sources.
    Catalog {
        /// Only events near this location.
        #[arg(short, long, default_value = "")]
        location: String,
    },

    /// Configuration management.
    Config {
        /// Config subcommand.
        #[command(subcommand)]
        action: ConfigAction,
    },
}

/// Request fields for `plan`. Either `--request` or `--age` and `--location`.
#[derive(Args)]
pub(crate) struct PlanArgs {
    /// JSON request file (overrides the per-field flags).
    #[arg(long, conflicts_with_all = ["age", "location"])]
    pub request: Option<PathBuf>,

    /// Child age in years.
    #[arg(short, long)]
    pub age: Option<u32>,

    /// Home location, e.g. "Cleveland, OH".
    #[arg(short, long)]
    pub location: Option<String>,

    /// Interests, most important first (comma-separated or repeated).
    #[arg(long = "interest", value_delimiter = ',')]
    pub interests: Vec<String>,

    /// Activity-type preferences such as indoor or educational.
    #[arg(long = "activity-type", value_delimiter = ',')]
    pub activity_types: Vec<String>,

    /// Special-needs tags such as wheelchair.
    #[arg(long = "special-need", value_delimiter = ',')]
    pub special_needs: Vec<String>,

    /// Budget tier: budget, moderate, or premium.
    #[arg(short, long)]
    pub budget: Option<String>,

    /// Available days: weekend, weekday, any.
    #[arg(long = "day", value_delimiter = ',')]
    pub days: Vec<String>,

    /// Preferred times: morning, afternoon, evening.
    #[arg(long = "time", value_delimiter = ',')]
    pub times: Vec<String>,

    /// Transportation: car, transit, walk, or bike.
    #[arg(long)]
    pub transport: Option<String>,

    /// Date window (defaults to the configured one).
    #[arg(long)]
    pub date_range: Option<String>,

    /// OpenRouter model id (defaults to the configured one).
    #[arg(short, long)]
    pub model: Option<String>,

    /// Use the deterministic offline completion instead of OpenRouter.
    #[arg(long)]
    pub offline: bool,

    /// Print the full pipeline state instead of the response.
    #[arg(long)]
    pub state: bool,

    /// Print JSON on one line.
    #[arg(long)]
    pub compact: bool,
}

/// Config subcommands.
#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "kidplanner=info",
        1 => "kidplanner=debug",
        _ => "kidplanner=trace",
    };

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    // Logs go to stderr so stdout stays valid JSON.
    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Plan(args) => cmd_plan(args).await,
        Command::Catalog { location } => cmd_catalog(&location).await,
        Command::Config { action } => match action {
            ConfigAction::Init => cmd_config_init().await,
            ConfigAction::Show => cmd_config_show().await,
        },
    }
}

// ---------------------------------------------------------------------------
// plan
// ---------------------------------------------------------------------------

async fn cmd_plan(args: PlanArgs) -> Result<()> {
    let config = load_config()?;
    let settings = PipelineSettings::from(&config);
    let request = build_request(&args, &settings)?;

    let completion: Arc<dyn TextCompletion> = if args.offline {
        Arc::new(OfflineCompletion)
    } else {
        let key = api_key(&config)?;
        let mut client = OpenRouterClient::new(&config.openrouter, key, settings.call_timeout)?;
        if let Some(model) = &args.model {
            client = client.with_model(model.as_str());
        }
        Arc::new(client)
    };

    let finder =
        EventFinder::from_config(&config.sources)?.with_fallback_count(settings.fallback_count);
    let registry = Arc::new(CapabilityRegistry::standard(finder));

    info!(
        age = request.child.age,
        location = %request.child.location,
        completion = completion.name(),
        "planning activities"
    );

    let pipeline = RecommendationPipeline::new(completion, registry, settings);
    let reporter = CliProgress::new();
    let state = pipeline.run(&request, &reporter).await?;

    if args.state {
        print_json(&state, args.compact)
    } else {
        let response = RecommendationResponse::from_state(
            &state,
            &mock_events(),
            pipeline.settings().fallback_count,
        );
        print_json(&response, args.compact)
    }
}

/// Assemble the request from `--request` or the per-field flags.
fn build_request(args: &PlanArgs, settings: &PipelineSettings) -> Result<ActivityRequest> {
    if let Some(path) = &args.request {
        return read_request(path);
    }

    let age = args.age.ok_or_else(|| eyre!("--age is required (or pass --request <file>)"))?;
    let location = args
        .location
        .as_deref()
        .ok_or_else(|| eyre!("--location is required (or pass --request <file>)"))?;

    let mut request = ActivityRequest::new(age, location);
    request.date_range = args
        .date_range
        .clone()
        .unwrap_or_else(|| settings.date_range.clone());
    request.child.interests = args.interests.clone();
    request.child.activity_types = args.activity_types.clone();
    request.child.special_needs = args.special_needs.clone();
    if let Some(budget) = &args.budget {
        request.child.budget = budget.parse::<BudgetPreference>()?;
    }
    if !args.days.is_empty() {
        request.schedule.available_days = args
            .days
            .iter()
            .map(|d| d.parse::<AvailableDay>())
            .collect::<Result<BTreeSet<_>, _>>()?;
    }
    if !args.times.is_empty() {
        request.schedule.preferred_times = args
            .times
            .iter()
            .map(|t| t.parse::<TimeOfDay>())
            .collect::<Result<Vec<_>, _>>()?;
    }
    if let Some(transport) = &args.transport {
        request.schedule.transportation = transport.parse::<Transportation>()?;
    }
    Ok(request)
}

fn read_request(path: &Path) -> Result<ActivityRequest> {
    let content = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("failed to read request file {}", path.display()))?;
    serde_json::from_str(&content)
        .wrap_err_with(|| format!("invalid request JSON in {}", path.display()))
}

fn print_json<T: Serialize>(value: &T, compact: bool) -> Result<()> {
    let out = if compact {
        serde_json::to_string(value)?
    } else {
        serde_json::to_string_pretty(value)?
    };
    println!("{out}");
    Ok(())
}

// ---------------------------------------------------------------------------
// CLI progress reporter
// ---------------------------------------------------------------------------

/// CLI progress reporter using an indicatif spinner.
struct CliProgress {
    spinner: ProgressBar,
}

impl CliProgress {
    fn new() -> Self {
        let spinner = ProgressBar::new_spinner();
        let style = ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"]);
        spinner.set_style(style);
        spinner.enable_steady_tick(Duration::from_millis(80));
        Self { spinner }
    }
}

impl ProgressReporter for CliProgress {
    fn phase(&self, phase: PipelinePhase) {
        let message = match phase {
            PipelinePhase::Pending => "Preparing request",
            PipelinePhase::Running => "Finding events, checking safety, fitting the schedule",
            PipelinePhase::Converging => "Writing the activity plan",
            PipelinePhase::Done => "Done",
        };
        self.spinner.set_message(message);
    }

    fn stage_started(&self, _stage: StageName) {}

    fn stage_finished(&self, stage: StageName, degraded: bool) {
        if degraded {
            self.spinner.println(format!("  ⚠ {stage} stage degraded"));
        } else {
            self.spinner.println(format!("  ✓ {stage}"));
        }
    }

    fn done(&self, _state: &PipelineState) {
        self.spinner.finish_and_clear();
    }
}

// ---------------------------------------------------------------------------
// catalog / config
// ---------------------------------------------------------------------------

async fn cmd_catalog(location: &str) -> Result<()> {
    let config = load_config()?;
    let finder = EventFinder::from_config(&config.sources)?;
    info!(sources = ?finder.source_names(), location, "listing events");

    let outcome = finder.find(&EventQuery::new(location)).await;
    for error in &outcome.errors {
        warn!(%error, "source unavailable");
    }

    let header = match (location.trim().is_empty(), outcome.location_matched) {
        (true, _) => format!("{} events:", outcome.activities.len()),
        (false, true) => format!("{} events near {location}:", outcome.activities.len()),
        (false, false) => format!("Nothing listed near {location}; popular picks:"),
    };
    print!("{}", render_listing(&header, &outcome.activities));
    Ok(())
}

async fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

async fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn parse(args: &[&str]) -> PlanArgs {
        let cli = Cli::try_parse_from(args).expect("parse");
        match cli.command {
            Command::Plan(args) => args,
            _ => panic!("expected plan"),
        }
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn flags_build_a_request() {
        let args = parse(&[
            "kidplanner", "plan", "--age", "8", "--location", "Cleveland, OH",
            "--interest", "science,art", "--budget", "budget", "--day", "weekend,weekday",
            "--time", "evening", "--transport", "transit",
        ]);
        let request = build_request(&args, &PipelineSettings::default()).unwrap();

        assert_eq!(request.child.age, 8);
        assert_eq!(request.child.interests, ["science", "art"]);
        assert_eq!(request.child.budget, BudgetPreference::Budget);
        assert_eq!(request.schedule.available_days.len(), 2);
        assert_eq!(request.schedule.preferred_times, [TimeOfDay::Evening]);
        assert_eq!(request.schedule.transportation, Transportation::Transit);
        assert_eq!(request.date_range, "next_2_weeks");
    }

    #[test]
    fn missing_location_is_reported() {
        let args = parse(&["kidplanner", "plan", "--age", "8"]);
        let err = build_request(&args, &PipelineSettings::default()).unwrap_err();
        assert!(err.to_string().contains("--location"));
    }

    #[test]
    fn unknown_budget_is_rejected() {
        let args = parse(&["kidplanner", "plan", "-a", "8", "-l", "Austin", "-b", "lavish"]);
        assert!(build_request(&args, &PipelineSettings::default()).is_err());
    }
}
