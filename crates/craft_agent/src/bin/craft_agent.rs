//! Drives the agent control loop against a running bot service.

use std::path::PathBuf;
use std::process;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use craft_agent::engine::{
    AgentConfig, AgentController, ChainLibrary, CustomChainStore, ExperienceMemory,
    HttpActionGateway, HttpPlanner, HttpPlannerConfig, PlanRequest, Planner, PlannerDirective,
    PlannerError, QueuePlanner, SystemClock, DEFAULT_PLANNER_TIMEOUT_MS,
};
use craft_agent::logging;
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(
    name = "craft_agent",
    version,
    about = "Run the survival and crafting engine against a bot service"
)]
struct Cli {
    /// Stop after this many ticks. Runs until Ctrl-C when omitted.
    #[arg(long)]
    ticks: Option<u64>,
    #[arg(long, default_value_t = 500)]
    interval_ms: u64,
    /// Chains started in order when no planner URL is configured.
    #[arg(
        long,
        value_delimiter = ',',
        default_value = "get_wood,make_wooden_pickaxe,make_stone_pickaxe,make_iron_pickaxe"
    )]
    chains: Vec<String>,
    /// Escalated attempts per queued chain before moving on.
    #[arg(long, default_value_t = 2)]
    chain_attempts: u32,
    /// External planner endpoint; overrides the configured one.
    #[arg(long)]
    planner_url: Option<String>,
    /// Bot service base URL; overrides the configured one.
    #[arg(long)]
    bot_url: Option<String>,
    #[arg(long)]
    experience_file: Option<PathBuf>,
    #[arg(long)]
    custom_chains_file: Option<PathBuf>,
    /// TOML config file; defaults to `config.toml` when present, else env.
    #[arg(long)]
    config: Option<PathBuf>,
}

/// Planner picked at startup.
enum CliPlanner {
    Http(HttpPlanner),
    Queue(QueuePlanner),
}

impl Planner for CliPlanner {
    fn plan(&mut self, request: &PlanRequest<'_>) -> Result<PlannerDirective, PlannerError> {
        match self {
            CliPlanner::Http(planner) => planner.plan(request),
            CliPlanner::Queue(planner) => planner.plan(request),
        }
    }
}

fn main() {
    logging::init();
    if let Err(err) = run(Cli::parse()) {
        eprintln!("craft_agent failed: {err}");
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), String> {
    let mut config = match &cli.config {
        Some(path) => AgentConfig::from_config_file(path),
        None => AgentConfig::from_default_sources(),
    }
    .map_err(|err| format!("load config failed: {err}"))?;
    if let Some(url) = &cli.bot_url {
        config.gateway.base_url = url.trim_end_matches('/').to_string();
    }
    if let Some(url) = &cli.planner_url {
        let timeout_ms = config
            .planner
            .as_ref()
            .map(|planner| planner.timeout_ms)
            .unwrap_or(DEFAULT_PLANNER_TIMEOUT_MS);
        config.planner = Some(HttpPlannerConfig {
            url: url.clone(),
            timeout_ms,
        });
    }

    let gateway = HttpActionGateway::from_config(&config.gateway)
        .map_err(|err| format!("build gateway failed: {err}"))?;
    let planner = match &config.planner {
        Some(planner) => CliPlanner::Http(
            HttpPlanner::from_config(planner)
                .map_err(|err| format!("build planner failed: {err}"))?,
        ),
        None => CliPlanner::Queue(QueuePlanner::new(cli.chains.clone(), cli.chain_attempts)),
    };

    let mut controller = AgentController::new(gateway, SystemClock, planner, config.engine.clone());
    if let Some(path) = &cli.experience_file {
        let experience = ExperienceMemory::open(path, &config.engine)
            .map_err(|err| format!("open experience file {} failed: {err}", path.display()))?;
        controller = controller.with_experience(Box::new(experience));
    }
    if let Some(path) = &cli.custom_chains_file {
        let store = CustomChainStore::open(path)
            .map_err(|err| format!("open custom chains {} failed: {err}", path.display()))?;
        controller = controller.with_library(ChainLibrary::new(store));
    }

    let stop = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&stop);
    ctrlc::set_handler(move || flag.store(true, Ordering::SeqCst))
        .map_err(|err| format!("install ctrl-c handler failed: {err}"))?;

    info!(
        bot = %config.gateway.base_url,
        planner = config.planner.as_ref().map(|planner| planner.url.as_str()).unwrap_or("queue"),
        ticks = ?cli.ticks,
        "control loop starting"
    );
    let ran = controller.run(cli.ticks, Duration::from_millis(cli.interval_ms), &stop);

    let metrics = controller.metrics();
    info!(ticks = ran, summary = %metrics.summary(), "control loop finished");
    match serde_json::to_string_pretty(metrics) {
        Ok(json) => println!("{json}"),
        Err(err) => warn!(error = %err, "encode metrics failed"),
    }
    Ok(())
}
