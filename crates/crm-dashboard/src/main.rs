//! `crm-dashboard` command-line entry point

use anyhow::{bail, Context};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use crm_dashboard::console::{ConsoleSurface, ConsoleToasts};
use crm_dashboard::{
    run_simulator, telemetry, DashboardConfig, HttpDataAccess, Lead, LeadStage, LoggingConfig,
    PipelineBoard, SimulatorConfig,
};
use crm_sync::{EntityId, MutationOutcome, Notifier, SyncError};
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config_arg = || {
        Arg::new("config")
            .long("config")
            .default_value("crm-dashboard.toml")
            .help("Path to the TOML configuration")
    };

    let cli = Command::new("crm-dashboard")
        .version(crm_dashboard::VERSION)
        .about("CRM dashboard sync tools")
        .subcommand_required(true)
        .subcommand(
            Command::new("simulate")
                .about("Run the pipeline simulator against the in-memory backend")
                .arg(
                    Arg::new("ops")
                        .long("ops")
                        .default_value("1000")
                        .value_parser(value_parser!(u64))
                        .help("Number of operations to simulate"),
                )
                .arg(
                    Arg::new("seed")
                        .long("seed")
                        .default_value("42")
                        .value_parser(value_parser!(u64))
                        .help("Random seed for reproducibility"),
                )
                .arg(
                    Arg::new("failure-rate")
                        .long("failure-rate")
                        .default_value("0.2")
                        .value_parser(value_parser!(f64))
                        .help("Probability that a remote call fails"),
                )
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Output as JSON"),
                ),
        )
        .subcommand(
            Command::new("board")
                .about("Load leads and print stage counts and values")
                .arg(config_arg()),
        )
        .subcommand(
            Command::new("move")
                .about("Move one lead to another stage")
                .arg(config_arg())
                .arg(Arg::new("lead").long("lead").required(true).help("Lead id"))
                .arg(
                    Arg::new("stage")
                        .long("stage")
                        .required(true)
                        .value_parser(value_parser!(String))
                        .help("Target stage, e.g. contacted"),
                ),
        );

    let matches = cli.get_matches();

    match matches.subcommand() {
        Some(("simulate", args)) => simulate(args).await,
        Some(("board", args)) => {
            let board = connect(args)?;
            board.reload().await.context("loading leads")?;
            print_board(&board);
            Ok(())
        }
        Some(("move", args)) => move_lead(args).await,
        Some((other, _)) => bail!("unknown subcommand: {other}"),
        None => bail!("no subcommand given; see --help"),
    }
}

async fn simulate(args: &ArgMatches) -> anyhow::Result<()> {
    telemetry::init(&LoggingConfig::default())?;

    let ops = args.get_one::<u64>("ops").copied().unwrap_or(1_000);
    let seed = args.get_one::<u64>("seed").copied().unwrap_or(42);
    let rate = args.get_one::<f64>("failure-rate").copied().unwrap_or(0.2);

    let config = SimulatorConfig::default()
        .with_seed(seed)
        .with_ops(ops)
        .with_failure_rate(rate);
    let report = run_simulator(config).await;

    if args.get_flag("json") {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        println!("{}", report.generate_text());
    }

    std::process::exit(if report.passed() { 0 } else { 1 });
}

fn connect(args: &ArgMatches) -> anyhow::Result<PipelineBoard> {
    let path = args
        .get_one::<String>("config")
        .context("--config is required")?;
    let config = DashboardConfig::load(path).with_context(|| format!("loading {path}"))?;
    telemetry::init(&config.logging)?;

    let api: HttpDataAccess<Lead> = HttpDataAccess::new(&config.api, "leads")?;
    let notifier = Notifier::with_window(Arc::new(ConsoleToasts), config.notifications.window());
    Ok(PipelineBoard::new(Arc::new(api), Arc::new(ConsoleSurface::new().quiet()), notifier))
}

async fn move_lead(args: &ArgMatches) -> anyhow::Result<()> {
    let lead = args.get_one::<String>("lead").context("--lead is required")?;
    let stage: LeadStage = args
        .get_one::<String>("stage")
        .context("--stage is required")?
        .parse()?;

    let board = connect(args)?;
    board.reload().await.context("loading leads")?;

    match board.move_lead(&EntityId::from(lead.as_str()), stage).await {
        Ok(MutationOutcome::Confirmed) => println!("{lead} moved to {stage}"),
        Ok(MutationOutcome::Unchanged) => println!("{lead} is already in {stage}"),
        Ok(MutationOutcome::NotFound) => bail!("no lead with id {lead}"),
        Err(e @ SyncError::Recoverable { .. }) => bail!("move reverted: {e}"),
        Err(e) => return Err(e).context("move failed"),
    }
    print_board(&board);
    Ok(())
}

fn print_board(board: &PipelineBoard) {
    println!("{:<12} {:>6} {:>12}", "stage", "leads", "value");
    for (stage, count) in board.stage_counts() {
        println!("{:<12} {:>6} {:>12}", stage.as_str(), count, board.stage_value(stage));
    }
    println!("open pipeline value: {}", board.open_pipeline_value());
}
