use crate::demo::{run_demo, DemoArgs};
use crate::jobs::{
    distribute_unassigned, recalculate_scores, render_distribution, render_recalculation,
    DistributeArgs, RecalculateArgs,
};
use crate::server;
use clap::{Args, Parser, Subcommand};
use leadflow::config::AppConfig;
use leadflow::error::AppError;
use leadflow::telemetry::{self, LogOutput};

#[derive(Parser, Debug)]
#[command(
    name = "leadflow",
    about = "Lead confirmation, distribution, and scoring for call center teams",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Retry distribution for confirmed leads that are still unassigned
    #[command(name = "leads:distribute-unassigned")]
    DistributeUnassigned(DistributeArgs),
    /// Recompute lead scores that are stale, or all of them with --all
    #[command(name = "leads:recalculate-scores")]
    RecalculateScores(RecalculateArgs),
    /// Walk a seeded call center through confirmation, distribution, and call outcomes
    Demo(DemoArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::DistributeUnassigned(args) => {
            let config = batch_config()?;
            let report = distribute_unassigned(args, &config.leads)?;
            println!("{}", render_distribution(&report));
            Ok(())
        }
        Command::RecalculateScores(args) => {
            let config = batch_config()?;
            let report = recalculate_scores(args, &config.leads)?;
            println!("{}", render_recalculation(&report));
            Ok(())
        }
        Command::Demo(args) => {
            let config = batch_config()?;
            run_demo(args, &config.leads)
        }
    }
}

fn batch_config() -> Result<AppConfig, AppError> {
    let config = AppConfig::load()?;
    telemetry::init(&config.telemetry, config.environment, LogOutput::Stderr)?;
    Ok(config)
}
