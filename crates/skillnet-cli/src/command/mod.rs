use clap::{Parser, Subcommand};

use self::{inspect::InspectArg, predict::PredictArg, train::TrainArg, tune::TuneArg};

mod inspect;
mod predict;
mod train;
mod tune;

#[derive(Debug, Clone, Parser)]
#[command(author, version, about, long_about = None)]
pub struct CommandArgs {
    /// Log debug messages (overridden by `RUST_LOG`)
    #[arg(long, short, global = true)]
    verbose: bool,
    #[command(subcommand)]
    mode: Mode,
}

#[derive(Debug, Clone, Subcommand)]
enum Mode {
    /// Train every configured tier in parallel on a replay dataset
    Train(#[clap(flatten)] TrainArg),
    /// Search hyperparameters per tier, then train with the best ones
    Tune(#[clap(flatten)] TuneArg),
    /// Score a feature vector with a stored model
    Predict(#[clap(flatten)] PredictArg),
    /// Show the metadata of a model file
    Inspect(#[clap(flatten)] InspectArg),
}

pub fn run() -> anyhow::Result<()> {
    let args = CommandArgs::parse();
    init_logger(args.verbose);
    match args.mode {
        Mode::Train(arg) => train::run(&arg)?,
        Mode::Tune(arg) => tune::run(&arg)?,
        Mode::Predict(arg) => predict::run(&arg)?,
        Mode::Inspect(arg) => inspect::run(&arg)?,
    }
    Ok(())
}

fn init_logger(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, level),
    )
    .init();
}
