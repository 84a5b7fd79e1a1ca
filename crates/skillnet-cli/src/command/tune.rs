use std::sync::Arc;

use rand::SeedableRng as _;
use rand_pcg::Pcg32;
use skillnet_training::{TrainingJob, Trajectory, split_validation};

use super::train::TrainArg;

#[derive(Debug, Clone, clap::Args)]
pub(crate) struct TuneArg {
    #[clap(flatten)]
    train: TrainArg,
    /// Share of trajectories held out for scoring candidates (overrides the settings file)
    #[arg(long)]
    validation_fraction: Option<f64>,
    /// Epochs per search candidate (overrides the settings file)
    #[arg(long)]
    search_epochs: Option<usize>,
}

pub(crate) fn run(arg: &TuneArg) -> anyhow::Result<()> {
    let mut settings = arg.train.load_settings()?;
    if let Some(fraction) = arg.validation_fraction {
        settings.validation_fraction = fraction;
    }
    if let Some(epochs) = arg.search_epochs {
        settings.search.search_epochs = epochs;
    }
    settings.validate()?;
    settings.search.validate()?;

    let mut rng = match settings.training.seed {
        Some(seed) => Pcg32::seed_from_u64(seed),
        None => Pcg32::from_rng(&mut rand::rng()),
    };
    let (training, validation) = split_validation(
        arg.train.load_dataset()?,
        settings.validation_fraction,
        &mut rng,
    );
    eprintln!(
        "Using {} trajectories for training and {} for validation",
        training.len(),
        validation.len()
    );

    let dataset: Arc<[Trajectory]> = training.into();
    let job = TrainingJob::Tune {
        search: settings.search.clone(),
        validation: validation.into(),
    };
    arg.train.orchestrate(&settings, &dataset, &job)
}
