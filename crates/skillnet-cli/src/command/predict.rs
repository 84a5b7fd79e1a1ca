use std::path::PathBuf;

use anyhow::Context as _;
use skillnet_network::DifficultyTier;

use crate::{settings::TrainerSettings, util};

#[derive(Debug, Clone, clap::Args)]
pub(crate) struct PredictArg {
    /// Comma-separated feature values, e.g. `0.5,-1,0.25`
    #[arg(long, allow_hyphen_values = true)]
    features: String,
    #[arg(long, default_value = "medium")]
    tier: DifficultyTier,
    /// Model name (defaults to the settings file)
    #[arg(long)]
    model_name: Option<String>,
    /// Training settings file
    #[arg(long, default_value = "skillnet.json")]
    settings: PathBuf,
    /// Directory holding model files (overrides the settings file)
    #[arg(long)]
    models_dir: Option<PathBuf>,
}

pub(crate) fn run(arg: &PredictArg) -> anyhow::Result<()> {
    let mut settings = TrainerSettings::open(&arg.settings)?;
    if let Some(models_dir) = &arg.models_dir {
        settings.models_dir.clone_from(models_dir);
    }
    let name = arg
        .model_name
        .as_deref()
        .unwrap_or(&settings.training.model_name);
    let features = util::parse_features(&arg.features)?;

    let store = settings.build_store()?;
    let network = store.load_model(name, arg.tier);
    let score = network
        .read()
        .predict(&features)
        .with_context(|| format!("Cannot score with model {name} ({})", arg.tier))?;

    println!("{score:.6}");
    Ok(())
}
