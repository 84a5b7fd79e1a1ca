use std::{path::PathBuf, sync::Arc};

use skillnet_network::DifficultyTier;
use skillnet_training::{
    OrchestrationReport, Orchestrator, TierOutcome, Trainer, TrainingJob, Trajectory,
};

use crate::{settings::TrainerSettings, util};

/// Arguments shared by `train` and `tune`.
#[derive(Debug, Clone, clap::Args)]
pub(crate) struct TrainArg {
    /// Replay dataset (JSON array of trajectories)
    dataset: PathBuf,
    /// Training settings file
    #[arg(long, default_value = "skillnet.json")]
    settings: PathBuf,
    /// Directory holding model files (overrides the settings file)
    #[arg(long)]
    models_dir: Option<PathBuf>,
    /// Tier to train; repeat for several (defaults to the settings file)
    #[arg(long = "tier")]
    tiers: Vec<DifficultyTier>,
    /// Number of epochs (overrides the settings file)
    #[arg(long)]
    epochs: Option<usize>,
    /// Seed for reproducible runs (overrides the settings file)
    #[arg(long)]
    seed: Option<u64>,
    /// Write the run report as JSON to this file
    #[arg(long)]
    report: Option<PathBuf>,
}

impl TrainArg {
    /// Settings file with the command line overrides applied.
    pub(super) fn load_settings(&self) -> anyhow::Result<TrainerSettings> {
        let mut settings = TrainerSettings::open(&self.settings)?;
        if let Some(models_dir) = &self.models_dir {
            settings.models_dir.clone_from(models_dir);
        }
        if !self.tiers.is_empty() {
            settings.tiers.clone_from(&self.tiers);
        }
        if let Some(epochs) = self.epochs {
            settings.training.epochs = epochs;
        }
        if let Some(seed) = self.seed {
            settings.training.seed = Some(seed);
        }
        Ok(settings)
    }

    pub(super) fn load_dataset(&self) -> anyhow::Result<Vec<Trajectory>> {
        let dataset = util::read_dataset_file(&self.dataset)?;
        eprintln!(
            "Loaded {} trajectories from {}",
            dataset.len(),
            self.dataset.display()
        );
        Ok(dataset)
    }

    /// Runs `job` for every configured tier and reports the outcome.
    pub(super) fn orchestrate(
        &self,
        settings: &TrainerSettings,
        dataset: &Arc<[Trajectory]>,
        job: &TrainingJob,
    ) -> anyhow::Result<()> {
        let store = Arc::new(settings.build_store()?);
        let trainer = Arc::new(Trainer::new(store, settings.training.clone())?);
        let orchestrator = Orchestrator::new(trainer, settings.timeout());
        let report = orchestrator.run(&settings.tiers, dataset, job)?;

        print_report(&report);
        if let Some(path) = &self.report {
            util::write_json(&report, Some(path.as_path()))?;
            eprintln!("Report written to {}", path.display());
        }

        let failed: Vec<_> = report
            .outcomes
            .iter()
            .filter(|(_, outcome)| outcome.is_failed())
            .map(|(tier, _)| tier.to_string())
            .collect();
        anyhow::ensure!(
            failed.is_empty(),
            "Training failed for tiers: {}",
            failed.join(", ")
        );
        Ok(())
    }
}

pub(crate) fn run(arg: &TrainArg) -> anyhow::Result<()> {
    let settings = arg.load_settings()?;
    let dataset: Arc<[Trajectory]> = arg.load_dataset()?.into();
    arg.orchestrate(&settings, &dataset, &TrainingJob::Train)
}

fn print_report(report: &OrchestrationReport) {
    eprintln!();
    eprintln!("Training summary:");
    for (tier, outcome) in &report.outcomes {
        let tier = tier.to_string();
        match outcome {
            TierOutcome::Completed(tier_report) => {
                let error = tier_report
                    .final_error()
                    .map_or_else(|| "-".to_owned(), |e| format!("{e:.6}"));
                let accuracy = tier_report
                    .final_accuracy
                    .map_or_else(|| "-".to_owned(), |a| format!("{:.1}%", a * 100.0));
                eprintln!(
                    "  {tier:<8} completed: {} epochs, {} samples, error {error}, accuracy {accuracy}",
                    tier_report.epochs_run(),
                    tier_report.sample_count
                );
                if let Some(hyperparameters) = &tier_report.hyperparameters {
                    eprintln!("  {:<8} tuned: {hyperparameters}", "");
                }
            }
            TierOutcome::Failed { reason } => eprintln!("  {tier:<8} FAILED: {reason}"),
            TierOutcome::Unconfirmed => eprintln!("  {tier:<8} still running (not confirmed)"),
        }
    }
    if report.timed_out {
        eprintln!("Timed out before every tier reported back; unconfirmed tiers keep running.");
    }
}
