use std::path::PathBuf;

use anyhow::Context as _;
use serde::Serialize;
use skillnet_store::ModelFile;

use crate::util;

#[derive(Debug, Clone, clap::Args)]
pub(crate) struct InspectArg {
    /// Model file to inspect
    path: PathBuf,
    /// Print the summary as JSON
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Serialize)]
struct ModelSummary {
    name: String,
    tier: String,
    saved_at: String,
    format_version: u32,
    architecture: String,
    parameters: usize,
    learning_rate: f64,
}

pub(crate) fn run(arg: &InspectArg) -> anyhow::Result<()> {
    let file = ModelFile::open(&arg.path)?;
    let network = file
        .to_network()
        .with_context(|| format!("Model file is inconsistent: {}", arg.path.display()))?;

    let parameters: usize = network
        .weights()
        .iter()
        .map(|w| w.len())
        .chain(network.biases().iter().map(|b| b.len()))
        .sum();
    let summary = ModelSummary {
        name: file.name.clone(),
        tier: file.tier.to_string(),
        saved_at: file.saved_at.to_rfc3339(),
        format_version: file.format_version,
        architecture: network.architecture().to_string(),
        parameters,
        learning_rate: network.learning_rate().get(),
    };

    if arg.json {
        return util::write_json(&summary, None);
    }
    println!("Path:          {}", arg.path.display());
    println!("Name:          {}", summary.name);
    println!("Tier:          {}", summary.tier);
    println!("Saved at:      {}", summary.saved_at);
    println!("Format:        v{}", summary.format_version);
    println!("Architecture:  {}", summary.architecture);
    println!("Parameters:    {}", summary.parameters);
    println!("Learning rate: {}", summary.learning_rate);
    Ok(())
}
