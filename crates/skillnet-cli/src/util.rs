use std::{
    fs::File,
    io::{self, BufWriter, Write},
    path::Path,
};

use anyhow::Context;
use skillnet_training::Trajectory;

/// Pretty-prints `value` as JSON to `output_path`, or to stdout when no path
/// is given.
pub fn write_json<T>(value: &T, output_path: Option<&Path>) -> anyhow::Result<()>
where
    T: serde::Serialize,
{
    match output_path {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("Failed to create output file: {}", path.display()))?;
            write_json_to(BufWriter::new(file), value)
                .with_context(|| format!("Failed to write JSON to {}", path.display()))
        }
        None => {
            write_json_to(io::stdout().lock(), value).context("Failed to write JSON to stdout")
        }
    }
}

fn write_json_to<W, T>(mut writer: W, value: &T) -> anyhow::Result<()>
where
    W: Write,
    T: serde::Serialize,
{
    serde_json::to_writer_pretty(&mut writer, value)?;
    writeln!(writer)?;
    writer.flush()?;
    Ok(())
}

pub fn read_json_file<T, P>(file_kind: &str, path: P) -> anyhow::Result<T>
where
    T: serde::de::DeserializeOwned,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let file = File::open(path)
        .with_context(|| format!("Failed to open {} file: {}", file_kind, path.display()))?;

    let reader = io::BufReader::new(file);
    let value = serde_json::from_reader(reader).with_context(|| {
        format!(
            "Failed to parse {} JSON file: {}",
            file_kind,
            path.display()
        )
    })?;

    Ok(value)
}

/// Read a replay dataset: a JSON array of trajectories, each an array of
/// `{features, outcome}` records.
pub fn read_dataset_file<P>(path: P) -> anyhow::Result<Vec<Trajectory>>
where
    P: AsRef<Path>,
{
    read_json_file("dataset", path)
}

/// Parse a comma-separated feature vector such as `0.5,-1,2e-3`.
pub fn parse_features(text: &str) -> anyhow::Result<Vec<f64>> {
    text.split(',')
        .map(str::trim)
        .enumerate()
        .map(|(i, value)| {
            let parsed: f64 = value
                .parse()
                .with_context(|| format!("Feature {i} is not a number: {value:?}"))?;
            anyhow::ensure!(parsed.is_finite(), "Feature {i} is not finite: {value}");
            Ok(parsed)
        })
        .collect()
}
