use std::{
    fs::{self, File},
    io::{BufWriter, Write as _},
    path::Path,
};

use chrono::{DateTime, Utc};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use skillnet_network::{ActivationFunction, DifficultyTier, LearningRate, Network, NetworkError};

use crate::{ModelKey, StoreError};

/// On-disk representation of one trained network.
///
/// Matrices are stored as nested arrays, one inner array per source neuron,
/// so `weights[i][from][to]` matches the in-memory `weights[i][(from, to)]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelFile {
    pub format_version: u32,
    pub name: String,
    pub tier: DifficultyTier,
    pub saved_at: DateTime<Utc>,
    pub layer_sizes: Vec<usize>,
    pub weights: Vec<Vec<Vec<f64>>>,
    pub biases: Vec<Vec<f64>>,
    pub activations: Vec<ActivationFunction>,
    pub learning_rate: LearningRate,
}

#[derive(Deserialize)]
struct VersionHeader {
    format_version: u32,
}

impl ModelFile {
    pub const FORMAT_VERSION: u32 = 1;

    /// Snapshots `network` under `key`, stamped with the current time.
    #[must_use]
    pub fn from_network(key: &ModelKey, network: &Network) -> Self {
        Self {
            format_version: Self::FORMAT_VERSION,
            name: key.name.clone(),
            tier: key.tier,
            saved_at: Utc::now(),
            layer_sizes: network.layer_sizes().to_vec(),
            weights: network.weights().iter().map(array2_to_vecs).collect(),
            biases: network.biases().iter().map(|bias| bias.to_vec()).collect(),
            activations: network.activations().to_vec(),
            learning_rate: network.learning_rate(),
        }
    }

    /// Rebuilds the network, checking every stored dimension.
    pub fn to_network(&self) -> Result<Network, NetworkError> {
        let weights = self
            .weights
            .iter()
            .enumerate()
            .map(|(i, rows)| vecs_to_array2(i, rows))
            .collect::<Result<Vec<_>, _>>()?;
        let biases = self.biases.iter().cloned().map(Array1::from).collect();
        Network::from_parts(
            self.layer_sizes.clone(),
            weights,
            biases,
            self.activations.clone(),
            self.learning_rate,
        )
    }

    #[must_use]
    pub fn key(&self) -> ModelKey {
        ModelKey::new(self.name.clone(), self.tier)
    }

    /// Reads a model file, rejecting unknown format versions.
    pub fn open<P>(path: P) -> Result<Self, StoreError>
    where
        P: AsRef<Path>,
    {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|source| StoreError::Io {
            path: path.to_owned(),
            source,
        })?;
        let parse_error = |source| StoreError::Parse {
            path: path.to_owned(),
            source,
        };

        let header: VersionHeader = serde_json::from_str(&json).map_err(parse_error)?;
        if header.format_version != Self::FORMAT_VERSION {
            return Err(StoreError::Version {
                path: path.to_owned(),
                found: header.format_version,
                expected: Self::FORMAT_VERSION,
            });
        }
        serde_json::from_str(&json).map_err(parse_error)
    }

    /// Writes the model as pretty JSON, creating parent directories as needed.
    ///
    /// The file is first written next to its destination and then renamed
    /// over it, so readers never observe a half-written model.
    pub fn save<P>(&self, path: P) -> Result<(), StoreError>
    where
        P: AsRef<Path>,
    {
        let path = path.as_ref();
        let io_error = |source| StoreError::Io {
            path: path.to_owned(),
            source,
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(io_error)?;
        }

        let tmp_path = path.with_extension("json.tmp");
        let result = self
            .write_to(&tmp_path)
            .and_then(|()| fs::rename(&tmp_path, path).map_err(io_error));
        if result.is_err() {
            let _ = fs::remove_file(&tmp_path);
        }
        result
    }

    fn write_to(&self, path: &Path) -> Result<(), StoreError> {
        let io_error = |source| StoreError::Io {
            path: path.to_owned(),
            source,
        };
        let file = File::create(path).map_err(io_error)?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self).map_err(|err| io_error(err.into()))?;
        writeln!(writer).map_err(io_error)?;
        writer.flush().map_err(io_error)
    }
}

fn array2_to_vecs(array: &Array2<f64>) -> Vec<Vec<f64>> {
    array.rows().into_iter().map(|row| row.to_vec()).collect()
}

fn vecs_to_array2(index: usize, rows: &[Vec<f64>]) -> Result<Array2<f64>, NetworkError> {
    let ncols = rows.first().map_or(0, Vec::len);
    if let Some(row) = rows.iter().position(|row| row.len() != ncols) {
        return Err(NetworkError::Configuration {
            reason: format!("weight matrix {index} has a ragged row {row}"),
        });
    }
    let flat = rows.iter().flatten().copied().collect();
    Array2::from_shape_vec((rows.len(), ncols), flat).map_err(|err| {
        NetworkError::Configuration {
            reason: format!("weight matrix {index}: {err}"),
        }
    })
}
