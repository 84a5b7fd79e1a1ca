use ndarray::{Array1, Array2, ArrayView1, Zip};
use rand::{Rng as _, SeedableRng as _};
use rand_pcg::Pcg32;
use serde::{Deserialize, Serialize};

use crate::{ActivationFunction, Architecture, DifficultyTier, NetworkError};

/// Half-width of the uniform range fresh biases are drawn from.
const INITIAL_BIAS_RANGE: f64 = 0.01;

/// Positive, finite gradient descent step size.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct LearningRate(f64);

impl LearningRate {
    pub fn new(value: f64) -> Result<Self, NetworkError> {
        if value.is_finite() && value > 0.0 {
            Ok(Self(value))
        } else {
            Err(NetworkError::configuration(format!(
                "learning rate must be positive and finite, got {value}"
            )))
        }
    }

    #[must_use]
    pub const fn get(self) -> f64 {
        self.0
    }
}

impl TryFrom<f64> for LearningRate {
    type Error = NetworkError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<LearningRate> for f64 {
    fn from(rate: LearningRate) -> Self {
        rate.0
    }
}

/// Fully-connected feed-forward network trained by backpropagation.
///
/// Weight matrix `i` has shape `layer_sizes[i] × layer_sizes[i + 1]`
/// (rows are source neurons, columns are target neurons) and bias vector `i`
/// has length `layer_sizes[i + 1]`. These invariants are established by every
/// constructor and preserved by training.
///
/// The network exclusively owns its parameters; training takes `&mut self`.
#[derive(Debug, Clone, PartialEq)]
pub struct Network {
    architecture: Architecture,
    weights: Vec<Array2<f64>>,
    biases: Vec<Array1<f64>>,
    learning_rate: LearningRate,
}

/// Values cached by a forward pass for the backward pass.
///
/// `outputs[0]` is the input itself; `sums[i]` and `outputs[i + 1]` belong to
/// transition `i`.
#[derive(Debug)]
struct ForwardTrace {
    sums: Vec<Array1<f64>>,
    outputs: Vec<Array1<f64>>,
}

impl Network {
    /// Creates a randomly initialized network.
    ///
    /// Weights are Xavier/Glorot-uniform in `±sqrt(6 / (fan_in + fan_out))`,
    /// biases are near zero. The same `seed` always yields the same parameters.
    #[must_use]
    pub fn new(architecture: &Architecture, learning_rate: LearningRate, seed: u64) -> Self {
        let mut rng = Pcg32::seed_from_u64(seed);
        let sizes = architecture.layer_sizes();
        let mut weights = Vec::with_capacity(architecture.transition_count());
        let mut biases = Vec::with_capacity(architecture.transition_count());
        for pair in sizes.windows(2) {
            let (fan_in, fan_out) = (pair[0], pair[1]);
            #[expect(clippy::cast_precision_loss)]
            let limit = (6.0 / (fan_in + fan_out) as f64).sqrt();
            weights.push(Array2::from_shape_fn((fan_in, fan_out), |_| {
                rng.random_range(-limit..=limit)
            }));
            biases.push(Array1::from_shape_fn(fan_out, |_| {
                rng.random_range(-INITIAL_BIAS_RANGE..=INITIAL_BIAS_RANGE)
            }));
        }
        Self {
            architecture: architecture.clone(),
            weights,
            biases,
            learning_rate,
        }
    }

    /// Like [`Self::new`], seeded from the tier and the architecture hash.
    #[must_use]
    pub fn for_tier(
        architecture: &Architecture,
        tier: DifficultyTier,
        learning_rate: LearningRate,
    ) -> Self {
        Self::new(architecture, learning_rate, tier.init_seed(architecture))
    }

    /// Reassembles a network from stored parameters, checking every dimension.
    pub fn from_parts(
        layer_sizes: Vec<usize>,
        weights: Vec<Array2<f64>>,
        biases: Vec<Array1<f64>>,
        activations: Vec<ActivationFunction>,
        learning_rate: LearningRate,
    ) -> Result<Self, NetworkError> {
        let architecture = Architecture::new(layer_sizes, activations)?;
        let sizes = architecture.layer_sizes();
        let transitions = architecture.transition_count();
        if weights.len() != transitions || biases.len() != transitions {
            return Err(NetworkError::configuration(format!(
                "{transitions} transitions need as many weight matrices and bias vectors, got {} and {}",
                weights.len(),
                biases.len()
            )));
        }
        for (i, (w, b)) in weights.iter().zip(&biases).enumerate() {
            let expected = (sizes[i], sizes[i + 1]);
            if w.dim() != expected {
                return Err(NetworkError::configuration(format!(
                    "weight matrix {i} has shape {:?}, expected {expected:?}",
                    w.dim()
                )));
            }
            if b.len() != sizes[i + 1] {
                return Err(NetworkError::configuration(format!(
                    "bias vector {i} has length {}, expected {}",
                    b.len(),
                    sizes[i + 1]
                )));
            }
        }
        Ok(Self {
            architecture,
            weights,
            biases,
            learning_rate,
        })
    }

    #[must_use]
    pub fn layer_sizes(&self) -> &[usize] {
        self.architecture.layer_sizes()
    }

    #[must_use]
    pub fn input_size(&self) -> usize {
        self.architecture.input_size()
    }

    #[must_use]
    pub fn weights(&self) -> &[Array2<f64>] {
        &self.weights
    }

    #[must_use]
    pub fn biases(&self) -> &[Array1<f64>] {
        &self.biases
    }

    #[must_use]
    pub fn activations(&self) -> &[ActivationFunction] {
        self.architecture.activations()
    }

    #[must_use]
    pub fn learning_rate(&self) -> LearningRate {
        self.learning_rate
    }

    pub fn set_learning_rate(&mut self, learning_rate: LearningRate) {
        self.learning_rate = learning_rate;
    }

    /// The topology this network was built from.
    #[must_use]
    pub fn architecture(&self) -> &Architecture {
        &self.architecture
    }

    fn check_input(&self, input: &[f64]) -> Result<(), NetworkError> {
        if input.len() == self.input_size() {
            Ok(())
        } else {
            Err(NetworkError::InputSize {
                expected: self.input_size(),
                actual: input.len(),
            })
        }
    }

    fn trace(&self, input: ArrayView1<'_, f64>) -> ForwardTrace {
        let transitions = self.weights.len();
        let mut sums = Vec::with_capacity(transitions);
        let mut outputs = Vec::with_capacity(transitions + 1);
        outputs.push(input.to_owned());
        for ((w, b), activation) in self
            .weights
            .iter()
            .zip(&self.biases)
            .zip(self.architecture.activations())
        {
            let sum = w.t().dot(&outputs[outputs.len() - 1]) + b;
            let output = sum.mapv(|s| activation.activate(s));
            sums.push(sum);
            outputs.push(output);
        }
        ForwardTrace { sums, outputs }
    }

    /// Runs a forward pass and returns the whole output layer, unclamped.
    pub fn forward(&self, input: &[f64]) -> Result<Array1<f64>, NetworkError> {
        self.check_input(input)?;
        let mut trace = self.trace(ArrayView1::from(input));
        Ok(trace.outputs.pop().unwrap_or_default())
    }

    /// Scores an input vector.
    ///
    /// Returns the first output neuron clamped into `[0, 1]`.
    pub fn predict(&self, input: &[f64]) -> Result<f64, NetworkError> {
        let output = self.forward(input)?;
        // min/max rather than clamp: a NaN collapses onto a bound
        #[expect(clippy::manual_clamp)]
        let score = output[0].min(1.0).max(0.0);
        Ok(score)
    }

    /// Performs one gradient descent step on a single sample.
    ///
    /// The error is measured on the raw (unclamped) first output neuron;
    /// further output neurons, if any, receive no gradient. Returns the
    /// squared error before the update. Parameters are untouched when the
    /// input size is wrong.
    pub fn train(&mut self, input: &[f64], target: f64) -> Result<f64, NetworkError> {
        self.check_input(input)?;
        let trace = self.trace(ArrayView1::from(input));
        let last = self.weights.len() - 1;

        let error = trace.outputs[last + 1][0] - target;

        // deltas[i] belongs to the target neurons of transition i
        let mut deltas = vec![Array1::<f64>::zeros(0); last + 1];
        let activations = self.architecture.activations();
        let mut output_delta = Array1::zeros(self.architecture.output_size());
        output_delta[0] = error * activations[last].derivative(trace.sums[last][0]);
        deltas[last] = output_delta;

        for layer in (0..last).rev() {
            let back = self.weights[layer + 1].dot(&deltas[layer + 1]);
            let activation = activations[layer];
            deltas[layer] = Zip::from(&back)
                .and(&trace.sums[layer])
                .map_collect(|&propagated, &sum| propagated * activation.derivative(sum));
        }

        let rate = self.learning_rate.get();
        for (layer, delta) in deltas.iter().enumerate() {
            Zip::from(self.weights[layer].rows_mut())
                .and(&trace.outputs[layer])
                .for_each(|mut row, &x| row.scaled_add(-rate * x, delta));
            self.biases[layer].scaled_add(-rate, delta);
        }

        Ok(error * error)
    }

    /// Trains on each sample in order and returns the mean squared error.
    ///
    /// Every input is validated before the first update, so a malformed
    /// batch leaves the network unchanged. An empty batch returns `0.0`.
    pub fn train_batch<S>(&mut self, inputs: &[S], targets: &[f64]) -> Result<f64, NetworkError>
    where
        S: AsRef<[f64]>,
    {
        if inputs.len() != targets.len() {
            return Err(NetworkError::SizeMismatch {
                inputs: inputs.len(),
                targets: targets.len(),
            });
        }
        if inputs.is_empty() {
            return Ok(0.0);
        }
        for input in inputs {
            self.check_input(input.as_ref())?;
        }

        let mut total = 0.0;
        for (input, &target) in inputs.iter().zip(targets) {
            total += self.train(input.as_ref(), target)?;
        }
        #[expect(clippy::cast_precision_loss)]
        let mean = total / inputs.len() as f64;
        Ok(mean)
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    use super::*;

    fn rate(value: f64) -> LearningRate {
        LearningRate::new(value).unwrap()
    }

    fn tanh_linear(sizes: Vec<usize>) -> Architecture {
        Architecture::new(
            sizes,
            vec![ActivationFunction::Tanh, ActivationFunction::Linear],
        )
        .unwrap()
    }

    /// `[2, 2, 1]` ReLU/Linear network whose hidden sums stay away from the kink
    /// for the probe input `[1.0, 0.5]`.
    fn fixed_relu_network() -> Network {
        Network::from_parts(
            vec![2, 2, 1],
            vec![array![[0.5, -0.3], [0.2, 0.8]], array![[0.6], [-0.4]]],
            vec![array![0.1, 0.2], array![0.05]],
            vec![ActivationFunction::Relu, ActivationFunction::Linear],
            rate(0.1),
        )
        .unwrap()
    }

    fn raw_loss(network: &Network, input: &[f64], target: f64) -> f64 {
        let error = network.forward(input).unwrap()[0] - target;
        error * error
    }

    #[test]
    fn test_learning_rate_validation() {
        assert!(LearningRate::new(0.01).is_ok());
        assert!(LearningRate::new(0.0).is_err());
        assert!(LearningRate::new(-0.5).is_err());
        assert!(LearningRate::new(f64::NAN).is_err());
        assert!(LearningRate::new(f64::INFINITY).is_err());
        assert!(serde_json::from_str::<LearningRate>("-1.0").is_err());
    }

    #[test]
    fn test_new_matches_architecture_shapes() {
        let network = Network::new(&tanh_linear(vec![3, 4, 1]), rate(0.1), 7);
        assert_eq!(network.layer_sizes(), &[3, 4, 1]);
        assert_eq!(network.weights()[0].dim(), (3, 4));
        assert_eq!(network.weights()[1].dim(), (4, 1));
        assert_eq!(network.biases()[0].len(), 4);
        assert_eq!(network.biases()[1].len(), 1);

        let limit = (6.0_f64 / 7.0).sqrt();
        assert!(network.weights()[0].iter().all(|w| w.abs() <= limit));
        assert!(
            network
                .biases()
                .iter()
                .flat_map(|b| b.iter())
                .all(|b| b.abs() <= INITIAL_BIAS_RANGE)
        );
    }

    #[test]
    fn test_seeded_initialization_is_reproducible() {
        let arch = tanh_linear(vec![3, 4, 1]);
        let a = Network::for_tier(&arch, DifficultyTier::Hard, rate(0.1));
        let b = Network::for_tier(&arch, DifficultyTier::Hard, rate(0.1));
        let c = Network::for_tier(&arch, DifficultyTier::Easy, rate(0.1));
        assert_eq!(a, b);
        assert_ne!(a.weights(), c.weights());
    }

    #[test]
    fn test_from_parts_rejects_inconsistent_dimensions() {
        let err = Network::from_parts(
            vec![2, 2, 1],
            vec![array![[0.5, -0.3], [0.2, 0.8]], array![[0.6, 0.1], [-0.4, 0.2]]],
            vec![array![0.1, 0.2], array![0.05]],
            vec![ActivationFunction::Relu, ActivationFunction::Linear],
            rate(0.1),
        )
        .unwrap_err();
        assert!(matches!(err, NetworkError::Configuration { .. }));

        let err = Network::from_parts(
            vec![2, 2, 1],
            vec![array![[0.5, -0.3], [0.2, 0.8]]],
            vec![array![0.1, 0.2]],
            vec![ActivationFunction::Relu, ActivationFunction::Linear],
            rate(0.1),
        )
        .unwrap_err();
        assert!(matches!(err, NetworkError::Configuration { .. }));
    }

    #[test]
    fn test_forward_computes_weighted_sums() {
        let network = fixed_relu_network();
        // hidden = relu([0.7, 0.3]); output = 0.6*0.7 - 0.4*0.3 + 0.05
        let output = network.forward(&[1.0, 0.5]).unwrap();
        assert_abs_diff_eq!(output[0], 0.35, epsilon = 1e-12);
    }

    #[test]
    fn test_predict_is_deterministic() {
        let network = Network::new(&tanh_linear(vec![4, 6, 1]), rate(0.1), 42);
        let input = [0.3, -1.2, 0.8, 0.05];
        let first = network.predict(&input).unwrap();
        let second = network.predict(&input).unwrap();
        assert_eq!(first.to_bits(), second.to_bits());
    }

    #[test]
    fn test_predict_is_bounded() {
        let arch = Architecture::new(vec![2, 1], vec![ActivationFunction::Linear]).unwrap();
        let big = Network::from_parts(
            vec![2, 1],
            vec![array![[100.0], [100.0]]],
            vec![array![0.0]],
            arch.activations().to_vec(),
            rate(0.1),
        )
        .unwrap();
        assert_eq!(big.predict(&[1.0, 1.0]).unwrap(), 1.0);
        assert_eq!(big.predict(&[-1.0, -1.0]).unwrap(), 0.0);

        let network = Network::new(&tanh_linear(vec![2, 8, 1]), rate(0.1), 3);
        for x in [-50.0, -3.0, -0.5, 0.0, 0.5, 3.0, 50.0] {
            let score = network.predict(&[x, -x]).unwrap();
            assert!((0.0..=1.0).contains(&score), "score {score} out of bounds");
        }
    }

    #[test]
    fn test_wrong_input_size_is_rejected_without_mutation() {
        let mut network = Network::new(&tanh_linear(vec![3, 4, 1]), rate(0.1), 1);
        let before = network.clone();

        assert_eq!(
            network.predict(&[1.0, 2.0]).unwrap_err(),
            NetworkError::InputSize {
                expected: 3,
                actual: 2
            }
        );
        assert!(matches!(
            network.train(&[1.0, 2.0, 3.0, 4.0], 0.5),
            Err(NetworkError::InputSize { .. })
        ));
        assert!(matches!(
            network.train_batch(&[vec![1.0, 2.0, 3.0], vec![1.0]], &[0.5, 0.5]),
            Err(NetworkError::InputSize { .. })
        ));
        assert_eq!(network, before);
    }

    #[test]
    fn test_train_batch_size_mismatch_and_empty_batch() {
        let mut network = Network::new(&tanh_linear(vec![2, 3, 1]), rate(0.1), 1);
        let before = network.clone();

        assert_eq!(
            network
                .train_batch(&[vec![1.0, 2.0]], &[0.5, 0.5])
                .unwrap_err(),
            NetworkError::SizeMismatch {
                inputs: 1,
                targets: 2
            }
        );
        let empty: [Vec<f64>; 0] = [];
        assert_eq!(network.train_batch(&empty, &[]).unwrap(), 0.0);
        assert_eq!(network, before);
    }

    #[test]
    fn test_batch_of_one_equals_single_train() {
        let mut single = Network::new(&tanh_linear(vec![3, 5, 1]), rate(0.05), 9);
        let mut batched = single.clone();
        let input = vec![0.2, -0.7, 1.1];

        let single_error = single.train(&input, 0.8).unwrap();
        let batch_error = batched.train_batch(&[input], &[0.8]).unwrap();

        assert_eq!(single_error.to_bits(), batch_error.to_bits());
        assert_eq!(single, batched);
    }

    #[test]
    fn test_gradient_matches_finite_differences() {
        let network = fixed_relu_network();
        let input = [1.0, 0.5];
        let target = 0.9;
        let lr = network.learning_rate().get();

        let mut trained = network.clone();
        trained.train(&input, target).unwrap();

        let h = 1e-6;
        for layer in 0..network.weights.len() {
            for ((row, col), &w) in network.weights[layer].indexed_iter() {
                let mut plus = network.clone();
                plus.weights[layer][(row, col)] = w + h;
                let mut minus = network.clone();
                minus.weights[layer][(row, col)] = w - h;
                let numeric =
                    (raw_loss(&plus, &input, target) - raw_loss(&minus, &input, target)) / (2.0 * h);

                // train() steps along -lr * d(error^2)/dw / 2
                let step = trained.weights[layer][(row, col)] - w;
                assert_abs_diff_eq!(step, -lr * numeric / 2.0, epsilon = 1e-6);
            }
            for (i, &b) in network.biases[layer].indexed_iter() {
                let mut plus = network.clone();
                plus.biases[layer][i] = b + h;
                let mut minus = network.clone();
                minus.biases[layer][i] = b - h;
                let numeric =
                    (raw_loss(&plus, &input, target) - raw_loss(&minus, &input, target)) / (2.0 * h);

                let step = trained.biases[layer][i] - b;
                assert_abs_diff_eq!(step, -lr * numeric / 2.0, epsilon = 1e-6);
            }
        }
    }

    #[test]
    fn test_train_returns_squared_error() {
        let mut network = fixed_relu_network();
        let error = network.train(&[1.0, 0.5], 0.9).unwrap();
        assert_abs_diff_eq!(error, (0.35_f64 - 0.9).powi(2), epsilon = 1e-12);
    }

    #[test]
    fn test_converges_on_separable_toy_problem() {
        let mut network = Network::new(&tanh_linear(vec![2, 4, 1]), rate(0.05), 2024);
        let inputs = vec![
            vec![1.0, 0.8],
            vec![0.6, 0.9],
            vec![0.9, 0.2],
            vec![0.4, 0.7],
            vec![-1.0, -0.8],
            vec![-0.6, -0.9],
            vec![-0.9, -0.2],
            vec![-0.4, -0.7],
        ];
        let targets = [1.0, 1.0, 1.0, 1.0, 0.0, 0.0, 0.0, 0.0];

        let errors: Vec<f64> = (0..300)
            .map(|_| network.train_batch(&inputs, &targets).unwrap())
            .collect();

        let first = errors[0];
        let last = errors[errors.len() - 1];
        assert!(last < first, "error did not decrease: {first} -> {last}");
        assert!(last < 0.1, "error too high after training: {last}");
        for pair in errors.windows(2) {
            assert!(
                pair[1] <= pair[0] + 5e-3,
                "error jumped from {} to {}",
                pair[0],
                pair[1]
            );
        }

        for (input, &target) in inputs.iter().zip(&targets) {
            let score = network.predict(input).unwrap();
            assert_eq!(score >= 0.5, target >= 0.5);
        }
    }
}
