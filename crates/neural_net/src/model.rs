//! Feed-forward network used by the trainer
//!
//! One optional hidden dense layer followed by an output layer: a single
//! linear unit for regression, `classes` softmax units for classification.
//! Parameter shapes are fixed by [`Mlp::new`].

use ndarray::{Array1, Array2, ArrayView1, ArrayViewMut1, Axis};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::dataset::Task;

/// Hidden-layer activation
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Activation {
    #[default]
    Tanh,
    Sigmoid,
    Relu,
}

impl Activation {
    fn apply(&self, z: &mut Array2<f64>) {
        match self {
            Activation::Tanh => z.mapv_inplace(f64::tanh),
            Activation::Sigmoid => z.mapv_inplace(|x| 1.0 / (1.0 + (-x).exp())),
            Activation::Relu => z.mapv_inplace(|x| x.max(0.0)),
        }
    }

    /// Derivative expressed through the activation output `a`
    fn derivative(&self, a: &Array2<f64>) -> Array2<f64> {
        match self {
            Activation::Tanh => a.mapv(|a| 1.0 - a * a),
            Activation::Sigmoid => a.mapv(|a| a * (1.0 - a)),
            Activation::Relu => a.mapv(|a| if a > 0.0 { 1.0 } else { 0.0 }),
        }
    }
}

impl std::str::FromStr for Activation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "tanh" => Ok(Activation::Tanh),
            "sigmoid" => Ok(Activation::Sigmoid),
            "relu" => Ok(Activation::Relu),
            other => Err(format!("unknown activation '{}'", other)),
        }
    }
}

/// Fully connected layer, `weights` is inputs × outputs
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Dense {
    pub weights: Array2<f64>,
    pub bias: Array1<f64>,
}

impl Dense {
    /// Glorot-uniform weights, zero bias
    fn init<R: Rng + ?Sized>(inputs: usize, outputs: usize, rng: &mut R) -> Self {
        let limit = (6.0 / (inputs + outputs) as f64).sqrt();
        Self {
            weights: Array2::from_shape_fn((inputs, outputs), |_| rng.gen_range(-limit..limit)),
            bias: Array1::zeros(outputs),
        }
    }

    fn forward(&self, x: &Array2<f64>) -> Array2<f64> {
        let mut z = x.dot(&self.weights);
        z += &self.bias;
        z
    }

    fn is_finite(&self) -> bool {
        self.weights.iter().chain(self.bias.iter()).all(|p| p.is_finite())
    }
}

/// Per-layer gradients, same shapes as the layers
#[derive(Debug)]
pub struct Gradients {
    hidden: Option<(Array2<f64>, Array1<f64>)>,
    output: (Array2<f64>, Array1<f64>),
}

/// Activations kept from a forward pass for backpropagation
struct Forward {
    hidden: Option<Array2<f64>>,
    output: Array2<f64>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Mlp {
    pub task: Task,
    pub activation: Activation,
    pub hidden: Option<Dense>,
    pub output: Dense,
}

impl Mlp {
    /// Build a network for `inputs` features. `hidden_width == 0` gives a
    /// linear (regression) or softmax (classification) model.
    pub fn new<R: Rng + ?Sized>(
        inputs: usize,
        hidden_width: usize,
        activation: Activation,
        task: Task,
        rng: &mut R,
    ) -> Self {
        let outputs = match task {
            Task::Regression => 1,
            Task::Classification { classes } => classes.max(1),
        };

        let (hidden, last_width) = if hidden_width > 0 {
            (Some(Dense::init(inputs, hidden_width, rng)), hidden_width)
        } else {
            (None, inputs)
        };

        Self {
            task,
            activation,
            hidden,
            output: Dense::init(last_width, outputs, rng),
        }
    }

    pub fn input_width(&self) -> usize {
        match &self.hidden {
            Some(layer) => layer.weights.nrows(),
            None => self.output.weights.nrows(),
        }
    }

    pub fn parameter_count(&self) -> usize {
        let dense = |d: &Dense| d.weights.len() + d.bias.len();
        self.hidden.as_ref().map_or(0, dense) + dense(&self.output)
    }

    pub fn is_finite(&self) -> bool {
        self.hidden.as_ref().map_or(true, Dense::is_finite) && self.output.is_finite()
    }

    fn forward(&self, x: &Array2<f64>) -> Forward {
        let hidden = self.hidden.as_ref().map(|layer| {
            let mut a = layer.forward(x);
            self.activation.apply(&mut a);
            a
        });
        let output = self.output.forward(hidden.as_ref().unwrap_or(x));
        Forward { hidden, output }
    }

    /// Raw outputs: regression predictions (n × 1) or class probabilities (n × k)
    pub fn predict(&self, x: &Array2<f64>) -> Array2<f64> {
        let mut out = self.forward(x).output;
        if self.task.is_classification() {
            for row in out.rows_mut() {
                softmax_inplace(row);
            }
        }
        out
    }

    /// Fraction of rows whose arg-max class equals the target index
    pub fn accuracy(&self, x: &Array2<f64>, targets: &[f64]) -> Option<f64> {
        if !self.task.is_classification() || targets.is_empty() {
            return None;
        }
        let logits = self.forward(x).output;
        let correct = logits
            .rows()
            .into_iter()
            .zip(targets)
            .filter(|(row, t)| argmax(row.view()) == Some(**t as usize))
            .count();
        Some(correct as f64 / targets.len() as f64)
    }

    /// Mean loss over the batch and its gradients
    pub fn loss_and_gradients(&self, x: &Array2<f64>, targets: &[f64]) -> (f64, Gradients) {
        let forward = self.forward(x);
        let (loss, d_out) = match self.task {
            Task::Regression => mse(&forward.output, targets),
            Task::Classification { .. } => cross_entropy(&forward.output, targets),
        };

        let last_input = forward.hidden.as_ref().unwrap_or(x);
        let output = (last_input.t().dot(&d_out), d_out.sum_axis(Axis(0)));

        let hidden = match (&self.hidden, &forward.hidden) {
            (Some(_), Some(a)) => {
                let d_hidden = d_out.dot(&self.output.weights.t()) * self.activation.derivative(a);
                Some((x.t().dot(&d_hidden), d_hidden.sum_axis(Axis(0))))
            }
            _ => None,
        };

        (loss, Gradients { hidden, output })
    }

    /// Plain gradient-descent step
    pub fn apply_gradients(&mut self, grads: &Gradients, learning_rate: f64) {
        if let (Some(layer), Some((dw, db))) = (self.hidden.as_mut(), grads.hidden.as_ref()) {
            layer.weights.scaled_add(-learning_rate, dw);
            layer.bias.scaled_add(-learning_rate, db);
        }
        let (dw, db) = &grads.output;
        self.output.weights.scaled_add(-learning_rate, dw);
        self.output.bias.scaled_add(-learning_rate, db);
    }
}

/// Mean squared error against a single-output prediction matrix
fn mse(pred: &Array2<f64>, targets: &[f64]) -> (f64, Array2<f64>) {
    let n = targets.len().max(1) as f64;
    let mut grad = Array2::zeros(pred.raw_dim());
    let mut sum = 0.0;
    for (i, &t) in targets.iter().enumerate() {
        let diff = pred[[i, 0]] - t;
        sum += diff * diff;
        grad[[i, 0]] = 2.0 * diff / n;
    }
    (sum / n, grad)
}

/// Softmax cross-entropy; `targets` hold class indices
fn cross_entropy(logits: &Array2<f64>, targets: &[f64]) -> (f64, Array2<f64>) {
    let n = targets.len().max(1) as f64;
    let mut grad = logits.clone();
    let mut sum = 0.0;
    for (mut row, &t) in grad.rows_mut().into_iter().zip(targets) {
        let class = t as usize;
        let max = row.fold(f64::NEG_INFINITY, |m, &v| m.max(v));
        let lse = max + row.iter().map(|v| (v - max).exp()).sum::<f64>().ln();
        sum += lse - row[class];
        row.mapv_inplace(|v| (v - lse).exp() / n);
        row[class] -= 1.0 / n;
    }
    (sum / n, grad)
}

fn softmax_inplace(mut row: ArrayViewMut1<'_, f64>) {
    let max = row.fold(f64::NEG_INFINITY, |m, &v| m.max(v));
    row.mapv_inplace(|v| (v - max).exp());
    let total = row.sum();
    row.mapv_inplace(|v| v / total);
}

fn argmax(row: ArrayView1<'_, f64>) -> Option<usize> {
    row.iter()
        .enumerate()
        .filter(|(_, v)| !v.is_nan())
        .fold(None, |best: Option<(usize, f64)>, (i, &v)| match best {
            Some((_, b)) if b >= v => best,
            _ => Some((i, v)),
        })
        .map(|(i, _)| i)
}
