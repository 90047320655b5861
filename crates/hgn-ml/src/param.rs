// ─────────────────────────────────────────────────────────────────────
// Hamiltonian Generative Network — Parameters
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Learnable parameters, dense layers and `.npz` state dictionaries.

use hgn_math::autodiff::{ParamId, Tape, Var};
use hgn_types::error::{HgnError, HgnResult};
use ndarray::{Array2, Ix2, OwnedRepr};
use ndarray_npy::{NpzReader, NpzWriter};
use rand::Rng;
use std::collections::BTreeMap;
use std::fs::File;
use std::path::Path;

/// Named parameter matrices of one component.
pub type StateDict = BTreeMap<String, Array2<f64>>;

/// A learnable matrix with its most recent gradient.
#[derive(Debug)]
pub struct Param {
    id: ParamId,
    name: String,
    value: Array2<f64>,
    grad: Option<Array2<f64>>,
    retain_grad: bool,
}

impl Param {
    pub fn new(name: impl Into<String>, value: Array2<f64>) -> Self {
        Param {
            id: ParamId::fresh(),
            name: name.into(),
            value,
            grad: None,
            retain_grad: false,
        }
    }

    pub fn id(&self) -> ParamId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &Array2<f64> {
        &self.value
    }

    pub fn value_mut(&mut self) -> &mut Array2<f64> {
        &mut self.value
    }

    pub fn numel(&self) -> usize {
        self.value.len()
    }

    /// Replace the value; the shape must not change.
    pub fn set_value(&mut self, value: Array2<f64>) -> HgnResult<()> {
        if value.dim() != self.value.dim() {
            return Err(HgnError::shape(format!(
                "parameter '{}' expects shape {:?}, got {:?}",
                self.name,
                self.value.dim(),
                value.dim()
            )));
        }
        self.value = value;
        Ok(())
    }

    pub fn grad(&self) -> Option<&Array2<f64>> {
        self.grad.as_ref()
    }

    pub fn set_grad(&mut self, grad: Array2<f64>) -> HgnResult<()> {
        if grad.dim() != self.value.dim() {
            return Err(HgnError::shape(format!(
                "gradient for '{}' has shape {:?}, parameter is {:?}",
                self.name,
                grad.dim(),
                self.value.dim()
            )));
        }
        self.grad = Some(grad);
        Ok(())
    }

    pub fn clear_grad(&mut self) {
        self.grad = None;
    }

    /// Keep the gradient after the optimisation step for inspection.
    pub fn set_retain_grad(&mut self, retain: bool) {
        self.retain_grad = retain;
    }

    pub fn retains_grad(&self) -> bool {
        self.retain_grad
    }

    /// Record this parameter on a tape (once per tape).
    pub fn bind<'t>(&self, tape: &'t Tape) -> Var<'t> {
        tape.param(self.id, &self.value)
    }
}

/// Pointwise nonlinearity applied after a dense layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activation {
    Identity,
    Tanh,
    Sigmoid,
    /// `ln(1 + e^x)`, smooth so second derivatives exist everywhere.
    Softplus,
}

impl Activation {
    pub fn apply<'t>(self, x: Var<'t>) -> Var<'t> {
        match self {
            Activation::Identity => x,
            Activation::Tanh => x.tanh(),
            Activation::Sigmoid => x.sigmoid(),
            Activation::Softplus => x.exp().add_scalar(1.0).ln(),
        }
    }
}

/// Dense layer `y = x W + b`, W: (in, out), b: (1, out).
#[derive(Debug)]
pub struct Linear {
    pub weight: Param,
    pub bias: Param,
}

impl Linear {
    /// Xavier-uniform weights, zero bias.
    pub fn new<R: Rng + ?Sized>(name: &str, input_dim: usize, output_dim: usize, rng: &mut R) -> Self {
        let s = (2.0 / (input_dim + output_dim) as f64).sqrt();
        Linear {
            weight: Param::new(
                format!("{name}.weight"),
                Array2::from_shape_fn((input_dim, output_dim), |_| (rng.gen::<f64>() - 0.5) * 2.0 * s),
            ),
            bias: Param::new(format!("{name}.bias"), Array2::zeros((1, output_dim))),
        }
    }

    pub fn input_dim(&self) -> usize {
        self.weight.value().nrows()
    }

    pub fn output_dim(&self) -> usize {
        self.weight.value().ncols()
    }

    pub fn forward<'t>(&self, tape: &'t Tape, x: Var<'t>) -> Var<'t> {
        x.matmul(self.weight.bind(tape)).add_row(self.bias.bind(tape))
    }
}

/// Feedforward stack: hidden activation between layers, output activation last.
#[derive(Debug)]
pub struct Mlp {
    layers: Vec<Linear>,
    hidden_activation: Activation,
    output_activation: Activation,
}

impl Mlp {
    /// `dims` lists every width from input to output, e.g. `[in, 64, 32, out]`.
    pub fn new<R: Rng + ?Sized>(
        dims: &[usize],
        hidden_activation: Activation,
        output_activation: Activation,
        rng: &mut R,
    ) -> HgnResult<Self> {
        if dims.len() < 2 || dims.iter().any(|&d| d == 0) {
            return Err(HgnError::ConfigError(format!(
                "MLP needs at least two positive widths, got {dims:?}"
            )));
        }
        let layers = dims
            .windows(2)
            .enumerate()
            .map(|(i, w)| Linear::new(&format!("fc{i}"), w[0], w[1], &mut *rng))
            .collect();
        Ok(Mlp {
            layers,
            hidden_activation,
            output_activation,
        })
    }

    pub fn input_dim(&self) -> usize {
        self.layers[0].input_dim()
    }

    pub fn output_dim(&self) -> usize {
        self.layers[self.layers.len() - 1].output_dim()
    }

    pub fn forward<'t>(&self, tape: &'t Tape, x: Var<'t>) -> Var<'t> {
        let last = self.layers.len() - 1;
        self.layers.iter().enumerate().fold(x, |h, (i, layer)| {
            let z = layer.forward(tape, h);
            if i == last {
                self.output_activation.apply(z)
            } else {
                self.hidden_activation.apply(z)
            }
        })
    }

    pub fn parameters(&self) -> Vec<&Param> {
        self.layers
            .iter()
            .flat_map(|l| [&l.weight, &l.bias])
            .collect()
    }

    pub fn parameters_mut(&mut self) -> Vec<&mut Param> {
        self.layers
            .iter_mut()
            .flat_map(|l| [&mut l.weight, &mut l.bias])
            .collect()
    }
}

/// A component owning learnable parameters, serialisable as a state dictionary.
pub trait Parameterized {
    fn parameters(&self) -> Vec<&Param>;

    fn parameters_mut(&mut self) -> Vec<&mut Param>;

    fn num_parameters(&self) -> usize {
        self.parameters().iter().map(|p| p.numel()).sum()
    }

    fn state_dict(&self) -> StateDict {
        self.parameters()
            .into_iter()
            .map(|p| (p.name().to_string(), p.value().clone()))
            .collect()
    }

    /// Verify that `state` carries every parameter with a matching shape.
    fn check_state_dict(&self, state: &StateDict) -> HgnResult<()> {
        for p in self.parameters() {
            let value = state.get(p.name()).ok_or_else(|| {
                HgnError::Deserialization(format!("missing parameter '{}'", p.name()))
            })?;
            if value.dim() != p.value().dim() {
                return Err(HgnError::Deserialization(format!(
                    "parameter '{}' has shape {:?}, expected {:?}",
                    p.name(),
                    value.dim(),
                    p.value().dim()
                )));
            }
        }
        Ok(())
    }

    /// Replace every parameter value. Nothing is modified unless all entries check out.
    fn load_state_dict(&mut self, state: &StateDict) -> HgnResult<()> {
        self.check_state_dict(state)?;
        for p in self.parameters_mut() {
            if let Some(value) = state.get(p.name()) {
                p.set_value(value.clone())?;
            }
        }
        Ok(())
    }

    fn save_npz(&self, path: &Path) -> HgnResult<()> {
        write_state_dict(path, &self.state_dict())
    }

    /// Read the archive entries this component expects.
    fn read_npz(&self, path: &Path) -> HgnResult<StateDict> {
        let names: Vec<String> = self
            .parameters()
            .iter()
            .map(|p| p.name().to_string())
            .collect();
        read_state_dict(path, &names)
    }

    fn load_npz(&mut self, path: &Path) -> HgnResult<()> {
        let state = self.read_npz(path)?;
        self.load_state_dict(&state)
    }
}

pub fn write_state_dict(path: &Path, state: &StateDict) -> HgnResult<()> {
    let file = File::create(path)?;
    let mut npz = NpzWriter::new(file);
    for (name, value) in state {
        npz.add_array(name.as_str(), value).map_err(|e| {
            HgnError::Serialization(format!(
                "Failed to write '{name}' to '{}': {e}",
                path.display()
            ))
        })?;
    }
    npz.finish().map_err(|e| {
        HgnError::Serialization(format!("Failed to finish '{}': {e}", path.display()))
    })?;
    Ok(())
}

/// Open an archive, mapping a missing file to [`HgnError::NotFound`].
fn open_archive(path: &Path) -> HgnResult<NpzReader<File>> {
    let file = File::open(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => HgnError::NotFound {
            path: path.display().to_string(),
        },
        _ => HgnError::Io(e),
    })?;
    NpzReader::new(file).map_err(|e| {
        HgnError::Deserialization(format!("Failed to open npz '{}': {e}", path.display()))
    })
}

pub fn read_state_dict(path: &Path, names: &[String]) -> HgnResult<StateDict> {
    let mut npz = open_archive(path)?;
    let mut state = StateDict::new();
    for name in names {
        state.insert(name.clone(), read_array2(&mut npz, name)?);
    }
    Ok(state)
}

fn read_array2(npz: &mut NpzReader<File>, key: &str) -> HgnResult<Array2<f64>> {
    npz.by_name::<OwnedRepr<f64>, Ix2>(&format!("{key}.npy"))
        .or_else(|_| npz.by_name::<OwnedRepr<f64>, Ix2>(key))
        .map_err(|e| HgnError::Deserialization(format!("Failed to read {key} from npz: {e}")))
}
