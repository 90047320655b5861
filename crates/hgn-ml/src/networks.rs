// ─────────────────────────────────────────────────────────────────────
// Hamiltonian Generative Network — Networks
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! The four learnable components and their contracts.
//!
//! The orchestrator only depends on the traits; the MLP implementations here
//! are the defaults built by [`crate::hgn::Hgn::new`].

use crate::param::{Activation, Mlp, Param, Parameterized};
use hgn_math::autodiff::{Tape, Var};
use hgn_math::symplectic::Hamiltonian;
use hgn_types::error::{HgnError, HgnResult};
use ndarray::Array2;
use rand::RngCore;
use rand_distr::{Distribution, StandardNormal};

/// Variational posterior over the initial condition, recorded on a tape.
#[derive(Debug, Clone, Copy)]
pub struct Latent<'t> {
    pub sample: Var<'t>,
    pub mean: Var<'t>,
    pub logvar: Var<'t>,
}

/// Maps a channel-concatenated frame pair (batch, 2·C·H·W) to a latent posterior.
pub trait Encoder: Parameterized {
    /// With `sample == false` the returned sample is the mean itself.
    fn encode<'t>(
        &self,
        tape: &'t Tape,
        frames: Var<'t>,
        sample: bool,
        rng: &mut dyn RngCore,
    ) -> HgnResult<Latent<'t>>;
}

/// Maps a latent sample to the initial canonical state `(q0, p0)`.
pub trait Transformer: Parameterized {
    fn transform<'t>(&self, tape: &'t Tape, z: Var<'t>) -> HgnResult<(Var<'t>, Var<'t>)>;
}

/// Learned energy function, consumed by the integrator.
pub trait HamiltonianNet: Parameterized + Hamiltonian {
    fn as_hamiltonian(&self) -> &dyn Hamiltonian;
}

/// Maps a canonical position (batch, state_dim) to a flattened frame (batch, C·H·W).
pub trait Decoder: Parameterized {
    fn decode<'t>(&self, tape: &'t Tape, q: Var<'t>) -> HgnResult<Var<'t>>;
}

fn check_input(component: &str, x: Var<'_>, expected: usize) -> HgnResult<()> {
    let (_, cols) = x.shape();
    if cols != expected {
        return Err(HgnError::shape(format!(
            "{component} expects {expected} input features, got {cols}"
        )));
    }
    Ok(())
}

fn widths(input: usize, hidden: &[usize], output: usize) -> Vec<usize> {
    let mut dims = Vec::with_capacity(hidden.len() + 2);
    dims.push(input);
    dims.extend_from_slice(hidden);
    dims.push(output);
    dims
}

/// Gaussian encoder: an MLP emitting `[mean | logvar]`.
#[derive(Debug)]
pub struct EncoderNet {
    mlp: Mlp,
    latent_dim: usize,
}

impl EncoderNet {
    pub fn new<R: RngCore + ?Sized>(
        input_dim: usize,
        hidden: &[usize],
        latent_dim: usize,
        rng: &mut R,
    ) -> HgnResult<Self> {
        let mlp = Mlp::new(
            &widths(input_dim, hidden, 2 * latent_dim),
            Activation::Tanh,
            Activation::Identity,
            rng,
        )?;
        Ok(EncoderNet { mlp, latent_dim })
    }

    pub fn latent_dim(&self) -> usize {
        self.latent_dim
    }
}

impl Parameterized for EncoderNet {
    fn parameters(&self) -> Vec<&Param> {
        self.mlp.parameters()
    }

    fn parameters_mut(&mut self) -> Vec<&mut Param> {
        self.mlp.parameters_mut()
    }
}

impl Encoder for EncoderNet {
    fn encode<'t>(
        &self,
        tape: &'t Tape,
        frames: Var<'t>,
        sample: bool,
        rng: &mut dyn RngCore,
    ) -> HgnResult<Latent<'t>> {
        check_input("encoder", frames, self.mlp.input_dim())?;
        let out = self.mlp.forward(tape, frames);
        let l = self.latent_dim;
        let mean = out.slice_cols(0, l);
        let logvar = out.slice_cols(l, 2 * l);
        let z = if sample {
            let eps: Array2<f64> = Array2::from_shape_simple_fn(mean.shape(), || {
                StandardNormal.sample(&mut *rng)
            });
            mean + logvar.scale(0.5).exp() * tape.leaf(eps)
        } else {
            mean
        };
        Ok(Latent {
            sample: z,
            mean,
            logvar,
        })
    }
}

/// Splits an MLP output into `(q, p)`.
#[derive(Debug)]
pub struct TransformerNet {
    mlp: Mlp,
    state_dim: usize,
}

impl TransformerNet {
    pub fn new<R: RngCore + ?Sized>(
        latent_dim: usize,
        hidden: &[usize],
        state_dim: usize,
        rng: &mut R,
    ) -> HgnResult<Self> {
        let mlp = Mlp::new(
            &widths(latent_dim, hidden, 2 * state_dim),
            Activation::Tanh,
            Activation::Identity,
            rng,
        )?;
        Ok(TransformerNet { mlp, state_dim })
    }
}

impl Parameterized for TransformerNet {
    fn parameters(&self) -> Vec<&Param> {
        self.mlp.parameters()
    }

    fn parameters_mut(&mut self) -> Vec<&mut Param> {
        self.mlp.parameters_mut()
    }
}

impl Transformer for TransformerNet {
    fn transform<'t>(&self, tape: &'t Tape, z: Var<'t>) -> HgnResult<(Var<'t>, Var<'t>)> {
        check_input("transformer", z, self.mlp.input_dim())?;
        let out = self.mlp.forward(tape, z);
        let s = self.state_dim;
        Ok((out.slice_cols(0, s), out.slice_cols(s, 2 * s)))
    }
}

/// `H(q, p) = MLP([q | p])`, tanh hidden layers so that second derivatives
/// are smooth.
#[derive(Debug)]
pub struct HamiltonianMlp {
    mlp: Mlp,
    state_dim: usize,
}

impl HamiltonianMlp {
    pub fn new<R: RngCore + ?Sized>(
        state_dim: usize,
        hidden: &[usize],
        rng: &mut R,
    ) -> HgnResult<Self> {
        let mlp = Mlp::new(
            &widths(2 * state_dim, hidden, 1),
            Activation::Tanh,
            Activation::Identity,
            rng,
        )?;
        Ok(HamiltonianMlp { mlp, state_dim })
    }
}

impl Parameterized for HamiltonianMlp {
    fn parameters(&self) -> Vec<&Param> {
        self.mlp.parameters()
    }

    fn parameters_mut(&mut self) -> Vec<&mut Param> {
        self.mlp.parameters_mut()
    }
}

impl Hamiltonian for HamiltonianMlp {
    fn energy<'t>(&self, tape: &'t Tape, q: Var<'t>, p: Var<'t>) -> HgnResult<Var<'t>> {
        check_input("hamiltonian (q)", q, self.state_dim)?;
        check_input("hamiltonian (p)", p, self.state_dim)?;
        if q.shape().0 != p.shape().0 {
            return Err(HgnError::shape(format!(
                "q and p batch sizes differ: {} vs {}",
                q.shape().0,
                p.shape().0
            )));
        }
        Ok(self.mlp.forward(tape, tape.concat_cols(&[q, p])))
    }
}

impl HamiltonianNet for HamiltonianMlp {
    fn as_hamiltonian(&self) -> &dyn Hamiltonian {
        self
    }
}

/// MLP decoder with sigmoid output in pixel range `(0, 1)`.
#[derive(Debug)]
pub struct DecoderNet {
    mlp: Mlp,
}

impl DecoderNet {
    pub fn new<R: RngCore + ?Sized>(
        state_dim: usize,
        hidden: &[usize],
        frame_len: usize,
        rng: &mut R,
    ) -> HgnResult<Self> {
        let mlp = Mlp::new(
            &widths(state_dim, hidden, frame_len),
            Activation::Tanh,
            Activation::Sigmoid,
            rng,
        )?;
        Ok(DecoderNet { mlp })
    }

    pub fn frame_len(&self) -> usize {
        self.mlp.output_dim()
    }
}

impl Parameterized for DecoderNet {
    fn parameters(&self) -> Vec<&Param> {
        self.mlp.parameters()
    }

    fn parameters_mut(&mut self) -> Vec<&mut Param> {
        self.mlp.parameters_mut()
    }
}

impl Decoder for DecoderNet {
    fn decode<'t>(&self, tape: &'t Tape, q: Var<'t>) -> HgnResult<Var<'t>> {
        check_input("decoder", q, self.mlp.input_dim())?;
        Ok(self.mlp.forward(tape, q))
    }
}
