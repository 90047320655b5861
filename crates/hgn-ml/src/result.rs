// ─────────────────────────────────────────────────────────────────────
// Hamiltonian Generative Network — Rollout Result
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Staging structure for one forward pass.
//!
//! States and reconstructions grow strictly in lockstep:
//! `append_state`, `append_reconstruction`, `append_state`, ... so that
//! reconstruction `i` always belongs to state `i`.

use hgn_types::error::{HgnError, HgnResult};
use hgn_types::state::RolloutShape;
use ndarray::{stack, Array2, Array3, Array4, Array5, ArrayView2, ArrayView4, Axis};
use ndarray_npy::NpzWriter;
use std::fs::File;
use std::path::Path;
use std::sync::Arc;

/// Position and momentum at one time step, each (batch, state_dim).
#[derive(Debug, Clone, PartialEq)]
pub struct CanonicalState {
    pub q: Array2<f64>,
    pub p: Array2<f64>,
}

/// Posterior over the initial condition, each (batch, latent_dim).
#[derive(Debug, Clone, PartialEq)]
pub struct LatentDistribution {
    pub mean: Array2<f64>,
    pub logvar: Array2<f64>,
    pub sample: Array2<f64>,
}

#[derive(Debug, Clone)]
pub struct RolloutResult {
    shape: RolloutShape,
    input: Option<Arc<Array5<f64>>>,
    latent: Option<LatentDistribution>,
    states: Vec<CanonicalState>,
    reconstructions: Vec<Array4<f64>>,
}

impl RolloutResult {
    /// `expected_shape` is the final (batch, steps, channels, height, width)
    /// of the reconstructed rollout.
    pub fn new(expected_shape: &[usize]) -> HgnResult<Self> {
        let shape = RolloutShape::new(expected_shape)?;
        Ok(RolloutResult {
            shape,
            input: None,
            latent: None,
            states: Vec::with_capacity(shape.steps),
            reconstructions: Vec::with_capacity(shape.steps),
        })
    }

    pub fn shape(&self) -> RolloutShape {
        self.shape
    }

    /// Keep a shared handle to the observed rollout. Its step count may differ
    /// from the generated one; batch and frame dimensions may not.
    pub fn set_input(&mut self, input: Arc<Array5<f64>>) -> HgnResult<()> {
        let observed = RolloutShape::new(input.shape())?;
        if observed.frame_dims() != self.shape.frame_dims() {
            return Err(HgnError::shape(format!(
                "input rollout {:?} does not match expected {:?}",
                observed.dims(),
                self.shape.dims()
            )));
        }
        self.input = Some(input);
        Ok(())
    }

    pub fn set_latent(
        &mut self,
        mean: Array2<f64>,
        logvar: Array2<f64>,
        sample: Array2<f64>,
    ) -> HgnResult<()> {
        if mean.dim() != logvar.dim() || mean.dim() != sample.dim() || mean.nrows() != self.shape.batch
        {
            return Err(HgnError::shape(format!(
                "latent shapes mean={:?} logvar={:?} sample={:?} for batch {}",
                mean.dim(),
                logvar.dim(),
                sample.dim(),
                self.shape.batch
            )));
        }
        self.latent = Some(LatentDistribution {
            mean,
            logvar,
            sample,
        });
        Ok(())
    }

    pub fn append_state(&mut self, q: Array2<f64>, p: Array2<f64>) -> HgnResult<()> {
        if self.states.len() != self.reconstructions.len() {
            return Err(HgnError::Sequence(format!(
                "state {} appended before reconstruction {} was recorded",
                self.states.len(),
                self.reconstructions.len()
            )));
        }
        if self.states.len() == self.shape.steps {
            return Err(HgnError::Sequence(format!(
                "rollout already holds all {} steps",
                self.shape.steps
            )));
        }
        if q.dim() != p.dim() || q.nrows() != self.shape.batch {
            return Err(HgnError::shape(format!(
                "canonical state q={:?} p={:?} for batch {}",
                q.dim(),
                p.dim(),
                self.shape.batch
            )));
        }
        if let Some(first) = self.states.first() {
            if first.q.dim() != q.dim() {
                return Err(HgnError::shape(format!(
                    "state dimension changed from {:?} to {:?}",
                    first.q.dim(),
                    q.dim()
                )));
            }
        }
        self.states.push(CanonicalState { q, p });
        Ok(())
    }

    pub fn append_reconstruction(&mut self, frame: Array4<f64>) -> HgnResult<()> {
        if self.reconstructions.len() >= self.states.len() {
            return Err(HgnError::Sequence(format!(
                "reconstruction {} has no matching state",
                self.reconstructions.len()
            )));
        }
        if frame.shape() != self.shape.frame_dims() {
            return Err(HgnError::shape(format!(
                "reconstructed frame {:?}, expected {:?}",
                frame.shape(),
                self.shape.frame_dims()
            )));
        }
        self.reconstructions.push(frame);
        Ok(())
    }

    pub fn input(&self) -> Option<&Arc<Array5<f64>>> {
        self.input.as_ref()
    }

    pub fn latent(&self) -> Option<&LatentDistribution> {
        self.latent.as_ref()
    }

    pub fn states(&self) -> &[CanonicalState] {
        &self.states
    }

    pub fn reconstructions(&self) -> &[Array4<f64>] {
        &self.reconstructions
    }

    /// Steps produced so far.
    pub fn len(&self) -> usize {
        self.reconstructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn is_complete(&self) -> bool {
        self.states.len() == self.shape.steps && self.reconstructions.len() == self.shape.steps
    }

    /// Reconstructions stacked on the time axis: (batch, steps, C, H, W).
    pub fn reconstructed_rollout(&self) -> HgnResult<Array5<f64>> {
        if self.reconstructions.is_empty() {
            return Err(HgnError::Sequence("no reconstructions recorded".into()));
        }
        let views: Vec<ArrayView4<f64>> = self.reconstructions.iter().map(|r| r.view()).collect();
        stack(Axis(1), &views).map_err(|e| HgnError::shape(format!("cannot stack frames: {e}")))
    }

    /// Positions over time: (batch, steps, state_dim).
    pub fn q_trajectory(&self) -> HgnResult<Array3<f64>> {
        self.trajectory(|s| s.q.view())
    }

    /// Momenta over time: (batch, steps, state_dim).
    pub fn p_trajectory(&self) -> HgnResult<Array3<f64>> {
        self.trajectory(|s| s.p.view())
    }

    fn trajectory<'a, F>(&'a self, pick: F) -> HgnResult<Array3<f64>>
    where
        F: Fn(&'a CanonicalState) -> ArrayView2<'a, f64>,
    {
        if self.states.is_empty() {
            return Err(HgnError::Sequence("no states recorded".into()));
        }
        let views: Vec<ArrayView2<f64>> = self.states.iter().map(pick).collect();
        stack(Axis(1), &views).map_err(|e| HgnError::shape(format!("cannot stack states: {e}")))
    }

    /// Export everything recorded so far for offline inspection.
    pub fn save_npz(&self, path: &Path) -> HgnResult<()> {
        let ser = |name: &str, e: ndarray_npy::WriteNpzError| {
            HgnError::Serialization(format!(
                "Failed to write '{name}' to '{}': {e}",
                path.display()
            ))
        };
        let mut npz = NpzWriter::new(File::create(path)?);
        if let Some(input) = &self.input {
            npz.add_array("input", &**input)
                .map_err(|e| ser("input", e))?;
        }
        if let Some(latent) = &self.latent {
            npz.add_array("mean", &latent.mean).map_err(|e| ser("mean", e))?;
            npz.add_array("logvar", &latent.logvar)
                .map_err(|e| ser("logvar", e))?;
            npz.add_array("sample", &latent.sample)
                .map_err(|e| ser("sample", e))?;
        }
        if !self.states.is_empty() {
            npz.add_array("q", &self.q_trajectory()?)
                .map_err(|e| ser("q", e))?;
            npz.add_array("p", &self.p_trajectory()?)
                .map_err(|e| ser("p", e))?;
        }
        if !self.reconstructions.is_empty() {
            npz.add_array("reconstructions", &self.reconstructed_rollout()?)
                .map_err(|e| ser("reconstructions", e))?;
        }
        npz.finish().map_err(|e| ser("archive", e))?;
        Ok(())
    }
}
