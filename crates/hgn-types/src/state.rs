// ─────────────────────────────────────────────────────────────────────
// Hamiltonian Generative Network — State
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
use crate::error::{HgnError, HgnResult};

/// Shape of a rollout tensor: (batch, steps, channels, height, width).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RolloutShape {
    pub batch: usize,
    pub steps: usize,
    pub channels: usize,
    pub height: usize,
    pub width: usize,
}

impl RolloutShape {
    /// Build from a 5-element dimension slice, rejecting zero-sized axes.
    pub fn new(dims: &[usize]) -> HgnResult<Self> {
        if dims.len() != 5 {
            return Err(HgnError::shape(format!(
                "rollout shape must have 5 axes (batch, steps, channels, height, width), got {dims:?}"
            )));
        }
        const AXES: [&str; 5] = ["batch", "steps", "channels", "height", "width"];
        if let Some(axis) = dims.iter().position(|&d| d == 0) {
            return Err(HgnError::shape(format!(
                "rollout axis '{}' must be >= 1, got shape {dims:?}",
                AXES[axis]
            )));
        }
        Ok(RolloutShape {
            batch: dims[0],
            steps: dims[1],
            channels: dims[2],
            height: dims[3],
            width: dims[4],
        })
    }

    /// Scalars per frame (channels x height x width).
    pub fn frame_len(&self) -> usize {
        self.channels * self.height * self.width
    }

    /// Shape of one decoded frame batch: (batch, channels, height, width).
    pub fn frame_dims(&self) -> [usize; 4] {
        [self.batch, self.channels, self.height, self.width]
    }

    pub fn dims(&self) -> [usize; 5] {
        [self.batch, self.steps, self.channels, self.height, self.width]
    }

    /// Same rollout with a different number of steps.
    pub fn with_steps(&self, steps: usize) -> HgnResult<Self> {
        let mut dims = self.dims();
        dims[1] = steps;
        Self::new(&dims)
    }
}
