// ─────────────────────────────────────────────────────────────────────
// Hamiltonian Generative Network — Config
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_BETA, DEFAULT_CHANNELS, DEFAULT_DELTA_T, DEFAULT_IMG_SIZE, DEFAULT_SEQ_LEN,
};
use crate::error::{HgnError, HgnResult};

/// Top-level model configuration.
/// Every field has a default so partial JSON files are accepted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HgnConfig {
    /// Frames generated by default in `forward` and compared in `fit`.
    pub seq_len: usize,
    pub channels: usize,
    /// Frame size as `[height, width]`.
    pub img_size: [usize; 2],
    pub latent_dim: usize,
    /// Dimension of each of `q` and `p`.
    pub state_dim: usize,
    pub networks: NetworkConfig,
    pub integrator: IntegratorConfig,
    pub optimizer: OptimizerConfig,
    pub loss: LossKind,
    /// Weight of the KL term in the total loss.
    pub beta: f64,
    /// Seed for parameter initialisation and posterior sampling.
    pub seed: u64,
    /// Retain parameter gradients after each optimisation step.
    pub debug: bool,
}

/// Hidden layer widths of the four networks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkConfig {
    pub encoder_hidden: Vec<usize>,
    pub transformer_hidden: Vec<usize>,
    pub hamiltonian_hidden: Vec<usize>,
    pub decoder_hidden: Vec<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntegrationMethod {
    Euler,
    Leapfrog,
    Rk4,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntegratorConfig {
    pub method: IntegrationMethod,
    pub delta_t: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OptimizerKind {
    Adam,
    Sgd,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerConfig {
    pub kind: OptimizerKind,
    pub learning_rate: f64,
    /// SGD momentum; ignored by Adam.
    pub momentum: f64,
    pub beta1: f64,
    pub beta2: f64,
    pub eps: f64,
}

/// Reconstruction loss between decoded frames and input frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LossKind {
    Mse,
    Bce,
}

impl Default for HgnConfig {
    fn default() -> Self {
        HgnConfig {
            seq_len: DEFAULT_SEQ_LEN,
            channels: DEFAULT_CHANNELS,
            img_size: [DEFAULT_IMG_SIZE, DEFAULT_IMG_SIZE],
            latent_dim: 4,
            state_dim: 2,
            networks: NetworkConfig::default(),
            integrator: IntegratorConfig::default(),
            optimizer: OptimizerConfig::default(),
            loss: LossKind::Mse,
            beta: DEFAULT_BETA,
            seed: 0,
            debug: false,
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        NetworkConfig {
            encoder_hidden: vec![64],
            transformer_hidden: vec![32],
            hamiltonian_hidden: vec![32, 32],
            decoder_hidden: vec![64],
        }
    }
}

impl Default for IntegratorConfig {
    fn default() -> Self {
        IntegratorConfig {
            method: IntegrationMethod::Leapfrog,
            delta_t: DEFAULT_DELTA_T,
        }
    }
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        OptimizerConfig {
            kind: OptimizerKind::Adam,
            learning_rate: 1.5e-4,
            momentum: 0.0,
            beta1: 0.9,
            beta2: 0.999,
            eps: 1e-8,
        }
    }
}

impl HgnConfig {
    /// Load from a JSON file and validate it.
    pub fn from_file(path: &str) -> HgnResult<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Number of scalar values in one frame.
    pub fn frame_len(&self) -> usize {
        self.channels * self.img_size[0] * self.img_size[1]
    }

    pub fn validate(&self) -> HgnResult<()> {
        let positive = [
            ("seq_len", self.seq_len),
            ("channels", self.channels),
            ("img_size[0]", self.img_size[0]),
            ("img_size[1]", self.img_size[1]),
            ("latent_dim", self.latent_dim),
            ("state_dim", self.state_dim),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(HgnError::ConfigError(format!("{name} must be >= 1")));
            }
        }
        let hidden = [
            ("encoder_hidden", &self.networks.encoder_hidden),
            ("transformer_hidden", &self.networks.transformer_hidden),
            ("hamiltonian_hidden", &self.networks.hamiltonian_hidden),
            ("decoder_hidden", &self.networks.decoder_hidden),
        ];
        for (name, widths) in hidden {
            if widths.iter().any(|&w| w == 0) {
                return Err(HgnError::ConfigError(format!(
                    "{name} contains a zero-width layer: {widths:?}"
                )));
            }
        }
        if !self.integrator.delta_t.is_finite() || self.integrator.delta_t <= 0.0 {
            return Err(HgnError::ConfigError(format!(
                "integrator.delta_t must be finite and > 0, got {}",
                self.integrator.delta_t
            )));
        }
        if !self.optimizer.learning_rate.is_finite() || self.optimizer.learning_rate <= 0.0 {
            return Err(HgnError::ConfigError(format!(
                "optimizer.learning_rate must be finite and > 0, got {}",
                self.optimizer.learning_rate
            )));
        }
        if !(0.0..1.0).contains(&self.optimizer.beta1) || !(0.0..1.0).contains(&self.optimizer.beta2)
        {
            return Err(HgnError::ConfigError(format!(
                "optimizer betas must lie in [0, 1), got ({}, {})",
                self.optimizer.beta1, self.optimizer.beta2
            )));
        }
        if !self.beta.is_finite() || self.beta < 0.0 {
            return Err(HgnError::ConfigError(format!(
                "beta must be finite and >= 0, got {}",
                self.beta
            )));
        }
        Ok(())
    }
}
