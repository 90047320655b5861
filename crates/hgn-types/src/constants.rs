// ─────────────────────────────────────────────────────────────────────
// Hamiltonian Generative Network — Constants
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
/// Persisted encoder parameters inside a model directory.
pub const ENCODER_FILENAME: &str = "encoder.npz";

/// Persisted transformer parameters inside a model directory.
pub const TRANSFORMER_FILENAME: &str = "transformer.npz";

/// Persisted Hamiltonian network parameters inside a model directory.
pub const HAMILTONIAN_FILENAME: &str = "hamiltonian.npz";

/// Persisted decoder parameters inside a model directory.
pub const DECODER_FILENAME: &str = "decoder.npz";

/// KL weight in the total loss. Fixed, never annealed.
pub const DEFAULT_BETA: f64 = 0.01;

/// Integration step in latent time units.
pub const DEFAULT_DELTA_T: f64 = 0.125;

/// Frames per rollout.
pub const DEFAULT_SEQ_LEN: usize = 10;

/// RGB frames.
pub const DEFAULT_CHANNELS: usize = 3;

/// Square frame side in pixels.
pub const DEFAULT_IMG_SIZE: usize = 32;

/// Number of frames concatenated along the channel axis to form the encoder input.
pub const ENCODER_FRAMES: usize = 2;

/// Numerical floor inside logarithms (binary cross-entropy).
pub const LOG_EPS: f64 = 1e-7;
