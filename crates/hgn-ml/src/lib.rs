// ─────────────────────────────────────────────────────────────────────
// Hamiltonian Generative Network — HGN ML
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Learned latent Hamiltonian dynamics from image rollouts.
//!
//! Encoder, transformer, Hamiltonian network and decoder, the rollout
//! accumulator, and the [`hgn::Hgn`] orchestrator driving forward and fit.

pub mod conversions;
pub mod hgn;
pub mod loss;
pub mod networks;
pub mod optim;
pub mod param;
pub mod result;

pub use hgn::{FitOutcome, Hgn, HgnParts};
pub use result::{CanonicalState, LatentDistribution, RolloutResult};
