// ─────────────────────────────────────────────────────────────────────
// Hamiltonian Generative Network — Orchestrator
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Forward rollout, training step and persistence of the four networks.
//!
//! ```text
//! frames 0,1 ─▶ encoder ─▶ z ─▶ transformer ─▶ (q0, p0) ─▶ decoder ─▶ frame 0
//!                                                  │
//!                                  integrator(H) ──▶ (q1, p1) ─▶ decoder ─▶ frame 1 ...
//! ```

use crate::conversions::{concat_frame_pair, flatten_frames, unflatten_frame};
use crate::loss::{kl_divergence, loss_from_kind, ReconstructionLoss};
use crate::networks::{
    Decoder, DecoderNet, Encoder, EncoderNet, HamiltonianMlp, HamiltonianNet, Transformer,
    TransformerNet,
};
use crate::optim::{optimizer_from_config, Optimizer};
use crate::param::{Param, Parameterized, StateDict};
use crate::result::RolloutResult;
use hgn_math::autodiff::{Tape, Var};
use hgn_math::symplectic::{CanonicalIntegrator, Integrator};
use hgn_types::config::HgnConfig;
use hgn_types::constants::{
    DECODER_FILENAME, ENCODER_FILENAME, HAMILTONIAN_FILENAME, TRANSFORMER_FILENAME,
};
use hgn_types::error::{HgnError, HgnResult};
use hgn_types::state::RolloutShape;
use ndarray::Array5;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::path::Path;
use std::sync::Arc;

/// Swappable collaborators of [`Hgn`].
pub struct HgnParts {
    pub encoder: Box<dyn Encoder>,
    pub transformer: Box<dyn Transformer>,
    pub hamiltonian: Box<dyn HamiltonianNet>,
    pub decoder: Box<dyn Decoder>,
    pub integrator: Box<dyn Integrator>,
    pub loss: Box<dyn ReconstructionLoss>,
    pub optimizer: Box<dyn Optimizer>,
}

/// Numeric outcome of one training step.
#[derive(Debug, Clone)]
pub struct FitOutcome {
    pub reconstruction_error: f64,
    /// `None` when the step was not variational.
    pub kl_divergence: Option<f64>,
    pub prediction: RolloutResult,
}

/// Tape handles needed by the losses.
struct Trace<'t> {
    frames: Vec<Var<'t>>,
    mean: Var<'t>,
    logvar: Var<'t>,
}

pub struct Hgn {
    config: HgnConfig,
    encoder: Box<dyn Encoder>,
    transformer: Box<dyn Transformer>,
    hamiltonian: Box<dyn HamiltonianNet>,
    decoder: Box<dyn Decoder>,
    integrator: Box<dyn Integrator>,
    loss: Box<dyn ReconstructionLoss>,
    optimizer: Box<dyn Optimizer>,
    rng: StdRng,
}

fn all_params_mut<'a>(
    encoder: &'a mut dyn Encoder,
    transformer: &'a mut dyn Transformer,
    hamiltonian: &'a mut dyn HamiltonianNet,
    decoder: &'a mut dyn Decoder,
) -> Vec<&'a mut Param> {
    let mut params = encoder.parameters_mut();
    params.extend(transformer.parameters_mut());
    params.extend(hamiltonian.parameters_mut());
    params.extend(decoder.parameters_mut());
    params
}

fn read_checked<C: Parameterized + ?Sized>(component: &C, path: &Path) -> HgnResult<StateDict> {
    let state = component.read_npz(path)?;
    component.check_state_dict(&state)?;
    Ok(state)
}

impl Hgn {
    /// Default MLP networks, integrator, loss and optimizer from `config`.
    pub fn new(config: HgnConfig) -> HgnResult<Self> {
        config.validate()?;
        let mut rng = StdRng::seed_from_u64(config.seed);
        let net = &config.networks;
        let frame_len = config.frame_len();
        let parts = HgnParts {
            encoder: Box::new(EncoderNet::new(
                2 * frame_len,
                &net.encoder_hidden,
                config.latent_dim,
                &mut rng,
            )?),
            transformer: Box::new(TransformerNet::new(
                config.latent_dim,
                &net.transformer_hidden,
                config.state_dim,
                &mut rng,
            )?),
            hamiltonian: Box::new(HamiltonianMlp::new(
                config.state_dim,
                &net.hamiltonian_hidden,
                &mut rng,
            )?),
            decoder: Box::new(DecoderNet::new(
                config.state_dim,
                &net.decoder_hidden,
                frame_len,
                &mut rng,
            )?),
            integrator: Box::new(CanonicalIntegrator::from_config(&config.integrator)?),
            loss: loss_from_kind(config.loss),
            optimizer: optimizer_from_config(&config.optimizer),
        };
        Self::with_rng(config, parts, rng)
    }

    /// Assemble from arbitrary collaborators.
    pub fn from_parts(config: HgnConfig, parts: HgnParts) -> HgnResult<Self> {
        config.validate()?;
        let rng = StdRng::seed_from_u64(config.seed);
        Self::with_rng(config, parts, rng)
    }

    fn with_rng(config: HgnConfig, parts: HgnParts, rng: StdRng) -> HgnResult<Self> {
        let debug = config.debug;
        let mut hgn = Hgn {
            config,
            encoder: parts.encoder,
            transformer: parts.transformer,
            hamiltonian: parts.hamiltonian,
            decoder: parts.decoder,
            integrator: parts.integrator,
            loss: parts.loss,
            optimizer: parts.optimizer,
            rng,
        };
        if debug {
            hgn.debug_mode();
        }
        log::debug!(
            "HGN ready: {} parameters, seq_len={}",
            hgn.num_parameters(),
            hgn.config.seq_len
        );
        Ok(hgn)
    }

    pub fn config(&self) -> &HgnConfig {
        &self.config
    }

    /// Restart posterior sampling from `seed`.
    pub fn reseed(&mut self, seed: u64) {
        self.rng = StdRng::seed_from_u64(seed);
    }

    pub fn parameters(&self) -> Vec<&Param> {
        let mut params = self.encoder.parameters();
        params.extend(self.transformer.parameters());
        params.extend(self.hamiltonian.parameters());
        params.extend(self.decoder.parameters());
        params
    }

    pub fn num_parameters(&self) -> usize {
        self.parameters().iter().map(|p| p.numel()).sum()
    }

    /// Keep every parameter gradient after the optimisation step.
    pub fn debug_mode(&mut self) {
        for p in all_params_mut(
            &mut *self.encoder,
            &mut *self.transformer,
            &mut *self.hamiltonian,
            &mut *self.decoder,
        ) {
            p.set_retain_grad(true);
        }
    }

    /// Generate `n_steps` frames (default `seq_len`) from the first two frames
    /// of `rollouts`, shaped (batch, T, C, H, W) with `T >= 2`.
    pub fn forward(
        &mut self,
        rollouts: impl Into<Arc<Array5<f64>>>,
        n_steps: Option<usize>,
        variational: bool,
    ) -> HgnResult<RolloutResult> {
        let tape = Tape::new();
        let steps = n_steps.unwrap_or(self.config.seq_len);
        let (result, _) = self.unroll(&tape, rollouts.into(), steps, variational)?;
        Ok(result)
    }

    fn unroll<'t>(
        &mut self,
        tape: &'t Tape,
        rollouts: Arc<Array5<f64>>,
        n_steps: usize,
        variational: bool,
    ) -> HgnResult<(RolloutResult, Trace<'t>)> {
        if n_steps == 0 {
            return Err(HgnError::shape("n_steps must be >= 1"));
        }
        let observed = RolloutShape::new(rollouts.shape())?;
        let [h, w] = self.config.img_size;
        if [observed.channels, observed.height, observed.width] != [self.config.channels, h, w] {
            return Err(HgnError::shape(format!(
                "frames are {}x{}x{}, model expects {}x{h}x{w}",
                observed.channels, observed.height, observed.width, self.config.channels
            )));
        }

        let mut result = RolloutResult::new(&observed.with_steps(n_steps)?.dims())?;
        let pair = concat_frame_pair(&rollouts)?;
        result.set_input(rollouts)?;

        let latent = self
            .encoder
            .encode(tape, tape.leaf(pair), variational, &mut self.rng)?;
        result.set_latent(
            latent.mean.value(),
            latent.logvar.value(),
            latent.sample.value(),
        )?;

        let (mut q, mut p) = self.transformer.transform(tape, latent.sample)?;
        let mut frames = Vec::with_capacity(n_steps);
        for step in 0..n_steps {
            if step > 0 {
                (q, p) = self
                    .integrator
                    .step(tape, q, p, self.hamiltonian.as_hamiltonian())?;
            }
            result.append_state(q.value(), p.value())?;
            let x = self.decoder.decode(tape, q)?;
            result.append_reconstruction(unflatten_frame(
                &x.value(),
                observed.channels,
                observed.height,
                observed.width,
            )?)?;
            frames.push(x);
        }
        log::trace!("unrolled {n_steps} steps on a tape of {} nodes", tape.len());

        Ok((
            result,
            Trace {
                frames,
                mean: latent.mean,
                logvar: latent.logvar,
            },
        ))
    }

    /// One optimisation step on the first `seq_len` frames of `rollouts`.
    ///
    /// Parameters change only if the forward pass, both losses and every
    /// gradient are finite and well-formed.
    pub fn fit(
        &mut self,
        rollouts: impl Into<Arc<Array5<f64>>>,
        variational: bool,
    ) -> HgnResult<FitOutcome> {
        let rollouts = rollouts.into();
        let seq_len = self.config.seq_len;
        let available = rollouts.shape().get(1).copied().unwrap_or(0);
        if available < seq_len {
            return Err(HgnError::shape(format!(
                "fit needs {seq_len} frames per rollout, got {available}"
            )));
        }

        {
            let mut params = all_params_mut(
                &mut *self.encoder,
                &mut *self.transformer,
                &mut *self.hamiltonian,
                &mut *self.decoder,
            );
            self.optimizer.zero_grad(&mut params);
        }

        let tape = Tape::new();
        let target = tape.leaf(flatten_frames(&rollouts, seq_len)?);
        let (prediction, trace) = self.unroll(&tape, rollouts, seq_len, variational)?;

        let reconstructed = tape.concat_cols(&trace.frames);
        let reconstruction = self.loss.loss(reconstructed, target)?;
        if reconstruction.shape() != (1, 1) {
            return Err(HgnError::shape(format!(
                "reconstruction loss must be a (1, 1) scalar, got {:?}",
                reconstruction.shape()
            )));
        }
        let kl = if variational {
            Some(kl_divergence(trace.mean, trace.logvar)?)
        } else {
            None
        };
        let total = match kl {
            Some(kl) => reconstruction + kl.scale(self.config.beta),
            None => reconstruction,
        };

        let reconstruction_error = reconstruction.item();
        let kl_value = kl.map(|k| k.item());
        if !total.item().is_finite() {
            log::warn!(
                "Non-finite loss (reconstruction={reconstruction_error}, kl={kl_value:?}); skipping update"
            );
            return Err(HgnError::NonFiniteLoss {
                reconstruction: reconstruction_error,
                kl: kl_value,
            });
        }

        // Parameters that never reached the tape keep no gradient.
        let bound: Vec<(usize, Var<'_>)> = self
            .parameters()
            .iter()
            .enumerate()
            .filter_map(|(i, p)| tape.bound_param(p.id()).map(|v| (i, v)))
            .collect();
        let vars: Vec<Var<'_>> = bound.iter().map(|&(_, v)| v).collect();
        let grads = tape.gradients(total, &vars);

        let mut params = all_params_mut(
            &mut *self.encoder,
            &mut *self.transformer,
            &mut *self.hamiltonian,
            &mut *self.decoder,
        );
        for (&(i, _), g) in bound.iter().zip(grads) {
            params[i].set_grad(g)?;
        }
        let stepped = self.optimizer.step(&mut params);
        for p in params.iter_mut().filter(|p| !p.retains_grad()) {
            p.clear_grad();
        }
        stepped?;

        log::debug!(
            "fit: reconstruction={reconstruction_error:.6}, kl={kl_value:?}, tape={} nodes",
            tape.len()
        );
        Ok(FitOutcome {
            reconstruction_error,
            kl_divergence: kl_value,
            prediction,
        })
    }

    /// Write the four networks into `directory`, creating it if needed.
    pub fn save(&self, directory: impl AsRef<Path>) -> HgnResult<()> {
        let dir = directory.as_ref();
        std::fs::create_dir_all(dir)?;
        self.encoder.save_npz(&dir.join(ENCODER_FILENAME))?;
        self.transformer.save_npz(&dir.join(TRANSFORMER_FILENAME))?;
        self.hamiltonian.save_npz(&dir.join(HAMILTONIAN_FILENAME))?;
        self.decoder.save_npz(&dir.join(DECODER_FILENAME))?;
        log::info!(
            "Saved HGN ({} parameters) to {}",
            self.num_parameters(),
            dir.display()
        );
        Ok(())
    }

    /// Replace the four networks' parameters from `directory`. All archives
    /// are read and checked before any parameter changes.
    pub fn load(&mut self, directory: impl AsRef<Path>) -> HgnResult<()> {
        let dir = directory.as_ref();
        if !dir.is_dir() {
            return Err(HgnError::NotFound {
                path: dir.display().to_string(),
            });
        }
        let encoder = read_checked(self.encoder.as_ref(), &dir.join(ENCODER_FILENAME))?;
        let transformer =
            read_checked(self.transformer.as_ref(), &dir.join(TRANSFORMER_FILENAME))?;
        let hamiltonian =
            read_checked(self.hamiltonian.as_ref(), &dir.join(HAMILTONIAN_FILENAME))?;
        let decoder = read_checked(self.decoder.as_ref(), &dir.join(DECODER_FILENAME))?;

        self.encoder.load_state_dict(&encoder)?;
        self.transformer.load_state_dict(&transformer)?;
        self.hamiltonian.load_state_dict(&hamiltonian)?;
        self.decoder.load_state_dict(&decoder)?;
        log::info!("Loaded HGN from {}", dir.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loss::MseLoss;
    use crate::optim::Sgd;
    use hgn_math::symplectic::{Hamiltonian, HarmonicOscillator};
    use hgn_types::config::{IntegrationMethod, NetworkConfig, OptimizerConfig, OptimizerKind};
    use ndarray::Array2;
    use std::path::PathBuf;
    use std::time::{SystemTime, UNIX_EPOCH};

    fn small_config() -> HgnConfig {
        HgnConfig {
            seq_len: 4,
            channels: 1,
            img_size: [3, 3],
            latent_dim: 3,
            state_dim: 2,
            networks: NetworkConfig {
                encoder_hidden: vec![8],
                transformer_hidden: vec![6],
                hamiltonian_hidden: vec![6],
                decoder_hidden: vec![8],
            },
            optimizer: OptimizerConfig {
                kind: OptimizerKind::Adam,
                learning_rate: 1e-2,
                ..OptimizerConfig::default()
            },
            seed: 3,
            ..HgnConfig::default()
        }
    }

    fn rollouts(batch: usize, steps: usize) -> Array5<f64> {
        Array5::from_shape_fn((batch, steps, 1, 3, 3), |(b, t, _, i, j)| {
            0.5 + 0.4 * ((b + 2 * t + i) as f64 * 0.3 + j as f64 * 0.1).sin()
        })
    }

    /// Fixed energy with no learnable parameters.
    struct FixedOscillator(HarmonicOscillator);

    impl Parameterized for FixedOscillator {
        fn parameters(&self) -> Vec<&Param> {
            Vec::new()
        }

        fn parameters_mut(&mut self) -> Vec<&mut Param> {
            Vec::new()
        }
    }

    impl Hamiltonian for FixedOscillator {
        fn energy<'t>(&self, tape: &'t Tape, q: Var<'t>, p: Var<'t>) -> HgnResult<Var<'t>> {
            self.0.energy(tape, q, p)
        }
    }

    impl HamiltonianNet for FixedOscillator {
        fn as_hamiltonian(&self) -> &dyn Hamiltonian {
            self
        }
    }

    /// Element-wise squared error without the reduction.
    struct UnreducedLoss;

    impl ReconstructionLoss for UnreducedLoss {
        fn loss<'t>(&self, prediction: Var<'t>, target: Var<'t>) -> HgnResult<Var<'t>> {
            Ok((prediction - target).square())
        }
    }

    fn oscillator_parts(
        cfg: &HgnConfig,
        integrator: CanonicalIntegrator,
        loss: Box<dyn ReconstructionLoss>,
    ) -> HgnParts {
        let mut rng = StdRng::seed_from_u64(cfg.seed);
        let net = &cfg.networks;
        let frame_len = cfg.frame_len();
        HgnParts {
            encoder: Box::new(
                EncoderNet::new(2 * frame_len, &net.encoder_hidden, cfg.latent_dim, &mut rng)
                    .unwrap(),
            ),
            transformer: Box::new(
                TransformerNet::new(cfg.latent_dim, &net.transformer_hidden, cfg.state_dim, &mut rng)
                    .unwrap(),
            ),
            hamiltonian: Box::new(FixedOscillator(HarmonicOscillator { omega: 1.5 })),
            decoder: Box::new(
                DecoderNet::new(cfg.state_dim, &net.decoder_hidden, frame_len, &mut rng).unwrap(),
            ),
            integrator: Box::new(integrator),
            loss,
            optimizer: Box::new(Sgd::new(0.1, 0.0)),
        }
    }

    fn temp_dir(tag: &str) -> PathBuf {
        let epoch_ns = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_nanos();
        std::env::temp_dir().join(format!(
            "hgn_{tag}_{}_{}",
            std::process::id(),
            epoch_ns
        ))
    }

    #[test]
    fn test_forward_default_steps() {
        let mut hgn = Hgn::new(small_config()).unwrap();
        let result = hgn.forward(rollouts(2, 5), None, false).unwrap();
        assert_eq!(result.len(), 4);
        assert!(result.is_complete());
        assert_eq!(result.reconstructed_rollout().unwrap().dim(), (2, 4, 1, 3, 3));
        assert_eq!(result.input().unwrap().dim(), (2, 5, 1, 3, 3));
    }

    #[test]
    fn test_forward_rejects_zero_steps_and_single_frame() {
        let mut hgn = Hgn::new(small_config()).unwrap();
        assert!(matches!(
            hgn.forward(rollouts(1, 3), Some(0), false),
            Err(HgnError::Shape(_))
        ));
        assert!(matches!(
            hgn.forward(rollouts(1, 1), Some(1), false),
            Err(HgnError::Shape(_))
        ));
    }

    #[test]
    fn test_forward_rejects_wrong_frame_size() {
        let mut hgn = Hgn::new(small_config()).unwrap();
        let x = Array5::<f64>::zeros((1, 3, 1, 4, 4));
        assert!(matches!(
            hgn.forward(x, Some(2), false),
            Err(HgnError::Shape(_))
        ));
    }

    #[test]
    fn test_first_state_is_transformed_mean() {
        let mut hgn = Hgn::new(small_config()).unwrap();
        let result = hgn.forward(rollouts(2, 3), Some(1), false).unwrap();
        let latent = result.latent().unwrap();
        assert_eq!(latent.sample, latent.mean);
        assert_eq!(result.states().len(), 1);
    }

    #[test]
    fn test_reconstruction_depends_only_on_state() {
        let mut hgn = Hgn::new(small_config()).unwrap();
        let result = hgn.forward(rollouts(2, 3), Some(3), true).unwrap();
        let tape = Tape::new();
        for (state, frame) in result.states().iter().zip(result.reconstructions()) {
            let x = hgn.decoder.decode(&tape, tape.leaf(state.q.clone())).unwrap();
            let again = unflatten_frame(&x.value(), 1, 3, 3).unwrap();
            assert_eq!(&again, frame);
        }
    }

    #[test]
    fn test_fit_requires_seq_len_frames() {
        let mut hgn = Hgn::new(small_config()).unwrap();
        assert!(matches!(
            hgn.fit(rollouts(2, 3), true),
            Err(HgnError::Shape(_))
        ));
    }

    #[test]
    fn test_fit_updates_every_network() {
        let mut hgn = Hgn::new(small_config()).unwrap();
        let before: Vec<Array2<f64>> = hgn.parameters().iter().map(|p| p.value().clone()).collect();
        let outcome = hgn.fit(rollouts(2, 4), true).unwrap();
        assert!(outcome.reconstruction_error.is_finite());
        assert!(outcome.kl_divergence.unwrap().is_finite());
        assert_eq!(outcome.prediction.len(), 4);

        let after = hgn.parameters();
        // Output-layer weights of encoder, transformer, Hamiltonian and decoder.
        for index in [2, 6, 10, 14] {
            assert_ne!(after[index].value(), &before[index]);
        }
        // Gradients are dropped after the step outside debug mode.
        assert!(after.iter().all(|p| p.grad().is_none()));
    }

    #[test]
    fn test_debug_mode_retains_gradients() {
        let mut hgn = Hgn::new(small_config()).unwrap();
        hgn.debug_mode();
        hgn.debug_mode();
        hgn.fit(rollouts(1, 4), false).unwrap();
        assert!(hgn.parameters().iter().all(|p| p.grad().is_some()));
    }

    #[test]
    fn test_debug_flag_in_config() {
        let hgn = Hgn::new(HgnConfig {
            debug: true,
            ..small_config()
        })
        .unwrap();
        assert!(hgn.parameters().iter().all(|p| p.retains_grad()));
    }

    #[test]
    fn test_non_finite_input_aborts_without_update() {
        let mut hgn = Hgn::new(small_config()).unwrap();
        let before: Vec<Array2<f64>> = hgn.parameters().iter().map(|p| p.value().clone()).collect();
        let mut x = rollouts(1, 4);
        x[[0, 3, 0, 1, 1]] = f64::NAN;
        let err = hgn.fit(x, false).unwrap_err();
        assert!(matches!(err, HgnError::NonFiniteLoss { kl: None, .. }));
        let after: Vec<Array2<f64>> = hgn.parameters().iter().map(|p| p.value().clone()).collect();
        assert_eq!(before, after);
    }

    #[test]
    fn test_load_missing_directory_is_not_found() {
        let mut hgn = Hgn::new(small_config()).unwrap();
        let err = hgn.load(temp_dir("missing")).unwrap_err();
        assert!(matches!(err, HgnError::NotFound { .. }));
    }

    #[test]
    fn test_load_missing_file_leaves_model_unchanged() {
        let source = Hgn::new(small_config()).unwrap();
        let mut target = Hgn::new(HgnConfig {
            seed: 42,
            ..small_config()
        })
        .unwrap();
        let before: Vec<Array2<f64>> =
            target.parameters().iter().map(|p| p.value().clone()).collect();

        let dir = temp_dir("partial");
        source.save(&dir).unwrap();
        std::fs::remove_file(dir.join(DECODER_FILENAME)).unwrap();
        let err = target.load(&dir).unwrap_err();
        assert!(matches!(err, HgnError::NotFound { .. }));
        let after: Vec<Array2<f64>> =
            target.parameters().iter().map(|p| p.value().clone()).collect();
        assert_eq!(before, after);

        std::fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_load_incompatible_architecture_is_deserialization_error() {
        let source = Hgn::new(small_config()).unwrap();
        let mut cfg = small_config();
        cfg.networks.decoder_hidden = vec![5];
        let mut target = Hgn::new(cfg).unwrap();

        let dir = temp_dir("incompatible");
        source.save(&dir).unwrap();
        let err = target.load(&dir).unwrap_err();
        assert!(matches!(err, HgnError::Deserialization(_)));
        std::fs::remove_dir_all(dir).ok();
    }

    #[test]
    fn test_forward_trajectory_matches_stepwise_integration() {
        let cfg = small_config();
        let integrator = CanonicalIntegrator::new(0.2, IntegrationMethod::Leapfrog).unwrap();
        let sys = HarmonicOscillator { omega: 1.5 };
        let parts = oscillator_parts(&cfg, integrator, Box::new(MseLoss));
        let mut hgn = Hgn::from_parts(cfg, parts).unwrap();
        let result = hgn.forward(rollouts(2, 4), Some(8), false).unwrap();
        let states = result.states();

        let (mut q, mut p) = (states[0].q.clone(), states[0].p.clone());
        for state in &states[1..] {
            let tape = Tape::new();
            let (qv, pv) = integrator
                .step(&tape, tape.leaf(q), tape.leaf(p), &sys)
                .unwrap();
            q = qv.value();
            p = pv.value();
            for (a, b) in state.q.iter().zip(q.iter()).chain(state.p.iter().zip(p.iter())) {
                assert!((a - b).abs() < 1e-12, "chained {a} vs stepwise {b}");
            }
        }
    }

    #[test]
    fn test_fit_rejects_non_scalar_loss_without_update() {
        let cfg = small_config();
        let integrator = CanonicalIntegrator::new(0.1, IntegrationMethod::Leapfrog).unwrap();
        let parts = oscillator_parts(&cfg, integrator, Box::new(UnreducedLoss));
        let mut hgn = Hgn::from_parts(cfg, parts).unwrap();
        let before: Vec<Array2<f64>> = hgn.parameters().iter().map(|p| p.value().clone()).collect();
        let err = hgn.fit(rollouts(2, 4), true).unwrap_err();
        assert!(matches!(err, HgnError::Shape(_)));
        let after: Vec<Array2<f64>> = hgn.parameters().iter().map(|p| p.value().clone()).collect();
        assert_eq!(before, after);
    }
}
