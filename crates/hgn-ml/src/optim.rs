// ─────────────────────────────────────────────────────────────────────
// Hamiltonian Generative Network — Optimizers
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! First-order optimizers over [`Param`] gradients.
//!
//! `step` checks every gradient before touching any value, so a failing step
//! leaves all parameters unchanged.

use crate::param::Param;
use hgn_math::autodiff::ParamId;
use hgn_types::config::{OptimizerConfig, OptimizerKind};
use hgn_types::error::{HgnError, HgnResult};
use ndarray::Array2;
use std::collections::HashMap;

pub trait Optimizer {
    /// Drop every stored gradient.
    fn zero_grad(&mut self, params: &mut [&mut Param]) {
        for p in params.iter_mut() {
            p.clear_grad();
        }
    }

    /// Apply one update from the stored gradients. Parameters without a
    /// gradient are left alone.
    fn step(&mut self, params: &mut [&mut Param]) -> HgnResult<()>;

    fn learning_rate(&self) -> f64;
}

fn check_gradients(params: &[&mut Param]) -> HgnResult<()> {
    for p in params {
        if let Some(g) = p.grad() {
            if g.iter().any(|v| !v.is_finite()) {
                return Err(HgnError::NonFiniteGradient {
                    name: p.name().to_string(),
                });
            }
        }
    }
    Ok(())
}

/// Stochastic gradient descent with optional heavy-ball momentum.
#[derive(Debug, Default)]
pub struct Sgd {
    lr: f64,
    momentum: f64,
    velocity: HashMap<ParamId, Array2<f64>>,
}

impl Sgd {
    pub fn new(lr: f64, momentum: f64) -> Self {
        Sgd {
            lr,
            momentum,
            velocity: HashMap::new(),
        }
    }
}

impl Optimizer for Sgd {
    fn step(&mut self, params: &mut [&mut Param]) -> HgnResult<()> {
        check_gradients(params)?;
        for p in params.iter_mut() {
            let Some(g) = p.grad().cloned() else {
                continue;
            };
            let update = if self.momentum > 0.0 {
                let v = self
                    .velocity
                    .entry(p.id())
                    .or_insert_with(|| Array2::zeros(g.raw_dim()));
                *v = &*v * self.momentum + &g;
                v.clone()
            } else {
                g
            };
            p.value_mut().scaled_add(-self.lr, &update);
        }
        Ok(())
    }

    fn learning_rate(&self) -> f64 {
        self.lr
    }
}

#[derive(Debug)]
struct AdamState {
    m: Array2<f64>,
    v: Array2<f64>,
    t: i32,
}

/// Adam with bias-corrected moment estimates.
#[derive(Debug)]
pub struct Adam {
    lr: f64,
    beta1: f64,
    beta2: f64,
    eps: f64,
    state: HashMap<ParamId, AdamState>,
}

impl Adam {
    pub fn new(lr: f64, beta1: f64, beta2: f64, eps: f64) -> Self {
        Adam {
            lr,
            beta1,
            beta2,
            eps,
            state: HashMap::new(),
        }
    }
}

impl Optimizer for Adam {
    fn step(&mut self, params: &mut [&mut Param]) -> HgnResult<()> {
        check_gradients(params)?;
        for p in params.iter_mut() {
            let Some(g) = p.grad().cloned() else {
                continue;
            };
            let s = self.state.entry(p.id()).or_insert_with(|| AdamState {
                m: Array2::zeros(g.raw_dim()),
                v: Array2::zeros(g.raw_dim()),
                t: 0,
            });
            s.t += 1;
            s.m = &s.m * self.beta1 + &g * (1.0 - self.beta1);
            s.v = &s.v * self.beta2 + &g.mapv(|x| x * x) * (1.0 - self.beta2);
            let m_hat_scale = 1.0 / (1.0 - self.beta1.powi(s.t));
            let v_hat_scale = 1.0 / (1.0 - self.beta2.powi(s.t));
            let eps = self.eps;
            let update = ndarray::Zip::from(&s.m)
                .and(&s.v)
                .map_collect(|&m, &v| (m * m_hat_scale) / ((v * v_hat_scale).sqrt() + eps));
            p.value_mut().scaled_add(-self.lr, &update);
        }
        Ok(())
    }

    fn learning_rate(&self) -> f64 {
        self.lr
    }
}

pub fn optimizer_from_config(config: &OptimizerConfig) -> Box<dyn Optimizer> {
    match config.kind {
        OptimizerKind::Sgd => Box::new(Sgd::new(config.learning_rate, config.momentum)),
        OptimizerKind::Adam => Box::new(Adam::new(
            config.learning_rate,
            config.beta1,
            config.beta2,
            config.eps,
        )),
    }
}
