//! Canonical integrators for learned Hamiltonian systems.
//!
//! The Hamiltonian is any differentiable energy recorded on a [`Tape`]; the
//! equations of motion `q_dot = ∂H/∂p`, `p_dot = -∂H/∂q` are obtained by
//! differentiating it in place, so every step stays differentiable with
//! respect to the energy's parameters. Leapfrog (velocity-Verlet) is the
//! symplectic default; Euler and RK4 are kept for comparison.

use crate::autodiff::{Tape, Var};
use hgn_types::config::{IntegrationMethod, IntegratorConfig};
use hgn_types::error::{HgnError, HgnResult};
use ndarray::Array2;

/// Energy contract in canonical coordinates.
pub trait Hamiltonian {
    /// Per-sample energy `H(q, p)` of shape (batch, 1), for `q`, `p` of shape
    /// (batch, state_dim).
    fn energy<'t>(&self, tape: &'t Tape, q: Var<'t>, p: Var<'t>) -> HgnResult<Var<'t>>;
}

/// One fixed-size advance of a canonical state.
pub trait Integrator {
    fn step<'t>(
        &self,
        tape: &'t Tape,
        q: Var<'t>,
        p: Var<'t>,
        hamiltonian: &dyn Hamiltonian,
    ) -> HgnResult<(Var<'t>, Var<'t>)>;
}

/// `(∂H/∂q, ∂H/∂p)` of the batch-summed energy, recorded on the tape.
///
/// These are partials at the point `(q, p)`: earlier dependencies between `q`
/// and `p` on the same tape do not leak into them.
pub fn phase_gradients<'t>(
    tape: &'t Tape,
    hamiltonian: &dyn Hamiltonian,
    q: Var<'t>,
    p: Var<'t>,
) -> HgnResult<(Var<'t>, Var<'t>)> {
    // Fresh pass-through nodes cut the history; they still backpropagate.
    let (q, p) = (q.add_scalar(0.0), p.add_scalar(0.0));
    let energy = hamiltonian.energy(tape, q, p)?;
    if energy.shape() != (q.shape().0, 1) {
        return Err(HgnError::shape(format!(
            "Hamiltonian must return (batch, 1) energies, got {:?} for batch {}",
            energy.shape(),
            q.shape().0
        )));
    }
    let grads = tape.grad(energy.sum_all(), &[q, p]);
    Ok((grads[0], grads[1]))
}

/// Fixed-step integrator selected by [`IntegrationMethod`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CanonicalIntegrator {
    delta_t: f64,
    method: IntegrationMethod,
}

impl CanonicalIntegrator {
    pub fn new(delta_t: f64, method: IntegrationMethod) -> HgnResult<Self> {
        if !delta_t.is_finite() || delta_t <= 0.0 {
            return Err(HgnError::ConfigError(format!(
                "integrator delta_t must be finite and > 0, got {delta_t}"
            )));
        }
        Ok(Self { delta_t, method })
    }

    pub fn from_config(config: &IntegratorConfig) -> HgnResult<Self> {
        Self::new(config.delta_t, config.method)
    }

    pub fn delta_t(&self) -> f64 {
        self.delta_t
    }

    pub fn method(&self) -> IntegrationMethod {
        self.method
    }

    /// Integrate `steps` times, returning the trajectory including the initial state.
    pub fn integrate<'t>(
        &self,
        tape: &'t Tape,
        q: Var<'t>,
        p: Var<'t>,
        hamiltonian: &dyn Hamiltonian,
        steps: usize,
    ) -> HgnResult<Vec<(Var<'t>, Var<'t>)>> {
        let mut traj = Vec::with_capacity(steps + 1);
        let mut state = (q, p);
        traj.push(state);
        for _ in 0..steps {
            state = self.step(tape, state.0, state.1, hamiltonian)?;
            traj.push(state);
        }
        Ok(traj)
    }

    fn euler<'t>(
        &self,
        tape: &'t Tape,
        q: Var<'t>,
        p: Var<'t>,
        h: &dyn Hamiltonian,
    ) -> HgnResult<(Var<'t>, Var<'t>)> {
        let dt = self.delta_t;
        let (dh_dq, dh_dp) = phase_gradients(tape, h, q, p)?;
        Ok((q + dh_dp.scale(dt), p - dh_dq.scale(dt)))
    }

    fn leapfrog<'t>(
        &self,
        tape: &'t Tape,
        q: Var<'t>,
        p: Var<'t>,
        h: &dyn Hamiltonian,
    ) -> HgnResult<(Var<'t>, Var<'t>)> {
        let dt = self.delta_t;
        let (dh_dq, _) = phase_gradients(tape, h, q, p)?;
        let p_half = p - dh_dq.scale(0.5 * dt);
        let (_, dh_dp) = phase_gradients(tape, h, q, p_half)?;
        let q_new = q + dh_dp.scale(dt);
        let (dh_dq, _) = phase_gradients(tape, h, q_new, p_half)?;
        let p_new = p_half - dh_dq.scale(0.5 * dt);
        Ok((q_new, p_new))
    }

    fn rk4<'t>(
        &self,
        tape: &'t Tape,
        q: Var<'t>,
        p: Var<'t>,
        h: &dyn Hamiltonian,
    ) -> HgnResult<(Var<'t>, Var<'t>)> {
        let dt = self.delta_t;
        let f = |q: Var<'t>, p: Var<'t>| -> HgnResult<(Var<'t>, Var<'t>)> {
            let (dh_dq, dh_dp) = phase_gradients(tape, h, q, p)?;
            Ok((dh_dp, -dh_dq))
        };

        let (k1q, k1p) = f(q, p)?;
        let (k2q, k2p) = f(q + k1q.scale(0.5 * dt), p + k1p.scale(0.5 * dt))?;
        let (k3q, k3p) = f(q + k2q.scale(0.5 * dt), p + k2p.scale(0.5 * dt))?;
        let (k4q, k4p) = f(q + k3q.scale(dt), p + k3p.scale(dt))?;

        let q_new = q + (k1q + k2q.scale(2.0) + k3q.scale(2.0) + k4q).scale(dt / 6.0);
        let p_new = p + (k1p + k2p.scale(2.0) + k3p.scale(2.0) + k4p).scale(dt / 6.0);
        Ok((q_new, p_new))
    }
}

impl Integrator for CanonicalIntegrator {
    fn step<'t>(
        &self,
        tape: &'t Tape,
        q: Var<'t>,
        p: Var<'t>,
        hamiltonian: &dyn Hamiltonian,
    ) -> HgnResult<(Var<'t>, Var<'t>)> {
        if q.shape() != p.shape() {
            return Err(HgnError::shape(format!(
                "q and p must share a shape, got {:?} and {:?}",
                q.shape(),
                p.shape()
            )));
        }
        log::trace!(
            "{:?} step: dt={}, state={:?}",
            self.method,
            self.delta_t,
            q.shape()
        );
        match self.method {
            IntegrationMethod::Euler => self.euler(tape, q, p, hamiltonian),
            IntegrationMethod::Leapfrog => self.leapfrog(tape, q, p, hamiltonian),
            IntegrationMethod::Rk4 => self.rk4(tape, q, p, hamiltonian),
        }
    }
}

/// Maximum absolute drift of the batch-summed energy along a trajectory,
/// relative to its first point.
pub fn max_energy_drift(
    trajectory: &[(Array2<f64>, Array2<f64>)],
    hamiltonian: &dyn Hamiltonian,
) -> HgnResult<f64> {
    let energy_of = |q: &Array2<f64>, p: &Array2<f64>| -> HgnResult<f64> {
        let tape = Tape::new();
        let (q, p) = (tape.leaf(q.clone()), tape.leaf(p.clone()));
        Ok(hamiltonian.energy(&tape, q, p)?.sum_all().item())
    };
    let Some((q0, p0)) = trajectory.first() else {
        return Ok(0.0);
    };
    let e0 = energy_of(q0, p0)?;
    let mut drift = 0.0_f64;
    for (q, p) in trajectory {
        drift = drift.max((energy_of(q, p)? - e0).abs());
    }
    Ok(drift)
}

/// Harmonic oscillator benchmark system:
/// `H = 0.5 * Σ (p^2 + (ω q)^2)` per sample.
#[derive(Debug, Clone, Copy)]
pub struct HarmonicOscillator {
    pub omega: f64,
}

impl Hamiltonian for HarmonicOscillator {
    fn energy<'t>(&self, tape: &'t Tape, q: Var<'t>, p: Var<'t>) -> HgnResult<Var<'t>> {
        let ones = tape.leaf(Array2::ones((q.shape().1, 1)));
        let density = (p.square() + q.square().scale(self.omega * self.omega)).scale(0.5);
        Ok(density.matmul(ones))
    }
}
