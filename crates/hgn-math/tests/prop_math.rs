// ─────────────────────────────────────────────────────────────────────
// Hamiltonian Generative Network — Property-Based Tests (proptest) for hgn-math
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// ORCID: https://orcid.org/0009-0009-3560-0851
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────
//! Property-based tests for hgn-math using proptest.
//!
//! Covers: tape gradients against finite differences, gradient linearity,
//! integrator determinism and time-reversibility of leapfrog.

use hgn_math::autodiff::Tape;
use hgn_math::symplectic::{CanonicalIntegrator, HarmonicOscillator, Integrator};
use hgn_types::config::IntegrationMethod;
use ndarray::Array2;
use proptest::prelude::*;

fn matrix(rows: usize, cols: usize, seed: &[f64]) -> Array2<f64> {
    Array2::from_shape_fn((rows, cols), |(i, j)| seed[(i * cols + j) % seed.len()])
}

// ── Tape Gradients ───────────────────────────────────────────────────

proptest! {
    /// Gradient of mean(tanh(x W)^2) matches central differences.
    #[test]
    fn tanh_matmul_grad_matches_fd(
        rows in 1usize..4,
        cols in 1usize..4,
        seed in prop::collection::vec(-1.5f64..1.5, 16),
    ) {
        let x0 = matrix(rows, cols, &seed);
        let w0 = matrix(cols, 2, &seed[3..]);
        let f = |x: &Array2<f64>| {
            let tape = Tape::new();
            let x = tape.leaf(x.clone());
            let w = tape.leaf(w0.clone());
            x.matmul(w).tanh().square().mean().item()
        };

        let tape = Tape::new();
        let x = tape.leaf(x0.clone());
        let w = tape.leaf(w0.clone());
        let loss = x.matmul(w).tanh().square().mean();
        let grad = &tape.gradients(loss, &[x])[0];

        let h = 1e-6;
        for i in 0..rows {
            for j in 0..cols {
                let mut xp = x0.clone();
                let mut xm = x0.clone();
                xp[[i, j]] += h;
                xm[[i, j]] -= h;
                let fd = (f(&xp) - f(&xm)) / (2.0 * h);
                prop_assert!((grad[[i, j]] - fd).abs() < 1e-6,
                    "grad[{},{}] = {}, fd = {}", i, j, grad[[i, j]], fd);
            }
        }
    }

    /// Gradients are linear in the output: ∇(a f) = a ∇f.
    #[test]
    fn gradient_scales_linearly(
        a in -5.0f64..5.0,
        seed in prop::collection::vec(-2.0f64..2.0, 6),
    ) {
        let x0 = matrix(2, 3, &seed);
        let tape = Tape::new();
        let x = tape.leaf(x0);
        let f = x.sigmoid().sum_all();
        let g = tape.gradients(f, &[x]).remove(0);
        let g_scaled = tape.gradients(f.scale(a), &[x]).remove(0);
        for (u, v) in g.iter().zip(g_scaled.iter()) {
            prop_assert!((a * u - v).abs() < 1e-12);
        }
    }
}

// ── Integrator Properties ────────────────────────────────────────────

proptest! {
    /// Stepping twice from the same state gives bit-identical results.
    #[test]
    fn integrator_step_deterministic(
        q0 in -2.0f64..2.0,
        p0 in -2.0f64..2.0,
        dt in 0.01f64..0.5,
        method in prop::sample::select(vec![
            IntegrationMethod::Euler,
            IntegrationMethod::Leapfrog,
            IntegrationMethod::Rk4,
        ]),
    ) {
        let sys = HarmonicOscillator { omega: 1.3 };
        let integrator = CanonicalIntegrator::new(dt, method).unwrap();
        let run = || {
            let tape = Tape::new();
            let q = tape.leaf(Array2::from_elem((1, 1), q0));
            let p = tape.leaf(Array2::from_elem((1, 1), p0));
            let (q1, p1) = integrator.step(&tape, q, p, &sys).unwrap();
            (q1.item(), p1.item())
        };
        prop_assert_eq!(run(), run());
    }

    /// Leapfrog is time-reversible: step forward, flip momentum, step again,
    /// flip again, and the initial state is recovered.
    #[test]
    fn leapfrog_time_reversible(
        q0 in -2.0f64..2.0,
        p0 in -2.0f64..2.0,
        dt in 0.01f64..0.5,
    ) {
        let sys = HarmonicOscillator { omega: 0.8 };
        let integrator = CanonicalIntegrator::new(dt, IntegrationMethod::Leapfrog).unwrap();
        let tape = Tape::new();
        let q = tape.leaf(Array2::from_elem((1, 1), q0));
        let p = tape.leaf(Array2::from_elem((1, 1), p0));
        let (q1, p1) = integrator.step(&tape, q, p, &sys).unwrap();
        let (q2, p2) = integrator.step(&tape, q1, -p1, &sys).unwrap();
        prop_assert!((q2.item() - q0).abs() < 1e-10);
        prop_assert!((-p2.item() - p0).abs() < 1e-10);
    }
}
