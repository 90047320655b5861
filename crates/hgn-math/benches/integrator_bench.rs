// ─────────────────────────────────────────────────────────────────────
// Hamiltonian Generative Network — Integrator Benchmark
// © 1998–2026 Miroslav Šotek. All rights reserved.
// Contact: www.anulum.li | protoscience@anulum.li
// License: GNU AGPL v3 | Commercial licensing available
// ─────────────────────────────────────────────────────────────────────

use criterion::{criterion_group, criterion_main, Criterion};
use hgn_math::autodiff::Tape;
use hgn_math::symplectic::{CanonicalIntegrator, HarmonicOscillator};
use hgn_types::config::IntegrationMethod;
use ndarray::Array2;

/// Benchmark: ten-step trajectory on one tape, batch of 16 two-dimensional states.
fn bench_integrate_methods(c: &mut Criterion) {
    let sys = HarmonicOscillator { omega: 1.0 };
    let q0 = Array2::from_shape_fn((16, 2), |(i, j)| 0.1 * i as f64 - 0.3 * j as f64);
    let p0 = Array2::from_shape_fn((16, 2), |(i, j)| 0.05 * j as f64 - 0.02 * i as f64);

    for method in [
        IntegrationMethod::Euler,
        IntegrationMethod::Leapfrog,
        IntegrationMethod::Rk4,
    ] {
        let integrator = match CanonicalIntegrator::new(0.125, method) {
            Ok(integrator) => integrator,
            Err(e) => panic!("invalid benchmark integrator: {e}"),
        };
        c.bench_function(&format!("bench_integrate_10_steps_{method:?}"), |b| {
            b.iter(|| {
                let tape = Tape::new();
                let q = tape.leaf(q0.clone());
                let p = tape.leaf(p0.clone());
                let traj = integrator.integrate(&tape, q, p, &sys, 10);
                std::hint::black_box(traj.map(|t| t.len()))
            })
        });
    }
}

/// Benchmark: backward pass through a ten-step leapfrog trajectory.
fn bench_backward_through_leapfrog(c: &mut Criterion) {
    let sys = HarmonicOscillator { omega: 1.0 };
    let integrator = match CanonicalIntegrator::new(0.125, IntegrationMethod::Leapfrog) {
        Ok(integrator) => integrator,
        Err(e) => panic!("invalid benchmark integrator: {e}"),
    };
    let q0 = Array2::from_elem((16, 2), 0.5);
    let p0 = Array2::from_elem((16, 2), -0.25);

    c.bench_function("bench_backward_through_leapfrog", |b| {
        b.iter(|| {
            let tape = Tape::new();
            let q = tape.leaf(q0.clone());
            let p = tape.leaf(p0.clone());
            let traj = match integrator.integrate(&tape, q, p, &sys, 10) {
                Ok(traj) => traj,
                Err(e) => panic!("integration failed: {e}"),
            };
            let (q_end, _) = traj[traj.len() - 1];
            let loss = q_end.square().mean();
            std::hint::black_box(tape.gradients(loss, &[q, p]))
        })
    });
}

criterion_group!(
    benches,
    bench_integrate_methods,
    bench_backward_through_leapfrog,
);
criterion_main!(benches);
