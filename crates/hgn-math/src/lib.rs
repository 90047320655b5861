//! Mathematical primitives for the Hamiltonian Generative Network.

pub mod autodiff;
pub mod symplectic;
