//! Reconstruction losses and the Gaussian KL regulariser.

use hgn_math::autodiff::Var;
use hgn_types::config::LossKind;
use hgn_types::constants::LOG_EPS;
use hgn_types::error::{HgnError, HgnResult};

/// Scalar loss between decoded frames and the observed frames.
pub trait ReconstructionLoss {
    /// `prediction` and `target` share a shape; the result is (1, 1).
    fn loss<'t>(&self, prediction: Var<'t>, target: Var<'t>) -> HgnResult<Var<'t>>;
}

fn check_shapes(name: &str, prediction: Var<'_>, target: Var<'_>) -> HgnResult<()> {
    if prediction.shape() != target.shape() {
        return Err(HgnError::shape(format!(
            "{name}: prediction {:?} and target {:?} differ",
            prediction.shape(),
            target.shape()
        )));
    }
    Ok(())
}

/// Mean squared error over every element.
#[derive(Debug, Clone, Copy, Default)]
pub struct MseLoss;

impl ReconstructionLoss for MseLoss {
    fn loss<'t>(&self, prediction: Var<'t>, target: Var<'t>) -> HgnResult<Var<'t>> {
        check_shapes("mse", prediction, target)?;
        Ok((prediction - target).square().mean())
    }
}

/// Binary cross-entropy for predictions in `(0, 1)`, averaged over elements.
#[derive(Debug, Clone, Copy)]
pub struct BceLoss {
    pub eps: f64,
}

impl Default for BceLoss {
    fn default() -> Self {
        BceLoss { eps: LOG_EPS }
    }
}

impl ReconstructionLoss for BceLoss {
    fn loss<'t>(&self, prediction: Var<'t>, target: Var<'t>) -> HgnResult<Var<'t>> {
        check_shapes("bce", prediction, target)?;
        let log_p = prediction.add_scalar(self.eps).ln();
        let log_not_p = (-prediction).add_scalar(1.0 + self.eps).ln();
        let not_target = (-target).add_scalar(1.0);
        Ok((target * log_p + not_target * log_not_p).mean().scale(-1.0))
    }
}

pub fn loss_from_kind(kind: LossKind) -> Box<dyn ReconstructionLoss> {
    match kind {
        LossKind::Mse => Box::new(MseLoss),
        LossKind::Bce => Box::new(BceLoss::default()),
    }
}

/// `-0.5 * mean(1 + logvar - mean^2 - exp(logvar))`, the KL divergence from
/// `N(mean, exp(logvar))` to the standard normal, averaged over elements.
pub fn kl_divergence<'t>(mean: Var<'t>, logvar: Var<'t>) -> HgnResult<Var<'t>> {
    check_shapes("kl", mean, logvar)?;
    Ok((logvar.add_scalar(1.0) - mean.square() - logvar.exp())
        .mean()
        .scale(-0.5))
}

#[cfg(test)]
mod tests {
    use super::*;
    use hgn_math::autodiff::Tape;
    use ndarray::{array, Array2};

    #[test]
    fn test_mse_value() {
        let tape = Tape::new();
        let p = tape.leaf(array![[1.0, 2.0], [3.0, 4.0]]);
        let t = tape.leaf(array![[1.0, 0.0], [3.0, 0.0]]);
        let l = MseLoss.loss(p, t).unwrap();
        assert!((l.item() - 5.0).abs() < 1e-12);
    }

    #[test]
    fn test_mse_rejects_shape_mismatch() {
        let tape = Tape::new();
        let p = tape.leaf(Array2::zeros((2, 3)));
        let t = tape.leaf(Array2::zeros((3, 2)));
        assert!(matches!(MseLoss.loss(p, t), Err(HgnError::Shape(_))));
    }

    #[test]
    fn test_bce_matches_closed_form() {
        let tape = Tape::new();
        let p = tape.leaf(array![[0.8, 0.3]]);
        let t = tape.leaf(array![[1.0, 0.0]]);
        let l = BceLoss { eps: 0.0 }.loss(p, t).unwrap();
        let expected = -(0.8_f64.ln() + 0.7_f64.ln()) / 2.0;
        assert!((l.item() - expected).abs() < 1e-12);
    }

    #[test]
    fn test_bce_finite_at_saturation() {
        let tape = Tape::new();
        let p = tape.leaf(array![[0.0, 1.0]]);
        let t = tape.leaf(array![[1.0, 0.0]]);
        assert!(BceLoss::default().loss(p, t).unwrap().item().is_finite());
    }

    #[test]
    fn test_kl_zero_at_standard_normal() {
        let tape = Tape::new();
        let mean = tape.leaf(Array2::zeros((4, 3)));
        let logvar = tape.leaf(Array2::zeros((4, 3)));
        assert_eq!(kl_divergence(mean, logvar).unwrap().item(), 0.0);
    }

    #[test]
    fn test_kl_positive_and_differentiable() {
        let tape = Tape::new();
        let mean = tape.leaf(array![[0.5, -1.0]]);
        let logvar = tape.leaf(array![[0.2, -0.3]]);
        let kl = kl_divergence(mean, logvar).unwrap();
        let expected = -0.5
            * ((1.0 + 0.2 - 0.25 - 0.2_f64.exp()) + (1.0 - 0.3 - 1.0 - (-0.3_f64).exp()))
            / 2.0;
        assert!((kl.item() - expected).abs() < 1e-12);
        assert!(kl.item() > 0.0);

        // d/dmean = mean / n
        let g = tape.gradients(kl, &[mean]);
        assert!((g[0][[0, 0]] - 0.25).abs() < 1e-12);
        assert!((g[0][[0, 1]] + 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_loss_from_kind() {
        let tape = Tape::new();
        let p = tape.leaf(array![[0.5]]);
        let t = tape.leaf(array![[0.5]]);
        assert_eq!(loss_from_kind(LossKind::Mse).loss(p, t).unwrap().item(), 0.0);
        let bce = loss_from_kind(LossKind::Bce).loss(p, t).unwrap().item();
        assert!((bce - 2.0_f64.ln()).abs() < 1e-6);
    }
}
