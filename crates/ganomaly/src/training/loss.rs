//! Adversarial, reconstruction and latent-consistency losses.
//!
//! All functions are generic over `B: Backend`, reduce with a mean, and
//! return a one-element tensor so they can be summed and backpropagated.

use burn::prelude::*;

/// Smallest argument passed to `ln` in the binary cross-entropy.
const PROB_EPS: f64 = 1e-12;

/// Binary cross-entropy between probabilities and targets.
///
/// `-(t * ln(p) + (1 - t) * ln(1 - p))`, averaged over all elements. Both
/// `p` and `1 - p` are clamped to at least 1e-12 before the log, so a
/// saturated sigmoid (exactly 0 or 1) keeps a finite value and gradient.
///
/// # Arguments
/// - `probabilities`: shape `(batch,)`, values in [0, 1]
/// - `targets`: shape `(batch,)`, values in [0, 1]
pub fn bce_loss<B: Backend>(probabilities: Tensor<B, 1>, targets: Tensor<B, 1>) -> Tensor<B, 1> {
    let log_p = probabilities.clone().clamp_min(PROB_EPS).log();
    let log_not_p = probabilities.neg().add_scalar(1.0).clamp_min(PROB_EPS).log();
    let not_targets = targets.clone().neg().add_scalar(1.0);

    (targets * log_p + not_targets * log_not_p).neg().mean()
}

/// Mean absolute difference between two tensors of equal shape.
pub fn l1_loss<B: Backend, const D: usize>(input: Tensor<B, D>, target: Tensor<B, D>) -> Tensor<B, 1> {
    (input - target).abs().mean()
}

/// Mean squared difference between two tensors of equal shape.
///
/// Used as the latent-consistency term between the two generator encodings.
pub fn l2_loss<B: Backend, const D: usize>(input: Tensor<B, D>, target: Tensor<B, D>) -> Tensor<B, 1> {
    (input - target).powf_scalar(2.0).mean()
}
