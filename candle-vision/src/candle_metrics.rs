#![allow(dead_code)]

use candle_core::{Result, Tensor};

/// Gini coefficient of latent activation magnitudes
///
/// gini(i) = sum_k (2k - n - 1) * w(i,k) / (n * sum_k w(i,k))
///
/// where `w(i,:)` are the absolute activations of row i sorted in
/// ascending order and k runs from 1 to n. Equals 0 when every
/// dimension carries the same magnitude, approaches 1 as the mass
/// concentrates on a single dimension, and is invariant to a global
/// positive rescaling of `z`.
///
/// Diagnostic only: the input is detached, so nothing back-propagates
/// through the score.
///
/// * `z_nk` - latent batch (n x k)
///
/// Returns one score per batch element `(n,)`.
pub fn gini_score(z_nk: &Tensor) -> Result<Tensor> {
    debug_assert_eq!(z_nk.dims().len(), 2);

    let w_nk = z_nk.detach().abs()?;
    let (sorted_nk, _indices) = w_nk.sort_last_dim(true)?;

    let k = sorted_nk.dim(1)?;
    let rank_k = Tensor::arange(1f32, (k + 1) as f32, sorted_nk.device())?;
    let coef_k = ((rank_k * 2.0)? - (k as f64 + 1.0))?;

    let num_n = sorted_nk.broadcast_mul(&coef_k)?.sum(1)?;
    let denom_n = ((sorted_nk.sum(1)? * k as f64)? + 1e-8)?;
    num_n.div(&denom_n)
}
