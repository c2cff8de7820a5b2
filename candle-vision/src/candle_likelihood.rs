#![allow(dead_code)]

use candle_core::{Result, Tensor};
use candle_nn::ops::sigmoid;

/// 8-bit pixel quantization bin width.
const BINSIZE: f64 = 1.0 / 256.0;

/// Keeps the bin-edge sigmoid evaluations away from the saturated
/// ends of the [-0.5, 0.5] pixel range.
const MEAN_MARGIN: f64 = 1.0 / 512.0;

/// Guards the log of near-zero CDF differences.
const CDF_EPS: f64 = 1e-7;

const LN_2PI: f64 = 1.8378770664093453;

/// Discretized logistic log-likelihood of 8-bit pixels
///
/// llik(i) = sum_{c,h,w} log[ sigmoid((x_bin - mu + 1/256) / s)
///                          - sigmoid((x_bin - mu) / s) + 1e-7 ]
///
/// where x_bin snaps the target to its 1/256 quantization bin and
/// mu is clamped into [-0.5 + 1/512, 0.5 - 1/512]. Integrating the
/// logistic density over each bin models the quantization explicitly.
/// The clamp and the additive epsilon are both load-bearing; without
/// them boundary pixels produce -inf.
///
/// * `mean_nchw` - reconstruction mean (n x c x h x w)
/// * `log_scale` - log of the logistic scale, scalar-shaped `(1,)`
/// * `x_nchw` - target sample in [-0.5, 0.5] (n x c x h x w)
///
/// Returns one value per batch element `(n,)`.
pub fn discretized_logistic_llik(
    mean_nchw: &Tensor,
    log_scale: &Tensor,
    x_nchw: &Tensor,
) -> Result<Tensor> {
    let mean_nchw = mean_nchw.clamp(-0.5 + MEAN_MARGIN, 0.5 - MEAN_MARGIN)?;
    let scale = log_scale.exp()?;

    let binned = ((x_nchw * (1.0 / BINSIZE))?.floor()? * BINSIZE)?;
    let centered = (binned - mean_nchw)?.broadcast_div(&scale)?;

    let edge = (scale.recip()? * BINSIZE)?;
    let cdf_hi = sigmoid(&centered.broadcast_add(&edge)?)?;
    let cdf_lo = sigmoid(&centered)?;

    let log_pxz = ((cdf_hi - cdf_lo)? + CDF_EPS)?.log()?;
    log_pxz.sum((1, 2, 3))
}

/// Gaussian log-likelihood of continuous pixels
///
/// llik(i) = sum_{c,h,w} [ -(x - mu)^2 / (2 s^2) - log(s) - log(2 pi)/2 ]
///
/// * `mean_nchw` - reconstruction mean (n x c x h x w)
/// * `log_scale` - log standard deviation, scalar-shaped `(1,)`
/// * `x_nchw` - target sample (n x c x h x w)
///
/// Returns one value per batch element `(n,)`.
pub fn gaussian_llik(mean_nchw: &Tensor, log_scale: &Tensor, x_nchw: &Tensor) -> Result<Tensor> {
    let scale = log_scale.exp()?;
    let z = (x_nchw - mean_nchw)?.broadcast_div(&scale)?;
    let log_norm = (log_scale + 0.5 * LN_2PI)?;
    let log_pxz = (z.sqr()? * (-0.5))?.broadcast_sub(&log_norm)?;
    log_pxz.sum((1, 2, 3))
}
