#![allow(dead_code)]

use candle_core::{Result, Tensor};

/// An image encoder backbone that pools a `(n x c x h x w)` batch
/// down to one feature vector per image.
pub trait ImageEncoderModuleT {
    /// # Arguments
    /// * `x_nchw` - input images (n x c x h x w)
    /// * `train` - whether to use batchnorm statistics updates
    ///
    /// # Returns `h_nf` - feature vectors (n x out_dim)
    fn forward_t(&self, x_nchw: &Tensor, train: bool) -> Result<Tensor>;

    /// Feature dimensionality; the orchestrator sizes its projection
    /// heads from this, and the online probe collaborator reads it.
    fn out_dim(&self) -> usize;
}

/// The structural inverse: latent vectors back to image-shaped
/// reconstruction parameters.
pub trait ImageDecoderModuleT {
    /// # Arguments
    /// * `z_nk` - latent vectors (n x latent_dim)
    /// * `train` - whether to use batchnorm statistics updates
    ///
    /// # Returns `xhat_nchw` - reconstruction means (n x c x h x w)
    fn forward_t(&self, z_nk: &Tensor, train: bool) -> Result<Tensor>;

    fn dim_latent(&self) -> usize;
}
