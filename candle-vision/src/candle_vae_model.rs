#![allow(dead_code)]

use core::f64;

use crate::candle_data_loader::{ImageBatch, TrainBatch};
use crate::candle_distribution::{kl_divergence_mc, DistributionKind, LatentDistribution};
use crate::candle_likelihood::discretized_logistic_llik;
use crate::candle_metrics::gini_score;
use crate::candle_model_traits::{ImageDecoderModuleT, ImageEncoderModuleT};
use crate::candle_projection::{Projection, ProjectionKind};
use crate::candle_resnet_decoder::{DecoderKind, ResNetDecoder};
use crate::candle_resnet_encoder::{EncoderKind, ResNetEncoder};

use candle_core::{Result, Tensor, D};
use candle_nn::VarBuilder;

/// Width of the optional non-linear projection trunk.
const PROJECTION_HIDDEN_DIM: usize = 2048;

/// Everything the orchestrator needs to build itself; all the
/// name-keyed choices are already resolved to closed enums, so an
/// invalid configuration can no longer reach this point.
#[derive(Debug, Clone)]
pub struct VaeConfig {
    pub input_height: usize,
    pub latent_dim: usize,
    /// Recorded with the run; not applied to the loss in this
    /// revision.
    pub kl_coeff: f64,
    pub encoder: EncoderKind,
    pub decoder: DecoderKind,
    pub prior: DistributionKind,
    pub posterior: DistributionKind,
    pub projection: ProjectionKind,
    pub first_conv: bool,
    pub maxpool1: bool,
    /// Train on the unlabeled side of mixed batches (the STL-10
    /// dataloader interleaves an unlabeled batch with the labeled
    /// one).
    pub unlabeled_batch: bool,
    pub num_kl_samples: usize,
}

impl Default for VaeConfig {
    fn default() -> Self {
        Self {
            input_height: 32,
            latent_dim: 256,
            kl_coeff: 0.1,
            encoder: EncoderKind::Resnet18,
            decoder: DecoderKind::Resnet18,
            prior: DistributionKind::Normal,
            posterior: DistributionKind::Normal,
            projection: ProjectionKind::Linear,
            first_conv: false,
            maxpool1: false,
            unlabeled_batch: false,
            num_kl_samples: 1,
        }
    }
}

pub struct VaeForward {
    pub z_nk: Tensor,
    pub xhat_nchw: Tensor,
    pub prior: LatentDistribution,
    pub posterior: LatentDistribution,
}

/// Convolutional VAE: ResNet encoder -> projection heads ->
/// reparameterized latent sample -> ResNet decoder, scored with a
/// discretized-logistic pixel likelihood against the second augmented
/// view.
///
/// Stateless across steps apart from the learned parameters; the
/// distributions are rebuilt from fresh projections every forward
/// pass.
pub struct ImageVae {
    encoder: ResNetEncoder,
    decoder: ResNetDecoder,
    fc_mean: Projection,
    fc_lnvar: Projection,
    log_scale: Tensor,
    config: VaeConfig,
    in_channels: usize,
}

impl ImageVae {
    /// Variables are created under `enc.*`, `dec.*`, `proj.mean.*`,
    /// `proj.lnvar.*`, and the single learnable `log_scale`
    /// controlling the reconstruction-likelihood spread.
    pub fn new(config: &VaeConfig, vs: VarBuilder) -> Result<Self> {
        let encoder = ResNetEncoder::new(
            config.encoder,
            config.first_conv,
            config.maxpool1,
            vs.clone(),
        )?;
        let decoder = ResNetDecoder::new(
            config.decoder,
            config.latent_dim,
            config.input_height,
            config.first_conv,
            config.maxpool1,
            vs.clone(),
        )?;

        let fc_mean = Projection::new(
            config.projection,
            encoder.out_dim(),
            PROJECTION_HIDDEN_DIM,
            config.latent_dim,
            vs.pp("proj.mean"),
        )?;
        let fc_lnvar = Projection::new(
            config.projection,
            encoder.out_dim(),
            PROJECTION_HIDDEN_DIM,
            config.latent_dim,
            vs.pp("proj.lnvar"),
        )?;

        let log_scale = vs.get_with_hints(1, "log_scale", candle_nn::init::ZERO)?;

        Ok(Self {
            encoder,
            decoder,
            fc_mean,
            fc_lnvar,
            log_scale,
            config: config.clone(),
            in_channels: 3,
        })
    }

    pub fn config(&self) -> &VaeConfig {
        &self.config
    }

    /// Feature dimensionality handed to the online linear-probe
    /// evaluator.
    pub fn encoder_out_dim(&self) -> usize {
        self.encoder.out_dim()
    }

    ///
    /// Evaluate latent parameters: mu and log_var
    /// z ~ (mu(x), log_var(x))
    pub fn latent_params(&self, x_nchw: &Tensor, train: bool) -> Result<(Tensor, Tensor)> {
        let min_lv = -8.; // stabilize
        let max_lv = 8.; // log variance

        let h_nf = self.encoder.forward_t(x_nchw, train)?;
        let mean_nk = self.fc_mean.forward_t(&h_nf, train)?;
        let lnvar_nk = self.fc_lnvar.forward_t(&h_nf, train)?.clamp(min_lv, max_lv)?;
        Ok((mean_nk, lnvar_nk))
    }

    ///
    /// Build the prior and posterior and draw one reparameterized
    /// latent sample; the single point where randomness enters the
    /// forward pass.
    ///
    /// * prior `p` - zero location, unit scale, same shape as `q`
    /// * posterior `q` - (mean, std) with std = exp(log_var / 2)
    pub fn sample(
        &self,
        mean_nk: &Tensor,
        lnvar_nk: &Tensor,
    ) -> Result<(LatentDistribution, LatentDistribution, Tensor)> {
        let std_nk = (lnvar_nk * 0.5)?.exp()?;
        let p = self.config.prior.build(
            &Tensor::zeros_like(mean_nk)?,
            &Tensor::ones_like(&std_nk)?,
        );
        let q = self.config.posterior.build(mean_nk, &std_nk);
        let z_nk = q.rsample()?;
        Ok((p, q, z_nk))
    }

    /// Decode a latent batch to reconstruction means.
    pub fn decode(&self, z_nk: &Tensor, train: bool) -> Result<Tensor> {
        self.decoder.forward_t(z_nk, train)
    }

    pub fn forward_t(&self, x_nchw: &Tensor, train: bool) -> Result<VaeForward> {
        let (mean_nk, lnvar_nk) = self.latent_params(x_nchw, train)?;
        let (prior, posterior, z_nk) = self.sample(&mean_nk, &lnvar_nk)?;
        let xhat_nchw = self.decoder.forward_t(&z_nk, train)?;
        Ok(VaeForward {
            z_nk,
            xhat_nchw,
            prior,
            posterior,
        })
    }

    fn select_batch<'a>(&self, batch: &'a TrainBatch) -> &'a ImageBatch {
        match batch {
            TrainBatch::Labeled(b) => b,
            TrainBatch::Mixed { unlabeled, labeled } => {
                if self.config.unlabeled_batch {
                    unlabeled
                } else {
                    labeled
                }
            }
        }
    }

    /// One training/validation step: the scalar loss to minimize
    /// (Monte-Carlo KL minus reconstruction log-likelihood, averaged
    /// over the batch) plus the named diagnostics for the logging
    /// sink. Training and validation differ only in how the caller
    /// aggregates the scalars.
    pub fn step(
        &self,
        batch: &TrainBatch,
        train: bool,
    ) -> Result<(Tensor, Vec<(&'static str, f32)>)> {
        let views = self.select_batch(batch);
        let x1 = &views.input_nchw;
        let x2 = &views.recon_nchw;

        let out = self.forward_t(x1, train)?;

        // cross-view reconstruction: encode x1, score the second
        // augmented view x2 under the decoded parameters
        let log_pxz_n = discretized_logistic_llik(&out.xhat_nchw, &self.log_scale, x2)?;

        let log_qz_n = out.posterior.log_prob(&out.z_nk)?.sum(D::Minus1)?;
        let log_pz_n = out.prior.log_prob(&out.z_nk)?.sum(D::Minus1)?;

        let kl_n = kl_divergence_mc(&out.prior, &out.posterior, self.config.num_kl_samples)?;

        let elbo = (&kl_n - &log_pxz_n)?.mean_all()?;
        let elbo_val = elbo.to_scalar::<f32>()?;

        let h = self.config.input_height as f64;
        let bpd = elbo_val / (h * h * self.in_channels as f64 * f64::consts::LN_2) as f32;

        let gini_val = gini_score(&out.z_nk)?.mean_all()?.to_scalar::<f32>()?;

        // importance-weighted marginal likelihood, batch elements
        // mixed together as particles (one scalar per batch)
        let n = x1.dim(0)?;
        let iw_n = ((&log_pxz_n + &log_pz_n)? - &log_qz_n)?;
        let marg_log_px =
            (iw_n.log_sum_exp(0)? - (n as f64).ln())?.to_scalar::<f32>()?;

        let logs = vec![
            ("kl", kl_n.mean_all()?.to_scalar::<f32>()?),
            ("elbo", elbo_val),
            ("gini", gini_val),
            ("bpd", bpd),
            ("log_pxz", log_pxz_n.mean_all()?.to_scalar::<f32>()?),
            ("marginal_log_px", marg_log_px),
        ];

        Ok((elbo, logs))
    }
}
