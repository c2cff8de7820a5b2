#![allow(dead_code)]

use candle_core::{Result, Tensor};
use candle_nn::{BatchNorm, Linear, Module, ModuleT, VarBuilder};

/// Shape of the heads that map encoder features to latent-space
/// parameters. Fixed for the whole model at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectionKind {
    Linear,
    NonLinear,
}

impl std::str::FromStr for ProjectionKind {
    type Err = anyhow::Error;

    fn from_str(name: &str) -> anyhow::Result<Self> {
        match name.to_lowercase().as_str() {
            "linear" => Ok(Self::Linear),
            "non_linear" | "non-linear" | "nonlinear" => Ok(Self::NonLinear),
            _ => anyhow::bail!("unknown projection type: {}", name),
        }
    }
}

/// A feed-forward head from encoder features to one latent parameter
/// vector (mean or log-variance).
///
/// * `Linear` - a single bias-free affine map
/// * `NonLinear` - affine -> batchnorm -> relu -> bias-free affine
pub struct Projection {
    hidden: Option<(Linear, BatchNorm)>,
    output: Linear,
    input_dim: usize,
    output_dim: usize,
}

impl Projection {
    /// `hidden_dim` is only consulted for the non-linear variant.
    ///
    /// Variables are created under `{prefix}.hidden.*` and
    /// `{prefix}.out` of the given builder.
    pub fn new(
        kind: ProjectionKind,
        input_dim: usize,
        hidden_dim: usize,
        output_dim: usize,
        vs: VarBuilder,
    ) -> Result<Self> {
        let (hidden, out_in_dim) = match kind {
            ProjectionKind::Linear => (None, input_dim),
            ProjectionKind::NonLinear => {
                let fc = candle_nn::linear(input_dim, hidden_dim, vs.pp("hidden.fc"))?;
                let bn = candle_nn::batch_norm(
                    hidden_dim,
                    crate::candle_resnet_encoder::bn_config(),
                    vs.pp("hidden.bn"),
                )?;
                (Some((fc, bn)), hidden_dim)
            }
        };
        let output = candle_nn::linear_no_bias(out_in_dim, output_dim, vs.pp("out"))?;
        Ok(Self {
            hidden,
            output,
            input_dim,
            output_dim,
        })
    }

    pub fn forward_t(&self, h_nf: &Tensor, train: bool) -> Result<Tensor> {
        let h = match &self.hidden {
            Some((fc, bn)) => bn.forward_t(&fc.forward(h_nf)?, train)?.relu()?,
            None => h_nf.clone(),
        };
        self.output.forward(&h)
    }

    pub fn input_dim(&self) -> usize {
        self.input_dim
    }

    pub fn output_dim(&self) -> usize {
        self.output_dim
    }

    pub fn is_linear(&self) -> bool {
        self.hidden.is_none()
    }
}
