#![allow(dead_code)]

use crate::candle_model_traits::ImageDecoderModuleT;
use crate::candle_resnet_encoder::{bn_config, conv1x1, conv3x3};
use candle_core::{Result, Tensor};
use candle_nn::{BatchNorm, Conv2d, Conv2dConfig, Linear, Module, ModuleT, VarBuilder};

/// Supported decoder backbones, keyed by name at construction.
/// Selected independently of the encoder; only the latent dimension
/// ties the two together.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderKind {
    Resnet18,
    Resnet50,
}

impl std::str::FromStr for DecoderKind {
    type Err = anyhow::Error;

    fn from_str(name: &str) -> anyhow::Result<Self> {
        match name.to_lowercase().as_str() {
            "resnet18" => Ok(Self::Resnet18),
            "resnet50" => Ok(Self::Resnet50),
            _ => anyhow::bail!("unknown decoder backbone: {}", name),
        }
    }
}

/// Residual upsampling block: x2 nearest interpolation followed by a
/// conv-bn pair, with a projected shortcut off the interpolated input.
struct UpBlock {
    conv1: Conv2d,
    bn1: BatchNorm,
    conv2: Conv2d,
    bn2: BatchNorm,
    shortcut: (Conv2d, BatchNorm),
}

impl UpBlock {
    fn new(c_in: usize, c_out: usize, vs: VarBuilder) -> Result<Self> {
        Ok(Self {
            conv1: conv3x3(c_in, c_out, 1, vs.pp("conv1"))?,
            bn1: candle_nn::batch_norm(c_out, bn_config(), vs.pp("bn1"))?,
            conv2: conv3x3(c_out, c_out, 1, vs.pp("conv2"))?,
            bn2: candle_nn::batch_norm(c_out, bn_config(), vs.pp("bn2"))?,
            shortcut: (
                conv1x1(c_in, c_out, 1, vs.pp("shortcut.conv"))?,
                candle_nn::batch_norm(c_out, bn_config(), vs.pp("shortcut.bn"))?,
            ),
        })
    }

    fn forward_t(&self, x: &Tensor, train: bool) -> Result<Tensor> {
        let (h, w) = (x.dim(2)?, x.dim(3)?);
        let x = x.upsample_nearest2d(h * 2, w * 2)?;
        let out = self.bn1.forward_t(&self.conv1.forward(&x)?, train)?.relu()?;
        let out = self.bn2.forward_t(&self.conv2.forward(&out)?, train)?;
        let (sc_conv, sc_bn) = &self.shortcut;
        let idt = sc_bn.forward_t(&sc_conv.forward(&x)?, train)?;
        (out + idt)?.relu()
    }
}

/// ResNet-style image decoder: an affine map from the latent vector to
/// a small feature map, three residual x2 upsampling stages, extra
/// tail upsamples mirroring the encoder's structural flags, and a
/// terminal 3x3 convolution down to 3 channels.
pub struct ResNetDecoder {
    linear: Linear,
    blocks: Vec<UpBlock>,
    tail_upsamples: usize,
    conv_out: Conv2d,
    c0: usize,
    h0: usize,
    latent_dim: usize,
    output_height: usize,
}

impl ResNetDecoder {
    /// Fails at construction when `output_height` is not divisible by
    /// the total upsampling factor (a configuration error, surfaced
    /// before any training step runs).
    ///
    /// Variables are created under:
    ///
    /// * `dec.linear`
    /// * `dec.up{i}.*` for upsampling stage i
    /// * `dec.conv_out`
    pub fn new(
        kind: DecoderKind,
        latent_dim: usize,
        output_height: usize,
        first_conv: bool,
        maxpool1: bool,
        vs: VarBuilder,
    ) -> Result<Self> {
        let tail_upsamples = usize::from(first_conv) + usize::from(maxpool1);
        let total_factor = 8 << tail_upsamples;
        if output_height % total_factor != 0 || output_height / total_factor == 0 {
            candle_core::bail!(
                "output height {} is not a multiple of the upsampling factor {}",
                output_height,
                total_factor
            );
        }
        let h0 = output_height / total_factor;

        let (c0, widths) = match kind {
            DecoderKind::Resnet18 => (512, [256, 128, 64]),
            DecoderKind::Resnet50 => (2048, [1024, 512, 256]),
        };

        let linear = candle_nn::linear(latent_dim, c0 * h0 * h0, vs.pp("dec.linear"))?;

        let mut blocks = Vec::with_capacity(widths.len());
        let mut c_in = c0;
        for (i, &width) in widths.iter().enumerate() {
            blocks.push(UpBlock::new(c_in, width, vs.pp(format!("dec.up{}", i)))?);
            c_in = width;
        }

        let cfg = Conv2dConfig {
            padding: 1,
            ..Default::default()
        };
        let conv_out = candle_nn::conv2d(c_in, 3, 3, cfg, vs.pp("dec.conv_out"))?;

        Ok(Self {
            linear,
            blocks,
            tail_upsamples,
            conv_out,
            c0,
            h0,
            latent_dim,
            output_height,
        })
    }

    pub fn output_height(&self) -> usize {
        self.output_height
    }
}

impl ImageDecoderModuleT for ResNetDecoder {
    fn forward_t(&self, z_nk: &Tensor, train: bool) -> Result<Tensor> {
        debug_assert_eq!(z_nk.dims().len(), 2);

        let n = z_nk.dim(0)?;
        let mut h = self
            .linear
            .forward(z_nk)?
            .reshape((n, self.c0, self.h0, self.h0))?;
        for block in &self.blocks {
            h = block.forward_t(&h, train)?;
        }
        for _ in 0..self.tail_upsamples {
            let (hh, ww) = (h.dim(2)?, h.dim(3)?);
            h = h.upsample_nearest2d(hh * 2, ww * 2)?;
        }
        self.conv_out.forward(&h)
    }

    fn dim_latent(&self) -> usize {
        self.latent_dim
    }
}
