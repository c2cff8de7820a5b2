#![allow(dead_code)]

use crate::candle_model_traits::ImageEncoderModuleT;
use candle_core::{Result, Tensor};
use candle_nn::{BatchNorm, Conv2d, Conv2dConfig, Module, ModuleT, VarBuilder};

/// Supported encoder backbones, keyed by name at construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncoderKind {
    Resnet18,
    Resnet50,
}

impl std::str::FromStr for EncoderKind {
    type Err = anyhow::Error;

    fn from_str(name: &str) -> anyhow::Result<Self> {
        match name.to_lowercase().as_str() {
            "resnet18" => Ok(Self::Resnet18),
            "resnet50" => Ok(Self::Resnet50),
            _ => anyhow::bail!("unknown encoder backbone: {}", name),
        }
    }
}

pub(crate) fn bn_config() -> candle_nn::BatchNormConfig {
    candle_nn::BatchNormConfig {
        eps: 1e-4,
        remove_mean: true,
        affine: true,
        momentum: 0.1,
    }
}

pub(crate) fn conv3x3(
    c_in: usize,
    c_out: usize,
    stride: usize,
    vs: VarBuilder,
) -> Result<Conv2d> {
    let cfg = Conv2dConfig {
        padding: 1,
        stride,
        ..Default::default()
    };
    candle_nn::conv2d_no_bias(c_in, c_out, 3, cfg, vs)
}

pub(crate) fn conv1x1(
    c_in: usize,
    c_out: usize,
    stride: usize,
    vs: VarBuilder,
) -> Result<Conv2d> {
    let cfg = Conv2dConfig {
        stride,
        ..Default::default()
    };
    candle_nn::conv2d_no_bias(c_in, c_out, 1, cfg, vs)
}

/// conv3x3 -> bn -> relu -> conv3x3 -> bn, with an optional projection
/// shortcut where stride or width changes.
struct BasicBlock {
    conv1: Conv2d,
    bn1: BatchNorm,
    conv2: Conv2d,
    bn2: BatchNorm,
    shortcut: Option<(Conv2d, BatchNorm)>,
}

impl BasicBlock {
    fn new(c_in: usize, c_out: usize, stride: usize, vs: VarBuilder) -> Result<Self> {
        let shortcut = if stride != 1 || c_in != c_out {
            Some((
                conv1x1(c_in, c_out, stride, vs.pp("shortcut.conv"))?,
                candle_nn::batch_norm(c_out, bn_config(), vs.pp("shortcut.bn"))?,
            ))
        } else {
            None
        };
        Ok(Self {
            conv1: conv3x3(c_in, c_out, stride, vs.pp("conv1"))?,
            bn1: candle_nn::batch_norm(c_out, bn_config(), vs.pp("bn1"))?,
            conv2: conv3x3(c_out, c_out, 1, vs.pp("conv2"))?,
            bn2: candle_nn::batch_norm(c_out, bn_config(), vs.pp("bn2"))?,
            shortcut,
        })
    }

    fn forward_t(&self, x: &Tensor, train: bool) -> Result<Tensor> {
        let h = self.bn1.forward_t(&self.conv1.forward(x)?, train)?.relu()?;
        let h = self.bn2.forward_t(&self.conv2.forward(&h)?, train)?;
        let idt = match &self.shortcut {
            Some((conv, bn)) => bn.forward_t(&conv.forward(x)?, train)?,
            None => x.clone(),
        };
        (h + idt)?.relu()
    }
}

/// 1x1 squeeze -> 3x3 -> 1x1 expand (x4), the deeper-variant block.
struct BottleneckBlock {
    conv1: Conv2d,
    bn1: BatchNorm,
    conv2: Conv2d,
    bn2: BatchNorm,
    conv3: Conv2d,
    bn3: BatchNorm,
    shortcut: Option<(Conv2d, BatchNorm)>,
}

impl BottleneckBlock {
    const EXPANSION: usize = 4;

    fn new(c_in: usize, width: usize, stride: usize, vs: VarBuilder) -> Result<Self> {
        let c_out = width * Self::EXPANSION;
        let shortcut = if stride != 1 || c_in != c_out {
            Some((
                conv1x1(c_in, c_out, stride, vs.pp("shortcut.conv"))?,
                candle_nn::batch_norm(c_out, bn_config(), vs.pp("shortcut.bn"))?,
            ))
        } else {
            None
        };
        Ok(Self {
            conv1: conv1x1(c_in, width, 1, vs.pp("conv1"))?,
            bn1: candle_nn::batch_norm(width, bn_config(), vs.pp("bn1"))?,
            conv2: conv3x3(width, width, stride, vs.pp("conv2"))?,
            bn2: candle_nn::batch_norm(width, bn_config(), vs.pp("bn2"))?,
            conv3: conv1x1(width, c_out, 1, vs.pp("conv3"))?,
            bn3: candle_nn::batch_norm(c_out, bn_config(), vs.pp("bn3"))?,
            shortcut,
        })
    }

    fn forward_t(&self, x: &Tensor, train: bool) -> Result<Tensor> {
        let h = self.bn1.forward_t(&self.conv1.forward(x)?, train)?.relu()?;
        let h = self.bn2.forward_t(&self.conv2.forward(&h)?, train)?.relu()?;
        let h = self.bn3.forward_t(&self.conv3.forward(&h)?, train)?;
        let idt = match &self.shortcut {
            Some((conv, bn)) => bn.forward_t(&conv.forward(x)?, train)?,
            None => x.clone(),
        };
        (h + idt)?.relu()
    }
}

enum ResBlock {
    Basic(BasicBlock),
    Bottleneck(BottleneckBlock),
}

impl ResBlock {
    fn forward_t(&self, x: &Tensor, train: bool) -> Result<Tensor> {
        match self {
            Self::Basic(b) => b.forward_t(x, train),
            Self::Bottleneck(b) => b.forward_t(x, train),
        }
    }
}

/// ResNet image encoder: stem convolution, four residual stages, and
/// a global average pool down to `(n x out_dim)`.
///
/// `first_conv = false` replaces the 7x7/2 stem with a 3x3/1 one and
/// `maxpool1 = false` skips the stem pooling; both keep low-resolution
/// inputs (32x32) from collapsing before the residual stages.
pub struct ResNetEncoder {
    conv1: Conv2d,
    bn1: BatchNorm,
    use_maxpool: bool,
    stages: Vec<Vec<ResBlock>>,
    out_dim: usize,
}

const STAGE_WIDTHS: [usize; 4] = [64, 128, 256, 512];

impl ResNetEncoder {
    /// Variables are created under:
    ///
    /// * `enc.conv1`, `enc.bn1`
    /// * `enc.layer{i}.{j}.*` for stage i, block j
    pub fn new(
        kind: EncoderKind,
        first_conv: bool,
        maxpool1: bool,
        vs: VarBuilder,
    ) -> Result<Self> {
        let conv1 = if first_conv {
            let cfg = Conv2dConfig {
                padding: 3,
                stride: 2,
                ..Default::default()
            };
            candle_nn::conv2d_no_bias(3, 64, 7, cfg, vs.pp("enc.conv1"))?
        } else {
            conv3x3(3, 64, 1, vs.pp("enc.conv1"))?
        };
        let bn1 = candle_nn::batch_norm(64, bn_config(), vs.pp("enc.bn1"))?;

        let (counts, expansion) = match kind {
            EncoderKind::Resnet18 => ([2, 2, 2, 2], 1),
            EncoderKind::Resnet50 => ([3, 4, 6, 3], BottleneckBlock::EXPANSION),
        };

        let mut stages = Vec::with_capacity(4);
        let mut c_in = 64;
        for (i, (&width, &count)) in STAGE_WIDTHS.iter().zip(counts.iter()).enumerate() {
            let mut blocks = Vec::with_capacity(count);
            for j in 0..count {
                let stride = if i > 0 && j == 0 { 2 } else { 1 };
                let vs_block = vs.pp(format!("enc.layer{}.{}", i, j));
                let block = match kind {
                    EncoderKind::Resnet18 => {
                        ResBlock::Basic(BasicBlock::new(c_in, width, stride, vs_block)?)
                    }
                    EncoderKind::Resnet50 => {
                        ResBlock::Bottleneck(BottleneckBlock::new(c_in, width, stride, vs_block)?)
                    }
                };
                blocks.push(block);
                c_in = width * expansion;
            }
            stages.push(blocks);
        }

        Ok(Self {
            conv1,
            bn1,
            use_maxpool: maxpool1,
            stages,
            out_dim: STAGE_WIDTHS[3] * expansion,
        })
    }
}

impl ImageEncoderModuleT for ResNetEncoder {
    fn forward_t(&self, x_nchw: &Tensor, train: bool) -> Result<Tensor> {
        debug_assert_eq!(x_nchw.dims().len(), 4);

        let mut h = self
            .bn1
            .forward_t(&self.conv1.forward(x_nchw)?, train)?
            .relu()?;
        if self.use_maxpool {
            // candle pooling takes no padding; pad the borders first
            h = h
                .pad_with_zeros(2, 1, 1)?
                .pad_with_zeros(3, 1, 1)?
                .max_pool2d_with_stride(3, 2)?;
        }
        for stage in &self.stages {
            for block in stage {
                h = block.forward_t(&h, train)?;
            }
        }
        // global average pool over both spatial axes
        h.mean(3)?.mean(2)
    }

    fn out_dim(&self) -> usize {
        self.out_dim
    }
}
