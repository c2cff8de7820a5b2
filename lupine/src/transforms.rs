use candle_vision::candle_core::{Device, Tensor};
use rand::Rng;

/// Geometric variants of the augmentation pipeline.
///
/// * `Original` - keep the full frame
/// * `Global` - random crop of at least half the frame, resized back
/// * `Local` - half-size crop, resized up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransformKind {
    Original,
    Global,
    Local,
}

/// Produces the two independently-augmented views of each image: one
/// feeds the encoder, the other is the reconstruction target.
pub struct ViewTransforms {
    pub size: usize,
    pub input_transform: TransformKind,
    pub recon_transform: TransformKind,
    pub flip: bool,
    pub jitter_strength: f32,
}

impl ViewTransforms {
    /// The validation/test pipeline: untouched frames, no flip, no
    /// jitter.
    pub fn identity(size: usize) -> Self {
        Self {
            size,
            input_transform: TransformKind::Original,
            recon_transform: TransformKind::Original,
            flip: false,
            jitter_strength: 0.0,
        }
    }

    pub fn two_views<R: Rng>(
        &self,
        img_chw: &Tensor,
        rng: &mut R,
    ) -> anyhow::Result<(Tensor, Tensor)> {
        let input = self.augment(self.input_transform, img_chw, rng)?;
        let recon = self.augment(self.recon_transform, img_chw, rng)?;
        Ok((input, recon))
    }

    fn augment<R: Rng>(
        &self,
        kind: TransformKind,
        img_chw: &Tensor,
        rng: &mut R,
    ) -> anyhow::Result<Tensor> {
        let mut img = match kind {
            TransformKind::Original => img_chw.clone(),
            TransformKind::Global => {
                let crop = rng.random_range(self.size / 2..=self.size);
                random_crop_resize(img_chw, crop, self.size, rng)?
            }
            TransformKind::Local => {
                random_crop_resize(img_chw, self.size / 2, self.size, rng)?
            }
        };
        if self.flip && rng.random::<f32>() < 0.5 {
            img = horizontal_flip(&img)?;
        }
        if self.jitter_strength > 0.0 {
            let span = 0.4 * self.jitter_strength;
            let factor = 1.0 + rng.random_range(-span..span);
            img = brightness_jitter(&img, factor)?;
        }
        Ok(img)
    }
}

/// Random square crop of `crop` pixels resized (nearest) back to
/// `out` pixels.
fn random_crop_resize<R: Rng>(
    img_chw: &Tensor,
    crop: usize,
    out: usize,
    rng: &mut R,
) -> anyhow::Result<Tensor> {
    let (_, h, w) = img_chw.dims3()?;
    if crop == 0 || crop > h || crop > w {
        anyhow::bail!("crop size {} out of range for a {}x{} frame", crop, h, w);
    }
    let top = rng.random_range(0..=h - crop);
    let left = rng.random_range(0..=w - crop);
    let cropped = img_chw.narrow(1, top, crop)?.narrow(2, left, crop)?;
    if crop == out {
        return Ok(cropped);
    }
    Ok(cropped
        .unsqueeze(0)?
        .upsample_nearest2d(out, out)?
        .squeeze(0)?)
}

/// Mirror the width axis (candle has no flip op; reversed gather).
fn horizontal_flip(img_chw: &Tensor) -> anyhow::Result<Tensor> {
    let w = img_chw.dim(2)?;
    let reversed: Vec<u32> = (0..w as u32).rev().collect();
    let idx = Tensor::from_vec(reversed, w, &Device::Cpu)?;
    Ok(img_chw.index_select(&idx, 2)?)
}

/// Brightness jitter in pixel space: rescale around the channel
/// black-point, then clamp back into the valid range.
fn brightness_jitter(img_chw: &Tensor, factor: f32) -> anyhow::Result<Tensor> {
    let brightened = (((img_chw + 0.5)? * factor as f64)? - 0.5)?;
    Ok(brightened.clamp(-0.5, 0.5)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame() -> anyhow::Result<Tensor> {
        Tensor::rand(-0.5f32, 0.5, (3, 32, 32), &Device::Cpu).map_err(Into::into)
    }

    #[test]
    fn two_views_keep_the_frame_shape() -> anyhow::Result<()> {
        let tf = ViewTransforms {
            size: 32,
            input_transform: TransformKind::Global,
            recon_transform: TransformKind::Local,
            flip: true,
            jitter_strength: 1.0,
        };
        let mut rng = rand::rng();
        let (a, b) = tf.two_views(&frame()?, &mut rng)?;
        assert_eq!(a.dims(), &[3, 32, 32]);
        assert_eq!(b.dims(), &[3, 32, 32]);
        Ok(())
    }

    #[test]
    fn identity_pipeline_is_a_no_op() -> anyhow::Result<()> {
        let tf = ViewTransforms::identity(32);
        let img = frame()?;
        let mut rng = rand::rng();
        let (a, b) = tf.two_views(&img, &mut rng)?;
        for view in [a, b] {
            let gap = (&view - &img)?.abs()?.max_all()?.to_scalar::<f32>()?;
            assert_eq!(gap, 0.0);
        }
        Ok(())
    }

    #[test]
    fn flipping_twice_restores_the_frame() -> anyhow::Result<()> {
        let img = frame()?;
        let twice = horizontal_flip(&horizontal_flip(&img)?)?;
        let gap = (&twice - &img)?.abs()?.max_all()?.to_scalar::<f32>()?;
        assert_eq!(gap, 0.0);
        Ok(())
    }

    #[test]
    fn jitter_respects_the_pixel_range() -> anyhow::Result<()> {
        let img = frame()?;
        let jittered = brightness_jitter(&img, 1.9)?;
        assert!(jittered.max_all()?.to_scalar::<f32>()? <= 0.5);
        assert!(jittered.min_all()?.to_scalar::<f32>()? >= -0.5);
        Ok(())
    }
}
