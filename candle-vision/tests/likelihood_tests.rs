use candle_core::{Device, Tensor};
use candle_vision::candle_likelihood::{discretized_logistic_llik, gaussian_llik};

fn log_scale() -> anyhow::Result<Tensor> {
    Ok(Tensor::zeros(1, candle_core::DType::F32, &Device::Cpu)?)
}

#[test]
fn discretized_logistic_reduces_to_one_value_per_sample() -> anyhow::Result<()> {
    let mean = Tensor::zeros((4, 3, 8, 8), candle_core::DType::F32, &Device::Cpu)?;
    let x = (Tensor::rand(0f32, 1f32, (4, 3, 8, 8), &Device::Cpu)? - 0.5)?;

    let llik = discretized_logistic_llik(&mean, &log_scale()?, &x)?;
    assert_eq!(llik.dims(), &[4]);
    for v in llik.to_vec1::<f32>()? {
        assert!(v.is_finite());
    }
    Ok(())
}

#[test]
fn discretized_logistic_survives_boundary_pixels() -> anyhow::Result<()> {
    // extreme targets and means outside the safe interior; the clamp
    // and the additive epsilon must keep every term finite
    let lo = Tensor::full(-0.5_f32, (2, 3, 4, 4), &Device::Cpu)?;
    let hi = Tensor::full(0.5_f32, (2, 3, 4, 4), &Device::Cpu)?;
    let wild_mean = Tensor::full(3.0_f32, (2, 3, 4, 4), &Device::Cpu)?;

    for x in [&lo, &hi] {
        for mean in [&lo, &hi, &wild_mean] {
            let llik = discretized_logistic_llik(mean, &log_scale()?, x)?;
            for v in llik.to_vec1::<f32>()? {
                assert!(v.is_finite(), "non-finite log-likelihood at boundary");
            }
        }
    }
    Ok(())
}

#[test]
fn discretized_logistic_prefers_matching_means() -> anyhow::Result<()> {
    let x = Tensor::full(0.25_f32, (1, 3, 4, 4), &Device::Cpu)?;
    let good = Tensor::full(0.25_f32, (1, 3, 4, 4), &Device::Cpu)?;
    let bad = Tensor::full(-0.4_f32, (1, 3, 4, 4), &Device::Cpu)?;

    let llik_good = discretized_logistic_llik(&good, &log_scale()?, &x)?.to_vec1::<f32>()?[0];
    let llik_bad = discretized_logistic_llik(&bad, &log_scale()?, &x)?.to_vec1::<f32>()?[0];
    assert!(llik_good > llik_bad);
    Ok(())
}

#[test]
fn gaussian_llik_matches_the_normal_density() -> anyhow::Result<()> {
    // x == mean, unit scale: each pixel contributes -ln(2 pi)/2
    let mean = Tensor::zeros((2, 3, 4, 4), candle_core::DType::F32, &Device::Cpu)?;
    let x = mean.clone();

    let llik = gaussian_llik(&mean, &log_scale()?, &x)?;
    assert_eq!(llik.dims(), &[2]);

    let expected = (-(3.0 * 4.0 * 4.0) * 0.5 * (2.0 * std::f64::consts::PI).ln()) as f32;
    for v in llik.to_vec1::<f32>()? {
        assert!((v - expected).abs() < 1e-3, "{} vs {}", v, expected);
    }
    Ok(())
}

#[test]
fn log_scale_widens_the_gaussian() -> anyhow::Result<()> {
    let mean = Tensor::zeros((1, 3, 4, 4), candle_core::DType::F32, &Device::Cpu)?;
    let x = Tensor::full(0.3_f32, (1, 3, 4, 4), &Device::Cpu)?;

    let narrow_scale = Tensor::full(-4.6_f32, 1, &Device::Cpu)?;
    let narrow = gaussian_llik(&mean, &narrow_scale, &x)?.to_vec1::<f32>()?[0];
    let wide = gaussian_llik(&mean, &log_scale()?, &x)?.to_vec1::<f32>()?[0];

    // |x - mean| dwarfs the narrow scale, so the wider one wins
    assert!(wide > narrow);
    Ok(())
}
