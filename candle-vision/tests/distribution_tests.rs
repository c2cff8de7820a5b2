use candle_core::{Device, Tensor};
use candle_vision::candle_distribution::{kl_divergence_mc, DistributionKind, LatentDistribution};

fn latent_params(n: usize, k: usize) -> anyhow::Result<(Tensor, Tensor)> {
    let mean = Tensor::full(1.0_f32, (n, k), &Device::Cpu)?;
    let std = Tensor::full(0.5_f32, (n, k), &Device::Cpu)?;
    Ok((mean, std))
}

#[test]
fn kl_of_identical_distributions_vanishes() -> anyhow::Result<()> {
    let (mean, std) = latent_params(3, 16)?;

    for kind in [DistributionKind::Normal, DistributionKind::Laplace] {
        let p = kind.build(&mean, &std);
        let q = kind.build(&mean, &std);
        let kl = kl_divergence_mc(&p, &q, 64)?;
        for v in kl.to_vec1::<f32>()? {
            assert!(v.abs() < 1e-4, "kl(q,q) = {} for {:?}", v, kind);
        }
    }
    Ok(())
}

#[test]
fn kl_depends_on_the_family() -> anyhow::Result<()> {
    let (mean, std) = latent_params(2, 64)?;
    let zeros = mean.zeros_like()?;
    let ones = std.ones_like()?;

    let kl_for = |kind: DistributionKind| -> anyhow::Result<f32> {
        let p = kind.build(&zeros, &ones);
        let q = kind.build(&mean, &std);
        Ok(kl_divergence_mc(&p, &q, 1024)?
            .mean_all()?
            .to_scalar::<f32>()?)
    };

    let kl_normal = kl_for(DistributionKind::Normal)?;
    let kl_laplace = kl_for(DistributionKind::Laplace)?;

    assert!(kl_normal.is_finite() && kl_laplace.is_finite());
    // same (mean, log_var), different family, different divergence
    assert!(
        (kl_normal - kl_laplace).abs() > 1.0,
        "normal {} vs laplace {}",
        kl_normal,
        kl_laplace
    );
    Ok(())
}

#[test]
fn laplace_log_prob_matches_closed_form_at_the_location() -> anyhow::Result<()> {
    let loc = Tensor::full(0.3_f32, (1, 4), &Device::Cpu)?;
    let scale = Tensor::full(2.0_f32, (1, 4), &Device::Cpu)?;
    let q = DistributionKind::Laplace.build(&loc, &scale);

    // log p(loc) = -ln(2 b)
    let expected = -(2.0_f32 * 2.0).ln();
    for v in q.log_prob(&loc)?.flatten_all()?.to_vec1::<f32>()? {
        assert!((v - expected).abs() < 1e-5);
    }
    Ok(())
}

#[test]
fn rsample_is_centered_on_the_location() -> anyhow::Result<()> {
    let n = 4096;
    let loc = Tensor::full(1.5_f32, (n, 2), &Device::Cpu)?;
    let scale = Tensor::full(0.1_f32, (n, 2), &Device::Cpu)?;

    for kind in [DistributionKind::Normal, DistributionKind::Laplace] {
        let q = kind.build(&loc, &scale);
        let z = q.rsample()?;
        assert_eq!(z.dims(), &[n, 2]);
        let avg = z.mean_all()?.to_scalar::<f32>()?;
        assert!((avg - 1.5).abs() < 0.05, "{:?} sample mean {}", kind, avg);
    }
    Ok(())
}

#[test]
fn monte_carlo_axis_shapes() -> anyhow::Result<()> {
    let (mean, std) = latent_params(5, 7)?;
    let q = DistributionKind::Normal.build(&mean, &std);

    let z = q.rsample_n(3)?;
    assert_eq!(z.dims(), &[3, 5, 7]);
    assert_eq!(q.log_prob(&z)?.dims(), &[3, 5, 7]);
    Ok(())
}

#[test]
fn unknown_family_name_is_rejected() {
    assert!("normal".parse::<DistributionKind>().is_ok());
    assert!("laplace".parse::<DistributionKind>().is_ok());
    assert!("cauchy".parse::<DistributionKind>().is_err());
}

#[test]
fn prior_construction_shape_matches_posterior() -> anyhow::Result<()> {
    let (mean, std) = latent_params(2, 8)?;
    let p = DistributionKind::Normal.build(&mean.zeros_like()?, &std.ones_like()?);
    match &p {
        LatentDistribution::Normal { loc, scale } => {
            assert_eq!(loc.dims(), mean.dims());
            assert_eq!(scale.dims(), std.dims());
        }
        _ => unreachable!(),
    }
    Ok(())
}
