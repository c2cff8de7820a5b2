use candle_core::{Device, Tensor};
use candle_vision::candle_metrics::gini_score;

#[test]
fn gini_is_zero_for_constant_magnitudes() -> anyhow::Result<()> {
    let z = Tensor::full(0.7_f32, (3, 32), &Device::Cpu)?;
    for v in gini_score(&z)?.to_vec1::<f32>()? {
        assert!(v.abs() < 1e-5, "gini {} for a flat vector", v);
    }

    // sign does not matter, only magnitude
    let z = (Tensor::full(0.7_f32, (3, 32), &Device::Cpu)? * -1.0)?;
    for v in gini_score(&z)?.to_vec1::<f32>()? {
        assert!(v.abs() < 1e-5);
    }
    Ok(())
}

#[test]
fn gini_approaches_one_for_concentrated_mass() -> anyhow::Result<()> {
    let k = 256;
    let mut row = vec![0f32; k];
    row[17] = 5.0;
    let z = Tensor::from_vec(row, (1, k), &Device::Cpu)?;

    let g = gini_score(&z)?.to_vec1::<f32>()?[0];
    // exact value for a one-hot magnitude vector is (k - 1) / k
    assert!((g - (k as f32 - 1.0) / k as f32).abs() < 1e-4, "gini {}", g);
    Ok(())
}

#[test]
fn gini_is_scale_invariant() -> anyhow::Result<()> {
    let z = Tensor::rand(-1f32, 1f32, (4, 64), &Device::Cpu)?;
    let g1 = gini_score(&z)?.to_vec1::<f32>()?;
    let g2 = gini_score(&(&z * 37.5)?)?.to_vec1::<f32>()?;
    for (a, b) in g1.iter().zip(g2.iter()) {
        assert!((a - b).abs() < 1e-4, "{} vs {}", a, b);
    }
    Ok(())
}

#[test]
fn gini_carries_no_gradient() -> anyhow::Result<()> {
    use candle_core::Var;

    let var = Var::rand(-1f32, 1f32, (2, 8), &Device::Cpu)?;
    let g = gini_score(var.as_tensor())?.sum_all()?;
    let grads = g.backward()?;
    assert!(grads.get(var.as_tensor()).is_none());
    Ok(())
}
