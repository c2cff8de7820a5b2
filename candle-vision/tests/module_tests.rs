use candle_core::{DType, Device, Tensor};
use candle_nn::{VarBuilder, VarMap};
use candle_vision::candle_data_loader::{ImageDataLoader, InMemoryImages, TrainBatch};
use candle_vision::candle_inference::TrainConfig;
use candle_vision::candle_projection::{Projection, ProjectionKind};
use candle_vision::candle_vae_training::warmup_cosine_lr;

fn builder(varmap: &VarMap) -> VarBuilder {
    VarBuilder::from_varmap(varmap, DType::F32, &Device::Cpu)
}

#[test]
fn linear_projection_is_a_bias_free_affine_map() -> anyhow::Result<()> {
    let varmap = VarMap::new();
    let proj = Projection::new(ProjectionKind::Linear, 16, 2048, 8, builder(&varmap).pp("p"))?;

    assert!(proj.is_linear());
    assert_eq!(proj.input_dim(), 16);
    assert_eq!(proj.output_dim(), 8);

    let x = Tensor::rand(-1f32, 1f32, (4, 16), &Device::Cpu)?;
    assert_eq!(proj.forward_t(&x, true)?.dims(), &[4, 8]);

    // no bias, no nonlinearity: zero maps to zero and the map is
    // exactly homogeneous
    let zeros = Tensor::zeros((4, 16), DType::F32, &Device::Cpu)?;
    for v in proj.forward_t(&zeros, true)?.flatten_all()?.to_vec1::<f32>()? {
        assert_eq!(v, 0.0);
    }

    let y1 = proj.forward_t(&x, true)?;
    let y2 = proj.forward_t(&(&x * 2.0)?, true)?;
    let gap = (&y2 - (&y1 * 2.0)?)?
        .abs()?
        .max_all()?
        .to_scalar::<f32>()?;
    assert!(gap < 1e-5);
    Ok(())
}

#[test]
fn non_linear_projection_has_a_hidden_trunk() -> anyhow::Result<()> {
    let varmap = VarMap::new();
    let proj = Projection::new(
        ProjectionKind::NonLinear,
        16,
        32,
        8,
        builder(&varmap).pp("p"),
    )?;

    assert!(!proj.is_linear());
    let x = Tensor::rand(-1f32, 1f32, (4, 16), &Device::Cpu)?;
    assert_eq!(proj.forward_t(&x, true)?.dims(), &[4, 8]);
    Ok(())
}

#[test]
fn projection_names_parse() {
    assert!("linear".parse::<ProjectionKind>().is_ok());
    assert!("non_linear".parse::<ProjectionKind>().is_ok());
    assert!("quadratic".parse::<ProjectionKind>().is_err());
}

#[test]
fn loader_partitions_all_samples() -> anyhow::Result<()> {
    let n = 12;
    let views = |seed: f32| -> anyhow::Result<Vec<Tensor>> {
        (0..n)
            .map(|i| {
                Ok(Tensor::full(
                    seed + i as f32,
                    (3, 4, 4),
                    &Device::Cpu,
                )?)
            })
            .collect()
    };

    let mut loader = InMemoryImages::new(views(0.0)?, views(100.0)?, Some((0..n as u32).collect()))?;
    loader.shuffle_minibatch(4)?;

    assert_eq!(loader.num_minibatch(), 3);
    let mut seen = 0;
    for b in 0..loader.num_minibatch() {
        match loader.minibatch_data(b, &Device::Cpu)? {
            TrainBatch::Labeled(mb) => {
                assert_eq!(mb.input_nchw.dims(), &[4, 3, 4, 4]);
                assert_eq!(mb.recon_nchw.dims(), &[4, 3, 4, 4]);
                seen += mb.input_nchw.dim(0)?;
            }
            TrainBatch::Mixed { .. } => unreachable!("no unlabeled pool attached"),
        }
    }
    assert_eq!(seen, n);
    Ok(())
}

#[test]
fn loader_with_unlabeled_pool_yields_mixed_batches() -> anyhow::Result<()> {
    let mk = |n: usize| -> anyhow::Result<Vec<Tensor>> {
        (0..n)
            .map(|_| Ok(Tensor::zeros((3, 4, 4), DType::F32, &Device::Cpu)?))
            .collect()
    };

    let mut loader = InMemoryImages::new(mk(8)?, mk(8)?, Some(vec![0; 8]))?
        .with_unlabeled(mk(5)?, mk(5)?)?;
    loader.shuffle_minibatch(4)?;

    for b in 0..loader.num_minibatch() {
        match loader.minibatch_data(b, &Device::Cpu)? {
            TrainBatch::Mixed { unlabeled, labeled } => {
                assert_eq!(unlabeled.input_nchw.dims(), labeled.input_nchw.dims());
                assert!(unlabeled.labels.is_none());
                assert!(labeled.labels.is_some());
            }
            TrainBatch::Labeled(_) => unreachable!("pool attached"),
        }
    }
    Ok(())
}

#[test]
fn loader_rejects_a_zero_batch_size() -> anyhow::Result<()> {
    let views: Vec<Tensor> = vec![Tensor::zeros((3, 4, 4), DType::F32, &Device::Cpu)?];
    let mut loader = InMemoryImages::new(views.clone(), views, None)?;
    assert!(loader.shuffle_minibatch(0).is_err());
    Ok(())
}

#[test]
fn loader_requires_shuffling_first() -> anyhow::Result<()> {
    let views: Vec<Tensor> = vec![Tensor::zeros((3, 4, 4), DType::F32, &Device::Cpu)?];
    let loader = InMemoryImages::new(views.clone(), views, None)?;
    assert!(loader.minibatch_data(0, &Device::Cpu).is_err());
    Ok(())
}

#[test]
fn warmup_cosine_schedule_hits_its_anchors() {
    let cfg = TrainConfig {
        learning_rate: 1e-3,
        num_epochs: 100,
        warmup_epochs: 10,
        min_learning_rate: 1e-6,
        use_scheduler: true,
        ..Default::default()
    };

    assert_eq!(warmup_cosine_lr(0, &cfg), 0.0);
    assert!((warmup_cosine_lr(5, &cfg) - 0.5e-3).abs() < 1e-9);
    assert!((warmup_cosine_lr(10, &cfg) - 1e-3).abs() < 1e-9);
    assert!((warmup_cosine_lr(100, &cfg) - 1e-6).abs() < 1e-9);

    // monotone decay after warmup
    assert!(warmup_cosine_lr(20, &cfg) > warmup_cosine_lr(60, &cfg));
}
