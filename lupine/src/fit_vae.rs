use crate::image_input::*;
use crate::transforms::*;

use candle_vision::candle_core;
use candle_vision::candle_data_loader::InMemoryImages;
use candle_vision::candle_distribution::DistributionKind;
use candle_vision::candle_inference::TrainConfig;
use candle_vision::candle_nn::{VarBuilder, VarMap};
use candle_vision::candle_projection::ProjectionKind;
use candle_vision::candle_resnet_decoder::DecoderKind;
use candle_vision::candle_resnet_encoder::EncoderKind;
use candle_vision::candle_vae_model::{ImageVae, VaeConfig};
use candle_vision::candle_vae_training::VaeTrainer;

use clap::{Args, ValueEnum};
use log::info;
use rand::rngs::ThreadRng;
use rayon::prelude::*;
use serde::Serialize;
use std::path::Path;

#[derive(ValueEnum, Clone, Debug, PartialEq)]
#[clap(rename_all = "lowercase")]
enum ComputeDevice {
    Cpu,
    Cuda,
    Metal,
}

#[derive(ValueEnum, Clone, Debug, PartialEq)]
#[clap(rename_all = "lowercase")]
enum DatasetChoice {
    Cifar10,
    Stl10,
}

#[derive(ValueEnum, Clone, Debug, PartialEq)]
#[clap(rename_all = "lowercase")]
enum ProjectionChoice {
    Linear,
    NonLinear,
}

impl From<&ProjectionChoice> for ProjectionKind {
    fn from(choice: &ProjectionChoice) -> Self {
        match choice {
            ProjectionChoice::Linear => ProjectionKind::Linear,
            ProjectionChoice::NonLinear => ProjectionKind::NonLinear,
        }
    }
}

#[derive(ValueEnum, Clone, Debug, PartialEq)]
#[clap(rename_all = "lowercase")]
enum FamilyChoice {
    Normal,
    Laplace,
}

impl From<&FamilyChoice> for DistributionKind {
    fn from(choice: &FamilyChoice) -> Self {
        match choice {
            FamilyChoice::Normal => DistributionKind::Normal,
            FamilyChoice::Laplace => DistributionKind::Laplace,
        }
    }
}

#[derive(ValueEnum, Clone, Debug, PartialEq)]
#[clap(rename_all = "lowercase")]
enum BackboneChoice {
    Resnet18,
    Resnet50,
}

#[derive(ValueEnum, Clone, Debug, PartialEq)]
#[clap(rename_all = "lowercase")]
enum TransformChoice {
    Original,
    Global,
    Local,
}

impl From<&TransformChoice> for TransformKind {
    fn from(choice: &TransformChoice) -> Self {
        match choice {
            TransformChoice::Original => TransformKind::Original,
            TransformChoice::Global => TransformKind::Global,
            TransformChoice::Local => TransformKind::Local,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct FitVaeArgs {
    #[arg(
        required = true,
        help = "Dataset directory",
        long_help = "Directory holding the binary dataset files.\n\
		     CIFAR-10: data_batch_{1..5}.bin and test_batch.bin\n\
		     STL-10: train_X.bin, train_y.bin, test_X.bin, test_y.bin,\n\
		     unlabeled_X.bin\n\
		     Gzip-compressed (.gz) siblings are also accepted."
    )]
    data_dir: Box<str>,

    #[arg(
        long,
        short,
        required = true,
        help = "Output header",
        long_help = "Output header for results:\n\
		     - {out}.safetensors (trained weights)\n\
		     - {out}.summary.json (run summary and elbo trace)"
    )]
    out: Box<str>,

    #[arg(long, value_enum, default_value = "cifar10", help = "Dataset")]
    dataset: DatasetChoice,

    #[arg(
        long,
        default_value_t = 8,
        help = "Number of data-loading threads",
        long_help = "Number of threads used to decode and augment images."
    )]
    num_workers: usize,

    #[arg(
        long,
        default_value_t = false,
        help = "Warmup-cosine learning-rate schedule",
        long_help = "Apply a linear warmup followed by cosine annealing\n\
		     to the learning rate across epochs."
    )]
    scheduler: bool,

    #[arg(long, default_value_t = 256, help = "Latent dimension")]
    latent_dim: usize,

    #[arg(
        long,
        value_enum,
        default_value = "linear",
        help = "Projection head on top of the encoder"
    )]
    projection: ProjectionChoice,

    #[arg(long, default_value_t = 1e-3, help = "Learning rate")]
    learning_rate: f32,

    #[arg(
        long,
        default_value_t = 0.1,
        help = "KL coefficient (recorded with the run)"
    )]
    kl_coeff: f64,

    #[arg(
        long,
        default_value_t = false,
        help = "Random horizontal flip in augmentation"
    )]
    flip: bool,

    #[arg(
        long,
        default_value_t = 0.0,
        help = "Brightness jitter strength",
        long_help = "Brightness jitter strength; 0 disables jitter.\n\
		     The brightness factor is drawn uniformly from\n\
		     [1 - 0.4 * s, 1 + 0.4 * s]."
    )]
    jitter_strength: f32,

    #[arg(long, value_enum, default_value = "normal", help = "Prior family")]
    prior: FamilyChoice,

    #[arg(long, value_enum, default_value = "normal", help = "Posterior family")]
    posterior: FamilyChoice,

    #[arg(
        long,
        default_value_t = false,
        help = "Use a strided 7x7 first convolution",
        long_help = "Use the full-size ResNet stem (7x7 stride-2 convolution)\n\
		     instead of the small-image 3x3 stride-1 variant."
    )]
    first_conv: bool,

    #[arg(
        long,
        default_value_t = false,
        help = "Max-pool after the first convolution"
    )]
    maxpool1: bool,

    #[arg(long, value_enum, default_value = "resnet18", help = "Encoder backbone")]
    encoder: BackboneChoice,

    #[arg(long, value_enum, default_value = "resnet18", help = "Decoder backbone")]
    decoder: BackboneChoice,

    #[arg(long, default_value_t = 256, help = "Minibatch size")]
    batch_size: usize,

    #[arg(
        long,
        value_enum,
        default_value = "original",
        help = "Augmentation for the encoder view"
    )]
    input_transform: TransformChoice,

    #[arg(
        long,
        value_enum,
        default_value = "original",
        help = "Augmentation for the reconstruction target view"
    )]
    recon_transform: TransformChoice,

    #[arg(long, default_value_t = 200, help = "Number of training epochs")]
    max_epochs: usize,

    #[arg(long, value_enum, default_value = "cpu", help = "Compute device")]
    device: ComputeDevice,

    #[arg(
        long,
        default_value_t = 1,
        help = "Number of accelerators (recorded with the run)",
        long_help = "Number of accelerators requested; recorded with the run.\n\
		     Training runs on ordinal 0 of the chosen device."
    )]
    gpus: usize,

    #[arg(long, short, help = "Verbosity")]
    verbose: bool,
}

#[derive(Serialize)]
struct RunSummary<'a> {
    dataset: &'a str,
    latent_dim: usize,
    kl_coeff: f64,
    encoder_out_dim: usize,
    gpus: usize,
    elbo_trace: Vec<f32>,
}

/// Two augmented views for every image in `images`, decoded in
/// parallel with one rng per worker.
fn build_views(
    images: &[candle_core::Tensor],
    transforms: &ViewTransforms,
) -> anyhow::Result<(Vec<candle_core::Tensor>, Vec<candle_core::Tensor>)> {
    let views: Vec<_> = images
        .par_iter()
        .map_init(rand::rng, |rng: &mut ThreadRng, img| {
            transforms.two_views(img, rng)
        })
        .collect::<anyhow::Result<_>>()?;
    Ok(views.into_iter().unzip())
}

pub fn run_fit_vae(args: FitVaeArgs) -> anyhow::Result<()> {
    env_logger::init();

    rayon::ThreadPoolBuilder::new()
        .num_threads(args.num_workers)
        .build_global()?;

    let dev = match args.device {
        ComputeDevice::Metal => candle_core::Device::new_metal(0)?,
        ComputeDevice::Cuda => candle_core::Device::new_cuda(0)?,
        _ => candle_core::Device::Cpu,
    };

    let data_dir = Path::new(args.data_dir.as_ref());

    let input_height = match args.dataset {
        DatasetChoice::Cifar10 => CIFAR10_HEIGHT,
        DatasetChoice::Stl10 => STL10_HEIGHT,
    };

    let train_transforms = ViewTransforms {
        size: input_height,
        input_transform: (&args.input_transform).into(),
        recon_transform: (&args.recon_transform).into(),
        flip: args.flip,
        jitter_strength: args.jitter_strength,
    };
    let valid_transforms = ViewTransforms::identity(input_height);

    info!("reading {:?} from {}", args.dataset, data_dir.display());

    let (mut train_data, mut valid_data) = match args.dataset {
        DatasetChoice::Cifar10 => {
            let train = read_cifar10_train(data_dir)?;
            let test = read_cifar10_test(data_dir)?;
            info!(
                "cifar-10: {} training and {} test images",
                train.images.len(),
                test.images.len()
            );

            let (train_in, train_rec) = build_views(&train.images, &train_transforms)?;
            let (test_in, test_rec) = build_views(&test.images, &valid_transforms)?;

            (
                InMemoryImages::new(train_in, train_rec, Some(train.labels))?,
                InMemoryImages::new(test_in, test_rec, Some(test.labels))?,
            )
        }
        DatasetChoice::Stl10 => {
            let train = read_stl10_labeled(data_dir, "train_X.bin", "train_y.bin")?;
            let test = read_stl10_labeled(data_dir, "test_X.bin", "test_y.bin")?;
            let unlabeled = read_stl10_unlabeled(data_dir)?;
            info!(
                "stl-10: {} labeled, {} unlabeled, {} test images",
                train.images.len(),
                unlabeled.len(),
                test.images.len()
            );

            let (train_in, train_rec) = build_views(&train.images, &train_transforms)?;
            let (unlab_in, unlab_rec) = build_views(&unlabeled, &train_transforms)?;
            let (test_in, test_rec) = build_views(&test.images, &valid_transforms)?;

            (
                InMemoryImages::new(train_in, train_rec, Some(train.labels))?
                    .with_unlabeled(unlab_in, unlab_rec)?,
                InMemoryImages::new(test_in, test_rec, Some(test.labels))?,
            )
        }
    };

    let model_config = VaeConfig {
        input_height,
        latent_dim: args.latent_dim,
        kl_coeff: args.kl_coeff,
        encoder: match args.encoder {
            BackboneChoice::Resnet18 => EncoderKind::Resnet18,
            BackboneChoice::Resnet50 => EncoderKind::Resnet50,
        },
        decoder: match args.decoder {
            BackboneChoice::Resnet18 => DecoderKind::Resnet18,
            BackboneChoice::Resnet50 => DecoderKind::Resnet50,
        },
        prior: (&args.prior).into(),
        posterior: (&args.posterior).into(),
        projection: (&args.projection).into(),
        first_conv: args.first_conv,
        maxpool1: args.maxpool1,
        unlabeled_batch: args.dataset == DatasetChoice::Stl10,
        ..Default::default()
    };

    let param = VarMap::new();
    let param_builder = VarBuilder::from_varmap(&param, candle_core::DType::F32, &dev);
    let model = ImageVae::new(&model_config, param_builder)?;

    info!(
        "built vae: {} latent dimensions over a {}-dimensional encoder output",
        args.latent_dim,
        model.encoder_out_dim()
    );

    let train_config = TrainConfig {
        learning_rate: args.learning_rate,
        batch_size: args.batch_size,
        num_epochs: args.max_epochs,
        use_scheduler: args.scheduler,
        device: dev,
        verbose: args.verbose,
        ..Default::default()
    };

    let mut trainer = VaeTrainer::build(&model, &param);
    let elbo_trace = trainer.train(&mut train_data, Some(&mut valid_data), &train_config)?;

    param.save(format!("{}.safetensors", args.out))?;

    let summary = RunSummary {
        dataset: match args.dataset {
            DatasetChoice::Cifar10 => "cifar10",
            DatasetChoice::Stl10 => "stl10",
        },
        latent_dim: args.latent_dim,
        kl_coeff: args.kl_coeff,
        encoder_out_dim: model.encoder_out_dim(),
        gpus: args.gpus,
        elbo_trace,
    };
    let summary_file = std::fs::File::create(format!("{}.summary.json", args.out))?;
    serde_json::to_writer_pretty(summary_file, &summary)?;

    info!("done");
    Ok(())
}
