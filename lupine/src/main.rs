mod fit_vae;
mod image_input;
mod transforms;

use crate::fit_vae::*;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    version,
    about = "LUPINE",
    long_about = "Latent Unsupervised Pixel Inference via Neural Estimation\n\
		  Train convolutional variational autoencoders on natural-image\n\
		  datasets (CIFAR-10, STL-10) with ResNet encoder/decoder pairs."
)]
struct Cli {
    #[command(subcommand)]
    commands: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Fit a ResNet VAE on a local copy of CIFAR-10 or STL-10
    Fit(FitVaeArgs),
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match &cli.commands {
        Commands::Fit(args) => {
            run_fit_vae(args.clone())?;
        }
    }

    Ok(())
}
