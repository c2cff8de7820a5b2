pub mod candle_data_loader;
pub mod candle_distribution;
pub mod candle_inference;
pub mod candle_likelihood;
pub mod candle_metrics;
pub mod candle_model_traits;
pub mod candle_projection;
pub mod candle_resnet_decoder;
pub mod candle_resnet_encoder;
pub mod candle_vae_model;
pub mod candle_vae_training;

pub use candle_core;
pub use candle_nn;
