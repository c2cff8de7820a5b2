#![allow(dead_code)]

use core::f64;
use std::collections::BTreeMap;

use crate::candle_data_loader::ImageDataLoader;
use crate::candle_inference::TrainConfig;
use crate::candle_vae_model::ImageVae;

use candle_nn::{AdamW, Optimizer};
use indicatif::{ProgressBar, ProgressDrawTarget};
use log::info;

/// Couples the model with the variable map holding its parameters;
/// the optimizer mutates parameters only between steps, never inside
/// the forward/metric computation.
pub struct VaeTrainer<'a> {
    pub model: &'a ImageVae,
    pub variable_map: &'a candle_nn::VarMap,
}

/// Per-epoch averages of the step metrics, keyed by metric name.
pub type EpochMetrics = BTreeMap<&'static str, f32>;

impl<'a> VaeTrainer<'a> {
    pub fn build(model: &'a ImageVae, variable_map: &'a candle_nn::VarMap) -> Self {
        Self {
            model,
            variable_map,
        }
    }

    /// Train the VAE model
    ///
    /// * `data` - training data loader
    /// * `valid_data` - optional validation loader, evaluated once per
    ///   epoch with batchnorm frozen
    /// * `train_config` - training configuration
    ///
    /// Returns the per-epoch elbo trace (training set).
    pub fn train<DataL>(
        &mut self,
        data: &mut DataL,
        valid_data: Option<&mut DataL>,
        train_config: &TrainConfig,
    ) -> anyhow::Result<Vec<f32>>
    where
        DataL: ImageDataLoader,
    {
        let device = &train_config.device;
        let mut adam = AdamW::new_lr(
            self.variable_map.all_vars(),
            train_config.learning_rate.into(),
        )?;

        let pb = ProgressBar::new(train_config.num_epochs as u64);

        if !train_config.show_progress || train_config.verbose {
            pb.set_draw_target(ProgressDrawTarget::hidden());
        }

        let mut elbo_trace = vec![];

        data.shuffle_minibatch(train_config.batch_size)?;

        let num_minibatches = data.num_minibatch();
        if num_minibatches == 0 {
            anyhow::bail!("no minibatches to train on");
        }

        let minibatch_vec = (0..num_minibatches)
            .map(|b| {
                data.minibatch_data(b, device)
                    .unwrap_or_else(|_| panic!("failed to preload minibatch #{}", b))
            })
            .collect::<Vec<_>>();

        let valid_batches = match valid_data {
            Some(valid) => {
                valid.shuffle_minibatch(train_config.batch_size)?;
                (0..valid.num_minibatch())
                    .map(|b| valid.minibatch_data(b, device))
                    .collect::<anyhow::Result<Vec<_>>>()?
            }
            None => vec![],
        };

        for epoch in 0..train_config.num_epochs {
            if train_config.use_scheduler {
                adam.set_learning_rate(warmup_cosine_lr(epoch, train_config));
            }

            let mut epoch_sums = EpochMetrics::new();

            for minibatch in minibatch_vec.iter() {
                let (loss, logs) = self.model.step(minibatch, true)?;
                adam.backward_step(&loss)?;
                for (name, value) in logs {
                    *epoch_sums.entry(name).or_insert(0_f32) += value;
                }
            }

            let denom = num_minibatches as f32;
            for value in epoch_sums.values_mut() {
                *value /= denom;
            }
            elbo_trace.push(epoch_sums.get("elbo").copied().unwrap_or(f32::NAN));

            pb.inc(1);
            if train_config.verbose {
                info!("[{}] train {}", epoch + 1, format_metrics(&epoch_sums));
            }

            if !valid_batches.is_empty() {
                let mut val_sums = EpochMetrics::new();
                for minibatch in valid_batches.iter() {
                    let (_, logs) = self.model.step(minibatch, false)?;
                    for (name, value) in logs {
                        *val_sums.entry(name).or_insert(0_f32) += value;
                    }
                }
                let denom = valid_batches.len() as f32;
                for value in val_sums.values_mut() {
                    *value /= denom;
                }
                if train_config.verbose {
                    info!("[{}] valid {}", epoch + 1, format_metrics(&val_sums));
                }
            }
        } // each epoch

        pb.finish_and_clear();
        Ok(elbo_trace)
    }
}

fn format_metrics(metrics: &EpochMetrics) -> String {
    metrics
        .iter()
        .map(|(k, v)| format!("{}: {:.4}", k, v))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Linear warmup from zero over `warmup_epochs`, then cosine decay
/// from the base learning rate down to `min_learning_rate` at the
/// final epoch.
pub fn warmup_cosine_lr(epoch: usize, cfg: &TrainConfig) -> f64 {
    let base = cfg.learning_rate as f64;
    let floor = cfg.min_learning_rate as f64;
    let warmup = cfg.warmup_epochs;

    if warmup > 0 && epoch < warmup {
        return base * epoch as f64 / warmup as f64;
    }
    let span = cfg.num_epochs.saturating_sub(warmup).max(1);
    let t = (epoch - warmup).min(span) as f64 / span as f64;
    floor + 0.5 * (base - floor) * (1.0 + (f64::consts::PI * t).cos())
}
