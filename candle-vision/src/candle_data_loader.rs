#![allow(dead_code)]

use candle_core::{Device, Tensor};
use rand::prelude::SliceRandom;

/// One minibatch of paired augmented views: `input_nchw` feeds the
/// encoder, `recon_nchw` is the reconstruction target, both
/// `(n x c x h x w)`.
pub struct ImageBatch {
    pub input_nchw: Tensor,
    pub recon_nchw: Tensor,
    pub labels: Option<Tensor>,
}

/// What a data loader yields per step. The mixed variant carries an
/// unlabeled batch alongside the labeled one (the STL-10
/// configuration); the orchestrator unwraps to whichever side it
/// trains on.
pub enum TrainBatch {
    Labeled(ImageBatch),
    Mixed {
        unlabeled: ImageBatch,
        labeled: ImageBatch,
    },
}

/// `ImageDataLoader` for minibatch learning over two-view image data
pub trait ImageDataLoader {
    fn minibatch_data(&self, batch_idx: usize, target_device: &Device)
        -> anyhow::Result<TrainBatch>;

    fn num_minibatch(&self) -> usize;

    fn shuffle_minibatch(&mut self, batch_size: usize) -> anyhow::Result<()>;
}

///
/// A simple data loader over fully-materialized per-sample view
/// tensors, each `(c x h x w)`. Minibatches are stacked once per
/// shuffle and moved to the target device on demand.
///
pub struct InMemoryImages {
    input_views: Vec<Tensor>,
    recon_views: Vec<Tensor>,
    labels: Option<Vec<u32>>,
    unlabeled_views: Option<(Vec<Tensor>, Vec<Tensor>)>,

    shuffled_labeled: Vec<ImageBatch>,
    shuffled_unlabeled: Option<Vec<ImageBatch>>,

    minibatches: Minibatches,
}

impl InMemoryImages {
    ///
    /// Create a data loader from two augmented views per sample and
    /// optional class labels.
    ///
    pub fn new(
        input_views: Vec<Tensor>,
        recon_views: Vec<Tensor>,
        labels: Option<Vec<u32>>,
    ) -> anyhow::Result<Self> {
        if input_views.len() != recon_views.len() {
            anyhow::bail!(
                "view counts disagree: {} vs. {}",
                input_views.len(),
                recon_views.len()
            );
        }
        if let Some(labels) = &labels {
            if labels.len() != input_views.len() {
                anyhow::bail!(
                    "label count {} does not match sample count {}",
                    labels.len(),
                    input_views.len()
                );
            }
        }
        let samples = (0..input_views.len()).collect();

        Ok(Self {
            input_views,
            recon_views,
            labels,
            unlabeled_views: None,
            shuffled_labeled: vec![],
            shuffled_unlabeled: None,
            minibatches: Minibatches {
                samples,
                chunks: vec![],
            },
        })
    }

    ///
    /// Attach an unlabeled two-view pool; the loader then yields
    /// `TrainBatch::Mixed`, cycling through the pool alongside the
    /// labeled samples.
    ///
    pub fn with_unlabeled(
        mut self,
        input_views: Vec<Tensor>,
        recon_views: Vec<Tensor>,
    ) -> anyhow::Result<Self> {
        if input_views.len() != recon_views.len() {
            anyhow::bail!(
                "unlabeled view counts disagree: {} vs. {}",
                input_views.len(),
                recon_views.len()
            );
        }
        if input_views.is_empty() {
            anyhow::bail!("empty unlabeled pool");
        }
        self.unlabeled_views = Some((input_views, recon_views));
        Ok(self)
    }

    pub fn num_samples(&self) -> usize {
        self.input_views.len()
    }

    fn stack_chunk(views: &[Tensor], chunk: &[usize]) -> anyhow::Result<Tensor> {
        let rows = chunk.iter().map(|&i| views[i].clone()).collect::<Vec<_>>();
        Ok(Tensor::stack(&rows, 0)?)
    }

    fn stack_labels(labels: &[u32], chunk: &[usize]) -> anyhow::Result<Tensor> {
        let y = chunk.iter().map(|&i| labels[i]).collect::<Vec<_>>();
        Ok(Tensor::from_vec(y, chunk.len(), &Device::Cpu)?)
    }
}

impl ImageDataLoader for InMemoryImages {
    fn minibatch_data(
        &self,
        batch_idx: usize,
        target_device: &Device,
    ) -> anyhow::Result<TrainBatch> {
        if self.shuffled_labeled.is_empty() {
            anyhow::bail!("need to shuffle data");
        }
        let labeled = self
            .shuffled_labeled
            .get(batch_idx)
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "invalid index = {} vs. total # = {}",
                    batch_idx,
                    self.num_minibatch()
                )
            })
            .and_then(|mb| to_device(mb, target_device))?;

        match &self.shuffled_unlabeled {
            Some(unlabeled_batches) => {
                let unlabeled = unlabeled_batches
                    .get(batch_idx)
                    .ok_or_else(|| anyhow::anyhow!("missing unlabeled minibatch {}", batch_idx))
                    .and_then(|mb| to_device(mb, target_device))?;
                Ok(TrainBatch::Mixed { unlabeled, labeled })
            }
            None => Ok(TrainBatch::Labeled(labeled)),
        }
    }

    fn num_minibatch(&self) -> usize {
        self.minibatches.chunks.len()
    }

    fn shuffle_minibatch(&mut self, batch_size: usize) -> anyhow::Result<()> {
        if batch_size == 0 {
            anyhow::bail!("batch size must be positive");
        }
        self.minibatches.shuffle_minibatch(batch_size);

        // preload all the shuffled minibatches (kept on the host)
        let mut labeled = Vec::with_capacity(self.num_minibatch());
        for chunk in &self.minibatches.chunks {
            labeled.push(ImageBatch {
                input_nchw: Self::stack_chunk(&self.input_views, chunk)?,
                recon_nchw: Self::stack_chunk(&self.recon_views, chunk)?,
                labels: self
                    .labels
                    .as_ref()
                    .map(|y| Self::stack_labels(y, chunk))
                    .transpose()?,
            });
        }
        self.shuffled_labeled = labeled;

        self.shuffled_unlabeled = match &self.unlabeled_views {
            Some((u_input, u_recon)) => {
                let mut pool: Vec<usize> = (0..u_input.len()).collect();
                pool.shuffle(&mut rand::rng());
                let mut batches = Vec::with_capacity(self.num_minibatch());
                for (b, chunk) in self.minibatches.chunks.iter().enumerate() {
                    let idx: Vec<usize> = (0..chunk.len())
                        .map(|i| pool[(b * batch_size + i) % pool.len()])
                        .collect();
                    batches.push(ImageBatch {
                        input_nchw: Self::stack_chunk(u_input, &idx)?,
                        recon_nchw: Self::stack_chunk(u_recon, &idx)?,
                        labels: None,
                    });
                }
                Some(batches)
            }
            None => None,
        };

        Ok(())
    }
}

fn to_device(mb: &ImageBatch, target_device: &Device) -> anyhow::Result<ImageBatch> {
    Ok(ImageBatch {
        input_nchw: mb.input_nchw.to_device(target_device)?,
        recon_nchw: mb.recon_nchw.to_device(target_device)?,
        labels: mb
            .labels
            .as_ref()
            .map(|y| y.to_device(target_device))
            .transpose()?,
    })
}

///
/// A helper `struct` for shuffling and creating minibatch indexes;
/// after `shuffle_minibatch` is called, `chunks` partition indexes.
///
pub struct Minibatches {
    samples: Vec<usize>,
    pub chunks: Vec<Vec<usize>>,
}

impl Minibatches {
    pub fn shuffle_minibatch(&mut self, batch_size: usize) {
        let mut rng = rand::rng();
        self.samples.shuffle(&mut rng);
        self.chunks = self
            .samples
            .chunks(batch_size)
            .map(|c| c.to_vec())
            .collect();
    }

    pub fn size(&self) -> usize {
        self.samples.len()
    }
}
