use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use candle_vision::candle_core::{Device, Tensor};
use flate2::read::GzDecoder;
use rayon::prelude::*;

pub const CIFAR10_HEIGHT: usize = 32;
pub const STL10_HEIGHT: usize = 96;
pub const NUM_CHANNELS: usize = 3;

/// Fully-decoded dataset split: one `(3 x h x w)` tensor per image,
/// pixels rescaled from bytes into `[-0.5, 0.5]`.
pub struct LabeledImages {
    pub images: Vec<Tensor>,
    pub labels: Vec<u32>,
}

/// Resolve `name` inside `dir`, accepting a gzip-compressed `.gz`
/// sibling; dataset download/caching is out of scope, the files must
/// already be there.
fn resolve(dir: &Path, name: &str) -> anyhow::Result<PathBuf> {
    let plain = dir.join(name);
    if plain.is_file() {
        return Ok(plain);
    }
    let gz = dir.join(format!("{}.gz", name));
    if gz.is_file() {
        return Ok(gz);
    }
    anyhow::bail!(
        "missing dataset file: {} (also tried {}.gz)",
        plain.display(),
        name
    )
}

fn read_all_bytes(path: &Path) -> anyhow::Result<Vec<u8>> {
    let file = File::open(path)?;
    let mut bytes = vec![];
    if path.extension().is_some_and(|e| e == "gz") {
        GzDecoder::new(file).read_to_end(&mut bytes)?;
    } else {
        let mut file = file;
        file.read_to_end(&mut bytes)?;
    }
    Ok(bytes)
}

/// Decode one packed channel-major image record. CIFAR-10 stores
/// rows in row-major order; STL-10 stores them column-major, so the
/// spatial axes get transposed on the way in.
fn bytes_to_image(chunk: &[u8], height: usize, column_major: bool) -> anyhow::Result<Tensor> {
    debug_assert_eq!(chunk.len(), NUM_CHANNELS * height * height);

    let pixels: Vec<f32> = chunk.iter().map(|&b| b as f32 / 255.0 - 0.5).collect();
    let img = Tensor::from_vec(pixels, (NUM_CHANNELS, height, height), &Device::Cpu)?;
    if column_major {
        Ok(img.permute((0, 2, 1))?.contiguous()?)
    } else {
        Ok(img)
    }
}

fn decode_records(
    bytes: &[u8],
    record_len: usize,
    height: usize,
    column_major: bool,
) -> anyhow::Result<Vec<Tensor>> {
    if bytes.len() % record_len != 0 {
        anyhow::bail!(
            "truncated dataset file: {} bytes is not a multiple of the {}-byte record",
            bytes.len(),
            record_len
        );
    }
    bytes
        .par_chunks(record_len)
        .map(|rec| bytes_to_image(&rec[record_len - NUM_CHANNELS * height * height..], height, column_major))
        .collect()
}

///
/// CIFAR-10 binary batches: each record is one label byte followed by
/// 3072 channel-major pixel bytes.
///
pub fn read_cifar10(dir: &Path, files: &[&str]) -> anyhow::Result<LabeledImages> {
    const RECORD: usize = 1 + NUM_CHANNELS * CIFAR10_HEIGHT * CIFAR10_HEIGHT;

    let mut images = vec![];
    let mut labels = vec![];
    for name in files {
        let bytes = read_all_bytes(&resolve(dir, name)?)?;
        if bytes.len() % RECORD != 0 {
            anyhow::bail!("truncated CIFAR-10 batch: {}", name);
        }
        labels.extend(bytes.chunks(RECORD).map(|rec| rec[0] as u32));
        images.append(&mut decode_records(&bytes, RECORD, CIFAR10_HEIGHT, false)?);
    }
    Ok(LabeledImages { images, labels })
}

pub fn read_cifar10_train(dir: &Path) -> anyhow::Result<LabeledImages> {
    read_cifar10(
        dir,
        &[
            "data_batch_1.bin",
            "data_batch_2.bin",
            "data_batch_3.bin",
            "data_batch_4.bin",
            "data_batch_5.bin",
        ],
    )
}

pub fn read_cifar10_test(dir: &Path) -> anyhow::Result<LabeledImages> {
    read_cifar10(dir, &["test_batch.bin"])
}

///
/// STL-10 binaries: images are 27648-byte channel-major column-major
/// records in `*_X.bin`, labels (1..=10) live in a separate
/// `*_y.bin`.
///
pub fn read_stl10_labeled(
    dir: &Path,
    x_file: &str,
    y_file: &str,
) -> anyhow::Result<LabeledImages> {
    const RECORD: usize = NUM_CHANNELS * STL10_HEIGHT * STL10_HEIGHT;

    let x_bytes = read_all_bytes(&resolve(dir, x_file)?)?;
    let y_bytes = read_all_bytes(&resolve(dir, y_file)?)?;

    let images = decode_records(&x_bytes, RECORD, STL10_HEIGHT, true)?;
    if y_bytes.len() != images.len() {
        anyhow::bail!(
            "label count {} does not match image count {} in {}",
            y_bytes.len(),
            images.len(),
            x_file
        );
    }
    // labels on disk are 1-based
    let labels = y_bytes.iter().map(|&b| (b as u32).saturating_sub(1)).collect();
    Ok(LabeledImages { images, labels })
}

pub fn read_stl10_unlabeled(dir: &Path) -> anyhow::Result<Vec<Tensor>> {
    const RECORD: usize = NUM_CHANNELS * STL10_HEIGHT * STL10_HEIGHT;
    let bytes = read_all_bytes(&resolve(dir, "unlabeled_X.bin")?)?;
    decode_records(&bytes, RECORD, STL10_HEIGHT, true)
}
