//! Classifier seam and backend selection.

use crate::config::{Backend, ModelConfig};
use crate::report::Classification;
use anyhow::Context;
use image::imageops::{self, FilterType};
use image::RgbImage;
use std::path::Path;
use std::sync::Arc;

/// An image classifier invoked as a black box.
///
/// Implementations return candidates ranked best-first. An empty ranking
/// means nothing was recognised and is not an error.
pub trait Classifier: Send + Sync {
    fn name(&self) -> &str;

    fn classify(&self, image: &RgbImage) -> anyhow::Result<Vec<Classification>>;
}

/// Recognises nothing. Lets the stream path run without model files.
#[derive(Debug, Clone)]
pub struct NullClassifier {
    name: String,
}

impl NullClassifier {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl Classifier for NullClassifier {
    fn name(&self) -> &str {
        &self.name
    }

    fn classify(&self, _image: &RgbImage) -> anyhow::Result<Vec<Classification>> {
        Ok(Vec::new())
    }
}

pub fn build_classifier(name: &str, cfg: &ModelConfig) -> anyhow::Result<Arc<dyn Classifier>> {
    match cfg.backend {
        Backend::Null => Ok(Arc::new(NullClassifier::new(name))),
        #[cfg(feature = "onnx")]
        Backend::Onnx => Ok(Arc::new(crate::onnx::OnnxClassifier::load(name, cfg)?)),
        #[cfg(not(feature = "onnx"))]
        Backend::Onnx => anyhow::bail!(
            "classifier {name} wants the onnx backend but this build lacks the `onnx` feature"
        ),
    }
}

/// One label per line. Blank lines are ignored.
pub fn read_labels(path: &Path) -> anyhow::Result<Vec<String>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read labels from {}", path.display()))?;
    Ok(text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(String::from)
        .collect())
}

pub fn softmax(scores: &[f32]) -> Vec<f32> {
    let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = scores.iter().map(|s| (s - max).exp()).collect();
    let sum: f32 = exps.iter().sum();
    if sum == 0.0 || !sum.is_finite() {
        return vec![0.0; scores.len()];
    }
    exps.into_iter().map(|e| e / sum).collect()
}

/// True when the scores already form a probability distribution.
pub fn is_distribution(scores: &[f32]) -> bool {
    !scores.is_empty()
        && scores.iter().all(|s| (0.0..=1.0).contains(s))
        && (scores.iter().sum::<f32>() - 1.0).abs() < 1e-3
}

/// Pairs scores with labels and keeps the `k` best. Missing labels fall back
/// to `class_<index>`.
pub fn rank(scores: &[f32], labels: &[String], k: usize) -> Vec<Classification> {
    let mut ranked: Vec<Classification> = scores
        .iter()
        .enumerate()
        .filter(|(_, s)| s.is_finite())
        .map(|(i, &s)| {
            let label = labels
                .get(i)
                .cloned()
                .unwrap_or_else(|| format!("class_{i}"));
            Classification::new(label, s)
        })
        .collect();
    ranked.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));
    ranked.truncate(k);
    ranked
}

/// Crops the largest centred square and scales it to `size`x`size`.
pub fn center_crop(image: &RgbImage, size: u32) -> RgbImage {
    let (w, h) = image.dimensions();
    let side = w.min(h);
    let cropped = imageops::crop_imm(image, (w - side) / 2, (h - side) / 2, side, side).to_image();
    imageops::resize(&cropped, size, size, FilterType::CatmullRom)
}
