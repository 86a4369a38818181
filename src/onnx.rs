//! ONNX image classifier backed by candle.

use crate::classifier::{center_crop, is_distribution, rank, read_labels, softmax, Classifier};
use crate::config::ModelConfig;
use crate::report::Classification;
use anyhow::{anyhow, Context};
use candle_core::{DType, Device, Tensor};
use candle_onnx::{onnx, read_file, simple_eval};
use hf_hub::api::sync::Api;
use image::RgbImage;
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::debug;

pub struct OnnxClassifier {
    name: String,
    model: onnx::ModelProto,
    input_name: String,
    output_name: String,
    labels: Vec<String>,
    input_size: u32,
    top_k: usize,
    device: Device,
}

fn resolve_model(cfg: &ModelConfig) -> anyhow::Result<PathBuf> {
    if cfg.model.exists() {
        return Ok(cfg.model.clone());
    }
    let repo = cfg
        .repo
        .clone()
        .ok_or_else(|| anyhow!("model {} not found and no repo configured", cfg.model.display()))?;
    let filename = cfg.model.to_string_lossy().into_owned();
    debug!(%repo, %filename, "fetching model");
    Api::new()
        .and_then(|api| api.model(repo).get(&filename))
        .with_context(|| format!("failed to download {filename}"))
}

impl OnnxClassifier {
    pub fn load(name: &str, cfg: &ModelConfig) -> anyhow::Result<Self> {
        let path = resolve_model(cfg)?;
        let model = read_file(&path)
            .with_context(|| format!("failed to load model {}", path.display()))?;
        let graph = model
            .graph
            .as_ref()
            .ok_or_else(|| anyhow!("model graph missing"))?;
        let input_name = graph
            .input
            .first()
            .map(|i| i.name.clone())
            .ok_or_else(|| anyhow!("model has no inputs"))?;
        let output_name = graph
            .output
            .first()
            .map(|o| o.name.clone())
            .ok_or_else(|| anyhow!("model has no outputs"))?;
        let labels = read_labels(&cfg.labels)?;
        debug!(name, labels = labels.len(), model = %path.display(), "classifier loaded");
        Ok(Self {
            name: name.to_string(),
            model,
            input_name,
            output_name,
            labels,
            input_size: cfg.input_size,
            top_k: cfg.top_k,
            device: Device::Cpu,
        })
    }

    fn tensor(&self, image: &RgbImage) -> anyhow::Result<Tensor> {
        let size = self.input_size as usize;
        let data = center_crop(image, self.input_size).into_raw();
        let tensor = Tensor::from_vec(data, (size, size, 3), &self.device)?
            .permute((2, 0, 1))?
            .to_dtype(DType::F32)?
            .affine(1.0 / 255.0, 0.0)?
            .unsqueeze(0)?;
        Ok(tensor)
    }
}

impl Classifier for OnnxClassifier {
    fn name(&self) -> &str {
        &self.name
    }

    fn classify(&self, image: &RgbImage) -> anyhow::Result<Vec<Classification>> {
        let mut inputs = HashMap::new();
        inputs.insert(self.input_name.clone(), self.tensor(image)?);
        let mut outputs = simple_eval(&self.model, inputs).context("failed to run model")?;
        let output = outputs
            .remove(&self.output_name)
            .ok_or_else(|| anyhow!("model output missing"))?;
        let scores = output
            .flatten_all()?
            .to_dtype(DType::F32)?
            .to_vec1::<f32>()?;
        let scores = if is_distribution(&scores) {
            scores
        } else {
            softmax(&scores)
        };
        Ok(rank(&scores, &self.labels, self.top_k))
    }
}
