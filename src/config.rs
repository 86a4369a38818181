use crate::gate::DEFAULT_CAPACITY;
use crate::report::DEFAULT_CONFIDENT_THRESHOLD;
use serde::{Deserialize, Serialize};
use std::{env, fs, path::PathBuf};
use tracing::{debug, error};

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Null,
    Onnx,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ModelConfig {
    pub backend: Backend,
    /// Local ONNX file, or the file name inside `repo` when not on disk.
    pub model: PathBuf,
    pub labels: PathBuf,
    pub repo: Option<String>,
    pub top_k: usize,
    pub input_size: u32,
}

impl ModelConfig {
    pub fn general() -> Self {
        Self {
            backend: Backend::Null,
            model: PathBuf::from("models/snacks.onnx"),
            labels: PathBuf::from("models/snacks.txt"),
            repo: None,
            top_k: 5,
            input_size: 224,
        }
    }

    pub fn healthy() -> Self {
        Self {
            model: PathBuf::from("models/healthy_snacks.onnx"),
            labels: PathBuf::from("models/healthy_snacks.txt"),
            ..Self::general()
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self::general()
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Camera frames allowed in dispatch at once.
    pub capacity: usize,
    pub fps: f32,
    pub confident_threshold: f32,
    pub general: ModelConfig,
    pub healthy: ModelConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            capacity: DEFAULT_CAPACITY,
            fps: 15.0,
            confident_threshold: DEFAULT_CONFIDENT_THRESHOLD,
            general: ModelConfig::general(),
            healthy: ModelConfig::healthy(),
        }
    }
}

pub fn config_path() -> PathBuf {
    env::var_os("SNACKGATE_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("snackgate.json"))
}

pub fn load_config() -> Config {
    let path = config_path();
    if let Ok(data) = fs::read(&path) {
        match serde_json::from_slice(&data) {
            Ok(cfg) => return cfg,
            Err(e) => error!("ignoring invalid config {}: {e}", path.display()),
        }
    } else {
        debug!(path = %path.display(), "no config file, using defaults");
    }
    Config::default()
}

pub fn save_config(cfg: &Config) {
    let path = config_path();
    if let Some(parent) = path.parent() {
        let _ = fs::create_dir_all(parent);
    }
    match serde_json::to_vec_pretty(cfg) {
        Ok(data) => {
            if let Err(e) = fs::write(&path, data) {
                error!("failed to write config: {e}");
            }
        }
        Err(e) => error!("failed to encode config: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::tempdir;

    #[test]
    #[serial]
    fn missing_file_gives_defaults() {
        let dir = tempdir().unwrap();
        env::set_var("SNACKGATE_CONFIG", dir.path().join("absent.json"));
        assert_eq!(load_config(), Config::default());
    }

    #[test]
    #[serial]
    fn partial_file_fills_in_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("cfg.json");
        fs::write(&path, r#"{"capacity": 4, "general": {"backend": "onnx"}}"#).unwrap();
        env::set_var("SNACKGATE_CONFIG", &path);
        let cfg = load_config();
        assert_eq!(cfg.capacity, 4);
        assert_eq!(cfg.general.backend, Backend::Onnx);
        assert_eq!(cfg.general.top_k, 5);
        assert_eq!(cfg.healthy, ModelConfig::healthy());
    }

    #[test]
    #[serial]
    fn save_then_load() {
        let dir = tempdir().unwrap();
        env::set_var("SNACKGATE_CONFIG", dir.path().join("nested/cfg.json"));
        let cfg = Config {
            fps: 2.5,
            ..Config::default()
        };
        save_config(&cfg);
        assert_eq!(load_config(), cfg);
    }
}
