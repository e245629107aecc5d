use anyhow::{Context, Result};
use facepair_core::{LabelTable, NetworkSpec, WeightStore};
use serde::Deserialize;
use std::path::{Path, PathBuf};

const DEFAULT_MODEL_NAME: &str = "50x50-4l";
const DEFAULT_SUBJECTS_DIR: &str = "subjects_photos";
const DEFAULT_LABELS: [&str; 6] = ["MML", "mml", "mml", "sol", "sol", "sol"];

/// CLI configuration: defaults, then an optional TOML file, then
/// `FACEPAIR_*` environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory holding the `.npy` parameter files.
    pub model_dir: PathBuf,
    /// Model name suffix in the parameter file names.
    pub model_name: String,
    /// Directory of reference subject photos.
    pub subjects_dir: PathBuf,
    /// Seed for random initialization of layers that could not be loaded.
    pub seed: u64,
    pub labels: LabelTable,
    pub network: NetworkSpec,
}

/// Optional settings file pointed to by `FACEPAIR_CONFIG`.
#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ConfigFile {
    model_dir: Option<PathBuf>,
    model_name: Option<String>,
    subjects_dir: Option<PathBuf>,
    seed: Option<u64>,
    labels: Option<LabelTable>,
    network: Option<NetworkSpec>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model_dir: facepair_core::default_model_dir(),
            model_name: DEFAULT_MODEL_NAME.to_string(),
            subjects_dir: PathBuf::from(DEFAULT_SUBJECTS_DIR),
            seed: 0,
            labels: DEFAULT_LABELS.into_iter().collect(),
            network: NetworkSpec::default(),
        }
    }
}

impl Config {
    /// Load configuration from `FACEPAIR_CONFIG` (if set) and `FACEPAIR_*` variables.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(path) = std::env::var("FACEPAIR_CONFIG") {
            config.apply_file(Path::new(&path))?;
        }

        if let Ok(dir) = std::env::var("FACEPAIR_MODEL_DIR") {
            config.model_dir = PathBuf::from(dir);
        }
        if let Ok(name) = std::env::var("FACEPAIR_MODEL_NAME") {
            config.model_name = name;
        }
        if let Ok(dir) = std::env::var("FACEPAIR_SUBJECTS_DIR") {
            config.subjects_dir = PathBuf::from(dir);
        }
        config.seed = env_u64("FACEPAIR_SEED", config.seed);

        config
            .network
            .validate()
            .context("invalid network layout in configuration")?;
        Ok(config)
    }

    fn apply_file(&mut self, path: &Path) -> Result<()> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let file: ConfigFile = toml::from_str(&text)
            .with_context(|| format!("parsing config file {}", path.display()))?;
        tracing::debug!(path = %path.display(), "config file loaded");
        self.merge(file);
        Ok(())
    }

    fn merge(&mut self, file: ConfigFile) {
        if let Some(dir) = file.model_dir {
            self.model_dir = dir;
        }
        if let Some(name) = file.model_name {
            self.model_name = name;
        }
        if let Some(dir) = file.subjects_dir {
            self.subjects_dir = dir;
        }
        if let Some(seed) = file.seed {
            self.seed = seed;
        }
        if let Some(labels) = file.labels {
            self.labels = labels;
        }
        if let Some(network) = file.network {
            self.network = network;
        }
    }

    pub fn weight_store(&self) -> WeightStore {
        WeightStore::new(&self.model_dir, &self.model_name)
    }
}

fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use facepair_core::Activation;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.model_name, "50x50-4l");
        assert_eq!(config.labels.get(0), Some("MML"));
        assert_eq!(config.labels.get(5), Some("sol"));
        assert_eq!(config.network.sizes, vec![5000, 500, 50, 10, 2]);
        assert_eq!(
            config.weight_store().weights_path(1),
            PathBuf::from("model/best_layer1_weights50x50-4l.npy")
        );
    }

    #[test]
    fn test_file_overrides_defaults() {
        let file: ConfigFile = toml::from_str(
            r#"
            model_name = "small"
            seed = 9
            labels = ["same", "different"]

            [network]
            sizes = [5000, 16, 2]
            output = "linear"
            "#,
        )
        .unwrap();

        let mut config = Config::default();
        config.merge(file);
        assert_eq!(config.model_name, "small");
        assert_eq!(config.seed, 9);
        assert_eq!(config.labels.get(1), Some("different"));
        assert_eq!(config.network.sizes, vec![5000, 16, 2]);
        assert_eq!(config.network.hidden, Activation::ReLU);
        assert_eq!(config.network.output, Activation::Linear);
        assert_eq!(config.subjects_dir, PathBuf::from("subjects_photos"));
    }

    #[test]
    fn test_file_rejects_unknown_keys() {
        let result = toml::from_str::<ConfigFile>("camera = 0\n");
        assert!(result.is_err());
    }

    #[test]
    fn test_env_u64_fallback() {
        assert_eq!(env_u64("FACEPAIR_TEST_UNSET_SEED", 3), 3);
    }
}
