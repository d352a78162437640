//! Serving configuration, loaded once at startup from a JSON file.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use super::error::{ServingError, ServingResult};

/// Top-level configuration for the serving process.
///
/// `category_models` maps a category name (e.g. "rice") to the directory
/// holding that classifier's `config.json` + `model.safetensors`. A
/// `BTreeMap` keeps category iteration order stable for logs and for the
/// registration payload.
#[derive(Debug, Clone, Deserialize)]
pub struct ServingConfig {
    /// Address the HTTP server binds to.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    /// Directory holding the default vision-transformer artifact.
    pub vit_model_dir: PathBuf,
    /// Per-category classifier artifact directories.
    pub category_models: BTreeMap<String, PathBuf>,
    /// Label taxonomy document (category name or "all" -> label list).
    pub taxonomy_path: PathBuf,
    /// Fitted crop-recommendation forest (JSON artifact).
    pub crop_recommender_path: PathBuf,
    /// Fitted fertilizer-recommendation forest (JSON artifact).
    pub fertilizer_recommender_path: PathBuf,
    /// Endpoint that receives the supported category names at startup.
    pub registration_url: String,
    /// Force CPU inference even when a GPU is available.
    #[serde(default = "default_use_cpu")]
    pub use_cpu: bool,
}

fn default_bind_addr() -> String {
    "127.0.0.1:8000".to_string()
}

fn default_use_cpu() -> bool {
    true
}

impl ServingConfig {
    pub fn from_file(path: &Path) -> ServingResult<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ServingError::io("read serving config", path, e))?;
        let config: ServingConfig =
            serde_json::from_str(&raw).map_err(|e| ServingError::Validation {
                field: format!("serving config {}", path.display()),
                expected: "valid JSON config".to_string(),
                actual: e.to_string(),
            })?;
        if config.category_models.is_empty() {
            return Err(ServingError::Validation {
                field: "category_models".to_string(),
                expected: "at least one category".to_string(),
                actual: "empty table".to_string(),
            });
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_json() -> &'static str {
        r#"{
            "vit_model_dir": "models/vit_all",
            "category_models": {
                "rice": "models/rice",
                "tomato": "models/tomato"
            },
            "taxonomy_path": "classes.json",
            "crop_recommender_path": "models/crop_forest.json",
            "fertilizer_recommender_path": "models/fertilizer_forest.json",
            "registration_url": "http://localhost:8080/local/registerType"
        }"#
    }

    #[test]
    fn parses_config_with_defaults() {
        let config: ServingConfig = serde_json::from_str(sample_json()).unwrap();
        assert_eq!(config.bind_addr, "127.0.0.1:8000");
        assert!(config.use_cpu);
        assert_eq!(config.category_models.len(), 2);
        assert_eq!(
            config.category_models.keys().collect::<Vec<_>>(),
            vec!["rice", "tomato"]
        );
    }

    #[test]
    fn rejects_empty_category_table() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{
                "vit_model_dir": "models/vit_all",
                "category_models": {},
                "taxonomy_path": "classes.json",
                "crop_recommender_path": "models/crop_forest.json",
                "fertilizer_recommender_path": "models/fertilizer_forest.json",
                "registration_url": "http://localhost:8080/local/registerType"
            }"#,
        )
        .unwrap();
        let err = ServingConfig::from_file(&path).unwrap_err();
        assert!(matches!(err, ServingError::Validation { .. }));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let err = ServingConfig::from_file(Path::new("/nonexistent/config.json")).unwrap_err();
        assert!(matches!(err, ServingError::Io { .. }));
    }
}
