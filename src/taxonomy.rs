//! Label taxonomy: category name (or the sentinel "all") to the ordered
//! list of human-readable class labels. Loaded once at startup and
//! read-only afterwards; index `i` of a model's score vector corresponds
//! to `labels[i]` of the taxonomy entry for the resolved category.

use std::collections::HashMap;
use std::path::Path;

use crate::core::{ServingError, ServingResult};

/// Taxonomy key used when no category is supplied.
pub const DEFAULT_KEY: &str = "all";

#[derive(Debug, Clone)]
pub struct LabelTaxonomy {
    labels: HashMap<String, Vec<String>>,
}

impl LabelTaxonomy {
    pub fn from_file(path: &Path) -> ServingResult<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ServingError::io("read taxonomy", path, e))?;
        let labels: HashMap<String, Vec<String>> =
            serde_json::from_str(&raw).map_err(|e| ServingError::Validation {
                field: format!("taxonomy {}", path.display()),
                expected: "JSON object of label lists".to_string(),
                actual: e.to_string(),
            })?;
        Self::new(labels)
    }

    pub fn new(labels: HashMap<String, Vec<String>>) -> ServingResult<Self> {
        if !labels.contains_key(DEFAULT_KEY) {
            return Err(ServingError::Validation {
                field: "taxonomy".to_string(),
                expected: format!("an entry for the default key '{}'", DEFAULT_KEY),
                actual: "missing".to_string(),
            });
        }
        Ok(Self { labels })
    }

    pub fn contains(&self, key: &str) -> bool {
        self.labels.contains_key(key)
    }

    pub fn labels(&self, key: &str) -> Option<&[String]> {
        self.labels.get(key).map(|v| v.as_slice())
    }

    /// Translate a predicted index into its label. An out-of-range index
    /// is a fatal internal-consistency fault (model/taxonomy mismatch),
    /// never a silent default.
    pub fn label(&self, key: &str, index: usize) -> ServingResult<&str> {
        let labels = self.labels.get(key).ok_or_else(|| ServingError::Validation {
            field: "taxonomy".to_string(),
            expected: format!("an entry for '{}'", key),
            actual: "missing".to_string(),
        })?;
        labels
            .get(index)
            .map(|s| s.as_str())
            .ok_or_else(|| ServingError::TaxonomyMismatch {
                key: key.to_string(),
                index,
                len: labels.len(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> LabelTaxonomy {
        let mut labels = HashMap::new();
        labels.insert(
            DEFAULT_KEY.to_string(),
            vec!["healthy".to_string(), "blight".to_string()],
        );
        labels.insert(
            "rice".to_string(),
            vec!["brown_spot".to_string(), "leaf_smut".to_string()],
        );
        LabelTaxonomy::new(labels).unwrap()
    }

    #[test]
    fn label_lookup_is_index_addressed() {
        let taxonomy = sample();
        assert_eq!(taxonomy.label("rice", 1).unwrap(), "leaf_smut");
        assert_eq!(taxonomy.label(DEFAULT_KEY, 0).unwrap(), "healthy");
    }

    #[test]
    fn out_of_range_index_is_a_taxonomy_mismatch() {
        let taxonomy = sample();
        let err = taxonomy.label("rice", 7).unwrap_err();
        match err {
            ServingError::TaxonomyMismatch { key, index, len } => {
                assert_eq!(key, "rice");
                assert_eq!(index, 7);
                assert_eq!(len, 2);
            }
            other => panic!("expected TaxonomyMismatch, got {}", other),
        }
    }

    #[test]
    fn missing_default_key_is_rejected() {
        let mut labels = HashMap::new();
        labels.insert("rice".to_string(), vec!["x".to_string()]);
        assert!(LabelTaxonomy::new(labels).is_err());
    }

    #[test]
    fn parses_the_taxonomy_document_shape() {
        let json = r#"{"all": ["a", "b"], "rice": ["c"]}"#;
        let labels: HashMap<String, Vec<String>> = serde_json::from_str(json).unwrap();
        let taxonomy = LabelTaxonomy::new(labels).unwrap();
        assert!(taxonomy.contains("rice"));
        assert_eq!(taxonomy.labels(DEFAULT_KEY).unwrap().len(), 2);
    }
}
