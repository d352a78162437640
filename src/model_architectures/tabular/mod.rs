//! Tabular recommenders.
//!
//! Fitted random forests consumed as black boxes: deserialized once at
//! startup from a JSON artifact, then evaluated as synchronous pure
//! functions of their numeric inputs. The crop recommender takes
//! [N, P, K, temperature, humidity, pH, rainfall]; the fertilizer
//! recommender takes [N, P, K].

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::{ServingError, ServingResult};


/// One node of a fitted binary decision tree.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TreeNode {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        class: usize,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DecisionTree {
    /// Nodes in array form; the root is node 0.
    pub nodes: Vec<TreeNode>,
}

impl DecisionTree {
    /// Walk from the root to a leaf. `features.len()` has already been
    /// validated against the forest arity.
    fn predict(&self, features: &[f64]) -> ServingResult<usize> {
        let mut index = 0usize;
        loop {
            match self.nodes.get(index) {
                Some(TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                }) => {
                    index = if features[*feature] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
                Some(TreeNode::Leaf { class }) => return Ok(*class),
                None => {
                    return Err(ServingError::Validation {
                        field: "decision tree".to_string(),
                        expected: format!("node index below {}", self.nodes.len()),
                        actual: index.to_string(),
                    })
                }
            }
        }
    }
}

/// Serialized forest artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForestData {
    pub algorithm: String,
    pub n_features: usize,
    pub classes: Vec<String>,
    pub trees: Vec<DecisionTree>,
}

/// A fitted random-forest classifier, majority vote across trees.
#[derive(Debug, Clone)]
pub struct RandomForest {
    n_features: usize,
    classes: Vec<String>,
    trees: Vec<DecisionTree>,
}

impl RandomForest {
    pub fn from_file(path: &Path) -> ServingResult<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ServingError::io("read forest artifact", path, e))?;
        let data: ForestData = serde_json::from_str(&raw).map_err(|e| ServingError::Validation {
            field: format!("forest artifact {}", path.display()),
            expected: "valid forest JSON".to_string(),
            actual: e.to_string(),
        })?;
        Self::from_data(data)
    }

    pub fn from_data(data: ForestData) -> ServingResult<Self> {
        if data.trees.is_empty() || data.classes.is_empty() {
            return Err(ServingError::Validation {
                field: "forest artifact".to_string(),
                expected: "at least one tree and one class".to_string(),
                actual: format!("{} trees, {} classes", data.trees.len(), data.classes.len()),
            });
        }
        // Reject out-of-range feature/class references up front so the
        // request path never indexes past the tables.
        for (t, tree) in data.trees.iter().enumerate() {
            for node in &tree.nodes {
                match node {
                    TreeNode::Split { feature, .. } if *feature >= data.n_features => {
                        return Err(ServingError::Validation {
                            field: format!("tree {}", t),
                            expected: format!("feature index below {}", data.n_features),
                            actual: feature.to_string(),
                        })
                    }
                    TreeNode::Leaf { class } if *class >= data.classes.len() => {
                        return Err(ServingError::Validation {
                            field: format!("tree {}", t),
                            expected: format!("class index below {}", data.classes.len()),
                            actual: class.to_string(),
                        })
                    }
                    _ => {}
                }
            }
        }
        Ok(Self {
            n_features: data.n_features,
            classes: data.classes,
            trees: data.trees,
        })
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    /// Majority vote across trees; ties resolve to the lowest class index
    /// so prediction stays deterministic.
    pub fn predict(&self, features: &[f64]) -> ServingResult<&str> {
        if features.len() != self.n_features {
            return Err(ServingError::Validation {
                field: "feature vector".to_string(),
                expected: format!("{} features", self.n_features),
                actual: features.len().to_string(),
            });
        }

        let mut votes = vec![0usize; self.classes.len()];
        for tree in &self.trees {
            votes[tree.predict(features)?] += 1;
        }
        let winner = votes
            .iter()
            .enumerate()
            .max_by(|(ia, a), (ib, b)| a.cmp(b).then(ib.cmp(ia)))
            .map(|(i, _)| i)
            .unwrap_or(0);
        Ok(&self.classes[winner])
    }
}
