//! Vector-search configuration: HNSW algorithm parameters and profiles
//! (spec.md §3 "Vector-search config").

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DistanceMetric {
    Cosine,
    Euclidean,
    DotProduct,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HnswAlgorithm {
    pub name: String,
    pub m: usize,
    pub ef_construction: usize,
    pub ef_search: usize,
    pub metric: DistanceMetric,
}

impl Default for HnswAlgorithm {
    fn default() -> Self {
        Self {
            name: "default-hnsw".to_string(),
            m: 4,
            ef_construction: 400,
            ef_search: 500,
            metric: DistanceMetric::Cosine,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VectorSearchConfig {
    pub algorithms: Vec<HnswAlgorithm>,
    /// profile name -> algorithm name
    pub profiles: BTreeMap<String, String>,
}

impl VectorSearchConfig {
    pub fn algorithm_for_profile(&self, profile: &str) -> Option<&HnswAlgorithm> {
        let algo_name = self.profiles.get(profile)?;
        self.algorithms.iter().find(|a| &a.name == algo_name)
    }
}
