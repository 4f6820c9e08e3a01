//! Similarity algorithm configuration (spec.md §4.2 "Similarity").

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Similarity {
    Bm25 { k1: f64, b: f64 },
    Classic,
}

impl Default for Similarity {
    fn default() -> Self {
        Similarity::Bm25 { k1: 1.2, b: 0.75 }
    }
}
