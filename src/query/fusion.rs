//! Hybrid result fusion: Reciprocal Rank Fusion and min-max-normalized
//! weighted score fusion (spec.md §4.6 step 5).

use std::collections::HashMap;

pub const DEFAULT_RRF_K: f64 = 60.0;
pub const DEFAULT_TEXT_WEIGHT: f64 = 0.3;
pub const DEFAULT_VECTOR_WEIGHT: f64 = 0.7;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FusionMethod {
    Rrf,
    Weighted,
}

/// One ranked retrieval stream: document key to raw score, already sorted
/// descending by the caller.
pub type Stream = Vec<(String, f64)>;

pub fn reciprocal_rank_fusion(streams: &[Stream], k: f64) -> HashMap<String, f64> {
    let mut scores: HashMap<String, f64> = HashMap::new();
    for stream in streams {
        for (rank, (key, _)) in stream.iter().enumerate() {
            *scores.entry(key.clone()).or_insert(0.0) += 1.0 / (k + (rank + 1) as f64);
        }
    }
    scores
}

fn min_max_normalize(stream: &Stream) -> HashMap<String, f64> {
    if stream.is_empty() {
        return HashMap::new();
    }
    let min = stream.iter().map(|(_, s)| *s).fold(f64::INFINITY, f64::min);
    let max = stream.iter().map(|(_, s)| *s).fold(f64::NEG_INFINITY, f64::max);
    let span = max - min;
    stream
        .iter()
        .map(|(key, s)| (key.clone(), if span > 0.0 { (s - min) / span } else { 1.0 }))
        .collect()
}

/// Weighted fusion over an arbitrary number of streams; `weights` must be
/// the same length as `streams` (callers distribute the default
/// text=0.3/vector=0.7 split across however many vector streams exist).
pub fn weighted_fusion(streams: &[Stream], weights: &[f64]) -> HashMap<String, f64> {
    let mut scores: HashMap<String, f64> = HashMap::new();
    for (stream, weight) in streams.iter().zip(weights) {
        for (key, normalized) in min_max_normalize(stream) {
            *scores.entry(key).or_insert(0.0) += normalized * weight;
        }
    }
    scores
}

pub fn fuse(streams: &[Stream], method: FusionMethod, weights: &[f64]) -> HashMap<String, f64> {
    match method {
        FusionMethod::Rrf => reciprocal_rank_fusion(streams, DEFAULT_RRF_K),
        FusionMethod::Weighted => weighted_fusion(streams, weights),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rrf_rewards_documents_present_in_both_streams() {
        let text: Stream = vec![("a".into(), 5.0), ("b".into(), 4.0)];
        let vector: Stream = vec![("b".into(), 0.9), ("c".into(), 0.8)];
        let scores = reciprocal_rank_fusion(&[text, vector], DEFAULT_RRF_K);
        assert!(scores["b"] > scores["a"]);
        assert!(scores["b"] > scores["c"]);
    }

    #[test]
    fn weighted_fusion_respects_weights() {
        let text: Stream = vec![("a".into(), 1.0), ("b".into(), 0.0)];
        let vector: Stream = vec![("a".into(), 0.0), ("b".into(), 1.0)];
        let scores = weighted_fusion(&[text, vector], &[0.9, 0.1]);
        assert!(scores["a"] > scores["b"]);
    }

    #[test]
    fn missing_from_a_stream_contributes_zero() {
        let text: Stream = vec![("a".into(), 5.0)];
        let vector: Stream = vec![];
        let scores = reciprocal_rank_fusion(&[text, vector], DEFAULT_RRF_K);
        assert_eq!(scores.len(), 1);
    }
}
