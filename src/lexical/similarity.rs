//! BM25 / Classic similarity scoring (spec.md §4.2 "Similarity").

use crate::catalog::Similarity;

/// Per-term contribution to a document's score for one field.
pub fn score_term(
    similarity: &Similarity,
    term_freq: u32,
    doc_field_len: usize,
    avg_field_len: f64,
    doc_freq: usize,
    total_docs: usize,
) -> f64 {
    let tf = term_freq as f64;
    let n = total_docs.max(1) as f64;
    let df = doc_freq.max(1) as f64;
    match similarity {
        Similarity::Bm25 { k1, b } => {
            let idf = ((n - df + 0.5) / (df + 0.5) + 1.0).ln();
            let len_norm = if avg_field_len > 0.0 {
                1.0 - b + b * (doc_field_len as f64 / avg_field_len)
            } else {
                1.0
            };
            idf * (tf * (k1 + 1.0)) / (tf + k1 * len_norm)
        }
        Similarity::Classic => {
            let idf = (n / df).ln() + 1.0;
            let tf_component = tf.sqrt();
            let norm = if doc_field_len > 0 {
                1.0 / (doc_field_len as f64).sqrt()
            } else {
                1.0
            };
            tf_component * idf * idf * norm
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bm25_rewards_higher_term_frequency() {
        let sim = Similarity::Bm25 { k1: 1.2, b: 0.75 };
        let low = score_term(&sim, 3, 3, 4.0, 1, 2);
        let high = score_term(&sim, 5, 5, 4.0, 1, 2);
        assert!(high > low);
    }

    #[test]
    fn zero_k1_removes_term_frequency_influence() {
        let sim = Similarity::Bm25 { k1: 0.0, b: 0.75 };
        let a = score_term(&sim, 3, 3, 4.0, 1, 2);
        let b = score_term(&sim, 5, 5, 4.0, 1, 2);
        assert!((a - b).abs() < 1e-9);
    }
}
