//! Vector distance metrics (spec.md §4.4 "Distance").

use crate::catalog::DistanceMetric;

pub fn distance(metric: DistanceMetric, a: &[f32], b: &[f32]) -> f32 {
    match metric {
        DistanceMetric::Cosine => 1.0 - cosine_similarity(a, b),
        DistanceMetric::Euclidean => euclidean(a, b),
        DistanceMetric::DotProduct => 1.0 - dot(a, b),
    }
}

/// Similarity score surfaced to callers, `1 / (1 + distance)`.
pub fn similarity_score(distance: f32) -> f32 {
    1.0 / (1.0 + distance)
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let norm_a = dot(a, a).sqrt();
    let norm_b = dot(b, b).sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot(a, b) / (norm_a * norm_b)
}

fn euclidean(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum::<f32>().sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_distance_zero_for_identical_vectors() {
        let d = distance(DistanceMetric::Cosine, &[1.0, 2.0, 3.0], &[1.0, 2.0, 3.0]);
        assert!(d.abs() < 1e-5);
    }

    #[test]
    fn euclidean_distance_matches_known_triangle() {
        let d = distance(DistanceMetric::Euclidean, &[0.0, 0.0], &[3.0, 4.0]);
        assert!((d - 5.0).abs() < 1e-5);
    }

    #[test]
    fn similarity_score_is_one_for_zero_distance() {
        assert!((similarity_score(0.0) - 1.0).abs() < 1e-9);
    }
}
