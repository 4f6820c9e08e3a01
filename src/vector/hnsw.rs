//! A single-layer-refined navigable small-world graph used to approximate
//! HNSW search (spec.md §4.4). Because the index is always rebuilt from
//! scratch over the current live vector set whenever it is dirty (no
//! incremental delete bookkeeping required by the contract), construction
//! here is a plain from-scratch build rather than an amortized insert path.

use rand::Rng;
use std::collections::{BinaryHeap, HashMap, HashSet};

/// Greedy-search candidate ordered by ascending distance (min-heap via
/// `Reverse`-style inverted `Ord`).
#[derive(Debug, Clone, Copy, PartialEq)]
struct Candidate {
    dist: f32,
    id: u32,
}
impl Eq for Candidate {}
impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        other.dist.partial_cmp(&self.dist).unwrap_or(std::cmp::Ordering::Equal)
    }
}
impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

/// Max-heap variant used to prune the working result set down to `ef`.
#[derive(Debug, Clone, Copy, PartialEq)]
struct FarCandidate {
    dist: f32,
    id: u32,
}
impl Eq for FarCandidate {}
impl Ord for FarCandidate {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.dist.partial_cmp(&other.dist).unwrap_or(std::cmp::Ordering::Equal)
    }
}
impl PartialOrd for FarCandidate {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

pub struct HnswGraph {
    m: usize,
    ef_construction: usize,
    entry_point: Option<u32>,
    top_level: usize,
    node_levels: Vec<usize>,
    /// `layers[level]` maps a node id to its neighbor ids at that level.
    layers: Vec<HashMap<u32, Vec<u32>>>,
}

impl HnswGraph {
    /// Builds a graph over node ids `0..vectors.len()` using `dist(i, j)`
    /// as the distance oracle.
    pub fn build(count: usize, m: usize, ef_construction: usize, dist: impl Fn(u32, u32) -> f32) -> Self {
        let mut graph = HnswGraph {
            m: m.max(2),
            ef_construction: ef_construction.max(m),
            entry_point: None,
            top_level: 0,
            node_levels: Vec::with_capacity(count),
            layers: vec![HashMap::new()],
        };
        let ml = 1.0 / (graph.m as f64).ln();
        let mut rng = rand::thread_rng();
        for id in 0..count as u32 {
            let level = ((-rng.gen::<f64>().ln() * ml).floor() as usize).min(16);
            graph.insert_node(id, level, &dist);
        }
        graph
    }

    fn insert_node(&mut self, id: u32, level: usize, dist: &impl Fn(u32, u32) -> f32) {
        while self.layers.len() <= level {
            self.layers.push(HashMap::new());
        }
        self.node_levels.push(level);

        let Some(entry) = self.entry_point else {
            self.entry_point = Some(id);
            self.top_level = level;
            for l in 0..=level {
                self.layers[l].entry(id).or_default();
            }
            return;
        };

        let mut current = entry;
        for l in ((level + 1)..=self.top_level).rev() {
            current = self.greedy_closest(current, id, l, dist);
        }

        for l in (0..=level.min(self.top_level)).rev() {
            let candidates = self.search_layer(current, id, self.ef_construction, l, dist);
            let neighbors: Vec<u32> = candidates.iter().take(self.m).map(|c| c.id).collect();
            self.layers[l].insert(id, neighbors.clone());
            for &n in &neighbors {
                let entry = self.layers[l].entry(n).or_default();
                entry.push(id);
                if entry.len() > self.m * 2 {
                    entry.sort_by(|&a, &b| dist(n, a).partial_cmp(&dist(n, b)).unwrap());
                    entry.truncate(self.m);
                }
            }
            if let Some(&first) = candidates.first().map(|c| &c.id) {
                current = first;
            }
        }

        if level > self.top_level {
            self.top_level = level;
            self.entry_point = Some(id);
        }
    }

    fn greedy_closest(&self, from: u32, target: u32, level: usize, dist: &impl Fn(u32, u32) -> f32) -> u32 {
        let mut current = from;
        let mut current_dist = dist(current, target);
        loop {
            let mut improved = false;
            if let Some(neighbors) = self.layers[level].get(&current) {
                for &n in neighbors {
                    let d = dist(n, target);
                    if d < current_dist {
                        current = n;
                        current_dist = d;
                        improved = true;
                    }
                }
            }
            if !improved {
                return current;
            }
        }
    }

    fn search_layer(
        &self,
        entry: u32,
        target: u32,
        ef: usize,
        level: usize,
        dist: &impl Fn(u32, u32) -> f32,
    ) -> Vec<Candidate> {
        let mut visited: HashSet<u32> = HashSet::new();
        visited.insert(entry);
        let entry_dist = dist(entry, target);
        let mut candidates = BinaryHeap::new();
        candidates.push(Candidate { dist: entry_dist, id: entry });
        let mut found = BinaryHeap::new();
        found.push(FarCandidate { dist: entry_dist, id: entry });

        while let Some(Candidate { dist: c_dist, id: c_id }) = candidates.pop() {
            let worst = found.peek().map(|f| f.dist).unwrap_or(f32::MAX);
            if c_dist > worst && found.len() >= ef {
                break;
            }
            if let Some(neighbors) = self.layers[level].get(&c_id) {
                for &n in neighbors {
                    if visited.insert(n) {
                        let d = dist(n, target);
                        let worst = found.peek().map(|f| f.dist).unwrap_or(f32::MAX);
                        if found.len() < ef || d < worst {
                            candidates.push(Candidate { dist: d, id: n });
                            found.push(FarCandidate { dist: d, id: n });
                            if found.len() > ef {
                                found.pop();
                            }
                        }
                    }
                }
            }
        }

        let mut result: Vec<Candidate> = found.into_iter().map(|f| Candidate { dist: f.dist, id: f.id }).collect();
        result.sort_by(|a, b| a.dist.partial_cmp(&b.dist).unwrap());
        result
    }

    /// Returns up to `ef` nearest graph nodes to an external query vector,
    /// ascending by distance. `dist_to_query(id)` evaluates distance from
    /// node `id` to the query.
    pub fn search(&self, ef: usize, dist_to_query: impl Fn(u32) -> f32) -> Vec<(u32, f32)> {
        let Some(entry) = self.entry_point else {
            return Vec::new();
        };
        let mut current = entry;
        for level in (1..=self.top_level).rev() {
            current = self.greedy_closest_to_query(current, level, &dist_to_query);
        }
        let candidates = self.search_layer_query(current, ef, 0, &dist_to_query);
        candidates.into_iter().map(|c| (c.id, c.dist)).collect()
    }

    fn greedy_closest_to_query(&self, from: u32, level: usize, dist: &impl Fn(u32) -> f32) -> u32 {
        let mut current = from;
        let mut current_dist = dist(current);
        loop {
            let mut improved = false;
            if let Some(neighbors) = self.layers[level].get(&current) {
                for &n in neighbors {
                    let d = dist(n);
                    if d < current_dist {
                        current = n;
                        current_dist = d;
                        improved = true;
                    }
                }
            }
            if !improved {
                return current;
            }
        }
    }

    fn search_layer_query(&self, entry: u32, ef: usize, level: usize, dist: &impl Fn(u32) -> f32) -> Vec<Candidate> {
        let mut visited: HashSet<u32> = HashSet::new();
        visited.insert(entry);
        let entry_dist = dist(entry);
        let mut candidates = BinaryHeap::new();
        candidates.push(Candidate { dist: entry_dist, id: entry });
        let mut found = BinaryHeap::new();
        found.push(FarCandidate { dist: entry_dist, id: entry });

        while let Some(Candidate { dist: c_dist, id: c_id }) = candidates.pop() {
            let worst = found.peek().map(|f| f.dist).unwrap_or(f32::MAX);
            if c_dist > worst && found.len() >= ef {
                break;
            }
            if let Some(neighbors) = self.layers[level].get(&c_id) {
                for &n in neighbors {
                    if visited.insert(n) {
                        let d = dist(n);
                        let worst = found.peek().map(|f| f.dist).unwrap_or(f32::MAX);
                        if found.len() < ef || d < worst {
                            candidates.push(Candidate { dist: d, id: n });
                            found.push(FarCandidate { dist: d, id: n });
                            if found.len() > ef {
                                found.pop();
                            }
                        }
                    }
                }
            }
        }
        let mut result: Vec<Candidate> = found.into_iter().map(|f| Candidate { dist: f.dist, id: f.id }).collect();
        result.sort_by(|a, b| a.dist.partial_cmp(&b.dist).unwrap());
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_nearest_of_a_small_cluster() {
        let points: Vec<Vec<f32>> = vec![
            vec![0.0, 0.0],
            vec![0.1, 0.0],
            vec![5.0, 5.0],
            vec![5.1, 5.0],
            vec![10.0, 10.0],
        ];
        let dist = |a: u32, b: u32| -> f32 {
            let pa = &points[a as usize];
            let pb = &points[b as usize];
            ((pa[0] - pb[0]).powi(2) + (pa[1] - pb[1]).powi(2)).sqrt()
        };
        let graph = HnswGraph::build(points.len(), 4, 50, dist);
        let query = vec![5.05, 5.0];
        let results = graph.search(5, |id| {
            let p = &points[id as usize];
            ((p[0] - query[0]).powi(2) + (p[1] - query[1]).powi(2)).sqrt()
        });
        assert!(!results.is_empty());
        let nearest = results[0].0;
        assert!(nearest == 2 || nearest == 3);
    }
}
