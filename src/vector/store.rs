//! Per-`(index, field)` vector store: growable vector array, id/slot
//! bimap, tombstones, dirty-rebuild HNSW graph and binary persistence
//! (spec.md §4.4).

use super::distance::{distance, similarity_score};
use super::hnsw::HnswGraph;
use crate::catalog::{DistanceMetric, HnswAlgorithm};
use crate::error::ApiError;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::io::{Read, Write};
use std::path::Path;

const DEFAULT_OVERSAMPLE: usize = 3;
const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct PersistedState {
    version: u32,
    metric: DistanceMetric,
    vectors: Vec<Vec<f32>>,
    slot_to_id: Vec<(u32, String)>,
    tombstoned: Vec<u32>,
}

struct Inner {
    metric: DistanceMetric,
    m: usize,
    ef_construction: usize,
    ef_search: usize,
    oversample: usize,
    vectors: Vec<Vec<f32>>,
    id_to_slot: HashMap<String, u32>,
    slot_to_id: HashMap<u32, String>,
    tombstoned: HashSet<u32>,
    dirty: bool,
    graph: Option<HnswGraph>,
    /// graph-local node id -> slot, valid only while `graph` is fresh.
    live_slots: Vec<u32>,
}

/// Coarse per-`(index, field)` lock serializing mutation and rebuild
/// (spec.md §4.4 "Concurrency").
pub struct VectorStore {
    inner: Mutex<Inner>,
}

pub struct Hit {
    pub id: String,
    pub distance: f32,
    pub score: f32,
}

impl VectorStore {
    pub fn new(algorithm: &HnswAlgorithm) -> Self {
        Self {
            inner: Mutex::new(Inner {
                metric: algorithm.metric,
                m: algorithm.m,
                ef_construction: algorithm.ef_construction,
                ef_search: algorithm.ef_search,
                oversample: DEFAULT_OVERSAMPLE,
                vectors: Vec::new(),
                id_to_slot: HashMap::new(),
                slot_to_id: HashMap::new(),
                tombstoned: HashSet::new(),
                dirty: true,
                graph: None,
                live_slots: Vec::new(),
            }),
        }
    }

    pub fn upsert(&self, id: impl Into<String>, vector: Vec<f32>) {
        let id = id.into();
        let mut inner = self.inner.lock();
        if let Some(&old_slot) = inner.id_to_slot.get(&id) {
            inner.tombstoned.insert(old_slot);
        }
        let slot = inner.vectors.len() as u32;
        inner.vectors.push(vector);
        inner.id_to_slot.insert(id.clone(), slot);
        inner.slot_to_id.insert(slot, id);
        inner.dirty = true;
    }

    pub fn delete(&self, id: &str) {
        let mut inner = self.inner.lock();
        if let Some(slot) = inner.id_to_slot.remove(id) {
            inner.tombstoned.insert(slot);
            inner.slot_to_id.remove(&slot);
            inner.dirty = true;
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.inner.lock().id_to_slot.contains_key(id)
    }

    pub fn len_live(&self) -> usize {
        let inner = self.inner.lock();
        inner.vectors.len() - inner.tombstoned.len()
    }

    fn ensure_fresh(inner: &mut Inner) {
        if !inner.dirty && inner.graph.is_some() {
            return;
        }
        let live_slots: Vec<u32> = (0..inner.vectors.len() as u32)
            .filter(|s| !inner.tombstoned.contains(s))
            .collect();
        let vectors = &inner.vectors;
        let metric = inner.metric;
        let dist = |a: u32, b: u32| -> f32 {
            distance(metric, &vectors[live_slots[a as usize] as usize], &vectors[live_slots[b as usize] as usize])
        };
        let graph = HnswGraph::build(live_slots.len(), inner.m, inner.ef_construction, dist);
        inner.graph = Some(graph);
        inner.live_slots = live_slots;
        inner.dirty = false;
    }

    /// `knn(q, k)`: the `k` nearest non-tombstoned vectors by ascending
    /// distance.
    pub fn knn(&self, query: &[f32], k: usize) -> Vec<Hit> {
        let mut inner = self.inner.lock();
        Self::ensure_fresh(&mut inner);
        let Some(graph) = inner.graph.as_ref() else {
            return Vec::new();
        };
        let metric = inner.metric;
        let vectors = &inner.vectors;
        let live_slots = &inner.live_slots;
        let ef = inner.ef_search.max(k);
        let results = graph.search(ef, |local_id| {
            distance(metric, query, &vectors[live_slots[local_id as usize] as usize])
        });
        results
            .into_iter()
            .take(k)
            .map(|(local_id, dist)| {
                let slot = live_slots[local_id as usize];
                let id = inner.slot_to_id[&slot].clone();
                Hit { id, distance: dist, score: similarity_score(dist) }
            })
            .collect()
    }

    /// `filtered_knn(q, k, candidate_ids)`: oversample `k * oversample`
    /// candidates from the graph, filter to `candidate_ids`, then
    /// brute-force top up over the remaining filtered-in vectors not
    /// already covered by the graph search if fewer than `k` survive.
    pub fn filtered_knn(&self, query: &[f32], k: usize, candidate_ids: &HashSet<String>) -> Vec<Hit> {
        let mut inner = self.inner.lock();
        Self::ensure_fresh(&mut inner);
        let metric = inner.metric;
        let vectors = &inner.vectors;

        let oversampled_k = k.saturating_mul(inner.oversample).max(k);
        let mut hits: Vec<Hit> = Vec::new();
        let mut covered: HashSet<String> = HashSet::new();

        if let Some(graph) = inner.graph.as_ref() {
            let live_slots = &inner.live_slots;
            let ef = inner.ef_search.max(oversampled_k);
            let results = graph.search(ef, |local_id| {
                distance(metric, query, &vectors[live_slots[local_id as usize] as usize])
            });
            for (local_id, dist) in results.into_iter().take(oversampled_k) {
                let slot = live_slots[local_id as usize];
                let id = inner.slot_to_id[&slot].clone();
                covered.insert(id.clone());
                if candidate_ids.contains(&id) {
                    hits.push(Hit { id, distance: dist, score: similarity_score(dist) });
                }
            }
        }

        if hits.len() < k {
            for (id, &slot) in inner.id_to_slot.iter() {
                if inner.tombstoned.contains(&slot) || covered.contains(id) || !candidate_ids.contains(id) {
                    continue;
                }
                let dist = distance(metric, query, &vectors[slot as usize]);
                hits.push(Hit { id: id.clone(), distance: dist, score: similarity_score(dist) });
            }
        }

        hits.sort_by(|a, b| a.distance.partial_cmp(&b.distance).unwrap());
        hits.truncate(k);
        hits
    }

    /// Writes vectors, bimap and tombstones to a versioned binary file.
    /// The graph itself is never persisted.
    pub fn persist(&self, path: impl AsRef<Path>) -> Result<(), ApiError> {
        let inner = self.inner.lock();
        let state = PersistedState {
            version: FORMAT_VERSION,
            metric: inner.metric,
            vectors: inner.vectors.clone(),
            slot_to_id: inner.slot_to_id.iter().map(|(&s, id)| (s, id.clone())).collect(),
            tombstoned: inner.tombstoned.iter().copied().collect(),
        };
        let bytes = bincode::serialize(&state)
            .map_err(|e| ApiError::InternalError(format!("vector store serialize failed: {e}")))?;
        let mut file = std::fs::File::create(path)
            .map_err(|e| ApiError::InternalError(format!("vector store write failed: {e}")))?;
        file.write_all(&bytes)
            .map_err(|e| ApiError::InternalError(format!("vector store write failed: {e}")))?;
        Ok(())
    }

    /// Loads a previously persisted store. Corruption yields a clearly
    /// reported load failure without affecting the rest of the system.
    pub fn load(path: impl AsRef<Path>, algorithm: &HnswAlgorithm) -> Result<Self, ApiError> {
        let mut file = std::fs::File::open(path)
            .map_err(|e| ApiError::InternalError(format!("vector store open failed: {e}")))?;
        let mut bytes = Vec::new();
        file.read_to_end(&mut bytes)
            .map_err(|e| ApiError::InternalError(format!("vector store read failed: {e}")))?;
        let state: PersistedState = bincode::deserialize(&bytes)
            .map_err(|e| ApiError::InternalError(format!("vector store file is corrupt: {e}")))?;
        if state.version != FORMAT_VERSION {
            return Err(ApiError::InternalError(format!(
                "vector store file has unsupported version {}",
                state.version
            )));
        }
        let mut id_to_slot = HashMap::new();
        let mut slot_to_id = HashMap::new();
        for (slot, id) in state.slot_to_id {
            id_to_slot.insert(id.clone(), slot);
            slot_to_id.insert(slot, id);
        }
        Ok(Self {
            inner: Mutex::new(Inner {
                metric: state.metric,
                m: algorithm.m,
                ef_construction: algorithm.ef_construction,
                ef_search: algorithm.ef_search,
                oversample: DEFAULT_OVERSAMPLE,
                vectors: state.vectors,
                id_to_slot,
                slot_to_id,
                tombstoned: state.tombstoned.into_iter().collect(),
                dirty: true,
                graph: None,
                live_slots: Vec::new(),
            }),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::HnswAlgorithm;

    fn store() -> VectorStore {
        VectorStore::new(&HnswAlgorithm { m: 4, ef_construction: 50, ef_search: 50, ..Default::default() })
    }

    #[test]
    fn knn_returns_nearest_first() {
        let store = store();
        store.upsert("a", vec![0.0, 0.0]);
        store.upsert("b", vec![1.0, 0.0]);
        store.upsert("c", vec![10.0, 10.0]);
        let hits = store.knn(&[0.1, 0.0], 2);
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, "a");
    }

    #[test]
    fn delete_removes_from_results() {
        let store = store();
        store.upsert("a", vec![0.0, 0.0]);
        store.upsert("b", vec![1.0, 0.0]);
        store.delete("a");
        let hits = store.knn(&[0.0, 0.0], 5);
        assert!(hits.iter().all(|h| h.id != "a"));
    }

    #[test]
    fn filtered_knn_only_returns_candidates() {
        let store = store();
        for i in 0..20 {
            store.upsert(format!("v{i}"), vec![i as f32, 0.0]);
        }
        let candidates: HashSet<String> = ["v0", "v1", "v2"].iter().map(|s| s.to_string()).collect();
        let hits = store.filtered_knn(&[0.0, 0.0], 10, &candidates);
        assert!(hits.len() <= 3);
        assert!(hits.iter().all(|h| candidates.contains(&h.id)));
    }

    #[test]
    fn persist_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vectors.bin");
        let store = store();
        store.upsert("a", vec![1.0, 2.0]);
        store.upsert("b", vec![3.0, 4.0]);
        store.persist(&path).unwrap();

        let reloaded = VectorStore::load(&path, &HnswAlgorithm::default()).unwrap();
        assert_eq!(reloaded.len_live(), 2);
        let hits = reloaded.knn(&[1.0, 2.0], 1);
        assert_eq!(hits[0].id, "a");
    }
}
