//! `ServerContext`: the single place that owns every live resource a
//! request or indexer run needs (spec.md §9 "components reference
//! resources by name through a shared context rather than holding direct
//! references to each other", replacing the source's constructor-wired
//! object graph).
//!
//! Catalog resources (index/data-source/indexer definitions) persist to
//! JSON under `data_dir` via [`crate::catalog::store::ResourceStore`].
//! Documents and vector graphs are rebuilt in memory on startup: lexical
//! indexes always start empty, vector stores are restored from their
//! binary snapshot under `data_dir/vectors/` when one exists.

use crate::analyzer::AnalyzerRegistry;
use crate::catalog::store::ResourceStore;
use crate::catalog::IndexDefinition;
use crate::datasource::DataSourceDefinition;
use crate::error::ApiError;
use crate::indexer::{IndexerDefinition, IndexerStatus, Skillset};
use crate::lexical::LexicalIndex;
use crate::skills::SkillRunContext;
use crate::vector::VectorStore;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub type SharedServerContext = Arc<ServerContext>;

pub struct ServerContext {
    pub data_dir: PathBuf,
    pub models_dir: PathBuf,
    pub indexes: ResourceStore<IndexDefinition>,
    pub data_sources: ResourceStore<DataSourceDefinition>,
    pub indexers: ResourceStore<IndexerDefinition>,
    pub analyzers: AnalyzerRegistry,
    pub http_client: reqwest::Client,

    skillsets: RwLock<HashMap<String, Skillset>>,
    lexical_indexes: RwLock<HashMap<String, LexicalIndex>>,
    vector_stores: RwLock<HashMap<String, HashMap<String, VectorStore>>>,
    indexer_status: RwLock<HashMap<String, IndexerStatus>>,
    indexer_running: RwLock<HashSet<String>>,
}

fn vector_snapshot_path(data_dir: &Path, index_name: &str, field_name: &str) -> PathBuf {
    data_dir.join("vectors").join(format!("{index_name}__{field_name}.bin"))
}

impl ServerContext {
    /// Opens (or creates) the catalog stores under `data_dir` and rebuilds
    /// every live lexical/vector index from the persisted index
    /// definitions (spec.md §6.5 "boot sequence").
    pub fn new(data_dir: impl Into<PathBuf>, models_dir: impl Into<PathBuf>) -> anyhow::Result<SharedServerContext> {
        let data_dir = data_dir.into();
        let models_dir = models_dir.into();

        let indexes = ResourceStore::<IndexDefinition>::open(data_dir.join("indexes"))?;
        let data_sources = ResourceStore::<DataSourceDefinition>::open(data_dir.join("datasources"))?;
        let indexers = ResourceStore::<IndexerDefinition>::open(data_dir.join("indexers"))?;
        let analyzers = AnalyzerRegistry::new();

        let mut lexical_indexes = HashMap::new();
        let mut vector_stores = HashMap::new();
        for definition in indexes.list() {
            let mut fields_vectors = HashMap::new();
            for field in definition.fields.iter().filter(|f| f.is_vector()) {
                let Some(profile) = &field.vector_search_profile else { continue };
                let Some(algorithm) = definition.vector_search.algorithm_for_profile(profile) else { continue };
                let path = vector_snapshot_path(&data_dir, &definition.name, &field.name);
                let store = if path.exists() {
                    VectorStore::load(&path, algorithm).unwrap_or_else(|e| {
                        tracing::warn!("failed to load vector snapshot {:?}: {}", path, e);
                        VectorStore::new(algorithm)
                    })
                } else {
                    VectorStore::new(algorithm)
                };
                fields_vectors.insert(field.name.clone(), store);
            }
            vector_stores.insert(definition.name.clone(), fields_vectors);
            lexical_indexes.insert(definition.name.clone(), LexicalIndex::new(definition, analyzers.clone()));
        }

        let indexer_status = indexers.list().into_iter().map(|i| (i.name.clone(), IndexerStatus::new(i.name.clone()))).collect();

        Ok(Arc::new(Self {
            data_dir,
            models_dir,
            indexes,
            data_sources,
            indexers,
            analyzers,
            http_client: reqwest::Client::new(),
            skillsets: RwLock::new(HashMap::new()),
            lexical_indexes: RwLock::new(lexical_indexes),
            vector_stores: RwLock::new(vector_stores),
            indexer_status: RwLock::new(indexer_status),
            indexer_running: RwLock::new(HashSet::new()),
        }))
    }

    /// A fresh [`SkillRunContext`] sharing this context's HTTP client pool
    /// and models directory, with its own cancellation token per run.
    pub fn skill_run_context(&self) -> SkillRunContext {
        SkillRunContext { http_client: self.http_client.clone(), models_dir: self.models_dir.clone(), default_timeout: std::time::Duration::from_secs(30), cancellation: tokio_util::sync::CancellationToken::new() }
    }

    /// Registers a live index: creates the catalog entry, then its empty
    /// lexical index and (for each vector field) a fresh vector store.
    pub fn create_index(&self, definition: IndexDefinition) -> Result<IndexDefinition, ApiError> {
        definition.validate()?;
        let created = self.indexes.create(definition)?;
        self.spin_up_index(&created);
        Ok(created)
    }

    /// (Re)builds the live lexical/vector index for `definition`, replacing
    /// any previous live state for that name. Used both by
    /// [`Self::create_index`] and by a `PUT` that creates-or-replaces.
    pub fn spin_up_index(&self, definition: &IndexDefinition) {
        let mut fields_vectors = HashMap::new();
        for field in definition.fields.iter().filter(|f| f.is_vector()) {
            if let Some(profile) = &field.vector_search_profile {
                if let Some(algorithm) = definition.vector_search.algorithm_for_profile(profile) {
                    fields_vectors.insert(field.name.clone(), VectorStore::new(algorithm));
                }
            }
        }
        self.vector_stores.write().insert(definition.name.clone(), fields_vectors);
        self.lexical_indexes.write().insert(definition.name.clone(), LexicalIndex::new(definition.clone(), self.analyzers.clone()));
    }

    pub fn delete_index(&self, name: &str, if_match: Option<&str>) -> Result<(), ApiError> {
        self.indexes.delete(name, if_match)?;
        self.lexical_indexes.write().remove(name);
        if let Some(fields) = self.vector_stores.write().remove(name) {
            for field_name in fields.keys() {
                let _ = std::fs::remove_file(vector_snapshot_path(&self.data_dir, name, field_name));
            }
        }
        Ok(())
    }

    /// Runs `f` against the named index's live lexical index and vector
    /// stores under one write lock, returning `None` if the index is
    /// unknown. Used by the document write path and the query executor.
    pub fn with_index_mut<R>(&self, name: &str, f: impl FnOnce(&mut LexicalIndex, &HashMap<String, VectorStore>) -> R) -> Option<R> {
        let mut indexes = self.lexical_indexes.write();
        let index = indexes.get_mut(name)?;
        let vectors = self.vector_stores.read();
        let empty = HashMap::new();
        let stores = vectors.get(name).unwrap_or(&empty);
        Some(f(index, stores))
    }

    pub fn with_index<R>(&self, name: &str, f: impl FnOnce(&LexicalIndex, &HashMap<String, VectorStore>) -> R) -> Option<R> {
        let indexes = self.lexical_indexes.read();
        let index = indexes.get(name)?;
        let vectors = self.vector_stores.read();
        let empty = HashMap::new();
        let stores = vectors.get(name).unwrap_or(&empty);
        Some(f(index, stores))
    }

    /// Persists every vector store's HNSW graph to `data_dir/vectors`
    /// (spec.md §4.4 "vector graphs are the only document-level state the
    /// simulator persists across restarts").
    pub fn persist_vector_snapshots(&self) -> anyhow::Result<()> {
        std::fs::create_dir_all(self.data_dir.join("vectors"))?;
        let vectors = self.vector_stores.read();
        for (index_name, fields) in vectors.iter() {
            for (field_name, store) in fields.iter() {
                store.persist(vector_snapshot_path(&self.data_dir, index_name, field_name))?;
            }
        }
        Ok(())
    }

    pub fn put_skillset(&self, skillset: Skillset) {
        self.skillsets.write().insert(skillset.name.clone(), skillset);
    }

    pub fn get_skillset(&self, name: &str) -> Option<Skillset> {
        self.skillsets.read().get(name).cloned()
    }

    pub fn delete_skillset(&self, name: &str) {
        self.skillsets.write().remove(name);
    }

    pub fn list_skillsets(&self) -> Vec<Skillset> {
        self.skillsets.read().values().cloned().collect()
    }

    pub fn indexer_status(&self, name: &str) -> Option<IndexerStatus> {
        self.indexer_status.read().get(name).cloned()
    }

    pub fn record_indexer_result(&self, name: &str, result: crate::indexer::ExecutionResult) {
        let mut statuses = self.indexer_status.write();
        let status = statuses.entry(name.to_string()).or_insert_with(|| IndexerStatus::new(name));
        status.record(result);
    }

    /// Marks `name` as running, refusing a second concurrent run of the
    /// same indexer (spec.md §4.12 "an indexer run that is already in
    /// progress rejects a concurrent run request rather than queuing it").
    pub fn try_begin_indexer_run(&self, name: &str) -> Result<(), ApiError> {
        let mut running = self.indexer_running.write();
        if !running.insert(name.to_string()) {
            return Err(ApiError::Conflict(format!("indexer '{name}' run is already in progress")));
        }
        Ok(())
    }

    pub fn end_indexer_run(&self, name: &str) {
        self.indexer_running.write().remove(name);
    }

    /// Runs one indexer pass against its live target index, holding that
    /// index's write lock for the duration of the run (the skill pipeline
    /// and document writes both need it, and the run itself is already
    /// serialized per-indexer by [`Self::try_begin_indexer_run`]).
    pub async fn run_indexer(&self, indexer: &IndexerDefinition, data_source: &DataSourceDefinition, skillset: Option<&Skillset>) -> Result<crate::indexer::ExecutionResult, ApiError> {
        let target_definition = self.indexes.get(&indexer.target_index_name).ok_or_else(|| ApiError::NotFound(indexer.target_index_name.clone()))?;
        let previous_high_water_mark = self.indexer_status(&indexer.name).and_then(|s| s.last_high_water_mark());
        let skill_ctx = self.skill_run_context();

        let mut indexes = self.lexical_indexes.write();
        let target_index = indexes.get_mut(&indexer.target_index_name).ok_or_else(|| ApiError::NotFound(indexer.target_index_name.clone()))?;
        let vectors = self.vector_stores.read();
        let empty = HashMap::new();
        let target_vector_stores = vectors.get(&indexer.target_index_name).unwrap_or(&empty);

        let deps = crate::indexer::IndexerRunDeps {
            indexer,
            data_source,
            target_definition: &target_definition,
            target_index,
            target_vector_stores,
            skillset,
            skill_ctx: &skill_ctx,
            previous_high_water_mark,
        };
        Ok(crate::indexer::run(deps).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Field, FieldFlags, FieldType, PrimitiveType};

    fn index_definition(name: &str) -> IndexDefinition {
        IndexDefinition::new(name, vec![Field::new("id", FieldType::Primitive(PrimitiveType::String), FieldFlags { key: true, retrievable: true, ..Default::default() })])
    }

    #[test]
    fn create_index_spins_up_a_live_lexical_index() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ServerContext::new(dir.path(), dir.path().join("models")).unwrap();
        ctx.create_index(index_definition("hotels")).unwrap();
        let len = ctx.with_index("hotels", |index, _| index.len());
        assert_eq!(len, Some(0));
    }

    #[test]
    fn reopening_context_rebuilds_indexes_from_catalog() {
        let dir = tempfile::tempdir().unwrap();
        {
            let ctx = ServerContext::new(dir.path(), dir.path().join("models")).unwrap();
            ctx.create_index(index_definition("hotels")).unwrap();
        }
        let ctx = ServerContext::new(dir.path(), dir.path().join("models")).unwrap();
        assert!(ctx.with_index("hotels", |_, _| ()).is_some());
    }

    #[test]
    fn concurrent_indexer_run_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = ServerContext::new(dir.path(), dir.path().join("models")).unwrap();
        ctx.try_begin_indexer_run("idx").unwrap();
        let err = ctx.try_begin_indexer_run("idx").unwrap_err();
        assert!(matches!(err, ApiError::Conflict(_)));
        ctx.end_indexer_run("idx");
        ctx.try_begin_indexer_run("idx").unwrap();
    }

    fn target_definition(name: &str) -> IndexDefinition {
        IndexDefinition::new(
            name,
            vec![
                Field::new("id", FieldType::Primitive(PrimitiveType::String), FieldFlags { key: true, retrievable: true, ..Default::default() }),
                Field::new("content", FieldType::Primitive(PrimitiveType::String), FieldFlags { searchable: true, retrievable: true, ..Default::default() }),
            ],
        )
    }

    #[tokio::test]
    async fn run_indexer_pulls_from_filesystem_into_the_live_target_index() {
        use crate::datasource::{Container, DataSourceDefinition, DataSourceType};
        use crate::indexer::{FieldMapping, IndexerDefinition, IndexerParameters};

        let data_dir = tempfile::tempdir().unwrap();
        let source_dir = tempfile::tempdir().unwrap();
        std::fs::write(source_dir.path().join("a.txt"), b"hello world").unwrap();

        let ctx = ServerContext::new(data_dir.path(), data_dir.path().join("models")).unwrap();
        ctx.create_index(target_definition("chunks")).unwrap();

        let data_source = ctx
            .data_sources
            .create(DataSourceDefinition::new("fs", DataSourceType::Filesystem, Container { name: source_dir.path().to_string_lossy().to_string(), query: None }))
            .unwrap();
        let mut indexer = IndexerDefinition::new("idx", "fs", "chunks");
        indexer.field_mappings.push(FieldMapping { source_field_name: "content".to_string(), target_field_name: "content".to_string(), mapping_function: None });
        indexer.parameters = IndexerParameters { batch_size: 10, max_failed_items: -1 };
        let indexer = ctx.indexers.create(indexer).unwrap();

        ctx.try_begin_indexer_run("idx").unwrap();
        let result = ctx.run_indexer(&indexer, &data_source, None).await.unwrap();
        ctx.end_indexer_run("idx");

        assert_eq!(result.items_processed, 1);
        assert_eq!(ctx.with_index("chunks", |index, _| index.len()), Some(1));
    }
}
