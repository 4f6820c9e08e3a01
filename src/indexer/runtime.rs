//! The indexer `run` loop (spec.md §4.12): pull → crack → enrich → skill
//! pipeline → project → write, with a bounded-failure abort and a
//! `finalTrackingState` recorded on every run.

use super::types::{ExecutionResult, IndexerDefinition};
use crate::catalog::IndexDefinition;
use crate::cracker;
use crate::datasource::{list_documents, DataSourceDefinition, DataSourceType, SourceDocument};
use crate::docwrite::{index_documents, ActionType, DocumentAction};
use crate::enrich::EnrichedDocument;
use crate::indexer::types::{MappingFunction, Skillset};
use crate::lexical::LexicalIndex;
use crate::pipeline;
use crate::skills::SkillRunContext;
use crate::value::{Document, Value};
use crate::vector::VectorStore;
use chrono::Utc;
use std::collections::HashMap;

/// The resources one `run()` call needs, gathered by the server context
/// from the catalog before invoking the runtime (spec.md §9 "cyclic
/// references... resolve by indirection: components reference resources
/// by name").
pub struct IndexerRunDeps<'a> {
    pub indexer: &'a IndexerDefinition,
    pub data_source: &'a DataSourceDefinition,
    pub target_definition: &'a IndexDefinition,
    pub target_index: &'a mut LexicalIndex,
    pub target_vector_stores: &'a HashMap<String, VectorStore>,
    pub skillset: Option<&'a Skillset>,
    pub skill_ctx: &'a SkillRunContext,
    pub previous_high_water_mark: Option<String>,
}

fn container_path(source_field_name: &str) -> (String, String) {
    match source_field_name.find("/*") {
        Some(pos) => (source_field_name[..pos + 2].to_string(), source_field_name[pos + 2..].to_string()),
        None => (String::new(), source_field_name.to_string()),
    }
}

fn apply_mapping(value: &Value, mapping_function: &Option<MappingFunction>) -> Value {
    match (value, mapping_function) {
        (Value::Str(s), Some(f)) => Value::Str(f.apply(s)),
        _ => value.clone(),
    }
}

fn seed_enriched_document(source_doc: &SourceDocument, cracked: &cracker::CrackResult) -> EnrichedDocument {
    let mut enriched = EnrichedDocument::new();
    enriched.set("/document/key", Value::Str(source_doc.key.clone()));
    enriched.set("/document/content", Value::Str(cracked.content.clone()));
    for (k, v) in &source_doc.metadata {
        enriched.set(&format!("/document/{k}"), Value::Str(v.clone()));
    }
    if let Some(title) = &cracked.title {
        enriched.set("/document/title", Value::Str(title.clone()));
    }
    if let Some(language) = &cracked.language {
        enriched.set("/document/language", Value::Str(language.clone()));
    }
    enriched
}

const INTERNAL_ENRICHED_KEYS: &[&str] = &["key"];

fn build_target_documents(target_definition: &IndexDefinition, source_doc: &SourceDocument, enriched: &EnrichedDocument, indexer: &IndexerDefinition) -> Vec<Document> {
    let key_field_name = target_definition.key_field().map(|f| f.name.clone()).unwrap_or_else(|| "id".to_string());

    let mut base = Document::new();
    let key_overridden = indexer.field_mappings.iter().any(|m| m.target_field_name == key_field_name);
    if !key_overridden {
        base.insert(key_field_name.clone(), Value::Str(source_doc.key.clone()));
    }

    if let Some(Value::Map(top)) = enriched.get("/document") {
        for (k, v) in top {
            if INTERNAL_ENRICHED_KEYS.contains(&k.as_str()) {
                continue;
            }
            if let Some(target_field) = target_definition.field(k) {
                base.insert(target_field.name.clone(), v.clone());
            }
        }
    }

    for mapping in &indexer.field_mappings {
        if let Some(value) = enriched.get(&format!("/document/{}", mapping.source_field_name)) {
            base.insert(mapping.target_field_name.clone(), apply_mapping(value, &mapping.mapping_function));
        }
    }

    let wildcard_mapping = indexer.output_field_mappings.iter().find(|m| m.source_field_name.contains("/*"));
    match wildcard_mapping {
        None => {
            let mut doc = base;
            for mapping in &indexer.output_field_mappings {
                if let Some(value) = enriched.get(&mapping.source_field_name) {
                    doc.insert(mapping.target_field_name.clone(), apply_mapping(value, &mapping.mapping_function));
                }
            }
            vec![doc]
        }
        Some(first) => {
            let (container, _) = container_path(&first.source_field_name);
            let contexts = enriched.matching_contexts(&container);
            contexts
                .into_iter()
                .enumerate()
                .map(|(i, context)| {
                    let mut doc = base.clone();
                    doc.insert(key_field_name.clone(), Value::Str(format!("{}-{}", source_doc.key, i)));
                    for mapping in &indexer.output_field_mappings {
                        let (m_container, remainder) = container_path(&mapping.source_field_name);
                        let path = if m_container == container { format!("{context}{remainder}") } else { mapping.source_field_name.clone() };
                        if let Some(value) = enriched.get(&path) {
                            doc.insert(mapping.target_field_name.clone(), apply_mapping(value, &mapping.mapping_function));
                        }
                    }
                    doc
                })
                .collect()
        }
    }
}

/// Executes one indexer run to completion (or to the failure bound) and
/// returns the execution result; the caller is responsible for appending
/// it to the indexer's status history.
pub async fn run(mut deps: IndexerRunDeps<'_>) -> ExecutionResult {
    let start_time = Utc::now();
    let mut result = ExecutionResult { start_time: Some(start_time), initial_tracking_state: deps.previous_high_water_mark.clone(), ..Default::default() };

    if deps.data_source.source_type != DataSourceType::Filesystem {
        result.errors.push(format!("data source type {:?} has no local driver; only filesystem is supported", deps.data_source.source_type));
        result.end_time = Some(Utc::now());
        result.final_tracking_state = deps.previous_high_water_mark;
        return result;
    }

    let root = std::path::PathBuf::from(&deps.data_source.container.name);
    let documents = match list_documents(&root, deps.previous_high_water_mark.as_deref()) {
        Ok(docs) => docs,
        Err(e) => {
            result.errors.push(format!("failed to list source documents: {e}"));
            result.end_time = Some(Utc::now());
            result.final_tracking_state = deps.previous_high_water_mark;
            return result;
        }
    };

    let max_failed = deps.indexer.parameters.max_failed_items;

    'documents: for source_doc in &documents {
        if deps.skill_ctx.cancellation.is_cancelled() {
            result.warnings.push("run cancelled before completion".to_string());
            break;
        }

        let cracked = cracker::crack(&source_doc.bytes, &source_doc.name, source_doc.content_type.as_deref());
        if !cracked.success {
            result.items_failed += 1;
            result.errors.push(format!("{}: {}", source_doc.name, cracked.error_message.clone().unwrap_or_default()));
            if exceeds_failure_bound(result.items_failed, max_failed) {
                break;
            }
            continue;
        }

        let mut enriched = seed_enriched_document(source_doc, &cracked);

        if let Some(skillset) = deps.skillset {
            let pipeline_result = pipeline::run(&skillset.skills, &mut enriched, deps.skill_ctx).await;
            if pipeline_result.halted_at.is_some() {
                result.items_failed += 1;
                result.errors.push(format!("{}: skill pipeline halted: {}", source_doc.name, pipeline_result.errors().join("; ")));
                if exceeds_failure_bound(result.items_failed, max_failed) {
                    break 'documents;
                }
                continue;
            }
            result.warnings.extend(pipeline_result.warnings().into_iter().map(str::to_string));
        }

        let target_docs = build_target_documents(deps.target_definition, source_doc, &enriched, deps.indexer);
        let actions: Vec<DocumentAction> = target_docs.into_iter().map(|document| DocumentAction { action: ActionType::MergeOrUpload, document }).collect();
        let doc_results = index_documents(deps.target_definition, deps.target_index, deps.target_vector_stores, actions);

        for doc_result in &doc_results {
            if doc_result.status {
                result.items_processed += 1;
            } else {
                result.items_failed += 1;
                result.errors.push(format!("{}: {}", doc_result.key, doc_result.error_message.clone().unwrap_or_default()));
            }
        }

        if exceeds_failure_bound(result.items_failed, max_failed) {
            break;
        }
    }

    result.end_time = Some(Utc::now());
    result.final_tracking_state = Some(Utc::now().to_rfc3339());
    result
}

fn exceeds_failure_bound(failed: u64, max_failed_items: i64) -> bool {
    max_failed_items >= 0 && failed as i64 > max_failed_items
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::AnalyzerRegistry;
    use crate::catalog::{Field, FieldFlags, FieldType, PrimitiveType};
    use crate::datasource::Container;
    use crate::indexer::types::{FieldMapping, IndexerParameters, OutputFieldMapping};
    use crate::skills::{Skill, SkillInput, SkillKind, SkillOutput, SplitTextConfig, TextSplitMode};

    fn target_definition() -> IndexDefinition {
        IndexDefinition::new(
            "chunks",
            vec![
                Field::new("id", FieldType::Primitive(PrimitiveType::String), FieldFlags { key: true, retrievable: true, ..Default::default() }),
                Field::new("content", FieldType::Primitive(PrimitiveType::String), FieldFlags { searchable: true, retrievable: true, ..Default::default() }),
            ],
        )
    }

    #[tokio::test]
    async fn filesystem_run_ingests_every_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"hello world").unwrap();
        std::fs::write(dir.path().join("b.txt"), b"second file").unwrap();

        let data_source = DataSourceDefinition::new("fs", DataSourceType::Filesystem, Container { name: dir.path().to_string_lossy().to_string(), query: None });
        let mut indexer = IndexerDefinition::new("idx", "fs", "chunks");
        indexer.field_mappings.push(FieldMapping { source_field_name: "content".to_string(), target_field_name: "content".to_string(), mapping_function: None });
        indexer.parameters = IndexerParameters { batch_size: 10, max_failed_items: -1 };

        let def = target_definition();
        let mut index = LexicalIndex::new(def.clone(), AnalyzerRegistry::new());
        let vector_stores = HashMap::new();
        let skill_ctx = SkillRunContext::new("./models");

        let deps = IndexerRunDeps {
            indexer: &indexer,
            data_source: &data_source,
            target_definition: &def,
            target_index: &mut index,
            target_vector_stores: &vector_stores,
            skillset: None,
            skill_ctx: &skill_ctx,
            previous_high_water_mark: None,
        };

        let result = run(deps).await;
        assert_eq!(result.items_processed, 2);
        assert_eq!(result.items_failed, 0);
        assert!(result.final_tracking_state.is_some());
        assert_eq!(index.len(), 2);
    }

    #[tokio::test]
    async fn reset_then_run_reingests_regardless_of_prior_mark() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"hello").unwrap();

        let data_source = DataSourceDefinition::new("fs", DataSourceType::Filesystem, Container { name: dir.path().to_string_lossy().to_string(), query: None });
        let mut indexer = IndexerDefinition::new("idx", "fs", "chunks");
        indexer.field_mappings.push(FieldMapping { source_field_name: "content".to_string(), target_field_name: "content".to_string(), mapping_function: None });
        indexer.parameters = IndexerParameters { batch_size: 10, max_failed_items: -1 };

        let def = target_definition();
        let mut index = LexicalIndex::new(def.clone(), AnalyzerRegistry::new());
        let vector_stores = HashMap::new();
        let skill_ctx = SkillRunContext::new("./models");

        let far_future = (Utc::now() + chrono::Duration::days(365)).to_rfc3339();
        let deps = IndexerRunDeps {
            indexer: &indexer,
            data_source: &data_source,
            target_definition: &def,
            target_index: &mut index,
            target_vector_stores: &vector_stores,
            skillset: None,
            skill_ctx: &skill_ctx,
            previous_high_water_mark: Some(far_future),
        };
        let result = run(deps).await;
        assert_eq!(result.items_processed, 0);

        // reset() clears the mark so the next run re-ingests everything.
        let deps = IndexerRunDeps {
            indexer: &indexer,
            data_source: &data_source,
            target_definition: &def,
            target_index: &mut index,
            target_vector_stores: &vector_stores,
            skillset: None,
            skill_ctx: &skill_ctx,
            previous_high_water_mark: None,
        };
        let result = run(deps).await;
        assert_eq!(result.items_processed, 1);
    }

    #[tokio::test]
    async fn skillset_chunking_fans_out_into_one_document_per_chunk() {
        let dir = tempfile::tempdir().unwrap();
        let content: String = "word ".repeat(70); // ~350 chars
        std::fs::write(dir.path().join("doc.txt"), content.as_bytes()).unwrap();

        let data_source = DataSourceDefinition::new("fs", DataSourceType::Filesystem, Container { name: dir.path().to_string_lossy().to_string(), query: None });

        let mut split = Skill::new("/document", SkillKind::Split(SplitTextConfig { mode: TextSplitMode::Pages, maximum_page_length: 100, page_overlap_length: 0 }));
        split.inputs.push(SkillInput { name: "text".into(), source: "content".into() });
        split.outputs.push(SkillOutput { name: "textItems".into(), target_name: None });
        let skillset = Skillset::new("ss", vec![split]);

        let mut indexer = IndexerDefinition::new("idx", "fs", "chunks");
        indexer.skillset_name = Some("ss".to_string());
        indexer.output_field_mappings.push(OutputFieldMapping {
            source_field_name: "/document/textItems/*/text".to_string(),
            target_field_name: "content".to_string(),
            mapping_function: None,
        });
        indexer.parameters = IndexerParameters { batch_size: 10, max_failed_items: -1 };

        let def = target_definition();
        let mut index = LexicalIndex::new(def.clone(), AnalyzerRegistry::new());
        let vector_stores = HashMap::new();
        let skill_ctx = SkillRunContext::new("./models");

        let deps = IndexerRunDeps {
            indexer: &indexer,
            data_source: &data_source,
            target_definition: &def,
            target_index: &mut index,
            target_vector_stores: &vector_stores,
            skillset: Some(&skillset),
            skill_ctx: &skill_ctx,
            previous_high_water_mark: None,
        };

        let result = run(deps).await;
        assert_eq!(result.items_processed, 4);
        assert_eq!(index.len(), 4);
    }
}
