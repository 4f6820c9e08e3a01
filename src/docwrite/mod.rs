//! Document write path (spec.md §4.8): applies upload/merge/mergeOrUpload/
//! delete actions atomically across the lexical and vector stores, one
//! per-document result per action, in request order.

use crate::catalog::IndexDefinition;
use crate::lexical::LexicalIndex;
use crate::value::{Document, Value};
use crate::vector::VectorStore;
use std::collections::HashMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActionType {
    Upload,
    Merge,
    MergeOrUpload,
    Delete,
}

#[derive(Debug, Clone)]
pub struct DocumentAction {
    pub action: ActionType,
    pub document: Document,
}

#[derive(Debug, Clone)]
pub struct DocResult {
    pub key: String,
    pub status: bool,
    pub status_code: u16,
    pub error_message: Option<String>,
}

fn extract_key(definition: &IndexDefinition, document: &Document) -> Result<String, String> {
    let key_field = definition.key_field().ok_or_else(|| "index has no key field".to_string())?;
    document
        .get(&key_field.name)
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| format!("document is missing key field '{}'", key_field.name))
}

fn sync_vector_fields(definition: &IndexDefinition, vector_stores: &HashMap<String, VectorStore>, key: &str, document: &Document) {
    for field in definition.fields.iter().filter(|f| f.is_vector()) {
        if let Some(store) = vector_stores.get(&field.name) {
            if let Some(Value::Vector(vec)) = document.get(&field.name) {
                store.upsert(key.to_string(), vec.clone());
            }
        }
    }
}

fn delete_vector_fields(vector_stores: &HashMap<String, VectorStore>, key: &str) {
    for store in vector_stores.values() {
        store.delete(key);
    }
}

/// Applies `actions` in order, returning one result per action
/// (spec.md §5 "actions are applied in request order; the per-doc results
/// preserve that order").
pub fn index_documents(
    definition: &IndexDefinition,
    index: &mut LexicalIndex,
    vector_stores: &HashMap<String, VectorStore>,
    actions: Vec<DocumentAction>,
) -> Vec<DocResult> {
    let mut results = Vec::with_capacity(actions.len());

    for action in actions {
        let key = match extract_key(definition, &action.document) {
            Ok(k) => k,
            Err(message) => {
                results.push(DocResult { key: String::new(), status: false, status_code: 400, error_message: Some(message) });
                continue;
            }
        };

        let result = match action.action {
            ActionType::Upload => {
                sync_vector_fields(definition, vector_stores, &key, &action.document);
                match index.upsert(action.document) {
                    Ok(_) => DocResult { key: key.clone(), status: true, status_code: 200, error_message: None },
                    Err(e) => DocResult { key: key.clone(), status: false, status_code: 400, error_message: Some(e.to_string()) },
                }
            }
            ActionType::Merge => {
                if !index.contains(&key) {
                    DocResult {
                        key: key.clone(),
                        status: false,
                        status_code: 404,
                        error_message: Some(format!("document '{key}' does not exist")),
                    }
                } else {
                    sync_vector_fields(definition, vector_stores, &key, &action.document);
                    match index.merge(&key, action.document) {
                        Ok(()) => DocResult { key: key.clone(), status: true, status_code: 200, error_message: None },
                        Err(e) => DocResult { key: key.clone(), status: false, status_code: 400, error_message: Some(e.to_string()) },
                    }
                }
            }
            ActionType::MergeOrUpload => {
                sync_vector_fields(definition, vector_stores, &key, &action.document);
                let outcome = if index.contains(&key) { index.merge(&key, action.document) } else { index.upsert(action.document).map(|_| ()) };
                match outcome {
                    Ok(()) => DocResult { key: key.clone(), status: true, status_code: 200, error_message: None },
                    Err(e) => DocResult { key: key.clone(), status: false, status_code: 400, error_message: Some(e.to_string()) },
                }
            }
            ActionType::Delete => {
                index.delete(&key);
                delete_vector_fields(vector_stores, &key);
                DocResult { key: key.clone(), status: true, status_code: 200, error_message: None }
            }
        };
        results.push(result);
    }

    index.commit();
    results
}

/// Whether every result in a batch succeeded (HTTP 200) or is mixed
/// (HTTP 207), per spec.md §4.8.
pub fn all_succeeded(results: &[DocResult]) -> bool {
    results.iter().all(|r| r.status)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::AnalyzerRegistry;
    use crate::catalog::{Field, FieldFlags, FieldType, PrimitiveType};

    fn definition() -> IndexDefinition {
        IndexDefinition::new(
            "docs",
            vec![
                Field::new("id", FieldType::Primitive(PrimitiveType::String), FieldFlags { key: true, retrievable: true, ..Default::default() }),
                Field::new("title", FieldType::Primitive(PrimitiveType::String), FieldFlags { searchable: true, retrievable: true, ..Default::default() }),
            ],
        )
    }

    fn doc(id: &str, title: &str) -> Document {
        let mut d = Document::new();
        d.insert("id".into(), Value::Str(id.to_string()));
        d.insert("title".into(), Value::Str(title.to_string()));
        d
    }

    #[test]
    fn merge_on_missing_document_fails_without_aborting_batch() {
        let def = definition();
        let mut index = LexicalIndex::new(def.clone(), AnalyzerRegistry::new());
        let actions = vec![
            DocumentAction { action: ActionType::Merge, document: doc("missing", "x") },
            DocumentAction { action: ActionType::Upload, document: doc("1", "ok") },
        ];
        let results = index_documents(&def, &mut index, &HashMap::new(), actions);
        assert!(!results[0].status);
        assert_eq!(results[0].status_code, 404);
        assert!(results[1].status);
        assert!(index.contains("1"));
    }

    #[test]
    fn delete_of_never_inserted_key_succeeds() {
        let def = definition();
        let mut index = LexicalIndex::new(def.clone(), AnalyzerRegistry::new());
        let results = index_documents(&def, &mut index, &HashMap::new(), vec![DocumentAction { action: ActionType::Delete, document: doc("ghost", "") }]);
        assert!(results[0].status);
    }

    #[test]
    fn merge_or_upload_is_idempotent() {
        let def = definition();
        let mut index = LexicalIndex::new(def.clone(), AnalyzerRegistry::new());
        for _ in 0..2 {
            index_documents(&def, &mut index, &HashMap::new(), vec![DocumentAction { action: ActionType::MergeOrUpload, document: doc("1", "same") }]);
        }
        assert_eq!(index.len(), 1);
    }
}
