//! Per-index inverted index: lexical postings, doc-values, stored fields
//! and BM25/Classic scoring (spec.md §4.2).

use super::highlight::build_snippet;
use super::query::{Clause, ParsedQuery, Polarity};
use super::similarity::score_term;
use crate::analyzer::AnalyzerRegistry;
use crate::catalog::{Field, FieldType, IndexDefinition, PrimitiveType};
use crate::error::{ApiError, FieldError};
use crate::value::{to_json, Document, Value};
use std::collections::{BTreeMap, HashMap, HashSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchMode {
    Any,
    All,
}

#[derive(Debug, Clone, Default)]
pub struct FieldFeature {
    pub unique_token_matches: usize,
    pub similarity_score: f64,
    pub term_frequency: usize,
}

#[derive(Debug, Clone)]
pub struct SearchHit {
    pub key: String,
    pub score: f64,
    pub features: HashMap<String, FieldFeature>,
}

#[derive(Debug, Clone, Default)]
struct Posting {
    term_freq: u32,
    /// Token ordinal positions, used for phrase matching.
    positions: Vec<usize>,
    /// Byte offsets of each occurrence, used for highlighting.
    offsets: Vec<(usize, usize)>,
}

#[derive(Debug, Clone, Default)]
struct StoredDoc {
    document: Document,
    field_token_counts: HashMap<String, usize>,
}

/// The sidecar doc-value field name used when a field is both `searchable`
/// and `filterable|sortable|facetable` (spec.md §4.2 "the same field name
/// twice" trap, §9 redesign note).
pub fn doc_value_field_name(field: &Field) -> String {
    if field.flags.searchable && (field.flags.filterable || field.flags.sortable || field.flags.facetable) {
        format!("{}__kw", field.name)
    } else {
        field.name.clone()
    }
}

pub struct LexicalIndex {
    pub definition: IndexDefinition,
    analyzers: AnalyzerRegistry,
    docs: HashMap<String, StoredDoc>,
    /// field -> term -> doc key -> posting
    postings: HashMap<String, HashMap<String, HashMap<String, Posting>>>,
    /// doc-value field name -> doc key -> value
    doc_values: HashMap<String, HashMap<String, Value>>,
    avg_field_len: HashMap<String, f64>,
}

impl LexicalIndex {
    pub fn new(definition: IndexDefinition, analyzers: AnalyzerRegistry) -> Self {
        Self {
            definition,
            analyzers,
            docs: HashMap::new(),
            postings: HashMap::new(),
            doc_values: HashMap::new(),
            avg_field_len: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.docs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.docs.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.docs.contains_key(key)
    }

    pub fn key_field_name(&self) -> Option<String> {
        self.definition.key_field().map(|f| f.name.clone())
    }

    fn extract_key(&self, doc: &Document) -> Result<String, ApiError> {
        let key_field = self.definition.key_field().ok_or_else(|| {
            ApiError::InternalError("index definition has no key field".to_string())
        })?;
        match doc.get(&key_field.name) {
            Some(Value::Str(s)) if !s.is_empty() => Ok(s.clone()),
            _ => Err(ApiError::validation(vec![FieldError::new(
                key_field.name.clone(),
                "document is missing a non-empty key value",
            )])),
        }
    }

    /// Removes every index/doc-value/postings trace of `key`.
    fn purge(&mut self, key: &str) {
        if self.docs.remove(key).is_none() {
            return;
        }
        for per_term in self.postings.values_mut() {
            for per_doc in per_term.values_mut() {
                per_doc.remove(key);
            }
        }
        for per_doc in self.doc_values.values_mut() {
            per_doc.remove(key);
        }
    }

    /// Full replace of a document under its key (spec.md §4.2 "upsert").
    pub fn upsert(&mut self, doc: Document) -> Result<String, ApiError> {
        let key = self.extract_key(&doc)?;
        self.purge(&key);
        self.encode(&key, &doc)?;
        Ok(key)
    }

    /// Merge-patch: missing document is an error, null values erase a
    /// field, provided fields replace (collections replace, never append
    /// — §9 Open Questions).
    pub fn merge(&mut self, key: &str, patch: Document) -> Result<(), ApiError> {
        let mut existing = self
            .docs
            .get(key)
            .map(|d| d.document.clone())
            .ok_or_else(|| ApiError::NotFound(key.to_string()))?;
        for (field, value) in patch {
            if matches!(value, Value::Null) {
                existing.remove(&field);
            } else {
                existing.insert(field, value);
            }
        }
        self.purge(key);
        self.encode(key, &existing)?;
        Ok(())
    }

    /// Removes a document by key; missing keys succeed as no-ops.
    pub fn delete(&mut self, key: &str) {
        self.purge(key);
    }

    /// Eager per-batch commit: recompute average field lengths used by
    /// BM25 length normalization. Changing similarity also calls this.
    pub fn commit(&mut self) {
        let mut sums: HashMap<String, (usize, usize)> = HashMap::new();
        for doc in self.docs.values() {
            for (field, len) in &doc.field_token_counts {
                let entry = sums.entry(field.clone()).or_insert((0, 0));
                entry.0 += len;
                entry.1 += 1;
            }
        }
        self.avg_field_len = sums
            .into_iter()
            .map(|(field, (total, count))| {
                (field, if count > 0 { total as f64 / count as f64 } else { 0.0 })
            })
            .collect();
    }

    fn encode(&mut self, key: &str, doc: &Document) -> Result<(), ApiError> {
        let mut stored = StoredDoc::default();
        self.encode_fields(key, doc, &self.definition.fields.clone(), "", &mut stored)?;
        self.docs.insert(key.to_string(), stored);
        Ok(())
    }

    fn encode_fields(
        &mut self,
        key: &str,
        doc: &Document,
        fields: &[Field],
        path_prefix: &str,
        stored: &mut StoredDoc,
    ) -> Result<(), ApiError> {
        for field in fields {
            let Some(value) = doc.get(&field.name) else {
                continue;
            };
            let full_path = if path_prefix.is_empty() {
                field.name.clone()
            } else {
                format!("{path_prefix}/{}", field.name)
            };

            if field.flags.stored || field.flags.retrievable || field.flags.key {
                stored.document.insert(field.name.clone(), value.clone());
            }

            if let FieldType::Complex(nested_fields) = &field.field_type {
                if let Some(nested_map) = value.as_map() {
                    let nested_doc: Document = nested_map.clone().into_iter().collect();
                    self.encode_fields(key, &nested_doc, nested_fields, &full_path, stored)?;
                }
                continue;
            }

            if field.is_vector() {
                // Vector values are stored but not searchable; the vector
                // store itself is populated by the document write path.
                continue;
            }

            if field.flags.searchable {
                let analyzer = self.analyzers.resolve(field.index_time_analyzer());
                let text = value.to_display_string();
                let tokens = analyzer(&text);
                stored
                    .field_token_counts
                    .insert(field.name.clone(), tokens.len());
                let per_term = self.postings.entry(field.name.clone()).or_default();
                for tok in &tokens {
                    let per_doc = per_term.entry(tok.text.clone()).or_default();
                    let posting = per_doc.entry(key.to_string()).or_default();
                    posting.term_freq += 1;
                    posting.positions.push(tok.position);
                    posting.offsets.push((tok.start, tok.end));
                }
            }

            if field.flags.filterable || field.flags.sortable || field.flags.facetable || field.flags.key {
                let dv_name = doc_value_field_name(field);
                self.doc_values
                    .entry(dv_name)
                    .or_default()
                    .insert(key.to_string(), value.clone());
            }

            if field.flags.key {
                // Keyword term for exact key lookups via the query path.
                let per_term = self.postings.entry(field.name.clone()).or_default();
                let text = value.to_display_string();
                let per_doc = per_term.entry(text).or_default();
                per_doc.insert(
                    key.to_string(),
                    Posting {
                        term_freq: 1,
                        positions: vec![0],
                        offsets: vec![(0, value.to_display_string().len())],
                    },
                );
            }
        }
        Ok(())
    }

    pub fn get(&self, key: &str) -> Option<Document> {
        self.docs.get(key).map(|d| d.document.clone())
    }

    pub fn doc_value(&self, field_name: &str, key: &str) -> Option<&Value> {
        self.doc_values.get(field_name)?.get(key)
    }

    pub fn all_doc_values(&self, field_name: &str) -> Option<&HashMap<String, Value>> {
        self.doc_values.get(field_name)
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.docs.keys()
    }

    fn searchable_fields(&self, restrict: Option<&[String]>) -> Vec<&Field> {
        self.definition
            .fields
            .iter()
            .filter(|f| f.flags.searchable)
            .filter(|f| restrict.map(|r| r.iter().any(|n| n == &f.name)).unwrap_or(true))
            .collect()
    }

    fn doc_set_for_term(&self, field: &str, term: &str) -> HashSet<String> {
        self.postings
            .get(field)
            .and_then(|t| t.get(term))
            .map(|docs| docs.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn doc_set_for_phrase(&self, field: &str, terms: &[String]) -> HashSet<String> {
        let Some(per_term) = self.postings.get(field) else {
            return HashSet::new();
        };
        let Some(first) = per_term.get(&terms[0]) else {
            return HashSet::new();
        };
        let mut matches = HashSet::new();
        'doc: for (key, posting) in first {
            for &pos in &posting.positions {
                let mut ok = true;
                for (offset, term) in terms.iter().enumerate().skip(1) {
                    let expected_pos = pos + offset;
                    let contains = per_term
                        .get(term)
                        .and_then(|docs| docs.get(key))
                        .map(|p| p.positions.contains(&expected_pos))
                        .unwrap_or(false);
                    if !contains {
                        ok = false;
                        break;
                    }
                }
                if ok {
                    matches.insert(key.clone());
                    continue 'doc;
                }
            }
        }
        matches
    }

    /// Executes a parsed query, scoring with the index's configured
    /// similarity and honoring `search_mode`, per-field weights (from
    /// scoring-profile text weights and `^N` search-field weighting), and
    /// an optional restriction to the filter's candidate key set.
    pub fn search(
        &self,
        query: &ParsedQuery,
        search_fields: Option<&[String]>,
        field_weights: &BTreeMap<String, f64>,
        search_mode: SearchMode,
        candidate_keys: Option<&HashSet<String>>,
        features_enabled: bool,
    ) -> Vec<SearchHit> {
        let total_docs = self.docs.len();
        let fields = self.searchable_fields(search_fields);

        if query.match_all {
            let mut hits: Vec<SearchHit> = self
                .docs
                .keys()
                .filter(|k| candidate_keys.map(|c| c.contains(*k)).unwrap_or(true))
                .map(|k| SearchHit {
                    key: k.clone(),
                    score: 1.0,
                    features: HashMap::new(),
                })
                .collect();
            hits.sort_by(|a, b| a.key.cmp(&b.key));
            return hits;
        }

        let mut must_sets: Vec<HashSet<String>> = Vec::new();
        let mut must_not: HashSet<String> = HashSet::new();
        let mut should_sets: Vec<HashSet<String>> = Vec::new();
        let mut scores: HashMap<String, f64> = HashMap::new();
        let mut features: HashMap<String, HashMap<String, FieldFeature>> = HashMap::new();

        for clause in &query.clauses {
            let (polarity, clause_fields, accumulate): (Polarity, Vec<&Field>, Box<dyn Fn(&Field) -> HashSet<String>>) =
                match clause {
                    Clause::Term { text, polarity, field } => {
                        let clause_fields: Vec<&Field> = match field {
                            Some(name) => fields.iter().copied().filter(|f| &f.name == name).collect(),
                            None => fields.clone(),
                        };
                        let text = text.clone();
                        (*polarity, clause_fields, Box::new(move |f: &Field| self.doc_set_for_term(&f.name, &text)))
                    }
                    Clause::Phrase { terms, polarity, field } => {
                        let clause_fields: Vec<&Field> = match field {
                            Some(name) => fields.iter().copied().filter(|f| &f.name == name).collect(),
                            None => fields.clone(),
                        };
                        let terms = terms.clone();
                        (*polarity, clause_fields, Box::new(move |f: &Field| self.doc_set_for_phrase(&f.name, &terms)))
                    }
                };

            let mut clause_docs: HashSet<String> = HashSet::new();
            for field in clause_fields.iter().copied() {
                let field_docs = accumulate(field);
                let weight = field_weights.get(&field.name).copied().unwrap_or(1.0);
                for key in &field_docs {
                    let term_freq = self.term_freq_for(clause, field, key);
                    let doc_len = self
                        .docs
                        .get(key)
                        .and_then(|d| d.field_token_counts.get(&field.name))
                        .copied()
                        .unwrap_or(0);
                    let avg_len = self.avg_field_len.get(&field.name).copied().unwrap_or(0.0);
                    let df = self.doc_freq_for(clause, field);
                    let contribution = weight
                        * score_term(&self.definition.similarity, term_freq, doc_len, avg_len, df, total_docs);
                    *scores.entry(key.clone()).or_insert(0.0) += contribution;

                    if features_enabled {
                        let entry = features
                            .entry(key.clone())
                            .or_default()
                            .entry(field.name.clone())
                            .or_default();
                        entry.unique_token_matches += 1;
                        entry.similarity_score += contribution;
                        entry.term_frequency += term_freq as usize;
                    }
                }
                clause_docs.extend(field_docs);
            }

            match polarity {
                Polarity::Must => must_sets.push(clause_docs),
                Polarity::MustNot => must_not.extend(clause_docs),
                Polarity::Should => should_sets.push(clause_docs),
            }
        }

        let mut result_keys: HashSet<String> = if !must_sets.is_empty() {
            must_sets
                .into_iter()
                .reduce(|a, b| a.intersection(&b).cloned().collect())
                .unwrap_or_default()
        } else if !should_sets.is_empty() {
            match search_mode {
                SearchMode::Any => should_sets
                    .iter()
                    .fold(HashSet::new(), |mut acc, s| {
                        acc.extend(s.iter().cloned());
                        acc
                    }),
                SearchMode::All => should_sets
                    .into_iter()
                    .reduce(|a, b| a.intersection(&b).cloned().collect())
                    .unwrap_or_default(),
            }
        } else {
            HashSet::new()
        };

        for key in &must_not {
            result_keys.remove(key);
        }

        if let Some(candidates) = candidate_keys {
            result_keys.retain(|k| candidates.contains(k));
        }

        let mut hits: Vec<SearchHit> = result_keys
            .into_iter()
            .map(|key| {
                let score = scores.get(&key).copied().unwrap_or(0.0);
                let feats = features.remove(&key).unwrap_or_default();
                SearchHit { key, score, features: feats }
            })
            .collect();
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap().then_with(|| a.key.cmp(&b.key)));
        hits
    }

    fn term_freq_for(&self, clause: &Clause, field: &Field, key: &str) -> u32 {
        match clause {
            Clause::Term { text, .. } => self
                .postings
                .get(&field.name)
                .and_then(|t| t.get(text))
                .and_then(|d| d.get(key))
                .map(|p| p.term_freq)
                .unwrap_or(0),
            Clause::Phrase { terms, .. } => terms
                .iter()
                .map(|t| {
                    self.postings
                        .get(&field.name)
                        .and_then(|pt| pt.get(t))
                        .and_then(|d| d.get(key))
                        .map(|p| p.term_freq)
                        .unwrap_or(0)
                })
                .min()
                .unwrap_or(0),
        }
    }

    fn doc_freq_for(&self, clause: &Clause, field: &Field) -> usize {
        match clause {
            Clause::Term { text, .. } => self
                .postings
                .get(&field.name)
                .and_then(|t| t.get(text))
                .map(|d| d.len())
                .unwrap_or(0),
            Clause::Phrase { terms, .. } => terms
                .first()
                .and_then(|t| self.postings.get(&field.name).and_then(|pt| pt.get(t)))
                .map(|d| d.len())
                .unwrap_or(0),
        }
    }

    /// Highlight offsets (byte ranges) for every occurrence of any query
    /// term within `field` for `key`, used to build `@search.highlights`.
    pub fn highlight(&self, query: &ParsedQuery, field: &str, key: &str, pre: &str, post: &str) -> Option<String> {
        let stored = self.docs.get(key)?;
        let value = stored.document.get(field)?;
        let text = value.as_str()?;

        let mut offsets: Vec<(usize, usize)> = Vec::new();
        for clause in &query.clauses {
            let terms: Vec<&str> = match clause {
                Clause::Term { text, .. } => vec![text.as_str()],
                Clause::Phrase { terms, .. } => terms.iter().map(|s| s.as_str()).collect(),
            };
            for term in terms {
                if let Some(posting) = self
                    .postings
                    .get(field)
                    .and_then(|t| t.get(term))
                    .and_then(|d| d.get(key))
                {
                    offsets.extend(posting.offsets.iter().copied());
                }
            }
        }
        if offsets.is_empty() {
            return None;
        }
        offsets.sort();
        offsets.dedup();
        Some(build_snippet(text, &offsets, pre, post))
    }

    pub fn to_json(&self, key: &str) -> Option<serde_json::Value> {
        self.docs.get(key).map(|d| {
            serde_json::Value::Object(
                d.document
                    .iter()
                    .map(|(k, v)| (k.clone(), to_json(v)))
                    .collect(),
            )
        })
    }
}

/// Maps a filterable field name referenced in the evaluator to the
/// doc-value field name actually used to store it, honoring the sidecar
/// naming rule.
pub fn resolve_filter_field<'a>(definition: &'a IndexDefinition, name: &str) -> Option<(&'a Field, String)> {
    let field = definition.field(name)?;
    Some((field, doc_value_field_name(field)))
}

pub fn key_type_is_string(field: &Field) -> bool {
    matches!(field.field_type, FieldType::Primitive(PrimitiveType::String))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{FieldFlags, Similarity};
    use crate::value::Value;

    fn make_index(similarity: Similarity) -> LexicalIndex {
        let mut def = IndexDefinition::new(
            "docs",
            vec![
                Field::new(
                    "id",
                    FieldType::Primitive(PrimitiveType::String),
                    FieldFlags { key: true, retrievable: true, ..Default::default() },
                ),
                Field::new(
                    "content",
                    FieldType::Primitive(PrimitiveType::String),
                    FieldFlags { searchable: true, retrievable: true, ..Default::default() },
                ),
            ],
        );
        def.similarity = similarity;
        LexicalIndex::new(def, AnalyzerRegistry::new())
    }

    fn doc(id: &str, content: &str) -> Document {
        let mut d = Document::new();
        d.insert("id".to_string(), Value::Str(id.to_string()));
        d.insert("content".to_string(), Value::Str(content.to_string()));
        d
    }

    #[test]
    fn s1_bm25_parameter_sensitivity() {
        let mut idx = make_index(Similarity::Bm25 { k1: 1.2, b: 0.75 });
        idx.upsert(doc("1", "search search search")).unwrap();
        idx.upsert(doc("2", "search search search search search")).unwrap();
        idx.commit();

        let query = super::super::query::parse_query("search");
        let hits = idx.search(&query, None, &BTreeMap::new(), SearchMode::Any, None, false);
        let score1 = hits.iter().find(|h| h.key == "1").unwrap().score;
        let score2 = hits.iter().find(|h| h.key == "2").unwrap().score;
        assert!(score2 > score1);

        let mut idx0 = make_index(Similarity::Bm25 { k1: 0.0, b: 0.75 });
        idx0.upsert(doc("1", "search search search")).unwrap();
        idx0.upsert(doc("2", "search search search search search")).unwrap();
        idx0.commit();
        let hits0 = idx0.search(&query, None, &BTreeMap::new(), SearchMode::Any, None, false);
        let s1 = hits0.iter().find(|h| h.key == "1").unwrap().score;
        let s2 = hits0.iter().find(|h| h.key == "2").unwrap().score;
        assert!((s1 - s2).abs() < 1e-9);
    }

    #[test]
    fn search_mode_all_requires_every_term_to_match() {
        let mut idx = make_index(Similarity::default());
        idx.upsert(doc("1", "red shoes")).unwrap();
        idx.upsert(doc("2", "red jacket")).unwrap();
        idx.upsert(doc("3", "blue jacket")).unwrap();
        idx.commit();

        let query = super::super::query::parse_query("red jacket");
        let all_hits = idx.search(&query, None, &BTreeMap::new(), SearchMode::All, None, false);
        assert_eq!(all_hits.iter().map(|h| h.key.as_str()).collect::<HashSet<_>>(), HashSet::from(["2"]));

        let any_hits = idx.search(&query, None, &BTreeMap::new(), SearchMode::Any, None, false);
        assert_eq!(any_hits.iter().map(|h| h.key.as_str()).collect::<HashSet<_>>(), HashSet::from(["1", "2", "3"]));
    }

    #[test]
    fn delete_then_search_excludes_key() {
        let mut idx = make_index(Similarity::default());
        idx.upsert(doc("1", "hello world")).unwrap();
        idx.delete("1");
        idx.commit();
        let query = super::super::query::parse_query("hello");
        let hits = idx.search(&query, None, &BTreeMap::new(), SearchMode::Any, None, false);
        assert!(hits.is_empty());
    }

    #[test]
    fn delete_never_inserted_key_is_noop() {
        let mut idx = make_index(Similarity::default());
        idx.delete("missing");
        assert!(idx.is_empty());
    }

    #[test]
    fn upsert_twice_replaces_atomically() {
        let mut idx = make_index(Similarity::default());
        idx.upsert(doc("1", "alpha")).unwrap();
        idx.upsert(doc("1", "beta")).unwrap();
        idx.commit();
        let retrieved = idx.get("1").unwrap();
        assert_eq!(retrieved.get("content").unwrap().as_str(), Some("beta"));
    }
}
