//! Query executor: the pull-apart-and-recombine pipeline of spec.md §4.6.

use super::facets::compute_facets;
use super::fusion::{fuse, Stream};
use super::request::{DebugMode, OrderDirection, SearchHitResult, SearchRequest, SearchResponse};
use crate::catalog::IndexDefinition;
use crate::error::ApiError;
use crate::filter::CompiledFilter;
use crate::lexical::{parse_query, LexicalIndex};
use crate::scorer::{apply_boost, compute_document_boost, resolve_profile};
use crate::value::to_json;
use crate::vector::VectorStore;
use base64::Engine;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap, HashSet};

const RETRIEVAL_BUFFER: usize = 50;
const MAX_PAGING_WINDOW: usize = 1000;

pub fn execute(
    definition: &IndexDefinition,
    index: &LexicalIndex,
    vector_stores: &HashMap<String, VectorStore>,
    request: &SearchRequest,
    now: DateTime<Utc>,
) -> Result<SearchResponse, ApiError> {
    let raw_text = request.search.as_deref().unwrap_or("").trim();
    let has_vectors = !request.vector_queries.is_empty();
    let is_match_all = (raw_text.is_empty() || raw_text == "*") && !has_vectors;
    let has_lexical_stream = is_match_all || !raw_text.is_empty();

    let filter = request
        .filter
        .as_deref()
        .map(|text| CompiledFilter::compile(text, definition))
        .transpose()?;
    let candidate_keys: Option<HashSet<String>> = filter.as_ref().map(|f| f.candidate_keys(index));

    let cap = request.top.saturating_add(request.skip).saturating_add(RETRIEVAL_BUFFER);
    let parsed = parse_query(if has_lexical_stream { raw_text } else { "" });

    let text_weights: BTreeMap<String, f64> = match resolve_profile(definition, request.scoring_profile.as_deref())? {
        Some(profile) => profile.text_weights.clone(),
        None => BTreeMap::new(),
    };

    let lexical_hits = if has_lexical_stream {
        index.search(
            &parsed,
            request.search_fields.as_deref(),
            &text_weights,
            request.search_mode,
            candidate_keys.as_ref(),
            request.features_mode,
        )
    } else {
        Vec::new()
    };
    let text_stream: Stream = lexical_hits.iter().take(cap).map(|h| (h.key.clone(), h.score)).collect();
    let features_by_key: HashMap<String, serde_json::Value> = if request.features_mode {
        lexical_hits
            .iter()
            .map(|h| {
                let obj: serde_json::Map<String, serde_json::Value> = h
                    .features
                    .iter()
                    .map(|(field, f)| {
                        (
                            field.clone(),
                            serde_json::json!({
                                "uniqueTokenMatches": f.unique_token_matches,
                                "similarityScore": f.similarity_score,
                                "termFrequency": f.term_frequency,
                            }),
                        )
                    })
                    .collect();
                (h.key.clone(), serde_json::Value::Object(obj))
            })
            .collect()
    } else {
        HashMap::new()
    };

    let mut vector_streams: Vec<Stream> = Vec::new();
    let mut vector_scores_by_key: HashMap<String, HashMap<String, f64>> = HashMap::new();
    for vq in &request.vector_queries {
        let store = vector_stores
            .get(&vq.field)
            .ok_or_else(|| ApiError::InvalidRequest(format!("'{}' is not a vector field", vq.field)))?;
        let want = vq.k.max(cap);
        let hits = match candidate_keys.as_ref() {
            Some(keys) => store.filtered_knn(&vq.vector, want, keys),
            None => store.knn(&vq.vector, want),
        };
        let stream: Stream = hits.iter().take(cap).map(|h| (h.id.clone(), h.score as f64)).collect();
        for h in &hits {
            vector_scores_by_key.entry(h.id.clone()).or_default().insert(vq.field.clone(), h.score as f64);
        }
        vector_streams.push(stream);
    }

    let mut all_streams: Vec<Stream> = Vec::new();
    let mut weights: Vec<f64> = Vec::new();
    if has_lexical_stream {
        all_streams.push(text_stream.clone());
        weights.push(super::fusion::DEFAULT_TEXT_WEIGHT);
    }
    if !vector_streams.is_empty() {
        let per_vector_weight = super::fusion::DEFAULT_VECTOR_WEIGHT / vector_streams.len() as f64;
        for s in &vector_streams {
            all_streams.push(s.clone());
            weights.push(per_vector_weight);
        }
    }

    let fused_scores: HashMap<String, f64> = if all_streams.len() <= 1 {
        all_streams
            .first()
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default()
    } else {
        fuse(&all_streams, request.fusion_method, &weights)
    };

    let profile = resolve_profile(definition, request.scoring_profile.as_deref())?;
    let mut scored: Vec<(String, f64)> = fused_scores
        .into_iter()
        .map(|(key, score)| {
            let boosted = match (profile, index.get(&key)) {
                (Some(p), Some(doc)) => apply_boost(score, compute_document_boost(p, &doc, &request.scoring_parameters, now)),
                _ => score,
            };
            (key, boosted)
        })
        .collect();

    let total_matched = scored.len();

    if request.order_by.is_empty() {
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap().then_with(|| a.0.cmp(&b.0)));
    } else {
        let order_by = request.order_by.clone();
        scored.sort_by(|a, b| {
            for (field, dir) in &order_by {
                let dv_name = definition
                    .field(field)
                    .map(crate::lexical::doc_value_field_name)
                    .unwrap_or_else(|| field.clone());
                let va = index.doc_value(&dv_name, &a.0);
                let vb = index.doc_value(&dv_name, &b.0);
                let ordering = compare_order_values(va, vb);
                let ordering = if *dir == OrderDirection::Desc { ordering.reverse() } else { ordering };
                if ordering != std::cmp::Ordering::Equal {
                    return ordering;
                }
            }
            a.0.cmp(&b.0)
        });
    }

    let page: Vec<(String, f64)> = scored.into_iter().skip(request.skip).take(request.top).collect();

    let highlight_fields: Vec<String> = request
        .highlight_fields
        .clone()
        .unwrap_or_else(|| definition.fields.iter().filter(|f| f.flags.searchable).map(|f| f.name.clone()).collect());

    let results: Vec<SearchHitResult> = page
        .into_iter()
        .map(|(key, score)| {
            let stored = index.get(&key).unwrap_or_default();
            let projected = project(&stored, request.select.as_deref());
            let document = serde_json::Value::Object(projected.into_iter().map(|(k, v)| (k, to_json(&v))).collect());

            let mut highlights = BTreeMap::new();
            if has_lexical_stream {
                for field in &highlight_fields {
                    if let Some(snippet) = index.highlight(&parsed, field, &key, &request.highlight_pre_tag, &request.highlight_post_tag) {
                        highlights.insert(field.clone(), snippet);
                    }
                }
            }

            let features = features_by_key.get(&key).cloned();

            let debug_info = if matches!(request.debug, DebugMode::Vector | DebugMode::All) {
                let vector_breakdown = vector_scores_by_key.get(&key).cloned().unwrap_or_default();
                Some(serde_json::json!({
                    "lexicalScore": text_stream.iter().find(|(k, _)| k == &key).map(|(_, s)| *s),
                    "vectorScores": vector_breakdown,
                    "finalScore": score,
                }))
            } else {
                None
            };

            SearchHitResult { key, document, score, highlights, features, debug_info }
        })
        .collect();

    let facet_candidate_keys: HashSet<String> = candidate_keys.clone().unwrap_or_else(|| index.keys().cloned().collect());
    let facets = compute_facets(index, definition, &facet_candidate_keys, &request.facets);

    let continuation_token = if request.skip.saturating_add(request.top) > MAX_PAGING_WINDOW {
        let next_skip = request.skip + request.top;
        Some(base64::engine::general_purpose::STANDARD.encode(format!("skip={next_skip}")))
    } else {
        None
    };

    Ok(SearchResponse {
        results,
        count: if request.count { Some(total_matched) } else { None },
        facets,
        continuation_token,
    })
}

fn project(doc: &crate::value::Document, select: Option<&[String]>) -> crate::value::Document {
    match select {
        Some(fields) => doc
            .iter()
            .filter(|(k, _)| fields.iter().any(|f| f == *k))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect(),
        None => doc.clone(),
    }
}

fn compare_order_values(a: Option<&crate::value::Value>, b: Option<&crate::value::Value>) -> std::cmp::Ordering {
    use crate::value::Value;
    use std::cmp::Ordering;
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(Value::Str(x)), Some(Value::Str(y))) => x.cmp(y),
        (Some(Value::Date(x)), Some(Value::Date(y))) => x.cmp(y),
        (Some(x), Some(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(fx), Some(fy)) => fx.partial_cmp(&fy).unwrap_or(Ordering::Equal),
            _ => Ordering::Equal,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analyzer::AnalyzerRegistry;
    use crate::catalog::{Field, FieldFlags, FieldType, PrimitiveType};
    use crate::value::{Document, Value};

    fn setup() -> (IndexDefinition, LexicalIndex) {
        let def = IndexDefinition::new(
            "products",
            vec![
                Field::new("id", FieldType::Primitive(PrimitiveType::String), FieldFlags { key: true, retrievable: true, ..Default::default() }),
                Field::new("title", FieldType::Primitive(PrimitiveType::String), FieldFlags { searchable: true, sortable: true, retrievable: true, ..Default::default() }),
                Field::new("category", FieldType::Primitive(PrimitiveType::String), FieldFlags { filterable: true, retrievable: true, facetable: true, ..Default::default() }),
            ],
        );
        let index = LexicalIndex::new(def.clone(), AnalyzerRegistry::new());
        (def, index)
    }

    fn doc(id: &str, title: &str, category: &str) -> Document {
        let mut d = Document::new();
        d.insert("id".into(), Value::Str(id.to_string()));
        d.insert("title".into(), Value::Str(title.to_string()));
        d.insert("category".into(), Value::Str(category.to_string()));
        d
    }

    #[test]
    fn match_all_with_filter_returns_only_matching_category() {
        let (def, mut index) = setup();
        index.upsert(doc("1", "red shoes", "a")).unwrap();
        index.upsert(doc("2", "blue shoes", "b")).unwrap();
        index.commit();

        let request = SearchRequest { filter: Some("category eq 'a'".to_string()), top: 10, ..Default::default() };
        let response = execute(&def, &index, &HashMap::new(), &request, Utc::now()).unwrap();
        assert_eq!(response.results.len(), 1);
        assert_eq!(response.results[0].key, "1");
    }

    #[test]
    fn search_text_ranks_and_highlights() {
        let (def, mut index) = setup();
        index.upsert(doc("1", "red shoes", "a")).unwrap();
        index.upsert(doc("2", "blue jacket", "b")).unwrap();
        index.commit();

        let request = SearchRequest { search: Some("shoes".to_string()), top: 10, ..Default::default() };
        let response = execute(&def, &index, &HashMap::new(), &request, Utc::now()).unwrap();
        assert_eq!(response.results.len(), 1);
        assert!(response.results[0].highlights.get("title").is_some());
    }

    #[test]
    fn order_by_resolves_the_sidecar_doc_value_for_a_searchable_sortable_field() {
        let (def, mut index) = setup();
        index.upsert(doc("1", "red shoes", "a")).unwrap();
        index.upsert(doc("2", "blue jacket", "b")).unwrap();
        index.commit();

        let request = SearchRequest {
            filter: None,
            top: 10,
            order_by: vec![("title".to_string(), OrderDirection::Asc)],
            ..Default::default()
        };
        let response = execute(&def, &index, &HashMap::new(), &request, Utc::now()).unwrap();
        let keys: Vec<&str> = response.results.iter().map(|r| r.key.as_str()).collect();
        assert_eq!(keys, vec!["2", "1"]);
    }

    #[test]
    fn invalid_scoring_profile_is_rejected() {
        let (def, index) = setup();
        let request = SearchRequest { scoring_profile: Some("missing".to_string()), ..Default::default() };
        let result = execute(&def, &index, &HashMap::new(), &request, Utc::now());
        assert!(result.is_err());
    }
}
