//! Suggest and autocomplete (spec.md §4.7): infix matching over a
//! suggester's source fields, built on demand from the lexical index's
//! stored documents and the field's index-time analyzer.

use crate::analyzer::AnalyzerRegistry;
use crate::catalog::{IndexDefinition, Suggester};
use crate::error::ApiError;
use crate::lexical::LexicalIndex;
use std::collections::HashSet;

#[derive(Debug, Clone)]
pub struct SuggestHit {
    pub key: String,
    pub text: String,
    pub highlighted_text: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AutocompleteMode {
    OneTerm,
    TwoTerms,
    OneTermWithContext,
}

#[derive(Debug, Clone)]
pub struct AutocompleteHit {
    pub text: String,
    pub query_plus_text: String,
}

fn resolve_suggester<'a>(definition: &'a IndexDefinition, name: &str) -> Result<&'a Suggester, ApiError> {
    definition.suggesters.iter().find(|s| s.name == name).ok_or_else(|| ApiError::NotFound(format!("suggester '{name}'")))
}

fn highlight_first_match(source: &str, needle: &str, pre: &str, post: &str) -> String {
    let lower_source = source.to_ascii_lowercase();
    let lower_needle = needle.to_ascii_lowercase();
    match lower_source.find(&lower_needle) {
        Some(pos) => {
            let end = pos + needle.len();
            format!("{}{pre}{}{post}{}", &source[..pos], &source[pos..end], &source[end..])
        }
        None => source.to_string(),
    }
}

/// Top-N infix suggestions for `suggester_name`'s source fields
/// (spec.md §4.7 `suggest`).
pub fn suggest(
    index: &LexicalIndex,
    definition: &IndexDefinition,
    suggester_name: &str,
    search_text: &str,
    candidate_keys: Option<&HashSet<String>>,
    top: usize,
    pre_tag: &str,
    post_tag: &str,
) -> Result<Vec<SuggestHit>, ApiError> {
    let suggester = resolve_suggester(definition, suggester_name)?;
    let needle = search_text.trim();
    if needle.is_empty() {
        return Ok(Vec::new());
    }

    let mut hits = Vec::new();
    for key in index.keys() {
        if let Some(allowed) = candidate_keys {
            if !allowed.contains(key) {
                continue;
            }
        }
        let Some(doc) = index.get(key) else { continue };
        for field_name in &suggester.source_fields {
            if let Some(value) = doc.get(field_name).and_then(crate::value::Value::as_str) {
                if value.to_ascii_lowercase().contains(&needle.to_ascii_lowercase()) {
                    hits.push(SuggestHit {
                        key: key.clone(),
                        text: value.to_string(),
                        highlighted_text: highlight_first_match(value, needle, pre_tag, post_tag),
                    });
                    break;
                }
            }
        }
    }

    hits.sort_by(|a, b| a.key.cmp(&b.key));
    hits.truncate(top);
    Ok(hits)
}

fn matching_tokens<'a>(tokens: &'a [String], prefix: &str) -> impl Iterator<Item = &'a String> {
    tokens.iter().filter(move |t| t.starts_with(prefix))
}

/// Term (or term-pair) completion over a suggester's source fields
/// (spec.md §4.7 `autocomplete`, modes `oneTerm|twoTerms|oneTermWithContext`).
pub fn autocomplete(
    index: &LexicalIndex,
    definition: &IndexDefinition,
    analyzers: &AnalyzerRegistry,
    suggester_name: &str,
    search_text: &str,
    mode: AutocompleteMode,
    top: usize,
) -> Result<Vec<AutocompleteHit>, ApiError> {
    let suggester = resolve_suggester(definition, suggester_name)?;
    let query_tokens: Vec<String> = search_text.split_whitespace().map(|s| s.to_ascii_lowercase()).collect();
    let Some(last) = query_tokens.last().cloned() else {
        return Ok(Vec::new());
    };
    let context = if query_tokens.len() >= 2 { Some(query_tokens[query_tokens.len() - 2].clone()) } else { None };

    let mut seen = HashSet::new();
    let mut hits = Vec::new();

    for key in index.keys() {
        let Some(doc) = index.get(key) else { continue };
        for field_name in &suggester.source_fields {
            let Some(field) = definition.field(field_name) else { continue };
            let Some(text) = doc.get(field_name).and_then(crate::value::Value::as_str) else { continue };
            let analyze = analyzers.resolve(field.index_time_analyzer());
            let tokens: Vec<String> = analyze(text).into_iter().map(|t| t.text).collect();

            match mode {
                AutocompleteMode::OneTerm => {
                    for token in matching_tokens(&tokens, &last) {
                        if seen.insert(token.clone()) {
                            hits.push(AutocompleteHit { text: token.clone(), query_plus_text: token.clone() });
                        }
                    }
                }
                AutocompleteMode::TwoTerms => {
                    for window in tokens.windows(2) {
                        if window[0].starts_with(&last) {
                            let pair = format!("{} {}", window[0], window[1]);
                            if seen.insert(pair.clone()) {
                                hits.push(AutocompleteHit { text: pair.clone(), query_plus_text: pair });
                            }
                        }
                    }
                }
                AutocompleteMode::OneTermWithContext => {
                    for window in tokens.windows(2) {
                        if window[1].starts_with(&last) && context.as_deref() == Some(window[0].as_str()) && seen.insert(window[1].clone()) {
                            hits.push(AutocompleteHit { text: window[1].clone(), query_plus_text: format!("{} {}", window[0], window[1]) });
                        }
                    }
                }
            }
        }
    }

    hits.truncate(top);
    Ok(hits)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{Field, FieldFlags, FieldType, PrimitiveType};
    use crate::value::{Document, Value};

    fn setup() -> (IndexDefinition, LexicalIndex) {
        let mut def = IndexDefinition::new(
            "hotels",
            vec![
                Field::new("id", FieldType::Primitive(PrimitiveType::String), FieldFlags { key: true, retrievable: true, ..Default::default() }),
                Field::new("name", FieldType::Primitive(PrimitiveType::String), FieldFlags { searchable: true, retrievable: true, ..Default::default() }),
            ],
        );
        def.suggesters.push(Suggester::new("sg", vec!["name".to_string()]));
        let index = LexicalIndex::new(def.clone(), AnalyzerRegistry::new());
        (def, index)
    }

    #[test]
    fn suggest_matches_infix_and_highlights() {
        let (def, mut index) = setup();
        let mut doc = Document::new();
        doc.insert("id".into(), Value::Str("1".into()));
        doc.insert("name".into(), Value::Str("Seaside Resort".into()));
        index.upsert(doc).unwrap();
        index.commit();

        let hits = suggest(&index, &def, "sg", "side", None, 10, "<b>", "</b>").unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].highlighted_text, "Sea<b>side</b> Resort");
    }

    #[test]
    fn suggest_unknown_suggester_is_not_found() {
        let (def, index) = setup();
        let err = suggest(&index, &def, "missing", "x", None, 10, "<em>", "</em>");
        assert!(matches!(err, Err(ApiError::NotFound(_))));
    }

    #[test]
    fn autocomplete_one_term_matches_prefix() {
        let (def, mut index) = setup();
        let mut doc = Document::new();
        doc.insert("id".into(), Value::Str("1".into()));
        doc.insert("name".into(), Value::Str("Seaside Resort".into()));
        index.upsert(doc).unwrap();
        index.commit();

        let analyzers = AnalyzerRegistry::new();
        let hits = autocomplete(&index, &def, &analyzers, "sg", "sea", AutocompleteMode::OneTerm, 10).unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].text, "seaside");
    }
}
