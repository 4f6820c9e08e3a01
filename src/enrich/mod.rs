//! Enriched-document state bag: a JSON-path addressable tree a skill
//! pipeline reads and writes (spec.md §3 "Skillset", §4.9).
//!
//! The tree is backed by the same `Value` used for documents (§9
//! "runtime-reflective dictionary documents"). Paths are `/`-separated,
//! e.g. `/document/content` or `/document/pages/*/text`; `*` expands over
//! every key of a map or every index of a list.

use crate::value::Value;
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
pub struct EnrichedDocument {
    root: Value,
}

impl Default for EnrichedDocument {
    fn default() -> Self {
        Self::new()
    }
}

impl EnrichedDocument {
    /// A fresh enriched document seeded with the default `/document` root,
    /// as every indexer run and skill context path assumes it exists.
    pub fn new() -> Self {
        let mut root = BTreeMap::new();
        root.insert("document".to_string(), Value::Map(BTreeMap::new()));
        Self { root: Value::Map(root) }
    }

    fn segments(path: &str) -> Vec<&str> {
        path.trim_start_matches('/').split('/').filter(|s| !s.is_empty()).collect()
    }

    /// First match for `path`, following `*` by taking the first branch.
    pub fn get(&self, path: &str) -> Option<&Value> {
        self.get_all(path).into_iter().next()
    }

    /// Every value matching `path`, expanding `*` wildcards over maps and
    /// lists.
    pub fn get_all(&self, path: &str) -> Vec<&Value> {
        resolve_values(&self.root, &Self::segments(path))
    }

    /// Sets a value at a concrete (non-wildcard) path, creating
    /// intermediate maps and lists as needed.
    pub fn set(&mut self, path: &str, value: Value) {
        let segments = Self::segments(path);
        set_recursive(&mut self.root, &segments, value);
    }

    /// The concrete paths matching `context_path`, used by skills whose
    /// `context` is a wildcard path to iterate once per matching context.
    pub fn matching_contexts(&self, context_path: &str) -> Vec<String> {
        resolve_paths(&self.root, &Self::segments(context_path), String::new())
    }
}

fn resolve_values<'a>(value: &'a Value, segments: &[&str]) -> Vec<&'a Value> {
    if segments.is_empty() {
        return vec![value];
    }
    let (seg, rest) = (segments[0], &segments[1..]);
    match value {
        Value::Map(m) => {
            if seg == "*" {
                m.values().flat_map(|v| resolve_values(v, rest)).collect()
            } else {
                m.get(seg).map(|v| resolve_values(v, rest)).unwrap_or_default()
            }
        }
        Value::List(items) => {
            if seg == "*" {
                items.iter().flat_map(|v| resolve_values(v, rest)).collect()
            } else if let Ok(idx) = seg.parse::<usize>() {
                items.get(idx).map(|v| resolve_values(v, rest)).unwrap_or_default()
            } else {
                Vec::new()
            }
        }
        _ => Vec::new(),
    }
}

fn resolve_paths(value: &Value, segments: &[&str], prefix: String) -> Vec<String> {
    if segments.is_empty() {
        return vec![prefix];
    }
    let (seg, rest) = (segments[0], &segments[1..]);
    match value {
        Value::Map(m) => {
            if seg == "*" {
                m.iter().flat_map(|(k, v)| resolve_paths(v, rest, format!("{prefix}/{k}"))).collect()
            } else {
                m.get(seg).map(|v| resolve_paths(v, rest, format!("{prefix}/{seg}"))).unwrap_or_default()
            }
        }
        Value::List(items) => {
            if seg == "*" {
                items.iter().enumerate().flat_map(|(i, v)| resolve_paths(v, rest, format!("{prefix}/{i}"))).collect()
            } else if let Ok(idx) = seg.parse::<usize>() {
                items.get(idx).map(|v| resolve_paths(v, rest, format!("{prefix}/{seg}"))).unwrap_or_default()
            } else {
                Vec::new()
            }
        }
        _ => Vec::new(),
    }
}

fn set_recursive(node: &mut Value, segments: &[&str], value: Value) {
    if segments.is_empty() {
        *node = value;
        return;
    }
    let (seg, rest) = (segments[0], &segments[1..]);

    if let Ok(idx) = seg.parse::<usize>() {
        if !matches!(node, Value::List(_)) {
            *node = Value::List(Vec::new());
        }
        if let Value::List(items) = node {
            while items.len() <= idx {
                items.push(Value::Null);
            }
            if rest.is_empty() {
                items[idx] = value;
            } else {
                if !matches!(items[idx], Value::Map(_) | Value::List(_)) {
                    items[idx] = Value::Map(BTreeMap::new());
                }
                set_recursive(&mut items[idx], rest, value);
            }
        }
        return;
    }

    if !matches!(node, Value::Map(_)) {
        *node = Value::Map(BTreeMap::new());
    }
    if let Value::Map(m) = node {
        let entry = m.entry(seg.to_string()).or_insert(Value::Null);
        if rest.is_empty() {
            *entry = value;
        } else {
            if !matches!(entry, Value::Map(_) | Value::List(_)) {
                *entry = Value::Map(BTreeMap::new());
            }
            set_recursive(entry, rest, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn set_then_get_round_trips() {
        let mut doc = EnrichedDocument::new();
        doc.set("/document/content", Value::Str("hello".into()));
        assert_eq!(doc.get("/document/content").and_then(Value::as_str), Some("hello"));
    }

    #[test]
    fn wildcard_get_all_expands_list() {
        let mut doc = EnrichedDocument::new();
        doc.set("/document/pages/0/text", Value::Str("a".into()));
        doc.set("/document/pages/1/text", Value::Str("b".into()));
        let values: Vec<&str> = doc.get_all("/document/pages/*/text").into_iter().filter_map(Value::as_str).collect();
        assert_eq!(values, vec!["a", "b"]);
    }

    #[test]
    fn matching_contexts_returns_concrete_paths() {
        let mut doc = EnrichedDocument::new();
        doc.set("/document/pages/0/text", Value::Str("a".into()));
        doc.set("/document/pages/1/text", Value::Str("b".into()));
        let contexts = doc.matching_contexts("/document/pages/*");
        assert_eq!(contexts, vec!["/document/pages/0", "/document/pages/1"]);
    }

    #[test]
    fn missing_path_returns_none() {
        let doc = EnrichedDocument::new();
        assert!(doc.get("/document/missing").is_none());
    }
}
