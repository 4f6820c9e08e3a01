//! Analyzer registry (spec.md §4.1): maps a named analyzer to a tokenizer +
//! filter chain producing `(token, start, end, position)` records, plus
//! normalizers used for filter/facet/sort on string fields.

mod filters;
mod tokenizer;

pub use filters::{lowercase, remove_stopwords, stem};
pub use tokenizer::{standard_tokenize, whitespace_tokenize};

use std::collections::HashMap;
use std::sync::Arc;

/// One analyzed token with its source-text offsets and ordinal position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub text: String,
    pub start: usize,
    pub end: usize,
    pub position: usize,
}

pub type AnalyzeFn = Arc<dyn Fn(&str) -> Vec<Token> + Send + Sync>;

/// Registry of named analyzers (built-ins plus index-declared custom ones).
#[derive(Clone)]
pub struct AnalyzerRegistry {
    analyzers: HashMap<String, AnalyzeFn>,
    normalizers: HashMap<String, Arc<dyn Fn(&str) -> String + Send + Sync>>,
}

impl Default for AnalyzerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl AnalyzerRegistry {
    pub fn new() -> Self {
        let mut reg = Self {
            analyzers: HashMap::new(),
            normalizers: HashMap::new(),
        };
        reg.register_builtin("keyword", keyword_analyzer());
        reg.register_builtin("standard", standard_analyzer());
        reg.register_builtin("simple", simple_analyzer());
        reg.register_builtin("whitespace", whitespace_analyzer());
        reg.register_builtin("stop", stop_analyzer());
        reg.register_builtin("en.lucene", language_analyzer("en"));
        reg.register_builtin("en.microsoft", language_analyzer("en"));
        reg.register_builtin("fr.lucene", language_analyzer("fr"));
        reg.register_builtin("fr.microsoft", language_analyzer("fr"));
        reg.normalizers
            .insert("lowercase".to_string(), Arc::new(|s: &str| s.to_lowercase()));
        reg
    }

    fn register_builtin(&mut self, name: &str, f: AnalyzeFn) {
        self.analyzers.insert(name.to_string(), f);
    }

    /// Register a user-defined analyzer (composing a tokenizer + filters).
    pub fn register(&mut self, name: impl Into<String>, f: AnalyzeFn) {
        self.analyzers.insert(name.into(), f);
    }

    /// Resolve an analyzer by name, applying the fallback rules of §4.1:
    /// unknown `*.microsoft` variants fall back to `standard`, and bare
    /// language names alias to the `.lucene` variant.
    pub fn resolve(&self, name: &str) -> AnalyzeFn {
        if let Some(f) = self.analyzers.get(name) {
            return f.clone();
        }
        if name.ends_with(".microsoft") {
            tracing::debug!("unknown microsoft analyzer '{}', falling back to standard", name);
            return self.analyzers["standard"].clone();
        }
        let lucene_alias = format!("{name}.lucene");
        if let Some(f) = self.analyzers.get(&lucene_alias) {
            return f.clone();
        }
        tracing::debug!("unknown analyzer '{}', falling back to standard", name);
        self.analyzers["standard"].clone()
    }

    pub fn resolve_normalizer(&self, name: &str) -> Arc<dyn Fn(&str) -> String + Send + Sync> {
        self.normalizers
            .get(name)
            .cloned()
            .unwrap_or_else(|| self.normalizers["lowercase"].clone())
    }

    pub fn register_normalizer(
        &mut self,
        name: impl Into<String>,
        f: Arc<dyn Fn(&str) -> String + Send + Sync>,
    ) {
        self.normalizers.insert(name.into(), f);
    }
}

fn keyword_analyzer() -> AnalyzeFn {
    Arc::new(|text: &str| {
        vec![Token {
            text: text.to_string(),
            start: 0,
            end: text.len(),
            position: 0,
        }]
    })
}

fn whitespace_analyzer() -> AnalyzeFn {
    Arc::new(|text: &str| whitespace_tokenize(text))
}

fn simple_analyzer() -> AnalyzeFn {
    Arc::new(|text: &str| {
        let mut tokens = standard_tokenize(text);
        for t in &mut tokens {
            t.text = lowercase(&t.text);
        }
        tokens
    })
}

fn stop_analyzer() -> AnalyzeFn {
    Arc::new(|text: &str| {
        let tokens = standard_tokenize(text);
        let lowered: Vec<Token> = tokens
            .into_iter()
            .map(|mut t| {
                t.text = lowercase(&t.text);
                t
            })
            .collect();
        remove_stopwords(lowered, "en")
    })
}

fn standard_analyzer() -> AnalyzeFn {
    Arc::new(|text: &str| {
        let tokens = standard_tokenize(text);
        tokens
            .into_iter()
            .map(|mut t| {
                t.text = lowercase(&t.text);
                t
            })
            .collect()
    })
}

fn language_analyzer(lang: &'static str) -> AnalyzeFn {
    Arc::new(move |text: &str| {
        let tokens = standard_tokenize(text);
        let lowered: Vec<Token> = tokens
            .into_iter()
            .map(|mut t| {
                t.text = lowercase(&t.text);
                t
            })
            .collect();
        let without_stop = remove_stopwords(lowered, lang);
        without_stop
            .into_iter()
            .map(|mut t| {
                t.text = stem(&t.text, lang);
                t
            })
            .collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyword_is_one_token() {
        let reg = AnalyzerRegistry::new();
        let f = reg.resolve("keyword");
        let toks = f("Hello World");
        assert_eq!(toks.len(), 1);
        assert_eq!(toks[0].text, "Hello World");
    }

    #[test]
    fn standard_lowercases_and_splits() {
        let reg = AnalyzerRegistry::new();
        let f = reg.resolve("standard");
        let toks = f("Hello World");
        assert_eq!(toks.iter().map(|t| t.text.as_str()).collect::<Vec<_>>(), vec!["hello", "world"]);
    }

    #[test]
    fn unknown_microsoft_variant_falls_back() {
        let reg = AnalyzerRegistry::new();
        let f = reg.resolve("de.microsoft");
        let toks = f("Wort");
        assert_eq!(toks[0].text, "wort");
    }

    #[test]
    fn bare_language_alias_resolves_to_lucene_variant() {
        let reg = AnalyzerRegistry::new();
        let f = reg.resolve("en");
        let toks = f("the running dogs");
        // "the" is a stopword and should be removed, "running" should stem.
        assert!(!toks.iter().any(|t| t.text == "the"));
    }
}
