//! Token filters: lowercasing, stopword removal, stemming
//! (spec.md §4.1 "Language analyzers must provide lowercasing, stop-word
//! removal, and stemming").

use super::Token;
use once_cell::sync::Lazy;
use rust_stemmers::{Algorithm, Stemmer};
use std::collections::HashSet;

pub fn lowercase(text: &str) -> String {
    text.to_lowercase()
}

static EN_STOPWORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "a", "an", "and", "are", "as", "at", "be", "but", "by", "for", "if", "in", "into", "is",
        "it", "no", "not", "of", "on", "or", "such", "that", "the", "their", "then", "there",
        "these", "they", "this", "to", "was", "will", "with",
    ]
    .into_iter()
    .collect()
});

static FR_STOPWORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "au", "aux", "avec", "ce", "ces", "dans", "de", "des", "du", "elle", "en", "et", "eux",
        "il", "je", "la", "le", "leur", "lui", "ma", "mais", "me", "même", "mes", "moi", "mon",
        "ne", "nos", "notre", "nous", "on", "ou", "par", "pas", "pour", "qu", "que", "qui", "sa",
        "se", "ses", "son", "sur", "ta", "te", "tes", "toi", "ton", "tu", "un", "une", "vos",
        "votre", "vous",
    ]
    .into_iter()
    .collect()
});

pub fn remove_stopwords(tokens: Vec<Token>, lang: &str) -> Vec<Token> {
    let set = match lang {
        "fr" => &*FR_STOPWORDS,
        _ => &*EN_STOPWORDS,
    };
    tokens.into_iter().filter(|t| !set.contains(t.text.as_str())).collect()
}

pub fn stem(word: &str, lang: &str) -> String {
    let algo = match lang {
        "fr" => Algorithm::French,
        _ => Algorithm::English,
    };
    Stemmer::create(algo).stem(word).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stems_english_plural() {
        assert_eq!(stem("running", "en"), "run");
    }

    #[test]
    fn removes_known_stopword() {
        let toks = vec![
            Token { text: "the".into(), start: 0, end: 3, position: 0 },
            Token { text: "cat".into(), start: 4, end: 7, position: 1 },
        ];
        let filtered = remove_stopwords(toks, "en");
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].text, "cat");
    }
}
