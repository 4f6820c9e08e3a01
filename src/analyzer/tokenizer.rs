//! Tokenizers producing positioned token streams, built on
//! `unicode-segmentation` word-boundary splitting the way the wider example
//! pack reaches for it over a hand-rolled char-class scanner.

use super::Token;
use unicode_segmentation::UnicodeSegmentation;

/// Splits on Unicode word boundaries, keeping only boundaries that contain
/// at least one alphanumeric character (punctuation/whitespace dropped).
pub fn standard_tokenize(text: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut position = 0;
    for (start, word) in text.split_word_bound_indices() {
        if !word.chars().any(|c| c.is_alphanumeric()) {
            continue;
        }
        tokens.push(Token {
            text: word.to_string(),
            start,
            end: start + word.len(),
            position,
        });
        position += 1;
    }
    tokens
}

/// Splits purely on whitespace, preserving punctuation attached to words.
pub fn whitespace_tokenize(text: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut position = 0;
    for (idx, word) in text.split_whitespace().enumerate() {
        let start = text_offset_of(text, word, idx);
        tokens.push(Token {
            text: word.to_string(),
            start,
            end: start + word.len(),
            position,
        });
        position += 1;
    }
    tokens
}

/// Finds the byte offset of the `nth`-occurring whitespace-delimited token;
/// `split_whitespace` doesn't carry byte offsets so we recover them here.
fn text_offset_of(text: &str, word: &str, nth: usize) -> usize {
    let mut count = 0;
    let mut search_from = 0;
    loop {
        match text[search_from..].find(word) {
            Some(rel) => {
                let abs = search_from + rel;
                if count == nth {
                    return abs;
                }
                count += 1;
                search_from = abs + word.len();
            }
            None => return 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_tokenize_splits_on_punctuation() {
        let toks = standard_tokenize("hello, world!");
        assert_eq!(toks.iter().map(|t| t.text.as_str()).collect::<Vec<_>>(), vec!["hello", "world"]);
        assert_eq!(toks[1].start, 7);
    }

    #[test]
    fn positions_are_sequential() {
        let toks = standard_tokenize("a b c");
        assert_eq!(toks.iter().map(|t| t.position).collect::<Vec<_>>(), vec![0, 1, 2]);
    }
}
