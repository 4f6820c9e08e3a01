//! Lexical index: inverted postings, doc-values, BM25/Classic scoring,
//! query parsing and highlighting (spec.md §4.2 "Lexical index").

pub mod highlight;
pub mod index;
pub mod query;
pub mod similarity;

pub use highlight::build_snippet;
pub use index::{doc_value_field_name, resolve_filter_field, FieldFeature, LexicalIndex, SearchHit, SearchMode};
pub use query::{parse_field_weights, parse_query, Clause, ParsedQuery, Polarity};
pub use similarity::score_term;
