//! Suggester definitions (spec.md §3 "Suggester", §4.7).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SearchMode {
    AnalyzingInfixMatching,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Suggester {
    pub name: String,
    pub source_fields: Vec<String>,
    pub search_mode: SearchMode,
}

impl Suggester {
    pub fn new(name: impl Into<String>, source_fields: Vec<String>) -> Self {
        Self {
            name: name.into(),
            source_fields,
            search_mode: SearchMode::AnalyzingInfixMatching,
        }
    }
}
