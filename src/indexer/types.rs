//! Indexer, indexer-status and skillset data types (spec.md §3).

use crate::catalog::store::CatalogResource;
use crate::skills::Skill;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

#[derive(Debug, Clone)]
pub struct Skillset {
    pub name: String,
    pub skills: Vec<Skill>,
    pub etag: String,
}

impl Skillset {
    pub fn new(name: impl Into<String>, skills: Vec<Skill>) -> Self {
        Self { name: name.into(), skills, etag: uuid::Uuid::new_v4().to_string() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MappingFunction {
    Base64Encode,
    Base64Decode,
    UrlEncode,
    UrlDecode,
    ExtractTokenAtPosition { delimiter: char, position: usize },
}

impl MappingFunction {
    pub fn apply(&self, input: &str) -> String {
        match self {
            MappingFunction::Base64Encode => {
                use base64::Engine;
                base64::engine::general_purpose::STANDARD.encode(input)
            }
            MappingFunction::Base64Decode => {
                use base64::Engine;
                base64::engine::general_purpose::STANDARD
                    .decode(input)
                    .ok()
                    .and_then(|b| String::from_utf8(b).ok())
                    .unwrap_or_default()
            }
            MappingFunction::UrlEncode => urlencoding::encode(input).to_string(),
            MappingFunction::UrlDecode => urlencoding::decode(input).map(|c| c.to_string()).unwrap_or_default(),
            MappingFunction::ExtractTokenAtPosition { delimiter, position } => {
                input.split(*delimiter).nth(*position).unwrap_or_default().to_string()
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldMapping {
    pub source_field_name: String,
    pub target_field_name: String,
    pub mapping_function: Option<MappingFunction>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputFieldMapping {
    /// An absolute JSON-path into the enriched document, e.g.
    /// `/document/textItems/*/embedding`.
    pub source_field_name: String,
    pub target_field_name: String,
    pub mapping_function: Option<MappingFunction>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct IndexerParameters {
    pub batch_size: usize,
    /// `-1` means unlimited.
    pub max_failed_items: i64,
}

impl Default for IndexerParameters {
    fn default() -> Self {
        Self { batch_size: 100, max_failed_items: 0 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexerDefinition {
    pub name: String,
    pub data_source_name: String,
    pub target_index_name: String,
    pub skillset_name: Option<String>,
    pub schedule: Option<String>,
    pub field_mappings: Vec<FieldMapping>,
    pub output_field_mappings: Vec<OutputFieldMapping>,
    pub parameters: IndexerParameters,
    pub disabled: bool,
    pub etag: String,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

impl IndexerDefinition {
    pub fn new(name: impl Into<String>, data_source_name: impl Into<String>, target_index_name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            name: name.into(),
            data_source_name: data_source_name.into(),
            target_index_name: target_index_name.into(),
            skillset_name: None,
            schedule: None,
            field_mappings: Vec::new(),
            output_field_mappings: Vec::new(),
            parameters: IndexerParameters::default(),
            disabled: false,
            etag: uuid::Uuid::new_v4().to_string(),
            created_at: now,
            modified_at: now,
        }
    }
}

impl CatalogResource for IndexerDefinition {
    fn name(&self) -> &str {
        &self.name
    }
    fn etag(&self) -> &str {
        &self.etag
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OverallStatus {
    Running,
    Error,
    Unknown,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub items_processed: u64,
    pub items_failed: u64,
    pub initial_tracking_state: Option<String>,
    pub final_tracking_state: Option<String>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

pub const MAX_EXECUTION_HISTORY: usize = 10;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexerStatus {
    pub name: String,
    pub status: OverallStatus,
    pub last_result: Option<ExecutionResult>,
    pub history: VecDeque<ExecutionResult>,
}

impl IndexerStatus {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), status: OverallStatus::Unknown, last_result: None, history: VecDeque::new() }
    }

    pub fn record(&mut self, result: ExecutionResult) {
        self.status = if result.errors.is_empty() { OverallStatus::Unknown } else { OverallStatus::Error };
        self.history.push_front(result.clone());
        while self.history.len() > MAX_EXECUTION_HISTORY {
            self.history.pop_back();
        }
        self.last_result = Some(result);
    }

    pub fn last_high_water_mark(&self) -> Option<String> {
        self.last_result.as_ref().and_then(|r| r.final_tracking_state.clone())
    }
}
