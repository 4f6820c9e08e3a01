//! Query executor request/response shapes (spec.md §4.6).

use super::facets::FacetValue;
use super::fusion::FusionMethod;
use crate::lexical::SearchMode;
use crate::scorer::ScoringParameters;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryType {
    Simple,
    Full,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderDirection {
    Asc,
    Desc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebugMode {
    None,
    Vector,
    All,
}

#[derive(Debug, Clone)]
pub struct VectorQueryRequest {
    pub field: String,
    pub vector: Vec<f32>,
    pub k: usize,
}

#[derive(Debug, Clone)]
pub struct SearchRequest {
    pub search: Option<String>,
    pub filter: Option<String>,
    pub select: Option<Vec<String>>,
    pub order_by: Vec<(String, OrderDirection)>,
    pub top: usize,
    pub skip: usize,
    pub count: bool,
    pub highlight_fields: Option<Vec<String>>,
    pub highlight_pre_tag: String,
    pub highlight_post_tag: String,
    pub search_mode: SearchMode,
    pub query_type: QueryType,
    pub search_fields: Option<Vec<String>>,
    pub facets: Vec<String>,
    pub vector_queries: Vec<VectorQueryRequest>,
    pub fusion_method: FusionMethod,
    pub features_mode: bool,
    pub debug: DebugMode,
    pub scoring_profile: Option<String>,
    pub scoring_parameters: ScoringParameters,
}

impl Default for SearchRequest {
    fn default() -> Self {
        Self {
            search: None,
            filter: None,
            select: None,
            order_by: Vec::new(),
            top: 50,
            skip: 0,
            count: false,
            highlight_fields: None,
            highlight_pre_tag: "<em>".to_string(),
            highlight_post_tag: "</em>".to_string(),
            search_mode: SearchMode::Any,
            query_type: QueryType::Simple,
            search_fields: None,
            facets: Vec::new(),
            vector_queries: Vec::new(),
            fusion_method: FusionMethod::Rrf,
            features_mode: false,
            debug: DebugMode::None,
            scoring_profile: None,
            scoring_parameters: ScoringParameters::default(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SearchHitResult {
    pub key: String,
    pub document: serde_json::Value,
    pub score: f64,
    pub highlights: BTreeMap<String, String>,
    pub features: Option<serde_json::Value>,
    pub debug_info: Option<serde_json::Value>,
}

#[derive(Debug, Clone)]
pub struct SearchResponse {
    pub results: Vec<SearchHitResult>,
    pub count: Option<usize>,
    pub facets: BTreeMap<String, Vec<FacetValue>>,
    pub continuation_token: Option<String>,
}
