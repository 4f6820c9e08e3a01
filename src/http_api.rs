//! Thin demo HTTP surface (spec.md §6.1): a handful of the real service's
//! routes wired directly against [`ServerContext`] for manual exercise.
//! Not a full OData-compliant layer — no JWT/RBAC, no `$filter` URL
//! grammar (filters are passed as a JSON string body field, reusing the
//! same parser the core uses everywhere else).

use crate::catalog::IndexDefinition;
use crate::context::SharedServerContext;
use crate::datasource::DataSourceDefinition;
use crate::docwrite::{self, ActionType, DocumentAction};
use crate::error::{ApiError, ErrorBody};
use crate::indexer::IndexerDefinition;
use crate::query::{DebugMode, OrderDirection, QueryType, SearchRequest, VectorQueryRequest};
use crate::suggest::{self, AutocompleteMode};
use crate::value::{from_json, Document, Value};
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

type ApiResponse<T> = Result<Json<T>, (StatusCode, Json<ErrorBody>)>;

fn to_http_err(err: ApiError) -> (StatusCode, Json<ErrorBody>) {
    let status = err.status_code();
    let body = ErrorBody::from(&err);
    (status, Json(body))
}

#[derive(Serialize)]
struct ODataCollection<T> {
    #[serde(rename = "@odata.context")]
    context: String,
    value: Vec<T>,
}

fn collection<T>(value: Vec<T>) -> ODataCollection<T> {
    ODataCollection { context: "$metadata".to_string(), value }
}

fn if_match(headers: &HeaderMap) -> Option<&str> {
    headers.get("If-Match").and_then(|v| v.to_str().ok())
}

// ---- /indexes -------------------------------------------------------

async fn list_indexes(State(ctx): State<SharedServerContext>) -> Json<ODataCollection<IndexDefinition>> {
    Json(collection(ctx.indexes.list()))
}

async fn get_index(State(ctx): State<SharedServerContext>, Path(name): Path<String>) -> ApiResponse<IndexDefinition> {
    ctx.indexes.get(&name).map(Json).ok_or_else(|| to_http_err(ApiError::NotFound(name)))
}

async fn create_index(State(ctx): State<SharedServerContext>, Json(definition): Json<IndexDefinition>) -> ApiResponse<IndexDefinition> {
    ctx.create_index(definition).map(Json).map_err(to_http_err)
}

async fn put_index(State(ctx): State<SharedServerContext>, Path(name): Path<String>, headers: HeaderMap, Json(mut definition): Json<IndexDefinition>) -> ApiResponse<IndexDefinition> {
    definition.name = name;
    definition.validate().map_err(to_http_err)?;
    let saved = ctx.indexes.put(definition, if_match(&headers)).map_err(to_http_err)?;
    ctx.spin_up_index(&saved);
    Ok(Json(saved))
}

async fn delete_index(State(ctx): State<SharedServerContext>, Path(name): Path<String>, headers: HeaderMap) -> Result<StatusCode, (StatusCode, Json<ErrorBody>)> {
    ctx.delete_index(&name, if_match(&headers)).map_err(to_http_err)?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Serialize)]
struct IndexStats {
    document_count: usize,
}

async fn index_stats(State(ctx): State<SharedServerContext>, Path(name): Path<String>) -> ApiResponse<IndexStats> {
    ctx.with_index(&name, |index, _| IndexStats { document_count: index.len() }).map(Json).ok_or_else(|| to_http_err(ApiError::NotFound(name)))
}

// ---- /indexes/{name}/docs -------------------------------------------

#[derive(Deserialize)]
struct DocBatchHttp {
    value: Vec<HashMap<String, serde_json::Value>>,
}

#[derive(Serialize)]
struct DocResultHttp {
    key: String,
    status: bool,
    #[serde(rename = "statusCode")]
    status_code: u16,
    #[serde(rename = "errorMessage", skip_serializing_if = "Option::is_none")]
    error_message: Option<String>,
}

fn parse_action(raw: &str) -> ActionType {
    match raw {
        "merge" => ActionType::Merge,
        "mergeOrUpload" => ActionType::MergeOrUpload,
        "delete" => ActionType::Delete,
        _ => ActionType::Upload,
    }
}

async fn index_docs(State(ctx): State<SharedServerContext>, Path(name): Path<String>, Json(batch): Json<DocBatchHttp>) -> Result<(StatusCode, Json<ODataCollection<DocResultHttp>>), (StatusCode, Json<ErrorBody>)> {
    let actions: Vec<DocumentAction> = batch
        .value
        .into_iter()
        .map(|mut obj| {
            let action = obj.remove("@search.action").and_then(|v| v.as_str().map(str::to_string)).unwrap_or_else(|| "upload".to_string());
            let document: Document = match from_json(serde_json::Value::Object(obj.into_iter().collect())) {
                Value::Map(m) => m,
                _ => Document::new(),
            };
            DocumentAction { action: parse_action(&action), document }
        })
        .collect();

    let definition = ctx.indexes.get(&name).ok_or_else(|| to_http_err(ApiError::NotFound(name.clone())))?;
    let results = ctx
        .with_index_mut(&name, |index, vectors| docwrite::index_documents(&definition, index, vectors, actions))
        .ok_or_else(|| to_http_err(ApiError::NotFound(name)))?;

    let all_ok = docwrite::all_succeeded(&results);
    let body = results
        .into_iter()
        .map(|r| DocResultHttp { key: r.key, status: r.status, status_code: r.status_code, error_message: r.error_message })
        .collect();
    let status = if all_ok { StatusCode::OK } else { StatusCode::MULTI_STATUS };
    Ok((status, Json(collection(body))))
}

async fn get_doc(State(ctx): State<SharedServerContext>, Path((name, key)): Path<(String, String)>) -> ApiResponse<serde_json::Value> {
    ctx.with_index(&name, |index, _| index.to_json(&key))
        .flatten()
        .map(Json)
        .ok_or_else(|| to_http_err(ApiError::NotFound(format!("{name}/{key}"))))
}

async fn doc_count(State(ctx): State<SharedServerContext>, Path(name): Path<String>) -> Result<String, (StatusCode, Json<ErrorBody>)> {
    ctx.with_index(&name, |index, _| index.len()).map(|n| n.to_string()).ok_or_else(|| to_http_err(ApiError::NotFound(name)))
}

#[derive(Deserialize, Default)]
struct VectorQueryHttp {
    field: String,
    vector: Vec<f32>,
    #[serde(default = "default_k")]
    k: usize,
}

fn default_k() -> usize {
    10
}

#[derive(Deserialize, Default)]
struct SearchRequestHttp {
    search: Option<String>,
    filter: Option<String>,
    select: Option<Vec<String>>,
    #[serde(default)]
    order_by: Vec<String>,
    #[serde(default = "default_top")]
    top: usize,
    #[serde(default)]
    skip: usize,
    #[serde(default)]
    count: bool,
    #[serde(default)]
    search_fields: Option<Vec<String>>,
    #[serde(default)]
    facets: Vec<String>,
    #[serde(default)]
    vector_queries: Vec<VectorQueryHttp>,
    #[serde(default)]
    scoring_profile: Option<String>,
}

fn default_top() -> usize {
    50
}

fn parse_order_by(raw: &[String]) -> Vec<(String, OrderDirection)> {
    raw.iter()
        .map(|clause| {
            let mut parts = clause.split_whitespace();
            let field = parts.next().unwrap_or_default().to_string();
            let direction = match parts.next() {
                Some("desc") => OrderDirection::Desc,
                _ => OrderDirection::Asc,
            };
            (field, direction)
        })
        .collect()
}

impl From<SearchRequestHttp> for SearchRequest {
    fn from(http: SearchRequestHttp) -> Self {
        SearchRequest {
            search: http.search,
            filter: http.filter,
            select: http.select,
            order_by: parse_order_by(&http.order_by),
            top: http.top,
            skip: http.skip,
            count: http.count,
            search_fields: http.search_fields,
            facets: http.facets,
            vector_queries: http.vector_queries.into_iter().map(|v| VectorQueryRequest { field: v.field, vector: v.vector, k: v.k }).collect(),
            scoring_profile: http.scoring_profile,
            query_type: QueryType::Simple,
            debug: DebugMode::None,
            ..SearchRequest::default()
        }
    }
}

#[derive(Serialize)]
struct SearchResponseHttp {
    #[serde(rename = "@odata.count", skip_serializing_if = "Option::is_none")]
    count: Option<usize>,
    value: Vec<serde_json::Value>,
}

async fn search_docs(State(ctx): State<SharedServerContext>, Path(name): Path<String>, Json(request): Json<SearchRequestHttp>) -> ApiResponse<SearchResponseHttp> {
    let definition = ctx.indexes.get(&name).ok_or_else(|| to_http_err(ApiError::NotFound(name.clone())))?;
    let request: SearchRequest = request.into();
    let response = ctx
        .with_index(&name, |index, vectors| crate::query::execute(&definition, index, vectors, &request, chrono::Utc::now()))
        .ok_or_else(|| to_http_err(ApiError::NotFound(name)))?
        .map_err(to_http_err)?;

    let value = response
        .results
        .into_iter()
        .map(|hit| {
            let mut doc = hit.document;
            if let serde_json::Value::Object(map) = &mut doc {
                map.insert("@search.score".to_string(), serde_json::json!(hit.score));
            }
            doc
        })
        .collect();
    Ok(Json(SearchResponseHttp { count: response.count, value }))
}

#[derive(Deserialize)]
struct SuggestRequestHttp {
    search: String,
    #[serde(rename = "suggesterName")]
    suggester_name: String,
    #[serde(default = "default_top")]
    top: usize,
}

async fn suggest_docs(State(ctx): State<SharedServerContext>, Path(name): Path<String>, Json(req): Json<SuggestRequestHttp>) -> ApiResponse<ODataCollection<serde_json::Value>> {
    let definition = ctx.indexes.get(&name).ok_or_else(|| to_http_err(ApiError::NotFound(name.clone())))?;
    let hits = ctx
        .with_index(&name, |index, _| suggest::suggest(index, &definition, &req.suggester_name, &req.search, None, req.top, "<em>", "</em>"))
        .ok_or_else(|| to_http_err(ApiError::NotFound(name)))?
        .map_err(to_http_err)?;
    let value = hits.into_iter().map(|h| serde_json::json!({"@search.text": h.highlighted_text, "key": h.key})).collect();
    Ok(Json(collection(value)))
}

#[derive(Deserialize)]
struct AutocompleteRequestHttp {
    search: String,
    #[serde(rename = "suggesterName")]
    suggester_name: String,
    #[serde(default)]
    mode: Option<String>,
    #[serde(default = "default_top")]
    top: usize,
}

async fn autocomplete_docs(State(ctx): State<SharedServerContext>, Path(name): Path<String>, Json(req): Json<AutocompleteRequestHttp>) -> ApiResponse<ODataCollection<serde_json::Value>> {
    let definition = ctx.indexes.get(&name).ok_or_else(|| to_http_err(ApiError::NotFound(name.clone())))?;
    let mode = match req.mode.as_deref() {
        Some("twoTerms") => AutocompleteMode::TwoTerms,
        Some("oneTermWithContext") => AutocompleteMode::OneTermWithContext,
        _ => AutocompleteMode::OneTerm,
    };
    let hits = ctx
        .with_index(&name, |index, _| suggest::autocomplete(index, &definition, &ctx.analyzers, &req.suggester_name, &req.search, mode, req.top))
        .ok_or_else(|| to_http_err(ApiError::NotFound(name)))?
        .map_err(to_http_err)?;
    let value = hits.into_iter().map(|h| serde_json::json!({"text": h.text, "queryPlusText": h.query_plus_text})).collect();
    Ok(Json(collection(value)))
}

// ---- /datasources -----------------------------------------------------

async fn list_datasources(State(ctx): State<SharedServerContext>) -> Json<ODataCollection<DataSourceDefinition>> {
    Json(collection(ctx.data_sources.list()))
}

async fn get_datasource(State(ctx): State<SharedServerContext>, Path(name): Path<String>) -> ApiResponse<DataSourceDefinition> {
    ctx.data_sources.get(&name).map(Json).ok_or_else(|| to_http_err(ApiError::NotFound(name)))
}

async fn create_datasource(State(ctx): State<SharedServerContext>, Json(definition): Json<DataSourceDefinition>) -> ApiResponse<DataSourceDefinition> {
    ctx.data_sources.create(definition).map(Json).map_err(to_http_err)
}

async fn delete_datasource(State(ctx): State<SharedServerContext>, Path(name): Path<String>, headers: HeaderMap) -> Result<StatusCode, (StatusCode, Json<ErrorBody>)> {
    ctx.data_sources.delete(&name, if_match(&headers)).map_err(to_http_err)?;
    Ok(StatusCode::NO_CONTENT)
}

// ---- /indexers ---------------------------------------------------------

async fn list_indexers(State(ctx): State<SharedServerContext>) -> Json<ODataCollection<IndexerDefinition>> {
    Json(collection(ctx.indexers.list()))
}

async fn get_indexer(State(ctx): State<SharedServerContext>, Path(name): Path<String>) -> ApiResponse<IndexerDefinition> {
    ctx.indexers.get(&name).map(Json).ok_or_else(|| to_http_err(ApiError::NotFound(name)))
}

async fn create_indexer(State(ctx): State<SharedServerContext>, Json(definition): Json<IndexerDefinition>) -> ApiResponse<IndexerDefinition> {
    ctx.indexers.create(definition).map(Json).map_err(to_http_err)
}

async fn delete_indexer(State(ctx): State<SharedServerContext>, Path(name): Path<String>, headers: HeaderMap) -> Result<StatusCode, (StatusCode, Json<ErrorBody>)> {
    ctx.indexers.delete(&name, if_match(&headers)).map_err(to_http_err)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn indexer_status(State(ctx): State<SharedServerContext>, Path(name): Path<String>) -> ApiResponse<serde_json::Value> {
    let status = ctx.indexer_status(&name).ok_or_else(|| to_http_err(ApiError::NotFound(name)))?;
    Ok(Json(serde_json::json!({
        "status": format!("{:?}", status.status),
        "lastResult": status.last_result.map(|r| serde_json::json!({
            "itemsProcessed": r.items_processed,
            "itemsFailed": r.items_failed,
            "errors": r.errors,
            "warnings": r.warnings,
            "finalTrackingState": r.final_tracking_state,
        })),
        "executionHistory": status.history.len(),
    })))
}

async fn run_indexer(State(ctx): State<SharedServerContext>, Path(name): Path<String>) -> Result<StatusCode, (StatusCode, Json<ErrorBody>)> {
    let indexer = ctx.indexers.get(&name).ok_or_else(|| to_http_err(ApiError::NotFound(name.clone())))?;
    if indexer.disabled {
        return Err(to_http_err(ApiError::InvalidRequest(format!("indexer '{name}' is disabled"))));
    }
    let data_source = ctx.data_sources.get(&indexer.data_source_name).ok_or_else(|| to_http_err(ApiError::NotFound(indexer.data_source_name.clone())))?;
    let skillset = indexer.skillset_name.as_ref().and_then(|n| ctx.get_skillset(n));

    ctx.try_begin_indexer_run(&name).map_err(to_http_err)?;
    let outcome = ctx.run_indexer(&indexer, &data_source, skillset.as_ref()).await;
    ctx.end_indexer_run(&name);

    match outcome {
        Ok(result) => {
            ctx.record_indexer_result(&name, result);
            Ok(StatusCode::ACCEPTED)
        }
        Err(err) => Err(to_http_err(err)),
    }
}

async fn reset_indexer(State(ctx): State<SharedServerContext>, Path(name): Path<String>) -> Result<StatusCode, (StatusCode, Json<ErrorBody>)> {
    ctx.indexers.get(&name).ok_or_else(|| to_http_err(ApiError::NotFound(name.clone())))?;
    ctx.record_indexer_result(&name, crate::indexer::ExecutionResult::default());
    Ok(StatusCode::NO_CONTENT)
}

// ---- /servicestats ------------------------------------------------------

async fn service_stats(State(ctx): State<SharedServerContext>) -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "counters": {
            "indexesCount": ctx.indexes.list().len(),
            "indexersCount": ctx.indexers.list().len(),
            "dataSourcesCount": ctx.data_sources.list().len(),
        }
    }))
}

pub fn router(ctx: SharedServerContext) -> Router {
    Router::new()
        .route("/indexes", get(list_indexes).post(create_index))
        .route("/indexes/:name", get(get_index).put(put_index).delete(delete_index))
        .route("/indexes/:name/stats", get(index_stats))
        .route("/indexes/:name/docs/index", post(index_docs))
        .route("/indexes/:name/docs/search", post(search_docs))
        .route("/indexes/:name/docs/suggest", post(suggest_docs))
        .route("/indexes/:name/docs/autocomplete", post(autocomplete_docs))
        .route("/indexes/:name/docs/:key", get(get_doc))
        .route("/indexes/:name/docs/$count", get(doc_count))
        .route("/datasources", get(list_datasources).post(create_datasource))
        .route("/datasources/:name", get(get_datasource).delete(delete_datasource))
        .route("/indexers", get(list_indexers).post(create_indexer))
        .route("/indexers/:name", get(get_indexer).delete(delete_indexer))
        .route("/indexers/:name/run", post(run_indexer))
        .route("/indexers/:name/reset", post(reset_indexer))
        .route("/indexers/:name/status", get(indexer_status))
        .route("/servicestats", get(service_stats))
        .with_state(ctx)
}
