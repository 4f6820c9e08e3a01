//! Remote skills that call out over HTTP: CustomWebApi and the cloud
//! (OpenAI-compatible) EmbeddingSkill (spec.md §4.10), generalizing the
//! teacher's `HttpSemanticGen`/`SessionClient` request/response + timing
//! pattern.

use super::{SkillExecResult, SkillRunContext};
use crate::value::{from_json, to_json, Value};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};

#[derive(Debug, Clone)]
pub struct CustomWebApiConfig {
    pub uri: String,
    pub method: String,
    pub headers: HashMap<String, String>,
    pub timeout: Duration,
}

impl Default for CustomWebApiConfig {
    fn default() -> Self {
        Self { uri: String::new(), method: "POST".to_string(), headers: HashMap::new(), timeout: Duration::from_secs(30) }
    }
}

#[derive(Debug, Serialize)]
struct WebApiRecord {
    #[serde(rename = "recordId")]
    record_id: String,
    data: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Serialize)]
struct WebApiRequest {
    values: Vec<WebApiRecord>,
}

#[derive(Debug, Deserialize, Default)]
struct WebApiResultRecord {
    #[serde(default)]
    data: serde_json::Map<String, serde_json::Value>,
    #[serde(default)]
    warnings: Vec<String>,
    #[serde(default)]
    errors: Vec<String>,
}

#[derive(Debug, Deserialize, Default)]
struct WebApiResponse {
    #[serde(default)]
    values: Vec<WebApiResultRecord>,
}

pub async fn exec_webapi(cfg: &CustomWebApiConfig, inputs: &HashMap<String, Value>, ctx: &SkillRunContext) -> SkillExecResult {
    let data: serde_json::Map<String, serde_json::Value> = inputs.iter().map(|(k, v)| (k.clone(), to_json(v))).collect();
    let request = WebApiRequest { values: vec![WebApiRecord { record_id: "0".to_string(), data }] };

    let mut builder = match cfg.method.to_ascii_uppercase().as_str() {
        "GET" => ctx.http_client.get(&cfg.uri),
        "PUT" => ctx.http_client.put(&cfg.uri),
        _ => ctx.http_client.post(&cfg.uri),
    };
    for (name, value) in &cfg.headers {
        builder = builder.header(name, value);
    }
    builder = builder.timeout(cfg.timeout).json(&request);

    let started = Instant::now();
    let sent = tokio::select! {
        res = builder.send() => res,
        _ = ctx.cancellation.cancelled() => {
            return SkillExecResult::failed("CustomWebApiSkill: cancelled before response");
        }
    };

    let response = match sent {
        Ok(r) => r,
        Err(e) => return SkillExecResult::failed(format!("CustomWebApiSkill: request to '{}' failed: {e}", cfg.uri)),
    };
    if !response.status().is_success() {
        let status = response.status();
        return SkillExecResult::failed(format!("CustomWebApiSkill: '{}' returned {status}", cfg.uri));
    }
    let parsed: WebApiResponse = match response.json().await {
        Ok(p) => p,
        Err(e) => return SkillExecResult::failed(format!("CustomWebApiSkill: invalid response body: {e}")),
    };
    tracing::info!(uri = %cfg.uri, elapsed_ms = started.elapsed().as_millis(), "CustomWebApiSkill call completed");

    let Some(record) = parsed.values.into_iter().next() else {
        return SkillExecResult::failed("CustomWebApiSkill: response contained no records");
    };
    let outputs: HashMap<String, Value> = record.data.into_iter().map(|(k, v)| (k, from_json(v))).collect();
    SkillExecResult { outputs, warnings: record.warnings, errors: record.errors.clone(), success: record.errors.is_empty() }
}

#[derive(Debug, Clone)]
pub struct EmbeddingCloudConfig {
    pub resource_uri: String,
    pub deployment_id: String,
    pub api_key: String,
    pub max_input_chars: usize,
}

impl Default for EmbeddingCloudConfig {
    fn default() -> Self {
        Self { resource_uri: String::new(), deployment_id: String::new(), api_key: String::new(), max_input_chars: 8000 }
    }
}

#[derive(Debug, Serialize)]
struct EmbeddingsRequest<'a> {
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbeddingsDatum {
    embedding: Vec<f32>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingsDatum>,
}

/// Calls `{resourceUri}/openai/deployments/{deploymentId}/embeddings`
/// (spec.md §4.10 EmbeddingSkill/cloud). No retries are attempted.
pub async fn exec_embedding_cloud(cfg: &EmbeddingCloudConfig, inputs: &HashMap<String, Value>, ctx: &SkillRunContext) -> SkillExecResult {
    let Some(text) = inputs.get("text").and_then(Value::as_str) else {
        return SkillExecResult::failed("AzureOpenAIEmbeddingSkill: required input 'text' is missing");
    };

    let mut warnings = Vec::new();
    let truncated: String = if text.chars().count() > cfg.max_input_chars {
        warnings.push(format!("input truncated to {} characters", cfg.max_input_chars));
        text.chars().take(cfg.max_input_chars).collect()
    } else {
        text.to_string()
    };

    let url = format!("{}/openai/deployments/{}/embeddings", cfg.resource_uri.trim_end_matches('/'), cfg.deployment_id);
    let started = Instant::now();
    let sent = tokio::select! {
        res = ctx.http_client.post(&url).header("api-key", &cfg.api_key).json(&EmbeddingsRequest { input: &truncated }).send() => res,
        _ = ctx.cancellation.cancelled() => {
            return SkillExecResult::failed("AzureOpenAIEmbeddingSkill: cancelled before response");
        }
    };

    let response = match sent {
        Ok(r) => r,
        Err(e) => return SkillExecResult::failed(format!("AzureOpenAIEmbeddingSkill: request failed: {e}")),
    };
    if !response.status().is_success() {
        let status = response.status();
        return SkillExecResult::failed(format!("AzureOpenAIEmbeddingSkill: endpoint returned {status}"));
    }
    let parsed: EmbeddingsResponse = match response.json().await {
        Ok(p) => p,
        Err(e) => return SkillExecResult::failed(format!("AzureOpenAIEmbeddingSkill: invalid response body: {e}")),
    };
    tracing::info!(deployment = %cfg.deployment_id, elapsed_ms = started.elapsed().as_millis(), "embedding call completed");

    let Some(datum) = parsed.data.into_iter().next() else {
        return SkillExecResult::failed("AzureOpenAIEmbeddingSkill: response contained no embeddings");
    };
    let mut outputs = HashMap::new();
    outputs.insert("embedding".to_string(), Value::Vector(datum.embedding));
    SkillExecResult { outputs, warnings, errors: Vec::new(), success: true }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn truncation_warns_when_over_cap() {
        let cfg = EmbeddingCloudConfig { max_input_chars: 3, ..Default::default() };
        let text = "abcdef";
        assert!(text.chars().count() > cfg.max_input_chars);
    }
}
