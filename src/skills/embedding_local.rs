//! Local EmbeddingSkill: BERT-style wordpiece tokenization + ONNX Runtime
//! inference with mean/max pooling (spec.md §4.10 EmbeddingSkill/local).
//! Models are lazy-loaded once per directory and shared across calls.

use super::{SkillExecResult, SkillRunContext};
use crate::value::Value;
use once_cell::sync::Lazy;
use ort::inputs;
use ort::session::Session;
use ort::value::Tensor;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokenizers::Tokenizer;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolingMode {
    Mean,
    Max,
}

#[derive(Debug, Clone)]
pub struct EmbeddingLocalConfig {
    pub model_name: String,
    pub pooling: PoolingMode,
    pub normalize: bool,
}

impl Default for EmbeddingLocalConfig {
    fn default() -> Self {
        Self { model_name: "default".to_string(), pooling: PoolingMode::Mean, normalize: true }
    }
}

pub struct LocalEmbeddingModel {
    tokenizer: Tokenizer,
    /// `ort::Session::run` takes `&mut self`; the model is shared across
    /// concurrent skill invocations via `Arc`, so calls are serialized here
    /// the same way `VectorStore` serializes its HNSW graph (spec.md §4.10
    /// "Models are lazy-loaded once and shared across calls").
    session: Mutex<Session>,
}

static MODEL_CACHE: Lazy<Mutex<HashMap<PathBuf, Arc<LocalEmbeddingModel>>>> = Lazy::new(|| Mutex::new(HashMap::new()));

fn load_model(models_dir: &Path, model_name: &str) -> Result<Arc<LocalEmbeddingModel>, String> {
    let model_dir = models_dir.join(model_name);
    let mut cache = MODEL_CACHE.lock();
    if let Some(model) = cache.get(&model_dir) {
        return Ok(model.clone());
    }

    let tokenizer_path = model_dir.join("tokenizer.json");
    let tokenizer = Tokenizer::from_file(&tokenizer_path)
        .map_err(|e| format!("failed to load tokenizer at {tokenizer_path:?}: {e}"))?;

    let model_path = model_dir.join("model.onnx");
    let session = Session::builder()
        .and_then(|b| b.commit_from_file(&model_path))
        .map_err(|e| format!("failed to load ONNX model at {model_path:?}: {e}"))?;

    let model = Arc::new(LocalEmbeddingModel { tokenizer, session: Mutex::new(session) });
    cache.insert(model_dir, model.clone());
    Ok(model)
}

fn pool(token_vectors: &[Vec<f32>], mode: PoolingMode) -> Vec<f32> {
    let dims = token_vectors.first().map(|v| v.len()).unwrap_or(0);
    let mut out = vec![0.0f32; dims];
    match mode {
        PoolingMode::Mean => {
            for vector in token_vectors {
                for (o, v) in out.iter_mut().zip(vector) {
                    *o += v;
                }
            }
            let n = token_vectors.len().max(1) as f32;
            for o in &mut out {
                *o /= n;
            }
        }
        PoolingMode::Max => {
            for vector in token_vectors {
                for (o, v) in out.iter_mut().zip(vector) {
                    if *v > *o {
                        *o = *v;
                    }
                }
            }
        }
    }
    out
}

fn l2_normalize(vector: &mut [f32]) {
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in vector.iter_mut() {
            *v /= norm;
        }
    }
}

pub async fn exec_embedding_local(cfg: &EmbeddingLocalConfig, inputs: &HashMap<String, Value>, ctx: &SkillRunContext) -> SkillExecResult {
    let Some(text) = inputs.get("text").and_then(Value::as_str) else {
        return SkillExecResult::failed("LocalEmbeddingSkill: required input 'text' is missing");
    };

    let models_dir = ctx.models_dir.clone();
    let model_name = cfg.model_name.clone();
    let text = text.to_string();
    let pooling = cfg.pooling;
    let normalize = cfg.normalize;

    let outcome = tokio::task::spawn_blocking(move || -> Result<Vec<f32>, String> {
        let model = load_model(&models_dir, &model_name)?;
        let encoding = model.tokenizer.encode(text.as_str(), true).map_err(|e| e.to_string())?;
        let token_vectors = run_inference(&model.session, &encoding)?;
        let mut pooled = pool(&token_vectors, pooling);
        if normalize {
            l2_normalize(&mut pooled);
        }
        Ok(pooled)
    })
    .await;

    match outcome {
        Ok(Ok(vector)) => {
            let mut outputs = HashMap::new();
            outputs.insert("embedding".to_string(), Value::Vector(vector));
            SkillExecResult::ok(outputs)
        }
        Ok(Err(e)) => SkillExecResult::failed(format!("LocalEmbeddingSkill: {e}")),
        Err(e) => SkillExecResult::failed(format!("LocalEmbeddingSkill: model task panicked: {e}")),
    }
}

/// Runs one BERT-style forward pass (`input_ids`/`attention_mask`/
/// `token_type_ids` in, a `[batch, seq_len, hidden]` last-hidden-state out)
/// and returns the per-token hidden states so the caller can pool them.
fn run_inference(session: &Mutex<Session>, encoding: &tokenizers::Encoding) -> Result<Vec<Vec<f32>>, String> {
    let ids = encoding.get_ids();
    if ids.is_empty() {
        return Err("tokenizer produced no tokens".to_string());
    }
    let seq_len = ids.len();
    let input_ids: Vec<i64> = ids.iter().map(|&id| id as i64).collect();
    let attention_mask: Vec<i64> = encoding.get_attention_mask().iter().map(|&m| m as i64).collect();
    let token_type_ids: Vec<i64> = encoding.get_type_ids().iter().map(|&t| t as i64).collect();

    let input_ids = Tensor::from_array(([1usize, seq_len], input_ids))
        .map_err(|e| format!("failed to build input_ids tensor: {e}"))?;
    let attention_mask = Tensor::from_array(([1usize, seq_len], attention_mask))
        .map_err(|e| format!("failed to build attention_mask tensor: {e}"))?;
    let token_type_ids = Tensor::from_array(([1usize, seq_len], token_type_ids))
        .map_err(|e| format!("failed to build token_type_ids tensor: {e}"))?;

    let mut session = session.lock();
    let outputs = session
        .run(inputs![
            "input_ids" => input_ids,
            "attention_mask" => attention_mask,
            "token_type_ids" => token_type_ids,
        ]
        .map_err(|e| format!("failed to build session inputs: {e}"))?)
        .map_err(|e| format!("onnx inference failed: {e}"))?;

    let output_name = outputs
        .keys()
        .next()
        .map(|k| k.to_string())
        .ok_or_else(|| "model produced no outputs".to_string())?;
    let (shape, data) = outputs[output_name.as_str()]
        .try_extract_tensor::<f32>()
        .map_err(|e| format!("failed to extract model output: {e}"))?;

    let hidden_size = *shape.last().ok_or_else(|| "model output has no dimensions".to_string())? as usize;
    if hidden_size == 0 || data.len() % hidden_size != 0 {
        return Err(format!("model output shape {shape:?} is incompatible with its data length {}", data.len()));
    }
    Ok(data.chunks(hidden_size).map(|chunk| chunk.to_vec()).collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mean_pool_averages_across_tokens() {
        let vectors = vec![vec![1.0, 3.0], vec![3.0, 5.0]];
        let pooled = pool(&vectors, PoolingMode::Mean);
        assert_eq!(pooled, vec![2.0, 4.0]);
    }

    #[test]
    fn max_pool_takes_elementwise_max() {
        let vectors = vec![vec![1.0, 5.0], vec![3.0, 2.0]];
        let pooled = pool(&vectors, PoolingMode::Max);
        assert_eq!(pooled, vec![3.0, 5.0]);
    }

    #[test]
    fn l2_normalize_yields_unit_length() {
        let mut v = vec![3.0, 4.0];
        l2_normalize(&mut v);
        let norm = (v[0] * v[0] + v[1] * v[1]).sqrt();
        assert!((norm - 1.0).abs() < 1e-6);
    }
}
