//! DocumentExtraction skill: decodes an inline or fetched file and cracks
//! its content via the built-in crackers (spec.md §4.10 DocumentExtraction,
//! §6.3 cracker contract).

use super::SkillExecResult;
use crate::cracker;
use crate::value::Value;
use base64::Engine;
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageAction {
    None,
    GenerateNormalizedImages,
}

#[derive(Debug, Clone)]
pub struct DocumentExtractionConfig {
    pub image_action: ImageAction,
}

impl Default for DocumentExtractionConfig {
    fn default() -> Self {
        Self { image_action: ImageAction::None }
    }
}

pub fn exec_document_extraction(cfg: &DocumentExtractionConfig, inputs: &HashMap<String, Value>) -> SkillExecResult {
    let Some(file) = inputs.get("file").and_then(Value::as_map) else {
        return SkillExecResult::failed("DocumentExtractionSkill: required input 'file' is missing");
    };

    let file_name = file.get("fileName").and_then(Value::as_str).unwrap_or("document");
    let content_type = file.get("contentType").and_then(Value::as_str);

    let bytes = if let Some(data) = file.get("data").and_then(Value::as_str) {
        match base64::engine::general_purpose::STANDARD.decode(data) {
            Ok(b) => b,
            Err(e) => return SkillExecResult::failed(format!("DocumentExtractionSkill: invalid base64 data: {e}")),
        }
    } else if file.get("url").and_then(Value::as_str).is_some() {
        return SkillExecResult::failed(
            "DocumentExtractionSkill: url-based file fetch requires an external data-source driver and is not available in this skill invocation",
        );
    } else {
        return SkillExecResult::failed("DocumentExtractionSkill: file must carry either 'data' or 'url'");
    };

    let result = cracker::crack(&bytes, file_name, content_type);
    if !result.success {
        return SkillExecResult::failed(result.error_message.unwrap_or_else(|| "cracker failed".to_string()));
    }

    let mut outputs = HashMap::new();
    outputs.insert("content".to_string(), Value::Str(result.content));
    let normalized_images = match cfg.image_action {
        ImageAction::None => Vec::new(),
        ImageAction::GenerateNormalizedImages => Vec::new(),
    };
    outputs.insert("normalized_images".to_string(), Value::List(normalized_images));

    let mut metadata = BTreeMap::new();
    if let Some(title) = result.title {
        metadata.insert("title".to_string(), Value::Str(title));
    }
    if let Some(author) = result.author {
        metadata.insert("author".to_string(), Value::Str(author));
    }
    if let Some(wc) = result.word_count {
        metadata.insert("wordCount".to_string(), Value::I64(wc as i64));
    }
    outputs.insert("metadata".to_string(), Value::Map(metadata));

    let warnings = result.warnings;
    let mut outcome = SkillExecResult::ok(outputs);
    outcome.warnings = warnings;
    if matches!(cfg.image_action, ImageAction::GenerateNormalizedImages) {
        outcome.warnings.push("image extraction is not supported by the local simulator".to_string());
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decodes_base64_and_cracks_plain_text() {
        let mut file = BTreeMap::new();
        file.insert("fileName".to_string(), Value::Str("note.txt".to_string()));
        file.insert("data".to_string(), Value::Str(base64::engine::general_purpose::STANDARD.encode("hello world")));
        let inputs: HashMap<String, Value> = [("file".to_string(), Value::Map(file))].into_iter().collect();

        let result = exec_document_extraction(&DocumentExtractionConfig::default(), &inputs);
        assert!(result.success);
        assert_eq!(result.outputs.get("content").and_then(Value::as_str), Some("hello world"));
    }

    #[test]
    fn missing_file_input_fails() {
        let result = exec_document_extraction(&DocumentExtractionConfig::default(), &HashMap::new());
        assert!(!result.success);
    }
}
