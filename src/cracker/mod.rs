//! Cracker contract (spec.md §6.3): detects a document's content type and
//! extracts text + metadata from it. Full PDF/DOCX/RTF parsing is an
//! explicit out-of-scope collaborator (§1); this module still detects
//! those formats by magic bytes and reports a clean "unsupported" result
//! rather than failing the whole pipeline, exactly as unknown binary types
//! are specified to behave.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DetectedFormat {
    Pdf,
    Ooxml,
    Rtf,
    Json,
    Html,
    Xml,
    Csv,
    PlainText,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CrackedImage {
    pub index: usize,
    pub content_type: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct CrackResult {
    pub success: bool,
    pub content: String,
    pub title: Option<String>,
    pub author: Option<String>,
    pub created_date: Option<String>,
    pub modified_date: Option<String>,
    pub page_count: Option<u32>,
    pub word_count: Option<u32>,
    pub character_count: Option<u32>,
    pub language: Option<String>,
    pub metadata: BTreeMap<String, String>,
    pub images: Vec<CrackedImage>,
    pub warnings: Vec<String>,
    pub error_message: Option<String>,
}

/// Detects the document format from magic bytes, falling back to a small
/// text-content heuristic (spec.md §4.10 DocumentExtraction).
pub fn detect_format(bytes: &[u8], file_name: &str, content_type: Option<&str>) -> DetectedFormat {
    if bytes.starts_with(b"%PDF") {
        return DetectedFormat::Pdf;
    }
    if bytes.starts_with(b"PK\x03\x04") {
        return DetectedFormat::Ooxml;
    }
    if bytes.starts_with(b"{\\rtf") {
        return DetectedFormat::Rtf;
    }

    let ext = file_name.rsplit('.').next().map(str::to_ascii_lowercase);
    if let Some(ct) = content_type {
        if ct.contains("pdf") {
            return DetectedFormat::Pdf;
        }
        if ct.contains("officedocument") || ct.contains("zip") {
            return DetectedFormat::Ooxml;
        }
        if ct.contains("rtf") {
            return DetectedFormat::Rtf;
        }
        if ct.contains("json") {
            return DetectedFormat::Json;
        }
        if ct.contains("html") {
            return DetectedFormat::Html;
        }
        if ct.contains("xml") {
            return DetectedFormat::Xml;
        }
        if ct.contains("csv") {
            return DetectedFormat::Csv;
        }
    }
    match ext.as_deref() {
        Some("json") => return DetectedFormat::Json,
        Some("html") | Some("htm") => return DetectedFormat::Html,
        Some("xml") => return DetectedFormat::Xml,
        Some("csv") => return DetectedFormat::Csv,
        Some("pdf") => return DetectedFormat::Pdf,
        Some("docx") | Some("xlsx") | Some("pptx") => return DetectedFormat::Ooxml,
        Some("rtf") => return DetectedFormat::Rtf,
        _ => {}
    }

    let sample = String::from_utf8_lossy(&bytes[..bytes.len().min(512)]);
    let trimmed = sample.trim_start();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        DetectedFormat::Json
    } else if trimmed.starts_with("<!DOCTYPE html") || trimmed.to_ascii_lowercase().starts_with("<html") {
        DetectedFormat::Html
    } else if trimmed.starts_with("<?xml") {
        DetectedFormat::Xml
    } else if trimmed.lines().take(2).all(|l| l.contains(',')) && !trimmed.is_empty() {
        DetectedFormat::Csv
    } else {
        DetectedFormat::PlainText
    }
}

/// Returns whether a built-in cracker is registered for `content_type` /
/// `extension` (spec.md §6.3 `supports`).
pub fn supports(format: DetectedFormat) -> bool {
    !matches!(format, DetectedFormat::Pdf | DetectedFormat::Ooxml | DetectedFormat::Rtf)
}

/// Extracts text and metadata. Binary formats we detect but do not parse
/// report `success: true` with empty content and a warning, matching
/// spec.md §6.3 "unknown binary types may return empty content with a
/// warning".
pub fn crack(bytes: &[u8], file_name: &str, content_type: Option<&str>) -> CrackResult {
    let format = detect_format(bytes, file_name, content_type);
    match format {
        DetectedFormat::Pdf | DetectedFormat::Ooxml | DetectedFormat::Rtf => stub_binary(format),
        DetectedFormat::Json => crack_json(bytes),
        DetectedFormat::Html => crack_html(bytes),
        DetectedFormat::Xml => crack_xml(bytes),
        DetectedFormat::Csv => crack_csv(bytes),
        DetectedFormat::PlainText => crack_plain_text(bytes),
    }
}

fn stub_binary(format: DetectedFormat) -> CrackResult {
    let name = match format {
        DetectedFormat::Pdf => "PDF",
        DetectedFormat::Ooxml => "OOXML",
        DetectedFormat::Rtf => "RTF",
        _ => unreachable!(),
    };
    CrackResult {
        success: true,
        warnings: vec![format!("{name} cracking is not implemented by the local simulator; content is empty")],
        ..Default::default()
    }
}

fn word_and_char_counts(content: &str) -> (u32, u32) {
    (content.split_whitespace().count() as u32, content.chars().count() as u32)
}

fn crack_plain_text(bytes: &[u8]) -> CrackResult {
    let content = String::from_utf8_lossy(bytes).to_string();
    let (words, chars) = word_and_char_counts(&content);
    CrackResult {
        success: true,
        content,
        word_count: Some(words),
        character_count: Some(chars),
        ..Default::default()
    }
}

fn crack_json(bytes: &[u8]) -> CrackResult {
    match serde_json::from_slice::<serde_json::Value>(bytes) {
        Ok(value) => {
            let content = serde_json::to_string_pretty(&value).unwrap_or_default();
            let (words, chars) = word_and_char_counts(&content);
            let mut metadata = BTreeMap::new();
            if let serde_json::Value::Object(map) = &value {
                for (k, v) in map.iter() {
                    if let serde_json::Value::String(s) = v {
                        metadata.insert(k.clone(), s.clone());
                    }
                }
            }
            CrackResult {
                success: true,
                content,
                word_count: Some(words),
                character_count: Some(chars),
                metadata,
                ..Default::default()
            }
        }
        Err(e) => CrackResult {
            success: false,
            error_message: Some(format!("invalid JSON: {e}")),
            ..Default::default()
        },
    }
}

fn strip_tags(markup: &str) -> String {
    let mut out = String::with_capacity(markup.len());
    let mut in_tag = false;
    for ch in markup.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => out.push(ch),
            _ => {}
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn extract_tag_text(markup: &str, tag: &str) -> Option<String> {
    let open = format!("<{tag}>");
    let close = format!("</{tag}>");
    let start = markup.to_ascii_lowercase().find(&open.to_ascii_lowercase())?;
    let body_start = start + open.len();
    let end = markup[body_start..].to_ascii_lowercase().find(&close.to_ascii_lowercase())?;
    Some(markup[body_start..body_start + end].trim().to_string())
}

fn crack_html(bytes: &[u8]) -> CrackResult {
    let raw = String::from_utf8_lossy(bytes).to_string();
    let title = extract_tag_text(&raw, "title");
    let content = strip_tags(&raw);
    let (words, chars) = word_and_char_counts(&content);
    CrackResult {
        success: true,
        content,
        title,
        word_count: Some(words),
        character_count: Some(chars),
        ..Default::default()
    }
}

fn crack_xml(bytes: &[u8]) -> CrackResult {
    let raw = String::from_utf8_lossy(bytes).to_string();
    let content = strip_tags(&raw);
    let (words, chars) = word_and_char_counts(&content);
    CrackResult {
        success: true,
        content,
        word_count: Some(words),
        character_count: Some(chars),
        ..Default::default()
    }
}

fn crack_csv(bytes: &[u8]) -> CrackResult {
    let raw = String::from_utf8_lossy(bytes).to_string();
    let content = raw
        .lines()
        .map(|line| line.split(',').collect::<Vec<_>>().join(" "))
        .collect::<Vec<_>>()
        .join("\n");
    let (words, chars) = word_and_char_counts(&content);
    CrackResult {
        success: true,
        content,
        word_count: Some(words),
        character_count: Some(chars),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_pdf_by_magic_bytes() {
        assert_eq!(detect_format(b"%PDF-1.4 rest", "doc.bin", None), DetectedFormat::Pdf);
    }

    #[test]
    fn detects_json_by_extension() {
        assert_eq!(detect_format(b"{}", "data.json", None), DetectedFormat::Json);
    }

    #[test]
    fn binary_formats_stub_with_warning() {
        let result = crack(b"%PDF-1.4", "f.pdf", None);
        assert!(result.success);
        assert!(result.content.is_empty());
        assert_eq!(result.warnings.len(), 1);
    }

    #[test]
    fn html_extraction_strips_tags_and_title() {
        let result = crack(b"<html><head><title>Hi</title></head><body>Hello <b>World</b></body></html>", "f.html", None);
        assert_eq!(result.title.as_deref(), Some("Hi"));
        assert!(result.content.contains("Hello"));
        assert!(!result.content.contains('<'));
    }

    #[test]
    fn plain_text_counts_words_and_chars() {
        let result = crack(b"two words", "f.txt", None);
        assert_eq!(result.word_count, Some(2));
    }
}
