//! Pure, synchronous skills: SplitText, MergeText, Shaper, Conditional
//! (spec.md §4.10).

use super::{Skill, SkillExecResult};
use crate::value::Value;
use std::collections::{BTreeMap, HashMap};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextSplitMode {
    Pages,
    Sentences,
}

#[derive(Debug, Clone)]
pub struct SplitTextConfig {
    pub mode: TextSplitMode,
    pub maximum_page_length: usize,
    pub page_overlap_length: usize,
}

impl Default for SplitTextConfig {
    fn default() -> Self {
        Self { mode: TextSplitMode::Pages, maximum_page_length: 5000, page_overlap_length: 0 }
    }
}

/// Splits `text` on paragraph, then sentence, then word boundaries,
/// never inside a word, producing chunks up to `max_len` with the last
/// `overlap` characters of each chunk repeated at the start of the next
/// (spec.md §4.10 SplitText "pages" mode).
fn split_pages(text: &str, max_len: usize, overlap: usize) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }
    if max_len == 0 {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let chars: Vec<char> = text.chars().collect();
    let mut start = 0usize;
    while start < chars.len() {
        let mut end = (start + max_len).min(chars.len());
        if end < chars.len() {
            // Prefer a paragraph break, then sentence end, then whitespace,
            // so we never split mid-word.
            let window = &chars[start..end];
            let break_at = find_break(window, &['\n'])
                .or_else(|| find_break(window, &['.', '!', '?']))
                .or_else(|| find_break(window, &[' ', '\t']));
            if let Some(rel) = break_at {
                end = start + rel + 1;
            }
        }
        let chunk: String = chars[start..end].iter().collect();
        chunks.push(chunk.trim().to_string());
        if end >= chars.len() {
            break;
        }
        start = end.saturating_sub(overlap).max(start + 1);
    }
    chunks.into_iter().filter(|c| !c.is_empty()).collect()
}

fn find_break(window: &[char], markers: &[char]) -> Option<usize> {
    window.iter().rposition(|c| markers.contains(c))
}

fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    for ch in text.chars() {
        current.push(ch);
        if matches!(ch, '.' | '!' | '?') {
            let trimmed = current.trim().to_string();
            if !trimmed.is_empty() {
                sentences.push(trimmed);
            }
            current.clear();
        }
    }
    let remainder = current.trim().to_string();
    if !remainder.is_empty() {
        sentences.push(remainder);
    }
    sentences
}

pub fn exec_split(cfg: &SplitTextConfig, inputs: &HashMap<String, Value>) -> SkillExecResult {
    let Some(text) = inputs.get("text").and_then(Value::as_str) else {
        return SkillExecResult::failed("SplitSkill: required input 'text' is missing");
    };
    let chunks = match cfg.mode {
        TextSplitMode::Pages => split_pages(text, cfg.maximum_page_length, cfg.page_overlap_length),
        TextSplitMode::Sentences => split_sentences(text),
    };
    let items = Value::List(
        chunks
            .into_iter()
            .map(|chunk| {
                let mut m = BTreeMap::new();
                m.insert("text".to_string(), Value::Str(chunk));
                Value::Map(m)
            })
            .collect(),
    );
    let mut outputs = HashMap::new();
    outputs.insert("textItems".to_string(), items);
    SkillExecResult::ok(outputs)
}

#[derive(Debug, Clone, Default)]
pub struct MergeTextConfig {
    pub insert_pre_tag: String,
    pub insert_post_tag: String,
}

pub fn exec_merge(cfg: &MergeTextConfig, inputs: &HashMap<String, Value>) -> SkillExecResult {
    let Some(text) = inputs.get("text").and_then(Value::as_str) else {
        return SkillExecResult::failed("MergeSkill: required input 'text' is missing");
    };
    let items = inputs.get("itemsToInsert").and_then(Value::as_list).unwrap_or(&[]);
    let mut merged = text.to_string();
    for item in items {
        if let Some(s) = item.as_str() {
            merged.push_str(&cfg.insert_pre_tag);
            merged.push_str(s);
            merged.push_str(&cfg.insert_post_tag);
        }
    }
    let mut outputs = HashMap::new();
    outputs.insert("mergedText".to_string(), Value::Str(merged));
    SkillExecResult::ok(outputs)
}

#[derive(Debug, Clone, Default)]
pub struct ShaperConfig;

/// Builds a (possibly nested) object from named input paths; an input
/// name containing `/` creates a nested object (spec.md §4.10 Shaper).
pub fn exec_shaper(_cfg: &ShaperConfig, skill: &Skill, inputs: &HashMap<String, Value>) -> SkillExecResult {
    let mut root = BTreeMap::new();
    for input in &skill.inputs {
        let value = inputs.get(&input.name).cloned().unwrap_or(Value::Null);
        let segments: Vec<&str> = input.name.split('/').collect();
        insert_nested(&mut root, &segments, value);
    }
    let mut outputs = HashMap::new();
    outputs.insert("output".to_string(), Value::Map(root));
    SkillExecResult::ok(outputs)
}

fn insert_nested(root: &mut BTreeMap<String, Value>, segments: &[&str], value: Value) {
    if segments.len() == 1 {
        root.insert(segments[0].to_string(), value);
        return;
    }
    let entry = root.entry(segments[0].to_string()).or_insert_with(|| Value::Map(BTreeMap::new()));
    if !matches!(entry, Value::Map(_)) {
        *entry = Value::Map(BTreeMap::new());
    }
    if let Value::Map(nested) = entry {
        insert_nested(nested, &segments[1..], value);
    }
}

#[derive(Debug, Clone)]
pub enum ConditionalOp {
    Eq,
    Ne,
    Truthy,
}

#[derive(Debug, Clone)]
pub struct ConditionalConfig {
    pub path: String,
    pub op: ConditionalOp,
    pub literal: Option<String>,
}

impl ConditionalConfig {
    /// Parses `$(path) == 'literal'`, `$(path) != 'literal'`, or a bare
    /// `$(path)` truthiness check (spec.md §4.10 Conditional).
    pub fn parse(expression: &str) -> Option<Self> {
        let expr = expression.trim();
        let path_start = expr.find("$(")? + 2;
        let path_end = path_start + expr[path_start..].find(')')?;
        let path = expr[path_start..path_end].to_string();
        let rest = expr[path_end + 1..].trim();
        if rest.is_empty() {
            return Some(Self { path, op: ConditionalOp::Truthy, literal: None });
        }
        let (op, rest) = if let Some(r) = rest.strip_prefix("==") {
            (ConditionalOp::Eq, r)
        } else if let Some(r) = rest.strip_prefix("!=") {
            (ConditionalOp::Ne, r)
        } else {
            return None;
        };
        let literal = rest.trim().trim_matches('\'').to_string();
        Some(Self { path, op, literal: Some(literal) })
    }
}

pub fn exec_conditional(cfg: &ConditionalConfig, inputs: &HashMap<String, Value>) -> SkillExecResult {
    let condition_value = inputs.get("condition");
    let matched = match (&cfg.op, condition_value) {
        (ConditionalOp::Truthy, Some(v)) => !v.is_null() && v.as_bool() != Some(false),
        (ConditionalOp::Truthy, None) => false,
        (ConditionalOp::Eq, Some(v)) => Some(v.to_display_string()) == cfg.literal,
        (ConditionalOp::Eq, None) => cfg.literal.as_deref() == Some(""),
        (ConditionalOp::Ne, Some(v)) => Some(v.to_display_string()) != cfg.literal,
        (ConditionalOp::Ne, None) => cfg.literal.as_deref() != Some(""),
    };
    let chosen = if matched { inputs.get("whenTrue") } else { inputs.get("whenFalse") };
    let mut outputs = HashMap::new();
    outputs.insert("output".to_string(), chosen.cloned().unwrap_or(Value::Null));
    SkillExecResult::ok(outputs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn str_input(name: &str, value: &str) -> (String, Value) {
        (name.to_string(), Value::Str(value.to_string()))
    }

    #[test]
    fn split_pages_never_breaks_inside_a_word() {
        let text = "alpha beta gamma delta epsilon zeta eta theta iota kappa";
        let chunks = split_pages(text, 15, 0);
        for chunk in &chunks {
            assert!(text.contains(chunk.trim()));
        }
        assert!(chunks.len() > 1);
    }

    #[test]
    fn split_sentences_breaks_on_terminal_punctuation() {
        let sentences = split_sentences("One. Two! Three?");
        assert_eq!(sentences, vec!["One.", "Two!", "Three?"]);
    }

    #[test]
    fn merge_text_wraps_inserted_items() {
        let cfg = MergeTextConfig { insert_pre_tag: "[".into(), insert_post_tag: "]".into() };
        let inputs: HashMap<String, Value> =
            [str_input("text", "base"), ("itemsToInsert".to_string(), Value::List(vec![Value::Str("extra".into())]))]
                .into_iter()
                .collect();
        let result = exec_merge(&cfg, &inputs);
        assert_eq!(result.outputs.get("mergedText").and_then(Value::as_str), Some("base[extra]"));
    }

    #[test]
    fn conditional_eq_picks_when_true() {
        let cfg = ConditionalConfig::parse("$(/document/lang) == 'en'").unwrap();
        let inputs: HashMap<String, Value> = [
            str_input("condition", "en"),
            str_input("whenTrue", "english"),
            str_input("whenFalse", "other"),
        ]
        .into_iter()
        .collect();
        let result = exec_conditional(&cfg, &inputs);
        assert_eq!(result.outputs.get("output").and_then(Value::as_str), Some("english"));
    }

    #[test]
    fn shaper_nests_slash_separated_input_names() {
        let mut skill = Skill::new("/document", super::super::SkillKind::Shaper(ShaperConfig));
        skill.inputs.push(super::super::SkillInput { name: "metadata/author".into(), source: "author".into() });
        let inputs: HashMap<String, Value> = [("metadata/author".to_string(), Value::Str("me".into()))].into_iter().collect();
        let result = exec_shaper(&ShaperConfig, &skill, &inputs);
        let output = result.outputs.get("output").unwrap();
        let nested = output.as_map().unwrap().get("metadata").unwrap().as_map().unwrap();
        assert_eq!(nested.get("author").and_then(Value::as_str), Some("me"));
    }
}
