//! Skill executors (spec.md §4.10): a tagged variant per skill type,
//! dispatched through one `execute` operation (§9 redesign note replacing
//! the source's deep class hierarchy).

mod embedding_local;
mod extraction;
mod remote;
mod text;

pub use embedding_local::{EmbeddingLocalConfig, LocalEmbeddingModel};
pub use extraction::DocumentExtractionConfig;
pub use remote::{CustomWebApiConfig, EmbeddingCloudConfig};
pub use text::{ConditionalConfig, MergeTextConfig, ShaperConfig, SplitTextConfig, TextSplitMode};

use crate::enrich::EnrichedDocument;
use crate::value::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Resources shared across skill invocations within one pipeline run:
/// an HTTP-client pool (spec.md §5 "HTTP-client pool is shared across
/// skill invocations") and the local-embedding model cache.
#[derive(Clone)]
pub struct SkillRunContext {
    pub http_client: reqwest::Client,
    pub models_dir: std::path::PathBuf,
    pub default_timeout: Duration,
    pub cancellation: tokio_util::sync::CancellationToken,
}

impl SkillRunContext {
    pub fn new(models_dir: impl Into<std::path::PathBuf>) -> Self {
        Self {
            http_client: reqwest::Client::new(),
            models_dir: models_dir.into(),
            default_timeout: Duration::from_secs(30),
            cancellation: tokio_util::sync::CancellationToken::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SkillInput {
    pub name: String,
    /// Absolute (`/document/...`) or context-relative (no leading `/`) path.
    pub source: String,
}

#[derive(Debug, Clone)]
pub struct SkillOutput {
    pub name: String,
    pub target_name: Option<String>,
}

impl SkillOutput {
    pub fn target(&self) -> &str {
        self.target_name.as_deref().unwrap_or(&self.name)
    }
}

#[derive(Debug, Clone)]
pub enum SkillKind {
    Split(SplitTextConfig),
    Merge(MergeTextConfig),
    Shaper(ShaperConfig),
    Conditional(ConditionalConfig),
    WebApi(CustomWebApiConfig),
    EmbeddingCloud(EmbeddingCloudConfig),
    EmbeddingLocal(EmbeddingLocalConfig),
    DocumentExtraction(DocumentExtractionConfig),
    /// An `odataType` the registry does not recognize; the pipeline runner
    /// skips it with a warning rather than failing skillset load (spec.md
    /// §4.11).
    Unregistered(String),
}

#[derive(Debug, Clone)]
pub struct Skill {
    pub name: Option<String>,
    pub context: String,
    pub inputs: Vec<SkillInput>,
    pub outputs: Vec<SkillOutput>,
    pub kind: SkillKind,
}

impl Skill {
    pub fn new(context: impl Into<String>, kind: SkillKind) -> Self {
        Self { name: None, context: context.into(), inputs: Vec::new(), outputs: Vec::new(), kind }
    }

    pub fn odata_type(&self) -> &'static str {
        match self.kind {
            SkillKind::Split(_) => "#Microsoft.Skills.Text.SplitSkill",
            SkillKind::Merge(_) => "#Microsoft.Skills.Text.MergeSkill",
            SkillKind::Shaper(_) => "#Microsoft.Skills.Util.ShaperSkill",
            SkillKind::Conditional(_) => "#Microsoft.Skills.Util.ConditionalSkill",
            SkillKind::WebApi(_) => "#Microsoft.Skills.Custom.WebApiSkill",
            SkillKind::EmbeddingCloud(_) => "#Microsoft.Skills.Text.AzureOpenAIEmbeddingSkill",
            SkillKind::EmbeddingLocal(_) => "#Microsoft.Skills.Text.LocalEmbeddingSkill",
            SkillKind::DocumentExtraction(_) => "#Microsoft.Skills.Util.DocumentExtractionSkill",
            SkillKind::Unregistered(_) => "unregistered",
        }
    }
}

/// Outcome of running one skill's executor body once, before output
/// targets are resolved against the enriched document.
#[derive(Debug, Default)]
pub struct SkillExecResult {
    pub outputs: HashMap<String, Value>,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
    pub success: bool,
}

impl SkillExecResult {
    pub fn ok(outputs: HashMap<String, Value>) -> Self {
        Self { outputs, success: true, ..Default::default() }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self { errors: vec![error.into()], success: false, ..Default::default() }
    }
}

/// Accumulated outcome of running a skill across every context it matches
/// (spec.md §4.10 "iterates over the contexts that match its context
/// path").
#[derive(Debug, Default, Clone)]
pub struct SkillOutcome {
    pub success: bool,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

fn resolve_path(context: &str, source: &str) -> String {
    if source.starts_with('/') {
        source.to_string()
    } else {
        format!("{context}/{source}")
    }
}

fn gather_inputs(skill: &Skill, enriched: &EnrichedDocument, context: &str) -> HashMap<String, Value> {
    skill
        .inputs
        .iter()
        .map(|input| {
            let path = resolve_path(context, &input.source);
            (input.name.clone(), enriched.get(&path).cloned().unwrap_or(Value::Null))
        })
        .collect()
}

/// Runs `skill` across every context matching `skill.context`, resolving
/// inputs relative to each context and writing outputs back under
/// `<context>/<targetName>` (spec.md §4.10 uniform skill contract).
pub async fn execute(skill: &Skill, enriched: &mut EnrichedDocument, ctx: &SkillRunContext) -> SkillOutcome {
    if let SkillKind::Unregistered(name) = &skill.kind {
        return SkillOutcome {
            success: true,
            warnings: vec![format!("skill type '{name}' has no registered executor, skipping")],
            errors: Vec::new(),
        };
    }

    let contexts = enriched.matching_contexts(&skill.context);
    let mut outcome = SkillOutcome { success: true, ..Default::default() };
    if contexts.is_empty() {
        outcome.warnings.push(format!("skill context '{}' matched no paths", skill.context));
        return outcome;
    }

    for context in contexts {
        let inputs = gather_inputs(skill, enriched, &context);
        let result = run_one(skill, &inputs, ctx).await;

        for output in &skill.outputs {
            if let Some(value) = result.outputs.get(&output.name) {
                enriched.set(&format!("{context}/{}", output.target()), value.clone());
            }
        }

        outcome.success &= result.success;
        outcome.warnings.extend(result.warnings);
        outcome.errors.extend(result.errors);
    }
    outcome
}

async fn run_one(skill: &Skill, inputs: &HashMap<String, Value>, ctx: &SkillRunContext) -> SkillExecResult {
    match &skill.kind {
        SkillKind::Split(cfg) => text::exec_split(cfg, inputs),
        SkillKind::Merge(cfg) => text::exec_merge(cfg, inputs),
        SkillKind::Shaper(cfg) => text::exec_shaper(cfg, skill, inputs),
        SkillKind::Conditional(cfg) => text::exec_conditional(cfg, inputs),
        SkillKind::WebApi(cfg) => remote::exec_webapi(cfg, inputs, ctx).await,
        SkillKind::EmbeddingCloud(cfg) => remote::exec_embedding_cloud(cfg, inputs, ctx).await,
        SkillKind::EmbeddingLocal(cfg) => embedding_local::exec_embedding_local(cfg, inputs, ctx).await,
        SkillKind::DocumentExtraction(cfg) => extraction::exec_document_extraction(cfg, inputs),
        SkillKind::Unregistered(_) => unreachable!("handled before context resolution in execute()"),
    }
}

/// Arc-shared handle so multiple pipeline runs can reuse one HTTP client
/// and model cache.
pub type SharedSkillRunContext = Arc<SkillRunContext>;
