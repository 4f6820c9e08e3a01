//! Skill pipeline runner (spec.md §4.11): executes a skillset's skills in
//! declaration order against one enriched document, recording per-skill
//! timing and accumulating warnings/errors.

use crate::enrich::EnrichedDocument;
use crate::skills::{self, Skill, SkillRunContext};
use std::time::Instant;

#[derive(Debug, Clone)]
pub struct SkillTiming {
    pub skill_index: usize,
    pub skill_name: Option<String>,
    pub duration_ms: u128,
    pub warnings: Vec<String>,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Default)]
pub struct PipelineResult {
    pub timings: Vec<SkillTiming>,
    pub halted_at: Option<usize>,
}

impl PipelineResult {
    pub fn errors(&self) -> Vec<&str> {
        self.timings.iter().flat_map(|t| t.errors.iter().map(String::as_str)).collect()
    }

    pub fn warnings(&self) -> Vec<&str> {
        self.timings.iter().flat_map(|t| t.warnings.iter().map(String::as_str)).collect()
    }
}

/// An error mentioning "required" or "configuration" halts the pipeline;
/// any other error lets later skills run (spec.md §4.11, §7).
fn halts_pipeline(errors: &[String]) -> bool {
    errors.iter().any(|e| {
        let lower = e.to_ascii_lowercase();
        lower.contains("required") || lower.contains("configuration")
    })
}

/// Runs every skill in `skills` in order against `enriched`.
pub async fn run(skill_list: &[Skill], enriched: &mut EnrichedDocument, ctx: &SkillRunContext) -> PipelineResult {
    let mut result = PipelineResult::default();

    for (index, skill) in skill_list.iter().enumerate() {
        if ctx.cancellation.is_cancelled() {
            result.timings.push(SkillTiming {
                skill_index: index,
                skill_name: skill.name.clone(),
                duration_ms: 0,
                warnings: Vec::new(),
                errors: vec!["pipeline cancelled".to_string()],
            });
            result.halted_at = Some(index);
            break;
        }

        let started = Instant::now();
        let outcome = skills::execute(skill, enriched, ctx).await;
        let duration_ms = started.elapsed().as_millis();

        tracing::debug!(skill = skill.odata_type(), index, duration_ms, "skill executed");

        let halt = halts_pipeline(&outcome.errors);
        result.timings.push(SkillTiming {
            skill_index: index,
            skill_name: skill.name.clone(),
            duration_ms,
            warnings: outcome.warnings,
            errors: outcome.errors,
        });

        if halt {
            result.halted_at = Some(index);
            break;
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skills::{SkillInput, SkillKind, SplitTextConfig, TextSplitMode};
    use crate::value::Value;

    #[tokio::test]
    async fn runs_skills_in_declaration_order_and_sees_prior_outputs() {
        let mut enriched = EnrichedDocument::new();
        enriched.set("/document/content", Value::Str("one two three four five six seven".to_string()));

        let mut split = Skill::new("/document", SkillKind::Split(SplitTextConfig { mode: TextSplitMode::Pages, maximum_page_length: 10, page_overlap_length: 0 }));
        split.inputs.push(SkillInput { name: "text".into(), source: "content".into() });
        split.outputs.push(crate::skills::SkillOutput { name: "textItems".into(), target_name: None });

        let ctx = SkillRunContext::new("./models");
        let result = run(&[split], &mut enriched, &ctx).await;

        assert!(result.halted_at.is_none());
        assert!(enriched.get("/document/textItems").is_some());
    }

    #[tokio::test]
    async fn unregistered_skill_type_warns_and_continues() {
        let mut enriched = EnrichedDocument::new();
        let skill = Skill::new("/document", SkillKind::Unregistered("#Microsoft.Skills.Custom.Unknown".into()));
        let ctx = SkillRunContext::new("./models");
        let result = run(&[skill], &mut enriched, &ctx).await;
        assert!(result.halted_at.is_none());
        assert_eq!(result.warnings().len(), 1);
    }

    #[tokio::test]
    async fn missing_required_input_halts_pipeline() {
        let mut enriched = EnrichedDocument::new();
        let split = Skill::new("/document", SkillKind::Split(SplitTextConfig::default()));
        let ctx = SkillRunContext::new("./models");
        let result = run(&[split], &mut enriched, &ctx).await;
        assert_eq!(result.halted_at, Some(0));
    }
}
