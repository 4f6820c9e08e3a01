//! Scoring-profile engine: evaluates freshness/magnitude/distance/tag
//! functions against a matched document and combines them into a
//! `documentBoost` multiplier (spec.md §4.5).

use crate::catalog::{Aggregation, IndexDefinition, ScoringFunction, ScoringProfile};
use crate::error::ApiError;
use crate::value::{Document, GeoPoint};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// Query-supplied scoring parameters, keyed by name, holding raw string
/// values (`"lon,lat"` for geo points, comma-separated for tag lists).
#[derive(Debug, Clone, Default)]
pub struct ScoringParameters {
    pub values: BTreeMap<String, String>,
}

impl ScoringParameters {
    pub fn geo_point(&self, name: &str) -> Option<GeoPoint> {
        let raw = self.values.get(name)?;
        let (lon, lat) = raw.split_once(',')?;
        Some(GeoPoint::new(lon.trim().parse().ok()?, lat.trim().parse().ok()?))
    }

    pub fn tags(&self, name: &str) -> Vec<String> {
        self.values
            .get(name)
            .map(|raw| raw.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect())
            .unwrap_or_default()
    }
}

/// Resolves the scoring profile to apply: the named profile if the query
/// asked for one (a typed error if it doesn't exist), else the index's
/// default, else none.
pub fn resolve_profile<'a>(
    definition: &'a IndexDefinition,
    requested: Option<&str>,
) -> Result<Option<&'a ScoringProfile>, ApiError> {
    match requested {
        Some(name) => definition
            .scoring_profiles
            .iter()
            .find(|p| p.name == name)
            .map(Some)
            .ok_or_else(|| ApiError::InvalidRequest(format!("invalid scoring profile '{name}'"))),
        None => Ok(definition
            .default_scoring_profile
            .as_ref()
            .and_then(|name| definition.scoring_profiles.iter().find(|p| &p.name == name))),
    }
}

fn eval_freshness(field: &str, boost: f64, interpolation: crate::catalog::Interpolation, duration_secs: f64, doc: &Document, now: DateTime<Utc>) -> Option<(f64, f64)> {
    let date = doc.get(field)?.as_date()?;
    let age = (now - date).num_seconds().max(0) as f64;
    let x = if duration_secs > 0.0 { (age / duration_secs).min(1.0) } else { 1.0 };
    let raw = interpolation.apply(x);
    Some((raw, raw * boost))
}

fn eval_magnitude(
    field: &str,
    boost: f64,
    interpolation: crate::catalog::Interpolation,
    range_start: f64,
    range_end: f64,
    constant_boost_beyond_range: bool,
    doc: &Document,
) -> Option<(f64, f64)> {
    let value = doc.get(field)?.as_f64()?;
    let span = range_end - range_start;
    if span == 0.0 {
        return None;
    }
    let raw_normalized = (value - range_start) / span;
    if (raw_normalized < 0.0 || raw_normalized > 1.0) && !constant_boost_beyond_range {
        return Some((0.0, 0.0));
    }
    let raw = interpolation.apply(raw_normalized);
    Some((raw, raw * boost))
}

fn eval_distance(
    field: &str,
    boost: f64,
    interpolation: crate::catalog::Interpolation,
    reference_point_parameter: &str,
    boosting_distance_km: f64,
    doc: &Document,
    params: &ScoringParameters,
) -> Option<(f64, f64)> {
    let point = match doc.get(field)? {
        crate::value::Value::Geo(g) => *g,
        _ => return None,
    };
    let reference = params.geo_point(reference_point_parameter)?;
    let dist = point.distance_km(&reference);
    let x = if boosting_distance_km > 0.0 {
        1.0 - (dist / boosting_distance_km).min(1.0)
    } else {
        0.0
    };
    let raw = interpolation.apply(x);
    Some((raw, raw * boost))
}

fn eval_tag(
    field: &str,
    boost: f64,
    interpolation: crate::catalog::Interpolation,
    tags_parameter: &str,
    doc: &Document,
    params: &ScoringParameters,
) -> Option<(f64, f64)> {
    let doc_tags: Vec<String> = match doc.get(field)? {
        crate::value::Value::List(items) => items.iter().filter_map(|v| v.as_str().map(str::to_string)).collect(),
        crate::value::Value::Str(s) => vec![s.clone()],
        _ => return None,
    };
    let query_tags = params.tags(tags_parameter);
    if query_tags.is_empty() {
        return Some((0.0, 0.0));
    }
    let matched = doc_tags.iter().filter(|t| query_tags.contains(t)).count();
    let fraction = matched as f64 / query_tags.len() as f64;
    let raw = interpolation.apply(fraction);
    Some((raw, raw * boost))
}

fn eval_function(func: &ScoringFunction, doc: &Document, params: &ScoringParameters, now: DateTime<Utc>) -> (f64, f64) {
    let result = match func {
        ScoringFunction::Freshness { field_name, boost, interpolation, boosting_duration_secs } => {
            eval_freshness(field_name, *boost, *interpolation, *boosting_duration_secs, doc, now)
        }
        ScoringFunction::Magnitude { field_name, boost, interpolation, range_start, range_end, constant_boost_beyond_range } => {
            eval_magnitude(field_name, *boost, *interpolation, *range_start, *range_end, *constant_boost_beyond_range, doc)
        }
        ScoringFunction::Distance { field_name, boost, interpolation, reference_point_parameter, boosting_distance_km } => {
            eval_distance(field_name, *boost, *interpolation, reference_point_parameter, *boosting_distance_km, doc, params)
        }
        ScoringFunction::Tag { field_name, boost, interpolation, tags_parameter } => {
            eval_tag(field_name, *boost, *interpolation, tags_parameter, doc, params)
        }
    };
    result.unwrap_or((0.0, 0.0))
}

/// Evaluates and combines every function in `profile`, returning the
/// aggregated boost (not yet floored to 1.0 — the caller applies
/// `max(1.0, aggregated)` when computing the final document score).
pub fn compute_document_boost(profile: &ScoringProfile, doc: &Document, params: &ScoringParameters, now: DateTime<Utc>) -> f64 {
    if profile.functions.is_empty() {
        return 0.0;
    }
    let results: Vec<(f64, f64)> = profile.functions.iter().map(|f| eval_function(f, doc, params, now)).collect();
    match profile.aggregation {
        Aggregation::Sum => results.iter().map(|(_, scaled)| scaled).sum(),
        Aggregation::Average => results.iter().map(|(_, scaled)| scaled).sum::<f64>() / results.len() as f64,
        Aggregation::Minimum => results.iter().map(|(_, scaled)| *scaled).fold(f64::INFINITY, f64::min),
        Aggregation::Maximum => results.iter().map(|(_, scaled)| *scaled).fold(f64::NEG_INFINITY, f64::max),
        Aggregation::FirstMatching => results
            .iter()
            .find(|(raw, _)| *raw > 0.0)
            .map(|(_, scaled)| *scaled)
            .unwrap_or(0.0),
    }
}

/// Final per-document score: `lexicalScore * max(1, aggregatedBoost)`.
pub fn apply_boost(lexical_score: f64, aggregated_boost: f64) -> f64 {
    lexical_score * aggregated_boost.max(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::Interpolation;
    use crate::value::Value;
    use chrono::Duration;

    #[test]
    fn unnamed_profile_defaults_to_neutral_boost() {
        let boost = apply_boost(4.0, 0.0);
        assert_eq!(boost, 4.0);
    }

    #[test]
    fn tag_function_scales_with_overlap_fraction() {
        let func = ScoringFunction::Tag {
            field_name: "tags".to_string(),
            boost: 2.0,
            interpolation: Interpolation::Linear,
            tags_parameter: "wantedTags".to_string(),
        };
        let mut doc = Document::new();
        doc.insert("tags".to_string(), Value::List(vec![Value::Str("sale".into()), Value::Str("new".into())]));
        let mut params = ScoringParameters::default();
        params.values.insert("wantedTags".to_string(), "sale,clearance".to_string());
        let profile = ScoringProfile { name: "p".into(), text_weights: BTreeMap::new(), functions: vec![func], aggregation: Aggregation::Sum };
        let boost = compute_document_boost(&profile, &doc, &params, Utc::now());
        assert!((boost - 1.0).abs() < 1e-9);
    }

    #[test]
    fn freshness_function_uses_age_against_duration() {
        let now = Utc::now();
        let func = ScoringFunction::Freshness {
            field_name: "published".to_string(),
            boost: 3.0,
            interpolation: Interpolation::Linear,
            boosting_duration_secs: 3600.0,
        };
        let mut doc = Document::new();
        doc.insert("published".to_string(), Value::Date(now - Duration::seconds(1800)));
        let profile = ScoringProfile { name: "p".into(), text_weights: BTreeMap::new(), functions: vec![func], aggregation: Aggregation::Sum };
        let boost = compute_document_boost(&profile, &doc, &ScoringParameters::default(), now);
        assert!((boost - 1.5).abs() < 1e-6);
    }

    #[test]
    fn invalid_named_profile_is_a_typed_error() {
        let def = IndexDefinition::new("idx", vec![]);
        let err = resolve_profile(&def, Some("missing"));
        assert!(err.is_err());
    }
}
