//! Index definition: schema, fields, scoring profiles, suggesters,
//! analyzers, similarity, vector-search config (spec.md §3 "Index
//! definition").

use super::field::{Field, FieldType};
use super::scoring_profile::ScoringProfile;
use super::similarity::Similarity;
use super::suggester::Suggester;
use super::vector_config::VectorSearchConfig;
use crate::error::{ApiError, FieldError};
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

static NAME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z][a-z0-9-]*$").unwrap());

/// Maximum number of fields (including nested complex-field members) an
/// index definition may declare.
pub const MAX_FIELDS: usize = 1000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexDefinition {
    pub name: String,
    pub fields: Vec<Field>,
    pub scoring_profiles: Vec<ScoringProfile>,
    pub default_scoring_profile: Option<String>,
    pub suggesters: Vec<Suggester>,
    pub similarity: Similarity,
    pub vector_search: VectorSearchConfig,
    pub etag: String,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

impl IndexDefinition {
    pub fn new(name: impl Into<String>, fields: Vec<Field>) -> Self {
        let now = Utc::now();
        Self {
            name: name.into(),
            fields,
            scoring_profiles: Vec::new(),
            default_scoring_profile: None,
            suggesters: Vec::new(),
            similarity: Similarity::default(),
            vector_search: VectorSearchConfig::default(),
            etag: uuid::Uuid::new_v4().to_string(),
            created_at: now,
            modified_at: now,
        }
    }

    pub fn key_field(&self) -> Option<&Field> {
        self.fields.iter().find(|f| f.flags.key)
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        find_field(&self.fields, name)
    }

    pub fn bump_etag(&mut self) {
        self.etag = uuid::Uuid::new_v4().to_string();
        self.modified_at = Utc::now();
    }

    /// Validates name syntax per spec.md §8 boundary behaviors #12.
    pub fn validate_name(name: &str) -> Result<(), FieldError> {
        if name.len() < 2 || name.len() > 128 {
            return Err(FieldError::new(
                "name",
                "index name must be 2-128 characters",
            ));
        }
        if !NAME_RE.is_match(name) {
            return Err(FieldError::new(
                "name",
                "index name must match ^[a-z][a-z0-9-]*$",
            ));
        }
        Ok(())
    }

    /// Full structural validation; collects every violation rather than
    /// short-circuiting (spec.md §7 "Validation runs before any mutation").
    pub fn validate(&self) -> Result<(), ApiError> {
        let mut errors = Vec::new();

        if let Err(e) = Self::validate_name(&self.name) {
            errors.push(e);
        }

        let total_fields = count_fields(&self.fields);
        if total_fields > MAX_FIELDS {
            errors.push(FieldError::new(
                "fields",
                format!(
                    "index declares {} fields, exceeding the maximum of {}",
                    total_fields, MAX_FIELDS
                ),
            ));
        }

        let key_fields: Vec<&Field> = self.fields.iter().filter(|f| f.flags.key).collect();
        if key_fields.len() != 1 {
            errors.push(FieldError::new(
                "fields",
                format!(
                    "exactly one field must be marked key, found {}",
                    key_fields.len()
                ),
            ));
        }

        let mut seen: HashSet<String> = HashSet::new();
        collect_name_conflicts(&self.fields, "", &mut seen, &mut errors);

        for f in &self.fields {
            if let Err(msg) = f.validate_flags() {
                errors.push(FieldError::new(f.name.clone(), msg));
            }
            if f.is_vector() {
                match &f.vector_search_profile {
                    Some(profile) => {
                        if self.vector_search.algorithm_for_profile(profile).is_none() {
                            errors.push(FieldError::new(
                                f.name.clone(),
                                format!("references unknown vector-search profile '{}'", profile),
                            ));
                        }
                    }
                    None => errors.push(FieldError::new(
                        f.name.clone(),
                        "vector field must reference a vectorSearchProfile",
                    )),
                }
            }
        }

        if let Some(ref default_profile) = self.default_scoring_profile {
            if !self.scoring_profiles.iter().any(|p| &p.name == default_profile) {
                errors.push(FieldError::new(
                    "defaultScoringProfile",
                    format!("references unknown scoring profile '{}'", default_profile),
                ));
            }
        }

        for profile in &self.scoring_profiles {
            for func in &profile.functions {
                if let Err(msg) = func.validate() {
                    errors.push(FieldError::new(profile.name.clone(), msg));
                    continue;
                }
                match self.field(func.field_name()) {
                    Some(field) => {
                        if !field.flags.filterable {
                            errors.push(FieldError::new(
                                profile.name.clone(),
                                format!(
                                    "scoring function field '{}' must be filterable",
                                    func.field_name()
                                ),
                            ));
                        }
                    }
                    None => errors.push(FieldError::new(
                        profile.name.clone(),
                        format!("scoring function references unknown field '{}'", func.field_name()),
                    )),
                }
            }
            for field_name in profile.text_weights.keys() {
                match self.field(field_name) {
                    Some(field) if field.flags.searchable => {}
                    Some(_) => errors.push(FieldError::new(
                        profile.name.clone(),
                        format!("text weight field '{}' must be searchable", field_name),
                    )),
                    None => errors.push(FieldError::new(
                        profile.name.clone(),
                        format!("text weight references unknown field '{}'", field_name),
                    )),
                }
            }
        }

        for suggester in &self.suggesters {
            for source in &suggester.source_fields {
                match self.field(source) {
                    Some(field) if field.field_type.is_string_like() => {}
                    Some(_) => errors.push(FieldError::new(
                        suggester.name.clone(),
                        format!("suggester source field '{}' must be string-typed", source),
                    )),
                    None => errors.push(FieldError::new(
                        suggester.name.clone(),
                        format!("suggester references unknown field '{}'", source),
                    )),
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ApiError::validation(errors))
        }
    }
}

fn find_field<'a>(fields: &'a [Field], name: &str) -> Option<&'a Field> {
    for f in fields {
        if f.name.eq_ignore_ascii_case(name) {
            return Some(f);
        }
        if let FieldType::Complex(nested) = &f.field_type {
            let nested_path = format!("{}/", f.name);
            if let Some(rest) = name.strip_prefix(&nested_path) {
                if let Some(found) = find_field(nested, rest) {
                    return Some(found);
                }
            }
        }
    }
    None
}

fn count_fields(fields: &[Field]) -> usize {
    fields
        .iter()
        .map(|f| match &f.field_type {
            FieldType::Complex(nested) => 1 + count_fields(nested),
            _ => 1,
        })
        .sum()
}

fn collect_name_conflicts(
    fields: &[Field],
    prefix: &str,
    seen: &mut HashSet<String>,
    errors: &mut Vec<FieldError>,
) {
    for f in fields {
        let full_name = if prefix.is_empty() {
            f.name.clone()
        } else {
            format!("{}/{}", prefix, f.name)
        };
        let lowered = full_name.to_ascii_lowercase();
        if !seen.insert(lowered) {
            errors.push(FieldError::new(
                full_name.clone(),
                "field name conflicts with another field (case-insensitive)",
            ));
        }
        if let FieldType::Complex(nested) = &f.field_type {
            collect_name_conflicts(nested, &full_name, seen, errors);
        }
    }
}
