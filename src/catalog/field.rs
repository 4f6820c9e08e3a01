//! Field definitions and type/flag compatibility rules (spec.md §3 "Field").

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PrimitiveType {
    String,
    Int32,
    Int64,
    Double,
    Boolean,
    DateTimeOffset,
    GeographyPoint,
    Single,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldType {
    Primitive(PrimitiveType),
    Collection(PrimitiveType),
    Complex(Vec<Field>),
}

impl FieldType {
    pub fn is_string_like(&self) -> bool {
        matches!(
            self,
            FieldType::Primitive(PrimitiveType::String) | FieldType::Collection(PrimitiveType::String)
        )
    }

    pub fn is_collection(&self) -> bool {
        matches!(self, FieldType::Collection(_))
    }

    pub fn is_complex(&self) -> bool {
        matches!(self, FieldType::Complex(_))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FieldFlags {
    pub key: bool,
    pub searchable: bool,
    pub filterable: bool,
    pub retrievable: bool,
    pub stored: bool,
    pub sortable: bool,
    pub facetable: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Field {
    pub name: String,
    pub field_type: FieldType,
    pub flags: FieldFlags,
    pub search_analyzer: Option<String>,
    pub index_analyzer: Option<String>,
    pub analyzer: Option<String>,
    pub synonym_maps: Vec<String>,
    /// Vector-only: embedding dimensionality, 1..=3072.
    pub dimensions: Option<u32>,
    pub vector_search_profile: Option<String>,
}

impl Field {
    pub fn new(name: impl Into<String>, field_type: FieldType, flags: FieldFlags) -> Self {
        Self {
            name: name.into(),
            field_type,
            flags,
            search_analyzer: None,
            index_analyzer: None,
            analyzer: None,
            synonym_maps: Vec::new(),
            dimensions: None,
            vector_search_profile: None,
        }
    }

    pub fn is_vector(&self) -> bool {
        self.dimensions.is_some()
    }

    /// The effective analyzer name to use at index time.
    pub fn index_time_analyzer(&self) -> &str {
        self.index_analyzer
            .as_deref()
            .or(self.analyzer.as_deref())
            .unwrap_or("standard")
    }

    /// The effective analyzer name to use at query time.
    pub fn query_time_analyzer(&self) -> &str {
        self.search_analyzer
            .as_deref()
            .or(self.analyzer.as_deref())
            .unwrap_or("standard")
    }

    /// Validates flag/type compatibility per spec.md §3 Field invariants.
    /// Returns a human-readable error message on violation.
    pub fn validate_flags(&self) -> Result<(), String> {
        if self.flags.searchable && !self.field_type.is_string_like() {
            return Err(format!(
                "field '{}': only string-like types may be searchable",
                self.name
            ));
        }
        if self.flags.sortable && self.field_type.is_collection() {
            return Err(format!(
                "field '{}': collection fields may not be sortable",
                self.name
            ));
        }
        if self.field_type.is_complex() && (self.flags.filterable || self.flags.sortable) {
            return Err(format!(
                "field '{}': complex fields are neither filterable nor sortable",
                self.name
            ));
        }
        if self.is_vector() && self.flags.searchable {
            return Err(format!(
                "field '{}': vector fields are never searchable",
                self.name
            ));
        }
        if self.flags.key && !matches!(self.field_type, FieldType::Primitive(PrimitiveType::String)) {
            return Err(format!("field '{}': key field type must be string", self.name));
        }
        if let Some(dims) = self.dimensions {
            if dims == 0 || dims > 3072 {
                return Err(format!(
                    "field '{}': vector dimensions must be in 1..=3072, got {}",
                    self.name, dims
                ));
            }
        }
        Ok(())
    }
}
