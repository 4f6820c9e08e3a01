//! Index catalog: schemas, fields, analyzers, similarity, suggesters and
//! scoring profiles (spec.md §2 component 1 is the analyzer registry, the
//! catalog itself owns everything listed in §3 "Index definition").

pub mod field;
pub mod index_def;
pub mod scoring_profile;
pub mod similarity;
pub mod store;
pub mod suggester;
pub mod vector_config;

pub use field::{Field, FieldFlags, FieldType, PrimitiveType};
pub use index_def::{IndexDefinition, MAX_FIELDS};
pub use scoring_profile::{Aggregation, Interpolation, ScoringFunction, ScoringProfile};
pub use similarity::Similarity;
pub use store::CatalogStore;
pub use suggester::{SearchMode, Suggester};
pub use vector_config::{DistanceMetric, HnswAlgorithm, VectorSearchConfig};
