//! search-sim-core: a local, developer-facing simulator of a managed
//! hybrid lexical + vector cloud search service.
//!
//! Components: analyzer registry, lexical index, filter evaluator, vector
//! (HNSW) index, scoring-profile engine, query executor, suggest/
//! autocomplete, document write path, enriched-document state bag, skill
//! executors and pipeline runner, indexer runtime.

pub mod analyzer;
pub mod catalog;
pub mod context;
pub mod cracker;
pub mod datasource;
pub mod docwrite;
pub mod enrich;
pub mod error;
pub mod filter;
pub mod http_api;
pub mod indexer;
pub mod lexical;
pub mod pipeline;
pub mod query;
pub mod scorer;
pub mod skills;
pub mod suggest;
pub mod value;
pub mod vector;

pub use error::{ApiError, ApiResult, ErrorBody, FieldError};
pub use value::{Document, GeoPoint, Value};
