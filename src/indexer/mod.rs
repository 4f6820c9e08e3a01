//! Indexer runtime (spec.md §3 "Skillset"/"Indexer"/"Indexer status",
//! §4.12): pulls documents from a data source, cracks them, runs the
//! skill pipeline, projects enriched fields into the target index, and
//! tracks incremental progress.

mod runtime;
mod types;

pub use runtime::{run, IndexerRunDeps};
pub use types::{
    ExecutionResult, FieldMapping, IndexerDefinition, IndexerParameters, IndexerStatus, MappingFunction, OutputFieldMapping, OverallStatus, Skillset,
};
