//! Data source definitions and the driver contract consumed by the
//! indexer runtime (spec.md §3 "Data source", §6.2). At minimum a
//! filesystem driver is available for local development.

use crate::catalog::store::CatalogResource;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DataSourceType {
    Filesystem,
    AzureBlob,
    AzureSql,
    AzureTable,
    CosmosDb,
    AdlsGen2,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Container {
    pub name: String,
    pub query: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChangeDetectionPolicy {
    pub high_water_mark_column: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SoftDeletePolicy {
    pub soft_delete_column: Option<String>,
    pub soft_delete_marker_value: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataSourceDefinition {
    pub name: String,
    pub source_type: DataSourceType,
    pub container: Container,
    pub credentials: String,
    pub change_detection: ChangeDetectionPolicy,
    pub soft_delete: SoftDeletePolicy,
    pub etag: String,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
}

impl DataSourceDefinition {
    pub fn new(name: impl Into<String>, source_type: DataSourceType, container: Container) -> Self {
        let now = Utc::now();
        Self {
            name: name.into(),
            source_type,
            container,
            credentials: String::new(),
            change_detection: ChangeDetectionPolicy::default(),
            soft_delete: SoftDeletePolicy::default(),
            etag: uuid::Uuid::new_v4().to_string(),
            created_at: now,
            modified_at: now,
        }
    }
}

impl CatalogResource for DataSourceDefinition {
    fn name(&self) -> &str {
        &self.name
    }
    fn etag(&self) -> &str {
        &self.etag
    }
}

/// One document as surfaced by a data-source driver (spec.md §6.2).
#[derive(Debug, Clone)]
pub struct SourceDocument {
    pub key: String,
    pub name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
    pub metadata: BTreeMap<String, String>,
}

fn guess_content_type(path: &Path) -> Option<String> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    Some(
        match ext.as_str() {
            "json" => "application/json",
            "html" | "htm" => "text/html",
            "xml" => "application/xml",
            "csv" => "text/csv",
            "pdf" => "application/pdf",
            "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
            "rtf" => "application/rtf",
            _ => "text/plain",
        }
        .to_string(),
    )
}

/// Lists documents under `root` whose modification time is strictly newer
/// than `since_mark` (an RFC3339 timestamp), in a stable path-sorted order
/// so listing is idempotent for a given mark (spec.md §6.2).
pub fn list_documents(root: &Path, since_mark: Option<&str>) -> anyhow::Result<Vec<SourceDocument>> {
    let since: Option<DateTime<Utc>> = since_mark.and_then(|m| DateTime::parse_from_rfc3339(m).ok()).map(|d| d.with_timezone(&Utc));

    let mut paths: Vec<_> = walkdir::WalkDir::new(root)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
        .map(|e| e.path().to_path_buf())
        .collect();
    paths.sort();

    let mut out = Vec::new();
    for path in paths {
        let metadata = std::fs::metadata(&path)?;
        let modified: DateTime<Utc> = metadata.modified()?.into();
        if let Some(since) = since {
            if modified <= since {
                continue;
            }
        }

        let bytes = std::fs::read(&path)?;
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        let hash = hex::encode(hasher.finalize());

        let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or("unknown").to_string();
        let content_type = guess_content_type(&path);
        let storage_path = path.to_string_lossy().to_string();

        let mut doc_metadata = BTreeMap::new();
        doc_metadata.insert("metadata_storage_path".to_string(), storage_path.clone());
        doc_metadata.insert("metadata_storage_name".to_string(), file_name.clone());
        doc_metadata.insert("metadata_storage_last_modified".to_string(), modified.to_rfc3339());
        doc_metadata.insert("metadata_storage_size".to_string(), bytes.len().to_string());
        doc_metadata.insert("metadata_storage_content_md5".to_string(), hash.clone());
        if let Some(ct) = &content_type {
            doc_metadata.insert("metadata_storage_content_type".to_string(), ct.clone());
        }

        out.push(SourceDocument { key: hash, name: file_name, content_type, bytes, metadata: doc_metadata });
    }

    Ok(out)
}

mod hex {
    pub fn encode(bytes: impl AsRef<[u8]>) -> String {
        bytes.as_ref().iter().map(|b| format!("{b:02x}")).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lists_files_sorted_and_filters_by_mark() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"hello").unwrap();
        std::fs::write(dir.path().join("b.txt"), b"world").unwrap();

        let docs = list_documents(dir.path(), None).unwrap();
        assert_eq!(docs.len(), 2);
        assert!(docs[0].metadata.contains_key("metadata_storage_path"));
    }

    #[test]
    fn future_mark_excludes_everything() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"hello").unwrap();
        let future = (Utc::now() + chrono::Duration::days(1)).to_rfc3339();
        let docs = list_documents(dir.path(), Some(&future)).unwrap();
        assert!(docs.is_empty());
    }
}
