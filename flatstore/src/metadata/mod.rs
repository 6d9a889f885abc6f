// Metadata sidecar - a per-dataset JSON record, independent of row data.

use crate::error::Result;
use crate::writer::DurableWriter;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

fn default_schema_version() -> String {
    "1.0".to_string()
}

/// The persisted record. Missing sidecar files and unreadable ones both
/// read as the default record; metadata is advisory and never blocks row
/// operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetadataRecord {
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_schema_version")]
    pub schema_version: String,
    #[serde(default)]
    pub attributes: IndexMap<String, String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Default for MetadataRecord {
    fn default() -> Self {
        MetadataRecord {
            description: String::new(),
            schema_version: default_schema_version(),
            attributes: IndexMap::new(),
            created_at: None,
            updated_at: None,
        }
    }
}

/// Fields to merge into the stored record. `None` leaves the stored value
/// untouched; attribute entries are merged key by key.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MetadataUpdate {
    pub description: Option<String>,
    pub schema_version: Option<String>,
    pub attributes: Option<IndexMap<String, String>>,
}

/// Read the sidecar at `path`, falling back to the default record.
pub fn load(path: &Path) -> MetadataRecord {
    let Ok(bytes) = fs::read(path) else {
        return MetadataRecord::default();
    };
    serde_json::from_slice(&bytes).unwrap_or_else(|e| {
        log::warn!("Unreadable metadata sidecar {}: {e}", path.display());
        MetadataRecord::default()
    })
}

/// Merge `update` into the stored record and persist it through the
/// durable writer. The sidecar path has its own lock key, so metadata
/// writes never contend with row mutations.
pub fn save(path: &Path, update: &MetadataUpdate, writer: &DurableWriter) -> Result<MetadataRecord> {
    let lease = writer.lock(path)?;
    let mut record = load(path);

    if let Some(description) = &update.description {
        record.description = description.clone();
    }
    if let Some(schema_version) = &update.schema_version {
        record.schema_version = schema_version.clone();
    }
    if let Some(attributes) = &update.attributes {
        for (key, value) in attributes {
            record.attributes.insert(key.clone(), value.clone());
        }
    }

    let now = Utc::now();
    record.created_at.get_or_insert(now);
    record.updated_at = Some(now);

    let bytes = serde_json::to_vec_pretty(&record)?;
    lease.write(&bytes)?;
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    fn setup() -> (TempDir, DurableWriter) {
        (TempDir::new().unwrap(), DurableWriter::new(Duration::from_secs(1)))
    }

    #[test]
    fn test_missing_sidecar_reads_as_default() {
        let (tmp, _) = setup();
        let record = load(&tmp.path().join("users.json"));
        assert_eq!(record, MetadataRecord::default());
        assert_eq!(record.schema_version, "1.0");
    }

    #[test]
    fn test_corrupt_sidecar_reads_as_default() {
        let (tmp, _) = setup();
        let path = tmp.path().join("users.json");
        fs::write(&path, b"{ not json").unwrap();
        assert_eq!(load(&path), MetadataRecord::default());
    }

    #[test]
    fn test_save_merges_and_stamps_timestamps() {
        let (tmp, writer) = setup();
        let path = tmp.path().join("users.json");

        let first = save(
            &path,
            &MetadataUpdate {
                description: Some("User dataset".into()),
                ..Default::default()
            },
            &writer,
        )
        .unwrap();
        assert_eq!(first.description, "User dataset");
        assert!(first.created_at.is_some());

        let second = save(
            &path,
            &MetadataUpdate {
                schema_version: Some("2.0".into()),
                ..Default::default()
            },
            &writer,
        )
        .unwrap();
        // untouched fields survive the merge
        assert_eq!(second.description, "User dataset");
        assert_eq!(second.schema_version, "2.0");
        assert_eq!(second.created_at, first.created_at);
        assert!(second.updated_at >= first.updated_at);
    }

    #[test]
    fn test_attributes_merge_key_by_key() {
        let (tmp, writer) = setup();
        let path = tmp.path().join("users.json");

        let mut attrs = IndexMap::new();
        attrs.insert("owner".to_string(), "data-team".to_string());
        save(
            &path,
            &MetadataUpdate { attributes: Some(attrs), ..Default::default() },
            &writer,
        )
        .unwrap();

        let mut more = IndexMap::new();
        more.insert("tier".to_string(), "gold".to_string());
        let record = save(
            &path,
            &MetadataUpdate { attributes: Some(more), ..Default::default() },
            &writer,
        )
        .unwrap();

        assert_eq!(record.attributes["owner"], "data-team");
        assert_eq!(record.attributes["tier"], "gold");
    }
}
