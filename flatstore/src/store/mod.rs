use crate::codec::{self, Row, ID_COLUMN};
use crate::config::{IdStrategy, StoreConfig};
use crate::error::{FlatstoreError, Result};
use crate::metadata::{self, MetadataRecord, MetadataUpdate};
use crate::name::{self, ResolvedDataset};
use crate::query::{self, Page, QueryParams};
use crate::writer::{self, DurableWriter};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs;

/// The main entry point. Owns the dataset root directory and exposes each
/// CSV file in it as an addressable collection of string rows.
///
/// Every mutation follows one protocol: resolve the name, take the
/// per-dataset lock, decode the current file, apply the change in memory,
/// encode, and atomically replace the file. Reads take no lock and see the
/// last fully-written state. There is no in-memory row cache; state is
/// rebuilt from disk on every call.
pub struct RowStore {
    config: StoreConfig,
    writer: DurableWriter,
}

/// Result of a bulk update: rows that were found and rewritten, and ids
/// that matched nothing. Missing ids are reported, not failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkUpdateOutcome {
    pub updated: Vec<Row>,
    pub missing: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImportMode {
    /// Add the uploaded rows to the existing dataset (creating it if absent).
    Append,
    /// Overwrite the dataset with the uploaded rows.
    Replace,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportOutcome {
    pub imported: usize,
    pub total: usize,
    pub replaced: bool,
}

impl RowStore {
    /// Open a store over the configured root directory, creating it and the
    /// metadata sidecar directory if needed. Orphaned temporary files from
    /// an earlier crash are swept best-effort.
    pub fn open(config: StoreConfig) -> Result<Self> {
        fs::create_dir_all(&config.root)?;
        fs::create_dir_all(config.root.join(name::METADATA_DIR))?;
        writer::sweep_orphans(&config.root);

        let writer = DurableWriter::new(config.lock_timeout());
        Ok(RowStore { config, writer })
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Enumerate dataset names under the root. Best-effort snapshot, no
    /// locking; unreadable entries are skipped.
    pub fn list_datasets(&self) -> Result<Vec<String>> {
        let pattern = format!("{}/*.{}", self.config.root.display(), name::DATASET_EXT);
        let paths = glob::glob(&pattern)
            .map_err(|e| FlatstoreError::Other(format!("Glob error: {e}")))?;

        let mut names = Vec::new();
        for entry in paths {
            match entry {
                Ok(path) => {
                    if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                        names.push(stem.to_string());
                    }
                }
                Err(e) => log::warn!("Skipping unreadable entry: {e}"),
            }
        }
        names.sort();
        Ok(names)
    }

    /// Current header of a dataset, in declared order.
    pub fn schema(&self, dataset: &str) -> Result<Vec<String>> {
        let (_, header, _) = self.snapshot(dataset)?;
        Ok(header)
    }

    pub fn get_row(&self, dataset: &str, id: &str) -> Result<Row> {
        let (resolved, _, rows) = self.snapshot(dataset)?;
        rows.into_iter()
            .find(|row| row.get(ID_COLUMN).map(String::as_str) == Some(id))
            .ok_or_else(|| FlatstoreError::RowNotFound {
                dataset: resolved.name,
                id: id.to_string(),
            })
    }

    /// Append one row, creating the dataset if it does not exist yet. An
    /// `id` is synthesized unless the payload carries a non-empty one; a
    /// caller-supplied id that already exists fails the operation.
    pub fn create_row(&self, dataset: &str, fields: Row) -> Result<Row> {
        self.mutate(dataset, false, |name, _header, rows| {
            let row = self.admit_row(name, fields, rows)?;
            rows.push(row.clone());
            Ok(row)
        })
    }

    /// Merge `fields` into the row with the given id. The identity column
    /// is immutable: an `id` key in the payload is ignored, not an error.
    pub fn update_row(&self, dataset: &str, id: &str, fields: Row) -> Result<Row> {
        self.mutate(dataset, true, |name, _header, rows| {
            let row = rows
                .iter_mut()
                .find(|row| row.get(ID_COLUMN).map(String::as_str) == Some(id))
                .ok_or_else(|| FlatstoreError::RowNotFound {
                    dataset: name.to_string(),
                    id: id.to_string(),
                })?;
            for (column, value) in fields {
                if column != ID_COLUMN {
                    row.insert(column, value);
                }
            }
            Ok(row.clone())
        })
    }

    pub fn delete_row(&self, dataset: &str, id: &str) -> Result<()> {
        self.mutate(dataset, true, |name, _header, rows| {
            let before = rows.len();
            rows.retain(|row| row.get(ID_COLUMN).map(String::as_str) != Some(id));
            if rows.len() == before {
                return Err(FlatstoreError::RowNotFound {
                    dataset: name.to_string(),
                    id: id.to_string(),
                });
            }
            Ok(())
        })
    }

    /// Append a batch of rows under one lock acquisition and one rewrite.
    /// All-or-nothing: if any row is rejected, none of the batch persists.
    pub fn bulk_create(&self, dataset: &str, batch: Vec<Row>) -> Result<Vec<Row>> {
        self.mutate(dataset, false, |name, _header, rows| {
            let mut created = Vec::with_capacity(batch.len());
            for fields in batch {
                let row = self.admit_row(name, fields, rows)?;
                rows.push(row.clone());
                created.push(row);
            }
            Ok(created)
        })
    }

    /// Apply a batch of `(id, fields)` merges. Ids that match no row are
    /// collected and returned rather than aborting the batch.
    pub fn bulk_update(
        &self,
        dataset: &str,
        updates: Vec<(String, Row)>,
    ) -> Result<BulkUpdateOutcome> {
        self.mutate(dataset, true, |_name, _header, rows| {
            let index: HashMap<String, usize> = rows
                .iter()
                .enumerate()
                .filter_map(|(i, row)| row.get(ID_COLUMN).map(|id| (id.clone(), i)))
                .collect();

            let mut outcome = BulkUpdateOutcome {
                updated: Vec::new(),
                missing: Vec::new(),
            };
            for (id, fields) in updates {
                match index.get(&id) {
                    Some(&i) => {
                        let row = &mut rows[i];
                        for (column, value) in fields {
                            if column != ID_COLUMN {
                                row.insert(column, value);
                            }
                        }
                        outcome.updated.push(row.clone());
                    }
                    None => outcome.missing.push(id),
                }
            }
            Ok(outcome)
        })
    }

    /// Delete every row whose id appears in `ids`. Absent ids are ignored,
    /// so the operation is idempotent. Returns the number of rows removed.
    pub fn bulk_delete(&self, dataset: &str, ids: &[String]) -> Result<usize> {
        self.mutate(dataset, true, |_name, _header, rows| {
            let doomed: HashSet<&str> = ids.iter().map(String::as_str).collect();
            let before = rows.len();
            rows.retain(|row| {
                row.get(ID_COLUMN)
                    .map_or(true, |id| !doomed.contains(id.as_str()))
            });
            Ok(before - rows.len())
        })
    }

    /// Filter, sort, and paginate a snapshot of the dataset.
    pub fn query(&self, dataset: &str, params: &QueryParams) -> Result<Page> {
        let (_, _, rows) = self.snapshot(dataset)?;
        query::run(rows, params, self.config.max_page_size)
    }

    /// The full dataset as a JSON array of row objects, one string value
    /// per header column.
    pub fn export_json(&self, dataset: &str) -> Result<serde_json::Value> {
        let (_, header, rows) = self.snapshot(dataset)?;
        let items = rows
            .into_iter()
            .map(|row| {
                let mut object = serde_json::Map::new();
                for column in &header {
                    object.insert(
                        column.clone(),
                        serde_json::Value::String(row.get(column).cloned().unwrap_or_default()),
                    );
                }
                serde_json::Value::Object(object)
            })
            .collect();
        Ok(serde_json::Value::Array(items))
    }

    /// Import an uploaded CSV into a dataset. `Append` unifies headers
    /// (existing columns first, new ones after) and adds the rows; `Replace`
    /// discards the previous content. Rows without an id get one synthesized.
    pub fn import(&self, dataset: &str, bytes: &[u8], mode: ImportMode) -> Result<ImportOutcome> {
        if bytes.len() > self.config.max_upload_size {
            return Err(FlatstoreError::Other(format!(
                "Upload of {} bytes exceeds the configured maximum of {}",
                bytes.len(),
                self.config.max_upload_size
            )));
        }
        let (imported_header, imported_rows) = codec::decode(bytes)?;

        self.mutate(dataset, false, |_name, header, rows| {
            if mode == ImportMode::Replace {
                header.clear();
                rows.clear();
            }
            for column in &imported_header {
                if !header.iter().any(|c| c == column) {
                    header.push(column.clone());
                }
            }
            if !header.iter().any(|c| c == ID_COLUMN) {
                header.insert(0, ID_COLUMN.to_string());
            }

            let imported = imported_rows.len();
            for mut row in imported_rows {
                if row.get(ID_COLUMN).map_or(true, String::is_empty) {
                    row.insert(ID_COLUMN.to_string(), self.synthesize_id());
                }
                rows.push(row);
            }

            Ok(ImportOutcome {
                imported,
                total: rows.len(),
                replaced: mode == ImportMode::Replace,
            })
        })
    }

    /// Read the metadata sidecar. A dataset with no persisted metadata
    /// yields the default record; this is not an error.
    pub fn get_metadata(&self, dataset: &str) -> Result<MetadataRecord> {
        let resolved = name::resolve(&self.config.root, dataset)?;
        Ok(metadata::load(&resolved.metadata))
    }

    /// Merge an update into the metadata sidecar. Independent of row data:
    /// the sidecar has its own lock key and its own lifecycle.
    pub fn put_metadata(&self, dataset: &str, update: MetadataUpdate) -> Result<MetadataRecord> {
        let resolved = name::resolve(&self.config.root, dataset)?;
        metadata::save(&resolved.metadata, &update, &self.writer)
    }

    // ── Internals ───────────────────────────────────────────────────

    /// Lock-free read of the current file state.
    fn snapshot(&self, dataset: &str) -> Result<(ResolvedDataset, Vec<String>, Vec<Row>)> {
        let resolved = name::resolve(&self.config.root, dataset)?;
        if !resolved.file.exists() {
            return Err(FlatstoreError::DatasetNotFound(resolved.name));
        }
        let bytes = fs::read(&resolved.file)?;
        let (header, rows) = codec::decode(&bytes)?;
        Ok((resolved, header, rows))
    }

    /// Run one mutation under the dataset lock: decode, reconcile ids,
    /// apply `op`, encode, atomic write. If `op` fails nothing is persisted.
    fn mutate<T>(
        &self,
        dataset: &str,
        must_exist: bool,
        op: impl FnOnce(&str, &mut Vec<String>, &mut Vec<Row>) -> Result<T>,
    ) -> Result<T> {
        let resolved = name::resolve(&self.config.root, dataset)?;
        let lease = self.writer.lock(&resolved.file)?;

        if must_exist && !resolved.file.exists() {
            return Err(FlatstoreError::DatasetNotFound(resolved.name));
        }
        let (mut header, mut rows) = if resolved.file.exists() {
            codec::decode(&fs::read(&resolved.file)?)?
        } else {
            (Vec::new(), Vec::new())
        };
        self.reconcile_ids(&mut header, &mut rows);

        let outcome = op(&resolved.name, &mut header, &mut rows)?;

        let bytes = codec::encode(&header, &rows)?;
        lease.write(&bytes)?;
        Ok(outcome)
    }

    /// Guarantee the identity column before any mutation is applied: the
    /// header gains `id` at the front if absent, and every row without one
    /// gets a synthesized identifier.
    fn reconcile_ids(&self, header: &mut Vec<String>, rows: &mut [Row]) {
        if !header.iter().any(|c| c == ID_COLUMN) {
            header.insert(0, ID_COLUMN.to_string());
        }
        for row in rows.iter_mut() {
            if row.get(ID_COLUMN).map_or(true, String::is_empty) {
                row.insert(ID_COLUMN.to_string(), self.synthesize_id());
            }
        }
    }

    /// Prepare an incoming payload for insertion: synthesize an id when the
    /// payload has none, reject one that collides with an existing row.
    fn admit_row(&self, dataset: &str, mut fields: Row, existing: &[Row]) -> Result<Row> {
        match fields.get(ID_COLUMN) {
            Some(id) if !id.is_empty() => {
                if existing.iter().any(|row| row.get(ID_COLUMN) == Some(id)) {
                    return Err(FlatstoreError::DuplicateId {
                        dataset: dataset.to_string(),
                        id: id.clone(),
                    });
                }
            }
            _ => {
                fields.insert(ID_COLUMN.to_string(), self.synthesize_id());
            }
        }
        Ok(fields)
    }

    fn synthesize_id(&self) -> String {
        match self.config.id_strategy {
            IdStrategy::Uuid => uuid::Uuid::new_v4().to_string(),
            IdStrategy::Ulid => ulid::Ulid::new().to_string().to_lowercase(),
            IdStrategy::Nanoid => nanoid::nanoid!(),
        }
    }
}
