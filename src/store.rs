//! Persistence for per-file records and cumulative site state.
//!
//! [`DirStore`] lays documents out as
//!
//! ```text
//! <root>/sites/<site_id>.json
//! <root>/files/<file_id>.json
//! ```
//!
//! Every write goes through a temporary file in the target directory that is
//! renamed into place, so readers see either the old or the new document.

use std::{
    collections::{BTreeMap, HashMap},
    fs::{self, OpenOptions},
    io::Write,
    path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use fd_lock::RwLock as FileLock;
use log::debug;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use tempfile::NamedTempFile;

use crate::{
    analysis::AnalysisKind,
    document::{Document, Value},
    error::StoreError,
    rows::Table,
};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileSummary {
    pub rows: usize,
    pub columns: usize,
    pub column_names: Vec<String>,
    pub sha256: String,
}

impl FileSummary {
    pub fn of(table: &Table, digest: &str) -> Self {
        Self {
            rows: table.row_count(),
            columns: table.columns().len(),
            column_names: table.columns().to_vec(),
            sha256: digest.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileRecord {
    pub file_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site_name: Option<String>,
    pub kind: AnalysisKind,
    pub uploaded_at: DateTime<Utc>,
    pub summary: FileSummary,
    pub data_records: Vec<Document>,
    /// Completed analysis; absent until the pipeline finishes the file.
    #[serde(default)]
    pub analysis: Option<Document>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl FileRecord {
    /// Rebuilds the uploaded table. Columns follow the upload's order from
    /// the summary; row keys the summary does not name come last.
    pub fn table(&self) -> Table {
        let known = &self.summary.column_names;
        Table::from_record_iter(self.data_records.iter().map(|record| {
            let mut cells = known
                .iter()
                .map(|name| (name.clone(), record.get(name).cloned().unwrap_or(Value::Null)))
                .collect::<Vec<_>>();
            cells.extend(
                record
                    .iter()
                    .filter(|(key, _)| !known.contains(key))
                    .map(|(key, value)| (key.clone(), value.clone())),
            );
            cells
        }))
    }
}

pub trait Store: Send + Sync {
    fn get_site_state(&self, site_id: &str) -> Result<Option<Document>, StoreError>;
    fn put_site_state(&self, site_id: &str, state: &Document) -> Result<(), StoreError>;
    /// Read-modify-write of one site's state. `update` sees the current state
    /// and returns the replacement; no other update of the same site, from
    /// this process or another sharing the store, interleaves with it.
    fn update_site_state(
        &self,
        site_id: &str,
        update: &mut dyn FnMut(Option<Document>) -> Document,
    ) -> Result<Document, StoreError>;
    fn get_file_record(&self, file_id: &str) -> Result<Option<FileRecord>, StoreError>;
    fn put_file_record(&self, record: &FileRecord) -> Result<(), StoreError>;
    /// All file records, oldest upload first.
    fn list_file_records(&self) -> Result<Vec<FileRecord>, StoreError>;
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    sites: RwLock<HashMap<String, Document>>,
    files: RwLock<BTreeMap<String, FileRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Store for MemoryStore {
    fn get_site_state(&self, site_id: &str) -> Result<Option<Document>, StoreError> {
        Ok(self.sites.read().get(site_id).cloned())
    }

    fn put_site_state(&self, site_id: &str, state: &Document) -> Result<(), StoreError> {
        self.sites.write().insert(site_id.to_string(), state.clone());
        Ok(())
    }

    fn update_site_state(
        &self,
        site_id: &str,
        update: &mut dyn FnMut(Option<Document>) -> Document,
    ) -> Result<Document, StoreError> {
        let mut sites = self.sites.write();
        let updated = update(sites.get(site_id).cloned());
        sites.insert(site_id.to_string(), updated.clone());
        Ok(updated)
    }

    fn get_file_record(&self, file_id: &str) -> Result<Option<FileRecord>, StoreError> {
        Ok(self.files.read().get(file_id).cloned())
    }

    fn put_file_record(&self, record: &FileRecord) -> Result<(), StoreError> {
        self.files
            .write()
            .insert(record.file_id.clone(), record.clone());
        Ok(())
    }

    fn list_file_records(&self) -> Result<Vec<FileRecord>, StoreError> {
        let mut records = self.files.read().values().cloned().collect::<Vec<_>>();
        sort_by_upload(&mut records);
        Ok(records)
    }
}

#[derive(Debug, Clone)]
pub struct DirStore {
    root: PathBuf,
}

impl DirStore {
    /// Opens (creating as needed) a store rooted at `root`.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let store = Self { root: root.into() };
        for dir in [store.sites_dir(), store.files_dir()] {
            fs::create_dir_all(&dir).map_err(|source| StoreError::Io { path: dir, source })?;
        }
        Ok(store)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn sites_dir(&self) -> PathBuf {
        self.root.join("sites")
    }

    fn files_dir(&self) -> PathBuf {
        self.root.join("files")
    }

    fn site_path(&self, site_id: &str) -> Result<PathBuf, StoreError> {
        Ok(self.sites_dir().join(format!("{}.json", storage_key(site_id)?)))
    }

    fn site_lock_path(&self, site_id: &str) -> Result<PathBuf, StoreError> {
        Ok(self.sites_dir().join(format!("{}.lock", storage_key(site_id)?)))
    }

    fn file_path(&self, file_id: &str) -> Result<PathBuf, StoreError> {
        Ok(self.files_dir().join(format!("{}.json", storage_key(file_id)?)))
    }
}

impl Store for DirStore {
    fn get_site_state(&self, site_id: &str) -> Result<Option<Document>, StoreError> {
        read_json(&self.site_path(site_id)?)
    }

    fn put_site_state(&self, site_id: &str, state: &Document) -> Result<(), StoreError> {
        write_json(&self.site_path(site_id)?, state, "site state")
    }

    /// Holds an advisory lock on `sites/<site_id>.lock` for the duration of
    /// the update. The lock file is left in place.
    fn update_site_state(
        &self,
        site_id: &str,
        update: &mut dyn FnMut(Option<Document>) -> Document,
    ) -> Result<Document, StoreError> {
        let lock_path = self.site_lock_path(site_id)?;
        let io_err = |source| StoreError::Io {
            path: lock_path.clone(),
            source,
        };
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)
            .map_err(io_err)?;
        let mut lock = FileLock::new(file);
        let _guard = lock.write().map_err(io_err)?;
        debug!("Locked {lock_path:?}");

        let updated = update(self.get_site_state(site_id)?);
        self.put_site_state(site_id, &updated)?;
        Ok(updated)
    }

    fn get_file_record(&self, file_id: &str) -> Result<Option<FileRecord>, StoreError> {
        read_json(&self.file_path(file_id)?)
    }

    fn put_file_record(&self, record: &FileRecord) -> Result<(), StoreError> {
        write_json(&self.file_path(&record.file_id)?, record, "file record")
    }

    fn list_file_records(&self) -> Result<Vec<FileRecord>, StoreError> {
        let dir = self.files_dir();
        let entries = fs::read_dir(&dir).map_err(|source| StoreError::Io {
            path: dir.clone(),
            source,
        })?;
        let mut records = Vec::new();
        for entry in entries {
            let path = entry
                .map_err(|source| StoreError::Io {
                    path: dir.clone(),
                    source,
                })?
                .path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            if let Some(record) = read_json::<FileRecord>(&path)? {
                records.push(record);
            }
        }
        sort_by_upload(&mut records);
        Ok(records)
    }
}

fn sort_by_upload(records: &mut [FileRecord]) {
    records.sort_by(|a, b| {
        a.uploaded_at
            .cmp(&b.uploaded_at)
            .then_with(|| a.file_id.cmp(&b.file_id))
    });
}

/// Identifiers become file names, so only a conservative alphabet is allowed.
fn storage_key(id: &str) -> Result<&str, StoreError> {
    let valid = !id.is_empty()
        && id
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_');
    if valid {
        Ok(id)
    } else {
        Err(StoreError::InvalidKey(id.to_string()))
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, StoreError> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(StoreError::Io {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    serde_json::from_slice(&bytes)
        .map(Some)
        .map_err(|source| StoreError::Corrupt {
            path: path.to_path_buf(),
            source,
        })
}

fn write_json<T: Serialize>(path: &Path, value: &T, what: &str) -> Result<(), StoreError> {
    let encoded = serde_json::to_vec_pretty(value).map_err(|source| StoreError::Encode {
        what: what.to_string(),
        source,
    })?;
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let io_err = |source| StoreError::Io {
        path: path.to_path_buf(),
        source,
    };
    let mut staged = NamedTempFile::new_in(dir).map_err(io_err)?;
    staged.write_all(&encoded).map_err(io_err)?;
    staged.as_file().sync_all().map_err(io_err)?;
    staged.persist(path).map_err(|err| io_err(err.error))?;
    debug!("Wrote {what} to {path:?}");
    Ok(())
}
