use super::{StorageError, UsageRecord};
use chrono::NaiveDate;
use fs2::FileExt;
use log::debug;
use std::ffi::OsString;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Persistence for the single usage record.
pub trait UsageStore: Send {
    /// `Ok(None)` when nothing has been persisted yet.
    fn load(&self) -> Result<Option<UsageRecord>, StorageError>;

    fn save(&self, record: &UsageRecord) -> Result<(), StorageError>;

    /// Read-modify-write as one step. Implementations shared between
    /// processes must hold a lock for the duration.
    fn update(
        &self,
        apply: &mut dyn FnMut(Option<UsageRecord>) -> UsageRecord,
    ) -> Result<UsageRecord, StorageError> {
        let next = apply(self.load()?);
        self.save(&next)?;
        Ok(next)
    }
}

/// JSON file holding `{"date": "YYYY-MM-DD", "count": N}`.
///
/// Writes go to a sibling temp file and are renamed into place, so a
/// reader sees either the old or the new record. `update` holds an
/// exclusive lock on `<file>.lock` across the read and the write.
#[derive(Debug, Clone)]
pub struct FileUsageStore {
    path: PathBuf,
}

impl FileUsageStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Create the file with `{today, 0}` if it does not exist yet.
    pub fn initialize(&self, today: NaiveDate) -> Result<(), StorageError> {
        self.update(&mut |current| current.unwrap_or_else(|| UsageRecord::fresh(today)))
            .map(|_| ())
    }

    fn sibling(&self, suffix: &str) -> PathBuf {
        let mut name: OsString = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| OsString::from("api_usage.json"));
        name.push(suffix);
        self.path.with_file_name(name)
    }

    fn io_err(&self, source: std::io::Error) -> StorageError {
        StorageError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl UsageStore for FileUsageStore {
    fn load(&self) -> Result<Option<UsageRecord>, StorageError> {
        let raw = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.io_err(e)),
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|source| StorageError::Corrupt {
                path: self.path.clone(),
                source,
            })
    }

    fn save(&self, record: &UsageRecord) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| self.io_err(e))?;
        }
        let json = serde_json::to_vec(record).map_err(|source| StorageError::Corrupt {
            path: self.path.clone(),
            source,
        })?;
        let tmp = self.sibling(".tmp");
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(&tmp)
            .map_err(|e| self.io_err(e))?;
        file.write_all(&json).map_err(|e| self.io_err(e))?;
        file.sync_all().map_err(|e| self.io_err(e))?;
        drop(file);
        fs::rename(&tmp, &self.path).map_err(|e| self.io_err(e))?;
        debug!("usage file {} <- {:?}", self.path.display(), record);
        Ok(())
    }

    fn update(
        &self,
        apply: &mut dyn FnMut(Option<UsageRecord>) -> UsageRecord,
    ) -> Result<UsageRecord, StorageError> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| self.io_err(e))?;
        }
        let lock_path = self.sibling(".lock");
        let lock = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(|e| self.io_err(e))?;
        lock.lock_exclusive().map_err(|source| StorageError::Lock {
            path: lock_path.clone(),
            source,
        })?;
        let result = self.load().and_then(|current| {
            let next = apply(current);
            self.save(&next).map(|_| next)
        });
        // Released on drop as well; an explicit unlock failure is not fatal.
        let _ = FileExt::unlock(&lock);
        result
    }
}

/// In-memory store; clones share the same record.
#[derive(Debug, Clone, Default)]
pub struct MemoryUsageStore {
    record: Arc<Mutex<Option<UsageRecord>>>,
}

impl MemoryUsageStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_record(record: UsageRecord) -> Self {
        Self {
            record: Arc::new(Mutex::new(Some(record))),
        }
    }

    pub fn get(&self) -> Option<UsageRecord> {
        *self.record.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl UsageStore for MemoryUsageStore {
    fn load(&self) -> Result<Option<UsageRecord>, StorageError> {
        Ok(self.get())
    }

    fn save(&self, record: &UsageRecord) -> Result<(), StorageError> {
        *self.record.lock().unwrap_or_else(|p| p.into_inner()) = Some(*record);
        Ok(())
    }

    fn update(
        &self,
        apply: &mut dyn FnMut(Option<UsageRecord>) -> UsageRecord,
    ) -> Result<UsageRecord, StorageError> {
        let mut slot = self.record.lock().unwrap_or_else(|p| p.into_inner());
        let next = apply(*slot);
        *slot = Some(next);
        Ok(next)
    }
}
