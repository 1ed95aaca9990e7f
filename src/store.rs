use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use fs2::FileExt;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unable to read store file {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("unable to write store file {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("unable to lock {}: {source}", .path.display())]
    Lock {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid JSON in store at line {line}, column {column}: {message}")]
    InvalidJson {
        line: usize,
        column: usize,
        message: String,
    },
    #[error("corrupt record under '{key}': {reason}")]
    Corrupt { key: String, reason: String },
    #[error("unable to encode record: {0}")]
    Encode(#[from] serde_json::Error),
}

impl StoreError {
    pub(crate) fn invalid_json(err: &serde_json::Error) -> Self {
        StoreError::InvalidJson {
            line: err.line(),
            column: err.column(),
            message: err.to_string(),
        }
    }
}

/// Generic key/value persistence. Values are JSON text.
pub trait DurableStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn put(&self, key: &str, value: &str) -> Result<(), StoreError>;
    fn delete(&self, key: &str) -> Result<(), StoreError>;
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl DurableStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.entries.lock().get(key).cloned())
    }

    fn put(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.entries
            .lock()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        self.entries.lock().remove(key);
        Ok(())
    }
}

/// Exclusive advisory lock on a file, held until dropped.
#[derive(Debug)]
pub struct FileLock {
    _file: File,
}

impl FileLock {
    /// Blocks until no other process holds the lock.
    pub fn acquire(path: &Path) -> Result<Self, StoreError> {
        let lock_err = |source: io::Error| StoreError::Lock {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(lock_err)?;
        }
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .map_err(lock_err)?;
        file.lock_exclusive().map_err(lock_err)?;
        Ok(Self { _file: file })
    }
}

/// Key/value store persisted as a single JSON document.
///
/// Every operation re-reads the file under an advisory lock on a sibling
/// `.lock` file, so separate processes sharing the path never lose each
/// other's writes. Writes go to a sibling temp file and are renamed into
/// place, so a crash mid-write leaves the previous document.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
struct StoreFile {
    version: u32,
    #[serde(default)]
    entries: BTreeMap<String, String>,
}

impl JsonFileStore {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn exclusive(&self) -> Result<FileLock, StoreError> {
        FileLock::acquire(&self.path.with_extension("json.lock"))
    }

    pub fn entries(&self) -> Result<BTreeMap<String, String>, StoreError> {
        let _guard = self.lock.lock();
        let _file_lock = self.exclusive()?;
        Ok(self.load()?.entries)
    }

    pub fn clear(&self) -> Result<(), StoreError> {
        let _guard = self.lock.lock();
        let _file_lock = self.exclusive()?;
        self.save(&StoreFile {
            version: 1,
            entries: BTreeMap::new(),
        })
    }

    fn load(&self) -> Result<StoreFile, StoreError> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Ok(StoreFile {
                    version: 1,
                    entries: BTreeMap::new(),
                });
            }
            Err(source) => {
                return Err(StoreError::Read {
                    path: self.path.clone(),
                    source,
                });
            }
        };
        let file = serde_json::from_str::<StoreFile>(&content)
            .map_err(|err| StoreError::invalid_json(&err))?;
        if file.version != 1 {
            return Err(StoreError::Corrupt {
                key: self.path.display().to_string(),
                reason: format!(
                    "unsupported store version {}; expected version 1",
                    file.version
                ),
            });
        }
        Ok(file)
    }

    fn save(&self, file: &StoreFile) -> Result<(), StoreError> {
        let text = serde_json::to_string_pretty(file)?;
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|source| StoreError::Write {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, format!("{text}\n")).map_err(|source| StoreError::Write {
            path: tmp.clone(),
            source,
        })?;
        fs::rename(&tmp, &self.path).map_err(|source| StoreError::Write {
            path: self.path.clone(),
            source,
        })
    }
}

impl DurableStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let _guard = self.lock.lock();
        let _file_lock = self.exclusive()?;
        Ok(self.load()?.entries.get(key).cloned())
    }

    fn put(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let _guard = self.lock.lock();
        let _file_lock = self.exclusive()?;
        let mut file = self.load()?;
        file.entries.insert(key.to_string(), value.to_string());
        self.save(&file)
    }

    fn delete(&self, key: &str) -> Result<(), StoreError> {
        let _guard = self.lock.lock();
        let _file_lock = self.exclusive()?;
        let mut file = self.load()?;
        if file.entries.remove(key).is_none() {
            return Ok(());
        }
        self.save(&file)
    }
}
