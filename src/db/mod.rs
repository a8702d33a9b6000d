//! One-JSON-file-per-record persistence.
//!
//! Each record type lives in its own directory and every record is stored as
//! `<dir>/<id>.json`, pretty-printed. Writes go to `<id>.json.tmp` first and
//! are renamed into place.

pub mod models;
mod record_locks;

use std::{
    io::ErrorKind,
    marker::PhantomData,
    path::{Path, PathBuf},
    sync::Arc,
};

use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;
use tokio::fs;
use tracing::debug;
use uuid::Uuid;

pub use record_locks::RecordLocks;

use models::{Schedule, Trv};

pub const TRV_DIR: &str = "trvStorage";
pub const SCHEDULE_DIR: &str = "scheduleStorage";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record {0} not found")]
    NotFound(Uuid),

    #[error("record {0} already exists")]
    AlreadyExists(Uuid),

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid record JSON in {}: {source}", .path.display())]
    Serde {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// A persisted entity with a server-assigned, immutable id.
pub trait Record: Serialize + DeserializeOwned + Send + Sync + 'static {
    fn id(&self) -> Uuid;
}

#[derive(Debug)]
pub struct RecordStore<T> {
    dir: PathBuf,
    locks: RecordLocks,
    _record: PhantomData<fn() -> T>,
}

impl<T: Record> RecordStore<T> {
    /// Open the store rooted at `dir`, creating the directory if absent.
    pub async fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir).await.map_err(io_error(&dir))?;
        debug!(dir = %dir.display(), "record store opened");

        Ok(Self {
            dir,
            locks: RecordLocks::new(),
            _record: PhantomData,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Persist a new record and return what was read back from disk.
    ///
    /// The read-back is the durability confirmation: a record that cannot be
    /// re-read is reported as a failure.
    pub async fn create(&self, record: &T) -> Result<T, StoreError> {
        let id = record.id();
        let _guard = self.locks.lock(id).await;
        let path = self.path_for(id);

        if fs::try_exists(&path).await.map_err(io_error(&path))? {
            return Err(StoreError::AlreadyExists(id));
        }

        self.write(&path, record).await?;
        read_record(id, &path).await
    }

    pub async fn get(&self, id: Uuid) -> Result<T, StoreError> {
        read_record(id, &self.path_for(id)).await
    }

    /// Every stored record, in no particular order.
    pub async fn list(&self) -> Result<Vec<T>, StoreError> {
        let mut entries = fs::read_dir(&self.dir).await.map_err(io_error(&self.dir))?;
        let mut records = Vec::new();

        while let Some(entry) = entries.next_entry().await.map_err(io_error(&self.dir))? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }

            let bytes = match fs::read(&path).await {
                Ok(bytes) => bytes,
                // Deleted between read_dir and read.
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(source) => return Err(StoreError::Io { path, source }),
            };
            records.push(parse_record(&path, &bytes)?);
        }

        Ok(records)
    }

    /// Read-modify-write of one record under its id lock.
    ///
    /// `apply` receives the stored record and may reject the change; nothing
    /// is written in that case. It must not change the record's id.
    pub async fn update<F, E>(&self, id: Uuid, apply: F) -> Result<T, E>
    where
        F: FnOnce(&mut T) -> Result<(), E>,
        E: From<StoreError>,
    {
        let _guard = self.locks.lock(id).await;
        let path = self.path_for(id);

        let mut record = read_record(id, &path).await?;
        apply(&mut record)?;
        debug_assert_eq!(record.id(), id);

        self.write(&path, &record).await?;
        Ok(read_record(id, &path).await?)
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), StoreError> {
        let guard = self.locks.lock(id).await;
        let path = self.path_for(id);

        match fs::remove_file(&path).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => return Err(StoreError::NotFound(id)),
            Err(source) => return Err(StoreError::Io { path, source }),
        }

        drop(guard);
        self.locks.forget(id).await;
        debug!(path = %path.display(), "record deleted");
        Ok(())
    }

    fn path_for(&self, id: Uuid) -> PathBuf {
        self.dir.join(format!("{id}.json"))
    }

    async fn write(&self, path: &Path, record: &T) -> Result<(), StoreError> {
        let content = serde_json::to_vec_pretty(record).map_err(|source| StoreError::Serde {
            path: path.to_owned(),
            source,
        })?;

        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, &content).await.map_err(io_error(&tmp))?;
        fs::rename(&tmp, path).await.map_err(io_error(path))?;

        debug!(path = %path.display(), bytes = content.len(), "record written");
        Ok(())
    }
}

/// The two record stores, shared by every service.
#[derive(Debug, Clone)]
pub struct Stores {
    pub trvs: Arc<RecordStore<Trv>>,
    pub schedules: Arc<RecordStore<Schedule>>,
}

impl Stores {
    /// Open `<root>/trvStorage` and `<root>/scheduleStorage`.
    pub async fn open(root: impl AsRef<Path>) -> Result<Self, StoreError> {
        let root = root.as_ref();
        Ok(Self {
            trvs: Arc::new(RecordStore::open(root.join(TRV_DIR)).await?),
            schedules: Arc::new(RecordStore::open(root.join(SCHEDULE_DIR)).await?),
        })
    }
}

async fn read_record<T: Record>(id: Uuid, path: &Path) -> Result<T, StoreError> {
    match fs::read(path).await {
        Ok(bytes) => parse_record(path, &bytes),
        Err(e) if e.kind() == ErrorKind::NotFound => Err(StoreError::NotFound(id)),
        Err(source) => Err(StoreError::Io {
            path: path.to_owned(),
            source,
        }),
    }
}

fn parse_record<T: Record>(path: &Path, bytes: &[u8]) -> Result<T, StoreError> {
    serde_json::from_slice(bytes).map_err(|source| StoreError::Serde {
        path: path.to_owned(),
        source,
    })
}

fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> StoreError + '_ {
    move |source| StoreError::Io {
        path: path.to_owned(),
        source,
    }
}
