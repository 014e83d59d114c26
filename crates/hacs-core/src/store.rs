//! Durable snapshot of the registry and global settings.

use std::{
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
    sync::{Mutex, RwLock},
};

use hacs_config::config::Config;
use hacs_utils::fs::ensure_dir_exists;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

use crate::{
    error::{ErrorContext, HacsError},
    model::Repository,
    registry::Registry,
    HacsResult,
};

pub const SCHEMA_VERSION: u32 = 1;

/// Runtime settings persisted next to the repositories.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    pub country: String,
    pub release_limit: usize,
    pub experimental: bool,
}

impl Settings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            country: config.country().to_string(),
            release_limit: config.release_limit(),
            experimental: config.experimental(),
        }
    }
}

/// The single record written to disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub schema: u32,
    #[serde(default)]
    pub settings: Option<Settings>,
    #[serde(default)]
    pub repositories: Vec<Repository>,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            schema: SCHEMA_VERSION,
            settings: None,
            repositories: Vec::new(),
        }
    }
}

/// JSON file store with atomic replacement.
#[derive(Debug)]
pub struct PersistentStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl PersistentStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the stored snapshot. A missing file is an empty store.
    pub fn load(&self) -> HacsResult<Snapshot> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no stored state, starting empty");
                return Ok(Snapshot::default());
            }
            Err(err) => {
                return Err(HacsError::IoError {
                    action: format!("reading {}", self.path.display()),
                    source: err,
                })
            }
        };

        let snapshot: Snapshot = serde_json::from_slice(&bytes)?;
        if snapshot.schema != SCHEMA_VERSION {
            return Err(HacsError::UnsupportedSchema(snapshot.schema));
        }
        debug!(
            path = %self.path.display(),
            count = snapshot.repositories.len(),
            "loaded stored state"
        );
        Ok(snapshot)
    }

    /// Writes `snapshot` to a temporary file next to the target and renames it into place.
    pub fn save(&self, snapshot: &Snapshot) -> HacsResult<()> {
        let _guard = self.write_lock.lock()?;
        self.write(snapshot)
    }

    /// Snapshots the registry together with `settings` and saves it.
    ///
    /// The snapshot is taken while holding the write lock, so concurrent calls land on disk
    /// in the order they read the registry.
    pub fn persist(&self, registry: &Registry, settings: &RwLock<Settings>) -> HacsResult<()> {
        let _guard = self.write_lock.lock()?;
        let snapshot = Snapshot {
            schema: SCHEMA_VERSION,
            settings: Some(settings.read()?.clone()),
            repositories: registry.all()?,
        };
        self.write(&snapshot)
    }

    fn write(&self, snapshot: &Snapshot) -> HacsResult<()> {
        let parent = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        ensure_dir_exists(parent)?;

        let mut tmp = tempfile::NamedTempFile::new_in(parent)
            .with_context(|| format!("creating temporary file in {}", parent.display()))?;
        serde_json::to_writer_pretty(&mut tmp, snapshot)?;
        tmp.flush()
            .with_context(|| format!("flushing {}", tmp.path().display()))?;
        tmp.as_file()
            .sync_all()
            .with_context(|| format!("syncing {}", tmp.path().display()))?;
        tmp.persist(&self.path).map_err(|err| {
            HacsError::IoError {
                action: format!("replacing {}", self.path.display()),
                source: err.error,
            }
        })?;

        trace!(path = %self.path.display(), "state saved");
        Ok(())
    }
}
