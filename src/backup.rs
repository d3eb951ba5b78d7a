//! JSON snapshots of settings taken before a module changes them.
//!
//! One file per module at `<backup dir>/<module>.json`. A newer snapshot
//! replaces the older one.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::error::{Result, TuneError};

/// A stored snapshot with the time it was taken.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot<T> {
    pub created: DateTime<Utc>,
    pub data: T,
}

#[derive(Debug, Clone)]
pub struct BackupStore {
    dir: PathBuf,
}

impl BackupStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn file_for(&self, module: &str) -> PathBuf {
        self.dir.join(format!("{}.json", module))
    }

    pub fn save<T: Serialize>(&self, module: &str, data: &T) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;
        let path = self.file_for(module);
        let snapshot = Snapshot {
            created: Utc::now(),
            data,
        };
        fs::write(&path, serde_json::to_string_pretty(&snapshot)?)?;
        tracing::debug!("Saved {} backup to {}", module, path.display());
        Ok(path)
    }

    /// Save, logging instead of failing. Modules keep going without a backup.
    pub fn save_best_effort<T: Serialize>(&self, module: &str, data: &T) {
        if let Err(e) = self.save(module, data) {
            tracing::warn!("Could not save {} backup: {}", module, e);
        }
    }

    pub fn load<T: DeserializeOwned>(&self, module: &str) -> Result<Snapshot<T>> {
        let path = self.file_for(module);
        let contents = match fs::read_to_string(&path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(TuneError::NoBackup(module.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_str(&contents)?)
    }

    pub fn exists(&self, module: &str) -> bool {
        self.file_for(module).exists()
    }
}
