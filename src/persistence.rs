//! Snapshot persistence for the domain store
//!
//! The whole store is written as one JSON document. Writes go to a temporary
//! file first and are renamed into place so a crash never leaves a torn
//! snapshot behind.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::errors::{LinkError, Result};
use crate::store::Store;

pub const SNAPSHOT_FILE: &str = "superlink.json";
pub const SNAPSHOT_VERSION: u32 = 1;

#[derive(Serialize)]
struct SnapshotRef<'a> {
    version: u32,
    store: &'a Store,
}

#[derive(Deserialize)]
struct Snapshot {
    version: u32,
    store: Store,
}

/// Snapshot file inside a data directory
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    dir: PathBuf,
}

impl SnapshotStore {
    /// Open a snapshot directory, creating it when missing
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        if !dir.exists() {
            fs::create_dir_all(&dir).context("Failed to create data directory")?;
        }
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self) -> PathBuf {
        self.dir.join(SNAPSHOT_FILE)
    }

    pub fn exists(&self) -> bool {
        self.path().is_file()
    }

    pub fn save(&self, store: &Store) -> Result<PathBuf> {
        let path = self.path();
        let tmp = self.dir.join(format!("{}.tmp", SNAPSHOT_FILE));

        let json = serde_json::to_string_pretty(&SnapshotRef {
            version: SNAPSHOT_VERSION,
            store,
        })?;
        fs::write(&tmp, json).context("Failed to write snapshot")?;
        fs::rename(&tmp, &path).context("Failed to move snapshot into place")?;

        debug!(path = %path.display(), users = store.user_count(), "snapshot saved");
        Ok(path)
    }

    /// Load the snapshot; an absent file yields an empty store
    pub fn load(&self) -> Result<Store> {
        let path = self.path();
        if !path.exists() {
            info!(path = %path.display(), "no snapshot found, starting empty");
            return Ok(Store::default());
        }

        let json = fs::read_to_string(&path).context("Failed to read snapshot")?;
        let snapshot: Snapshot = serde_json::from_str(&json)?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(LinkError::Generic(format!(
                "unsupported snapshot version {} (expected {})",
                snapshot.version, SNAPSHOT_VERSION
            )));
        }
        Ok(snapshot.store)
    }
}
