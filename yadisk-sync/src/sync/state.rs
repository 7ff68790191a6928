use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;

use super::model::{EntryKind, FileEntry, Timestamp};

#[derive(Debug, Error)]
pub enum StateError {
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("XDG data directory is unavailable")]
    MissingDataDir,
    #[error("state for {identity} is corrupt: {reason}")]
    Corrupt { identity: String, reason: String },
}

/// Stable key of one synchronized local directory: SHA-256 of its absolute
/// path, hex encoded.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DirectoryIdentity(String);

impl DirectoryIdentity {
    pub fn for_directory(path: &Path) -> std::io::Result<Self> {
        let absolute = std::path::absolute(path)?;
        let mut hasher = Sha256::new();
        hasher.update(absolute.as_os_str().as_encoded_bytes());
        Ok(Self(format!("{:x}", hasher.finalize())))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DirectoryIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateEntry {
    pub kind: EntryKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub digest: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub modified: Option<Timestamp>,
}

impl StateEntry {
    pub fn file(entry: &FileEntry) -> Self {
        Self {
            kind: EntryKind::File,
            digest: Some(entry.digest.clone()),
            size: Some(entry.size),
            modified: Some(entry.modified),
        }
    }

    pub fn dir() -> Self {
        Self {
            kind: EntryKind::Dir,
            digest: None,
            size: None,
            modified: None,
        }
    }
}

/// Entries of one directory level as they stood at the end of its last
/// reconciliation. An absent record loads as the empty state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PreviousState {
    entries: BTreeMap<String, StateEntry>,
}

impl PreviousState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&StateEntry> {
        self.entries.get(name)
    }

    pub fn insert(&mut self, name: impl Into<String>, entry: StateEntry) {
        self.entries.insert(name.into(), entry);
    }

    pub fn knows_file(&self, name: &str) -> bool {
        self.get(name).is_some_and(|entry| entry.kind == EntryKind::File)
    }

    pub fn knows_dir(&self, name: &str) -> bool {
        self.get(name).is_some_and(|entry| entry.kind == EntryKind::Dir)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &StateEntry)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl FromIterator<(String, StateEntry)> for PreviousState {
    fn from_iter<I: IntoIterator<Item = (String, StateEntry)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

/// Persistence of [`PreviousState`] records, one per directory identity.
/// Records are partitioned by identity, so concurrent levels never contend
/// on the same record.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn load(&self, identity: &DirectoryIdentity) -> Result<PreviousState, StateError>;

    async fn save(
        &self,
        identity: &DirectoryIdentity,
        state: &PreviousState,
    ) -> Result<(), StateError>;
}

pub fn default_state_dir() -> Result<PathBuf, StateError> {
    let mut path = dirs::data_dir().ok_or(StateError::MissingDataDir)?;
    path.push("yadisk-sync");
    path.push("state");
    Ok(path)
}
