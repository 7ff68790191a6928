use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::state::{DirectoryIdentity, PreviousState, StateError, StateStore};

/// [`StateStore`] writing one pretty-printed JSON document per directory,
/// `sync_state_<identity>.json`, into a metadata directory.
#[derive(Debug, Clone)]
pub struct JsonStateStore {
    dir: PathBuf,
}

impl JsonStateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, identity: &DirectoryIdentity) -> PathBuf {
        self.dir.join(format!("sync_state_{identity}.json"))
    }
}

#[async_trait]
impl StateStore for JsonStateStore {
    async fn load(&self, identity: &DirectoryIdentity) -> Result<PreviousState, StateError> {
        let raw = match tokio::fs::read(self.record_path(identity)).await {
            Ok(raw) => raw,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Ok(PreviousState::new());
            }
            Err(err) => return Err(err.into()),
        };
        serde_json::from_slice(&raw).map_err(|err| StateError::Corrupt {
            identity: identity.to_string(),
            reason: err.to_string(),
        })
    }

    async fn save(
        &self,
        identity: &DirectoryIdentity,
        state: &PreviousState,
    ) -> Result<(), StateError> {
        tokio::fs::create_dir_all(&self.dir).await?;
        let target = self.record_path(identity);
        let tmp = target.with_extension("json.tmp");
        let body = serde_json::to_vec_pretty(state)?;
        tokio::fs::write(&tmp, body).await?;
        tokio::fs::rename(&tmp, &target).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::model::{EntryKind, Timestamp};
    use crate::sync::state::StateEntry;
    use tempfile::tempdir;

    fn identity() -> DirectoryIdentity {
        DirectoryIdentity::for_directory(Path::new("/sync/docs")).unwrap()
    }

    #[tokio::test]
    async fn writes_one_file_per_identity() {
        let dir = tempdir().unwrap();
        let store = JsonStateStore::new(dir.path().join(".sync_metadata"));
        let mut state = PreviousState::new();
        state.insert(
            "a.txt",
            StateEntry {
                kind: EntryKind::File,
                digest: Some("h1".into()),
                size: Some(3),
                modified: Some(Timestamp::from_unix_seconds(1_700_000_000)),
            },
        );
        state.insert("photos", StateEntry::dir());

        store.save(&identity(), &state).await.unwrap();

        let expected = store
            .dir()
            .join(format!("sync_state_{}.json", identity()));
        assert!(expected.exists());
        assert_eq!(store.load(&identity()).await.unwrap(), state);
    }

    #[tokio::test]
    async fn absent_record_is_empty_state() {
        let dir = tempdir().unwrap();
        let store = JsonStateStore::new(dir.path());
        assert!(store.load(&identity()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn malformed_record_is_corrupt() {
        let dir = tempdir().unwrap();
        let store = JsonStateStore::new(dir.path());
        std::fs::write(
            dir.path().join(format!("sync_state_{}.json", identity())),
            b"{ not json",
        )
        .unwrap();

        let err = store.load(&identity()).await.unwrap_err();
        assert!(matches!(err, StateError::Corrupt { .. }));
    }
}
