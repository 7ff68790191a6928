use std::io;
use std::path::Path;

use crate::gateway::RemoteGateway;
use crate::gateway::transfer::is_partial_name;

use super::fingerprint::md5_file;
use super::model::{DirectorySnapshot, EntryKind, FileEntry, Listing, Locator, Timestamp};
use super::paths::validate_entry_name;
use super::result::FailureKind;
use super::state::PreviousState;

/// Lists the immediate children of a local directory.
///
/// A missing directory is an empty snapshot; creating it is the
/// reconciler's job. Digests are reused from `previous` for files whose
/// size and modification time are unchanged.
pub async fn list_local(dir: &Path, previous: &PreviousState) -> Listing {
    match snapshot_local(dir, previous).await {
        Ok(snapshot) => Listing::Available(snapshot),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {
            Listing::Available(DirectorySnapshot::default())
        }
        Err(err) => {
            tracing::warn!(path = %dir.display(), error = %err, "local listing failed");
            Listing::Unavailable {
                kind: FailureKind::LocalIo,
                reason: err.to_string(),
            }
        }
    }
}

async fn snapshot_local(dir: &Path, previous: &PreviousState) -> io::Result<DirectorySnapshot> {
    let mut snapshot = DirectorySnapshot::default();
    let mut entries = tokio::fs::read_dir(dir).await?;
    while let Some(entry) = entries.next_entry().await? {
        let Ok(name) = entry.file_name().into_string() else {
            tracing::warn!(path = %entry.path().display(), "skipping non UTF-8 name");
            continue;
        };
        let file_type = entry.file_type().await?;
        if file_type.is_symlink() {
            tracing::debug!(path = %entry.path().display(), "skipping symlink");
            continue;
        }
        if file_type.is_dir() {
            snapshot.dirs.insert(name);
            continue;
        }
        if !file_type.is_file() || is_partial_name(&name) {
            continue;
        }

        let path = entry.path();
        let metadata = entry.metadata().await?;
        let size = metadata.len();
        let modified = Timestamp::from_system_time(metadata.modified()?);
        let digest = match reusable_digest(previous, &name, size, modified) {
            Some(digest) => digest,
            None => md5_file(&path).await?,
        };
        snapshot.insert_file(FileEntry {
            name,
            size,
            modified,
            digest,
            locator: Locator::Local(path),
        });
    }
    Ok(snapshot)
}

fn reusable_digest(
    previous: &PreviousState,
    name: &str,
    size: u64,
    modified: Timestamp,
) -> Option<String> {
    let record = previous.get(name)?;
    if record.kind != EntryKind::File
        || record.size != Some(size)
        || record.modified != Some(modified)
    {
        return None;
    }
    record.digest.clone()
}

/// Lists the immediate children of a remote directory. A gateway failure
/// yields [`Listing::Unavailable`], never an empty snapshot.
pub async fn list_remote(gateway: &dyn RemoteGateway, dir: &str) -> Listing {
    let items = match gateway.list(dir).await {
        Ok(items) => items,
        Err(err) => {
            tracing::warn!(path = dir, error = %err, "remote listing failed");
            return Listing::Unavailable {
                kind: err.failure_kind(),
                reason: err.to_string(),
            };
        }
    };

    let mut snapshot = DirectorySnapshot::default();
    for item in items {
        if let Err(err) = validate_entry_name(&item.name) {
            tracing::warn!(path = %item.path, error = %err, "skipping remote entry");
            continue;
        }
        if is_partial_name(&item.name) {
            tracing::debug!(path = %item.path, "skipping in-flight download");
            continue;
        }
        match item.kind {
            EntryKind::Dir => {
                snapshot.dirs.insert(item.name);
            }
            EntryKind::File => {
                let modified = Timestamp::parse_remote_or_earliest(item.modified.as_deref());
                snapshot.insert_file(FileEntry {
                    digest: item.md5.unwrap_or_default().to_ascii_lowercase(),
                    size: item.size.unwrap_or(0),
                    modified,
                    locator: Locator::Remote(item.path),
                    name: item.name,
                });
            }
        }
    }
    Listing::Available(snapshot)
}
