//! Three-way decisions for one directory level: local view, remote view and
//! the previous state as tombstone oracle. Pure logic, no I/O.

use std::cmp::Ordering;

use super::model::FileEntry;

/// Winner when both sides changed content and report the same
/// modification instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TieBreak {
    #[default]
    PreferLocal,
    PreferRemote,
}

impl TieBreak {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "local" | "prefer-local" => Some(TieBreak::PreferLocal),
            "remote" | "prefer-remote" => Some(TieBreak::PreferRemote),
            _ => None,
        }
    }
}

/// Why a transfer was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cause {
    /// Present on one side only and never seen before.
    New,
    /// Content differs and this side is newer.
    Newer,
    /// Content differs, timestamps tie, [`TieBreak`] picked this side.
    Tie,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileAction {
    /// Digests are equal; timestamps are irrelevant.
    Keep,
    Upload(Cause),
    Download(Cause),
    /// Known before, now gone remotely.
    DeleteLocal,
    /// Known before, now gone locally.
    TrashRemote,
    /// Absent on both sides; only the previous record is left to drop.
    Forget,
}

impl FileAction {
    pub fn is_conflict(&self) -> bool {
        matches!(
            self,
            FileAction::Upload(Cause::Newer | Cause::Tie)
                | FileAction::Download(Cause::Newer | Cause::Tie)
        )
    }
}

pub fn decide_file(
    local: Option<&FileEntry>,
    remote: Option<&FileEntry>,
    previously_known: bool,
    tie_break: TieBreak,
) -> FileAction {
    match (local, remote) {
        (Some(local), Some(remote)) => {
            if local.same_content(remote) {
                return FileAction::Keep;
            }
            match local.modified.cmp(&remote.modified) {
                Ordering::Greater => FileAction::Upload(Cause::Newer),
                Ordering::Less => FileAction::Download(Cause::Newer),
                Ordering::Equal => match tie_break {
                    TieBreak::PreferLocal => FileAction::Upload(Cause::Tie),
                    TieBreak::PreferRemote => FileAction::Download(Cause::Tie),
                },
            }
        }
        (Some(_), None) if previously_known => FileAction::DeleteLocal,
        (Some(_), None) => FileAction::Upload(Cause::New),
        (None, Some(_)) if previously_known => FileAction::TrashRemote,
        (None, Some(_)) => FileAction::Download(Cause::New),
        (None, None) => FileAction::Forget,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DirAction {
    /// Present on both sides; recursion handles the contents.
    Descend,
    CreateRemote,
    CreateLocal,
    /// Deleted remotely; remove locally only if empty.
    RemoveLocalIfEmpty,
    /// Deleted locally; remove remotely only if empty.
    RemoveRemoteIfEmpty,
    Forget,
}

pub fn decide_dir(local_has: bool, remote_has: bool, previously_known: bool) -> DirAction {
    match (local_has, remote_has) {
        (true, true) => DirAction::Descend,
        (true, false) if previously_known => DirAction::RemoveLocalIfEmpty,
        (true, false) => DirAction::CreateRemote,
        (false, true) if previously_known => DirAction::RemoveRemoteIfEmpty,
        (false, true) => DirAction::CreateLocal,
        (false, false) => DirAction::Forget,
    }
}
