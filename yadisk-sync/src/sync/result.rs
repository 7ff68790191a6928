use std::fmt;
use std::path::PathBuf;

use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    LocalIo,
    RemoteTransient,
    RemoteNotFound,
    Remote,
    StateStore,
    Cancelled,
    RootMissing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    Reconcile,
    EnsureRoot,
    ListLocal,
    ListRemote,
    LoadState,
    Upload,
    Download,
    DeleteLocal,
    TrashRemote,
    CreateLocalDir,
    CreateRemoteDir,
    RemoveLocalDir,
    RemoveRemoteDir,
    SaveState,
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ActionKind::Reconcile => "reconcile",
            ActionKind::EnsureRoot => "ensure-root",
            ActionKind::ListLocal => "list-local",
            ActionKind::ListRemote => "list-remote",
            ActionKind::LoadState => "load-state",
            ActionKind::Upload => "upload",
            ActionKind::Download => "download",
            ActionKind::DeleteLocal => "delete-local",
            ActionKind::TrashRemote => "trash-remote",
            ActionKind::CreateLocalDir => "create-local-dir",
            ActionKind::CreateRemoteDir => "create-remote-dir",
            ActionKind::RemoveLocalDir => "remove-local-dir",
            ActionKind::RemoveRemoteDir => "remove-remote-dir",
            ActionKind::SaveState => "save-state",
        };
        f.write_str(label)
    }
}

/// One entry that did not converge during a pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntryFailure {
    pub path: PathBuf,
    pub action: ActionKind,
    pub kind: FailureKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncStats {
    pub levels: u64,
    pub uploaded: u64,
    pub downloaded: u64,
    pub deleted_local: u64,
    pub trashed_remote: u64,
    pub dirs_created_local: u64,
    pub dirs_created_remote: u64,
    pub dirs_removed_local: u64,
    pub dirs_removed_remote: u64,
    pub conflicts: u64,
}

impl SyncStats {
    pub fn merge(&mut self, other: &SyncStats) {
        self.levels += other.levels;
        self.uploaded += other.uploaded;
        self.downloaded += other.downloaded;
        self.deleted_local += other.deleted_local;
        self.trashed_remote += other.trashed_remote;
        self.dirs_created_local += other.dirs_created_local;
        self.dirs_created_remote += other.dirs_created_remote;
        self.dirs_removed_local += other.dirs_removed_local;
        self.dirs_removed_remote += other.dirs_removed_remote;
        self.conflicts += other.conflicts;
    }

    /// Counts one completed action.
    pub fn record(&mut self, action: ActionKind) {
        match action {
            ActionKind::Upload => self.uploaded += 1,
            ActionKind::Download => self.downloaded += 1,
            ActionKind::DeleteLocal => self.deleted_local += 1,
            ActionKind::TrashRemote => self.trashed_remote += 1,
            ActionKind::CreateLocalDir => self.dirs_created_local += 1,
            ActionKind::CreateRemoteDir => self.dirs_created_remote += 1,
            ActionKind::RemoveLocalDir => self.dirs_removed_local += 1,
            ActionKind::RemoveRemoteDir => self.dirs_removed_remote += 1,
            ActionKind::Reconcile
            | ActionKind::EnsureRoot
            | ActionKind::ListLocal
            | ActionKind::ListRemote
            | ActionKind::LoadState
            | ActionKind::SaveState => {}
        }
    }

    /// Transfers, creations and deletions; conflicts are counted inside
    /// the transfer that resolved them.
    pub fn total_actions(&self) -> u64 {
        self.uploaded
            + self.downloaded
            + self.deleted_local
            + self.trashed_remote
            + self.dirs_created_local
            + self.dirs_created_remote
            + self.dirs_removed_local
            + self.dirs_removed_remote
    }
}

/// What a single directory level produced.
#[derive(Debug, Clone, Default)]
pub struct LevelOutcome {
    pub failures: Vec<EntryFailure>,
    pub stats: SyncStats,
}

impl LevelOutcome {
    pub fn fail(
        &mut self,
        path: impl Into<PathBuf>,
        action: ActionKind,
        kind: FailureKind,
        message: impl Into<String>,
    ) {
        let failure = EntryFailure {
            path: path.into(),
            action,
            kind,
            message: message.into(),
        };
        tracing::error!(
            path = %failure.path.display(),
            action = %failure.action,
            kind = ?failure.kind,
            error = %failure.message,
            "entry did not converge"
        );
        self.failures.push(failure);
    }

    pub fn succeeded(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Aggregate of a whole reconciliation pass.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconciliationResult {
    pub success: bool,
    pub failures: Vec<EntryFailure>,
    pub stats: SyncStats,
}

impl ReconciliationResult {
    /// Reduces outcomes collected after every task has finished; success is
    /// the logical AND of all of them.
    pub fn reduce(outcomes: impl IntoIterator<Item = LevelOutcome>) -> Self {
        let mut result = ReconciliationResult {
            success: true,
            ..Default::default()
        };
        for outcome in outcomes {
            result.success &= outcome.succeeded();
            result.stats.merge(&outcome.stats);
            result.failures.extend(outcome.failures);
        }
        result.failures.sort_by(|a, b| a.path.cmp(&b.path));
        result
    }

    pub fn merge(&mut self, other: ReconciliationResult) {
        self.success &= other.success;
        self.stats.merge(&other.stats);
        self.failures.extend(other.failures);
    }
}
