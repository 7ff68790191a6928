//! Execution of one directory level: ensure, list, decide, act, remember.

use std::collections::BTreeSet;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures_util::{StreamExt, stream};
use tokio_util::sync::CancellationToken;

use crate::gateway::{GatewayError, RemoteGateway};

use super::decision::{Cause, DirAction, FileAction, TieBreak, decide_dir, decide_file};
use super::fingerprint::md5_file;
use super::lister::{list_local, list_remote};
use super::model::{DirectorySnapshot, EntryKind, FileEntry, Listing, Timestamp};
use super::paths::{PathError, join_local, join_remote, normalize_remote};
use super::result::{ActionKind, FailureKind, LevelOutcome};
use super::state::{DirectoryIdentity, PreviousState, StateEntry, StateError, StateStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Local,
    Remote,
}

/// One directory pair to reconcile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LevelJob {
    pub local: PathBuf,
    pub remote: String,
    /// Set for children: the parent already saw or created both sides.
    pub confirmed: bool,
    /// The directory was deleted on this side while the other side still
    /// had content. The level removes what is known, keeps what is new and
    /// removes the surviving directory once nothing is left.
    pub deleted_on: Option<Side>,
}

impl LevelJob {
    pub fn root(local: impl Into<PathBuf>, remote: &str) -> Self {
        Self {
            local: local.into(),
            remote: normalize_remote(remote),
            confirmed: false,
            deleted_on: None,
        }
    }

    fn child(&self, name: &str, deleted_on: Option<Side>) -> Result<Self, PathError> {
        Ok(Self {
            local: join_local(&self.local, name)?,
            remote: join_remote(&self.remote, name)?,
            confirmed: true,
            deleted_on,
        })
    }
}

#[derive(Debug, Default)]
pub struct LevelReport {
    pub outcome: LevelOutcome,
    /// Subdirectories that exist on both sides after this level, or that
    /// must be pruned; the caller dispatches them.
    pub children: Vec<LevelJob>,
}

#[derive(Debug, Clone, Copy)]
pub struct LevelOptions {
    pub tie_break: TieBreak,
    /// Entry actions in flight at once within one level.
    pub entry_concurrency: usize,
}

impl Default for LevelOptions {
    fn default() -> Self {
        Self {
            tie_break: TieBreak::default(),
            entry_concurrency: 4,
        }
    }
}

enum Effect {
    Unchanged,
    Done {
        action: ActionKind,
        conflict: bool,
    },
    Failed {
        path: PathBuf,
        action: ActionKind,
        kind: FailureKind,
        message: String,
    },
}

/// What one entry action left behind: the record to remember for the name
/// and, for directories, the child level to dispatch.
struct EntryResult {
    name: String,
    record: Option<StateEntry>,
    effect: Effect,
    child: Option<LevelJob>,
}

impl EntryResult {
    fn new(name: &str, record: Option<StateEntry>, effect: Effect) -> Self {
        Self {
            name: name.to_string(),
            record,
            effect,
            child: None,
        }
    }

    fn failed(
        name: &str,
        carried: Option<StateEntry>,
        path: &Path,
        action: ActionKind,
        kind: FailureKind,
        message: impl Into<String>,
    ) -> Self {
        Self::new(
            name,
            carried,
            Effect::Failed {
                path: path.to_path_buf(),
                action,
                kind,
                message: message.into(),
            },
        )
    }

    fn with_child(mut self, child: Option<LevelJob>) -> Self {
        self.child = child;
        self
    }
}

enum Planned<'a> {
    File {
        name: &'a str,
        action: FileAction,
        local: Option<&'a FileEntry>,
        remote: Option<&'a FileEntry>,
    },
    Dir {
        name: &'a str,
        action: DirAction,
    },
}

impl Planned<'_> {
    fn needs_remote_parent(&self) -> bool {
        matches!(
            self,
            Planned::File {
                action: FileAction::Upload(_),
                ..
            } | Planned::Dir {
                action: DirAction::CreateRemote,
                ..
            }
        )
    }
}

/// Reconciles a single directory level. Cheap to clone; every worker of the
/// orchestrator holds one.
#[derive(Clone)]
pub struct LevelReconciler {
    gateway: Arc<dyn RemoteGateway>,
    state: Arc<dyn StateStore>,
    options: LevelOptions,
    cancel: CancellationToken,
}

impl LevelReconciler {
    pub fn new(
        gateway: Arc<dyn RemoteGateway>,
        state: Arc<dyn StateStore>,
        options: LevelOptions,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            gateway,
            state,
            options,
            cancel,
        }
    }

    pub async fn run(&self, job: LevelJob) -> LevelReport {
        let mut report = LevelReport::default();
        report.outcome.stats.levels = 1;
        tracing::debug!(
            local = %job.local.display(),
            remote = %job.remote,
            "reconciling level"
        );

        let identity = match DirectoryIdentity::for_directory(&job.local) {
            Ok(identity) => identity,
            Err(err) => {
                report.outcome.fail(
                    &job.local,
                    ActionKind::LoadState,
                    FailureKind::LocalIo,
                    err.to_string(),
                );
                return report;
            }
        };
        let Some(previous) = self.load_state(&job, &identity, &mut report.outcome).await else {
            return report;
        };

        if !job.confirmed && !self.ensure_root(&job, &previous, &mut report.outcome).await {
            return report;
        }

        let Some((local, remote)) = self.snapshots(&job, &previous, &mut report.outcome).await
        else {
            return report;
        };

        let mut next = PreviousState::new();
        let planned = plan(&local, &remote, &previous, self.options.tie_break);

        if job.deleted_on == Some(Side::Remote)
            && planned.iter().any(Planned::needs_remote_parent)
            && !self.recreate_remote(&job, &mut report.outcome).await
        {
            return report;
        }

        let results: Vec<EntryResult> = {
            let this = self;
            let job = &job;
            let previous = &previous;
            let applies: Vec<_> = planned
                .into_iter()
                .map(|planned| this.apply(job, previous, planned))
                .collect();
            stream::iter(applies)
                .buffer_unordered(self.options.entry_concurrency.max(1))
                .collect()
                .await
        };

        for result in results {
            if let Some(record) = result.record {
                next.insert(result.name, record);
            }
            if let Some(child) = result.child {
                report.children.push(child);
            }
            match result.effect {
                Effect::Unchanged => {}
                Effect::Done { action, conflict } => {
                    report.outcome.stats.record(action);
                    if conflict {
                        report.outcome.stats.conflicts += 1;
                    }
                }
                Effect::Failed {
                    path,
                    action,
                    kind,
                    message,
                } => report.outcome.fail(path, action, kind, message),
            }
        }
        report.children.sort_by(|a, b| a.local.cmp(&b.local));

        if job.deleted_on.is_some()
            && next.is_empty()
            && report.children.is_empty()
            && report.outcome.succeeded()
        {
            self.prune(&job, &mut report.outcome).await;
        }

        if let Err(err) = self.state.save(&identity, &next).await {
            report.outcome.fail(
                &job.local,
                ActionKind::SaveState,
                FailureKind::StateStore,
                err.to_string(),
            );
        }
        report
    }

    async fn load_state(
        &self,
        job: &LevelJob,
        identity: &DirectoryIdentity,
        outcome: &mut LevelOutcome,
    ) -> Option<PreviousState> {
        match self.state.load(identity).await {
            Ok(previous) => Some(previous),
            Err(err @ StateError::Corrupt { .. }) => {
                tracing::warn!(
                    path = %job.local.display(),
                    error = %err,
                    "previous state unreadable, treating as empty"
                );
                Some(PreviousState::new())
            }
            Err(err) => {
                outcome.fail(
                    &job.local,
                    ActionKind::LoadState,
                    FailureKind::StateStore,
                    err.to_string(),
                );
                None
            }
        }
    }

    /// Makes sure both root directories exist. A root that vanished after a
    /// previous pass is never recreated empty; that would propagate as a
    /// deletion of the whole tree.
    async fn ensure_root(
        &self,
        job: &LevelJob,
        previous: &PreviousState,
        outcome: &mut LevelOutcome,
    ) -> bool {
        let local_exists = match tokio::fs::metadata(&job.local).await {
            Ok(meta) if meta.is_dir() => true,
            Ok(_) => {
                outcome.fail(
                    &job.local,
                    ActionKind::EnsureRoot,
                    FailureKind::LocalIo,
                    "local root is not a directory",
                );
                return false;
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => false,
            Err(err) => {
                outcome.fail(
                    &job.local,
                    ActionKind::EnsureRoot,
                    FailureKind::LocalIo,
                    err.to_string(),
                );
                return false;
            }
        };
        let remote_exists = match self.gateway.exists(&job.remote).await {
            Ok(exists) => exists,
            Err(err) => {
                outcome.fail(
                    &job.local,
                    ActionKind::EnsureRoot,
                    err.failure_kind(),
                    err.to_string(),
                );
                return false;
            }
        };
        if local_exists && remote_exists {
            return true;
        }

        if !previous.is_empty() {
            let side = if local_exists { "remote" } else { "local" };
            outcome.fail(
                &job.local,
                ActionKind::EnsureRoot,
                FailureKind::RootMissing,
                format!("{side} root disappeared after a previous pass"),
            );
            return false;
        }

        if !local_exists {
            if let Err(err) = tokio::fs::create_dir_all(&job.local).await {
                outcome.fail(
                    &job.local,
                    ActionKind::EnsureRoot,
                    FailureKind::LocalIo,
                    err.to_string(),
                );
                return false;
            }
            tracing::info!(path = %job.local.display(), "created local root");
            outcome.stats.record(ActionKind::CreateLocalDir);
        }
        if !remote_exists {
            if let Err(err) = self.create_remote_tree(&job.remote).await {
                outcome.fail(
                    &job.local,
                    ActionKind::EnsureRoot,
                    err.failure_kind(),
                    err.to_string(),
                );
                return false;
            }
            tracing::info!(path = %job.remote, "created remote root");
            outcome.stats.record(ActionKind::CreateRemoteDir);
        }
        true
    }

    async fn create_remote_tree(&self, path: &str) -> Result<(), GatewayError> {
        let mut current = String::new();
        for component in path.split('/').filter(|c| !c.is_empty()) {
            current.push('/');
            current.push_str(component);
            if !self.gateway.exists(&current).await? {
                self.gateway.create_directory(&current).await?;
            }
        }
        Ok(())
    }

    async fn snapshots(
        &self,
        job: &LevelJob,
        previous: &PreviousState,
        outcome: &mut LevelOutcome,
    ) -> Option<(DirectorySnapshot, DirectorySnapshot)> {
        let remote = async {
            if job.deleted_on == Some(Side::Remote) {
                Listing::Available(DirectorySnapshot::default())
            } else {
                list_remote(self.gateway.as_ref(), &job.remote).await
            }
        };
        let (local, remote) = tokio::join!(list_local(&job.local, previous), remote);
        match (local, remote) {
            (Listing::Available(local), Listing::Available(remote)) => Some((local, remote)),
            (local, remote) => {
                if let Listing::Unavailable { kind, reason } = local {
                    outcome.fail(&job.local, ActionKind::ListLocal, kind, reason);
                }
                if let Listing::Unavailable { kind, reason } = remote {
                    outcome.fail(&job.local, ActionKind::ListRemote, kind, reason);
                }
                None
            }
        }
    }

    async fn recreate_remote(&self, job: &LevelJob, outcome: &mut LevelOutcome) -> bool {
        tracing::info!(path = %job.remote, "recreating remote directory for new content");
        match self.create_remote_tree(&job.remote).await {
            Ok(()) => {
                outcome.stats.record(ActionKind::CreateRemoteDir);
                true
            }
            Err(err) => {
                outcome.fail(
                    &job.local,
                    ActionKind::CreateRemoteDir,
                    err.failure_kind(),
                    err.to_string(),
                );
                false
            }
        }
    }

    /// Removes the surviving side of a deleted directory once the level
    /// left nothing in it.
    async fn prune(&self, job: &LevelJob, outcome: &mut LevelOutcome) {
        match job.deleted_on {
            Some(Side::Remote) => match tokio::fs::remove_dir(&job.local).await {
                Ok(()) => {
                    tracing::info!(path = %job.local.display(), "removed local directory");
                    outcome.stats.record(ActionKind::RemoveLocalDir);
                }
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => {
                    tracing::warn!(
                        path = %job.local.display(),
                        error = %err,
                        "local directory kept"
                    );
                }
            },
            Some(Side::Local) => match self.gateway.list(&job.remote).await {
                Ok(items) if items.is_empty() => {
                    match self.gateway.remove_permanently(&job.remote).await {
                        Ok(()) => {
                            tracing::info!(path = %job.remote, "removed remote directory");
                            outcome.stats.record(ActionKind::RemoveRemoteDir);
                        }
                        Err(err) if err.is_not_found() => {}
                        Err(err) => outcome.fail(
                            &job.local,
                            ActionKind::RemoveRemoteDir,
                            err.failure_kind(),
                            err.to_string(),
                        ),
                    }
                }
                Ok(_) => {
                    tracing::warn!(path = %job.remote, "remote directory kept");
                }
                Err(err) if err.is_not_found() => {}
                Err(err) => outcome.fail(
                    &job.local,
                    ActionKind::RemoveRemoteDir,
                    err.failure_kind(),
                    err.to_string(),
                ),
            },
            None => {}
        }
    }

    async fn apply(
        &self,
        job: &LevelJob,
        previous: &PreviousState,
        planned: Planned<'_>,
    ) -> EntryResult {
        match planned {
            Planned::File {
                name,
                action,
                local,
                remote,
            } => self.apply_file(job, previous, name, action, local, remote).await,
            Planned::Dir { name, action } => self.apply_dir(job, previous, name, action).await,
        }
    }

    async fn apply_file(
        &self,
        job: &LevelJob,
        previous: &PreviousState,
        name: &str,
        action: FileAction,
        local: Option<&FileEntry>,
        remote: Option<&FileEntry>,
    ) -> EntryResult {
        let carried = previous.get(name).cloned();
        let local_path = match join_local(&job.local, name) {
            Ok(path) => path,
            Err(err) => {
                return EntryResult::failed(
                    name,
                    carried,
                    &job.local,
                    file_action_kind(action),
                    FailureKind::LocalIo,
                    err.to_string(),
                );
            }
        };

        match action {
            FileAction::Keep => {
                tracing::debug!(path = %local_path.display(), "identical");
                return EntryResult::new(name, local.map(StateEntry::file), Effect::Unchanged);
            }
            FileAction::Forget => return EntryResult::new(name, None, Effect::Unchanged),
            _ => {}
        }

        let action_kind = file_action_kind(action);
        if self.cancel.is_cancelled() {
            return EntryResult::failed(
                name,
                carried,
                &local_path,
                action_kind,
                FailureKind::Cancelled,
                "pass cancelled",
            );
        }
        let remote_path = match join_remote(&job.remote, name) {
            Ok(path) => path,
            Err(err) => {
                return EntryResult::failed(
                    name,
                    carried,
                    &local_path,
                    action_kind,
                    FailureKind::Remote,
                    err.to_string(),
                );
            }
        };
        let done = Effect::Done {
            action: action_kind,
            conflict: action.is_conflict(),
        };

        match action {
            FileAction::Upload(cause) => {
                log_transfer("uploading", cause, &local_path);
                match self.gateway.upload(&local_path, &remote_path, true).await {
                    Ok(()) => EntryResult::new(name, local.map(StateEntry::file), done),
                    Err(err) => EntryResult::failed(
                        name,
                        carried,
                        &local_path,
                        action_kind,
                        err.failure_kind(),
                        err.to_string(),
                    ),
                }
            }
            FileAction::Download(cause) => {
                log_transfer("downloading", cause, &local_path);
                let expected = remote
                    .map(|entry| entry.digest.as_str())
                    .filter(|digest| !digest.is_empty());
                match self
                    .gateway
                    .download(&remote_path, &local_path, expected)
                    .await
                {
                    Ok(()) => {
                        let record = match downloaded_record(&local_path, expected).await {
                            Ok(record) => Some(record),
                            Err(err) => {
                                tracing::warn!(
                                    path = %local_path.display(),
                                    error = %err,
                                    "could not stat downloaded file"
                                );
                                carried
                            }
                        };
                        EntryResult::new(name, record, done)
                    }
                    Err(err) => EntryResult::failed(
                        name,
                        carried,
                        &local_path,
                        action_kind,
                        err.failure_kind(),
                        err.to_string(),
                    ),
                }
            }
            FileAction::DeleteLocal => {
                tracing::info!(path = %local_path.display(), "deleted remotely, removing local copy");
                match tokio::fs::remove_file(&local_path).await {
                    Ok(()) => EntryResult::new(name, None, done),
                    Err(err) if err.kind() == io::ErrorKind::NotFound => {
                        EntryResult::new(name, None, Effect::Unchanged)
                    }
                    Err(err) => EntryResult::failed(
                        name,
                        carried,
                        &local_path,
                        action_kind,
                        FailureKind::LocalIo,
                        err.to_string(),
                    ),
                }
            }
            FileAction::TrashRemote => {
                tracing::info!(path = %remote_path, "deleted locally, moving remote copy to trash");
                match self.gateway.trash(&remote_path).await {
                    Ok(()) => EntryResult::new(name, None, done),
                    Err(err) if err.is_not_found() => {
                        EntryResult::new(name, None, Effect::Unchanged)
                    }
                    Err(err) => EntryResult::failed(
                        name,
                        carried,
                        &local_path,
                        action_kind,
                        err.failure_kind(),
                        err.to_string(),
                    ),
                }
            }
            FileAction::Keep | FileAction::Forget => EntryResult::new(name, None, Effect::Unchanged),
        }
    }

    async fn apply_dir(
        &self,
        job: &LevelJob,
        previous: &PreviousState,
        name: &str,
        action: DirAction,
    ) -> EntryResult {
        let carried = previous.get(name).cloned();
        let action_kind = dir_action_kind(action);
        let child = |deleted_on| job.child(name, deleted_on);
        let (child_job, local_path) = match child(None) {
            Ok(child_job) => {
                let local_path = child_job.local.clone();
                (child_job, local_path)
            }
            Err(err) => {
                return EntryResult::failed(
                    name,
                    carried,
                    &job.local,
                    action_kind,
                    FailureKind::LocalIo,
                    err.to_string(),
                );
            }
        };
        let done = Effect::Done {
            action: action_kind,
            conflict: false,
        };

        match action {
            DirAction::Descend => {
                return EntryResult::new(name, Some(StateEntry::dir()), Effect::Unchanged)
                    .with_child(Some(child_job));
            }
            DirAction::Forget => return EntryResult::new(name, None, Effect::Unchanged),
            _ => {}
        }
        if self.cancel.is_cancelled() {
            return EntryResult::failed(
                name,
                carried,
                &local_path,
                action_kind,
                FailureKind::Cancelled,
                "pass cancelled",
            );
        }

        match action {
            DirAction::CreateRemote => {
                tracing::info!(path = %child_job.remote, "creating remote directory");
                match self.gateway.create_directory(&child_job.remote).await {
                    Ok(()) => EntryResult::new(name, Some(StateEntry::dir()), done)
                        .with_child(Some(child_job)),
                    Err(err) => EntryResult::failed(
                        name,
                        carried,
                        &local_path,
                        action_kind,
                        err.failure_kind(),
                        err.to_string(),
                    ),
                }
            }
            DirAction::CreateLocal => {
                tracing::info!(path = %local_path.display(), "creating local directory");
                match tokio::fs::create_dir_all(&local_path).await {
                    Ok(()) => EntryResult::new(name, Some(StateEntry::dir()), done)
                        .with_child(Some(child_job)),
                    Err(err) => EntryResult::failed(
                        name,
                        carried,
                        &local_path,
                        action_kind,
                        FailureKind::LocalIo,
                        err.to_string(),
                    ),
                }
            }
            DirAction::RemoveLocalIfEmpty => match is_empty_dir(&local_path).await {
                Ok(true) => match tokio::fs::remove_dir(&local_path).await {
                    Ok(()) => {
                        tracing::info!(path = %local_path.display(), "deleted remotely, removed empty local directory");
                        EntryResult::new(name, None, done)
                    }
                    Err(err) if err.kind() == io::ErrorKind::NotFound => {
                        EntryResult::new(name, None, Effect::Unchanged)
                    }
                    Err(err) => EntryResult::failed(
                        name,
                        carried,
                        &local_path,
                        action_kind,
                        FailureKind::LocalIo,
                        err.to_string(),
                    ),
                },
                Ok(false) => {
                    tracing::warn!(
                        path = %local_path.display(),
                        "deleted remotely but not empty locally, pruning known entries"
                    );
                    EntryResult::new(name, Some(StateEntry::dir()), Effect::Unchanged)
                        .with_child(child(Some(Side::Remote)).ok())
                }
                Err(err) => EntryResult::failed(
                    name,
                    carried,
                    &local_path,
                    action_kind,
                    FailureKind::LocalIo,
                    err.to_string(),
                ),
            },
            DirAction::RemoveRemoteIfEmpty => match self.gateway.list(&child_job.remote).await {
                Ok(items) if items.is_empty() => {
                    match self.gateway.remove_permanently(&child_job.remote).await {
                        Ok(()) => {
                            tracing::info!(path = %child_job.remote, "deleted locally, removed empty remote directory");
                            EntryResult::new(name, None, done)
                        }
                        Err(err) if err.is_not_found() => {
                            EntryResult::new(name, None, Effect::Unchanged)
                        }
                        Err(err) => EntryResult::failed(
                            name,
                            carried,
                            &local_path,
                            action_kind,
                            err.failure_kind(),
                            err.to_string(),
                        ),
                    }
                }
                Ok(_) => {
                    tracing::warn!(
                        path = %child_job.remote,
                        "deleted locally but not empty remotely, pruning known entries"
                    );
                    EntryResult::new(name, Some(StateEntry::dir()), Effect::Unchanged)
                        .with_child(child(Some(Side::Local)).ok())
                }
                Err(err) if err.is_not_found() => EntryResult::new(name, None, Effect::Unchanged),
                Err(err) => EntryResult::failed(
                    name,
                    carried,
                    &local_path,
                    action_kind,
                    err.failure_kind(),
                    err.to_string(),
                ),
            },
            DirAction::Descend | DirAction::Forget => {
                EntryResult::new(name, None, Effect::Unchanged)
            }
        }
    }
}

fn plan<'a>(
    local: &'a DirectorySnapshot,
    remote: &'a DirectorySnapshot,
    previous: &'a PreviousState,
    tie_break: TieBreak,
) -> Vec<Planned<'a>> {
    let file_names: BTreeSet<&str> = local
        .files
        .keys()
        .chain(remote.files.keys())
        .map(String::as_str)
        .collect();
    let dir_names: BTreeSet<&str> = local
        .dirs
        .iter()
        .chain(remote.dirs.iter())
        .map(String::as_str)
        .collect();

    let files = file_names.into_iter().map(|name| {
        let local = local.files.get(name);
        let remote = remote.files.get(name);
        Planned::File {
            name,
            action: decide_file(local, remote, previous.knows_file(name), tie_break),
            local,
            remote,
        }
    });
    let dirs = dir_names.into_iter().map(|name| Planned::Dir {
        name,
        action: decide_dir(
            local.dirs.contains(name),
            remote.dirs.contains(name),
            previous.knows_dir(name),
        ),
    });
    files.chain(dirs).collect()
}

fn file_action_kind(action: FileAction) -> ActionKind {
    match action {
        FileAction::Keep | FileAction::Forget => ActionKind::Reconcile,
        FileAction::Upload(_) => ActionKind::Upload,
        FileAction::Download(_) => ActionKind::Download,
        FileAction::DeleteLocal => ActionKind::DeleteLocal,
        FileAction::TrashRemote => ActionKind::TrashRemote,
    }
}

fn dir_action_kind(action: DirAction) -> ActionKind {
    match action {
        DirAction::Descend | DirAction::Forget => ActionKind::Reconcile,
        DirAction::CreateRemote => ActionKind::CreateRemoteDir,
        DirAction::CreateLocal => ActionKind::CreateLocalDir,
        DirAction::RemoveLocalIfEmpty => ActionKind::RemoveLocalDir,
        DirAction::RemoveRemoteIfEmpty => ActionKind::RemoveRemoteDir,
    }
}

fn log_transfer(verb: &str, cause: Cause, path: &Path) {
    match cause {
        Cause::New => tracing::info!(path = %path.display(), "{verb} new file"),
        Cause::Newer => tracing::info!(path = %path.display(), "{verb} newer version"),
        Cause::Tie => tracing::warn!(
            path = %path.display(),
            "conflict with equal timestamps, {verb} by tie-break"
        ),
    }
}

async fn downloaded_record(path: &Path, digest: Option<&str>) -> io::Result<StateEntry> {
    let metadata = tokio::fs::metadata(path).await?;
    let digest = match digest {
        Some(digest) => digest.to_ascii_lowercase(),
        None => md5_file(path).await?,
    };
    Ok(StateEntry {
        kind: EntryKind::File,
        digest: Some(digest),
        size: Some(metadata.len()),
        modified: Some(Timestamp::from_system_time(metadata.modified()?)),
    })
}

async fn is_empty_dir(path: &Path) -> io::Result<bool> {
    let mut entries = tokio::fs::read_dir(path).await?;
    Ok(entries.next_entry().await?.is_none())
}
