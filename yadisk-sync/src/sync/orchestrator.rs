use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use futures_util::FutureExt;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::gateway::RemoteGateway;

use super::level::{LevelJob, LevelOptions, LevelReconciler, LevelReport};
use super::result::{ActionKind, FailureKind, LevelOutcome, ReconciliationResult};
use super::state::StateStore;

/// A configured local root and the remote directory it mirrors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncPair {
    pub local: PathBuf,
    pub remote: String,
}

#[derive(Debug, Clone, Copy)]
pub struct OrchestratorOptions {
    /// Directory levels reconciled at once.
    pub workers: usize,
    pub level: LevelOptions,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            workers: 16,
            level: LevelOptions::default(),
        }
    }
}

/// Drives reconciliation over whole trees.
///
/// Every directory level is one task. Tasks run on a `JoinSet` that never
/// holds more than `workers` of them; a finished level hands its children
/// back and they wait in a queue for a free slot, so a parent never blocks
/// on its own subtree and tree shape cannot raise concurrency. Outcomes are
/// reduced only after every task has completed.
///
/// Two passes over the same root must not overlap: both would read and
/// write the same previous-state records. Callers serialize passes.
pub struct Orchestrator {
    reconciler: LevelReconciler,
    workers: usize,
    cancel: CancellationToken,
}

impl Orchestrator {
    pub fn new(
        gateway: Arc<dyn RemoteGateway>,
        state: Arc<dyn StateStore>,
        options: OrchestratorOptions,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            reconciler: LevelReconciler::new(gateway, state, options.level, cancel.clone()),
            workers: options.workers.max(1),
            cancel,
        }
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub async fn reconcile(&self, local: &Path, remote: &str) -> ReconciliationResult {
        tracing::info!(local = %local.display(), remote, "starting bidirectional pass");
        let result = self.drive(LevelJob::root(local, remote)).await;
        log_result(local, &result);
        result
    }

    /// Reconciles every pair one after another; a failing pair never stops
    /// the ones after it.
    pub async fn reconcile_all(&self, pairs: &[SyncPair]) -> ReconciliationResult {
        let mut total = ReconciliationResult::reduce(Vec::new());
        for pair in pairs {
            if self.cancel.is_cancelled() {
                let mut outcome = LevelOutcome::default();
                outcome.fail(
                    &pair.local,
                    ActionKind::Reconcile,
                    FailureKind::Cancelled,
                    "pass cancelled before this root started",
                );
                total.merge(ReconciliationResult::reduce([outcome]));
                continue;
            }
            total.merge(self.reconcile(&pair.local, &pair.remote).await);
        }
        total.failures.sort_by(|a, b| a.path.cmp(&b.path));
        total
    }

    async fn drive(&self, root: LevelJob) -> ReconciliationResult {
        let mut pending = VecDeque::from([root]);
        let mut running: JoinSet<(PathBuf, std::thread::Result<LevelReport>)> = JoinSet::new();
        let mut outcomes = Vec::new();

        loop {
            while running.len() < self.workers {
                let Some(job) = pending.pop_front() else {
                    break;
                };
                if self.cancel.is_cancelled() {
                    let mut outcome = LevelOutcome::default();
                    outcome.fail(
                        &job.local,
                        ActionKind::Reconcile,
                        FailureKind::Cancelled,
                        "pass cancelled before this level started",
                    );
                    outcomes.push(outcome);
                    continue;
                }
                let reconciler = self.reconciler.clone();
                running.spawn(async move {
                    let local = job.local.clone();
                    let report = AssertUnwindSafe(reconciler.run(job)).catch_unwind().await;
                    (local, report)
                });
            }

            let Some(joined) = running.join_next().await else {
                break;
            };
            match joined {
                Ok((_, Ok(report))) => {
                    pending.extend(report.children);
                    outcomes.push(report.outcome);
                }
                Ok((local, Err(_))) => {
                    let mut outcome = LevelOutcome::default();
                    outcome.fail(
                        local,
                        ActionKind::Reconcile,
                        FailureKind::LocalIo,
                        "level task panicked",
                    );
                    outcomes.push(outcome);
                }
                Err(err) => {
                    let mut outcome = LevelOutcome::default();
                    outcome.fail(
                        PathBuf::new(),
                        ActionKind::Reconcile,
                        FailureKind::Cancelled,
                        err.to_string(),
                    );
                    outcomes.push(outcome);
                }
            }
        }

        ReconciliationResult::reduce(outcomes)
    }
}

fn log_result(local: &Path, result: &ReconciliationResult) {
    let stats = &result.stats;
    if result.success {
        tracing::info!(
            local = %local.display(),
            levels = stats.levels,
            uploaded = stats.uploaded,
            downloaded = stats.downloaded,
            deleted_local = stats.deleted_local,
            trashed_remote = stats.trashed_remote,
            conflicts = stats.conflicts,
            "bidirectional pass completed"
        );
    } else {
        tracing::error!(
            local = %local.display(),
            levels = stats.levels,
            failures = result.failures.len(),
            "bidirectional pass completed with errors"
        );
    }
}

#[cfg(test)]
#[path = "orchestrator_tests.rs"]
mod tests;
