//! Progress tracking for batch runs
//!
//! In-memory state guarded by an async lock for cheap concurrent updates,
//! written through to the run repository on every advance so a crash leaves
//! the last committed batch's accounting inspectable. All access goes
//! through this tracker; counters only ever grow, and a run becomes
//! terminal exactly once.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::RwLock;
use tracing::info;

use crate::domain::errors::StorageError;
use crate::domain::repositories::RunRepository;
use crate::domain::run::{ProgressDelta, RunState, RunStatus};

pub struct ProgressTracker {
    runs: Arc<RwLock<HashMap<String, RunState>>>,
    repo: Arc<dyn RunRepository>,
}

impl ProgressTracker {
    pub fn new(repo: Arc<dyn RunRepository>) -> Self {
        Self {
            runs: Arc::new(RwLock::new(HashMap::new())),
            repo,
        }
    }

    /// Register a new run in `pending` state.
    pub async fn create(
        &self,
        run_id: &str,
        supplier_ids: &[String],
        parts_requested: u64,
    ) -> Result<(), StorageError> {
        let state = RunState::new(run_id, supplier_ids, parts_requested);
        self.repo.create(&state).await?;
        self.runs.write().await.insert(run_id.to_string(), state);
        info!(run_id, suppliers = supplier_ids.len(), parts_requested, "created run");
        Ok(())
    }

    pub async fn mark_running(&self, run_id: &str) -> Result<(), StorageError> {
        let mut runs = self.runs.write().await;
        if let Some(run) = runs.get_mut(run_id) {
            if !run.status.is_terminal() {
                run.status = RunStatus::Running;
                run.updated_at = Utc::now();
            }
        }
        self.repo.update_status(run_id, RunStatus::Running, None).await
    }

    /// Atomically apply counter increments for one supplier and persist the
    /// updated row.
    pub async fn advance(
        &self,
        run_id: &str,
        supplier_id: &str,
        delta: ProgressDelta,
    ) -> Result<(), StorageError> {
        let mut runs = self.runs.write().await;
        let run = runs.get_mut(run_id).ok_or_else(|| StorageError::Inconsistent {
            context: "progress advance".into(),
            message: format!("unknown run {run_id}"),
        })?;
        run.apply(supplier_id, delta);
        let progress = run.suppliers[supplier_id];
        // Persist while still holding the lock so counter rows can never be
        // written out of order.
        self.repo
            .update_supplier_progress(run_id, supplier_id, &progress)
            .await
    }

    /// Read-only copy of a run's state. Falls back to the repository for
    /// runs from a previous process.
    pub async fn snapshot(&self, run_id: &str) -> Result<Option<RunState>, StorageError> {
        if let Some(run) = self.runs.read().await.get(run_id) {
            return Ok(Some(run.clone()));
        }
        self.repo.get(run_id).await
    }

    /// Move a run to a terminal status. Later calls for an already-terminal
    /// run are ignored.
    pub async fn finish(&self, run_id: &str, status: RunStatus) -> Result<(), StorageError> {
        debug_assert!(status.is_terminal());
        let mut runs = self.runs.write().await;
        if let Some(run) = runs.get_mut(run_id) {
            if run.status.is_terminal() {
                return Ok(());
            }
            let now = Utc::now();
            run.status = status;
            run.updated_at = now;
            run.finished_at = Some(now);
        }
        info!(run_id, status = status.as_str(), "run finished");
        self.repo
            .update_status(run_id, status, Some(Utc::now()))
            .await
    }

    /// Runs left non-terminal, e.g. by a crash. Reconciliation is the
    /// caller's job.
    pub async fn unfinished_runs(&self) -> Result<Vec<RunState>, StorageError> {
        self.repo.list_unfinished().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::database_connection::DatabaseConnection;
    use crate::infrastructure::run_repository::SqliteRunRepository;

    async fn tracker() -> (tempfile::TempDir, Arc<SqliteRunRepository>, ProgressTracker) {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite:{}", dir.path().join("progress.db").display());
        let db = DatabaseConnection::new(&url).await.unwrap();
        db.migrate().await.unwrap();
        let repo = Arc::new(SqliteRunRepository::new(db.pool().clone()));
        (dir, repo.clone(), ProgressTracker::new(repo))
    }

    #[tokio::test]
    async fn lifecycle_create_advance_finish() {
        let (_dir, _repo, tracker) = tracker().await;
        tracker.create("run-1", &["acme".into()], 20).await.unwrap();
        tracker.mark_running("run-1").await.unwrap();

        tracker
            .advance("run-1", "acme", ProgressDelta::requested(10))
            .await
            .unwrap();
        tracker
            .advance(
                "run-1",
                "acme",
                ProgressDelta {
                    scraped: 9,
                    stored: 9,
                    errors: 1,
                    ..ProgressDelta::default()
                },
            )
            .await
            .unwrap();

        let snap = tracker.snapshot("run-1").await.unwrap().unwrap();
        assert_eq!(snap.status, RunStatus::Running);
        let progress = snap.suppliers["acme"];
        assert!(progress.stored <= progress.scraped && progress.scraped <= progress.requested);

        tracker.finish("run-1", RunStatus::Completed).await.unwrap();
        let snap = tracker.snapshot("run-1").await.unwrap().unwrap();
        assert_eq!(snap.status, RunStatus::Completed);
        assert!(snap.finished_at.is_some());
    }

    #[tokio::test]
    async fn counters_are_monotonic_under_concurrent_advance() {
        let (_dir, _repo, tracker) = tracker().await;
        let tracker = Arc::new(tracker);
        tracker.create("run-1", &["acme".into()], 100).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..10 {
            let tracker = tracker.clone();
            handles.push(tokio::spawn(async move {
                for _ in 0..5 {
                    tracker
                        .advance("run-1", "acme", ProgressDelta::requested(1))
                        .await
                        .unwrap();
                    tracker
                        .advance(
                            "run-1",
                            "acme",
                            ProgressDelta {
                                scraped: 1,
                                stored: 1,
                                ..ProgressDelta::default()
                            },
                        )
                        .await
                        .unwrap();
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        let progress = tracker.snapshot("run-1").await.unwrap().unwrap().suppliers["acme"];
        assert_eq!(progress.requested, 50);
        assert_eq!(progress.scraped, 50);
        assert_eq!(progress.stored, 50);
    }

    #[tokio::test]
    async fn terminal_status_is_set_exactly_once() {
        let (_dir, _repo, tracker) = tracker().await;
        tracker.create("run-1", &["acme".into()], 1).await.unwrap();
        tracker.finish("run-1", RunStatus::Cancelled).await.unwrap();
        // A later completion attempt must not overwrite the terminal state.
        tracker.finish("run-1", RunStatus::Completed).await.unwrap();

        let snap = tracker.snapshot("run-1").await.unwrap().unwrap();
        assert_eq!(snap.status, RunStatus::Cancelled);
    }

    #[tokio::test]
    async fn snapshot_survives_process_restart() {
        let (_dir, repo, tracker) = tracker().await;
        tracker.create("run-1", &["acme".into()], 5).await.unwrap();
        tracker
            .advance("run-1", "acme", ProgressDelta::requested(5))
            .await
            .unwrap();

        // A new tracker over the same store sees the persisted counters.
        let revived = ProgressTracker::new(repo);
        let snap = revived.snapshot("run-1").await.unwrap().unwrap();
        assert_eq!(snap.suppliers["acme"].requested, 5);
        assert_eq!(snap.parts_requested, 5);

        let unfinished = revived.unfinished_runs().await.unwrap();
        assert_eq!(unfinished.len(), 1);
    }

    #[tokio::test]
    async fn advance_on_unknown_run_is_an_error() {
        let (_dir, _repo, tracker) = tracker().await;
        let err = tracker
            .advance("ghost", "acme", ProgressDelta::requested(1))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::Inconsistent { .. }));
    }
}
