//! SQLite-backed run/progress persistence
//!
//! Counter rows are written through on every tracker advance so a crash
//! mid-run leaves the last committed batch's accounting inspectable. Runs
//! left in a non-terminal status are surfaced via `list_unfinished` for the
//! consumer to reconcile; the core never auto-resumes them.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};
use std::sync::Arc;

use crate::domain::errors::StorageError;
use crate::domain::repositories::RunRepository;
use crate::domain::run::{RunState, RunStatus, SupplierProgress};

#[derive(Clone)]
pub struct SqliteRunRepository {
    pool: Arc<SqlitePool>,
}

impl SqliteRunRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    async fn load(&self, run_id: &str) -> Result<Option<RunState>, StorageError> {
        let run_row = sqlx::query(
            "SELECT run_id, status, parts_requested, started_at, updated_at, finished_at \
             FROM runs WHERE run_id = ?",
        )
        .bind(run_id)
        .fetch_optional(&*self.pool)
        .await?;

        let Some(run_row) = run_row else {
            return Ok(None);
        };

        let status_text: String = run_row.get("status");
        let status = RunStatus::parse(&status_text).ok_or_else(|| StorageError::Inconsistent {
            context: format!("run {run_id}"),
            message: format!("unknown status '{status_text}'"),
        })?;

        let parts_requested: i64 = run_row.get("parts_requested");
        let mut state = RunState {
            run_id: run_row.get("run_id"),
            status,
            parts_requested: parts_requested as u64,
            suppliers: Default::default(),
            started_at: run_row.get("started_at"),
            updated_at: run_row.get("updated_at"),
            finished_at: run_row.get("finished_at"),
        };

        let progress_rows = sqlx::query(
            "SELECT supplier_id, requested, scraped, stored, errors \
             FROM run_supplier_progress WHERE run_id = ? ORDER BY supplier_id",
        )
        .bind(run_id)
        .fetch_all(&*self.pool)
        .await?;

        for row in progress_rows {
            let supplier_id: String = row.get("supplier_id");
            let requested: i64 = row.get("requested");
            let scraped: i64 = row.get("scraped");
            let stored: i64 = row.get("stored");
            let errors: i64 = row.get("errors");
            state.suppliers.insert(
                supplier_id,
                SupplierProgress {
                    requested: requested as u64,
                    scraped: scraped as u64,
                    stored: stored as u64,
                    errors: errors as u64,
                },
            );
        }

        Ok(Some(state))
    }
}

#[async_trait]
impl RunRepository for SqliteRunRepository {
    async fn create(&self, run: &RunState) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO runs (run_id, status, parts_requested, started_at, updated_at, finished_at) \
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&run.run_id)
        .bind(run.status.as_str())
        .bind(run.parts_requested as i64)
        .bind(run.started_at)
        .bind(run.updated_at)
        .bind(run.finished_at)
        .execute(&mut *tx)
        .await?;

        for (supplier_id, progress) in &run.suppliers {
            sqlx::query(
                "INSERT INTO run_supplier_progress \
                 (run_id, supplier_id, requested, scraped, stored, errors) \
                 VALUES (?, ?, ?, ?, ?, ?)",
            )
            .bind(&run.run_id)
            .bind(supplier_id)
            .bind(progress.requested as i64)
            .bind(progress.scraped as i64)
            .bind(progress.stored as i64)
            .bind(progress.errors as i64)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn update_status(
        &self,
        run_id: &str,
        status: RunStatus,
        finished_at: Option<DateTime<Utc>>,
    ) -> Result<(), StorageError> {
        sqlx::query("UPDATE runs SET status = ?, updated_at = ?, finished_at = ? WHERE run_id = ?")
            .bind(status.as_str())
            .bind(Utc::now())
            .bind(finished_at)
            .bind(run_id)
            .execute(&*self.pool)
            .await?;
        Ok(())
    }

    async fn update_supplier_progress(
        &self,
        run_id: &str,
        supplier_id: &str,
        progress: &SupplierProgress,
    ) -> Result<(), StorageError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO run_supplier_progress \
             (run_id, supplier_id, requested, scraped, stored, errors) \
             VALUES (?, ?, ?, ?, ?, ?) \
             ON CONFLICT(run_id, supplier_id) DO UPDATE SET \
                 requested = excluded.requested, \
                 scraped = excluded.scraped, \
                 stored = excluded.stored, \
                 errors = excluded.errors",
        )
        .bind(run_id)
        .bind(supplier_id)
        .bind(progress.requested as i64)
        .bind(progress.scraped as i64)
        .bind(progress.stored as i64)
        .bind(progress.errors as i64)
        .execute(&mut *tx)
        .await?;
        sqlx::query("UPDATE runs SET updated_at = ? WHERE run_id = ?")
            .bind(Utc::now())
            .bind(run_id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(())
    }

    async fn get(&self, run_id: &str) -> Result<Option<RunState>, StorageError> {
        self.load(run_id).await
    }

    async fn list_unfinished(&self) -> Result<Vec<RunState>, StorageError> {
        let rows = sqlx::query(
            "SELECT run_id FROM runs WHERE status IN ('pending', 'running') ORDER BY started_at",
        )
        .fetch_all(&*self.pool)
        .await?;

        let mut runs = Vec::with_capacity(rows.len());
        for row in rows {
            let run_id: String = row.get("run_id");
            if let Some(state) = self.load(&run_id).await? {
                runs.push(state);
            }
        }
        Ok(runs)
    }
}
