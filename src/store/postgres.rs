//! PostgreSQL job store.
//!
//! Records are stored as JSONB documents with the columns needed for lookup and
//! ordering pulled out alongside. Guarded writes run inside a transaction that
//! locks the row with `SELECT ... FOR UPDATE`, applies the patch and writes the
//! document back.

use super::{JobPatch, JobStore, StoreError, StoreResult, TaskUpdate, WriteOutcome};
use crate::models::{Job, Task};
use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use tracing::{debug, info, instrument};

const SCHEMA_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS geoflow_jobs (
    job_id        TEXT PRIMARY KEY,
    job_type      TEXT NOT NULL,
    status        TEXT NOT NULL,
    current_stage INTEGER NOT NULL,
    total_stages  INTEGER NOT NULL,
    record        JSONB NOT NULL,
    created_at    TIMESTAMPTZ NOT NULL,
    updated_at    TIMESTAMPTZ NOT NULL
);

CREATE TABLE IF NOT EXISTS geoflow_tasks (
    task_id       TEXT PRIMARY KEY,
    parent_job_id TEXT NOT NULL,
    stage         INTEGER NOT NULL,
    task_index    INTEGER NOT NULL,
    status        TEXT NOT NULL,
    record        JSONB NOT NULL,
    created_at    TIMESTAMPTZ NOT NULL,
    updated_at    TIMESTAMPTZ NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_geoflow_tasks_job_stage
    ON geoflow_tasks (parent_job_id, stage, task_index);
"#;

#[derive(Debug, Clone)]
pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str, max_connections: u32) -> StoreResult<Self> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        info!(max_connections, "Connected job store to PostgreSQL");
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Create the job and task tables if they do not exist
    pub async fn migrate(&self) -> StoreResult<()> {
        sqlx::raw_sql(SCHEMA_SQL).execute(&self.pool).await?;
        debug!("Job store schema ensured");
        Ok(())
    }

    async fn write_job<'e, E>(executor: E, job: &Job) -> StoreResult<()>
    where
        E: sqlx::Executor<'e, Database = sqlx::Postgres>,
    {
        sqlx::query(
            r#"
            UPDATE geoflow_jobs
               SET status = $2, current_stage = $3, total_stages = $4, record = $5,
                   created_at = $6, updated_at = $7
             WHERE job_id = $1
            "#,
        )
        .bind(&job.job_id)
        .bind(job.status.as_str())
        .bind(job.current_stage as i32)
        .bind(job.total_stages as i32)
        .bind(Json(job))
        .bind(job.created_at)
        .bind(job.updated_at)
        .execute(executor)
        .await?;
        Ok(())
    }

    async fn write_task<'e, E>(executor: E, task: &Task) -> StoreResult<()>
    where
        E: sqlx::Executor<'e, Database = sqlx::Postgres>,
    {
        sqlx::query(
            r#"
            UPDATE geoflow_tasks
               SET status = $2, record = $3, updated_at = $4
             WHERE task_id = $1
            "#,
        )
        .bind(&task.task_id)
        .bind(task.status.as_str())
        .bind(Json(task))
        .bind(task.updated_at)
        .execute(executor)
        .await?;
        Ok(())
    }

    fn tasks_from_rows(rows: Vec<sqlx::postgres::PgRow>) -> StoreResult<Vec<Task>> {
        rows.into_iter()
            .map(|row| -> StoreResult<Task> {
                let Json(task): Json<Task> = row.try_get("record")?;
                Ok(task)
            })
            .collect()
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    #[instrument(skip(self))]
    async fn get_job(&self, job_id: &str) -> StoreResult<Option<Job>> {
        let row = sqlx::query("SELECT record FROM geoflow_jobs WHERE job_id = $1")
            .bind(job_id)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => {
                let Json(job): Json<Job> = row.try_get("record")?;
                Ok(Some(job))
            }
            None => Ok(None),
        }
    }

    #[instrument(skip(self, job), fields(job_id = %job.job_id))]
    async fn create_job(&self, job: &Job) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO geoflow_jobs
                (job_id, job_type, status, current_stage, total_stages, record, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (job_id) DO NOTHING
            "#,
        )
        .bind(&job.job_id)
        .bind(&job.job_type)
        .bind(job.status.as_str())
        .bind(job.current_stage as i32)
        .bind(job.total_stages as i32)
        .bind(Json(job))
        .bind(job.created_at)
        .bind(job.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    #[instrument(skip(self, patch), fields(patch = patch.name()))]
    async fn update_job(&self, job_id: &str, patch: JobPatch) -> StoreResult<WriteOutcome<Job>> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query("SELECT record FROM geoflow_jobs WHERE job_id = $1 FOR UPDATE")
            .bind(job_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| StoreError::job_not_found(job_id))?;
        let Json(mut job): Json<Job> = row.try_get("record")?;

        if !patch.apply(&mut job) {
            tx.rollback().await?;
            return Ok(WriteOutcome::Rejected(job));
        }

        Self::write_job(&mut *tx, &job).await?;
        tx.commit().await?;
        Ok(WriteOutcome::Applied(job))
    }

    #[instrument(skip(self, task), fields(task_id = %task.task_id))]
    async fn insert_task(&self, task: &Task) -> StoreResult<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO geoflow_tasks
                (task_id, parent_job_id, stage, task_index, status, record, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (task_id) DO NOTHING
            "#,
        )
        .bind(&task.task_id)
        .bind(&task.parent_job_id)
        .bind(task.stage as i32)
        .bind(task.index as i32)
        .bind(task.status.as_str())
        .bind(Json(task))
        .bind(task.created_at)
        .bind(task.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    #[instrument(skip(self))]
    async fn get_task(&self, task_id: &str) -> StoreResult<Option<Task>> {
        let row = sqlx::query("SELECT record FROM geoflow_tasks WHERE task_id = $1")
            .bind(task_id)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => {
                let Json(task): Json<Task> = row.try_get("record")?;
                Ok(Some(task))
            }
            None => Ok(None),
        }
    }

    #[instrument(skip(self, update), fields(status = %update.status))]
    async fn update_task(
        &self,
        task_id: &str,
        update: TaskUpdate,
    ) -> StoreResult<WriteOutcome<Task>> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query("SELECT record FROM geoflow_tasks WHERE task_id = $1 FOR UPDATE")
            .bind(task_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| StoreError::task_not_found(task_id))?;
        let Json(mut task): Json<Task> = row.try_get("record")?;

        if !update.apply(&mut task) {
            tx.rollback().await?;
            return Ok(WriteOutcome::Rejected(task));
        }

        Self::write_task(&mut *tx, &task).await?;
        tx.commit().await?;
        Ok(WriteOutcome::Applied(task))
    }

    #[instrument(skip(self))]
    async fn list_tasks_for_job(&self, job_id: &str) -> StoreResult<Vec<Task>> {
        let rows = sqlx::query(
            r#"
            SELECT record FROM geoflow_tasks
             WHERE parent_job_id = $1
             ORDER BY stage, task_index, task_id
            "#,
        )
        .bind(job_id)
        .fetch_all(&self.pool)
        .await?;
        Self::tasks_from_rows(rows)
    }

    #[instrument(skip(self))]
    async fn list_tasks_for_stage(&self, job_id: &str, stage: u32) -> StoreResult<Vec<Task>> {
        let rows = sqlx::query(
            r#"
            SELECT record FROM geoflow_tasks
             WHERE parent_job_id = $1 AND stage = $2
             ORDER BY task_index, task_id
            "#,
        )
        .bind(job_id)
        .bind(stage as i32)
        .fetch_all(&self.pool)
        .await?;
        Self::tasks_from_rows(rows)
    }

    #[instrument(skip(self))]
    async fn delete_tasks_for_job(&self, job_id: &str) -> StoreResult<usize> {
        let result = sqlx::query("DELETE FROM geoflow_tasks WHERE parent_job_id = $1")
            .bind(job_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() as usize)
    }
}
