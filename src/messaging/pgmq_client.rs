//! # PostgreSQL Message Queue Client
//!
//! [`TaskQueue`] over the pgmq extension's SQL functions, sharing the store's
//! connection pool.

use super::errors::{MessagingError, MessagingResult};
use super::message::{ReceivedMessage, TaskQueueMessage};
use super::queue::{validate_queue_name, TaskQueue};
use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use std::time::Duration;
use tracing::{debug, info, instrument};

#[derive(Debug, Clone)]
pub struct PgmqTaskQueue {
    pool: PgPool,
}

impl PgmqTaskQueue {
    /// Create a queue client over an existing pool
    pub fn new_with_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> MessagingResult<Self> {
        let pool = PgPool::connect(database_url).await?;
        info!("Connected task queue to pgmq");
        Ok(Self { pool })
    }
}

#[async_trait]
impl TaskQueue for PgmqTaskQueue {
    #[instrument(skip(self))]
    async fn create_queue(&self, queue_name: &str) -> MessagingResult<()> {
        validate_queue_name(queue_name)?;
        sqlx::query("SELECT pgmq.create($1)")
            .bind(queue_name)
            .execute(&self.pool)
            .await
            .map_err(|e| MessagingError::queue_operation(queue_name, "create", e.to_string()))?;
        info!(queue = queue_name, "Queue ready");
        Ok(())
    }

    #[instrument(skip(self, message), fields(task_id = %message.task_id))]
    async fn send(&self, queue_name: &str, message: &TaskQueueMessage) -> MessagingResult<i64> {
        let row = sqlx::query("SELECT * FROM pgmq.send($1, $2)")
            .bind(queue_name)
            .bind(Json(message))
            .fetch_one(&self.pool)
            .await
            .map_err(|e| MessagingError::queue_operation(queue_name, "send", e.to_string()))?;
        let message_id: i64 = row.try_get(0)?;
        debug!(queue = queue_name, message_id, "Message sent");
        Ok(message_id)
    }

    #[instrument(skip(self))]
    async fn receive(
        &self,
        queue_name: &str,
        visibility_timeout: Duration,
        limit: usize,
    ) -> MessagingResult<Vec<ReceivedMessage>> {
        let rows = sqlx::query("SELECT msg_id, read_ct, message FROM pgmq.read($1, $2, $3)")
            .bind(queue_name)
            .bind(visibility_timeout.as_secs() as i32)
            .bind(limit as i32)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| MessagingError::queue_operation(queue_name, "read", e.to_string()))?;

        rows.into_iter()
            .map(|row| -> MessagingResult<ReceivedMessage> {
                let message_id: i64 = row.try_get("msg_id")?;
                let read_count: i32 = row.try_get("read_ct")?;
                let payload: serde_json::Value = row.try_get("message")?;
                Ok(ReceivedMessage {
                    message_id,
                    read_count: read_count.max(0) as u32,
                    message: serde_json::from_value(payload)?,
                })
            })
            .collect()
    }

    #[instrument(skip(self))]
    async fn ack(&self, queue_name: &str, message_id: i64) -> MessagingResult<bool> {
        let row = sqlx::query("SELECT pgmq.delete($1, $2)")
            .bind(queue_name)
            .bind(message_id)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| MessagingError::queue_operation(queue_name, "delete", e.to_string()))?;
        Ok(row.try_get::<bool, _>(0)?)
    }

    async fn depth(&self, queue_name: &str) -> MessagingResult<usize> {
        let row = sqlx::query("SELECT queue_length FROM pgmq.metrics($1)")
            .bind(queue_name)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| MessagingError::queue_operation(queue_name, "metrics", e.to_string()))?;
        let length: i64 = row.try_get("queue_length")?;
        Ok(length.max(0) as usize)
    }
}
