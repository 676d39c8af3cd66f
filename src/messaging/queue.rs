//! # Task Queue Abstraction
//!
//! At-least-once queue semantics: a received message stays invisible for its
//! visibility timeout and is redelivered unless acknowledged before it lapses.

use super::errors::{MessagingError, MessagingResult};
use super::message::{ReceivedMessage, TaskQueueMessage};
use async_trait::async_trait;
use crossbeam::queue::SegQueue;
use dashmap::DashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

#[async_trait]
pub trait TaskQueue: Send + Sync + std::fmt::Debug {
    /// Create the queue if it does not exist
    async fn create_queue(&self, queue_name: &str) -> MessagingResult<()>;

    /// Send one message; returns its queue-assigned id
    async fn send(&self, queue_name: &str, message: &TaskQueueMessage) -> MessagingResult<i64>;

    /// Receive up to `limit` visible messages
    async fn receive(
        &self,
        queue_name: &str,
        visibility_timeout: Duration,
        limit: usize,
    ) -> MessagingResult<Vec<ReceivedMessage>>;

    /// Acknowledge (delete) a message; returns false if it was already gone
    async fn ack(&self, queue_name: &str, message_id: i64) -> MessagingResult<bool>;

    /// Messages currently visible or in flight
    async fn depth(&self, queue_name: &str) -> MessagingResult<usize>;
}

/// Queue names follow pgmq's rules so the in-memory queue rejects the same names
pub fn validate_queue_name(queue_name: &str) -> MessagingResult<()> {
    if queue_name.is_empty() || queue_name.len() > 47 {
        return Err(MessagingError::invalid_queue_name(
            queue_name,
            "must be 1-47 characters",
        ));
    }
    if !queue_name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_')
    {
        return Err(MessagingError::invalid_queue_name(
            queue_name,
            "only ASCII letters, digits and underscores are allowed",
        ));
    }
    Ok(())
}

#[derive(Debug, Clone)]
struct Envelope {
    message_id: i64,
    read_count: u32,
    message: TaskQueueMessage,
}

#[derive(Debug, Default)]
struct QueueState {
    ready: SegQueue<Envelope>,
    in_flight: DashMap<i64, (Envelope, Instant)>,
}

impl QueueState {
    /// Make expired in-flight messages visible again
    fn requeue_expired(&self, now: Instant) {
        let expired: Vec<i64> = self
            .in_flight
            .iter()
            .filter(|entry| entry.value().1 <= now)
            .map(|entry| *entry.key())
            .collect();
        for message_id in expired {
            if let Some((_, (envelope, _))) = self.in_flight.remove(&message_id) {
                self.ready.push(envelope);
            }
        }
    }
}

/// Process-local queue with visibility timeouts
#[derive(Debug, Default, Clone)]
pub struct InMemoryTaskQueue {
    queues: Arc<DashMap<String, Arc<QueueState>>>,
    next_id: Arc<AtomicI64>,
}

impl InMemoryTaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    fn queue(&self, queue_name: &str) -> MessagingResult<Arc<QueueState>> {
        self.queues
            .get(queue_name)
            .map(|state| state.clone())
            .ok_or_else(|| MessagingError::queue_not_found(queue_name))
    }
}

#[async_trait]
impl TaskQueue for InMemoryTaskQueue {
    async fn create_queue(&self, queue_name: &str) -> MessagingResult<()> {
        validate_queue_name(queue_name)?;
        self.queues.entry(queue_name.to_string()).or_default();
        Ok(())
    }

    async fn send(&self, queue_name: &str, message: &TaskQueueMessage) -> MessagingResult<i64> {
        let state = self.queue(queue_name)?;
        let message_id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        state.ready.push(Envelope {
            message_id,
            read_count: 0,
            message: message.clone(),
        });
        debug!(queue = queue_name, message_id, task_id = %message.task_id, "Message sent");
        Ok(message_id)
    }

    async fn receive(
        &self,
        queue_name: &str,
        visibility_timeout: Duration,
        limit: usize,
    ) -> MessagingResult<Vec<ReceivedMessage>> {
        let state = self.queue(queue_name)?;
        let now = Instant::now();
        state.requeue_expired(now);

        let mut received = Vec::new();
        while received.len() < limit {
            let Some(mut envelope) = state.ready.pop() else {
                break;
            };
            envelope.read_count += 1;
            received.push(ReceivedMessage {
                message_id: envelope.message_id,
                read_count: envelope.read_count,
                message: envelope.message.clone(),
            });
            state
                .in_flight
                .insert(envelope.message_id, (envelope, now + visibility_timeout));
        }
        Ok(received)
    }

    async fn ack(&self, queue_name: &str, message_id: i64) -> MessagingResult<bool> {
        let state = self.queue(queue_name)?;
        Ok(state.in_flight.remove(&message_id).is_some())
    }

    async fn depth(&self, queue_name: &str) -> MessagingResult<usize> {
        let state = self.queue(queue_name)?;
        Ok(state.ready.len() + state.in_flight.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use uuid::Uuid;

    fn message(task_id: &str) -> TaskQueueMessage {
        TaskQueueMessage {
            task_id: task_id.to_string(),
            parent_job_id: "job".to_string(),
            operation_type: "hello_world".to_string(),
            task_type: "hello_world_greeting".to_string(),
            stage: 1,
            index: 0,
            dataset_id: None,
            resource_id: None,
            version_id: None,
            created_at: Utc::now(),
            correlation_id: Uuid::new_v4(),
        }
    }

    #[tokio::test]
    async fn test_send_receive_ack() {
        let queue = InMemoryTaskQueue::new();
        queue.create_queue("tasks").await.unwrap();
        queue.send("tasks", &message("a")).await.unwrap();

        let received = queue
            .receive("tasks", Duration::from_secs(30), 10)
            .await
            .unwrap();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].read_count, 1);

        // invisible while in flight
        assert!(queue
            .receive("tasks", Duration::from_secs(30), 10)
            .await
            .unwrap()
            .is_empty());

        assert!(queue.ack("tasks", received[0].message_id).await.unwrap());
        assert!(!queue.ack("tasks", received[0].message_id).await.unwrap());
        assert_eq!(queue.depth("tasks").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_unacked_message_is_redelivered() {
        let queue = InMemoryTaskQueue::new();
        queue.create_queue("tasks").await.unwrap();
        queue.send("tasks", &message("a")).await.unwrap();

        let first = queue.receive("tasks", Duration::ZERO, 1).await.unwrap();
        let second = queue
            .receive("tasks", Duration::from_secs(30), 1)
            .await
            .unwrap();

        assert_eq!(first[0].message_id, second[0].message_id);
        assert_eq!(second[0].read_count, 2);
    }

    #[tokio::test]
    async fn test_unknown_queue() {
        let queue = InMemoryTaskQueue::new();
        let err = queue.send("missing", &message("a")).await.unwrap_err();
        assert!(matches!(err, MessagingError::QueueNotFound { .. }));
    }

    #[test]
    fn test_queue_name_rules() {
        assert!(validate_queue_name("geoflow_tasks").is_ok());
        assert!(validate_queue_name("").is_err());
        assert!(validate_queue_name("bad-name").is_err());
        assert!(validate_queue_name(&"q".repeat(48)).is_err());
    }
}
