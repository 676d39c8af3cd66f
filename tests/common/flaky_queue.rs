//! A [`TaskQueue`] that refuses selected sends.

use async_trait::async_trait;
use geoflow_core::messaging::{
    InMemoryTaskQueue, MessagingError, MessagingResult, ReceivedMessage, TaskQueue,
    TaskQueueMessage,
};
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Debug, Default)]
pub struct FlakyQueue {
    inner: InMemoryTaskQueue,
    /// (stage, index) pairs whose sends fail
    failing: BTreeSet<(u32, u32)>,
    fail_all: bool,
    refused: AtomicUsize,
}

impl FlakyQueue {
    /// Fail sends for the given indices of stage 1
    pub fn failing_indices(indices: &[u32]) -> Self {
        Self::failing_stage_indices(1, indices)
    }

    pub fn failing_stage_indices(stage: u32, indices: &[u32]) -> Self {
        Self {
            failing: indices.iter().map(|index| (stage, *index)).collect(),
            ..Self::default()
        }
    }

    pub fn failing_everything() -> Self {
        Self {
            fail_all: true,
            ..Self::default()
        }
    }

    pub fn refused(&self) -> usize {
        self.refused.load(Ordering::SeqCst)
    }

    fn refuses(&self, message: &TaskQueueMessage) -> bool {
        self.fail_all || self.failing.contains(&(message.stage, message.index))
    }
}

#[async_trait]
impl TaskQueue for FlakyQueue {
    async fn create_queue(&self, queue_name: &str) -> MessagingResult<()> {
        self.inner.create_queue(queue_name).await
    }

    async fn send(&self, queue_name: &str, message: &TaskQueueMessage) -> MessagingResult<i64> {
        if self.refuses(message) {
            self.refused.fetch_add(1, Ordering::SeqCst);
            return Err(MessagingError::queue_operation(
                queue_name,
                "send",
                "injected send failure",
            ));
        }
        self.inner.send(queue_name, message).await
    }

    async fn receive(
        &self,
        queue_name: &str,
        visibility_timeout: Duration,
        limit: usize,
    ) -> MessagingResult<Vec<ReceivedMessage>> {
        self.inner.receive(queue_name, visibility_timeout, limit).await
    }

    async fn ack(&self, queue_name: &str, message_id: i64) -> MessagingResult<bool> {
        self.inner.ack(queue_name, message_id).await
    }

    async fn depth(&self, queue_name: &str) -> MessagingResult<usize> {
        self.inner.depth(queue_name).await
    }
}
